//! Per-request orchestration: validate, classify, then serve or render.
//!
//! Every request ends in exactly one [`AssetResponse`]. Failures of any stage,
//! including panics below this boundary, become error images.

use std::{
    any::Any,
    panic::AssertUnwindSafe,
    path::PathBuf,
    sync::Arc,
    time::Instant,
};

use bytes::Bytes;
use futures::FutureExt;
use metrics::counter;
use tracing::{debug, error};

use crate::{
    application::{
        error::{AssetFailure, ErrorReport},
        error_image::ErrorImageRenderer,
        files::{FileError, FileSource},
        kroki::{DiagramRenderer, RenderRequest},
    },
    domain::{
        error::ErrorKind,
        format::{self, FormatClassification},
        path::{self, ResolvedPath},
    },
};

pub const METRIC_REQUESTS_TOTAL: &str = "livedoc_requests_total";

const ERROR_IMAGE_CONTENT_TYPE: &str = "image/svg+xml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub base_dir: PathBuf,
    pub max_file_size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetOutcome {
    Success,
    Error(ErrorKind),
}

impl AssetOutcome {
    pub fn status_label(self) -> &'static str {
        match self {
            AssetOutcome::Success => "success",
            AssetOutcome::Error(_) => "error",
        }
    }
}

/// Image produced for one request: the asset itself or an error image.
#[derive(Debug, Clone)]
pub struct AssetResponse {
    pub body: Bytes,
    pub content_type: String,
    pub outcome: AssetOutcome,
    pub report: Option<ErrorReport>,
}

struct Asset {
    body: Bytes,
    content_type: String,
}

pub struct RequestPipeline {
    config: PipelineConfig,
    files: Arc<dyn FileSource>,
    renderer: Arc<dyn DiagramRenderer>,
    error_images: ErrorImageRenderer,
}

impl RequestPipeline {
    pub fn new(
        config: PipelineConfig,
        files: Arc<dyn FileSource>,
        renderer: Arc<dyn DiagramRenderer>,
        error_images: ErrorImageRenderer,
    ) -> Self {
        Self {
            config,
            files,
            renderer,
            error_images,
        }
    }

    /// Serve `requested`, a path relative to the base directory.
    pub async fn handle(&self, requested: &str) -> AssetResponse {
        let started_at = Instant::now();
        let outcome = AssertUnwindSafe(self.serve(requested)).catch_unwind().await;

        let response = match outcome {
            Ok(Ok(asset)) => AssetResponse {
                body: asset.body,
                content_type: asset.content_type,
                outcome: AssetOutcome::Success,
                report: None,
            },
            Ok(Err(failure)) => self.error_response(&failure),
            Err(payload) => {
                let failure = AssetFailure::Panicked(panic_message(payload.as_ref()));
                error!(
                    target = "application::pipeline",
                    op = "pipeline::handle",
                    result = "panic",
                    path = requested,
                    error = %failure,
                    "Request handling panicked"
                );
                self.error_response(&failure)
            }
        };

        record(requested, &response, started_at);
        response
    }

    /// Answer a request that failed before reaching the pipeline.
    pub fn reject(&self, requested: &str, failure: AssetFailure) -> AssetResponse {
        let response = self.error_response(&failure);
        record(requested, &response, Instant::now());
        response
    }

    async fn serve(&self, requested: &str) -> Result<Asset, AssetFailure> {
        let resolved =
            path::validate(requested, &self.config.base_dir).map_err(AssetFailure::InvalidPath)?;
        let extension = format::extension_of(resolved.relative());

        match format::classify(extension.unwrap_or_default()) {
            FormatClassification::Unsupported => Err(AssetFailure::UnsupportedFormat {
                extension: extension.map(str::to_string),
            }),
            FormatClassification::Static(mime) => {
                let body = self.load(&resolved).await?;
                Ok(Asset {
                    body,
                    content_type: mime.to_string(),
                })
            }
            FormatClassification::Dynamic(diagram_type) => {
                let raw = self.load(&resolved).await?;
                let request = RenderRequest {
                    source: String::from_utf8_lossy(&raw).into_owned(),
                    diagram_type,
                };
                let rendered = self.renderer.render(&request).await?;
                Ok(Asset {
                    body: rendered.bytes,
                    content_type: rendered.content_type,
                })
            }
        }
    }

    async fn load(&self, resolved: &ResolvedPath) -> Result<Bytes, AssetFailure> {
        let absolute = resolved.absolute();
        let meta = self
            .files
            .stat(absolute)
            .await
            .map_err(|err| file_failure(resolved.relative(), err))?;
        if !meta.is_file {
            return Err(AssetFailure::FileNotFound {
                path: resolved.relative().to_string(),
            });
        }
        self.check_size(resolved.relative(), meta.len)?;

        let body = self
            .files
            .read(absolute)
            .await
            .map_err(|err| file_failure(resolved.relative(), err))?;
        // The file may have grown between stat and read.
        self.check_size(resolved.relative(), body.len() as u64)?;
        Ok(body)
    }

    fn check_size(&self, path: &str, actual: u64) -> Result<(), AssetFailure> {
        if actual > self.config.max_file_size {
            return Err(AssetFailure::FileTooLarge {
                path: path.to_string(),
                actual,
                limit: self.config.max_file_size,
            });
        }
        Ok(())
    }

    fn error_response(&self, failure: &AssetFailure) -> AssetResponse {
        let kind = failure.kind();
        let svg = self.error_images.render(kind, &failure.message());
        AssetResponse {
            body: Bytes::from(svg),
            content_type: ERROR_IMAGE_CONTENT_TYPE.to_string(),
            outcome: AssetOutcome::Error(kind),
            report: Some(ErrorReport::from_error(
                "application::pipeline::RequestPipeline",
                kind,
                failure,
            )),
        }
    }
}

fn record(requested: &str, response: &AssetResponse, started_at: Instant) {
    let kind = match response.outcome {
        AssetOutcome::Success => "none",
        AssetOutcome::Error(kind) => kind.code(),
    };
    counter!(
        METRIC_REQUESTS_TOTAL,
        "outcome" => response.outcome.status_label(),
        "kind" => kind
    )
    .increment(1);
    debug!(
        target = "application::pipeline",
        op = "pipeline::handle",
        result = response.outcome.status_label(),
        error_code = kind,
        path = requested,
        elapsed_ms = started_at.elapsed().as_millis() as u64,
        body_bytes = response.body.len(),
        "Request handled"
    );
}

fn file_failure(path: &str, err: FileError) -> AssetFailure {
    match err {
        FileError::NotFound | FileError::PermissionDenied => AssetFailure::FileNotFound {
            path: path.to_string(),
        },
        other => AssetFailure::Unreadable {
            path: path.to_string(),
            source: other,
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path, sync::Mutex, time::Duration};

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::{
        application::{
            files::FileMeta,
            kroki::{RenderFailure, RenderFailureKind, RenderResult},
        },
        infra::files::LocalFileSource,
    };

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

    enum Script {
        Succeed,
        Fail(RenderFailureKind, Option<&'static str>),
        Panic,
    }

    struct FakeRenderer {
        script: Script,
        calls: Mutex<Vec<RenderRequest>>,
    }

    impl FakeRenderer {
        fn new(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<RenderRequest> {
            self.calls.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl DiagramRenderer for FakeRenderer {
        async fn render(&self, request: &RenderRequest) -> Result<RenderResult, RenderFailure> {
            self.calls.lock().expect("lock").push(request.clone());
            match &self.script {
                Script::Succeed => Ok(RenderResult {
                    bytes: Bytes::from(format!("<svg>{}</svg>", request.diagram_type)),
                    content_type: "image/svg+xml".into(),
                }),
                Script::Fail(kind, Some(details)) => {
                    Err(RenderFailure::with_details(*kind, *details))
                }
                Script::Fail(kind, None) => Err(RenderFailure::new(*kind)),
                Script::Panic => panic!("renderer exploded"),
            }
        }
    }

    /// Reports a small file on stat but returns more bytes on read.
    struct GrowingFile;

    #[async_trait]
    impl FileSource for GrowingFile {
        async fn stat(&self, _path: &Path) -> Result<FileMeta, FileError> {
            Ok(FileMeta {
                len: 4,
                is_file: true,
            })
        }

        async fn read(&self, _path: &Path) -> Result<Bytes, FileError> {
            Ok(Bytes::from(vec![b'x'; 64]))
        }
    }

    struct Fixture {
        dir: TempDir,
        renderer: Arc<FakeRenderer>,
        pipeline: RequestPipeline,
    }

    fn fixture(script: Script) -> Fixture {
        let dir = TempDir::new().expect("temp dir");
        let renderer = FakeRenderer::new(script);
        let pipeline = RequestPipeline::new(
            PipelineConfig {
                base_dir: dir.path().to_path_buf(),
                max_file_size: 1024,
            },
            Arc::new(LocalFileSource::new(Duration::from_secs(5))),
            renderer.clone(),
            ErrorImageRenderer::default(),
        );
        Fixture {
            dir,
            renderer,
            pipeline,
        }
    }

    fn body_text(response: &AssetResponse) -> String {
        String::from_utf8_lossy(&response.body).into_owned()
    }

    #[tokio::test]
    async fn serves_static_images_verbatim() {
        let fx = fixture(Script::Succeed);
        fs::write(fx.dir.path().join("test.png"), PNG_MAGIC).expect("write");

        let response = fx.pipeline.handle("test.png").await;
        assert_eq!(response.outcome, AssetOutcome::Success);
        assert_eq!(response.content_type, "image/png");
        assert_eq!(response.body.as_ref(), PNG_MAGIC);
        assert!(response.report.is_none());
        assert!(fx.renderer.calls().is_empty());
    }

    #[tokio::test]
    async fn traversal_is_rejected_before_any_io() {
        let fx = fixture(Script::Succeed);
        let response = fx.pipeline.handle("../../etc/passwd").await;
        assert_eq!(response.outcome, AssetOutcome::Error(ErrorKind::PathTraversal));
        assert_eq!(response.content_type, "image/svg+xml");
        assert!(body_text(&response).contains("Invalid Path"));
        assert!(!body_text(&response).contains("root:"));
    }

    #[tokio::test]
    async fn empty_path_is_invalid() {
        let fx = fixture(Script::Succeed);
        let response = fx.pipeline.handle("").await;
        assert_eq!(response.outcome, AssetOutcome::Error(ErrorKind::PathTraversal));
    }

    #[tokio::test]
    async fn unsupported_extension_is_reported() {
        let fx = fixture(Script::Succeed);
        fs::write(fx.dir.path().join("data.xyz"), "x").expect("write");
        let response = fx.pipeline.handle("data.xyz").await;
        assert_eq!(
            response.outcome,
            AssetOutcome::Error(ErrorKind::UnsupportedFormat)
        );
        assert!(body_text(&response).contains(".xyz"));
    }

    #[tokio::test]
    async fn missing_file_names_the_request_path() {
        let fx = fixture(Script::Succeed);
        let response = fx.pipeline.handle("missing.puml").await;
        assert_eq!(response.outcome, AssetOutcome::Error(ErrorKind::FileNotFound));
        assert!(body_text(&response).contains("missing.puml"));
        assert!(fx.renderer.calls().is_empty());
    }

    #[tokio::test]
    async fn directories_count_as_missing() {
        let fx = fixture(Script::Succeed);
        fs::create_dir(fx.dir.path().join("folder.png")).expect("mkdir");
        let response = fx.pipeline.handle("folder.png").await;
        assert_eq!(response.outcome, AssetOutcome::Error(ErrorKind::FileNotFound));
    }

    #[tokio::test]
    async fn oversized_files_are_refused() {
        let fx = fixture(Script::Succeed);
        fs::write(fx.dir.path().join("big.png"), vec![0u8; 2048]).expect("write");
        let response = fx.pipeline.handle("big.png").await;
        assert_eq!(response.outcome, AssetOutcome::Error(ErrorKind::FileTooLarge));
        let svg = body_text(&response);
        assert!(svg.contains("2\u{a0}KiB"));
        assert!(svg.contains("1\u{a0}KiB."));
    }

    #[tokio::test]
    async fn size_is_rechecked_after_read() {
        let pipeline = RequestPipeline::new(
            PipelineConfig {
                base_dir: PathBuf::from("/srv/docs"),
                max_file_size: 16,
            },
            Arc::new(GrowingFile),
            FakeRenderer::new(Script::Succeed),
            ErrorImageRenderer::default(),
        );
        let response = pipeline.handle("flow.mmd").await;
        assert_eq!(response.outcome, AssetOutcome::Error(ErrorKind::FileTooLarge));
    }

    #[tokio::test]
    async fn dynamic_sources_are_rendered() {
        let fx = fixture(Script::Succeed);
        fs::create_dir_all(fx.dir.path().join("specs/diagrams")).expect("mkdir");
        fs::write(
            fx.dir.path().join("specs/diagrams/flow.MMD"),
            "graph TD; A-->B",
        )
        .expect("write");

        let response = fx.pipeline.handle("specs/diagrams/flow.MMD").await;
        assert_eq!(response.outcome, AssetOutcome::Success);
        assert_eq!(response.content_type, "image/svg+xml");
        assert_eq!(body_text(&response), "<svg>mermaid</svg>");

        let calls = fx.renderer.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].source, "graph TD; A-->B");
        assert_eq!(calls[0].diagram_type, "mermaid");
    }

    #[tokio::test]
    async fn invalid_utf8_sources_are_decoded_lossily() {
        let fx = fixture(Script::Succeed);
        fs::write(fx.dir.path().join("a.puml"), b"A -> B: \xff\xfe").expect("write");
        let response = fx.pipeline.handle("a.puml").await;
        assert_eq!(response.outcome, AssetOutcome::Success);
        assert!(fx.renderer.calls()[0].source.contains('\u{FFFD}'));
    }

    #[tokio::test]
    async fn syntax_errors_carry_service_text() {
        let fx = fixture(Script::Fail(
            RenderFailureKind::SyntaxError,
            Some("Syntax Error? (line 2)"),
        ));
        fs::write(fx.dir.path().join("bad.puml"), "@startuml\nA ->\n").expect("write");

        let response = fx.pipeline.handle("bad.puml").await;
        assert_eq!(response.outcome, AssetOutcome::Error(ErrorKind::SyntaxError));
        let svg = body_text(&response);
        assert!(svg.contains("Diagram Syntax Error"));
        assert!(svg.contains("Syntax Error? (line 2)"));
    }

    #[tokio::test]
    async fn service_failures_become_service_errors() {
        for kind in [
            RenderFailureKind::ConnectionError,
            RenderFailureKind::Timeout,
            RenderFailureKind::ServerError,
            RenderFailureKind::UnsupportedDiagramType,
        ] {
            let fx = fixture(Script::Fail(kind, None));
            fs::write(fx.dir.path().join("a.d2"), "a -> b").expect("write");
            let response = fx.pipeline.handle("a.d2").await;
            assert_eq!(
                response.outcome,
                AssetOutcome::Error(ErrorKind::ServiceError),
                "{kind}"
            );
            assert!(body_text(&response).contains("Kroki Service Error"));
        }
    }

    #[tokio::test]
    async fn panics_become_unknown_error_images() {
        let fx = fixture(Script::Panic);
        fs::write(fx.dir.path().join("a.puml"), "A -> B").expect("write");

        let response = fx.pipeline.handle("a.puml").await;
        assert_eq!(response.outcome, AssetOutcome::Error(ErrorKind::Unknown));
        assert!(!body_text(&response).contains("renderer exploded"));
        let report = response.report.expect("report");
        assert!(report.messages[0].contains("renderer exploded"));
    }

    #[tokio::test]
    async fn error_reports_name_the_kind() {
        let fx = fixture(Script::Succeed);
        let response = fx.pipeline.handle("/etc/passwd").await;
        let report = response.report.expect("report");
        assert_eq!(report.kind, ErrorKind::PathTraversal);
        assert_eq!(report.messages, ["invalid path: absolute path", "absolute path"]);
    }
}
