use std::{
    fmt,
    io::Write,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use bytes::Bytes;
use flate2::{Compression, write::ZlibEncoder};
use metrics::{counter, histogram};
use reqwest::{Client, StatusCode, header::CONTENT_TYPE};
use thiserror::Error;
use tracing::{info, warn};

pub const METRIC_RENDER_DURATION_MS: &str = "livedoc_render_duration_ms";
pub const METRIC_RENDER_FAILURES_TOTAL: &str = "livedoc_render_failures_total";

const DEFAULT_CONTENT_TYPE: &str = "image/svg+xml";

/// Diagram source paired with the remote type identifier it is written in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub source: String,
    pub diagram_type: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderResult {
    pub bytes: Bytes,
    pub content_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderFailureKind {
    SyntaxError,
    UnsupportedDiagramType,
    ServerError,
    ConnectionError,
    Timeout,
    UnknownError,
}

impl RenderFailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RenderFailureKind::SyntaxError => "syntax_error",
            RenderFailureKind::UnsupportedDiagramType => "unsupported_diagram_type",
            RenderFailureKind::ServerError => "server_error",
            RenderFailureKind::ConnectionError => "connection_error",
            RenderFailureKind::Timeout => "timeout",
            RenderFailureKind::UnknownError => "unknown_error",
        }
    }

    fn describe(self) -> &'static str {
        match self {
            RenderFailureKind::SyntaxError => "diagram source rejected",
            RenderFailureKind::UnsupportedDiagramType => "diagram type not supported by service",
            RenderFailureKind::ServerError => "rendering service error",
            RenderFailureKind::ConnectionError => "rendering service unreachable",
            RenderFailureKind::Timeout => "rendering service timed out",
            RenderFailureKind::UnknownError => "unexpected rendering service response",
        }
    }
}

impl fmt::Display for RenderFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified outcome of a render attempt that produced no image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}{}", .kind.describe(), .details.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
pub struct RenderFailure {
    pub kind: RenderFailureKind,
    pub details: Option<String>,
}

impl RenderFailure {
    pub fn new(kind: RenderFailureKind) -> Self {
        Self {
            kind,
            details: None,
        }
    }

    pub fn with_details(kind: RenderFailureKind, details: impl Into<String>) -> Self {
        let details = details.into();
        let details = details.trim();
        Self {
            kind,
            details: (!details.is_empty()).then(|| details.to_string()),
        }
    }
}

/// Turns diagram source into image bytes.
#[async_trait]
pub trait DiagramRenderer: Send + Sync {
    async fn render(&self, request: &RenderRequest) -> Result<RenderResult, RenderFailure>;
}

/// Compress `source` with DEFLATE (zlib framing) and encode it as unpadded base64url.
pub fn encode_diagram(source: &str) -> std::io::Result<String> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(source.as_bytes())?;
    let compressed = encoder.finish()?;
    Ok(URL_SAFE_NO_PAD.encode(compressed))
}

/// Renders diagrams through a Kroki-compatible HTTP service, one attempt per call.
#[derive(Debug, Clone)]
pub struct KrokiClient {
    http: Client,
    base_url: String,
    timeout: Duration,
}

impl KrokiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .user_agent(concat!("livedoc/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self::with_client(http, base_url, timeout))
    }

    fn with_client(http: Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// URL for `request`; identical source and type always yield the same URL.
    pub fn render_url(&self, request: &RenderRequest) -> std::io::Result<String> {
        let encoded = encode_diagram(&request.source)?;
        Ok(format!(
            "{}/{}/svg/{}",
            self.base_url, request.diagram_type, encoded
        ))
    }

    async fn exchange(&self, url: &str) -> Result<RenderResult, RenderFailure> {
        let response = self.http.get(url).send().await.map_err(classify_transport)?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(classify_transport)?;

        if status.is_success() {
            return Ok(RenderResult {
                bytes: body,
                content_type: content_type.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            });
        }

        let text = String::from_utf8_lossy(&body);
        Err(classify_status(status, content_type.as_deref(), &text))
    }
}

#[async_trait]
impl DiagramRenderer for KrokiClient {
    async fn render(&self, request: &RenderRequest) -> Result<RenderResult, RenderFailure> {
        let started_at = Instant::now();
        let url = self.render_url(request).map_err(|err| {
            RenderFailure::with_details(RenderFailureKind::UnknownError, err.to_string())
        })?;

        // Dropping the exchange future on expiry aborts the in-flight request.
        let outcome = match tokio::time::timeout(self.timeout, self.exchange(&url)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(RenderFailure::with_details(
                RenderFailureKind::Timeout,
                format!("no response within {} ms", self.timeout.as_millis()),
            )),
        };

        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        histogram!(METRIC_RENDER_DURATION_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

        match &outcome {
            Ok(result) => info!(
                target = "application::kroki",
                op = "kroki::render",
                result = "ok",
                diagram_type = request.diagram_type,
                elapsed_ms,
                source_bytes = request.source.len(),
                image_bytes = result.bytes.len(),
                "Diagram rendered"
            ),
            Err(failure) => {
                counter!(METRIC_RENDER_FAILURES_TOTAL, "kind" => failure.kind.as_str())
                    .increment(1);
                warn!(
                    target = "application::kroki",
                    op = "kroki::render",
                    result = "error",
                    diagram_type = request.diagram_type,
                    elapsed_ms,
                    error_code = failure.kind.as_str(),
                    error = %failure,
                    "Diagram rendering failed"
                );
            }
        }

        outcome
    }
}

fn classify_status(status: StatusCode, content_type: Option<&str>, body: &str) -> RenderFailure {
    match status {
        StatusCode::BAD_REQUEST if is_plain_text(content_type) => {
            RenderFailure::with_details(RenderFailureKind::SyntaxError, body)
        }
        StatusCode::NOT_FOUND => RenderFailure::new(RenderFailureKind::UnsupportedDiagramType),
        status if status.is_server_error() => RenderFailure::with_details(
            RenderFailureKind::ServerError,
            status_details(status, body),
        ),
        status => RenderFailure::with_details(
            RenderFailureKind::UnknownError,
            status_details(status, body),
        ),
    }
}

fn is_plain_text(content_type: Option<&str>) -> bool {
    content_type.is_none_or(|value| value.trim_start().to_ascii_lowercase().starts_with("text/"))
}

fn status_details(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("HTTP {}: {body}", status.as_u16())
    }
}

fn classify_transport(err: reqwest::Error) -> RenderFailure {
    let kind = if err.is_timeout() {
        RenderFailureKind::Timeout
    } else if err.is_connect() {
        RenderFailureKind::ConnectionError
    } else if err.is_decode() || err.is_body() {
        RenderFailureKind::UnknownError
    } else {
        RenderFailureKind::ConnectionError
    };
    RenderFailure::with_details(kind, err.to_string())
}
