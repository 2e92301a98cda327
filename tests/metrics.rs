use std::{collections::HashSet, fs, sync::Arc, time::Duration};

use livedoc::{
    application::{
        error_image::ErrorImageRenderer,
        kroki::KrokiClient,
        pipeline::{PipelineConfig, RequestPipeline},
    },
    infra::{files::LocalFileSource, telemetry},
};
use metrics_util::debugging::DebuggingRecorder;
use tempfile::TempDir;

#[tokio::test]
async fn pipeline_emits_request_and_render_metrics() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    telemetry::describe_metrics();

    let refused = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let kroki_url = format!("http://{}", refused.local_addr().expect("addr"));
    drop(refused);

    let dir = TempDir::new().expect("temp dir");
    fs::write(dir.path().join("ok.png"), b"\x89PNG").expect("write");
    fs::write(dir.path().join("flow.mmd"), "graph TD; A-->B").expect("write");

    let pipeline = RequestPipeline::new(
        PipelineConfig {
            base_dir: dir.path().to_path_buf(),
            max_file_size: 1024,
        },
        Arc::new(LocalFileSource::new(Duration::from_secs(5))),
        Arc::new(KrokiClient::new(&kroki_url, Duration::from_secs(5)).expect("client")),
        ErrorImageRenderer::default(),
    );

    pipeline.handle("ok.png").await;
    pipeline.handle("missing.png").await;
    pipeline.handle("flow.mmd").await;

    let keys: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(key, _, _, _)| {
            let key = key.key();
            let mut labels: Vec<String> = key
                .labels()
                .map(|label| format!("{}={}", label.key(), label.value()))
                .collect();
            labels.sort();
            format!("{}[{}]", key.name(), labels.join(","))
        })
        .collect();

    for expected in [
        "livedoc_requests_total[kind=none,outcome=success]",
        "livedoc_requests_total[kind=FILE_NOT_FOUND,outcome=error]",
        "livedoc_requests_total[kind=KROKI_ERROR,outcome=error]",
        "livedoc_render_failures_total[kind=connection_error]",
        "livedoc_render_duration_ms[]",
    ] {
        assert!(keys.contains(expected), "missing {expected} in {keys:?}");
    }
}
