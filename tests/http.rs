use std::{fs, sync::Arc, time::Duration};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header::CONTENT_TYPE},
};
use httpmock::prelude::*;
use livedoc::{
    application::{
        error_image::ErrorImageRenderer,
        kroki::{KrokiClient, RenderRequest},
        pipeline::{PipelineConfig, RequestPipeline},
    },
    infra::{
        files::LocalFileSource,
        http::{HEADER_ERROR, HEADER_STATUS, HttpState, build_router},
    },
};
use tempfile::TempDir;
use tower::ServiceExt;

const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0";

struct TestApp {
    dir: TempDir,
    router: Router,
}

fn app_with_kroki(kroki_url: &str, timeout: Duration) -> TestApp {
    let dir = TempDir::new().expect("temp dir");
    let renderer = KrokiClient::new(kroki_url, timeout).expect("kroki client");
    let pipeline = RequestPipeline::new(
        PipelineConfig {
            base_dir: dir.path().to_path_buf(),
            max_file_size: 1024 * 1024,
        },
        Arc::new(LocalFileSource::new(Duration::from_secs(5))),
        Arc::new(renderer),
        ErrorImageRenderer::default(),
    );
    let router = build_router(HttpState {
        pipeline: Arc::new(pipeline),
    });
    TestApp { dir, router }
}

fn app() -> TestApp {
    // Nothing listens here; tests using this app never reach the renderer.
    app_with_kroki("http://127.0.0.1:9", Duration::from_secs(1))
}

struct Reply {
    status: StatusCode,
    content_type: Option<String>,
    cache_control: Option<String>,
    livedoc_status: Option<String>,
    livedoc_error: Option<String>,
    body: Vec<u8>,
}

impl Reply {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

async fn get(router: &Router, uri: &str) -> Reply {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    let header = |name: &str| {
        response
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    let status = response.status();
    let content_type = header(CONTENT_TYPE.as_str());
    let cache_control = header("cache-control");
    let livedoc_status = header(HEADER_STATUS);
    let livedoc_error = header(HEADER_ERROR);
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body")
        .to_vec();

    Reply {
        status,
        content_type,
        cache_control,
        livedoc_status,
        livedoc_error,
        body,
    }
}

#[tokio::test]
async fn existing_static_image_is_served() {
    let app = app();
    fs::write(app.dir.path().join("test.png"), PNG_BYTES).expect("write");

    let reply = get(&app.router, "/test.png").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.content_type.as_deref(), Some("image/png"));
    assert_eq!(reply.livedoc_status.as_deref(), Some("success"));
    assert_eq!(reply.livedoc_error, None);
    assert_eq!(reply.cache_control.as_deref(), Some("no-store"));
    assert_eq!(reply.body, PNG_BYTES);
}

#[tokio::test]
async fn missing_diagram_yields_not_found_image() {
    let app = app();
    let reply = get(&app.router, "/missing.puml").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.content_type.as_deref(), Some("image/svg+xml"));
    assert_eq!(reply.livedoc_status.as_deref(), Some("error"));
    assert_eq!(reply.livedoc_error.as_deref(), Some("FILE_NOT_FOUND"));
    assert_eq!(reply.cache_control.as_deref(), Some("no-store"));
    assert!(reply.text().contains("File Not Found"));
}

#[tokio::test]
async fn traversal_yields_invalid_path_image() {
    let app = app();
    for uri in ["/../../etc/passwd", "/docs/%2e%2e/%2e%2e/etc/passwd"] {
        let reply = get(&app.router, uri).await;
        assert_eq!(reply.status, StatusCode::OK, "{uri}");
        assert_eq!(
            reply.livedoc_error.as_deref(),
            Some("PATH_TRAVERSAL"),
            "{uri}"
        );
        assert!(!reply.text().contains("root:"));
    }
}

#[tokio::test]
async fn unknown_extension_yields_unsupported_image() {
    let app = app();
    let reply = get(&app.router, "/diagram.xyz").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.livedoc_error.as_deref(), Some("UNSUPPORTED_FORMAT"));
    assert!(reply.text().contains("Unsupported Format"));
}

#[tokio::test]
async fn favicon_is_an_empty_not_found() {
    let app = app();
    let reply = get(&app.router, "/favicon.ico").await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert!(reply.body.is_empty());
    assert_eq!(reply.livedoc_status, None);
}

#[tokio::test]
async fn root_yields_invalid_path_image() {
    let app = app();
    let reply = get(&app.router, "/").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.livedoc_error.as_deref(), Some("PATH_TRAVERSAL"));
}

#[tokio::test]
async fn undecodable_path_yields_invalid_path_image() {
    let app = app();
    let reply = get(&app.router, "/bad%FFname.png").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.content_type.as_deref(), Some("image/svg+xml"));
    assert_eq!(reply.livedoc_error.as_deref(), Some("PATH_TRAVERSAL"));
}

#[tokio::test]
async fn percent_encoded_names_are_decoded() {
    let app = app();
    fs::write(app.dir.path().join("my diagram.png"), PNG_BYTES).expect("write");
    let reply = get(&app.router, "/my%20diagram.png").await;
    assert_eq!(reply.livedoc_status.as_deref(), Some("success"));
}

#[tokio::test]
async fn oversized_file_yields_too_large_image() {
    let app = app();
    fs::write(app.dir.path().join("huge.png"), vec![0u8; 2 * 1024 * 1024]).expect("write");
    let reply = get(&app.router, "/huge.png").await;
    assert_eq!(reply.livedoc_error.as_deref(), Some("FILE_TOO_LARGE"));
    let svg = reply.text();
    assert!(svg.contains("2\u{a0}MiB"));
    assert!(svg.contains("1\u{a0}MiB."));
}

#[tokio::test]
async fn diagram_is_rendered_through_kroki() {
    let server = MockServer::start_async().await;
    let app = app_with_kroki(&server.base_url(), Duration::from_secs(5));
    let source = "@startuml\nAlice -> Bob: hello\n@enduml\n";
    fs::create_dir_all(app.dir.path().join("specs/001")).expect("mkdir");
    fs::write(app.dir.path().join("specs/001/sequence.puml"), source).expect("write");

    let expected_path = KrokiClient::new(&server.base_url(), Duration::from_secs(5))
        .expect("client")
        .render_url(&RenderRequest {
            source: source.to_string(),
            diagram_type: "plantuml",
        })
        .expect("url")
        .trim_start_matches(&server.base_url())
        .to_string();

    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path(expected_path.clone());
            then.status(200)
                .header("content-type", "image/svg+xml")
                .body("<svg>sequence</svg>");
        })
        .await;

    let reply = get(&app.router, "/specs/001/sequence.puml").await;
    mock.assert_async().await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.livedoc_status.as_deref(), Some("success"));
    assert_eq!(reply.content_type.as_deref(), Some("image/svg+xml"));
    assert_eq!(reply.text(), "<svg>sequence</svg>");
}

#[tokio::test]
async fn kroki_syntax_error_is_drawn_into_the_image() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path_prefix("/mermaid/svg/");
            then.status(400)
                .header("content-type", "text/plain")
                .body("Parse error on line 2");
        })
        .await;

    let app = app_with_kroki(&server.base_url(), Duration::from_secs(5));
    fs::write(app.dir.path().join("flow.mmd"), "graph TD\n  A--").expect("write");

    let reply = get(&app.router, "/flow.mmd").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.livedoc_error.as_deref(), Some("SYNTAX_ERROR"));
    let svg = reply.text();
    assert!(svg.contains("Diagram Syntax Error"));
    assert!(svg.contains("Parse error on line 2"));
}

#[tokio::test]
async fn unreachable_kroki_yields_service_error_image() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let app = app_with_kroki(&format!("http://{addr}"), Duration::from_secs(5));
    fs::write(app.dir.path().join("graph.dot"), "digraph { a -> b }").expect("write");

    let reply = get(&app.router, "/graph.dot").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.livedoc_error.as_deref(), Some("KROKI_ERROR"));
    assert!(reply.text().contains("Kroki Service Error"));
}

#[tokio::test]
async fn redirecting_kroki_yields_service_error_image() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path_prefix("/plantuml/svg/");
            then.status(302).header("location", "/login");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/login");
            then.status(200)
                .header("content-type", "text/html")
                .body("<html>login page</html>");
        })
        .await;

    let app = app_with_kroki(&server.base_url(), Duration::from_secs(5));
    fs::write(app.dir.path().join("a.puml"), "A -> B").expect("write");

    let reply = get(&app.router, "/a.puml").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.content_type.as_deref(), Some("image/svg+xml"));
    assert_eq!(reply.livedoc_error.as_deref(), Some("KROKI_ERROR"));
    assert!(!reply.text().contains("login page"));
}
