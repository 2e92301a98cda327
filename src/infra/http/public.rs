use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{Path, State, rejection::PathRejection},
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::application::{
    error::AssetFailure,
    pipeline::{AssetOutcome, AssetResponse, RequestPipeline},
};

use super::middleware::{log_responses, set_request_context};

pub const HEADER_STATUS: &str = "x-livedoc-status";
pub const HEADER_ERROR: &str = "x-livedoc-error";

#[derive(Clone)]
pub struct HttpState {
    pub pipeline: Arc<RequestPipeline>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/favicon.ico", get(favicon))
        .route("/{*path}", get(serve_asset))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn index(State(state): State<HttpState>) -> Response {
    asset_response(state.pipeline.handle("").await)
}

async fn serve_asset(
    State(state): State<HttpState>,
    path: Result<Path<String>, PathRejection>,
) -> Response {
    match path {
        Ok(Path(path)) => asset_response(state.pipeline.handle(&path).await),
        Err(rejection) => asset_response(state.pipeline.reject(
            "",
            AssetFailure::MalformedPath {
                detail: rejection.body_text(),
            },
        )),
    }
}

async fn favicon() -> Response {
    StatusCode::NOT_FOUND.into_response()
}

/// Convert a pipeline result into a `200 OK` response carrying the outcome headers.
pub fn asset_response(asset: AssetResponse) -> Response {
    let mut response = Response::new(Body::from(asset.body));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    let content_type = HeaderValue::from_str(&asset.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    headers.insert(CONTENT_TYPE, content_type);
    headers.insert(
        HEADER_STATUS,
        HeaderValue::from_static(asset.outcome.status_label()),
    );
    if let AssetOutcome::Error(kind) = asset.outcome {
        headers.insert(HEADER_ERROR, HeaderValue::from_static(kind.code()));
    }
    set_no_store(&mut response);

    if let Some(report) = asset.report {
        report.attach(&mut response);
    }
    response
}

fn set_no_store(response: &mut Response) {
    let value = HeaderValue::from_static("no-store");
    response.headers_mut().insert(CACHE_CONTROL, value);
}
