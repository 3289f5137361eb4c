//! HTTP surface.
//!
//! `POST /` and `POST /execute` accept an execution request and always reply
//! `200 OK` with one JSON object followed by a newline; failures are reported
//! inside the object, including bodies over the configured size limit.
//! `GET /health` replies `ok` whatever the sandbox state.

use crate::error::GlasshouseError;
use crate::service::ExecutionService;
use crate::types::{ExecutionId, ExecutionRequest, ExecutionResult};
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use tokio::net::TcpListener;

/// Request and response header carrying the execution id.
pub const EXECUTION_ID_HEADER: &str = "x-execution-id";

/// Builds the router, accepting request bodies up to `max_body_bytes`.
pub fn router(service: ExecutionService, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", post(execute))
        .route("/execute", post(execute))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(service)
}

/// Serves the router on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns the I/O error that stopped the server.
pub async fn serve<F>(
    listener: TcpListener,
    service: ExecutionService,
    max_body_bytes: usize,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, max_body_bytes, "listening");
    }
    axum::serve(listener, router(service, max_body_bytes))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health() -> &'static str {
    "ok"
}

async fn execute(
    State(service): State<ExecutionService>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let id = headers
        .get(EXECUTION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| ExecutionId::parse(value).ok())
        .unwrap_or_default();

    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            let reason = rejection.body_text();
            tracing::warn!(
                execution_id = %id,
                status = %rejection.status(),
                %reason,
                "request body rejected"
            );
            let error = GlasshouseError::parsing(format!("request body rejected: {reason}"));
            return json_reply(&id, &ExecutionResult::from_error(&error));
        }
    };

    let result = match serde_json::from_slice::<ExecutionRequest>(&body) {
        Ok(request) => service.submit_with_id(id.clone(), request).await,
        Err(e) => {
            tracing::warn!(execution_id = %id, error = %e, "unparseable request body");
            ExecutionResult::from_error(&GlasshouseError::parsing(format!(
                "request body is not a valid execution request: {e}"
            )))
        }
    };

    json_reply(&id, &result)
}

fn json_reply(id: &ExecutionId, result: &ExecutionResult) -> Response {
    let mut body = serde_json::to_vec(result).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to serialize result");
        br#"{"success":false,"output_files":[],"error":{"type":"InternalError","message":"failed to serialize result"},"std_out":"","std_err":"","code_runtime":0}"#
            .to_vec()
    });
    body.push(b'\n');

    let mut response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response();
    if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
        response.headers_mut().insert(EXECUTION_ID_HEADER, value);
    }
    response
}
