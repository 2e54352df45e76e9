//! HTTP binding.
//!
//! Every request, whatever its path or method, is handed to a
//! [`RequestHandler`]; the resolved triple is written back as JSON.

use crate::engine::RequestHandler;
use crate::request::MockRequest;
use crate::response::ResolvedResponse;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{info, warn};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<dyn RequestHandler>,
}

/// Build the router: a single fallback handler plus tracing and panic recovery.
pub fn router(handler: Arc<dyn RequestHandler>) -> Router {
    Router::new()
        .fallback(mock_handler)
        .with_state(AppState { handler })
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
}

/// Serve until Ctrl-C.
pub async fn serve(listener: TcpListener, handler: Arc<dyn RequestHandler>) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!(address = %addr, "HTTP server starting");

    axum::serve(listener, router(handler))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

async fn mock_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = MockRequest::from_parts(
        method.as_str(),
        uri.path(),
        uri.query(),
        flatten_headers(&headers),
        &body,
    );

    into_http_response(state.handler.handle(request).await)
}

/// Flatten a header map to single values (first value wins).
fn flatten_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .keys()
        .filter_map(|name| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

/// Apply status and headers, then serialize the body.
pub fn into_http_response(resolved: ResolvedResponse) -> Response {
    let status = StatusCode::from_u16(resolved.status).unwrap_or_else(|_| {
        warn!(status = resolved.status, "Invalid status code in rule, serving 500");
        StatusCode::INTERNAL_SERVER_ERROR
    });

    let body = match serde_json::to_vec(&resolved.body) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "Failed to serialize response body");
            return generic_error();
        }
    };

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    let response_headers = response.headers_mut();
    response_headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

    for (name, value) in &resolved.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                response_headers.insert(name, value);
            }
            _ => warn!(header = %name, "Skipping invalid response header"),
        }
    }

    response
}

fn generic_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, "application/json")],
        r#"{"error":"Internal Server Error","message":"Something went wrong"}"#,
    )
        .into_response()
}

fn panic_response(_panic: Box<dyn Any + Send + 'static>) -> Response {
    warn!("Handler panicked, serving 500");
    generic_error()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    /// Reflects what the transport handed over.
    struct Reflect;

    #[async_trait]
    impl RequestHandler for Reflect {
        async fn handle(&self, request: MockRequest) -> ResolvedResponse {
            if request.path == "/panic" {
                panic!("boom");
            }
            let mut headers = HashMap::new();
            headers.insert("X-Mock".to_string(), "reflect".to_string());
            headers.insert("bad header".to_string(), "x".to_string());
            ResolvedResponse {
                status: if request.path == "/weird" { 1000 } else { 202 },
                headers,
                body: json!({
                    "method": request.method,
                    "path": request.path,
                    "query": request.query,
                    "role": request.header("role"),
                    "body": request.body,
                }),
            }
        }
    }

    async fn send(request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let response = router(Arc::new(Reflect)).oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_request_is_translated() {
        let request = Request::builder()
            .method("POST")
            .uri("/users/7?page=2")
            .header("Role", "guest")
            .body(Body::from(r#"{"name":"Ann"}"#))
            .unwrap();

        let (status, headers, body) = send(request).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(headers["content-type"], "application/json");
        assert_eq!(headers["x-mock"], "reflect");
        assert_eq!(body["method"], "POST");
        assert_eq!(body["path"], "/users/7");
        assert_eq!(body["query"]["page"], "2");
        assert_eq!(body["role"], "guest");
        assert_eq!(body["body"]["name"], "Ann");
    }

    #[tokio::test]
    async fn test_invalid_status_becomes_500() {
        let request = Request::builder().uri("/weird").body(Body::empty()).unwrap();
        let (status, _, body) = send(request).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["path"], "/weird");
    }

    #[tokio::test]
    async fn test_panic_becomes_generic_500() {
        let request = Request::builder().uri("/panic").body(Body::empty()).unwrap();
        let (status, _, body) = send(request).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal Server Error");
    }
}
