// agentgate-server/src/middleware.rs
// ============================================================================
// Module: HTTP Middleware
// Description: Correlation-id assignment and request-size guarding.
// Purpose: Apply cross-cutting request shaping ahead of route handlers.
// Dependencies: axum
// ============================================================================

//! ## Overview
//! `X-Correlation-ID` is assigned when absent and echoed back on the
//! response. Oversize bodies are rejected with `413` before the body is
//! parsed by any handler.

use axum::body::Body;
use axum::extract::Request;
use axum::http::HeaderName;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;
use uuid::Uuid;

/// Hard cap on request bodies, per the backpressure contract.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

static CORRELATION_HEADER: HeaderName = HeaderName::from_static("x-correlation-id");

/// Assigns `X-Correlation-ID` when the request didn't supply one, and
/// echoes the chosen value on the response.
pub async fn correlation_id(mut request: Request, next: Next) -> Response {
    let correlation_id = request
        .headers()
        .get(&CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);
    let Ok(header_value) = HeaderValue::from_str(&correlation_id) else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "invalid correlation id").into_response();
    };
    request.headers_mut().insert(CORRELATION_HEADER.clone(), header_value.clone());
    let mut response = next.run(request).await;
    response.headers_mut().insert(CORRELATION_HEADER.clone(), header_value);
    response
}

/// Rejects bodies larger than [`MAX_BODY_BYTES`] with `413` before any
/// handler parses them.
pub async fn limit_body_size(request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES + 1).await {
        Ok(bytes) => bytes,
        Err(_) => return (StatusCode::PAYLOAD_TOO_LARGE, "request body exceeds limit").into_response(),
    };
    if bytes.len() > MAX_BODY_BYTES {
        return (StatusCode::PAYLOAD_TOO_LARGE, "request body exceeds limit").into_response();
    }
    let request = Request::from_parts(parts, Body::from(bytes));
    next.run(request).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, reason = "Test-only assertions are permitted.")]
mod tests {
    use axum::body::to_bytes;
    use axum::body::Bytes;
    use axum::routing::post;
    use axum::Router;
    use tower::ServiceExt;

    use super::*;

    #[tokio::test]
    async fn oversize_body_is_rejected() {
        let app = Router::new().route("/echo", post(|body: Bytes| async move { body })).layer(axum::middleware::from_fn(limit_body_size));
        let body = vec![0u8; MAX_BODY_BYTES + 10];
        let request = Request::builder().method("POST").uri("/echo").body(Body::from(body)).expect("builds request");
        let response = app.oneshot(request).await.expect("serves");
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn correlation_id_is_assigned_when_absent() {
        let app = Router::new().route("/ping", axum::routing::get(|| async { "pong" })).layer(axum::middleware::from_fn(correlation_id));
        let request = Request::builder().uri("/ping").body(Body::empty()).expect("builds request");
        let response = app.oneshot(request).await.expect("serves");
        assert!(response.headers().contains_key("x-correlation-id"));
        let _ = to_bytes(response.into_body(), usize::MAX).await;
    }
}
