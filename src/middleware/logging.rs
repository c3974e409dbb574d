//! Request logging middleware.
//!
//! Emits one `tracing` event per request at `info` level, with method,
//! path, status, and latency. Decision-path logs are not sampled (they're
//! low-cardinality and there are far fewer of them than event-ingestion
//! traffic); the event endpoints apply their own sampling via
//! `analytics::LoggingAnalyticsSink` instead.

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

pub async fn request_logging(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    tracing::info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms,
        "request"
    );
    metrics::histogram!("http_request_duration_ms", elapsed_ms, "path" => path);

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request as HttpRequest, routing::get, Router};
    use tower::ServiceExt;

    async fn handler() -> &'static str {
        "ok"
    }

    #[tokio::test]
    async fn request_passes_through_unmodified() {
        let app = Router::new()
            .route("/", get(handler))
            .layer(axum::middleware::from_fn(request_logging));
        let response = app
            .oneshot(HttpRequest::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
}
