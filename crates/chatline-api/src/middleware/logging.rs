use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

/// Request logging middleware
pub async fn log_request(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let start = Instant::now();

    let response = next.run(req).await;

    // Streaming responses are logged when headers go out, not when the body ends
    tracing::info!(
        method = %method,
        uri = %uri,
        status = %response.status(),
        duration_ms = %start.elapsed().as_millis(),
        "Request processed"
    );

    response
}
