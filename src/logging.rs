//! Request Logging Middleware
//!
//! Captures the status code and latency of every request, and isolates
//! handler panics so a single bad request answers 500 instead of tearing
//! down the connection.

use std::time::Instant;

use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

/// Wraps the route stack. Register with `axum::middleware::from_fn`.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    // Running the handler on its own task turns a panic into a join error.
    let response = match tokio::spawn(next.run(request)).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("Handler panicked on {} {}: {}", method, path, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    };

    tracing::info!(
        "{} {} {} {:?}",
        response.status().as_u16(),
        method,
        path,
        start.elapsed()
    );
    response
}
