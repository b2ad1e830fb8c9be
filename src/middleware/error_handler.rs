use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::{debug, error};

const LOG_BODY_LIMIT: usize = 4096;

pub async fn log_errors(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;
    let status = response.status();

    if status.is_server_error() {
        let (mut parts, body) = response.into_parts();
        let bytes = match to_bytes(body, LOG_BODY_LIMIT).await {
            Ok(b) => b,
            Err(e) => {
                error!("Failed to read error response body: {}", e);
                return Response::from_parts(parts, Body::empty());
            }
        };

        error!(
            "Server error - {} {} -> {}, body: {}",
            method,
            path,
            status,
            String::from_utf8_lossy(&bytes)
        );

        // 读掉body后要重建响应
        parts.headers.remove(axum::http::header::CONTENT_LENGTH);
        return Response::from_parts(parts, Body::from(bytes));
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        debug!("Rejected request - {} {} -> {}", method, path, status);
    }

    response
}
