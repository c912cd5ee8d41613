use axum::http::HeaderValue;
use axum::{extract::Request, middleware::Next, response::Response};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Resolve the request id: reuse a caller-supplied header, otherwise mint one.
pub fn resolve_request_id(req: &Request) -> String {
    req.headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = resolve_request_id(&req);

    match HeaderValue::from_str(&request_id) {
        Ok(header_value) => {
            req.headers_mut()
                .insert(REQUEST_ID_HEADER, header_value.clone());

            let mut response = next.run(req).await;
            response
                .headers_mut()
                .insert(REQUEST_ID_HEADER, header_value);
            response
        }
        Err(_) => next.run(req).await,
    }
}
