//! HTTP response building module
//!
//! Builders for the responses the server and its built-in handlers write.

use hyper::body::Bytes;
use hyper::header::{HeaderValue, ALLOW, CACHE_CONTROL};
use hyper::StatusCode;

use super::message::{Failure, FullResponse};

/// Plain-text response with the given status
pub fn build_text_response(status: StatusCode, body: impl Into<Bytes>) -> FullResponse {
    FullResponse::new(status).with_body("text/plain; charset=utf-8", body)
}

/// Build 400 Bad Request response
pub fn build_400_response() -> FullResponse {
    build_text_response(StatusCode::BAD_REQUEST, "400 Bad Request")
}

/// Build 404 Not Found response
pub fn build_404_response() -> FullResponse {
    build_text_response(StatusCode::NOT_FOUND, "404 Not Found")
}

/// Build 405 Method Not Allowed response
pub fn build_405_response(allow: &'static str) -> FullResponse {
    build_text_response(StatusCode::METHOD_NOT_ALLOWED, "405 Method Not Allowed")
        .with_header(ALLOW, HeaderValue::from_static(allow))
}

/// Build 413 Payload Too Large response
pub fn build_413_response() -> FullResponse {
    build_text_response(StatusCode::PAYLOAD_TOO_LARGE, "413 Payload Too Large")
}

/// Build 503 Service Unavailable response
pub fn build_503_response() -> FullResponse {
    build_text_response(StatusCode::SERVICE_UNAVAILABLE, "503 Service Unavailable")
}

/// Build 504 Gateway Timeout response
pub fn build_504_response() -> FullResponse {
    build_text_response(StatusCode::GATEWAY_TIMEOUT, "504 Gateway Timeout")
}

/// Response for a collaborator failure: its status, its reason as body
pub fn build_failure_response(failure: &Failure) -> FullResponse {
    build_text_response(failure.status, failure.reason.clone())
}

/// Health check response, never cached
pub fn build_health_response(status: &'static str) -> FullResponse {
    build_text_response(StatusCode::OK, status)
        .with_header(CACHE_CONTROL, HeaderValue::from_static("no-cache, no-store"))
}

/// 200 response carrying image bytes
pub fn build_image_response(content_type: &str, image: Bytes) -> FullResponse {
    FullResponse::new(StatusCode::OK)
        .with_body(content_type, image)
        .with_header(CACHE_CONTROL, HeaderValue::from_static("no-cache"))
}
