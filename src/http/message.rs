//! Aggregated HTTP messages carried on the bus

use std::fmt;

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, SERVER};
use hyper::{HeaderMap, Method, Request, Response, StatusCode, Uri, Version};

use crate::bus::{EventBus, Selector};
use crate::error::DispatchError;

/// Bus used by the server: requests go out, responses or failures come back.
pub type HttpBus = EventBus<Payload>;

/// Everything that travels on an [`HttpBus`].
#[derive(Debug, Clone)]
pub enum Payload {
    Request(FullRequest),
    Response(FullResponse),
    Failure(Failure),
}

/// A request whose body has been read completely into memory.
#[derive(Debug, Clone)]
pub struct FullRequest {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl FullRequest {
    pub fn selector(&self) -> Selector {
        Selector::from_uri(&self.uri)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE)?.to_str().ok()
    }
}

/// A complete response produced by a collaborator or the error sink.
#[derive(Debug, Clone)]
pub struct FullResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl FullResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the body and its Content-Type. An unrepresentable content type
    /// falls back to `application/octet-stream`.
    #[must_use]
    pub fn with_body(self, content_type: &str, body: impl Into<Bytes>) -> Self {
        let value = HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
        let mut response = self.with_header(CONTENT_TYPE, value);
        response.body = body.into();
        response
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE)?.to_str().ok()
    }

    /// Convert into the hyper response written to the connection.
    pub fn into_hyper(self, server_name: &str) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        if let Ok(value) = HeaderValue::from_str(server_name) {
            response.headers_mut().insert(SERVER, value);
        }
        response
    }
}

/// A collaborator's answer when it cannot produce a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub status: StatusCode,
    pub reason: String,
}

impl Failure {
    pub fn new(status: StatusCode, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status.as_u16(), self.reason)
    }
}

/// Declared Content-Length, if present and valid
fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Collect a streamed request into a [`FullRequest`] of at most
/// `max_body_size` body bytes.
///
/// A declared Content-Length above the limit is rejected before any of
/// the body is read.
pub async fn aggregate<B>(req: Request<B>, max_body_size: u64) -> Result<FullRequest, DispatchError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    if declared_length(req.headers()).is_some_and(|size| size > max_body_size) {
        return Err(DispatchError::PayloadTooLarge {
            limit: max_body_size,
        });
    }

    let (parts, body) = req.into_parts();
    let limit = usize::try_from(max_body_size).unwrap_or(usize::MAX);
    let collected = Limited::new(body, limit).collect().await.map_err(|err| {
        if err.downcast_ref::<LengthLimitError>().is_some() {
            DispatchError::PayloadTooLarge {
                limit: max_body_size,
            }
        } else {
            DispatchError::BodyRead(err.to_string())
        }
    })?;

    Ok(FullRequest {
        method: parts.method,
        uri: parts.uri,
        version: parts.version,
        headers: parts.headers,
        body: collected.to_bytes(),
    })
}
