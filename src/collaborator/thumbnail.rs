//! Thumbnail endpoints
//!
//! `POST {upload_path}` turns the uploaded image into a thumbnail through a
//! [`Thumbnailer`] and replies with it; `GET {image_path}` serves the most
//! recent one.

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use hyper::body::Bytes;
use hyper::{Method, StatusCode};
use thiserror::Error;

use crate::bus::{Event, Selector};
use crate::config::ThumbnailConfig;
use crate::http::{response, Failure, HttpBus, Payload};
use crate::logger;

/// A produced thumbnail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub content_type: String,
    pub data: Bytes,
}

#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("unsupported image type '{0}'")]
    Unsupported(String),

    #[error("thumbnail generation failed: {0}")]
    Failed(String),
}

/// The capability that actually shrinks images.
///
/// Implementations may take as long as they need; they run on their own
/// task, never on the connection that published the upload.
pub trait Thumbnailer: Send + Sync + 'static {
    fn thumbnail(
        &self,
        image: Bytes,
        content_type: String,
    ) -> impl Future<Output = Result<Thumbnail, ThumbnailError>> + Send;
}

/// Returns the uploaded image unchanged. Stands in until a real
/// resizing backend is plugged in.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughThumbnailer;

impl Thumbnailer for PassthroughThumbnailer {
    fn thumbnail(
        &self,
        image: Bytes,
        content_type: String,
    ) -> impl Future<Output = Result<Thumbnail, ThumbnailError>> + Send {
        std::future::ready(Ok(Thumbnail {
            content_type,
            data: image,
        }))
    }
}

/// Upload and download endpoints sharing the latest thumbnail.
pub struct ThumbnailApi<T> {
    thumbnailer: T,
    latest: RwLock<Option<Thumbnail>>,
    upload: Selector,
    image: Selector,
}

impl<T: Thumbnailer> ThumbnailApi<T> {
    pub fn new(thumbnailer: T, config: &ThumbnailConfig) -> Arc<Self> {
        Arc::new(Self {
            thumbnailer,
            latest: RwLock::new(None),
            upload: Selector::new(&config.upload_path),
            image: Selector::new(&config.image_path),
        })
    }

    /// Bind both endpoints on `bus`.
    pub fn register(self: &Arc<Self>, bus: &Arc<HttpBus>) {
        let api = Arc::clone(self);
        let responder = Arc::downgrade(bus);
        bus.on(self.upload.clone(), move |event| api.on_upload(&responder, event));

        let api = Arc::clone(self);
        let responder = Arc::downgrade(bus);
        bus.on(self.image.clone(), move |event| {
            if let Some(bus) = responder.upgrade() {
                bus.reply(&event, Payload::Response(api.on_image(&event)));
            }
        });
    }

    pub fn latest(&self) -> Option<Thumbnail> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn on_upload(self: &Arc<Self>, responder: &Weak<HttpBus>, event: Event<Payload>) {
        let Some(bus) = responder.upgrade() else {
            return;
        };
        let Payload::Request(request) = event.data() else {
            return;
        };

        if request.method != Method::POST {
            bus.reply(&event, Payload::Response(response::build_405_response("POST")));
            return;
        }
        let Some(content_type) = request.content_type().filter(|ct| ct.starts_with("image/")) else {
            let failure = Failure::new(StatusCode::UNSUPPORTED_MEDIA_TYPE, "expected an image/* upload");
            bus.reply(&event, Payload::Failure(failure));
            return;
        };
        if request.body.is_empty() {
            let failure = Failure::new(StatusCode::BAD_REQUEST, "empty image");
            bus.reply(&event, Payload::Failure(failure));
            return;
        }

        let image = request.body.clone();
        let content_type = content_type.to_string();
        let api = Arc::clone(self);
        tokio::spawn(async move {
            let size = image.len();
            let reply = match api.thumbnailer.thumbnail(image, content_type).await {
                Ok(thumbnail) => {
                    logger::log_debug(&format!(
                        "Thumbnail ready: {size} -> {} bytes ({})",
                        thumbnail.data.len(),
                        thumbnail.content_type
                    ));
                    let reply = response::build_image_response(
                        &thumbnail.content_type,
                        thumbnail.data.clone(),
                    );
                    *api.latest.write().unwrap_or_else(PoisonError::into_inner) = Some(thumbnail);
                    Payload::Response(reply)
                }
                Err(err) => {
                    logger::log_error(&format!("Thumbnail for '{}' failed: {err}", api.upload));
                    let status = match err {
                        ThumbnailError::Unsupported(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                        ThumbnailError::Failed(_) => StatusCode::INTERNAL_SERVER_ERROR,
                    };
                    Payload::Failure(Failure::new(status, err.to_string()))
                }
            };
            bus.reply(&event, reply);
        });
    }

    fn on_image(&self, event: &Event<Payload>) -> crate::http::FullResponse {
        let Payload::Request(request) = event.data() else {
            return response::build_400_response();
        };
        if request.method != Method::GET && request.method != Method::HEAD {
            return response::build_405_response("GET, HEAD");
        }
        match self.latest() {
            Some(thumbnail) => response::build_image_response(&thumbnail.content_type, thumbnail.data),
            None => response::build_404_response(),
        }
    }
}
