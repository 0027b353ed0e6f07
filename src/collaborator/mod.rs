//! Request consumers living on the HTTP bus
//!
//! Each collaborator subscribes to one or more selectors and answers every
//! request it receives with exactly one reply.

pub mod health;
pub mod thumbnail;

pub use thumbnail::{PassthroughThumbnailer, Thumbnail, ThumbnailApi, ThumbnailError, Thumbnailer};

use std::sync::Arc;

use crate::config::Config;
use crate::http::HttpBus;
use crate::shutdown::ShutdownGate;

/// Register every built-in collaborator on `bus`.
pub fn register_all<T: Thumbnailer>(
    bus: &Arc<HttpBus>,
    config: &Config,
    gate: &Arc<ShutdownGate>,
    thumbnailer: T,
) -> Arc<ThumbnailApi<T>> {
    let api = ThumbnailApi::new(thumbnailer, &config.thumbnail);
    api.register(bus);
    health::register(bus, &config.health, gate);
    api
}
