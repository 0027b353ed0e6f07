//! Connection handler
//!
//! Publishes each aggregated request on the bus under its URI path and
//! waits, without blocking a thread, for the reply routed back to it.

mod error_sink;

pub use error_sink::ErrorSink;

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use http_body_util::Full;
use hyper::body::{Body, Bytes};
use hyper::header::USER_AGENT;
use hyper::{Request, Response, Version};
use tokio::sync::oneshot;

use crate::error::DispatchError;
use crate::http::{aggregate, FullResponse, HttpBus, Payload};
use crate::logger::{self, AccessLogEntry, AccessLogFormat};

/// Per-request settings shared by every connection
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub max_body_size: u64,
    pub reply_timeout: Duration,
    pub server_name: String,
    /// Access log format, `None` when access logging is off
    pub access_log: Option<AccessLogFormat>,
}

/// Request handling for one accepted connection.
#[derive(Clone)]
pub struct ConnectionHandler {
    bus: Arc<HttpBus>,
    settings: Arc<DispatchSettings>,
    peer_addr: SocketAddr,
    sink: ErrorSink,
}

impl ConnectionHandler {
    pub fn new(bus: Arc<HttpBus>, settings: Arc<DispatchSettings>, peer_addr: SocketAddr) -> Self {
        Self {
            bus,
            settings,
            peer_addr,
            sink: ErrorSink::new(peer_addr),
        }
    }

    pub const fn error_sink(&self) -> &ErrorSink {
        &self.sink
    }

    /// Service entry point: always produces a response.
    pub async fn handle<B>(&self, req: Request<B>) -> Result<Response<Full<Bytes>>, Infallible>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let started = Instant::now();
        let entry = self.settings.access_log.map(|_| self.access_entry(&req));

        let response = match self.dispatch(req).await {
            Ok(response) => response,
            Err(err) => self.sink.respond(&err),
        };

        if let (Some(format), Some(mut entry)) = (self.settings.access_log, entry) {
            entry.status = response.status.as_u16();
            entry.body_bytes = response.body.len();
            entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
            logger::log_access(&entry, format);
        }

        Ok(response.into_hyper(&self.settings.server_name))
    }

    /// Aggregate, publish, and wait for the reply.
    pub async fn dispatch<B>(&self, req: Request<B>) -> Result<FullResponse, DispatchError>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let request = aggregate(req, self.settings.max_body_size).await?;
        let selector = request.selector();

        let (reply_tx, reply_rx) = oneshot::channel();
        let exchange = self.bus.send_and_receive(
            selector.clone(),
            Payload::Request(request),
            move |event| {
                // The receiver is gone if the peer disconnected first
                let _ = reply_tx.send(event.into_data());
            },
        );

        if exchange.delivered() == 0 {
            return Err(DispatchError::NoHandler(selector));
        }
        logger::log_debug(&format!(
            "{} dispatched to {} handler(s) on '{selector}'",
            self.peer_addr,
            exchange.delivered()
        ));

        let timeout = self.settings.reply_timeout;
        let reply = match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(payload)) => payload,
            Ok(Err(_)) => return Err(DispatchError::ReplyDropped(selector)),
            Err(_) => return Err(DispatchError::ReplyTimeout { selector, timeout }),
        };
        drop(exchange);

        match reply {
            Payload::Response(response) => Ok(response),
            Payload::Failure(failure) => Err(DispatchError::Collaborator { selector, failure }),
            Payload::Request(_) => Err(DispatchError::UnexpectedReply(selector)),
        }
    }

    fn access_entry<B>(&self, req: &Request<B>) -> AccessLogEntry {
        let mut entry = AccessLogEntry::new(
            self.peer_addr.to_string(),
            req.method().to_string(),
            req.uri().path().to_string(),
        );
        entry.query = req.uri().query().map(ToString::to_string);
        entry.http_version = http_version_label(req.version()).to_string();
        entry.user_agent = req
            .headers()
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        entry
    }
}

fn http_version_label(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_2 => "2",
        Version::HTTP_3 => "3",
        _ => "1.1",
    }
}
