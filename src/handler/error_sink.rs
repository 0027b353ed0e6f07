//! Per-connection error sink
//!
//! Turns every dispatch failure into a well-formed response so nothing
//! escapes to the accept loop.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::DispatchError;
use crate::http::{response, FullResponse};
use crate::logger;

/// Error path attached to one connection.
#[derive(Debug, Clone, Copy)]
pub struct ErrorSink {
    peer_addr: SocketAddr,
}

impl ErrorSink {
    pub const fn new(peer_addr: SocketAddr) -> Self {
        Self { peer_addr }
    }

    /// Response written in place of the one that could not be produced.
    pub fn respond(&self, err: &DispatchError) -> FullResponse {
        let response = match err {
            DispatchError::PayloadTooLarge { .. } => response::build_413_response(),
            DispatchError::BodyRead(_) => response::build_400_response(),
            DispatchError::NoHandler(_) => response::build_404_response(),
            DispatchError::ReplyTimeout { .. } => response::build_504_response(),
            DispatchError::ReplyDropped(_) | DispatchError::UnexpectedReply(_) => {
                response::build_503_response()
            }
            DispatchError::Collaborator { failure, .. } => {
                response::build_failure_response(failure)
            }
        };

        let message = format!("{} -> {}: {err}", self.peer_addr, response.status.as_u16());
        if response.status.is_server_error() {
            logger::log_error(&message);
        } else {
            logger::log_warning(&message);
        }
        response
    }

    /// The HTTP codec failed; the connection is dropped without a response.
    pub fn transport_error(&self, err: &hyper::Error) {
        if err.is_incomplete_message() || err.is_canceled() || err.is_closed() {
            logger::log_debug(&format!("Connection {} closed early: {err}", self.peer_addr));
        } else {
            logger::log_connection_error(&self.peer_addr, err);
        }
    }

    /// The connection outlived its configured lifetime and was closed.
    pub fn connection_timeout(&self, limit: Duration) {
        logger::log_warning(&format!(
            "Connection {} closed after {}s timeout",
            self.peer_addr,
            limit.as_secs()
        ));
    }
}
