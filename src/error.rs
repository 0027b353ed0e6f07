//! Failures raised while dispatching a request

use std::time::Duration;

use thiserror::Error;

use crate::bus::Selector;
use crate::http::Failure;

/// Everything that can go wrong between aggregation and reply.
///
/// Every variant is turned into a response by the error sink; none of
/// them reaches the accept loop.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("request body exceeds the limit of {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    #[error("failed to read request body: {0}")]
    BodyRead(String),

    #[error("no handler registered for '{0}'")]
    NoHandler(Selector),

    #[error("no reply for '{selector}' within {timeout:?}")]
    ReplyTimeout { selector: Selector, timeout: Duration },

    #[error("reply for '{0}' was dropped before it was sent")]
    ReplyDropped(Selector),

    #[error("handler for '{selector}' failed: {failure}")]
    Collaborator { selector: Selector, failure: Failure },

    #[error("handler for '{0}' replied with a request")]
    UnexpectedReply(Selector),
}
