//! HTTP protocol layer module
//!
//! Aggregated request/response types carried on the bus, body aggregation
//! and response builders.

pub mod message;
pub mod response;

pub use message::{aggregate, Failure, FullRequest, FullResponse, HttpBus, Payload};
