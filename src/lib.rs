//! Asynchronous HTTP front end that turns every request into an event on
//! an in-process bus and writes back whatever the subscribed collaborator
//! replies.

pub mod bus;
pub mod collaborator;
pub mod config;
pub mod error;
pub mod handler;
pub mod http;
pub mod logger;
pub mod server;
pub mod shutdown;
