// Server loop module
// Accepts connections until shutdown, then drains them within the grace period

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;

use super::connection::accept_connection;
use crate::handler::DispatchSettings;
use crate::http::HttpBus;
use crate::logger;

/// State shared by the accept loop and every connection it spawns
pub struct LoopContext {
    pub bus: Arc<HttpBus>,
    pub dispatch: Arc<DispatchSettings>,
    pub active: Arc<AtomicUsize>,
    pub max_connections: Option<usize>,
    pub keep_alive: bool,
    pub connection_timeout: Duration,
    pub grace_period: Duration,
}

/// Accept connections until `shutdown` changes or its sender is dropped.
pub async fn run_accept_loop(
    listener: TcpListener,
    ctx: LoopContext,
    mut shutdown: watch::Receiver<bool>,
) {
    let graceful = GracefulShutdown::new();
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        accept_connection(stream, peer_addr, &ctx, &graceful, &mut connections);
                    }
                    Err(e) => {
                        logger::log_error(&format!("Failed to accept connection: {e}"));
                    }
                }
            }

            Some(_) = connections.join_next(), if !connections.is_empty() => {}

            _ = shutdown.changed() => break,
        }
    }

    // Stop accepting before waiting on the open connections
    drop(listener);
    drain_connections(graceful, connections, ctx.grace_period).await;
}

/// Ask open connections to finish their in-flight request, then abort
/// whatever is still running once `grace_period` has elapsed.
async fn drain_connections(
    graceful: GracefulShutdown,
    mut connections: JoinSet<()>,
    grace_period: Duration,
) {
    if !connections.is_empty() {
        logger::log_shutdown_state(&format!(
            "Waiting up to {}ms for {} connection(s)",
            grace_period.as_millis(),
            connections.len()
        ));
    }

    tokio::select! {
        () = graceful.shutdown() => {}
        () = tokio::time::sleep(grace_period) => {
            logger::log_warning(&format!(
                "Grace period elapsed, aborting {} connection(s)",
                connections.len()
            ));
        }
    }

    connections.abort_all();
    while connections.join_next().await.is_some() {}
}
