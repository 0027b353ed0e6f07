// Connection module
// Accepts a single TCP connection and serves it with the connection handler

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpStream;
use tokio::task::JoinSet;

use super::server_loop::LoopContext;
use crate::handler::ConnectionHandler;
use crate::logger;

/// Decrements the active connection counter when the connection task ends,
/// including when it is aborted.
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Accept a connection, enforcing the connection limit.
///
/// The connection is served on its own task inside `connections`, and is
/// watched by `graceful` so shutdown can ask it to finish.
pub fn accept_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    ctx: &LoopContext,
    graceful: &GracefulShutdown,
    connections: &mut JoinSet<()>,
) {
    // Increment first, then check the limit
    let prev_count = ctx.active.fetch_add(1, Ordering::SeqCst);
    let guard = ActiveGuard(Arc::clone(&ctx.active));

    if let Some(max_conn) = ctx.max_connections {
        if prev_count >= max_conn {
            logger::log_warning(&format!(
                "Max connections reached: {prev_count}/{max_conn}. Connection from {peer_addr} rejected."
            ));
            return;
        }
    }

    logger::log_connection_accepted(&peer_addr);

    let handler = ConnectionHandler::new(Arc::clone(&ctx.bus), Arc::clone(&ctx.dispatch), peer_addr);
    let service_handler = handler.clone();

    let mut builder = http1::Builder::new();
    builder.keep_alive(ctx.keep_alive);

    let conn = builder.serve_connection(
        TokioIo::new(stream),
        service_fn(move |req| {
            let handler = service_handler.clone();
            async move { handler.handle(req).await }
        }),
    );
    let conn = graceful.watch(conn);
    let timeout = ctx.connection_timeout;

    connections.spawn(async move {
        let _guard = guard;
        match tokio::time::timeout(timeout, conn).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => handler.error_sink().transport_error(&err),
            Err(_) => handler.error_sink().connection_timeout(timeout),
        }
    });
}
