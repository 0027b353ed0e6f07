// Server module entry point
// Non-blocking HTTP server: start returns immediately, stop drains and is idempotent

pub mod connection;
pub mod listener;
pub mod signal;

// `loop` is a keyword, so the module is exposed as server_loop
#[path = "loop.rs"]
pub mod server_loop;

pub use listener::create_listener;
pub use signal::start_signal_handler;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::config::Config;
use crate::handler::DispatchSettings;
use crate::http::HttpBus;
use crate::shutdown::Stoppable;
use server_loop::{run_accept_loop, LoopContext};

/// Everything the server needs to run, resolved from [`Config`]
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub addr: SocketAddr,
    pub max_connections: Option<usize>,
    pub keep_alive: bool,
    pub connection_timeout: Duration,
    pub grace_period: Duration,
    pub dispatch: DispatchSettings,
}

impl ServerOptions {
    pub fn from_config(cfg: &Config) -> Result<Self, String> {
        Ok(Self {
            addr: cfg.socket_addr()?,
            max_connections: cfg
                .server
                .max_connections
                .map(|max| usize::try_from(max).unwrap_or(usize::MAX)),
            keep_alive: cfg.http.keep_alive,
            connection_timeout: cfg.http.connection_timeout(),
            grace_period: cfg.shutdown.grace_period(),
            dispatch: DispatchSettings {
                max_body_size: cfg.http.max_body_size,
                reply_timeout: cfg.http.reply_timeout(),
                server_name: cfg.http.server_name.clone(),
                access_log: cfg
                    .logging
                    .access_log
                    .then_some(cfg.logging.access_log_format),
            },
        })
    }
}

/// Entry point for starting the server.
pub struct Server;

impl Server {
    /// Bind `options.addr` and start accepting in the background.
    ///
    /// Returns as soon as the listener is bound; a bind failure is the only
    /// error. Must be called from within a Tokio runtime.
    pub fn start(options: ServerOptions, bus: Arc<HttpBus>) -> std::io::Result<ServerHandle> {
        let listener = create_listener(options.addr)?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (stopped_tx, stopped_rx) = watch::channel(false);
        let active = Arc::new(AtomicUsize::new(0));

        let ctx = LoopContext {
            bus,
            dispatch: Arc::new(options.dispatch),
            active: Arc::clone(&active),
            max_connections: options.max_connections,
            keep_alive: options.keep_alive,
            connection_timeout: options.connection_timeout,
            grace_period: options.grace_period,
        };

        tokio::spawn(async move {
            run_accept_loop(listener, ctx, shutdown_rx).await;
            stopped_tx.send_replace(true);
        });

        Ok(ServerHandle {
            local_addr,
            shutdown: shutdown_tx,
            stopped: stopped_rx,
            active,
        })
    }
}

/// Handle to a running server. Dropping it also stops the server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    stopped: watch::Receiver<bool>,
    active: Arc<AtomicUsize>,
}

impl ServerHandle {
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Connections currently being served
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.borrow()
    }

    /// Stop accepting, drain open connections, and wait until the accept
    /// loop has finished. Safe to call repeatedly and concurrently.
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);

        let mut stopped = self.stopped.clone();
        while !*stopped.borrow_and_update() {
            if stopped.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Stoppable for ServerHandle {
    fn stop(&self) -> impl std::future::Future<Output = ()> + Send {
        Self::stop(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{response, Payload};
    use crate::logger::AccessLogFormat;
    use hyper::StatusCode;
    use std::time::Instant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn options(max_body_size: u64) -> ServerOptions {
        ServerOptions {
            addr: "127.0.0.1:0".parse().unwrap(),
            max_connections: None,
            keep_alive: true,
            connection_timeout: Duration::from_secs(10),
            grace_period: Duration::from_millis(200),
            dispatch: DispatchSettings {
                max_body_size,
                reply_timeout: Duration::from_secs(5),
                server_name: "thumbnail-server/test".to_string(),
                access_log: Some(AccessLogFormat::Common),
            },
        }
    }

    struct RawResponse {
        status: u16,
        head: String,
        body: Vec<u8>,
    }

    fn raw_request(method: &str, path: &str, content_type: &str, body: &[u8]) -> Vec<u8> {
        let mut request = format!(
            "{method} {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        )
        .into_bytes();
        request.extend_from_slice(body);
        request
    }

    async fn send(addr: SocketAddr, request: &[u8]) -> RawResponse {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request).await.unwrap();
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();

        let split = raw
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .expect("response has a header block");
        let head = String::from_utf8_lossy(&raw[..split]).to_string();
        let status = head
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .expect("status line");
        RawResponse {
            status,
            head,
            body: raw[split + 4..].to_vec(),
        }
    }

    fn thumbnail_bus() -> (Arc<HttpBus>, Arc<AtomicUsize>) {
        let bus = Arc::new(HttpBus::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let responder = Arc::downgrade(&bus);
        bus.on("/thumbnail", move |event| {
            counter.fetch_add(1, Ordering::SeqCst);
            let Some(bus) = responder.upgrade() else { return };
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                let reply = response::build_image_response("image/jpeg", "thumb-bytes".into());
                bus.reply(&event, Payload::Response(reply));
            });
        });
        (bus, seen)
    }

    #[tokio::test]
    async fn test_thumbnail_round_trip() {
        let (bus, seen) = thumbnail_bus();
        let server = Server::start(options(1024 * 1024), bus).unwrap();

        let response = send(
            server.local_addr(),
            &raw_request("POST", "/thumbnail", "image/png", &[7u8; 512]),
        )
        .await;

        assert_eq!(response.status, 200);
        assert!(response.head.to_ascii_lowercase().contains("content-type: image/jpeg"));
        assert_eq!(response.body, b"thumb-bytes");
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        server.stop().await;
    }

    #[tokio::test]
    async fn test_oversized_upload_is_rejected() {
        let (bus, seen) = thumbnail_bus();
        let server = Server::start(options(1024), bus).unwrap();

        let response = send(
            server.local_addr(),
            &raw_request("POST", "/thumbnail", "image/png", &[7u8; 2048]),
        )
        .await;

        assert_eq!(response.status, 413);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        server.stop().await;
    }

    #[tokio::test]
    async fn test_unknown_path_is_not_found_promptly() {
        let server = Server::start(options(1024), Arc::new(HttpBus::new())).unwrap();

        let started = Instant::now();
        let response = tokio::time::timeout(
            Duration::from_secs(2),
            send(server.local_addr(), &raw_request("GET", "/unknown", "text/plain", b"")),
        )
        .await
        .expect("no hang on unknown selector");

        assert_eq!(response.status, StatusCode::NOT_FOUND.as_u16());
        assert!(started.elapsed() < Duration::from_secs(2));
        server.stop().await;
    }

    #[tokio::test]
    async fn test_malformed_request_does_not_stop_server() {
        let (bus, _) = thumbnail_bus();
        let server = Server::start(options(1024), bus).unwrap();

        let mut stream = TcpStream::connect(server.local_addr()).await.unwrap();
        stream.write_all(b"NOT-HTTP\r\n\r\n").await.unwrap();
        let mut raw = Vec::new();
        let _ = stream.read_to_end(&mut raw).await;

        let response = send(
            server.local_addr(),
            &raw_request("POST", "/thumbnail", "image/png", b"img"),
        )
        .await;
        assert_eq!(response.status, 200);
        server.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let server = Server::start(options(1024), Arc::new(HttpBus::new())).unwrap();
        let addr = server.local_addr();

        tokio::time::timeout(Duration::from_secs(2), async {
            tokio::join!(server.stop(), server.stop());
            server.stop().await;
        })
        .await
        .expect("stop must not hang");

        assert!(server.is_stopped());
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_stop_aborts_stuck_connections_after_grace_period() {
        let bus = Arc::new(HttpBus::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        bus.on("/stuck", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let server = Server::start(options(1024), bus).unwrap();

        let mut stream = TcpStream::connect(server.local_addr()).await.unwrap();
        stream
            .write_all(&raw_request("GET", "/stuck", "text/plain", b""))
            .await
            .unwrap();
        // Wait until the request is in flight, not merely accepted
        while seen.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let started = Instant::now();
        tokio::time::timeout(Duration::from_secs(3), server.stop())
            .await
            .expect("stop must finish after the grace period");
        assert!(started.elapsed() >= Duration::from_millis(150));
        assert_eq!(server.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let (bus, _) = thumbnail_bus();
        let mut opts = options(1024);
        opts.max_connections = Some(0);
        let server = Server::start(opts, bus).unwrap();

        let mut stream = TcpStream::connect(server.local_addr()).await.unwrap();
        let _ = stream
            .write_all(&raw_request("POST", "/thumbnail", "image/png", b"img"))
            .await;
        let mut raw = Vec::new();
        let _ = stream.read_to_end(&mut raw).await;
        assert!(raw.is_empty());
        server.stop().await;
    }
}
