// Signal handling module
//
// Supported signals:
// - SIGTERM: Graceful shutdown
// - SIGINT:  Graceful shutdown (Ctrl+C)

use std::sync::Arc;

use crate::logger;
use crate::shutdown::ShutdownGate;

fn request_shutdown(gate: &ShutdownGate, signal_name: &str) {
    if gate.signal() {
        logger::log_shutdown_state(&format!("{signal_name} received, initiating graceful shutdown"));
    } else {
        logger::log_shutdown_state(&format!("{signal_name} received, shutdown already in progress"));
    }
}

/// Start signal handlers (Unix)
///
/// Registration happens before this returns, so a failure to install a
/// handler aborts startup instead of surfacing inside the task.
///
/// | Signal  | Action        |
/// |---------|---------------|
/// | SIGTERM | Graceful stop |
/// | SIGINT  | Graceful stop |
#[cfg(unix)]
pub fn start_signal_handler(gate: Arc<ShutdownGate>) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    logger::log_info(&format!(
        "Signal handlers registered (SIGTERM, SIGINT), process ID: {}",
        std::process::id()
    ));

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sigterm.recv() => request_shutdown(&gate, "SIGTERM"),
                _ = sigint.recv() => request_shutdown(&gate, "SIGINT"),
            }
        }
    });
    Ok(())
}

/// Windows fallback - only handles Ctrl+C
#[cfg(not(unix))]
pub fn start_signal_handler(gate: Arc<ShutdownGate>) -> std::io::Result<()> {
    logger::log_info("Signal handling: Ctrl+C only");

    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            request_shutdown(&gate, "Ctrl+C");
        }
    });
    Ok(())
}
