//! Process lifetime coordination
//!
//! The server never blocks its caller, so `main` parks on a
//! [`ShutdownCoordinator`] until the [`ShutdownGate`] is signaled and
//! then drives an orderly stop.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

use crate::logger;

/// Anything the coordinator can stop. `stop` must be idempotent.
pub trait Stoppable {
    fn stop(&self) -> impl Future<Output = ()> + Send;
}

/// Single-transition flag: unsignaled until the first `signal`, then
/// signaled forever. Every waiter is released exactly once.
#[derive(Debug)]
pub struct ShutdownGate {
    signaled: watch::Sender<bool>,
}

impl Default for ShutdownGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownGate {
    pub fn new() -> Self {
        let (signaled, _) = watch::channel(false);
        Self { signaled }
    }

    /// Signal the gate. Returns `true` only for the call that performed
    /// the transition.
    pub fn signal(&self) -> bool {
        self.signaled.send_if_modified(|signaled| {
            if *signaled {
                false
            } else {
                *signaled = true;
                true
            }
        })
    }

    pub fn is_signaled(&self) -> bool {
        *self.signaled.borrow()
    }

    /// Wait until the gate has been signaled.
    pub async fn wait(&self) {
        let mut signaled = self.signaled.subscribe();
        while !*signaled.borrow_and_update() {
            // The sender lives in `self`, so this cannot fail while we wait
            if signaled.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Lifecycle of the coordinated process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Running,
    Stopping,
    Stopped,
}

/// `Running -> Stopping -> Stopped` state machine around a [`ShutdownGate`].
pub struct ShutdownCoordinator {
    gate: Arc<ShutdownGate>,
    state: watch::Sender<CoordinatorState>,
}

impl ShutdownCoordinator {
    /// Create a coordinator for a server that has already started.
    pub fn new(gate: Arc<ShutdownGate>) -> Self {
        let (state, _) = watch::channel(CoordinatorState::Running);
        Self { gate, state }
    }

    pub const fn gate(&self) -> &Arc<ShutdownGate> {
        &self.gate
    }

    pub fn state(&self) -> CoordinatorState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<CoordinatorState> {
        self.state.subscribe()
    }

    /// Block until the gate is signaled, then stop `server`.
    ///
    /// Only the first caller stops the server; concurrent or later
    /// callers wait for it to reach `Stopped`.
    pub async fn run<S: Stoppable>(&self, server: &S) {
        self.gate.wait().await;

        let started_stopping = self.state.send_if_modified(|state| {
            if *state == CoordinatorState::Running {
                *state = CoordinatorState::Stopping;
                true
            } else {
                false
            }
        });

        if started_stopping {
            logger::log_shutdown_state("Stopping server");
            server.stop().await;
            self.state.send_replace(CoordinatorState::Stopped);
            logger::log_shutdown_state("Server stopped");
            return;
        }

        let mut state = self.state.subscribe();
        while *state.borrow_and_update() != CoordinatorState::Stopped {
            if state.changed().await.is_err() {
                return;
            }
        }
    }
}
