//! Long-lived background tasks and their shutdown choreography.
//!
//! Each worker runs an interval loop that also listens on a cancellation
//! token. At shutdown the manager cancels the token and joins every handle
//! before the HTTP listener closes and the pool drops, so an in-flight
//! sweep either finishes its transaction or rolls it back.

pub mod grace_reclaimer;
pub mod idempotency_reaper;

pub use grace_reclaimer::GraceReclaimer;
pub use idempotency_reaper::IdempotencyReaper;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct WorkerSet {
    token: CancellationToken,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl WorkerSet {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// Token handed to each worker's run loop.
    pub fn token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn spawn<F>(&mut self, name: &'static str, fut: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.handles.push((name, tokio::spawn(fut)));
    }

    /// Cancel and join every worker. Called before the listener stops.
    pub async fn shutdown(self) {
        self.token.cancel();
        for (name, handle) in self.handles {
            if handle.await.is_err() {
                tracing::error!(worker = name, "Worker task panicked during shutdown");
            } else {
                tracing::info!(worker = name, "Worker stopped");
            }
        }
    }
}

impl Default for WorkerSet {
    fn default() -> Self {
        Self::new()
    }
}
