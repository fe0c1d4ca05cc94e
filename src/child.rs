//! The contract a supervised child implements.

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::childspec::ExitReason;

/// Delivered to a running child when the owner wants it to stop gracefully.
/// A child's `run` loop should `select!` on this alongside its own work and
/// return promptly once it resolves.
pub struct StopSignal(pub(crate) oneshot::Receiver<()>);

impl StopSignal {
    /// Resolves once the owner has requested a graceful stop.
    pub async fn requested(&mut self) {
        let _ = (&mut self.0).await;
    }
}

/// A supervised unit of work: plain async code running inside a spawned
/// task. The owner observes its completion through a mailbox message, not
/// an OS-level exit signal.
///
/// Children are heterogeneous under one parent in practice (a cache next to
/// an API listener next to a worker pool), so the core stores them as
/// `Box<dyn Child>` rather than parametrizing the parent over a single
/// concrete child type.
#[async_trait]
pub trait Child: Send + 'static {
    /// Runs until the child decides to stop on its own, or until `stop`
    /// resolves and the child chooses to honor it. The returned reason
    /// becomes the exit reason the Restart Engine sees.
    async fn run(&mut self, stop: StopSignal) -> ExitReason;
}
