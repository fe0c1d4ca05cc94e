//! # parentage - a supervision engine core
//!
//! Manages the lifecycle of a dynamic set of child worker tasks on behalf
//! of a single owning process: traps their termination, decides whether to
//! restart them according to configurable policies, propagates lifecycle
//! dependencies between siblings, and guarantees a deterministic,
//! reverse-startup-order shutdown of all children when the owner stops.
//!
//! This is the core only — BEAM-supervisor vocabulary, not a BEAM-supervisor
//! clone. It does not include the owner's own dispatch loop or any
//! higher-level "parent behaviour" that wraps it, a client-facing query
//! façade, or the storage behind the optional discovery index; those are
//! external collaborators the core talks to through [`discovery`] and
//! [`dispatch`].
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use parentage::{Parent, ParentOptions};
//! use parentage::childspec::{ChildSpecBuilder, StartOutcome};
//! use parentage::child::{Child, StopSignal};
//! use async_trait::async_trait;
//!
//! struct Worker;
//!
//! #[async_trait]
//! impl Child for Worker {
//!     async fn run(&mut self, mut stop: StopSignal) -> parentage::childspec::ExitReason {
//!         stop.requested().await;
//!         parentage::childspec::ExitReason::Shutdown
//!     }
//! }
//!
//! # async fn example() -> Result<(), parentage::error::ParentError> {
//! fn boxed(fut: impl std::future::Future<Output = StartOutcome> + Send + 'static) -> parentage::childspec::StartFuture {
//!     Box::pin(fut)
//! }
//!
//! let mut parent = Parent::new(ParentOptions::default());
//! let spec = ChildSpecBuilder::new(Arc::new(|| boxed(async { StartOutcome::Started(Box::new(Worker)) })))
//!     .id("worker-1")
//!     .permanent()
//!     .build()?;
//! parent.start_child(spec).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Module organization
//!
//! - [`childspec`] - child identity, the restart/shutdown policy lattice,
//!   and the descriptor normalizer (§4.1)
//! - [`child`] - the `Child` trait a supervised task implements
//! - [`state`] - the `ParentState` store: indexes, bindings, groups (§4.2)
//! - [`restart_ring`] - sliding-window restart-intensity accounting
//! - [`lifecycle`] - start/stop/child-down handling (§4.3)
//! - [`monitoring`] - typed `SupervisionEvent` telemetry alongside `tracing` (§10)
//! - [`restart_engine`] - the ordered restart algorithm (§4.4)
//! - [`discovery`] - the optional external id/pid/meta mirror (§4.5)
//! - [`dispatch`] - owner-mailbox message classification (§4.6)
//! - [`shutdown`] - reverse-startup-order termination of the whole tree (§4.7)
//! - [`error`] - the `ParentError` surfaced to callers
//! - [`config`] - `ParentOptions`, the parent-wide configuration
//! - [`parent`] - the public `Parent` façade tying the above together
//!
//! # Concurrency model (§5)
//!
//! A single owner task drives the Dispatcher, Lifecycle Engine, Restart
//! Engine, and Shutdown Coordinator sequentially; all `ParentState`
//! mutation happens there, with no internal locking. Each child runs in
//! its own task and talks to the owner only via its mailbox. The Discovery
//! Index is the one piece of state read concurrently by other tasks.

pub mod child;
pub mod childspec;
pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod monitoring;
pub mod parent;
pub mod restart_engine;
pub mod restart_ring;
pub mod shutdown;
pub mod state;

pub use child::{Child, StopSignal};
pub use childspec::{
    ChildId, ChildKind, ChildRef, ChildSpec, ChildSpecBuilder, ExitReason, Pid, RestartPolicy,
    Shutdown, StartFn, StartFuture, StartOutcome,
};
pub use config::{ParentOptions, ParentOptionsBuilder};
pub use discovery::{DiscoveryIndex, InMemoryDiscoveryIndex, NoopDiscoveryIndex};
pub use dispatch::{ClientQuery, DispatchOutcome, ParentMessage};
pub use error::ParentError;
pub use monitoring::{InMemoryMonitor, Monitor, MonitorHandle, NoopMonitor, SupervisionEvent, SupervisionEventKind};
pub use parent::{ChildCounts, ChildSummary, Parent};
pub use restart_engine::EscalationReason;
pub use state::{ChildRecord, StoppedChild};
