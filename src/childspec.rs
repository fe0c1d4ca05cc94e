//! Child identity, descriptors, and the specification normalizer.
//!
//! A [`ChildSpec`] is the fully-defaulted, validated description of one
//! supervised child. Callers build one through [`ChildSpecBuilder`]: whatever
//! shape the caller starts from — a bare start factory, a factory plus
//! argument, or a partially filled builder — `build()` yields the same
//! defaulted descriptor shape.

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::child::Child;
use crate::error::ParentError;

/// Internal, always-present identity of a child, independent of whether the
/// caller supplied a human-readable `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChildId(Uuid);

impl ChildId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ChildId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ChildId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for ChildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Runtime handle of a started child. The sentinel "ignored" state is
/// represented by the absence of a `Pid` (`Option<Pid>` at the call sites).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pid(Uuid);

impl Pid {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.0)
    }
}

/// A reference to a child by either its caller-chosen label or its runtime
/// pid. `binds_to` sets and manual operations (`restart_child`,
/// `shutdown_child`, ...) all address children through this type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChildRef {
    Id(String),
    Pid(Pid),
}

impl From<&str> for ChildRef {
    fn from(id: &str) -> Self {
        ChildRef::Id(id.to_string())
    }
}

impl From<String> for ChildRef {
    fn from(id: String) -> Self {
        ChildRef::Id(id)
    }
}

impl From<Pid> for ChildRef {
    fn from(pid: Pid) -> Self {
        ChildRef::Pid(pid)
    }
}

/// Restart policy. Ordered `Permanent > Transient > WithDep > Temporary`
/// (see [`RestartPolicy::strength`]); the ordering is the binding-strength
/// lattice a child bound to an older sibling must respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestartPolicy {
    Permanent,
    Transient,
    WithDep,
    Temporary,
}

impl RestartPolicy {
    /// Higher is stronger. A child may only bind to siblings whose strength
    /// is `>=` its own.
    pub fn strength(self) -> u8 {
        match self {
            RestartPolicy::Permanent => 3,
            RestartPolicy::Transient => 2,
            RestartPolicy::WithDep => 1,
            RestartPolicy::Temporary => 0,
        }
    }

    /// Whether a child under this policy should be auto-restarted after
    /// exiting with `reason`.
    pub fn should_restart(self, reason: &ExitReason) -> bool {
        match self {
            RestartPolicy::Permanent => true,
            RestartPolicy::Transient => !reason.is_normal(),
            RestartPolicy::WithDep | RestartPolicy::Temporary => false,
        }
    }
}

/// Shutdown behaviour for a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Shutdown {
    /// Send the shutdown signal, wait up to this budget, then kill.
    Timeout(Duration),
    /// Wait forever for a graceful exit; never kill.
    Infinity,
    /// Skip the grace period entirely; kill immediately.
    Brutal,
}

impl Shutdown {
    pub fn is_brutal(self) -> bool {
        matches!(self, Shutdown::Brutal)
    }
}

/// Advisory classification used only by the generic tree-walk queries
/// (`which_children`, `count_children`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChildKind {
    Worker,
    Supervisor,
}

/// The reason a child exited or was told to stop: a normal self-exit, a
/// requested shutdown, a forced kill, a timeout kill, or an opaque crash
/// reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExitReason {
    Normal,
    Shutdown,
    Killed,
    Timeout,
    Crashed(String),
}

impl ExitReason {
    pub fn is_normal(&self) -> bool {
        matches!(self, ExitReason::Normal)
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Normal => write!(f, "normal"),
            ExitReason::Shutdown => write!(f, "shutdown"),
            ExitReason::Killed => write!(f, "killed"),
            ExitReason::Timeout => write!(f, "timeout"),
            ExitReason::Crashed(reason) => write!(f, "crashed({reason})"),
        }
    }
}

/// Outcome of invoking a child's start function.
pub enum StartOutcome {
    /// The child was created; it will run until it exits or is stopped.
    Started(Box<dyn Child>),
    /// The start function declined to create a process.
    Ignored,
    /// The start function failed; `state` is left unchanged by the caller.
    Failed(String),
}

/// Boxed future returned by a [`StartFn`] invocation.
pub type StartFuture = Pin<Box<dyn Future<Output = StartOutcome> + Send>>;

/// The start effect. A bare thunk and a "module plus argument" factory both
/// collapse onto a plain closure here: a closure that needs an argument
/// simply closes over it, so there is no need for a separate tagged variant.
pub type StartFn = Arc<dyn Fn() -> StartFuture + Send + Sync>;

/// Fully-defaulted description of one supervised child.
pub struct ChildSpec {
    pub id: Option<String>,
    pub start: StartFn,
    pub restart_policy: RestartPolicy,
    pub shutdown: Shutdown,
    pub kind: ChildKind,
    pub modules: Vec<String>,
    pub timeout: Option<Duration>,
    pub max_restarts: Option<u32>,
    pub max_seconds: Duration,
    pub binds_to: BTreeSet<ChildRef>,
    pub shutdown_group: Option<String>,
    pub keep_ignored: bool,
}

impl fmt::Debug for ChildSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildSpec")
            .field("id", &self.id)
            .field("restart_policy", &self.restart_policy)
            .field("shutdown", &self.shutdown)
            .field("kind", &self.kind)
            .field("modules", &self.modules)
            .field("timeout", &self.timeout)
            .field("max_restarts", &self.max_restarts)
            .field("max_seconds", &self.max_seconds)
            .field("binds_to", &self.binds_to)
            .field("shutdown_group", &self.shutdown_group)
            .field("keep_ignored", &self.keep_ignored)
            .finish_non_exhaustive()
    }
}

impl Clone for ChildSpec {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            start: Arc::clone(&self.start),
            restart_policy: self.restart_policy,
            shutdown: self.shutdown,
            kind: self.kind,
            modules: self.modules.clone(),
            timeout: self.timeout,
            max_restarts: self.max_restarts,
            max_seconds: self.max_seconds,
            binds_to: self.binds_to.clone(),
            shutdown_group: self.shutdown_group.clone(),
            keep_ignored: self.keep_ignored,
        }
    }
}

/// Fluent builder for a [`ChildSpec`], the normalizer of §4.1: whatever
/// fields the caller sets, `build()` layers in the rest of the defaults
/// (`shutdown=5s` for workers / `infinity` for supervisors,
/// `restart=permanent`, `max_restarts=infinity`, `max_seconds=5s`, ...).
pub struct ChildSpecBuilder {
    id: Option<String>,
    start: StartFn,
    restart_policy: RestartPolicy,
    shutdown: Option<Shutdown>,
    kind: ChildKind,
    modules: Vec<String>,
    timeout: Option<Duration>,
    max_restarts: Option<u32>,
    max_seconds: Duration,
    binds_to: BTreeSet<ChildRef>,
    shutdown_group: Option<String>,
    keep_ignored: bool,
}

impl ChildSpecBuilder {
    /// Starts a builder from a bare start function, equivalent to the
    /// source's "module handle with empty argument" shape.
    pub fn new(start: StartFn) -> Self {
        Self {
            id: None,
            start,
            restart_policy: RestartPolicy::Permanent,
            shutdown: None,
            kind: ChildKind::Worker,
            modules: Vec::new(),
            timeout: None,
            max_restarts: None,
            max_seconds: Duration::from_secs(5),
            binds_to: BTreeSet::new(),
            shutdown_group: None,
            keep_ignored: true,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn permanent(mut self) -> Self {
        self.restart_policy = RestartPolicy::Permanent;
        self
    }

    pub fn transient(mut self) -> Self {
        self.restart_policy = RestartPolicy::Transient;
        self
    }

    pub fn with_dep(mut self) -> Self {
        self.restart_policy = RestartPolicy::WithDep;
        self
    }

    pub fn temporary(mut self) -> Self {
        self.restart_policy = RestartPolicy::Temporary;
        self
    }

    pub fn shutdown_timeout(mut self, budget: Duration) -> Self {
        self.shutdown = Some(Shutdown::Timeout(budget));
        self
    }

    pub fn shutdown_infinity(mut self) -> Self {
        self.shutdown = Some(Shutdown::Infinity);
        self
    }

    pub fn shutdown_brutal(mut self) -> Self {
        self.shutdown = Some(Shutdown::Brutal);
        self
    }

    pub fn supervisor(mut self) -> Self {
        self.kind = ChildKind::Supervisor;
        self
    }

    pub fn modules(mut self, modules: Vec<String>) -> Self {
        self.modules = modules;
        self
    }

    pub fn timeout(mut self, budget: Duration) -> Self {
        self.timeout = Some(budget);
        self
    }

    pub fn max_restarts(mut self, max: u32) -> Self {
        self.max_restarts = Some(max);
        self
    }

    pub fn max_seconds(mut self, window: Duration) -> Self {
        self.max_seconds = window;
        self
    }

    pub fn binds_to(mut self, refs: impl IntoIterator<Item = ChildRef>) -> Self {
        self.binds_to.extend(refs);
        self
    }

    pub fn shutdown_group(mut self, group: impl Into<String>) -> Self {
        self.shutdown_group = Some(group.into());
        self
    }

    pub fn keep_ignored(mut self, keep: bool) -> Self {
        self.keep_ignored = keep;
        self
    }

    /// Layers in defaults and validates the descriptor's own shape
    /// (`invalid_child_spec`). Cross-child validation (duplicate ids,
    /// missing deps, binding strength, shutdown-group uniformity) happens
    /// later, in `start_child`, against the live state.
    pub fn build(self) -> Result<ChildSpec, ParentError> {
        if let Some(id) = &self.id {
            if id.trim().is_empty() {
                return Err(ParentError::InvalidChildSpec {
                    reason: "id must not be empty".to_string(),
                });
            }
        }
        let shutdown = self.shutdown.unwrap_or(match self.kind {
            ChildKind::Worker => Shutdown::Timeout(Duration::from_millis(5000)),
            ChildKind::Supervisor => Shutdown::Infinity,
        });
        let modules = if self.modules.is_empty() {
            vec!["start_fn".to_string()]
        } else {
            self.modules
        };
        Ok(ChildSpec {
            id: self.id,
            start: self.start,
            restart_policy: self.restart_policy,
            shutdown,
            kind: self.kind,
            modules,
            timeout: self.timeout,
            max_restarts: self.max_restarts,
            max_seconds: self.max_seconds,
            binds_to: self.binds_to,
            shutdown_group: self.shutdown_group,
            keep_ignored: self.keep_ignored,
        })
    }
}
