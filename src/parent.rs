//! The public façade tying the Lifecycle Engine, Restart Engine, Shutdown
//! Coordinator, and Discovery Index Adapter together (§6): a single struct
//! the owner task holds and drives, exposing the child-management
//! operations as inherent async methods.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::childspec::{ChildKind, ChildRef, ChildSpec, ExitReason, Pid};
use crate::config::ParentOptions;
use crate::discovery::{DiscoveryIndex, InMemoryDiscoveryIndex, NoopDiscoveryIndex};
use crate::dispatch::{ClientQuery, DispatchOutcome, ParentMessage};
use crate::error::ParentError;
use crate::lifecycle::{self, ChildDownOutcome};
use crate::monitoring::{MonitorHandle, NoopMonitor};
use crate::restart_engine::{self, EscalationReason, RestartOutcome};
use crate::shutdown;
use crate::state::{ChildRecord, ParentState, StoppedChild};

/// Queryable tree-walk summary (§6 `count_children()`).
#[derive(Debug, Clone, Copy, Default)]
pub struct ChildCounts {
    pub specs: usize,
    pub active: usize,
    pub supervisors: usize,
    pub workers: usize,
}

/// One row of `which_children()` (§6).
pub struct ChildSummary {
    pub id: Option<String>,
    pub pid: Option<Pid>,
    pub kind: ChildKind,
    pub modules: Vec<String>,
}

/// One owner's supervision state: the `ParentState`, its Discovery Index,
/// and the mailbox it dispatches from. There is no separate `initialize`
/// step with a runtime "already initialized" error — a `Parent` value
/// itself *is* that state, so double-initialization is impossible by
/// construction rather than checked at runtime.
pub struct Parent {
    state: ParentState,
    discovery: Arc<dyn DiscoveryIndex>,
    monitor: MonitorHandle,
    mailbox_tx: mpsc::Sender<ParentMessage>,
    mailbox_rx: mpsc::Receiver<ParentMessage>,
    escalated: Option<EscalationReason>,
    span: tracing::Span,
}

impl Parent {
    /// `initialize(options)` (§6), minus the runtime idempotency check —
    /// see the REDESIGN note above. Telemetry defaults to a [`NoopMonitor`];
    /// use [`Parent::with_monitor`] to plug in an [`crate::monitoring::InMemoryMonitor`]
    /// or a host-supplied sink.
    pub fn new(options: ParentOptions) -> Self {
        Self::with_monitor(options, Arc::new(NoopMonitor::new()))
    }

    /// `initialize(options)` with an explicit telemetry sink (§10).
    pub fn with_monitor(options: ParentOptions, monitor: MonitorHandle) -> Self {
        let (mailbox_tx, mailbox_rx) = mpsc::channel(options.mailbox_capacity);
        let discovery: Arc<dyn DiscoveryIndex> = if options.registry_enabled {
            Arc::new(InMemoryDiscoveryIndex::new())
        } else {
            Arc::new(NoopDiscoveryIndex)
        };
        discovery.init();
        let parent_id = Uuid::new_v4();
        Self {
            state: ParentState::new(options),
            discovery,
            monitor,
            mailbox_tx,
            mailbox_rx,
            escalated: None,
            span: tracing::info_span!("parent", parent_id = %parent_id),
        }
    }

    /// The terminal state entered after a restart-intensity ceiling is
    /// exceeded (§7). Once set, the host should treat this `Parent` as
    /// done: every child has already been shut down.
    pub fn is_escalated(&self) -> bool {
        self.escalated.is_some()
    }

    pub fn escalation_reason(&self) -> Option<&EscalationReason> {
        self.escalated.as_ref()
    }

    /// A sender clone a child's spawned task can use to report its own
    /// exit, or a host behaviour can use to funnel in client queries and
    /// externally observed events. Most callers won't need this directly:
    /// `start_child` wires it up for the child it spawns.
    pub fn mailbox_sender(&self) -> mpsc::Sender<ParentMessage> {
        self.mailbox_tx.clone()
    }

    pub async fn start_child(&mut self, spec: ChildSpec) -> Result<Option<Pid>, ParentError> {
        debug!(id = spec.id.as_deref(), "start_child");
        lifecycle::start_child(&mut self.state, &self.discovery, &self.monitor, &self.mailbox_tx, spec).await
    }

    pub async fn start_all_children(&mut self, specs: Vec<ChildSpec>) -> Result<Vec<Option<Pid>>, ParentError> {
        lifecycle::start_all_children(&mut self.state, &self.discovery, &self.monitor, &self.mailbox_tx, specs).await
    }

    /// `restart_child(ref, opts)` (§4.3.4). Drives the popped stopped-set
    /// straight through the Restart Engine and returns whatever remains
    /// unstarted.
    pub async fn restart_child(&mut self, r: &ChildRef, include_temporary: bool) -> Result<Vec<StoppedChild>, ParentError> {
        let stopped = lifecycle::restart_child(&mut self.state, &self.discovery, &self.monitor, r).await?;
        match self.drive_restart(stopped, include_temporary).await {
            RestartOutcome::Completed { remaining } => Ok(remaining),
            RestartOutcome::Escalate { reason, to_shut_down } => {
                self.escalate(reason, to_shut_down).await;
                Ok(Vec::new())
            }
        }
    }

    pub async fn shutdown_child(&mut self, r: &ChildRef) -> Result<(), ParentError> {
        lifecycle::shutdown_child(&mut self.state, &self.discovery, &self.monitor, r).await
    }

    /// `shutdown_all(reason)` (§4.3.4, §4.7). Returns the stopped-set so it
    /// can later be handed to `return_children` (§8 law L3).
    pub async fn shutdown_all(&mut self, reason: ExitReason) -> Vec<StoppedChild> {
        shutdown::shutdown_all(&mut self.state, &self.discovery, &self.monitor, reason).await
    }

    /// `return_children(set, opts)` (§4.3.4): hands a previously returned
    /// stopped-set to the Restart Engine against the current (typically
    /// freshly reinitialized) state.
    pub async fn return_children(&mut self, stopped: Vec<StoppedChild>, include_temporary: bool) -> Vec<StoppedChild> {
        match self.drive_restart(stopped, include_temporary).await {
            RestartOutcome::Completed { remaining } => remaining,
            RestartOutcome::Escalate { reason, to_shut_down } => {
                self.escalate(reason, to_shut_down).await;
                Vec::new()
            }
        }
    }

    pub fn update_child_meta(&mut self, r: &ChildRef, f: impl FnOnce(serde_json::Value) -> serde_json::Value) -> Result<serde_json::Value, ParentError> {
        lifecycle::update_child_meta(&mut self.state, &self.discovery, r, f)
    }

    // -- Queries (§6) --------------------------------------------------

    pub fn children(&self) -> Vec<&ChildRecord> {
        self.state.children_in_order()
    }

    pub fn child_id(&self, pid: Pid) -> Option<String> {
        self.state.child_id_label(pid)
    }

    pub fn child_pid(&self, id: &str) -> Option<Pid> {
        self.state.child_pid(id)
    }

    pub fn child_meta(&self, r: &ChildRef) -> Option<serde_json::Value> {
        self.state.child(r).map(|c| c.meta.clone())
    }

    pub fn has_child(&self, r: &ChildRef) -> bool {
        self.state.child(r).is_some()
    }

    pub fn num_children(&self) -> usize {
        self.state.num_children()
    }

    // -- Tree-walk protocol (§6) ----------------------------------------

    pub fn which_children(&self) -> Vec<ChildSummary> {
        self.state
            .children_in_order()
            .into_iter()
            .map(|c| ChildSummary {
                id: c.spec.id.clone(),
                pid: c.pid,
                kind: c.spec.kind,
                modules: c.spec.modules.clone(),
            })
            .collect()
    }

    pub fn count_children(&self) -> ChildCounts {
        let mut counts = ChildCounts::default();
        for child in self.state.children_in_order() {
            counts.specs += 1;
            if child.pid.is_some() {
                counts.active += 1;
            }
            match child.spec.kind {
                ChildKind::Worker => counts.workers += 1,
                ChildKind::Supervisor => counts.supervisors += 1,
            }
        }
        counts
    }

    pub fn get_childspec(&self, r: &ChildRef) -> Option<&ChildRecord> {
        self.state.child(r)
    }

    // -- Dispatch loop (§4.6) --------------------------------------------

    /// Awaits and handles exactly one mailbox message, classifying it per
    /// §4.6 and driving whichever component it belongs to.
    pub async fn handle_next_message(&mut self) -> DispatchOutcome {
        let Some(message) = self.mailbox_rx.recv().await else {
            warn!("owner mailbox closed");
            return DispatchOutcome::Unhandled;
        };
        self.handle_message(message).await
    }

    pub async fn handle_message(&mut self, message: ParentMessage) -> DispatchOutcome {
        let span = self.span.clone();
        self.dispatch(message).instrument(span).await
    }

    async fn dispatch(&mut self, message: ParentMessage) -> DispatchOutcome {
        match message {
            ParentMessage::ChildExit(pid, reason) => match lifecycle::handle_child_down(&mut self.state, &self.discovery, &self.monitor, pid, reason).await {
                Some(ChildDownOutcome::ToRestart(stopped)) => match self.drive_restart(stopped, true).await {
                    RestartOutcome::Completed { remaining } if remaining.is_empty() => DispatchOutcome::Ignore,
                    RestartOutcome::Completed { remaining } => DispatchOutcome::StoppedChildren(remaining),
                    RestartOutcome::Escalate { reason, to_shut_down } => {
                        self.escalate(reason, to_shut_down).await;
                        DispatchOutcome::Ignore
                    }
                },
                Some(ChildDownOutcome::Surfaced(stopped)) => DispatchOutcome::StoppedChildren(stopped),
                None => DispatchOutcome::Unhandled,
            },
            ParentMessage::ChildTimeout(pid) => match lifecycle::handle_child_timeout(&mut self.state, &self.discovery, &self.monitor, pid).await {
                Some(ChildDownOutcome::ToRestart(stopped)) => match self.drive_restart(stopped, true).await {
                    RestartOutcome::Completed { remaining } if remaining.is_empty() => DispatchOutcome::Ignore,
                    RestartOutcome::Completed { remaining } => DispatchOutcome::StoppedChildren(remaining),
                    RestartOutcome::Escalate { reason, to_shut_down } => {
                        self.escalate(reason, to_shut_down).await;
                        DispatchOutcome::Ignore
                    }
                },
                Some(ChildDownOutcome::Surfaced(stopped)) => DispatchOutcome::StoppedChildren(stopped),
                None => DispatchOutcome::Unhandled,
            },
            ParentMessage::ResumeRestart(stopped) => match self.drive_restart(stopped, true).await {
                RestartOutcome::Completed { .. } => DispatchOutcome::Ignore,
                RestartOutcome::Escalate { reason, to_shut_down } => {
                    self.escalate(reason, to_shut_down).await;
                    DispatchOutcome::Ignore
                }
            },
            ParentMessage::Query(query) => {
                self.answer_query(query);
                DispatchOutcome::Ignore
            }
        }
    }

    fn answer_query(&self, query: ClientQuery) {
        // Answering is the host behaviour's job (out of scope, §1); this
        // just demonstrates that a query is fully handled at dispatch time
        // and never falls through to the Restart Engine.
        match query {
            ClientQuery::WhichChildren => {
                let _ = self.which_children();
            }
            ClientQuery::CountChildren => {
                let _ = self.count_children();
            }
            ClientQuery::GetChildSpec(r) => {
                let _ = self.get_childspec(&r);
            }
        }
    }

    async fn drive_restart(&mut self, stopped: Vec<StoppedChild>, include_temporary: bool) -> RestartOutcome {
        restart_engine::run(&mut self.state, &self.discovery, &self.monitor, &self.mailbox_tx, stopped, include_temporary).await
    }

    /// §7: the only path by which the core forcibly ends the owner's
    /// supervision responsibilities. Shuts down every surviving child in
    /// reverse startup order, then marks this `Parent` terminal.
    async fn escalate(&mut self, reason: EscalationReason, to_shut_down: Vec<StoppedChild>) {
        warn!(reason = %reason_debug(&reason), "restart intensity exceeded, escalating");
        let records: Vec<ChildRecord> = to_shut_down.into_iter().map(|entry| entry.record).collect();
        shutdown::shutdown_all(&mut self.state, &self.discovery, &self.monitor, ExitReason::Shutdown).await;
        // `shutdown_all` drains the live state; `records` holds descriptors
        // the Restart Engine had already popped out before escalating, so
        // stop those too rather than leaking their tasks.
        crate::lifecycle::stop_children_in_reverse(records, ExitReason::Shutdown, &self.monitor).await;
        info!("escalation shutdown complete");
        self.escalated = Some(reason);
    }
}

fn reason_debug(reason: &EscalationReason) -> String {
    match reason {
        EscalationReason::ChildIntensity(id) => format!("child({id})"),
        EscalationReason::ParentIntensity => "parent".to_string(),
    }
}
