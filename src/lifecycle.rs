//! Lifecycle Engine (§4.3): child start, timers, child-down handling, the
//! manual operations, and the synchronous stop protocol.
//!
//! Stopping a child is a monitor-and-timeout wait over a spawned task's
//! `JoinHandle` rather than a direct `Child::stop().await` call, since
//! children are stored as type-erased tasks rather than a single generic
//! `C: Child`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::child::StopSignal;
use crate::childspec::{ChildId, ChildRef, ChildSpec, ExitReason, Pid, StartOutcome};
use crate::discovery::DiscoveryIndex;
use crate::dispatch::ParentMessage;
use crate::error::ParentError;
use crate::monitoring::{MonitorHandle, SupervisionEvent, SupervisionEventKind};
use crate::restart_ring::RestartRing;
use crate::state::{ChildRecord, ParentState, RunningHandle, StoppedChild, TimerHandle};

/// Records a [`SupervisionEvent`] and drops the result: per §4.5's contract
/// for the Discovery Index, the telemetry sink must not be allowed to
/// derail a lifecycle transition either.
pub(crate) async fn emit_event(monitor: &MonitorHandle, child: Option<ChildId>, kind: SupervisionEventKind) {
    let _ = monitor.record(SupervisionEvent::new(child, kind)).await;
}

/// What child-down handling (§4.3.3) leaves for the owner to do next.
pub enum ChildDownOutcome {
    /// The originating child auto-restarts; hand this stopped-set to the
    /// Restart Engine.
    ToRestart(Vec<StoppedChild>),
    /// The originating child does not auto-restart; surface the set.
    Surfaced(Vec<StoppedChild>),
}

fn spawn_timer(pid: Pid, budget: Duration, mailbox: mpsc::Sender<ParentMessage>) -> TimerHandle {
    let join = tokio::spawn(async move {
        tokio::time::sleep(budget).await;
        let _ = mailbox.send(ParentMessage::ChildTimeout(pid)).await;
    });
    TimerHandle { join }
}

fn spawn_supervised(
    mut child: Box<dyn crate::child::Child>,
    pid: Pid,
    mailbox: mpsc::Sender<ParentMessage>,
) -> RunningHandle {
    let (stop_tx, stop_rx) = oneshot::channel();
    let join: JoinHandle<()> = tokio::spawn(async move {
        let reason = child.run(StopSignal(stop_rx)).await;
        let _ = mailbox.send(ParentMessage::ChildExit(pid, reason)).await;
    });
    RunningHandle {
        join,
        stop: Some(stop_tx),
    }
}

/// True if `id` would be indistinguishable from a runtime [`Pid`]'s
/// rendering (either its `<uuid>` `Display` form or a bare UUID), which
/// would make a later [`ChildRef::Id`] and [`ChildRef::Pid`] collide.
fn is_pid_shaped(id: &str) -> bool {
    let inner = id.strip_prefix('<').and_then(|s| s.strip_suffix('>')).unwrap_or(id);
    inner.parse::<uuid::Uuid>().is_ok()
}

/// Validates a spec against the live state (§4.3.1 steps 1-5).
fn validate(state: &ParentState, spec: &ChildSpec, key: ChildId) -> Result<(), ParentError> {
    if let Some(id) = &spec.id {
        if is_pid_shaped(id) {
            return Err(ParentError::InvalidChildId { id: id.clone() });
        }
        if let Some(existing) = state.resolve(&ChildRef::Id(id.clone())) {
            if existing != key {
                let pid = state.child_by_key(existing).and_then(|c| c.pid);
                return Err(ParentError::AlreadyStarted {
                    id: id.clone(),
                    pid: pid.map(|p| p.to_string()).unwrap_or_else(|| "none".to_string()),
                });
            }
        }
    }
    let resolved = state.resolve_all(&spec.binds_to).map_err(|missing| ParentError::MissingDeps {
        from: spec.id.clone().unwrap_or_else(|| key.to_string()),
        to: missing,
    })?;
    for target_key in &resolved {
        if let Some(target) = state.child_by_key(*target_key) {
            if target.spec.restart_policy.strength() < spec.restart_policy.strength() {
                return Err(ParentError::ForbiddenBindings {
                    from: spec.id.clone().unwrap_or_else(|| key.to_string()),
                    to: spec.binds_to.iter().cloned().collect(),
                });
            }
        }
    }
    if let Some(group) = &spec.shutdown_group {
        let members = state.children_in_group(group);
        for member_key in members {
            if let Some(member) = state.child_by_key(member_key) {
                if member.spec.restart_policy != spec.restart_policy {
                    return Err(ParentError::NonUniformShutdownGroup { group: group.clone() });
                }
            }
        }
    }
    Ok(())
}

/// Shared implementation behind both a fresh `start_child` call and a
/// Restart Engine re-spawn (which preserves the original key and startup
/// index instead of allocating new ones).
pub(crate) async fn validate_and_spawn(
    state: &mut ParentState,
    discovery: &Arc<dyn DiscoveryIndex>,
    monitor: &MonitorHandle,
    mailbox: &mpsc::Sender<ParentMessage>,
    key: ChildId,
    spec: ChildSpec,
    preserve_index: Option<u64>,
    restart_ring: RestartRing,
) -> Result<Option<Pid>, ParentError> {
    validate(state, &spec, key)?;
    let outcome = (spec.start)().await;
    match outcome {
        StartOutcome::Started(child) => {
            let pid = Pid::new();
            let running = spawn_supervised(child, pid, mailbox.clone());
            let timer = spec.timeout.map(|budget| spawn_timer(pid, budget, mailbox.clone()));
            if state.options.registry_enabled {
                discovery.register(key, spec.id.clone(), pid);
            }
            state.register(key, spec, Some(pid), serde_json::Value::Null, Some(running), timer, restart_ring, preserve_index);
            debug!(child = %key, %pid, "child started");
            emit_event(monitor, Some(key), SupervisionEventKind::ChildStarted).await;
            Ok(Some(pid))
        }
        StartOutcome::Ignored => {
            if spec.keep_ignored {
                state.register(key, spec, None, serde_json::Value::Null, None, None, restart_ring, preserve_index);
            }
            emit_event(monitor, Some(key), SupervisionEventKind::ChildIgnored).await;
            Ok(None)
        }
        StartOutcome::Failed(reason) => Err(ParentError::StartFailed { reason }),
    }
}

/// `start_child(state, spec)` (§4.3.1): validates, invokes the start
/// function, and registers the result as a brand-new child with a fresh
/// startup index.
pub async fn start_child(
    state: &mut ParentState,
    discovery: &Arc<dyn DiscoveryIndex>,
    monitor: &MonitorHandle,
    mailbox: &mpsc::Sender<ParentMessage>,
    spec: ChildSpec,
) -> Result<Option<Pid>, ParentError> {
    let key = ChildId::new();
    validate_and_spawn(state, discovery, monitor, mailbox, key, spec, None, RestartRing::new()).await
}

/// `start_all_children(specs)` (§6): atomic — on the first failure, shuts
/// down only the prefix started by *this call* and returns the error. Any
/// child the `Parent` already supervised before this call is left
/// untouched, per SPEC_FULL.md §6.
pub async fn start_all_children(
    state: &mut ParentState,
    discovery: &Arc<dyn DiscoveryIndex>,
    monitor: &MonitorHandle,
    mailbox: &mpsc::Sender<ParentMessage>,
    specs: Vec<ChildSpec>,
) -> Result<Vec<Option<Pid>>, ParentError> {
    let mut started = Vec::with_capacity(specs.len());
    let mut started_keys = Vec::with_capacity(specs.len());
    for spec in specs {
        let key = ChildId::new();
        match validate_and_spawn(state, discovery, monitor, mailbox, key, spec, None, RestartRing::new()).await {
            Ok(pid) => {
                started.push(pid);
                started_keys.push(key);
            }
            Err(err) => {
                let prefix = state.remove_keys(&started_keys);
                stop_children_in_reverse(prefix, ExitReason::Shutdown, monitor).await;
                return Err(err);
            }
        }
    }
    Ok(started)
}

/// Synchronous stop protocol for one child (§4.3.5 steps 1-6). Consumes the
/// already-popped record. Step 1 — cancel and drain any armed timeout
/// timer — applies to every record passed here, not just the one the
/// caller disarmed ahead of the pop: a bound sibling or shutdown-group
/// member swept into the same cascade still owns its own timer and must not
/// leak its spawned task.
async fn stop_one(mut record: ChildRecord, reason: ExitReason, monitor: &MonitorHandle) -> StoppedChild {
    let key = record.key;
    if let Some(timer) = record.timer.take() {
        timer.cancel();
    }
    if let Some(running) = record.running.take() {
        let RunningHandle { mut join, stop } = running;
        let brutal = record.spec.shutdown.is_brutal();
        if !brutal {
            if let Some(stop_tx) = stop {
                let _ = stop_tx.send(());
            }
            let budget = match record.spec.shutdown {
                crate::childspec::Shutdown::Timeout(d) => Some(d),
                crate::childspec::Shutdown::Infinity => None,
                crate::childspec::Shutdown::Brutal => unreachable!(),
            };
            let finished = match budget {
                Some(budget) => tokio::time::timeout(budget, &mut join).await.is_ok(),
                None => {
                    let _ = (&mut join).await;
                    true
                }
            };
            if !finished {
                warn!(child = %record.key, "shutdown budget exceeded, killing");
                join.abort();
                let _ = join.await;
            }
        } else {
            join.abort();
            let _ = join.await;
        }
    }
    emit_event(monitor, Some(key), SupervisionEventKind::ChildStopped { reason: reason.to_string() }).await;
    StoppedChild {
        record,
        exit_reason: reason,
        force_restart: false,
    }
}

/// Stops a set of already-popped records one at a time, in descending
/// `startup_index` order, each carrying the same `reason` (§4.3.5 "stopping
/// a set").
pub async fn stop_children_in_reverse(mut records: Vec<ChildRecord>, reason: ExitReason, monitor: &MonitorHandle) -> Vec<StoppedChild> {
    records.sort_by_key(|c| std::cmp::Reverse(c.startup_index));
    let mut stopped = Vec::with_capacity(records.len());
    for record in records {
        stopped.push(stop_one(record, reason.clone(), monitor).await);
    }
    stopped
}

/// Child-down handling (§4.3.3), triggered by a `ChildExit` message for a
/// tracked pid.
pub async fn handle_child_down(
    state: &mut ParentState,
    discovery: &Arc<dyn DiscoveryIndex>,
    monitor: &MonitorHandle,
    pid: Pid,
    reason: ExitReason,
) -> Option<ChildDownOutcome> {
    let key = state.resolve(&ChildRef::Pid(pid))?;
    state.disarm_timer(key);
    if state.options.registry_enabled {
        discovery.unregister(key);
    }
    let popped = state.pop_with_bound_siblings(key);
    let (originating, siblings): (Vec<_>, Vec<_>) = popped.into_iter().partition(|c| c.key == key);
    if !siblings.is_empty() {
        if let Some(group) = originating.first().and_then(|r| r.spec.shutdown_group.clone()) {
            emit_event(
                monitor,
                None,
                SupervisionEventKind::GroupStopped { group, count: siblings.len() + 1 },
            )
            .await;
        }
    }
    let mut stopped = stop_children_in_reverse(siblings, ExitReason::Shutdown, monitor).await;
    for record in originating {
        let should_restart = record.spec.restart_policy.should_restart(&reason);
        debug!(child = %record.key, %reason, should_restart, "child exited");
        stopped.push(StoppedChild {
            record,
            exit_reason: reason.clone(),
            force_restart: false,
        });
        if should_restart {
            return Some(ChildDownOutcome::ToRestart(stopped));
        } else {
            return Some(ChildDownOutcome::Surfaced(stopped));
        }
    }
    None
}

/// The timeout path of §4.3.2: the child is killed unconditionally and the
/// resulting down event is processed with reason `timeout`.
pub async fn handle_child_timeout(
    state: &mut ParentState,
    discovery: &Arc<dyn DiscoveryIndex>,
    monitor: &MonitorHandle,
    pid: Pid,
) -> Option<ChildDownOutcome> {
    if let Some(key) = state.resolve(&ChildRef::Pid(pid)) {
        if let Some(record) = state.child_by_key_mut(key) {
            if let Some(running) = record.running.take() {
                running.join.abort();
            }
        }
    }
    handle_child_down(state, discovery, monitor, pid, ExitReason::Timeout).await
}

/// `restart_child(ref, {include_temporary})` (§4.3.4): pops the closure,
/// stops it all with reason `shutdown`, force-marks the target, and
/// returns the stopped-set for the Restart Engine (the caller drives that
/// next step; see `restart_engine::run`).
pub async fn restart_child(
    state: &mut ParentState,
    discovery: &Arc<dyn DiscoveryIndex>,
    monitor: &MonitorHandle,
    r: &ChildRef,
) -> Result<Vec<StoppedChild>, ParentError> {
    let key = state.resolve(r).ok_or_else(|| ParentError::ChildNotFound { id: r.clone() })?;
    if state.options.registry_enabled {
        discovery.unregister(key);
    }
    state.disarm_timer(key);
    let popped = state.pop_with_bound_siblings(key);
    let mut stopped = stop_children_in_reverse(popped, ExitReason::Shutdown, monitor).await;
    for entry in &mut stopped {
        if entry.record.key == key {
            entry.force_restart = true;
        }
    }
    Ok(stopped)
}

/// `shutdown_child(ref)` (§4.3.4): pop, stop, discard. Bound siblings are
/// not preserved for a later restart.
pub async fn shutdown_child(
    state: &mut ParentState,
    discovery: &Arc<dyn DiscoveryIndex>,
    monitor: &MonitorHandle,
    r: &ChildRef,
) -> Result<(), ParentError> {
    let key = state.resolve(r).ok_or_else(|| ParentError::ChildNotFound { id: r.clone() })?;
    if state.options.registry_enabled {
        discovery.unregister(key);
    }
    state.disarm_timer(key);
    let popped = state.pop_with_bound_siblings(key);
    stop_children_in_reverse(popped, ExitReason::Shutdown, monitor).await;
    Ok(())
}

/// `update_child_meta(ref, fn)` (§4.3.4).
pub fn update_child_meta(
    state: &mut ParentState,
    discovery: &Arc<dyn DiscoveryIndex>,
    r: &ChildRef,
    f: impl FnOnce(serde_json::Value) -> serde_json::Value,
) -> Result<serde_json::Value, ParentError> {
    let key = state.resolve(r).ok_or_else(|| ParentError::ChildNotFound { id: r.clone() })?;
    let meta = state.update_meta(r, f).ok_or_else(|| ParentError::ChildNotFound { id: r.clone() })?;
    if state.options.registry_enabled {
        discovery.update_meta(key, meta.clone());
    }
    Ok(meta)
}
