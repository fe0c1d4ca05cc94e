//! Restart Engine (§4.4): computes the ordered restart set, enforces
//! restart-intensity ceilings, and handles partial failure with a deferred
//! retry. Intensity accounting and the restart-eligibility check are folded
//! into one ordered-restart-set pass rather than kept as two separate
//! passes.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::childspec::ChildId;
use crate::discovery::DiscoveryIndex;
use crate::dispatch::ParentMessage;
use crate::error::ParentError;
use crate::lifecycle::{self, emit_event, stop_children_in_reverse};
use crate::monitoring::{MonitorHandle, SupervisionEventKind};
use crate::state::{ParentState, StoppedChild};

/// Why the parent gave up (§7 "the only path by which the core forcibly
/// terminates its owner").
#[derive(Debug, Clone)]
pub enum EscalationReason {
    ChildIntensity(ChildId),
    ParentIntensity,
}

pub enum RestartOutcome {
    /// Restart attempted for every eligible descriptor; any that failed to
    /// come back are in `remaining` (non-empty only for a partial failure
    /// where the deferred retry has already been queued, per §4.4 step 5c).
    Completed { remaining: Vec<StoppedChild> },
    /// A restart-intensity ceiling was exceeded. The full set of
    /// descriptors that must now be shut down is returned for the caller
    /// to pass to `shutdown_all`.
    Escalate {
        reason: EscalationReason,
        to_shut_down: Vec<StoppedChild>,
    },
}

/// True once a count crosses 80% of `max` (never for `None`, i.e. infinity).
fn approaching_ceiling(count: usize, max: Option<u32>) -> bool {
    match max {
        None => false,
        Some(max) => count as f64 >= 0.8 * max as f64,
    }
}

/// Runs the Restart Engine over one stopped-set (§4.4 steps 1-6).
pub async fn run(
    state: &mut ParentState,
    discovery: &Arc<dyn DiscoveryIndex>,
    monitor: &MonitorHandle,
    mailbox: &mpsc::Sender<ParentMessage>,
    mut stopped: Vec<StoppedChild>,
    include_temporary: bool,
) -> RestartOutcome {
    let now = Utc::now();
    let window = state.parent_restart_window();
    let max_parent = state.parent_max_restarts();

    // Step 1: charge one restart event against the parent-wide counter and
    // against every stopped descriptor's own counter.
    let parent_exceeded = state.restart_ring.record_and_check(now, window, max_parent);
    if parent_exceeded {
        error!("parent-wide restart intensity ceiling exceeded");
        emit_event(
            monitor,
            None,
            SupervisionEventKind::RestartIntensityExceeded { scope: crate::monitoring::IntensityScope::Parent },
        )
        .await;
        emit_event(
            monitor,
            None,
            SupervisionEventKind::Escalated { scope: crate::monitoring::IntensityScope::Parent },
        )
        .await;
        return RestartOutcome::Escalate {
            reason: EscalationReason::ParentIntensity,
            to_shut_down: stopped,
        };
    } else if approaching_ceiling(state.restart_ring.count(), max_parent) {
        warn!(count = state.restart_ring.count(), "parent-wide restart intensity approaching ceiling");
    }
    for entry in &mut stopped {
        let exceeded = entry.record.restart_ring.record_and_check(now, entry.record.spec.max_seconds, entry.record.spec.max_restarts);
        if exceeded {
            let id = entry.record.key;
            error!(child = %id, "per-child restart intensity ceiling exceeded");
            let scope = crate::monitoring::IntensityScope::Child(id.to_string());
            emit_event(monitor, Some(id), SupervisionEventKind::RestartIntensityExceeded { scope: scope.clone() }).await;
            emit_event(monitor, Some(id), SupervisionEventKind::Escalated { scope }).await;
            return RestartOutcome::Escalate {
                reason: EscalationReason::ChildIntensity(id),
                to_shut_down: stopped,
            };
        } else if approaching_ceiling(entry.record.restart_ring.count(), entry.record.spec.max_restarts) {
            warn!(child = %entry.record.key, count = entry.record.restart_ring.count(), "restart intensity approaching ceiling");
        }
    }

    // Step 2: filter out temporaries that were not force-marked and that
    // the caller did not ask to include.
    let (mut to_restart, dropped): (Vec<StoppedChild>, Vec<StoppedChild>) = stopped.into_iter().partition(|entry| {
        entry.force_restart || include_temporary || entry.record.spec.restart_policy != crate::childspec::RestartPolicy::Temporary
    });
    for entry in dropped {
        info!(child = %entry.record.key, "dropping temporary child from restart set");
    }

    // Step 3: sort by original startup_index ascending.
    to_restart.sort_by_key(|entry| entry.record.startup_index);

    // Step 4-5: attempt each in order, preserving startup_index; on first
    // failure, abandon the remainder and defer it.
    let mut remaining: Vec<StoppedChild> = Vec::new();
    let mut restarted_keys = std::collections::HashSet::new();
    let mut failed = false;
    for entry in to_restart {
        if failed {
            remaining.push(entry);
            continue;
        }
        let key = entry.record.key;
        let startup_index = entry.record.startup_index;
        let restart_ring = entry.record.restart_ring.clone();
        let spec = entry.record.spec.clone();
        match lifecycle::validate_and_spawn(state, discovery, monitor, mailbox, key, spec, Some(startup_index), restart_ring).await {
            Ok(_) => {
                restarted_keys.insert(key);
                emit_event(monitor, Some(key), SupervisionEventKind::ChildRestarted).await;
            }
            Err(err) => {
                error!(child = %key, error = %err, "restart attempt failed");
                failed = true;
                let mut entry = entry;
                entry.force_restart = true;
                remaining.push(entry);
            }
        }
    }

    if remaining.is_empty() {
        return RestartOutcome::Completed { remaining };
    }

    // Step 5b: children that were successfully restarted but are bound to
    // a still-stopped sibling must be stopped again too.
    let mut additionally_stopped = Vec::new();
    for key in restarted_keys {
        let still_needed = state
            .child_by_key(key)
            .map(|record| {
                record
                    .spec
                    .binds_to
                    .iter()
                    .filter_map(|r| state.resolve(r))
                    .any(|target| remaining.iter().any(|entry| entry.record.key == target))
            })
            .unwrap_or(false);
        if still_needed {
            let popped = state.pop_with_bound_siblings(key);
            additionally_stopped.extend(stop_children_in_reverse(popped, crate::childspec::ExitReason::Shutdown, monitor).await);
        }
    }
    remaining.extend(additionally_stopped);

    // Step 5c: post the deferred retry to the tail of the owner's mailbox,
    // yielding control so other pending events are processed first. A
    // snapshot travels through the channel; `remaining` itself is still
    // returned below so a manual caller (e.g. `restart_child`) can also
    // see it synchronously, per §4.4 step 6.
    let snapshot: Vec<StoppedChild> = remaining
        .iter()
        .map(|entry| StoppedChild {
            record: entry.record.clone_stopped(),
            exit_reason: entry.exit_reason.clone(),
            force_restart: entry.force_restart,
        })
        .collect();
    let _ = mailbox.send(ParentMessage::ResumeRestart(snapshot)).await;

    RestartOutcome::Completed { remaining }
}
