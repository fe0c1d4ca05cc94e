//! Shutdown Coordinator (§4.7): the reverse-startup-order termination of
//! every surviving child when the owner itself is stopping.

use std::sync::Arc;

use crate::childspec::ExitReason;
use crate::discovery::DiscoveryIndex;
use crate::lifecycle::stop_children_in_reverse;
use crate::monitoring::MonitorHandle;
use crate::state::{ParentState, StoppedChild};

/// `shutdown_all(reason)` (§4.3.4, §4.7): idempotent — calling it on an
/// already-empty state is a safe no-op. A `Normal` reason is mapped to
/// `Shutdown` so a normal-exit reason never leaks out as a child
/// termination reason. Returns the stopped-set (glossary) so a caller can
/// later hand it to `return_children` (§8 law L3).
pub async fn shutdown_all(state: &mut ParentState, discovery: &Arc<dyn DiscoveryIndex>, monitor: &MonitorHandle, reason: ExitReason) -> Vec<StoppedChild> {
    let reason = if reason.is_normal() { ExitReason::Shutdown } else { reason };
    let all = state.drain_all();
    if state.options.registry_enabled {
        for record in &all {
            discovery.unregister(record.key);
        }
    }
    stop_children_in_reverse(all, reason, monitor).await
}
