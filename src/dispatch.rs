//! Message Dispatcher (§4.6): classifies messages arriving on the owner's
//! mailbox into the fixed small set of shapes the core cares about.

use crate::childspec::{ChildRef, ExitReason, Pid};
use crate::state::StoppedChild;

/// A query answered synchronously and reported to the Dispatcher as
/// *ignore* (§4.6). The owner's host behaviour is expected to funnel
/// external client requests into one of these.
#[derive(Debug, Clone)]
pub enum ClientQuery {
    WhichChildren,
    CountChildren,
    GetChildSpec(ChildRef),
}

/// Everything that can arrive in the owner's mailbox that the core itself
/// understands.
pub enum ParentMessage {
    /// A child's task completed, carrying its pid and exit reason.
    ChildExit(Pid, ExitReason),
    /// A per-child timeout timer expired.
    ChildTimeout(Pid),
    /// A deferred restart retry, posted to the tail of the mailbox by the
    /// Restart Engine (§4.4 step 5c).
    ResumeRestart(Vec<StoppedChild>),
    /// A client query funneled in by the host behaviour.
    Query(ClientQuery),
}

/// What classifying and handling one message yields back to the owner's
/// dispatch loop (§4.6).
pub enum DispatchOutcome {
    /// Not a shape the core understands.
    Unhandled,
    /// Handled, nothing further for the caller to do.
    Ignore,
    /// A stopped-set surfaced because the originating child did not
    /// auto-restart.
    StoppedChildren(Vec<StoppedChild>),
}
