//! End-to-end scenarios exercising the Lifecycle and Restart Engines
//! together through the `Parent` façade.

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parentage::child::{Child, StopSignal};
use parentage::childspec::{ChildRef, ChildSpecBuilder, ExitReason, StartOutcome};
use parentage::dispatch::{DispatchOutcome, ParentMessage};
use parentage::error::ParentError;
use parentage::{Parent, ParentOptions};

/// A child that runs until told to stop, then exits with `Shutdown`.
struct LongRunning;

#[async_trait]
impl Child for LongRunning {
    async fn run(&mut self, mut stop: StopSignal) -> ExitReason {
        stop.requested().await;
        ExitReason::Shutdown
    }
}

fn long_running() -> parentage::childspec::StartFn {
    Arc::new(|| Box::pin(async { StartOutcome::Started(Box::new(LongRunning)) }))
}

/// A child whose `run` returns immediately with a fixed reason, modeling
/// an instant crash or a normal self-exit.
struct ExitsWith(ExitReason);

#[async_trait]
impl Child for ExitsWith {
    async fn run(&mut self, _stop: StopSignal) -> ExitReason {
        self.0.clone()
    }
}

fn exits_with(reason: ExitReason) -> parentage::childspec::StartFn {
    Arc::new(move || {
        let reason = reason.clone();
        Box::pin(async move { StartOutcome::Started(Box::new(ExitsWith(reason))) })
    })
}

fn ignoring() -> parentage::childspec::StartFn {
    Arc::new(|| Box::pin(async { StartOutcome::Ignored }))
}

/// A start function that fails on exactly its second invocation (modeling a
/// restart attempt that fails once, then succeeds on the deferred retry).
fn flaky_fails_second_call() -> parentage::childspec::StartFn {
    let calls = Arc::new(AtomicU32::new(0));
    Arc::new(move || {
        let calls = Arc::clone(&calls);
        Box::pin(async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n == 2 {
                StartOutcome::Failed("boom".to_string())
            } else {
                StartOutcome::Started(Box::new(LongRunning))
            }
        })
    })
}

#[tokio::test]
async fn cascading_down_restarts_in_order() {
    let mut parent = Parent::new(ParentOptions::default());

    // A crashes as soon as it starts; its exit message is already queued
    // in the owner's mailbox by the time we process it below.
    let a = ChildSpecBuilder::new(exits_with(ExitReason::Crashed("boom".to_string())))
        .id("a")
        .permanent()
        .build()
        .unwrap();
    parent.start_child(a).await.unwrap();

    let b = ChildSpecBuilder::new(long_running())
        .id("b")
        .permanent()
        .binds_to([ChildRef::from("a")])
        .build()
        .unwrap();
    parent.start_child(b).await.unwrap();

    let c = ChildSpecBuilder::new(long_running())
        .id("c")
        .transient()
        .binds_to([ChildRef::from("b")])
        .build()
        .unwrap();
    parent.start_child(c).await.unwrap();

    assert_eq!(parent.num_children(), 3);

    // Drain A's already-queued crash notification.
    let outcome = parent.handle_next_message().await;

    // A was permanent, so the whole cascade restarts; nothing is left to
    // surface.
    assert!(matches!(outcome, DispatchOutcome::Ignore));
    assert_eq!(parent.num_children(), 3);
    assert!(parent.has_child(&ChildRef::from("a")));
    assert!(parent.has_child(&ChildRef::from("b")));
    assert!(parent.has_child(&ChildRef::from("c")));
}

#[tokio::test]
async fn binding_strength_rejects_stronger_dependent() {
    let mut parent = Parent::new(ParentOptions::default());

    let a = ChildSpecBuilder::new(long_running()).id("a").temporary().build().unwrap();
    parent.start_child(a).await.unwrap();

    let b = ChildSpecBuilder::new(long_running())
        .id("b")
        .permanent()
        .binds_to([ChildRef::from("a")])
        .build()
        .unwrap();
    let err = parent.start_child(b).await.unwrap_err();
    assert!(matches!(err, ParentError::ForbiddenBindings { .. }));

    assert_eq!(parent.num_children(), 1);
    assert!(parent.has_child(&ChildRef::from("a")));
}

#[tokio::test]
async fn shutdown_group_members_stop_together_without_restart() {
    let mut parent = Parent::new(ParentOptions::default());

    let x = ChildSpecBuilder::new(long_running())
        .id("x")
        .transient()
        .shutdown_group("g")
        .build()
        .unwrap();
    let y = ChildSpecBuilder::new(exits_with(ExitReason::Normal))
        .id("y")
        .transient()
        .shutdown_group("g")
        .build()
        .unwrap();

    parent.start_child(x).await.unwrap();
    let y_pid = parent.start_child(y).await.unwrap().unwrap();

    let outcome = parent.handle_message(ParentMessage::ChildExit(y_pid, ExitReason::Normal)).await;

    match outcome {
        DispatchOutcome::StoppedChildren(stopped) => {
            assert_eq!(stopped.len(), 2);
        }
        _ => panic!("expected a surfaced stopped-set"),
    }
    assert_eq!(parent.num_children(), 0);
}

#[tokio::test]
async fn ignored_child_with_keep_ignored_false_is_not_retained() {
    let mut parent = Parent::new(ParentOptions::default());

    let q = ChildSpecBuilder::new(ignoring()).id("q").keep_ignored(false).build().unwrap();
    let pid = parent.start_child(q).await.unwrap();

    assert!(pid.is_none());
    assert_eq!(parent.num_children(), 0);
    assert!(!parent.has_child(&ChildRef::from("q")));
}

#[tokio::test]
async fn ignored_child_with_keep_ignored_true_is_retained_without_pid() {
    let mut parent = Parent::new(ParentOptions::default());

    let q = ChildSpecBuilder::new(ignoring()).id("q").keep_ignored(true).build().unwrap();
    let pid = parent.start_child(q).await.unwrap();

    assert!(pid.is_none());
    assert_eq!(parent.num_children(), 1);
    assert!(parent.has_child(&ChildRef::from("q")));
}

#[tokio::test]
async fn shutdown_all_empties_state() {
    let mut parent = Parent::new(ParentOptions::default());

    for i in 0..3 {
        let spec = ChildSpecBuilder::new(long_running()).id(format!("child-{i}")).permanent().build().unwrap();
        parent.start_child(spec).await.unwrap();
    }
    assert_eq!(parent.num_children(), 3);

    parent.shutdown_all(ExitReason::Normal).await;
    assert_eq!(parent.num_children(), 0);
}

#[tokio::test]
async fn transient_child_does_not_restart_on_normal_exit() {
    let mut parent = Parent::new(ParentOptions::default());

    let w = ChildSpecBuilder::new(exits_with(ExitReason::Normal)).id("w").transient().build().unwrap();
    let pid = parent.start_child(w).await.unwrap().unwrap();

    let outcome = parent.handle_message(ParentMessage::ChildExit(pid, ExitReason::Normal)).await;
    match outcome {
        DispatchOutcome::StoppedChildren(stopped) => assert_eq!(stopped.len(), 1),
        _ => panic!("expected surfaced stopped-set for a transient normal exit"),
    }
    assert_eq!(parent.num_children(), 0);
}

#[tokio::test]
async fn duplicate_id_is_rejected() {
    let mut parent = Parent::new(ParentOptions::default());
    let a = ChildSpecBuilder::new(long_running()).id("dup").permanent().build().unwrap();
    parent.start_child(a).await.unwrap();

    let a2 = ChildSpecBuilder::new(long_running()).id("dup").permanent().build().unwrap();
    let err = parent.start_child(a2).await.unwrap_err();
    assert!(matches!(err, ParentError::AlreadyStarted { .. }));
}

#[tokio::test]
async fn timed_out_child_is_killed_and_restarted() {
    let mut parent = Parent::new(ParentOptions::default());

    let w = ChildSpecBuilder::new(long_running())
        .id("w")
        .permanent()
        .timeout(Duration::from_millis(20))
        .build()
        .unwrap();
    parent.start_child(w).await.unwrap();
    assert_eq!(parent.num_children(), 1);

    // The child never exits on its own, so the only mailbox traffic is its
    // own startup timer firing `ChildTimeout`.
    let outcome = parent.handle_next_message().await;
    assert!(matches!(outcome, DispatchOutcome::Ignore));
    assert_eq!(parent.num_children(), 1);
    assert!(parent.has_child(&ChildRef::from("w")));
}

#[tokio::test]
async fn parent_wide_intensity_ceiling_escalates_and_shuts_down() {
    let options = ParentOptions::builder().max_restarts(Some(0)).max_seconds(Duration::from_secs(5)).build().unwrap();
    let mut parent = Parent::new(options);

    let a = ChildSpecBuilder::new(exits_with(ExitReason::Crashed("boom".to_string())))
        .id("a")
        .permanent()
        .build()
        .unwrap();
    parent.start_child(a).await.unwrap();

    // A's crash is already queued; with zero restarts allowed, the very
    // first restart attempt exceeds the ceiling and escalates.
    let outcome = parent.handle_next_message().await;
    assert!(matches!(outcome, DispatchOutcome::Ignore));
    assert!(parent.is_escalated());
    assert_eq!(parent.num_children(), 0);
}

#[tokio::test]
async fn partial_restart_failure_is_deferred_and_retried() {
    let mut parent = Parent::new(ParentOptions::default());

    let a = ChildSpecBuilder::new(exits_with(ExitReason::Crashed("boom".to_string())))
        .id("a")
        .permanent()
        .build()
        .unwrap();
    parent.start_child(a).await.unwrap();

    let b = ChildSpecBuilder::new(flaky_fails_second_call())
        .id("b")
        .permanent()
        .binds_to([ChildRef::from("a")])
        .build()
        .unwrap();
    parent.start_child(b).await.unwrap();
    assert_eq!(parent.num_children(), 2);

    // A's crash cascades into restarting both; B's restart attempt (its
    // second invocation) fails and is deferred to the mailbox.
    let outcome = parent.handle_next_message().await;
    match outcome {
        DispatchOutcome::StoppedChildren(stopped) => assert_eq!(stopped.len(), 1),
        _ => panic!("expected B to be surfaced as still-stopped"),
    }
    assert_eq!(parent.num_children(), 1);
    assert!(parent.has_child(&ChildRef::from("a")));

    // The deferred retry succeeds on B's third invocation.
    let outcome = parent.handle_next_message().await;
    assert!(matches!(outcome, DispatchOutcome::Ignore));
    assert_eq!(parent.num_children(), 2);
    assert!(parent.has_child(&ChildRef::from("b")));
}
