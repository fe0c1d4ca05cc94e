//! Restart Engine Benchmarks
//!
//! Measures the cost of the restart path in isolation:
//! - a single permanent child's crash-and-restart round trip
//! - a cascading restart across a three-deep binding chain

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

// Layer 1: Standard library imports
use std::hint::black_box;
use std::sync::{Arc, Mutex};

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use criterion::{criterion_group, criterion_main, Criterion};

// Layer 3: Internal module imports
use parentage::child::{Child, StopSignal};
use parentage::childspec::{ChildRef, ChildSpecBuilder, ExitReason, StartOutcome};
use parentage::dispatch::ParentMessage;
use parentage::{Parent, ParentOptions};

struct CrashOnce {
    crashed: Arc<Mutex<bool>>,
}

#[async_trait]
impl Child for CrashOnce {
    async fn run(&mut self, _stop: StopSignal) -> ExitReason {
        let mut crashed = self.crashed.lock().expect("lock poisoned");
        if *crashed {
            ExitReason::Normal
        } else {
            *crashed = true;
            ExitReason::Crashed("boom".to_string())
        }
    }
}

fn crash_once_start_fn(crashed: Arc<Mutex<bool>>) -> parentage::childspec::StartFn {
    Arc::new(move || {
        let crashed = Arc::clone(&crashed);
        Box::pin(async move { StartOutcome::Started(Box::new(CrashOnce { crashed })) })
    })
}

fn single_child_restart_round_trip(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("failed to create runtime");

    c.bench_function("single_child_restart_round_trip", |b| {
        b.to_async(&rt).iter(|| async {
            let mut parent = Parent::new(ParentOptions::builder().max_restarts(None).build().expect("valid options"));
            let crashed = Arc::new(Mutex::new(false));
            let spec = ChildSpecBuilder::new(crash_once_start_fn(crashed)).id("flaky").permanent().build().expect("valid spec");
            let pid = parent.start_child(spec).await.expect("start succeeds").expect("not ignored");
            let outcome = parent
                .handle_message(ParentMessage::ChildExit(pid, ExitReason::Crashed("boom".to_string())))
                .await;
            black_box(outcome);
        });
    });
}

fn restart_with_binding_chain(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("failed to create runtime");

    c.bench_function("restart_with_binding_chain", |b| {
        b.to_async(&rt).iter(|| async {
            let mut parent = Parent::new(ParentOptions::builder().max_restarts(None).build().expect("valid options"));
            let crashed = Arc::new(Mutex::new(false));
            let a = ChildSpecBuilder::new(crash_once_start_fn(crashed)).id("a").permanent().build().expect("valid spec");
            let a_pid = parent.start_child(a).await.expect("start succeeds").expect("not ignored");
            let b_spec = ChildSpecBuilder::new(crash_once_start_fn(Arc::new(Mutex::new(true))))
                .id("b")
                .permanent()
                .binds_to([ChildRef::from("a")])
                .build()
                .expect("valid spec");
            parent.start_child(b_spec).await.expect("start succeeds");
            let outcome = parent
                .handle_message(ParentMessage::ChildExit(a_pid, ExitReason::Crashed("boom".to_string())))
                .await;
            black_box(outcome);
        });
    });
}

criterion_group!(benches, single_child_restart_round_trip, restart_with_binding_chain);
criterion_main!(benches);
