//! Supervision Benchmarks
//!
//! Measures baseline performance of core supervision operations:
//! - `start_child` via the builder, bare and with bindings/groups
//! - `which_children` / `count_children` tree-walk queries over a populated tree

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

// Layer 1: Standard library imports
use std::hint::black_box;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use criterion::{criterion_group, criterion_main, Criterion};

// Layer 3: Internal module imports
use parentage::child::{Child, StopSignal};
use parentage::childspec::{ChildRef, ChildSpecBuilder, ExitReason, StartOutcome};
use parentage::{Parent, ParentOptions};

struct BenchChild;

#[async_trait]
impl Child for BenchChild {
    async fn run(&mut self, mut stop: StopSignal) -> ExitReason {
        stop.requested().await;
        ExitReason::Shutdown
    }
}

fn start_fn() -> parentage::childspec::StartFn {
    Arc::new(|| Box::pin(async { StartOutcome::Started(Box::new(BenchChild)) }))
}

fn start_child_bare(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("failed to create runtime");

    c.bench_function("start_child_bare", |b| {
        b.to_async(&rt).iter(|| async {
            let mut parent = Parent::new(ParentOptions::default());
            let spec = ChildSpecBuilder::new(start_fn()).id("bench-child").permanent().build().expect("valid spec");
            let pid = parent.start_child(spec).await.expect("start succeeds");
            black_box(pid);
        });
    });
}

fn start_child_with_binding(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("failed to create runtime");

    c.bench_function("start_child_with_binding", |b| {
        b.to_async(&rt).iter(|| async {
            let mut parent = Parent::new(ParentOptions::default());
            let a = ChildSpecBuilder::new(start_fn()).id("a").permanent().build().expect("valid spec");
            parent.start_child(a).await.expect("start succeeds");
            let b_spec = ChildSpecBuilder::new(start_fn())
                .id("b")
                .permanent()
                .binds_to([ChildRef::from("a")])
                .build()
                .expect("valid spec");
            let pid = parent.start_child(b_spec).await.expect("start succeeds");
            black_box(pid);
        });
    });
}

fn tree_walk_queries(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("failed to create runtime");
    let mut parent = Parent::new(ParentOptions::default());
    rt.block_on(async {
        for i in 0..50 {
            let spec = ChildSpecBuilder::new(start_fn()).id(format!("child-{i}")).permanent().build().expect("valid spec");
            parent.start_child(spec).await.expect("start succeeds");
        }
    });

    c.bench_function("which_children_50", |b| {
        b.iter(|| black_box(parent.which_children()));
    });

    c.bench_function("count_children_50", |b| {
        b.iter(|| black_box(parent.count_children()));
    });
}

criterion_group!(benches, start_child_bare, start_child_with_binding, tree_walk_queries);
criterion_main!(benches);
