//! Typed supervision telemetry (§10 [FULL]).
//!
//! A generic `Monitor<E: MonitoringEvent>` trait, a typed `SupervisionEvent`
//! record, and `Noop`/`InMemory` implementations. This crate reaches for
//! `Monitor<SupervisionEvent>` only through `Arc<dyn Monitor<SupervisionEvent>>`
//! (the same object-behind-an-Arc shape `discovery::DiscoveryIndex` already
//! uses here), so the trait has no `Clone` supertrait bound — a trait object
//! cannot be `Clone`, and `Arc` already makes the handle cheap to share.
//!
//! Every lifecycle transition the Lifecycle Engine, Restart Engine, and
//! Shutdown Coordinator perform records one of these events *and* emits a
//! `tracing` event at the call site (§10): a host that already wires up
//! `tracing_subscriber` gets these for free, and a host that wants
//! queryable counters/history can additionally plug in an
//! [`InMemoryMonitor`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use std::sync::Arc;

use crate::childspec::ChildId;

/// Shared handle to the core's telemetry sink, held by [`crate::parent::Parent`]
/// the same way it holds `Arc<dyn DiscoveryIndex>` for the discovery index.
pub type MonitorHandle = Arc<dyn Monitor<SupervisionEvent>>;

/// Errors a [`Monitor`] implementation can surface.
#[derive(Debug, Error)]
pub enum MonitoringError {
    #[error("failed to record event: {message}")]
    RecordError { message: String },
    #[error("failed to generate snapshot: {message}")]
    SnapshotError { message: String },
}

/// Event severity, ordered lowest to highest for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

/// An event type a [`Monitor`] can record. The core only ever uses
/// [`SupervisionEvent`], but the trait is left generic so a host embedding
/// several subsystems can share one monitoring abstraction across all of
/// them.
pub trait MonitoringEvent: Send + Sync + Clone + Serialize + 'static {
    const EVENT_TYPE: &'static str;
    fn timestamp(&self) -> DateTime<Utc>;
    fn severity(&self) -> EventSeverity;
}

/// Snapshot of a monitor's accumulated state.
#[derive(Debug, Clone, Serialize)]
pub struct MonitoringSnapshot<E: MonitoringEvent> {
    pub timestamp: DateTime<Utc>,
    pub total_events: u64,
    pub debug_count: u64,
    pub info_count: u64,
    pub warning_count: u64,
    pub error_count: u64,
    pub critical_count: u64,
    pub recent_events: Vec<E>,
}

/// Generic recorder for supervision telemetry. Object-safe via `async-trait`
/// so the core can hold `Arc<dyn Monitor<SupervisionEvent>>` without
/// monomorphizing `Parent` over a monitor type parameter.
#[async_trait]
pub trait Monitor<E: MonitoringEvent>: Send + Sync {
    async fn record(&self, event: E) -> Result<(), MonitoringError>;
    async fn snapshot(&self) -> Result<MonitoringSnapshot<E>, MonitoringError>;
    async fn reset(&self) -> Result<(), MonitoringError>;
}

/// The scope a restart-intensity ceiling was exceeded at (§4.4, §7).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum IntensityScope {
    Child(String),
    Parent,
}

/// Supervision telemetry: every child-lifecycle transition the core
/// performs (§10). The `child` field carries the internal [`ChildId`] as a
/// string since the type itself does not implement `Serialize` the way a
/// bare UUID wrapper is expected to for a telemetry payload read by
/// external tooling.
#[derive(Debug, Clone, Serialize)]
pub struct SupervisionEvent {
    pub timestamp: DateTime<Utc>,
    pub child: Option<String>,
    pub kind: SupervisionEventKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum SupervisionEventKind {
    ChildStarted,
    ChildIgnored,
    ChildStopped { reason: String },
    ChildRestarted,
    GroupStopped { group: String, count: usize },
    RestartIntensityExceeded { scope: IntensityScope },
    Escalated { scope: IntensityScope },
}

impl SupervisionEvent {
    pub(crate) fn new(child: Option<ChildId>, kind: SupervisionEventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            child: child.map(|c| c.to_string()),
            kind,
        }
    }
}

impl MonitoringEvent for SupervisionEvent {
    const EVENT_TYPE: &'static str = "supervision";

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn severity(&self) -> EventSeverity {
        match &self.kind {
            SupervisionEventKind::ChildStarted | SupervisionEventKind::ChildIgnored => EventSeverity::Debug,
            SupervisionEventKind::ChildStopped { .. } => EventSeverity::Info,
            SupervisionEventKind::ChildRestarted => EventSeverity::Warning,
            SupervisionEventKind::GroupStopped { .. } => EventSeverity::Info,
            SupervisionEventKind::RestartIntensityExceeded { .. } => EventSeverity::Error,
            SupervisionEventKind::Escalated { .. } => EventSeverity::Critical,
        }
    }
}

/// Zero-overhead [`Monitor`] used when no telemetry sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMonitor;

impl NoopMonitor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl<E: MonitoringEvent> Monitor<E> for NoopMonitor {
    async fn record(&self, _event: E) -> Result<(), MonitoringError> {
        Ok(())
    }

    async fn snapshot(&self) -> Result<MonitoringSnapshot<E>, MonitoringError> {
        Ok(MonitoringSnapshot {
            timestamp: Utc::now(),
            total_events: 0,
            debug_count: 0,
            info_count: 0,
            warning_count: 0,
            error_count: 0,
            critical_count: 0,
            recent_events: Vec::new(),
        })
    }

    async fn reset(&self) -> Result<(), MonitoringError> {
        Ok(())
    }
}

/// In-memory [`Monitor`] backed by atomic counters and a bounded ring
/// buffer of recent events (atomics for counting, `RwLock` for the
/// read-heavy history buffer).
pub struct InMemoryMonitor<E: MonitoringEvent> {
    max_history: usize,
    total: AtomicU64,
    debug: AtomicU64,
    info: AtomicU64,
    warning: AtomicU64,
    error: AtomicU64,
    critical: AtomicU64,
    history: RwLock<VecDeque<E>>,
}

impl<E: MonitoringEvent> InMemoryMonitor<E> {
    pub fn new(max_history: usize) -> Self {
        Self {
            max_history,
            total: AtomicU64::new(0),
            debug: AtomicU64::new(0),
            info: AtomicU64::new(0),
            warning: AtomicU64::new(0),
            error: AtomicU64::new(0),
            critical: AtomicU64::new(0),
            history: RwLock::new(VecDeque::new()),
        }
    }
}

impl<E: MonitoringEvent> Default for InMemoryMonitor<E> {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl<E: MonitoringEvent> Monitor<E> for InMemoryMonitor<E> {
    async fn record(&self, event: E) -> Result<(), MonitoringError> {
        self.total.fetch_add(1, Ordering::Relaxed);
        match event.severity() {
            EventSeverity::Debug => self.debug.fetch_add(1, Ordering::Relaxed),
            EventSeverity::Info => self.info.fetch_add(1, Ordering::Relaxed),
            EventSeverity::Warning => self.warning.fetch_add(1, Ordering::Relaxed),
            EventSeverity::Error => self.error.fetch_add(1, Ordering::Relaxed),
            EventSeverity::Critical => self.critical.fetch_add(1, Ordering::Relaxed),
        };
        let mut history = self.history.write().map_err(|_| MonitoringError::RecordError {
            message: "history lock poisoned".to_string(),
        })?;
        history.push_back(event);
        while history.len() > self.max_history {
            history.pop_front();
        }
        Ok(())
    }

    async fn snapshot(&self) -> Result<MonitoringSnapshot<E>, MonitoringError> {
        let history = self.history.read().map_err(|_| MonitoringError::SnapshotError {
            message: "history lock poisoned".to_string(),
        })?;
        Ok(MonitoringSnapshot {
            timestamp: Utc::now(),
            total_events: self.total.load(Ordering::Relaxed),
            debug_count: self.debug.load(Ordering::Relaxed),
            info_count: self.info.load(Ordering::Relaxed),
            warning_count: self.warning.load(Ordering::Relaxed),
            error_count: self.error.load(Ordering::Relaxed),
            critical_count: self.critical.load(Ordering::Relaxed),
            recent_events: history.iter().cloned().collect(),
        })
    }

    async fn reset(&self) -> Result<(), MonitoringError> {
        self.total.store(0, Ordering::Relaxed);
        self.debug.store(0, Ordering::Relaxed);
        self.info.store(0, Ordering::Relaxed);
        self.warning.store(0, Ordering::Relaxed);
        self.error.store(0, Ordering::Relaxed);
        self.critical.store(0, Ordering::Relaxed);
        let mut history = self.history.write().map_err(|_| MonitoringError::RecordError {
            message: "history lock poisoned".to_string(),
        })?;
        history.clear();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code - unwrap is acceptable for test setup
mod tests {
    use super::*;

    fn event(kind: SupervisionEventKind) -> SupervisionEvent {
        SupervisionEvent::new(None, kind)
    }

    #[tokio::test]
    async fn noop_monitor_discards_everything() {
        let monitor = NoopMonitor::new();
        Monitor::<SupervisionEvent>::record(&monitor, event(SupervisionEventKind::ChildStarted))
            .await
            .unwrap();
        let snapshot = Monitor::<SupervisionEvent>::snapshot(&monitor).await.unwrap();
        assert_eq!(snapshot.total_events, 0);
    }

    #[tokio::test]
    async fn in_memory_monitor_counts_by_severity() {
        let monitor = InMemoryMonitor::<SupervisionEvent>::new(10);
        monitor.record(event(SupervisionEventKind::ChildStarted)).await.unwrap();
        monitor
            .record(event(SupervisionEventKind::RestartIntensityExceeded { scope: IntensityScope::Parent }))
            .await
            .unwrap();
        let snapshot = monitor.snapshot().await.unwrap();
        assert_eq!(snapshot.total_events, 2);
        assert_eq!(snapshot.debug_count, 1);
        assert_eq!(snapshot.error_count, 1);
        assert_eq!(snapshot.recent_events.len(), 2);
    }

    #[tokio::test]
    async fn in_memory_monitor_bounds_history() {
        let monitor = InMemoryMonitor::<SupervisionEvent>::new(2);
        for _ in 0..5 {
            monitor.record(event(SupervisionEventKind::ChildStarted)).await.unwrap();
        }
        let snapshot = monitor.snapshot().await.unwrap();
        assert_eq!(snapshot.total_events, 5);
        assert_eq!(snapshot.recent_events.len(), 2);
    }

    #[tokio::test]
    async fn reset_clears_counters_and_history() {
        let monitor = InMemoryMonitor::<SupervisionEvent>::new(10);
        monitor.record(event(SupervisionEventKind::ChildStarted)).await.unwrap();
        monitor.reset().await.unwrap();
        let snapshot = monitor.snapshot().await.unwrap();
        assert_eq!(snapshot.total_events, 0);
        assert!(snapshot.recent_events.is_empty());
    }
}
