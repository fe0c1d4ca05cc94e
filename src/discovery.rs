//! Discovery Index Adapter (§4.5): a narrow, infallible notifier interface
//! plus a lock-free in-memory implementation external tasks may read
//! concurrently without contacting the owner.

use dashmap::DashMap;

use crate::childspec::{ChildId, Pid};

/// A mirror of `id -> pid` and `pid -> id` the owner keeps in sync and
/// external tasks may query without going through the owner's mailbox.
/// Implementations must not raise: the core calls `register`/`unregister`
/// exactly once per corresponding state mutation and treats the adapter as
/// infallible (§4.5).
pub trait DiscoveryIndex: Send + Sync {
    fn init(&self);
    fn register(&self, key: ChildId, id: Option<String>, pid: Pid);
    fn unregister(&self, key: ChildId);
    fn update_meta(&self, key: ChildId, meta: serde_json::Value);
}

struct Entry {
    id: Option<String>,
    pid: Pid,
    meta: serde_json::Value,
}

/// Default `DiscoveryIndex` backed by `dashmap`: an owner-written,
/// many-reader mirror table with O(1) lookup and no synchronization between
/// the writer and its readers.
#[derive(Default)]
pub struct InMemoryDiscoveryIndex {
    by_key: DashMap<ChildId, Entry>,
    by_label: DashMap<String, ChildId>,
    by_pid: DashMap<Pid, ChildId>,
}

impl InMemoryDiscoveryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pid_of(&self, id: &str) -> Option<Pid> {
        let key = self.by_label.get(id)?;
        self.by_key.get(&*key).map(|e| e.pid)
    }

    pub fn id_of(&self, pid: Pid) -> Option<String> {
        let key = self.by_pid.get(&pid)?;
        self.by_key.get(&*key).and_then(|e| e.id.clone())
    }

    pub fn meta_of(&self, key: ChildId) -> Option<serde_json::Value> {
        self.by_key.get(&key).map(|e| e.meta.clone())
    }
}

impl DiscoveryIndex for InMemoryDiscoveryIndex {
    fn init(&self) {
        self.by_key.clear();
        self.by_label.clear();
        self.by_pid.clear();
    }

    fn register(&self, key: ChildId, id: Option<String>, pid: Pid) {
        if let Some(id) = &id {
            self.by_label.insert(id.clone(), key);
        }
        self.by_pid.insert(pid, key);
        self.by_key.insert(
            key,
            Entry {
                id,
                pid,
                meta: serde_json::Value::Null,
            },
        );
    }

    fn unregister(&self, key: ChildId) {
        if let Some((_, entry)) = self.by_key.remove(&key) {
            if let Some(id) = &entry.id {
                self.by_label.remove(id);
            }
            self.by_pid.remove(&entry.pid);
        }
    }

    fn update_meta(&self, key: ChildId, meta: serde_json::Value) {
        if let Some(mut entry) = self.by_key.get_mut(&key) {
            entry.meta = meta;
        }
    }
}

/// No-op adapter used when `registry_enabled = false`.
#[derive(Default)]
pub struct NoopDiscoveryIndex;

impl DiscoveryIndex for NoopDiscoveryIndex {
    fn init(&self) {}
    fn register(&self, _key: ChildId, _id: Option<String>, _pid: Pid) {}
    fn unregister(&self, _key: ChildId) {}
    fn update_meta(&self, _key: ChildId, _meta: serde_json::Value) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_lookup_roundtrip() {
        let index = InMemoryDiscoveryIndex::new();
        let key = ChildId::new();
        let pid = Pid::new();
        index.register(key, Some("worker".to_string()), pid);
        assert_eq!(index.pid_of("worker"), Some(pid));
        assert_eq!(index.id_of(pid), Some("worker".to_string()));
        index.unregister(key);
        assert_eq!(index.pid_of("worker"), None);
    }
}
