//! The authoritative in-owner data structure (§3, §4.2).
//!
//! A `HashMap<ChildId, ChildRecord>` plus an `order: Vec<ChildId>` for
//! startup ordering, alongside label/pid/group indexes and a
//! reverse-bindings index. All indexes are collapsed to plain `HashMap`s
//! since the owner is this data's sole writer — no concurrent readers to
//! protect against here; that role belongs to the discovery index.
//!
//! Mutation happens in place through `&mut ParentState`, returning an
//! outcome alongside it, rather than threading an immutable value through
//! every call.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::childspec::{ChildId, ChildRef, ChildSpec, Pid};
use crate::config::ParentOptions;
use crate::restart_ring::RestartRing;

/// Handle onto a live child's task: the join handle lets the owner await or
/// abort it; the stop sender delivers the graceful-stop request.
pub(crate) struct RunningHandle {
    pub(crate) join: JoinHandle<()>,
    pub(crate) stop: Option<oneshot::Sender<()>>,
}

/// Handle onto an armed per-child timeout timer.
pub(crate) struct TimerHandle {
    pub(crate) join: JoinHandle<()>,
}

impl TimerHandle {
    pub(crate) fn cancel(self) {
        self.join.abort();
    }
}

/// One child's full runtime record: its descriptor plus the bookkeeping the
/// Lifecycle and Restart Engines need.
pub struct ChildRecord {
    pub key: ChildId,
    pub spec: ChildSpec,
    pub pid: Option<Pid>,
    pub meta: serde_json::Value,
    pub startup_index: u64,
    pub(crate) restart_ring: RestartRing,
    pub(crate) running: Option<RunningHandle>,
    pub(crate) timer: Option<TimerHandle>,
}

impl ChildRecord {
    pub fn is_ignored(&self) -> bool {
        self.pid.is_none()
    }

    /// Copies everything but the live task handles. Only meaningful for a
    /// record that is already stopped (or never started): a running
    /// record's `JoinHandle`/stop sender cannot be duplicated, so this
    /// drops them rather than cloning a handle onto the same task twice.
    pub(crate) fn clone_stopped(&self) -> Self {
        Self {
            key: self.key,
            spec: self.spec.clone(),
            pid: None,
            meta: self.meta.clone(),
            startup_index: self.startup_index,
            restart_ring: self.restart_ring.clone(),
            running: None,
            timer: None,
        }
    }
}

/// One entry of a stopped-set (glossary): a child's descriptor snapshot at
/// the moment it was stopped, paired with the reason it left for and
/// whether it was force-marked for restart regardless of policy (used by
/// `restart_child`, §4.3.4).
pub struct StoppedChild {
    pub record: ChildRecord,
    pub exit_reason: crate::childspec::ExitReason,
    pub force_restart: bool,
}

/// The `ParentState` of §3: ordered descriptors plus the id/pid/group/
/// reverse-bindings indexes, the next startup index, and the parent-wide
/// configuration and restart ring.
pub struct ParentState {
    children: HashMap<ChildId, ChildRecord>,
    order: Vec<ChildId>,
    by_label: HashMap<String, ChildId>,
    by_pid: HashMap<Pid, ChildId>,
    by_group: HashMap<String, BTreeSet<ChildId>>,
    /// key -> set of keys whose `binds_to` includes `key` (the reverse of
    /// each descriptor's own `binds_to`).
    reverse_bindings: HashMap<ChildId, BTreeSet<ChildId>>,
    next_startup_index: u64,
    pub(crate) restart_ring: RestartRing,
    pub options: ParentOptions,
}

impl ParentState {
    pub fn new(options: ParentOptions) -> Self {
        Self {
            children: HashMap::new(),
            order: Vec::new(),
            by_label: HashMap::new(),
            by_pid: HashMap::new(),
            by_group: HashMap::new(),
            reverse_bindings: HashMap::new(),
            next_startup_index: 0,
            restart_ring: RestartRing::new(),
            options,
        }
    }

    /// Resolves a label or pid reference to the internal key.
    pub fn resolve(&self, r: &ChildRef) -> Option<ChildId> {
        match r {
            ChildRef::Id(id) => self.by_label.get(id).copied(),
            ChildRef::Pid(pid) => self.by_pid.get(pid).copied(),
        }
    }

    pub fn child(&self, r: &ChildRef) -> Option<&ChildRecord> {
        self.resolve(r).and_then(|key| self.children.get(&key))
    }

    pub fn child_by_key(&self, key: ChildId) -> Option<&ChildRecord> {
        self.children.get(&key)
    }

    pub fn child_by_key_mut(&mut self, key: ChildId) -> Option<&mut ChildRecord> {
        self.children.get_mut(&key)
    }

    pub fn child_pid(&self, id: &str) -> Option<Pid> {
        self.by_label.get(id).and_then(|key| self.children.get(key)).and_then(|c| c.pid)
    }

    pub fn child_id_label(&self, pid: Pid) -> Option<String> {
        self.by_pid
            .get(&pid)
            .and_then(|key| self.children.get(key))
            .and_then(|c| c.spec.id.clone())
    }

    pub fn children_in_group(&self, group: &str) -> Vec<ChildId> {
        self.by_group.get(group).map(|set| set.iter().copied().collect()).unwrap_or_default()
    }

    /// All children in ascending startup order (§6 `children()`).
    pub fn children_in_order(&self) -> Vec<&ChildRecord> {
        self.order.iter().filter_map(|key| self.children.get(key)).collect()
    }

    pub fn num_children(&self) -> usize {
        self.children.len()
    }

    pub fn exists_label(&self, id: &str) -> bool {
        self.by_label.contains_key(id)
    }

    /// All existing keys every reference in `refs` resolves to, failing
    /// with the unresolved subset if any do not resolve (§4.3.1 step 3).
    pub fn resolve_all(&self, refs: &BTreeSet<ChildRef>) -> Result<BTreeSet<ChildId>, Vec<ChildRef>> {
        let mut resolved = BTreeSet::new();
        let mut missing = Vec::new();
        for r in refs {
            match self.resolve(r) {
                Some(key) => {
                    resolved.insert(key);
                }
                None => missing.push(r.clone()),
            }
        }
        if missing.is_empty() {
            Ok(resolved)
        } else {
            Err(missing)
        }
    }

    pub fn startup_index_of(&self, key: ChildId) -> Option<u64> {
        self.children.get(&key).map(|c| c.startup_index)
    }

    /// Registers a newly started (or ignored) child, assigning the next
    /// startup index and wiring up the id/pid/group/reverse-binding
    /// indexes (§4.3.1 "on success"). `preserve_index`, when set, is used
    /// by the Restart Engine to keep a restarted child's original index
    /// instead of allocating a new one (§4.4 step 4).
    #[allow(clippy::too_many_arguments)]
    pub fn register(
        &mut self,
        key: ChildId,
        spec: ChildSpec,
        pid: Option<Pid>,
        meta: serde_json::Value,
        running: Option<RunningHandle>,
        timer: Option<TimerHandle>,
        restart_ring: RestartRing,
        preserve_index: Option<u64>,
    ) {
        let startup_index = preserve_index.unwrap_or_else(|| {
            let idx = self.next_startup_index;
            self.next_startup_index += 1;
            idx
        });
        if let Some(id) = &spec.id {
            self.by_label.insert(id.clone(), key);
        }
        if let Some(pid) = pid {
            self.by_pid.insert(pid, key);
        }
        if let Some(group) = &spec.shutdown_group {
            self.by_group.entry(group.clone()).or_default().insert(key);
        }
        for binding in &spec.binds_to {
            if let Some(target) = self.resolve(binding) {
                self.reverse_bindings.entry(target).or_default().insert(key);
            }
        }
        let record = ChildRecord {
            key,
            spec,
            pid,
            meta,
            startup_index,
            restart_ring,
            running,
            timer,
        };
        self.children.insert(key, record);
        self.order.push(key);
        self.order.sort_by_key(|k| self.children[k].startup_index);
    }

    pub fn update_meta(&mut self, r: &ChildRef, f: impl FnOnce(serde_json::Value) -> serde_json::Value) -> Option<serde_json::Value> {
        let key = self.resolve(r)?;
        let record = self.children.get_mut(&key)?;
        let new_meta = f(record.meta.clone());
        record.meta = new_meta.clone();
        Some(new_meta)
    }

    pub fn disarm_timer(&mut self, key: ChildId) {
        if let Some(record) = self.children.get_mut(&key) {
            if let Some(timer) = record.timer.take() {
                timer.cancel();
            }
        }
    }

    /// Removes a single key from every index and the children map without
    /// pulling in bound siblings. Used by `pop_with_bound_siblings` once
    /// the full closure is known.
    fn remove_single(&mut self, key: ChildId) -> Option<ChildRecord> {
        let record = self.children.remove(&key)?;
        self.order.retain(|k| *k != key);
        if let Some(id) = &record.spec.id {
            self.by_label.remove(id);
        }
        if let Some(pid) = record.pid {
            self.by_pid.remove(&pid);
        }
        if let Some(group) = &record.spec.shutdown_group {
            if let Some(set) = self.by_group.get_mut(group) {
                set.remove(&key);
                if set.is_empty() {
                    self.by_group.remove(group);
                }
            }
        }
        self.reverse_bindings.remove(&key);
        for binding in &record.spec.binds_to {
            if let Some(target) = self.resolve(binding) {
                if let Some(dependents) = self.reverse_bindings.get_mut(&target) {
                    dependents.remove(&key);
                }
            }
        }
        Some(record)
    }

    /// The fundamental primitive of §4.2: the transitive closure of `key`
    /// under the reverse-bindings relation and the shutdown-group relation,
    /// removed atomically and returned in ascending `startup_index` order.
    pub fn pop_with_bound_siblings(&mut self, key: ChildId) -> Vec<ChildRecord> {
        let mut closure: HashSet<ChildId> = HashSet::new();
        let mut frontier = vec![key];
        while let Some(current) = frontier.pop() {
            if !closure.insert(current) {
                continue;
            }
            if let Some(dependents) = self.reverse_bindings.get(&current) {
                frontier.extend(dependents.iter().copied());
            }
            if let Some(record) = self.children.get(&current) {
                if let Some(group) = &record.spec.shutdown_group {
                    if let Some(members) = self.by_group.get(group) {
                        frontier.extend(members.iter().copied());
                    }
                }
            }
        }
        let mut removed: Vec<ChildRecord> = closure.into_iter().filter_map(|k| self.remove_single(k)).collect();
        removed.sort_by_key(|c| c.startup_index);
        removed
    }

    /// Removes exactly the given keys — no transitive closure over bindings
    /// or shutdown groups — in ascending `startup_index` order. Used by
    /// `start_all_children`'s failure path, which must tear down only the
    /// prefix it itself started, not whatever else those children happen to
    /// be bound to.
    pub fn remove_keys(&mut self, keys: &[ChildId]) -> Vec<ChildRecord> {
        let mut removed: Vec<ChildRecord> = keys.iter().filter_map(|k| self.remove_single(*k)).collect();
        removed.sort_by_key(|c| c.startup_index);
        removed
    }

    /// Empties all children and indexes, preserving configuration and the
    /// parent-wide restart ring (§4.2 `reinitialize`).
    pub fn reinitialize(&mut self) {
        self.children.clear();
        self.order.clear();
        self.by_label.clear();
        self.by_pid.clear();
        self.by_group.clear();
        self.reverse_bindings.clear();
    }

    /// Removes every child, in ascending startup order, then reinitializes
    /// the indexes. Used by `shutdown_all`, which stops the whole tree
    /// rather than one binding/group closure.
    pub fn drain_all(&mut self) -> Vec<ChildRecord> {
        let keys: Vec<ChildId> = self.order.clone();
        let mut drained: Vec<ChildRecord> = keys.into_iter().filter_map(|k| self.remove_single(k)).collect();
        drained.sort_by_key(|c| c.startup_index);
        self.reinitialize();
        drained
    }

    pub fn parent_restart_window(&self) -> Duration {
        self.options.max_seconds
    }

    pub fn parent_max_restarts(&self) -> Option<u32> {
        self.options.max_restarts
    }
}
