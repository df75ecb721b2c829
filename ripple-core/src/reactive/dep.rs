//! Dependency Sets
//!
//! A dependency set ("dep") records which effects read one `(source, key)`
//! pair, together with the run generation (the effect's `track_id`) in which
//! each link was last confirmed. Deps are created lazily on the first tracked
//! read and removed from the index as soon as their last subscriber unlinks,
//! so sources that are no longer observed do not accumulate empty entries.
//!
//! Subscribers are kept in insertion order. Trigger iteration follows that
//! order, which makes synchronous effect execution deterministic.

use std::collections::HashMap;

use indexmap::IndexMap;

use super::ids::{DepId, EffectId, SourceId};
use super::value::Key;

/// Which part of a source a dep observes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum DepKey {
    /// The whole value of a ref or computed.
    Value,
    /// One property, index or collection entry of a structured target.
    Key(Key),
    /// Anything that iterates values: `values`, `entries`, `for_each`.
    Iterate,
    /// Anything that only observes the key set: `len`, `keys`.
    KeysIterate,
}

/// One dependency set.
#[derive(Debug)]
pub(crate) struct Dep {
    source: SourceId,
    key: DepKey,
    /// Effect -> generation in which the link was recorded.
    subscribers: IndexMap<EffectId, u64>,
    /// Set when the dep belongs to a computed; holds the computed's effect.
    computed: Option<EffectId>,
}

impl Dep {
    fn new(source: SourceId, key: DepKey, computed: Option<EffectId>) -> Self {
        Self {
            source,
            key,
            subscribers: IndexMap::new(),
            computed,
        }
    }
}

/// All deps of one runtime plus the `(source, key) -> dep` index.
#[derive(Debug, Default)]
pub(crate) struct DepTable {
    deps: HashMap<DepId, Dep>,
    index: HashMap<SourceId, HashMap<DepKey, DepId>>,
}

impl DepTable {
    /// Find the dep for `(source, key)` if anyone observes it.
    pub(crate) fn find(&self, source: SourceId, key: &DepKey) -> Option<DepId> {
        self.index.get(&source)?.get(key).copied()
    }

    /// Every dep of `source` whose key satisfies `pred`, in creation order.
    pub(crate) fn find_matching<F>(&self, source: SourceId, mut pred: F) -> Vec<DepId>
    where
        F: FnMut(&DepKey) -> bool,
    {
        let mut found: Vec<DepId> = self
            .index
            .get(&source)
            .map(|keys| {
                keys.iter()
                    .filter(|(key, _)| pred(key))
                    .map(|(_, id)| *id)
                    .collect()
            })
            .unwrap_or_default();
        found.sort();
        found
    }

    /// Find or create the dep for `(source, key)`.
    pub(crate) fn get_or_create(
        &mut self,
        source: SourceId,
        key: DepKey,
        computed: Option<EffectId>,
    ) -> DepId {
        if let Some(id) = self.find(source, &key) {
            return id;
        }

        let id = DepId::new();
        self.index
            .entry(source)
            .or_default()
            .insert(key.clone(), id);
        self.deps.insert(id, Dep::new(source, key, computed));
        id
    }

    /// The generation recorded for `effect` in `dep`, if linked.
    pub(crate) fn generation(&self, dep: DepId, effect: EffectId) -> Option<u64> {
        self.deps.get(&dep)?.subscribers.get(&effect).copied()
    }

    /// Link `effect` into `dep` at `generation`.
    pub(crate) fn link(&mut self, dep: DepId, effect: EffectId, generation: u64) {
        if let Some(dep) = self.deps.get_mut(&dep) {
            dep.subscribers.insert(effect, generation);
        }
    }

    /// Unlink `effect` from `dep` unless the link was confirmed in the
    /// effect's current run (`current`). Removes the dep once it is empty.
    pub(crate) fn unlink(&mut self, dep: DepId, effect: EffectId, current: u64) {
        let Some(entry) = self.deps.get_mut(&dep) else {
            return;
        };

        match entry.subscribers.get(&effect) {
            Some(&generation) if generation != current => {
                entry.subscribers.shift_remove(&effect);
            }
            _ => return,
        }

        if entry.subscribers.is_empty() {
            self.remove(dep);
        }
    }

    /// Drop a dep and its index entry.
    fn remove(&mut self, dep: DepId) {
        let Some(entry) = self.deps.remove(&dep) else {
            return;
        };
        tracing::trace!(source = entry.source.raw(), key = ?entry.key, "dependency set released");

        if let Some(keys) = self.index.get_mut(&entry.source) {
            keys.remove(&entry.key);
            if keys.is_empty() {
                self.index.remove(&entry.source);
            }
        }
    }

    /// Snapshot of a dep's subscribers in insertion order.
    pub(crate) fn subscribers(&self, dep: DepId) -> Vec<(EffectId, u64)> {
        self.deps
            .get(&dep)
            .map(|d| d.subscribers.iter().map(|(e, g)| (*e, *g)).collect())
            .unwrap_or_default()
    }

    /// The computed effect that owns `dep`, if any.
    pub(crate) fn computed_of(&self, dep: DepId) -> Option<EffectId> {
        self.deps.get(&dep)?.computed
    }

    /// Number of live deps.
    pub(crate) fn len(&self) -> usize {
        self.deps.len()
    }

    /// Number of effects linked to `(source, key)`.
    pub(crate) fn subscriber_count(&self, source: SourceId, key: &DepKey) -> usize {
        self.find(source, key)
            .and_then(|id| self.deps.get(&id))
            .map(|d| d.subscribers.len())
            .unwrap_or(0)
    }

    /// Whether `effect` is linked into any dep.
    pub(crate) fn is_linked(&self, effect: EffectId) -> bool {
        self.deps
            .values()
            .any(|d| d.subscribers.contains_key(&effect))
    }
}
