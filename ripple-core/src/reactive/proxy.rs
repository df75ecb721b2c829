//! Reactive Wrappers
//!
//! A [`Reactive`] is an observable view of a [`Target`]. Every read through
//! the wrapper records a dependency for the running effect; every write that
//! actually changes something notifies the effects that read the affected
//! slot.
//!
//! # How Reads and Writes Are Tracked
//!
//! Each slot read tracks `(target, key)`. Operations that observe the target
//! as a whole track one of two pseudo keys:
//!
//! - *iterate* (`values`, `entries`, `for_each`): notified by every change.
//! - *keys-iterate* (`len`, `keys`): notified only when the key set changes,
//!   i.e. on add, delete and clear.
//!
//! Writes store the raw form of the new value and are skipped entirely when
//! the old and new values are the same value. A rejected write changes
//! nothing and notifies nobody.
//!
//! On arrays, reading `length` tracks the key set, and writing it truncates
//! the array and notifies every index that was cut off.
//!
//! # Identity
//!
//! Wrapping the same target twice through one runtime returns the same
//! wrapper for as long as a handle to it is alive. Nested structured values
//! are wrapped lazily when read, and a readonly wrapper hands out readonly
//! children.

use std::fmt;
use std::sync::Arc;

use crate::error::ReactivityError;

use super::cell::ObjectRef;
use super::dep::DepKey;
use super::effect::DirtyLevel;
use super::ids::SourceId;
use super::runtime::{Runtime, WeakRuntime};
use super::value::{Key, ReactiveFlag, Target, TargetData, TargetKind, Value, LENGTH_KEY};

pub(crate) struct ReactiveInner {
    target: Target,
    readonly: bool,
    runtime: WeakRuntime,
}

impl ReactiveInner {
    pub(crate) fn new(target: Target, readonly: bool, runtime: WeakRuntime) -> Self {
        Self {
            target,
            readonly,
            runtime,
        }
    }
}

impl Drop for ReactiveInner {
    fn drop(&mut self) {
        if let Some(rt) = self.runtime.upgrade() {
            rt.forget_wrapper(self.target.id(), self.readonly);
        }
    }
}

/// An observable wrapper over a structured [`Target`].
///
/// # Example
///
/// ```rust
/// use ripple_core::{Runtime, Target, Value};
///
/// let rt = Runtime::new();
/// let state = rt.reactive(Target::object_from([("count", Value::from(1))]));
///
/// let seen = rt.new_ref(Value::Null);
/// let (state_clone, seen_clone) = (state.clone(), seen.clone());
/// rt.effect(move || seen_clone.set(state_clone.get("count")));
///
/// state.set("count", 2).unwrap();
/// assert_eq!(seen.get(), Value::from(2));
/// ```
#[derive(Clone)]
pub struct Reactive {
    inner: Arc<ReactiveInner>,
}

impl Reactive {
    pub(crate) fn from_inner(inner: Arc<ReactiveInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> std::sync::Weak<ReactiveInner> {
        Arc::downgrade(&self.inner)
    }

    /// The identity of the wrapped target.
    pub fn id(&self) -> SourceId {
        self.inner.target.id()
    }

    pub fn kind(&self) -> TargetKind {
        self.inner.target.kind()
    }

    pub fn is_readonly(&self) -> bool {
        self.inner.readonly
    }

    /// The wrapped target. Reads and writes on it are not observed.
    pub fn to_raw(&self) -> Target {
        self.inner.target.clone()
    }

    /// Whether both handles are the same wrapper.
    pub fn ptr_eq(&self, other: &Reactive) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// A readonly wrapper over the same target.
    pub fn readonly(&self) -> Reactive {
        match self.inner.runtime.upgrade() {
            Some(rt) => rt.readonly(self.to_raw()),
            None => self.clone(),
        }
    }

    fn runtime(&self) -> Option<Runtime> {
        self.inner.runtime.upgrade()
    }

    fn key(&self, key: impl Into<Key>) -> Key {
        key.into().normalize(self.kind())
    }

    /// Wrap structured values read through this wrapper.
    fn expose(&self, rt: Option<&Runtime>, value: Value) -> Value {
        match (value, rt) {
            (Value::Object(target), Some(rt)) => {
                Value::Reactive(rt.wrap(target, self.inner.readonly))
            }
            (value, _) => value,
        }
    }

    fn track(&self, rt: Option<&Runtime>, key: DepKey) {
        if let Some(rt) = rt {
            rt.track(self.id(), key, None);
        }
    }

    fn reject(&self, key: &Key) -> Result<(), ReactivityError> {
        if self.inner.readonly {
            tracing::warn!(
                source = self.id().raw(),
                key = %key,
                "set operation failed: target is readonly"
            );
            return Err(ReactivityError::Readonly {
                key: key.to_string(),
            });
        }
        Ok(())
    }

    fn unsupported(&self, op: &'static str) -> ReactivityError {
        let kind = self.kind().name();
        tracing::warn!(op, kind, "operation is not supported by this target");
        ReactivityError::Unsupported { op, kind }
    }

    fn rejected(&self, err: ReactivityError) -> ReactivityError {
        tracing::warn!(source = self.id().raw(), %err, "write rejected");
        err
    }

    fn is_length(&self, key: &Key) -> bool {
        matches!(key, Key::Name(name) if name.as_ref() == LENGTH_KEY)
            && self.kind() == TargetKind::Array
    }

    /// Read one slot, `Null` when absent.
    ///
    /// Flag keys answer without tracking.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        let key = self.key(key);
        if let Key::Flag(flag) = key {
            return match flag {
                ReactiveFlag::IsReactive => Value::Bool(true),
                ReactiveFlag::IsReadonly => Value::Bool(self.inner.readonly),
                ReactiveFlag::Raw => Value::Object(self.to_raw()),
            };
        }

        let value = self.inner.target.read().get(&key).unwrap_or_default();
        let rt = self.runtime();
        if self.is_length(&key) {
            self.track(rt.as_ref(), DepKey::KeysIterate);
            return value;
        }
        self.track(rt.as_ref(), DepKey::Key(key));
        self.expose(rt.as_ref(), value)
    }

    /// Whether a slot exists (for sets: whether the element is present).
    pub fn has(&self, key: impl Into<Key>) -> bool {
        let key = self.key(key);
        if let Key::Flag(_) = key {
            return true;
        }

        let present = self.inner.target.read().contains(&key);
        self.track(self.runtime().as_ref(), DepKey::Key(key));
        present
    }

    /// Write one slot.
    ///
    /// The raw form of `value` is stored. When the slot already holds an
    /// equal value nothing is written and nobody is notified.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<(), ReactivityError> {
        let key = self.key(key);
        self.reject(&key)?;
        if self.kind() == TargetKind::Set {
            return Err(self.unsupported("set"));
        }
        if let Key::Flag(_) = key {
            return Err(self.unsupported("set flag"));
        }

        let value = value.into().into_raw();
        if self.is_length(&key) {
            return self.set_length(&value);
        }
        let (added, old) = {
            let mut data = self.inner.target.write();
            let added = match data.get(&key) {
                Some(old) if old.same_value(&value) => return Ok(()),
                Some(_) => false,
                None => true,
            };
            let old = data
                .insert(key.clone(), value)
                .map_err(|err| self.rejected(err))?;
            (added, old)
        };
        drop(old);

        if let Some(rt) = self.runtime() {
            tracing::trace!(source = self.id().raw(), key = %key, added, "reactive set");
            if added {
                rt.trigger(
                    self.id(),
                    &[DepKey::Key(key), DepKey::Iterate, DepKey::KeysIterate],
                    DirtyLevel::Dirty,
                );
            } else {
                rt.trigger(self.id(), &[DepKey::Key(key), DepKey::Iterate], DirtyLevel::Dirty);
            }
        }
        Ok(())
    }

    /// Truncate an array through its `length` key.
    fn set_length(&self, value: &Value) -> Result<(), ReactivityError> {
        let len = match value.as_f64() {
            Some(n) if n >= 0.0 && n.fract() == 0.0 && n <= usize::MAX as f64 => n as usize,
            _ => {
                return Err(self.rejected(ReactivityError::InvalidLength {
                    value: value.to_string(),
                }))
            }
        };

        let removed = self
            .inner
            .target
            .write()
            .truncate(len)
            .map_err(|err| self.rejected(err))?;
        if removed.is_empty() {
            return Ok(());
        }
        drop(removed);

        if let Some(rt) = self.runtime() {
            tracing::trace!(source = self.id().raw(), len, "reactive truncate");
            rt.trigger_matching(self.id(), |dep| match dep {
                DepKey::Key(Key::Index(i)) => *i >= len,
                DepKey::Iterate | DepKey::KeysIterate => true,
                _ => false,
            });
        }
        Ok(())
    }

    /// Remove a slot. Returns whether anything was removed.
    ///
    /// Removing an array item shifts the following items, so every index
    /// from the removed one onward is notified.
    pub fn delete(&self, key: impl Into<Key>) -> Result<bool, ReactivityError> {
        let key = self.key(key);
        self.reject(&key)?;

        let removed = self.inner.target.write().remove(&key);
        if removed.is_none() {
            return Ok(false);
        }
        drop(removed);

        if let Some(rt) = self.runtime() {
            match key {
                Key::Index(start) => rt.trigger_matching(self.id(), |dep| match dep {
                    DepKey::Key(Key::Index(i)) => *i >= start,
                    DepKey::Iterate | DepKey::KeysIterate => true,
                    _ => false,
                }),
                key => rt.trigger(
                    self.id(),
                    &[DepKey::Key(key), DepKey::Iterate, DepKey::KeysIterate],
                    DirtyLevel::Dirty,
                ),
            }
        }
        Ok(true)
    }

    /// Remove every slot, notifying everything that observed the target.
    pub fn clear(&self) -> Result<(), ReactivityError> {
        self.reject(&Key::from("clear"))?;

        let old = {
            let mut data = self.inner.target.write();
            if data.is_empty() {
                return Ok(());
            }
            let empty = empty_like(&data);
            std::mem::replace(&mut *data, empty)
        };
        drop(old);

        if let Some(rt) = self.runtime() {
            rt.trigger_matching(self.id(), |_| true);
        }
        Ok(())
    }

    /// Append to an array, returning the new length.
    pub fn push(&self, value: impl Into<Value>) -> Result<usize, ReactivityError> {
        self.reject(&Key::from("push"))?;
        if self.kind() != TargetKind::Array {
            return Err(self.unsupported("push"));
        }

        let index = self.inner.target.read().len();
        self.set(index, value)?;
        Ok(index + 1)
    }

    /// Add an element to a set. Returns whether it was new.
    pub fn add(&self, value: impl Into<Value>) -> Result<bool, ReactivityError> {
        let value = value.into().into_raw();
        let key = Key::Entry(value.clone());
        self.reject(&key)?;
        if self.kind() != TargetKind::Set {
            return Err(self.unsupported("add"));
        }

        let added = self
            .inner
            .target
            .write()
            .insert(key.clone(), value)
            .map_err(|err| self.rejected(err))?
            .is_none();
        if added {
            if let Some(rt) = self.runtime() {
                rt.trigger(
                    self.id(),
                    &[DepKey::Key(key), DepKey::Iterate, DepKey::KeysIterate],
                    DirtyLevel::Dirty,
                );
            }
        }
        Ok(added)
    }

    /// Number of slots. Tracks the key set.
    pub fn len(&self) -> usize {
        let len = self.inner.target.read().len();
        self.track(self.runtime().as_ref(), DepKey::KeysIterate);
        len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The keys in insertion order. Tracks the key set.
    pub fn keys(&self) -> Vec<Key> {
        let keys = self.inner.target.read().keys();
        self.track(self.runtime().as_ref(), DepKey::KeysIterate);
        keys
    }

    /// The values in insertion order, structured ones wrapped.
    pub fn values(&self) -> Vec<Value> {
        let values = self.inner.target.read().values();
        let rt = self.runtime();
        self.track(rt.as_ref(), DepKey::Iterate);
        values
            .into_iter()
            .map(|v| self.expose(rt.as_ref(), v))
            .collect()
    }

    /// Key/value pairs in insertion order, structured values wrapped.
    pub fn entries(&self) -> Vec<(Key, Value)> {
        let entries = self.inner.target.read().entries();
        let rt = self.runtime();
        self.track(rt.as_ref(), DepKey::Iterate);
        entries
            .into_iter()
            .map(|(k, v)| (k, self.expose(rt.as_ref(), v)))
            .collect()
    }

    /// Visit every entry. `f` runs after the target lock is released, so it
    /// may write back to the same wrapper.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&Key, &Value),
    {
        for (key, value) in self.entries() {
            f(&key, &value);
        }
    }

    /// A live alias of one slot.
    pub fn to_ref(&self, key: impl Into<Key>) -> ObjectRef {
        ObjectRef::new(self.clone(), self.key(key))
    }

    /// Live aliases of every current slot, in key order. Not tracked.
    pub fn to_refs(&self) -> Vec<(Key, ObjectRef)> {
        let keys = self.inner.target.read().keys();
        keys.into_iter()
            .map(|key| (key.clone(), ObjectRef::new(self.clone(), key)))
            .collect()
    }

    /// Number of effects currently observing `key`.
    pub fn subscriber_count(&self, key: impl Into<Key>) -> usize {
        let key = self.key(key);
        self.runtime()
            .map(|rt| rt.subscriber_count(self.id(), &DepKey::Key(key)))
            .unwrap_or(0)
    }
}

fn empty_like(data: &TargetData) -> TargetData {
    match data {
        TargetData::Object(_) => TargetData::Object(Default::default()),
        TargetData::Array(_) => TargetData::Array(Vec::new()),
        TargetData::Map(_) => TargetData::Map(Default::default()),
        TargetData::Set(_) => TargetData::Set(Default::default()),
    }
}

impl PartialEq for Reactive {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactive")
            .field("target", &self.inner.target)
            .field("readonly", &self.inner.readonly)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
