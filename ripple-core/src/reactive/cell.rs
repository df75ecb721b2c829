//! Ref Implementation
//!
//! A [`Ref`] is a single observable cell. Reading it inside an effect makes
//! the effect depend on it; writing a different value notifies those
//! effects.
//!
//! # Raw and Exposed Values
//!
//! A ref keeps two copies of its value: the raw form used for change
//! detection and the exposed form handed to readers. They only differ for
//! [`Value`]s holding structured data, whose exposed form is the reactive
//! wrapper of the raw target. Writing the same target again, directly or
//! through its wrapper, is therefore not a change.
//!
//! [`ObjectRef`] has no storage of its own; it is a live alias of one slot of
//! a [`Reactive`] wrapper.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::ReactivityError;

use super::dep::DepKey;
use super::effect::DirtyLevel;
use super::ids::SourceId;
use super::proxy::Reactive;
use super::runtime::{Runtime, WeakRuntime};
use super::value::{Key, Value};
use super::watch::{traverse, WatchDepth};

/// Whether a write from `old` to `new` is a change.
///
/// Equal values are not a change, and neither is a value that is unequal to
/// itself (`NaN`) being replaced by another such value. Floats tell `-0`
/// from `0`.
pub fn has_changed<T: RefValue>(old: &T, new: &T) -> bool {
    !old.same_value(new)
}

/// Types that can be stored in a [`Ref`] or produced by a computed.
pub trait RefValue: Clone + PartialEq + Send + Sync + 'static {
    /// Identity used for change detection.
    #[allow(clippy::eq_op)]
    fn same_value(&self, other: &Self) -> bool {
        self == other || (self != self && other != other)
    }

    /// The form used for change detection.
    fn to_raw(&self) -> Self {
        self.clone()
    }

    /// The form handed to readers.
    fn expose(&self, _rt: &Runtime) -> Self {
        self.clone()
    }

    /// Read every nested slot, for deep watchers.
    fn traverse(&self, _depth: WatchDepth) {}
}

macro_rules! plain_ref_value {
    ($($ty:ty),*) => {
        $(impl RefValue for $ty {})*
    };
}

plain_ref_value!(
    (), bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, String,
    Arc<str>, &'static str
);

impl RefValue for f32 {
    fn same_value(&self, other: &Self) -> bool {
        self.to_bits() == other.to_bits() || (self.is_nan() && other.is_nan())
    }
}

impl RefValue for f64 {
    fn same_value(&self, other: &Self) -> bool {
        self.to_bits() == other.to_bits() || (self.is_nan() && other.is_nan())
    }
}

impl<T: RefValue> RefValue for Option<T> {}

impl<T: RefValue> RefValue for Vec<T> {}

impl RefValue for Value {
    fn same_value(&self, other: &Self) -> bool {
        Value::same_value(self, other)
    }

    fn to_raw(&self) -> Self {
        self.clone().into_raw()
    }

    fn expose(&self, rt: &Runtime) -> Self {
        match self {
            Value::Object(target) => Value::Reactive(rt.reactive(target.clone())),
            other => other.clone(),
        }
    }

    fn traverse(&self, depth: WatchDepth) {
        if let Value::Reactive(reactive) = self {
            traverse(reactive, depth);
        }
    }
}

struct RefInner<T> {
    source: SourceId,
    runtime: WeakRuntime,
    raw: RwLock<T>,
    value: RwLock<T>,
}

/// A single observable value.
///
/// # Example
///
/// ```rust
/// use ripple_core::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.new_ref(0);
///
/// assert_eq!(count.get(), 0);
/// count.set(5);
/// count.update(|n| n + 1);
/// assert_eq!(count.get(), 6);
/// ```
pub struct Ref<T: RefValue> {
    inner: Arc<RefInner<T>>,
}

impl<T: RefValue> Ref<T> {
    pub(crate) fn new(rt: &Runtime, value: T) -> Self {
        let raw = value.to_raw();
        let exposed = value.expose(rt);
        Self {
            inner: Arc::new(RefInner {
                source: SourceId::new(),
                runtime: rt.downgrade(),
                raw: RwLock::new(raw),
                value: RwLock::new(exposed),
            }),
        }
    }

    pub fn id(&self) -> SourceId {
        self.inner.source
    }

    /// Get the current value, tracking it for the running effect.
    pub fn get(&self) -> T {
        if let Some(rt) = self.inner.runtime.upgrade() {
            rt.track(self.inner.source, DepKey::Value, None);
        }
        self.inner.value.read().clone()
    }

    /// Get the current value without tracking.
    pub fn get_untracked(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Replace the value. Nothing happens when the raw forms are equal.
    pub fn set(&self, value: T) {
        let raw = value.to_raw();
        if !has_changed(&*self.inner.raw.read(), &raw) {
            return;
        }

        let rt = self.inner.runtime.upgrade();
        let exposed = match &rt {
            Some(rt) => value.expose(rt),
            None => value,
        };
        let old_raw = std::mem::replace(&mut *self.inner.raw.write(), raw);
        let old_value = std::mem::replace(&mut *self.inner.value.write(), exposed);
        drop((old_raw, old_value));

        if let Some(rt) = rt {
            tracing::trace!(source = self.inner.source.raw(), "ref set");
            rt.trigger(self.inner.source, &[DepKey::Value], DirtyLevel::Dirty);
        }
    }

    /// Replace the value with `f(current)`. The read is not tracked.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let next = f(&self.get_untracked());
        self.set(next);
    }

    /// Number of effects currently reading this ref.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .runtime
            .upgrade()
            .map(|rt| rt.subscriber_count(self.inner.source, &DepKey::Value))
            .unwrap_or(0)
    }
}

impl<T: RefValue> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: RefValue + fmt::Debug> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("id", &self.inner.source)
            .field("value", &*self.inner.value.read())
            .finish()
    }
}

/// A live alias of `target[key]`.
///
/// Created by [`Reactive::to_ref`] and [`Reactive::to_refs`].
#[derive(Clone, Debug)]
pub struct ObjectRef {
    target: Reactive,
    key: Key,
}

impl ObjectRef {
    pub(crate) fn new(target: Reactive, key: Key) -> Self {
        Self { target, key }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Read through the wrapper, tracking the slot.
    pub fn get(&self) -> Value {
        self.target.get(self.key.clone())
    }

    /// Write through the wrapper.
    pub fn set(&self, value: impl Into<Value>) -> Result<(), ReactivityError> {
        self.target.set(self.key.clone(), value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Target;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn has_changed_is_nan_safe() {
        assert!(!has_changed(&f64::NAN, &f64::NAN));
        assert!(!has_changed(&1.0, &1.0));
        assert!(has_changed(&1.0, &f64::NAN));
        assert!(has_changed(&f64::NAN, &1.0));
        assert!(has_changed(&0.0, &-0.0));
        assert!(!has_changed(&Value::from(-0.0), &Value::from(-0.0)));
    }

    #[test]
    fn equal_set_does_not_trigger() {
        let rt = Runtime::new();
        let value = rt.new_ref(5);
        let runs = Arc::new(AtomicI32::new(0));

        let value_clone = value.clone();
        let runs_clone = runs.clone();
        rt.effect(move || {
            value_clone.get();
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        value.set(5);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        value.set(6);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn structured_values_are_exposed_reactive() {
        let rt = Runtime::new();
        let target = Target::object();
        let cell = rt.new_ref(Value::from(target.clone()));

        let exposed = cell.get();
        let reactive = exposed.as_reactive().unwrap();
        assert_eq!(reactive.to_raw(), target);

        // Writing the wrapper back is not a change.
        let runs = Arc::new(AtomicI32::new(0));
        let (cell_clone, runs_clone) = (cell.clone(), runs.clone());
        rt.effect(move || {
            cell_clone.get();
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });
        cell.set(exposed.clone());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn object_ref_is_live_alias() {
        let rt = Runtime::new();
        let state = rt.reactive(Target::object_from([("name", Value::from("a"))]));
        let name = state.to_ref("name");

        assert_eq!(name.get(), Value::from("a"));
        name.set("b").unwrap();
        assert_eq!(state.get("name"), Value::from("b"));

        state.set("name", "c").unwrap();
        assert_eq!(name.get(), Value::from("c"));
    }

    #[test]
    fn to_refs_covers_every_key() {
        let rt = Runtime::new();
        let state = rt.reactive(Target::object_from([
            ("a", Value::from(1)),
            ("b", Value::from(2)),
        ]));

        let refs = state.to_refs();
        let keys: Vec<String> = refs.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(refs[1].1.get(), Value::from(2));
    }
}
