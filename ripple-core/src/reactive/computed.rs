//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Computeds Work
//!
//! 1. The getter runs inside its own lazy effect. Nothing is computed until
//!    the first read.
//!
//! 2. When a source the getter read changes, the getter effect becomes dirty
//!    and everything that read the computed becomes *maybe dirty*.
//!
//! 3. On the next read the getter re-runs only if the effect is dirty. If it
//!    produces a value different from the cached one, readers of the computed
//!    are raised to dirty.
//!
//! 4. Readers that were only maybe dirty check their computed dependencies
//!    first (see [`Effect::is_dirty`](super::Effect::is_dirty)) and skip their
//!    run when nothing actually changed.
//!
//! A computed that nobody reads stays dirty and costs nothing.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::error::ReactivityError;

use super::cell::{has_changed, RefValue};
use super::dep::DepKey;
use super::effect::{DirtyLevel, EffectFn, EffectKind, EffectOptions};
use super::ids::{EffectId, SourceId};
use super::runtime::{Runtime, WeakRuntime};

type Getter<T> = Box<dyn Fn() -> T + Send + Sync>;
type Setter<T> = Box<dyn Fn(T) + Send + Sync>;

struct ComputedInner<T> {
    effect: EffectId,
    source: SourceId,
    runtime: WeakRuntime,
    getter: Getter<T>,
    setter: Option<Setter<T>>,
    /// The cached value. `None` until the first read.
    value: RwLock<Option<T>>,
    /// Output of the getter effect's last run, picked up by `refresh`.
    fresh: Mutex<Option<T>>,
}

impl<T: RefValue> ComputedInner<T> {
    /// Recompute the cached value if the getter effect is dirty.
    fn refresh(&self, rt: &Runtime) {
        if !rt.is_dirty(self.effect) {
            return;
        }

        rt.run_effect(self.effect);
        let Some(next) = self.fresh.lock().take() else {
            return;
        };

        let changed = match &*self.value.read() {
            Some(current) => has_changed(current, &next),
            None => true,
        };
        if changed {
            let old = self.value.write().replace(next);
            drop(old);
            rt.trigger(self.source, &[DepKey::Value], DirtyLevel::Dirty);
        }
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        if let Some(rt) = self.runtime.upgrade() {
            rt.stop_effect(self.effect);
        }
    }
}

/// A cached derived value.
///
/// # Example
///
/// ```rust
/// use ripple_core::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.new_ref(1);
///
/// let count_clone = count.clone();
/// let double = rt.computed(move || count_clone.get() * 2);
/// assert_eq!(double.get(), 2);
///
/// count.set(5);
/// assert_eq!(double.get(), 10);
/// ```
pub struct Computed<T: RefValue> {
    inner: Arc<ComputedInner<T>>,
}

impl<T: RefValue> Computed<T> {
    pub(crate) fn new(rt: &Runtime, getter: Getter<T>, setter: Option<Setter<T>>) -> Self {
        let effect = EffectId::new();
        let inner = Arc::new(ComputedInner {
            effect,
            source: SourceId::new(),
            runtime: rt.downgrade(),
            getter,
            setter,
            value: RwLock::new(None),
            fresh: Mutex::new(None),
        });

        let weak: Weak<ComputedInner<T>> = Arc::downgrade(&inner);
        let func: EffectFn = Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                let value = (inner.getter)();
                *inner.fresh.lock() = Some(value);
            }
        });

        let weak = Arc::downgrade(&inner);
        let weak_rt = rt.downgrade();
        let refresh: EffectFn = Arc::new(move || {
            if let (Some(inner), Some(rt)) = (weak.upgrade(), weak_rt.upgrade()) {
                inner.refresh(&rt);
            }
        });

        rt.register_effect(
            effect,
            func,
            &EffectOptions {
                lazy: true,
                ..EffectOptions::default()
            },
            EffectKind::Computed {
                source: inner.source,
                refresh,
            },
        );

        Self { inner }
    }

    /// Get the value, recomputing it first if a dependency changed.
    ///
    /// Tracks the computed itself for the running effect.
    pub fn get(&self) -> T {
        let Some(rt) = self.inner.runtime.upgrade() else {
            return (self.inner.getter)();
        };

        self.inner.refresh(&rt);
        rt.track(self.inner.source, DepKey::Value, Some(self.inner.effect));

        let cached = self.inner.value.read().clone();
        match cached {
            Some(value) => value,
            None => (self.inner.getter)(),
        }
    }

    /// Get the value without tracking. Still recomputes if needed.
    pub fn get_untracked(&self) -> T {
        match self.inner.runtime.upgrade() {
            Some(rt) => rt.untracked(|| self.get()),
            None => (self.inner.getter)(),
        }
    }

    /// Pass `value` to the setter.
    ///
    /// Computeds created without a setter reject the write.
    pub fn set(&self, value: T) -> Result<(), ReactivityError> {
        match &self.inner.setter {
            Some(setter) => {
                setter(value);
                Ok(())
            }
            None => {
                tracing::warn!(
                    source = self.inner.source.raw(),
                    "write operation failed: computed value is readonly"
                );
                Err(ReactivityError::ComputedReadonly)
            }
        }
    }

    pub fn id(&self) -> SourceId {
        self.inner.source
    }

    /// Whether the cached value is known to be stale.
    pub fn is_dirty(&self) -> bool {
        self.inner
            .runtime
            .upgrade()
            .and_then(|rt| rt.dirty_level(self.inner.effect))
            .map(|level| level >= DirtyLevel::MaybeDirty)
            .unwrap_or(true)
    }

    /// Number of effects currently reading this computed.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .runtime
            .upgrade()
            .map(|rt| rt.subscriber_count(self.inner.source, &DepKey::Value))
            .unwrap_or(0)
    }
}

impl<T: RefValue> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: RefValue + fmt::Debug> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.source)
            .field("value", &*self.inner.value.read())
            .field("writable", &self.inner.setter.is_some())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
