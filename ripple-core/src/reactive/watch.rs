//! Watchers
//!
//! A watcher runs a callback whenever a watched source produces a new value.
//! It is an effect whose re-runs are handed to a *job* instead of happening
//! in place.
//!
//! # How Watchers Work
//!
//! 1. The source is turned into a getter. Reactive sources are read deeply:
//!    every nested slot is visited so any change below the root notifies
//!    the watcher.
//!
//! 2. The getter runs inside an effect. The first run only records the
//!    initial value, unless `immediate` is set.
//!
//! 3. When a dependency changes, the job re-runs the getter, runs the cleanup
//!    registered by the previous callback invocation, and calls the callback
//!    with the new and old values. Every scheduled run calls back, even when
//!    the getter produced an equal value. A computed source that settled on
//!    the same value never schedules the job.
//!
//! # Flush Timing
//!
//! - [`WatchFlush::Sync`]: the job runs inside the write that triggered it.
//! - [`WatchFlush::Pre`]: the job is queued and runs at the next flush.
//! - [`WatchFlush::Post`]: the job runs after all queued jobs of the flush,
//!   i.e. after component updates.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::cell::{Ref, RefValue};
use super::computed::Computed;
use super::effect::{EffectFn, EffectKind, EffectOptions};
use super::ids::{EffectId, SourceId};
use super::proxy::Reactive;
use super::runtime::{Runtime, WeakRuntime};
use super::value::Value;
use crate::scheduler::Job;

/// How far a deep watcher descends into nested values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchDepth {
    /// Top-level slots only.
    Shallow,
    /// At most `n` levels.
    Levels(usize),
    /// Every level.
    Unbounded,
}

impl WatchDepth {
    fn levels(self) -> Option<usize> {
        match self {
            WatchDepth::Shallow => Some(1),
            WatchDepth::Levels(n) => Some(n),
            WatchDepth::Unbounded => None,
        }
    }
}

/// When a triggered watcher's job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchFlush {
    Sync,
    #[default]
    Pre,
    Post,
}

/// Options for [`Runtime::watch`] and [`Runtime::watch_effect`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WatchOptions {
    /// Call back once at setup with no old value.
    pub immediate: bool,
    /// Read the source value deeply. Reactive sources default to
    /// [`WatchDepth::Unbounded`].
    pub deep: Option<WatchDepth>,
    pub flush: WatchFlush,
}

impl WatchOptions {
    pub fn sync() -> Self {
        Self {
            flush: WatchFlush::Sync,
            ..Self::default()
        }
    }

    pub fn post() -> Self {
        Self {
            flush: WatchFlush::Post,
            ..Self::default()
        }
    }

    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    pub fn deep(mut self, depth: WatchDepth) -> Self {
        self.deep = Some(depth);
        self
    }
}

/// What a watcher observes.
pub enum WatchSource<T: RefValue> {
    Ref(Ref<T>),
    Computed(Computed<T>),
    /// A reactive wrapper, read deeply. `project` produces the callback value.
    Reactive {
        target: Reactive,
        project: fn(&Reactive) -> T,
    },
    Getter(Arc<dyn Fn() -> T + Send + Sync>),
}

impl<T: RefValue> WatchSource<T> {
    pub fn getter<F>(f: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        WatchSource::Getter(Arc::new(f))
    }
}

impl<T: RefValue> From<Ref<T>> for WatchSource<T> {
    fn from(source: Ref<T>) -> Self {
        WatchSource::Ref(source)
    }
}

impl<T: RefValue> From<Computed<T>> for WatchSource<T> {
    fn from(source: Computed<T>) -> Self {
        WatchSource::Computed(source)
    }
}

impl From<Reactive> for WatchSource<Value> {
    fn from(target: Reactive) -> Self {
        WatchSource::Reactive {
            target,
            project: |r| Value::Reactive(r.clone()),
        }
    }
}

/// Read every slot of `reactive` down to `depth`, tracking each level.
pub(crate) fn traverse(reactive: &Reactive, depth: WatchDepth) {
    let mut seen = HashSet::new();
    visit(reactive, depth.levels(), &mut seen);
}

fn visit(reactive: &Reactive, remaining: Option<usize>, seen: &mut HashSet<SourceId>) {
    if remaining == Some(0) || !seen.insert(reactive.id()) {
        return;
    }

    let next = remaining.map(|n| n - 1);
    for value in reactive.values() {
        if let Value::Reactive(child) = value {
            visit(&child, next, seen);
        }
    }
}

type Cleanup = Box<dyn FnOnce() + Send>;

/// Registers a cleanup to run before the next callback invocation or when
/// the watcher stops.
#[derive(Clone, Default)]
pub struct OnCleanup {
    slot: Arc<Mutex<Option<Cleanup>>>,
}

impl OnCleanup {
    /// Replace the pending cleanup.
    pub fn register<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let previous = self.slot.lock().replace(Box::new(f));
        drop(previous);
    }

    pub(crate) fn run(&self) {
        let pending = self.slot.lock().take();
        if let Some(cleanup) = pending {
            cleanup();
        }
    }
}

impl fmt::Debug for OnCleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnCleanup")
            .field("pending", &self.slot.lock().is_some())
            .finish()
    }
}

/// Watch callback: `(new, old, on_cleanup)`.
pub type WatchCallback<T> = dyn Fn(&T, Option<&T>, &OnCleanup) + Send + Sync;

/// Handle returned by [`Runtime::watch`] and [`Runtime::watch_effect`].
pub struct WatchHandle {
    effect: EffectId,
    runtime: WeakRuntime,
    job: Option<Job>,
    cleanup: OnCleanup,
}

impl WatchHandle {
    /// Stop watching. A queued job is skipped and the pending cleanup runs.
    pub fn stop(&self) {
        if let Some(rt) = self.runtime.upgrade() {
            rt.stop_effect(self.effect);
        }
        if let Some(job) = &self.job {
            job.deactivate();
        }
        self.cleanup.run();
    }

    pub fn is_active(&self) -> bool {
        self.runtime
            .upgrade()
            .map(|rt| rt.effect_exists(self.effect))
            .unwrap_or(false)
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("effect", &self.effect)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Wire `job` to the effect according to `flush`, returning the effect
/// scheduler and the queued job (if any).
fn schedule_for(rt: &Runtime, flush: WatchFlush, job: EffectFn) -> (EffectFn, Option<Job>) {
    match flush {
        WatchFlush::Sync => (job, None),
        WatchFlush::Pre => {
            let queued = Job::new(move || job());
            let weak = rt.downgrade();
            let handle = queued.clone();
            let scheduler: EffectFn = Arc::new(move || {
                if let Some(rt) = weak.upgrade() {
                    rt.queue_job(&handle);
                }
            });
            (scheduler, Some(queued))
        }
        WatchFlush::Post => {
            let queued = Job::new(move || job());
            let weak = rt.downgrade();
            let handle = queued.clone();
            let scheduler: EffectFn = Arc::new(move || {
                if let Some(rt) = weak.upgrade() {
                    rt.queue_post_flush(&handle);
                }
            });
            (scheduler, Some(queued))
        }
    }
}

pub(crate) fn watch<T: RefValue>(
    rt: &Runtime,
    source: WatchSource<T>,
    callback: Arc<WatchCallback<T>>,
    options: WatchOptions,
) -> WatchHandle {
    let deep = options.deep;
    let getter: Arc<dyn Fn() -> T + Send + Sync> = match source {
        WatchSource::Ref(source) => Arc::new(move || source.get()),
        WatchSource::Computed(source) => Arc::new(move || source.get()),
        WatchSource::Reactive { target, project } => {
            let depth = deep.unwrap_or(WatchDepth::Unbounded);
            Arc::new(move || {
                traverse(&target, depth);
                project(&target)
            })
        }
        WatchSource::Getter(getter) => match deep {
            Some(depth) => Arc::new(move || {
                let value = getter();
                value.traverse(depth);
                value
            }),
            None => getter,
        },
    };

    let effect = EffectId::new();
    let weak_rt = rt.downgrade();
    let cleanup = OnCleanup::default();
    let fresh: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));
    let old: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));

    let func: EffectFn = {
        let fresh = fresh.clone();
        Arc::new(move || {
            let value = getter();
            *fresh.lock() = Some(value);
        })
    };

    let job: EffectFn = {
        let (fresh, old, cleanup) = (fresh.clone(), old.clone(), cleanup.clone());
        let weak_rt = weak_rt.clone();
        Arc::new(move || {
            let Some(rt) = weak_rt.upgrade() else {
                return;
            };
            if !rt.effect_exists(effect) || !rt.is_dirty(effect) {
                return;
            }

            rt.run_effect(effect);
            let Some(next) = fresh.lock().take() else {
                return;
            };

            cleanup.run();
            let previous = old.lock().take();
            callback(&next, previous.as_ref(), &cleanup);
            *old.lock() = Some(next);
        })
    };

    let (scheduler, queued) = schedule_for(rt, options.flush, job.clone());
    rt.register_effect(
        effect,
        func,
        &EffectOptions {
            scheduler: Some(scheduler),
            lazy: true,
            ..EffectOptions::default()
        },
        EffectKind::Plain,
    );

    if options.immediate {
        job();
    } else {
        rt.run_effect(effect);
        *old.lock() = fresh.lock().take();
    }

    tracing::debug!(effect = effect.raw(), flush = ?options.flush, "watcher created");
    WatchHandle {
        effect,
        runtime: weak_rt,
        job: queued,
        cleanup,
    }
}

pub(crate) fn watch_effect<F>(rt: &Runtime, f: F, options: WatchOptions) -> WatchHandle
where
    F: Fn(&OnCleanup) + Send + Sync + 'static,
{
    let effect = EffectId::new();
    let weak_rt = rt.downgrade();
    let cleanup = OnCleanup::default();

    let func: EffectFn = {
        let cleanup = cleanup.clone();
        Arc::new(move || {
            cleanup.run();
            f(&cleanup);
        })
    };

    let job: EffectFn = {
        let weak_rt = weak_rt.clone();
        Arc::new(move || {
            if let Some(rt) = weak_rt.upgrade() {
                if rt.effect_exists(effect) && rt.is_dirty(effect) {
                    rt.run_effect(effect);
                }
            }
        })
    };

    let (scheduler, queued) = schedule_for(rt, options.flush, job);
    rt.register_effect(
        effect,
        func,
        &EffectOptions {
            scheduler: Some(scheduler),
            lazy: true,
            ..EffectOptions::default()
        },
        EffectKind::Plain,
    );
    rt.run_effect(effect);

    WatchHandle {
        effect,
        runtime: weak_rt,
        job: queued,
        cleanup,
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Target;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn sync_watch_calls_back_with_old_value() {
        let rt = Runtime::new();
        let count = rt.new_ref(1);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = seen.clone();
        let _handle = rt.watch(
            count.clone(),
            move |new: &i32, old: Option<&i32>, _| seen_clone.lock().push((*new, old.copied())),
            WatchOptions::sync(),
        );
        assert!(seen.lock().is_empty());

        count.set(2);
        count.set(2);
        count.set(3);
        assert_eq!(*seen.lock(), vec![(2, Some(1)), (3, Some(2))]);
    }

    #[test]
    fn immediate_calls_back_at_setup() {
        let rt = Runtime::new();
        let count = rt.new_ref(7);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = seen.clone();
        let _handle = rt.watch(
            count,
            move |new: &i32, old: Option<&i32>, _| seen_clone.lock().push((*new, old.copied())),
            WatchOptions::sync().immediate(),
        );
        assert_eq!(*seen.lock(), vec![(7, None)]);
    }

    #[test]
    fn pre_watch_waits_for_flush() {
        let rt = Runtime::new();
        let count = rt.new_ref(0);
        let calls = Arc::new(AtomicI32::new(0));

        let calls_clone = calls.clone();
        let _handle = rt.watch(
            count.clone(),
            move |_: &i32, _: Option<&i32>, _| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            },
            WatchOptions::default(),
        );

        count.set(1);
        count.set(2);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        rt.flush_jobs().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn deep_reactive_watch_sees_nested_change() {
        let rt = Runtime::new();
        let inner = Target::object_from([("n", Value::from(0))]);
        let state = rt.reactive(Target::object_from([("inner", Value::from(inner))]));
        let calls = Arc::new(AtomicI32::new(0));

        let calls_clone = calls.clone();
        let _handle = rt.watch(
            state.clone(),
            move |_: &Value, _: Option<&Value>, _| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            },
            WatchOptions::sync(),
        );

        let nested = state.get("inner");
        nested.as_reactive().unwrap().set("n", 1).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn shallow_reactive_watch_ignores_nested_change() {
        let rt = Runtime::new();
        let inner = Target::object_from([("n", Value::from(0))]);
        let state = rt.reactive(Target::object_from([("inner", Value::from(inner))]));
        let calls = Arc::new(AtomicI32::new(0));

        let calls_clone = calls.clone();
        let _handle = rt.watch(
            state.clone(),
            move |_: &Value, _: Option<&Value>, _| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            },
            WatchOptions::sync().deep(WatchDepth::Shallow),
        );

        let nested = state.get("inner");
        nested.as_reactive().unwrap().set("n", 1).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        state.set("other", 1).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cyclic_targets_terminate() {
        let rt = Runtime::new();
        let a = Target::object();
        let b = Target::object_from([("a", Value::from(a.clone()))]);
        a.write().insert("b".into(), Value::from(b)).unwrap();

        let state = rt.reactive(a);
        let _handle = rt.watch(state, |_: &Value, _: Option<&Value>, _| {}, WatchOptions::sync());
    }

    #[test]
    fn cleanup_runs_before_next_callback_and_on_stop() {
        let rt = Runtime::new();
        let count = rt.new_ref(0);
        let cleanups = Arc::new(AtomicI32::new(0));

        let cleanups_clone = cleanups.clone();
        let handle = rt.watch(
            count.clone(),
            move |_: &i32, _: Option<&i32>, on_cleanup: &OnCleanup| {
                let cleanups = cleanups_clone.clone();
                on_cleanup.register(move || {
                    cleanups.fetch_add(1, Ordering::SeqCst);
                });
            },
            WatchOptions::sync(),
        );

        count.set(1);
        assert_eq!(cleanups.load(Ordering::SeqCst), 0);
        count.set(2);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);

        handle.stop();
        assert_eq!(cleanups.load(Ordering::SeqCst), 2);
        count.set(3);
        assert_eq!(cleanups.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn stopped_pre_watch_skips_queued_job() {
        let rt = Runtime::new();
        let count = rt.new_ref(0);
        let calls = Arc::new(AtomicI32::new(0));

        let calls_clone = calls.clone();
        let handle = rt.watch(
            count.clone(),
            move |_: &i32, _: Option<&i32>, _| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            },
            WatchOptions::default(),
        );

        count.set(1);
        handle.stop();
        rt.flush_jobs().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn watch_effect_reruns_and_cleans_up() {
        let rt = Runtime::new();
        let count = rt.new_ref(0);
        let runs = Arc::new(AtomicI32::new(0));
        let cleanups = Arc::new(AtomicI32::new(0));

        let (count_clone, runs_clone, cleanups_clone) =
            (count.clone(), runs.clone(), cleanups.clone());
        let handle = rt.watch_effect(
            move |on_cleanup| {
                count_clone.get();
                runs_clone.fetch_add(1, Ordering::SeqCst);
                let cleanups = cleanups_clone.clone();
                on_cleanup.register(move || {
                    cleanups.fetch_add(1, Ordering::SeqCst);
                });
            },
            WatchOptions::default(),
        );
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        count.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        rt.flush_jobs().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);

        handle.stop();
        assert_eq!(cleanups.load(Ordering::SeqCst), 2);
    }
}
