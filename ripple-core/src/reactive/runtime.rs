//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects refs, computeds,
//! reactive wrappers and effects. It owns the effect table, the dependency
//! sets, the per-thread active-effect slots and the job scheduler.
//!
//! # How It Works
//!
//! 1. A read through a ref, computed or wrapper calls [`Runtime::track`]: the
//!    active effect is linked into the dependency set of `(source, key)`.
//!
//! 2. A write calls [`Runtime::trigger`]. For every effect linked into the
//!    affected sets in the current generation:
//!    a. its dirty level is raised,
//!    b. a computed propagates *maybe dirty* to its own readers,
//!    c. a plain effect that just left the clean state has its scheduler
//!       queued.
//!
//! 3. Once the trigger pass is complete, the queued schedulers run in order.
//!    The default scheduler re-runs the effect if it is still dirty.
//!
//! # Locking
//!
//! All bookkeeping lives behind one mutex. User code (effect bodies,
//! schedulers, getters, callbacks) never runs while it is held, and closures
//! removed from the tables are dropped only after it is released, since
//! their destructors may call back into the runtime.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::config::RuntimeConfig;
use crate::error::SchedulerError;
use crate::scheduler::{Job, Scheduler};

use super::cell::{Ref, RefValue};
use super::computed::Computed;
use super::context::{ActiveSlots, RunGuard, UntrackedGuard};
use super::dep::{DepKey, DepTable};
use super::effect::{DirtyLevel, Effect, EffectFn, EffectKind, EffectNode, EffectOptions};
use super::ids::{DepId, EffectId, SourceId};
use super::proxy::{Reactive, ReactiveInner};
use super::value::Target;
use super::watch::{self, OnCleanup, WatchHandle, WatchOptions, WatchSource};

/// Mutable bookkeeping shared by everything in one runtime.
#[derive(Default)]
pub(crate) struct ReactiveState {
    effects: HashMap<EffectId, EffectNode>,
    deps: DepTable,
    active: ActiveSlots,
    /// Effects whose scheduler is due once the current trigger pass ends.
    queued: VecDeque<EffectId>,
}

impl ReactiveState {
    fn track(&mut self, source: SourceId, key: DepKey, computed: Option<EffectId>) {
        let Some(active) = self.active.current() else {
            return;
        };
        let Some(track_id) = self.effects.get(&active).map(|node| node.track_id) else {
            return;
        };

        let dep = self.deps.get_or_create(source, key, computed);
        if self.deps.generation(dep, active) == Some(track_id) {
            return;
        }
        self.deps.link(dep, active, track_id);

        let Some(node) = self.effects.get_mut(&active) else {
            return;
        };
        let slot = node.deps_len;
        match node.deps.get(slot).copied() {
            Some(existing) if existing == dep => {}
            Some(stale) => {
                node.deps[slot] = dep;
                self.deps.unlink(stale, active, track_id);
            }
            None => node.deps.push(dep),
        }
        node.deps_len += 1;
        tracing::trace!(effect = active.raw(), source = source.raw(), "tracked");
    }

    fn trigger_dep(&mut self, dep: DepId, level: DirtyLevel) {
        for (effect, generation) in self.deps.subscribers(dep) {
            let Some(node) = self.effects.get_mut(&effect) else {
                continue;
            };
            let tracking = node.track_id == generation;
            if !tracking {
                continue;
            }

            if node.dirty < level {
                node.should_schedule |= node.dirty == DirtyLevel::Clean;
                node.dirty = level;
            }
            if !node.should_schedule {
                continue;
            }

            let cascade = node.computed_source();
            let ready = node.running == 0 || node.allow_recurse;
            if ready {
                node.should_schedule = false;
            }

            if let Some(source) = cascade {
                if let Some(own) = self.deps.find(source, &DepKey::Value) {
                    self.trigger_dep(own, DirtyLevel::MaybeDirty);
                }
            } else if ready {
                self.queued.push_back(effect);
            }
        }
    }
}

pub(crate) struct RuntimeInner {
    state: Mutex<ReactiveState>,
    wrappers: DashMap<(SourceId, bool), Weak<ReactiveInner>>,
    scheduler: Scheduler,
    config: RuntimeConfig,
}

/// Handle to a reactive runtime.
///
/// Cloning is cheap and every clone refers to the same runtime. Primitives
/// created through a runtime hold a [`WeakRuntime`], so dropping the last
/// `Runtime` handle turns them into plain, untracked containers.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicI32, Ordering};
/// use ripple_core::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.new_ref(0);
/// let count_clone = count.clone();
/// let double = rt.computed(move || count_clone.get() * 2);
///
/// let calls = Arc::new(AtomicI32::new(0));
/// let calls_clone = calls.clone();
/// let double_clone = double.clone();
/// rt.effect(move || {
///     calls_clone.fetch_add(1, Ordering::SeqCst);
///     double_clone.get();
/// });
///
/// count.update(|n| n + 1);
/// assert_eq!(calls.load(Ordering::SeqCst), 2);
/// assert_eq!(double.get(), 2);
/// ```
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

/// Non-owning handle to a [`Runtime`].
#[derive(Clone, Default)]
pub struct WeakRuntime {
    inner: Weak<RuntimeInner>,
}

impl WeakRuntime {
    pub fn upgrade(&self) -> Option<Runtime> {
        self.inner.upgrade().map(|inner| Runtime { inner })
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                state: Mutex::new(ReactiveState::default()),
                wrappers: DashMap::new(),
                scheduler: Scheduler::new(config.recursion_limit),
                config,
            }),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn downgrade(&self) -> WeakRuntime {
        WeakRuntime {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ------------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------------

    /// The reactive wrapper of `target`.
    pub fn reactive(&self, target: Target) -> Reactive {
        self.wrap(target, false)
    }

    /// The readonly wrapper of `target`. Writes through it are rejected.
    pub fn readonly(&self, target: Target) -> Reactive {
        self.wrap(target, true)
    }

    pub(crate) fn wrap(&self, target: Target, readonly: bool) -> Reactive {
        let key = (target.id(), readonly);
        let existing = self
            .inner
            .wrappers
            .get(&key)
            .and_then(|weak| weak.upgrade());
        if let Some(inner) = existing {
            return Reactive::from_inner(inner);
        }

        let reactive = Reactive::from_inner(Arc::new(ReactiveInner::new(
            target,
            readonly,
            self.downgrade(),
        )));
        self.inner.wrappers.insert(key, reactive.downgrade());
        reactive
    }

    pub(crate) fn forget_wrapper(&self, id: SourceId, readonly: bool) {
        self.inner
            .wrappers
            .remove_if(&(id, readonly), |_, weak| weak.strong_count() == 0);
    }

    pub fn new_ref<T: RefValue>(&self, value: T) -> Ref<T> {
        Ref::new(self, value)
    }

    pub fn computed<T, F>(&self, getter: F) -> Computed<T>
    where
        T: RefValue,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Computed::new(self, Box::new(getter), None)
    }

    pub fn computed_with_setter<T, F, S>(&self, getter: F, setter: S) -> Computed<T>
    where
        T: RefValue,
        F: Fn() -> T + Send + Sync + 'static,
        S: Fn(T) + Send + Sync + 'static,
    {
        Computed::new(self, Box::new(getter), Some(Box::new(setter)))
    }

    /// Run `f` now and again whenever something it read changes.
    pub fn effect<F>(&self, f: F) -> Effect
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.effect_with(f, EffectOptions::default())
    }

    pub fn effect_with<F>(&self, f: F, options: EffectOptions) -> Effect
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = EffectId::new();
        let func: EffectFn = Arc::new(f);
        self.register_effect(id, func.clone(), &options, EffectKind::Plain);

        let effect = Effect::new(id, self.downgrade(), func);
        if !options.lazy {
            effect.run();
        }
        effect
    }

    /// Call `callback(new, old, on_cleanup)` when `source` changes.
    pub fn watch<T, S, F>(&self, source: S, callback: F, options: WatchOptions) -> WatchHandle
    where
        T: RefValue,
        S: Into<WatchSource<T>>,
        F: Fn(&T, Option<&T>, &OnCleanup) + Send + Sync + 'static,
    {
        watch::watch(self, source.into(), Arc::new(callback), options)
    }

    /// Run `f` now and again, at the requested flush timing, whenever
    /// something it read changes.
    pub fn watch_effect<F>(&self, f: F, options: WatchOptions) -> WatchHandle
    where
        F: Fn(&OnCleanup) + Send + Sync + 'static,
    {
        watch::watch_effect(self, f, options)
    }

    /// Run `f` without recording dependencies.
    pub fn untracked<R, F>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = UntrackedGuard::enter(self);
        f()
    }

    // ------------------------------------------------------------------------
    // Tracking
    // ------------------------------------------------------------------------

    pub(crate) fn track(&self, source: SourceId, key: DepKey, computed: Option<EffectId>) {
        self.inner.state.lock().track(source, key, computed);
    }

    /// Notify the readers of `keys` on `source`, then run due schedulers.
    pub(crate) fn trigger(&self, source: SourceId, keys: &[DepKey], level: DirtyLevel) {
        {
            let mut state = self.inner.state.lock();
            let deps: Vec<DepId> = keys
                .iter()
                .filter_map(|key| state.deps.find(source, key))
                .collect();
            if deps.is_empty() {
                return;
            }
            tracing::trace!(source = source.raw(), deps = deps.len(), ?level, "trigger");
            for dep in deps {
                state.trigger_dep(dep, level);
            }
        }
        self.drain_schedulers();
    }

    /// Notify every reader of `source` whose key satisfies `pred`.
    pub(crate) fn trigger_matching<F>(&self, source: SourceId, pred: F)
    where
        F: FnMut(&DepKey) -> bool,
    {
        {
            let mut state = self.inner.state.lock();
            let deps = state.deps.find_matching(source, pred);
            if deps.is_empty() {
                return;
            }
            tracing::trace!(source = source.raw(), deps = deps.len(), "trigger matching");
            for dep in deps {
                state.trigger_dep(dep, DirtyLevel::Dirty);
            }
        }
        self.drain_schedulers();
    }

    fn drain_schedulers(&self) {
        loop {
            let (effect, scheduler) = {
                let mut state = self.inner.state.lock();
                loop {
                    let Some(effect) = state.queued.pop_front() else {
                        return;
                    };
                    if let Some(node) = state.effects.get(&effect) {
                        break (effect, node.scheduler.clone());
                    }
                }
            };

            match scheduler {
                Some(scheduler) => scheduler(),
                None => {
                    if self.is_dirty(effect) {
                        self.run_effect(effect);
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Effects
    // ------------------------------------------------------------------------

    pub(crate) fn register_effect(
        &self,
        id: EffectId,
        func: EffectFn,
        options: &EffectOptions,
        kind: EffectKind,
    ) {
        self.inner
            .state
            .lock()
            .effects
            .insert(id, EffectNode::new(func, options, kind));
    }

    /// Run a live effect with tracking. Returns `false` if it was stopped.
    pub(crate) fn run_effect(&self, id: EffectId) -> bool {
        let (func, previous) = {
            let mut state = self.inner.state.lock();
            let Some(node) = state.effects.get_mut(&id) else {
                return false;
            };
            node.dirty = DirtyLevel::Clean;
            node.running += 1;
            node.track_id += 1;
            node.deps_len = 0;
            let func = node.func.clone();
            let previous = state.active.replace(Some(id));
            (func, previous)
        };

        let _guard = RunGuard::new(self, id, previous);
        func();
        true
    }

    /// Post-run bookkeeping. Returns the effect that occupied the active slot.
    pub(crate) fn finish_run(&self, id: EffectId, previous: Option<EffectId>) -> Option<EffectId> {
        let mut state = self.inner.state.lock();
        let restored = state.active.replace(previous);

        let ReactiveState { effects, deps, .. } = &mut *state;
        if let Some(node) = effects.get_mut(&id) {
            let (len, track_id) = (node.deps_len, node.track_id);
            for stale in node.deps.drain(len..) {
                deps.unlink(stale, id, track_id);
            }
            node.running = node.running.saturating_sub(1);
        }
        restored
    }

    pub(crate) fn replace_active(&self, effect: Option<EffectId>) -> Option<EffectId> {
        self.inner.state.lock().active.replace(effect)
    }

    /// The effect currently collecting dependencies on the calling thread.
    pub fn active_effect(&self) -> Option<EffectId> {
        self.inner.state.lock().active.current()
    }

    pub(crate) fn stop_effect(&self, id: EffectId) {
        let node = {
            let mut state = self.inner.state.lock();
            let Some(mut node) = state.effects.remove(&id) else {
                return;
            };
            let past = node.track_id + 1;
            for dep in node.deps.drain(..) {
                state.deps.unlink(dep, id, past);
            }
            node.deps_len = 0;
            node
        };

        tracing::debug!(effect = id.raw(), "effect stopped");
        if let Some(on_stop) = &node.on_stop {
            on_stop();
        }
        drop(node);
    }

    pub(crate) fn effect_exists(&self, id: EffectId) -> bool {
        self.inner.state.lock().effects.contains_key(&id)
    }

    /// Resolve a maybe-dirty effect by refreshing the computeds it read.
    pub(crate) fn is_dirty(&self, id: EffectId) -> bool {
        {
            let mut state = self.inner.state.lock();
            let Some(node) = state.effects.get_mut(&id) else {
                return false;
            };
            if node.dirty != DirtyLevel::MaybeDirty {
                return node.dirty >= DirtyLevel::Dirty;
            }
            node.dirty = DirtyLevel::Querying;
        }

        let _untracked = UntrackedGuard::enter(self);
        let mut index = 0;
        loop {
            let refresh = {
                let state = self.inner.state.lock();
                let Some(node) = state.effects.get(&id) else {
                    break;
                };
                if node.dirty >= DirtyLevel::Dirty || index >= node.deps_len {
                    break;
                }
                let dep = node.deps[index];
                state
                    .deps
                    .computed_of(dep)
                    .and_then(|computed| state.effects.get(&computed))
                    .and_then(EffectNode::refresh)
            };
            index += 1;
            if let Some(refresh) = refresh {
                refresh();
            }
        }

        let mut state = self.inner.state.lock();
        let Some(node) = state.effects.get_mut(&id) else {
            return false;
        };
        if node.dirty == DirtyLevel::Querying {
            node.dirty = DirtyLevel::Clean;
        }
        node.dirty >= DirtyLevel::Dirty
    }

    pub(crate) fn mark_dirty(&self, id: EffectId) {
        if let Some(node) = self.inner.state.lock().effects.get_mut(&id) {
            node.dirty = DirtyLevel::Dirty;
        }
    }

    pub(crate) fn dirty_level(&self, id: EffectId) -> Option<DirtyLevel> {
        self.inner.state.lock().effects.get(&id).map(|node| node.dirty)
    }

    pub(crate) fn effect_dependency_count(&self, id: EffectId) -> usize {
        self.inner
            .state
            .lock()
            .effects
            .get(&id)
            .map(|node| node.deps.len())
            .unwrap_or(0)
    }

    pub(crate) fn subscriber_count(&self, source: SourceId, key: &DepKey) -> usize {
        self.inner.state.lock().deps.subscriber_count(source, key)
    }

    /// Whether `effect` appears in any dependency set.
    pub fn is_subscribed(&self, effect: EffectId) -> bool {
        self.inner.state.lock().deps.is_linked(effect)
    }

    /// Number of live effects.
    pub fn effect_count(&self) -> usize {
        self.inner.state.lock().effects.len()
    }

    /// Number of live dependency sets.
    pub fn dep_count(&self) -> usize {
        self.inner.state.lock().deps.len()
    }

    // ------------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------------

    /// Queue `job` for the next flush. Queuing a job twice runs it once.
    pub fn queue_job(&self, job: &Job) {
        self.inner.scheduler.queue(job);
    }

    /// Queue `job` to run after the queued jobs of the next flush.
    pub fn queue_post_flush(&self, job: &Job) {
        self.inner.scheduler.queue_post(job);
    }

    /// Remove `job` from the queue if it has not run yet.
    pub fn invalidate_job(&self, job: &Job) {
        self.inner.scheduler.invalidate(job);
    }

    pub fn has_pending_jobs(&self) -> bool {
        self.inner.scheduler.has_pending()
    }

    /// Run every queued job now. This is the end of a tick.
    ///
    /// An aborted flush drops the queue, so effects whose job was dropped are
    /// re-armed: their next trigger schedules them again.
    pub fn flush_jobs(&self) -> Result<(), SchedulerError> {
        let result = self.inner.scheduler.flush();
        if result.is_err() {
            self.rearm_waiting_effects();
        }
        result
    }

    fn rearm_waiting_effects(&self) {
        let mut state = self.inner.state.lock();
        let mut rearmed = 0usize;
        for node in state.effects.values_mut() {
            let waiting = node.dirty != DirtyLevel::Clean
                && node.running == 0
                && !node.should_schedule
                && node.computed_source().is_none();
            if waiting {
                node.should_schedule = true;
                rearmed += 1;
            }
        }
        tracing::debug!(rearmed, "effects re-armed after aborted flush");
    }

    /// Yield to the async runtime once, then complete the pending flush.
    pub async fn next_tick(&self) -> Result<(), SchedulerError> {
        tokio::task::yield_now().await;
        self.flush_jobs()
    }

    /// Flush whenever jobs are queued. Only returns on a flush error.
    ///
    /// ```rust,no_run
    /// # async fn run() {
    /// let rt = ripple_core::Runtime::new();
    /// let driver = rt.clone();
    /// tokio::spawn(async move { driver.drive().await });
    /// # }
    /// ```
    pub async fn drive(&self) -> Result<(), SchedulerError> {
        loop {
            self.inner.scheduler.notified().await;
            self.flush_jobs()?;
        }
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Runtime")
            .field("effects", &state.effects.len())
            .field("deps", &state.deps.len())
            .field("active", &state.active.current())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl fmt::Debug for WeakRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakRuntime")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
