//! Effect Implementation
//!
//! An Effect is a re-runnable computation that tracks which dependency sets
//! it read during its last run.
//!
//! # How Effects Work
//!
//! 1. When created (unless lazy), the effect runs its function immediately to
//!    establish initial dependencies.
//!
//! 2. When any dependency changes, the effect's dirty level is raised and its
//!    scheduler is invoked. Without a scheduler the effect simply re-runs if
//!    it is still dirty.
//!
//! 3. Each run bumps the effect's `track_id` and rewinds its dependency
//!    cursor. Reads during the run re-confirm existing links in place; links
//!    that were not re-confirmed are released after the run.
//!
//! # Dirty Levels
//!
//! Effects that depend on computed values can be notified "maybe dirty": an
//! upstream source of a computed changed, but the computed itself may still
//! produce the same value. The effect resolves this lazily by refreshing its
//! computed dependencies (see [`Effect::is_dirty`]).
//!
//! # Stopping
//!
//! [`Effect::stop`] releases every link immediately. A stopped effect can
//! still be invoked with [`Effect::run`]; it then runs without tracking.

use std::sync::Arc;

use smallvec::SmallVec;

use super::ids::{DepId, EffectId, SourceId};
use super::runtime::{Runtime, WeakRuntime};

/// A shareable effect body, scheduler or hook.
pub(crate) type EffectFn = Arc<dyn Fn() + Send + Sync>;

/// How stale an effect's last run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DirtyLevel {
    /// The last run is up-to-date.
    Clean,

    /// The effect is currently checking its computed dependencies.
    Querying,

    /// A computed dependency might have changed. Need to check.
    MaybeDirty,

    /// The effect definitely needs to re-run.
    Dirty,
}

/// Options for [`Runtime::effect_with`].
#[derive(Clone, Default)]
pub struct EffectOptions {
    /// Called instead of re-running when a dependency changes.
    pub scheduler: Option<Arc<dyn Fn() + Send + Sync>>,

    /// Do not run the effect on creation.
    pub lazy: bool,

    /// Allow the effect to be scheduled by writes it performs itself.
    pub allow_recurse: bool,

    /// Called once when the effect is stopped.
    pub on_stop: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl EffectOptions {
    /// Options with a custom scheduler.
    pub fn with_scheduler<F>(scheduler: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            scheduler: Some(Arc::new(scheduler)),
            ..Self::default()
        }
    }
}

/// What an effect node backs.
pub(crate) enum EffectKind {
    /// A plain effect, watcher or component update.
    Plain,
    /// The getter of a computed. `source` is the computed's own dep source;
    /// `refresh` recomputes the cached value if needed.
    Computed { source: SourceId, refresh: EffectFn },
}

/// Runtime-side state of one effect.
pub(crate) struct EffectNode {
    pub(crate) func: EffectFn,
    pub(crate) scheduler: Option<EffectFn>,
    pub(crate) on_stop: Option<EffectFn>,
    pub(crate) kind: EffectKind,
    /// Deps read in the current/last run, in read order.
    pub(crate) deps: SmallVec<[DepId; 4]>,
    /// How many entries of `deps` were confirmed during the current run.
    pub(crate) deps_len: usize,
    pub(crate) track_id: u64,
    pub(crate) running: u32,
    pub(crate) dirty: DirtyLevel,
    pub(crate) should_schedule: bool,
    pub(crate) allow_recurse: bool,
}

impl EffectNode {
    pub(crate) fn new(func: EffectFn, options: &EffectOptions, kind: EffectKind) -> Self {
        Self {
            func,
            scheduler: options.scheduler.clone(),
            on_stop: options.on_stop.clone(),
            kind,
            deps: SmallVec::new(),
            deps_len: 0,
            track_id: 0,
            running: 0,
            dirty: DirtyLevel::Dirty,
            should_schedule: false,
            allow_recurse: options.allow_recurse,
        }
    }

    /// The dep source to notify when this effect becomes dirty, for computeds.
    pub(crate) fn computed_source(&self) -> Option<SourceId> {
        match &self.kind {
            EffectKind::Computed { source, .. } => Some(*source),
            EffectKind::Plain => None,
        }
    }

    pub(crate) fn refresh(&self) -> Option<EffectFn> {
        match &self.kind {
            EffectKind::Computed { refresh, .. } => Some(refresh.clone()),
            EffectKind::Plain => None,
        }
    }
}

/// Handle to an effect registered with a [`Runtime`].
///
/// Cloning the handle does not clone the effect; all clones control the same
/// effect. Dropping every handle does not stop the effect: it keeps running
/// for as long as its dependencies change, until [`stop`](Self::stop) is
/// called.
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
/// let seen = Arc::new(AtomicI32::new(-1));
///
/// let count_clone = count.clone();
/// let seen_clone = seen.clone();
/// let effect = rt.effect(move || {
///     seen_clone.store(count_clone.get(), Ordering::SeqCst);
/// });
///
/// count.set(5);
/// assert_eq!(seen.load(Ordering::SeqCst), 5);
///
/// effect.stop();
/// count.set(6);
/// assert_eq!(seen.load(Ordering::SeqCst), 5);
/// ```
#[derive(Clone)]
pub struct Effect {
    id: EffectId,
    runtime: WeakRuntime,
    func: EffectFn,
}

impl Effect {
    pub(crate) fn new(id: EffectId, runtime: WeakRuntime, func: EffectFn) -> Self {
        Self { id, runtime, func }
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> EffectId {
        self.id
    }

    /// Run the effect now, re-collecting its dependencies.
    ///
    /// A stopped effect runs its function without tracking. A panic inside
    /// the function propagates after the runtime has restored its state.
    pub fn run(&self) {
        match self.runtime.upgrade() {
            Some(rt) if rt.run_effect(self.id) => {}
            _ => (self.func)(),
        }
    }

    /// Permanently deactivate the effect and release all its dependencies.
    pub fn stop(&self) {
        if let Some(rt) = self.runtime.upgrade() {
            rt.stop_effect(self.id);
        }
    }

    /// Whether the effect has not been stopped.
    pub fn is_active(&self) -> bool {
        self.runtime
            .upgrade()
            .map(|rt| rt.effect_exists(self.id))
            .unwrap_or(false)
    }

    /// Whether the effect needs to re-run.
    ///
    /// For a "maybe dirty" effect this refreshes the computed values it
    /// depends on, in dependency order, until one of them reports a change.
    pub fn is_dirty(&self) -> bool {
        self.runtime
            .upgrade()
            .map(|rt| rt.is_dirty(self.id))
            .unwrap_or(false)
    }

    /// Force the next [`is_dirty`](Self::is_dirty) check to report dirty.
    pub fn mark_dirty(&self) {
        if let Some(rt) = self.runtime.upgrade() {
            rt.mark_dirty(self.id);
        }
    }

    /// The current dirty level, or `None` once stopped.
    pub fn dirty_level(&self) -> Option<DirtyLevel> {
        self.runtime.upgrade()?.dirty_level(self.id)
    }

    /// Number of dependency sets the effect is linked into.
    pub fn dependency_count(&self) -> usize {
        self.runtime
            .upgrade()
            .map(|rt| rt.effect_dependency_count(self.id))
            .unwrap_or(0)
    }

    pub(crate) fn runtime(&self) -> Option<Runtime> {
        self.runtime.upgrade()
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
