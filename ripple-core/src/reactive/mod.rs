//! Reactive Primitives
//!
//! This module implements the reactive system: refs, computeds, reactive
//! wrappers, effects and watchers. These primitives form the foundation of
//! Ripple's fine-grained reactivity.
//!
//! # Concepts
//!
//! ## Refs and Reactive Wrappers
//!
//! A [`Ref`] holds a single value. A [`Reactive`] wraps a structured
//! [`Target`] (object, array, map or set) and observes every slot of it
//! individually. Reading either within an effect registers the effect as a
//! dependent; writing a different value notifies the dependents.
//!
//! ## Computeds
//!
//! A [`Computed`] is a derived value that caches its result. It re-evaluates
//! only when one of its dependencies changes, and only when read.
//!
//! ## Effects and Watchers
//!
//! An [`Effect`] re-runs whenever its dependencies change. Watchers
//! ([`Runtime::watch`], [`Runtime::watch_effect`]) are effects whose re-runs
//! go through the job scheduler and call back with old and new values.
//!
//! # Implementation Notes
//!
//! All state lives in a [`Runtime`] value; there is no global tracking
//! context. Each effect records the dependency sets it read in its last run,
//! tagged with a per-run generation, which makes re-tracking an unchanged
//! dependency pattern allocation-free and drops dependencies that were not
//! read again.

mod cell;
mod computed;
mod context;
mod dep;
mod effect;
pub(crate) mod ids;
mod proxy;
mod runtime;
mod value;
mod watch;

pub use cell::{has_changed, ObjectRef, Ref, RefValue};
pub use computed::Computed;
pub use effect::{DirtyLevel, Effect, EffectOptions};
pub use ids::{EffectId, JobId, SourceId};
pub use proxy::Reactive;
pub use runtime::{Runtime, WeakRuntime};
pub use value::{Key, ReactiveFlag, Target, TargetData, TargetKind, Value};
pub use watch::{OnCleanup, WatchCallback, WatchDepth, WatchFlush, WatchHandle, WatchOptions, WatchSource};
