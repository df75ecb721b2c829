//! Ripple Core
//!
//! This crate provides the core runtime for the Ripple reactive rendering
//! framework. It implements:
//!
//! - Reactive primitives (refs, reactive wrappers, computeds, effects,
//!   watchers)
//! - A job scheduler that batches re-renders into ticks
//! - Virtual nodes, components and a keyed reconciler over a pluggable host
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives and dependency tracking
//! - `scheduler`: Deduplicated, ordered job queue and flush loop
//! - `render`: Virtual DOM, components and patching
//! - `config` / `error`: Runtime configuration and error types
//!
//! All state hangs off a [`Runtime`]; there is no process-wide tracking
//! context, so independent runtimes never observe each other.
//!
//! # Example
//!
//! ```rust
//! use ripple_core::Runtime;
//! use std::sync::atomic::{AtomicI32, Ordering};
//! use std::sync::Arc;
//!
//! let rt = Runtime::new();
//!
//! // Create a ref
//! let count = rt.new_ref(1);
//!
//! // Create a derived value
//! let c = count.clone();
//! let doubled = rt.computed(move || c.get() * 2);
//!
//! // Create an effect
//! let seen = Arc::new(AtomicI32::new(0));
//! let (d, s) = (doubled.clone(), seen.clone());
//! rt.effect(move || s.store(d.get(), Ordering::SeqCst));
//! assert_eq!(seen.load(Ordering::SeqCst), 2);
//!
//! // Update the ref; the effect runs again before `set` returns
//! count.set(5);
//! assert_eq!(seen.load(Ordering::SeqCst), 10);
//! ```

pub mod config;
pub mod error;
pub mod reactive;
pub mod render;
pub mod scheduler;

pub use config::RuntimeConfig;
pub use error::{ReactivityError, SchedulerError};
pub use reactive::{
    Computed, Effect, EffectOptions, Reactive, Ref, Runtime, Target, Value, WatchFlush, WatchOptions,
    WatchSource,
};
pub use scheduler::Job;
