//! Identifier types for the reactive system.
//!
//! Effects, dependency sets and reactive sources are stored in tables owned by
//! a [`Runtime`](super::Runtime) and referred to by these small copyable ids.
//! Handing out ids instead of pointers keeps the effect/dep graph free of
//! ownership cycles.

use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u64);

        impl $name {
            /// Generate a new unique id.
            ///
            /// Uses an atomic counter so ids stay unique across runtimes.
            pub fn new() -> Self {
                static COUNTER: AtomicU64 = AtomicU64::new(1);
                Self(COUNTER.fetch_add(1, Ordering::Relaxed))
            }

            /// Get the raw id value.
            pub fn raw(&self) -> u64 {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

define_id!(
    /// Identifies an effect (plain effect, computed getter, watcher or
    /// component update).
    EffectId
);

define_id!(
    /// Identifies a dependency set: the subscribers of one `(source, key)`.
    DepId
);

define_id!(
    /// Identifies something that can be read reactively: a ref, a computed or
    /// a structured target wrapped by [`Reactive`](super::Reactive).
    SourceId
);

define_id!(
    /// Identifies a scheduler job. Deduplication in the job queue is by id.
    JobId
);

define_id!(
    /// Identifies a mounted component instance. Instances created earlier get
    /// smaller ids, so parents sort before their children.
    InstanceId
);
