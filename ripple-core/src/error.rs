//! Error types.
//!
//! Invariant violations (writing through a readonly view, writing a
//! getter-only computed) are reported as values rather than panics so a single
//! bad write never tears down a render. Panics raised by user callbacks are not
//! represented here: they propagate to the caller after the runtime has
//! restored its bookkeeping.

use thiserror::Error;

use crate::scheduler::JobId;

/// Errors produced by the reactive layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactivityError {
    /// A write went through a readonly wrapper.
    #[error("set operation on key \"{key}\" failed: target is readonly")]
    Readonly {
        /// The key that was written.
        key: String,
    },

    /// A write went to a computed value created without a setter.
    #[error("write operation failed: computed value is readonly")]
    ComputedReadonly,

    /// The operation does not apply to the target kind (e.g. `push` on a map).
    #[error("operation `{op}` is not supported on a reactive {kind}")]
    Unsupported {
        /// Operation name.
        op: &'static str,
        /// Target kind name.
        kind: &'static str,
    },

    /// An array write would leave a gap: arrays only grow at the end.
    #[error("writing index {index} would leave a gap in a reactive array of length {len}")]
    ArrayGap {
        /// The index that was written.
        index: usize,
        /// Array length at the time of the write.
        len: usize,
    },

    /// The key does not address a slot of this target kind.
    #[error("key \"{key}\" is not valid for a reactive {kind}")]
    InvalidKey {
        key: String,
        kind: &'static str,
    },

    /// `length` was set to something other than a non-negative integer.
    #[error("invalid array length: {value}")]
    InvalidLength { value: String },
}

/// Errors produced while flushing the job queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// A job kept re-queueing itself within a single flush.
    #[error(
        "maximum recursive updates exceeded: job {job:?} ran more than {limit} times in one flush; \
         an effect is likely mutating state it depends on"
    )]
    RecursiveUpdate {
        /// The offending job.
        job: JobId,
        /// Configured limit.
        limit: usize,
    },
}
