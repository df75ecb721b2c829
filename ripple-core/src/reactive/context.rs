//! Tracking Context
//!
//! The runtime keeps one "active effect" slot per thread. Reads performed
//! while an effect is active on the reading thread link that effect into the
//! dependency set being read. A read on another thread is not tracked by it.
//!
//! # Implementation
//!
//! Nesting is handled by save/restore rather than an explicit stack: entering
//! a run saves the previous occupant of the slot, and the guard returned puts
//! it back when dropped. Because restoration happens in `Drop`, the slot is
//! also restored when the effect function panics, and the panic then
//! propagates to the caller.

use std::collections::HashMap;
use std::thread::{self, ThreadId};

use super::ids::EffectId;
use super::runtime::Runtime;

/// The active effect of each thread currently inside a tracked run.
#[derive(Debug, Default)]
pub(crate) struct ActiveSlots {
    slots: HashMap<ThreadId, EffectId>,
}

impl ActiveSlots {
    pub(crate) fn current(&self) -> Option<EffectId> {
        self.slots.get(&thread::current().id()).copied()
    }

    /// Set the calling thread's slot, returning its previous occupant.
    pub(crate) fn replace(&mut self, effect: Option<EffectId>) -> Option<EffectId> {
        let thread = thread::current().id();
        match effect {
            Some(effect) => self.slots.insert(thread, effect),
            None => self.slots.remove(&thread),
        }
    }
}

/// Restores the active slot and finishes an effect run when dropped.
pub(crate) struct RunGuard<'a> {
    runtime: &'a Runtime,
    effect: EffectId,
    previous: Option<EffectId>,
}

impl<'a> RunGuard<'a> {
    pub(crate) fn new(runtime: &'a Runtime, effect: EffectId, previous: Option<EffectId>) -> Self {
        Self {
            runtime,
            effect,
            previous,
        }
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let restored = self.runtime.finish_run(self.effect, self.previous);

        // Catches runs that were not unwound in the order they started.
        debug_assert_eq!(
            restored,
            Some(self.effect),
            "tracking context mismatch: expected {:?}, got {:?}",
            self.effect,
            restored
        );
    }
}

/// Clears the active slot for the guard's lifetime.
pub(crate) struct UntrackedGuard<'a> {
    runtime: &'a Runtime,
    previous: Option<EffectId>,
}

impl<'a> UntrackedGuard<'a> {
    pub(crate) fn enter(runtime: &'a Runtime) -> Self {
        let previous = runtime.replace_active(None);
        Self { runtime, previous }
    }
}

impl Drop for UntrackedGuard<'_> {
    fn drop(&mut self) {
        self.runtime.replace_active(self.previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::{mpsc, Arc};
    use std::thread;

    use parking_lot::Mutex;

    #[test]
    fn nested_runs_restore_outer_effect() {
        let rt = Runtime::new();
        let outer_source = rt.new_ref(0);
        let inner_source = rt.new_ref(0);
        let outer_runs = Arc::new(AtomicI32::new(0));

        let (rt_clone, outer_clone, inner_clone, runs_clone) = (
            rt.clone(),
            outer_source.clone(),
            inner_source.clone(),
            outer_runs.clone(),
        );
        rt.effect(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            let inner_clone = inner_clone.clone();
            rt_clone.effect(move || {
                inner_clone.get();
            });
            // Read after the nested effect ran: must still track the outer one.
            outer_clone.get();
        });

        assert_eq!(outer_source.subscriber_count(), 1);
        assert_eq!(inner_source.subscriber_count(), 1);

        inner_source.set(1);
        assert_eq!(outer_runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn untracked_reads_are_not_recorded() {
        let rt = Runtime::new();
        let source = rt.new_ref(0);

        let (rt_clone, source_clone) = (rt.clone(), source.clone());
        let effect = rt.effect(move || {
            rt_clone.untracked(|| source_clone.get());
        });

        assert_eq!(effect.dependency_count(), 0);
        assert_eq!(rt.active_effect(), None);
    }

    #[test]
    fn panicking_effect_restores_context() {
        let rt = Runtime::new();
        let source = rt.new_ref(0);

        let source_clone = source.clone();
        let result = catch_unwind(AssertUnwindSafe(|| {
            rt.effect(move || {
                source_clone.get();
                panic!("effect failed");
            });
        }));

        assert!(result.is_err());
        assert_eq!(rt.active_effect(), None);
        // The read before the panic was still recorded.
        assert_eq!(source.subscriber_count(), 1);
    }

    #[test]
    fn reads_on_another_thread_are_not_tracked() {
        let rt = Runtime::new();
        let own = rt.new_ref(0);
        let unrelated = rt.new_ref(0);
        let runs = Arc::new(AtomicI32::new(0));
        let (entered_tx, entered_rx) = mpsc::channel::<()>();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (entered_tx, release_rx) = (Mutex::new(entered_tx), Mutex::new(release_rx));

        let worker = {
            let (rt, own, runs) = (rt.clone(), own.clone(), runs.clone());
            thread::spawn(move || {
                rt.effect(move || {
                    own.get();
                    // Hold the first run open while the main thread reads.
                    if runs.fetch_add(1, Ordering::SeqCst) == 0 {
                        let _ = entered_tx.lock().send(());
                        let _ = release_rx.lock().recv();
                    }
                })
            })
        };

        entered_rx.recv().unwrap();
        assert_eq!(rt.active_effect(), None);
        unrelated.get();
        release_tx.send(()).unwrap();
        let effect = worker.join().unwrap();

        assert_eq!(effect.dependency_count(), 1);
        assert_eq!(unrelated.subscriber_count(), 0);
        unrelated.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        own.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
