//! Effect implementation.
//!
//! An effect is an eagerly scheduled, side-effecting reaction to
//! dependency changes.
//!
//! # How Effects Work
//!
//! 1. Creation runs the body once, synchronously, to establish the
//!    initial source set.
//!
//! 2. When any source is written, the scheduler queues the effect; it
//!    re-runs during the flush, once per flush no matter how many of its
//!    sources changed.
//!
//! 3. Before each re-run, everything the previous run created is torn
//!    down: nested computations are disposed and cleanups registered with
//!    [`on_cleanup`](super::owner::on_cleanup) run in LIFO order. The
//!    source set is then rebuilt from scratch during the run.
//!
//! # Differences from Computed
//!
//! Effects have no value and no reader; the scheduler, not a caller,
//! decides when they run. A panicking effect is isolated by the flush loop
//! and never prevents sibling effects from running.

use super::node::{NodeId, NodeKind, NodeState};
use super::runtime::{self, EffectFn, NodeFn, Runtime};

use std::cell::RefCell;
use std::panic::panic_any;
use std::rc::Rc;

/// Handle to a running effect.
///
/// Dropping the handle does nothing; the effect keeps running until it is
/// disposed explicitly or its owner scope is torn down.
#[derive(Debug, Clone, Copy)]
pub struct EffectHandle {
    id: NodeId,
}

/// Create a new effect with the given body.
///
/// The body runs immediately. If an owner scope is active, the effect is
/// registered as its child and torn down with it.
pub fn effect(f: impl FnMut() + 'static) -> EffectHandle {
    let run: EffectFn = Rc::new(RefCell::new(f));
    let id = Runtime::with(|rt| rt.register_node(NodeKind::Effect, NodeFn::Effect(run)));

    // The initial run is subject to the same error funnel as scheduled
    // runs: hook if installed, re-raise otherwise.
    if let Err(err) = runtime::run_effect(id) {
        let hook = Runtime::with(|rt| rt.error_hook.clone());
        match hook {
            Some(hook) => hook(&err),
            None => panic_any(err),
        }
    }

    EffectHandle { id }
}

impl EffectHandle {
    /// Stop the effect permanently.
    ///
    /// Runs its pending cleanups, unsubscribes it from every source, and
    /// removes it from the scheduler queue if it was awaiting a flush.
    /// Idempotent.
    pub fn dispose(&self) {
        runtime::dispose_node(self.id);
    }

    /// Whether the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        Runtime::with(|rt| rt.node_state(self.id)) == NodeState::Disposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::owner::on_cleanup;
    use crate::reactive::signal::signal;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    #[test]
    fn effect_runs_on_creation() {
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();

        let _effect = effect(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn effect_reruns_on_source_write() {
        let count = signal(0);

        let seen = Arc::new(AtomicI32::new(-1));
        let seen_clone = seen.clone();
        let _effect = effect(move || {
            seen_clone.store(count.get(), Ordering::SeqCst);
        });
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        count.set(42);
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn effect_does_not_rerun_after_dispose() {
        let count = signal(0);

        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let handle = effect(move || {
            count.get();
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        handle.dispose();
        assert!(handle.is_disposed());

        count.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // Disposal dropped the subscription, not just the scheduling.
        assert_eq!(count.subscriber_count(), 0);
    }

    #[test]
    fn dispose_is_idempotent() {
        let handle = effect(|| {});
        handle.dispose();
        handle.dispose();
        assert!(handle.is_disposed());
    }

    #[test]
    fn dispose_drops_the_effect_body() {
        let count = signal(0);

        let captured = Rc::new(());
        let body_ref = Rc::clone(&captured);
        let handle = effect(move || {
            count.get();
            let _ = &body_ref;
        });
        assert_eq!(Rc::strong_count(&captured), 2);

        // Disposal releases the body and everything it captured.
        handle.dispose();
        assert_eq!(Rc::strong_count(&captured), 1);
    }

    #[test]
    fn cleanups_run_lifo_before_each_rerun() {
        let count = signal(0);

        let order = Rc::new(RefCell::new(Vec::new()));
        let order_clone = Rc::clone(&order);
        let _effect = effect(move || {
            let v = count.get();
            let first = Rc::clone(&order_clone);
            on_cleanup(move || first.borrow_mut().push(format!("a{v}")));
            let second = Rc::clone(&order_clone);
            on_cleanup(move || second.borrow_mut().push(format!("b{v}")));
        });
        assert!(order.borrow().is_empty());

        count.set(1);
        assert_eq!(*order.borrow(), vec!["b0".to_string(), "a0".to_string()]);
    }

    #[test]
    fn cleanups_run_on_dispose() {
        let cleaned = Arc::new(AtomicI32::new(0));
        let cleaned_clone = cleaned.clone();
        let handle = effect(move || {
            let counter = cleaned_clone.clone();
            on_cleanup(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        });
        assert_eq!(cleaned.load(Ordering::SeqCst), 0);

        handle.dispose();
        assert_eq!(cleaned.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn nested_effects_are_torn_down_when_the_parent_reruns() {
        let outer_dep = signal(0);
        let inner_dep = signal(0);

        let inner_runs = Arc::new(AtomicI32::new(0));
        let inner_runs_clone = inner_runs.clone();
        let _outer = effect(move || {
            outer_dep.get();
            let inner_runs = inner_runs_clone.clone();
            effect(move || {
                inner_dep.get();
                inner_runs.fetch_add(1, Ordering::SeqCst);
            });
        });
        assert_eq!(inner_runs.load(Ordering::SeqCst), 1);

        // Re-running the outer effect replaces the nested one; only a
        // single inner instance reacts to inner_dep afterwards.
        outer_dep.set(1);
        assert_eq!(inner_runs.load(Ordering::SeqCst), 2);

        inner_dep.set(1);
        assert_eq!(inner_runs.load(Ordering::SeqCst), 3);
        assert_eq!(inner_dep.subscriber_count(), 1);
    }
}
