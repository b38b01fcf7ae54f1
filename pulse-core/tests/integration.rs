//! Integration tests for the reactive engine.
//!
//! These exercise signals, computeds, effects, batching, and disposal
//! working together, including the classic diamond-shaped dependency
//! graph.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use pulse_core::reactive::{
    batch, computed, create_root, effect, set_error_hook, signal, untrack, ReactiveError,
};

/// The end-to-end scenario every consumer of the engine relies on: a
/// signal feeds a computed feeds an effect, and a single write propagates
/// through the whole chain in one pass.
#[test]
fn signal_computed_effect_chain() {
    let a = signal(1);
    let b = computed(move || a.get() * 2);

    let log = Rc::new(RefCell::new(Vec::new()));
    let log_clone = Rc::clone(&log);
    let _effect = effect(move || {
        log_clone.borrow_mut().push(b.get());
    });

    a.set(2);

    assert_eq!(*log.borrow(), vec![2, 4]);
}

/// Diamond: two computeds derive from the same base and a third joins
/// them. After a base write the join must observe one coherent update,
/// never a mix of old and new branch values.
#[test]
fn diamond_updates_are_coherent() {
    let base = signal(1);
    let left = computed(move || base.get() + 1);
    let right = computed(move || base.get() * 2);
    let sum = computed(move || left.get() + right.get());

    assert_eq!(sum.get(), 4);

    base.set(10);
    assert_eq!(sum.get(), 31); // 11 + 20, one coherent snapshot
}

/// The effect-facing side of the diamond: one base write produces exactly
/// one effect run, with both branches already resolved.
#[test]
fn diamond_effect_runs_once_per_write() {
    let base = signal(1);
    let left = computed(move || base.get() + 1);
    let right = computed(move || base.get() * 2);

    let runs = Arc::new(AtomicI32::new(0));
    let observed = Rc::new(RefCell::new(Vec::new()));
    let runs_clone = runs.clone();
    let observed_clone = Rc::clone(&observed);
    let _effect = effect(move || {
        observed_clone.borrow_mut().push((left.get(), right.get()));
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    base.set(10);

    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(*observed.borrow(), vec![(2, 2), (11, 20)]);
}

#[test]
fn batched_writes_are_one_consistent_snapshot() {
    let first_name = signal("Ada".to_string());
    let last_name = signal("Lovelace".to_string());

    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen_clone = Rc::clone(&seen);
    let _effect = effect(move || {
        seen_clone
            .borrow_mut()
            .push(format!("{} {}", first_name.get(), last_name.get()));
    });

    batch(|| {
        first_name.set("Grace".to_string());
        last_name.set("Hopper".to_string());
    });

    // Never "Grace Lovelace".
    assert_eq!(
        *seen.borrow(),
        vec!["Ada Lovelace".to_string(), "Grace Hopper".to_string()]
    );
}

#[test]
fn computed_recomputes_once_between_writes() {
    let source = signal(0);

    let computes = Arc::new(AtomicI32::new(0));
    let computes_clone = computes.clone();
    let derived = computed(move || {
        computes_clone.fetch_add(1, Ordering::SeqCst);
        source.get() + 1
    });

    for _ in 0..5 {
        derived.get();
    }
    assert_eq!(computes.load(Ordering::SeqCst), 1);

    source.set(1);
    for _ in 0..5 {
        derived.get();
    }
    assert_eq!(computes.load(Ordering::SeqCst), 2);
}

#[test]
fn untrack_reads_do_not_create_edges() {
    let tracked = signal(0);
    let peeked = signal(100);

    let runs = Arc::new(AtomicI32::new(0));
    let runs_clone = runs.clone();
    let _effect = effect(move || {
        tracked.get();
        untrack(|| peeked.get());
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    peeked.set(200);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    tracked.set(1);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn root_disposal_tears_down_a_deep_graph() {
    let source = signal(0);

    let runs = Arc::new(AtomicI32::new(0));
    let runs_clone = runs.clone();
    let disposer = create_root(|dispose| {
        let doubled = computed(move || source.get() * 2);
        let runs = runs_clone;
        effect(move || {
            // A nested effect under the first one, two scopes deep.
            let runs = runs.clone();
            effect(move || {
                doubled.get();
                runs.fetch_add(1, Ordering::SeqCst);
            });
        });
        dispose
    });
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    source.set(1);
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    disposer.dispose();
    source.set(2);
    source.set(3);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(source.subscriber_count(), 0);
}

#[test]
fn computed_error_does_not_poison_unrelated_readers() {
    let n = signal(1);

    let fallible = computed(move || {
        if n.get() < 0 {
            panic!("negative input");
        }
        n.get() * 10
    });
    let sibling = computed(move || n.get() + 1);

    assert_eq!(fallible.try_get(), Ok(10));
    assert_eq!(sibling.try_get(), Ok(2));

    n.set(-1);
    assert!(matches!(
        fallible.try_get(),
        Err(ReactiveError::Computation { .. })
    ));
    assert_eq!(sibling.try_get(), Ok(0));

    n.set(3);
    assert_eq!(fallible.try_get(), Ok(30));
    assert_eq!(sibling.try_get(), Ok(4));
}

#[test]
fn effect_errors_are_isolated_per_effect() {
    let n = signal(0);

    let errors = Rc::new(RefCell::new(Vec::new()));
    let errors_clone = Rc::clone(&errors);
    set_error_hook(move |err| {
        errors_clone.borrow_mut().push(err.clone());
    });

    let _fallible = effect(move || {
        if n.get() == 13 {
            panic!("unlucky");
        }
    });

    let seen = Arc::new(AtomicI32::new(0));
    let seen_clone = seen.clone();
    let _sibling = effect(move || {
        seen_clone.store(n.get(), Ordering::SeqCst);
    });

    n.set(13);

    assert_eq!(seen.load(Ordering::SeqCst), 13);
    assert_eq!(
        *errors.borrow(),
        vec![ReactiveError::Computation {
            message: "unlucky".to_string()
        }]
    );

    // The failing effect stays subscribed and recovers on the next write.
    n.set(14);
    assert_eq!(seen.load(Ordering::SeqCst), 14);
    assert_eq!(errors.borrow().len(), 1);
}

#[test]
fn conditional_dependencies_follow_the_taken_branch() {
    let use_celsius = signal(true);
    let celsius = signal(20);
    let fahrenheit = signal(68);

    let runs = Arc::new(AtomicI32::new(0));
    let shown = Arc::new(AtomicI32::new(0));
    let runs_clone = runs.clone();
    let shown_clone = shown.clone();
    let _display = effect(move || {
        let value = if use_celsius.get() {
            celsius.get()
        } else {
            fahrenheit.get()
        };
        shown_clone.store(value, Ordering::SeqCst);
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(shown.load(Ordering::SeqCst), 20);

    // Fahrenheit is not a dependency while celsius is shown.
    fahrenheit.set(70);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    use_celsius.set(false);
    assert_eq!(shown.load(Ordering::SeqCst), 70);

    // And celsius stops being one after the switch.
    celsius.set(25);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(celsius.subscriber_count(), 0);
}
