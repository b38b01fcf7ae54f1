//! Computed implementation.
//!
//! A computed is a lazily evaluated, memoized derived value.
//!
//! # How Computeds Work
//!
//! 1. Creation does not run the body. The node starts stale.
//!
//! 2. The first read runs the body under tracking, caches the result, and
//!    records exactly the sources that were read.
//!
//! 3. A source write marks the computed stale without re-running it; the
//!    next read recomputes. Reads of a clean computed return the cache in
//!    O(1), so the body runs at most once between any two source writes no
//!    matter how many times the value is read.
//!
//! 4. The source set is rebuilt from scratch on every run, so a read
//!    behind a branch that was not taken this time is pruned and stops
//!    invalidating the computed.
//!
//! # Failure
//!
//! A body that panics has the failure cached and re-surfaced on every
//! subsequent read until a source changes. A computed that reads itself
//! while running, directly or through other computeds, fails with
//! [`ReactiveError::CircularDependency`] instead of recursing; the cycle
//! is detected when the self-referential read actually happens, not when
//! the computed is defined.

use std::fmt::Debug;
use std::marker::PhantomData;
use std::panic::panic_any;
use std::rc::Rc;

use super::error::ReactiveError;
use super::node::{NodeId, NodeKind, NodeState};
use super::runtime::{update_computed, NodeFn, Runtime};

/// A lazily evaluated, memoized derived value.
///
/// # Example
///
/// ```rust,ignore
/// let count = signal(2);
/// let doubled = computed(move || count.get() * 2);
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Computed<T> {
    id: NodeId,
    ty: PhantomData<fn() -> T>,
}

/// Create a new computed with the given body.
///
/// The body is not run until the first read. If an owner scope is active,
/// the computed is registered as its child and torn down with it.
pub fn computed<T: Clone + 'static>(f: impl Fn() -> T + 'static) -> Computed<T> {
    let compute: Rc<dyn Fn() -> Rc<dyn std::any::Any>> = Rc::new(move || {
        let value: Rc<dyn std::any::Any> = Rc::new(f());
        value
    });
    let id = Runtime::with(|rt| rt.register_node(NodeKind::Computed, NodeFn::Computed(compute)));
    Computed {
        id,
        ty: PhantomData,
    }
}

impl<T: Clone + 'static> Computed<T> {
    /// Get the current value, recomputing if a source changed.
    ///
    /// Engine errors are re-raised at the call site: a cached computation
    /// failure surfaces as the original panic message, a cycle or a read
    /// after disposal as the corresponding [`ReactiveError`]. Use
    /// [`try_get`](Self::try_get) to handle them as values.
    pub fn get(&self) -> T {
        match self.try_get() {
            Ok(value) => value,
            Err(err) => panic_any(err),
        }
    }

    /// Get the current value, or the error that poisoned it.
    pub fn try_get(&self) -> Result<T, ReactiveError> {
        let value = update_computed(self.id)?;
        Ok(value
            .downcast_ref::<T>()
            .cloned()
            .expect("computed value type mismatch"))
    }

    /// Whether a source changed since the last completed run.
    pub fn is_stale(&self) -> bool {
        Runtime::with(|rt| rt.node_state(self.id)) == NodeState::Stale
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Computed<T> {}

impl<T: Clone + 'static> Debug for Computed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.id)
            .field("state", &Runtime::with(|rt| rt.node_state(self.id)))
            .finish()
    }
}
