//! Signal implementation.
//!
//! A signal is the fundamental reactive primitive: a single mutable value
//! with a version stamp and a set of dependent computations.
//!
//! # How Signals Work
//!
//! 1. When a signal is read inside a computed or effect, the engine
//!    records a dependency edge from that computation to the signal.
//!
//! 2. When the signal's value changes, every transitive dependent is
//!    marked stale and dirty effects are queued.
//!
//! 3. Outside a batch, the write flushes immediately; inside one, the
//!    flush happens when the outermost batch exits.
//!
//! Writing a value equal to the current one is a complete no-op: no
//! version bump, no dirtying, no scheduling.
//!
//! The handle itself is a `Copy` id into the thread-local arena, so it can
//! be captured by any number of closures without explicit cloning.

use std::fmt::Debug;
use std::marker::PhantomData;
use std::rc::Rc;

use super::node::CellId;
use super::runtime::Runtime;
use super::scheduler::flush;

/// A reactive cell holding a value of type `T`.
///
/// # Example
///
/// ```rust,ignore
/// let count = signal(0);
///
/// // Read the value (tracked inside a computation)
/// let value = count.get();
///
/// // Update the value (notifies dependents)
/// count.set(5);
/// ```
pub struct Signal<T> {
    id: CellId,
    ty: PhantomData<fn() -> T>,
}

/// Create a new signal with the given initial value.
///
/// If an owner scope is active, the signal is registered as its child and
/// torn down with it.
pub fn signal<T: Clone + PartialEq + 'static>(initial: T) -> Signal<T> {
    let id = Runtime::with(|rt| rt.register_cell(Rc::new(initial)));
    Signal {
        id,
        ty: PhantomData,
    }
}

impl<T: Clone + PartialEq + 'static> Signal<T> {
    /// Get the current value.
    ///
    /// If called within a running computation, this also records the
    /// computation as a dependent of the signal.
    pub fn get(&self) -> T {
        let value = Runtime::with(|rt| rt.read_cell(self.id)).expect("signal slot missing");
        value
            .downcast_ref::<T>()
            .cloned()
            .expect("signal value type mismatch")
    }

    /// Get the current value without recording a dependency.
    pub fn get_untracked(&self) -> T {
        let value =
            Runtime::with(|rt| rt.read_cell_untracked(self.id)).expect("signal slot missing");
        value
            .downcast_ref::<T>()
            .cloned()
            .expect("signal value type mismatch")
    }

    /// Set a new value and notify dependents.
    ///
    /// Equal values are ignored. Writes to a signal whose owner scope was
    /// disposed are silently ignored.
    pub fn set(&self, value: T) {
        let should_flush = Runtime::with(|rt| {
            let changed = rt.write_cell(self.id, value);
            changed && rt.batch_depth == 0 && !rt.flushing && !rt.pending.is_empty()
        });
        if should_flush {
            flush();
        }
    }

    /// Update the value using a function of the current value.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.get_untracked());
        self.set(next);
    }

    /// The write version of this signal. Starts at zero and bumps on every
    /// accepted write.
    pub fn version(&self) -> u64 {
        Runtime::with(|rt| rt.cell_version(self.id))
    }

    /// How many computations currently subscribe to this signal.
    pub fn subscriber_count(&self) -> usize {
        Runtime::with(|rt| rt.cell_subscriber_count(self.id))
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Signal<T> {}

impl<T: Clone + PartialEq + Debug + 'static> Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id)
            .field("value", &self.get_untracked())
            .field("version", &self.version())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
