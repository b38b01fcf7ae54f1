//! Reactive Primitives
//!
//! This module implements the fine-grained reactive engine: signals,
//! computeds, effects, batching, and ownership-scoped disposal.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A [`Signal`] is a container for mutable state. When a signal is read
//! inside a computed or effect, the read automatically registers that
//! computation as a dependent. When the signal's value changes, all
//! dependents are invalidated; equal writes are complete no-ops.
//!
//! ## Computeds
//!
//! A [`Computed`] is a derived value that caches its result. It is lazy:
//! nothing runs until the value is read, and between two source writes the
//! body runs at most once no matter how often it is read. Failures,
//! including cycles, are cached and re-surfaced to every reader until a
//! source changes.
//!
//! ## Effects
//!
//! An [`effect`] is a side-effecting computation scheduled by the engine.
//! It runs once at creation and again after any of its sources change,
//! once per flush. [`batch`] coalesces any number of writes into a single
//! flush, so effects always observe a consistent snapshot.
//!
//! ## Owners
//!
//! [`create_root`] establishes a disposal scope. Everything created inside
//! it, however deeply nested, is torn down by the scope's disposer;
//! [`on_cleanup`] hooks into that teardown.
//!
//! # Implementation Notes
//!
//! Dependencies are discovered dynamically at run time through a
//! thread-local tracking context, the approach used by SolidJS, Vue 3, and
//! Leptos. The engine is single-threaded and run-to-completion; a flush,
//! once started, drains every pending effect before control returns.

mod computed;
mod context;
mod effect;
mod error;
mod node;
mod owner;
mod runtime;
mod scheduler;
mod signal;

pub use computed::{computed, Computed};
pub use context::untrack;
pub use effect::{effect, EffectHandle};
pub use error::ReactiveError;
pub use owner::{create_root, on_cleanup, RootDisposer};
pub use scheduler::{batch, clear_error_hook, set_error_hook};
pub use signal::{signal, Signal};
