//! Error taxonomy for the reactive engine.
//!
//! Three things can go wrong inside the engine:
//!
//! - a computation reads itself while it is running (a cycle),
//! - a disposed computed is read after its owner was torn down,
//! - a user-supplied closure fails.
//!
//! A computed caches whichever of these unwound through it and re-surfaces
//! it on every read until one of its sources changes. Effect failures are
//! isolated per effect by the flush loop and funneled to the optional
//! error hook.

use std::any::Any;

use thiserror::Error;

/// An error produced by the reactive engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A computation re-entered itself while running, directly or through
    /// a chain of other computations.
    #[error("circular dependency detected: computation read itself while running")]
    CircularDependency,

    /// A disposed computed was read after its owning scope was torn down.
    #[error("disposed access: computation was torn down with its owner")]
    DisposedAccess,

    /// A user-supplied computation failed.
    #[error("computation failed: {message}")]
    Computation {
        /// The panic message of the failed computation.
        message: String,
    },
}

impl ReactiveError {
    /// Recover a `ReactiveError` from a caught panic payload.
    ///
    /// Engine errors are re-raised with `panic_any(ReactiveError)` so they
    /// keep their variant across a user closure boundary; anything else
    /// becomes a [`ReactiveError::Computation`] carrying the panic message.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        match payload.downcast::<ReactiveError>() {
            Ok(err) => *err,
            Err(payload) => {
                let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
                    (*s).to_string()
                } else if let Some(s) = payload.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "computation panicked".to_string()
                };
                ReactiveError::Computation { message }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn engine_errors_survive_a_panic_boundary() {
        let payload = catch_unwind(AssertUnwindSafe(|| {
            std::panic::panic_any(ReactiveError::CircularDependency);
        }))
        .unwrap_err();

        assert_eq!(
            ReactiveError::from_panic(payload),
            ReactiveError::CircularDependency
        );
    }

    #[test]
    fn str_panics_become_computation_errors() {
        let payload = catch_unwind(|| panic!("boom")).unwrap_err();

        assert_eq!(
            ReactiveError::from_panic(payload),
            ReactiveError::Computation {
                message: "boom".to_string()
            }
        );
    }

    #[test]
    fn opaque_panics_get_a_fallback_message() {
        let payload = catch_unwind(|| std::panic::panic_any(42_u32)).unwrap_err();

        assert_eq!(
            ReactiveError::from_panic(payload),
            ReactiveError::Computation {
                message: "computation panicked".to_string()
            }
        );
    }
}
