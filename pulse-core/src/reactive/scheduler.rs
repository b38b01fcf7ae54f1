//! Batching and the flush loop.
//!
//! Writes do not run effects directly. They mark dependents stale and
//! queue dirty effects; the flush loop then runs each queued effect exactly
//! once, in insertion order, draining anything newly queued by the effects
//! themselves. An un-batched write behaves as an implicit batch of depth
//! one around the single write.
//!
//! There is no topological sort of effects: an effect that depends on a
//! stale computed resolves it lazily through its own read path, so by the
//! time an effect observes a value, every computed between it and the
//! written signals is up to date. That is what prevents "diamond" glitches
//! where a dependent sees a mix of old and new upstream values.
//!
//! # Failure semantics
//!
//! Each effect runs under its own panic boundary. A failing effect never
//! prevents its siblings from running; the error goes to the installed
//! hook, or, with no hook, the first error is re-raised after the queue
//! has drained.

use std::panic::panic_any;
use std::rc::Rc;

use tracing::{debug, warn};

use super::error::ReactiveError;
use super::runtime::{run_effect, Runtime};

/// Run `f`, coalescing every write inside it into a single flush.
///
/// Batches nest: only the outermost `batch` flushes. Every effect observes
/// all writes made inside the batch as one consistent snapshot, and N
/// writes to the sources of one effect produce exactly one run.
pub fn batch<T>(f: impl FnOnce() -> T) -> T {
    struct DepthGuard;

    impl Drop for DepthGuard {
        fn drop(&mut self) {
            Runtime::with(|rt| rt.batch_depth -= 1);
        }
    }

    Runtime::with(|rt| rt.batch_depth += 1);
    let result = {
        let _guard = DepthGuard;
        f()
    };

    let should_flush = Runtime::with(|rt| {
        rt.batch_depth == 0 && !rt.flushing && !rt.pending.is_empty()
    });
    if should_flush {
        flush();
    }
    result
}

/// Drain the pending-effect queue.
///
/// Runs until the queue is empty, including effects queued as a side
/// effect of running earlier ones. Re-entrant calls are no-ops; writes
/// made mid-flush land in the same drain.
pub(crate) fn flush() {
    let entered = Runtime::with(|rt| {
        if rt.flushing {
            false
        } else {
            rt.flushing = true;
            true
        }
    });
    if !entered {
        return;
    }

    // Cleared on unwind too, so a panicking hook cannot wedge the loop.
    struct FlushGuard;

    impl Drop for FlushGuard {
        fn drop(&mut self) {
            Runtime::with(|rt| rt.flushing = false);
        }
    }

    let _guard = FlushGuard;

    debug!("flush started");
    let mut deferred: Vec<ReactiveError> = Vec::new();

    loop {
        let next = Runtime::with(|rt| rt.pending.shift_remove_index(0));
        let Some(id) = next else {
            break;
        };

        if let Err(err) = run_effect(id) {
            let hook = Runtime::with(|rt| rt.error_hook.clone());
            match hook {
                Some(hook) => {
                    warn!(%err, "effect failed; routed to error hook");
                    hook(&err);
                }
                None => deferred.push(err),
            }
        }
    }

    debug!("flush finished");

    // Every effect was attempted; now surface the first failure.
    if let Some(err) = deferred.into_iter().next() {
        panic_any(err);
    }
}

/// Install a hook receiving effect errors.
///
/// With a hook installed, a failing effect is reported and the flush
/// continues silently; without one, the first failure is re-raised after
/// the flush drains.
pub fn set_error_hook(hook: impl Fn(&ReactiveError) + 'static) {
    Runtime::with(|rt| rt.error_hook = Some(Rc::new(hook)));
}

/// Remove the installed error hook, restoring the re-raise default.
pub fn clear_error_hook() {
    Runtime::with(|rt| rt.error_hook = None);
}
