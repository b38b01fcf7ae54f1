//! Owner scopes and roots.
//!
//! Every signal, computed, and effect created while an owner scope is
//! active becomes a child of that scope, and a computation's body is
//! itself a child scope while it runs. Disposing a scope cascades
//! depth-first: child computations and scopes are torn down before the
//! scope's own cleanups run, and the scope is then marked disposed so late
//! writes into it are silently ignored.
//!
//! [`create_root`] establishes the outermost scope of a reactive region
//! and hands its closure the disposer; tearing the root down unsubscribes
//! every contained computation from every cell it read, however deep the
//! graph underneath.

use tracing::warn;

use super::node::OwnerId;
use super::runtime::{self, Runtime, ScopeStackGuard};

/// Disposer for a root scope created by [`create_root`].
///
/// Cheap to copy and safe to call more than once; only the first call
/// tears the scope down.
#[derive(Debug, Clone, Copy)]
pub struct RootDisposer {
    owner: OwnerId,
}

impl RootDisposer {
    /// Dispose the root and everything created underneath it.
    pub fn dispose(&self) {
        runtime::dispose_owner(self.owner);
    }
}

/// Establish a disposal scope and run `f` inside it.
///
/// Everything reactive created while `f` runs is parented to the new
/// scope. `f` receives the scope's [`RootDisposer`]; a typical caller
/// either calls it before returning or smuggles it out in the return
/// value for a later teardown. Roots nest: a root created inside another
/// root is disposed with the outer one.
pub fn create_root<T>(f: impl FnOnce(RootDisposer) -> T) -> T {
    let owner = Runtime::with(|rt| rt.create_scope(true));
    let _guard = ScopeStackGuard::push(owner);
    f(RootDisposer { owner })
}

/// Register a cleanup on the current owner scope.
///
/// Inside an effect or computed, the cleanup runs before the next re-run
/// of that computation and on disposal; inside a root, it runs when the
/// root is disposed. Cleanups run in LIFO order. Outside any scope the
/// closure is dropped with a warning.
pub fn on_cleanup(f: impl FnOnce() + 'static) {
    let registered = Runtime::with(|rt| rt.push_cleanup(Box::new(f)));
    if !registered {
        warn!("on_cleanup called outside an owner scope; cleanup dropped");
    }
}
