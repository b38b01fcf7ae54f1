//! Tracking context.
//!
//! The tracking context records which computation is currently running.
//! This enables automatic dependency discovery: when a cell or computed is
//! read, the engine records an edge from the current computation to the
//! source that was read.
//!
//! # Implementation
//!
//! A thread-local stack holds one frame per computation currently on the
//! call stack. Entering a computation pushes a frame; the frame collects
//! the sources read during the run, and the computation takes them back
//! when it completes. The stack supports nesting (a computed read from
//! inside an effect pushes a second frame) and untracked sections, which
//! push a frame that swallows reads instead of recording them.

use std::cell::RefCell;

use super::node::{NodeId, SourceId};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Frame>> = RefCell::new(Vec::new());
}

/// A frame on the tracking stack.
#[derive(Debug)]
enum Frame {
    /// A computation is running; reads are recorded as its sources.
    Tracking {
        node: NodeId,
        sources: Vec<SourceId>,
    },

    /// An `untrack` section; reads inside are not recorded.
    Untracked,
}

/// Static entry points for the thread-local tracking stack.
pub(crate) struct TrackingContext;

impl TrackingContext {
    /// Push a tracking frame for the given computation.
    ///
    /// The frame is popped when the returned guard is dropped, which keeps
    /// the stack balanced even if the computation panics.
    pub(crate) fn enter(node: NodeId) -> FrameGuard {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(Frame::Tracking {
                node,
                sources: Vec::new(),
            });
        });
        FrameGuard {
            node: Some(node),
        }
    }

    /// Push a frame that suppresses dependency recording.
    fn enter_untracked() -> FrameGuard {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(Frame::Untracked);
        });
        FrameGuard { node: None }
    }

    /// The computation currently being tracked, if any.
    ///
    /// Returns `None` when the stack is empty or the innermost frame is an
    /// untracked section.
    pub(crate) fn current() -> Option<NodeId> {
        CONTEXT_STACK.with(|stack| match stack.borrow().last() {
            Some(Frame::Tracking { node, .. }) => Some(*node),
            _ => None,
        })
    }

    /// Record a source read by the current computation.
    ///
    /// No-op when nothing is tracking.
    pub(crate) fn record(source: SourceId) {
        CONTEXT_STACK.with(|stack| {
            if let Some(Frame::Tracking { sources, .. }) = stack.borrow_mut().last_mut() {
                sources.push(source);
            }
        });
    }

    /// Take the sources recorded in the innermost tracking frame.
    ///
    /// Called by the computation after its closure returns (or panics),
    /// before the frame guard drops. The list may contain duplicates; the
    /// runtime dedups when it commits the source set.
    pub(crate) fn take_sources() -> Vec<SourceId> {
        CONTEXT_STACK.with(|stack| {
            match stack.borrow_mut().last_mut() {
                Some(Frame::Tracking { sources, .. }) => std::mem::take(sources),
                _ => Vec::new(),
            }
        })
    }
}

/// Guard that pops the tracking frame when dropped.
pub(crate) struct FrameGuard {
    node: Option<NodeId>,
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            if let Some(Frame::Tracking { node, .. }) = popped {
                debug_assert_eq!(
                    Some(node),
                    self.node,
                    "tracking frame mismatch: expected {:?}, got {:?}",
                    self.node,
                    node
                );
            }
        });
    }
}

/// Run `f` without tracking.
///
/// Reads inside `f` do not create dependency edges, even when called from
/// inside a computed or effect. Useful for peeking at a value without
/// subscribing to it.
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    let _guard = TrackingContext::enter_untracked();
    f()
}
