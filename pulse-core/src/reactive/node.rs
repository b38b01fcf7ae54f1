//! Node identity and state for the reactive graph.
//!
//! Every reactive primitive is addressed by a stable integer id: cells
//! (signals) get a [`CellId`], computations (computeds and effects) get a
//! [`NodeId`], and disposal scopes get an [`OwnerId`]. Dependency edges are
//! stored as ids on both sides of the edge, so tearing a primitive down is
//! an explicit removal from both directions rather than something left to
//! reference counting.

use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a signal cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellId(u64);

impl CellId {
    /// Generate a new unique cell ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for CellId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a computation node (computed or effect).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for an owner scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerId(u64);

impl OwnerId {
    /// Generate a new unique owner ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for OwnerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Something a computation can read, and therefore depend on.
///
/// A computation's source set holds these; the cell or node on the other
/// side of the edge holds the computation's [`NodeId`] in its subscriber
/// set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceId {
    /// A signal cell.
    Cell(CellId),
    /// Another computation (a computed read as an input).
    Node(NodeId),
}

/// The kind of computation node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Lazy, pull-based, memoized. Recomputes only when read.
    Computed,

    /// Eager, push-based. Scheduled by the flush loop when a source
    /// changes; never read for a value.
    Effect,
}

/// Lifecycle state of a computation node.
///
/// Transitions: `Clean --(source write)--> Stale --(run)--> Running
/// --(completion)--> Clean`. Any state moves to `Disposed` when the owning
/// scope is torn down; `Disposed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// The cached output matches the current sources.
    Clean,

    /// A source changed since the last completed run. The node must run
    /// again before its output can be trusted.
    Stale,

    /// The node is currently executing. Reading a `Running` node is a
    /// circular dependency.
    Running,

    /// The node was torn down with its owner. It never runs again.
    Disposed,
}
