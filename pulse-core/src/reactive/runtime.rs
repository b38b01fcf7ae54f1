//! Reactive runtime.
//!
//! The runtime is the central coordinator that connects signals, computeds,
//! effects, and owner scopes. It owns an arena of slots addressed by the id
//! types in [`node`](super::node) and keeps the dependency graph as id
//! edges stored on both sides: a computation's source set and, mirrored, a
//! subscriber set on each cell or computed it read.
//!
//! # How It Works
//!
//! 1. Creating a primitive inserts a slot into the arena and registers it
//!    as a child of the active owner scope.
//!
//! 2. When a computation runs, reads record edges through the tracking
//!    context; the runtime commits the collected source set when the run
//!    completes and prunes the edges of the previous run beforehand.
//!
//! 3. When a cell's value changes, the runtime walks its transitive
//!    dependents once, marks them stale, and queues dirty effects with the
//!    scheduler. Computeds are lazy and recompute on next read.
//!
//! # Thread Model
//!
//! The engine is single-threaded and run-to-completion: all state lives in
//! a thread-local and there is no locking. Re-entrancy is guarded by the
//! `Running` state check, which doubles as cycle detection. User closures
//! never run while the runtime is borrowed.

use std::any::Any;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use indexmap::IndexSet;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use super::context::TrackingContext;
use super::error::ReactiveError;
use super::node::{CellId, NodeId, NodeKind, NodeState, OwnerId, SourceId};

/// Boxed computation body for a computed node. Output is type-erased; the
/// typed handle downcasts on read.
pub(crate) type ComputeFn = Rc<dyn Fn() -> Rc<dyn Any>>;

/// Boxed computation body for an effect node.
pub(crate) type EffectFn = Rc<RefCell<dyn FnMut()>>;

/// Cleanup callback registered on an owner scope.
pub(crate) type CleanupFn = Box<dyn FnOnce()>;

/// The body of a computation node.
pub(crate) enum NodeFn {
    Computed(ComputeFn),
    Effect(EffectFn),
}

/// Arena slot for a signal cell.
pub(crate) struct CellSlot {
    /// Current value, type-erased.
    pub(crate) value: Rc<dyn Any>,

    /// Bumped on every accepted write.
    pub(crate) version: u64,

    /// Computations that read this cell during their last run.
    pub(crate) subscribers: HashSet<NodeId>,

    /// Set when the owning scope was disposed. Late writes are ignored.
    pub(crate) disposed: bool,
}

/// Arena slot for a computation node (computed or effect).
pub(crate) struct NodeSlot {
    pub(crate) kind: NodeKind,
    pub(crate) state: NodeState,

    /// Set when a source write lands while the node is `Running`. The
    /// in-flight run then commits to `Stale` instead of `Clean`, so the
    /// write is not shadowed by the stale cache.
    pub(crate) dirtied_mid_run: bool,

    /// Exactly the sources read during the last completed run.
    pub(crate) sources: HashSet<SourceId>,

    /// Computations that read this node (computeds only in practice).
    pub(crate) subscribers: HashSet<NodeId>,

    /// Cached output of the last successful run (computeds only).
    pub(crate) cached: Option<Rc<dyn Any>>,

    /// Cached failure of the last run, re-surfaced on every read until a
    /// source changes (computeds only).
    pub(crate) cached_error: Option<ReactiveError>,

    /// The computation body.
    pub(crate) run: NodeFn,

    /// Scope that parents everything created inside the body. Reset before
    /// each re-run, disposed with the node.
    pub(crate) scope: OwnerId,
}

/// A child registered under an owner scope, torn down with it.
pub(crate) enum ScopeChild {
    Scope(OwnerId),
    Node(NodeId),
    Cell(CellId),
}

/// Arena slot for an owner scope.
///
/// Disposal removes the slot from the arena, so a missing slot is the
/// disposed state.
pub(crate) struct OwnerSlot {
    pub(crate) parent: Option<OwnerId>,
    pub(crate) children: SmallVec<[ScopeChild; 4]>,
    pub(crate) cleanups: SmallVec<[CleanupFn; 2]>,
}

/// Outcome of a completed computation run, handed back to the runtime.
pub(crate) enum RunOutcome {
    /// A computed produced a value.
    Value(Rc<dyn Any>),

    /// The body panicked; the recovered error is cached for computeds.
    Error(ReactiveError),

    /// An effect completed normally.
    Unit,
}

thread_local! {
    static RUNTIME: RefCell<Runtime> = RefCell::new(Runtime::new());
}

/// The thread-local reactive runtime.
pub(crate) struct Runtime {
    pub(crate) cells: HashMap<CellId, CellSlot>,
    pub(crate) nodes: HashMap<NodeId, NodeSlot>,
    pub(crate) owners: HashMap<OwnerId, OwnerSlot>,

    /// Stack of active owner scopes; the top adopts new primitives.
    pub(crate) owner_stack: Vec<OwnerId>,

    /// Nesting depth of explicit `batch` calls. Writes flush only when
    /// this returns to zero.
    pub(crate) batch_depth: u32,

    /// True while the scheduler is draining pending effects.
    pub(crate) flushing: bool,

    /// Dirty effects awaiting the next flush. Insertion-ordered and
    /// deduplicated.
    pub(crate) pending: IndexSet<NodeId>,

    /// Optional hook receiving effect errors instead of a post-flush
    /// re-raise.
    pub(crate) error_hook: Option<Rc<dyn Fn(&ReactiveError)>>,
}

impl Runtime {
    fn new() -> Self {
        Self {
            cells: HashMap::new(),
            nodes: HashMap::new(),
            owners: HashMap::new(),
            owner_stack: Vec::new(),
            batch_depth: 0,
            flushing: false,
            pending: IndexSet::new(),
            error_hook: None,
        }
    }

    /// Borrow the thread-local runtime for the duration of `f`.
    ///
    /// `f` must not run user code: a closure that re-enters the engine
    /// would double-borrow. Every operation that runs user code takes
    /// several short borrows around it instead.
    pub(crate) fn with<T>(f: impl FnOnce(&mut Runtime) -> T) -> T {
        RUNTIME.with(|rt| f(&mut rt.borrow_mut()))
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Register the child with the active owner scope, if any.
    fn adopt(&mut self, child: ScopeChild) {
        if let Some(&owner) = self.owner_stack.last() {
            if let Some(slot) = self.owners.get_mut(&owner) {
                slot.children.push(child);
            }
        }
    }

    /// Insert a new cell holding `value`.
    pub(crate) fn register_cell(&mut self, value: Rc<dyn Any>) -> CellId {
        let id = CellId::new();
        self.cells.insert(
            id,
            CellSlot {
                value,
                version: 0,
                subscribers: HashSet::new(),
                disposed: false,
            },
        );
        self.adopt(ScopeChild::Cell(id));
        trace!(?id, "cell registered");
        id
    }

    /// Insert a new computation node. The node starts `Stale` and owns a
    /// fresh scope for everything created inside its body.
    pub(crate) fn register_node(&mut self, kind: NodeKind, run: NodeFn) -> NodeId {
        let scope = self.create_scope(false);
        let id = NodeId::new();
        self.nodes.insert(
            id,
            NodeSlot {
                kind,
                state: NodeState::Stale,
                dirtied_mid_run: false,
                sources: HashSet::new(),
                subscribers: HashSet::new(),
                cached: None,
                cached_error: None,
                run,
                scope,
            },
        );
        self.adopt(ScopeChild::Node(id));
        trace!(?id, ?kind, "node registered");
        id
    }

    /// Insert a new owner scope parented to the active owner.
    ///
    /// Roots are adopted as children of the enclosing scope so nested
    /// roots are torn down with it; computation scopes are not, because
    /// the node itself is the adopted child and disposes its scope.
    pub(crate) fn create_scope(&mut self, adopt: bool) -> OwnerId {
        let id = OwnerId::new();
        let parent = self.owner_stack.last().copied();
        self.owners.insert(
            id,
            OwnerSlot {
                parent,
                children: SmallVec::new(),
                cleanups: SmallVec::new(),
            },
        );
        if adopt {
            self.adopt(ScopeChild::Scope(id));
        }
        id
    }

    /// Register a cleanup on the active owner scope.
    ///
    /// Returns false (dropping the closure) when no scope is active.
    pub(crate) fn push_cleanup(&mut self, cleanup: CleanupFn) -> bool {
        let Some(&owner) = self.owner_stack.last() else {
            return false;
        };
        match self.owners.get_mut(&owner) {
            Some(slot) => {
                slot.cleanups.push(cleanup);
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Reads and writes
    // ------------------------------------------------------------------

    /// Read a cell, recording a dependency edge if a computation is
    /// currently tracking.
    pub(crate) fn read_cell(&mut self, id: CellId) -> Option<Rc<dyn Any>> {
        if let Some(reader) = TrackingContext::current() {
            if let Some(cell) = self.cells.get_mut(&id) {
                if !cell.disposed {
                    TrackingContext::record(SourceId::Cell(id));
                    cell.subscribers.insert(reader);
                }
            }
        }
        self.cells.get(&id).map(|cell| Rc::clone(&cell.value))
    }

    /// Read a cell without recording a dependency.
    pub(crate) fn read_cell_untracked(&self, id: CellId) -> Option<Rc<dyn Any>> {
        self.cells.get(&id).map(|cell| Rc::clone(&cell.value))
    }

    /// Write a cell, returning true when the value actually changed.
    ///
    /// Equal writes are no-ops: no version bump, no dirtying, no
    /// scheduling. Writes to disposed cells are silently ignored.
    pub(crate) fn write_cell<T: PartialEq + 'static>(&mut self, id: CellId, next: T) -> bool {
        let Some(cell) = self.cells.get_mut(&id) else {
            return false;
        };
        if cell.disposed {
            warn!(?id, "write to disposed cell ignored");
            return false;
        }
        if let Some(current) = cell.value.downcast_ref::<T>() {
            if *current == next {
                return false;
            }
        }
        cell.value = Rc::new(next);
        cell.version = cell.version.wrapping_add(1);
        trace!(?id, version = cell.version, "cell written");
        self.mark_cell_dirty(id);
        true
    }

    /// Record an edge from the tracking computation to a computed node.
    pub(crate) fn track_node_read(&mut self, id: NodeId) {
        if let Some(reader) = TrackingContext::current() {
            if reader == id {
                return;
            }
            TrackingContext::record(SourceId::Node(id));
            if let Some(node) = self.nodes.get_mut(&id) {
                node.subscribers.insert(reader);
            }
        }
    }

    // ------------------------------------------------------------------
    // Invalidation
    // ------------------------------------------------------------------

    /// Mark every transitive dependent of the cell stale and queue dirty
    /// effects. One BFS walk; already-stale branches are not re-entered.
    fn mark_cell_dirty(&mut self, id: CellId) {
        let seeds: Vec<NodeId> = match self.cells.get(&id) {
            Some(cell) => cell.subscribers.iter().copied().collect(),
            None => return,
        };
        self.mark_stale(seeds);
    }

    /// Propagate staleness from the given nodes to their transitive
    /// dependents. Idempotent: stale nodes stop the walk since their own
    /// dependents were marked when they became stale.
    pub(crate) fn mark_stale(&mut self, seeds: Vec<NodeId>) {
        let mut queue: VecDeque<NodeId> = seeds.into();
        let mut visited: HashSet<NodeId> = HashSet::new();

        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }

            let mut queue_effect = false;
            let mut propagate: Option<Vec<NodeId>> = None;

            if let Some(node) = self.nodes.get_mut(&id) {
                match node.state {
                    NodeState::Disposed => {}
                    NodeState::Stale => {
                        queue_effect = node.kind == NodeKind::Effect;
                    }
                    NodeState::Clean | NodeState::Running => {
                        if node.state == NodeState::Clean {
                            node.state = NodeState::Stale;
                        } else {
                            // A write during the node's own run. The run
                            // commits stale so the write wins.
                            node.dirtied_mid_run = true;
                        }
                        queue_effect = node.kind == NodeKind::Effect;
                        propagate = Some(node.subscribers.iter().copied().collect());
                    }
                }
            }

            if queue_effect {
                if self.pending.insert(id) {
                    trace!(?id, "effect queued");
                }
            }
            if let Some(subscribers) = propagate {
                queue.extend(subscribers);
            }
        }
    }

    // ------------------------------------------------------------------
    // Edge bookkeeping
    // ------------------------------------------------------------------

    /// Drop the node's source set and remove the node from every source's
    /// subscriber set. Called before each re-run so stale edges from the
    /// previous run are pruned.
    pub(crate) fn clear_sources(&mut self, id: NodeId) {
        let sources = match self.nodes.get_mut(&id) {
            Some(node) => std::mem::take(&mut node.sources),
            None => return,
        };
        for source in sources {
            self.remove_back_edge(source, id);
        }
    }

    fn remove_back_edge(&mut self, source: SourceId, subscriber: NodeId) {
        match source {
            SourceId::Cell(cell) => {
                if let Some(slot) = self.cells.get_mut(&cell) {
                    slot.subscribers.remove(&subscriber);
                }
            }
            SourceId::Node(node) => {
                if let Some(slot) = self.nodes.get_mut(&node) {
                    slot.subscribers.remove(&subscriber);
                }
            }
        }
    }

    /// Commit a completed run: store the freshly discovered source set and
    /// the outcome, and return the node to `Clean`. A node whose body
    /// wrote one of its own sources commits to `Stale` instead, so the
    /// write is honored by the next read.
    ///
    /// If the node was disposed while its body ran, its slot is gone; the
    /// outcome is discarded and the edges recorded during the run are
    /// unwound.
    pub(crate) fn finish_run(&mut self, id: NodeId, sources: Vec<SourceId>, outcome: RunOutcome) {
        let Some(node) = self.nodes.get_mut(&id) else {
            for source in sources {
                self.remove_back_edge(source, id);
            }
            return;
        };
        node.sources = sources.into_iter().collect();
        match outcome {
            RunOutcome::Value(value) => {
                node.cached = Some(value);
                node.cached_error = None;
            }
            RunOutcome::Error(err) => {
                node.cached = None;
                node.cached_error = Some(err);
            }
            RunOutcome::Unit => {}
        }
        node.state = if std::mem::take(&mut node.dirtied_mid_run) {
            NodeState::Stale
        } else {
            NodeState::Clean
        };
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    pub(crate) fn cell_version(&self, id: CellId) -> u64 {
        self.cells.get(&id).map(|cell| cell.version).unwrap_or(0)
    }

    pub(crate) fn cell_subscriber_count(&self, id: CellId) -> usize {
        self.cells
            .get(&id)
            .map(|cell| cell.subscribers.len())
            .unwrap_or(0)
    }

    pub(crate) fn node_state(&self, id: NodeId) -> NodeState {
        self.nodes
            .get(&id)
            .map(|node| node.state)
            .unwrap_or(NodeState::Disposed)
    }

    pub(crate) fn owner_parent(&self, id: OwnerId) -> Option<OwnerId> {
        self.owners.get(&id).and_then(|owner| owner.parent)
    }
}

/// Guard that keeps an owner scope on the stack for the duration of a
/// computation body or root closure.
pub(crate) struct ScopeStackGuard {
    owner: OwnerId,
}

impl ScopeStackGuard {
    pub(crate) fn push(owner: OwnerId) -> Self {
        Runtime::with(|rt| rt.owner_stack.push(owner));
        Self { owner }
    }
}

impl Drop for ScopeStackGuard {
    fn drop(&mut self) {
        Runtime::with(|rt| {
            let popped = rt.owner_stack.pop();
            debug_assert_eq!(
                popped,
                Some(self.owner),
                "owner stack mismatch on scope exit"
            );
        });
    }
}

// ----------------------------------------------------------------------
// Run orchestration
//
// These run user closures, so they live outside `Runtime::with` and take
// several short borrows around the closure call.
// ----------------------------------------------------------------------

/// Bring a computed up to date and return its output.
///
/// Clean nodes return their cache (or cached error) in O(1). Stale nodes
/// re-run their body under tracking, rebuilding the source set from
/// scratch. Reading a node that is currently `Running` is a circular
/// dependency and fails immediately instead of recursing.
pub(crate) fn update_computed(id: NodeId) -> Result<Rc<dyn Any>, ReactiveError> {
    enum Plan {
        Ready(Result<Rc<dyn Any>, ReactiveError>),
        Run(ComputeFn, OwnerId),
    }

    let plan = Runtime::with(|rt| {
        rt.track_node_read(id);

        let Some(node) = rt.nodes.get(&id) else {
            return Plan::Ready(Err(ReactiveError::DisposedAccess));
        };
        match node.state {
            NodeState::Disposed => Plan::Ready(Err(ReactiveError::DisposedAccess)),
            NodeState::Running => Plan::Ready(Err(ReactiveError::CircularDependency)),
            NodeState::Clean | NodeState::Stale => {
                if node.state == NodeState::Clean {
                    if let Some(err) = &node.cached_error {
                        return Plan::Ready(Err(err.clone()));
                    }
                    if let Some(value) = &node.cached {
                        return Plan::Ready(Ok(Rc::clone(value)));
                    }
                }
                let NodeFn::Computed(f) = &node.run else {
                    return Plan::Ready(Err(ReactiveError::Computation {
                        message: "node is not a computed".to_string(),
                    }));
                };
                Plan::Run(Rc::clone(f), node.scope)
            }
        }
    });

    let (f, scope) = match plan {
        Plan::Ready(result) => return result,
        Plan::Run(f, scope) => (f, scope),
    };

    begin_run(id, scope);

    let scope_guard = ScopeStackGuard::push(scope);
    let frame = TrackingContext::enter(id);
    let outcome = catch_unwind(AssertUnwindSafe(|| f()));
    let sources = TrackingContext::take_sources();
    drop(frame);
    drop(scope_guard);

    match outcome {
        Ok(value) => {
            Runtime::with(|rt| {
                rt.finish_run(id, sources, RunOutcome::Value(Rc::clone(&value)));
            });
            Ok(value)
        }
        Err(payload) => {
            let err = ReactiveError::from_panic(payload);
            Runtime::with(|rt| {
                rt.finish_run(id, sources, RunOutcome::Error(err.clone()));
            });
            Err(err)
        }
    }
}

/// Run an effect body once.
///
/// Tears down the previous run first: nested computations and cleanups
/// registered in the effect's scope go in LIFO order, then the old source
/// edges are pruned. Disposed effects are skipped. A panicking body is
/// caught and handed back to the caller for the error funnel.
pub(crate) fn run_effect(id: NodeId) -> Result<(), ReactiveError> {
    let plan = Runtime::with(|rt| {
        let node = rt.nodes.get(&id)?;
        let NodeFn::Effect(f) = &node.run else {
            return None;
        };
        Some((Rc::clone(f), node.scope))
    });
    let Some((f, scope)) = plan else {
        return Ok(());
    };

    begin_run(id, scope);

    let scope_guard = ScopeStackGuard::push(scope);
    let frame = TrackingContext::enter(id);
    let outcome = catch_unwind(AssertUnwindSafe(|| (f.borrow_mut())()));
    let sources = TrackingContext::take_sources();
    drop(frame);
    drop(scope_guard);

    match outcome {
        Ok(()) => {
            Runtime::with(|rt| rt.finish_run(id, sources, RunOutcome::Unit));
            Ok(())
        }
        Err(payload) => {
            let err = ReactiveError::from_panic(payload);
            Runtime::with(|rt| {
                rt.finish_run(id, sources, RunOutcome::Error(err.clone()));
            });
            Err(err)
        }
    }
}

/// Prepare a node for a fresh run: tear down what the previous run
/// created, prune the old source edges, and move to `Running`.
fn begin_run(id: NodeId, scope: OwnerId) {
    reset_scope(scope);
    Runtime::with(|rt| {
        rt.clear_sources(id);
        if let Some(node) = rt.nodes.get_mut(&id) {
            node.state = NodeState::Running;
            node.cached_error = None;
        }
    });
}

/// Tear down everything created under the scope during its last run,
/// keeping the scope itself alive for the next one. Children go first
/// (depth-first), then the scope's own cleanups in LIFO order.
pub(crate) fn reset_scope(id: OwnerId) {
    let taken = Runtime::with(|rt| {
        let slot = rt.owners.get_mut(&id)?;
        Some((
            std::mem::take(&mut slot.children),
            std::mem::take(&mut slot.cleanups),
        ))
    });
    let Some((children, cleanups)) = taken else {
        return;
    };
    dispose_children(children, cleanups);
}

/// Dispose an owner scope and everything beneath it.
///
/// Depth-first: child scopes and computations are torn down before the
/// owner's own cleanups run. The slot is removed from the arena up front,
/// which makes re-entrant disposal (from a cleanup) a no-op and releases
/// everything the scope retained.
pub(crate) fn dispose_owner(id: OwnerId) {
    let Some(slot) = Runtime::with(|rt| rt.owners.remove(&id)) else {
        return;
    };
    debug!(?id, "owner disposed");
    dispose_children(slot.children, slot.cleanups);
}

fn dispose_children(children: SmallVec<[ScopeChild; 4]>, cleanups: SmallVec<[CleanupFn; 2]>) {
    for child in children {
        match child {
            ScopeChild::Scope(scope) => dispose_owner(scope),
            ScopeChild::Node(node) => dispose_node(node),
            ScopeChild::Cell(cell) => Runtime::with(|rt| {
                if let Some(slot) = rt.cells.get_mut(&cell) {
                    slot.disposed = true;
                    slot.subscribers.clear();
                }
            }),
        }
    }
    for cleanup in cleanups.into_iter().rev() {
        cleanup();
    }
}

/// Dispose a computation node: remove its slot from the arena (body,
/// caches, and captured environment included), unlink it from every
/// source, remove it from the pending queue, and tear down its scope.
/// Late reads observe the missing slot as `DisposedAccess`.
pub(crate) fn dispose_node(id: NodeId) {
    let taken = Runtime::with(|rt| {
        let node = rt.nodes.remove(&id)?;
        rt.pending.shift_remove(&id);
        Some(node)
    });
    let Some(node) = taken else {
        return;
    };
    Runtime::with(|rt| {
        for &source in &node.sources {
            rt.remove_back_edge(source, id);
        }
    });
    dispose_owner(node.scope);
    trace!(?id, "node disposed");
}
