//! Deadlock detection over the lock table
//!
//! The coordinator builds a waits-for graph from the lock table's current
//! shape and searches it for a cycle. It only reports a victim; aborting the
//! victim (which releases its locks and unblocks the others) is the caller's
//! job, after which the next call addresses any remaining cycle.
//!
//! ## Graph
//!
//! For every key, each holder `h` gets an edge `h -> w` to every distinct
//! waiter `w` queued on that key (self-edges excluded: a holder queued for
//! its own upgrade does not wait on itself).
//!
//! ## Determinism
//!
//! Vertices and successor sets are ordered by `TxnId`, the search starts at
//! the smallest vertex, and the victim is the youngest (largest id) member of
//! the first cycle found. The answer is a pure function of the graph.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info};

use stratalock_core::TxnId;

use crate::lock_table::{LockEntry, LockTable};

static NO_SUCCESSORS: BTreeSet<TxnId> = BTreeSet::new();

/// Directed graph of wait dependencies, holder -> waiter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaitsForGraph {
    edges: BTreeMap<TxnId, BTreeSet<TxnId>>,
}

impl WaitsForGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph from lock entries
    pub fn from_entries<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = &'a LockEntry>,
    {
        let mut graph = Self::new();
        for entry in entries {
            for holder in entry.granted() {
                graph.add_vertex(holder.txn);
                for waiter in entry.queue() {
                    if waiter.txn != holder.txn {
                        graph.add_edge(holder.txn, waiter.txn);
                    }
                }
            }
        }
        graph
    }

    /// Add a vertex with no edges (no-op if present)
    pub fn add_vertex(&mut self, txn: TxnId) {
        self.edges.entry(txn).or_default();
    }

    /// Add the edge `from -> to`, creating both vertices
    pub fn add_edge(&mut self, from: TxnId, to: TxnId) {
        self.edges.entry(from).or_default().insert(to);
        self.add_vertex(to);
    }

    /// All vertices in ascending order
    pub fn vertices(&self) -> impl Iterator<Item = TxnId> + '_ {
        self.edges.keys().copied()
    }

    /// Transactions waiting on `txn`, in ascending order
    pub fn successors(&self, txn: TxnId) -> impl Iterator<Item = TxnId> + '_ {
        self.successor_set(txn).iter().copied()
    }

    /// Check if the edge `from -> to` exists
    pub fn has_edge(&self, from: TxnId, to: TxnId) -> bool {
        self.successor_set(from).contains(&to)
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> usize {
        self.edges.len()
    }

    /// Number of edges
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    /// Check if the graph has no vertices
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    fn successor_set(&self, txn: TxnId) -> &BTreeSet<TxnId> {
        self.edges.get(&txn).unwrap_or(&NO_SUCCESSORS)
    }

    /// Find a cycle, returned in traversal order starting at the vertex the
    /// back edge points to
    ///
    /// Depth-first search from each unexplored vertex in ascending order,
    /// tracking the current path; an edge back onto the path closes a cycle.
    /// Returns `None` only if the whole graph is acyclic.
    pub fn find_cycle(&self) -> Option<Vec<TxnId>> {
        let mut finished: BTreeSet<TxnId> = BTreeSet::new();

        for start in self.vertices() {
            if finished.contains(&start) {
                continue;
            }

            let mut path = vec![start];
            let mut on_path = BTreeSet::from([start]);
            let mut pending = vec![self.successor_set(start).iter()];

            while let Some(successors) = pending.last_mut() {
                match successors.next().copied() {
                    Some(next) if on_path.contains(&next) => {
                        let from = path.iter().position(|&v| v == next).unwrap_or(0);
                        return Some(path.split_off(from));
                    }
                    Some(next) => {
                        if !finished.contains(&next) {
                            path.push(next);
                            on_path.insert(next);
                            pending.push(self.successor_set(next).iter());
                        }
                    }
                    None => {
                        pending.pop();
                        if let Some(done) = path.pop() {
                            on_path.remove(&done);
                            finished.insert(done);
                        }
                    }
                }
            }
        }
        None
    }
}

/// Periodic deadlock detector over a shared lock table
#[derive(Debug, Clone)]
pub struct TransactionCoordinator {
    table: Arc<LockTable>,
}

impl TransactionCoordinator {
    /// Create a coordinator watching `table`
    pub fn new(table: Arc<LockTable>) -> Self {
        Self { table }
    }

    /// The watched lock table
    pub fn lock_table(&self) -> &Arc<LockTable> {
        &self.table
    }

    /// Build the waits-for graph from the table's current shape
    pub fn waits_for_graph(&self) -> WaitsForGraph {
        self.table
            .inspect(|entries| WaitsForGraph::from_entries(entries.values()))
    }

    /// Members of a deadlock cycle, if one exists
    pub fn find_cycle(&self) -> Option<Vec<TxnId>> {
        let graph = self.waits_for_graph();
        debug!(
            vertices = graph.vertex_count(),
            edges = graph.edge_count(),
            "waits-for graph built"
        );
        graph.find_cycle()
    }

    /// The transaction to abort to break a deadlock, or `None`
    ///
    /// The victim is the youngest (largest id) member of the cycle found.
    /// The coordinator does not abort it.
    pub fn detect_deadlocks(&self) -> Option<TxnId> {
        let cycle = self.find_cycle()?;
        let victim = cycle.iter().copied().max()?;
        info!(victim = %victim, cycle = ?cycle, "deadlock detected");
        Some(victim)
    }
}
