//! Bounded best-first frontier shared by the dispatcher and the workers.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use super::SearchNode;

/// Best-first order: lower bound, then lower degree heuristic, then lower id.
///
/// Returns `Ordering::Less` if `a` should be expanded before `b`.
pub fn best_first(a: &SearchNode, b: &SearchNode) -> Ordering {
    a.bound
        .total_cmp(&b.bound)
        .then_with(|| a.degree_heuristic().total_cmp(&b.degree_heuristic()))
        .then_with(|| a.id.cmp(&b.id))
}

/// Entry in the frontier heap.
struct QueuedNode(Arc<SearchNode>);

impl PartialEq for QueuedNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedNode {}

impl PartialOrd for QueuedNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: the best node must compare greatest
        best_first(&other.0, &self.0)
    }
}

struct FrontierState {
    heap: BinaryHeap<QueuedNode>,
    finished: bool,
    nodes_added: u64,
    nodes_popped: u64,
    rejected: u64,
    peak: usize,
}

/// Thread-safe, capacity-bounded priority queue of ready nodes.
///
/// The frontier never holds more than `capacity` nodes. Pushes that would
/// exceed it are rejected and the producer applies the overflow policy.
pub struct Frontier {
    state: Mutex<FrontierState>,
    available: Condvar,
    finished: Condvar,
    capacity: usize,
}

impl Frontier {
    /// Create an empty frontier holding at most `capacity` nodes.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(FrontierState {
                heap: BinaryHeap::new(),
                finished: false,
                nodes_added: 0,
                nodes_popped: 0,
                rejected: 0,
                peak: 0,
            }),
            available: Condvar::new(),
            finished: Condvar::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, FrontierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Maximum number of queued nodes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Add a node. Returns false if the frontier is full.
    pub fn try_push(&self, node: &Arc<SearchNode>) -> bool {
        self.try_push_all(std::slice::from_ref(node))
    }

    /// Add all nodes or none of them.
    ///
    /// Returns false if they do not all fit; the caller keeps ownership of
    /// the rejected batch either way.
    pub fn try_push_all(&self, nodes: &[Arc<SearchNode>]) -> bool {
        if nodes.is_empty() {
            return true;
        }

        let count = nodes.len();
        {
            let mut state = self.lock();
            if state.heap.len() + count > self.capacity {
                state.rejected += 1;
                return false;
            }
            state.heap.extend(nodes.iter().cloned().map(QueuedNode));
            state.nodes_added += count as u64;
            state.peak = state.peak.max(state.heap.len());
        }

        if count == 1 {
            self.available.notify_one();
        } else {
            self.available.notify_all();
        }
        true
    }

    /// Take the best node, blocking while the frontier is empty.
    ///
    /// Returns None once the frontier has been marked finished.
    pub fn blocking_pop(&self) -> Option<Arc<SearchNode>> {
        let mut state = self.lock();
        loop {
            if state.finished {
                return None;
            }
            if let Some(QueuedNode(node)) = state.heap.pop() {
                state.nodes_popped += 1;
                return Some(node);
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Stop the search: wakes every blocked popper permanently.
    pub fn mark_finished(&self) {
        self.lock().finished = true;
        self.available.notify_all();
        self.finished.notify_all();
    }

    /// Returns true once `mark_finished` was called.
    pub fn is_finished(&self) -> bool {
        self.lock().finished
    }

    /// Block until `mark_finished` is called.
    pub fn wait_until_finished(&self) {
        let mut state = self.lock();
        while !state.finished {
            state = self
                .finished
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Number of queued nodes.
    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    /// Check if the frontier is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().heap.is_empty()
    }

    /// Lowest bound among queued nodes (infinity if empty).
    pub fn best_bound(&self) -> f64 {
        self.lock()
            .heap
            .peek()
            .map_or(f64::INFINITY, |q| q.0.bound)
    }

    /// Largest number of nodes held at once.
    pub fn peak(&self) -> usize {
        self.lock().peak
    }

    /// Total nodes added.
    pub fn total_added(&self) -> u64 {
        self.lock().nodes_added
    }

    /// Total nodes popped.
    pub fn total_popped(&self) -> u64 {
        self.lock().nodes_popped
    }

    /// Number of rejected pushes.
    pub fn total_rejected(&self) -> u64 {
        self.lock().rejected
    }
}
