//! Packing solution types and shared search state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

/// Status of a finished search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchStatus {
    /// The whole tree was explored (or pruned): the packing is maximum.
    Optimal,

    /// Node budget exhausted, best packing found so far returned.
    NodeLimit,

    /// Frontier overflow discarded children, so parts of the tree were never
    /// explored. The packing is feasible but may not be maximum.
    Heuristic,
}

impl SearchStatus {
    /// Returns true if optimality was proven.
    pub fn is_optimal(&self) -> bool {
        matches!(self, SearchStatus::Optimal)
    }
}

/// Result of a packing search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackingSolution {
    /// Solve status.
    pub status: SearchStatus,

    /// Selected node indices, ascending.
    pub packing: Vec<usize>,

    /// 0/1 selection vector of length `num_nodes`.
    pub selection: Vec<u8>,

    /// Size of the packing.
    pub size: usize,

    /// Size of the warm-start packing (0 without seed).
    pub seed_size: usize,

    /// Upper bound on the packing size proven at the root.
    pub root_bound: usize,

    /// Search statistics.
    pub stats: StatsSnapshot,

    /// Total solve time in milliseconds.
    pub solve_time_ms: u64,
}

impl PackingSolution {
    /// True if the search improved on the warm start.
    pub fn improved_seed(&self) -> bool {
        self.size > self.seed_size
    }
}

/// Best known packing.
#[derive(Debug, Clone, Default)]
pub struct IncumbentState {
    /// Selected node indices, ascending.
    pub packing: Vec<usize>,

    /// Number of times the incumbent was improved by the search.
    pub update_count: u64,
}

impl IncumbentState {
    /// Objective value: the negated packing size (the search minimizes).
    pub fn value(&self) -> f64 {
        -(self.packing.len() as f64)
    }
}

/// Shared incumbent, guarded by a single lock.
///
/// Read by every fathoming check, written only on strict improvement.
#[derive(Debug, Default)]
pub struct Incumbent {
    state: Mutex<IncumbentState>,
}

impl Incumbent {
    /// Create an empty incumbent (the empty packing, value 0).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an incumbent seeded with a feasible packing.
    pub fn seeded(mut packing: Vec<usize>) -> Self {
        packing.sort_unstable();
        Self {
            state: Mutex::new(IncumbentState {
                packing,
                update_count: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, IncumbentState> {
        // A panicking worker never leaves the state half-written.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current objective value.
    pub fn value(&self) -> f64 {
        self.lock().value()
    }

    /// Current packing size.
    pub fn size(&self) -> usize {
        self.lock().packing.len()
    }

    /// Try to replace the incumbent with a larger packing.
    ///
    /// Returns true if the incumbent was improved.
    pub fn update(&self, packing: &[usize]) -> bool {
        let mut state = self.lock();
        if packing.len() > state.packing.len() {
            state.packing = packing.to_vec();
            state.packing.sort_unstable();
            state.update_count += 1;
            true
        } else {
            false
        }
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> IncumbentState {
        self.lock().clone()
    }
}

/// Search counters, updated concurrently by the workers.
#[derive(Debug, Default)]
pub struct SearchStats {
    /// Nodes created (including the root).
    pub nodes_created: AtomicU64,
    /// Nodes whose expansion step ran.
    pub nodes_expanded: AtomicU64,
    /// Nodes fathomed by bound.
    pub nodes_pruned: AtomicU64,
    /// Nodes cut because the node budget was exhausted.
    pub budget_cuts: AtomicU64,
    /// Nodes at the last graph index.
    pub leaves: AtomicU64,
    /// Incumbent improvements found by the search.
    pub incumbent_updates: AtomicU64,
    /// Batch pushes rejected by a full frontier.
    pub frontier_overflows: AtomicU64,
    /// Children dropped by `CutToSingleBest`.
    pub children_discarded: AtomicU64,
    /// Children expanded on the producing thread after an overflow.
    pub synchronous_expansions: AtomicU64,
    /// Largest frontier size observed.
    pub peak_frontier: AtomicU64,
    /// Successful LP oracle calls.
    pub lp_calls: AtomicU64,
    /// Failed LP oracle calls.
    pub lp_failures: AtomicU64,
    /// LP calls skipped because the oracle was busy.
    pub lp_busy: AtomicU64,
}

impl SearchStats {
    /// Create zeroed statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter by one.
    #[inline]
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an observed frontier size.
    #[inline]
    pub fn observe_frontier(&self, len: usize) {
        self.peak_frontier.fetch_max(len as u64, Ordering::Relaxed);
    }

    /// Plain copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            nodes_created: get(&self.nodes_created),
            nodes_expanded: get(&self.nodes_expanded),
            nodes_pruned: get(&self.nodes_pruned),
            budget_cuts: get(&self.budget_cuts),
            leaves: get(&self.leaves),
            incumbent_updates: get(&self.incumbent_updates),
            frontier_overflows: get(&self.frontier_overflows),
            children_discarded: get(&self.children_discarded),
            synchronous_expansions: get(&self.synchronous_expansions),
            peak_frontier: get(&self.peak_frontier),
            lp_calls: get(&self.lp_calls),
            lp_failures: get(&self.lp_failures),
            lp_busy: get(&self.lp_busy),
        }
    }
}

/// Statistics at the end of a search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Nodes created, root included.
    pub nodes_created: u64,
    /// Nodes taken up for expansion.
    pub nodes_expanded: u64,
    /// Nodes fathomed by bound.
    pub nodes_pruned: u64,
    /// Expansions or child batches cut by the node budget.
    pub budget_cuts: u64,
    /// Nodes with no undecided index left.
    pub leaves: u64,
    /// Improvements of the incumbent.
    pub incumbent_updates: u64,
    /// Child batches rejected by a full frontier.
    pub frontier_overflows: u64,
    /// Children dropped by `OverflowPolicy::CutToSingleBest`.
    pub children_discarded: u64,
    /// Children expanded on the producing thread after an overflow.
    pub synchronous_expansions: u64,
    /// Largest frontier size observed.
    pub peak_frontier: u64,
    /// Successful LP oracle calls.
    pub lp_calls: u64,
    /// Failed LP oracle calls.
    pub lp_failures: u64,
    /// LP calls skipped because the oracle was busy.
    pub lp_busy: u64,
}
