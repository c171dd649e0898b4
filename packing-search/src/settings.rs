//! Configuration settings for the packing search.

use serde::{Deserialize, Serialize};

use crate::error::{PackingError, PackingResult};

/// What a worker does when its children do not fit in the frontier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Expand all children depth-first on the producing thread.
    ///
    /// Keeps the search exact.
    #[default]
    RunSynchronously,

    /// Keep only the best child and discard its siblings.
    ///
    /// Bounds memory at the price of optimality: the rest of the branch
    /// becomes a greedy dive.
    CutToSingleBest,
}

/// How node bounds are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundStrategy {
    /// Cost minus the number of undecided nodes still free to cover.
    #[default]
    Combinatorial,

    /// Consult the LP-relaxation oracle every few node creations,
    /// combinatorial bound otherwise.
    LpRelaxation,
}

/// Search settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    // === Termination criteria ===
    /// Maximum number of nodes to create (None = unlimited).
    pub max_nodes: Option<u64>,

    // === Frontier ===
    /// Capacity of the shared best-first frontier.
    pub max_frontier_size: usize,

    /// Policy applied when a batch of children does not fit.
    pub overflow_policy: OverflowPolicy,

    // === Bounding ===
    /// Bounding strategy.
    pub bound_strategy: BoundStrategy,

    /// Node creations along a branch between two LP oracle calls.
    pub steps_between_lp_calls: usize,

    /// Nodes shallower than this depth never consult the LP oracle.
    pub lp_tighten_from_level: usize,

    // === Parallelism ===
    /// Worker threads. Zero runs every expansion on the dispatcher thread.
    pub worker_threads: usize,

    // === Output ===
    /// Log progress information.
    pub verbose: bool,

    /// Log frequency (every N expanded nodes).
    pub log_freq: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        let worker_threads = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(4);

        Self {
            // Termination
            max_nodes: None,

            // Frontier
            max_frontier_size: 100_000,
            overflow_policy: OverflowPolicy::default(),

            // Bounding
            bound_strategy: BoundStrategy::default(),
            steps_between_lp_calls: 10,
            lp_tighten_from_level: 0,

            // Parallelism
            worker_threads,

            // Output
            verbose: false,
            log_freq: 10_000,
        }
    }
}

impl SearchSettings {
    /// Create settings with verbose output enabled.
    pub fn verbose() -> Self {
        Self {
            verbose: true,
            log_freq: 1_000,
            ..Self::default()
        }
    }

    /// Single-threaded, fully deterministic settings.
    pub fn serial() -> Self {
        Self {
            worker_threads: 0,
            ..Self::default()
        }
    }

    /// Set maximum nodes.
    pub fn with_max_nodes(mut self, nodes: u64) -> Self {
        self.max_nodes = Some(nodes);
        self
    }

    /// Set frontier capacity.
    pub fn with_frontier_size(mut self, size: usize) -> Self {
        self.max_frontier_size = size;
        self
    }

    /// Set overflow policy.
    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    /// Set the number of worker threads.
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Use the LP oracle every `steps` node creations, from depth `from_level` on.
    pub fn with_lp_bound(mut self, steps: usize, from_level: usize) -> Self {
        self.bound_strategy = BoundStrategy::LpRelaxation;
        self.steps_between_lp_calls = steps;
        self.lp_tighten_from_level = from_level;
        self
    }

    /// Check the settings for consistency.
    pub fn validate(&self) -> PackingResult<()> {
        if self.max_frontier_size == 0 {
            return Err(PackingError::InvalidSettings(
                "max_frontier_size must be at least 1".into(),
            ));
        }
        if self.steps_between_lp_calls == 0 {
            return Err(PackingError::InvalidSettings(
                "steps_between_lp_calls must be at least 1".into(),
            ));
        }
        if self.log_freq == 0 {
            return Err(PackingError::InvalidSettings(
                "log_freq must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// True once `created` nodes exceed the node budget.
    pub fn budget_exceeded(&self, created: u64) -> bool {
        self.max_nodes.is_some_and(|max| created > max)
    }
}
