//! Parallel branch-and-bound for maximum distance-2 packing.
//!
//! A distance-2 packing of a graph is a set of nodes in which no two nodes
//! are adjacent or share a neighbor. This crate finds a maximum one with an
//! exact best-first branch-and-bound search:
//!
//! - **Select-only branching**: every tree node adds one graph node after its
//!   parent's, so each tree node is itself a feasible packing
//! - **Bounds**: a combinatorial bound from the free nodes left, optionally
//!   tightened by an external LP relaxation oracle
//! - **Parallelism**: a bounded shared frontier, one dispatcher and a worker
//!   pool that runs tasks on the caller when all workers are busy
//!
//! # Example
//!
//! ```ignore
//! use packing_search::{solve_packing, PackingGraph, SearchSettings};
//!
//! // Path on five nodes
//! let graph = PackingGraph::from_edges(5, &[(0, 1), (1, 2), (2, 3), (3, 4)])?;
//! let solution = solve_packing(graph, SearchSettings::default())?;
//!
//! assert_eq!(solution.size, 2);
//! println!("Packing: {:?}", solution.packing);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod heuristic;
pub mod model;
pub mod oracle;
pub mod search;
pub mod settings;

use std::sync::Arc;

pub use error::{PackingError, PackingResult};
pub use heuristic::greedy_packing;
pub use model::{
    is_feasible_packing, selection_vector, GraphView, PackingGraph, PackingSolution, SearchStatus,
    StatsSnapshot,
};
pub use oracle::{BoundOracle, OracleConfig, OracleRegistry, SubprocessLpOracle, LP_SUBPROCESS};
pub use search::{SearchController, SearchPhase};
pub use settings::{BoundStrategy, OverflowPolicy, SearchSettings};

/// Main solve entry point.
///
/// Seeds the search with the greedy packing and runs it with combinatorial
/// bounds (or whatever `settings` select, as long as no oracle is needed).
pub fn solve_packing<G>(graph: G, settings: SearchSettings) -> PackingResult<PackingSolution>
where
    G: GraphView + 'static,
{
    let seed = greedy_packing(&graph);
    let graph: Arc<dyn GraphView> = Arc::new(graph);
    SearchController::new(graph, settings)?
        .with_seed(seed)?
        .run()
}
