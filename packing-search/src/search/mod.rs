//! Parallel branch-and-bound search.
//!
//! A single dispatcher pops the best node from the [`Frontier`] and hands it
//! to the [`WorkerPool`]. Workers expand nodes, publish children back to the
//! frontier, and report completion up the tree; the run ends when the root
//! finishes.

mod frontier;
mod node;
mod pool;
mod tree;

pub use frontier::{best_first, Frontier};
pub use node::{Ancestors, SearchNode};
pub use pool::{Dispatcher, ExpandFn, Task, WorkerPool};
pub use tree::{SearchContext, SearchController, SearchPhase};
