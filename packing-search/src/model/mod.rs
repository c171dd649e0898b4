//! Graph and solution types for the packing search.

mod graph;
mod solution;

pub use graph::{is_feasible_packing, selection_vector, GraphView, PackingGraph};
pub use solution::{
    Incumbent, IncumbentState, PackingSolution, SearchStats, SearchStatus, StatsSnapshot,
};
