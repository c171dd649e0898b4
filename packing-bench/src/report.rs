//! JSON run reports.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{Context, Result};
use packing_search::{PackingSolution, SearchSettings};
use serde::{Deserialize, Serialize};

/// Everything needed to reproduce and assess one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Graph file or generator description
    pub instance: String,
    /// Number of graph nodes
    pub num_nodes: usize,
    /// Number of graph edges
    pub num_edges: usize,
    /// Number of conflicting (distance <= 2) node pairs
    pub num_conflicts: usize,
    /// Settings the search ran with
    pub settings: SearchSettings,
    /// Registry key of the bound oracle, if any
    pub oracle: Option<String>,
    /// Search result
    pub solution: PackingSolution,
}

impl RunReport {
    /// Save to JSON file
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create file {}", path.as_ref().display()))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)
            .with_context(|| format!("Failed to write JSON to {}", path.as_ref().display()))?;
        Ok(())
    }

    /// Load from JSON file
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())
            .with_context(|| format!("Failed to open file {}", path.as_ref().display()))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse JSON from {}", path.as_ref().display()))
    }

    /// Solve time in seconds.
    pub fn solve_seconds(&self) -> f64 {
        self.solution.solve_time_ms as f64 / 1000.0
    }

    /// Print a human-readable summary to stdout.
    pub fn print_summary(&self) {
        let sol = &self.solution;
        let stats = &sol.stats;

        println!("{}", "=".repeat(60));
        println!("Instance:         {}", self.instance);
        println!(
            "Graph:            {} nodes, {} edges, {} conflicting pairs",
            self.num_nodes, self.num_edges, self.num_conflicts
        );
        println!("{}", "=".repeat(60));
        println!("Status:           {:?}", sol.status);
        println!("Packing size:     {} (seed {}, bound {})", sol.size, sol.seed_size, sol.root_bound);
        println!("Packing:          {:?}", sol.packing);
        println!(
            "Nodes:            {} created, {} expanded, {} pruned",
            stats.nodes_created, stats.nodes_expanded, stats.nodes_pruned
        );
        println!(
            "Frontier:         peak {}, {} overflows, {} discarded",
            stats.peak_frontier, stats.frontier_overflows, stats.children_discarded
        );
        if let Some(oracle) = &self.oracle {
            println!(
                "Oracle:           {} ({} calls, {} failures, {} busy)",
                oracle, stats.lp_calls, stats.lp_failures, stats.lp_busy
            );
        }
        println!("Solve time:       {:.3} s", self.solve_seconds());
    }
}
