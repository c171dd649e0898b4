//! Synthetic graph generators.

use anyhow::{bail, Result};
use clap::ValueEnum;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Family of generated graphs.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphKind {
    /// Path 0 - 1 - ... - (n-1)
    Path,
    /// Cycle on n nodes
    Cycle,
    /// Node 0 joined to every other node
    Star,
    /// Square grid, side ceil(sqrt(n)), truncated to n nodes
    Grid,
    /// Erdos-Renyi G(n, p)
    Random,
}

/// Edge list of a generated graph on `n` nodes.
///
/// `prob` and `seed` are only used by `GraphKind::Random`.
pub fn generate_edges(
    kind: GraphKind,
    n: usize,
    prob: f64,
    seed: u64,
) -> Result<Vec<(usize, usize)>> {
    let edges = match kind {
        GraphKind::Path => (1..n).map(|i| (i - 1, i)).collect(),
        GraphKind::Cycle => {
            let mut edges: Vec<_> = (1..n).map(|i| (i - 1, i)).collect();
            if n > 2 {
                edges.push((n - 1, 0));
            }
            edges
        }
        GraphKind::Star => (1..n).map(|i| (0, i)).collect(),
        GraphKind::Grid => grid_edges(n),
        GraphKind::Random => {
            if !(0.0..=1.0).contains(&prob) {
                bail!("Edge probability {} outside [0, 1]", prob);
            }
            random_edges(n, prob, seed)
        }
    };
    Ok(edges)
}

fn grid_edges(n: usize) -> Vec<(usize, usize)> {
    let side = (1..).find(|s| s * s >= n).unwrap_or(1);
    let mut edges = Vec::new();
    for v in 0..n {
        if v % side + 1 < side && v + 1 < n {
            edges.push((v, v + 1));
        }
        if v + side < n {
            edges.push((v, v + side));
        }
    }
    edges
}

fn random_edges(n: usize, prob: f64, seed: u64) -> Vec<(usize, usize)> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut edges = Vec::new();
    for u in 0..n {
        for v in u + 1..n {
            if rng.gen_bool(prob) {
                edges.push((u, v));
            }
        }
    }
    edges
}
