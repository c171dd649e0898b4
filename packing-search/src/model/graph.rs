//! Graph representation for distance-2 packing.

use crate::error::{PackingError, PackingResult};

/// Read-only view of a graph as seen by the packing search.
///
/// The search only needs, for each node, the set of nodes that can never be
/// selected together with it: its distance-2 neighborhood.
pub trait GraphView: Send + Sync {
    /// Number of nodes. Node indices are `0..num_nodes()`.
    fn num_nodes(&self) -> usize;

    /// Sorted distance-2 neighborhood of node `i` (never contains `i`).
    fn distance2_neighbors(&self, i: usize) -> &[usize];

    /// Size of the distance-2 neighborhood of node `i`.
    fn distance2_degree(&self, i: usize) -> usize {
        self.distance2_neighbors(i).len()
    }

    /// True if `u` and `v` cannot both be in a packing.
    fn is_distance2_neighbor(&self, u: usize, v: usize) -> bool {
        self.distance2_neighbors(u).binary_search(&v).is_ok()
    }
}

/// Graph with precomputed distance-2 neighborhoods.
#[derive(Debug, Clone)]
pub struct PackingGraph {
    /// Sorted distance-2 neighborhood per node.
    distance2: Vec<Vec<usize>>,

    /// Number of undirected edges the graph was built from.
    num_edges: usize,
}

impl PackingGraph {
    /// Build from an undirected edge list.
    ///
    /// Self-loops are ignored, duplicate edges are merged.
    pub fn from_edges(num_nodes: usize, edges: &[(usize, usize)]) -> PackingResult<Self> {
        let mut adj: Vec<Vec<usize>> = vec![Vec::new(); num_nodes];
        for &(u, v) in edges {
            if u >= num_nodes || v >= num_nodes {
                return Err(PackingError::InvalidGraph(format!(
                    "Edge ({}, {}) references a node outside 0..{}",
                    u, v, num_nodes
                )));
            }
            if u == v {
                continue;
            }
            adj[u].push(v);
            adj[v].push(u);
        }
        for list in &mut adj {
            list.sort_unstable();
            list.dedup();
        }
        let num_edges = adj.iter().map(Vec::len).sum::<usize>() / 2;

        // N2(i) = N(i) + N(N(i)) - {i}
        let mut mark = vec![usize::MAX; num_nodes];
        let mut distance2 = Vec::with_capacity(num_nodes);
        for i in 0..num_nodes {
            let mut reach = Vec::new();
            mark[i] = i;
            for &j in &adj[i] {
                if mark[j] != i {
                    mark[j] = i;
                    reach.push(j);
                }
                for &k in &adj[j] {
                    if mark[k] != i {
                        mark[k] = i;
                        reach.push(k);
                    }
                }
            }
            reach.sort_unstable();
            distance2.push(reach);
        }

        Ok(Self {
            distance2,
            num_edges,
        })
    }

    /// Build directly from distance-2 neighborhoods.
    ///
    /// The sets must be symmetric, in range and must not contain their own node.
    pub fn from_distance2_sets(mut sets: Vec<Vec<usize>>) -> PackingResult<Self> {
        let n = sets.len();
        for (i, set) in sets.iter_mut().enumerate() {
            set.sort_unstable();
            set.dedup();
            if let Some(&last) = set.last() {
                if last >= n {
                    return Err(PackingError::InvalidGraph(format!(
                        "Node {} has distance-2 neighbor {} outside 0..{}",
                        i, last, n
                    )));
                }
            }
            if set.binary_search(&i).is_ok() {
                return Err(PackingError::InvalidGraph(format!(
                    "Node {} lists itself as a distance-2 neighbor",
                    i
                )));
            }
        }
        for (i, set) in sets.iter().enumerate() {
            for &j in set {
                if sets[j].binary_search(&i).is_err() {
                    return Err(PackingError::InvalidGraph(format!(
                        "Distance-2 sets are not symmetric: {} lists {} but not vice versa",
                        i, j
                    )));
                }
            }
        }

        Ok(Self {
            distance2: sets,
            num_edges: 0,
        })
    }

    /// Number of edges the graph was built from (0 when built from sets).
    pub fn num_edges(&self) -> usize {
        self.num_edges
    }

    /// Number of distance-2 pairs (edges of the squared graph).
    pub fn num_distance2_pairs(&self) -> usize {
        self.distance2.iter().map(Vec::len).sum::<usize>() / 2
    }
}

impl GraphView for PackingGraph {
    fn num_nodes(&self) -> usize {
        self.distance2.len()
    }

    fn distance2_neighbors(&self, i: usize) -> &[usize] {
        &self.distance2[i]
    }
}

/// Check that `packing` is a distance-2 packing of `graph`.
pub fn is_feasible_packing<G: GraphView + ?Sized>(graph: &G, packing: &[usize]) -> bool {
    let n = graph.num_nodes();
    for (a, &u) in packing.iter().enumerate() {
        if u >= n {
            return false;
        }
        for &v in &packing[a + 1..] {
            if u == v
                || graph.is_distance2_neighbor(u, v)
                || graph.is_distance2_neighbor(v, u)
            {
                return false;
            }
        }
    }
    true
}

/// Expand a packing into a 0/1 vector of length `num_nodes`.
pub fn selection_vector(num_nodes: usize, packing: &[usize]) -> Vec<u8> {
    let mut x = vec![0u8; num_nodes];
    for &i in packing {
        if i < num_nodes {
            x[i] = 1;
        }
    }
    x
}
