//! Greedy warm start.

use crate::model::GraphView;

/// Greedy distance-2 packing.
///
/// Repeatedly selects the free node with the smallest distance-2 degree
/// (lowest index on ties) and excludes its neighborhood. The result is always
/// feasible and deterministic, and serves as the initial incumbent.
pub fn greedy_packing<G: GraphView + ?Sized>(graph: &G) -> Vec<usize> {
    let n = graph.num_nodes();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by_key(|&i| (graph.distance2_degree(i), i));

    let mut excluded = vec![false; n];
    let mut packing = Vec::new();
    for i in order {
        if excluded[i] {
            continue;
        }
        packing.push(i);
        excluded[i] = true;
        for &j in graph.distance2_neighbors(i) {
            excluded[j] = true;
        }
    }

    packing.sort_unstable();
    packing
}
