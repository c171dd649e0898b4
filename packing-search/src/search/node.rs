//! Search node representation and the termination protocol.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::model::GraphView;

/// A node in the B&B search tree.
///
/// Every non-root node selects one graph node (`position`), so the path from
/// a node to the root spells out a feasible packing. Nodes are shared through
/// `Arc`: a child keeps its parent alive until it has notified it.
#[derive(Debug)]
pub struct SearchNode {
    /// Unique, increasing creation index (root is 0).
    pub id: u64,

    /// Graph node selected by this node (None for the root).
    pub position: Option<usize>,

    /// Parent node (None for the root).
    pub parent: Option<Arc<SearchNode>>,

    /// Number of selected graph nodes on the path (0 for the root).
    pub depth: usize,

    /// Objective along this branch: the negated number of selected nodes.
    pub cost: f64,

    /// Lower bound on the objective of any packing in this subtree.
    ///
    /// Never looser than the parent's bound.
    pub bound: f64,

    /// Sum of distance-2 degrees of the selected nodes.
    pub degree_sum: usize,

    /// Node creations along this branch since the last LP oracle call.
    pub steps_since_lp: usize,

    /// Children not yet finished.
    pending_children: AtomicUsize,

    /// Set once, when the subtree below this node is finished.
    done: AtomicBool,
}

impl SearchNode {
    /// Create the root node.
    pub fn root(bound: f64) -> Self {
        Self {
            id: 0,
            position: None,
            parent: None,
            depth: 0,
            cost: 0.0,
            bound,
            degree_sum: 0,
            steps_since_lp: 0,
            pending_children: AtomicUsize::new(0),
            done: AtomicBool::new(false),
        }
    }

    /// Create a child selecting graph node `position`.
    ///
    /// `bound` is clamped so that it never drops below the parent's bound.
    pub fn child(
        parent: &Arc<SearchNode>,
        id: u64,
        position: usize,
        distance2_degree: usize,
        bound: f64,
        steps_since_lp: usize,
    ) -> Self {
        Self {
            id,
            position: Some(position),
            parent: Some(Arc::clone(parent)),
            depth: parent.depth + 1,
            cost: parent.cost - 1.0,
            bound: bound.max(parent.bound),
            degree_sum: parent.degree_sum + distance2_degree,
            steps_since_lp,
            pending_children: AtomicUsize::new(0),
            done: AtomicBool::new(false),
        }
    }

    /// First graph index this node may still decide.
    pub fn next_index(&self) -> usize {
        self.position.map_or(0, |p| p + 1)
    }

    /// Average distance-2 degree of the selected nodes (0 at the root).
    ///
    /// Secondary frontier key: branches built from small neighborhoods
    /// leave more room for later selections.
    pub fn degree_heuristic(&self) -> f64 {
        if self.depth == 0 {
            0.0
        } else {
            self.degree_sum as f64 / self.depth as f64
        }
    }

    /// Iterate over this node and its ancestors, up to the root.
    pub fn ancestors(&self) -> Ancestors<'_> {
        Ancestors {
            current: Some(self),
        }
    }

    /// Selected graph nodes on the path, ascending.
    pub fn selected(&self) -> Vec<usize> {
        let mut selected: Vec<usize> = self.ancestors().filter_map(|n| n.position).collect();
        selected.reverse();
        selected
    }

    /// Mark every graph index excluded by a selection on the path.
    ///
    /// `excluded[i]` is true if some selected ancestor (this node included)
    /// has `i` in its distance-2 neighborhood.
    pub fn excluded_mask(&self, graph: &dyn GraphView) -> Vec<bool> {
        let mut excluded = vec![false; graph.num_nodes()];
        for position in self.ancestors().filter_map(|n| n.position) {
            for &j in graph.distance2_neighbors(position) {
                excluded[j] = true;
            }
        }
        excluded
    }

    /// Graph indices after `position` that are still free to cover.
    pub fn free_indices(&self, graph: &dyn GraphView) -> Vec<usize> {
        let excluded = self.excluded_mask(graph);
        (self.next_index()..graph.num_nodes())
            .filter(|&i| !excluded[i])
            .collect()
    }

    /// Combinatorial bound: cost minus the number of free undecided indices.
    pub fn combinatorial_bound(&self, graph: &dyn GraphView) -> f64 {
        self.cost - self.free_indices(graph).len() as f64
    }

    /// Returns true once this node's subtree is finished.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Children not yet finished.
    pub fn pending_children(&self) -> usize {
        self.pending_children.load(Ordering::Acquire)
    }

    /// Record how many children were handed out.
    ///
    /// Must be called before any of them can run.
    pub fn set_pending_children(&self, count: usize) {
        self.pending_children.store(count, Ordering::Release);
    }

    /// Mark this node done and propagate completion towards the root.
    ///
    /// Each ancestor whose last pending child finishes is marked done in
    /// turn. Returns true if the root was reached, i.e. the search is over.
    /// Calling it again on a node that is already done has no effect.
    pub fn finish(&self) -> bool {
        let mut node = self;
        loop {
            if node.done.swap(true, Ordering::AcqRel) {
                return false;
            }
            match &node.parent {
                None => return true,
                Some(parent) => {
                    if !parent.notify_child_finished() {
                        return false;
                    }
                    node = parent;
                }
            }
        }
    }

    /// Decrement the pending-children count.
    ///
    /// Returns true if this was the last pending child.
    fn notify_child_finished(&self) -> bool {
        let previous = self.pending_children.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "node {} notified without pending children", self.id);
        previous == 1
    }
}

/// Iterator over a node and its ancestors.
pub struct Ancestors<'a> {
    current: Option<&'a SearchNode>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a SearchNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.current?;
        self.current = node.parent.as_deref();
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PackingGraph;

    fn path5() -> PackingGraph {
        PackingGraph::from_edges(5, &[(0, 1), (1, 2), (2, 3), (3, 4)]).unwrap()
    }

    #[test]
    fn test_root_node() {
        let root = SearchNode::root(-5.0);
        assert_eq!(root.id, 0);
        assert!(root.parent.is_none());
        assert!(root.position.is_none());
        assert_eq!(root.depth, 0);
        assert_eq!(root.cost, 0.0);
        assert_eq!(root.next_index(), 0);
        assert!(!root.is_done());
    }

    #[test]
    fn test_child_node() {
        let root = Arc::new(SearchNode::root(-5.0));
        let child = SearchNode::child(&root, 1, 2, 4, -6.0, 1);

        assert_eq!(child.id, 1);
        assert_eq!(child.position, Some(2));
        assert_eq!(child.depth, 1);
        assert_eq!(child.cost, -1.0);
        // Clamped to the parent's bound
        assert_eq!(child.bound, -5.0);
        assert_eq!(child.degree_heuristic(), 4.0);
        assert_eq!(child.next_index(), 3);
    }

    #[test]
    fn test_free_to_cover() {
        let g = path5();
        let root = Arc::new(SearchNode::root(-5.0));
        assert_eq!(root.free_indices(&g), vec![0, 1, 2, 3, 4]);
        assert_eq!(root.combinatorial_bound(&g), -5.0);

        let n0 = Arc::new(SearchNode::child(&root, 1, 0, 2, -5.0, 1));
        assert_eq!(n0.free_indices(&g), vec![3, 4]);
        assert_eq!(n0.combinatorial_bound(&g), -3.0);

        let n3 = SearchNode::child(&n0, 2, 3, 3, -2.0, 2);
        assert!(n3.free_indices(&g).is_empty());
        assert_eq!(n3.selected(), vec![0, 3]);
        assert_eq!(n3.combinatorial_bound(&g), -2.0);
    }

    #[test]
    fn test_finish_propagates() {
        let root = Arc::new(SearchNode::root(0.0));
        let a = Arc::new(SearchNode::child(&root, 1, 0, 0, 0.0, 1));
        let b = Arc::new(SearchNode::child(&root, 2, 1, 0, 0.0, 1));
        root.set_pending_children(2);

        let a1 = Arc::new(SearchNode::child(&a, 3, 2, 0, 0.0, 2));
        a.set_pending_children(1);

        assert!(!b.finish());
        assert!(b.is_done());
        assert_eq!(root.pending_children(), 1);
        assert!(!root.is_done());

        // Finishing a1 finishes a, then the root.
        assert!(a1.finish());
        assert!(a.is_done());
        assert!(root.is_done());
        assert_eq!(root.pending_children(), 0);
    }

    #[test]
    fn test_finish_is_idempotent() {
        let root = Arc::new(SearchNode::root(0.0));
        let a = Arc::new(SearchNode::child(&root, 1, 0, 0, 0.0, 1));
        let b = Arc::new(SearchNode::child(&root, 2, 1, 0, 0.0, 1));
        root.set_pending_children(2);

        assert!(!a.finish());
        assert!(!a.finish());
        // The second call must not consume b's notification.
        assert_eq!(root.pending_children(), 1);
        assert!(b.finish());
    }

    #[test]
    fn test_childless_root() {
        let root = SearchNode::root(0.0);
        assert!(root.finish());
        assert!(!root.finish());
    }
}
