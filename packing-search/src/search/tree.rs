//! Branch-and-bound tree controller.
//!
//! The search minimizes the negated packing size. Every node selects one
//! graph node after its parent's position, so each node is itself a feasible
//! packing and the tree enumerates all packings in increasing index order.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use super::{best_first, Dispatcher, ExpandFn, Frontier, SearchNode, WorkerPool};
use crate::error::{PackingError, PackingResult};
use crate::model::{
    is_feasible_packing, selection_vector, GraphView, Incumbent, PackingSolution, SearchStats,
    SearchStatus,
};
use crate::oracle::BoundOracle;
use crate::settings::{BoundStrategy, OverflowPolicy, SearchSettings};

/// Rounding tolerance for LP bounds.
const BOUND_TOL: f64 = 1e-6;

/// Outcome of an LP oracle consultation for a new node.
enum LpOutcome {
    /// Oracle not consulted (throttled, disabled or busy).
    Skipped,
    /// Oracle returned a bound.
    Bound(f64),
    /// Oracle was called and failed.
    Failed,
}

/// State shared by the dispatcher and all workers during one run.
pub struct SearchContext {
    graph: Arc<dyn GraphView>,
    oracle: Option<Arc<dyn BoundOracle>>,
    settings: SearchSettings,
    frontier: Arc<Frontier>,
    incumbent: Incumbent,
    stats: SearchStats,

    /// Next node id; equals the number of nodes created so far.
    next_id: AtomicU64,

    /// Set when a worker fault aborts the run.
    aborted: AtomicBool,
    fault: Mutex<Option<PackingError>>,

    start: Instant,
}

impl SearchContext {
    fn new(
        graph: Arc<dyn GraphView>,
        oracle: Option<Arc<dyn BoundOracle>>,
        settings: SearchSettings,
        frontier: Arc<Frontier>,
        incumbent: Incumbent,
    ) -> Self {
        Self {
            graph,
            oracle,
            settings,
            frontier,
            incumbent,
            stats: SearchStats::new(),
            next_id: AtomicU64::new(0),
            aborted: AtomicBool::new(false),
            fault: Mutex::new(None),
            start: Instant::now(),
        }
    }

    /// Shared incumbent.
    pub fn incumbent(&self) -> &Incumbent {
        &self.incumbent
    }

    /// Live statistics.
    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }

    /// Number of nodes created so far.
    pub fn nodes_created(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed)
    }

    fn allocate_id(&self) -> u64 {
        SearchStats::bump(&self.stats.nodes_created);
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Create the root node with its combinatorial (and possibly LP) bound.
    fn create_root(&self) -> Arc<SearchNode> {
        let id = self.allocate_id();
        debug_assert_eq!(id, 0);

        let mut root = SearchNode::root(f64::NEG_INFINITY);
        root.bound = root.combinatorial_bound(self.graph.as_ref());
        // The root is always due for an LP call
        let steps = self.settings.steps_between_lp_calls;
        if let LpOutcome::Bound(lp) = self.consult_oracle(&[], steps) {
            root.bound = root.bound.max(lp);
        }
        Arc::new(root)
    }

    /// Worker entry point: expand `node` and any children that have to run
    /// on this thread.
    ///
    /// A panic is caught here and aborts the whole run.
    pub fn run_node(&self, node: Arc<SearchNode>) {
        let node_id = node.id;
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.process(node)));
        if let Err(payload) = result {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::error!("Expansion of node {} panicked: {}", node_id, message);
            self.abort(PackingError::WorkerPanicked { node_id, message });
        }
    }

    fn process(&self, node: Arc<SearchNode>) {
        // Depth-first stack for children that did not fit in the frontier
        let mut local = vec![node];
        while let Some(node) = local.pop() {
            if self.aborted.load(Ordering::Relaxed) {
                return;
            }
            local.extend(self.expand(&node));
        }
    }

    fn abort(&self, error: PackingError) {
        let mut fault = self.fault.lock().unwrap_or_else(PoisonError::into_inner);
        if fault.is_none() {
            *fault = Some(error);
        }
        self.aborted.store(true, Ordering::Relaxed);
        self.frontier.mark_finished();
    }

    fn take_fault(&self) -> Option<PackingError> {
        self.fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Mark `node` done; stop the frontier if that finished the root.
    fn finish(&self, node: &SearchNode) {
        if node.finish() {
            log::debug!("Root finished after {} nodes", self.nodes_created());
            self.frontier.mark_finished();
        }
    }

    /// Expansion step for one node.
    ///
    /// Returns the children that must be expanded on this thread because the
    /// frontier had no room for them.
    pub fn expand(&self, node: &Arc<SearchNode>) -> Vec<Arc<SearchNode>> {
        let expanded = self.stats.nodes_expanded.fetch_add(1, Ordering::Relaxed) + 1;
        self.log_progress(expanded);

        // Budget cut
        if self.settings.budget_exceeded(self.nodes_created()) {
            SearchStats::bump(&self.stats.budget_cuts);
            self.finish(node);
            return Vec::new();
        }

        // Prune by bound
        let incumbent_value = self.incumbent.value();
        if node.bound >= incumbent_value {
            SearchStats::bump(&self.stats.nodes_pruned);
            self.finish(node);
            return Vec::new();
        }

        // The path to this node is a packing
        if node.cost < incumbent_value {
            let packing = node.selected();
            debug_assert!(is_feasible_packing(self.graph.as_ref(), &packing));
            if self.incumbent.update(&packing) {
                SearchStats::bump(&self.stats.incumbent_updates);
                log::info!(
                    "New incumbent: size={} (node {}, depth {}, {} nodes created)",
                    packing.len(),
                    node.id,
                    node.depth,
                    self.nodes_created()
                );
            }
        }

        // Leaf
        if node.next_index() >= self.graph.num_nodes() {
            SearchStats::bump(&self.stats.leaves);
            self.finish(node);
            return Vec::new();
        }

        let children = self.make_children(node);
        if children.is_empty() {
            self.finish(node);
            return Vec::new();
        }
        self.distribute(node, children)
    }

    /// One child per graph index that is still free to cover.
    fn make_children(&self, node: &Arc<SearchNode>) -> Vec<Arc<SearchNode>> {
        let graph = self.graph.as_ref();
        let free = node.free_indices(graph);
        let child_cost = node.cost - 1.0;

        // Selection of the child currently being built; last slot is its position
        let mut branch = node.selected();
        branch.push(0);

        let mut children = Vec::with_capacity(free.len());
        for (k, &r) in free.iter().enumerate() {
            if self
                .settings
                .max_nodes
                .is_some_and(|max| self.nodes_created() >= max)
            {
                SearchStats::bump(&self.stats.budget_cuts);
                break;
            }

            let neighbors = graph.distance2_neighbors(r);
            let still_free = free[k + 1..]
                .iter()
                .filter(|&&v| neighbors.binary_search(&v).is_err())
                .count();
            let mut bound = child_cost - still_free as f64;
            let mut steps = node.steps_since_lp + 1;

            let id = self.allocate_id();
            if let Some(last) = branch.last_mut() {
                *last = r;
            }
            match self.consult_oracle(&branch, steps) {
                LpOutcome::Bound(lp) => {
                    bound = bound.max(lp);
                    steps = 0;
                }
                LpOutcome::Failed => steps = 0,
                LpOutcome::Skipped => {}
            }

            children.push(Arc::new(SearchNode::child(
                node,
                id,
                r,
                neighbors.len(),
                bound,
                steps,
            )));
        }
        children
    }

    /// Ask the LP oracle for a bound on the subtree below `branch`.
    ///
    /// `steps` counts node creations on the branch since the last call.
    /// Anything other than `Bound` means the combinatorial bound stands.
    fn consult_oracle(&self, branch: &[usize], steps: usize) -> LpOutcome {
        let Some(oracle) = &self.oracle else {
            return LpOutcome::Skipped;
        };
        let depth = branch.len();
        if self.settings.bound_strategy != BoundStrategy::LpRelaxation
            || depth < self.settings.lp_tighten_from_level
            || steps < self.settings.steps_between_lp_calls
        {
            return LpOutcome::Skipped;
        }
        if oracle.is_busy() {
            SearchStats::bump(&self.stats.lp_busy);
            return LpOutcome::Skipped;
        }

        match oracle.lp_bound(self.graph.as_ref(), branch) {
            Ok(bound) => {
                SearchStats::bump(&self.stats.lp_calls);
                LpOutcome::Bound((bound - BOUND_TOL).ceil())
            }
            Err(PackingError::OracleBusy) => {
                SearchStats::bump(&self.stats.lp_busy);
                LpOutcome::Skipped
            }
            Err(e) if !e.is_recoverable() => {
                log::error!("{} returned a fatal error: {}", oracle.name(), e);
                self.abort(e);
                LpOutcome::Failed
            }
            Err(e) => {
                SearchStats::bump(&self.stats.lp_failures);
                log::warn!(
                    "{} failed at depth {}, using combinatorial bound: {}",
                    oracle.name(),
                    depth,
                    e
                );
                LpOutcome::Failed
            }
        }
    }

    /// Publish children to the frontier, applying the overflow policy if
    /// they do not fit.
    fn distribute(
        &self,
        node: &Arc<SearchNode>,
        mut children: Vec<Arc<SearchNode>>,
    ) -> Vec<Arc<SearchNode>> {
        // Children may finish as soon as they are published
        node.set_pending_children(children.len());
        if self.frontier.try_push_all(&children) {
            return Vec::new();
        }
        let overflows = self.stats.frontier_overflows.fetch_add(1, Ordering::Relaxed);
        if overflows == 0 {
            log::warn!(
                "Frontier full ({}), {} children of node {} overflow, applying {:?}",
                self.frontier.capacity(),
                children.len(),
                node.id,
                self.settings.overflow_policy
            );
        } else {
            log::debug!(
                "Frontier full ({}), {} children of node {} overflow",
                self.frontier.capacity(),
                children.len(),
                node.id
            );
        }

        match self.settings.overflow_policy {
            OverflowPolicy::RunSynchronously => {
                self.stats
                    .synchronous_expansions
                    .fetch_add(children.len() as u64, Ordering::Relaxed);
                // Best child last: it is popped first
                children.sort_by(|a, b| best_first(b, a));
                children
            }
            OverflowPolicy::CutToSingleBest => {
                let discarded = children.len() - 1;
                let Some(best) = children.into_iter().min_by(|a, b| best_first(a, b)) else {
                    return Vec::new();
                };
                self.stats
                    .children_discarded
                    .fetch_add(discarded as u64, Ordering::Relaxed);
                // Nothing was published yet, so the count can still change
                node.set_pending_children(1);
                if self.frontier.try_push(&best) {
                    Vec::new()
                } else {
                    SearchStats::bump(&self.stats.synchronous_expansions);
                    vec![best]
                }
            }
        }
    }

    fn log_progress(&self, expanded: u64) {
        if !self.settings.verbose || expanded % self.settings.log_freq != 0 {
            return;
        }

        log::info!(
            "Nodes: {} created, {} expanded ({} open) | Best bound: {:.0} | Incumbent: {} | Pruned: {} | Time: {:.1}s",
            self.nodes_created(),
            expanded,
            self.frontier.len(),
            -self.frontier.best_bound(),
            self.incumbent.size(),
            self.stats.nodes_pruned.load(Ordering::Relaxed),
            self.start.elapsed().as_secs_f64(),
        );
    }
}

/// Lifecycle of a search run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPhase {
    /// Configured, not started.
    Initializing,
    /// Dispatcher and workers are running.
    Running,
    /// Run completed with the given status.
    Finished(SearchStatus),
    /// Run aborted by a fault.
    Failed,
}

/// Owns the graph, oracle and configuration of a search and runs it.
pub struct SearchController {
    graph: Arc<dyn GraphView>,
    oracle: Option<Arc<dyn BoundOracle>>,
    settings: SearchSettings,
    seed: Option<Vec<usize>>,
    phase: SearchPhase,
}

impl SearchController {
    /// Create a controller. Settings and graph are validated here.
    pub fn new(graph: Arc<dyn GraphView>, settings: SearchSettings) -> PackingResult<Self> {
        settings.validate()?;
        validate_graph(graph.as_ref())?;

        Ok(Self {
            graph,
            oracle: None,
            settings,
            seed: None,
            phase: SearchPhase::Initializing,
        })
    }

    /// Attach an LP bound oracle.
    pub fn with_oracle(mut self, oracle: Arc<dyn BoundOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Seed the incumbent with a feasible packing.
    pub fn with_seed(mut self, packing: Vec<usize>) -> PackingResult<Self> {
        let n = self.graph.num_nodes();
        if let Some(&bad) = packing.iter().find(|&&i| i >= n) {
            return Err(PackingError::InvalidSeed(format!(
                "node {} outside 0..{}",
                bad, n
            )));
        }
        if !is_feasible_packing(self.graph.as_ref(), &packing) {
            return Err(PackingError::InvalidSeed(
                "two seed nodes are within distance 2".into(),
            ));
        }
        self.seed = Some(packing);
        Ok(self)
    }

    /// Current phase.
    pub fn phase(&self) -> SearchPhase {
        self.phase
    }

    /// Settings of this controller.
    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// Run the search to completion (or until the node budget is spent).
    pub fn run(&mut self) -> PackingResult<PackingSolution> {
        if self.settings.bound_strategy == BoundStrategy::LpRelaxation && self.oracle.is_none() {
            return Err(PackingError::InvalidSettings(
                "LP bound strategy requires a bound oracle".into(),
            ));
        }

        let n = self.graph.num_nodes();
        let incumbent = match &self.seed {
            Some(packing) => Incumbent::seeded(packing.clone()),
            None => Incumbent::new(),
        };
        let seed_size = incumbent.size();

        let frontier = Arc::new(Frontier::new(self.settings.max_frontier_size));
        let ctx = Arc::new(SearchContext::new(
            Arc::clone(&self.graph),
            self.oracle.clone(),
            self.settings.clone(),
            Arc::clone(&frontier),
            incumbent,
        ));

        let root = ctx.create_root();
        let root_bound = (-root.bound).max(0.0) as usize;
        log::info!(
            "Starting search: {} nodes, seed size {}, root bound {}, {} workers, frontier capacity {}",
            n,
            seed_size,
            root_bound,
            self.settings.worker_threads,
            self.settings.max_frontier_size
        );
        if !frontier.try_push(&root) {
            return Err(PackingError::InvalidSettings(
                "frontier cannot hold the root node".into(),
            ));
        }
        drop(root);

        self.phase = SearchPhase::Running;
        let result = Self::drive(&ctx, &frontier, self.settings.worker_threads);
        if let Some(fault) = ctx.take_fault() {
            self.phase = SearchPhase::Failed;
            return Err(fault);
        }
        if let Err(e) = result {
            self.phase = SearchPhase::Failed;
            return Err(e);
        }

        let stats = ctx.stats();
        stats.observe_frontier(frontier.peak());
        let snapshot = stats.snapshot();
        let status = if snapshot.budget_cuts > 0 {
            SearchStatus::NodeLimit
        } else if snapshot.children_discarded > 0 {
            SearchStatus::Heuristic
        } else {
            SearchStatus::Optimal
        };
        self.phase = SearchPhase::Finished(status);

        let best = ctx.incumbent().snapshot();
        let solution = PackingSolution {
            status,
            selection: selection_vector(n, &best.packing),
            size: best.packing.len(),
            packing: best.packing,
            seed_size,
            root_bound,
            stats: snapshot,
            solve_time_ms: ctx.start.elapsed().as_millis() as u64,
        };

        log::info!(
            "Search finished: {:?}, packing size {}, {} nodes created, {} pruned, {:.3}s",
            solution.status,
            solution.size,
            solution.stats.nodes_created,
            solution.stats.nodes_pruned,
            solution.solve_time_ms as f64 / 1000.0
        );
        Ok(solution)
    }

    /// Start pool and dispatcher, wait for the root to finish, tear down.
    fn drive(
        ctx: &Arc<SearchContext>,
        frontier: &Arc<Frontier>,
        threads: usize,
    ) -> PackingResult<()> {
        let pool = Arc::new(WorkerPool::new(threads)?);

        let worker_ctx = Arc::clone(ctx);
        let expand: ExpandFn = Arc::new(move |node| worker_ctx.run_node(node));
        let dispatcher = Dispatcher::spawn(Arc::clone(frontier), Arc::clone(&pool), expand)?;

        frontier.wait_until_finished();
        let dispatched = dispatcher.join()?;
        log::debug!(
            "Dispatcher handed out {} nodes, {} ran on the dispatcher thread",
            dispatched,
            pool.inline_runs()
        );

        match Arc::try_unwrap(pool) {
            Ok(pool) => pool.shutdown(),
            Err(_) => Ok(()),
        }
    }
}

/// Reject distance-2 neighborhoods that are unsorted, out of range,
/// self-referencing or asymmetric.
fn validate_graph(graph: &dyn GraphView) -> PackingResult<()> {
    let n = graph.num_nodes();
    for i in 0..n {
        let neighbors = graph.distance2_neighbors(i);
        if neighbors.windows(2).any(|w| w[0] >= w[1]) {
            return Err(PackingError::InvalidGraph(format!(
                "distance-2 neighborhood of node {} is not sorted",
                i
            )));
        }
        if neighbors.last().is_some_and(|&last| last >= n) {
            return Err(PackingError::InvalidGraph(format!(
                "node {} has a distance-2 neighbor outside 0..{}",
                i, n
            )));
        }
        if neighbors.binary_search(&i).is_ok() {
            return Err(PackingError::InvalidGraph(format!(
                "node {} is its own distance-2 neighbor",
                i
            )));
        }
        if let Some(&j) = neighbors
            .iter()
            .find(|&&j| !graph.is_distance2_neighbor(j, i))
        {
            return Err(PackingError::InvalidGraph(format!(
                "node {} lists {} as a distance-2 neighbor but not vice versa",
                i, j
            )));
        }
    }
    Ok(())
}
