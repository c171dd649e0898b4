//! End-to-end tests for the packing search.
//!
//! Small graphs are checked against a brute-force maximum; the rest checks
//! overflow handling, the node budget and oracle fallbacks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use packing_search::{
    greedy_packing, is_feasible_packing, BoundOracle, GraphView, OracleConfig, OracleRegistry,
    OverflowPolicy, PackingError, PackingGraph, PackingResult, PackingSolution, SearchController,
    SearchPhase, SearchSettings, SearchStatus,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn path(n: usize) -> PackingGraph {
    let edges: Vec<_> = (1..n).map(|i| (i - 1, i)).collect();
    PackingGraph::from_edges(n, &edges).unwrap()
}

fn star(leaves: usize) -> PackingGraph {
    let edges: Vec<_> = (1..=leaves).map(|i| (0, i)).collect();
    PackingGraph::from_edges(leaves + 1, &edges).unwrap()
}

fn random_graph(n: usize, p: f64, seed: u64) -> PackingGraph {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut edges = Vec::new();
    for u in 0..n {
        for v in u + 1..n {
            if rng.gen_bool(p) {
                edges.push((u, v));
            }
        }
    }
    PackingGraph::from_edges(n, &edges).unwrap()
}

/// Largest packing using only `candidates`, by exhaustive search.
fn brute_force_max(graph: &dyn GraphView, candidates: &[usize]) -> usize {
    fn go(graph: &dyn GraphView, candidates: &[usize], chosen: &mut Vec<usize>) -> usize {
        let Some((&first, rest)) = candidates.split_first() else {
            return chosen.len();
        };
        let skip = go(graph, rest, chosen);
        if chosen.iter().any(|&c| graph.is_distance2_neighbor(c, first)) {
            return skip;
        }
        chosen.push(first);
        let take = go(graph, rest, chosen);
        chosen.pop();
        skip.max(take)
    }
    go(graph, candidates, &mut Vec::new())
}

fn run(graph: PackingGraph, settings: SearchSettings) -> PackingSolution {
    SearchController::new(Arc::new(graph), settings)
        .unwrap()
        .run()
        .unwrap()
}

fn run_with_oracle(
    graph: PackingGraph,
    settings: SearchSettings,
    oracle: Arc<dyn BoundOracle>,
) -> PackingResult<PackingSolution> {
    SearchController::new(Arc::new(graph), settings)?
        .with_oracle(oracle)
        .run()
}

fn assert_valid(graph: &PackingGraph, solution: &PackingSolution) {
    assert!(is_feasible_packing(graph, &solution.packing));
    assert_eq!(solution.size, solution.packing.len());
    assert_eq!(solution.selection.len(), graph.num_nodes());
    assert_eq!(
        solution.selection.iter().map(|&x| x as usize).sum::<usize>(),
        solution.size
    );
    assert!(solution.size <= solution.root_bound);
}

/// Bounds every branch by its exact optimum.
struct ExactOracle;

impl BoundOracle for ExactOracle {
    fn lp_bound(&self, graph: &dyn GraphView, selected: &[usize]) -> PackingResult<f64> {
        let start = selected.last().map_or(0, |&s| s + 1);
        let free: Vec<usize> = (start..graph.num_nodes())
            .filter(|&v| selected.iter().all(|&s| !graph.is_distance2_neighbor(s, v)))
            .collect();
        Ok(-((selected.len() + brute_force_max(graph, &free)) as f64))
    }

    fn is_busy(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "exact"
    }
}

/// Fails on every call.
struct FailingOracle;

impl BoundOracle for FailingOracle {
    fn lp_bound(&self, _graph: &dyn GraphView, _selected: &[usize]) -> PackingResult<f64> {
        Err(PackingError::Oracle("solver crashed".into()))
    }

    fn is_busy(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Permanently busy; must never be called.
struct BusyOracle {
    called: AtomicBool,
}

impl BoundOracle for BusyOracle {
    fn lp_bound(&self, _graph: &dyn GraphView, _selected: &[usize]) -> PackingResult<f64> {
        self.called.store(true, Ordering::SeqCst);
        Err(PackingError::OracleBusy)
    }

    fn is_busy(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "busy"
    }
}

/// Returns a bound far below anything achievable.
struct LooseOracle;

impl BoundOracle for LooseOracle {
    fn lp_bound(&self, _graph: &dyn GraphView, _selected: &[usize]) -> PackingResult<f64> {
        Ok(-1e9)
    }

    fn is_busy(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "loose"
    }
}

struct PanickingOracle;

impl BoundOracle for PanickingOracle {
    fn lp_bound(&self, _graph: &dyn GraphView, _selected: &[usize]) -> PackingResult<f64> {
        panic!("oracle blew up");
    }

    fn is_busy(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "panicking"
    }
}

#[test]
fn test_path_of_five() {
    let graph = path(5);
    let solution = run(graph.clone(), SearchSettings::default());

    assert_eq!(solution.status, SearchStatus::Optimal);
    assert_eq!(solution.size, 2);
    assert_valid(&graph, &solution);
}

#[test]
fn test_edgeless_graph_selects_everything() {
    let graph = PackingGraph::from_edges(7, &[]).unwrap();
    let solution = run(graph.clone(), SearchSettings::default());

    assert_eq!(solution.size, 7);
    assert_eq!(solution.selection, vec![1; 7]);
    assert_valid(&graph, &solution);
}

#[test]
fn test_star_selects_one_node() {
    let graph = star(6);
    let solution = run(graph.clone(), SearchSettings::default());

    assert_eq!(solution.status, SearchStatus::Optimal);
    assert_eq!(solution.size, 1);
    assert_valid(&graph, &solution);
}

#[test]
fn test_empty_graph() {
    let graph = PackingGraph::from_edges(0, &[]).unwrap();
    let solution = run(graph, SearchSettings::serial());

    assert_eq!(solution.status, SearchStatus::Optimal);
    assert_eq!(solution.size, 0);
    assert!(solution.selection.is_empty());
}

#[test]
fn test_matches_brute_force() {
    for seed in 0..12 {
        let graph = random_graph(12, 0.2, seed);
        let all: Vec<usize> = (0..graph.num_nodes()).collect();
        let expected = brute_force_max(&graph, &all);

        for threads in [0, 1, 4] {
            let settings = SearchSettings::default().with_worker_threads(threads);
            let solution = run(graph.clone(), settings);

            assert_eq!(solution.status, SearchStatus::Optimal);
            assert_eq!(
                solution.size, expected,
                "seed {} with {} threads",
                seed, threads
            );
            assert_valid(&graph, &solution);
        }
    }
}

#[test]
fn test_seeded_run_matches_brute_force() {
    for seed in 20..26 {
        let graph = random_graph(14, 0.15, seed);
        let all: Vec<usize> = (0..graph.num_nodes()).collect();
        let expected = brute_force_max(&graph, &all);

        let seed_packing = greedy_packing(&graph);
        let seed_size = seed_packing.len();
        let solution = SearchController::new(Arc::new(graph.clone()), SearchSettings::default())
            .unwrap()
            .with_seed(seed_packing)
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(solution.size, expected);
        assert_eq!(solution.seed_size, seed_size);
        assert_eq!(solution.improved_seed(), expected > seed_size);
        assert_valid(&graph, &solution);
    }
}

#[test]
fn test_serial_runs_are_deterministic() {
    let graph = random_graph(16, 0.15, 7);

    let first = run(graph.clone(), SearchSettings::serial());
    let second = run(graph, SearchSettings::serial());

    assert_eq!(first.packing, second.packing);
    assert_eq!(first.stats, second.stats);
}

#[test]
fn test_frontier_of_one_cut_mode() {
    let graph = random_graph(14, 0.15, 3);
    let settings = SearchSettings::default()
        .with_frontier_size(1)
        .with_overflow_policy(OverflowPolicy::CutToSingleBest);
    let solution = run(graph.clone(), settings);

    assert_valid(&graph, &solution);
    assert!(solution.stats.peak_frontier <= 1);
    assert!(solution.stats.frontier_overflows > 0);
    assert!(solution.stats.children_discarded > 0);
    assert_eq!(solution.status, SearchStatus::Heuristic);
    assert!(!solution.status.is_optimal());
}

#[test]
fn test_cut_mode_never_claims_optimality() {
    let mut suboptimal = 0;
    for seed in 0..40 {
        let graph = random_graph(14, 0.15, seed);
        let all: Vec<usize> = (0..graph.num_nodes()).collect();
        let expected = brute_force_max(&graph, &all);

        let settings = SearchSettings::serial()
            .with_frontier_size(1)
            .with_overflow_policy(OverflowPolicy::CutToSingleBest);
        let solution = run(graph.clone(), settings);

        assert_valid(&graph, &solution);
        assert!(solution.size <= expected, "seed {}", seed);
        if solution.stats.children_discarded > 0 {
            assert_eq!(solution.status, SearchStatus::Heuristic, "seed {}", seed);
        }
        if solution.status.is_optimal() {
            assert_eq!(solution.size, expected, "seed {}", seed);
        }
        if solution.size < expected {
            suboptimal += 1;
        }
    }
    // Cutting children does lose packings on some of these graphs
    assert!(suboptimal > 0);
}

#[test]
fn test_frontier_of_one_sync_mode_stays_exact() {
    for seed in 0..6 {
        let graph = random_graph(12, 0.2, seed);
        let all: Vec<usize> = (0..graph.num_nodes()).collect();
        let expected = brute_force_max(&graph, &all);

        let settings = SearchSettings::default()
            .with_frontier_size(1)
            .with_overflow_policy(OverflowPolicy::RunSynchronously);
        let solution = run(graph.clone(), settings);

        assert_eq!(solution.size, expected);
        assert!(solution.stats.peak_frontier <= 1);
        assert!(solution.stats.synchronous_expansions > 0);
        assert_valid(&graph, &solution);
    }
}

#[test]
fn test_node_budget_serial() {
    let graph = random_graph(12, 0.1, 5);
    let solution = run(graph.clone(), SearchSettings::serial().with_max_nodes(3));

    assert_eq!(solution.status, SearchStatus::NodeLimit);
    assert!(solution.stats.nodes_created <= 3);
    assert!(solution.stats.budget_cuts > 0);
    assert_valid(&graph, &solution);
}

#[test]
fn test_node_budget_parallel() {
    let graph = random_graph(30, 0.05, 11);
    let settings = SearchSettings::default()
        .with_worker_threads(4)
        .with_max_nodes(50);
    let solution = run(graph.clone(), settings);

    assert_eq!(solution.status, SearchStatus::NodeLimit);
    // Creation stops at the budget; concurrent workers may overshoot a little
    assert!(solution.stats.nodes_created <= 50 + 4 * 30);
    assert_valid(&graph, &solution);
}

#[test]
fn test_zero_budget_returns_seed() {
    let graph = random_graph(20, 0.1, 2);
    let seed_packing = greedy_packing(&graph);

    let mut controller =
        SearchController::new(Arc::new(graph.clone()), SearchSettings::serial().with_max_nodes(0))
            .unwrap()
            .with_seed(seed_packing.clone())
            .unwrap();
    let solution = controller.run().unwrap();

    assert_eq!(solution.status, SearchStatus::NodeLimit);
    assert_eq!(solution.packing, seed_packing);
    assert!(!solution.improved_seed());
    assert_eq!(
        controller.phase(),
        SearchPhase::Finished(SearchStatus::NodeLimit)
    );
}

#[test]
fn test_exact_oracle() {
    for seed in 0..4 {
        let graph = random_graph(12, 0.2, seed);
        let all: Vec<usize> = (0..graph.num_nodes()).collect();
        let expected = brute_force_max(&graph, &all);

        let settings = SearchSettings::serial().with_lp_bound(1, 0);
        let solution = run_with_oracle(graph.clone(), settings, Arc::new(ExactOracle)).unwrap();

        assert_eq!(solution.size, expected);
        assert_eq!(solution.root_bound, expected);
        assert!(solution.stats.lp_calls > 0);
        assert_eq!(solution.stats.lp_failures, 0);
        assert_valid(&graph, &solution);
    }
}

#[test]
fn test_failing_oracle_falls_back() {
    let graph = random_graph(12, 0.2, 9);
    let all: Vec<usize> = (0..graph.num_nodes()).collect();
    let expected = brute_force_max(&graph, &all);

    let settings = SearchSettings::default().with_lp_bound(1, 0);
    let solution = run_with_oracle(graph.clone(), settings, Arc::new(FailingOracle)).unwrap();

    assert_eq!(solution.status, SearchStatus::Optimal);
    assert_eq!(solution.size, expected);
    assert!(solution.stats.lp_failures > 0);
    assert_eq!(solution.stats.lp_calls, 0);
}

#[test]
fn test_busy_oracle_is_skipped() {
    let graph = random_graph(12, 0.2, 4);
    let all: Vec<usize> = (0..graph.num_nodes()).collect();
    let expected = brute_force_max(&graph, &all);

    let oracle = Arc::new(BusyOracle {
        called: AtomicBool::new(false),
    });
    let settings = SearchSettings::serial().with_lp_bound(1, 0);
    let solution = run_with_oracle(graph, settings, oracle.clone()).unwrap();

    assert_eq!(solution.size, expected);
    assert!(solution.stats.lp_busy > 0);
    assert!(!oracle.called.load(Ordering::SeqCst));
}

#[test]
fn test_loose_oracle_bound_is_clamped() {
    let graph = random_graph(12, 0.2, 6);
    let all: Vec<usize> = (0..graph.num_nodes()).collect();
    let expected = brute_force_max(&graph, &all);

    let settings = SearchSettings::serial().with_lp_bound(1, 0);
    let solution = run_with_oracle(graph, settings, Arc::new(LooseOracle)).unwrap();

    assert_eq!(solution.size, expected);
    // The combinatorial bound wins at the root
    assert_eq!(solution.root_bound, 12);
}

#[test]
fn test_lp_throttling() {
    let graph = random_graph(12, 0.2, 8);

    let every = SearchSettings::serial().with_lp_bound(1, 0);
    let every = run_with_oracle(graph.clone(), every, Arc::new(FailingOracle)).unwrap();

    let sparse = SearchSettings::serial().with_lp_bound(3, 0);
    let sparse = run_with_oracle(graph.clone(), sparse, Arc::new(FailingOracle)).unwrap();

    let deep = SearchSettings::serial().with_lp_bound(1, 100);
    let deep = run_with_oracle(graph, deep, Arc::new(FailingOracle)).unwrap();

    // Failures do not tighten anything, so all three explore the same tree
    assert_eq!(every.stats.nodes_created, sparse.stats.nodes_created);
    assert_eq!(every.stats.lp_failures, every.stats.nodes_created);
    assert!(sparse.stats.lp_failures < every.stats.lp_failures);
    assert_eq!(deep.stats.lp_failures, 0);
}

#[test]
fn test_oracle_from_registry() {
    let mut registry = OracleRegistry::default();
    registry.register("exact", |_config| Ok(Arc::new(ExactOracle) as Arc<dyn BoundOracle>));
    let oracle = registry.build("exact", &OracleConfig::default()).unwrap();

    let graph = path(6);
    let solution = run_with_oracle(graph, SearchSettings::serial().with_lp_bound(1, 0), oracle)
        .unwrap();
    assert_eq!(solution.size, 2);

    assert!(matches!(
        registry.build("missing", &OracleConfig::default()),
        Err(PackingError::UnknownOracle(_))
    ));
}

#[test]
fn test_panicking_worker_aborts_run() {
    let graph = random_graph(10, 0.2, 1);
    // Skip the root so the panic happens inside a worker
    let settings = SearchSettings::default()
        .with_worker_threads(2)
        .with_lp_bound(1, 1);

    let mut controller = SearchController::new(Arc::new(graph), settings)
        .unwrap()
        .with_oracle(Arc::new(PanickingOracle));
    let err = controller.run().unwrap_err();

    assert!(matches!(err, PackingError::WorkerPanicked { .. }));
    assert_eq!(controller.phase(), SearchPhase::Failed);
}

#[test]
fn test_lp_strategy_requires_oracle() {
    let settings = SearchSettings::serial().with_lp_bound(1, 0);
    let err = SearchController::new(Arc::new(path(4)), settings)
        .unwrap()
        .run()
        .unwrap_err();
    assert!(matches!(err, PackingError::InvalidSettings(_)));
}

#[test]
fn test_invalid_seed_is_rejected() {
    let controller = SearchController::new(Arc::new(path(5)), SearchSettings::serial()).unwrap();
    assert!(matches!(
        controller.with_seed(vec![1, 2]),
        Err(PackingError::InvalidSeed(_))
    ));
}
