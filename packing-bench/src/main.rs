//! Command-line runner for the distance-2 packing search.

mod dimacs;
mod generate;
mod report;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use packing_search::{
    greedy_packing, BoundOracle, BoundStrategy, GraphView, OracleConfig, OracleRegistry,
    OverflowPolicy, PackingGraph, SearchController, SearchSettings, LP_SUBPROCESS,
};

use dimacs::DimacsGraph;
use generate::{generate_edges, GraphKind};
use report::RunReport;

#[derive(Parser)]
#[command(name = "packing-bench")]
#[command(about = "Maximum distance-2 packing by parallel branch-and-bound")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a graph read from a DIMACS edge file
    Solve {
        /// DIMACS file (`p edge n m`, `e u v`, 1-based)
        #[arg(short, long)]
        graph: PathBuf,

        #[command(flatten)]
        search: SearchArgs,
    },

    /// Generate a synthetic graph and solve it
    Generate {
        /// Graph family
        #[arg(value_enum)]
        kind: GraphKind,

        /// Number of nodes
        #[arg(short, long)]
        nodes: usize,

        /// Edge probability (random graphs)
        #[arg(short, long, default_value = "0.1")]
        prob: f64,

        /// Random seed for reproducibility
        #[arg(short, long, default_value = "42")]
        seed: u64,

        #[command(flatten)]
        search: SearchArgs,
    },

    /// Print the summary of a saved run report
    Show {
        /// Report file written by `--output`
        report: PathBuf,
    },
}

#[derive(Args)]
struct SearchArgs {
    /// Worker threads (0 = run everything on the dispatcher thread)
    #[arg(short, long)]
    threads: Option<usize>,

    /// Node creation budget
    #[arg(long)]
    max_nodes: Option<u64>,

    /// Frontier capacity
    #[arg(long)]
    frontier: Option<usize>,

    /// What to do with children that do not fit in the frontier
    #[arg(long, value_enum)]
    overflow: Option<OverflowArg>,

    /// Bounding strategy
    #[arg(long, value_enum)]
    bound: Option<BoundArg>,

    /// LP solver command template ({lp} = model file, {out} = report file)
    #[arg(long)]
    lp_command: Option<String>,

    /// Node creations along a branch between two LP calls
    #[arg(long)]
    lp_steps: Option<usize>,

    /// Minimum depth for LP calls
    #[arg(long)]
    lp_from_level: Option<usize>,

    /// Start from the empty packing instead of the greedy one
    #[arg(long)]
    no_seed: bool,

    /// JSON settings file; flags override its fields
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output file for the run report (JSON)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log search progress
    #[arg(short, long)]
    verbose: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OverflowArg {
    /// Expand overflowing children on the producing worker
    Sync,
    /// Keep only the best overflowing child
    Cut,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum BoundArg {
    Combinatorial,
    Lp,
}

impl SearchArgs {
    /// Settings from the config file (or defaults) with flag overrides applied.
    fn settings(&self) -> Result<SearchSettings> {
        let mut settings = match &self.config {
            Some(path) => load_settings(path)?,
            None => SearchSettings::default(),
        };

        if let Some(threads) = self.threads {
            settings.worker_threads = threads;
        }
        if let Some(max_nodes) = self.max_nodes {
            settings.max_nodes = Some(max_nodes);
        }
        if let Some(frontier) = self.frontier {
            settings.max_frontier_size = frontier;
        }
        if let Some(overflow) = self.overflow {
            settings.overflow_policy = match overflow {
                OverflowArg::Sync => OverflowPolicy::RunSynchronously,
                OverflowArg::Cut => OverflowPolicy::CutToSingleBest,
            };
        }
        if let Some(bound) = self.bound {
            settings.bound_strategy = match bound {
                BoundArg::Combinatorial => BoundStrategy::Combinatorial,
                BoundArg::Lp => BoundStrategy::LpRelaxation,
            };
        }
        if let Some(steps) = self.lp_steps {
            settings.steps_between_lp_calls = steps;
        }
        if let Some(level) = self.lp_from_level {
            settings.lp_tighten_from_level = level;
        }
        settings.verbose |= self.verbose;

        settings.validate().context("Invalid search settings")?;
        Ok(settings)
    }

    fn oracle(&self, settings: &SearchSettings) -> Result<Option<Arc<dyn BoundOracle>>> {
        if settings.bound_strategy != BoundStrategy::LpRelaxation {
            return Ok(None);
        }

        let mut config = OracleConfig::default();
        if let Some(command) = &self.lp_command {
            config.command = command.clone();
        }
        let oracle = OracleRegistry::default()
            .build(LP_SUBPROCESS, &config)
            .context("Failed to construct LP oracle")?;
        Ok(Some(oracle))
    }
}

fn load_settings(path: &Path) -> Result<SearchSettings> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open config file {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse settings from {}", path.display()))
}

fn run(instance: String, graph: PackingGraph, args: &SearchArgs) -> Result<()> {
    let settings = args.settings()?;
    let oracle = args.oracle(&settings)?;

    let num_nodes = graph.num_nodes();
    let num_edges = graph.num_edges();
    let num_conflicts = graph.num_distance2_pairs();
    log::info!(
        "{}: {} nodes, {} edges, {} conflicting pairs",
        instance,
        num_nodes,
        num_edges,
        num_conflicts
    );

    let seed = if args.no_seed {
        None
    } else {
        let seed = greedy_packing(&graph);
        log::info!("Greedy seed: {} nodes", seed.len());
        Some(seed)
    };

    let mut controller = SearchController::new(Arc::new(graph), settings.clone())
        .context("Failed to set up search")?;
    if let Some(oracle) = &oracle {
        controller = controller.with_oracle(Arc::clone(oracle));
    }
    if let Some(seed) = seed {
        controller = controller.with_seed(seed)?;
    }
    let solution = controller.run().context("Search failed")?;

    let report = RunReport {
        instance,
        num_nodes,
        num_edges,
        num_conflicts,
        settings,
        oracle: oracle.map(|o| o.name().to_string()),
        solution,
    };
    report.print_summary();

    if let Some(path) = &args.output {
        report.save_json(path)?;
        println!("Report written to {}", path.display());
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Solve { graph, search } => {
            init_logging(search.verbose);
            let packing_graph = DimacsGraph::from_file(&graph)?.into_packing_graph()?;
            run(graph.display().to_string(), packing_graph, &search)
        }
        Commands::Generate {
            kind,
            nodes,
            prob,
            seed,
            search,
        } => {
            init_logging(search.verbose);
            let edges = generate_edges(kind, nodes, prob, seed)?;
            let graph = PackingGraph::from_edges(nodes, &edges)
                .context("Failed to build distance-2 neighborhoods")?;
            let instance = match kind {
                GraphKind::Random => format!("random(n={}, p={}, seed={})", nodes, prob, seed),
                other => format!("{:?}(n={})", other, nodes).to_lowercase(),
            };
            run(instance, graph, &search)
        }
        Commands::Show { report } => {
            init_logging(false);
            RunReport::load_json(&report)?.print_summary();
            Ok(())
        }
    }
}
