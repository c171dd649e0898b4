//! LP-relaxation oracle backed by an external solver process.
//!
//! The relaxation of the remaining subproblem is
//!
//! ```text
//! maximize    sum_{v free} x_v
//! subject to  x_u + x_v <= 1     for every distance-2 pair of free nodes
//!             0 <= x_v <= 1
//! ```
//!
//! written in CPLEX LP format. The solver report is scanned for the
//! objective value; the bound returned to the search is
//! `-(selected + floor(value))`.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, TryLockError};

use super::{BoundOracle, OracleConfig, LP_SUBPROCESS};
use crate::error::{PackingError, PackingResult};
use crate::model::GraphView;

/// Tolerance applied before rounding an LP value down.
const LP_ROUND_TOL: f64 = 1e-6;

/// LP relaxation of the subproblem below a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LpModel {
    /// Nodes that can still be added to the packing.
    pub free: Vec<usize>,

    /// Conflicting pairs among the free nodes (u < v).
    pub pairs: Vec<(usize, usize)>,

    /// Number of nodes already selected.
    pub selected: usize,
}

impl LpModel {
    /// Build the relaxation for the given ascending selection.
    pub fn build(graph: &dyn GraphView, selected: &[usize]) -> Self {
        let n = graph.num_nodes();
        let start = selected.last().map_or(0, |&last| last + 1);

        let mut excluded = vec![false; n];
        for &s in selected {
            for &j in graph.distance2_neighbors(s) {
                excluded[j] = true;
            }
        }
        let free: Vec<usize> = (start..n).filter(|&v| !excluded[v]).collect();

        let mut is_free = vec![false; n];
        for &v in &free {
            is_free[v] = true;
        }
        let mut pairs = Vec::new();
        for &u in &free {
            for &v in graph.distance2_neighbors(u) {
                if v > u && is_free[v] {
                    pairs.push((u, v));
                }
            }
        }

        Self {
            free,
            pairs,
            selected: selected.len(),
        }
    }

    /// True if the LP is trivially solved by selecting every free node.
    pub fn is_trivial(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Render the model in CPLEX LP format.
    pub fn to_lp_format(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "\\ distance-2 packing relaxation, {} selected", self.selected);
        out.push_str("Maximize\n obj:");
        for (k, v) in self.free.iter().enumerate() {
            let sep = if k == 0 { " " } else { " + " };
            let _ = write!(out, "{}x{}", sep, v);
        }
        out.push_str("\nSubject To\n");
        for (k, (u, v)) in self.pairs.iter().enumerate() {
            let _ = writeln!(out, " c{}: x{} + x{} <= 1", k, u, v);
        }
        out.push_str("Bounds\n");
        for v in &self.free {
            let _ = writeln!(out, " 0 <= x{} <= 1", v);
        }
        out.push_str("End\n");
        out
    }

    /// Convert an LP objective value into a bound on the negated packing size.
    pub fn bound_from_value(&self, value: f64) -> f64 {
        let capped = value.min(self.free.len() as f64);
        -((self.selected as f64) + (capped + LP_ROUND_TOL).floor())
    }
}

/// Extract the objective value from a solver report.
///
/// Understands `Objective:  obj = 2.5 (MAXimum)` (glpsol) and
/// `objective value: 2.5` style lines.
pub fn parse_objective(report: &str) -> Option<f64> {
    report.lines().find_map(|line| {
        if !line.to_ascii_lowercase().contains("objective") {
            return None;
        }
        let rest = match line.rfind('=') {
            Some(pos) => &line[pos + 1..],
            None => &line[line.rfind(':')? + 1..],
        };
        rest.split_whitespace().next()?.parse::<f64>().ok()
    })
}

/// LP oracle that runs an external solver for every call.
pub struct SubprocessLpOracle {
    config: OracleConfig,

    /// Held for the duration of a call.
    lock: Mutex<()>,

    busy: AtomicBool,

    /// Used to give every call its own model file.
    calls: AtomicU64,
}

impl SubprocessLpOracle {
    /// Create an oracle with the given solver configuration.
    pub fn new(config: OracleConfig) -> Self {
        Self {
            config,
            lock: Mutex::new(()),
            busy: AtomicBool::new(false),
            calls: AtomicU64::new(0),
        }
    }

    fn scratch_path(&self, call: u64, ext: &str) -> PathBuf {
        let dir = self
            .config
            .work_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        dir.join(format!(
            "packing-lp-{}-{}.{}",
            std::process::id(),
            call,
            ext
        ))
    }

    fn run_solver(&self, lp_path: &Path, out_path: &Path) -> PackingResult<String> {
        let uses_report = self.config.command.contains("{out}");
        let args: Vec<String> = self
            .config
            .command
            .split_whitespace()
            .map(|tok| {
                tok.replace("{lp}", &lp_path.to_string_lossy())
                    .replace("{out}", &out_path.to_string_lossy())
            })
            .collect();
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| PackingError::Oracle("empty solver command".into()))?;

        let output = Command::new(program).args(rest).output()?;
        if !output.status.success() {
            return Err(PackingError::Oracle(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        if uses_report {
            Ok(fs::read_to_string(out_path)?)
        } else {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        }
    }

    fn solve(&self, model: &LpModel) -> PackingResult<f64> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        let lp_path = self.scratch_path(call, "lp");
        let out_path = self.scratch_path(call, "out");

        fs::write(&lp_path, model.to_lp_format())?;
        let report = self.run_solver(&lp_path, &out_path);
        let _ = fs::remove_file(&lp_path);
        let _ = fs::remove_file(&out_path);

        let report = report?;
        parse_objective(&report)
            .ok_or_else(|| PackingError::Oracle("no objective value in solver report".into()))
    }
}

impl BoundOracle for SubprocessLpOracle {
    fn lp_bound(&self, graph: &dyn GraphView, selected: &[usize]) -> PackingResult<f64> {
        let _guard = match self.lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Err(PackingError::OracleBusy),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        self.busy.store(true, Ordering::Release);

        let model = LpModel::build(graph, selected);
        let result = if model.is_trivial() {
            Ok(model.bound_from_value(model.free.len() as f64))
        } else {
            self.solve(&model).map(|value| model.bound_from_value(value))
        };

        self.busy.store(false, Ordering::Release);
        result
    }

    fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn name(&self) -> &str {
        LP_SUBPROCESS
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
    fn test_model_root() {
        let g = path5();
        let model = LpModel::build(&g, &[]);
        assert_eq!(model.free, vec![0, 1, 2, 3, 4]);
        assert_eq!(model.pairs.len(), g.num_distance2_pairs());
        assert_eq!(model.selected, 0);
    }

    #[test]
    fn test_model_after_selection() {
        let g = path5();
        // Selecting 0 excludes 1 and 2.
        let model = LpModel::build(&g, &[0]);
        assert_eq!(model.free, vec![3, 4]);
        assert_eq!(model.pairs, vec![(3, 4)]);
        assert_eq!(model.bound_from_value(1.0), -2.0);
    }

    #[test]
    fn test_lp_format() {
        let g = path5();
        let text = LpModel::build(&g, &[0]).to_lp_format();
        assert!(text.contains("Maximize\n obj: x3 + x4\n"));
        assert!(text.contains(" c0: x3 + x4 <= 1\n"));
        assert!(text.contains(" 0 <= x4 <= 1\n"));
        assert!(text.ends_with("End\n"));
    }

    #[test]
    fn test_bound_rounding() {
        let g = path5();
        let model = LpModel::build(&g, &[]);
        assert_eq!(model.bound_from_value(2.5), -2.0);
        assert_eq!(model.bound_from_value(2.9999999), -3.0);
        // Never looser than selecting every free node.
        assert_eq!(model.bound_from_value(100.0), -5.0);
    }

    #[test]
    fn test_parse_objective() {
        let glpsol = "Problem:    \nRows:       4\nStatus:     OPTIMAL\nObjective:  obj = 2.5 (MAXimum)\n";
        assert_eq!(parse_objective(glpsol), Some(2.5));

        let scip = "SCIP Status : problem is solved\nobjective value:                    3\n";
        assert_eq!(parse_objective(scip), Some(3.0));

        assert_eq!(parse_objective("no solution\n"), None);
    }

    #[test]
    fn test_trivial_model_skips_solver() {
        // The command would fail if it were run.
        let oracle = SubprocessLpOracle::new(OracleConfig {
            command: "/nonexistent/solver {lp}".into(),
            work_dir: None,
        });
        let g = PackingGraph::from_edges(4, &[]).unwrap();
        assert_eq!(oracle.lp_bound(&g, &[1]).unwrap(), -3.0);
        assert!(!oracle.is_busy());
    }

    #[test]
    fn test_missing_solver_is_an_error() {
        let oracle = SubprocessLpOracle::new(OracleConfig {
            command: "/nonexistent/solver {lp}".into(),
            work_dir: None,
        });
        let err = oracle.lp_bound(&path5(), &[]).unwrap_err();
        assert!(matches!(err, PackingError::Io(_)));
        assert!(!oracle.is_busy());
    }
}
