//! Bound oracles.
//!
//! An oracle turns the set of nodes selected along a branch into a lower
//! bound on the (minimized) objective of every packing in that subtree.
//! Oracles are looked up by configuration key in an [`OracleRegistry`].

mod lp;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{PackingError, PackingResult};
use crate::model::GraphView;

pub use lp::{parse_objective, LpModel, SubprocessLpOracle};

/// Registry key of the subprocess LP oracle.
pub const LP_SUBPROCESS: &str = "lp-subprocess";

/// External bound oracle.
///
/// Calls are not reentrant: while one branch is being bounded, `is_busy`
/// returns true and further calls fail with [`PackingError::OracleBusy`].
pub trait BoundOracle: Send + Sync {
    /// Lower bound on the objective (negated packing size) over all packings
    /// that contain `selected` and otherwise only use nodes after the last
    /// selected one.
    ///
    /// `selected` is ascending.
    fn lp_bound(&self, graph: &dyn GraphView, selected: &[usize]) -> PackingResult<f64>;

    /// True while a call is in progress.
    fn is_busy(&self) -> bool;

    /// Short name for logging.
    fn name(&self) -> &str;
}

/// Settings passed to oracle constructors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Solver command template. `{lp}` is replaced by the model file,
    /// `{out}` by the report file (stdout is parsed if absent).
    pub command: String,

    /// Directory for temporary model files (system temp dir if None).
    pub work_dir: Option<PathBuf>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            command: "glpsol --lp {lp} -o {out}".to_string(),
            work_dir: None,
        }
    }
}

/// Constructor stored in the registry.
pub type OracleFactory =
    Box<dyn Fn(&OracleConfig) -> PackingResult<Arc<dyn BoundOracle>> + Send + Sync>;

/// Maps configuration keys to oracle constructors.
pub struct OracleRegistry {
    factories: BTreeMap<String, OracleFactory>,
}

impl Default for OracleRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(LP_SUBPROCESS, |config| {
            Ok(Arc::new(SubprocessLpOracle::new(config.clone())) as Arc<dyn BoundOracle>)
        });
        registry
    }
}

impl OracleRegistry {
    /// Registry without any oracle.
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Register (or replace) a constructor under `key`.
    pub fn register<F>(&mut self, key: &str, factory: F)
    where
        F: Fn(&OracleConfig) -> PackingResult<Arc<dyn BoundOracle>> + Send + Sync + 'static,
    {
        self.factories.insert(key.to_string(), Box::new(factory));
    }

    /// Construct the oracle registered under `key`.
    pub fn build(&self, key: &str, config: &OracleConfig) -> PackingResult<Arc<dyn BoundOracle>> {
        let factory = self
            .factories
            .get(key)
            .ok_or_else(|| PackingError::UnknownOracle(key.to_string()))?;
        factory(config)
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}
