//! DIMACS edge-list reader.
//!
//! Accepts the graph-coloring flavour of the format:
//!
//! ```text
//! c comment
//! p edge <nodes> <edges>
//! e <u> <v>
//! ```
//!
//! Node indices are 1-based in the file and 0-based in the returned graph.

use anyhow::{anyhow, bail, Context, Result};
use packing_search::PackingGraph;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Parsed DIMACS file (before conversion to a packing graph).
#[derive(Debug, Clone)]
pub struct DimacsGraph {
    pub num_nodes: usize,
    pub edges: Vec<(usize, usize)>,
}

impl DimacsGraph {
    /// Parse a DIMACS file from disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())
            .with_context(|| format!("Failed to open DIMACS file: {:?}", path.as_ref()))?;
        Self::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse DIMACS file: {:?}", path.as_ref()))
    }

    /// Parse DIMACS text from any buffered reader.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut header: Option<(usize, usize)> = None;
        let mut edges = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("Error reading line {}", line_num + 1))?;
            let mut tokens = line.split_whitespace();
            let Some(kind) = tokens.next() else {
                continue;
            };

            match kind {
                "c" => {}
                "p" => {
                    if header.is_some() {
                        bail!("Duplicate problem line at line {}", line_num + 1);
                    }
                    let format = tokens
                        .next()
                        .ok_or_else(|| anyhow!("Missing format on problem line {}", line_num + 1))?;
                    if format != "edge" && format != "col" {
                        bail!("Unsupported DIMACS format '{}'", format);
                    }
                    let nodes = parse_count(tokens.next(), "node count", line_num)?;
                    let declared = parse_count(tokens.next(), "edge count", line_num)?;
                    header = Some((nodes, declared));
                }
                "e" => {
                    let (nodes, _) = header
                        .ok_or_else(|| anyhow!("Edge before problem line at line {}", line_num + 1))?;
                    let u = parse_node(tokens.next(), nodes, line_num)?;
                    let v = parse_node(tokens.next(), nodes, line_num)?;
                    edges.push((u, v));
                }
                other => bail!("Unknown line type '{}' at line {}", other, line_num + 1),
            }
        }

        let (num_nodes, declared_edges) =
            header.ok_or_else(|| anyhow!("Missing problem line 'p edge <nodes> <edges>'"))?;
        if edges.len() != declared_edges {
            log::warn!(
                "DIMACS header declares {} edges, found {}",
                declared_edges,
                edges.len()
            );
        }

        Ok(Self { num_nodes, edges })
    }

    /// Build the packing graph (distance-2 neighborhoods).
    pub fn into_packing_graph(self) -> Result<PackingGraph> {
        PackingGraph::from_edges(self.num_nodes, &self.edges)
            .context("Failed to build distance-2 neighborhoods")
    }
}

fn parse_count(token: Option<&str>, what: &str, line_num: usize) -> Result<usize> {
    let token = token.ok_or_else(|| anyhow!("Missing {} at line {}", what, line_num + 1))?;
    token
        .parse()
        .with_context(|| format!("Invalid {} '{}' at line {}", what, token, line_num + 1))
}

fn parse_node(token: Option<&str>, nodes: usize, line_num: usize) -> Result<usize> {
    let index = parse_count(token, "edge endpoint", line_num)?;
    if index == 0 || index > nodes {
        bail!(
            "Edge endpoint {} outside 1..={} at line {}",
            index,
            nodes,
            line_num + 1
        );
    }
    Ok(index - 1)
}
