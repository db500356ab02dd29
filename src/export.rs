//! JSON export of served views.
//!
//! Files are written next to their destination first and renamed into place,
//! so a reader never sees a half-written document.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use automap_types::Graph;
use serde::Serialize;

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = Path::new(&tmp_name);

    let mut file = std::fs::File::create(tmp)
        .with_context(|| format!("Failed to create {}", tmp.display()))?;
    file.write_all(&json)?;
    file.write_all(b"\n")?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

/// Totals shown alongside an exported graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphSummary {
    pub nodes: usize,
    pub edges: usize,
    /// Physical links behind the edges.
    pub links: usize,
    pub busiest_percent: f64,
}

impl GraphSummary {
    pub fn of(graph: &Graph) -> Self {
        Self {
            nodes: graph.nodes.len(),
            edges: graph.edges.len(),
            links: graph.edges.iter().map(|e| e.link_count()).sum(),
            busiest_percent: graph
                .edges
                .iter()
                .map(|e| e.percent_utilization)
                .fold(0.0, f64::max),
        }
    }
}

#[derive(Serialize)]
struct GraphExport<'a> {
    summary: GraphSummary,
    #[serde(flatten)]
    graph: &'a Graph,
}

/// Write `graph` with its summary to `path`.
pub fn export_graph(graph: &Graph, path: &Path) -> Result<GraphSummary> {
    let summary = GraphSummary::of(graph);
    write_json(
        path,
        &GraphExport {
            summary: summary.clone(),
            graph,
        },
    )?;
    Ok(summary)
}
