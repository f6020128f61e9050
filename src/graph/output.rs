//! Output collections handed back to the host.

use crate::model::PointSet;

/// Edge start node (dense index into the vertex collection).
pub const ATTR_EDGE_START: &str = "edge_start";
/// Edge end node (dense index into the vertex collection).
pub const ATTR_EDGE_END: &str = "edge_end";
/// Cluster (connected subgraph) a vertex or edge belongs to.
pub const ATTR_CLUSTER_ID: &str = "cluster_id";

/// One compiled graph: its vertices plus one edge collection per cluster.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphOutput {
    pub vertices: PointSet,
    pub edges: Vec<PointSet>,
}

impl GraphOutput {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.iter().map(PointSet::len).sum()
    }

    pub fn cluster_count(&self) -> usize {
        self.edges.len()
    }

    /// `(start, end)` vertex pairs across every cluster, in output order.
    pub fn edge_endpoints(&self) -> Vec<(usize, usize)> {
        self.edges
            .iter()
            .flat_map(|set| {
                (0..set.len()).filter_map(move |i| {
                    let start = set.value(ATTR_EDGE_START, i)?.as_int()?;
                    let end = set.value(ATTR_EDGE_END, i)?.as_int()?;
                    Some((start as usize, end as usize))
                })
            })
            .collect()
    }

    pub fn output_to(self, context: &mut OutputContext) {
        context.vertices.push(self.vertices);
        context.edges.extend(self.edges);
    }
}

/// Everything a run produced, plus the inputs that ended with no output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputContext {
    pub vertices: Vec<PointSet>,
    pub edges: Vec<PointSet>,
    pub suppressed: Vec<usize>,
}

impl OutputContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that input `io_index` produced nothing.
    pub fn suppress(&mut self, io_index: usize) {
        if !self.suppressed.contains(&io_index) {
            self.suppressed.push(io_index);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() && self.edges.is_empty()
    }
}
