//! Graph builder: accumulate, compile, write.

use std::collections::VecDeque;
use std::sync::Arc;

use glam::DVec3;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::output::{GraphOutput, OutputContext, ATTR_CLUSTER_ID, ATTR_EDGE_END, ATTR_EDGE_START};
use super::Graph;
use crate::blend::{BlendingSettings, MetadataBlender};
use crate::model::{split_adjacency_entry, Point, PointSet, Value};
use crate::mt::{TaskGroup, TaskManager};
use crate::{Error, Result};

/// Squared length under which an edge is considered degenerate.
pub const ZERO_LENGTH_SQUARED: f64 = 1e-12;

/// Limits applied to compiled clusters. A cluster outside them is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphBuilderSettings {
    pub min_cluster_nodes: usize,
    pub max_cluster_nodes: usize,
    pub min_cluster_edges: usize,
    pub max_cluster_edges: usize,
    /// Drop nodes left without any valid edge. When off, such nodes become
    /// single-node clusters if the size limits admit them.
    pub prune_isolated: bool,
}

impl Default for GraphBuilderSettings {
    fn default() -> Self {
        Self {
            min_cluster_nodes: 2,
            max_cluster_nodes: usize::MAX,
            min_cluster_edges: 1,
            max_cluster_edges: usize::MAX,
            prune_isolated: true,
        }
    }
}

impl GraphBuilderSettings {
    pub fn accepts(&self, nodes: usize, edges: usize) -> bool {
        (self.min_cluster_nodes..=self.max_cluster_nodes).contains(&nodes)
            && (self.min_cluster_edges..=self.max_cluster_edges).contains(&edges)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_cluster_nodes > self.max_cluster_nodes || self.min_cluster_edges > self.max_cluster_edges {
            return Err(Error::InvalidConfig("cluster size limits are inverted".into()));
        }
        Ok(())
    }
}

/// One connected component of the compiled graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subgraph {
    pub id: usize,
    /// Sorted node indices.
    pub nodes: Vec<u32>,
    /// Sorted edge indices.
    pub edges: Vec<u32>,
}

/// Owns the graph for one processing pass.
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    pub graph: Graph,
    pub settings: GraphBuilderSettings,
    pub compiled_successfully: bool,
    pub subgraphs: Vec<Subgraph>,
    /// Input the graph came from; suppressed on failure.
    pub io_index: usize,
}

impl GraphBuilder {
    /// Builder over `num_points` points, one node each.
    pub fn new(io_index: usize, num_points: usize, settings: GraphBuilderSettings) -> Self {
        Self {
            graph: Graph::with_nodes(num_points),
            settings,
            compiled_successfully: false,
            subgraphs: Vec::new(),
            io_index,
        }
    }

    /// Bulk-add packed edge keys. Duplicates collapse, self-loops are rejected.
    pub fn insert_edges<'a>(&mut self, keys: impl IntoIterator<Item = &'a u64>, io_index: Option<usize>) -> usize {
        self.graph.insert_edge_keys(keys, io_index)
    }

    /// Validate, compute adjacency and partition into clusters.
    ///
    /// Degenerate pieces (zero-length edges, isolated nodes, clusters outside
    /// the size limits) are invalidated in place; no slot is ever removed.
    pub fn compile(&mut self, positions: &[DVec3]) -> bool {
        let graph = &mut self.graph;

        let degenerate: Vec<u32> = graph
            .edges
            .iter()
            .filter(|e| e.valid)
            .filter(|e| {
                let a = positions.get(graph.nodes[e.start as usize].point_index);
                let b = positions.get(graph.nodes[e.end as usize].point_index);
                match (a, b) {
                    (Some(a), Some(b)) => a.distance_squared(*b) <= ZERO_LENGTH_SQUARED,
                    _ => true,
                }
            })
            .map(|e| e.index)
            .collect();
        if !degenerate.is_empty() {
            tracing::warn!(io_index = self.io_index, count = degenerate.len(), "dropping degenerate edges");
        }
        for edge in degenerate {
            graph.invalidate_edge(edge);
        }

        graph.rebuild_adjacency();
        let prune = self.settings.prune_isolated;
        for node in &mut graph.nodes {
            node.valid = !prune || node.degree() > 0;
        }

        self.subgraphs.clear();
        let mut visited = vec![false; graph.nodes.len()];
        let mut queue = VecDeque::new();
        for seed in 0..graph.nodes.len() {
            if visited[seed] || !graph.nodes[seed].valid {
                continue;
            }
            visited[seed] = true;
            queue.push_back(seed as u32);

            let mut nodes = Vec::new();
            let mut edges = Vec::new();
            while let Some(n) = queue.pop_front() {
                nodes.push(n);
                for (other, edge) in graph.nodes[n as usize]
                    .adjacency
                    .iter()
                    .map(|e| split_adjacency_entry(*e))
                {
                    edges.push(edge);
                    if !visited[other as usize] {
                        visited[other as usize] = true;
                        queue.push_back(other);
                    }
                }
            }
            nodes.sort_unstable();
            edges.sort_unstable();
            edges.dedup();

            if self.settings.accepts(nodes.len(), edges.len()) {
                let id = self.subgraphs.len();
                self.subgraphs.push(Subgraph { id, nodes, edges });
            } else {
                tracing::debug!(nodes = nodes.len(), edges = edges.len(), "cluster outside size limits");
                for &edge in &edges {
                    graph.invalidate_edge(edge);
                }
                for &node in &nodes {
                    graph.nodes[node as usize].valid = false;
                }
            }
        }

        self.compiled_successfully = self.subgraphs.iter().any(|s| !s.edges.is_empty());
        if !self.compiled_successfully {
            tracing::warn!(io_index = self.io_index, "graph compiled with no valid edges");
        }
        self.compiled_successfully
    }

    /// Submit [`compile`](Self::compile) to the task manager.
    pub fn compile_async(
        builder: &Arc<RwLock<GraphBuilder>>,
        manager: &TaskManager,
        positions: Vec<DVec3>,
    ) -> Arc<TaskGroup> {
        let target = Arc::clone(builder);
        let liveness = manager.clone();
        manager.start("compile-graph", move || {
            if !liveness.is_alive() {
                return false;
            }
            target.write().compile(&positions)
        })
    }

    /// Materialize the compiled graph. `None` if compilation failed.
    ///
    /// Each edge point sits at its edge's midpoint and carries the two
    /// endpoint rows blended at 0.5 with `edges_blending`.
    pub fn build_output(&self, points: &PointSet, edges_blending: &BlendingSettings) -> Option<GraphOutput> {
        if !self.compiled_successfully {
            return None;
        }

        let graph = &self.graph;
        let mut vertices = PointSet::new(points.io_index);
        let mut dense = vec![usize::MAX; graph.nodes.len()];
        let mut cluster_of = Vec::new();

        for subgraph in &self.subgraphs {
            for &n in &subgraph.nodes {
                let node = &graph.nodes[n as usize];
                if node.point_index >= points.len() {
                    continue;
                }
                dense[n as usize] = points.copy_point_to(node.point_index, &mut vertices);
                cluster_of.push(Value::Int(subgraph.id as i64));
            }
        }
        vertices.cleanup_keys();
        vertices.set_attribute(ATTR_CLUSTER_ID, Value::Int(-1), cluster_of);

        let blender = MetadataBlender::new(edges_blending.clone()).prepare_for_data(&vertices);
        let mut edges = Vec::with_capacity(self.subgraphs.len());
        for subgraph in &self.subgraphs {
            let mut set = PointSet::new(points.io_index);
            let mut starts = Vec::with_capacity(subgraph.edges.len());
            let mut ends = Vec::with_capacity(subgraph.edges.len());
            for &e in &subgraph.edges {
                let edge = &graph.edges[e as usize];
                let (s, t) = (dense[edge.start as usize], dense[edge.end as usize]);
                if s == usize::MAX || t == usize::MAX {
                    continue;
                }
                let a = vertices.points[s].position();
                let b = vertices.points[t].position();
                let target = set.push(Point::at(a.lerp(b, 0.5)));
                blender.blend(target, s, t, 0.5);
                starts.push(Value::from(s));
                ends.push(Value::from(t));
            }
            for (name, column) in &vertices.attributes {
                set.declare_attribute(name.clone(), column.default.clone());
            }
            blender.write(&mut set);
            let n = set.len();
            set.set_attribute(ATTR_EDGE_START, Value::Int(-1), starts);
            set.set_attribute(ATTR_EDGE_END, Value::Int(-1), ends);
            set.set_attribute(ATTR_CLUSTER_ID, Value::Int(-1), vec![Value::Int(subgraph.id as i64); n]);
            edges.push(set);
        }

        Some(GraphOutput { vertices, edges })
    }

    /// Commit the compiled graph into `context`, or record a suppressed
    /// input when compilation failed.
    pub fn write(&self, points: &PointSet, edges_blending: &BlendingSettings, context: &mut OutputContext) -> bool {
        match self.build_output(points, edges_blending) {
            Some(output) => {
                output.output_to(context);
                true
            }
            None => {
                context.suppress(self.io_index);
                false
            }
        }
    }
}
