//! Paths to clusters: turn ordered paths into graphs.
//!
//! | Mode | Behavior |
//! |------|----------|
//! | non-fusing | every path becomes its own graph, compiled independently |
//! | fusing | all paths feed one [`CompoundGraph`]; coincident vertices merge into shared nodes |

use std::sync::Arc;

use glam::DVec3;

use super::compound::CompoundProcessor;
use crate::compound::CompoundGraph;
use crate::config::ProcessorConfig;
use crate::graph::{GraphBuilder, GraphOutput, OutputContext};
use crate::model::{edge_key, PointSet};
use crate::mt::TaskManager;
use crate::{Error, Result};

/// `io_index` given to the fused point set, which has no single source.
pub const COMPOUND_IO_INDEX: usize = usize::MAX;

/// Edge keys of a path: `i → i + 1`, plus `last → 0` when closed.
pub fn path_edges(len: usize, closed_loop: bool) -> Vec<u64> {
    if len < 2 {
        return Vec::new();
    }
    let mut keys: Vec<u64> = (0..len - 1).map(|i| edge_key(i as u32, i as u32 + 1)).collect();
    if closed_loop && len > 2 {
        keys.push(edge_key(len as u32 - 1, 0));
    }
    keys
}

#[derive(Debug, Clone)]
pub struct PathsToClusters {
    config: Arc<ProcessorConfig>,
    manager: TaskManager,
}

impl PathsToClusters {
    pub fn new(config: Arc<ProcessorConfig>, manager: TaskManager) -> Self {
        Self { config, manager }
    }

    /// Run in the mode the configuration selects.
    pub fn process_all(&self, paths: &[PointSet]) -> OutputContext {
        if self.config.fuse_paths {
            let mut context = OutputContext::new();
            match self.process_fused(paths) {
                Ok(output) => output.output_to(&mut context),
                Err(e) => {
                    super::report(COMPOUND_IO_INDEX, &e);
                    context.suppress(COMPOUND_IO_INDEX);
                }
            }
            context
        } else {
            self.process_separately(paths)
        }
    }

    // ========================================================================
    // Non-fusing
    // ========================================================================

    /// One graph per path. All paths compile concurrently, output is
    /// written in input order.
    pub fn process_separately(&self, paths: &[PointSet]) -> OutputContext {
        let mut context = OutputContext::new();
        let mut jobs = Vec::with_capacity(paths.len());

        for path in paths {
            if path.len() < 2 {
                let e = Error::NotEnoughPoints { io_index: path.io_index, count: path.len() };
                super::report(path.io_index, &e);
                context.suppress(path.io_index);
                continue;
            }
            let mut builder = GraphBuilder::new(path.io_index, path.len(), self.config.graph);
            builder.insert_edges(&path_edges(path.len(), self.config.closed_loop), Some(path.io_index));

            let builder = Arc::new(parking_lot::RwLock::new(builder));
            let group = GraphBuilder::compile_async(&builder, &self.manager, path.positions());
            jobs.push((path, builder, group));
        }

        for (path, builder, group) in jobs {
            group.wait();
            if !self.manager.is_alive() {
                tracing::debug!(io_index = path.io_index, "task manager cancelled, dropping path output");
                context.suppress(path.io_index);
                continue;
            }
            if !builder.read().write(path, &self.config.edges_blending, &mut context) {
                tracing::warn!(io_index = path.io_index, "path produced no valid cluster");
            }
        }
        context
    }

    // ========================================================================
    // Fusing
    // ========================================================================

    /// Fuse every path into one compound graph and run it through the
    /// compound processor.
    pub fn process_fused(&self, paths: &[PointSet]) -> Result<GraphOutput> {
        let compound = Arc::new(CompoundGraph::new(self.config.fuse));
        let closed_loop = self.config.closed_loop;

        let mut groups = Vec::new();
        let mut skipped = Vec::new();
        for path in paths {
            if path.len() < 2 {
                skipped.push(path);
                continue;
            }
            let positions: Arc<Vec<DVec3>> = Arc::new(path.positions());
            let io_index = path.io_index;
            let target = Arc::clone(&compound);
            let last = positions.len() - 1;
            groups.push(self.manager.start_ranges(
                "fuse-path",
                positions.len(),
                self.config.batch_size,
                move |range| {
                    for i in range {
                        if i < last {
                            target.insert_edge(positions[i], io_index, i, positions[i + 1], io_index, i + 1);
                        } else if closed_loop && last > 1 {
                            target.insert_edge(positions[last], io_index, last, positions[0], io_index, 0);
                        }
                    }
                    true
                },
            ));
        }

        // With nothing usable the caller reports the compound failure once.
        if groups.is_empty() {
            let count = skipped.iter().map(|p| p.len()).sum();
            return Err(Error::NotEnoughPoints { io_index: COMPOUND_IO_INDEX, count });
        }
        for path in skipped {
            let e = Error::NotEnoughPoints { io_index: path.io_index, count: path.len() };
            super::report(path.io_index, &e);
        }

        for group in &groups {
            group.wait();
        }
        for group in &groups {
            super::check_group(&self.manager, group)?;
        }

        let fused = compound.finalize();
        let points = fused.build_points(COMPOUND_IO_INDEX, paths, &self.config.points_blending);

        let mut builder = GraphBuilder::new(COMPOUND_IO_INDEX, fused.nodes.len(), self.config.graph);
        for edge in &fused.edges {
            builder.graph.insert_edge(edge.start, edge.end, Some(edge.io_index));
        }

        let mut processor =
            CompoundProcessor::start_execution(Arc::clone(&self.config), self.manager.clone(), points, builder);
        processor.run();
        processor.into_output()
    }
}
