//! Connect points: probe every point set into a graph.

use std::sync::Arc;

use hashbrown::HashSet;
use parking_lot::Mutex;

use super::compound::CompoundProcessor;
use crate::config::ProcessorConfig;
use crate::graph::{GraphBuilder, GraphOutput, OutputContext};
use crate::model::PointSet;
use crate::mt::TaskManager;
use crate::probe::ProbeEngine;
use crate::{Error, Result};

/// Builds one graph per input point set from the configured probes.
#[derive(Debug, Clone)]
pub struct ConnectPoints {
    config: Arc<ProcessorConfig>,
    manager: TaskManager,
}

impl ConnectPoints {
    pub fn new(config: Arc<ProcessorConfig>, manager: TaskManager) -> Self {
        Self { config, manager }
    }

    /// Probe all points of `points` into packed edge keys.
    ///
    /// Each worker batch fills its own set; the sets are merged once the
    /// batch is done so workers never contend on a shared set.
    pub fn probe(&self, points: &PointSet) -> Result<HashSet<u64>> {
        let engine = Arc::new(ProbeEngine::new(points, &self.config.probing)?);
        let merged = Arc::new(Mutex::new(HashSet::new()));

        let sink = Arc::clone(&merged);
        let group = self.manager.start_ranges("probe-points", engine.len(), self.config.batch_size, move |range| {
            let local = engine.probe_range(range);
            sink.lock().extend(local);
            true
        });
        group.wait();

        super::check_group(&self.manager, &group)?;
        let edges = std::mem::take(&mut *merged.lock());
        Ok(edges)
    }

    /// Probe, resolve intersections and compile one point set.
    pub fn process(&self, points: &PointSet) -> Result<GraphOutput> {
        if points.len() < 2 {
            return Err(Error::NotEnoughPoints { io_index: points.io_index, count: points.len() });
        }

        let edges = self.probe(points)?;
        tracing::debug!(io_index = points.io_index, edges = edges.len(), "probing complete");

        let mut builder = GraphBuilder::new(points.io_index, points.len(), self.config.graph);
        builder.insert_edges(&edges, Some(points.io_index));

        let mut processor =
            CompoundProcessor::start_execution(Arc::clone(&self.config), self.manager.clone(), points.clone(), builder);
        processor.run();
        processor.into_output()
    }

    /// Process every input independently. A rejected input is logged and
    /// suppressed without affecting its siblings.
    pub fn process_all(&self, inputs: &[PointSet]) -> OutputContext {
        let mut context = OutputContext::new();
        for points in inputs {
            match self.process(points) {
                Ok(output) => output.output_to(&mut context),
                Err(e) => {
                    super::report(points.io_index, &e);
                    context.suppress(points.io_index);
                }
            }
        }
        context
    }
}
