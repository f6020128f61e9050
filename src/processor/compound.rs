//! The compound processing state machine.
//!
//! ```text
//! Idle ─► FindingPointEdgeIntersections ─► BlendingPointEdgeCrossings ─┐
//!   │                                                                  │
//!   ├──────────────────────────────────────────────────────────────────┤
//!   ▼                                                                  ▼
//! FindingEdgeEdgeIntersections ─► BlendingEdgeEdgeCrossings ─► WritingClusters ─► Compiling ─► Done
//! ```
//!
//! Disabled passes are skipped. Every arrow that submits work returns control
//! to the caller; [`CompoundProcessor::execute`] resumes once the submitted
//! group has completed.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::blend::{BlendingSettings, MetadataBlender};
use crate::config::ProcessorConfig;
use crate::graph::{GraphBuilder, GraphOutput};
use crate::intersect::{Crossing, EdgeEdgeIntersections, EdgeEdgeScan, EdgeSplit, PointEdgeIntersections, PointEdgeScan};
use crate::model::PointSet;
use crate::mt::{TaskGroup, TaskManager};
use crate::{Error, Result};

/// Where the pipeline currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompoundState {
    Idle,
    FindingPointEdgeIntersections,
    BlendingPointEdgeCrossings,
    FindingEdgeEdgeIntersections,
    BlendingEdgeEdgeCrossings,
    WritingClusters,
    Compiling,
    Done,
}

impl fmt::Display for CompoundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How the pipeline ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Pending,
    /// The compiled graph was written.
    Written,
    /// Nothing to write: empty input or failed compilation.
    NoOutput,
    /// The task manager was cancelled; nothing was written.
    Aborted,
}

/// Result of one transition.
#[derive(Debug)]
pub struct Transition {
    pub next: CompoundState,
    pub submitted: Option<Arc<TaskGroup>>,
}

impl Transition {
    fn to(next: CompoundState) -> Self {
        Self { next, submitted: None }
    }

    fn submit(next: CompoundState, group: Arc<TaskGroup>) -> Self {
        Self { next, submitted: Some(group) }
    }
}

/// Data owned by the phase in flight. Replaced wholesale at each transition
/// so nothing carries over from one pass to the next.
enum Phase {
    None,
    PointEdgeScan(Arc<Mutex<Vec<EdgeSplit>>>),
    PointEdgeBlend(Arc<PointEdgeIntersections>, Arc<MetadataBlender>),
    EdgeEdgeScan(Arc<Mutex<Vec<Crossing>>>),
    EdgeEdgeBlend(Arc<EdgeEdgeIntersections>, Arc<MetadataBlender>),
}

/// Drives intersection passes and compilation for one compound point set.
pub struct CompoundProcessor {
    config: Arc<ProcessorConfig>,
    manager: TaskManager,
    state: CompoundState,
    phase: Phase,
    pending: Option<Arc<TaskGroup>>,
    builder: Arc<RwLock<GraphBuilder>>,
    points: Arc<RwLock<PointSet>>,
    outcome: Outcome,
    output: Option<GraphOutput>,
}

impl CompoundProcessor {
    /// Take ownership of a populated builder and its point set.
    pub fn start_execution(
        config: Arc<ProcessorConfig>,
        manager: TaskManager,
        points: PointSet,
        builder: GraphBuilder,
    ) -> Self {
        let empty = points.is_empty();
        let mut processor = Self {
            config,
            manager,
            state: CompoundState::Idle,
            phase: Phase::None,
            pending: None,
            builder: Arc::new(RwLock::new(builder)),
            points: Arc::new(RwLock::new(points)),
            outcome: Outcome::Pending,
            output: None,
        };
        if empty {
            tracing::warn!(io_index = processor.io_index(), "compound point set is empty");
            processor.finish(Outcome::NoOutput);
        }
        processor
    }

    pub fn state(&self) -> CompoundState {
        self.state
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn io_index(&self) -> usize {
        self.builder.read().io_index
    }

    /// Group the machine is waiting on, if any.
    pub fn pending(&self) -> Option<&Arc<TaskGroup>> {
        self.pending.as_ref()
    }

    /// Advance as far as possible without blocking. Returns true once done.
    pub fn execute(&mut self) -> bool {
        loop {
            if self.state == CompoundState::Done {
                return true;
            }
            if self.pending.as_ref().is_some_and(|g| !g.is_done()) {
                return false;
            }
            if !self.manager.is_alive() {
                tracing::debug!(state = %self.state, "task manager cancelled, aborting");
                self.finish(Outcome::Aborted);
                return true;
            }

            let completed = self.pending.take();
            let transition = self.transition(completed);
            tracing::debug!(from = %self.state, to = %transition.next, "compound state transition");
            self.state = transition.next;
            self.pending = transition.submitted;
        }
    }

    /// Run to completion, blocking on each submitted group.
    pub fn run(&mut self) -> Outcome {
        while !self.execute() {
            if let Some(group) = &self.pending {
                group.wait();
            }
        }
        self.outcome
    }

    /// The written graph, or why there is none.
    pub fn into_output(self) -> Result<GraphOutput> {
        let io_index = self.io_index();
        match (self.outcome, self.output) {
            (Outcome::Written, Some(output)) => Ok(output),
            (Outcome::Aborted, _) => Err(Error::Aborted),
            _ => Err(Error::CompilationFailed { io_index }),
        }
    }

    fn finish(&mut self, outcome: Outcome) {
        self.state = CompoundState::Done;
        self.phase = Phase::None;
        self.pending = None;
        self.outcome = outcome;
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    fn transition(&mut self, completed: Option<Arc<TaskGroup>>) -> Transition {
        if let Some(group) = &completed {
            if !group.succeeded() {
                tracing::warn!(task = group.name(), state = %self.state, "task group failed");
                self.phase = Phase::None;
                self.outcome = Outcome::NoOutput;
                return Transition::to(CompoundState::Done);
            }
        }

        match self.state {
            CompoundState::Idle => self.after_idle(),
            CompoundState::FindingPointEdgeIntersections => self.insert_point_edge(),
            CompoundState::BlendingPointEdgeCrossings => {
                if let Phase::PointEdgeBlend(_, blender) = std::mem::replace(&mut self.phase, Phase::None) {
                    blender.write(&mut self.points.write());
                }
                self.after_point_edge()
            }
            CompoundState::FindingEdgeEdgeIntersections => self.insert_edge_edge(),
            CompoundState::BlendingEdgeEdgeCrossings => {
                if let Phase::EdgeEdgeBlend(_, blender) = std::mem::replace(&mut self.phase, Phase::None) {
                    blender.write(&mut self.points.write());
                }
                Transition::to(CompoundState::WritingClusters)
            }
            CompoundState::WritingClusters => {
                let positions = self.points.read().positions();
                let group = GraphBuilder::compile_async(&self.builder, &self.manager, positions);
                Transition::submit(CompoundState::Compiling, group)
            }
            CompoundState::Compiling => {
                let builder = self.builder.read();
                let points = self.points.read();
                self.output = builder.build_output(&points, &self.config.edges_blending);
                self.outcome = if self.output.is_some() { Outcome::Written } else { Outcome::NoOutput };
                drop((builder, points));
                Transition::to(CompoundState::Done)
            }
            CompoundState::Done => Transition::to(CompoundState::Done),
        }
    }

    fn after_idle(&mut self) -> Transition {
        match self.config.point_edge.clone() {
            Some(settings) => {
                let scan = Arc::new(PointEdgeScan::new(&self.builder.read().graph, &self.points.read(), &settings));
                let sink = Arc::new(Mutex::new(Vec::new()));
                self.phase = Phase::PointEdgeScan(Arc::clone(&sink));
                let batch_size = self.config.batch_size;
                let group = self.manager.start_ranges("find-point-edge", scan.len(), batch_size, move |range| {
                    let found = scan.scan(range);
                    sink.lock().extend(found);
                    true
                });
                Transition::submit(CompoundState::FindingPointEdgeIntersections, group)
            }
            None => self.after_point_edge(),
        }
    }

    fn after_point_edge(&mut self) -> Transition {
        match self.config.edge_edge.clone() {
            Some(settings) => {
                let scan = Arc::new(EdgeEdgeScan::new(&self.builder.read().graph, &self.points.read(), &settings));
                let sink = Arc::new(Mutex::new(Vec::new()));
                self.phase = Phase::EdgeEdgeScan(Arc::clone(&sink));
                let batch_size = self.config.batch_size;
                let group = self.manager.start_ranges("find-edge-edge", scan.len(), batch_size, move |range| {
                    let found = scan.scan(range);
                    sink.lock().extend(found);
                    true
                });
                Transition::submit(CompoundState::FindingEdgeEdgeIntersections, group)
            }
            None => Transition::to(CompoundState::WritingClusters),
        }
    }

    fn blending_for(&self, use_custom: bool, custom: &BlendingSettings) -> BlendingSettings {
        if use_custom { custom.clone() } else { self.config.points_blending.clone() }
    }

    fn insert_point_edge(&mut self) -> Transition {
        let Phase::PointEdgeScan(sink) = std::mem::replace(&mut self.phase, Phase::None) else {
            return self.after_point_edge();
        };
        let Some(settings) = self.config.point_edge.clone() else { return self.after_point_edge() };

        let splits = std::mem::take(&mut *sink.lock());
        let mut intersections = PointEdgeIntersections::new(settings, splits);
        if intersections.is_empty() {
            return self.after_point_edge();
        }
        {
            let mut builder = self.builder.write();
            let mut points = self.points.write();
            intersections.insert(&mut builder.graph, &mut points);
        }

        let blending =
            self.blending_for(intersections.settings.use_custom_blending, &intersections.settings.blending);
        let blender = Arc::new(MetadataBlender::new(blending).prepare_for_data(&self.points.read()));
        let intersections = Arc::new(intersections);
        self.phase = Phase::PointEdgeBlend(Arc::clone(&intersections), Arc::clone(&blender));

        let count = intersections.blend_count();
        let group = self.manager.start_ranges("blend-point-edge", count, self.config.batch_size, move |range| {
            for i in range {
                intersections.blend(i, &blender);
            }
            true
        });
        Transition::submit(CompoundState::BlendingPointEdgeCrossings, group)
    }

    fn insert_edge_edge(&mut self) -> Transition {
        let Phase::EdgeEdgeScan(sink) = std::mem::replace(&mut self.phase, Phase::None) else {
            return Transition::to(CompoundState::WritingClusters);
        };
        let Some(settings) = self.config.edge_edge.clone() else {
            return Transition::to(CompoundState::WritingClusters);
        };

        let crossings = std::mem::take(&mut *sink.lock());
        let mut intersections = EdgeEdgeIntersections::new(settings, crossings);
        if intersections.is_empty() {
            return Transition::to(CompoundState::WritingClusters);
        }
        {
            let mut builder = self.builder.write();
            let mut points = self.points.write();
            intersections.insert(&mut builder.graph, &mut points);
        }

        let blending =
            self.blending_for(intersections.settings.use_custom_blending, &intersections.settings.blending);
        let blender = Arc::new(MetadataBlender::new(blending).prepare_for_data(&self.points.read()));
        let intersections = Arc::new(intersections);
        self.phase = Phase::EdgeEdgeBlend(Arc::clone(&intersections), Arc::clone(&blender));

        let count = intersections.blend_count();
        let group = self.manager.start_ranges("blend-edge-edge", count, self.config.batch_size, move |range| {
            for i in range {
                intersections.blend(i, &blender);
            }
            true
        });
        Transition::submit(CompoundState::BlendingEdgeEdgeCrossings, group)
    }
}

impl fmt::Debug for CompoundProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompoundProcessor")
            .field("state", &self.state)
            .field("outcome", &self.outcome)
            .field("pending", &self.pending.as_ref().map(|g| g.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilderSettings;
    use crate::intersect::{EdgeEdgeSettings, PointEdgeSettings};
    use crate::model::edge_key;
    use crate::mt::Executor;
    use glam::DVec3;

    fn cross_input() -> (PointSet, GraphBuilder) {
        let points = PointSet::from_positions(
            0,
            [DVec3::ZERO, DVec3::X * 10.0, DVec3::new(5.0, -5.0, 0.0), DVec3::new(5.0, 5.0, 0.0), DVec3::X * 2.0],
        );
        let mut builder = GraphBuilder::new(0, points.len(), GraphBuilderSettings::default());
        builder.insert_edges(&[edge_key(0, 1), edge_key(2, 3)], Some(0));
        (points, builder)
    }

    fn config(point_edge: bool, edge_edge: bool) -> Arc<ProcessorConfig> {
        Arc::new(ProcessorConfig {
            point_edge: point_edge.then(PointEdgeSettings::default),
            edge_edge: edge_edge.then(EdgeEdgeSettings::default),
            ..ProcessorConfig::default()
        })
    }

    /// Executor that queues jobs until the test releases them.
    #[derive(Default, Clone)]
    struct Deferred(Arc<Mutex<Vec<crate::mt::Job>>>);

    impl Executor for Deferred {
        fn execute(&self, job: crate::mt::Job) {
            self.0.lock().push(job);
        }
    }

    impl Deferred {
        fn drain(&self) -> usize {
            let jobs = std::mem::take(&mut *self.0.lock());
            let n = jobs.len();
            for job in jobs {
                job();
            }
            n
        }
    }

    #[test]
    fn test_full_pipeline_inline() {
        let (points, builder) = cross_input();
        let mut processor =
            CompoundProcessor::start_execution(config(true, true), TaskManager::inline(), points, builder);
        assert!(processor.execute());
        assert_eq!(processor.outcome(), Outcome::Written);

        let output = processor.into_output().unwrap();
        // 5 input points + 1 crossing; node 4 splits edge 0 at x = 2.
        assert_eq!(output.vertex_count(), 6);
        assert_eq!(output.edge_count(), 5);
    }

    #[test]
    fn test_states_visited_in_order() {
        let deferred = Deferred::default();
        let manager = TaskManager::new(deferred.clone());
        let (points, builder) = cross_input();
        let mut processor = CompoundProcessor::start_execution(config(true, true), manager, points, builder);

        let mut visited = vec![processor.state()];
        while !processor.execute() {
            visited.push(processor.state());
            assert!(deferred.drain() > 0);
        }
        visited.push(processor.state());

        assert_eq!(
            visited,
            vec![
                CompoundState::Idle,
                CompoundState::FindingPointEdgeIntersections,
                CompoundState::BlendingPointEdgeCrossings,
                CompoundState::FindingEdgeEdgeIntersections,
                CompoundState::BlendingEdgeEdgeCrossings,
                CompoundState::Compiling,
                CompoundState::Done,
            ]
        );
    }

    #[test]
    fn test_disabled_passes_are_skipped() {
        let deferred = Deferred::default();
        let manager = TaskManager::new(deferred.clone());
        let (points, builder) = cross_input();
        let mut processor = CompoundProcessor::start_execution(config(false, false), manager, points, builder);

        assert!(!processor.execute());
        assert_eq!(processor.state(), CompoundState::Compiling);
        deferred.drain();
        assert!(processor.execute());
        assert_eq!(processor.outcome(), Outcome::Written);
        assert_eq!(processor.into_output().unwrap().edge_count(), 2);
    }

    #[test]
    fn test_cancel_mid_pipeline_aborts_silently() {
        let deferred = Deferred::default();
        let manager = TaskManager::new(deferred.clone());
        let (points, builder) = cross_input();
        let mut processor = CompoundProcessor::start_execution(config(true, true), manager.clone(), points, builder);

        assert!(!processor.execute());
        manager.cancel();
        deferred.drain();
        assert!(processor.execute());
        assert_eq!(processor.outcome(), Outcome::Aborted);
        assert!(matches!(processor.into_output(), Err(Error::Aborted)));
    }

    #[test]
    fn test_empty_points_no_output() {
        let builder = GraphBuilder::new(3, 0, GraphBuilderSettings::default());
        let mut processor =
            CompoundProcessor::start_execution(config(true, true), TaskManager::inline(), PointSet::new(3), builder);
        assert!(processor.execute());
        assert_eq!(processor.outcome(), Outcome::NoOutput);
        assert!(matches!(processor.into_output(), Err(Error::CompilationFailed { io_index: 3 })));
    }

    #[test]
    fn test_failed_compile_no_output() {
        let points = PointSet::from_positions(0, [DVec3::ZERO, DVec3::X]);
        let builder = GraphBuilder::new(0, 2, GraphBuilderSettings::default());
        let mut processor =
            CompoundProcessor::start_execution(config(false, false), TaskManager::inline(), points, builder);
        assert_eq!(processor.run(), Outcome::NoOutput);
    }
}
