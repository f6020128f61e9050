//! Processor configuration, read once at construction.

use serde::{Deserialize, Serialize};

use crate::blend::BlendingSettings;
use crate::compound::FuseSettings;
use crate::graph::GraphBuilderSettings;
use crate::intersect::{EdgeEdgeSettings, PointEdgeSettings};
use crate::mt::DEFAULT_BATCH_SIZE;
use crate::probe::ProbingSettings;
use crate::{Error, Result};

/// Everything a processor reads. `None` for an intersection pass disables it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    pub probing: ProbingSettings,
    pub graph: GraphBuilderSettings,
    pub fuse: FuseSettings,
    /// Paths to clusters: fuse all paths into one graph.
    pub fuse_paths: bool,
    /// Paths to clusters: connect the last point back to the first.
    pub closed_loop: bool,
    pub point_edge: Option<PointEdgeSettings>,
    pub edge_edge: Option<EdgeEdgeSettings>,
    /// Blending used for fused and intersection points unless a pass overrides it.
    pub points_blending: BlendingSettings,
    /// Blending of endpoint attributes onto output edge points.
    pub edges_blending: BlendingSettings,
    /// Items per worker batch.
    pub batch_size: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            probing: ProbingSettings::default(),
            graph: GraphBuilderSettings::default(),
            fuse: FuseSettings::default(),
            fuse_paths: false,
            closed_loop: false,
            point_edge: None,
            edge_edge: None,
            points_blending: BlendingSettings::default(),
            edges_blending: BlendingSettings::default(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl ProcessorConfig {
    /// Parse and validate.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch size must be at least 1".into()));
        }
        self.probing.validate()?;
        self.graph.validate()?;
        self.fuse.validate()?;
        if let Some(point_edge) = &self.point_edge {
            point_edge.validate()?;
        }
        if let Some(edge_edge) = &self.edge_edge {
            edge_edge.validate()?;
        }
        for name in self
            .points_blending
            .per_attribute
            .keys()
            .chain(self.edges_blending.per_attribute.keys())
            .chain(self.point_edge.iter().flat_map(|s| s.blending.per_attribute.keys()))
            .chain(self.edge_edge.iter().flat_map(|s| s.blending.per_attribute.keys()))
        {
            if name.trim().is_empty() {
                return Err(Error::InvalidAttribute { name: name.clone(), reason: "empty attribute name".into() });
            }
        }
        Ok(())
    }
}
