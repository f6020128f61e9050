//! # Spatial probing
//!
//! Turns an unordered point set into candidate edges. Every generator point
//! runs each configured probe against its neighbourhood; the result is a set
//! of packed undirected edge keys.
//!
//! | Probe | Processing | Picks |
//! |-------|------------|-------|
//! | [`ProbeKind::Closest`] | shared | the N nearest candidates in radius |
//! | [`ProbeKind::AllInRange`] | shared | every candidate in radius |
//! | [`ProbeKind::Direction`] | chained or shared | the single best candidate inside a cone |
//! | [`ProbeKind::Index`] | direct | a point chosen by index arithmetic |
//!
//! Chained probes share one octree query per origin:
//!
//! ```text
//! prepare_best(origin)                        for every chained probe
//!   octree query ─► process_candidate_chained  for every candidate × chained probe
//!   process_best(best, candidates)            for every chained probe
//! sort candidates by distance
//!   process_candidates(sorted)                for every shared probe
//! process_node(origin)                        for every direct probe
//! ```
//!
//! Radius convention: a candidate at exactly the search radius is included
//! (`d² <= r²`).

pub mod candidate;
pub mod engine;
pub mod op;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub use candidate::{BestCandidate, Candidate};
pub use engine::ProbeEngine;
pub use op::ProbeOp;

// ============================================================================
// Settings
// ============================================================================

/// What a direction probe prefers among candidates inside its cone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionFavor {
    /// Best aligned with the probe direction.
    Dot,
    /// Closest to the origin.
    #[default]
    Dist,
}

/// How an index probe picks its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum IndexMode {
    /// `origin + offset`
    Offset(i64),
    /// A fixed point index.
    Target(usize),
}

/// Where a direction probe's direction comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionSource {
    Constant(DVec3),
    /// Per-point direction read from a vector attribute.
    Attribute(String),
}

impl From<DVec3> for DirectionSource {
    fn from(direction: DVec3) -> Self {
        DirectionSource::Constant(direction)
    }
}

fn default_true() -> bool {
    true
}

/// The closed set of probe behaviors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeKind {
    Closest {
        max_connections: usize,
    },
    AllInRange,
    Direction {
        direction: DirectionSource,
        /// Full cone angle in degrees; candidates within half of it pass.
        max_angle: f64,
        #[serde(default)]
        favor: DirectionFavor,
        /// Rotate `direction` by the origin point's rotation.
        #[serde(default = "default_true")]
        transform_direction: bool,
        /// Evaluate candidates during the octree query instead of afterwards.
        #[serde(default)]
        chained: bool,
    },
    Index {
        mode: IndexMode,
        /// Wrap out-of-range targets around the point count instead of dropping them.
        #[serde(default)]
        wrap: bool,
    },
}

/// Where a probe's search radius comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchRadius {
    Constant(f64),
    /// Per-point radius read from a numeric attribute.
    Attribute(String),
}

impl Default for SearchRadius {
    fn default() -> Self {
        SearchRadius::Constant(100.0)
    }
}

/// One configured probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeSettings {
    #[serde(flatten)]
    pub kind: ProbeKind,
    #[serde(default)]
    pub radius: SearchRadius,
}

impl ProbeSettings {
    pub fn new(kind: ProbeKind, radius: SearchRadius) -> Self {
        Self { kind, radius }
    }

    pub fn validate(&self) -> Result<()> {
        match &self.radius {
            SearchRadius::Constant(r) if !r.is_finite() || *r < 0.0 => {
                return Err(Error::InvalidConfig(format!("search radius must be a finite positive number, got {r}")));
            }
            SearchRadius::Attribute(name) if name.trim().is_empty() => {
                return Err(Error::InvalidAttribute { name: name.clone(), reason: "empty attribute name".into() });
            }
            _ => {}
        }
        match &self.kind {
            ProbeKind::Direction { direction, max_angle, .. } => {
                match direction {
                    DirectionSource::Constant(d) if !d.is_finite() || d.length_squared() <= f64::EPSILON => {
                        return Err(Error::InvalidConfig("probe direction must be a non-zero vector".into()));
                    }
                    DirectionSource::Attribute(name) if name.trim().is_empty() => {
                        return Err(Error::InvalidAttribute {
                            name: name.clone(),
                            reason: "empty attribute name".into(),
                        });
                    }
                    _ => {}
                }
                if !(0.0..=360.0).contains(max_angle) {
                    return Err(Error::InvalidConfig(format!("max angle must be within [0, 360], got {max_angle}")));
                }
            }
            ProbeKind::Closest { max_connections: 0 } => {
                return Err(Error::InvalidConfig("closest probe needs at least one connection".into()));
            }
            _ => {}
        }
        Ok(())
    }
}

/// Flattens positions onto the plane through the origin with this normal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectionSettings {
    pub normal: DVec3,
}

impl Default for ProjectionSettings {
    fn default() -> Self {
        Self { normal: DVec3::Z }
    }
}

impl ProjectionSettings {
    pub fn project(&self, p: DVec3) -> DVec3 {
        let n = self.normal.normalize_or_zero();
        p - n * p.dot(n)
    }
}

/// Everything the probe engine reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbingSettings {
    pub probes: Vec<ProbeSettings>,
    /// Keep only the first of several edges leaving an origin in the same direction.
    pub prevent_stacking: bool,
    /// Direction quantization step used by stacking prevention.
    pub stacking_tolerance: f64,
    /// Truthy attribute marking points allowed to originate probes.
    pub generators: Option<String>,
    /// Truthy attribute marking points allowed to be probed.
    pub connectables: Option<String>,
    pub projection: Option<ProjectionSettings>,
}

impl Default for ProbingSettings {
    fn default() -> Self {
        Self {
            probes: Vec::new(),
            prevent_stacking: false,
            stacking_tolerance: 0.01,
            generators: None,
            connectables: None,
            projection: None,
        }
    }
}

impl ProbingSettings {
    pub fn with_probe(mut self, probe: ProbeSettings) -> Self {
        self.probes.push(probe);
        self
    }

    pub fn validate(&self) -> Result<()> {
        for probe in &self.probes {
            probe.validate()?;
        }
        if self.prevent_stacking && !(self.stacking_tolerance.is_finite() && self.stacking_tolerance > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "stacking tolerance must be positive, got {}",
                self.stacking_tolerance
            )));
        }
        for name in [&self.generators, &self.connectables].into_iter().flatten() {
            if name.trim().is_empty() {
                return Err(Error::InvalidAttribute { name: name.clone(), reason: "empty attribute name".into() });
            }
        }
        if let Some(projection) = &self.projection {
            if !projection.normal.is_finite() || projection.normal.length_squared() <= f64::EPSILON {
                return Err(Error::InvalidConfig("projection normal must be a non-zero vector".into()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_settings_from_json() {
        let json = r#"{
            "kind": "direction",
            "direction": {"constant": [1.0, 0.0, 0.0]},
            "max_angle": 45.0,
            "radius": {"constant": 2.0}
        }"#;
        let probe: ProbeSettings = serde_json::from_str(json).unwrap();
        assert_eq!(probe.radius, SearchRadius::Constant(2.0));
        assert!(matches!(
            probe.kind,
            ProbeKind::Direction { favor: DirectionFavor::Dist, chained: false, transform_direction: true, .. }
        ));

        let json = r#"{"kind":"direction","direction":{"attribute":"heading"},"max_angle":30.0}"#;
        let probe: ProbeSettings = serde_json::from_str(json).unwrap();
        assert!(matches!(
            &probe.kind,
            ProbeKind::Direction { direction: DirectionSource::Attribute(name), .. } if name == "heading"
        ));
    }

    #[test]
    fn test_validate_rejects_bad_probes() {
        let zero_dir = ProbeSettings::new(
            ProbeKind::Direction {
                direction: DVec3::ZERO.into(),
                max_angle: 45.0,
                favor: DirectionFavor::Dot,
                transform_direction: false,
                chained: true,
            },
            SearchRadius::Constant(1.0),
        );
        assert!(zero_dir.validate().is_err());

        let negative = ProbeSettings::new(ProbeKind::AllInRange, SearchRadius::Constant(-1.0));
        assert!(negative.validate().is_err());

        let blank = ProbeSettings::new(ProbeKind::AllInRange, SearchRadius::Attribute("  ".into()));
        assert!(matches!(blank.validate(), Err(Error::InvalidAttribute { .. })));

        let blank_direction = ProbeSettings::new(
            ProbeKind::Direction {
                direction: DirectionSource::Attribute(String::new()),
                max_angle: 45.0,
                favor: DirectionFavor::Dist,
                transform_direction: true,
                chained: false,
            },
            SearchRadius::Constant(1.0),
        );
        assert!(matches!(blank_direction.validate(), Err(Error::InvalidAttribute { .. })));
    }

    #[test]
    fn test_projection_flattens() {
        let p = ProjectionSettings::default().project(DVec3::new(1.0, 2.0, 3.0));
        assert_eq!(p, DVec3::new(1.0, 2.0, 0.0));
    }
}
