//! # Metadata blending
//!
//! When the engine synthesizes or moves points (fusion, edge splits,
//! crossings), their attributes are derived from the points they came from.
//! How each attribute is derived is a [`BlendMode`]; the set of modes is
//! closed and dispatched with a single match.
//!
//! Usage follows three steps:
//!
//! ```text
//! MetadataBlender::new(settings).prepare_for_data(&points)   // snapshot sources
//!   → blend(target, a, b, weight) / blend_weighted(target, samples)  (any thread)
//!   → write(&mut points)                                      // commit once
//! ```

use std::collections::BTreeMap;

use hashbrown::HashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::model::{Attributes, PointSet, Value};

/// How one attribute is derived from its sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    /// Leave the target untouched.
    None,
    /// Take the value of the most heavily weighted source.
    Copy,
    /// Unweighted mean of all sources.
    Average,
    /// Weighted mean; linear interpolation for two sources.
    #[default]
    Weight,
    Min,
    Max,
    Sum,
}

/// Default mode plus per-attribute overrides.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendingSettings {
    pub default_mode: BlendMode,
    pub per_attribute: BTreeMap<String, BlendMode>,
}

impl BlendingSettings {
    pub fn uniform(mode: BlendMode) -> Self {
        Self { default_mode: mode, per_attribute: BTreeMap::new() }
    }

    pub fn with_override(mut self, attribute: impl Into<String>, mode: BlendMode) -> Self {
        self.per_attribute.insert(attribute.into(), mode);
        self
    }

    pub fn mode_for(&self, attribute: &str) -> BlendMode {
        self.per_attribute.get(attribute).copied().unwrap_or(self.default_mode)
    }
}

/// Apply `mode` to weighted samples. `None` means "leave target alone".
pub fn blend_values(mode: BlendMode, samples: &[(&Value, f64)]) -> Option<Value> {
    if samples.is_empty() {
        return None;
    }
    match mode {
        BlendMode::None => None,
        BlendMode::Copy => Some(Value::heaviest(samples)),
        BlendMode::Average => {
            let w = 1.0 / samples.len() as f64;
            let even: Vec<(&Value, f64)> = samples.iter().map(|(v, _)| (*v, w)).collect();
            Some(Value::weighted_sum(&even))
        }
        BlendMode::Weight => {
            let total: f64 = samples.iter().map(|(_, w)| *w).sum();
            if total <= f64::EPSILON {
                return blend_values(BlendMode::Average, samples);
            }
            let normalized: Vec<(&Value, f64)> = samples.iter().map(|(v, w)| (*v, w / total)).collect();
            Some(Value::weighted_sum(&normalized))
        }
        BlendMode::Min => samples.iter().skip(1).fold(Some(samples[0].0.clone()), |acc, (v, _)| {
            acc.map(|a| a.min_of(v))
        }),
        BlendMode::Max => samples.iter().skip(1).fold(Some(samples[0].0.clone()), |acc, (v, _)| {
            acc.map(|a| a.max_of(v))
        }),
        BlendMode::Sum => {
            let ones: Vec<(&Value, f64)> = samples.iter().map(|(v, _)| (*v, 1.0)).collect();
            Some(Value::weighted_sum(&ones))
        }
    }
}

// ============================================================================
// MetadataBlender
// ============================================================================

/// Pending attribute writes for one target point.
type Row = Vec<(String, Value)>;

/// Phase-scoped blender: snapshot the source attributes, blend from any
/// thread, then commit all rows in one [`write`](Self::write).
#[derive(Debug)]
pub struct MetadataBlender {
    settings: BlendingSettings,
    snapshot: Attributes,
    pending: Mutex<HashMap<usize, Row>>,
}

impl MetadataBlender {
    pub fn new(settings: BlendingSettings) -> Self {
        Self { settings, snapshot: Attributes::new(), pending: Mutex::new(HashMap::new()) }
    }

    /// Capture the attribute columns blending reads from.
    pub fn prepare_for_data(mut self, points: &PointSet) -> Self {
        self.snapshot = points.attributes.clone();
        self
    }

    /// Two-source blend; `weight` is the share of `b` (0 → a, 1 → b).
    pub fn blend(&self, target: usize, a: usize, b: usize, weight: f64) {
        let w = weight.clamp(0.0, 1.0);
        self.blend_weighted(target, &[(a, 1.0 - w), (b, w)]);
    }

    /// Blend any number of `(source_index, weight)` samples onto `target`.
    pub fn blend_weighted(&self, target: usize, sources: &[(usize, f64)]) {
        if sources.is_empty() {
            return;
        }
        let mut row = Row::with_capacity(self.snapshot.len());
        for (name, column) in &self.snapshot {
            let samples: Vec<(&Value, f64)> = sources.iter().map(|&(i, w)| (column.get(i), w)).collect();
            if let Some(v) = blend_values(self.settings.mode_for(name), &samples) {
                row.push((name.clone(), v));
            }
        }
        if !row.is_empty() {
            self.pending.lock().insert(target, row);
        }
    }

    /// Commit every blended row. Attribute columns are resized first so
    /// targets appended since the snapshot are writable.
    pub fn write(&self, points: &mut PointSet) {
        points.cleanup_keys();
        let rows = std::mem::take(&mut *self.pending.lock());
        for (target, row) in rows {
            for (name, value) in row {
                if let Some(column) = points.attributes.get_mut(&name) {
                    if target < column.values.len() {
                        column.values[target] = value;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    fn sample_points() -> PointSet {
        let mut set = PointSet::from_positions(0, [DVec3::ZERO, DVec3::X * 10.0, DVec3::X * 5.0]);
        set.set_attribute(
            "height",
            Value::Float(0.0),
            vec![Value::Float(0.0), Value::Float(10.0), Value::Float(-1.0)],
        );
        set.set_attribute(
            "tag",
            Value::Null,
            vec![Value::from("a"), Value::from("b"), Value::Null],
        );
        set
    }

    #[test]
    fn test_linear_interpolation_by_default() {
        let mut set = sample_points();
        let blender = MetadataBlender::new(BlendingSettings::default()).prepare_for_data(&set);
        blender.blend(2, 0, 1, 0.3);
        blender.write(&mut set);
        assert_eq!(set.value("height", 2), Some(&Value::Float(3.0)));
        assert_eq!(set.value("tag", 2), Some(&Value::from("a")));
    }

    #[test]
    fn test_per_attribute_override() {
        let mut set = sample_points();
        let settings = BlendingSettings::default()
            .with_override("height", BlendMode::Max)
            .with_override("tag", BlendMode::None);
        let blender = MetadataBlender::new(settings).prepare_for_data(&set);
        blender.blend(2, 0, 1, 0.3);
        blender.write(&mut set);
        assert_eq!(set.value("height", 2), Some(&Value::Float(10.0)));
        assert_eq!(set.value("tag", 2), Some(&Value::Null));
    }

    #[test]
    fn test_write_reaches_appended_points() {
        let mut set = sample_points();
        let blender = MetadataBlender::new(BlendingSettings::uniform(BlendMode::Average)).prepare_for_data(&set);
        set.push(crate::model::Point::at(DVec3::Y));
        blender.blend_weighted(3, &[(0, 0.9), (1, 0.1)]);
        blender.write(&mut set);
        assert_eq!(set.value("height", 3), Some(&Value::Float(5.0)));
    }

    #[test]
    fn test_zero_weights_fall_back_to_average() {
        let a = Value::Float(2.0);
        let b = Value::Float(4.0);
        assert_eq!(blend_values(BlendMode::Weight, &[(&a, 0.0), (&b, 0.0)]), Some(Value::Float(3.0)));
    }
}
