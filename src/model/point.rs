//! Points, transforms, and the point collection that owns them.

use std::collections::BTreeMap;

use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

use super::Value;
use crate::spatial::Aabb;
use crate::{Error, Result};

/// Location / rotation / scale of a point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub location: DVec3,
    pub rotation: DQuat,
    pub scale: DVec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self { location: DVec3::ZERO, rotation: DQuat::IDENTITY, scale: DVec3::ONE }
    }
}

impl Transform {
    pub fn from_location(location: DVec3) -> Self {
        Self { location, ..Self::default() }
    }
}

/// A positioned entity. Attributes live on the owning [`PointSet`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub transform: Transform,
    /// Local half-size, scaled by the transform.
    pub extents: DVec3,
}

impl Default for Point {
    fn default() -> Self {
        Self { transform: Transform::default(), extents: DVec3::splat(0.5) }
    }
}

impl Point {
    pub fn at(location: DVec3) -> Self {
        Self { transform: Transform::from_location(location), ..Self::default() }
    }

    #[inline]
    pub fn position(&self) -> DVec3 {
        self.transform.location
    }

    pub fn bounding_box(&self) -> Aabb {
        let half = self.extents * self.transform.scale.abs();
        Aabb::new(self.position() - half, self.position() + half)
    }
}

// ============================================================================
// Attribute bag
// ============================================================================

/// One named attribute: a default plus one value per point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeColumn {
    pub default: Value,
    pub values: Vec<Value>,
}

impl AttributeColumn {
    pub fn get(&self, index: usize) -> &Value {
        self.values.get(index).unwrap_or(&self.default)
    }
}

/// Name → column. Ordered so attribute iteration is deterministic.
pub type Attributes = BTreeMap<String, AttributeColumn>;

// ============================================================================
// PointSet
// ============================================================================

/// An ordered collection of points plus their attribute bag.
///
/// `io_index` identifies which host input the collection came from; it is
/// carried onto edges so output can be traced back to sources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointSet {
    pub io_index: usize,
    pub points: Vec<Point>,
    pub attributes: Attributes,
}

impl PointSet {
    pub fn new(io_index: usize) -> Self {
        Self { io_index, ..Self::default() }
    }

    pub fn from_positions(io_index: usize, positions: impl IntoIterator<Item = DVec3>) -> Self {
        Self {
            io_index,
            points: positions.into_iter().map(Point::at).collect(),
            attributes: Attributes::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn positions(&self) -> Vec<DVec3> {
        self.points.iter().map(Point::position).collect()
    }

    /// Append a point; attribute columns are NOT resized, call
    /// [`cleanup_keys`](Self::cleanup_keys) once the batch is done.
    pub fn push(&mut self, point: Point) -> usize {
        self.points.push(point);
        self.points.len() - 1
    }

    /// Create (or replace) an attribute with one value per point.
    pub fn set_attribute(&mut self, name: impl Into<String>, default: Value, values: Vec<Value>) {
        self.attributes.insert(name.into(), AttributeColumn { default, values });
        self.cleanup_keys();
    }

    /// Declare an attribute filled with its default value.
    pub fn declare_attribute(&mut self, name: impl Into<String>, default: Value) {
        let values = vec![default.clone(); self.points.len()];
        self.attributes.insert(name.into(), AttributeColumn { default, values });
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeColumn> {
        self.attributes.get(name)
    }

    pub fn value(&self, name: &str, index: usize) -> Option<&Value> {
        self.attributes.get(name).map(|c| c.get(index))
    }

    fn column(&self, name: &str) -> Result<&AttributeColumn> {
        self.attributes.get(name).ok_or_else(|| Error::InvalidAttribute {
            name: name.to_string(),
            reason: "attribute does not exist".into(),
        })
    }

    /// Read a numeric attribute as one f64 per point.
    pub fn read_floats(&self, name: &str) -> Result<Vec<f64>> {
        let column = self.column(name)?;
        (0..self.points.len())
            .map(|i| {
                let v = column.get(i);
                v.as_float().ok_or_else(|| Error::InvalidAttribute {
                    name: name.to_string(),
                    reason: format!("expected a number, got {}", v.type_name()),
                })
            })
            .collect()
    }

    /// Read a vector attribute as one `DVec3` per point. Scalars splat.
    pub fn read_vectors(&self, name: &str) -> Result<Vec<DVec3>> {
        let column = self.column(name)?;
        (0..self.points.len())
            .map(|i| {
                let v = column.get(i);
                v.as_vector().ok_or_else(|| Error::InvalidAttribute {
                    name: name.to_string(),
                    reason: format!("expected a vector, got {}", v.type_name()),
                })
            })
            .collect()
    }

    /// Resize every attribute column to the current point count.
    ///
    /// Must run whenever points were added or removed, before anything
    /// reads or blends attributes again.
    pub fn cleanup_keys(&mut self) {
        let n = self.points.len();
        for column in self.attributes.values_mut() {
            column.values.resize(n, column.default.clone());
        }
    }

    /// Copy the point at `index` and its attribute row into `target`.
    pub fn copy_point_to(&self, index: usize, target: &mut PointSet) -> usize {
        let out = target.push(self.points[index]);
        for (name, column) in &self.attributes {
            let dst = target
                .attributes
                .entry(name.clone())
                .or_insert_with(|| AttributeColumn { default: column.default.clone(), values: Vec::new() });
            dst.values.resize(out, dst.default.clone());
            dst.values.push(column.get(index).clone());
        }
        out
    }
}
