//! Attribute value type carried by points.

use std::fmt;

use glam::DVec3;
use serde::{Deserialize, Serialize};

/// A single attribute value.
///
/// Covers the types the host attribute bag exposes:
/// - Scalars: Bool, Int, Float, String
/// - Spatial: Vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Vector(DVec3),
    String(String),
}

// ============================================================================
// Type checking
// ============================================================================

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOLEAN",
            Value::Int(_) => "INTEGER",
            Value::Float(_) => "FLOAT",
            Value::Vector(_) => "VECTOR",
            Value::String(_) => "STRING",
        }
    }

    pub fn is_null(&self) -> bool { matches!(self, Value::Null) }
    pub fn is_numeric(&self) -> bool { matches!(self, Value::Int(_) | Value::Float(_)) }

    /// Attempt to extract as i64
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// Attempt to extract as f64
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<DVec3> {
        match self {
            Value::Vector(v) => Some(*v),
            Value::Float(f) => Some(DVec3::splat(*f)),
            Value::Int(i) => Some(DVec3::splat(*i as f64)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

// ============================================================================
// Arithmetic used by blending
// ============================================================================

impl Value {
    /// Weighted sum of values sharing this value's type.
    ///
    /// Non-numeric types (Null, String) have no meaningful sum and return
    /// the value carrying the highest weight instead.
    pub fn weighted_sum(samples: &[(&Value, f64)]) -> Value {
        let Some((first, _)) = samples.first() else { return Value::Null };
        match first {
            Value::Float(_) => Value::Float(
                samples.iter().filter_map(|(v, w)| v.as_float().map(|f| f * w)).sum(),
            ),
            Value::Int(_) => Value::Int(
                samples
                    .iter()
                    .filter_map(|(v, w)| v.as_float().map(|f| f * w))
                    .sum::<f64>()
                    .round() as i64,
            ),
            Value::Vector(_) => Value::Vector(
                samples
                    .iter()
                    .filter_map(|(v, w)| v.as_vector().map(|d| d * *w))
                    .fold(DVec3::ZERO, |acc, d| acc + d),
            ),
            Value::Bool(_) => {
                let score: f64 = samples.iter().filter_map(|(v, w)| v.as_float().map(|f| f * w)).sum();
                let total: f64 = samples.iter().map(|(_, w)| *w).sum();
                Value::Bool(total > 0.0 && score / total >= 0.5)
            }
            Value::Null | Value::String(_) => Self::heaviest(samples),
        }
    }

    /// The sample with the largest weight (first one wins ties).
    pub fn heaviest(samples: &[(&Value, f64)]) -> Value {
        let mut best: Option<(&Value, f64)> = None;
        for &(v, w) in samples {
            match best {
                Some((_, bw)) if bw >= w => {}
                _ => best = Some((v, w)),
            }
        }
        best.map(|(v, _)| v.clone()).unwrap_or_default()
    }

    /// Component-wise minimum for numeric types, first value otherwise.
    pub fn min_of(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => Value::Float(a.min(*b)),
            (Value::Int(a), Value::Int(b)) => Value::Int(*a.min(b)),
            (Value::Vector(a), Value::Vector(b)) => Value::Vector(a.min(*b)),
            (Value::Bool(a), Value::Bool(b)) => Value::Bool(*a && *b),
            _ => self.clone(),
        }
    }

    /// Component-wise maximum for numeric types, first value otherwise.
    pub fn max_of(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => Value::Float(a.max(*b)),
            (Value::Int(a), Value::Int(b)) => Value::Int(*a.max(b)),
            (Value::Vector(a), Value::Vector(b)) => Value::Vector(a.max(*b)),
            (Value::Bool(a), Value::Bool(b)) => Value::Bool(*a || *b),
            _ => self.clone(),
        }
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<bool> for Value {
    fn from(b: bool) -> Self { Value::Bool(b) }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self { Value::Int(i) }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self { Value::Int(i as i64) }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self { Value::Int(i as i64) }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self { Value::Float(f) }
}

impl From<DVec3> for Value {
    fn from(v: DVec3) -> Self { Value::Vector(v) }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self { Value::String(s.to_string()) }
}

impl From<String> for Value {
    fn from(s: String) -> Self { Value::String(s) }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Vector(v) => write!(f, "({}, {}, {})", v.x, v.y, v.z),
            Value::String(s) => write!(f, "'{s}'"),
        }
    }
}
