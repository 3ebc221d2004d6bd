//! Attribute values stored on scene nodes.
//! Angles are degrees, distances are scene units, all numbers are f64.

use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};

/// Coarse kind of an attribute value, used for connection checks and coercion.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    Float,
    Int,
    Bool,
    Double3,
    Matrix,
    Enum,
    Text,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum AttrValue {
    /// Scalar
    Float(f64),

    /// Integer (operation selectors, rotate orders)
    Int(i64),

    /// Boolean flag (visibility, segment scale compensate)
    Bool(bool),

    /// Three-component compound (translate, rotate, scale, ...)
    Double3([f64; 3]),

    /// 4x4 column-major transform matrix
    Matrix(Matrix4<f64>),

    /// Enumerated value with its field names
    Enum { index: i64, fields: Vec<String> },

    /// Free text
    Text(String),
}

impl AttrValue {
    /// Return the coarse kind of this value.
    #[inline]
    pub fn kind(&self) -> ValueKind {
        match self {
            AttrValue::Float(_) => ValueKind::Float,
            AttrValue::Int(_) => ValueKind::Int,
            AttrValue::Bool(_) => ValueKind::Bool,
            AttrValue::Double3(_) => ValueKind::Double3,
            AttrValue::Matrix(_) => ValueKind::Matrix,
            AttrValue::Enum { .. } => ValueKind::Enum,
            AttrValue::Text(_) => ValueKind::Text,
        }
    }

    #[inline]
    pub fn vec3(x: f64, y: f64, z: f64) -> Self {
        AttrValue::Double3([x, y, z])
    }

    #[inline]
    pub fn identity() -> Self {
        AttrValue::Matrix(Matrix4::identity())
    }

    /// Build an enum value from a colon separated field list such as `"None:"`.
    pub fn enum_from_fields(spec: &str, index: i64) -> Self {
        let fields = spec
            .split(':')
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect();
        AttrValue::Enum { index, fields }
    }

    /// Read one component of a compound value.
    pub fn component(&self, index: usize) -> Option<f64> {
        match self {
            AttrValue::Double3(v) => v.get(index).copied(),
            _ => None,
        }
    }

    /// Copy of this compound value with one component replaced.
    pub fn with_component(&self, index: usize, value: f64) -> Option<AttrValue> {
        match self {
            AttrValue::Double3(v) if index < 3 => {
                let mut out = *v;
                out[index] = value;
                Some(AttrValue::Double3(out))
            }
            _ => None,
        }
    }

    /// True for kinds that can be read as a single number.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self.kind(),
            ValueKind::Float | ValueKind::Int | ValueKind::Bool | ValueKind::Enum
        )
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Float(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<[f64; 3]> for AttrValue {
    fn from(value: [f64; 3]) -> Self {
        AttrValue::Double3(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_fields_skip_empty_segments() {
        let v = AttrValue::enum_from_fields("None:", 0);
        assert_eq!(
            v,
            AttrValue::Enum {
                index: 0,
                fields: vec!["None".to_string()]
            }
        );
    }

    #[test]
    fn component_replacement_only_applies_to_compounds() {
        let v = AttrValue::vec3(1.0, 2.0, 3.0);
        assert_eq!(v.with_component(1, 9.0), Some(AttrValue::vec3(1.0, 9.0, 3.0)));
        assert_eq!(AttrValue::Float(1.0).with_component(0, 2.0), None);
        assert_eq!(v.component(2), Some(3.0));
    }

    #[test]
    fn serde_uses_tagged_layout() {
        let json = serde_json::to_string(&AttrValue::Float(1.5)).unwrap();
        assert_eq!(json, r#"{"type":"Float","data":1.5}"#);
    }
}
