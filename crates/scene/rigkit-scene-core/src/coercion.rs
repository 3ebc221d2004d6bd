//! Coercion helpers between attribute value shapes.
//! Used when a connection carries a value into a destination of another kind.

use nalgebra::Matrix4;

use crate::value::{AttrValue, ValueKind};

/// Read a value as a scalar.
/// - Float/Int -> value
/// - Bool -> 1.0 / 0.0
/// - Enum -> index
/// - Double3 -> first component
/// - Matrix/Text -> 0.0
pub fn to_float(v: &AttrValue) -> f64 {
    match v {
        AttrValue::Float(f) => *f,
        AttrValue::Int(i) => *i as f64,
        AttrValue::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        AttrValue::Enum { index, .. } => *index as f64,
        AttrValue::Double3(a) => a[0],
        AttrValue::Matrix(_) | AttrValue::Text(_) => 0.0,
    }
}

/// Read a value as a three-component vector; scalars broadcast.
pub fn to_vec3(v: &AttrValue) -> [f64; 3] {
    match v {
        AttrValue::Double3(a) => *a,
        AttrValue::Matrix(m) => [m[(0, 3)], m[(1, 3)], m[(2, 3)]],
        other => {
            let f = to_float(other);
            [f, f, f]
        }
    }
}

/// Read a value as a matrix; non-matrix values yield `None`.
pub fn to_matrix(v: &AttrValue) -> Option<Matrix4<f64>> {
    match v {
        AttrValue::Matrix(m) => Some(*m),
        _ => None,
    }
}

/// Convert `value` into the shape of `target`, keeping enum field names.
/// Returns `None` when the shapes cannot be reconciled.
pub fn coerce_like(target: &AttrValue, value: &AttrValue) -> Option<AttrValue> {
    if target.kind() == value.kind() {
        return match (target, value) {
            (AttrValue::Enum { fields, .. }, AttrValue::Enum { index, .. }) => {
                Some(AttrValue::Enum {
                    index: *index,
                    fields: fields.clone(),
                })
            }
            _ => Some(value.clone()),
        };
    }
    coerce_to_kind(target, value.kind(), value)
}

fn coerce_to_kind(target: &AttrValue, source: ValueKind, value: &AttrValue) -> Option<AttrValue> {
    if source == ValueKind::Text || source == ValueKind::Matrix {
        return None;
    }
    match target {
        AttrValue::Float(_) => Some(AttrValue::Float(to_float(value))),
        AttrValue::Int(_) => Some(AttrValue::Int(to_float(value).round() as i64)),
        AttrValue::Bool(_) => Some(AttrValue::Bool(to_float(value) != 0.0)),
        AttrValue::Enum { fields, .. } => Some(AttrValue::Enum {
            index: to_float(value).round() as i64,
            fields: fields.clone(),
        }),
        AttrValue::Double3(_) => Some(AttrValue::Double3(to_vec3(value))),
        AttrValue::Matrix(_) | AttrValue::Text(_) => None,
    }
}

/// Whether a connection from `source` into `target` is meaningful.
pub fn kinds_compatible(source: ValueKind, target: ValueKind) -> bool {
    match (source, target) {
        (a, b) if a == b => true,
        (ValueKind::Matrix, _) | (_, ValueKind::Matrix) => false,
        (ValueKind::Text, _) | (_, ValueKind::Text) => false,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_broadcast_into_compounds() {
        let out = coerce_like(&AttrValue::vec3(0.0, 0.0, 0.0), &AttrValue::Float(2.0));
        assert_eq!(out, Some(AttrValue::vec3(2.0, 2.0, 2.0)));
    }

    #[test]
    fn enum_destination_keeps_its_fields() {
        let target = AttrValue::enum_from_fields("xyz:yzx:zxy", 0);
        let out = coerce_like(&target, &AttrValue::Int(2)).unwrap();
        match out {
            AttrValue::Enum { index, fields } => {
                assert_eq!(index, 2);
                assert_eq!(fields.len(), 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn matrices_do_not_mix_with_numbers() {
        assert!(!kinds_compatible(ValueKind::Matrix, ValueKind::Float));
        assert!(kinds_compatible(ValueKind::Float, ValueKind::Double3));
        assert_eq!(coerce_like(&AttrValue::Float(0.0), &AttrValue::identity()), None);
    }
}
