//! Arithmetic utility nodes: multiplyDivide, plusMinusAverage, distanceBetween.

use log::debug;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{SceneError, SceneResult};
use crate::eval::EvalContext;
use crate::node::{Node, NodeHandle, NodeKind};
use crate::scene::Scene;
use crate::value::AttrValue;

/// `operation` values of a multiplyDivide node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MultiplyDivideOp {
    NoOp = 0,
    Multiply = 1,
    Divide = 2,
    Power = 3,
}

/// `operation` values of a plusMinusAverage node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlusMinusOp {
    NoOp = 0,
    Sum = 1,
    Subtract = 2,
    Average = 3,
}

impl Scene {
    pub fn create_multiply_divide(&mut self, name: &str, op: MultiplyDivideOp) -> SceneResult<NodeHandle> {
        let node = self.create_node(name, NodeKind::MultiplyDivide, None)?;
        self.set(node, "operation", op as i64)?;
        Ok(node)
    }

    pub fn create_plus_minus_average(&mut self, name: &str, op: PlusMinusOp) -> SceneResult<NodeHandle> {
        let node = self.create_node(name, NodeKind::PlusMinusAverage, None)?;
        self.set(node, "operation", op as i64)?;
        Ok(node)
    }

    pub fn create_distance_between(&mut self, name: &str) -> SceneResult<NodeHandle> {
        self.create_node(name, NodeKind::DistanceBetween, None)
    }
}

/// Sorted indices of array elements `base[n]` stored on a node.
pub(crate) fn element_indices(node: &Node, base: &str) -> Vec<u32> {
    let prefix = format!("{base}[");
    let mut out: Vec<u32> = node
        .attrs
        .keys()
        .filter_map(|k| k.strip_prefix(&prefix))
        .filter_map(|rest| rest.split_once(']'))
        .filter_map(|(idx, _)| idx.parse().ok())
        .collect();
    out.sort_unstable();
    out.dedup();
    out
}

fn combine<T>(op: i64, items: Vec<T>, zero: T) -> T
where
    T: Copy + std::ops::Add<Output = T> + std::ops::Sub<Output = T> + std::ops::Mul<f64, Output = T>,
{
    let n = items.len();
    let mut iter = items.into_iter();
    match op {
        2 => match iter.next() {
            Some(first) => iter.fold(first, |acc, v| acc - v),
            None => zero,
        },
        3 if n > 0 => iter.fold(zero, |acc, v| acc + v) * (1.0 / n as f64),
        0 => iter.next().unwrap_or(zero),
        _ => iter.fold(zero, |acc, v| acc + v),
    }
}

pub(crate) fn compute(scene: &Scene, handle: NodeHandle, attr: &str, cx: &mut EvalContext) -> SceneResult<AttrValue> {
    let node = scene.node(handle)?;
    match (&node.kind, attr) {
        (NodeKind::MultiplyDivide, "output") => {
            let op = scene.read_f64(handle, "operation", cx)?.round() as i64;
            let a = scene.read_vec3(handle, "input1", cx)?;
            let b = scene.read_vec3(handle, "input2", cx)?;
            let mut out = [0.0; 3];
            for i in 0..3 {
                out[i] = match op {
                    0 => a[i],
                    2 => {
                        if b[i] == 0.0 {
                            debug!("{}: division by zero on component {i}", node.name);
                            0.0
                        } else {
                            a[i] / b[i]
                        }
                    }
                    3 => a[i].powf(b[i]),
                    _ => a[i] * b[i],
                };
            }
            Ok(AttrValue::Double3(out))
        }
        (NodeKind::PlusMinusAverage, "output1D") => {
            let op = scene.read_f64(handle, "operation", cx)?.round() as i64;
            let mut items = Vec::new();
            for i in element_indices(node, "input1D") {
                items.push(scene.read_f64(handle, &format!("input1D[{i}]"), cx)?);
            }
            Ok(AttrValue::Float(combine(op, items, 0.0)))
        }
        (NodeKind::PlusMinusAverage, "output3D") => {
            let op = scene.read_f64(handle, "operation", cx)?.round() as i64;
            let mut items = Vec::new();
            for i in element_indices(node, "input3D") {
                items.push(scene.read_vec3(handle, &format!("input3D[{i}]"), cx)?);
            }
            let v = combine(op, items, Vector3::zeros());
            Ok(AttrValue::vec3(v.x, v.y, v.z))
        }
        (NodeKind::DistanceBetween, "distance") => {
            let a = scene.read_vec3(handle, "point1", cx)?;
            let b = scene.read_vec3(handle, "point2", cx)?;
            Ok(AttrValue::Float((a - b).norm()))
        }
        _ => Err(SceneError::AttributeNotFound {
            node: node.name.clone(),
            attribute: attr.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn divide_by_zero_yields_zero() {
        let mut scene = Scene::new();
        let md = scene.create_multiply_divide("md", MultiplyDivideOp::Divide).unwrap();
        scene.set(md, "input1", [4.0, 3.0, 1.0]).unwrap();
        scene.set(md, "input2", [2.0, 0.0, 4.0]).unwrap();
        assert_eq!(scene.get_vec3(md, "output").unwrap(), [2.0, 0.0, 0.25]);
    }

    #[test]
    fn plus_minus_average_reduces_connected_elements() {
        let mut scene = Scene::new();
        let a = scene.create_transform("a", None).unwrap();
        let b = scene.create_transform("b", None).unwrap();
        scene.set(a, "translate", [1.0, 2.0, 3.0]).unwrap();
        scene.set(b, "translate", [10.0, 20.0, 30.0]).unwrap();
        let pma = scene.create_plus_minus_average("pma", PlusMinusOp::Sum).unwrap();
        scene.connect(a, "translate", pma, "input3D[0]", false).unwrap();
        scene.connect(b, "translate", pma, "input3D[1]", false).unwrap();
        scene.connect(a, "translateX", pma, "input1D[0]", false).unwrap();
        scene.connect(b, "translateX", pma, "input1D[1]", false).unwrap();
        assert_eq!(scene.get_vec3(pma, "output3D").unwrap(), [11.0, 22.0, 33.0]);
        scene.set(pma, "operation", PlusMinusOp::Subtract as i64).unwrap();
        assert_eq!(scene.get_f64(pma, "output1D").unwrap(), -9.0);
        scene.set(pma, "operation", PlusMinusOp::Average as i64).unwrap();
        assert_eq!(scene.get_f64(pma, "output1D").unwrap(), 5.5);
    }

    #[test]
    fn distance_follows_world_positions() {
        let mut scene = Scene::new();
        let a = scene.create_locator("a", None).unwrap();
        let b = scene.create_locator("b", None).unwrap();
        scene.set(b, "translate", [3.0, 4.0, 0.0]).unwrap();
        let d = scene.create_distance_between("d").unwrap();
        scene.connect(a, "worldPosition", d, "point1", false).unwrap();
        scene.connect(b, "worldPosition", d, "point2", false).unwrap();
        assert_eq!(scene.get_f64(d, "distance").unwrap(), 5.0);
        assert!(scene.set(d, "distance", 1.0).is_err());
    }
}
