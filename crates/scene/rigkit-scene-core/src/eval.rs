//! Pull-based evaluation of plugs.
//!
//! Reading a plug follows its input connection when it has one, computes it when it is an
//! output of a utility/constraint/IK node, and otherwise returns the stored value. Each query
//! memoizes the plugs it visits and refuses to re-enter a plug it is still evaluating.

use hashbrown::HashMap;
use nalgebra::{Matrix4, Vector3};

use crate::coercion::{coerce_like, to_float, to_matrix, to_vec3};
use crate::error::{SceneError, SceneResult};
use crate::math::{compose_trs, euler_to_rotation, safe_inverse, transform_point, RotateOrder};
use crate::node::{NodeHandle, NodeKind, PlugKey};
use crate::scene::Scene;
use crate::value::{AttrValue, ValueKind};
use crate::{constraints, ik, utility};

#[derive(Debug, Default)]
pub(crate) struct EvalContext {
    stack: Vec<PlugKey>,
    memo: HashMap<PlugKey, AttrValue>,
}

impl Scene {
    /// Kind of a computed output, `None` when `attr` is not an output of `kind`.
    pub(crate) fn computed_kind(kind: &NodeKind, attr: &str) -> Option<ValueKind> {
        if kind.is_transform() {
            match attr {
                "worldMatrix" | "parentMatrix" | "parentInverseMatrix" | "worldInverseMatrix"
                | "matrix" => return Some(ValueKind::Matrix),
                "worldPosition" => return Some(ValueKind::Double3),
                _ => {}
            }
        }
        match (kind, attr) {
            (NodeKind::MultiplyDivide, "output") => Some(ValueKind::Double3),
            (NodeKind::PlusMinusAverage, "output1D") => Some(ValueKind::Float),
            (NodeKind::PlusMinusAverage, "output3D") => Some(ValueKind::Double3),
            (NodeKind::DistanceBetween, "distance") => Some(ValueKind::Float),
            (NodeKind::PointConstraint, "constraintTranslate") => Some(ValueKind::Double3),
            (NodeKind::ParentConstraint, "constraintTranslate" | "constraintRotate") => {
                Some(ValueKind::Double3)
            }
            (NodeKind::ScaleConstraint, "constraintScale") => Some(ValueKind::Double3),
            (NodeKind::PoleVectorConstraint, "constraintTranslate") => Some(ValueKind::Double3),
            (NodeKind::IkHandle(_), "startJointRotate") => Some(ValueKind::Double3),
            _ => None,
        }
    }

    pub(crate) fn evaluate(&self, plug: &PlugKey) -> SceneResult<AttrValue> {
        let mut cx = EvalContext::default();
        self.eval_in(plug, &mut cx)
    }

    pub(crate) fn eval_in(&self, plug: &PlugKey, cx: &mut EvalContext) -> SceneResult<AttrValue> {
        if let Some(v) = cx.memo.get(plug) {
            return Ok(v.clone());
        }
        if cx.stack.contains(plug) {
            return Err(SceneError::Cycle {
                plug: self
                    .plug_name(plug)
                    .unwrap_or_else(|_| plug.attr_name()),
            });
        }
        cx.stack.push(plug.clone());
        let result = self.eval_uncached(plug, cx);
        cx.stack.pop();
        let value = result?;
        cx.memo.insert(plug.clone(), value.clone());
        Ok(value)
    }

    fn eval_uncached(&self, plug: &PlugKey, cx: &mut EvalContext) -> SceneResult<AttrValue> {
        let node = self.node(plug.node)?;
        if let NodeKind::Container(data) = &node.kind {
            if let Some(bound) = data.published.get(&plug.attr) {
                let value = self.eval_in(bound, cx)?;
                return Ok(match plug.component {
                    Some(i) => AttrValue::Float(to_vec3(&value)[usize::from(i.min(2))]),
                    None => value,
                });
            }
        }
        match plug.component {
            Some(i) => {
                let i = usize::from(i.min(2));
                if let Some(src) = self.connections.get(plug) {
                    return Ok(AttrValue::Float(to_float(&self.eval_in(src, cx)?)));
                }
                if let Some(src) = self.connections.get(&plug.whole()) {
                    return Ok(AttrValue::Float(to_vec3(&self.eval_in(src, cx)?)[i]));
                }
                if Self::computed_kind(&node.kind, &plug.attr).is_some() {
                    let v = self.compute(plug.node, &plug.attr, cx)?;
                    return Ok(AttrValue::Float(to_vec3(&v)[i]));
                }
                let attr = node.attrs.get(&plug.attr).ok_or_else(|| SceneError::AttributeNotFound {
                    node: node.name.clone(),
                    attribute: plug.attr_name(),
                })?;
                attr.value
                    .component(i)
                    .map(AttrValue::Float)
                    .ok_or_else(|| SceneError::TypeMismatch {
                        node: node.name.clone(),
                        attribute: plug.attr_name(),
                        expected: "Double3".into(),
                        actual: format!("{:?}", attr.value.kind()),
                    })
            }
            None => {
                if let Some(src) = self.connections.get(plug) {
                    let v = self.eval_in(src, cx)?;
                    return match node.attrs.get(&plug.attr) {
                        Some(a) => coerce_like(&a.value, &v).ok_or_else(|| SceneError::TypeMismatch {
                            node: node.name.clone(),
                            attribute: plug.attr.clone(),
                            expected: format!("{:?}", a.value.kind()),
                            actual: format!("{:?}", v.kind()),
                        }),
                        None => Ok(v),
                    };
                }
                if Self::computed_kind(&node.kind, &plug.attr).is_some() {
                    return self.compute(plug.node, &plug.attr, cx);
                }
                let attr = node.attrs.get(&plug.attr).ok_or_else(|| SceneError::AttributeNotFound {
                    node: node.name.clone(),
                    attribute: plug.attr.clone(),
                })?;
                let mut value = attr.value.clone();
                if matches!(value, AttrValue::Double3(_)) {
                    for i in 0..3u8 {
                        let key = PlugKey::component(plug.node, plug.attr.clone(), i);
                        if let Some(src) = self.connections.get(&key) {
                            let f = to_float(&self.eval_in(src, cx)?);
                            if let Some(next) = value.with_component(usize::from(i), f) {
                                value = next;
                            }
                        }
                    }
                }
                Ok(value)
            }
        }
    }

    fn compute(&self, handle: NodeHandle, attr: &str, cx: &mut EvalContext) -> SceneResult<AttrValue> {
        let node = self.node(handle)?;
        match attr {
            "worldMatrix" => return Ok(AttrValue::Matrix(self.world_matrix_in(handle, cx)?)),
            "parentMatrix" => return Ok(AttrValue::Matrix(self.parent_matrix_in(handle, cx)?)),
            "parentInverseMatrix" => {
                return Ok(AttrValue::Matrix(safe_inverse(&self.parent_matrix_in(handle, cx)?)))
            }
            "worldInverseMatrix" => {
                return Ok(AttrValue::Matrix(safe_inverse(&self.world_matrix_in(handle, cx)?)))
            }
            "matrix" => return Ok(AttrValue::Matrix(self.local_matrix_in(handle, cx)?)),
            "worldPosition" => {
                let p = self.world_position_in(handle, cx)?;
                return Ok(AttrValue::vec3(p.x, p.y, p.z));
            }
            _ => {}
        }
        match &node.kind {
            NodeKind::MultiplyDivide | NodeKind::PlusMinusAverage | NodeKind::DistanceBetween => {
                utility::compute(self, handle, attr, cx)
            }
            NodeKind::PointConstraint
            | NodeKind::ParentConstraint
            | NodeKind::ScaleConstraint
            | NodeKind::PoleVectorConstraint => constraints::compute(self, handle, attr, cx),
            NodeKind::IkHandle(data) => ik::solve(self, handle, data, cx),
            _ => Err(SceneError::AttributeNotFound {
                node: node.name.clone(),
                attribute: attr.to_string(),
            }),
        }
    }

    // ----- typed reads inside an evaluation -----

    pub(crate) fn read_vec3(&self, handle: NodeHandle, attr: &str, cx: &mut EvalContext) -> SceneResult<Vector3<f64>> {
        let v = to_vec3(&self.eval_in(&PlugKey::new(handle, attr), cx)?);
        Ok(Vector3::new(v[0], v[1], v[2]))
    }

    pub(crate) fn read_f64(&self, handle: NodeHandle, attr: &str, cx: &mut EvalContext) -> SceneResult<f64> {
        Ok(to_float(&self.eval_in(&PlugKey::new(handle, attr), cx)?))
    }

    pub(crate) fn read_matrix(&self, handle: NodeHandle, attr: &str, cx: &mut EvalContext) -> SceneResult<Matrix4<f64>> {
        let v = self.eval_in(&PlugKey::new(handle, attr), cx)?;
        to_matrix(&v).ok_or_else(|| SceneError::TypeMismatch {
            node: self.node(handle).map(|n| n.name.clone()).unwrap_or_default(),
            attribute: attr.to_string(),
            expected: "Matrix".into(),
            actual: format!("{:?}", v.kind()),
        })
    }

    pub(crate) fn read_rotate_order(&self, handle: NodeHandle, cx: &mut EvalContext) -> SceneResult<RotateOrder> {
        let idx = self.read_f64(handle, "rotateOrder", cx)?.round() as i64;
        Ok(RotateOrder::from_index(idx).unwrap_or_default())
    }

    // ----- transform evaluation -----

    pub(crate) fn local_matrix_in(&self, handle: NodeHandle, cx: &mut EvalContext) -> SceneResult<Matrix4<f64>> {
        let node = self.node(handle)?;
        if !node.kind.is_transform() {
            return Ok(Matrix4::identity());
        }
        let is_joint = matches!(node.kind, NodeKind::Joint);
        let parent = node.parent;
        let t = self.read_vec3(handle, "translate", cx)?;
        let r = self.read_vec3(handle, "rotate", cx)?;
        let s = self.read_vec3(handle, "scale", cx)?;
        let rp = self.read_vec3(handle, "rotatePivot", cx)?;
        let rpt = self.read_vec3(handle, "rotatePivotTranslate", cx)?;
        let order = self.read_rotate_order(handle, cx)?;
        let mut rotation = euler_to_rotation([r.x, r.y, r.z], order);
        if is_joint {
            let jo = self.read_vec3(handle, "jointOrient", cx)?;
            rotation = euler_to_rotation([jo.x, jo.y, jo.z], RotateOrder::Xyz) * rotation;
        }
        let mut m = compose_trs(&(t + rpt + rp), &rotation, &s);
        if rp != Vector3::zeros() {
            m *= Matrix4::new_translation(&-rp);
        }
        if is_joint && self.read_f64(handle, "segmentScaleCompensate", cx)? != 0.0 {
            if let Some(p) = parent.filter(|p| matches!(self.nodes.get(p).map(|n| &n.kind), Some(NodeKind::Joint))) {
                let ps = self.read_vec3(p, "scale", cx)?;
                let inv = Vector3::new(recip(ps.x), recip(ps.y), recip(ps.z));
                let mut linear = Matrix4::new_nonuniform_scaling(&inv) * m;
                linear[(0, 3)] = m[(0, 3)];
                linear[(1, 3)] = m[(1, 3)];
                linear[(2, 3)] = m[(2, 3)];
                m = linear;
            }
        }
        Ok(m)
    }

    pub(crate) fn parent_matrix_in(&self, handle: NodeHandle, cx: &mut EvalContext) -> SceneResult<Matrix4<f64>> {
        match self.node(handle)?.parent {
            Some(p) => self.read_matrix(p, "worldMatrix", cx),
            None => Ok(Matrix4::identity()),
        }
    }

    pub(crate) fn world_matrix_in(&self, handle: NodeHandle, cx: &mut EvalContext) -> SceneResult<Matrix4<f64>> {
        let parent = self.parent_matrix_in(handle, cx)?;
        Ok(parent * self.local_matrix_in(handle, cx)?)
    }

    /// World position of the rotate pivot. Independent of the node's own rotation.
    pub(crate) fn world_position_in(&self, handle: NodeHandle, cx: &mut EvalContext) -> SceneResult<Vector3<f64>> {
        let parent = self.parent_matrix_in(handle, cx)?;
        let t = self.read_vec3(handle, "translate", cx)?;
        let rp = self.read_vec3(handle, "rotatePivot", cx)?;
        let rpt = self.read_vec3(handle, "rotatePivotTranslate", cx)?;
        Ok(transform_point(&parent, &(t + rp + rpt)))
    }

    /// Evaluated world matrix.
    pub fn world_matrix(&self, handle: NodeHandle) -> SceneResult<Matrix4<f64>> {
        let mut cx = EvalContext::default();
        self.world_matrix_in(handle, &mut cx)
    }

    pub fn parent_matrix(&self, handle: NodeHandle) -> SceneResult<Matrix4<f64>> {
        let mut cx = EvalContext::default();
        self.parent_matrix_in(handle, &mut cx)
    }

    /// Evaluated world-space position (rotate pivot).
    pub fn world_position(&self, handle: NodeHandle) -> SceneResult<Vector3<f64>> {
        let mut cx = EvalContext::default();
        self.world_position_in(handle, &mut cx)
    }
}

#[inline]
fn recip(v: f64) -> f64 {
    if v.abs() > f64::EPSILON {
        1.0 / v
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn world_matrix_composes_parents() {
        let mut scene = Scene::new();
        let a = scene.create_transform("a", None).unwrap();
        let b = scene.create_transform("b", Some(a)).unwrap();
        scene.set(a, "translate", [1.0, 0.0, 0.0]).unwrap();
        scene.set(a, "rotateZ", 90.0).unwrap();
        scene.set(b, "translate", [2.0, 0.0, 0.0]).unwrap();
        let p = scene.world_position(b).unwrap();
        assert_relative_eq!(p, Vector3::new(1.0, 2.0, 0.0), epsilon = 1e-9);
    }

    #[test]
    fn self_connection_through_scale_is_a_cycle() {
        let mut scene = Scene::new();
        let a = scene.create_transform("a", None).unwrap();
        let b = scene.create_transform("b", None).unwrap();
        scene.connect(a, "scaleX", b, "scaleX", false).unwrap();
        scene.connect(b, "scaleX", a, "scaleX", false).unwrap();
        assert!(matches!(scene.get(a, "scaleX"), Err(SceneError::Cycle { .. })));
    }

    #[test]
    fn joint_orient_precedes_rotate() {
        let mut scene = Scene::new();
        let j = scene.create_node("j", NodeKind::Joint, None).unwrap();
        let c = scene.create_node("c", NodeKind::Joint, Some(j)).unwrap();
        scene.set(j, "jointOrient", [0.0, 0.0, 90.0]).unwrap();
        scene.set(c, "translate", [1.0, 0.0, 0.0]).unwrap();
        let p = scene.world_position(c).unwrap();
        assert_relative_eq!(p, Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-9);
    }

    #[test]
    fn segment_scale_compensate_cancels_parent_scale() {
        let mut scene = Scene::new();
        let j = scene.create_node("j", NodeKind::Joint, None).unwrap();
        let c = scene.create_node("c", NodeKind::Joint, Some(j)).unwrap();
        scene.set(j, "scale", [2.0, 2.0, 2.0]).unwrap();
        scene.set(c, "translate", [1.0, 0.0, 0.0]).unwrap();
        let m = scene.world_matrix(c).unwrap();
        assert_relative_eq!(crate::math::scale_of(&m), Vector3::new(1.0, 1.0, 1.0), epsilon = 1e-9);
        // translation still lives in the scaled parent space
        assert_relative_eq!(crate::math::translation_of(&m), Vector3::new(2.0, 0.0, 0.0), epsilon = 1e-9);
        scene.set(c, "segmentScaleCompensate", false).unwrap();
        let m = scene.world_matrix(c).unwrap();
        assert_relative_eq!(crate::math::scale_of(&m), Vector3::new(2.0, 2.0, 2.0), epsilon = 1e-9);
    }
}
