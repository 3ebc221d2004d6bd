//! Transform edits: joints, world-space placement, joint orientation, freezing,
//! reparenting, duplication and display geometry.

use log::debug;
use nalgebra::{Matrix3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{SceneError, SceneResult};
use crate::math::{
    basis, euler_to_rotation, rotation_of, rotation_to_euler, safe_inverse, scale_of,
    transform_point, translation_of, RotateOrder,
};
use crate::node::{Attribute, MaterialData, NodeHandle, NodeKind, PlugKey, Primitive, ShapeData};
use crate::scene::Scene;
use crate::value::AttrValue;

/// World direction the secondary axis should follow when orienting joints.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecondaryAxis {
    Xup,
    Xdown,
    #[default]
    Yup,
    Ydown,
    Zup,
    Zdown,
    None,
}

impl SecondaryAxis {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "xup" => SecondaryAxis::Xup,
            "xdown" => SecondaryAxis::Xdown,
            "yup" => SecondaryAxis::Yup,
            "ydown" => SecondaryAxis::Ydown,
            "zup" => SecondaryAxis::Zup,
            "zdown" => SecondaryAxis::Zdown,
            "none" => SecondaryAxis::None,
            _ => return None,
        })
    }

    fn world_direction(self) -> Vector3<f64> {
        match self {
            SecondaryAxis::Xup => Vector3::x(),
            SecondaryAxis::Xdown => -Vector3::x(),
            SecondaryAxis::Yup | SecondaryAxis::None => Vector3::y(),
            SecondaryAxis::Ydown => -Vector3::y(),
            SecondaryAxis::Zup => Vector3::z(),
            SecondaryAxis::Zdown => -Vector3::z(),
        }
    }
}

/// Rotation whose `axes[0]` column aims along `aim` and whose `axes[1]` column leans to `up`.
fn aim_frame(aim: &Vector3<f64>, up: &Vector3<f64>, order: RotateOrder) -> Rotation3<f64> {
    let [p, s, t] = order.axes();
    let mut up_perp = up - aim * up.dot(aim);
    if up_perp.norm() < 1e-9 {
        // aim is parallel to the hint; lean on the least aligned world axis instead
        let fallback = (0..3)
            .min_by(|a, b| {
                aim.dot(&basis(*a))
                    .abs()
                    .total_cmp(&aim.dot(&basis(*b)).abs())
            })
            .map(basis)
            .unwrap_or_else(Vector3::z);
        up_perp = fallback - aim * fallback.dot(aim);
    }
    let up_perp = up_perp.normalize();
    let third = if s == (p + 1) % 3 {
        aim.cross(&up_perp)
    } else {
        up_perp.cross(aim)
    };
    let mut cols = [Vector3::zeros(); 3];
    cols[p] = *aim;
    cols[s] = up_perp;
    cols[t] = third;
    Rotation3::from_matrix_unchecked(Matrix3::from_columns(&cols))
}

impl Scene {
    /// Write a stored value unless an input connection drives it.
    fn assign_free(&mut self, handle: NodeHandle, attr: &str, value: AttrValue) -> SceneResult<()> {
        let plug = self.resolve(handle, attr)?;
        if self.is_driven(&plug) {
            debug!("{} is driven; leaving it", self.plug_name(&plug)?);
            return Ok(());
        }
        self.store_value(&plug, &value)
    }

    /// Create a joint at a world position. `orientation` seeds `jointOrient` (degrees, xyz).
    pub fn create_joint(
        &mut self,
        name: &str,
        parent: Option<NodeHandle>,
        world_position: Vector3<f64>,
        orientation: Option<[f64; 3]>,
    ) -> SceneResult<NodeHandle> {
        let joint = self.create_node(name, NodeKind::Joint, parent)?;
        let local = transform_point(&safe_inverse(&self.parent_matrix(joint)?), &world_position);
        self.set(joint, "translate", [local.x, local.y, local.z])?;
        if let Some(o) = orientation {
            self.set(joint, "jointOrient", o)?;
        }
        Ok(joint)
    }

    /// Move a transform so its pivot lands on `position` in world space.
    pub fn set_world_position(&mut self, handle: NodeHandle, position: Vector3<f64>) -> SceneResult<()> {
        let parent = self.parent_matrix(handle)?;
        let rp = Vector3::from(self.get_vec3(handle, "rotatePivot")?);
        let rpt = Vector3::from(self.get_vec3(handle, "rotatePivotTranslate")?);
        let local = transform_point(&safe_inverse(&parent), &position) - rp - rpt;
        self.set(handle, "translate", [local.x, local.y, local.z])
    }

    /// World rotation with scale removed.
    pub fn world_rotation(&self, handle: NodeHandle) -> SceneResult<Rotation3<f64>> {
        Ok(rotation_of(&self.world_matrix(handle)?))
    }

    /// Orient a joint so `order`'s first axis aims at its first child and the second axis
    /// follows `secondary`. `None` (or a childless joint) aligns the joint with its parent.
    /// Children keep their world positions.
    pub fn orient_joint(
        &mut self,
        joint: NodeHandle,
        order: Option<RotateOrder>,
        secondary: SecondaryAxis,
    ) -> SceneResult<()> {
        if !matches!(self.node(joint)?.kind, NodeKind::Joint) {
            return Err(SceneError::invalid(format!("{} is not a joint", self.node(joint)?.name)));
        }
        self.check_structural(joint)?;
        let children = self.child_transforms(joint)?;
        let child_positions: Vec<(NodeHandle, Vector3<f64>)> = children
            .iter()
            .map(|c| Ok((*c, self.world_position(*c)?)))
            .collect::<SceneResult<_>>()?;
        let parent_rot = rotation_of(&self.parent_matrix(joint)?);
        let origin = self.world_position(joint)?;

        let aim = child_positions
            .first()
            .map(|(_, p)| p - origin)
            .filter(|d| d.norm() > 1e-9)
            .map(|d| d.normalize());
        let world_rot = match (order, aim) {
            (Some(order), Some(aim)) => aim_frame(&aim, &secondary.world_direction(), order),
            _ => parent_rot,
        };
        let orient = rotation_to_euler(&(parent_rot.inverse() * world_rot), RotateOrder::Xyz);
        self.assign_free(joint, "jointOrient", AttrValue::Double3(orient))?;
        self.assign_free(joint, "rotate", AttrValue::vec3(0.0, 0.0, 0.0))?;

        let inv = safe_inverse(&self.world_matrix(joint)?);
        for (child, world) in child_positions {
            let local = transform_point(&inv, &world);
            self.assign_free(child, "translate", AttrValue::vec3(local.x, local.y, local.z))?;
        }
        Ok(())
    }

    /// Fold `rotate` into `jointOrient` (freeze rotation). The world pose is unchanged.
    pub fn make_identity_rotate(&mut self, joint: NodeHandle) -> SceneResult<()> {
        if !matches!(self.node(joint)?.kind, NodeKind::Joint) {
            return Err(SceneError::invalid(format!("{} is not a joint", self.node(joint)?.name)));
        }
        self.check_structural(joint)?;
        let rotate_plug = self.resolve(joint, "rotate")?;
        if self.is_driven(&rotate_plug) {
            return Err(SceneError::AttributeConnected {
                node: self.node(joint)?.name.clone(),
                attribute: "rotate".into(),
            });
        }
        let jo = self.get_vec3(joint, "jointOrient")?;
        let r = self.get_vec3(joint, "rotate")?;
        let order = RotateOrder::from_index(self.get_f64(joint, "rotateOrder")? as i64).unwrap_or_default();
        let combined = euler_to_rotation(jo, RotateOrder::Xyz) * euler_to_rotation(r, order);
        self.assign_free(joint, "jointOrient", AttrValue::Double3(rotation_to_euler(&combined, RotateOrder::Xyz)))?;
        self.store_value(&rotate_plug, &AttrValue::vec3(0.0, 0.0, 0.0))
    }

    /// Reparent `handle` (to the world with `None`). With `preserve_world` the node keeps its
    /// world transform; joints absorb the rotation change in `jointOrient`.
    pub fn reparent(
        &mut self,
        handle: NodeHandle,
        parent: Option<NodeHandle>,
        preserve_world: bool,
    ) -> SceneResult<()> {
        let node = self.node(handle)?;
        if !node.kind.is_dag() {
            return Err(SceneError::invalid(format!("{} is not in the hierarchy", node.name)));
        }
        if node.parent == parent {
            return Ok(());
        }
        if let Some(p) = parent {
            if p == handle || self.is_ancestor(handle, p)? {
                return Err(SceneError::invalid(format!(
                    "cannot parent {} under its own descendant",
                    self.node(handle)?.name
                )));
            }
            if !self.node(p)?.kind.is_transform() {
                return Err(SceneError::invalid(format!("{} cannot hold children", self.node(p)?.name)));
            }
            self.check_structural(p)?;
        }
        self.check_structural(handle)?;
        let world = if preserve_world && self.node(handle)?.kind.is_transform() {
            Some(self.world_matrix(handle)?)
        } else {
            None
        };
        self.relink(handle, parent)?;
        let Some(world) = world else {
            return Ok(());
        };

        let local = safe_inverse(&self.parent_matrix(handle)?) * world;
        let t = translation_of(&local);
        let s = scale_of(&local);
        let rot = rotation_of(&local);
        self.assign_free(handle, "translate", AttrValue::vec3(t.x, t.y, t.z))?;
        self.assign_free(handle, "scale", AttrValue::vec3(s.x, s.y, s.z))?;
        let order = RotateOrder::from_index(self.get_f64(handle, "rotateOrder")? as i64).unwrap_or_default();
        if matches!(self.node(handle)?.kind, NodeKind::Joint) {
            let r = euler_to_rotation(self.get_vec3(handle, "rotate")?, order);
            let jo = rotation_to_euler(&(rot * r.inverse()), RotateOrder::Xyz);
            self.assign_free(handle, "jointOrient", AttrValue::Double3(jo))?;
        } else {
            let r = rotation_to_euler(&rot, order);
            self.assign_free(handle, "rotate", AttrValue::Double3(r))?;
        }
        Ok(())
    }

    /// Copy a node (optionally with its transform/shape descendants) under the same parent.
    /// Attribute values are copied as currently evaluated; connections are not.
    /// Returns the new root first, then copied descendants depth-first.
    pub fn duplicate(&mut self, handle: NodeHandle, name: &str, with_children: bool) -> SceneResult<Vec<NodeHandle>> {
        let parent = self.node(handle)?.parent;
        let mut out = Vec::new();
        self.duplicate_into(handle, name, parent, with_children, &mut out)?;
        Ok(out)
    }

    fn duplicate_into(
        &mut self,
        src: NodeHandle,
        name: &str,
        parent: Option<NodeHandle>,
        with_children: bool,
        out: &mut Vec<NodeHandle>,
    ) -> SceneResult<()> {
        let node = self.node(src)?;
        let kind = match &node.kind {
            k @ (NodeKind::Transform | NodeKind::Joint | NodeKind::Locator | NodeKind::Shape(_)) => k.clone(),
            other => {
                return Err(SceneError::invalid(format!(
                    "cannot duplicate {} node {}",
                    other.type_name(),
                    node.name
                )))
            }
        };
        let children = node.children.clone();
        let aliases = node.aliases.clone();
        let mut copied = Vec::new();
        for (attr, a) in &node.attrs {
            let value = self.evaluate(&PlugKey::new(src, attr.clone()))?;
            copied.push((
                attr.clone(),
                Attribute {
                    value,
                    locked: a.locked,
                    locked_components: a.locked_components,
                },
            ));
        }

        let dup = self.create_node(name, kind, parent)?;
        {
            let n = self.node_mut(dup)?;
            n.attrs = copied.into_iter().collect();
            n.aliases = aliases;
        }
        out.push(dup);
        if with_children {
            for child in children {
                let copyable = matches!(
                    self.node(child)?.kind,
                    NodeKind::Transform | NodeKind::Joint | NodeKind::Locator | NodeKind::Shape(_)
                );
                if copyable {
                    let child_name = self.unique_name(self.node(child)?.name());
                    self.duplicate_into(child, &child_name, Some(dup), true, out)?;
                }
            }
        }
        Ok(())
    }

    /// Attach display geometry to a transform.
    pub fn create_shape(&mut self, name: &str, parent: NodeHandle, primitive: Primitive) -> SceneResult<NodeHandle> {
        self.create_node(
            name,
            NodeKind::Shape(ShapeData {
                primitive,
                material: None,
            }),
            Some(parent),
        )
    }

    pub fn create_material(&mut self, name: &str, color: [f64; 3]) -> SceneResult<NodeHandle> {
        self.create_node(name, NodeKind::Material(MaterialData { color }), None)
    }

    pub fn assign_material(&mut self, shape: NodeHandle, material: NodeHandle) -> SceneResult<()> {
        if !matches!(self.node(material)?.kind, NodeKind::Material(_)) {
            return Err(SceneError::invalid(format!("{} is not a material", self.node(material)?.name)));
        }
        self.check_structural(shape)?;
        let node = self.node_mut(shape)?;
        match &mut node.kind {
            NodeKind::Shape(data) => {
                data.material = Some(material);
                Ok(())
            }
            _ => Err(SceneError::invalid(format!("{} is not a shape", node.name))),
        }
    }

    /// Shape children of a transform.
    pub fn shapes_of(&self, handle: NodeHandle) -> SceneResult<Vec<NodeHandle>> {
        Ok(self
            .node(handle)?
            .children
            .iter()
            .copied()
            .filter(|c| matches!(self.nodes.get(c).map(|n| &n.kind), Some(NodeKind::Shape(_))))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn joint_orientation_aims_primary_axis_at_child() {
        let mut scene = Scene::new();
        let a = scene.create_joint("a", None, Vector3::zeros(), None).unwrap();
        let b = scene
            .create_joint("b", Some(a), Vector3::new(0.0, 3.0, 0.0), None)
            .unwrap();
        scene.orient_joint(a, Some(RotateOrder::Xyz), SecondaryAxis::Zup).unwrap();
        let x_axis = scene.world_rotation(a).unwrap() * Vector3::x();
        assert_relative_eq!(x_axis, Vector3::y(), epsilon = 1e-9);
        // child stayed put and now sits on local +X
        assert_relative_eq!(scene.world_position(b).unwrap(), Vector3::new(0.0, 3.0, 0.0), epsilon = 1e-9);
        let t = scene.get_vec3(b, "translate").unwrap();
        assert_relative_eq!(t[0], 3.0, epsilon = 1e-9);
        assert_relative_eq!(t[1], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn freezing_rotation_keeps_world_pose() {
        let mut scene = Scene::new();
        let a = scene.create_joint("a", None, Vector3::zeros(), None).unwrap();
        let b = scene
            .create_joint("b", Some(a), Vector3::new(2.0, 0.0, 0.0), None)
            .unwrap();
        scene.set(a, "rotate", [0.0, 0.0, 30.0]).unwrap();
        let before = scene.world_position(b).unwrap();
        scene.make_identity_rotate(a).unwrap();
        assert_eq!(scene.get_vec3(a, "rotate").unwrap(), [0.0, 0.0, 0.0]);
        assert_relative_eq!(scene.get_vec3(a, "jointOrient").unwrap()[2], 30.0, epsilon = 1e-9);
        assert_relative_eq!(scene.world_position(b).unwrap(), before, epsilon = 1e-9);
    }

    #[test]
    fn reparent_preserving_world_position() {
        let mut scene = Scene::new();
        let grp = scene.create_transform("grp", None).unwrap();
        scene.set(grp, "translate", [5.0, 0.0, 0.0]).unwrap();
        scene.set(grp, "scale", [2.0, 2.0, 2.0]).unwrap();
        let loc = scene.create_locator("loc", None).unwrap();
        scene.set(loc, "translate", [1.0, 1.0, 0.0]).unwrap();
        scene.reparent(loc, Some(grp), true).unwrap();
        assert_relative_eq!(scene.world_position(loc).unwrap(), Vector3::new(1.0, 1.0, 0.0), epsilon = 1e-9);
        assert_relative_eq!(scene.get_vec3(loc, "scale").unwrap()[0], 0.5, epsilon = 1e-9);
        assert!(scene.reparent(grp, Some(loc), true).is_err());
    }

    #[test]
    fn duplicate_copies_evaluated_values_not_connections() {
        let mut scene = Scene::new();
        let driver = scene.create_transform("driver", None).unwrap();
        let a = scene.create_joint("a", None, Vector3::zeros(), None).unwrap();
        scene.create_joint("b", Some(a), Vector3::new(1.0, 0.0, 0.0), None).unwrap();
        scene.set(driver, "rotateZ", 15.0).unwrap();
        scene.connect(driver, "rotate", a, "rotate", false).unwrap();
        let copies = scene.duplicate(a, "a_copy", true).unwrap();
        assert_eq!(copies.len(), 2);
        assert_eq!(scene.name_of(copies[1]).unwrap(), "b1");
        assert_eq!(scene.get_vec3(copies[0], "rotate").unwrap(), [0.0, 0.0, 15.0]);
        assert!(scene.list_connections(copies[0]).is_empty());
    }
}
