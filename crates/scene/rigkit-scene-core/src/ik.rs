//! Rotate-plane IK handles.
//!
//! The solver only drives the start joint: it swings the chain so the start joint aims at the
//! handle, rotated about that aim by the pole vector and `twist`. Distance along the chain is
//! left to whatever drives the joint translations (see the stretchy setup in the blueprint crate).
//!
//! Poses are measured against the [`IkRest`] captured when the handle (or its pole vector
//! constraint) is created, so a freshly built handle never moves the chain.

use log::debug;
use nalgebra::{Matrix3, Rotation3, Unit, Vector3};

use crate::error::{SceneError, SceneResult};
use crate::eval::EvalContext;
use crate::math::{euler_to_rotation, rotation_of, rotation_to_euler, RotateOrder};
use crate::node::{IkHandleData, IkRest, NodeHandle, NodeKind};
use crate::scene::Scene;
use crate::value::AttrValue;

const EPS: f64 = 1e-9;

/// Nodes created for one IK handle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct IkHandleNodes {
    pub handle: NodeHandle,
    pub effector: NodeHandle,
}

/// Orthonormal frame with `aim` as X and the pole projected off it as Y.
fn aim_pole_frame(aim: &Vector3<f64>, pole: &Vector3<f64>) -> Option<Rotation3<f64>> {
    let x = aim.try_normalize(EPS)?;
    let y = (pole - x * pole.dot(&x)).try_normalize(EPS)?;
    let z = x.cross(&y);
    Some(Rotation3::from_matrix_unchecked(Matrix3::from_columns(&[x, y, z])))
}

impl Scene {
    fn chain_joints(&self, start: NodeHandle, end: NodeHandle) -> SceneResult<()> {
        for h in [start, end] {
            let node = self.node(h)?;
            if !matches!(node.kind, NodeKind::Joint) {
                return Err(SceneError::invalid(format!("{} is not a joint", node.name)));
            }
        }
        if !self.is_ancestor(start, end)? {
            return Err(SceneError::invalid(format!(
                "{} is not below {}",
                self.node(end)?.name,
                self.node(start)?.name
            )));
        }
        Ok(())
    }

    /// Create an IK handle at the end joint's position, driving `start` so the chain reaches it.
    /// The effector is named `<name>_ikEffector` and sits beside the end joint.
    pub fn create_ik_handle(
        &mut self,
        name: &str,
        start: NodeHandle,
        end: NodeHandle,
        parent: Option<NodeHandle>,
    ) -> SceneResult<IkHandleNodes> {
        self.chain_joints(start, end)?;
        let end_position = self.world_position(end)?;
        let placeholder = IkRest {
            rotation: Rotation3::identity(),
            aim: Vector3::x(),
            pole: Vector3::y(),
        };
        let handle = self.create_node(
            name,
            NodeKind::IkHandle(IkHandleData {
                start_joint: start,
                end_joint: end,
                effector: None,
                rest: placeholder,
            }),
            parent,
        )?;
        self.set_world_position(handle, end_position)?;

        let effector_parent = self.parent_of(end)?;
        let effector_name = self.unique_name(&format!("{name}_ikEffector"));
        let effector = self.create_node(&effector_name, NodeKind::IkEffector, effector_parent)?;
        self.connect(end, "translate", effector, "translate", false)?;
        if let NodeKind::IkHandle(data) = &mut self.node_mut(handle)?.kind {
            data.effector = Some(effector);
        }

        self.capture_ik_rest(handle)?;
        self.connect(handle, "startJointRotate", start, "rotate", false)?;
        debug!("ik handle {name} created");
        Ok(IkHandleNodes { handle, effector })
    }

    /// Make the chain's current pose the solver's reference.
    pub fn capture_ik_rest(&mut self, handle: NodeHandle) -> SceneResult<()> {
        let (start, _) = self.ik_chain(handle)?;
        let pose = self.get_vec3(start, "rotate")?;
        self.capture_ik_rest_at(handle, pose)
    }

    /// Record `pose` (the start joint's rotate) as the reference for the current handle
    /// position and pole vector.
    pub(crate) fn capture_ik_rest_at(&mut self, handle: NodeHandle, pose: [f64; 3]) -> SceneResult<()> {
        let (start, _) = self.ik_chain(handle)?;
        let mut cx = EvalContext::default();
        let parent_rot = rotation_of(&self.parent_matrix_in(start, &mut cx)?).inverse();
        let root = self.world_position_in(start, &mut cx)?;
        let target = self.world_position_in(handle, &mut cx)?;
        let pole = self.read_vec3(handle, "poleVector", &mut cx)?;
        let jo = self.read_vec3(start, "jointOrient", &mut cx)?;
        let order = self.read_rotate_order(start, &mut cx)?;
        let rotation = euler_to_rotation([jo.x, jo.y, jo.z], RotateOrder::Xyz) * euler_to_rotation(pose, order);
        let aim = match (parent_rot * (target - root)).try_normalize(EPS) {
            Some(a) => a,
            None => rotation * Vector3::x(),
        };
        let rest = IkRest {
            rotation,
            aim,
            pole: parent_rot * pole,
        };
        if let NodeKind::IkHandle(data) = &mut self.node_mut(handle)?.kind {
            data.rest = rest;
        }
        Ok(())
    }

    /// Start and end joints of an IK handle.
    pub fn ik_chain(&self, handle: NodeHandle) -> SceneResult<(NodeHandle, NodeHandle)> {
        match &self.node(handle)?.kind {
            NodeKind::IkHandle(data) => Ok((data.start_joint, data.end_joint)),
            _ => Err(SceneError::invalid(format!(
                "{} is not an ik handle",
                self.node(handle)?.name
            ))),
        }
    }
}

/// Rotation of the start joint for the current handle position, pole and twist.
pub(crate) fn solve(scene: &Scene, handle: NodeHandle, data: &IkHandleData, cx: &mut EvalContext) -> SceneResult<AttrValue> {
    let start = data.start_joint;
    let rest = &data.rest;
    let parent_rot = rotation_of(&scene.parent_matrix_in(start, cx)?).inverse();
    let root = scene.world_position_in(start, cx)?;
    let target = scene.world_position_in(handle, cx)?;
    let pole = parent_rot * scene.read_vec3(handle, "poleVector", cx)?;
    let twist = scene.read_f64(handle, "twist", cx)?;

    let local = match (parent_rot * (target - root)).try_normalize(EPS) {
        None => rest.rotation,
        Some(aim) => {
            let swing = match (aim_pole_frame(&aim, &pole), aim_pole_frame(&rest.aim, &rest.pole)) {
                (Some(now), Some(then)) => now * then.inverse(),
                _ => Rotation3::rotation_between(&rest.aim, &aim).unwrap_or_else(|| {
                    let axis = Unit::try_new(rest.pole, EPS).unwrap_or_else(Vector3::z_axis);
                    Rotation3::from_axis_angle(&axis, std::f64::consts::PI)
                }),
            };
            let twist = Rotation3::from_axis_angle(&Unit::new_normalize(aim), twist.to_radians());
            twist * swing * rest.rotation
        }
    };

    let jo = scene.read_vec3(start, "jointOrient", cx)?;
    let order = scene.read_rotate_order(start, cx)?;
    let rotate = euler_to_rotation([jo.x, jo.y, jo.z], RotateOrder::Xyz).inverse() * local;
    Ok(AttrValue::Double3(rotation_to_euler(&rotate, order)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn chain(scene: &mut Scene) -> (NodeHandle, NodeHandle, NodeHandle) {
        let a = scene.create_joint("a", None, Vector3::zeros(), None).unwrap();
        let b = scene.create_joint("b", Some(a), Vector3::new(4.0, 0.0, 0.0), None).unwrap();
        let c = scene.create_joint("c", Some(b), Vector3::new(8.0, 0.0, 0.0), None).unwrap();
        (a, b, c)
    }

    #[test]
    fn new_handle_leaves_chain_in_place() {
        let mut scene = Scene::new();
        let (a, _, c) = chain(&mut scene);
        let ik = scene.create_ik_handle("ik", a, c, None).unwrap();
        assert_eq!(scene.name_of(ik.effector).unwrap(), "ik_ikEffector");
        assert_relative_eq!(scene.world_position(ik.handle).unwrap(), Vector3::new(8.0, 0.0, 0.0), epsilon = 1e-9);
        let r = scene.get_vec3(a, "rotate").unwrap();
        assert_relative_eq!(Vector3::from(r), Vector3::zeros(), epsilon = 1e-9);
        assert_eq!(scene.ik_chain(ik.handle).unwrap(), (a, c));
    }

    #[test]
    fn moving_the_handle_aims_the_chain() {
        let mut scene = Scene::new();
        let (a, _, c) = chain(&mut scene);
        let ik = scene.create_ik_handle("ik", a, c, None).unwrap();
        scene.set(ik.handle, "translate", [0.0, 8.0, 0.0]).unwrap();
        let p = scene.world_position(c).unwrap();
        assert_relative_eq!(p, Vector3::new(0.0, 8.0, 0.0), epsilon = 1e-9);
    }

    #[test]
    fn twist_rolls_about_the_aim() {
        let mut scene = Scene::new();
        let a = scene.create_joint("a", None, Vector3::zeros(), None).unwrap();
        let b = scene.create_joint("b", Some(a), Vector3::new(4.0, 1.0, 0.0), None).unwrap();
        let c = scene.create_joint("c", Some(b), Vector3::new(8.0, 0.0, 0.0), None).unwrap();
        let ik = scene.create_ik_handle("ik", a, c, None).unwrap();
        let before = scene.world_position(b).unwrap();
        assert_relative_eq!(before, Vector3::new(4.0, 1.0, 0.0), epsilon = 1e-9);
        scene.set(ik.handle, "twist", 90.0).unwrap();
        let after = scene.world_position(b).unwrap();
        assert_relative_eq!(after.x, 4.0, epsilon = 1e-9);
        assert_relative_eq!(after.y.abs() + after.z.abs(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(after.y, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn pole_vector_constraint_keeps_the_pose() {
        let mut scene = Scene::new();
        let (a, b, c) = chain(&mut scene);
        let ik = scene.create_ik_handle("ik", a, c, None).unwrap();
        let pole = scene.create_locator("pole", None).unwrap();
        scene.set(pole, "translate", [4.0, 0.0, -5.0]).unwrap();
        scene.pole_vector_constraint(pole, ik.handle, None).unwrap();
        let r = scene.get_vec3(a, "rotate").unwrap();
        assert_relative_eq!(Vector3::from(r), Vector3::zeros(), epsilon = 1e-9);
        assert_relative_eq!(scene.world_position(b).unwrap(), Vector3::new(4.0, 0.0, 0.0), epsilon = 1e-9);
        assert_relative_eq!(
            Vector3::from(scene.get_vec3(ik.handle, "poleVector").unwrap()),
            Vector3::new(4.0, 0.0, -5.0),
            epsilon = 1e-9
        );
    }
}
