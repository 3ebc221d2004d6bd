//! Locking: replacing the editable blueprint with permanent joints.
//!
//! Phase 1 is module specific and yields a [`ModuleSnapshot`]. Phase 2 tears the blueprint
//! down and rebuilds the joints from the snapshot together with the creation-pose blend
//! network. Phase 3 attaches `HOOK_IN` to the hook module's joint and locks the result.

use log::{debug, info};
use rigkit_scene::{
    AttrValue, ConstraintOptions, MultiplyDivideOp, NodeHandle, PlusMinusOp, RotateOrder, Scene, SecondaryAxis,
    Vector3,
};
use serde::{Deserialize, Serialize};

use super::Blueprint;
use crate::containers::{add_node_to_container, create_container, ContainerOptions};
use crate::error::RigResult;
use crate::naming::{joint_of_translation_control, split_leading_namespace};

/// Orientation of one joint built by axis aiming.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisOrientation {
    pub order: RotateOrder,
    pub secondary: SecondaryAxis,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "values", rename_all = "snake_case")]
pub enum JointOrientations {
    /// `jointOrient` per joint, in degrees; missing entries are zero
    Explicit(Vec<[f64; 3]>),
    /// Aim each joint at its child; entry `i` orients joint `i`
    Axis(Vec<AxisOrientation>),
}

/// Everything phase 2 needs, captured before the blueprint is deleted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModuleSnapshot {
    pub joint_positions: Vec<[f64; 3]>,
    pub orientations: JointOrientations,
    pub rotation_orders: Vec<RotateOrder>,
    pub preferred_angles: Option<Vec<[f64; 3]>>,
    /// Hook translation control, `None` when unhooked
    pub hook_object: Option<String>,
    /// Give the root joint translate and scale blending too
    pub root_transform: bool,
}

impl Blueprint {
    pub fn blueprint_joint_name(&self, joint: &str) -> String {
        self.qualify(&format!("blueprint_{joint}"))
    }

    /// True once phase 2 has replaced the blueprint.
    pub fn is_locked(&self, scene: &Scene) -> bool {
        scene.exists(&self.qualify("blueprint_container"))
    }

    /// Delete the blueprint and build the locked joint hierarchy from `snapshot`.
    pub fn lock_phase2(&mut self, scene: &mut Scene, snapshot: &ModuleSnapshot) -> RigResult<()> {
        let container = self.container(scene)?;
        scene.lock_container(container, false)?;
        scene.delete(container)?;
        let leftovers = scene.nodes_in_namespace(&self.namespace);
        if !leftovers.is_empty() {
            debug!("{}: removing {} node(s) left outside the container", self.namespace, leftovers.len());
            scene.delete_many(&leftovers)?;
        }

        let joints = self.build_locked_joints(scene, snapshot)?;
        let Some(&root) = joints.first() else {
            return Ok(());
        };

        let blueprint_grp = scene.create_transform(&self.qualify("blueprint_joints_grp"), None)?;
        scene.reparent(root, Some(blueprint_grp), true)?;

        let creation_pose = scene.duplicate(blueprint_grp, &self.qualify("creationPose_joints_grp"), true)?;
        let Some((&creation_pose_grp, creation_pose_joints)) = creation_pose.split_first() else {
            return Err(rigkit_scene::SceneError::invalid("duplicate produced no nodes").into());
        };
        for (&node, info) in creation_pose_joints.iter().zip(&self.joint_info) {
            scene.rename(node, &self.qualify(&format!("creationPose_{}", info.name)))?;
            scene.set(node, "visibility", false)?;
        }
        scene.add_attr(blueprint_grp, "controlModulesInstalled", false)?;

        let hook_in = scene.create_transform(&self.qualify("HOOK_IN"), None)?;
        for grp in [blueprint_grp, creation_pose_grp] {
            scene.reparent(grp, Some(hook_in), true)?;
        }

        let settings = scene.create_locator(&self.qualify("SETTINGS"), None)?;
        scene.set(settings, "visibility", false)?;
        scene.add_attr(settings, "activeModule", AttrValue::enum_from_fields("None:", 0))?;
        scene.add_attr(settings, "creationPoseWeight", 1.0)?;

        let mut blueprint_nodes = self.build_blend_network(scene, &joints, settings, snapshot.root_transform)?;
        blueprint_nodes.extend([blueprint_grp, creation_pose_grp]);
        let blueprint_container = create_container(
            scene,
            &self.qualify("blueprint_container"),
            &blueprint_nodes,
            ContainerOptions::everything(),
        )?;

        let module_grp = scene.create_transform(&self.qualify("module_grp"), None)?;
        for node in [hook_in, settings] {
            scene.reparent(node, Some(module_grp), true)?;
        }
        let module_container = create_container(
            scene,
            &self.container_name(),
            &[module_grp, settings, hook_in, blueprint_container],
            ContainerOptions::everything(),
        )?;
        scene.publish_and_bind(module_container, settings, "activeModule", "activeModule")?;
        scene.publish_and_bind(module_container, settings, "creationPoseWeight", "creationPoseWeight")?;

        scene.add_attr(module_grp, "hierarchicalScale", 0.0)?;
        scene.connect(hook_in, "scaleY", module_grp, "hierarchicalScale", false)?;
        info!("{}: built {} locked joint(s)", self.namespace, joints.len());
        Ok(())
    }

    fn build_locked_joints(&self, scene: &mut Scene, snapshot: &ModuleSnapshot) -> RigResult<Vec<NodeHandle>> {
        let count = snapshot.joint_positions.len();
        let radius = if count == 1 {
            self.config.single_joint_radius
        } else {
            self.config.blueprint_joint_radius
        };

        let mut joints: Vec<NodeHandle> = Vec::with_capacity(count);
        for (i, position) in snapshot.joint_positions.iter().enumerate() {
            let leaf = self
                .joint_info
                .get(i)
                .map(|j| j.name.clone())
                .unwrap_or_else(|| format!("joint{i}"));
            let name = self.blueprint_joint_name(&leaf);
            let position = Vector3::from(*position);
            let previous = joints.last().copied();

            let joint = match &snapshot.orientations {
                JointOrientations::Axis(axes) => {
                    let joint = scene.create_joint(&name, None, position, None)?;
                    if let Some(previous) = previous {
                        scene.reparent(joint, Some(previous), true)?;
                        if let Some(axis) = axes.get(i - 1) {
                            scene.orient_joint(previous, Some(axis.order), axis.secondary)?;
                            scene.make_identity_rotate(joint)?;
                        }
                    }
                    joint
                }
                JointOrientations::Explicit(orients) => {
                    let orient = orients.get(i).copied().unwrap_or([0.0; 3]);
                    scene.create_joint(&name, previous, position, Some(orient))?
                }
            };

            scene.set(joint, "radius", radius)?;
            if let Some(order) = snapshot.rotation_orders.get(i) {
                scene.set(joint, "rotateOrder", order.index())?;
            }
            if let Some(angle) = snapshot.preferred_angles.as_ref().and_then(|a| a.get(i)) {
                scene.set(joint, "preferredAngle", *angle)?;
            }
            scene.set(joint, "segmentScaleCompensate", false)?;
            joints.push(joint);
        }
        Ok(joints)
    }

    /// Utility nodes that blend each joint between its creation pose (scaled by
    /// `SETTINGS.creationPoseWeight`) and the control modules' contributions.
    fn build_blend_network(
        &self,
        scene: &mut Scene,
        joints: &[NodeHandle],
        settings: NodeHandle,
        root_transform: bool,
    ) -> RigResult<Vec<NodeHandle>> {
        let count = joints.len();
        let mut nodes = Vec::new();
        for (index, &joint) in joints.iter().enumerate() {
            let joint_name = scene.name_of(joint)?.to_string();

            if index + 1 < count || count == 1 {
                let add = scene.create_plus_minus_average(&format!("{joint_name}_addRotations"), PlusMinusOp::Sum)?;
                scene.connect(add, "output3D", joint, "rotate", true)?;
                let dummy = scene.create_multiply_divide(
                    &format!("{joint_name}_dummyRotationsMultiply"),
                    MultiplyDivideOp::Multiply,
                )?;
                scene.connect(dummy, "output", add, "input3D[0]", true)?;
                nodes.extend([add, dummy]);
            }

            if index > 0 {
                let original_tx = scene.get_f64(joint, "translateX")?;
                let add = scene.create_plus_minus_average(&format!("{joint_name}_addTx"), PlusMinusOp::Sum)?;
                scene.connect(add, "output1D", joint, "translateX", true)?;
                let original = scene.create_multiply_divide(&format!("{joint_name}_original_Tx"), MultiplyDivideOp::Multiply)?;
                scene.set(original, "input1X", original_tx)?;
                scene.lock_attr(original, "input1X", true)?;
                scene.connect(settings, "creationPoseWeight", original, "input2X", false)?;
                scene.connect(original, "outputX", add, "input1D[0]", true)?;
                nodes.extend([add, original]);
            } else if root_transform {
                for (attr, label) in [("translate", "Translate"), ("scale", "Scale")] {
                    let value = scene.get_vec3(joint, attr)?;
                    let add = scene.create_plus_minus_average(&format!("{joint_name}_add{label}"), PlusMinusOp::Sum)?;
                    scene.connect(add, "output3D", joint, attr, true)?;
                    let original = scene.create_multiply_divide(
                        &format!("{joint_name}_original_{attr}"),
                        MultiplyDivideOp::Multiply,
                    )?;
                    scene.set(original, "input1", value)?;
                    for axis in ["X", "Y", "Z"] {
                        scene.connect(settings, "creationPoseWeight", original, &format!("input2{axis}"), false)?;
                    }
                    scene.connect(original, "output", add, "input3D[0]", true)?;
                    nodes.extend([add, original]);
                }
            }
        }
        Ok(nodes)
    }

    /// Constrain `HOOK_IN` to the locked joint behind `hook` and lock the module.
    pub fn lock_phase3(&self, scene: &mut Scene, hook: Option<&str>) -> RigResult<()> {
        let container = self.container(scene)?;
        if let Some(hook) = hook {
            let target_name = locked_hook_joint(hook)?;
            let target = scene.lookup(&target_name)?;
            let hook_in = scene.lookup(&self.qualify("HOOK_IN"))?;
            let parent = scene.parent_constraint(
                &[target],
                hook_in,
                &ConstraintOptions::named(self.qualify("hook_parentConstraint")).maintain_offset(true),
            )?;
            let scale = scene.scale_constraint(
                &[target],
                hook_in,
                &ConstraintOptions::named(self.qualify("hook_scaleConstraint")).maintain_offset(true),
            )?;
            add_node_to_container(scene, container, &[parent, scale], false, false, false)?;
            debug!("{}: HOOK_IN follows {target_name}", self.namespace);
        }
        scene.lock_container(container, true)?;
        Ok(())
    }
}

/// `Other__b:end_joint_translation_control` -> `Other__b:blueprint_end_joint`.
fn locked_hook_joint(hook: &str) -> RigResult<String> {
    let invalid = || rigkit_scene::SceneError::invalid(format!("{hook} is not a translation control"));
    let (module, node) = split_leading_namespace(hook).ok_or_else(invalid)?;
    let joint = joint_of_translation_control(&node).ok_or_else(invalid)?;
    Ok(format!("{module}:blueprint_{joint}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_joint_of_a_translation_control() {
        assert_eq!(
            locked_hook_joint("Other__b:end_joint_translation_control").unwrap(),
            "Other__b:blueprint_end_joint"
        );
        assert!(locked_hook_joint("end_joint_translation_control").is_err());
        assert!(locked_hook_joint("Other__b:end_joint").is_err());
    }

    #[test]
    fn snapshot_serializes_orientation_mode() {
        let snapshot = ModuleSnapshot {
            joint_positions: vec![[0.0, 0.0, 0.0]],
            orientations: JointOrientations::Axis(vec![AxisOrientation {
                order: RotateOrder::Xyz,
                secondary: SecondaryAxis::Yup,
            }]),
            rotation_orders: vec![RotateOrder::Yzx],
            preferred_angles: None,
            hook_object: None,
            root_transform: false,
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["orientations"]["mode"], "axis");
        let back: ModuleSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
    }
}
