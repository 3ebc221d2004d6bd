//! Two joints with an orientation connector controlling the first joint's twist.
//! Suited to clavicles and shoulders.

use rigkit_scene::{RotateOrder, Scene};

use crate::blueprint::{Blueprint, BlueprintModule, JointInfo, JointOrientations, ModuleSnapshot, UiControl};
use crate::error::RigResult;

pub const CLASS_NAME: &str = "SingleJointSegment";
pub const DESCRIPTION: &str =
    "Creates 2 joints with control for 1st joint's orientation and rotation order. Ideal use: Clavicle/Shoulder";
/// Icon path relative to the installation root.
pub const ICON: &str = "Icons/_singleJointSeg.xpm";

#[derive(Clone, Debug, PartialEq)]
pub struct SingleJointSegment {
    blueprint: Blueprint,
}

impl SingleJointSegment {
    pub fn new(user_name: &str, hook: Option<&str>) -> Self {
        let joints = vec![
            JointInfo::new("root_joint", [0.0, 0.0, 0.0]),
            JointInfo::new("end_joint", [4.0, 0.0, 0.0]),
        ];
        Self {
            blueprint: Blueprint::new(CLASS_NAME, user_name, joints, hook),
        }
    }

    pub(crate) fn boxed(user_name: &str, hook: Option<&str>) -> Box<dyn BlueprintModule> {
        Box::new(Self::new(user_name, hook))
    }
}

impl BlueprintModule for SingleJointSegment {
    fn blueprint(&self) -> &Blueprint {
        &self.blueprint
    }

    fn blueprint_mut(&mut self) -> &mut Blueprint {
        &mut self.blueprint
    }

    fn ui_controls(&self) -> Vec<UiControl> {
        self.blueprint
            .joint_names()
            .into_iter()
            .take(1)
            .map(|joint| UiControl::RotationOrder { joint })
            .collect()
    }

    fn lock_phase1(&mut self, scene: &mut Scene) -> RigResult<Option<ModuleSnapshot>> {
        let joints = self.blueprint.joints(scene)?;
        let joint_positions = self.blueprint.joint_world_positions(scene)?;
        let Some(&root) = joints.first() else {
            return Ok(None);
        };

        let container = self.blueprint.container(scene)?;
        let blueprint = &self.blueprint;
        let orientation = scene.with_unlocked(container, |scene| {
            blueprint.orientation_controlled_joint_orientation(scene, root)
        })?;
        let order = RotateOrder::from_index(scene.get_f64(root, "rotateOrder")? as i64).unwrap_or_default();

        let hook_object = self.blueprint.find_hook_object_for_lock(scene)?;
        Ok(Some(ModuleSnapshot {
            joint_positions,
            orientations: JointOrientations::Explicit(vec![orientation]),
            rotation_orders: vec![order],
            preferred_angles: None,
            hook_object,
            root_transform: false,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_gets_a_rotation_order_selector() {
        let module = SingleJointSegment::new("clavicle", None);
        assert_eq!(module.blueprint().namespace(), "SingleJointSegment__clavicle");
        assert_eq!(
            module.ui_controls(),
            vec![UiControl::RotationOrder {
                joint: "SingleJointSegment__clavicle:root_joint".into()
            }]
        );
        assert!(module.can_be_mirrored());
        assert!(module.orientation_controlled_segment());
    }
}
