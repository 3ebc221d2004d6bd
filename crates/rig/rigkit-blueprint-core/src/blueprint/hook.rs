//! Hooking: the stretchy link from a module's root control to a control of another module.
//!
//! Every module carries a hidden `unhookedTarget` locator riding just above its root control.
//! `hook_pointConstraint` pulls the far end of the hook chain onto the hook object, which is
//! either that locator or a translation control in another module.

use log::debug;
use rigkit_scene::{ConstraintOptions, NodeHandle, RotateOrder, Scene, SceneError, SecondaryAxis, Vector3};

use super::{Blueprint, InstallContext};
use crate::containers::{add_node_to_container, create_container, with_unlocked_many, ContainerOptions};
use crate::controls::ConnectorKind;
use crate::error::RigResult;
use crate::naming::{is_translation_control, split_all_namespaces};
use crate::stretchy_ik::{basic_stretchy_ik, StretchyIkOptions};

const HOOK_CONSTRAINT_INPUTS: [(&str, &str); 4] = [
    ("parentMatrix", "target[0].targetParentMatrix"),
    ("translate", "target[0].targetTranslate"),
    ("rotatePivot", "target[0].targetRotatePivot"),
    ("rotatePivotTranslate", "target[0].targetRotateTranslate"),
];

const MIN_HOOK_LENGTH: f64 = 1e-9;

impl Blueprint {
    pub fn unhooked_target_name(&self) -> String {
        self.qualify("unhookedTarget")
    }

    pub fn hook_constraint_name(&self) -> String {
        self.qualify("hook_pointConstraint")
    }

    pub fn hook_container_name(&self) -> String {
        self.qualify("hook_container")
    }

    fn root_hook_constraint_name(&self) -> RigResult<String> {
        Ok(format!("{}_hookConstraint", self.root_translation_control()?))
    }

    /// Build the hook representation inside the module container.
    pub(super) fn initialize_hook(&mut self, scene: &mut Scene, ctx: &InstallContext) -> RigResult<()> {
        let root_control = ctx.controls[0];

        let unhooked_name = self.unhooked_target_name();
        let unhooked = scene.create_locator(&unhooked_name, None)?;
        scene.point_constraint(
            &[root_control],
            unhooked,
            &ConstraintOptions::named(format!("{unhooked_name}_pointConstraint")).with_offset(self.config.unhooked_offset),
        )?;
        scene.set(unhooked, "visibility", false)?;

        let requested = self.hook_object.as_deref().filter(|h| self.is_valid_hook(scene, h));
        let hook_target = match requested.and_then(|h| scene.find(h)) {
            Some(h) => h,
            None => {
                if let Some(rejected) = self.hook_object.take() {
                    debug!("{}: {rejected} cannot be a hook; starting unhooked", self.namespace);
                }
                unhooked
            }
        };

        let root_position = scene.world_position(root_control)?;
        let mut target_position = scene.world_position(hook_target)?;
        // A zero-length hook chain never stretches.
        if (target_position - root_position).norm() < MIN_HOOK_LENGTH {
            target_position = root_position + Vector3::from(self.config.unhooked_offset);
        }
        let hook_root = scene.create_joint(&self.qualify("hook_root_joint"), None, root_position, None)?;
        let hook_end = scene.create_joint(&self.qualify("hook_target_joint"), Some(hook_root), target_position, None)?;
        for joint in [hook_root, hook_end] {
            scene.set(joint, "visibility", false)?;
        }
        scene.orient_joint(hook_root, Some(RotateOrder::Xyz), SecondaryAxis::Yup)?;

        let hook_grp = scene.create_transform(&self.qualify("hook_grp"), Some(ctx.module_grp))?;
        scene.reparent(hook_root, Some(hook_grp), true)?;
        scene.reparent(unhooked, Some(hook_grp), true)?;

        let hook_container = create_container(scene, &self.hook_container_name(), &[hook_grp], ContainerOptions::hierarchy())?;
        add_node_to_container(scene, ctx.container, &[hook_container], false, false, false)?;
        for (joint, published) in [
            (hook_root, "hook_root_joint_Rotate"),
            (hook_end, "hook_target_joint_Rotate"),
        ] {
            scene.publish_and_bind(hook_container, joint, "rotate", published)?;
        }

        let ik = basic_stretchy_ik(
            scene,
            &self.config,
            hook_root,
            hook_end,
            hook_container,
            StretchyIkOptions::default(),
        )?;

        let hook_root_name = scene.name_of(hook_root)?.to_string();
        let root_constraint = scene.point_constraint(
            &[root_control],
            hook_root,
            &ConstraintOptions::named(format!("{hook_root_name}_pointConstraint")),
        )?;
        let target_constraint = scene.point_constraint(
            &[hook_target],
            ik.end_locator,
            &ConstraintOptions::named(self.hook_constraint_name()),
        )?;
        add_node_to_container(scene, hook_container, &[root_constraint, target_constraint], false, false, false)?;

        for node in [ik.ik_handle, ik.root_locator, ik.end_locator, ik.pole_vector_object] {
            scene.reparent(node, Some(hook_grp), true)?;
            scene.set(node, "visibility", false)?;
        }

        self.create_connector(
            scene,
            ctx,
            ConnectorKind::Hook,
            hook_root,
            hook_end,
            Some(hook_grp),
            hook_container,
        )?;
        Ok(())
    }

    /// Node currently feeding the hook constraint.
    pub fn find_hook_object(&self, scene: &Scene) -> RigResult<String> {
        let constraint = scene.lookup(&self.hook_constraint_name())?;
        let source = scene
            .source_of(constraint, "target[0].targetParentMatrix")?
            .ok_or_else(|| SceneError::invalid(format!("{} has no hook target", self.hook_constraint_name())))?;
        Ok(scene.name_of(source.node)?.to_string())
    }

    /// Retarget the hook at `new_hook`. Anything other than a translation control of another,
    /// existing module hooks the module to its own unhooked target.
    pub fn rehook(&mut self, scene: &mut Scene, new_hook: Option<&str>) -> RigResult<()> {
        let old_hook = self.find_hook_object(scene)?;
        let unhooked = self.unhooked_target_name();

        let target = match new_hook {
            Some(candidate) if self.is_valid_hook(scene, candidate) => candidate.to_string(),
            Some(candidate) => {
                debug!("{}: {candidate} cannot be a hook; unhooking", self.namespace);
                unhooked.clone()
            }
            None => unhooked.clone(),
        };
        self.hook_object = (target != unhooked).then(|| target.clone());
        if target == old_hook {
            return Ok(());
        }

        self.unconstrain_root_from_hook(scene)?;

        let hook = scene.lookup(&target)?;
        let constraint = scene.lookup(&self.hook_constraint_name())?;
        let containers = [self.container(scene)?, scene.lookup(&self.hook_container_name())?];
        with_unlocked_many(scene, &containers, |scene| {
            for (source, input) in HOOK_CONSTRAINT_INPUTS {
                scene.connect(hook, source, constraint, input, true)?;
            }
            Ok(())
        })?;
        debug!("{} hooked to {target}", self.namespace);
        Ok(())
    }

    fn is_valid_hook(&self, scene: &Scene, candidate: &str) -> bool {
        is_translation_control(candidate)
            && split_all_namespaces(candidate).map_or(false, |(ns, _)| ns != self.namespace)
            && scene.exists(candidate)
    }

    /// Hook object to record for locking, `None` when unhooked. A hooked module is unhooked
    /// as a side effect.
    pub fn find_hook_object_for_lock(&mut self, scene: &mut Scene) -> RigResult<Option<String>> {
        let hook = self.find_hook_object(scene)?;
        if hook == self.unhooked_target_name() {
            return Ok(None);
        }
        self.rehook(scene, None)?;
        Ok(Some(hook))
    }

    pub fn is_root_constrained(&self, scene: &Scene) -> RigResult<bool> {
        Ok(scene.exists(&self.root_hook_constraint_name()?))
    }

    /// Move the root control onto the hook object. No-op when unhooked.
    pub fn snap_root_to_hook(&self, scene: &mut Scene) -> RigResult<()> {
        let hook = self.find_hook_object(scene)?;
        if hook == self.unhooked_target_name() {
            return Ok(());
        }
        let position = scene.world_position(scene.lookup(&hook)?)?;
        let root_control = scene.lookup(&self.root_translation_control()?)?;
        let container = self.container(scene)?;
        with_unlocked_many(scene, &[container], |scene| {
            scene.set_world_position(root_control, position)?;
            Ok(())
        })
    }

    /// Pin the root control to the hook object and hide it. No-op when unhooked.
    pub fn constrain_root_to_hook(&self, scene: &mut Scene) -> RigResult<()> {
        let hook_name = self.find_hook_object(scene)?;
        if hook_name == self.unhooked_target_name() {
            return Ok(());
        }
        let hook = scene.lookup(&hook_name)?;
        let root_control = scene.lookup(&self.root_translation_control()?)?;
        let name = self.root_hook_constraint_name()?;
        let container = self.container(scene)?;
        with_unlocked_many(scene, &[container], |scene| {
            scene.point_constraint(&[hook], root_control, &ConstraintOptions::named(name))?;
            scene.lock_attr(root_control, "translate", true)?;
            set_locked_visibility(scene, root_control, false)
        })
    }

    /// Release the root control from the hook object. No-op when not constrained.
    pub fn unconstrain_root_from_hook(&self, scene: &mut Scene) -> RigResult<()> {
        let Some(constraint) = scene.find(&self.root_hook_constraint_name()?) else {
            return Ok(());
        };
        let root_control = scene.lookup(&self.root_translation_control()?)?;
        let container = self.container(scene)?;
        with_unlocked_many(scene, &[container], |scene| {
            scene.delete(constraint)?;
            scene.lock_attr(root_control, "translate", false)?;
            set_locked_visibility(scene, root_control, true)
        })
    }
}

fn set_locked_visibility(scene: &mut Scene, node: NodeHandle, visible: bool) -> RigResult<()> {
    scene.lock_attr(node, "visibility", false)?;
    scene.set(node, "visibility", visible)?;
    scene.lock_attr(node, "visibility", true)?;
    Ok(())
}
