//! Stretchy IK: an IK chain whose joints lengthen with the distance between two locators.
//!
//! The chain's rest length is the sum of `|translateX|` over its non-root joints, captured
//! when the network is built. A `distanceBetween` node measures root locator to end locator,
//! a divide node turns that into `scaleFactor = distance / rest_length`, and one multiply
//! node per non-root joint feeds `original_tx * scaleFactor` back into `translateX`.

use log::debug;
use rigkit_scene::{
    AddOptions, ConstraintOptions, MultiplyDivideOp, NodeHandle, NodeKind, Scene, SceneError, Vector3,
};

use crate::config::RigConfig;
use crate::error::RigResult;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StretchyIkOptions {
    /// Existing pole vector target; a hidden locator is synthesized when `None`
    pub pole_vector_object: Option<NodeHandle>,
    /// Accepted for callers; no minimum-length clamp is built
    pub lock_minimum_length: bool,
    /// Accepted for callers; not wired into the network
    pub scale_correction_attribute: Option<String>,
}

/// Nodes created by [`basic_stretchy_ik`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StretchyIkNodes {
    pub ik_handle: NodeHandle,
    pub ik_effector: NodeHandle,
    pub root_locator: NodeHandle,
    pub end_locator: NodeHandle,
    pub pole_vector_object: NodeHandle,
    pub root_locator_point_constraint: NodeHandle,
    pub ik_handle_point_constraint: NodeHandle,
}

/// Joints below `root` down to `end`, following the first child joint at each step.
fn chain_below(scene: &Scene, root: NodeHandle, end: NodeHandle) -> RigResult<Vec<NodeHandle>> {
    let mut chain = Vec::new();
    let mut current = root;
    while current != end {
        let next = scene
            .child_transforms(current)?
            .into_iter()
            .find(|c| scene.node(*c).map(|n| matches!(n.kind(), NodeKind::Joint)).unwrap_or(false));
        let Some(next) = next else {
            return Err(SceneError::invalid(format!(
                "{} is not below {}",
                scene.name_of(end)?,
                scene.name_of(root)?
            ))
            .into());
        };
        chain.push(next);
        current = next;
    }
    Ok(chain)
}

/// Build a stretchy IK network from `root` to `end` and add it to `container`.
pub fn basic_stretchy_ik(
    scene: &mut Scene,
    config: &RigConfig,
    root: NodeHandle,
    end: NodeHandle,
    container: NodeHandle,
    options: StretchyIkOptions,
) -> RigResult<StretchyIkNodes> {
    if options.lock_minimum_length || options.scale_correction_attribute.is_some() {
        debug!("stretchy ik: minimum length and scale correction options are not applied");
    }
    let root_name = scene.name_of(root)?.to_string();
    let end_name = scene.name_of(end)?.to_string();

    let chain = chain_below(scene, root, end)?;
    let mut original_tx = Vec::with_capacity(chain.len());
    for &joint in &chain {
        original_tx.push(scene.get_f64(joint, "translateX")?);
    }
    let rest_length: f64 = original_tx.iter().map(|tx| tx.abs()).sum();

    let ik_name = format!("{root_name}_ikHandle");
    let ik = scene.create_ik_handle(&ik_name, root, end, None)?;
    scene.rename(ik.effector, &format!("{ik_name}_effector"))?;

    let mut to_contain = vec![ik.handle, ik.effector];

    let pole = match options.pole_vector_object {
        Some(pole) => pole,
        None => {
            let pole = scene.create_locator(&format!("{root_name}_poleVectorLocator"), None)?;
            let offset = Vector3::from(config.pole_vector_offset);
            scene.set_world_position(pole, scene.world_position(root)? + offset)?;
            scene.set(pole, "visibility", false)?;
            to_contain.push(pole);
            pole
        }
    };
    scene.pole_vector_constraint(pole, ik.handle, None)?;

    let root_locator = scene.create_locator(&format!("{root_name}_rootPosLocator"), None)?;
    let root_locator_point_constraint = scene.point_constraint(
        &[root],
        root_locator,
        &ConstraintOptions::named(format!("{root_name}_rootPosLocator_pointConstraint")),
    )?;

    let end_locator = scene.create_locator(&format!("{end_name}_endPosLocator"), None)?;
    scene.set_world_position(end_locator, scene.world_position(ik.handle)?)?;
    let ik_handle_point_constraint = scene.point_constraint(
        &[end_locator],
        ik.handle,
        &ConstraintOptions::named(format!("{ik_name}_pointConstraint")),
    )?;
    for locator in [root_locator, end_locator] {
        scene.set(locator, "visibility", false)?;
    }

    let distance = scene.create_distance_between(&format!("{root_name}_distanceBetween"))?;
    scene.connect(root_locator, "worldPosition", distance, "point1", false)?;
    scene.connect(end_locator, "worldPosition", distance, "point2", false)?;

    let scale_factor = scene.create_multiply_divide(&format!("{root_name}_scaleFactor"), MultiplyDivideOp::Divide)?;
    scene.connect(distance, "distance", scale_factor, "input1X", false)?;
    scene.set(scale_factor, "input2X", rest_length)?;

    to_contain.extend([root_locator, end_locator, distance, scale_factor]);
    for (&joint, &tx) in chain.iter().zip(&original_tx) {
        let joint_name = scene.name_of(joint)?.to_string();
        let multiply =
            scene.create_multiply_divide(&format!("{joint_name}_scaleMultiply"), MultiplyDivideOp::Multiply)?;
        scene.connect(scale_factor, "outputX", multiply, "input1X", false)?;
        scene.set(multiply, "input2X", tx)?;
        scene.connect(multiply, "outputX", joint, "translateX", false)?;
        to_contain.push(multiply);
    }

    scene.container_add(
        container,
        &to_contain,
        AddOptions {
            include_hierarchy_below: true,
            ..AddOptions::default()
        },
    )?;
    debug!("stretchy ik {ik_name}: rest length {rest_length}");

    Ok(StretchyIkNodes {
        ik_handle: ik.handle,
        ik_effector: ik.effector,
        root_locator,
        end_locator,
        pole_vector_object: pole,
        root_locator_point_constraint,
        ik_handle_point_constraint,
    })
}
