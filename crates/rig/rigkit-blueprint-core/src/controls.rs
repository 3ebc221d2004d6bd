//! Builders for the interactive objects of a blueprint: translation controls, connectors
//! and the module transform.

use rigkit_scene::{NodeHandle, Scene, Vector3};

use crate::containers::{add_node_to_container, create_container, ContainerOptions};
use crate::error::RigResult;
use crate::naming::{split_all_namespaces, translation_control_name};
use crate::templates::{self, TemplateLibrary};

/// A control together with the container that owns it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ControlObject {
    pub container: NodeHandle,
    pub control: NodeHandle,
    /// Parent group that constraints drive, for connectors
    pub constrained_group: Option<NodeHandle>,
}

/// The connector flavours drawn between joints.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectorKind {
    Hierarchy,
    Orientation,
    Hook,
}

impl ConnectorKind {
    fn template(self) -> &'static str {
        match self {
            ConnectorKind::Hierarchy => templates::HIERARCHY_CONNECTOR,
            ConnectorKind::Orientation => templates::ORIENTATION_CONNECTOR,
            ConnectorKind::Hook => templates::HOOK_CONNECTOR,
        }
    }

    /// `<joint>_<suffix>` names the connector control.
    pub fn suffix(self) -> &'static str {
        self.template()
    }
}

fn leaf(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, l)| l).unwrap_or(name)
}

/// Attach the template's shapes (and materials) to `control`.
fn attach_shapes(
    scene: &mut Scene,
    library: &TemplateLibrary,
    template: &str,
    control: NodeHandle,
    control_name: &str,
) -> RigResult<Vec<NodeHandle>> {
    let template = library.get(template)?.clone();
    let mut shapes = Vec::with_capacity(template.shapes.len());
    for s in template.shapes {
        let shape_name = format!("{control_name}{}", s.suffix);
        let shape = scene.create_shape(&shape_name, control, s.geometry)?;
        if let Some(color) = s.color {
            let material = scene.create_material(&format!("{shape_name}_material"), color)?;
            scene.assign_material(shape, material)?;
        }
        if template.unlit {
            scene.set(shape, "overrideEnabled", true)?;
            scene.set(shape, "overrideShading", false)?;
        }
        shapes.push(shape);
    }
    Ok(shapes)
}

/// `<joint>_translation_control` in its own container, `translate` published as `<joint>_T`.
pub fn create_translation_control(
    scene: &mut Scene,
    library: &TemplateLibrary,
    joint_name: &str,
) -> RigResult<ControlObject> {
    let name = translation_control_name(joint_name);
    let control = scene.create_transform(&name, None)?;
    attach_shapes(scene, library, templates::TRANSLATION_CONTROL, control, &name)?;
    let container = create_container(
        scene,
        &format!("{name}_container"),
        &[control],
        ContainerOptions::everything(),
    )?;
    scene.publish_and_bind(container, control, "translate", &translation_publish_name(joint_name))?;
    Ok(ControlObject {
        container,
        control,
        constrained_group: None,
    })
}

/// Published name of a translation control's `translate`.
pub fn translation_publish_name(joint_name: &str) -> String {
    format!("{}_T", leaf(joint_name))
}

/// Published name of an orientation connector's twist.
pub fn orientation_publish_name(joint_name: &str) -> String {
    format!("{}_orientation", leaf(joint_name))
}

/// A connector control under a `_parentConstraintGrp` group, both in a fresh container.
/// Orientation connectors publish `rotateX` as `<joint>_orientation`.
pub fn create_connector(
    scene: &mut Scene,
    library: &TemplateLibrary,
    kind: ConnectorKind,
    joint_name: &str,
) -> RigResult<ControlObject> {
    let name = format!("{joint_name}_{}", kind.suffix());
    let group = scene.create_transform(&format!("{name}_parentConstraintGrp"), None)?;
    let control = scene.create_transform(&name, Some(group))?;
    attach_shapes(scene, library, kind.template(), control, &name)?;
    let container = create_container(
        scene,
        &format!("{name}_container"),
        &[group],
        ContainerOptions::everything(),
    )?;
    if kind == ConnectorKind::Orientation {
        scene.publish_and_bind(container, control, "rotateX", &orientation_publish_name(joint_name))?;
    }
    Ok(ControlObject {
        container,
        control,
        constrained_group: Some(group),
    })
}

/// Shapes plus uniform scaling: `scaleY` drives `scaleX`/`scaleZ` and is aliased `globalScale`.
pub fn build_module_transform_geometry(
    scene: &mut Scene,
    library: &TemplateLibrary,
    name: &str,
    parent: Option<NodeHandle>,
) -> RigResult<NodeHandle> {
    let node = scene.create_transform(name, parent)?;
    attach_shapes(scene, library, templates::MODULE_TRANSFORM, node, name)?;
    scene.connect(node, "scaleY", node, "scaleX", false)?;
    scene.connect(node, "scaleY", node, "scaleZ", false)?;
    scene.alias_attr(node, "globalScale", "scaleY")?;
    Ok(node)
}

/// `<ns>:module_transform` at `position`, added to the module container with its shapes and
/// published as `moduleTransform_Translate`, `moduleTransform_Rotate` and
/// `moduleTransform_globalScale`.
pub fn create_module_transform(
    scene: &mut Scene,
    library: &TemplateLibrary,
    namespace: &str,
    position: Vector3<f64>,
    module_container: NodeHandle,
) -> RigResult<NodeHandle> {
    let node = build_module_transform_geometry(scene, library, &format!("{namespace}:module_transform"), None)?;
    scene.set_world_position(node, position)?;
    add_node_to_container(scene, module_container, &[node], true, true, false)?;
    for (attr, published) in [
        ("translate", "moduleTransform_Translate"),
        ("rotate", "moduleTransform_Rotate"),
        ("globalScale", "moduleTransform_globalScale"),
    ] {
        scene.publish_and_bind(module_container, node, attr, published)?;
    }
    Ok(node)
}

/// Group control for module groups: the module transform geometry with `scaleX`, `scaleZ`
/// and `visibility` locked.
pub fn create_group_control(
    scene: &mut Scene,
    library: &TemplateLibrary,
    name: &str,
) -> RigResult<NodeHandle> {
    let node = build_module_transform_geometry(scene, library, name, None)?;
    for attr in ["scaleX", "scaleZ", "visibility"] {
        scene.lock_attr(node, attr, true)?;
    }
    Ok(node)
}

/// Leaf joint name a translation control was built for, without namespaces.
pub fn control_joint_leaf(control_name: &str) -> Option<String> {
    let joint = crate::naming::joint_of_translation_control(control_name)?;
    Some(match split_all_namespaces(joint) {
        Some((_, l)) => l,
        None => joint.to_string(),
    })
}
