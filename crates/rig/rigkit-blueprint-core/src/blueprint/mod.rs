//! Blueprint modules: placeholder skeletons that riggers position, hook together and lock
//! into permanent joint chains.
//!
//! [`Blueprint`] holds the state and behaviour every module type shares. Module types wrap
//! one and implement [`BlueprintModule`], overriding only the hooks they need.

pub mod hook;
pub mod lock;
pub mod mirror;

use log::{debug, info};
use rigkit_scene::{ConstraintOptions, NodeHandle, RotateOrder, Scene, SecondaryAxis, Vector3};
use serde::{Deserialize, Serialize};

use crate::config::RigConfig;
use crate::containers::{add_node_to_container, create_container, ContainerOptions};
use crate::controls::{
    self, create_module_transform, create_translation_control, orientation_publish_name,
    translation_publish_name, ConnectorKind, ControlObject,
};
use crate::error::{RigError, RigResult};
use crate::groups;
use crate::naming::{
    compose_namespace, is_translation_control, orientation_connector_name, split_leading_namespace,
    split_module_namespace, translation_control_name, user_name_exists, GROUP_PREFIX,
};
use crate::registry::ModuleRegistry;
use crate::stretchy_ik::{basic_stretchy_ik, StretchyIkOptions};
use crate::templates::TemplateLibrary;

pub use lock::{AxisOrientation, JointOrientations, ModuleSnapshot};
pub use mirror::{is_module_mirror, MirrorPlane, MirrorRotation, MirrorSettings, MirrorTranslation};

/// One joint of a module's fixed topology.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JointInfo {
    pub name: String,
    pub position: [f64; 3],
}

impl JointInfo {
    pub fn new(name: impl Into<String>, position: [f64; 3]) -> Self {
        Self {
            name: name.into(),
            position,
        }
    }
}

/// Module-specific controls a user interface should offer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "control", rename_all = "snake_case")]
pub enum UiControl {
    /// Selector over the six rotate orders, bound to `joint.rotateOrder`
    RotationOrder { joint: String },
}

/// Scene nodes shared by the install steps.
struct InstallContext {
    library: TemplateLibrary,
    container: NodeHandle,
    module_grp: NodeHandle,
    joints_grp: NodeHandle,
    hierarchy_connectors_grp: NodeHandle,
    orientation_connectors_grp: NodeHandle,
    module_transform: NodeHandle,
    joints: Vec<NodeHandle>,
    controls: Vec<NodeHandle>,
}

/// Shared state of a module instance. Lives in the namespace `"{module_name}__{user_name}"`.
#[derive(Clone, Debug, PartialEq)]
pub struct Blueprint {
    module_name: String,
    user_name: String,
    namespace: String,
    joint_info: Vec<JointInfo>,
    hook_object: Option<String>,
    mirror: Option<MirrorSettings>,
    config: RigConfig,
}

impl Blueprint {
    /// `hook` is kept only when it names a translation control.
    pub fn new(module_name: &str, user_name: &str, joint_info: Vec<JointInfo>, hook: Option<&str>) -> Self {
        let hook_object = hook.filter(|h| is_translation_control(h)).map(str::to_string);
        Self {
            module_name: module_name.to_string(),
            user_name: user_name.to_string(),
            namespace: compose_namespace(module_name, user_name),
            joint_info,
            hook_object,
            mirror: None,
            config: RigConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RigConfig) -> Self {
        self.config = config;
        self
    }

    pub fn set_config(&mut self, config: RigConfig) {
        self.config = config;
    }

    pub fn config(&self) -> &RigConfig {
        &self.config
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn joint_info(&self) -> &[JointInfo] {
        &self.joint_info
    }

    /// Hook requested at construction, if it was a translation control.
    pub fn hook_object(&self) -> Option<&str> {
        self.hook_object.as_deref()
    }

    pub fn mirror_settings(&self) -> Option<&MirrorSettings> {
        self.mirror.as_ref()
    }

    pub(crate) fn set_mirror(&mut self, settings: MirrorSettings) {
        self.mirror = Some(settings);
    }

    /// `"{namespace}:{leaf}"`.
    pub fn qualify(&self, leaf: &str) -> String {
        format!("{}:{leaf}", self.namespace)
    }

    pub fn container_name(&self) -> String {
        self.qualify("module_container")
    }

    pub fn container(&self, scene: &Scene) -> RigResult<NodeHandle> {
        Ok(scene.lookup(&self.container_name())?)
    }

    pub fn module_transform_name(&self) -> String {
        self.qualify("module_transform")
    }

    /// Fully qualified joint names, root first.
    pub fn joint_names(&self) -> Vec<String> {
        self.joint_info.iter().map(|j| self.qualify(&j.name)).collect()
    }

    pub fn translation_control(&self, joint_index: usize) -> Option<String> {
        self.joint_info
            .get(joint_index)
            .map(|j| translation_control_name(&self.qualify(&j.name)))
    }

    pub(crate) fn root_translation_control(&self) -> RigResult<String> {
        self.translation_control(0).ok_or_else(|| {
            RigError::Scene(rigkit_scene::SceneError::invalid(format!(
                "{} has no joints",
                self.namespace
            )))
        })
    }

    /// Build the editable blueprint and return its joints, root first. The module container
    /// is left unlocked.
    pub fn install_base(&mut self, scene: &mut Scene, orientation_controlled: bool) -> RigResult<Vec<NodeHandle>> {
        if scene.namespace_exists(&self.namespace) {
            return Err(RigError::NameConflict {
                name: self.namespace.clone(),
            });
        }
        let library = TemplateLibrary::load(&self.config)?;
        scene.add_namespace(&self.namespace)?;

        let joints_grp = scene.create_transform(&self.qualify("joints_grp"), None)?;
        let module_grp = scene.create_transform(&self.qualify("module_grp"), None)?;
        let hierarchy_connectors_grp = scene.create_transform(&self.qualify("hierarchy_connectors_grp"), None)?;
        let orientation_connectors_grp = scene.create_transform(&self.qualify("orientation_connectors_grp"), None)?;
        for grp in [joints_grp, hierarchy_connectors_grp, orientation_connectors_grp] {
            scene.reparent(grp, Some(module_grp), true)?;
        }
        let container = create_container(scene, &self.container_name(), &[module_grp], ContainerOptions::hierarchy())?;

        let positions = self.joint_positions(scene)?;
        let mut joints: Vec<NodeHandle> = Vec::with_capacity(positions.len());
        for (info, position) in self.joint_info.iter().zip(&positions) {
            let parent = joints.last().copied();
            let joint = scene.create_joint(&self.qualify(&info.name), parent, *position, None)?;
            scene.set(joint, "visibility", false)?;
            add_node_to_container(scene, container, &[joint], false, false, false)?;
            scene.publish_and_bind(container, joint, "rotate", &format!("{}_Rotate", info.name))?;
            scene.publish_and_bind(container, joint, "rotateOrder", &format!("{}_RotateOrder", info.name))?;
            if let Some(parent) = parent {
                scene.orient_joint(parent, Some(RotateOrder::Xyz), SecondaryAxis::Yup)?;
            }
            joints.push(joint);
        }
        let Some(&root_joint) = joints.first() else {
            return Ok(joints);
        };
        scene.reparent(root_joint, Some(joints_grp), true)?;

        let module_transform = self.build_module_transform(scene, &library, container, positions[0])?;

        let mut ctx = InstallContext {
            library,
            container,
            module_grp,
            joints_grp,
            hierarchy_connectors_grp,
            orientation_connectors_grp,
            module_transform,
            joints: joints.clone(),
            controls: Vec::with_capacity(joints.len()),
        };
        for &joint in &joints {
            let control = self.create_translation_control_at_joint(scene, &ctx, joint)?;
            ctx.controls.push(control);
        }

        let root_name = scene.name_of(root_joint)?.to_string();
        let root_constraint = scene.point_constraint(
            &[ctx.controls[0]],
            root_joint,
            &ConstraintOptions::named(format!("{root_name}_pointConstraint")),
        )?;
        add_node_to_container(scene, container, &[root_constraint], false, false, false)?;

        self.initialize_hook(scene, &ctx)?;

        for index in 0..joints.len().saturating_sub(1) {
            self.setup_stretchy_joint_segment(scene, &ctx, index, orientation_controlled)?;
        }
        debug!("{} installed with {} joint(s)", self.namespace, joints.len());
        Ok(joints)
    }

    /// Rest positions, reflected from the original module's live joints when mirroring.
    fn joint_positions(&mut self, scene: &Scene) -> RigResult<Vec<Vector3<f64>>> {
        let Some(mirror) = &self.mirror else {
            return Ok(self.joint_info.iter().map(|j| Vector3::from(j.position)).collect());
        };
        let mut positions = Vec::with_capacity(self.joint_info.len());
        for info in &mut self.joint_info {
            let original = scene.lookup(&format!("{}:{}", mirror.original, info.name))?;
            let reflected = mirror.plane.reflect(scene.world_position(original)?);
            info.position = [reflected.x, reflected.y, reflected.z];
            positions.push(reflected);
        }
        Ok(positions)
    }

    fn build_module_transform(
        &self,
        scene: &mut Scene,
        library: &TemplateLibrary,
        container: NodeHandle,
        root_position: Vector3<f64>,
    ) -> RigResult<NodeHandle> {
        let Some(mirror) = &self.mirror else {
            return create_module_transform(scene, library, &self.namespace, root_position, container);
        };
        let original = scene.lookup(&format!("{}:module_transform", mirror.original))?;
        let position = mirror.plane.reflect(scene.world_position(original)?);
        let scale = scene.get_f64(original, "globalScale")?;
        let node = create_module_transform(scene, library, &self.namespace, position, container)?;
        scene.set(node, "globalScale", scale)?;
        Ok(node)
    }

    /// Translation control for `joint`, placed on it under the module transform and
    /// re-published on the module container.
    fn create_translation_control_at_joint(
        &self,
        scene: &mut Scene,
        ctx: &InstallContext,
        joint: NodeHandle,
    ) -> RigResult<NodeHandle> {
        let joint_name = scene.name_of(joint)?.to_string();
        let obj = create_translation_control(scene, &ctx.library, &joint_name)?;
        scene.reparent(obj.control, Some(ctx.module_transform), true)?;
        let position = scene.world_position(joint)?;
        scene.set_world_position(obj.control, position)?;

        add_node_to_container(scene, ctx.container, &[obj.container], false, false, false)?;
        let published = translation_publish_name(&joint_name);
        scene.publish_and_bind(ctx.container, obj.container, &published, &published)?;
        Ok(obj.control)
    }

    /// Stretchy IK between joint `index` and the next one, driven by their translation
    /// controls, plus the connector drawn along the segment.
    fn setup_stretchy_joint_segment(
        &self,
        scene: &mut Scene,
        ctx: &InstallContext,
        index: usize,
        orientation_controlled: bool,
    ) -> RigResult<()> {
        let (parent_joint, child_joint) = (ctx.joints[index], ctx.joints[index + 1]);
        let (parent_control, child_control) = (ctx.controls[index], ctx.controls[index + 1]);
        let parent_control_name = scene.name_of(parent_control)?.to_string();

        let pole_name = format!("{parent_control_name}_poleVectorLocator");
        let pole = scene.create_locator(&pole_name, None)?;
        let pole_grp = scene.create_transform(&format!("{pole_name}_parentConstraintGrp"), None)?;
        scene.reparent(pole, Some(pole_grp), false)?;
        scene.reparent(pole_grp, Some(ctx.module_grp), true)?;
        let pole_constraint = scene.parent_constraint(&[parent_control], pole_grp, &ConstraintOptions::default())?;
        scene.set(pole, "visibility", false)?;
        scene.set(pole, "translateY", self.config.segment_pole_offset)?;

        let ik = basic_stretchy_ik(
            scene,
            &self.config,
            parent_joint,
            child_joint,
            ctx.container,
            StretchyIkOptions {
                pole_vector_object: Some(pole),
                ..StretchyIkOptions::default()
            },
        )?;
        let end_locator_name = scene.name_of(ik.end_locator)?.to_string();
        let child_constraint = scene.point_constraint(
            &[child_control],
            ik.end_locator,
            &ConstraintOptions::named(format!("{end_locator_name}_pointConstraint")),
        )?;

        if self.mirror.as_ref().map(|m| m.plane) == Some(MirrorPlane::XZ) {
            scene.set(ik.ik_handle, "twist", 90.0)?;
        }

        add_node_to_container(
            scene,
            ctx.container,
            &[pole_grp, pole_constraint, child_constraint],
            true,
            false,
            false,
        )?;

        for node in [ik.ik_handle, ik.root_locator, ik.end_locator] {
            scene.reparent(node, Some(ctx.joints_grp), true)?;
            scene.set(node, "visibility", false)?;
        }

        if orientation_controlled {
            let obj = self.create_connector(
                scene,
                ctx,
                ConnectorKind::Orientation,
                parent_joint,
                child_joint,
                Some(ctx.orientation_connectors_grp),
                ctx.container,
            )?;
            let published = orientation_publish_name(scene.name_of(parent_joint)?);
            scene.publish_and_bind(ctx.container, obj.container, &published, &published)?;
        } else {
            self.create_connector(
                scene,
                ctx,
                ConnectorKind::Hierarchy,
                parent_joint,
                child_joint,
                Some(ctx.hierarchy_connectors_grp),
                ctx.container,
            )?;
        }
        Ok(())
    }

    /// Connector between two joints: its group follows `parent_joint`, stretches along X
    /// with `child_joint.translateX` and scales with the module transform on Y and Z.
    /// The connector's container joins `owner`.
    #[allow(clippy::too_many_arguments)]
    fn create_connector(
        &self,
        scene: &mut Scene,
        ctx: &InstallContext,
        kind: ConnectorKind,
        parent_joint: NodeHandle,
        child_joint: NodeHandle,
        connectors_grp: Option<NodeHandle>,
        owner: NodeHandle,
    ) -> RigResult<ControlObject> {
        let parent_name = scene.name_of(parent_joint)?.to_string();
        let obj = controls::create_connector(scene, &ctx.library, kind, &parent_name)?;
        let group = obj
            .constrained_group
            .ok_or_else(|| rigkit_scene::SceneError::invalid(format!("{parent_name} connector has no group")))?;

        let parent_constraint = scene.parent_constraint(&[parent_joint], group, &ConstraintOptions::default())?;
        scene.connect(child_joint, "translateX", group, "scaleX", false)?;
        let scale_constraint = scene.scale_constraint(
            &[ctx.module_transform],
            group,
            &ConstraintOptions::default().skip_axes("x"),
        )?;
        add_node_to_container(scene, obj.container, &[parent_constraint, scale_constraint], true, false, false)?;
        add_node_to_container(scene, owner, &[obj.container], false, false, false)?;
        if let Some(grp) = connectors_grp {
            scene.reparent(group, Some(grp), false)?;
        }
        Ok(obj)
    }

    /// Joint handles, root first.
    pub fn joints(&self, scene: &Scene) -> RigResult<Vec<NodeHandle>> {
        self.joint_names()
            .iter()
            .map(|name| Ok(scene.lookup(name)?))
            .collect()
    }

    /// World positions of the live joints, root first.
    pub fn joint_world_positions(&self, scene: &Scene) -> RigResult<Vec<[f64; 3]>> {
        self.joints(scene)?
            .into_iter()
            .map(|joint| {
                let p = scene.world_position(joint)?;
                Ok([p.x, p.y, p.z])
            })
            .collect()
    }

    /// `jointOrient` that bakes the joint's current aim plus its orientation connector's twist,
    /// read from a throwaway copy of the joint under `joints_grp`. The module container must be
    /// unlocked.
    pub fn orientation_controlled_joint_orientation(&self, scene: &mut Scene, joint: NodeHandle) -> RigResult<[f64; 3]> {
        let joint_name = scene.name_of(joint)?.to_string();
        let clean_parent = scene.lookup(&self.qualify("joints_grp"))?;
        let copy_name = scene.unique_name(&format!("{joint_name}_orientationCapture"));
        let Some(&copy) = scene.duplicate(joint, &copy_name, false)?.first() else {
            return Err(rigkit_scene::SceneError::invalid(format!("could not duplicate {joint_name}")).into());
        };
        if scene.parent_of(copy)? != Some(clean_parent) {
            scene.reparent(copy, Some(clean_parent), true)?;
        }
        scene.make_identity_rotate(copy)?;
        let connector = scene.lookup(&orientation_connector_name(&joint_name))?;
        let twist = scene.get_f64(connector, "rotateX")?;
        scene.set(copy, "rotateX", twist)?;
        scene.make_identity_rotate(copy)?;
        let orient = scene.get_vec3(copy, "jointOrient")?;
        scene.delete(copy)?;
        Ok(orient)
    }

    /// Remove the module. Modules hooked to it fall back to their own unhooked target first;
    /// a user group left empty by the removal is ungrouped.
    pub fn delete(&self, scene: &mut Scene, registry: &ModuleRegistry) -> RigResult<()> {
        let mut hooked: Vec<(String, String)> = Vec::new();
        for info in &self.joint_info {
            let Some(control) = scene.find(&translation_control_name(&self.qualify(&info.name))) else {
                continue;
            };
            for other in scene.list_connections(control) {
                let Some((namespace, _)) = split_leading_namespace(scene.name_of(other)?) else {
                    continue;
                };
                if namespace == self.namespace {
                    continue;
                }
                let Some((class, user)) = split_module_namespace(&namespace) else {
                    continue;
                };
                let entry = (class.to_string(), user.to_string());
                if registry.contains(class) && !hooked.contains(&entry) {
                    hooked.push(entry);
                }
            }
        }
        for (class, user) in hooked {
            debug!("{} was hooked to {}; unhooking", compose_namespace(&class, &user), self.namespace);
            let mut module = registry.instantiate(&class, &user, None)?;
            module.blueprint_mut().rehook(scene, None)?;
        }

        let former_parent = match scene.find(&self.module_transform_name()) {
            Some(mt) => match scene.parent_of(mt)? {
                Some(p) => Some(scene.name_of(p)?.to_string()),
                None => None,
            },
            None => None,
        };

        let container = self.container(scene)?;
        scene.lock_container(container, false)?;
        scene.delete(container)?;
        let leftovers = scene.nodes_in_namespace(&self.namespace);
        if !leftovers.is_empty() {
            scene.delete_many(&leftovers)?;
        }
        scene.remove_namespace(&self.namespace)?;
        info!("deleted module {}", self.namespace);

        if let Some(parent) = former_parent.filter(|p| p.starts_with(GROUP_PREFIX)) {
            if let Some(handle) = scene.find(&parent) {
                if scene.child_transforms(handle)?.is_empty() {
                    groups::ungroup(scene, &[parent.as_str()])?;
                }
            }
        }
        Ok(())
    }

    /// Move the module to `"{module_name}__{new_name}"`. Unchanged names are a no-op; names
    /// already used by any module are refused before anything changes.
    pub fn rename_module_instance(&mut self, scene: &mut Scene, new_name: &str) -> RigResult<()> {
        if new_name == self.user_name {
            return Ok(());
        }
        if user_name_exists(scene, new_name) {
            return Err(RigError::NameConflict {
                name: new_name.to_string(),
            });
        }
        let new_namespace = compose_namespace(&self.module_name, new_name);
        let old_namespace = self.namespace.clone();
        let container = self.container(scene)?;
        scene.with_unlocked(container, |scene| -> RigResult<()> {
            scene.rename_namespace(&old_namespace, &new_namespace)?;
            Ok(())
        })?;
        debug!("renamed {old_namespace} to {new_namespace}");
        self.user_name = new_name.to_string();
        self.namespace = new_namespace;
        Ok(())
    }
}

/// A module type. Implementors hold a [`Blueprint`] and override the hooks their topology
/// needs; everything else has a default.
pub trait BlueprintModule {
    fn blueprint(&self) -> &Blueprint;

    fn blueprint_mut(&mut self) -> &mut Blueprint;

    /// Extra setup after the shared install steps, with the container still unlocked.
    fn install_custom(&mut self, _scene: &mut Scene, _joints: &[NodeHandle]) -> RigResult<()> {
        Ok(())
    }

    /// Gather what locking needs before anything is deleted. `None` means the module
    /// type cannot be locked.
    fn lock_phase1(&mut self, _scene: &mut Scene) -> RigResult<Option<ModuleSnapshot>> {
        Ok(None)
    }

    fn can_be_mirrored(&self) -> bool {
        true
    }

    fn ui_controls(&self) -> Vec<UiControl> {
        Vec::new()
    }

    /// Segments get an orientation connector (`true`) or a hierarchy arrow.
    fn orientation_controlled_segment(&self) -> bool {
        true
    }

    fn install(&mut self, scene: &mut Scene) -> RigResult<()> {
        let orientation_controlled = self.orientation_controlled_segment();
        let joints = self.blueprint_mut().install_base(scene, orientation_controlled)?;
        let custom = self.install_custom(scene, &joints);
        let container = self.blueprint().container(scene)?;
        scene.lock_container(container, true)?;
        custom?;
        info!("installed module {}", self.blueprint().namespace());
        Ok(())
    }

    /// Install as a mirror of another module and reflect its control placement.
    fn mirror(&mut self, scene: &mut Scene, settings: MirrorSettings) -> RigResult<()> {
        self.blueprint_mut().set_mirror(settings);
        self.install(scene)?;
        self.blueprint().apply_mirror(scene)
    }
}
