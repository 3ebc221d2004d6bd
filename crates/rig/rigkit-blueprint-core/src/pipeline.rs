//! Operations that span several modules: installing by type, locking everything and
//! mirroring a batch.
//!
//! Multi-module operations run in passes across all modules (gather, then mutate, then
//! reattach) so that cross-module names resolved early are still valid when used later.

use log::{info, warn};
use rigkit_scene::Scene;

use crate::blueprint::{is_module_mirror, BlueprintModule, MirrorPlane, MirrorRotation, MirrorSettings, MirrorTranslation};
use crate::error::{RigError, RigResult};
use crate::groups::find_sub_modules;
use crate::naming::{
    compose_namespace, next_instance_name, split_leading_namespace, split_module_namespace, user_name_exists,
    GROUP_PREFIX,
};
use crate::registry::ModuleRegistry;

/// Install a module of `class_name` under the next free `instance_N` name.
pub fn install_module(
    scene: &mut Scene,
    registry: &ModuleRegistry,
    class_name: &str,
    hook: Option<&str>,
) -> RigResult<Box<dyn BlueprintModule>> {
    let user_name = next_instance_name(scene);
    install_module_named(scene, registry, class_name, &user_name, hook)
}

pub fn install_module_named(
    scene: &mut Scene,
    registry: &ModuleRegistry,
    class_name: &str,
    user_name: &str,
    hook: Option<&str>,
) -> RigResult<Box<dyn BlueprintModule>> {
    if user_name_exists(scene, user_name) {
        return Err(RigError::NameConflict {
            name: user_name.to_string(),
        });
    }
    let mut module = registry.instantiate(class_name, user_name, hook)?;
    module.install(scene)?;
    Ok(module)
}

/// `(class_name, user_name)` of every module in the scene whose type is registered.
pub fn find_modules(scene: &Scene, registry: &ModuleRegistry) -> Vec<(String, String)> {
    scene
        .namespaces()
        .iter()
        .filter_map(|ns| split_module_namespace(ns))
        .filter(|(class, _)| registry.contains(class))
        .map(|(class, user)| (class.to_string(), user.to_string()))
        .collect()
}

/// Lock every registered module that is not locked yet. Returns the locked namespaces.
pub fn lock_all(scene: &mut Scene, registry: &ModuleRegistry) -> RigResult<Vec<String>> {
    let mut modules = Vec::new();
    for (class, user) in find_modules(scene, registry) {
        let module = registry.instantiate(&class, &user, None)?;
        if !module.blueprint().is_locked(scene) {
            modules.push(module);
        }
    }
    if modules.is_empty() {
        return Err(RigError::NoModules);
    }

    let mut snapshots = Vec::with_capacity(modules.len());
    for module in &mut modules {
        let snapshot = module.lock_phase1(scene)?.ok_or_else(|| RigError::MissingSnapshot {
            module: module.blueprint().namespace().to_string(),
        })?;
        snapshots.push(snapshot);
    }
    for (module, snapshot) in modules.iter_mut().zip(&snapshots) {
        module.blueprint_mut().lock_phase2(scene, snapshot)?;
    }
    for (module, snapshot) in modules.iter().zip(&snapshots) {
        module.blueprint().lock_phase3(scene, snapshot.hook_object.as_deref())?;
    }

    let locked: Vec<String> = modules.iter().map(|m| m.blueprint().namespace().to_string()).collect();
    info!("locked {} module(s)", locked.len());
    Ok(locked)
}

/// One module to mirror.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MirrorRequest {
    /// Namespace of the module to mirror
    pub original: String,
    /// User name of the new module
    pub user_name: String,
    pub translation: MirrorTranslation,
    pub rotation: MirrorRotation,
}

impl MirrorRequest {
    pub fn new(original: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            user_name: user_name.into(),
            translation: MirrorTranslation::default(),
            rotation: MirrorRotation::default(),
        }
    }

    fn class_name(&self) -> RigResult<&str> {
        split_module_namespace(&self.original)
            .map(|(class, _)| class)
            .ok_or_else(|| RigError::InvalidSelection {
                reason: format!("{} is not a module", self.original),
            })
    }

    fn original_user_name(&self) -> RigResult<&str> {
        split_module_namespace(&self.original)
            .map(|(_, user)| user)
            .ok_or_else(|| RigError::InvalidSelection {
                reason: format!("{} is not a module", self.original),
            })
    }

    fn mirrored_namespace(&self) -> RigResult<String> {
        Ok(compose_namespace(self.class_name()?, &self.user_name))
    }
}

/// Refuse the whole batch unless every request can go through.
fn validate_mirror_batch(scene: &Scene, registry: &ModuleRegistry, requests: &[MirrorRequest]) -> RigResult<()> {
    if requests.is_empty() {
        return Err(RigError::InvalidSelection {
            reason: "no modules to mirror".into(),
        });
    }
    for (index, request) in requests.iter().enumerate() {
        let class = request.class_name()?;
        let module = registry.instantiate(class, request.original_user_name()?, None)?;
        if !scene.namespace_exists(&request.original) {
            return Err(RigError::InvalidSelection {
                reason: format!("{} is not in the scene", request.original),
            });
        }
        if is_module_mirror(scene, &request.original) {
            warn!("{} is already a mirror", request.original);
            return Err(RigError::MirrorRejected {
                module: request.original.clone(),
                reason: "module is already a mirror".into(),
            });
        }
        if !module.can_be_mirrored() {
            warn!("{class} modules cannot be mirrored");
            return Err(RigError::MirrorRejected {
                module: request.original.clone(),
                reason: format!("{class} modules cannot be mirrored"),
            });
        }
        let taken_in_batch = requests[..index].iter().any(|r| r.user_name == request.user_name);
        if taken_in_batch || user_name_exists(scene, &request.user_name) {
            return Err(RigError::NameConflict {
                name: request.user_name.clone(),
            });
        }
    }
    Ok(())
}

/// Mirror a batch of modules across `plane`. Hooks between modules of the batch are
/// remapped onto their mirrors; other hooks are kept. Returns the new namespaces.
pub fn mirror_modules(
    scene: &mut Scene,
    registry: &ModuleRegistry,
    plane: MirrorPlane,
    requests: &[MirrorRequest],
) -> RigResult<Vec<String>> {
    validate_mirror_batch(scene, registry, requests)?;

    let mut hooks: Vec<(Option<String>, bool)> = Vec::with_capacity(requests.len());
    for request in requests {
        let module = registry.instantiate(request.class_name()?, request.original_user_name()?, None)?;
        let hook = module.blueprint().find_hook_object(scene)?;
        let new_hook = match split_leading_namespace(&hook) {
            Some((hook_module, node)) => match requests.iter().find(|r| r.original == hook_module) {
                Some(r) if r.original == request.original => None,
                Some(r) => Some(format!("{}:{node}", r.mirrored_namespace()?)),
                None => Some(hook),
            },
            None => Some(hook),
        };
        hooks.push((new_hook, module.blueprint().is_root_constrained(scene)?));
    }

    let mut mirrored = Vec::with_capacity(requests.len());
    for request in requests {
        let mut module = registry.instantiate(request.class_name()?, &request.user_name, None)?;
        module.mirror(
            scene,
            MirrorSettings {
                original: request.original.clone(),
                plane,
                translation: request.translation,
                rotation: request.rotation,
            },
        )?;
        mirrored.push(module);
    }

    for (module, (hook, constrained)) in mirrored.iter_mut().zip(&hooks) {
        module.blueprint_mut().rehook(scene, hook.as_deref())?;
        if *constrained {
            module.blueprint().constrain_root_to_hook(scene)?;
        }
    }

    let namespaces: Vec<String> = mirrored.iter().map(|m| m.blueprint().namespace().to_string()).collect();
    info!("mirrored {} module(s) across {plane}", namespaces.len());
    Ok(namespaces)
}

/// Mirror every module below the user group `group`. Each mirror is named by applying
/// `user_name_for` to its original's user name. Module types that cannot be mirrored are
/// skipped; the rest go through [`mirror_modules`] as one batch.
pub fn mirror_group(
    scene: &mut Scene,
    registry: &ModuleRegistry,
    plane: MirrorPlane,
    group: &str,
    user_name_for: impl Fn(&str) -> String,
) -> RigResult<Vec<String>> {
    let handle = scene
        .find(group)
        .filter(|_| group.starts_with(GROUP_PREFIX))
        .ok_or_else(|| RigError::InvalidSelection {
            reason: format!("{group} is not a group"),
        })?;

    let mut requests = Vec::new();
    for namespace in find_sub_modules(scene, handle)? {
        let Some((class, user)) = split_module_namespace(&namespace) else {
            continue;
        };
        if !registry.instantiate(class, user, None)?.can_be_mirrored() {
            warn!("{class} modules cannot be mirrored; skipping {namespace}");
            continue;
        }
        let user_name = user_name_for(user);
        requests.push(MirrorRequest::new(namespace.as_str(), user_name));
    }
    mirror_modules(scene, registry, plane, &requests)
}
