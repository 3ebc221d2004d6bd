//! User groups of modules.
//!
//! A group is a `Group__<name>` transform carrying module-transform geometry. Its members
//! are module transforms or other groups. Every group transform belongs to the shared
//! `Group_container`, which publishes `<name>_t`, `<name>_r` and `<name>_globalScale`.

use log::{debug, warn};
use rigkit_scene::{NodeHandle, Scene, Vector3};

use crate::containers::{add_node_to_container, create_container, with_unlocked_many, ContainerOptions};
use crate::controls::create_group_control;
use crate::error::{RigError, RigResult};
use crate::naming::{split_leading_namespace, GROUP_PREFIX};
use crate::templates::TemplateLibrary;

pub const GROUP_CONTAINER: &str = "Group_container";

const PUBLISHED: [(&str, &str); 3] = [("translate", "t"), ("rotate", "r"), ("globalScale", "globalScale")];

/// Where a new group is placed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum GroupPlacement {
    /// On the last grouped object
    #[default]
    LastSelected,
    /// At the average of the grouped objects
    Average,
}

pub fn group_transform_name(name: &str) -> String {
    format!("{GROUP_PREFIX}{name}")
}

fn is_groupable(name: &str) -> bool {
    name.ends_with("module_transform") || name.starts_with(GROUP_PREFIX)
}

/// Group the module transforms and groups among `objects`; anything else is ignored.
/// The group lands under the members' common parent when they share one.
pub fn group_selected(
    scene: &mut Scene,
    library: &TemplateLibrary,
    name: &str,
    objects: &[&str],
    placement: GroupPlacement,
) -> RigResult<NodeHandle> {
    let mut members: Vec<(String, NodeHandle)> = Vec::new();
    for &object in objects {
        if !is_groupable(object) {
            continue;
        }
        if let Some(handle) = scene.find(object) {
            if !members.iter().any(|(_, h)| *h == handle) {
                members.push((object.to_string(), handle));
            }
        }
    }
    let Some((_, last)) = members.last().cloned() else {
        warn!("nothing to group among {} object(s)", objects.len());
        return Err(RigError::InvalidSelection {
            reason: "select module transforms or groups".into(),
        });
    };

    let full_name = group_transform_name(name);
    if scene.exists(&full_name) {
        return Err(RigError::NameConflict { name: full_name });
    }

    let position = match placement {
        GroupPlacement::LastSelected => scene.world_position(last)?,
        GroupPlacement::Average => {
            let mut sum = Vector3::zeros();
            for (_, handle) in &members {
                sum += scene.world_position(*handle)?;
            }
            sum / members.len() as f64
        }
    };
    let group = create_group_control(scene, library, &full_name)?;
    scene.set_world_position(group, position)?;

    let group_container = match scene.find(GROUP_CONTAINER) {
        Some(c) => c,
        None => create_container(scene, GROUP_CONTAINER, &[], ContainerOptions::default())?,
    };
    let mut containers = vec![group_container];
    for (object, _) in &members {
        if object.starts_with(GROUP_PREFIX) {
            continue;
        }
        if let Some((namespace, _)) = split_leading_namespace(object) {
            if let Some(c) = scene.find(&format!("{namespace}:module_container")) {
                containers.push(c);
            }
        }
    }

    with_unlocked_many(scene, &containers, |scene| {
        let mut parents = Vec::with_capacity(members.len());
        for (_, handle) in &members {
            parents.push(scene.parent_of(*handle)?);
        }
        if let Some(Some(common)) = parents.first().copied() {
            if parents.iter().all(|p| *p == Some(common)) {
                scene.reparent(group, Some(common), true)?;
            }
        }
        for (_, handle) in &members {
            scene.reparent(*handle, Some(group), true)?;
        }

        add_node_to_container(scene, group_container, &[group], false, true, false)?;
        for (attr, suffix) in PUBLISHED {
            scene.publish_and_bind(group_container, group, attr, &format!("{name}_{suffix}"))?;
        }
        Ok(())
    })?;
    scene.lock_container(group_container, true)?;
    debug!("{full_name} created with {} member(s)", members.len());
    Ok(group)
}

/// Dissolve groups: members move to the group's parent, a parent group left empty is
/// dissolved too, and `Group_container` goes once it holds nothing.
pub fn ungroup(scene: &mut Scene, groups: &[&str]) -> RigResult<()> {
    let groups: Vec<&str> = groups
        .iter()
        .copied()
        .filter(|g| g.starts_with(GROUP_PREFIX) && scene.exists(g))
        .collect();
    if groups.is_empty() {
        return Ok(());
    }

    let group_container = scene.find(GROUP_CONTAINER);
    let mut containers: Vec<NodeHandle> = group_container.into_iter().collect();
    for group in &groups {
        let group = scene.lookup(group)?;
        for module in find_sub_modules(scene, group)? {
            if let Some(c) = scene.find(&format!("{module}:module_container")) {
                containers.push(c);
            }
        }
    }

    with_unlocked_many(scene, &containers, |scene| {
        for group in &groups {
            if scene.exists(group) {
                dissolve(scene, group, group_container)?;
            }
        }
        if let Some(c) = group_container {
            if scene.contains(c) && scene.container_members(c)?.is_empty() {
                scene.delete(c)?;
                debug!("{GROUP_CONTAINER} removed");
            }
        }
        Ok(())
    })
}

fn dissolve(scene: &mut Scene, group_name: &str, group_container: Option<NodeHandle>) -> RigResult<()> {
    let group = scene.lookup(group_name)?;
    let parent = scene.parent_of(group)?;
    for child in scene.child_transforms(group)? {
        scene.reparent(child, parent, true)?;
    }

    if let Some(c) = group_container {
        let short = group_name.strip_prefix(GROUP_PREFIX).unwrap_or(group_name);
        let published = scene.published_names(c)?;
        for (_, suffix) in PUBLISHED {
            let name = format!("{short}_{suffix}");
            if published.contains(&name) {
                scene.unbind_and_unpublish(c, &name)?;
            }
        }
    }
    scene.delete(group)?;
    debug!("{group_name} dissolved");

    let Some(parent) = parent else {
        return Ok(());
    };
    let parent_name = scene.name_of(parent)?.to_string();
    if parent_name.starts_with(GROUP_PREFIX) && scene.child_transforms(parent)?.is_empty() {
        dissolve(scene, &parent_name, group_container)?;
    }
    Ok(())
}

/// Namespaces of the modules under `group`, descending into nested groups.
pub fn find_sub_modules(scene: &Scene, group: NodeHandle) -> RigResult<Vec<String>> {
    let mut modules = Vec::new();
    for child in scene.child_transforms(group)? {
        let name = scene.name_of(child)?;
        if name.starts_with(GROUP_PREFIX) {
            modules.extend(find_sub_modules(scene, child)?);
        } else if let Some((namespace, leaf)) = split_leading_namespace(name) {
            if leaf == "module_transform" {
                modules.push(namespace);
            }
        }
    }
    Ok(modules)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module_transform(scene: &mut Scene, ns: &str, x: f64) -> NodeHandle {
        scene.add_namespace(ns).unwrap();
        let mt = scene.create_transform(&format!("{ns}:module_transform"), None).unwrap();
        scene.set(mt, "translate", [x, 0.0, 0.0]).unwrap();
        mt
    }

    #[test]
    fn average_placement_and_publishing() {
        let mut scene = Scene::new();
        let a = module_transform(&mut scene, "M__a", 2.0);
        let b = module_transform(&mut scene, "M__b", 4.0);
        let g = group_selected(
            &mut scene,
            &TemplateLibrary::builtin(),
            "legs",
            &["M__a:module_transform", "M__b:module_transform", "M__b:root_joint"],
            GroupPlacement::Average,
        )
        .unwrap();
        assert_eq!(scene.get_vec3(g, "worldPosition").unwrap(), [3.0, 0.0, 0.0]);
        assert_eq!(scene.parent_of(a).unwrap(), Some(g));
        assert_eq!(scene.parent_of(b).unwrap(), Some(g));
        let c = scene.lookup(GROUP_CONTAINER).unwrap();
        assert_eq!(
            scene.published_names(c).unwrap(),
            vec!["legs_t".to_string(), "legs_r".into(), "legs_globalScale".into()]
        );
        assert_eq!(find_sub_modules(&scene, g).unwrap(), vec!["M__a".to_string(), "M__b".into()]);
    }

    #[test]
    fn nothing_groupable_is_an_invalid_selection() {
        let mut scene = Scene::new();
        let err = group_selected(
            &mut scene,
            &TemplateLibrary::builtin(),
            "legs",
            &["M__a:root_joint"],
            GroupPlacement::LastSelected,
        )
        .unwrap_err();
        assert!(matches!(err, RigError::InvalidSelection { .. }));
        assert!(!scene.exists(GROUP_CONTAINER));
    }

    #[test]
    fn ungroup_restores_members_and_clears_the_container() {
        let mut scene = Scene::new();
        let a = module_transform(&mut scene, "M__a", 2.0);
        let lib = TemplateLibrary::builtin();
        group_selected(&mut scene, &lib, "inner", &["M__a:module_transform"], GroupPlacement::LastSelected).unwrap();
        group_selected(&mut scene, &lib, "outer", &["Group__inner"], GroupPlacement::LastSelected).unwrap();

        ungroup(&mut scene, &["Group__inner"]).unwrap();
        assert_eq!(scene.parent_of(a).unwrap(), scene.find("Group__outer"));

        ungroup(&mut scene, &["Group__outer"]).unwrap();
        assert_eq!(scene.parent_of(a).unwrap(), None);
        assert_eq!(scene.get_vec3(a, "worldPosition").unwrap(), [2.0, 0.0, 0.0]);
        assert!(!scene.exists(GROUP_CONTAINER));
    }
}
