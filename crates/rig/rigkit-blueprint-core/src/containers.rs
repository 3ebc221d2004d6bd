//! Container helpers layered on the scene's ownership records.

use log::debug;
use rigkit_scene::{AddOptions, NodeHandle, NodeKind, Scene};

use crate::error::RigResult;

/// What to pull into a new container besides the listed nodes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContainerOptions {
    pub include_hierarchy_below: bool,
    pub include_shaders: bool,
    /// Also add the transform above any listed shape
    pub include_transform: bool,
    pub include_shapes: bool,
}

impl ContainerOptions {
    /// Everything below and around the listed nodes.
    pub fn everything() -> Self {
        Self {
            include_hierarchy_below: true,
            include_shaders: true,
            include_transform: true,
            include_shapes: true,
        }
    }

    pub fn hierarchy() -> Self {
        Self {
            include_hierarchy_below: true,
            ..Self::default()
        }
    }
}

/// Create a container named `name` holding `nodes`. Fails if the name is taken.
/// The container carries a `layout_tag` text attribute (`"{name}_hyperLayout"`).
pub fn create_container(
    scene: &mut Scene,
    name: &str,
    nodes: &[NodeHandle],
    opts: ContainerOptions,
) -> RigResult<NodeHandle> {
    let container = scene.create_container(name)?;
    scene.add_attr(container, "layout_tag", format!("{name}_hyperLayout").as_str())?;

    let mut members: Vec<NodeHandle> = nodes.to_vec();
    if opts.include_transform {
        for &h in nodes {
            if let NodeKind::Shape(_) = scene.node(h)?.kind() {
                if let Some(parent) = scene.parent_of(h)? {
                    if !members.contains(&parent) {
                        members.push(parent);
                    }
                }
            }
        }
    }
    scene.container_add(
        container,
        &members,
        AddOptions {
            include_hierarchy_below: opts.include_hierarchy_below,
            include_shapes: opts.include_shapes,
            include_shaders: opts.include_shaders,
            force: false,
        },
    )?;
    debug!("container {name} created with {} node(s)", members.len());
    Ok(container)
}

/// Append nodes to an existing container. Members already present are skipped;
/// nodes owned elsewhere only move with `force`.
pub fn add_node_to_container(
    scene: &mut Scene,
    container: NodeHandle,
    nodes: &[NodeHandle],
    include_hierarchy_below: bool,
    include_shapes: bool,
    force: bool,
) -> RigResult<()> {
    scene.container_add(
        container,
        nodes,
        AddOptions {
            include_hierarchy_below,
            include_shapes,
            include_shaders: include_shapes,
            force,
        },
    )?;
    Ok(())
}

/// Run `f` with every listed container unlocked, then restore each one's previous lock
/// state. Containers deleted by `f` are skipped on the way out.
pub fn with_unlocked_many<T>(
    scene: &mut Scene,
    containers: &[NodeHandle],
    f: impl FnOnce(&mut Scene) -> RigResult<T>,
) -> RigResult<T> {
    let mut previous: Vec<(NodeHandle, bool)> = Vec::with_capacity(containers.len());
    for &c in containers {
        if previous.iter().any(|(h, _)| *h == c) {
            continue;
        }
        previous.push((c, scene.is_container_locked(c)?));
        scene.lock_container(c, false)?;
    }
    let result = f(scene);
    for (c, locked) in previous {
        if scene.contains(c) {
            scene.lock_container(c, locked)?;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigkit_scene::{AttrValue, Primitive, SceneError};

    use crate::error::RigError;

    #[test]
    fn create_container_tags_layout_and_takes_hierarchy() {
        let mut scene = Scene::new();
        let grp = scene.create_transform("grp", None).unwrap();
        let child = scene.create_locator("child", Some(grp)).unwrap();
        let c = create_container(&mut scene, "things", &[grp], ContainerOptions::hierarchy()).unwrap();
        assert_eq!(
            scene.get(c, "layout_tag").unwrap(),
            AttrValue::Text("things_hyperLayout".into())
        );
        assert_eq!(scene.container_of(child).unwrap(), Some(c));
    }

    #[test]
    fn create_container_twice_collides() {
        let mut scene = Scene::new();
        create_container(&mut scene, "things", &[], ContainerOptions::default()).unwrap();
        let err = create_container(&mut scene, "things", &[], ContainerOptions::default()).unwrap_err();
        assert!(matches!(err, RigError::Scene(SceneError::NameCollision { .. })));
    }

    #[test]
    fn include_transform_pulls_in_shape_parents() {
        let mut scene = Scene::new();
        let ctrl = scene.create_transform("ctrl", None).unwrap();
        let shape = scene
            .create_shape("ctrlShape", ctrl, Primitive::Sphere { radius: 1.0 })
            .unwrap();
        let c = create_container(&mut scene, "c", &[shape], ContainerOptions::everything()).unwrap();
        assert_eq!(scene.container_of(ctrl).unwrap(), Some(c));
    }

    #[test]
    fn add_is_a_no_op_for_existing_members_and_respects_ownership() {
        let mut scene = Scene::new();
        let a = scene.create_transform("a", None).unwrap();
        let first = create_container(&mut scene, "first", &[a], ContainerOptions::default()).unwrap();
        let second = create_container(&mut scene, "second", &[], ContainerOptions::default()).unwrap();
        add_node_to_container(&mut scene, first, &[a], false, false, false).unwrap();
        assert_eq!(scene.container_members(first).unwrap(), vec![a]);

        add_node_to_container(&mut scene, second, &[a], false, false, false).unwrap();
        assert_eq!(scene.container_of(a).unwrap(), Some(first));
        add_node_to_container(&mut scene, second, &[a], false, false, true).unwrap();
        assert_eq!(scene.container_of(a).unwrap(), Some(second));
    }

    #[test]
    fn unlocked_scope_restores_on_error() {
        let mut scene = Scene::new();
        let a = scene.create_container("a").unwrap();
        let b = scene.create_container("b").unwrap();
        scene.lock_container(a, true).unwrap();
        let out: RigResult<()> = with_unlocked_many(&mut scene, &[a, b, a], |s| {
            assert!(!s.is_container_locked(a).unwrap());
            Err(RigError::NoModules)
        });
        assert_eq!(out, Err(RigError::NoModules));
        assert!(scene.is_container_locked(a).unwrap());
        assert!(!scene.is_container_locked(b).unwrap());
    }
}
