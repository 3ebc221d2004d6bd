use approx::assert_relative_eq;
use rigkit_scene::{
    AddOptions, ConstraintOptions, MultiplyDivideOp, NodeHandle, Scene, SceneError, Vector3,
};

struct Chain {
    root: NodeHandle,
    mid: NodeHandle,
    end: NodeHandle,
    root_loc: NodeHandle,
    end_loc: NodeHandle,
}

/// Three-joint chain along +X with an IK handle and a distance-driven stretch.
fn stretchy_chain(scene: &mut Scene) -> Chain {
    let root = scene.create_joint("root", None, Vector3::zeros(), None).unwrap();
    let mid = scene.create_joint("mid", Some(root), Vector3::new(4.0, 0.0, 0.0), None).unwrap();
    let end = scene.create_joint("end", Some(mid), Vector3::new(8.0, 0.0, 0.0), None).unwrap();
    let ik = scene.create_ik_handle("chain_ik", root, end, None).unwrap();

    let root_loc = scene.create_locator("root_loc", None).unwrap();
    let end_loc = scene.create_locator("end_loc", None).unwrap();
    scene.set(end_loc, "translate", [8.0, 0.0, 0.0]).unwrap();
    scene.point_constraint(&[root_loc], root, &ConstraintOptions::default()).unwrap();
    scene.point_constraint(&[end_loc], ik.handle, &ConstraintOptions::default()).unwrap();

    let dist = scene.create_distance_between("chain_dist").unwrap();
    scene.connect(root_loc, "worldPosition", dist, "point1", false).unwrap();
    scene.connect(end_loc, "worldPosition", dist, "point2", false).unwrap();
    let factor = scene.create_multiply_divide("chain_factor", MultiplyDivideOp::Divide).unwrap();
    scene.connect(dist, "distance", factor, "input1X", false).unwrap();
    scene.set(factor, "input2X", 8.0).unwrap();
    for (joint, name) in [(mid, "mid_len"), (end, "end_len")] {
        let len = scene.create_multiply_divide(name, MultiplyDivideOp::Multiply).unwrap();
        scene.connect(factor, "outputX", len, "input1X", false).unwrap();
        scene.set(len, "input2X", 4.0).unwrap();
        scene.connect(len, "outputX", joint, "translateX", false).unwrap();
    }
    Chain {
        root,
        mid,
        end,
        root_loc,
        end_loc,
    }
}

#[test]
fn chain_rests_where_it_was_built() {
    let mut scene = Scene::new();
    let c = stretchy_chain(&mut scene);
    assert_relative_eq!(scene.world_position(c.mid).unwrap(), Vector3::new(4.0, 0.0, 0.0), epsilon = 1e-9);
    assert_relative_eq!(scene.world_position(c.end).unwrap(), Vector3::new(8.0, 0.0, 0.0), epsilon = 1e-9);
}

#[test]
fn chain_stretches_and_aims_at_the_end_locator() {
    let mut scene = Scene::new();
    let c = stretchy_chain(&mut scene);
    scene.set(c.end_loc, "translate", [0.0, 12.0, 0.0]).unwrap();
    assert_relative_eq!(scene.get_f64(c.mid, "tx").unwrap(), 6.0, epsilon = 1e-9);
    assert_relative_eq!(scene.world_position(c.mid).unwrap(), Vector3::new(0.0, 6.0, 0.0), epsilon = 1e-9);
    assert_relative_eq!(scene.world_position(c.end).unwrap(), Vector3::new(0.0, 12.0, 0.0), epsilon = 1e-9);

    scene.set(c.root_loc, "translate", [0.0, 0.0, 2.0]).unwrap();
    assert_relative_eq!(scene.world_position(c.root).unwrap(), Vector3::new(0.0, 0.0, 2.0), epsilon = 1e-9);
    assert_relative_eq!(scene.world_position(c.end).unwrap(), Vector3::new(0.0, 12.0, 0.0), epsilon = 1e-9);
}

#[test]
fn locked_container_guards_chain_but_not_published_controls() {
    let mut scene = Scene::new();
    let c = stretchy_chain(&mut scene);
    let box_ = scene.create_container("chain_container").unwrap();
    scene
        .container_add(
            box_,
            &[c.root, c.root_loc, c.end_loc],
            AddOptions {
                include_hierarchy_below: true,
                ..Default::default()
            },
        )
        .unwrap();
    scene.publish_and_bind(box_, c.end_loc, "translate", "end_loc_T").unwrap();
    scene.lock_container(box_, true).unwrap();

    scene.set(box_, "end_loc_T", [12.0, 0.0, 0.0]).unwrap();
    assert_relative_eq!(scene.world_position(c.end).unwrap(), Vector3::new(12.0, 0.0, 0.0), epsilon = 1e-9);
    assert!(matches!(
        scene.set(c.root_loc, "translateX", 1.0),
        Err(SceneError::ContainerLocked { .. })
    ));
    assert!(matches!(scene.delete(c.mid), Err(SceneError::ContainerLocked { .. })));

    scene
        .with_unlocked(box_, |scene| scene.set(c.root_loc, "translateX", 1.0))
        .unwrap();
    assert!(scene.is_container_locked(box_).unwrap());
    assert_relative_eq!(scene.get_f64(c.mid, "tx").unwrap(), 11.0 / 2.0, epsilon = 1e-9);
}

#[test]
fn namespace_rename_moves_nodes() {
    let mut scene = Scene::new();
    scene.add_namespace("part__a").unwrap();
    let grp = scene.create_transform("part__a:module_grp", None).unwrap();
    scene.create_transform("part__a:joints_grp", Some(grp)).unwrap();
    assert!(matches!(
        scene.remove_namespace("part__a"),
        Err(SceneError::NamespaceNotEmpty { count: 2, .. })
    ));
    scene.rename_namespace("part__a", "part__b").unwrap();
    assert_eq!(scene.name_of(grp).unwrap(), "part__b:module_grp");
    assert!(scene.find("part__b:joints_grp").is_some());
    assert_eq!(scene.namespaces(), vec!["part__b".to_string()]);
    scene.delete(grp).unwrap();
    scene.remove_namespace("part__b").unwrap();
    assert!(scene.namespaces().is_empty());
}
