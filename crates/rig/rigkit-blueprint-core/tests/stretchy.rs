use approx::assert_relative_eq;
use rigkit_blueprint::{basic_stretchy_ik, RigConfig, StretchyIkNodes, StretchyIkOptions};
use rigkit_scene::{NodeHandle, Scene, Vector3};

fn build(scene: &mut Scene, points: [[f64; 3]; 3]) -> (Vec<NodeHandle>, StretchyIkNodes) {
    let mut joints: Vec<NodeHandle> = Vec::new();
    for (name, p) in ["root", "mid", "end"].into_iter().zip(points) {
        let parent = joints.last().copied();
        joints.push(scene.create_joint(name, parent, Vector3::from(p), None).unwrap());
    }
    let container = scene.create_container("chain_container").unwrap();
    let nodes = basic_stretchy_ik(
        scene,
        &RigConfig::default(),
        joints[0],
        joints[2],
        container,
        StretchyIkOptions::default(),
    )
    .unwrap();
    (joints, nodes)
}

#[test]
fn pulling_the_end_locator_stretches_every_segment() {
    let mut scene = Scene::new();
    let (joints, nodes) = build(&mut scene, [[0.0, 0.0, 0.0], [4.0, 0.0, 0.0], [8.0, 0.0, 0.0]]);

    scene.set(nodes.end_locator, "translate", [10.0, 0.0, 0.0]).unwrap();

    let distance = scene.lookup("root_distanceBetween").unwrap();
    assert_relative_eq!(scene.get_f64(distance, "distance").unwrap(), 10.0, epsilon = 1e-9);
    let factor = scene.lookup("root_scaleFactor").unwrap();
    assert_relative_eq!(scene.get_f64(factor, "outputX").unwrap(), 1.25, epsilon = 1e-9);
    assert_relative_eq!(scene.get_f64(joints[1], "translateX").unwrap(), 5.0, epsilon = 1e-9);
    assert_relative_eq!(scene.get_f64(joints[2], "translateX").unwrap(), 5.0, epsilon = 1e-9);
    assert_relative_eq!(
        scene.world_position(joints[2]).unwrap(),
        Vector3::new(10.0, 0.0, 0.0),
        epsilon = 1e-6
    );
}

#[test]
fn chains_built_along_negative_x_keep_their_sign() {
    let mut scene = Scene::new();
    let (joints, nodes) = build(&mut scene, [[0.0, 0.0, 0.0], [-4.0, 0.0, 0.0], [-8.0, 0.0, 0.0]]);

    let factor = scene.lookup("root_scaleFactor").unwrap();
    assert_relative_eq!(scene.get_f64(factor, "input2X").unwrap(), 8.0, epsilon = 1e-9);

    scene.set(nodes.end_locator, "translate", [-12.0, 0.0, 0.0]).unwrap();
    assert_relative_eq!(scene.get_f64(joints[1], "translateX").unwrap(), -6.0, epsilon = 1e-9);
    assert_relative_eq!(scene.get_f64(joints[2], "translateX").unwrap(), -6.0, epsilon = 1e-9);
}

#[test]
fn network_lives_in_the_container() {
    let mut scene = Scene::new();
    let (_, nodes) = build(&mut scene, [[0.0, 0.0, 0.0], [4.0, 0.0, 0.0], [8.0, 0.0, 0.0]]);
    let container = scene.lookup("chain_container").unwrap();
    for name in [
        "root_ikHandle",
        "root_ikHandle_effector",
        "root_rootPosLocator",
        "end_endPosLocator",
        "root_distanceBetween",
        "root_scaleFactor",
        "mid_scaleMultiply",
        "end_scaleMultiply",
    ] {
        let node = scene.lookup(name).unwrap();
        assert_eq!(scene.container_of(node).unwrap(), Some(container), "{name}");
    }
    assert!(scene.source_of(nodes.ik_handle, "poleVector").unwrap().is_some());
}
