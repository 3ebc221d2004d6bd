use approx::assert_relative_eq;
use rigkit_blueprint::{
    group_selected, install_module_named, is_module_mirror, mirror_group, mirror_modules, BlueprintModule,
    GroupPlacement, MirrorPlane, MirrorRequest, ModuleRegistry, RigConfig, RigError, TemplateLibrary,
};
use rigkit_scene::Scene;

const SEGMENT: &str = "SingleJointSegment";

fn registry() -> ModuleRegistry {
    ModuleRegistry::builtin(RigConfig::default())
}

fn install(scene: &mut Scene, reg: &ModuleRegistry, user: &str, hook: Option<&str>) -> Box<dyn BlueprintModule> {
    install_module_named(scene, reg, SEGMENT, user, hook).unwrap()
}

fn end_control(user: &str) -> String {
    format!("SingleJointSegment__{user}:end_joint_translation_control")
}

#[test]
fn mirroring_across_yz_negates_x() {
    let mut scene = Scene::new();
    let reg = registry();
    let left = install(&mut scene, &reg, "left", None);
    let container = left.blueprint().container(&scene).unwrap();
    scene.set(container, "moduleTransform_Translate", [3.0, 1.0, 0.0]).unwrap();

    let created = mirror_modules(
        &mut scene,
        &reg,
        MirrorPlane::YZ,
        &[MirrorRequest::new("SingleJointSegment__left", "right")],
    )
    .unwrap();
    assert_eq!(created, vec!["SingleJointSegment__right".to_string()]);
    assert!(is_module_mirror(&scene, "SingleJointSegment__right"));
    assert!(!is_module_mirror(&scene, "SingleJointSegment__left"));

    let right = reg.instantiate(SEGMENT, "right", None).unwrap();
    let positions = right.blueprint().joint_world_positions(&scene).unwrap();
    assert_relative_eq!(positions[0][0], -3.0, epsilon = 1e-6);
    assert_relative_eq!(positions[0][1], 1.0, epsilon = 1e-6);
    assert_relative_eq!(positions[1][0], -7.0, epsilon = 1e-6);

    let mirrored_transform = scene.lookup(&right.blueprint().module_transform_name()).unwrap();
    assert_relative_eq!(scene.get_vec3(mirrored_transform, "translate").unwrap()[0], -3.0, epsilon = 1e-6);
    let right_container = right.blueprint().container(&scene).unwrap();
    assert!(scene.is_container_locked(right_container).unwrap());
}

#[test]
fn xz_mirrors_twist_their_segments() {
    let mut scene = Scene::new();
    let reg = registry();
    install(&mut scene, &reg, "up", None);
    mirror_modules(
        &mut scene,
        &reg,
        MirrorPlane::XZ,
        &[MirrorRequest::new("SingleJointSegment__up", "down")],
    )
    .unwrap();
    let ik = scene.lookup("SingleJointSegment__down:root_joint_ikHandle").unwrap();
    assert_relative_eq!(scene.get_f64(ik, "twist").unwrap(), 90.0);
    let original = scene.lookup("SingleJointSegment__up:root_joint_ikHandle").unwrap();
    assert_relative_eq!(scene.get_f64(original, "twist").unwrap(), 0.0);
}

#[test]
fn hooks_inside_the_batch_follow_their_mirrors() {
    let mut scene = Scene::new();
    let reg = registry();
    install(&mut scene, &reg, "spine", None);
    install(&mut scene, &reg, "l_clav", Some(end_control("spine").as_str()));
    let arm = install(&mut scene, &reg, "l_arm", Some(end_control("l_clav").as_str()));
    arm.blueprint().constrain_root_to_hook(&mut scene).unwrap();

    mirror_modules(
        &mut scene,
        &reg,
        MirrorPlane::YZ,
        &[
            MirrorRequest::new("SingleJointSegment__l_clav", "r_clav"),
            MirrorRequest::new("SingleJointSegment__l_arm", "r_arm"),
        ],
    )
    .unwrap();

    let r_clav = reg.instantiate(SEGMENT, "r_clav", None).unwrap();
    let r_arm = reg.instantiate(SEGMENT, "r_arm", None).unwrap();
    assert_eq!(r_clav.blueprint().find_hook_object(&scene).unwrap(), end_control("spine"));
    assert_eq!(r_arm.blueprint().find_hook_object(&scene).unwrap(), end_control("r_clav"));
    assert!(r_arm.blueprint().is_root_constrained(&scene).unwrap());
    assert!(!r_clav.blueprint().is_root_constrained(&scene).unwrap());
}

#[test]
fn a_bad_request_rejects_the_whole_batch() {
    let mut scene = Scene::new();
    let reg = registry();
    install(&mut scene, &reg, "left", None);
    install(&mut scene, &reg, "other", None);
    mirror_modules(
        &mut scene,
        &reg,
        MirrorPlane::YZ,
        &[MirrorRequest::new("SingleJointSegment__left", "right")],
    )
    .unwrap();
    let namespaces = scene.namespaces();

    let err = mirror_modules(&mut scene, &reg, MirrorPlane::YZ, &[]).unwrap_err();
    assert!(matches!(err, RigError::InvalidSelection { .. }));

    let err = mirror_modules(
        &mut scene,
        &reg,
        MirrorPlane::YZ,
        &[
            MirrorRequest::new("SingleJointSegment__other", "other_r"),
            MirrorRequest::new("SingleJointSegment__right", "right_again"),
        ],
    )
    .unwrap_err();
    assert!(matches!(err, RigError::MirrorRejected { .. }));

    let err = mirror_modules(
        &mut scene,
        &reg,
        MirrorPlane::YZ,
        &[MirrorRequest::new("SingleJointSegment__other", "left")],
    )
    .unwrap_err();
    assert_eq!(err, RigError::NameConflict { name: "left".into() });

    let err = mirror_modules(
        &mut scene,
        &reg,
        MirrorPlane::YZ,
        &[
            MirrorRequest::new("SingleJointSegment__other", "twin"),
            MirrorRequest::new("SingleJointSegment__left", "twin"),
        ],
    )
    .unwrap_err();
    assert_eq!(err, RigError::NameConflict { name: "twin".into() });

    let err = mirror_modules(
        &mut scene,
        &reg,
        MirrorPlane::YZ,
        &[MirrorRequest::new("SingleJointSegment__ghost", "ghost_r")],
    )
    .unwrap_err();
    assert!(matches!(err, RigError::InvalidSelection { .. }));

    assert_eq!(scene.namespaces(), namespaces);
}

#[test]
fn mirroring_a_group_mirrors_every_module_below_it() {
    let mut scene = Scene::new();
    let reg = registry();
    let spine = install(&mut scene, &reg, "spine", None);
    let clav = install(&mut scene, &reg, "l_clav", Some(end_control("spine").as_str()));
    let arm = install(&mut scene, &reg, "l_arm", Some(end_control("l_clav").as_str()));
    group_selected(
        &mut scene,
        &TemplateLibrary::builtin(),
        "left",
        &[
            clav.blueprint().module_transform_name().as_str(),
            arm.blueprint().module_transform_name().as_str(),
        ],
        GroupPlacement::LastSelected,
    )
    .unwrap();

    let created = mirror_group(&mut scene, &reg, MirrorPlane::YZ, "Group__left", |user| {
        user.replacen("l_", "r_", 1)
    })
    .unwrap();
    assert_eq!(
        created,
        vec!["SingleJointSegment__r_clav".to_string(), "SingleJointSegment__r_arm".into()]
    );
    let r_arm = reg.instantiate(SEGMENT, "r_arm", None).unwrap();
    assert_eq!(r_arm.blueprint().find_hook_object(&scene).unwrap(), end_control("r_clav"));
    assert!(is_module_mirror(&scene, "SingleJointSegment__r_clav"));

    let err = mirror_group(
        &mut scene,
        &reg,
        MirrorPlane::YZ,
        &spine.blueprint().module_transform_name(),
        |user| format!("{user}_r"),
    )
    .unwrap_err();
    assert!(matches!(err, RigError::InvalidSelection { .. }));
    assert!(!scene.namespace_exists("SingleJointSegment__spine_r"));
}
