use approx::assert_relative_eq;
use rigkit_blueprint::groups::{find_sub_modules, GROUP_CONTAINER};
use rigkit_blueprint::{
    group_selected, install_module_named, ungroup, BlueprintModule, GroupPlacement, ModuleRegistry, RigConfig,
    RigError, TemplateLibrary,
};
use rigkit_scene::{Scene, Vector3};

const SEGMENT: &str = "SingleJointSegment";

fn two_modules(scene: &mut Scene) -> (ModuleRegistry, Box<dyn BlueprintModule>, Box<dyn BlueprintModule>) {
    let reg = ModuleRegistry::builtin(RigConfig::default());
    let a = install_module_named(scene, &reg, SEGMENT, "a", None).unwrap();
    let b = install_module_named(scene, &reg, SEGMENT, "b", None).unwrap();
    let container = b.blueprint().container(scene).unwrap();
    scene.set(container, "moduleTransform_Translate", [0.0, 4.0, 0.0]).unwrap();
    (reg, a, b)
}

#[test]
fn grouping_modules_keeps_them_in_place() {
    let mut scene = Scene::new();
    let (_, a, b) = two_modules(&mut scene);
    let a_transform = a.blueprint().module_transform_name();
    let b_transform = b.blueprint().module_transform_name();

    let group = group_selected(
        &mut scene,
        &TemplateLibrary::builtin(),
        "limbs",
        &[a_transform.as_str(), b_transform.as_str()],
        GroupPlacement::Average,
    )
    .unwrap();
    assert_eq!(scene.name_of(group).unwrap(), "Group__limbs");
    assert_relative_eq!(scene.world_position(group).unwrap(), Vector3::new(0.0, 2.0, 0.0), epsilon = 1e-9);

    let b_node = scene.lookup(&b_transform).unwrap();
    assert_eq!(scene.parent_of(b_node).unwrap(), Some(group));
    assert_relative_eq!(scene.world_position(b_node).unwrap(), Vector3::new(0.0, 4.0, 0.0), epsilon = 1e-9);
    assert_eq!(
        find_sub_modules(&scene, group).unwrap(),
        vec!["SingleJointSegment__a".to_string(), "SingleJointSegment__b".into()]
    );

    let group_container = scene.lookup(GROUP_CONTAINER).unwrap();
    assert!(scene.is_container_locked(group_container).unwrap());
    for container in [a.blueprint().container(&scene).unwrap(), b.blueprint().container(&scene).unwrap()] {
        assert!(scene.is_container_locked(container).unwrap());
    }

    scene.set(group_container, "limbs_t", [1.0, 2.0, 0.0]).unwrap();
    assert_relative_eq!(scene.world_position(b_node).unwrap(), Vector3::new(1.0, 4.0, 0.0), epsilon = 1e-9);
}

#[test]
fn taken_group_names_are_refused() {
    let mut scene = Scene::new();
    let (_, a, b) = two_modules(&mut scene);
    let lib = TemplateLibrary::builtin();
    group_selected(&mut scene, &lib, "limbs", &[a.blueprint().module_transform_name().as_str()], GroupPlacement::LastSelected)
        .unwrap();
    let err = group_selected(
        &mut scene,
        &lib,
        "limbs",
        &[b.blueprint().module_transform_name().as_str()],
        GroupPlacement::LastSelected,
    )
    .unwrap_err();
    assert_eq!(err, RigError::NameConflict { name: "Group__limbs".into() });
}

#[test]
fn ungrouping_returns_modules_to_the_world() {
    let mut scene = Scene::new();
    let (_, a, _) = two_modules(&mut scene);
    let a_transform = a.blueprint().module_transform_name();
    group_selected(
        &mut scene,
        &TemplateLibrary::builtin(),
        "arm",
        &[a_transform.as_str()],
        GroupPlacement::LastSelected,
    )
    .unwrap();

    ungroup(&mut scene, &["Group__arm"]).unwrap();
    let node = scene.lookup(&a_transform).unwrap();
    assert_eq!(scene.parent_of(node).unwrap(), None);
    assert!(!scene.exists("Group__arm"));
    assert!(!scene.exists(GROUP_CONTAINER));
    let container = a.blueprint().container(&scene).unwrap();
    assert!(scene.is_container_locked(container).unwrap());
}

#[test]
fn deleting_the_last_member_dissolves_the_group() {
    let mut scene = Scene::new();
    let (reg, a, b) = two_modules(&mut scene);
    group_selected(
        &mut scene,
        &TemplateLibrary::builtin(),
        "limbs",
        &[
            a.blueprint().module_transform_name().as_str(),
            b.blueprint().module_transform_name().as_str(),
        ],
        GroupPlacement::LastSelected,
    )
    .unwrap();

    a.blueprint().delete(&mut scene, &reg).unwrap();
    assert!(scene.exists("Group__limbs"));

    b.blueprint().delete(&mut scene, &reg).unwrap();
    assert!(!scene.exists("Group__limbs"));
    assert!(!scene.exists(GROUP_CONTAINER));
    assert!(scene.namespaces().is_empty());
}
