//! Mirroring a module across one of the world coordinate planes.

use std::fmt;

use log::debug;
use rigkit_scene::{Scene, Vector3};
use serde::{Deserialize, Serialize};

use super::Blueprint;
use crate::error::RigResult;
use crate::naming::translation_control_name;

/// Attribute on a mirrored module's `module_grp` naming its source and plane.
pub const MIRROR_LINKS_ATTR: &str = "mirrorLinks";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MirrorPlane {
    XY,
    YZ,
    XZ,
}

impl MirrorPlane {
    pub const ALL: [MirrorPlane; 3] = [MirrorPlane::XY, MirrorPlane::YZ, MirrorPlane::XZ];

    /// Negate the coordinate normal to the plane.
    pub fn reflect(self, p: Vector3<f64>) -> Vector3<f64> {
        match self {
            MirrorPlane::YZ => Vector3::new(-p.x, p.y, p.z),
            MirrorPlane::XZ => Vector3::new(p.x, -p.y, p.z),
            MirrorPlane::XY => Vector3::new(p.x, p.y, -p.z),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MirrorPlane::XY => "XY",
            MirrorPlane::YZ => "YZ",
            MirrorPlane::XZ => "XZ",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for MirrorPlane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How translation is reflected by control modules built on the mirror.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MirrorTranslation {
    #[default]
    Mirrored,
    WorldSpace,
}

/// How rotation is reflected by control modules built on the mirror.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MirrorRotation {
    #[default]
    Behavior,
    Orientation,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorSettings {
    /// Namespace of the module being mirrored
    pub original: String,
    pub plane: MirrorPlane,
    pub translation: MirrorTranslation,
    pub rotation: MirrorRotation,
}

impl MirrorSettings {
    pub fn new(original: impl Into<String>, plane: MirrorPlane) -> Self {
        Self {
            original: original.into(),
            plane,
            translation: MirrorTranslation::default(),
            rotation: MirrorRotation::default(),
        }
    }
}

impl Blueprint {
    /// Copy rotate orders from the original module and reflect its control and pole vector
    /// locator positions onto this freshly installed one.
    pub(super) fn apply_mirror(&self, scene: &mut Scene) -> RigResult<()> {
        let Some(settings) = self.mirror.clone() else {
            return Ok(());
        };
        let container = self.container(scene)?;
        let count = self.joint_info.len();
        scene.with_unlocked(container, |scene| -> RigResult<()> {
            for (index, info) in self.joint_info.iter().enumerate() {
                let original_joint = format!("{}:{}", settings.original, info.name);
                let new_joint = self.qualify(&info.name);

                let order = scene.get(scene.lookup(&original_joint)?, "rotateOrder")?;
                let joint = scene.lookup(&new_joint)?;
                scene.set(joint, "rotateOrder", order)?;

                let original_control = translation_control_name(&original_joint);
                let new_control = translation_control_name(&new_joint);
                let mut pairs = vec![(original_control.clone(), new_control.clone())];
                if index + 1 < count {
                    pairs.push((
                        format!("{original_control}_poleVectorLocator"),
                        format!("{new_control}_poleVectorLocator"),
                    ));
                }
                for (from, to) in pairs {
                    let position = settings.plane.reflect(scene.world_position(scene.lookup(&from)?)?);
                    let target = scene.lookup(&to)?;
                    scene.set_world_position(target, position)?;
                }
            }
            let module_grp = scene.lookup(&self.qualify("module_grp"))?;
            scene.add_attr(
                module_grp,
                MIRROR_LINKS_ATTR,
                format!("{}__{}", settings.original, settings.plane).as_str(),
            )?;
            Ok(())
        })?;
        debug!("{} mirrored from {} across {}", self.namespace, settings.original, settings.plane);
        Ok(())
    }
}

/// True if the module in `namespace` was itself created by mirroring.
pub fn is_module_mirror(scene: &Scene, namespace: &str) -> bool {
    scene
        .find(&format!("{namespace}:module_grp"))
        .map_or(false, |grp| scene.has_attr(grp, MIRROR_LINKS_ATTR))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_plane_negates_its_normal() {
        let p = Vector3::new(1.0, 2.0, 3.0);
        assert_eq!(MirrorPlane::YZ.reflect(p), Vector3::new(-1.0, 2.0, 3.0));
        assert_eq!(MirrorPlane::XZ.reflect(p), Vector3::new(1.0, -2.0, 3.0));
        assert_eq!(MirrorPlane::XY.reflect(p), Vector3::new(1.0, 2.0, -3.0));
    }

    #[test]
    fn plane_names_parse_back() {
        for plane in MirrorPlane::ALL {
            assert_eq!(MirrorPlane::parse(plane.as_str()), Some(plane));
        }
        assert_eq!(MirrorPlane::parse("yz"), Some(MirrorPlane::YZ));
        assert_eq!(MirrorPlane::parse("ZY"), None);
    }
}
