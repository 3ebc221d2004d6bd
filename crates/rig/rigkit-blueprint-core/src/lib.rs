//! rigkit-blueprint: blueprint rigging modules over a rigkit scene.
//!
//! A module is installed into its own namespace as an editable blueprint: joints driven by
//! translation controls through stretchy IK segments, connectors showing the hierarchy, and
//! a hook tying its root to another module. Locking turns every module into permanent joints
//! in three passes. Modules can be grouped, mirrored, renamed and deleted.

pub mod blueprint;
pub mod config;
pub mod containers;
pub mod controls;
pub mod error;
pub mod groups;
pub mod modules;
pub mod naming;
pub mod pipeline;
pub mod registry;
pub mod stretchy_ik;
pub mod templates;

// Re-exports for tools driving the core
pub use blueprint::{
    is_module_mirror, AxisOrientation, Blueprint, BlueprintModule, JointInfo, JointOrientations, MirrorPlane, MirrorRotation,
    MirrorSettings, MirrorTranslation, ModuleSnapshot, UiControl,
};
pub use config::RigConfig;
pub use containers::{add_node_to_container, create_container, ContainerOptions};
pub use controls::{ConnectorKind, ControlObject};
pub use error::{RigError, RigResult};
pub use groups::{group_selected, ungroup, GroupPlacement};
pub use modules::SingleJointSegment;
pub use pipeline::{install_module, install_module_named, lock_all, mirror_group, mirror_modules, MirrorRequest};
pub use registry::{ModuleDescriptor, ModuleRegistry};
pub use stretchy_ik::{basic_stretchy_ik, StretchyIkNodes, StretchyIkOptions};
pub use templates::TemplateLibrary;
