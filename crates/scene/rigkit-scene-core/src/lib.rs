//! rigkit-scene: in-memory scene graph the rigging toolkit builds into.
//!
//! Nodes live in a DAG with namespaced unique names, typed attributes and plug connections.
//! Values are pulled on demand: transforms, utility nodes, constraints and IK handles compute
//! their outputs from their inputs at read time. Containers group nodes, publish a subset of
//! their attributes and, when locked, refuse every other edit.

pub mod attr_path;
pub mod coercion;
pub mod constraints;
pub mod container;
pub mod error;
mod eval;
pub mod ik;
pub mod math;
pub mod node;
pub mod scene;
pub mod transform;
pub mod utility;
pub mod value;

pub use attr_path::AttrPath;
pub use constraints::ConstraintOptions;
pub use container::AddOptions;
pub use error::{SceneError, SceneResult};
pub use ik::IkHandleNodes;
pub use math::RotateOrder;
pub use node::{NodeHandle, NodeKind, PlugKey, Primitive};
pub use scene::Scene;
pub use transform::SecondaryAxis;
pub use utility::{MultiplyDivideOp, PlusMinusOp};
pub use value::{AttrValue, ValueKind};

pub use nalgebra::Vector3;
