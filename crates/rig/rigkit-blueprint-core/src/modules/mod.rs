//! Built-in module types.

pub mod single_joint_segment;

pub use single_joint_segment::SingleJointSegment;
