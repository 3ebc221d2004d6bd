//! Error types for rigging operations

use rigkit_scene::SceneError;

/// Errors raised while installing, editing, locking or mirroring blueprint modules.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum RigError {
    /// A scene edit failed; lock violations surface here
    #[error(transparent)]
    Scene(#[from] SceneError),

    /// Module or group name already taken
    #[error("Name {name} already exists")]
    NameConflict { name: String },

    /// Nothing usable among the given objects
    #[error("Invalid selection: {reason}")]
    InvalidSelection { reason: String },

    #[error("Cannot mirror {module}: {reason}")]
    MirrorRejected { module: String, reason: String },

    #[error("There is no blueprint module instance in the scene")]
    NoModules,

    #[error("Unknown module type: {name}")]
    UnknownModuleType { name: String },

    /// Control template file missing or malformed
    #[error("Control template {template}: {reason}")]
    Template { template: String, reason: String },

    /// Module returned no lock data
    #[error("Module {module} did not provide lock data")]
    MissingSnapshot { module: String },
}

pub type RigResult<T> = Result<T, RigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_errors_pass_through() {
        let err: RigError = SceneError::not_found("ns:root_joint").into();
        assert_eq!(err.to_string(), "Node not found: ns:root_joint");
        assert!(matches!(err, RigError::Scene(SceneError::NodeNotFound { .. })));
    }

    #[test]
    fn name_conflict_message() {
        let err = RigError::NameConflict {
            name: "instance_1".into(),
        };
        assert_eq!(err.to_string(), "Name instance_1 already exists");
    }
}
