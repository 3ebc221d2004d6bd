//! Error types for scene graph operations

/// Errors raised by scene queries and edits.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum SceneError {
    /// No node carries this name
    #[error("Node not found: {name}")]
    NodeNotFound { name: String },

    /// A handle outlived its node
    #[error("Stale node handle: {id}")]
    StaleHandle { id: u32 },

    /// Node names are unique across the scene
    #[error("Name already in use: {name}")]
    NameCollision { name: String },

    #[error("Namespace not found: {namespace}")]
    NamespaceNotFound { namespace: String },

    #[error("Namespace already exists: {namespace}")]
    NamespaceExists { namespace: String },

    #[error("Namespace {namespace} still holds {count} node(s)")]
    NamespaceNotEmpty { namespace: String, count: usize },

    #[error("Attribute not found: {node}.{attribute}")]
    AttributeNotFound { node: String, attribute: String },

    #[error("Attribute already exists: {node}.{attribute}")]
    AttributeExists { node: String, attribute: String },

    /// Attribute carries its own lock flag
    #[error("Attribute is locked: {node}.{attribute}")]
    AttributeLocked { node: String, attribute: String },

    /// Attribute is driven by an incoming connection
    #[error("Attribute is connected: {node}.{attribute}")]
    AttributeConnected { node: String, attribute: String },

    /// Computed outputs cannot be written
    #[error("Attribute is read-only: {node}.{attribute}")]
    ReadOnlyAttribute { node: String, attribute: String },

    /// Edit touched a node owned by a locked container
    #[error("Container {container} is locked; cannot edit {node}")]
    ContainerLocked { container: String, node: String },

    #[error("Published name {name} already exists on {container}")]
    PublishedNameTaken { container: String, name: String },

    #[error("Type mismatch on {node}.{attribute}: expected {expected}, got {actual}")]
    TypeMismatch {
        node: String,
        attribute: String,
        expected: String,
        actual: String,
    },

    /// Pull evaluation reached a plug that is already being evaluated
    #[error("Evaluation cycle detected at {plug}")]
    Cycle { plug: String },

    #[error("Invalid attribute path {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// Catch-all for structural misuse (wrong node kind, bad hierarchy)
    #[error("Invalid operation: {reason}")]
    InvalidOperation { reason: String },
}

impl SceneError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        SceneError::InvalidOperation {
            reason: reason.into(),
        }
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        SceneError::NodeNotFound { name: name.into() }
    }
}

pub type SceneResult<T> = Result<T, SceneError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_node() {
        let err = SceneError::ContainerLocked {
            container: "ns:module_container".into(),
            node: "ns:root_joint".into(),
        };
        assert_eq!(
            err.to_string(),
            "Container ns:module_container is locked; cannot edit ns:root_joint"
        );
    }
}
