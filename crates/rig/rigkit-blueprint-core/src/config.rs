//! Toolkit configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Environment variable naming the installation root.
pub const TOOL_ROOT_ENV: &str = "RIGGING_TOOL_ROOT";

/// Settings shared by every module a registry builds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RigConfig {
    /// Installation root; control templates live under `ControlObjects/Blueprint`.
    /// Built-in templates are used when unset.
    pub tool_root: Option<PathBuf>,

    /// World offset of the unhooked placeholder from the root control.
    pub unhooked_offset: [f64; 3],

    /// Offset of a synthesized pole vector locator from the chain root.
    pub pole_vector_offset: [f64; 3],

    /// `translateY` of the per-segment pole vector locator under its control.
    pub segment_pole_offset: f64,

    /// Radius of locked joints in multi-joint modules.
    pub blueprint_joint_radius: f64,
    /// Radius of the joint of a single-joint module.
    pub single_joint_radius: f64,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            tool_root: None,
            unhooked_offset: [0.0, 0.001, 0.0],
            pole_vector_offset: [0.0, 1.0, 0.0],
            segment_pole_offset: -0.5,
            blueprint_joint_radius: 1.0,
            single_joint_radius: 1.5,
        }
    }
}

impl RigConfig {
    /// Defaults with `tool_root` taken from `RIGGING_TOOL_ROOT` when it is set and non-empty.
    pub fn from_env() -> Self {
        let tool_root = std::env::var_os(TOOL_ROOT_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Self {
            tool_root,
            ..Self::default()
        }
    }

    pub fn with_tool_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.tool_root = Some(root.into());
        self
    }

    /// Directory holding blueprint control templates, if a root is configured.
    pub fn template_dir(&self) -> Option<PathBuf> {
        self.tool_root
            .as_ref()
            .map(|root| root.join("ControlObjects").join("Blueprint"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_blueprint_layout() {
        let cfg = RigConfig::default();
        assert_eq!(cfg.unhooked_offset, [0.0, 0.001, 0.0]);
        assert_eq!(cfg.segment_pole_offset, -0.5);
        assert!(cfg.template_dir().is_none());
    }

    #[test]
    fn template_dir_sits_under_the_root() {
        let cfg = RigConfig::default().with_tool_root("/opt/rig");
        assert_eq!(
            cfg.template_dir().unwrap(),
            PathBuf::from("/opt/rig/ControlObjects/Blueprint")
        );
    }

    #[test]
    fn config_round_trips_through_json() {
        let cfg = RigConfig::default().with_tool_root("/opt/rig");
        let text = serde_json::to_string(&cfg).unwrap();
        let back: RigConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back, cfg);
    }
}
