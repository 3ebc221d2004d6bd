//! Registry of installable module types.

use std::fmt;
use std::path::PathBuf;

use crate::blueprint::BlueprintModule;
use crate::config::RigConfig;
use crate::error::{RigError, RigResult};
use crate::modules::single_joint_segment;

/// Builds a module from `(user_name, hook)`.
pub type ModuleConstructor = fn(&str, Option<&str>) -> Box<dyn BlueprintModule>;

/// What a user interface needs to list a module type and build instances of it.
#[derive(Clone)]
pub struct ModuleDescriptor {
    pub class_name: String,
    pub description: String,
    /// Relative to the installation root
    pub icon: Option<PathBuf>,
    pub constructor: ModuleConstructor,
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("class_name", &self.class_name)
            .field("description", &self.description)
            .field("icon", &self.icon)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, Default)]
pub struct ModuleRegistry {
    descriptors: Vec<ModuleDescriptor>,
    config: RigConfig,
}

impl ModuleRegistry {
    pub fn new(config: RigConfig) -> Self {
        Self {
            descriptors: Vec::new(),
            config,
        }
    }

    /// Registry holding every built-in module type.
    pub fn builtin(config: RigConfig) -> Self {
        let mut registry = Self::new(config);
        registry.register(ModuleDescriptor {
            class_name: single_joint_segment::CLASS_NAME.into(),
            description: single_joint_segment::DESCRIPTION.into(),
            icon: Some(PathBuf::from(single_joint_segment::ICON)),
            constructor: single_joint_segment::SingleJointSegment::boxed,
        });
        registry
    }

    /// Add a module type, replacing any earlier one with the same class name.
    pub fn register(&mut self, descriptor: ModuleDescriptor) {
        self.descriptors.retain(|d| d.class_name != descriptor.class_name);
        self.descriptors.push(descriptor);
    }

    pub fn config(&self) -> &RigConfig {
        &self.config
    }

    pub fn descriptors(&self) -> &[ModuleDescriptor] {
        &self.descriptors
    }

    pub fn get(&self, class_name: &str) -> Option<&ModuleDescriptor> {
        self.descriptors.iter().find(|d| d.class_name == class_name)
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.get(class_name).is_some()
    }

    /// Icon of a module type resolved against the configured installation root.
    pub fn icon_path(&self, class_name: &str) -> Option<PathBuf> {
        let icon = self.get(class_name)?.icon.as_ref()?;
        Some(match &self.config.tool_root {
            Some(root) => root.join(icon),
            None => icon.clone(),
        })
    }

    /// Build an (uninstalled) instance carrying this registry's configuration.
    pub fn instantiate(&self, class_name: &str, user_name: &str, hook: Option<&str>) -> RigResult<Box<dyn BlueprintModule>> {
        let descriptor = self.get(class_name).ok_or_else(|| RigError::UnknownModuleType {
            name: class_name.to_string(),
        })?;
        let mut module = (descriptor.constructor)(user_name, hook);
        module.blueprint_mut().set_config(self.config.clone());
        Ok(module)
    }
}
