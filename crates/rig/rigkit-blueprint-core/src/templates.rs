//! Control geometry templates.
//!
//! Every builder in [`crate::controls`] draws its display shapes from a named template.
//! Built-in templates cover all of them; a configured installation root may override any
//! template with `ControlObjects/Blueprint/<name>.json`.

use std::fs;

use indexmap::IndexMap;
use log::debug;
use rigkit_scene::Primitive;
use serde::{Deserialize, Serialize};

use crate::config::RigConfig;
use crate::error::{RigError, RigResult};

pub const TRANSLATION_CONTROL: &str = "translation_control";
pub const ORIENTATION_CONNECTOR: &str = "orientation_connector";
pub const HIERARCHY_CONNECTOR: &str = "hierarchy_connector";
pub const HOOK_CONNECTOR: &str = "hook_connector";
pub const MODULE_TRANSFORM: &str = "module_transform";

/// Templates the blueprint builders ask for.
pub const TEMPLATE_NAMES: [&str; 5] = [
    TRANSLATION_CONTROL,
    ORIENTATION_CONNECTOR,
    HIERARCHY_CONNECTOR,
    HOOK_CONNECTOR,
    MODULE_TRANSFORM,
];

const RED: [f64; 3] = [1.0, 0.0, 0.0];
const GREEN: [f64; 3] = [0.0, 1.0, 0.0];
const BLUE: [f64; 3] = [0.0, 0.0, 1.0];
const YELLOW: [f64; 3] = [1.0, 1.0, 0.0];
const ORANGE: [f64; 3] = [1.0, 0.5, 0.0];
const CYAN: [f64; 3] = [0.0, 1.0, 1.0];

/// One display shape of a control. The shape node is named `<control><suffix>`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShapeTemplate {
    pub suffix: String,
    pub geometry: Primitive,
    /// Material color; `None` leaves the shape without a material
    #[serde(default)]
    pub color: Option<[f64; 3]>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControlTemplate {
    pub shapes: Vec<ShapeTemplate>,
    /// Draw with display overrides and no shading
    #[serde(default)]
    pub unlit: bool,
}

fn shape(suffix: &str, geometry: Primitive, color: Option<[f64; 3]>) -> ShapeTemplate {
    ShapeTemplate {
        suffix: suffix.to_string(),
        geometry,
        color,
    }
}

fn builtin_template(name: &str) -> Option<ControlTemplate> {
    let x = [1.0, 0.0, 0.0];
    let t = match name {
        TRANSLATION_CONTROL => ControlTemplate {
            shapes: vec![shape("Shape", Primitive::Sphere { radius: 0.5 }, Some(RED))],
            unlit: false,
        },
        ORIENTATION_CONNECTOR => ControlTemplate {
            shapes: vec![
                shape(
                    "_yBladeShape",
                    Primitive::Blade {
                        width: 0.3,
                        length: 1.0,
                        normal: [0.0, 0.0, 1.0],
                    },
                    Some(GREEN),
                ),
                shape(
                    "_zBladeShape",
                    Primitive::Blade {
                        width: 0.3,
                        length: 1.0,
                        normal: [0.0, 1.0, 0.0],
                    },
                    Some(BLUE),
                ),
            ],
            unlit: false,
        },
        HIERARCHY_CONNECTOR => ControlTemplate {
            shapes: vec![
                shape(
                    "_shaftShape",
                    Primitive::Cylinder {
                        radius: 0.1,
                        height: 1.0,
                        axis: x,
                    },
                    Some(YELLOW),
                ),
                shape(
                    "_headShape",
                    Primitive::Cone {
                        radius: 0.2,
                        height: 0.3,
                        axis: x,
                    },
                    Some(ORANGE),
                ),
            ],
            unlit: false,
        },
        HOOK_CONNECTOR => ControlTemplate {
            shapes: vec![shape(
                "Shape",
                Primitive::Cylinder {
                    radius: 0.05,
                    height: 1.0,
                    axis: x,
                },
                Some(CYAN),
            )],
            unlit: false,
        },
        MODULE_TRANSFORM => ControlTemplate {
            shapes: vec![
                shape("_xShape", Primitive::Cube { size: [2.0, 0.2, 0.2] }, None),
                shape("_yShape", Primitive::Cube { size: [0.2, 2.0, 0.2] }, None),
                shape("_zShape", Primitive::Cube { size: [0.2, 0.2, 2.0] }, None),
            ],
            unlit: true,
        },
        _ => return None,
    };
    Some(t)
}

/// Named control templates.
#[derive(Clone, Debug, PartialEq)]
pub struct TemplateLibrary {
    templates: IndexMap<String, ControlTemplate>,
}

impl Default for TemplateLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TemplateLibrary {
    pub fn builtin() -> Self {
        let templates = TEMPLATE_NAMES
            .iter()
            .filter_map(|name| builtin_template(name).map(|t| (name.to_string(), t)))
            .collect();
        Self { templates }
    }

    /// Built-ins, overridden by whatever template files the configured root provides.
    pub fn load(config: &RigConfig) -> RigResult<Self> {
        let mut library = Self::builtin();
        let Some(dir) = config.template_dir() else {
            return Ok(library);
        };
        for name in TEMPLATE_NAMES {
            let path = dir.join(format!("{name}.json"));
            if !path.is_file() {
                debug!("no template file at {}; using built-in {name}", path.display());
                continue;
            }
            let text = fs::read_to_string(&path).map_err(|e| RigError::Template {
                template: name.to_string(),
                reason: format!("{}: {e}", path.display()),
            })?;
            library.insert(name, Self::parse(name, &text)?);
        }
        Ok(library)
    }

    /// Parse one template from JSON.
    pub fn parse(name: &str, json: &str) -> RigResult<ControlTemplate> {
        serde_json::from_str(json).map_err(|e| RigError::Template {
            template: name.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn insert(&mut self, name: &str, template: ControlTemplate) {
        self.templates.insert(name.to_string(), template);
    }

    pub fn get(&self, name: &str) -> RigResult<&ControlTemplate> {
        self.templates.get(name).ok_or_else(|| RigError::Template {
            template: name.to_string(),
            reason: "not defined".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_cover_every_builder() {
        let lib = TemplateLibrary::builtin();
        for name in TEMPLATE_NAMES {
            assert!(!lib.get(name).unwrap().shapes.is_empty(), "{name}");
        }
        assert!(lib.get(MODULE_TRANSFORM).unwrap().unlit);
        assert_eq!(lib.get(ORIENTATION_CONNECTOR).unwrap().shapes.len(), 2);
        assert!(matches!(lib.get("nope"), Err(RigError::Template { .. })));
    }

    #[test]
    fn parse_reads_tagged_geometry() {
        let t = TemplateLibrary::parse(
            TRANSLATION_CONTROL,
            r#"{"shapes":[{"suffix":"Shape","geometry":{"primitive":"sphere","radius":2.0},"color":[1,0,0]}]}"#,
        )
        .unwrap();
        assert_eq!(t.shapes[0].geometry, Primitive::Sphere { radius: 2.0 });
        assert!(!t.unlit);
    }

    #[test]
    fn parse_failure_names_the_template() {
        let err = TemplateLibrary::parse(HOOK_CONNECTOR, "{").unwrap_err();
        assert!(err.to_string().starts_with("Control template hook_connector:"));
    }

    #[test]
    fn missing_root_uses_builtins() {
        let lib = TemplateLibrary::load(&RigConfig::default().with_tool_root("/definitely/not/here")).unwrap();
        assert_eq!(lib, TemplateLibrary::builtin());
    }
}
