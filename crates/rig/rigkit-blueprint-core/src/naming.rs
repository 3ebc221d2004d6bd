//! Name composition and parsing for module namespaces and control names.

use rigkit_scene::Scene;

/// Separates module type and user name inside a module namespace.
pub const MODULE_SEPARATOR: &str = "__";
/// Prefix of user-created module groups.
pub const GROUP_PREFIX: &str = "Group__";
/// Base of auto-generated user names.
pub const INSTANCE_BASE: &str = "instance_";

const TRANSLATION_CONTROL_SUFFIX: &str = "_translation_control";

/// `"{module_type}__{user_name}"`. Uniqueness is the caller's concern.
pub fn compose_namespace(module_type: &str, user_name: &str) -> String {
    format!("{module_type}{MODULE_SEPARATOR}{user_name}")
}

/// Split a module namespace into `(module_type, user_name)`.
pub fn split_module_namespace(namespace: &str) -> Option<(&str, &str)> {
    namespace.split_once(MODULE_SEPARATOR)
}

/// Split at the first namespace separator: `a:b:c` -> `("a", "b:c")`.
pub fn split_leading_namespace(name: &str) -> Option<(String, String)> {
    name.split_once(':')
        .map(|(ns, rest)| (ns.to_string(), rest.to_string()))
}

/// Split at the last namespace separator: `a:b:c` -> `("a:b", "c")`.
pub fn split_all_namespaces(name: &str) -> Option<(String, String)> {
    name.rsplit_once(':')
        .map(|(ns, leaf)| (ns.to_string(), leaf.to_string()))
}

/// Largest integer `n` such that some name is exactly `base` followed by the digits of `n`.
/// Returns 0 when nothing matches.
pub fn highest_trailing_number<I, S>(names: I, base: &str) -> u32
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .filter_map(|name| {
            let suffix = name.as_ref().strip_prefix(base)?;
            if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            suffix.parse::<u32>().ok()
        })
        .max()
        .unwrap_or(0)
}

pub fn translation_control_name(joint: &str) -> String {
    format!("{joint}{TRANSLATION_CONTROL_SUFFIX}")
}

pub fn orientation_connector_name(joint: &str) -> String {
    format!("{joint}_orientation_connector")
}

/// True for names ending in `_translation_control` with nothing after it.
pub fn is_translation_control(name: &str) -> bool {
    joint_of_translation_control(name).is_some()
}

/// Joint a translation control belongs to: `ns:root_joint_translation_control` -> `ns:root_joint`.
pub fn joint_of_translation_control(name: &str) -> Option<&str> {
    name.strip_suffix(TRANSLATION_CONTROL_SUFFIX)
        .filter(|joint| !joint.is_empty())
}

/// True if any module namespace in the scene carries `user_name`.
pub fn user_name_exists(scene: &Scene, user_name: &str) -> bool {
    scene
        .namespaces()
        .iter()
        .filter_map(|ns| split_module_namespace(ns))
        .any(|(_, user)| user == user_name)
}

/// Next free `instance_N` user name across every module type.
pub fn next_instance_name(scene: &Scene) -> String {
    let stripped: Vec<String> = scene
        .namespaces()
        .into_iter()
        .map(|ns| match split_module_namespace(&ns) {
            Some((_, user)) => user.to_string(),
            None => ns,
        })
        .collect();
    let next = highest_trailing_number(&stripped, INSTANCE_BASE) + 1;
    format!("{INSTANCE_BASE}{next}")
}
