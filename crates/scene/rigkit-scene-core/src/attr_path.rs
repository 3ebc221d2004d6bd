//! AttrPath parsing and formatting.
//!
//! Grammar:
//!   namespace:...:node.attribute[.sub]
//! - ':' separates namespace segments
//! - the first '.' separates the node name from the attribute selector
//!   Examples:
//!   "SingleJointSegment__arm:root_joint.translateX" -> namespaces=["SingleJointSegment__arm"],
//!     node="root_joint", attribute=Some("translateX")
//!   "hook_pointConstraint.target[0].targetParentMatrix" -> namespaces=[], node="hook_pointConstraint",
//!     attribute=Some("target[0].targetParentMatrix")
//!   "Group_container" -> namespaces=[], node="Group_container", attribute=None

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttrPath {
    /// Namespace segments preceding the node (may be empty)
    pub namespaces: Vec<String>,
    /// Node short name
    pub node: String,
    /// Attribute selector, kept verbatim (may contain '.' and '[n]')
    pub attribute: Option<String>,
}

impl AttrPath {
    pub fn new(namespaces: Vec<String>, node: impl Into<String>, attribute: Option<String>) -> Self {
        Self {
            namespaces,
            node: node.into(),
            attribute,
        }
    }

    /// Parse a path string according to the grammar described above.
    pub fn parse(s: &str) -> Result<Self, String> {
        if s.is_empty() {
            return Err("empty path".to_string());
        }
        if s.chars().any(char::is_whitespace) {
            return Err("invalid attribute path: contains whitespace".to_string());
        }
        let (node_part, attribute) = match s.split_once('.') {
            Some((node, attr)) => {
                if attr.is_empty() || attr.split('.').any(str::is_empty) {
                    return Err("invalid attribute path: empty attribute segment".to_string());
                }
                (node, Some(attr.to_string()))
            }
            None => (s, None),
        };
        let mut parts: Vec<&str> = node_part.split(':').collect();
        if parts.iter().any(|seg| seg.is_empty()) {
            return Err("invalid attribute path: empty namespace segment".to_string());
        }
        let node = match parts.pop() {
            Some(node) => node.to_string(),
            None => return Err("invalid attribute path: missing node".to_string()),
        };
        Ok(AttrPath {
            namespaces: parts.into_iter().map(str::to_string).collect(),
            node,
            attribute,
        })
    }

    /// Fully qualified node name (`ns:...:node`).
    pub fn node_name(&self) -> String {
        if self.namespaces.is_empty() {
            self.node.clone()
        } else {
            format!("{}:{}", self.namespaces.join(":"), self.node)
        }
    }

    /// Namespace the node lives in, `None` for the root namespace.
    pub fn namespace(&self) -> Option<String> {
        if self.namespaces.is_empty() {
            None
        } else {
            Some(self.namespaces.join(":"))
        }
    }

    pub fn attribute(&self) -> Option<&str> {
        self.attribute.as_deref()
    }
}

impl fmt::Display for AttrPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.node_name())?;
        if let Some(attr) = &self.attribute {
            write!(f, ".{attr}")?;
        }
        Ok(())
    }
}

impl FromStr for AttrPath {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AttrPath::parse(s)
    }
}

impl Serialize for AttrPath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AttrPath {
    fn deserialize<D>(deserializer: D) -> Result<AttrPath, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        AttrPath::parse(&s).map_err(de::Error::custom)
    }
}
