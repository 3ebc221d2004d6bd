//! Node storage types: handles, kinds, attributes and plug keys.

use indexmap::{IndexMap, IndexSet};
use nalgebra::{Rotation3, Vector3};
use serde::{Deserialize, Serialize};

use crate::math::RotateOrder;
use crate::value::AttrValue;

/// Stable handle to a node. Handles are never reused within a scene.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeHandle(pub u32);

/// Display primitive for control geometry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "primitive", rename_all = "snake_case")]
pub enum Primitive {
    Sphere { radius: f64 },
    Cylinder { radius: f64, height: f64, axis: [f64; 3] },
    Cone { radius: f64, height: f64, axis: [f64; 3] },
    Cube { size: [f64; 3] },
    /// Flat plate used for orientation connectors
    Blade { width: f64, length: f64, normal: [f64; 3] },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ShapeData {
    pub primitive: Primitive,
    pub material: Option<NodeHandle>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MaterialData {
    pub color: [f64; 3],
}

/// Ownership and lock record of a container node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContainerData {
    pub members: IndexSet<NodeHandle>,
    /// Published name -> bound plug (a member plug or a nested container's published name)
    pub published: IndexMap<String, PlugKey>,
    pub locked: bool,
}

/// Pose the IK solver treats as its reference, expressed in the start joint's parent space.
#[derive(Clone, Debug, PartialEq)]
pub struct IkRest {
    pub rotation: Rotation3<f64>,
    pub aim: Vector3<f64>,
    pub pole: Vector3<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IkHandleData {
    pub start_joint: NodeHandle,
    pub end_joint: NodeHandle,
    pub effector: Option<NodeHandle>,
    pub rest: IkRest,
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Transform,
    Joint,
    Locator,
    Shape(ShapeData),
    Material(MaterialData),
    Container(ContainerData),
    IkHandle(IkHandleData),
    IkEffector,
    PointConstraint,
    ParentConstraint,
    ScaleConstraint,
    PoleVectorConstraint,
    MultiplyDivide,
    PlusMinusAverage,
    DistanceBetween,
}

impl NodeKind {
    /// Node type name as the host reports it.
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::Transform => "transform",
            NodeKind::Joint => "joint",
            NodeKind::Locator => "locator",
            NodeKind::Shape(_) => "mesh",
            NodeKind::Material(_) => "lambert",
            NodeKind::Container(_) => "container",
            NodeKind::IkHandle(_) => "ikHandle",
            NodeKind::IkEffector => "ikEffector",
            NodeKind::PointConstraint => "pointConstraint",
            NodeKind::ParentConstraint => "parentConstraint",
            NodeKind::ScaleConstraint => "scaleConstraint",
            NodeKind::PoleVectorConstraint => "poleVectorConstraint",
            NodeKind::MultiplyDivide => "multiplyDivide",
            NodeKind::PlusMinusAverage => "plusMinusAverage",
            NodeKind::DistanceBetween => "distanceBetween",
        }
    }

    /// Nodes that sit in the transform hierarchy.
    pub fn is_dag(&self) -> bool {
        !matches!(
            self,
            NodeKind::Material(_)
                | NodeKind::Container(_)
                | NodeKind::MultiplyDivide
                | NodeKind::PlusMinusAverage
                | NodeKind::DistanceBetween
        )
    }

    /// DAG nodes that carry a full transform (everything except shapes).
    pub fn is_transform(&self) -> bool {
        self.is_dag() && !matches!(self, NodeKind::Shape(_))
    }

    pub fn is_constraint(&self) -> bool {
        matches!(
            self,
            NodeKind::PointConstraint
                | NodeKind::ParentConstraint
                | NodeKind::ScaleConstraint
                | NodeKind::PoleVectorConstraint
        )
    }

    /// Attributes every node of this kind starts with.
    pub(crate) fn default_attributes(&self) -> Vec<(&'static str, AttrValue)> {
        let mut attrs = Vec::new();
        if self.is_transform() {
            attrs.extend([
                ("translate", AttrValue::vec3(0.0, 0.0, 0.0)),
                ("rotate", AttrValue::vec3(0.0, 0.0, 0.0)),
                ("scale", AttrValue::vec3(1.0, 1.0, 1.0)),
                ("rotatePivot", AttrValue::vec3(0.0, 0.0, 0.0)),
                ("rotatePivotTranslate", AttrValue::vec3(0.0, 0.0, 0.0)),
                (
                    "rotateOrder",
                    AttrValue::enum_from_fields(RotateOrder::ENUM_FIELDS, 0),
                ),
                ("visibility", AttrValue::Bool(true)),
            ]);
        }
        match self {
            NodeKind::Joint => attrs.extend([
                ("jointOrient", AttrValue::vec3(0.0, 0.0, 0.0)),
                ("preferredAngle", AttrValue::vec3(0.0, 0.0, 0.0)),
                ("radius", AttrValue::Float(1.0)),
                ("segmentScaleCompensate", AttrValue::Bool(true)),
            ]),
            NodeKind::IkHandle(_) => attrs.extend([
                ("poleVector", AttrValue::vec3(0.0, 1.0, 0.0)),
                ("twist", AttrValue::Float(0.0)),
            ]),
            NodeKind::PointConstraint => {
                attrs.push(("offset", AttrValue::vec3(0.0, 0.0, 0.0)));
            }
            NodeKind::ScaleConstraint => {
                attrs.push(("offset", AttrValue::vec3(1.0, 1.0, 1.0)));
            }
            NodeKind::Shape(_) => attrs.extend([
                ("visibility", AttrValue::Bool(true)),
                ("overrideEnabled", AttrValue::Bool(false)),
                ("overrideShading", AttrValue::Bool(true)),
            ]),
            NodeKind::Material(m) => attrs.push(("color", AttrValue::Double3(m.color))),
            NodeKind::MultiplyDivide => attrs.extend([
                ("operation", AttrValue::Int(1)),
                ("input1", AttrValue::vec3(0.0, 0.0, 0.0)),
                ("input2", AttrValue::vec3(1.0, 1.0, 1.0)),
            ]),
            NodeKind::PlusMinusAverage => attrs.push(("operation", AttrValue::Int(1))),
            NodeKind::DistanceBetween => attrs.extend([
                ("point1", AttrValue::vec3(0.0, 0.0, 0.0)),
                ("point2", AttrValue::vec3(0.0, 0.0, 0.0)),
            ]),
            _ => {}
        }
        attrs
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    pub value: AttrValue,
    pub locked: bool,
    /// Per-component locks for compound values
    pub locked_components: [bool; 3],
}

impl Attribute {
    pub fn new(value: AttrValue) -> Self {
        Self {
            value,
            locked: false,
            locked_components: [false; 3],
        }
    }
}

#[derive(Clone, Debug)]
pub struct Node {
    pub(crate) name: String,
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeHandle>,
    pub(crate) children: Vec<NodeHandle>,
    pub(crate) attrs: IndexMap<String, Attribute>,
    pub(crate) aliases: IndexMap<String, String>,
    /// Container that owns this node
    pub(crate) owner: Option<NodeHandle>,
}

impl Node {
    pub(crate) fn new(name: String, kind: NodeKind) -> Self {
        let attrs = kind
            .default_attributes()
            .into_iter()
            .map(|(k, v)| (k.to_string(), Attribute::new(v)))
            .collect();
        Self {
            name,
            kind,
            parent: None,
            children: Vec::new(),
            attrs,
            aliases: IndexMap::new(),
            owner: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn parent(&self) -> Option<NodeHandle> {
        self.parent
    }

    pub fn children(&self) -> &[NodeHandle] {
        &self.children
    }

    pub fn owner(&self) -> Option<NodeHandle> {
        self.owner
    }

    /// Short name with every namespace stripped.
    pub fn leaf_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attrs.keys().map(String::as_str)
    }
}

/// Resolved attribute address: node, canonical attribute, optional compound component.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlugKey {
    pub node: NodeHandle,
    pub attr: String,
    pub component: Option<u8>,
}

impl PlugKey {
    pub fn new(node: NodeHandle, attr: impl Into<String>) -> Self {
        Self {
            node,
            attr: attr.into(),
            component: None,
        }
    }

    pub fn component(node: NodeHandle, attr: impl Into<String>, index: u8) -> Self {
        Self {
            node,
            attr: attr.into(),
            component: Some(index),
        }
    }

    /// The whole compound this plug belongs to.
    pub fn whole(&self) -> PlugKey {
        PlugKey {
            node: self.node,
            attr: self.attr.clone(),
            component: None,
        }
    }

    /// Attribute spelling including the component suffix.
    pub fn attr_name(&self) -> String {
        match self.component {
            Some(i) => format!("{}{}", self.attr, ["X", "Y", "Z"][usize::from(i.min(2))]),
            None => self.attr.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joints_carry_orient_and_transform_attributes() {
        let n = Node::new("ns:root".into(), NodeKind::Joint);
        let names: Vec<&str> = n.attribute_names().collect();
        assert!(names.contains(&"translate"));
        assert!(names.contains(&"jointOrient"));
        assert!(names.contains(&"segmentScaleCompensate"));
        assert_eq!(n.leaf_name(), "root");
    }

    #[test]
    fn utility_nodes_are_not_dag() {
        assert!(!NodeKind::MultiplyDivide.is_dag());
        assert!(NodeKind::PointConstraint.is_dag());
        assert!(!NodeKind::Shape(ShapeData {
            primitive: Primitive::Sphere { radius: 1.0 },
            material: None
        })
        .is_transform());
    }

    #[test]
    fn plug_attr_name_appends_component_suffix() {
        let p = PlugKey::component(NodeHandle(1), "translate", 0);
        assert_eq!(p.attr_name(), "translateX");
        assert_eq!(p.whole().attr_name(), "translate");
    }
}
