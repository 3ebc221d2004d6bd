//! Scene storage: nodes, names, namespaces, hierarchy, attributes and connections.

use std::collections::BTreeSet;

use hashbrown::HashMap;
use indexmap::{IndexMap, IndexSet};
use log::debug;

use crate::attr_path::AttrPath;
use crate::coercion::{coerce_like, kinds_compatible};
use crate::error::{SceneError, SceneResult};
use crate::node::{Attribute, Node, NodeHandle, NodeKind, PlugKey};
use crate::value::{AttrValue, ValueKind};

/// The whole editable scene. Every rigging operation receives it explicitly.
#[derive(Debug, Default)]
pub struct Scene {
    pub(crate) nodes: IndexMap<NodeHandle, Node>,
    pub(crate) names: HashMap<String, NodeHandle>,
    pub(crate) namespaces: BTreeSet<String>,
    /// destination -> source
    pub(crate) connections: IndexMap<PlugKey, PlugKey>,
    next_id: u32,
}

const SHORT_NAMES: &[(&str, &str)] = &[
    ("t", "translate"),
    ("tx", "translateX"),
    ("ty", "translateY"),
    ("tz", "translateZ"),
    ("r", "rotate"),
    ("rx", "rotateX"),
    ("ry", "rotateY"),
    ("rz", "rotateZ"),
    ("s", "scale"),
    ("sx", "scaleX"),
    ("sy", "scaleY"),
    ("sz", "scaleZ"),
    ("v", "visibility"),
    ("ro", "rotateOrder"),
    ("jo", "jointOrient"),
    ("rp", "rotatePivot"),
    ("rpt", "rotatePivotTranslate"),
];

/// Matrix outputs are addressed with or without their `[0]` instance index.
const INSTANCED: &[&str] = &[
    "worldMatrix",
    "parentMatrix",
    "parentInverseMatrix",
    "worldInverseMatrix",
];

fn canonical_attr(name: &str) -> String {
    if let Some((_, long)) = SHORT_NAMES.iter().find(|(short, _)| *short == name) {
        return (*long).to_string();
    }
    for base in INSTANCED {
        if name.strip_prefix(base) == Some("[0]") {
            return (*base).to_string();
        }
    }
    name.to_string()
}

fn split_component(name: &str) -> Option<(&str, u8)> {
    let idx = match name.chars().last()? {
        'X' => 0,
        'Y' => 1,
        'Z' => 2,
        _ => return None,
    };
    let base = &name[..name.len() - 1];
    if base.is_empty() {
        None
    } else {
        Some((base, idx))
    }
}

/// Default for array elements created on first connection (`input3D[2]`, ...).
fn multi_element_default(kind: &NodeKind, name: &str) -> Option<AttrValue> {
    if !matches!(kind, NodeKind::PlusMinusAverage) {
        return None;
    }
    let (base, rest) = name.split_once('[')?;
    let index = rest.strip_suffix(']')?;
    index.parse::<u32>().ok()?;
    match base {
        "input1D" => Some(AttrValue::Float(0.0)),
        "input3D" => Some(AttrValue::vec3(0.0, 0.0, 0.0)),
        _ => None,
    }
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    // ----- lookup -----

    pub fn node(&self, handle: NodeHandle) -> SceneResult<&Node> {
        self.nodes
            .get(&handle)
            .ok_or(SceneError::StaleHandle { id: handle.0 })
    }

    pub(crate) fn node_mut(&mut self, handle: NodeHandle) -> SceneResult<&mut Node> {
        self.nodes
            .get_mut(&handle)
            .ok_or(SceneError::StaleHandle { id: handle.0 })
    }

    pub fn lookup(&self, name: &str) -> SceneResult<NodeHandle> {
        self.find(name).ok_or_else(|| SceneError::not_found(name))
    }

    pub fn find(&self, name: &str) -> Option<NodeHandle> {
        self.names.get(name).copied()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    pub fn contains(&self, handle: NodeHandle) -> bool {
        self.nodes.contains_key(&handle)
    }

    pub fn name_of(&self, handle: NodeHandle) -> SceneResult<&str> {
        Ok(self.node(handle)?.name())
    }

    /// All live nodes in creation order.
    pub fn handles(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        self.nodes.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Append the smallest numeric suffix that makes `base` unused.
    pub fn unique_name(&self, base: &str) -> String {
        if !self.exists(base) {
            return base.to_string();
        }
        let mut n = 1u32;
        loop {
            let candidate = format!("{base}{n}");
            if !self.exists(&candidate) {
                return candidate;
            }
            n = n.wrapping_add(1);
        }
    }

    // ----- namespaces -----

    pub fn namespace_exists(&self, namespace: &str) -> bool {
        self.namespaces.contains(namespace)
    }

    /// Add a namespace; nested namespaces need their parent to exist.
    pub fn add_namespace(&mut self, namespace: &str) -> SceneResult<()> {
        if namespace.is_empty() || namespace.split(':').any(str::is_empty) {
            return Err(SceneError::invalid(format!("bad namespace '{namespace}'")));
        }
        if self.namespaces.contains(namespace) {
            return Err(SceneError::NamespaceExists {
                namespace: namespace.to_string(),
            });
        }
        if let Some((parent, _)) = namespace.rsplit_once(':') {
            if !self.namespaces.contains(parent) {
                return Err(SceneError::NamespaceNotFound {
                    namespace: parent.to_string(),
                });
            }
        }
        self.namespaces.insert(namespace.to_string());
        Ok(())
    }

    /// Remove an empty namespace.
    pub fn remove_namespace(&mut self, namespace: &str) -> SceneResult<()> {
        if !self.namespaces.contains(namespace) {
            return Err(SceneError::NamespaceNotFound {
                namespace: namespace.to_string(),
            });
        }
        let prefix = format!("{namespace}:");
        let count = self.nodes_in_namespace(namespace).len()
            + self
                .namespaces
                .iter()
                .filter(|ns| ns.starts_with(&prefix))
                .count();
        if count > 0 {
            return Err(SceneError::NamespaceNotEmpty {
                namespace: namespace.to_string(),
                count,
            });
        }
        self.namespaces.remove(namespace);
        Ok(())
    }

    /// Top-level namespaces, sorted.
    pub fn namespaces(&self) -> Vec<String> {
        self.namespaces
            .iter()
            .filter(|ns| !ns.contains(':'))
            .cloned()
            .collect()
    }

    /// Nodes whose name lives in `namespace` or below it.
    pub fn nodes_in_namespace(&self, namespace: &str) -> Vec<NodeHandle> {
        let prefix = format!("{namespace}:");
        self.nodes
            .iter()
            .filter(|(_, n)| n.name.starts_with(&prefix))
            .map(|(h, _)| *h)
            .collect()
    }

    /// Move every node (and nested namespace) of `old` into the new namespace `new`.
    pub fn rename_namespace(&mut self, old: &str, new: &str) -> SceneResult<()> {
        if !self.namespaces.contains(old) {
            return Err(SceneError::NamespaceNotFound {
                namespace: old.to_string(),
            });
        }
        if self.namespaces.contains(new) {
            return Err(SceneError::NamespaceExists {
                namespace: new.to_string(),
            });
        }
        let old_prefix = format!("{old}:");
        let renames: Vec<(NodeHandle, String, String)> = self
            .nodes
            .iter()
            .filter_map(|(h, n)| {
                n.name
                    .strip_prefix(&old_prefix)
                    .map(|rest| (*h, n.name.clone(), format!("{new}:{rest}")))
            })
            .collect();
        if let Some((_, _, taken)) = renames.iter().find(|(_, _, to)| self.exists(to)) {
            return Err(SceneError::NameCollision {
                name: taken.clone(),
            });
        }
        for (h, from, to) in renames {
            self.names.remove(&from);
            self.names.insert(to.clone(), h);
            self.node_mut(h)?.name = to;
        }
        let moved: Vec<String> = self
            .namespaces
            .iter()
            .filter(|ns| ns.as_str() == old || ns.starts_with(&old_prefix))
            .cloned()
            .collect();
        for ns in moved {
            self.namespaces.remove(&ns);
            let renamed = format!("{new}{}", &ns[old.len()..]);
            self.namespaces.insert(renamed);
        }
        debug!("moved namespace {old} -> {new}");
        Ok(())
    }

    // ----- node creation -----

    fn validate_new_name(&self, name: &str) -> SceneResult<()> {
        let path = AttrPath::parse(name).map_err(|reason| SceneError::InvalidPath {
            path: name.to_string(),
            reason,
        })?;
        if path.attribute.is_some() {
            return Err(SceneError::InvalidPath {
                path: name.to_string(),
                reason: "node names cannot contain '.'".into(),
            });
        }
        if let Some(ns) = path.namespace() {
            if !self.namespaces.contains(&ns) {
                return Err(SceneError::NamespaceNotFound { namespace: ns });
            }
        }
        if self.exists(name) {
            return Err(SceneError::NameCollision {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Create a node. DAG nodes may be given a DAG parent.
    pub fn create_node(
        &mut self,
        name: &str,
        kind: NodeKind,
        parent: Option<NodeHandle>,
    ) -> SceneResult<NodeHandle> {
        self.validate_new_name(name)?;
        if let Some(p) = parent {
            if !kind.is_dag() || !self.node(p)?.kind.is_dag() {
                return Err(SceneError::invalid(format!(
                    "cannot parent {name} under {}",
                    self.node(p)?.name
                )));
            }
            self.check_structural(p)?;
        }
        let handle = NodeHandle(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        let mut node = Node::new(name.to_string(), kind);
        node.parent = parent;
        self.nodes.insert(handle, node);
        self.names.insert(name.to_string(), handle);
        if let Some(p) = parent {
            self.node_mut(p)?.children.push(handle);
        }
        Ok(handle)
    }

    pub fn create_transform(&mut self, name: &str, parent: Option<NodeHandle>) -> SceneResult<NodeHandle> {
        self.create_node(name, NodeKind::Transform, parent)
    }

    pub fn create_locator(&mut self, name: &str, parent: Option<NodeHandle>) -> SceneResult<NodeHandle> {
        self.create_node(name, NodeKind::Locator, parent)
    }

    pub fn rename(&mut self, handle: NodeHandle, new_name: &str) -> SceneResult<()> {
        let old = self.node(handle)?.name.clone();
        if old == new_name {
            return Ok(());
        }
        self.check_structural(handle)?;
        self.validate_new_name(new_name)?;
        self.names.remove(&old);
        self.names.insert(new_name.to_string(), handle);
        self.node_mut(handle)?.name = new_name.to_string();
        Ok(())
    }

    // ----- hierarchy -----

    pub fn parent_of(&self, handle: NodeHandle) -> SceneResult<Option<NodeHandle>> {
        Ok(self.node(handle)?.parent)
    }

    pub fn children_of(&self, handle: NodeHandle) -> SceneResult<Vec<NodeHandle>> {
        Ok(self.node(handle)?.children.clone())
    }

    /// Children that carry a transform (shapes and constraints excluded).
    pub fn child_transforms(&self, handle: NodeHandle) -> SceneResult<Vec<NodeHandle>> {
        let node = self.node(handle)?;
        Ok(node
            .children
            .iter()
            .copied()
            .filter(|c| {
                self.nodes
                    .get(c)
                    .map(|n| n.kind.is_transform() && !n.kind.is_constraint())
                    .unwrap_or(false)
            })
            .collect())
    }

    /// Depth-first descendants, excluding `handle` itself.
    pub fn descendants(&self, handle: NodeHandle) -> SceneResult<Vec<NodeHandle>> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeHandle> = self.node(handle)?.children.iter().rev().copied().collect();
        while let Some(h) = stack.pop() {
            out.push(h);
            if let Some(n) = self.nodes.get(&h) {
                stack.extend(n.children.iter().rev().copied());
            }
        }
        Ok(out)
    }

    pub fn is_ancestor(&self, ancestor: NodeHandle, node: NodeHandle) -> SceneResult<bool> {
        let mut cur = self.node(node)?.parent;
        while let Some(p) = cur {
            if p == ancestor {
                return Ok(true);
            }
            cur = self.node(p)?.parent;
        }
        Ok(false)
    }

    /// Re-link `handle` under `parent` without touching attributes.
    pub(crate) fn relink(&mut self, handle: NodeHandle, parent: Option<NodeHandle>) -> SceneResult<()> {
        if let Some(old) = self.node(handle)?.parent {
            self.node_mut(old)?.children.retain(|c| *c != handle);
        }
        self.node_mut(handle)?.parent = parent;
        if let Some(p) = parent {
            self.node_mut(p)?.children.push(handle);
        }
        Ok(())
    }

    // ----- deletion -----

    pub fn delete(&mut self, handle: NodeHandle) -> SceneResult<()> {
        self.delete_many(&[handle])
    }

    /// Delete nodes together with their DAG descendants and, for containers, their members.
    /// Connections fed by deleted nodes leave their last value behind.
    pub fn delete_many(&mut self, roots: &[NodeHandle]) -> SceneResult<()> {
        for root in roots {
            let node = self.node(*root)?;
            if let NodeKind::Container(data) = &node.kind {
                if data.locked {
                    return Err(SceneError::ContainerLocked {
                        container: node.name.clone(),
                        node: node.name.clone(),
                    });
                }
            }
            self.check_structural(*root)?;
        }

        let mut doomed: IndexSet<NodeHandle> = IndexSet::new();
        let mut stack: Vec<NodeHandle> = roots.to_vec();
        while let Some(h) = stack.pop() {
            let Some(node) = self.nodes.get(&h) else {
                continue;
            };
            if !doomed.insert(h) {
                continue;
            }
            stack.extend(node.children.iter().copied());
            if let NodeKind::Container(data) = &node.kind {
                stack.extend(data.members.iter().copied());
            }
        }

        let mut baked = Vec::new();
        for (dst, src) in &self.connections {
            if doomed.contains(&src.node) && !doomed.contains(&dst.node) {
                match self.evaluate(dst) {
                    Ok(v) => baked.push((dst.clone(), v)),
                    Err(err) => debug!("dropping value of {}: {err}", dst.attr_name()),
                }
            }
        }
        self.connections
            .retain(|d, s| !doomed.contains(&d.node) && !doomed.contains(&s.node));
        for (dst, value) in baked {
            self.store_value(&dst, &value)?;
        }

        for h in &doomed {
            let (parent, owner) = {
                let n = self.node(*h)?;
                (n.parent, n.owner)
            };
            if let Some(p) = parent.filter(|p| !doomed.contains(p)) {
                self.node_mut(p)?.children.retain(|c| c != h);
            }
            if let Some(o) = owner.filter(|o| !doomed.contains(o)) {
                if let NodeKind::Container(data) = &mut self.node_mut(o)?.kind {
                    data.members.shift_remove(h);
                }
            }
        }
        for h in &doomed {
            if let Some(node) = self.nodes.shift_remove(h) {
                self.names.remove(&node.name);
            }
        }
        for node in self.nodes.values_mut() {
            if let NodeKind::Shape(shape) = &mut node.kind {
                if shape.material.map(|m| doomed.contains(&m)).unwrap_or(false) {
                    shape.material = None;
                }
            }
        }
        self.prune_bindings();
        Ok(())
    }

    // ----- attributes -----

    fn container_binding(&self, node: &Node, name: &str) -> Option<PlugKey> {
        match &node.kind {
            NodeKind::Container(data) => data.published.get(name).cloned(),
            _ => None,
        }
    }

    pub(crate) fn attr_exists(&self, node: &Node, name: &str) -> bool {
        node.attrs.contains_key(name)
            || Self::computed_kind(&node.kind, name).is_some()
            || self.container_binding(node, name).is_some()
    }

    fn is_compound(&self, node: &Node, name: &str) -> bool {
        if let Some(a) = node.attrs.get(name) {
            return matches!(a.value, AttrValue::Double3(_));
        }
        if let Some(kind) = Self::computed_kind(&node.kind, name) {
            return kind == ValueKind::Double3;
        }
        match self.container_binding(node, name) {
            Some(bound) => self.plug_kind(&bound).ok() == Some(ValueKind::Double3),
            None => false,
        }
    }

    /// Resolve an attribute spelling (alias, short name, component) into a plug.
    pub fn resolve(&self, handle: NodeHandle, attr: &str) -> SceneResult<PlugKey> {
        let node = self.node(handle)?;
        let aliased = node.aliases.get(attr).map(String::as_str).unwrap_or(attr);
        let name = canonical_attr(aliased);
        if self.attr_exists(node, &name) {
            return Ok(PlugKey::new(handle, name));
        }
        if let Some((base, idx)) = split_component(&name) {
            if self.is_compound(node, base) {
                return Ok(PlugKey::component(handle, base, idx));
            }
        }
        Err(SceneError::AttributeNotFound {
            node: node.name.clone(),
            attribute: attr.to_string(),
        })
    }

    /// Resolve a `ns:node.attr` path.
    pub fn resolve_path(&self, path: &str) -> SceneResult<PlugKey> {
        let parsed = AttrPath::parse(path).map_err(|reason| SceneError::InvalidPath {
            path: path.to_string(),
            reason,
        })?;
        let attr = parsed.attribute().ok_or_else(|| SceneError::InvalidPath {
            path: path.to_string(),
            reason: "missing attribute".into(),
        })?;
        let handle = self.lookup(&parsed.node_name())?;
        self.resolve(handle, attr)
    }

    pub fn has_attr(&self, handle: NodeHandle, attr: &str) -> bool {
        self.resolve(handle, attr).is_ok()
    }

    /// Follow container publishing down to the member plug that stores the value.
    pub(crate) fn binding_target(&self, plug: PlugKey) -> SceneResult<PlugKey> {
        let mut cur = plug;
        for _ in 0..64 {
            let node = self.node(cur.node)?;
            match self.container_binding(node, &cur.attr) {
                Some(bound) => {
                    cur = match cur.component {
                        Some(i) => PlugKey::component(bound.node, bound.attr, i),
                        None => bound,
                    };
                }
                None => return Ok(cur),
            }
        }
        Err(SceneError::invalid("published binding chain too deep"))
    }

    pub(crate) fn plug_kind(&self, plug: &PlugKey) -> SceneResult<ValueKind> {
        if plug.component.is_some() {
            return Ok(ValueKind::Float);
        }
        let node = self.node(plug.node)?;
        if let Some(a) = node.attrs.get(&plug.attr) {
            return Ok(a.value.kind());
        }
        if let Some(kind) = Self::computed_kind(&node.kind, &plug.attr) {
            return Ok(kind);
        }
        if let Some(bound) = self.container_binding(node, &plug.attr) {
            return self.plug_kind(&bound);
        }
        Err(SceneError::AttributeNotFound {
            node: node.name.clone(),
            attribute: plug.attr.clone(),
        })
    }

    /// Add a dynamic attribute.
    pub fn add_attr(&mut self, handle: NodeHandle, name: &str, default: impl Into<AttrValue>) -> SceneResult<()> {
        self.check_structural(handle)?;
        let node = self.node_mut(handle)?;
        if node.attrs.contains_key(name) {
            return Err(SceneError::AttributeExists {
                node: node.name.clone(),
                attribute: name.to_string(),
            });
        }
        node.attrs.insert(name.to_string(), Attribute::new(default.into()));
        Ok(())
    }

    /// Give `attr` a second spelling.
    pub fn alias_attr(&mut self, handle: NodeHandle, alias: &str, attr: &str) -> SceneResult<()> {
        let target = self.resolve(handle, attr)?;
        self.check_structural(handle)?;
        let node = self.node_mut(handle)?;
        if node.attrs.contains_key(alias) {
            return Err(SceneError::AttributeExists {
                node: node.name.clone(),
                attribute: alias.to_string(),
            });
        }
        node.aliases.insert(alias.to_string(), target.attr_name());
        Ok(())
    }

    /// Evaluated value of an attribute.
    pub fn get(&self, handle: NodeHandle, attr: &str) -> SceneResult<AttrValue> {
        let plug = self.resolve(handle, attr)?;
        self.evaluate(&plug)
    }

    pub fn get_path(&self, path: &str) -> SceneResult<AttrValue> {
        let plug = self.resolve_path(path)?;
        self.evaluate(&plug)
    }

    pub fn get_f64(&self, handle: NodeHandle, attr: &str) -> SceneResult<f64> {
        Ok(crate::coercion::to_float(&self.get(handle, attr)?))
    }

    pub fn get_vec3(&self, handle: NodeHandle, attr: &str) -> SceneResult<[f64; 3]> {
        Ok(crate::coercion::to_vec3(&self.get(handle, attr)?))
    }

    pub fn get_bool(&self, handle: NodeHandle, attr: &str) -> SceneResult<bool> {
        Ok(self.get_f64(handle, attr)? != 0.0)
    }

    /// Write an attribute. Connected, locked, computed and container-locked plugs refuse.
    pub fn set(&mut self, handle: NodeHandle, attr: &str, value: impl Into<AttrValue>) -> SceneResult<()> {
        let plug = self.resolve(handle, attr)?;
        self.set_plug(&plug, &value.into())
    }

    pub fn set_path(&mut self, path: &str, value: impl Into<AttrValue>) -> SceneResult<()> {
        let plug = self.resolve_path(path)?;
        self.set_plug(&plug, &value.into())
    }

    pub(crate) fn set_plug(&mut self, plug: &PlugKey, value: &AttrValue) -> SceneResult<()> {
        let plug = self.binding_target(plug.clone())?;
        let node = self.node(plug.node)?;
        let label = || (node.name.clone(), plug.attr_name());
        if Self::computed_kind(&node.kind, &plug.attr).is_some() {
            let (node, attribute) = label();
            return Err(SceneError::ReadOnlyAttribute { node, attribute });
        }
        if self.is_driven(&plug) {
            let (node, attribute) = label();
            return Err(SceneError::AttributeConnected { node, attribute });
        }
        if self.is_attr_locked(&plug)? {
            let (node, attribute) = label();
            return Err(SceneError::AttributeLocked { node, attribute });
        }
        self.check_plug_editable(&plug)?;
        self.store_value(&plug, value)
    }

    /// True if the plug, its compound, or (for a compound) any component has an input.
    pub(crate) fn is_driven(&self, plug: &PlugKey) -> bool {
        if self.connections.contains_key(plug) || self.connections.contains_key(&plug.whole()) {
            return true;
        }
        plug.component.is_none()
            && (0..3u8).any(|i| {
                self.connections
                    .contains_key(&PlugKey::component(plug.node, plug.attr.clone(), i))
            })
    }

    pub(crate) fn is_attr_locked(&self, plug: &PlugKey) -> SceneResult<bool> {
        let node = self.node(plug.node)?;
        Ok(match node.attrs.get(&plug.attr) {
            Some(a) => {
                a.locked
                    || match plug.component {
                        Some(i) => a.locked_components[usize::from(i.min(2))],
                        None => false,
                    }
            }
            None => false,
        })
    }

    /// Raw write with coercion; bypasses every lock.
    pub(crate) fn store_value(&mut self, plug: &PlugKey, value: &AttrValue) -> SceneResult<()> {
        let node = self.node_mut(plug.node)?;
        let name = node.name.clone();
        let attr = node
            .attrs
            .get_mut(&plug.attr)
            .ok_or_else(|| SceneError::AttributeNotFound {
                node: name.clone(),
                attribute: plug.attr.clone(),
            })?;
        let mismatch = |attr: &Attribute| SceneError::TypeMismatch {
            node: name.clone(),
            attribute: plug.attr_name(),
            expected: format!("{:?}", attr.value.kind()),
            actual: format!("{:?}", value.kind()),
        };
        let next = match plug.component {
            Some(i) => attr
                .value
                .with_component(usize::from(i), crate::coercion::to_float(value))
                .ok_or_else(|| mismatch(attr))?,
            None => coerce_like(&attr.value, value).ok_or_else(|| mismatch(attr))?,
        };
        attr.value = next;
        Ok(())
    }

    /// Lock or unlock an attribute (or one component of a compound).
    pub fn lock_attr(&mut self, handle: NodeHandle, attr: &str, locked: bool) -> SceneResult<()> {
        let plug = self.binding_target(self.resolve(handle, attr)?)?;
        self.check_plug_editable(&plug)?;
        let node = self.node_mut(plug.node)?;
        let name = node.name.clone();
        let a = node
            .attrs
            .get_mut(&plug.attr)
            .ok_or_else(|| SceneError::ReadOnlyAttribute {
                node: name,
                attribute: plug.attr_name(),
            })?;
        match plug.component {
            Some(i) => a.locked_components[usize::from(i.min(2))] = locked,
            None => a.locked = locked,
        }
        Ok(())
    }

    pub fn attr_locked(&self, handle: NodeHandle, attr: &str) -> SceneResult<bool> {
        let plug = self.binding_target(self.resolve(handle, attr)?)?;
        self.is_attr_locked(&plug)
    }

    // ----- connections -----

    /// Connect `src.src_attr -> dst.dst_attr`. An existing input is only replaced with `force`.
    pub fn connect(
        &mut self,
        src: NodeHandle,
        src_attr: &str,
        dst: NodeHandle,
        dst_attr: &str,
        force: bool,
    ) -> SceneResult<()> {
        let src_plug = self.resolve(src, src_attr)?;
        let dst_plug = match self.resolve(dst, dst_attr) {
            Ok(p) => p,
            Err(err) => {
                let kind = self.node(dst)?.kind.clone();
                match multi_element_default(&kind, dst_attr) {
                    Some(default) => {
                        self.add_attr(dst, dst_attr, default)?;
                        self.resolve(dst, dst_attr)?
                    }
                    None => return Err(err),
                }
            }
        };
        self.connect_plugs(src_plug, dst_plug, force)
    }

    pub fn connect_path(&mut self, src: &str, dst: &str, force: bool) -> SceneResult<()> {
        let s = AttrPath::parse(src).map_err(|reason| SceneError::InvalidPath {
            path: src.to_string(),
            reason,
        })?;
        let d = AttrPath::parse(dst).map_err(|reason| SceneError::InvalidPath {
            path: dst.to_string(),
            reason,
        })?;
        let (Some(sa), Some(da)) = (s.attribute(), d.attribute()) else {
            return Err(SceneError::InvalidPath {
                path: format!("{src} -> {dst}"),
                reason: "missing attribute".into(),
            });
        };
        let sh = self.lookup(&s.node_name())?;
        let dh = self.lookup(&d.node_name())?;
        self.connect(sh, sa, dh, da, force)
    }

    pub(crate) fn connect_plugs(&mut self, src: PlugKey, dst: PlugKey, force: bool) -> SceneResult<()> {
        let src = self.binding_target(src)?;
        let dst = self.binding_target(dst)?;
        let dst_node = self.node(dst.node)?;
        let dst_label = || (dst_node.name.clone(), dst.attr_name());
        if Self::computed_kind(&dst_node.kind, &dst.attr).is_some() {
            let (node, attribute) = dst_label();
            return Err(SceneError::ReadOnlyAttribute { node, attribute });
        }
        if self.is_attr_locked(&dst)? {
            let (node, attribute) = dst_label();
            return Err(SceneError::AttributeLocked { node, attribute });
        }
        let (sk, dk) = (self.plug_kind(&src)?, self.plug_kind(&dst)?);
        if !kinds_compatible(sk, dk) {
            let (node, attribute) = dst_label();
            return Err(SceneError::TypeMismatch {
                node,
                attribute,
                expected: format!("{dk:?}"),
                actual: format!("{sk:?}"),
            });
        }
        if self.is_driven(&dst) {
            if !force {
                let (node, attribute) = dst_label();
                return Err(SceneError::AttributeConnected { node, attribute });
            }
            self.connections.shift_remove(&dst);
            self.connections.shift_remove(&dst.whole());
            if dst.component.is_none() {
                for i in 0..3u8 {
                    self.connections
                        .shift_remove(&PlugKey::component(dst.node, dst.attr.clone(), i));
                }
            }
        }
        self.check_plug_editable(&dst)?;
        self.connections.insert(dst, src);
        Ok(())
    }

    /// Break the input of `node.attr`, keeping its current value.
    pub fn disconnect(&mut self, handle: NodeHandle, attr: &str) -> SceneResult<()> {
        let plug = self.binding_target(self.resolve(handle, attr)?)?;
        self.check_plug_editable(&plug)?;
        let value = self.evaluate(&plug)?;
        let mut removed = self.connections.shift_remove(&plug).is_some();
        if plug.component.is_none() {
            for i in 0..3u8 {
                removed |= self
                    .connections
                    .shift_remove(&PlugKey::component(plug.node, plug.attr.clone(), i))
                    .is_some();
            }
        }
        if removed {
            self.store_value(&plug, &value)?;
        }
        Ok(())
    }

    /// Source plug feeding `node.attr`, if any.
    pub fn source_of(&self, handle: NodeHandle, attr: &str) -> SceneResult<Option<PlugKey>> {
        let plug = self.binding_target(self.resolve(handle, attr)?)?;
        Ok(self
            .connections
            .get(&plug)
            .or_else(|| self.connections.get(&plug.whole()))
            .cloned())
    }

    /// Nodes connected to `handle` in either direction, in connection order.
    pub fn list_connections(&self, handle: NodeHandle) -> Vec<NodeHandle> {
        let mut out = IndexSet::new();
        for (dst, src) in &self.connections {
            if dst.node == handle && src.node != handle {
                out.insert(src.node);
            } else if src.node == handle && dst.node != handle {
                out.insert(dst.node);
            }
        }
        out.into_iter().collect()
    }

    /// All `(source, destination)` pairs, in creation order.
    pub fn connections(&self) -> impl Iterator<Item = (&PlugKey, &PlugKey)> {
        self.connections.iter().map(|(d, s)| (s, d))
    }

    /// Human readable `node.attr` for a plug.
    pub fn plug_name(&self, plug: &PlugKey) -> SceneResult<String> {
        Ok(format!("{}.{}", self.node(plug.node)?.name, plug.attr_name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique_and_namespaced() {
        let mut scene = Scene::new();
        assert!(matches!(
            scene.create_transform("ns:grp", None),
            Err(SceneError::NamespaceNotFound { .. })
        ));
        scene.add_namespace("ns").unwrap();
        scene.create_transform("ns:grp", None).unwrap();
        assert!(matches!(
            scene.create_transform("ns:grp", None),
            Err(SceneError::NameCollision { .. })
        ));
        assert_eq!(scene.unique_name("ns:grp"), "ns:grp1");
    }

    #[test]
    fn short_names_aliases_and_components_resolve() {
        let mut scene = Scene::new();
        let t = scene.create_transform("ctrl", None).unwrap();
        scene.alias_attr(t, "globalScale", "scaleY").unwrap();
        assert_eq!(scene.resolve(t, "tx").unwrap(), PlugKey::component(t, "translate", 0));
        assert_eq!(scene.resolve(t, "globalScale").unwrap(), PlugKey::component(t, "scale", 1));
        assert_eq!(scene.resolve(t, "worldMatrix[0]").unwrap(), PlugKey::new(t, "worldMatrix"));
        assert!(scene.resolve(t, "bogus").is_err());
    }

    #[test]
    fn connected_component_reads_through_source() {
        let mut scene = Scene::new();
        let a = scene.create_transform("a", None).unwrap();
        let b = scene.create_transform("b", None).unwrap();
        scene.set(a, "scaleY", 3.0).unwrap();
        scene.connect(a, "scaleY", b, "scaleX", false).unwrap();
        assert_eq!(scene.get_vec3(b, "scale").unwrap(), [3.0, 1.0, 1.0]);
        assert!(matches!(
            scene.set(b, "scaleX", 1.0),
            Err(SceneError::AttributeConnected { .. })
        ));
        assert!(matches!(
            scene.connect(a, "scaleZ", b, "scaleX", false),
            Err(SceneError::AttributeConnected { .. })
        ));
        scene.connect(a, "scaleZ", b, "scaleX", true).unwrap();
        assert_eq!(scene.get_f64(b, "sx").unwrap(), 1.0);
    }

    #[test]
    fn disconnect_keeps_last_value() {
        let mut scene = Scene::new();
        let a = scene.create_transform("a", None).unwrap();
        let b = scene.create_transform("b", None).unwrap();
        scene.set(a, "translate", [1.0, 2.0, 3.0]).unwrap();
        scene.connect(a, "translate", b, "translate", false).unwrap();
        scene.disconnect(b, "translate").unwrap();
        scene.set(a, "translate", [0.0, 0.0, 0.0]).unwrap();
        assert_eq!(scene.get_vec3(b, "t").unwrap(), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn deleting_a_source_bakes_destination() {
        let mut scene = Scene::new();
        let a = scene.create_transform("a", None).unwrap();
        let b = scene.create_transform("b", None).unwrap();
        scene.set(a, "rotateZ", 45.0).unwrap();
        scene.connect(a, "rotateZ", b, "rotateX", false).unwrap();
        scene.delete(a).unwrap();
        assert!(!scene.exists("a"));
        assert_eq!(scene.get_f64(b, "rx").unwrap(), 45.0);
        assert_eq!(scene.list_connections(b), Vec::<NodeHandle>::new());
    }

    #[test]
    fn delete_takes_descendants() {
        let mut scene = Scene::new();
        let a = scene.create_transform("a", None).unwrap();
        let b = scene.create_transform("b", Some(a)).unwrap();
        scene.create_locator("c", Some(b)).unwrap();
        scene.delete(a).unwrap();
        assert!(scene.is_empty());
    }

    #[test]
    fn namespace_rename_moves_nodes() {
        let mut scene = Scene::new();
        scene.add_namespace("Mod__a").unwrap();
        let n = scene.create_transform("Mod__a:grp", None).unwrap();
        scene.rename_namespace("Mod__a", "Mod__b").unwrap();
        assert_eq!(scene.name_of(n).unwrap(), "Mod__b:grp");
        assert!(scene.namespace_exists("Mod__b"));
        assert!(!scene.namespace_exists("Mod__a"));
        assert!(matches!(
            scene.remove_namespace("Mod__b"),
            Err(SceneError::NamespaceNotEmpty { count: 1, .. })
        ));
        scene.delete(n).unwrap();
        scene.remove_namespace("Mod__b").unwrap();
        assert!(scene.namespaces().is_empty());
    }

    #[test]
    fn array_elements_appear_on_connect() {
        let mut scene = Scene::new();
        let a = scene.create_transform("a", None).unwrap();
        let pma = scene
            .create_node("sum", NodeKind::PlusMinusAverage, None)
            .unwrap();
        scene.connect(a, "translateX", pma, "input1D[0]", false).unwrap();
        assert!(scene.has_attr(pma, "input1D[0]"));
        assert!(scene.connect(a, "translateX", pma, "input9[0]", false).is_err());
    }

    #[test]
    fn attribute_locks_refuse_writes() {
        let mut scene = Scene::new();
        let a = scene.create_transform("a", None).unwrap();
        scene.lock_attr(a, "translate", true).unwrap();
        assert!(matches!(
            scene.set(a, "tx", 1.0),
            Err(SceneError::AttributeLocked { .. })
        ));
        scene.lock_attr(a, "translate", false).unwrap();
        scene.set(a, "tx", 1.0).unwrap();
    }
}
