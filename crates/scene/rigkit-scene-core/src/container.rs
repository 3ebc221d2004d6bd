//! Containers: ownership sets with a published attribute interface and a lock flag.
//!
//! A locked container refuses structural edits on everything it owns (directly or through
//! nested containers). Attributes reachable through its published interface stay writable.

use log::debug;

use crate::error::{SceneError, SceneResult};
use crate::node::{ContainerData, NodeHandle, NodeKind, PlugKey};
use crate::scene::Scene;

/// Membership options for [`Scene::container_add`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AddOptions {
    /// Also add every DAG descendant
    pub include_hierarchy_below: bool,
    /// Also add shape children
    pub include_shapes: bool,
    /// Also add materials assigned to added shapes
    pub include_shaders: bool,
    /// Move nodes out of another container
    pub force: bool,
}

impl Scene {
    fn container_data(&self, container: NodeHandle) -> SceneResult<&ContainerData> {
        let node = self.node(container)?;
        match &node.kind {
            NodeKind::Container(data) => Ok(data),
            _ => Err(SceneError::invalid(format!("{} is not a container", node.name))),
        }
    }

    fn container_data_mut(&mut self, container: NodeHandle) -> SceneResult<&mut ContainerData> {
        let node = self.node_mut(container)?;
        let name = node.name.clone();
        match &mut node.kind {
            NodeKind::Container(data) => Ok(data),
            _ => Err(SceneError::invalid(format!("{name} is not a container"))),
        }
    }

    pub fn is_container(&self, handle: NodeHandle) -> bool {
        matches!(self.nodes.get(&handle).map(|n| &n.kind), Some(NodeKind::Container(_)))
    }

    /// Fail if any container owning `handle` (transitively) is locked.
    pub(crate) fn check_structural(&self, handle: NodeHandle) -> SceneResult<()> {
        let node = self.node(handle)?;
        let mut cur = node.owner;
        while let Some(c) = cur {
            let cn = self.node(c)?;
            if let NodeKind::Container(data) = &cn.kind {
                if data.locked {
                    return Err(SceneError::ContainerLocked {
                        container: cn.name.clone(),
                        node: node.name.clone(),
                    });
                }
            }
            cur = cn.owner;
        }
        Ok(())
    }

    /// Fail unless every locked owner exposes this plug through its published interface.
    pub(crate) fn check_plug_editable(&self, plug: &PlugKey) -> SceneResult<()> {
        let mut exposed = vec![plug.clone(), plug.whole()];
        let node = self.node(plug.node)?;
        let mut cur = node.owner;
        while let Some(c) = cur {
            let cn = self.node(c)?;
            let NodeKind::Container(data) = &cn.kind else {
                break;
            };
            let names: Vec<PlugKey> = data
                .published
                .iter()
                .filter(|(_, bound)| exposed.contains(bound))
                .map(|(name, _)| PlugKey::new(c, name.clone()))
                .collect();
            if data.locked && names.is_empty() {
                return Err(SceneError::ContainerLocked {
                    container: cn.name.clone(),
                    node: node.name.clone(),
                });
            }
            exposed = names;
            cur = cn.owner;
        }
        Ok(())
    }

    /// Create an empty, unlocked container.
    pub fn create_container(&mut self, name: &str) -> SceneResult<NodeHandle> {
        self.create_node(name, NodeKind::Container(ContainerData::default()), None)
    }

    /// Owning container of a node.
    pub fn container_of(&self, handle: NodeHandle) -> SceneResult<Option<NodeHandle>> {
        Ok(self.node(handle)?.owner)
    }

    pub fn container_members(&self, container: NodeHandle) -> SceneResult<Vec<NodeHandle>> {
        Ok(self.container_data(container)?.members.iter().copied().collect())
    }

    fn expand_for_container(&self, nodes: &[NodeHandle], opts: AddOptions) -> SceneResult<Vec<NodeHandle>> {
        let mut out = Vec::new();
        let push = |h: NodeHandle, out: &mut Vec<NodeHandle>| {
            if !out.contains(&h) {
                out.push(h);
            }
        };
        for &h in nodes {
            push(h, &mut out);
            let node = self.node(h)?;
            if opts.include_hierarchy_below {
                for d in self.descendants(h)? {
                    let is_shape = matches!(self.node(d)?.kind, NodeKind::Shape(_));
                    if !is_shape || opts.include_shapes {
                        push(d, &mut out);
                    }
                }
            } else if opts.include_shapes {
                for c in &node.children {
                    if matches!(self.node(*c)?.kind, NodeKind::Shape(_)) {
                        push(*c, &mut out);
                    }
                }
            }
        }
        if opts.include_shaders {
            let materials: Vec<NodeHandle> = out
                .iter()
                .filter_map(|h| match self.nodes.get(h).map(|n| &n.kind) {
                    Some(NodeKind::Shape(shape)) => shape.material,
                    _ => None,
                })
                .collect();
            for m in materials {
                push(m, &mut out);
            }
        }
        Ok(out)
    }

    /// Add nodes to a container. Members already present are skipped; nodes owned by
    /// another container move only with `force`.
    pub fn container_add(&mut self, container: NodeHandle, nodes: &[NodeHandle], opts: AddOptions) -> SceneResult<()> {
        self.container_data(container)?;
        self.check_structural(container)?;
        if self.container_data(container)?.locked {
            let name = self.node(container)?.name.clone();
            return Err(SceneError::ContainerLocked {
                container: name.clone(),
                node: name,
            });
        }
        for h in self.expand_for_container(nodes, opts)? {
            if h == container || self.container_owns(h, container)? {
                continue;
            }
            let owner = self.node(h)?.owner;
            match owner {
                Some(o) if o == container => continue,
                Some(o) if !opts.force => {
                    debug!(
                        "{} stays in {}; not moved into {}",
                        self.node(h)?.name,
                        self.node(o)?.name,
                        self.node(container)?.name
                    );
                    continue;
                }
                Some(o) => {
                    self.check_structural(h)?;
                    self.container_data_mut(o)?.members.shift_remove(&h);
                }
                None => {}
            }
            self.node_mut(h)?.owner = Some(container);
            self.container_data_mut(container)?.members.insert(h);
        }
        self.prune_bindings();
        Ok(())
    }

    /// True if `container` is owned (transitively) by `candidate`, i.e. adding would loop.
    fn container_owns(&self, candidate: NodeHandle, container: NodeHandle) -> SceneResult<bool> {
        let mut cur = self.node(container)?.owner;
        while let Some(c) = cur {
            if c == candidate {
                return Ok(true);
            }
            cur = self.node(c)?.owner;
        }
        Ok(false)
    }

    pub fn container_remove(&mut self, container: NodeHandle, node: NodeHandle) -> SceneResult<()> {
        self.check_structural(node)?;
        if self.node(node)?.owner != Some(container) {
            return Ok(());
        }
        self.container_data_mut(container)?.members.shift_remove(&node);
        self.node_mut(node)?.owner = None;
        self.prune_bindings();
        Ok(())
    }

    /// Publish `node.attr` on `container` under `name`. `node` may be a nested container,
    /// in which case `attr` names one of its published attributes.
    pub fn publish_and_bind(&mut self, container: NodeHandle, node: NodeHandle, attr: &str, name: &str) -> SceneResult<()> {
        let plug = self.resolve(node, attr)?;
        let cname = self.node(container)?.name.clone();
        if self.node(node)?.owner != Some(container) {
            return Err(SceneError::invalid(format!(
                "{} is not a member of {cname}",
                self.node(node)?.name
            )));
        }
        self.check_structural(container)?;
        let data = self.container_data_mut(container)?;
        if data.published.contains_key(name) {
            return Err(SceneError::PublishedNameTaken {
                container: cname,
                name: name.to_string(),
            });
        }
        data.published.insert(name.to_string(), plug);
        Ok(())
    }

    pub fn unbind_and_unpublish(&mut self, container: NodeHandle, name: &str) -> SceneResult<()> {
        self.check_structural(container)?;
        self.container_data_mut(container)?.published.shift_remove(name);
        self.prune_bindings();
        Ok(())
    }

    /// Published names in publication order.
    pub fn published_names(&self, container: NodeHandle) -> SceneResult<Vec<String>> {
        Ok(self.container_data(container)?.published.keys().cloned().collect())
    }

    pub fn published_binding(&self, container: NodeHandle, name: &str) -> SceneResult<Option<PlugKey>> {
        Ok(self.container_data(container)?.published.get(name).cloned())
    }

    pub fn lock_container(&mut self, container: NodeHandle, locked: bool) -> SceneResult<()> {
        self.container_data_mut(container)?.locked = locked;
        Ok(())
    }

    pub fn is_container_locked(&self, container: NodeHandle) -> SceneResult<bool> {
        Ok(self.container_data(container)?.locked)
    }

    /// Run `f` with `container` unlocked and restore the previous lock state afterwards,
    /// whether `f` succeeds or not.
    pub fn with_unlocked<T, E>(
        &mut self,
        container: NodeHandle,
        f: impl FnOnce(&mut Scene) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<SceneError>,
    {
        let was_locked = self.is_container_locked(container)?;
        self.lock_container(container, false)?;
        let result = f(self);
        if self.contains(container) {
            self.lock_container(container, was_locked)?;
        }
        result
    }

    /// Drop bindings whose target no longer exists, iterating through nested containers.
    pub(crate) fn prune_bindings(&mut self) {
        loop {
            let mut stale: Vec<(NodeHandle, String)> = Vec::new();
            for (h, node) in &self.nodes {
                let NodeKind::Container(data) = &node.kind else {
                    continue;
                };
                for (name, bound) in &data.published {
                    let ok = match self.nodes.get(&bound.node) {
                        Some(target) => {
                            target.owner == Some(*h) && self.attr_exists(target, &bound.attr)
                        }
                        None => false,
                    };
                    if !ok {
                        stale.push((*h, name.clone()));
                    }
                }
            }
            if stale.is_empty() {
                return;
            }
            for (h, name) in stale {
                if let Some(NodeKind::Container(data)) = self.nodes.get_mut(&h).map(|n| &mut n.kind) {
                    data.published.shift_remove(&name);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Scene, NodeHandle, NodeHandle) {
        let mut scene = Scene::new();
        let c = scene.create_container("box").unwrap();
        let t = scene.create_transform("ctrl", None).unwrap();
        scene.container_add(c, &[t], AddOptions::default()).unwrap();
        (scene, c, t)
    }

    #[test]
    fn locked_container_allows_only_published_writes() {
        let (mut scene, c, t) = setup();
        scene.publish_and_bind(c, t, "translate", "ctrl_T").unwrap();
        scene.lock_container(c, true).unwrap();
        scene.set(t, "translateX", 2.0).unwrap();
        assert!(matches!(
            scene.set(t, "rotateX", 2.0),
            Err(SceneError::ContainerLocked { .. })
        ));
        assert!(matches!(scene.rename(t, "x"), Err(SceneError::ContainerLocked { .. })));
        assert!(scene.delete(c).is_err());
    }

    #[test]
    fn published_attribute_reads_and_writes_through_container() {
        let (mut scene, c, t) = setup();
        scene.publish_and_bind(c, t, "translate", "ctrl_T").unwrap();
        scene.set(c, "ctrl_T", [1.0, 2.0, 3.0]).unwrap();
        assert_eq!(scene.get_vec3(t, "translate").unwrap(), [1.0, 2.0, 3.0]);
        assert_eq!(scene.get_f64(c, "ctrl_TY").unwrap(), 2.0);
        assert!(matches!(
            scene.publish_and_bind(c, t, "rotate", "ctrl_T"),
            Err(SceneError::PublishedNameTaken { .. })
        ));
    }

    #[test]
    fn nested_publish_reaches_through_both_levels() {
        let (mut scene, sub, t) = setup();
        let outer = scene.create_container("outer").unwrap();
        scene.container_add(outer, &[sub], AddOptions::default()).unwrap();
        scene.publish_and_bind(sub, t, "translate", "ctrl_T").unwrap();
        scene.publish_and_bind(outer, sub, "ctrl_T", "ctrl_T").unwrap();
        scene.lock_container(outer, true).unwrap();
        scene.set(outer, "ctrl_T", [0.0, 5.0, 0.0]).unwrap();
        assert_eq!(scene.get_f64(t, "ty").unwrap(), 5.0);
        assert!(scene.set(t, "scaleX", 2.0).is_err());
    }

    #[test]
    fn with_unlocked_restores_previous_state_on_error() {
        let (mut scene, c, t) = setup();
        scene.lock_container(c, true).unwrap();
        let result: Result<(), SceneError> = scene.with_unlocked(c, |scene| {
            scene.set(t, "rotateX", 10.0)?;
            Err(SceneError::invalid("boom"))
        });
        assert!(result.is_err());
        assert!(scene.is_container_locked(c).unwrap());
        assert_eq!(scene.get_f64(t, "rx").unwrap(), 10.0);
    }

    #[test]
    fn membership_moves_only_with_force() {
        let (mut scene, c, t) = setup();
        let other = scene.create_container("other").unwrap();
        scene.container_add(other, &[t], AddOptions::default()).unwrap();
        assert_eq!(scene.container_of(t).unwrap(), Some(c));
        scene
            .container_add(other, &[t], AddOptions { force: true, ..Default::default() })
            .unwrap();
        assert_eq!(scene.container_of(t).unwrap(), Some(other));
        assert!(scene.container_members(c).unwrap().is_empty());
    }

    #[test]
    fn deleting_container_removes_members() {
        let (mut scene, c, t) = setup();
        let child = scene.create_transform("child", Some(t)).unwrap();
        scene.delete(c).unwrap();
        assert!(!scene.contains(t));
        assert!(!scene.contains(child));
    }
}
