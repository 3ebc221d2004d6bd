//! Point, parent, scale and pole-vector constraints.
//!
//! A constraint is a DAG child of the node it drives. Targets feed its `target[i].*` inputs and
//! its computed outputs feed the constrained channels, so deleting either end of the relation
//! removes the constraint (or bakes the last pose into the constrained node).

use nalgebra::{Matrix4, Rotation3, Vector3};

use crate::error::{SceneError, SceneResult};
use crate::eval::EvalContext;
use crate::math::{blend_rotations, euler_to_rotation, rotation_of, rotation_to_euler, safe_inverse, scale_of, transform_point, translation_of, RotateOrder};
use crate::node::{NodeHandle, NodeKind, PlugKey};
use crate::scene::Scene;
use crate::utility::element_indices;
use crate::value::AttrValue;

const AXES: [&str; 3] = ["X", "Y", "Z"];

/// Options shared by the constraint builders.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConstraintOptions {
    /// Explicit node name; defaults to `<constrained>_<type>1`.
    pub name: Option<String>,
    /// Keep the constrained node where it is when the constraint is created.
    pub maintain_offset: bool,
    /// Explicit offset (world-space translation for point, factor for scale).
    pub offset: Option<[f64; 3]>,
    /// Channels left unconnected.
    pub skip: [bool; 3],
}

impl ConstraintOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn maintain_offset(mut self, maintain: bool) -> Self {
        self.maintain_offset = maintain;
        self
    }

    pub fn with_offset(mut self, offset: [f64; 3]) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Skip axes given as letters, e.g. `"xz"`.
    pub fn skip_axes(mut self, axes: &str) -> Self {
        for c in axes.chars() {
            match c.to_ascii_lowercase() {
                'x' => self.skip[0] = true,
                'y' => self.skip[1] = true,
                'z' => self.skip[2] = true,
                _ => {}
            }
        }
        self
    }
}

impl Scene {
    fn require_transform(&self, handle: NodeHandle) -> SceneResult<()> {
        let node = self.node(handle)?;
        if node.kind.is_transform() {
            Ok(())
        } else {
            Err(SceneError::invalid(format!("{} is not a transform", node.name)))
        }
    }

    fn constraint_node(&mut self, kind: NodeKind, constrained: NodeHandle, name: Option<&str>) -> SceneResult<NodeHandle> {
        let name = match name {
            Some(n) => n.to_string(),
            None => {
                let base = format!("{}_{}1", self.node(constrained)?.name, kind.type_name());
                self.unique_name(&base)
            }
        };
        self.create_node(&name, kind, Some(constrained))
    }

    fn drive_channels(
        &mut self,
        constraint: NodeHandle,
        output: &str,
        constrained: NodeHandle,
        channel: &str,
        skip: [bool; 3],
    ) -> SceneResult<()> {
        if skip.iter().all(|s| !s) {
            return self.connect(constraint, output, constrained, channel, false);
        }
        for (i, axis) in AXES.iter().enumerate() {
            if !skip[i] {
                self.connect(
                    constraint,
                    &format!("{output}{axis}"),
                    constrained,
                    &format!("{channel}{axis}"),
                    false,
                )?;
            }
        }
        Ok(())
    }

    fn add_weighted_target(&mut self, constraint: NodeHandle, index: usize, target: NodeHandle, matrix_input: &str, matrix_source: &str) -> SceneResult<()> {
        let prefix = format!("target[{index}]");
        self.add_attr(constraint, &format!("{prefix}.{matrix_input}"), AttrValue::identity())?;
        self.add_attr(constraint, &format!("{prefix}.targetWeight"), 1.0)?;
        self.connect(target, matrix_source, constraint, &format!("{prefix}.{matrix_input}"), false)
    }

    /// Keep the rotate pivot of `constrained` at the weighted average of the targets' pivots.
    pub fn point_constraint(
        &mut self,
        targets: &[NodeHandle],
        constrained: NodeHandle,
        opts: &ConstraintOptions,
    ) -> SceneResult<NodeHandle> {
        if targets.is_empty() {
            return Err(SceneError::invalid("point constraint needs at least one target"));
        }
        self.require_transform(constrained)?;
        for &t in targets {
            self.require_transform(t)?;
        }
        let c = self.constraint_node(NodeKind::PointConstraint, constrained, opts.name.as_deref())?;
        for (i, &t) in targets.iter().enumerate() {
            self.add_weighted_target(c, i, t, "targetParentMatrix", "parentMatrix")?;
            for (input, source) in [
                ("targetTranslate", "translate"),
                ("targetRotatePivot", "rotatePivot"),
                ("targetRotateTranslate", "rotatePivotTranslate"),
            ] {
                let input = format!("target[{i}].{input}");
                self.add_attr(c, &input, AttrValue::vec3(0.0, 0.0, 0.0))?;
                self.connect(t, source, c, &input, false)?;
            }
        }
        if opts.maintain_offset {
            let mut avg = Vector3::zeros();
            for &t in targets {
                avg += self.world_position(t)?;
            }
            avg /= targets.len() as f64;
            let offset = self.world_position(constrained)? - avg;
            self.set(c, "offset", [offset.x, offset.y, offset.z])?;
        } else if let Some(offset) = opts.offset {
            self.set(c, "offset", offset)?;
        }
        self.drive_channels(c, "constraintTranslate", constrained, "translate", opts.skip)?;
        Ok(c)
    }

    /// Drive translate and rotate of `constrained` from the blended world matrices of the targets.
    pub fn parent_constraint(
        &mut self,
        targets: &[NodeHandle],
        constrained: NodeHandle,
        opts: &ConstraintOptions,
    ) -> SceneResult<NodeHandle> {
        if targets.is_empty() {
            return Err(SceneError::invalid("parent constraint needs at least one target"));
        }
        self.require_transform(constrained)?;
        for &t in targets {
            self.require_transform(t)?;
        }
        let c = self.constraint_node(NodeKind::ParentConstraint, constrained, opts.name.as_deref())?;
        let constrained_world = self.world_matrix(constrained)?;
        for (i, &t) in targets.iter().enumerate() {
            self.add_weighted_target(c, i, t, "targetWorldMatrix", "worldMatrix")?;
            let offset_attr = format!("target[{i}].targetOffset");
            self.add_attr(c, &offset_attr, AttrValue::identity())?;
            if opts.maintain_offset {
                let offset = safe_inverse(&self.world_matrix(t)?) * constrained_world;
                self.set(c, &offset_attr, AttrValue::Matrix(offset))?;
            }
        }
        self.drive_channels(c, "constraintTranslate", constrained, "translate", opts.skip)?;
        self.drive_channels(c, "constraintRotate", constrained, "rotate", opts.skip)?;
        Ok(c)
    }

    /// Drive the scale of `constrained` so its world scale matches the targets'.
    pub fn scale_constraint(
        &mut self,
        targets: &[NodeHandle],
        constrained: NodeHandle,
        opts: &ConstraintOptions,
    ) -> SceneResult<NodeHandle> {
        if targets.is_empty() {
            return Err(SceneError::invalid("scale constraint needs at least one target"));
        }
        self.require_transform(constrained)?;
        for &t in targets {
            self.require_transform(t)?;
        }
        let c = self.constraint_node(NodeKind::ScaleConstraint, constrained, opts.name.as_deref())?;
        for (i, &t) in targets.iter().enumerate() {
            self.add_weighted_target(c, i, t, "targetWorldMatrix", "worldMatrix")?;
        }
        if opts.maintain_offset {
            let mut avg = Vector3::zeros();
            for &t in targets {
                avg += scale_of(&self.world_matrix(t)?);
            }
            avg /= targets.len() as f64;
            let current = scale_of(&self.world_matrix(constrained)?);
            let offset = current.zip_map(&avg, |c, a| if a.abs() > f64::EPSILON { c / a } else { 1.0 });
            self.set(c, "offset", [offset.x, offset.y, offset.z])?;
        } else if let Some(offset) = opts.offset {
            self.set(c, "offset", offset)?;
        }
        self.drive_channels(c, "constraintScale", constrained, "scale", opts.skip)?;
        Ok(c)
    }

    /// Aim the pole vector of `ik_handle` at `target`. The current chain pose becomes the
    /// solver's reference so creating the constraint does not move the joints.
    pub fn pole_vector_constraint(
        &mut self,
        target: NodeHandle,
        ik_handle: NodeHandle,
        name: Option<&str>,
    ) -> SceneResult<NodeHandle> {
        self.require_transform(target)?;
        if !matches!(self.node(ik_handle)?.kind, NodeKind::IkHandle(_)) {
            return Err(SceneError::invalid(format!(
                "{} is not an ik handle",
                self.node(ik_handle)?.name
            )));
        }
        let (start, _) = self.ik_chain(ik_handle)?;
        let pose = self.get_vec3(start, "rotate")?;
        let c = self.constraint_node(NodeKind::PoleVectorConstraint, ik_handle, name)?;
        self.add_weighted_target(c, 0, target, "targetWorldMatrix", "worldMatrix")?;
        self.connect(c, "constraintTranslate", ik_handle, "poleVector", false)?;
        self.capture_ik_rest_at(ik_handle, pose)?;
        Ok(c)
    }

    /// Constraint nodes currently driving `handle`.
    pub fn constraints_on(&self, handle: NodeHandle) -> SceneResult<Vec<NodeHandle>> {
        Ok(self
            .node(handle)?
            .children
            .iter()
            .copied()
            .filter(|c| self.nodes.get(c).map(|n| n.kind.is_constraint()).unwrap_or(false))
            .collect())
    }

    /// Target nodes of a constraint, by target index.
    pub fn constraint_targets(&self, constraint: NodeHandle) -> SceneResult<Vec<NodeHandle>> {
        let node = self.node(constraint)?;
        if !node.kind.is_constraint() {
            return Err(SceneError::invalid(format!("{} is not a constraint", node.name)));
        }
        let mut out = Vec::new();
        for i in element_indices(node, "target") {
            for input in ["targetParentMatrix", "targetWorldMatrix"] {
                let key = PlugKey::new(constraint, format!("target[{i}].{input}"));
                if let Some(src) = self.connections.get(&key) {
                    out.push(src.node);
                    break;
                }
            }
        }
        Ok(out)
    }
}

struct Weighted<T> {
    items: Vec<(T, f64)>,
    total: f64,
}

impl<T> Weighted<T> {
    fn new() -> Self {
        Self {
            items: Vec::new(),
            total: 0.0,
        }
    }

    fn push(&mut self, item: T, weight: f64) {
        self.items.push((item, weight));
        self.total += weight;
    }
}

fn no_targets(scene: &Scene, handle: NodeHandle) -> SceneError {
    let name = scene.node(handle).map(|n| n.name.clone()).unwrap_or_default();
    SceneError::invalid(format!("{name} has no weighted targets"))
}

fn average(scene: &Scene, handle: NodeHandle, points: Weighted<Vector3<f64>>) -> SceneResult<Vector3<f64>> {
    if points.total.abs() <= f64::EPSILON {
        return Err(no_targets(scene, handle));
    }
    let sum = points
        .items
        .iter()
        .fold(Vector3::<f64>::zeros(), |acc, (p, w)| acc + p * *w);
    Ok(sum / points.total)
}

fn local_rotation(
    scene: &Scene,
    constrained: NodeHandle,
    parent_world: &Matrix4<f64>,
    world: &Rotation3<f64>,
    cx: &mut EvalContext,
) -> SceneResult<[f64; 3]> {
    let mut local = rotation_of(parent_world).inverse() * world;
    if matches!(scene.node(constrained)?.kind, NodeKind::Joint) {
        let jo = scene.read_vec3(constrained, "jointOrient", cx)?;
        local = euler_to_rotation([jo.x, jo.y, jo.z], RotateOrder::Xyz).inverse() * local;
    }
    let order = scene.read_rotate_order(constrained, cx)?;
    Ok(rotation_to_euler(&local, order))
}

pub(crate) fn compute(scene: &Scene, handle: NodeHandle, attr: &str, cx: &mut EvalContext) -> SceneResult<AttrValue> {
    let node = scene.node(handle)?;
    let constrained = node
        .parent
        .ok_or_else(|| SceneError::invalid(format!("{} constrains nothing", node.name)))?;
    let indices = element_indices(node, "target");
    let vec = |v: Vector3<f64>| AttrValue::vec3(v.x, v.y, v.z);
    match (&node.kind, attr) {
        (NodeKind::PointConstraint, "constraintTranslate") => {
            let mut points = Weighted::new();
            for i in indices {
                let p = format!("target[{i}]");
                let pm = scene.read_matrix(handle, &format!("{p}.targetParentMatrix"), cx)?;
                let local = scene.read_vec3(handle, &format!("{p}.targetTranslate"), cx)?
                    + scene.read_vec3(handle, &format!("{p}.targetRotatePivot"), cx)?
                    + scene.read_vec3(handle, &format!("{p}.targetRotateTranslate"), cx)?;
                let w = scene.read_f64(handle, &format!("{p}.targetWeight"), cx)?;
                points.push(transform_point(&pm, &local), w);
            }
            let world = average(scene, handle, points)? + scene.read_vec3(handle, "offset", cx)?;
            let parent_inv = safe_inverse(&scene.parent_matrix_in(constrained, cx)?);
            let pivot = scene.read_vec3(constrained, "rotatePivot", cx)?
                + scene.read_vec3(constrained, "rotatePivotTranslate", cx)?;
            Ok(vec(transform_point(&parent_inv, &world) - pivot))
        }
        (NodeKind::ParentConstraint, "constraintTranslate" | "constraintRotate") => {
            let mut positions = Weighted::new();
            let mut rotations = Vec::new();
            let rp = scene.read_vec3(constrained, "rotatePivot", cx)?;
            for i in indices {
                let p = format!("target[{i}]");
                let world = scene.read_matrix(handle, &format!("{p}.targetWorldMatrix"), cx)?
                    * scene.read_matrix(handle, &format!("{p}.targetOffset"), cx)?;
                let w = scene.read_f64(handle, &format!("{p}.targetWeight"), cx)?;
                positions.push(transform_point(&world, &rp), w);
                rotations.push((rotation_of(&world), w));
            }
            let parent_world = scene.parent_matrix_in(constrained, cx)?;
            if attr == "constraintTranslate" {
                let pivot = average(scene, handle, positions)?;
                let rpt = scene.read_vec3(constrained, "rotatePivotTranslate", cx)?;
                Ok(vec(transform_point(&safe_inverse(&parent_world), &pivot) - rp - rpt))
            } else {
                if positions.total.abs() <= f64::EPSILON {
                    return Err(no_targets(scene, handle));
                }
                let world = blend_rotations(&rotations);
                Ok(AttrValue::Double3(local_rotation(scene, constrained, &parent_world, &world, cx)?))
            }
        }
        (NodeKind::ScaleConstraint, "constraintScale") => {
            let mut scales = Weighted::new();
            for i in indices {
                let p = format!("target[{i}]");
                let world = scene.read_matrix(handle, &format!("{p}.targetWorldMatrix"), cx)?;
                let w = scene.read_f64(handle, &format!("{p}.targetWeight"), cx)?;
                scales.push(scale_of(&world), w);
            }
            let target = average(scene, handle, scales)?.component_mul(&scene.read_vec3(handle, "offset", cx)?);
            let parent = scale_of(&scene.parent_matrix_in(constrained, cx)?);
            Ok(vec(target.zip_map(&parent, |t, p| if p.abs() > f64::EPSILON { t / p } else { t })))
        }
        (NodeKind::PoleVectorConstraint, "constraintTranslate") => {
            let start = match &scene.node(constrained)?.kind {
                NodeKind::IkHandle(data) => data.start_joint,
                _ => {
                    return Err(SceneError::invalid(format!(
                        "{} is not parented under an ik handle",
                        node.name
                    )))
                }
            };
            let mut points = Weighted::new();
            for i in indices {
                let p = format!("target[{i}]");
                let world = scene.read_matrix(handle, &format!("{p}.targetWorldMatrix"), cx)?;
                let w = scene.read_f64(handle, &format!("{p}.targetWeight"), cx)?;
                points.push(translation_of(&world), w);
            }
            let target = average(scene, handle, points)?;
            Ok(vec(target - scene.world_position_in(start, cx)?))
        }
        _ => Err(SceneError::AttributeNotFound {
            node: node.name.clone(),
            attribute: attr.to_string(),
        }),
    }
}
