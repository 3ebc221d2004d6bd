//! Transform math: rotate orders, Euler conversion and TRS matrix helpers.

use nalgebra::{Matrix3, Matrix4, Point3, Rotation3, Unit, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Euler rotate order; the first letter is applied first.
/// Discriminants match the host enum (`xyz:yzx:zxy:xzy:yxz:zyx`).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotateOrder {
    #[default]
    Xyz,
    Yzx,
    Zxy,
    Xzy,
    Yxz,
    Zyx,
}

impl RotateOrder {
    pub const ALL: [RotateOrder; 6] = [
        RotateOrder::Xyz,
        RotateOrder::Yzx,
        RotateOrder::Zxy,
        RotateOrder::Xzy,
        RotateOrder::Yxz,
        RotateOrder::Zyx,
    ];

    /// Field list used for `rotateOrder` enum attributes.
    pub const ENUM_FIELDS: &'static str = "xyz:yzx:zxy:xzy:yxz:zyx";

    pub fn from_index(index: i64) -> Option<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn index(self) -> i64 {
        self as i64
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|o| o.as_str() == s)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RotateOrder::Xyz => "xyz",
            RotateOrder::Yzx => "yzx",
            RotateOrder::Zxy => "zxy",
            RotateOrder::Xzy => "xzy",
            RotateOrder::Yxz => "yxz",
            RotateOrder::Zyx => "zyx",
        }
    }

    /// Axis indices in application order.
    pub(crate) fn axes(self) -> [usize; 3] {
        match self {
            RotateOrder::Xyz => [0, 1, 2],
            RotateOrder::Yzx => [1, 2, 0],
            RotateOrder::Zxy => [2, 0, 1],
            RotateOrder::Xzy => [0, 2, 1],
            RotateOrder::Yxz => [1, 0, 2],
            RotateOrder::Zyx => [2, 1, 0],
        }
    }

    fn is_cyclic(self) -> bool {
        matches!(self, RotateOrder::Xyz | RotateOrder::Yzx | RotateOrder::Zxy)
    }
}

/// World axis selector shared by joint orientation and mirror planes.
#[inline]
pub fn basis(axis: usize) -> Vector3<f64> {
    match axis {
        0 => Vector3::x(),
        1 => Vector3::y(),
        _ => Vector3::z(),
    }
}

fn axis_rotation(axis: usize, radians: f64) -> Rotation3<f64> {
    Rotation3::from_axis_angle(&Unit::new_unchecked(basis(axis)), radians)
}

/// Rotation from per-axis angles in degrees (`[rx, ry, rz]`).
pub fn euler_to_rotation(degrees: [f64; 3], order: RotateOrder) -> Rotation3<f64> {
    let [i, j, k] = order.axes();
    axis_rotation(k, degrees[k].to_radians())
        * axis_rotation(j, degrees[j].to_radians())
        * axis_rotation(i, degrees[i].to_radians())
}

/// Per-axis angles in degrees reproducing `rotation` under `order`.
pub fn rotation_to_euler(rotation: &Rotation3<f64>, order: RotateOrder) -> [f64; 3] {
    let [i, j, k] = order.axes();
    // Conjugating by an axis permutation turns any order into x-then-y-then-z.
    let sign = if order.is_cyclic() { 1.0 } else { -1.0 };
    let q = Matrix3::from_columns(&[basis(i), basis(j), basis(k) * sign]);
    let q = Rotation3::from_matrix_unchecked(q);
    let canonical = q.inverse() * rotation * q;
    let (roll, pitch, yaw) = canonical.euler_angles();
    let mut out = [0.0; 3];
    out[i] = tidy(roll.to_degrees());
    out[j] = tidy(pitch.to_degrees());
    out[k] = tidy((sign * yaw).to_degrees());
    out
}

#[inline]
fn tidy(v: f64) -> f64 {
    if v.abs() < 1e-9 {
        0.0
    } else {
        v
    }
}

/// `T * R * S` for column vectors.
pub fn compose_trs(
    translate: &Vector3<f64>,
    rotation: &Rotation3<f64>,
    scale: &Vector3<f64>,
) -> Matrix4<f64> {
    let mut m = rotation.to_homogeneous() * Matrix4::new_nonuniform_scaling(scale);
    m[(0, 3)] = translate.x;
    m[(1, 3)] = translate.y;
    m[(2, 3)] = translate.z;
    m
}

#[inline]
pub fn translation_of(m: &Matrix4<f64>) -> Vector3<f64> {
    Vector3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)])
}

/// Axis scales of a TRS matrix. A mirrored matrix reports a negative X scale.
pub fn scale_of(m: &Matrix4<f64>) -> Vector3<f64> {
    let upper = m.fixed_view::<3, 3>(0, 0);
    let mut s = Vector3::new(
        upper.column(0).norm(),
        upper.column(1).norm(),
        upper.column(2).norm(),
    );
    if upper.determinant() < 0.0 {
        s.x = -s.x;
    }
    s
}

/// Proper rotation of a TRS matrix with scale removed.
pub fn rotation_of(m: &Matrix4<f64>) -> Rotation3<f64> {
    let upper: Matrix3<f64> = m.fixed_view::<3, 3>(0, 0).into_owned();
    let s = scale_of(m);
    let mut cols = [
        upper.column(0).into_owned(),
        upper.column(1).into_owned(),
        upper.column(2).into_owned(),
    ];
    for (i, col) in cols.iter_mut().enumerate() {
        let len = s[i];
        if len.abs() > f64::EPSILON {
            *col /= len;
        }
    }
    let r = Matrix3::from_columns(&cols);
    Rotation3::from_matrix_eps(&r, 1e-9, 16, Rotation3::identity())
}

#[inline]
pub fn transform_point(m: &Matrix4<f64>, p: &Vector3<f64>) -> Vector3<f64> {
    m.transform_point(&Point3::from(*p)).coords
}

/// Inverse that degrades to identity for singular matrices (zero scale).
pub fn safe_inverse(m: &Matrix4<f64>) -> Matrix4<f64> {
    m.try_inverse().unwrap_or_else(Matrix4::identity)
}

/// Weighted blend of rotations; hemispheres are aligned to the first input.
pub fn blend_rotations(items: &[(Rotation3<f64>, f64)]) -> Rotation3<f64> {
    let mut acc = nalgebra::Vector4::zeros();
    let mut reference: Option<nalgebra::Vector4<f64>> = None;
    for (rot, w) in items {
        let q = UnitQuaternion::from_rotation_matrix(rot);
        let mut v = q.as_ref().coords;
        match reference {
            Some(r) if r.dot(&v) < 0.0 => v = -v,
            None => reference = Some(v),
            _ => {}
        }
        acc += v * *w;
    }
    if acc.norm() <= f64::EPSILON {
        return Rotation3::identity();
    }
    let q = UnitQuaternion::from_quaternion(nalgebra::Quaternion::from(acc));
    q.to_rotation_matrix()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn euler_round_trip_for_every_order() {
        let angles = [25.0, -40.0, 70.0];
        for order in RotateOrder::ALL {
            let r = euler_to_rotation(angles, order);
            let back = rotation_to_euler(&r, order);
            let again = euler_to_rotation(back, order);
            assert_relative_eq!(r.matrix(), again.matrix(), epsilon = 1e-9);
            for axis in 0..3 {
                assert_relative_eq!(back[axis], angles[axis], epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn xyz_applies_x_first() {
        // Rotating +Y by 90 about X gives +Z; then 90 about Z leaves +Z.
        let r = euler_to_rotation([90.0, 0.0, 90.0], RotateOrder::Xyz);
        let v = r * Vector3::y();
        assert_relative_eq!(v, Vector3::z(), epsilon = 1e-12);
    }

    #[test]
    fn rotate_order_index_matches_enum_fields() {
        let fields: Vec<&str> = RotateOrder::ENUM_FIELDS.split(':').collect();
        for order in RotateOrder::ALL {
            assert_eq!(fields[order.index() as usize], order.as_str());
            assert_eq!(RotateOrder::from_index(order.index()), Some(order));
        }
        assert_eq!(RotateOrder::from_index(6), None);
    }

    #[test]
    fn trs_decomposes_back() {
        let r = euler_to_rotation([10.0, 20.0, 30.0], RotateOrder::Xyz);
        let m = compose_trs(&Vector3::new(1.0, 2.0, 3.0), &r, &Vector3::new(2.0, 2.0, 0.5));
        assert_relative_eq!(translation_of(&m), Vector3::new(1.0, 2.0, 3.0), epsilon = 1e-12);
        assert_relative_eq!(scale_of(&m), Vector3::new(2.0, 2.0, 0.5), epsilon = 1e-12);
        assert_relative_eq!(rotation_of(&m).matrix(), r.matrix(), epsilon = 1e-9);
    }

    #[test]
    fn blending_a_single_rotation_is_identity_operation() {
        let r = euler_to_rotation([0.0, 45.0, 0.0], RotateOrder::Xyz);
        let out = blend_rotations(&[(r, 1.0)]);
        assert_relative_eq!(out.matrix(), r.matrix(), epsilon = 1e-9);
    }
}
