use nalgebra::{Matrix2, Rotation3, Unit, Vector2, Vector3};

/// Cartesian axis used by the fixed fragment reorientations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn unit(self) -> Vector3<f64> {
        match self {
            Axis::X => Vector3::x(),
            Axis::Y => Vector3::y(),
            Axis::Z => Vector3::z(),
        }
    }
}

/// Right-handed rotation by `angle_deg` degrees about `axis`.
pub fn rotation_about(angle_deg: f64, axis: &Vector3<f64>) -> Rotation3<f64> {
    if axis.norm() < 1e-12 {
        return Rotation3::identity();
    }
    Rotation3::from_axis_angle(&Unit::new_normalize(*axis), angle_deg.to_radians())
}

/// Normal of the plane spanned by `u` and `v`. Falls back to any vector
/// perpendicular to `u` when the two are collinear.
pub fn plane_normal(u: &Vector3<f64>, v: &Vector3<f64>) -> Vector3<f64> {
    let n = u.cross(v);
    if n.norm() > 1e-8 {
        return n.normalize();
    }
    perpendicular(u)
}

pub fn perpendicular(u: &Vector3<f64>) -> Vector3<f64> {
    let trial = if u.x.abs() < 0.9 { Vector3::x() } else { Vector3::y() };
    let n = u.cross(&trial);
    if n.norm() < 1e-12 { Vector3::z() } else { n.normalize() }
}

/// Rotation taking unit vector `from` onto unit vector `to`, including the
/// antiparallel case.
pub fn align(from: &Vector3<f64>, to: &Vector3<f64>) -> Rotation3<f64> {
    match Rotation3::rotation_between(from, to) {
        Some(rot) => rot,
        None => Rotation3::from_axis_angle(&Unit::new_normalize(perpendicular(from)), std::f64::consts::PI),
    }
}

/// In-plane point operations about the surface normal: the twelve
/// rotations by multiples of 30° and the twelve mirror lines at multiples
/// of 15°. Callers keep the ones their lattice admits.
pub fn planar_point_operations() -> Vec<Matrix2<f64>> {
    let mut ops = Vec::with_capacity(24);
    for k in 0..12 {
        let t = (30.0 * k as f64).to_radians();
        ops.push(Matrix2::new(t.cos(), -t.sin(), t.sin(), t.cos()));
    }
    for k in 0..12 {
        let t = (2.0 * 15.0 * k as f64).to_radians();
        ops.push(Matrix2::new(t.cos(), t.sin(), t.sin(), -t.cos()));
    }
    ops
}

pub fn apply_planar(op: &Matrix2<f64>, v: &Vector3<f64>) -> Vector3<f64> {
    let xy = op * Vector2::new(v.x, v.y);
    Vector3::new(xy.x, xy.y, v.z)
}
