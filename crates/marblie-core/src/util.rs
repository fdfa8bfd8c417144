//! Math helpers shared by the controller, the entities and the layout codec.

use std::f32::consts::{PI, TAU};

use rapier3d::na::{Point3, UnitQuaternion, Vector3};
use rapier3d::parry::query::Ray;
use serde::{Deserialize, Serialize};

/// Axis every interactive rotation is measured about (tracks live in the YZ plane).
pub fn reference_axis() -> Vector3<f32> {
    Vector3::x()
}

/// Signed angle from `a` to `b` about `axis`, normalized into (-π, π].
///
/// The angle is positive when `a` turns into `b` counter-clockwise as seen
/// looking along `axis`, so `signed_angle_3d(+Z, +Y, +X)` is `+π/2`.
/// Degenerate inputs yield `0.0`.
pub fn signed_angle_3d(a: &Vector3<f32>, b: &Vector3<f32>, axis: &Vector3<f32>) -> f32 {
    if a.norm_squared() <= f32::EPSILON || b.norm_squared() <= f32::EPSILON {
        return 0.0;
    }
    let angle = a.angle(b);
    let sign = if axis.dot(&b.cross(a)) < 0.0 { -1.0 } else { 1.0 };
    normalize_angle(angle * sign)
}

/// Wraps an angle into (-π, π].
pub fn normalize_angle(angle: f32) -> f32 {
    let mut wrapped = angle % TAU;
    if wrapped > PI {
        wrapped -= TAU;
    } else if wrapped <= -PI {
        wrapped += TAU;
    }
    wrapped
}

/// Rescales `v` so its length lies in `[min, max]`.
///
/// A zero vector has no direction to rescale; `fallback` supplies one.
pub fn clamp_length(
    v: &Vector3<f32>,
    fallback: &Vector3<f32>,
    min: f32,
    max: f32,
) -> Vector3<f32> {
    let length = v.norm();
    if length > f32::EPSILON {
        return v * (length.clamp(min, max) / length);
    }
    match fallback.try_normalize(f32::EPSILON) {
        Some(dir) => dir * min,
        None => Vector3::z() * min,
    }
}

/// Euler angles in radians applied in X, then Y, then Z order (intrinsic).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EulerXyz {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl EulerXyz {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Rotation about X only.
    pub const fn about_x(x: f32) -> Self {
        Self { x, y: 0.0, z: 0.0 }
    }

    pub fn to_quaternion(self) -> UnitQuaternion<f32> {
        UnitQuaternion::from_axis_angle(&Vector3::x_axis(), self.x)
            * UnitQuaternion::from_axis_angle(&Vector3::y_axis(), self.y)
            * UnitQuaternion::from_axis_angle(&Vector3::z_axis(), self.z)
    }

    pub fn from_quaternion(q: &UnitQuaternion<f32>) -> Self {
        let m = q.to_rotation_matrix();
        let m13 = m[(0, 2)].clamp(-1.0, 1.0);
        let y = m13.asin();
        if m13.abs() < 0.999_999_9 {
            Self {
                x: (-m[(1, 2)]).atan2(m[(2, 2)]),
                y,
                z: (-m[(0, 1)]).atan2(m[(0, 0)]),
            }
        } else {
            Self {
                x: m[(2, 1)].atan2(m[(1, 1)]),
                y,
                z: 0.0,
            }
        }
    }
}

/// Converts hue, saturation and lightness (all in `[0, 1]`, hue wrapping) to RGB.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn hsl_to_rgb(h: f32, s: f32, l: f32) -> [f32; 3] {
    let h = h.rem_euclid(1.0);
    let s = s.clamp(0.0, 1.0);
    let l = l.clamp(0.0, 1.0);
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let x = c * (1.0 - ((h * 6.0) % 2.0 - 1.0).abs());
    let m = l - c / 2.0;
    let (r, g, b) = match (h * 6.0) as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    [r + m, g + m, b + m]
}

/// Axis-aligned rectangle in screen pixels (y grows downwards).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl ScreenRect {
    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Strict containment; points on the border are outside.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x > self.left && x < self.right && y > self.top && y < self.bottom
    }
}

/// Intersects a ray with the infinite plane through `origin` with `normal`.
///
/// Returns `None` for rays parallel to the plane or pointing away from it.
pub fn intersect_plane(
    ray: &Ray,
    origin: &Point3<f32>,
    normal: &Vector3<f32>,
) -> Option<Point3<f32>> {
    let denom = normal.dot(&ray.dir);
    if denom.abs() <= f32::EPSILON {
        return None;
    }
    let t = normal.dot(&(origin - ray.origin)) / denom;
    (t >= 0.0).then(|| ray.point_at(t))
}
