//! Procedural geometry for track pieces.
//!
//! Everything here is a pure function of its inputs: the same dimensions and
//! control points always produce the same vertex and index buffers.

use std::collections::HashMap;

use rapier3d::na::{Isometry3, Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::config::TrackDimensions;

/// Arc-length samples used to reparameterize curves.
const ARC_LENGTH_DIVISIONS: usize = 200;

/// Default tolerance for [`MeshData::merge_vertices`].
pub const MERGE_TOLERANCE: f32 = 1e-4;

/// Indexed triangle mesh in local space.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub positions: Vec<Point3<f32>>,
    pub indices: Vec<[u32; 3]>,
}

impl MeshData {
    pub fn new(positions: Vec<Point3<f32>>, indices: Vec<[u32; 3]>) -> Self {
        Self { positions, indices }
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }

    /// Concatenates several meshes into one buffer.
    pub fn merge(parts: impl IntoIterator<Item = MeshData>) -> Self {
        let mut merged = Self::default();
        for part in parts {
            let base = merged.positions.len() as u32;
            merged.positions.extend(part.positions);
            merged
                .indices
                .extend(part.indices.into_iter().map(|[a, b, c]| [a + base, b + base, c + base]));
        }
        merged
    }

    /// Applies a rigid transform to every vertex.
    pub fn transformed(mut self, iso: &Isometry3<f32>) -> Self {
        for p in &mut self.positions {
            *p = iso * *p;
        }
        self
    }

    pub fn translated(mut self, offset: Vector3<f32>) -> Self {
        for p in &mut self.positions {
            *p += offset;
        }
        self
    }

    /// Welds vertices closer than `tolerance` and drops triangles that collapse.
    pub fn merge_vertices(&self, tolerance: f32) -> Self {
        let inv = 1.0 / tolerance;
        let mut lookup: HashMap<[i64; 3], u32> = HashMap::new();
        let mut positions = Vec::new();
        let mut remap = Vec::with_capacity(self.positions.len());

        for p in &self.positions {
            #[allow(clippy::cast_possible_truncation)]
            let key = [
                (p.x * inv).round() as i64,
                (p.y * inv).round() as i64,
                (p.z * inv).round() as i64,
            ];
            let index = *lookup.entry(key).or_insert_with(|| {
                positions.push(*p);
                (positions.len() - 1) as u32
            });
            remap.push(index);
        }

        let indices = self
            .indices
            .iter()
            .map(|[a, b, c]| [remap[*a as usize], remap[*b as usize], remap[*c as usize]])
            .filter(|[a, b, c]| a != b && b != c && a != c)
            .collect();

        Self { positions, indices }
    }

    /// Axis-aligned bounds as `(min, max)`.
    pub fn bounds(&self) -> Option<(Point3<f32>, Point3<f32>)> {
        let first = *self.positions.first()?;
        Some(self.positions.iter().fold((first, first), |(min, max), p| {
            (min.inf(p), max.sup(p))
        }))
    }

    /// Sphere centred on the bounding box that encloses every vertex.
    pub fn bounding_sphere(&self) -> BoundingSphere {
        let Some((min, max)) = self.bounds() else {
            return BoundingSphere::default();
        };
        let center = box_center(&min, &max);
        let radius = self
            .positions
            .iter()
            .map(|p| (p - center).norm_squared())
            .fold(0.0_f32, f32::max)
            .sqrt();
        BoundingSphere { center, radius }
    }
}

fn box_center(min: &Point3<f32>, max: &Point3<f32>) -> Point3<f32> {
    Point3::from((min.coords + max.coords) * 0.5)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: Point3<f32>,
    pub radius: f32,
}

impl Default for BoundingSphere {
    fn default() -> Self {
        Self {
            center: Point3::origin(),
            radius: 0.0,
        }
    }
}

// ============================================================================
// Profiles
// ============================================================================

/// Closed H-shaped cross-section of a track, counter-clockwise, in the XY plane.
///
/// Both faces carry a channel `track_width` wide and `track_depth` deep, so a
/// piece works whichever way up it is flipped.
pub fn track_profile(dims: &TrackDimensions) -> Vec<Point2<f32>> {
    let w = dims.width;
    let h = dims.height / 2.0;
    let wall = dims.wall_width();
    let inner = wall + dims.track_width;
    let td = dims.track_depth;

    vec![
        Point2::new(0.0, 0.0),
        Point2::new(0.0, -h),
        Point2::new(wall, -h),
        Point2::new(wall, -h + td),
        Point2::new(inner, -h + td),
        Point2::new(inner, -h),
        Point2::new(w, -h),
        Point2::new(w, h),
        Point2::new(inner, h),
        Point2::new(inner, h - td),
        Point2::new(wall, h - td),
        Point2::new(wall, h),
        Point2::new(0.0, h),
    ]
}

/// z component of `(b - a) x (c - b)`; positive for a left turn.
fn turn(a: &Point2<f32>, b: &Point2<f32>, c: &Point2<f32>) -> f32 {
    (b - a).perp(&(c - b))
}

/// Signed area, positive for counter-clockwise polygons.
pub fn polygon_area(points: &[Point2<f32>]) -> f32 {
    let n = points.len();
    (0..n)
        .map(|i| {
            let a = points[i];
            let b = points[(i + 1) % n];
            a.x * b.y - b.x * a.y
        })
        .sum::<f32>()
        / 2.0
}

/// Ear-clipping triangulation of a simple polygon.
///
/// Output triangles are counter-clockwise regardless of input winding.
pub fn triangulate_polygon(points: &[Point2<f32>]) -> Vec<[u32; 3]> {
    let mut ring: Vec<usize> = (0..points.len()).collect();
    if polygon_area(points) < 0.0 {
        ring.reverse();
    }
    remove_collinear(points, &mut ring);

    let mut triangles = Vec::with_capacity(ring.len().saturating_sub(2));
    while ring.len() > 3 {
        let m = ring.len();
        let ear = (0..m).find(|&i| {
            let (ip, ic, inx) = (ring[(i + m - 1) % m], ring[i], ring[(i + 1) % m]);
            let (a, b, c) = (&points[ip], &points[ic], &points[inx]);
            if turn(a, b, c) <= 0.0 {
                return false;
            }
            !ring.iter().any(|&j| {
                j != ip && j != ic && j != inx && {
                    let p = &points[j];
                    p != a && p != b && p != c && point_in_triangle(p, a, b, c)
                }
            })
        });

        let Some(i) = ear else {
            tracing::warn!("[marblie] polygon triangulation stalled with {m} vertices left");
            break;
        };
        triangles.push([
            ring[(i + m - 1) % m] as u32,
            ring[i] as u32,
            ring[(i + 1) % m] as u32,
        ]);
        ring.remove(i);
        remove_collinear(points, &mut ring);
    }
    if ring.len() == 3 {
        triangles.push([ring[0] as u32, ring[1] as u32, ring[2] as u32]);
    }
    triangles
}

fn remove_collinear(points: &[Point2<f32>], ring: &mut Vec<usize>) {
    let mut i = 0;
    while ring.len() > 3 && i < ring.len() {
        let m = ring.len();
        let a = &points[ring[(i + m - 1) % m]];
        let b = &points[ring[i]];
        let c = &points[ring[(i + 1) % m]];
        if turn(a, b, c).abs() <= 1e-7 {
            ring.remove(i);
            i = i.saturating_sub(1);
        } else {
            i += 1;
        }
    }
}

fn point_in_triangle(p: &Point2<f32>, a: &Point2<f32>, b: &Point2<f32>, c: &Point2<f32>) -> bool {
    let d1 = (b - a).perp(&(p - a));
    let d2 = (c - b).perp(&(p - b));
    let d3 = (a - c).perp(&(p - c));
    d1 >= 0.0 && d2 >= 0.0 && d3 >= 0.0
}

// ============================================================================
// Curves
// ============================================================================

/// Quadratic Bezier through `p0` (t = 0) and `p2` (t = 1), pulled towards `p1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuadraticBezier {
    pub p0: Point3<f32>,
    pub p1: Point3<f32>,
    pub p2: Point3<f32>,
}

impl QuadraticBezier {
    pub fn new(p0: Point3<f32>, p1: Point3<f32>, p2: Point3<f32>) -> Self {
        Self { p0, p1, p2 }
    }

    pub fn from_points(points: &[Point3<f32>; 3]) -> Self {
        Self::new(points[0], points[1], points[2])
    }

    pub fn point(&self, t: f32) -> Point3<f32> {
        let u = 1.0 - t;
        Point3::from(
            self.p0.coords * (u * u) + self.p1.coords * (2.0 * u * t) + self.p2.coords * (t * t),
        )
    }

    /// Unit tangent at parameter `t`; falls back to the chord for degenerate curves.
    pub fn tangent(&self, t: f32) -> Vector3<f32> {
        let derivative = (self.p1 - self.p0) * (2.0 * (1.0 - t)) + (self.p2 - self.p1) * (2.0 * t);
        derivative
            .try_normalize(f32::EPSILON)
            .or_else(|| (self.p2 - self.p0).try_normalize(f32::EPSILON))
            .unwrap_or_else(Vector3::z)
    }

    /// Cumulative arc lengths at `ARC_LENGTH_DIVISIONS + 1` uniform `t` samples.
    fn arc_lengths(&self) -> Vec<f32> {
        let mut lengths = Vec::with_capacity(ARC_LENGTH_DIVISIONS + 1);
        let mut last = self.point(0.0);
        let mut total = 0.0;
        lengths.push(0.0);
        for i in 1..=ARC_LENGTH_DIVISIONS {
            let p = self.point(i as f32 / ARC_LENGTH_DIVISIONS as f32);
            total += (p - last).norm();
            lengths.push(total);
            last = p;
        }
        lengths
    }

    pub fn length(&self) -> f32 {
        self.arc_lengths().last().copied().unwrap_or(0.0)
    }

    /// Maps an arc-length fraction `u` to the curve parameter `t`.
    fn u_to_t(lengths: &[f32], u: f32) -> f32 {
        let total = lengths.last().copied().unwrap_or(0.0);
        if total <= f32::EPSILON {
            return u;
        }
        let target = u.clamp(0.0, 1.0) * total;
        let i = lengths.partition_point(|&l| l < target).clamp(1, lengths.len() - 1);
        let (before, after) = (lengths[i - 1], lengths[i]);
        let segment = after - before;
        let fraction = if segment > 0.0 { (target - before) / segment } else { 0.0 };
        ((i - 1) as f32 + fraction) / (lengths.len() - 1) as f32
    }

    /// `count + 1` parameters evenly spaced by arc length.
    pub fn spaced_parameters(&self, count: usize) -> Vec<f32> {
        let lengths = self.arc_lengths();
        (0..=count)
            .map(|i| Self::u_to_t(&lengths, i as f32 / count as f32))
            .collect()
    }
}

// ============================================================================
// Extrusion
// ============================================================================

/// Builds side walls between consecutive profile rings plus both end caps.
///
/// `rings` holds `steps + 1` rings of `profile.len()` vertices each.
fn skin_rings(profile: &[Point2<f32>], rings: Vec<Point3<f32>>) -> MeshData {
    let n = profile.len();
    let steps = rings.len() / n - 1;
    let mut indices = Vec::with_capacity(steps * n * 2);

    for s in 0..steps {
        for i in 0..n {
            let j = (i + 1) % n;
            let a = (s * n + i) as u32;
            let b = (s * n + j) as u32;
            let c = ((s + 1) * n + j) as u32;
            let d = ((s + 1) * n + i) as u32;
            indices.push([a, b, d]);
            indices.push([b, c, d]);
        }
    }

    let cap = triangulate_polygon(profile);
    let end = (steps * n) as u32;
    for [a, b, c] in &cap {
        indices.push([*c, *b, *a]);
        indices.push([a + end, b + end, c + end]);
    }

    MeshData::new(rings, indices)
}

/// Extrudes `profile` along +Z over `depth`, centred on z = 0.
pub fn extrude_linear(profile: &[Point2<f32>], depth: f32) -> MeshData {
    let half = depth / 2.0;
    let rings = [-half, half]
        .iter()
        .flat_map(|&z| profile.iter().map(move |p| Point3::new(p.x, p.y, z)))
        .collect();
    skin_rings(profile, rings)
}

/// Sweeps `profile` along `curve` in `steps` arc-length-uniform segments.
///
/// The profile's x axis maps to the curve normal (which is -X for curves in
/// the YZ plane) and its y axis to the binormal.
pub fn sweep_along(profile: &[Point2<f32>], curve: &QuadraticBezier, steps: usize) -> MeshData {
    let mut rings = Vec::with_capacity((steps + 1) * profile.len());
    for t in curve.spaced_parameters(steps.max(1)) {
        let origin = curve.point(t);
        let tangent = curve.tangent(t);
        let normal = tangent
            .cross(&tangent.cross(&Vector3::x()))
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(|| tangent.cross(&Vector3::y()).normalize());
        let binormal = tangent.cross(&normal);
        rings.extend(
            profile
                .iter()
                .map(|p| origin + normal * p.x + binormal * p.y),
        );
    }
    skin_rings(profile, rings)
}

/// Visual mesh of a straight piece at unit scale.
pub fn straight_geometry(dims: &TrackDimensions) -> MeshData {
    extrude_linear(&track_profile(dims), dims.depth)
}

/// Visual mesh of a curved piece; shifted so its floor matches straight pieces.
pub fn curve_geometry(dims: &TrackDimensions, curve: &QuadraticBezier) -> MeshData {
    sweep_along(&track_profile(dims), curve, dims.sections).translated(Vector3::new(dims.width, 0.0, 0.0))
}

/// The two crossed blades of a windmill, sharing the pin at the origin.
pub fn windmill_geometry(dims: &TrackDimensions) -> [MeshData; 2] {
    let blade = straight_geometry(&dims.with_depth(dims.windmill_depth));
    let crossed = blade.clone().transformed(&Isometry3::rotation(
        Vector3::x() * std::f32::consts::FRAC_PI_2,
    ));
    [blade, crossed]
}

// ============================================================================
// Primitive solids
// ============================================================================

/// UV sphere centred on the origin.
pub fn uv_sphere(radius: f32, segments: u32, rings: u32) -> MeshData {
    let segments = segments.max(3);
    let rings = rings.max(2);
    let mut positions = Vec::with_capacity(((segments + 1) * (rings + 1)) as usize);
    for r in 0..=rings {
        let phi = std::f32::consts::PI * r as f32 / rings as f32;
        for s in 0..=segments {
            let theta = std::f32::consts::TAU * s as f32 / segments as f32;
            positions.push(Point3::new(
                radius * phi.sin() * theta.cos(),
                radius * phi.cos(),
                radius * phi.sin() * theta.sin(),
            ));
        }
    }
    let stride = segments + 1;
    let mut indices = Vec::with_capacity((segments * rings * 2) as usize);
    for r in 0..rings {
        for s in 0..segments {
            let a = r * stride + s;
            let b = a + stride;
            if r != 0 {
                indices.push([a, a + 1, b]);
            }
            if r != rings - 1 {
                indices.push([a + 1, b + 1, b]);
            }
        }
    }
    MeshData::new(positions, indices)
}

/// Box with the given half extents centred on `center`.
pub fn cuboid(half: Vector3<f32>, center: Vector3<f32>) -> MeshData {
    let corners = (0..8)
        .map(|i| {
            let sx = if i & 1 == 0 { -1.0 } else { 1.0 };
            let sy = if i & 2 == 0 { -1.0 } else { 1.0 };
            let sz = if i & 4 == 0 { -1.0 } else { 1.0 };
            Point3::from(center + Vector3::new(sx * half.x, sy * half.y, sz * half.z))
        })
        .collect();
    let indices = vec![
        [0, 2, 1], [1, 2, 3], // -z
        [4, 5, 6], [5, 7, 6], // +z
        [0, 1, 4], [1, 5, 4], // -y
        [2, 6, 3], [3, 6, 7], // +y
        [0, 4, 2], [2, 4, 6], // -x
        [1, 3, 5], [3, 7, 5], // +x
    ];
    MeshData::new(corners, indices)
}

/// Revolves a closed `(radius, height)` outline around the Y axis.
pub fn lathe(outline: &[Point2<f32>], segments: u32) -> MeshData {
    let segments = segments.max(3) as usize;
    let n = outline.len();
    let mut positions = Vec::with_capacity(segments * n);
    for s in 0..segments {
        let theta = std::f32::consts::TAU * s as f32 / segments as f32;
        let (sin, cos) = theta.sin_cos();
        positions.extend(outline.iter().map(|p| Point3::new(p.x * cos, p.y, p.x * sin)));
    }
    let mut indices = Vec::with_capacity(segments * n * 2);
    for s in 0..segments {
        let next = (s + 1) % segments;
        for i in 0..n {
            let j = (i + 1) % n;
            let a = (s * n + i) as u32;
            let b = (s * n + j) as u32;
            let c = (next * n + j) as u32;
            let d = (next * n + i) as u32;
            indices.push([a, d, b]);
            indices.push([b, d, c]);
        }
    }
    MeshData::new(positions, indices)
}

/// Ring of `tube` thickness around the Y axis with centerline `radius`.
pub fn torus(radius: f32, tube: f32, segments: u32, sides: u32) -> MeshData {
    let sides = sides.max(3);
    let outline: Vec<Point2<f32>> = (0..sides)
        .map(|i| {
            let a = std::f32::consts::TAU * i as f32 / sides as f32;
            Point2::new(radius + tube * a.cos(), tube * a.sin())
        })
        .collect();
    lathe(&outline, segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims() -> TrackDimensions {
        TrackDimensions::default()
    }

    #[test]
    fn test_profile_spans_width_and_height() {
        let profile = track_profile(&dims());
        assert_eq!(profile.len(), 13);
        let (min_x, max_x) = profile
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), p| (lo.min(p.x), hi.max(p.x)));
        let (min_y, max_y) = profile
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), p| (lo.min(p.y), hi.max(p.y)));
        assert_eq!((min_x, max_x), (0.0, 1.5));
        assert!((min_y + 0.35).abs() < 1e-6 && (max_y - 0.35).abs() < 1e-6);
        assert!(polygon_area(&profile) > 0.0);
    }

    #[test]
    fn test_triangulation_covers_profile_area() {
        let profile = track_profile(&dims());
        let triangles = triangulate_polygon(&profile);
        let covered: f32 = triangles
            .iter()
            .map(|[a, b, c]| {
                polygon_area(&[
                    profile[*a as usize],
                    profile[*b as usize],
                    profile[*c as usize],
                ])
            })
            .sum();
        // 1.5 x 0.7 minus two 1.3 x 0.2 channels
        assert!((covered - (1.05 - 0.52)).abs() < 1e-4);
        assert!(triangles.iter().all(|[a, b, c]| {
            polygon_area(&[profile[*a as usize], profile[*b as usize], profile[*c as usize]]) > 0.0
        }));
    }

    #[test]
    fn test_triangulate_clockwise_input() {
        let square = [
            Point2::new(0.0, 0.0),
            Point2::new(0.0, 1.0),
            Point2::new(1.0, 1.0),
            Point2::new(1.0, 0.0),
        ];
        let triangles = triangulate_polygon(&square);
        assert_eq!(triangles.len(), 2);
    }

    #[test]
    fn test_straight_geometry_bounds() {
        let mesh = straight_geometry(&dims());
        let (min, max) = mesh.bounds().unwrap();
        assert_eq!(min, Point3::new(0.0, -0.35, -5.0));
        assert_eq!(max, Point3::new(1.5, 0.35, 5.0));

        let sphere = mesh.bounding_sphere();
        let expected = (0.75_f32.powi(2) + 0.35_f32.powi(2) + 25.0).sqrt();
        assert!((sphere.radius - expected).abs() < 1e-4);
    }

    #[test]
    fn test_bezier_endpoints_and_tangents() {
        let curve = QuadraticBezier::new(
            Point3::new(0.0, 0.0, 3.5),
            Point3::new(0.0, -3.0, 0.0),
            Point3::new(0.0, 0.0, -3.5),
        );
        assert_eq!(curve.point(0.0), curve.p0);
        assert_eq!(curve.point(1.0), curve.p2);
        let t0 = curve.tangent(0.0);
        assert!((t0 - (curve.p1 - curve.p0).normalize()).norm() < 1e-6);
        assert!((curve.tangent(0.5) - Vector3::new(0.0, 0.0, -1.0)).norm() < 1e-6);
    }

    #[test]
    fn test_spaced_parameters_are_monotonic() {
        let curve = QuadraticBezier::new(
            Point3::new(0.0, 0.0, 3.5),
            Point3::new(0.0, -6.0, 2.0),
            Point3::new(0.0, 0.0, -3.5),
        );
        let ts = curve.spaced_parameters(50);
        assert_eq!(ts.len(), 51);
        assert!(ts[0].abs() < 1e-6);
        assert!((ts[50] - 1.0).abs() < 1e-4);
        assert!(ts.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_curve_geometry_is_deterministic() {
        let d = dims();
        let curve = QuadraticBezier::from_points(&d.default_curve_points());
        let first = curve_geometry(&d, &curve);
        let second = curve_geometry(&d, &curve);
        assert_eq!(first, second);
        assert_eq!(first.positions.len(), 51 * 13);
    }

    #[test]
    fn test_planar_curve_keeps_profile_in_front_of_wall() {
        let d = dims();
        let curve = QuadraticBezier::from_points(&d.default_curve_points());
        let mesh = curve_geometry(&d, &curve);
        let (min, max) = mesh.bounds().unwrap();
        assert!(min.x > -1e-4 && max.x < 1.5 + 1e-4);
    }

    #[test]
    fn test_merge_vertices_welds_shared_corners() {
        let a = cuboid(Vector3::new(0.5, 0.5, 0.5), Vector3::zeros());
        let b = cuboid(Vector3::new(0.5, 0.5, 0.5), Vector3::zeros());
        let merged = MeshData::merge([a, b]);
        assert_eq!(merged.positions.len(), 16);
        let welded = merged.merge_vertices(MERGE_TOLERANCE);
        assert_eq!(welded.positions.len(), 8);
        assert_eq!(welded.triangle_count(), 24);
    }

    #[test]
    fn test_windmill_blades_are_crossed() {
        let [first, second] = windmill_geometry(&dims());
        let (_, max_first) = first.bounds().unwrap();
        let (_, max_second) = second.bounds().unwrap();
        assert!((max_first.z - 2.0).abs() < 1e-5);
        assert!((max_second.y - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_uv_sphere_radius() {
        let sphere = uv_sphere(0.7, 16, 12);
        assert!(sphere.positions.iter().all(|p| (p.coords.norm() - 0.7).abs() < 1e-5));
        assert!(!sphere.is_empty());
    }
}
