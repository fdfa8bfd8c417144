//! Perspective orbit camera.
//!
//! The camera orbits `target` at a bounded distance and angle, and can shift
//! both by a delta to follow a moving marble.

use std::f32::consts::PI;

use rapier3d::na::{Isometry3, Point2, Point3, Vector3};
use rapier3d::parry::query::Ray;

use crate::config::CameraConfig;

const MIN_DISTANCE: f32 = 10.0;
const MAX_DISTANCE: f32 = 100.0;
/// Keeps the camera off the poles and off the backdrop plane.
const ANGLE_MARGIN: f32 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub struct OrbitCamera {
    pub position: Point3<f32>,
    pub target: Point3<f32>,
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
    /// Viewport size in pixels.
    pub viewport: (f32, f32),
    orbit_speed: f32,
}

impl OrbitCamera {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            position: Point3::from(config.position),
            target: Point3::from(config.target),
            fov_y: config.fov_y_degrees.to_radians(),
            near: config.near,
            far: config.far,
            viewport: (1280.0, 720.0),
            orbit_speed: config.orbit_speed,
        }
    }

    pub fn set_viewport(&mut self, width: f32, height: f32) {
        if width > 0.0 && height > 0.0 {
            self.viewport = (width, height);
        }
    }

    pub fn aspect(&self) -> f32 {
        self.viewport.0 / self.viewport.1
    }

    /// World-to-camera transform, looking from `position` at `target` with +Y up.
    pub fn view(&self) -> Isometry3<f32> {
        Isometry3::look_at_rh(&self.position, &self.target, &Vector3::y())
    }

    /// Ray from the eye through a pixel (origin top-left).
    pub fn screen_ray(&self, screen: Point2<f32>) -> Ray {
        let (width, height) = self.viewport;
        let ndc_x = screen.x / width * 2.0 - 1.0;
        let ndc_y = 1.0 - screen.y / height * 2.0;
        let half_height = (self.fov_y / 2.0).tan();
        let camera_dir = Vector3::new(ndc_x * half_height * self.aspect(), ndc_y * half_height, -1.0);
        let world_dir = self.view().inverse_transform_vector(&camera_dir);
        Ray::new(self.position, world_dir.normalize())
    }

    /// Eye distance and spherical angles around the target: (radius, azimuth, polar).
    ///
    /// Azimuth is measured in the XZ plane from +Z towards +X, polar from +Y.
    fn angles(&self) -> (f32, f32, f32) {
        let offset = self.position - self.target;
        let radius = offset.norm().max(f32::EPSILON);
        let azimuth = offset.x.atan2(offset.z);
        let polar = (offset.y / radius).clamp(-1.0, 1.0).acos();
        (radius, azimuth, polar)
    }

    fn place(&mut self, radius: f32, azimuth: f32, polar: f32) {
        let radius = radius.clamp(MIN_DISTANCE, MAX_DISTANCE);
        let azimuth = azimuth.clamp(ANGLE_MARGIN, PI - ANGLE_MARGIN);
        let polar = polar.clamp(ANGLE_MARGIN, PI - ANGLE_MARGIN);
        let offset = Vector3::new(
            radius * polar.sin() * azimuth.sin(),
            radius * polar.cos(),
            radius * polar.sin() * azimuth.cos(),
        );
        self.position = self.target + offset;
    }

    /// Rotates the eye around the target by a pointer drag in pixels.
    pub fn orbit(&mut self, dx: f32, dy: f32) {
        let (radius, azimuth, polar) = self.angles();
        self.place(
            radius,
            azimuth - dx * self.orbit_speed,
            polar - dy * self.orbit_speed,
        );
    }

    /// Scales the eye distance; factors below one move closer.
    pub fn zoom(&mut self, factor: f32) {
        let (radius, azimuth, polar) = self.angles();
        self.place(radius * factor, azimuth, polar);
    }

    /// Moves eye and target together.
    pub fn translate(&mut self, delta: Vector3<f32>) {
        self.position += delta;
        self.target += delta;
    }

    pub fn distance(&self) -> f32 {
        (self.position - self.target).norm()
    }
}

/// Tracks the newest marble and yields how far the camera should shift.
#[derive(Debug, Clone, Default)]
pub struct FollowState {
    last: Option<Vector3<f32>>,
}

impl FollowState {
    pub fn reset(&mut self, position: Option<Vector3<f32>>) {
        self.last = position;
    }

    /// Delta since the previous sample; the first sample only records.
    pub fn advance(&mut self, position: Vector3<f32>) -> Vector3<f32> {
        let delta = self.last.map_or_else(Vector3::zeros, |last| position - last);
        self.last = Some(position);
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::intersect_plane;

    fn camera() -> OrbitCamera {
        let mut camera = OrbitCamera::new(&CameraConfig::default());
        camera.set_viewport(1000.0, 500.0);
        camera
    }

    #[test]
    fn test_center_ray_hits_target() {
        let camera = camera();
        let ray = camera.screen_ray(Point2::new(500.0, 250.0));
        let hit = intersect_plane(&ray, &Point3::origin(), &Vector3::x()).unwrap();
        assert!((hit - Point3::origin()).norm() < 1e-3);
    }

    #[test]
    fn test_screen_up_is_world_up() {
        let camera = camera();
        let ray = camera.screen_ray(Point2::new(500.0, 0.0));
        let hit = intersect_plane(&ray, &Point3::origin(), &Vector3::x()).unwrap();
        assert!(hit.y > 1.0);
        assert!(hit.z.abs() < 1e-3);
    }

    #[test]
    fn test_orbit_respects_limits() {
        let mut camera = camera();
        camera.orbit(1.0e6, 0.0);
        let (_, azimuth, _) = camera.angles();
        assert!(azimuth >= ANGLE_MARGIN - 1e-4);
        assert!((camera.distance() - 100.0).abs() < 1e-3);

        camera.zoom(0.01);
        assert!((camera.distance() - MIN_DISTANCE).abs() < 1e-3);
    }

    #[test]
    fn test_follow_moves_eye_and_target() {
        let mut camera = camera();
        let mut follow = FollowState::default();
        assert_eq!(follow.advance(Vector3::new(0.0, 10.0, 0.0)), Vector3::zeros());
        let delta = follow.advance(Vector3::new(0.0, 7.0, 1.0));
        camera.translate(delta);
        assert_eq!(camera.target, Point3::new(0.0, -3.0, 1.0));
        assert_eq!(camera.position, Point3::new(100.0, -3.0, 1.0));
    }
}
