//! Physics simulation using `Rapier3D` with a fixed timestep.

use std::fmt;

use parking_lot::Mutex;
use rapier3d::na::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use rapier3d::prelude::*;

/// Fixed timestep for physics simulation (60Hz).
pub const PHYSICS_DT: f32 = 1.0 / 60.0;

/// Default gravity vector (downward, ten times earth for a snappy run).
pub fn default_gravity() -> Vector3<f32> {
    Vector3::new(0.0, -98.1, 0.0)
}

/// Contact notifications gathered during one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContactEvent {
    Started(ColliderHandle, ColliderHandle),
    Stopped(ColliderHandle, ColliderHandle),
    Force {
        collider1: ColliderHandle,
        collider2: ColliderHandle,
        magnitude: f32,
    },
}

/// Event handler that buffers contact events until they are drained.
#[derive(Default)]
struct EventBuffer {
    events: Mutex<Vec<ContactEvent>>,
}

impl EventHandler for EventBuffer {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        event: CollisionEvent,
        _contact_pair: Option<&ContactPair>,
    ) {
        let event = match event {
            CollisionEvent::Started(a, b, _) => ContactEvent::Started(a, b),
            CollisionEvent::Stopped(a, b, _) => ContactEvent::Stopped(a, b),
        };
        self.events.lock().push(event);
    }

    fn handle_contact_force_event(
        &self,
        _dt: Real,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        contact_pair: &ContactPair,
        total_force_magnitude: Real,
    ) {
        self.events.lock().push(ContactEvent::Force {
            collider1: contact_pair.collider1,
            collider2: contact_pair.collider2,
            magnitude: total_force_magnitude,
        });
    }
}

/// A colored line segment produced by the debug renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DebugLine {
    pub start: Point3<f32>,
    pub end: Point3<f32>,
    /// Hue, saturation, lightness, alpha.
    pub hsla: [f32; 4],
}

#[derive(Default)]
struct LineCollector {
    lines: Vec<DebugLine>,
}

impl DebugRenderBackend for LineCollector {
    fn draw_line(
        &mut self,
        _object: DebugRenderObject,
        a: Point<Real>,
        b: Point<Real>,
        color: DebugColor,
    ) {
        self.lines.push(DebugLine {
            start: a,
            end: b,
            hsla: color,
        });
    }
}

/// Physics world containing all `Rapier3D` components.
pub struct PhysicsWorld {
    pub rigid_body_set: RigidBodySet,
    pub collider_set: ColliderSet,
    pub integration_parameters: IntegrationParameters,
    pub physics_pipeline: PhysicsPipeline,
    pub island_manager: IslandManager,
    pub broad_phase: DefaultBroadPhase,
    pub narrow_phase: NarrowPhase,
    pub impulse_joint_set: ImpulseJointSet,
    pub multibody_joint_set: MultibodyJointSet,
    pub ccd_solver: CCDSolver,
    pub gravity: Vector3<f32>,
    pub frame: u64,
    events: EventBuffer,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PhysicsWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhysicsWorld")
            .field("frame", &self.frame)
            .field("rigid_body_count", &self.rigid_body_set.len())
            .field("collider_count", &self.collider_set.len())
            .field("gravity", &self.gravity)
            .finish_non_exhaustive()
    }
}

impl PhysicsWorld {
    /// Creates a new physics world with default settings.
    pub fn new() -> Self {
        Self::with_gravity(default_gravity(), PHYSICS_DT)
    }

    /// Creates a new physics world with custom gravity and timestep.
    pub fn with_gravity(gravity: Vector3<f32>, dt: f32) -> Self {
        let integration_parameters = IntegrationParameters {
            dt,
            ..Default::default()
        };

        Self {
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            integration_parameters,
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            gravity,
            frame: 0,
            events: EventBuffer::default(),
        }
    }

    /// Advances the physics simulation by one fixed timestep.
    pub fn step(&mut self) {
        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            &(),
            &self.events,
        );
        self.frame += 1;
    }

    /// Advances the physics simulation by multiple steps.
    pub fn step_n(&mut self, n: u32) {
        for _ in 0..n {
            self.step();
        }
    }

    /// Takes every contact event recorded since the last drain.
    pub fn drain_contact_events(&mut self) -> Vec<ContactEvent> {
        std::mem::take(&mut *self.events.events.lock())
    }

    /// Adds a rigid body to the world and returns its handle.
    pub fn add_rigid_body(&mut self, rigid_body: RigidBody) -> RigidBodyHandle {
        self.rigid_body_set.insert(rigid_body)
    }

    /// Adds a collider attached to a rigid body.
    pub fn add_collider(&mut self, collider: Collider, parent: RigidBodyHandle) -> ColliderHandle {
        self.collider_set
            .insert_with_parent(collider, parent, &mut self.rigid_body_set)
    }

    /// Removes a single collider, waking its parent body.
    pub fn remove_collider(&mut self, handle: ColliderHandle) {
        self.collider_set.remove(
            handle,
            &mut self.island_manager,
            &mut self.rigid_body_set,
            true,
        );
    }

    /// Removes a rigid body and its attached colliders and joints.
    pub fn remove_rigid_body(&mut self, handle: RigidBodyHandle) {
        self.rigid_body_set.remove(
            handle,
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true,
        );
    }

    /// Joins two bodies with an impulse joint.
    pub fn add_joint(
        &mut self,
        body1: RigidBodyHandle,
        body2: RigidBodyHandle,
        joint: impl Into<GenericJoint>,
    ) -> ImpulseJointHandle {
        self.impulse_joint_set.insert(body1, body2, joint, true)
    }

    /// Gets an immutable reference to a rigid body.
    pub fn get_rigid_body(&self, handle: RigidBodyHandle) -> Option<&RigidBody> {
        self.rigid_body_set.get(handle)
    }

    /// Gets a mutable reference to a rigid body.
    pub fn get_rigid_body_mut(&mut self, handle: RigidBodyHandle) -> Option<&mut RigidBody> {
        self.rigid_body_set.get_mut(handle)
    }

    /// Returns the pose of a body as translation and rotation.
    pub fn body_pose(&self, handle: RigidBodyHandle) -> Option<(Vector3<f32>, UnitQuaternion<f32>)> {
        self.get_rigid_body(handle)
            .map(|body| (*body.translation(), *body.rotation()))
    }

    /// Teleports a body, waking it up.
    pub fn set_body_pose(
        &mut self,
        handle: RigidBodyHandle,
        translation: Vector3<f32>,
        rotation: UnitQuaternion<f32>,
    ) {
        if let Some(body) = self.get_rigid_body_mut(handle) {
            body.set_position(
                Isometry3::from_parts(Translation3::from(translation), rotation),
                true,
            );
        }
    }

    /// Collects wireframe lines for every body, collider and joint.
    pub fn debug_lines(&self) -> Vec<DebugLine> {
        let mut pipeline = DebugRenderPipeline::new(
            DebugRenderStyle::default(),
            DebugRenderMode::default(),
        );
        let mut collector = LineCollector::default();
        pipeline.render(
            &mut collector,
            &self.rigid_body_set,
            &self.collider_set,
            &self.impulse_joint_set,
            &self.multibody_joint_set,
            &self.narrow_phase,
        );
        collector.lines
    }

    /// Returns the current simulation frame number.
    pub fn current_frame(&self) -> u64 {
        self.frame
    }

    /// Resets the physics world to its initial state.
    pub fn reset(&mut self) {
        *self = Self::with_gravity(self.gravity, self.integration_parameters.dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapier3d::na::vector;

    #[test]
    fn test_physics_world_creation() {
        let world = PhysicsWorld::new();
        assert_eq!(world.frame, 0);
        assert_eq!(world.integration_parameters.dt, PHYSICS_DT);
    }

    #[test]
    fn test_deterministic_simulation() {
        let mut world1 = PhysicsWorld::new();
        let mut world2 = PhysicsWorld::new();

        let body = RigidBodyBuilder::dynamic()
            .translation(vector![0.9, 10.0, 3.0])
            .build();
        let collider = ColliderBuilder::ball(0.7).restitution(0.1).build();

        let handle1 = world1.add_rigid_body(body.clone());
        world1.add_collider(collider.clone(), handle1);
        let handle2 = world2.add_rigid_body(body);
        world2.add_collider(collider, handle2);

        world1.step_n(100);
        world2.step_n(100);

        let pos1 = world1.get_rigid_body(handle1).unwrap().translation();
        let pos2 = world2.get_rigid_body(handle2).unwrap().translation();
        assert_eq!(pos1, pos2);
        assert!(pos1.y < 10.0);
    }

    #[test]
    fn test_step_advances_frame() {
        let mut world = PhysicsWorld::new();
        assert_eq!(world.current_frame(), 0);

        world.step();
        assert_eq!(world.current_frame(), 1);

        world.step_n(10);
        assert_eq!(world.current_frame(), 11);
    }

    #[test]
    fn test_add_and_remove_body() {
        let mut world = PhysicsWorld::new();

        let body = RigidBodyBuilder::fixed().build();
        let handle = world.add_rigid_body(body);
        let collider = world.add_collider(ColliderBuilder::cuboid(1.0, 1.0, 1.0).build(), handle);
        assert!(world.get_rigid_body(handle).is_some());

        world.remove_collider(collider);
        assert!(world.collider_set.get(collider).is_none());

        world.remove_rigid_body(handle);
        assert!(world.get_rigid_body(handle).is_none());
    }

    #[test]
    fn test_set_body_pose() {
        let mut world = PhysicsWorld::new();
        let handle = world.add_rigid_body(RigidBodyBuilder::fixed().build());
        let rotation = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 0.5);
        world.set_body_pose(handle, vector![1.0, 2.0, 3.0], rotation);

        let (translation, actual) = world.body_pose(handle).unwrap();
        assert_eq!(translation, vector![1.0, 2.0, 3.0]);
        assert!(actual.angle_to(&rotation) < 1e-6);
    }

    #[test]
    fn test_contact_events_are_buffered() {
        let mut world = PhysicsWorld::new();
        let ground = world.add_rigid_body(RigidBodyBuilder::fixed().build());
        world.add_collider(ColliderBuilder::cuboid(10.0, 0.5, 10.0).build(), ground);

        let ball = world.add_rigid_body(
            RigidBodyBuilder::dynamic()
                .translation(vector![0.0, 3.0, 0.0])
                .build(),
        );
        world.add_collider(
            ColliderBuilder::ball(0.5)
                .active_events(ActiveEvents::COLLISION_EVENTS)
                .build(),
            ball,
        );

        world.step_n(60);
        let events = world.drain_contact_events();
        assert!(events.iter().any(|e| matches!(e, ContactEvent::Started(..))));
        assert!(world.drain_contact_events().is_empty());
    }

    #[test]
    fn test_debug_lines_cover_colliders() {
        let mut world = PhysicsWorld::new();
        let handle = world.add_rigid_body(RigidBodyBuilder::fixed().build());
        world.add_collider(ColliderBuilder::cuboid(1.0, 1.0, 1.0).build(), handle);
        assert!(!world.debug_lines().is_empty());
    }
}
