//! Physics-backed entities: a scene node coupled to a rigid body.
//!
//! The body is authoritative. `set_*` operations write the body and then copy
//! its pose onto the node, so both agree exactly afterwards. While a drag is
//! in progress only the node moves; [`PhysicsEntity::sync_visual_to_physics`]
//! commits it.

use std::fmt;

use rapier3d::na::{UnitQuaternion, Vector3};
use rapier3d::prelude::{RigidBody, RigidBodyHandle};
use serde::{Deserialize, Serialize};

use crate::physics::PhysicsWorld;
use crate::scene::{NodeId, NodeRole, Scene, Transform};
use crate::tween::{Completion, EasingType, Tween, TweenProperty, TweenValue, Tweens};
use crate::util::EulerXyz;

/// Unique identifier of a track piece.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    /// Creates a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TrackId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TrackId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a marble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarbleId(pub u64);

/// The collaborators every entity operation needs: scene, physics and tweens.
#[derive(Debug, Default)]
pub struct Stage {
    pub scene: Scene,
    pub physics: PhysicsWorld,
    pub tweens: Tweens,
}

impl Stage {
    pub fn new(physics: PhysicsWorld) -> Self {
        Self {
            scene: Scene::new(),
            physics,
            tweens: Tweens::new(),
        }
    }
}

/// A scene node whose pose mirrors a rigid body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysicsEntity {
    pub node: NodeId,
    pub body: RigidBodyHandle,
}

impl PhysicsEntity {
    /// Inserts `body` and a node placed at the body's pose.
    pub fn spawn(stage: &mut Stage, role: NodeRole, body: RigidBody) -> Self {
        let transform = Transform {
            translation: *body.translation(),
            rotation: *body.rotation(),
            ..Transform::default()
        };
        let body = stage.physics.add_rigid_body(body);
        let node = stage.scene.add_node(role, transform);
        Self { node, body }
    }

    /// Visual position.
    pub fn position(&self, stage: &Stage) -> Option<Vector3<f32>> {
        stage.scene.transform(self.node).map(|t| t.translation)
    }

    pub fn transform(&self, stage: &Stage) -> Option<Transform> {
        stage.scene.transform(self.node)
    }

    pub fn set_position(&self, stage: &mut Stage, position: Vector3<f32>) {
        if let Some(body) = stage.physics.get_rigid_body_mut(self.body) {
            body.set_translation(position, true);
        }
        self.sync_physics_to_visual(stage);
    }

    pub fn add_position(&self, stage: &mut Stage, delta: Vector3<f32>) {
        if let Some(body) = stage.physics.get_rigid_body_mut(self.body) {
            let next = body.translation() + delta;
            body.set_translation(next, true);
        }
        self.sync_physics_to_visual(stage);
    }

    pub fn set_rotation(&self, stage: &mut Stage, rotation: UnitQuaternion<f32>) {
        if let Some(body) = stage.physics.get_rigid_body_mut(self.body) {
            body.set_rotation(rotation, true);
        }
        self.sync_physics_to_visual(stage);
    }

    pub fn set_euler(&self, stage: &mut Stage, euler: EulerXyz) {
        self.set_rotation(stage, euler.to_quaternion());
    }

    /// Composes `delta` onto the current rotation in local space.
    pub fn add_rotation(&self, stage: &mut Stage, delta: EulerXyz) {
        if let Some(body) = stage.physics.get_rigid_body_mut(self.body) {
            let next = body.rotation() * delta.to_quaternion();
            body.set_rotation(next, true);
        }
        self.sync_physics_to_visual(stage);
    }

    /// Scales the visual node; colliders are rebuilt by the owning track.
    pub fn set_scale(&self, stage: &mut Stage, scale: Vector3<f32>) {
        stage.scene.set_scale(self.node, scale);
    }

    /// Copies the body pose onto the node.
    pub fn sync_physics_to_visual(&self, stage: &mut Stage) {
        if let Some((translation, rotation)) = stage.physics.body_pose(self.body) {
            if let Some(node) = stage.scene.node_mut(self.node) {
                node.transform.translation = translation;
                node.transform.rotation = rotation;
            }
        }
    }

    /// Commits the node pose into the body.
    pub fn sync_visual_to_physics(&self, stage: &mut Stage) {
        if let Some(transform) = stage.scene.transform(self.node) {
            stage
                .physics
                .set_body_pose(self.body, transform.translation, transform.rotation);
        }
    }

    /// Grows the node from nothing to its current scale.
    pub fn animate_in(&self, stage: &mut Stage, duration: f32, delay: f32) {
        let Some(target) = stage.scene.transform(self.node).map(|t| t.scale) else {
            return;
        };
        stage.tweens.start(
            &mut stage.scene,
            Tween::new(TweenProperty::NodeScale(self.node), TweenValue::Vector(target), duration)
                .from_value(TweenValue::Vector(Vector3::zeros()))
                .delay(delay)
                .easing(EasingType::back_out()),
        );
    }

    /// First disposal step: shrink the node and schedule `completion`.
    ///
    /// The caller must already have removed the entity from its collection.
    pub fn begin_dispose(&self, stage: &mut Stage, duration: f32, completion: Completion) {
        stage.tweens.cancel_node(self.node);
        stage.tweens.start(
            &mut stage.scene,
            Tween::new(
                TweenProperty::NodeScale(self.node),
                TweenValue::Vector(Vector3::zeros()),
                duration,
            )
            .easing(EasingType::ExpoOut)
            .on_complete(completion),
        );
    }

    /// Second disposal step: removes the node, its lights and the body.
    pub fn release(self, stage: &mut Stage) {
        stage.tweens.cancel_node(self.node);
        stage.scene.remove_node(self.node);
        stage.physics.remove_rigid_body(self.body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapier3d::prelude::RigidBodyBuilder;
    use std::f32::consts::FRAC_PI_4;

    fn spawn_fixed(stage: &mut Stage) -> PhysicsEntity {
        PhysicsEntity::spawn(stage, NodeRole::Backdrop, RigidBodyBuilder::fixed().build())
    }

    #[test]
    fn test_set_position_agrees_with_body() {
        let mut stage = Stage::default();
        let entity = spawn_fixed(&mut stage);
        let p = Vector3::new(0.0, -7.0, 5.0);
        entity.set_position(&mut stage, p);
        entity.sync_physics_to_visual(&mut stage);

        let (body_pos, _) = stage.physics.body_pose(entity.body).unwrap();
        assert!((body_pos - p).norm() < 1e-6);
        assert!((entity.position(&stage).unwrap() - p).norm() < 1e-6);
    }

    #[test]
    fn test_set_euler_agrees_with_body() {
        let mut stage = Stage::default();
        let entity = spawn_fixed(&mut stage);
        entity.set_euler(&mut stage, EulerXyz::about_x(FRAC_PI_4));

        let (_, body_rot) = stage.physics.body_pose(entity.body).unwrap();
        let node_rot = entity.transform(&stage).unwrap().rotation;
        assert!(body_rot.angle_to(&node_rot) < 1e-6);
        assert!((EulerXyz::from_quaternion(&node_rot).x - FRAC_PI_4).abs() < 1e-5);
    }

    #[test]
    fn test_add_rotation_composes() {
        let mut stage = Stage::default();
        let entity = spawn_fixed(&mut stage);
        entity.add_rotation(&mut stage, EulerXyz::about_x(FRAC_PI_4));
        entity.add_rotation(&mut stage, EulerXyz::about_x(FRAC_PI_4));
        let rotation = entity.transform(&stage).unwrap().rotation;
        assert!((EulerXyz::from_quaternion(&rotation).x - 2.0 * FRAC_PI_4).abs() < 1e-5);
    }

    #[test]
    fn test_visual_edit_commits_on_sync() {
        let mut stage = Stage::default();
        let entity = spawn_fixed(&mut stage);
        stage.scene.set_translation(entity.node, Vector3::new(0.0, 3.0, 1.0));
        assert_eq!(stage.physics.body_pose(entity.body).unwrap().0, Vector3::zeros());

        entity.sync_visual_to_physics(&mut stage);
        assert_eq!(
            stage.physics.body_pose(entity.body).unwrap().0,
            Vector3::new(0.0, 3.0, 1.0)
        );
    }

    #[test]
    fn test_dispose_is_two_step() {
        let mut stage = Stage::default();
        let entity = spawn_fixed(&mut stage);
        entity.begin_dispose(&mut stage, 0.4, Completion::ReleaseMarble(MarbleId(1)));

        let done = stage.tweens.advance(&mut stage.scene, 0.2);
        assert!(done.is_empty());
        assert!(stage.scene.contains(entity.node));

        let done = stage.tweens.advance(&mut stage.scene, 0.3);
        assert_eq!(done, vec![Completion::ReleaseMarble(MarbleId(1))]);
        entity.release(&mut stage);
        assert!(!stage.scene.contains(entity.node));
        assert!(stage.physics.get_rigid_body(entity.body).is_none());
    }

    #[test]
    fn test_track_id_display_and_generate() {
        let id = TrackId::from("1700000000000");
        assert_eq!(id.to_string(), "1700000000000");
        assert_ne!(TrackId::generate(), TrackId::generate());
    }
}
