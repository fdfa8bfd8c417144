//! Marbles and the pool of lights they can carry.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rapier3d::na::Vector3;
use rapier3d::prelude::*;

use crate::config::{LightPoolConfig, MarbleConfig};
use crate::entity::{MarbleId, PhysicsEntity, Stage};
use crate::geometry::uv_sphere;
use crate::scene::{Light, LightId, LightKind, Material, NodeRole, Scene};
use crate::tween::Completion;
use crate::util::hsl_to_rgb;

/// Hue, saturation and lightness of an unlit marble.
const MARBLE_HSL: [f32; 3] = [0.980, 1.0, 0.527];
const MARBLE_EMISSIVE: [f32; 3] = [1.0, 0.773, 0.239];
const LIT_MARBLE_COLOR: [f32; 3] = [1.0, 0.733, 0.761];
const LIT_MARBLE_EMISSIVE: [f32; 3] = [0.918, 0.835, 0.808];
const POOL_LIGHT_COLOR: [f32; 3] = [1.0, 0.773, 0.239];

// ============================================================================
// Light pool
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct PooledLight {
    id: LightId,
    in_use: bool,
}

/// Fixed set of point lights lent to marbles.
///
/// A new marble borrows a light with probability `probability`; the first
/// free light wins. Busy lights are never taken back, so an exhausted pool
/// simply yields unlit marbles.
#[derive(Debug)]
pub struct LightPool {
    lights: Vec<PooledLight>,
    probability: f64,
    intensity: f32,
}

impl LightPool {
    /// Adds `config.size` dark, unparented lights to the scene.
    pub fn new(scene: &mut Scene, config: &LightPoolConfig) -> Self {
        let lights = (0..config.size)
            .map(|_| PooledLight {
                id: scene.add_light(Light {
                    kind: LightKind::Point {
                        range: config.range,
                    },
                    color: POOL_LIGHT_COLOR,
                    intensity: 0.0,
                    parent: None,
                    offset: Vector3::zeros(),
                }),
                in_use: false,
            })
            .collect();
        Self {
            lights,
            probability: config.probability,
            intensity: config.intensity,
        }
    }

    /// Tries to borrow a light.
    pub fn acquire(&mut self, rng: &mut impl Rng) -> Option<LightId> {
        if !rng.random_bool(self.probability) {
            return None;
        }
        let slot = self.lights.iter_mut().find(|l| !l.in_use)?;
        slot.in_use = true;
        Some(slot.id)
    }

    /// Returns a light to the pool, dark and detached.
    pub fn release(&mut self, scene: &mut Scene, id: LightId) {
        if let Some(slot) = self.lights.iter_mut().find(|l| l.id == id) {
            slot.in_use = false;
        }
        if let Some(light) = scene.light_mut(id) {
            light.parent = None;
            light.intensity = 0.0;
        }
    }

    pub fn is_in_use(&self, id: LightId) -> bool {
        self.lights.iter().any(|l| l.id == id && l.in_use)
    }

    pub fn in_use_count(&self) -> usize {
        self.lights.iter().filter(|l| l.in_use).count()
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    pub fn intensity(&self) -> f32 {
        self.intensity
    }
}

// ============================================================================
// Marbles
// ============================================================================

/// A rolling ball.
#[derive(Debug, Clone)]
pub struct Marble {
    pub id: MarbleId,
    pub entity: PhysicsEntity,
    pub collider: ColliderHandle,
    /// Light borrowed from the pool, if any.
    pub light: Option<LightId>,
}

impl Marble {
    pub fn position(&self, stage: &Stage) -> Option<Vector3<f32>> {
        self.entity.position(stage)
    }
}

/// Owns the active marbles, the ones shrinking away, and the light pool.
#[derive(Debug)]
pub struct MarbleManager {
    marbles: Vec<Marble>,
    disposing: Vec<Marble>,
    pool: LightPool,
    config: MarbleConfig,
    /// Length of the grow and shrink animations.
    animation_duration: f32,
    next_id: u64,
    rng: ChaCha8Rng,
}

impl MarbleManager {
    pub fn new(
        scene: &mut Scene,
        config: MarbleConfig,
        lights: &LightPoolConfig,
        animation_duration: f32,
        seed: u64,
    ) -> Self {
        Self {
            marbles: Vec::new(),
            disposing: Vec::new(),
            pool: LightPool::new(scene, lights),
            config,
            animation_duration,
            next_id: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Spawns a marble at `position`, possibly carrying a pooled light.
    pub fn spawn(&mut self, stage: &mut Stage, position: Vector3<f32>) -> MarbleId {
        let id = MarbleId(self.next_id);
        self.next_id += 1;

        let light = self.pool.acquire(&mut self.rng);
        let material = match light {
            Some(_) => Material {
                emissive: LIT_MARBLE_EMISSIVE,
                emissive_intensity: 1.0,
                ..Material::colored(LIT_MARBLE_COLOR)
            },
            None => {
                let [h, s, l] = MARBLE_HSL;
                let hue = h + self.rng.random_range(-0.01..0.01);
                Material {
                    emissive: MARBLE_EMISSIVE,
                    emissive_intensity: 0.1,
                    ..Material::colored(hsl_to_rgb(hue, s, l))
                }
            }
        };

        let body = RigidBodyBuilder::dynamic().translation(position).build();
        let entity = PhysicsEntity::spawn(stage, NodeRole::Marble(id), body);
        let collider = stage.physics.add_collider(
            ColliderBuilder::ball(self.config.radius)
                .restitution(self.config.restitution)
                .friction(self.config.friction)
                .active_events(ActiveEvents::CONTACT_FORCE_EVENTS)
                .build(),
            entity.body,
        );
        stage
            .scene
            .add_part(entity.node, uv_sphere(self.config.radius, 32, 32).into(), material);

        entity.animate_in(stage, self.animation_duration, 0.0);

        if let Some(light_id) = light {
            if let Some(l) = stage.scene.light_mut(light_id) {
                l.parent = Some(entity.node);
                l.offset = Vector3::zeros();
                l.intensity = self.pool.intensity();
            }
        }

        tracing::debug!(
            "[marblie] marble {} spawned at {position:?} (lit: {})",
            id.0,
            light.is_some()
        );
        self.marbles.push(Marble {
            id,
            entity,
            collider,
            light,
        });
        id
    }

    /// Per-tick update: drops marbles below the floor, syncs the rest.
    ///
    /// Walks the list from the end so removal never skips an entry.
    pub fn update(&mut self, stage: &mut Stage) {
        for index in (0..self.marbles.len()).rev() {
            let marble = &self.marbles[index];
            let below = stage
                .physics
                .body_pose(marble.entity.body)
                .is_some_and(|(t, _)| t.y < self.config.floor_threshold);
            if below {
                let marble = self.marbles.remove(index);
                self.begin_dispose(stage, marble);
            } else {
                marble.entity.sync_physics_to_visual(stage);
            }
        }
    }

    fn begin_dispose(&mut self, stage: &mut Stage, marble: Marble) {
        if let Some(light) = marble.light {
            self.pool.release(&mut stage.scene, light);
        }
        marble.entity.begin_dispose(
            stage,
            self.animation_duration,
            Completion::ReleaseMarble(marble.id),
        );
        tracing::debug!("[marblie] marble {} fell off the run", marble.id.0);
        self.disposing.push(marble);
    }

    /// Releases a marble whose shrink animation finished.
    pub fn complete_dispose(&mut self, stage: &mut Stage, id: MarbleId) {
        if let Some(index) = self.disposing.iter().position(|m| m.id == id) {
            let marble = self.disposing.swap_remove(index);
            marble.entity.release(stage);
        }
    }

    /// Removes every marble immediately.
    pub fn clear(&mut self, stage: &mut Stage) {
        for marble in self.marbles.drain(..).chain(self.disposing.drain(..)) {
            if let Some(light) = marble.light {
                self.pool.release(&mut stage.scene, light);
            }
            marble.entity.release(stage);
        }
    }

    pub fn get(&self, id: MarbleId) -> Option<&Marble> {
        self.marbles.iter().find(|m| m.id == id)
    }

    pub fn get_by_collider(&self, handle: ColliderHandle) -> Option<&Marble> {
        self.marbles.iter().find(|m| m.collider == handle)
    }

    pub fn marbles(&self) -> &[Marble] {
        &self.marbles
    }

    /// Most recently spawned marble still in play.
    pub fn newest(&self) -> Option<&Marble> {
        self.marbles.last()
    }

    pub fn len(&self) -> usize {
        self.marbles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marbles.is_empty()
    }

    pub fn disposing_count(&self) -> usize {
        self.disposing.len()
    }

    pub fn pool(&self) -> &LightPool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lights(probability: f64) -> LightPoolConfig {
        LightPoolConfig {
            probability,
            ..Default::default()
        }
    }

    fn manager(stage: &mut Stage, probability: f64) -> MarbleManager {
        MarbleManager::new(
            &mut stage.scene,
            MarbleConfig::default(),
            &lights(probability),
            0.4,
            7,
        )
    }

    #[test]
    fn test_pool_never_evicts() {
        let mut scene = Scene::new();
        let mut pool = LightPool::new(&mut scene, &lights(1.0));
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let taken: Vec<_> = (0..3).map(|_| pool.acquire(&mut rng).unwrap()).collect();
        assert_eq!(pool.in_use_count(), 3);
        assert!(pool.acquire(&mut rng).is_none());

        pool.release(&mut scene, taken[1]);
        assert_eq!(pool.acquire(&mut rng), Some(taken[1]));
    }

    #[test]
    fn test_pool_probability_zero_never_lends() {
        let mut scene = Scene::new();
        let mut pool = LightPool::new(&mut scene, &lights(0.0));
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!((0..50).all(|_| pool.acquire(&mut rng).is_none()));
    }

    #[test]
    fn test_lit_marble_carries_light() {
        let mut stage = Stage::default();
        let mut marbles = manager(&mut stage, 1.0);
        let id = marbles.spawn(&mut stage, Vector3::new(0.9, 10.0, 6.7));
        let marble = marbles.get(id).unwrap();
        let light = marble.light.unwrap();
        assert_eq!(stage.scene.light(light).unwrap().parent, Some(marble.entity.node));
        assert_eq!(stage.scene.light(light).unwrap().intensity, 1.5);
    }

    #[test]
    fn test_marble_falls_under_gravity() {
        let mut stage = Stage::default();
        let mut marbles = manager(&mut stage, 0.0);
        let id = marbles.spawn(&mut stage, Vector3::new(0.9, 10.0, 0.0));
        stage.physics.step_n(10);
        marbles.update(&mut stage);
        let y = marbles.get(id).unwrap().position(&stage).unwrap().y;
        assert!(y < 10.0);
    }

    #[test]
    fn test_floor_disposal_releases_light() {
        let mut stage = Stage::default();
        let mut marbles = manager(&mut stage, 1.0);
        let id = marbles.spawn(&mut stage, Vector3::new(0.9, 0.0, 0.0));
        let marble = marbles.get(id).unwrap().clone();
        let light = marble.light.unwrap();

        marble.entity.set_position(&mut stage, Vector3::new(0.9, -51.0, 0.0));
        marbles.update(&mut stage);

        assert!(marbles.get(id).is_none());
        assert!(marbles.is_empty());
        assert!(!marbles.pool().is_in_use(light));
        // The light survives its marble.
        assert_eq!(stage.scene.light(light).unwrap().parent, None);

        let done = stage.tweens.advance(&mut stage.scene, 0.5);
        assert_eq!(done, vec![Completion::ReleaseMarble(id)]);
        marbles.complete_dispose(&mut stage, id);
        assert_eq!(marbles.disposing_count(), 0);
        assert!(!stage.scene.contains(marble.entity.node));
        assert!(stage.scene.light(light).is_some());
    }

    #[test]
    fn test_update_removes_several_marbles_in_one_pass() {
        let mut stage = Stage::default();
        let mut marbles = manager(&mut stage, 0.0);
        for i in 0..4 {
            let id = marbles.spawn(&mut stage, Vector3::new(0.9, 0.0, i as f32 * 3.0));
            if i % 2 == 0 {
                let entity = marbles.get(id).unwrap().entity;
                entity.set_position(&mut stage, Vector3::new(0.9, -80.0, 0.0));
            }
        }
        marbles.update(&mut stage);
        assert_eq!(marbles.len(), 2);
        assert_eq!(marbles.disposing_count(), 2);
    }

    #[test]
    fn test_lookup_by_collider() {
        let mut stage = Stage::default();
        let mut marbles = manager(&mut stage, 0.0);
        let id = marbles.spawn(&mut stage, Vector3::zeros());
        let collider = marbles.get(id).unwrap().collider;
        assert_eq!(marbles.get_by_collider(collider).unwrap().id, id);
        assert_eq!(marbles.newest().unwrap().id, id);
    }
}
