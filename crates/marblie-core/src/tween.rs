//! Property animation over scene nodes and lights.
//!
//! Jobs are advanced by the main tick. A job may carry a [`Completion`],
//! which is handed back to the caller on the tick its duration elapses;
//! resource release happens there, never inside the animation itself.

use rapier3d::na::Vector3;
use serde::{Deserialize, Serialize};

use crate::entity::{MarbleId, TrackId};
use crate::scene::{LightId, NodeId, Scene};

/// Easing function applied to the normalized progress of a tween.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EasingType {
    Linear,
    EaseIn,
    #[default]
    EaseOut,
    EaseInOut,
    /// Overshoots the target before settling back.
    BackOut { overshoot: f32 },
    ExpoOut,
}

impl EasingType {
    /// Applies the easing function to a normalized time value (0.0 to 1.0).
    pub fn apply(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::EaseIn => t * t,
            Self::EaseOut => t * (2.0 - t),
            Self::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    -1.0 + (4.0 - 2.0 * t) * t
                }
            }
            Self::BackOut { overshoot } => {
                let u = t - 1.0;
                u * u * ((overshoot + 1.0) * u + overshoot) + 1.0
            }
            Self::ExpoOut => {
                if t >= 1.0 {
                    1.0
                } else {
                    1.0 - 2.0_f32.powf(-10.0 * t)
                }
            }
        }
    }

    pub const fn back_out() -> Self {
        Self::BackOut { overshoot: 1.7 }
    }
}

/// Value animated by a tween.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TweenValue {
    Scalar(f32),
    Vector(Vector3<f32>),
}

impl TweenValue {
    fn lerp(self, to: Self, k: f32) -> Self {
        match (self, to) {
            (Self::Scalar(a), Self::Scalar(b)) => Self::Scalar(a + (b - a) * k),
            (Self::Vector(a), Self::Vector(b)) => Self::Vector(a + (b - a) * k),
            (_, to) => to,
        }
    }
}

/// Scene property driven by a tween.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TweenProperty {
    NodeScale(NodeId),
    LightIntensity(LightId),
    /// Offset of a light from its parent, or its world position when unparented.
    LightOffset(LightId),
    EmissiveIntensity { node: NodeId, part: usize },
}

impl TweenProperty {
    fn read(self, scene: &Scene) -> Option<TweenValue> {
        match self {
            Self::NodeScale(node) => scene.transform(node).map(|t| TweenValue::Vector(t.scale)),
            Self::LightIntensity(light) => scene.light(light).map(|l| TweenValue::Scalar(l.intensity)),
            Self::LightOffset(light) => scene.light(light).map(|l| TweenValue::Vector(l.offset)),
            Self::EmissiveIntensity { node, part } => scene
                .node(node)
                .and_then(|n| n.parts.get(part))
                .map(|p| TweenValue::Scalar(p.material.emissive_intensity)),
        }
    }

    fn write(self, scene: &mut Scene, value: TweenValue) {
        match (self, value) {
            (Self::NodeScale(node), TweenValue::Vector(scale)) => scene.set_scale(node, scale),
            (Self::LightIntensity(light), TweenValue::Scalar(intensity)) => {
                if let Some(light) = scene.light_mut(light) {
                    light.intensity = intensity;
                }
            }
            (Self::LightOffset(light), TweenValue::Vector(offset)) => {
                if let Some(light) = scene.light_mut(light) {
                    light.offset = offset;
                }
            }
            (Self::EmissiveIntensity { node, part }, TweenValue::Scalar(intensity)) => {
                if let Some(material) = scene.material_mut(node, part) {
                    material.emissive_intensity = intensity;
                }
            }
            (property, value) => {
                tracing::warn!("[marblie] tween value {value:?} does not fit {property:?}");
            }
        }
    }

    fn node(self) -> Option<NodeId> {
        match self {
            Self::NodeScale(node) | Self::EmissiveIntensity { node, .. } => Some(node),
            Self::LightIntensity(_) | Self::LightOffset(_) => None,
        }
    }
}

/// Deferred work delivered once a tween finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    ReleaseTrack(TrackId),
    ReleaseMarble(MarbleId),
}

/// A single animation job.
#[derive(Debug, Clone, PartialEq)]
pub struct Tween {
    pub property: TweenProperty,
    /// Start value; `None` starts from the property's value once the delay ends.
    pub from: Option<TweenValue>,
    pub to: TweenValue,
    pub duration: f32,
    pub delay: f32,
    pub easing: EasingType,
    pub completion: Option<Completion>,
    elapsed: f32,
}

impl Tween {
    pub fn new(property: TweenProperty, to: TweenValue, duration: f32) -> Self {
        Self {
            property,
            from: None,
            to,
            duration,
            delay: 0.0,
            easing: EasingType::default(),
            completion: None,
            elapsed: 0.0,
        }
    }

    pub fn from_value(mut self, from: TweenValue) -> Self {
        self.from = Some(from);
        self
    }

    pub fn delay(mut self, delay: f32) -> Self {
        self.delay = delay.max(0.0);
        self
    }

    pub fn easing(mut self, easing: EasingType) -> Self {
        self.easing = easing;
        self
    }

    pub fn on_complete(mut self, completion: Completion) -> Self {
        self.completion = Some(completion);
        self
    }

    fn finished(&self) -> bool {
        self.elapsed >= self.delay + self.duration
    }
}

/// Running tween jobs.
#[derive(Debug, Default)]
pub struct Tweens {
    jobs: Vec<Tween>,
}

impl Tweens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a job, replacing plain jobs already animating the same property.
    ///
    /// An explicit start value is written immediately so delayed jobs hold it.
    pub fn start(&mut self, scene: &mut Scene, tween: Tween) {
        self.jobs
            .retain(|job| job.property != tween.property || job.completion.is_some());
        if let Some(from) = tween.from {
            tween.property.write(scene, from);
        }
        self.jobs.push(tween);
    }

    /// Drops every job touching `node` that has no completion attached.
    pub fn cancel_node(&mut self, node: NodeId) {
        self.jobs
            .retain(|job| job.property.node() != Some(node) || job.completion.is_some());
    }

    /// Jumps every plain job touching `node` to its end value.
    pub fn finish_node(&mut self, scene: &mut Scene, node: NodeId) {
        self.jobs.retain(|job| {
            if job.property.node() != Some(node) || job.completion.is_some() {
                return true;
            }
            job.property.write(scene, job.to);
            false
        });
    }

    pub fn is_animating(&self, property: TweenProperty) -> bool {
        self.jobs.iter().any(|job| job.property == property)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Advances all jobs by `dt` seconds and returns completions that came due.
    pub fn advance(&mut self, scene: &mut Scene, dt: f32) -> Vec<Completion> {
        let mut completions = Vec::new();
        for job in &mut self.jobs {
            job.elapsed += dt;
            if job.elapsed < job.delay {
                continue;
            }
            if job.from.is_none() {
                job.from = job.property.read(scene);
            }
            let Some(from) = job.from else {
                continue;
            };
            let progress = if job.duration > 0.0 {
                (job.elapsed - job.delay) / job.duration
            } else {
                1.0
            };
            let value = from.lerp(job.to, job.easing.apply(progress));
            job.property.write(scene, value);
        }

        self.jobs.retain_mut(|job| {
            if !job.finished() {
                return true;
            }
            if let Some(completion) = job.completion.take() {
                completions.push(completion);
            }
            false
        });
        completions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{NodeRole, Transform};

    #[test]
    fn test_easing_endpoints() {
        for easing in [
            EasingType::Linear,
            EasingType::EaseIn,
            EasingType::EaseOut,
            EasingType::EaseInOut,
            EasingType::back_out(),
            EasingType::ExpoOut,
        ] {
            assert!(easing.apply(0.0).abs() < 1e-6, "{easing:?}");
            assert!((easing.apply(1.0) - 1.0).abs() < 1e-6, "{easing:?}");
        }
    }

    #[test]
    fn test_back_out_overshoots() {
        let easing = EasingType::back_out();
        assert!((0..100).any(|i| easing.apply(i as f32 / 100.0) > 1.0));
    }

    #[test]
    fn test_scale_tween_reaches_target_and_completes() {
        let mut scene = Scene::new();
        let node = scene.add_node(NodeRole::Backdrop, Transform::default());
        let mut tweens = Tweens::new();
        tweens.start(
            &mut scene,
            Tween::new(TweenProperty::NodeScale(node), TweenValue::Vector(Vector3::zeros()), 0.4)
                .easing(EasingType::ExpoOut)
                .on_complete(Completion::ReleaseMarble(MarbleId(3))),
        );

        assert!(tweens.advance(&mut scene, 0.2).is_empty());
        let mid = scene.transform(node).unwrap().scale.x;
        assert!(mid > 0.0 && mid < 1.0);

        let done = tweens.advance(&mut scene, 0.25);
        assert_eq!(done, vec![Completion::ReleaseMarble(MarbleId(3))]);
        assert_eq!(scene.transform(node).unwrap().scale, Vector3::zeros());
        assert!(tweens.is_empty());
    }

    #[test]
    fn test_explicit_from_is_held_during_delay() {
        let mut scene = Scene::new();
        let node = scene.add_node(NodeRole::Backdrop, Transform::default());
        let mut tweens = Tweens::new();
        tweens.start(
            &mut scene,
            Tween::new(TweenProperty::NodeScale(node), TweenValue::Vector(Vector3::repeat(1.0)), 0.4)
                .from_value(TweenValue::Vector(Vector3::zeros()))
                .delay(0.3),
        );
        assert_eq!(scene.transform(node).unwrap().scale, Vector3::zeros());
        tweens.advance(&mut scene, 0.2);
        assert_eq!(scene.transform(node).unwrap().scale, Vector3::zeros());
        tweens.advance(&mut scene, 1.0);
        assert_eq!(scene.transform(node).unwrap().scale, Vector3::repeat(1.0));
    }

    #[test]
    fn test_completion_survives_missing_target() {
        let mut scene = Scene::new();
        let node = scene.add_node(NodeRole::Backdrop, Transform::default());
        let mut tweens = Tweens::new();
        tweens.start(
            &mut scene,
            Tween::new(TweenProperty::NodeScale(node), TweenValue::Vector(Vector3::zeros()), 0.1)
                .from_value(TweenValue::Vector(Vector3::repeat(1.0)))
                .on_complete(Completion::ReleaseTrack(TrackId::from("t"))),
        );
        scene.remove_node(node);
        let done = tweens.advance(&mut scene, 0.2);
        assert_eq!(done, vec![Completion::ReleaseTrack(TrackId::from("t"))]);
    }

    #[test]
    fn test_new_job_replaces_plain_job_on_same_property() {
        let mut scene = Scene::new();
        let node = scene.add_node(NodeRole::Backdrop, Transform::default());
        let property = TweenProperty::NodeScale(node);
        let mut tweens = Tweens::new();
        tweens.start(&mut scene, Tween::new(property, TweenValue::Vector(Vector3::repeat(2.0)), 1.0));
        tweens.start(&mut scene, Tween::new(property, TweenValue::Vector(Vector3::repeat(3.0)), 1.0));
        assert_eq!(tweens.len(), 1);
        tweens.cancel_node(node);
        assert!(!tweens.is_animating(property));
    }
}
