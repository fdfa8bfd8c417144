//! Track pieces: factories, collider layouts and per-kind operations.

pub mod assets;
pub mod catalog;

use std::sync::Arc;

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rapier3d::na::{Point3, UnitQuaternion, Vector3};
use rapier3d::prelude::*;

use crate::config::TrackDimensions;
use crate::entity::{MarbleId, PhysicsEntity, Stage, TrackId};
use crate::error::{MarblieError, Result};
use crate::geometry::{
    MERGE_TOLERANCE, MeshData, QuadraticBezier, curve_geometry, straight_geometry,
    windmill_geometry,
};
use crate::marble::MarbleManager;
use crate::scene::{Light, LightId, LightKind, Material, NodeRole, Transform};
use crate::tween::{Completion, Tween, TweenProperty, TweenValue};
use crate::util::{EulerXyz, hsl_to_rgb};

pub use assets::{AssetLibrary, GltfModelSource, ModelSource, ProceduralModelSource};
pub use catalog::{
    ColliderSource, HandleSet, RANDOM_KINDS, TRACK_RULES, TrackKind, TrackRules, TransformRule,
};

/// Base colors (hue, saturation, lightness) pieces pick from.
const PALETTE: [[f32; 3]; 4] = [
    [0.583, 0.553, 0.369],
    [0.132, 1.0, 0.839],
    [0.076, 1.0, 0.631],
    [0.535, 0.48, 0.69],
];
const TUBE_COLOR: [f32; 4] = [0.886, 0.906, 0.945, 0.4];
const LOGO_BACK_COLOR: [f32; 3] = [0.024, 0.2, 0.353];
const GLOW_COLOR: [f32; 3] = [0.847, 0.847, 1.0];

/// Intensity of an illuminated piece's light when switched on.
pub const LIGHT_ON_INTENSITY: f32 = 5.0;
/// Emissive intensity of an illuminated piece's glowing parts when switched on.
pub const EMISSIVE_ON_INTENSITY: f32 = 0.8;

/// Light and glowing parts of a Logo or LightCube.
#[derive(Debug, Clone, PartialEq)]
pub struct Illumination {
    pub light: LightId,
    pub emissive_parts: Vec<usize>,
    pub on: bool,
}

/// Kind-specific state.
#[derive(Debug, Clone)]
pub enum TrackVariant {
    Straight {
        /// Committed scale; the node's scale diverges only while dragging or animating.
        scale: Vector3<f32>,
    },
    Curve {
        /// Control points `[right, middle, left]` relative to the track origin.
        points: [Point3<f32>; 3],
        curve: QuadraticBezier,
    },
    Windmill {
        blade: RigidBodyHandle,
        joint: ImpulseJointHandle,
    },
    Illuminated(Illumination),
    Plain,
}

/// Everything a factory needs besides the kind.
pub struct TrackContext<'a> {
    pub stage: &'a mut Stage,
    pub assets: &'a AssetLibrary,
    pub dims: &'a TrackDimensions,
    pub rng: &'a mut ChaCha8Rng,
}

/// Optional construction parameters.
#[derive(Debug, Clone, Default)]
pub struct TrackOptions {
    /// Identifier to reuse, e.g. from a saved layout.
    pub id: Option<TrackId>,
    /// Curve control points; ignored by other kinds.
    pub curve_points: Option<[Point3<f32>; 3]>,
}

/// A placed track piece.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: TrackId,
    pub kind: TrackKind,
    pub entity: PhysicsEntity,
    colliders: Vec<ColliderHandle>,
    dims: TrackDimensions,
    /// Authored rotation; the quaternion on the node is derived from it.
    euler: EulerXyz,
    pub variant: TrackVariant,
}

impl Track {
    /// Builds a piece of `kind` at the origin.
    pub fn spawn(ctx: &mut TrackContext<'_>, kind: TrackKind, options: TrackOptions) -> Result<Self> {
        let id = options.id.unwrap_or_else(TrackId::generate);
        let mut track = match kind {
            TrackKind::Straight => Self::spawn_straight(ctx, id),
            TrackKind::Curve => {
                let points = options
                    .curve_points
                    .unwrap_or_else(|| ctx.dims.default_curve_points());
                Self::spawn_curve(ctx, id, points)
            }
            TrackKind::Windmill => Self::spawn_windmill(ctx, id),
            _ => Self::spawn_model(ctx, kind, id)?,
        };
        tracing::debug!("[marblie] spawned {} {}", track.kind, track.id);
        Ok(track)
    }

    /// Builds a piece of a kind drawn uniformly from [`RANDOM_KINDS`].
    pub fn spawn_random(ctx: &mut TrackContext<'_>, options: TrackOptions) -> Result<Self> {
        let kind = RANDOM_KINDS[ctx.rng.random_range(0..RANDOM_KINDS.len())];
        Self::spawn(ctx, kind, options)
    }

    fn base(ctx: &mut TrackContext<'_>, kind: TrackKind, id: TrackId) -> Self {
        let entity = PhysicsEntity::spawn(
            ctx.stage,
            NodeRole::Track(id.clone()),
            RigidBodyBuilder::fixed().build(),
        );
        Self {
            id,
            kind,
            entity,
            colliders: Vec::new(),
            dims: ctx.dims.clone(),
            euler: EulerXyz::default(),
            variant: TrackVariant::Plain,
        }
    }

    fn spawn_straight(ctx: &mut TrackContext<'_>, id: TrackId) -> Self {
        let mut track = Self::base(ctx, TrackKind::Straight, id);
        let material = palette_material(ctx.rng);
        ctx.stage
            .scene
            .add_part(track.entity.node, Arc::new(straight_geometry(ctx.dims)), material);
        track.variant = TrackVariant::Straight {
            scale: Vector3::repeat(1.0),
        };
        track.attach_colliders(ctx.stage, cuboid_colliders(ctx.dims, ctx.dims.depth));
        track
    }

    fn spawn_curve(ctx: &mut TrackContext<'_>, id: TrackId, points: [Point3<f32>; 3]) -> Self {
        let mut track = Self::base(ctx, TrackKind::Curve, id);
        let curve = QuadraticBezier::from_points(&points);
        let material = palette_material(ctx.rng);
        ctx.stage.scene.add_part(
            track.entity.node,
            Arc::new(curve_geometry(ctx.dims, &curve)),
            material,
        );
        track.variant = TrackVariant::Curve { points, curve };
        track.rebuild_curve_collider(ctx.stage);
        track
    }

    fn spawn_windmill(ctx: &mut TrackContext<'_>, id: TrackId) -> Self {
        let mut track = Self::base(ctx, TrackKind::Windmill, id);
        let material = palette_material(ctx.rng);
        for blade in windmill_geometry(ctx.dims) {
            ctx.stage
                .scene
                .add_part(track.entity.node, Arc::new(blade), material);
        }

        let blade = ctx.stage.physics.add_rigid_body(
            RigidBodyBuilder::dynamic()
                .angular_damping(1.0)
                .enabled_rotations(true, false, false)
                .build(),
        );
        let joint = ctx.stage.physics.add_joint(
            blade,
            track.entity.body,
            RevoluteJointBuilder::new(Vector3::x_axis()),
        );

        let depth = ctx.dims.windmill_depth;
        let crossed = Vector3::x() * std::f32::consts::FRAC_PI_2;
        let builders = cuboid_builders(ctx.dims, depth).into_iter().chain(
            cuboid_builders(ctx.dims, depth)
                .into_iter()
                .map(|b| b.rotation(crossed)),
        );
        for builder in builders {
            let handle = ctx.stage.physics.add_collider(builder.build(), blade);
            track.colliders.push(handle);
        }

        let torque = f32::from(ctx.rng.random_range(-10_i8..=10));
        if let Some(body) = ctx.stage.physics.get_rigid_body_mut(blade) {
            body.apply_torque_impulse(Vector3::new(torque, 0.0, 0.0), true);
        }

        track.variant = TrackVariant::Windmill { blade, joint };
        track
    }

    fn spawn_model(ctx: &mut TrackContext<'_>, kind: TrackKind, id: TrackId) -> Result<Self> {
        let rules = kind.rules();
        let assets = ctx.assets;
        // Resolve assets before touching the stage so a failure leaves nothing behind.
        let models = rules
            .models
            .iter()
            .map(|name| assets.model(name))
            .collect::<Result<Vec<_>>>()?;

        let mut track = Self::base(ctx, kind, id);
        let node = track.entity.node;
        let base_material = match kind {
            TrackKind::Tube => Material {
                color: TUBE_COLOR,
                roughness: 0.0,
                ..Material::default()
            },
            TrackKind::Logo => Material::colored(LOGO_BACK_COLOR),
            TrackKind::LightCube => Material {
                color: [LOGO_BACK_COLOR[0], LOGO_BACK_COLOR[1], LOGO_BACK_COLOR[2], 0.0],
                ..Material::default()
            },
            _ => palette_material(ctx.rng),
        };
        let glow_material = Material {
            color: [1.0, 1.0, 1.0, if kind == TrackKind::LightCube { 0.0 } else { 1.0 }],
            emissive: GLOW_COLOR,
            emissive_intensity: 0.0,
            ..Material::default()
        };

        let mut emissive_parts = Vec::new();
        let mut colliders = Vec::new();
        for (model_index, model) in models.iter().enumerate() {
            let glowing = kind.is_illuminated() && model_index == 1;
            let material = if glowing { glow_material } else { base_material };
            for mesh in &model.meshes {
                if let Some(part) = ctx.stage.scene.add_part(node, Arc::clone(mesh), material) {
                    if glowing {
                        emissive_parts.push(part);
                    }
                }
            }
            for welded in &model.welded {
                let collider = match rules.collider {
                    ColliderSource::ModelConvexHull => convex_collider(welded),
                    _ => trimesh_collider(welded),
                };
                match collider {
                    Ok(builder) => colliders.push(builder.friction(ctx.dims.friction).build()),
                    Err(e) => tracing::warn!("[marblie] {kind}: skipping collider: {e}"),
                }
            }
        }
        track.attach_colliders(ctx.stage, colliders);

        if kind.is_illuminated() {
            let offset = match kind {
                TrackKind::Logo => Vector3::new(0.375, 0.0, 0.0),
                _ => Vector3::new(3.0, 0.0, 0.0),
            };
            let light = ctx.stage.scene.add_light(Light {
                kind: LightKind::Point { range: 10.0 },
                color: GLOW_COLOR,
                intensity: 0.0,
                parent: Some(node),
                offset,
            });
            track.variant = TrackVariant::Illuminated(Illumination {
                light,
                emissive_parts,
                on: false,
            });
        }
        Ok(track)
    }

    fn attach_colliders(&mut self, stage: &mut Stage, colliders: Vec<Collider>) {
        for collider in colliders {
            let handle = stage.physics.add_collider(collider, self.entity.body);
            self.colliders.push(handle);
        }
    }

    fn remove_colliders(&mut self, stage: &mut Stage) {
        for handle in self.colliders.drain(..) {
            stage.physics.remove_collider(handle);
        }
    }

    fn rebuild_curve_collider(&mut self, stage: &mut Stage) {
        self.remove_colliders(stage);
        let Some(mesh) = stage
            .scene
            .node(self.entity.node)
            .and_then(|n| n.parts.first())
            .map(|p| p.mesh.merge_vertices(MERGE_TOLERANCE))
        else {
            return;
        };
        match trimesh_collider(&mesh) {
            Ok(builder) => {
                let collider = builder.friction(self.dims.friction).build();
                self.attach_colliders(stage, vec![collider]);
            }
            Err(e) => tracing::warn!("[marblie] curve {} lost its collider: {e}", self.id),
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn rules(&self) -> &'static TrackRules {
        self.kind.rules()
    }

    pub fn colliders(&self) -> &[ColliderHandle] {
        &self.colliders
    }

    pub fn transform(&self, stage: &Stage) -> Option<Transform> {
        self.entity.transform(stage)
    }

    pub fn position(&self, stage: &Stage) -> Option<Vector3<f32>> {
        self.entity.position(stage)
    }

    /// Rotation as last set through this track, in the angles it was given.
    pub fn rotation(&self) -> EulerXyz {
        self.euler
    }

    /// Committed scale; identity for everything but Straight.
    pub fn scale(&self) -> Vector3<f32> {
        match &self.variant {
            TrackVariant::Straight { scale } => *scale,
            _ => Vector3::repeat(1.0),
        }
    }

    pub fn curve_points(&self) -> Option<&[Point3<f32>; 3]> {
        match &self.variant {
            TrackVariant::Curve { points, .. } => Some(points),
            _ => None,
        }
    }

    pub fn curve(&self) -> Option<&QuadraticBezier> {
        match &self.variant {
            TrackVariant::Curve { curve, .. } => Some(curve),
            _ => None,
        }
    }

    pub fn illumination(&self) -> Option<&Illumination> {
        match &self.variant {
            TrackVariant::Illuminated(illumination) => Some(illumination),
            _ => None,
        }
    }

    /// Bounding radius of the first visual part, before scaling.
    pub fn bounding_radius(&self, stage: &Stage) -> f32 {
        stage
            .scene
            .node(self.entity.node)
            .and_then(|n| n.parts.first())
            .map_or(0.0, |p| p.bounding_sphere().radius)
    }

    // ------------------------------------------------------------------------
    // Placement
    // ------------------------------------------------------------------------

    pub fn set_position(&self, stage: &mut Stage, position: Vector3<f32>) {
        self.entity.set_position(stage, position);
        if let TrackVariant::Windmill { blade, .. } = &self.variant {
            if let Some(body) = stage.physics.get_rigid_body_mut(*blade) {
                body.set_translation(position, true);
            }
        }
    }

    pub fn set_euler(&mut self, stage: &mut Stage, euler: EulerXyz) {
        self.euler = euler;
        self.entity.set_euler(stage, euler);
    }

    pub fn set_rotation(&mut self, stage: &mut Stage, rotation: UnitQuaternion<f32>) {
        self.euler = EulerXyz::from_quaternion(&rotation);
        self.entity.set_rotation(stage, rotation);
    }

    /// Adds `delta` to each stored angle.
    pub fn add_rotation(&mut self, stage: &mut Stage, delta: EulerXyz) {
        let e = self.euler;
        self.set_euler(stage, EulerXyz::new(e.x + delta.x, e.y + delta.y, e.z + delta.z));
    }

    /// Rotates the visual node only, leaving the body for [`Track::commit`].
    pub fn preview_euler(&mut self, stage: &mut Stage, euler: EulerXyz) {
        self.euler = euler;
        if let Some(node) = stage.scene.node_mut(self.entity.node) {
            node.transform.rotation = euler.to_quaternion();
        }
    }

    /// Applies a committed scale. Only Straight pieces scale; their colliders
    /// are rebuilt for the new depth.
    pub fn set_scale(&mut self, stage: &mut Stage, scale: Vector3<f32>) {
        let TrackVariant::Straight { scale: current } = &mut self.variant else {
            tracing::debug!("[marblie] {} ignores scaling", self.kind);
            return;
        };
        if scale.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            tracing::warn!("[marblie] rejected scale {scale:?} for {}", self.id);
            return;
        }
        *current = scale;
        self.entity.set_scale(stage, scale);
        self.remove_colliders(stage);
        let colliders = cuboid_colliders(&self.dims, self.dims.depth * scale.z);
        self.attach_colliders(stage, colliders);
    }

    /// Replaces the curve control points and regenerates the visual mesh.
    ///
    /// The collider follows on [`Track::commit`].
    pub fn reshape(&mut self, stage: &mut Stage, new_points: [Point3<f32>; 3]) {
        let TrackVariant::Curve { points, curve } = &mut self.variant else {
            return;
        };
        *points = new_points;
        *curve = QuadraticBezier::from_points(points);
        let mesh = curve_geometry(&self.dims, curve);
        stage.scene.replace_mesh(self.entity.node, 0, Arc::new(mesh));
    }

    /// Writes the visual state into physics after an interactive edit.
    pub fn commit(&mut self, stage: &mut Stage) {
        self.entity.sync_visual_to_physics(stage);
        match self.kind {
            TrackKind::Straight => {
                let scale = stage
                    .scene
                    .transform(self.entity.node)
                    .map_or_else(|| self.scale(), |t| t.scale);
                self.set_scale(stage, scale);
            }
            TrackKind::Curve => self.rebuild_curve_collider(stage),
            TrackKind::Windmill => {
                if let (TrackVariant::Windmill { blade, .. }, Some(position)) =
                    (&self.variant, self.entity.position(stage))
                {
                    if let Some(body) = stage.physics.get_rigid_body_mut(*blade) {
                        body.set_translation(position, true);
                    }
                }
            }
            _ => {}
        }
        tracing::debug!("[marblie] committed {} {}", self.kind, self.id);
    }

    /// Per-tick pull of simulated state onto the visual.
    pub fn sync_from_physics(&self, stage: &mut Stage) {
        if let TrackVariant::Windmill { blade, .. } = &self.variant {
            if let Some((_, rotation)) = stage.physics.body_pose(*blade) {
                if let Some(node) = stage.scene.node_mut(self.entity.node) {
                    node.transform.rotation = rotation;
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Kind operations
    // ------------------------------------------------------------------------

    /// Drops a marble above a Starter piece.
    pub fn place_marble(
        &self,
        stage: &mut Stage,
        marbles: &mut MarbleManager,
        spawn_x: f32,
        spawn_height: f32,
    ) -> Option<MarbleId> {
        if self.kind != TrackKind::Starter {
            tracing::warn!("[marblie] {} cannot place marbles", self.kind);
            return None;
        }
        let origin = self.position(stage)?;
        let at = Vector3::new(spawn_x, origin.y + spawn_height, origin.z);
        Some(marbles.spawn(stage, at))
    }

    pub fn light_on(&mut self, stage: &mut Stage, duration: f32) {
        self.switch_light(stage, true, duration);
    }

    pub fn light_off(&mut self, stage: &mut Stage, duration: f32) {
        self.switch_light(stage, false, duration);
    }

    fn switch_light(&mut self, stage: &mut Stage, on: bool, duration: f32) {
        let node = self.entity.node;
        let TrackVariant::Illuminated(illumination) = &mut self.variant else {
            return;
        };
        illumination.on = on;
        let (light, emissive) = if on {
            (LIGHT_ON_INTENSITY, EMISSIVE_ON_INTENSITY)
        } else {
            (0.0, 0.0)
        };
        stage.tweens.start(
            &mut stage.scene,
            Tween::new(
                TweenProperty::LightIntensity(illumination.light),
                TweenValue::Scalar(light),
                duration,
            ),
        );
        for &part in &illumination.emissive_parts {
            stage.tweens.start(
                &mut stage.scene,
                Tween::new(
                    TweenProperty::EmissiveIntensity { node, part },
                    TweenValue::Scalar(emissive),
                    duration,
                ),
            );
        }
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    pub fn animate_in(&self, stage: &mut Stage, duration: f32, delay: f32) {
        self.entity.animate_in(stage, duration, delay);
    }

    /// Starts the shrink animation; the caller must already have removed the
    /// track from its list.
    pub fn begin_dispose(&self, stage: &mut Stage, duration: f32) {
        self.entity
            .begin_dispose(stage, duration, Completion::ReleaseTrack(self.id.clone()));
    }

    /// Removes the node, its light, the bodies and the colliders.
    pub fn release(self, stage: &mut Stage) {
        if let TrackVariant::Windmill { blade, .. } = self.variant {
            stage.physics.remove_rigid_body(blade);
        }
        self.entity.release(stage);
    }
}

// ============================================================================
// Collider layouts
// ============================================================================

/// Floor and side walls of a straight section `depth` long.
pub fn cuboid_colliders(dims: &TrackDimensions, depth: f32) -> Vec<Collider> {
    cuboid_builders(dims, depth)
        .into_iter()
        .map(|b| b.build())
        .collect()
}

fn cuboid_builders(dims: &TrackDimensions, depth: f32) -> Vec<ColliderBuilder> {
    let wall = dims.wall_width();
    let w = dims.width;
    let half_depth = depth / 2.0;
    let side = (w - dims.track_width) / 4.0;
    [
        (
            Vector3::new(w / 2.0 - wall, (dims.height - dims.track_depth * 2.0) / 2.0, half_depth),
            Vector3::new(w / 2.0, 0.0, 0.0),
        ),
        (
            Vector3::new(side, dims.height / 2.0, half_depth),
            Vector3::new(wall / 2.0, 0.0, 0.0),
        ),
        (
            Vector3::new(side, dims.height / 2.0, half_depth),
            Vector3::new(w - wall / 2.0, 0.0, 0.0),
        ),
    ]
    .into_iter()
    .map(|(half, at)| {
        ColliderBuilder::cuboid(half.x, half.y, half.z)
            .translation(at)
            .friction(dims.friction)
    })
    .collect()
}

fn trimesh_collider(mesh: &MeshData) -> Result<ColliderBuilder> {
    ColliderBuilder::trimesh(mesh.positions.clone(), mesh.indices.clone())
        .map_err(|e| MarblieError::Geometry(format!("trimesh: {e:?}")))
}

fn convex_collider(mesh: &MeshData) -> Result<ColliderBuilder> {
    ColliderBuilder::convex_hull(&mesh.positions)
        .ok_or_else(|| MarblieError::Geometry("degenerate convex hull".into()))
}

fn palette_material(rng: &mut ChaCha8Rng) -> Material {
    let [h, s, l] = PALETTE[rng.random_range(0..PALETTE.len())];
    let s = s + rng.random_range(-0.025..0.025);
    let l = l + rng.random_range(-0.025..0.025);
    Material::colored(hsl_to_rgb(h, s, l))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LightPoolConfig, MarbleConfig};
    use crate::track::assets::test_library;

    struct Fixture {
        stage: Stage,
        assets: AssetLibrary,
        dims: TrackDimensions,
        rng: ChaCha8Rng,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                stage: Stage::default(),
                assets: test_library(),
                dims: TrackDimensions::default(),
                rng: ChaCha8Rng::seed_from_u64(42),
            }
        }

        fn spawn(&mut self, kind: TrackKind) -> Track {
            let mut ctx = TrackContext {
                stage: &mut self.stage,
                assets: &self.assets,
                dims: &self.dims,
                rng: &mut self.rng,
            };
            Track::spawn(&mut ctx, kind, TrackOptions::default()).unwrap()
        }
    }

    fn half_extents(stage: &Stage, handle: ColliderHandle) -> Vector3<f32> {
        stage.physics.collider_set[handle]
            .shape()
            .as_cuboid()
            .unwrap()
            .half_extents
    }

    #[test]
    fn test_straight_collider_layout() {
        let mut f = Fixture::new();
        let track = f.spawn(TrackKind::Straight);
        assert_eq!(track.colliders().len(), 3);

        let floor = half_extents(&f.stage, track.colliders()[0]);
        assert!((floor.x - 0.65).abs() < 1e-5);
        assert!((floor.y - 0.15).abs() < 1e-5);
        assert!((floor.z - 5.0).abs() < 1e-5);

        let wall = half_extents(&f.stage, track.colliders()[1]);
        assert!((wall.x - 0.05).abs() < 1e-5);
        assert!((wall.y - 0.35).abs() < 1e-5);
    }

    #[test]
    fn test_straight_scale_rebuilds_colliders() {
        let mut f = Fixture::new();
        let mut track = f.spawn(TrackKind::Straight);
        let before = track.colliders().to_vec();
        track.set_scale(&mut f.stage, Vector3::new(1.0, 1.0, 0.5));

        assert_eq!(track.colliders().len(), 3);
        assert!(before.iter().all(|h| f.stage.physics.collider_set.get(*h).is_none()));
        let floor = half_extents(&f.stage, track.colliders()[0]);
        assert!((floor.z - 2.5).abs() < 1e-5);
        assert_eq!(track.scale().z, 0.5);
    }

    #[test]
    fn test_straight_rejects_non_positive_scale() {
        let mut f = Fixture::new();
        let mut track = f.spawn(TrackKind::Straight);
        track.set_scale(&mut f.stage, Vector3::new(1.0, 1.0, 0.0));
        assert_eq!(track.scale(), Vector3::repeat(1.0));
    }

    #[test]
    fn test_curve_reshape_and_commit() {
        let mut f = Fixture::new();
        let mut track = f.spawn(TrackKind::Curve);
        assert_eq!(track.colliders().len(), 1);
        let old_collider = track.colliders()[0];

        let mut points = *track.curve_points().unwrap();
        points[1] = Point3::new(0.0, -5.0, 0.0);
        track.reshape(&mut f.stage, points);
        let node = f.stage.scene.node(track.entity.node).unwrap();
        assert_eq!(node.parts[0].revision, 1);
        // The collider is untouched until the edit is committed.
        assert_eq!(track.colliders()[0], old_collider);

        track.commit(&mut f.stage);
        assert_eq!(track.colliders().len(), 1);
        assert_ne!(track.colliders()[0], old_collider);
        assert_eq!(track.curve_points().unwrap()[1], Point3::new(0.0, -5.0, 0.0));
    }

    #[test]
    fn test_curve_geometry_is_deterministic() {
        let mut f = Fixture::new();
        let a = f.spawn(TrackKind::Curve);
        let b = f.spawn(TrackKind::Curve);
        let mesh_a = &f.stage.scene.node(a.entity.node).unwrap().parts[0].mesh;
        let mesh_b = &f.stage.scene.node(b.entity.node).unwrap().parts[0].mesh;
        assert_eq!(**mesh_a, **mesh_b);
    }

    #[test]
    fn test_windmill_blade_and_joint() {
        let mut f = Fixture::new();
        let track = f.spawn(TrackKind::Windmill);
        let TrackVariant::Windmill { blade, joint } = track.variant else {
            panic!("not a windmill");
        };
        assert_eq!(track.colliders().len(), 6);
        assert!(f.stage.physics.get_rigid_body(blade).unwrap().is_dynamic());
        assert!(f.stage.physics.impulse_joint_set.get(joint).is_some());
        for handle in track.colliders() {
            assert_eq!(f.stage.physics.collider_set[*handle].parent(), Some(blade));
        }

        track.set_position(&mut f.stage, Vector3::new(0.0, 0.5, 0.0));
        let (blade_pos, _) = f.stage.physics.body_pose(blade).unwrap();
        assert_eq!(blade_pos, Vector3::new(0.0, 0.5, 0.0));

        track.release(&mut f.stage);
        assert!(f.stage.physics.get_rigid_body(blade).is_none());
    }

    #[test]
    fn test_model_kinds_build_colliders() {
        let mut f = Fixture::new();
        for kind in [TrackKind::Funnel, TrackKind::Ring, TrackKind::Tray, TrackKind::Starter] {
            let track = f.spawn(kind);
            assert!(!track.colliders().is_empty(), "{kind}");
            let shape = f.stage.physics.collider_set[track.colliders()[0]].shape();
            assert!(shape.as_trimesh().is_some(), "{kind}");
        }
        let logo = f.spawn(TrackKind::Logo);
        assert_eq!(logo.colliders().len(), 2);
        let shape = f.stage.physics.collider_set[logo.colliders()[0]].shape();
        assert!(shape.as_convex_polyhedron().is_some());
    }

    #[test]
    fn test_random_kind_comes_from_random_set() {
        let mut f = Fixture::new();
        for _ in 0..8 {
            let mut ctx = TrackContext {
                stage: &mut f.stage,
                assets: &f.assets,
                dims: &f.dims,
                rng: &mut f.rng,
            };
            let track = Track::spawn_random(&mut ctx, TrackOptions::default()).unwrap();
            assert!(RANDOM_KINDS.contains(&track.kind));
        }
    }

    #[test]
    fn test_logo_light_on_and_off() {
        let mut f = Fixture::new();
        let mut logo = f.spawn(TrackKind::Logo);
        let illumination = logo.illumination().unwrap().clone();
        assert_eq!(illumination.emissive_parts, vec![1]);

        logo.light_on(&mut f.stage, 1.0);
        f.stage.tweens.advance(&mut f.stage.scene, 1.0);
        assert_eq!(f.stage.scene.light(illumination.light).unwrap().intensity, 5.0);
        let node = f.stage.scene.node(logo.entity.node).unwrap();
        assert_eq!(node.parts[1].material.emissive_intensity, 0.8);
        assert!(logo.illumination().unwrap().on);

        logo.light_off(&mut f.stage, 1.0);
        f.stage.tweens.advance(&mut f.stage.scene, 1.0);
        assert_eq!(f.stage.scene.light(illumination.light).unwrap().intensity, 0.0);
    }

    #[test]
    fn test_starter_places_marble_above_itself() {
        let mut f = Fixture::new();
        let starter = f.spawn(TrackKind::Starter);
        starter.set_position(&mut f.stage, Vector3::new(0.0, 7.51, 6.7));
        let mut marbles = MarbleManager::new(
            &mut f.stage.scene,
            MarbleConfig::default(),
            &LightPoolConfig::default(),
            0.4,
            1,
        );
        let id = starter
            .place_marble(&mut f.stage, &mut marbles, 0.9, 2.5)
            .unwrap();
        let pos = marbles.get(id).unwrap().position(&f.stage).unwrap();
        assert!((pos - Vector3::new(0.9, 10.01, 6.7)).norm() < 1e-5);

        let straight = f.spawn(TrackKind::Straight);
        assert!(straight.place_marble(&mut f.stage, &mut marbles, 0.9, 2.5).is_none());
    }

    #[test]
    fn test_rotation_keeps_authored_angles() {
        let mut f = Fixture::new();
        let mut track = f.spawn(TrackKind::Ring);
        // Y past π/2 does not survive a trip through the quaternion.
        track.set_euler(&mut f.stage, EulerXyz::new(0.0, 2.0, 0.0));
        assert_eq!(track.rotation(), EulerXyz::new(0.0, 2.0, 0.0));
        let rotation = track.transform(&f.stage).unwrap().rotation;
        assert!(rotation.angle_to(&EulerXyz::new(0.0, 2.0, 0.0).to_quaternion()) < 1e-5);

        track.add_rotation(&mut f.stage, EulerXyz::new(4.0, 0.0, 0.0));
        assert_eq!(track.rotation(), EulerXyz::new(4.0, 2.0, 0.0));

        track.preview_euler(&mut f.stage, EulerXyz::new(-1.0, 2.0, 0.0));
        assert_eq!(track.rotation(), EulerXyz::new(-1.0, 2.0, 0.0));
        let body = f.stage.physics.body_pose(track.entity.body).unwrap().1;
        assert!(body.angle_to(&EulerXyz::new(4.0, 2.0, 0.0).to_quaternion()) < 1e-5);
    }

    #[test]
    fn test_release_removes_node_and_light() {
        let mut f = Fixture::new();
        let logo = f.spawn(TrackKind::Logo);
        let light = logo.illumination().unwrap().light;
        let node = logo.entity.node;
        logo.release(&mut f.stage);
        assert!(!f.stage.scene.contains(node));
        assert!(f.stage.scene.light(light).is_none());
    }
}
