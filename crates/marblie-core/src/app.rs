//! Scene orchestrator.
//!
//! [`Marblie`] owns the whole session: the [`AppContext`] (stage, tracks,
//! marbles, assets), the transform controller, the camera and the layout
//! store. The host calls [`Marblie::tick`] once per fixed step and forwards
//! pointer and keyboard input; everything else happens in here.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rapier3d::na::{Point2, Vector3};
use rapier3d::prelude::*;

use crate::camera::{FollowState, OrbitCamera};
use crate::config::MarblieConfig;
use crate::controller::{ControllerEvent, EditContext, InputMode, Pointer, TransformController};
use crate::entity::{MarbleId, PhysicsEntity, Stage, TrackId};
use crate::error::Result;
use crate::geometry::cuboid;
use crate::layout::{KeyValueStore, Layout, TrackRecord};
use crate::marble::MarbleManager;
use crate::physics::{ContactEvent, DebugLine, PhysicsWorld};
use crate::scene::{Light, LightId, LightKind, Material, NodeRole};
use crate::track::{AssetLibrary, Track, TrackContext, TrackKind, TrackOptions};
use crate::tween::{Completion, Tween, TweenProperty, TweenValue};
use crate::util::ScreenRect;

const BACKDROP_COLOR: [f32; 3] = [1.0, 0.973, 0.945];
/// Visible half extents of the backdrop (the collider is far larger).
const BACKDROP_HALF: [f32; 3] = [0.01, 100.0, 50.0];

const DAY_CLEAR: [f32; 3] = [0.816, 0.796, 0.769];
const NIGHT_CLEAR: [f32; 3] = [0.086, 0.082, 0.078];
const NIGHT_COLOR: [f32; 3] = [0.2, 0.2, 0.792];

const AMBIENT_DAY: f32 = 1.0;
const AMBIENT_NIGHT: f32 = 0.03;
const SUN_DAY: f32 = 2.0;
const SUN_DAY_POSITION: [f32; 3] = [100.0, 50.0, 50.0];
const SUN_NIGHT_POSITION: [f32; 3] = [0.0, 0.0, 5.0];
const MOON_INTENSITY: f32 = 0.5;
const MOON_POSITION: [f32; 3] = [0.2, -1.0, 0.05];
/// Fade time of the global lights when switching between day and night.
const SKY_FADE: f32 = 0.5;

// ============================================================================
// Context
// ============================================================================

/// World state shared by every orchestrator operation.
#[derive(Debug)]
pub struct AppContext {
    pub stage: Stage,
    /// Active tracks in creation order.
    pub tracks: Vec<Track>,
    /// Tracks removed from the run that are still shrinking away.
    pub disposing: Vec<Track>,
    pub marbles: MarbleManager,
    pub assets: AssetLibrary,
    pub config: MarblieConfig,
    pub rng: ChaCha8Rng,
}

impl AppContext {
    fn edit(&mut self) -> EditContext<'_> {
        EditContext {
            stage: &mut self.stage,
            tracks: &mut self.tracks,
            disposing: &mut self.disposing,
            dispose_duration: self.config.interaction.dispose_duration,
        }
    }

    fn spawn_track(&mut self, kind: Option<TrackKind>, options: TrackOptions) -> Result<Track> {
        let mut ctx = TrackContext {
            stage: &mut self.stage,
            assets: &self.assets,
            dims: &self.config.track,
            rng: &mut self.rng,
        };
        match kind {
            Some(kind) => Track::spawn(&mut ctx, kind, options),
            None => Track::spawn_random(&mut ctx, options),
        }
    }

    pub fn track(&self, id: &TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == *id)
    }

    /// First Starter piece in the run.
    pub fn starter(&self) -> Option<&Track> {
        self.tracks.iter().find(|t| t.kind == TrackKind::Starter)
    }
}

// ============================================================================
// Toggles and lights
// ============================================================================

/// User-facing switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Toggles {
    pub auto_drop: bool,
    pub follow: bool,
    pub is_day: bool,
    /// Physics debug lines.
    pub debug: bool,
    /// UI overlay visibility; the host draws it.
    pub overlay: bool,
}

impl Default for Toggles {
    fn default() -> Self {
        Self {
            auto_drop: false,
            follow: false,
            is_day: true,
            debug: false,
            overlay: true,
        }
    }
}

/// Global lights of the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneLights {
    pub ambient: LightId,
    /// Directional light that sets at night.
    pub sun: LightId,
    /// Dim blue directional light from below.
    pub moon: LightId,
}

impl SceneLights {
    fn install(stage: &mut Stage) -> Self {
        let scene = &mut stage.scene;
        let ambient = scene.add_light(Light {
            kind: LightKind::Ambient,
            color: [1.0; 3],
            intensity: AMBIENT_DAY,
            parent: None,
            offset: Vector3::zeros(),
        });
        let sun = scene.add_light(Light {
            kind: LightKind::Directional,
            color: [1.0; 3],
            intensity: SUN_DAY,
            parent: None,
            offset: Vector3::from(SUN_DAY_POSITION),
        });
        let moon = scene.add_light(Light {
            kind: LightKind::Directional,
            color: NIGHT_COLOR,
            intensity: MOON_INTENSITY,
            parent: None,
            offset: Vector3::from(MOON_POSITION),
        });
        Self { ambient, sun, moon }
    }
}

/// Keyboard shortcuts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    DropMarble,
    ToggleDebug,
    ToggleOverlay,
}

impl Shortcut {
    /// `M`, `D` and `H`, case-insensitive.
    pub fn from_key(key: char) -> Option<Self> {
        match key.to_ascii_lowercase() {
            'm' => Some(Self::DropMarble),
            'd' => Some(Self::ToggleDebug),
            'h' => Some(Self::ToggleOverlay),
            _ => None,
        }
    }
}

/// Contact force reported for a marble during the last tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Impact {
    pub marble: MarbleId,
    pub magnitude: f32,
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct Marblie {
    ctx: AppContext,
    controller: TransformController,
    camera: OrbitCamera,
    follow: FollowState,
    store: Box<dyn KeyValueStore>,
    toggles: Toggles,
    lights: SceneLights,
    backdrop: PhysicsEntity,
    auto_drop_elapsed: f32,
    /// Last pointer position while the pointer orbits the camera.
    orbit: Option<Point2<f32>>,
    impacts: Vec<Impact>,
    /// Controller events already persisted, kept for the host to observe.
    edits: Vec<ControllerEvent>,
    dropped: u64,
}

impl std::fmt::Debug for Marblie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Marblie")
            .field("tracks", &self.ctx.tracks.len())
            .field("marbles", &self.ctx.marbles.len())
            .field("controller", self.controller.state())
            .field("toggles", &self.toggles)
            .finish_non_exhaustive()
    }
}

impl Marblie {
    /// Builds the scene from the stored layout (or the default one) and
    /// places the first marble.
    pub fn new(
        config: MarblieConfig,
        assets: AssetLibrary,
        store: Box<dyn KeyValueStore>,
    ) -> Result<Self> {
        config.validate()?;
        let mut rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::seed_from_u64(rand::random()),
        };

        let mut stage = Stage::new(PhysicsWorld::with_gravity(
            config.physics.gravity(),
            config.physics.timestep,
        ));
        let backdrop = spawn_backdrop(&mut stage, &config);
        let lights = SceneLights::install(&mut stage);
        let marbles = MarbleManager::new(
            &mut stage.scene,
            config.marble.clone(),
            &config.lights,
            config.interaction.dispose_duration,
            rng.random(),
        );

        let controller = TransformController::new(&config.interaction);
        let camera = OrbitCamera::new(&config.camera);

        let mut app = Self {
            ctx: AppContext {
                stage,
                tracks: Vec::new(),
                disposing: Vec::new(),
                marbles,
                assets,
                config,
                rng,
            },
            controller,
            camera,
            follow: FollowState::default(),
            store,
            toggles: Toggles::default(),
            lights,
            backdrop,
            auto_drop_elapsed: 0.0,
            orbit: None,
            impacts: Vec::new(),
            edits: Vec::new(),
            dropped: 0,
        };

        let layout = Layout::load(app.store.as_ref());
        app.load_layout(&layout);
        app.drop_marble();
        tracing::info!(
            "[marblie] scene ready with {} tracks",
            app.ctx.tracks.len()
        );
        Ok(app)
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    pub fn stage(&self) -> &Stage {
        &self.ctx.stage
    }

    pub fn tracks(&self) -> &[Track] {
        &self.ctx.tracks
    }

    pub fn marbles(&self) -> &MarbleManager {
        &self.ctx.marbles
    }

    pub fn controller(&self) -> &TransformController {
        &self.controller
    }

    pub fn camera(&self) -> &OrbitCamera {
        &self.camera
    }

    pub fn toggles(&self) -> Toggles {
        self.toggles
    }

    pub fn lights(&self) -> SceneLights {
        self.lights
    }

    pub fn backdrop(&self) -> PhysicsEntity {
        self.backdrop
    }

    /// Background color for the current time of day.
    pub fn clear_color(&self) -> [f32; 3] {
        if self.toggles.is_day { DAY_CLEAR } else { NIGHT_CLEAR }
    }

    /// Marbles placed since the session started.
    pub fn marbles_dropped(&self) -> u64 {
        self.dropped
    }

    /// Marble contact forces collected during the last tick.
    pub fn impacts(&self) -> &[Impact] {
        &self.impacts
    }

    /// Collider outlines, empty unless debug drawing is on.
    pub fn debug_lines(&self) -> Vec<DebugLine> {
        if self.toggles.debug {
            self.ctx.stage.physics.debug_lines()
        } else {
            Vec::new()
        }
    }

    // ------------------------------------------------------------------------
    // Main loop
    // ------------------------------------------------------------------------

    /// Advances the session by one fixed step.
    pub fn tick(&mut self) {
        let dt = self.ctx.config.physics.timestep;

        self.ctx.stage.physics.step();
        self.ctx.marbles.update(&mut self.ctx.stage);
        for track in &self.ctx.tracks {
            track.sync_from_physics(&mut self.ctx.stage);
        }
        self.collect_impacts();

        let completions = self.ctx.stage.tweens.advance(&mut self.ctx.stage.scene, dt);
        for completion in completions {
            self.complete(completion);
        }

        if self.toggles.auto_drop {
            self.auto_drop_elapsed += dt;
            if self.auto_drop_elapsed >= self.ctx.config.interaction.auto_drop_interval {
                self.auto_drop_elapsed = 0.0;
                self.drop_marble();
            }
        }

        if self.toggles.follow {
            if let Some(position) = self.newest_marble_position() {
                let delta = self.follow.advance(position);
                self.camera.translate(delta);
            }
        }

        self.controller.update_handles(&mut self.ctx.edit());
        self.process_controller_events();
    }

    fn collect_impacts(&mut self) {
        self.impacts.clear();
        for event in self.ctx.stage.physics.drain_contact_events() {
            let ContactEvent::Force {
                collider1,
                collider2,
                magnitude,
            } = event
            else {
                continue;
            };
            let marbles = &self.ctx.marbles;
            let marble = marbles
                .get_by_collider(collider1)
                .or_else(|| marbles.get_by_collider(collider2));
            if let Some(marble) = marble {
                tracing::trace!("[marblie] marble {} impact {magnitude}", marble.id.0);
                self.impacts.push(Impact {
                    marble: marble.id,
                    magnitude,
                });
            }
        }
    }

    fn complete(&mut self, completion: Completion) {
        match completion {
            Completion::ReleaseTrack(id) => {
                if let Some(index) = self.ctx.disposing.iter().position(|t| t.id == id) {
                    let track = self.ctx.disposing.swap_remove(index);
                    track.release(&mut self.ctx.stage);
                    tracing::debug!("[marblie] released track {id}");
                }
            }
            Completion::ReleaseMarble(id) => {
                self.ctx.marbles.complete_dispose(&mut self.ctx.stage, id);
            }
        }
    }

    fn process_controller_events(&mut self) {
        let events = self.controller.drain_events();
        if events.is_empty() {
            return;
        }
        for event in &events {
            match event {
                ControllerEvent::Edited(id) => tracing::debug!("[marblie] edited {id}"),
                ControllerEvent::Deleted(id) => tracing::debug!("[marblie] deleted {id}"),
            }
        }
        self.save_layout();
        self.edits.extend(events);
    }

    /// Takes the edit and delete events handled since the last call.
    pub fn drain_edits(&mut self) -> Vec<ControllerEvent> {
        std::mem::take(&mut self.edits)
    }

    fn newest_marble_position(&self) -> Option<Vector3<f32>> {
        self.ctx
            .marbles
            .newest()
            .and_then(|m| m.position(&self.ctx.stage))
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    fn load_layout(&mut self, layout: &Layout) {
        for record in &layout.records {
            let delay = self
                .ctx
                .rng
                .random_range(0.0..=self.ctx.config.interaction.max_appear_delay);
            if let Err(e) = self.place_record(record, delay) {
                tracing::warn!("[marblie] skipped {} record: {e}", record.kind);
            }
        }
    }

    fn place_record(&mut self, record: &TrackRecord, delay: f32) -> Result<()> {
        let mut track = self.ctx.spawn_track(
            Some(record.kind),
            TrackOptions {
                id: record.id.clone(),
                curve_points: record.curve_points,
            },
        )?;
        let stage = &mut self.ctx.stage;
        track.set_position(stage, record.position);
        track.set_euler(stage, record.rotation);
        if let Some(scale) = record.scale {
            track.set_scale(stage, scale);
        }
        track.commit(stage);
        track.animate_in(stage, self.ctx.config.interaction.appear_duration, delay);
        if !self.toggles.is_day {
            track.light_on(stage, self.ctx.config.interaction.light_fade_duration);
        }
        self.ctx.tracks.push(track);
        Ok(())
    }

    /// Writes every active track to the store. Failures are logged.
    pub fn save_layout(&self) {
        let layout = Layout::capture(&self.ctx.stage, &self.ctx.tracks);
        match layout.save(self.store.as_ref()) {
            Ok(()) => tracing::debug!("[marblie] saved {} tracks", layout.len()),
            Err(e) => tracing::warn!("[marblie] layout not saved: {e}"),
        }
    }

    // ------------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------------

    /// Adds a piece at the last pointer position on the reference plane and
    /// starts dragging it.
    pub fn add_track(&mut self, kind: TrackKind) -> Result<TrackId> {
        self.add(Some(kind))
    }

    /// Adds a piece of a random decorative kind.
    pub fn add_random_track(&mut self) -> Result<TrackId> {
        self.add(None)
    }

    fn add(&mut self, kind: Option<TrackKind>) -> Result<TrackId> {
        let mut track = self.ctx.spawn_track(kind, TrackOptions::default())?;
        let at = self
            .controller
            .plane_hit()
            .map_or_else(Vector3::zeros, |p| p.coords);
        let stage = &mut self.ctx.stage;
        track.set_position(stage, at);
        track.animate_in(stage, self.ctx.config.interaction.appear_duration, 0.0);
        if !self.toggles.is_day {
            track.light_on(stage, self.ctx.config.interaction.light_fade_duration);
        }
        let id = track.id.clone();
        tracing::info!("[marblie] added {} {id}", track.kind);
        self.ctx.tracks.push(track);
        self.controller.begin_body_drag(&mut self.ctx.edit(), &id);
        Ok(id)
    }

    /// Drops a marble from the first Starter piece.
    pub fn drop_marble(&mut self) -> Option<MarbleId> {
        let starter = self.ctx.tracks.iter().find(|t| t.kind == TrackKind::Starter);
        let Some(starter) = starter else {
            tracing::warn!("[marblie] no starter piece to drop a marble from");
            return None;
        };
        let config = &self.ctx.config.marble;
        let id = starter.place_marble(
            &mut self.ctx.stage,
            &mut self.ctx.marbles,
            config.spawn_x,
            config.spawn_height,
        )?;
        self.dropped += 1;
        Some(id)
    }

    pub fn toggle_auto_drop(&mut self) {
        self.toggles.auto_drop = !self.toggles.auto_drop;
        self.auto_drop_elapsed = 0.0;
    }

    pub fn toggle_follow(&mut self) {
        self.toggles.follow = !self.toggles.follow;
        if self.toggles.follow {
            let position = self.newest_marble_position();
            self.follow.reset(position);
        }
    }

    pub fn toggle_debug(&mut self) {
        self.toggles.debug = !self.toggles.debug;
    }

    pub fn toggle_overlay(&mut self) {
        self.toggles.overlay = !self.toggles.overlay;
    }

    /// Switches between day and night, fading the global lights and the
    /// illuminated pieces.
    pub fn toggle_day_night(&mut self) {
        let is_day = !self.toggles.is_day;
        self.toggles.is_day = is_day;

        let (ambient, sun, sun_position) = if is_day {
            (AMBIENT_DAY, SUN_DAY, SUN_DAY_POSITION)
        } else {
            (AMBIENT_NIGHT, 0.0, SUN_NIGHT_POSITION)
        };
        let stage = &mut self.ctx.stage;
        let lights = self.lights;
        for (property, value) in [
            (TweenProperty::LightIntensity(lights.ambient), TweenValue::Scalar(ambient)),
            (TweenProperty::LightIntensity(lights.sun), TweenValue::Scalar(sun)),
            (
                TweenProperty::LightOffset(lights.sun),
                TweenValue::Vector(Vector3::from(sun_position)),
            ),
        ] {
            stage
                .tweens
                .start(&mut stage.scene, Tween::new(property, value, SKY_FADE));
        }

        let fade = self.ctx.config.interaction.light_fade_duration;
        for track in self.ctx.tracks.iter_mut().filter(|t| t.kind.is_illuminated()) {
            if is_day {
                track.light_off(stage, fade);
            } else {
                track.light_on(stage, fade);
            }
        }
        tracing::info!("[marblie] switched to {}", if is_day { "day" } else { "night" });
    }

    pub fn shortcut(&mut self, shortcut: Shortcut) {
        match shortcut {
            Shortcut::DropMarble => {
                self.drop_marble();
            }
            Shortcut::ToggleDebug => self.toggle_debug(),
            Shortcut::ToggleOverlay => self.toggle_overlay(),
        }
    }

    pub fn key_pressed(&mut self, key: char) {
        if let Some(shortcut) = Shortcut::from_key(key) {
            self.shortcut(shortcut);
        }
    }

    // ------------------------------------------------------------------------
    // Input
    // ------------------------------------------------------------------------

    pub fn set_viewport(&mut self, width: f32, height: f32) {
        self.camera.set_viewport(width, height);
    }

    pub fn set_input_mode(&mut self, mode: InputMode) {
        self.controller.set_input_mode(mode);
    }

    pub fn set_delete_zone(&mut self, zone: Option<ScreenRect>) {
        self.controller.set_delete_zone(zone);
    }

    pub fn set_blockers(&mut self, blockers: Vec<ScreenRect>) {
        self.controller.set_blockers(blockers);
    }

    fn pointer(&self, screen: Point2<f32>) -> Pointer {
        Pointer::new(screen, self.camera.screen_ray(screen))
    }

    /// Presses on a piece or handle to edit it; anywhere else orbits the camera.
    pub fn pointer_down(&mut self, screen: Point2<f32>) {
        let pointer = self.pointer(screen);
        self.controller.pointer_down(&mut self.ctx.edit(), &pointer);
        let editing = self.controller.state().is_dragging();
        self.orbit = (!editing && !self.controller.is_blocked(&screen)).then_some(screen);
    }

    pub fn pointer_move(&mut self, screen: Point2<f32>) {
        if let Some(last) = self.orbit {
            let delta = screen - last;
            self.camera.orbit(delta.x, delta.y);
            self.orbit = Some(screen);
            return;
        }
        let pointer = self.pointer(screen);
        self.controller.pointer_move(&mut self.ctx.edit(), &pointer);
    }

    pub fn pointer_up(&mut self, screen: Point2<f32>) {
        if self.orbit.take().is_some() {
            return;
        }
        let pointer = self.pointer(screen);
        self.controller.pointer_up(&mut self.ctx.edit(), &pointer);
        self.process_controller_events();
    }

    /// The pointer left the canvas; stops orbiting.
    pub fn pointer_leave(&mut self) {
        self.orbit = None;
    }

    /// Wheel zoom; positive steps move away.
    pub fn scroll(&mut self, steps: f32) {
        self.camera.zoom(1.1_f32.powf(steps));
    }
}

fn spawn_backdrop(stage: &mut Stage, config: &MarblieConfig) -> PhysicsEntity {
    let entity = PhysicsEntity::spawn(stage, NodeRole::Backdrop, RigidBodyBuilder::fixed().build());
    let [hx, hy, hz] = config.physics.wall_half_extents;
    stage.physics.add_collider(
        ColliderBuilder::cuboid(hx, hy, hz)
            .translation(Vector3::from(config.physics.wall_position))
            .build(),
        entity.body,
    );
    let half = Vector3::from(BACKDROP_HALF);
    stage.scene.add_part(
        entity.node,
        cuboid(half, Vector3::new(-half.x, 0.0, 0.0)).into(),
        Material {
            roughness: 0.9,
            ..Material::colored(BACKDROP_COLOR)
        },
    );
    entity
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapier3d::na::Point3;

    use crate::layout::MemoryStore;
    use crate::track::assets::test_library;
    use crate::util::EulerXyz;

    fn config() -> MarblieConfig {
        MarblieConfig {
            seed: Some(11),
            ..Default::default()
        }
    }

    fn app_with(store: &MemoryStore) -> Marblie {
        Marblie::new(config(), test_library(), Box::new(store.clone())).unwrap()
    }

    fn ticks(app: &mut Marblie, n: usize) {
        for _ in 0..n {
            app.tick();
        }
    }

    #[test]
    fn test_default_layout_with_first_marble() {
        let store = MemoryStore::new();
        let app = app_with(&store);
        assert_eq!(app.tracks().len(), 9);
        assert_eq!(app.marbles().len(), 1);
        assert_eq!(app.marbles_dropped(), 1);
        assert!(store.get(crate::layout::STORAGE_KEY).unwrap().is_none());
    }

    #[test]
    fn test_edit_persists_and_reloads() {
        let store = MemoryStore::new();
        let mut app = app_with(&store);
        ticks(&mut app, 60);

        let id = app.add_track(TrackKind::Funnel).unwrap();
        app.pointer_up(Point2::new(640.0, 360.0));
        assert_eq!(app.tracks().len(), 10);

        let saved = Layout::load(&store);
        assert_eq!(saved.len(), 10);
        assert_eq!(saved.records[9].id.as_ref(), Some(&id));

        let reloaded = app_with(&store);
        assert_eq!(reloaded.tracks().len(), 10);
        assert_eq!(reloaded.tracks()[9].id, id);
        assert_eq!(reloaded.tracks()[9].kind, TrackKind::Funnel);
    }

    #[test]
    fn test_saved_layout_reloads_every_field() {
        let record = |kind, id: &str, position| {
            let mut record = TrackRecord::new(kind, position);
            record.id = Some(TrackId::from(id));
            record
        };
        let mut straight = record(TrackKind::Straight, "straight", Vector3::new(0.0, 1.25, -3.5))
            .rotated(EulerXyz::new(-0.7, 0.0, 0.0));
        straight.scale = Some(Vector3::new(1.0, 1.0, 1.7));
        let layout = Layout {
            records: vec![
                record(TrackKind::Starter, "starter", Vector3::new(0.0, 7.51, 6.7)),
                record(TrackKind::Ring, "ring-y", Vector3::new(0.0, 2.0, 4.0))
                    .rotated(EulerXyz::new(0.0, 2.0, 0.0)),
                record(TrackKind::Ring, "ring-x", Vector3::new(0.0, -1.0, 1.5))
                    .rotated(EulerXyz::new(4.0, 0.0, 0.0)),
                straight,
                record(TrackKind::Curve, "curve", Vector3::new(0.0, -4.0, -8.0))
                    .rotated(EulerXyz::new(0.3, 0.0, 0.0))
                    .with_curve_points([
                        Point3::new(0.0, 0.5, 2.5),
                        Point3::new(0.0, -2.0, 0.25),
                        Point3::new(0.0, 1.0, -4.0),
                    ]),
            ],
        };
        let store = MemoryStore::new();
        layout.save(&store).unwrap();

        let app = app_with(&store);
        assert_eq!(app.tracks().len(), 5);
        app.save_layout();
        let saved = Layout::load(&store);
        for (saved, original) in saved.records.iter().zip(&layout.records) {
            assert_eq!(saved.kind, original.kind);
            assert_eq!(saved.id, original.id);
            assert_eq!(saved.position, original.position);
            assert_eq!(saved.rotation, original.rotation);
            assert_eq!(saved.scale, original.scale);
            assert_eq!(saved.curve_points, original.curve_points);
        }
        assert_eq!(saved, layout);

        // A second round trip is stable too.
        let reloaded = app_with(&store);
        let rotations: Vec<_> = reloaded.tracks().iter().map(Track::rotation).collect();
        let expected: Vec<_> = layout.records.iter().map(|r| r.rotation).collect();
        assert_eq!(rotations, expected);
    }

    #[test]
    fn test_delete_zone_saves_and_releases() {
        let store = MemoryStore::new();
        let mut app = app_with(&store);
        app.set_delete_zone(Some(ScreenRect::new(0.0, 0.0, 100.0, 100.0)));

        app.add_track(TrackKind::Straight).unwrap();
        app.pointer_up(Point2::new(50.0, 50.0));
        assert_eq!(app.tracks().len(), 9);
        assert_eq!(app.context().disposing.len(), 1);
        assert_eq!(Layout::load(&store).len(), 9);

        ticks(&mut app, 60);
        assert!(app.context().disposing.is_empty());
    }

    #[test]
    fn test_auto_drop_every_interval() {
        let mut app = app_with(&MemoryStore::new());
        app.toggle_auto_drop();
        ticks(&mut app, 200);
        assert_eq!(app.marbles_dropped(), 2);
    }

    #[test]
    fn test_night_lights_illuminated_pieces() {
        let mut app = app_with(&MemoryStore::new());
        app.toggle_day_night();
        ticks(&mut app, 90);

        let stage = app.stage();
        let logo = app.tracks().iter().find(|t| t.kind == TrackKind::Logo).unwrap();
        let light = logo.illumination().unwrap().light;
        assert!((stage.scene.light(light).unwrap().intensity - 5.0).abs() < 1e-4);
        let ambient = stage.scene.light(app.lights().ambient).unwrap();
        assert!((ambient.intensity - AMBIENT_NIGHT).abs() < 1e-4);
        assert_eq!(app.clear_color(), NIGHT_CLEAR);

        app.toggle_day_night();
        ticks(&mut app, 90);
        let stage = app.stage();
        assert!(stage.scene.light(light).unwrap().intensity.abs() < 1e-4);
        let sun = stage.scene.light(app.lights().sun).unwrap();
        assert!((sun.offset - Vector3::from(SUN_DAY_POSITION)).norm() < 1e-3);
    }

    #[test]
    fn test_added_piece_lights_up_at_night() {
        let mut app = app_with(&MemoryStore::new());
        app.toggle_day_night();
        let id = app.add_track(TrackKind::LightCube).unwrap();
        let cube = app.context().track(&id).unwrap();
        assert!(cube.illumination().unwrap().on);
    }

    #[test]
    fn test_shortcuts() {
        let mut app = app_with(&MemoryStore::new());
        app.key_pressed('M');
        assert_eq!(app.marbles_dropped(), 2);

        assert!(app.debug_lines().is_empty());
        app.key_pressed('d');
        assert!(!app.debug_lines().is_empty());

        app.key_pressed('h');
        assert!(!app.toggles().overlay);
        app.key_pressed('x');
        assert!(!app.toggles().overlay);
    }

    #[test]
    fn test_empty_press_orbits_camera() {
        let mut app = app_with(&MemoryStore::new());
        let before = app.camera().position;
        app.pointer_down(Point2::new(5.0, 5.0));
        assert!(app.controller().attached().is_none());
        app.pointer_move(Point2::new(105.0, 5.0));
        app.pointer_up(Point2::new(105.0, 5.0));
        assert!((app.camera().position - before).norm() > 1.0);
    }

    #[test]
    fn test_follow_tracks_newest_marble() {
        let mut app = app_with(&MemoryStore::new());
        app.toggle_follow();
        let target = app.camera().target;
        ticks(&mut app, 10);
        assert!(app.camera().target.y < target.y);
    }

    #[test]
    fn test_marble_contacts_reported() {
        let mut app = app_with(&MemoryStore::new());
        let mut seen = false;
        for _ in 0..120 {
            app.tick();
            seen |= !app.impacts().is_empty();
        }
        assert!(seen);
    }
}
