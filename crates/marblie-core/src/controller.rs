//! Interactive transform controller.
//!
//! Attaches to one track at a time, shows drag handles for it, and turns
//! pointer gestures into moves, rotations, rescales, curve reshapes and
//! deletions. Edits touch only the visual node while the pointer is down and
//! are written into physics on release.

use std::sync::Arc;

use rapier3d::na::{Point2, Point3, UnitQuaternion, Vector3};
use rapier3d::parry::query::Ray;

use crate::config::{HandleMetrics, InteractionConfig};
use crate::entity::{Stage, TrackId};
use crate::geometry::{MeshData, uv_sphere};
use crate::scene::{HandleRole, Material, NodeId, NodeRole, Transform};
use crate::track::{HandleSet, Track, TrackKind, TransformRule};
use crate::tween::{EasingType, Tween, TweenProperty, TweenValue};
use crate::util::{EulerXyz, ScreenRect, clamp_length, intersect_plane, reference_axis, signed_angle_3d};

const HANDLE_COLOR: [f32; 3] = [1.0, 1.0, 0.0];
const HANDLE_APPEAR_DURATION: f32 = 0.4;

/// A pointer sample: where it is on screen and the camera ray through it.
#[derive(Debug, Clone, Copy)]
pub struct Pointer {
    /// Position in window pixels, origin top-left.
    pub screen: Point2<f32>,
    pub ray: Ray,
}

impl Pointer {
    pub fn new(screen: Point2<f32>, ray: Ray) -> Self {
        Self { screen, ray }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Mouse,
    Touch,
}

/// Snapshot taken when a handle drag starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformSession {
    pub handle: HandleRole,
    /// Handle position relative to the track at drag start.
    pub start_vector: Vector3<f32>,
    pub start_rotation: EulerXyz,
    pub start_scale: Vector3<f32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum ControllerState {
    #[default]
    Idle,
    Attached {
        track: TrackId,
    },
    BodyDrag {
        track: TrackId,
        /// Plane hit minus track position when the drag began.
        offset: Vector3<f32>,
    },
    HandleDrag {
        track: TrackId,
        session: TransformSession,
    },
}

impl ControllerState {
    pub fn track(&self) -> Option<&TrackId> {
        match self {
            Self::Idle => None,
            Self::Attached { track } | Self::BodyDrag { track, .. } | Self::HandleDrag { track, .. } => {
                Some(track)
            }
        }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self, Self::BodyDrag { .. } | Self::HandleDrag { .. })
    }
}

/// Result of checking the attached track against the active list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentStatus {
    Detached,
    Attached(TrackId),
    /// The attached track disappeared from the list; the controller detached.
    Lost(TrackId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    /// A track was moved, rotated, rescaled or reshaped and committed.
    Edited(TrackId),
    /// A track was removed from the list and is being disposed.
    Deleted(TrackId),
}

/// Mutable world the controller edits.
pub struct EditContext<'a> {
    pub stage: &'a mut Stage,
    pub tracks: &'a mut Vec<Track>,
    /// Receives tracks removed through the delete zone, already disposing.
    pub disposing: &'a mut Vec<Track>,
    pub dispose_duration: f32,
}

impl EditContext<'_> {
    fn index_of(&self, id: &TrackId) -> Option<usize> {
        self.tracks.iter().position(|t| t.id == *id)
    }
}

#[derive(Debug)]
pub struct TransformController {
    state: ControllerState,
    mouse: HandleMetrics,
    touch: HandleMetrics,
    mode: InputMode,
    handles: Vec<(HandleRole, NodeId)>,
    handle_mesh: Option<(InputMode, Arc<MeshData>)>,
    delete_zone: Option<ScreenRect>,
    blockers: Vec<ScreenRect>,
    plane_hit: Option<Point3<f32>>,
    events: Vec<ControllerEvent>,
}

impl TransformController {
    pub fn new(config: &InteractionConfig) -> Self {
        Self {
            state: ControllerState::Idle,
            mouse: config.mouse_handles,
            touch: config.touch_handles,
            mode: InputMode::Mouse,
            handles: Vec::new(),
            handle_mesh: None,
            delete_zone: None,
            blockers: Vec::new(),
            plane_hit: None,
            events: Vec::new(),
        }
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn attached(&self) -> Option<&TrackId> {
        self.state.track()
    }

    pub fn input_mode(&self) -> InputMode {
        self.mode
    }

    pub fn set_input_mode(&mut self, mode: InputMode) {
        self.mode = mode;
    }

    pub fn metrics(&self) -> HandleMetrics {
        match self.mode {
            InputMode::Mouse => self.mouse,
            InputMode::Touch => self.touch,
        }
    }

    pub fn set_delete_zone(&mut self, zone: Option<ScreenRect>) {
        self.delete_zone = zone;
    }

    /// Screen areas (the track bar) whose pointer-downs belong to the UI.
    pub fn set_blockers(&mut self, blockers: Vec<ScreenRect>) {
        self.blockers = blockers;
    }

    /// Last intersection of the pointer with the reference plane.
    pub fn plane_hit(&self) -> Option<Point3<f32>> {
        self.plane_hit
    }

    pub fn handle_nodes(&self) -> impl Iterator<Item = (HandleRole, NodeId)> + '_ {
        self.handles.iter().copied()
    }

    pub fn drain_events(&mut self) -> Vec<ControllerEvent> {
        std::mem::take(&mut self.events)
    }

    /// Whether `screen` lies over a registered UI area.
    pub fn is_blocked(&self, screen: &Point2<f32>) -> bool {
        self.blockers.iter().any(|r| r.contains(screen.x, screen.y))
    }

    fn in_delete_zone(&self, screen: &Point2<f32>) -> bool {
        self.delete_zone.is_some_and(|r| r.contains(screen.x, screen.y))
    }

    fn update_plane_hit(&mut self, ray: &Ray) -> Option<Point3<f32>> {
        let hit = intersect_plane(ray, &Point3::origin(), &reference_axis());
        if hit.is_some() {
            self.plane_hit = hit;
        }
        hit
    }

    // ========================================================================
    // Attachment
    // ========================================================================

    /// Confirms the attached track is still active; detaches if it is not.
    pub fn validate(&mut self, ctx: &mut EditContext<'_>) -> AttachmentStatus {
        let Some(id) = self.state.track().cloned() else {
            return AttachmentStatus::Detached;
        };
        if ctx.index_of(&id).is_some() {
            return AttachmentStatus::Attached(id);
        }
        tracing::warn!("[marblie] attached track {id} is gone, detaching");
        self.detach(ctx.stage);
        AttachmentStatus::Lost(id)
    }

    /// Attaches to `id` and shows its handles. Unknown ids leave the controller idle.
    pub fn attach(&mut self, ctx: &mut EditContext<'_>, id: &TrackId) -> bool {
        self.detach(ctx.stage);
        let Some(index) = ctx.index_of(id) else {
            tracing::warn!("[marblie] cannot attach to unknown track {id}");
            return false;
        };
        let track = &ctx.tracks[index];
        // Handles are laid out from the final scale, not a mid-animation one.
        ctx.stage.tweens.finish_node(&mut ctx.stage.scene, track.entity.node);

        let roles: &[HandleRole] = match track.rules().handles {
            HandleSet::None => &[],
            HandleSet::Ends => &[HandleRole::Left, HandleRole::Right],
            HandleSet::EndsAndMiddle => &[HandleRole::Left, HandleRole::Middle, HandleRole::Right],
        };
        let mesh = self.handle_mesh();
        for &role in roles {
            let node = ctx
                .stage
                .scene
                .add_node(NodeRole::Handle(role), Transform::default());
            ctx.stage.scene.add_part(
                node,
                Arc::clone(&mesh),
                Material {
                    unlit: true,
                    ..Material::colored(HANDLE_COLOR)
                },
            );
            ctx.stage.tweens.start(
                &mut ctx.stage.scene,
                Tween::new(
                    TweenProperty::NodeScale(node),
                    TweenValue::Vector(Vector3::repeat(1.0)),
                    HANDLE_APPEAR_DURATION,
                )
                .from_value(TweenValue::Vector(Vector3::zeros()))
                .easing(EasingType::back_out()),
            );
            self.handles.push((role, node));
        }

        self.position_handles(ctx.stage, track);
        tracing::debug!("[marblie] attached {} {}", track.kind, track.id);
        self.state = ControllerState::Attached { track: id.clone() };
        true
    }

    /// Attaches to `id` and starts dragging it by its body from the last plane hit.
    pub fn begin_body_drag(&mut self, ctx: &mut EditContext<'_>, id: &TrackId) -> bool {
        if !self.attach(ctx, id) {
            return false;
        }
        let offset = ctx
            .index_of(id)
            .and_then(|i| ctx.tracks[i].position(ctx.stage))
            .zip(self.plane_hit)
            .map_or_else(Vector3::zeros, |(position, hit)| hit.coords - position);
        self.state = ControllerState::BodyDrag {
            track: id.clone(),
            offset,
        };
        true
    }

    /// Hides the handles and forgets the track. Safe to call when idle.
    pub fn detach(&mut self, stage: &mut Stage) {
        for (_, node) in self.handles.drain(..) {
            stage.tweens.cancel_node(node);
            stage.scene.remove_node(node);
        }
        if let Some(id) = self.state.track() {
            tracing::debug!("[marblie] detached {id}");
        }
        self.state = ControllerState::Idle;
    }

    fn handle_mesh(&mut self) -> Arc<MeshData> {
        if let Some((mode, mesh)) = &self.handle_mesh {
            if *mode == self.mode {
                return Arc::clone(mesh);
            }
        }
        let metrics = self.metrics();
        let mesh = Arc::new(uv_sphere(metrics.radius, 16, 12).translated(Vector3::new(metrics.lift, 0.0, 0.0)));
        self.handle_mesh = Some((self.mode, Arc::clone(&mesh)));
        mesh
    }

    fn handle_node(&self, role: HandleRole) -> Option<NodeId> {
        self.handles.iter().find(|(r, _)| *r == role).map(|(_, n)| *n)
    }

    fn handle_position(&self, stage: &Stage, role: HandleRole) -> Option<Vector3<f32>> {
        self.handle_node(role)
            .and_then(|n| stage.scene.transform(n))
            .map(|t| t.translation)
    }

    fn move_handle(&self, stage: &mut Stage, role: HandleRole, position: Vector3<f32>) {
        if let Some(node) = self.handle_node(role) {
            stage.scene.set_translation(node, position);
        }
    }

    /// Places every handle from the track's current geometry.
    fn position_handles(&self, stage: &mut Stage, track: &Track) {
        let Some(transform) = track.transform(stage) else {
            return;
        };
        let position = transform.translation;
        let offset = self.metrics().offset;

        match track.rules().handles {
            HandleSet::None => {}
            HandleSet::Ends => {
                let reach = track.bounding_radius(stage) * transform.scale.z + offset;
                let along = transform.rotation * Vector3::z();
                self.move_handle(stage, HandleRole::Right, position + along * reach);
                self.move_handle(stage, HandleRole::Left, position - along * reach);
            }
            HandleSet::EndsAndMiddle => {
                let (Some(points), Some(curve)) = (track.curve_points(), track.curve()) else {
                    return;
                };
                let right = points[0].coords + position - curve.tangent(0.0) * offset;
                let left = points[2].coords + position + curve.tangent(1.0) * offset;
                let middle = points[1].coords + position;
                self.move_handle(stage, HandleRole::Right, right);
                self.move_handle(stage, HandleRole::Left, left);
                self.move_handle(stage, HandleRole::Middle, middle);
            }
        }
    }

    /// Per-tick upkeep: validates the attachment and keeps handles on the track.
    pub fn update_handles(&mut self, ctx: &mut EditContext<'_>) -> AttachmentStatus {
        let status = self.validate(ctx);
        if let AttachmentStatus::Attached(id) = &status {
            if !matches!(self.state, ControllerState::HandleDrag { .. }) {
                if let Some(index) = ctx.index_of(id) {
                    self.position_handles(ctx.stage, &ctx.tracks[index]);
                }
            }
        }
        status
    }

    // ========================================================================
    // Pointer events
    // ========================================================================

    pub fn pointer_down(&mut self, ctx: &mut EditContext<'_>, pointer: &Pointer) {
        self.validate(ctx);
        self.update_plane_hit(&pointer.ray);
        if self.is_blocked(&pointer.screen) {
            tracing::debug!("[marblie] pointer down over ui, ignored");
            return;
        }

        let handle_hit = ctx
            .stage
            .scene
            .raycast(&pointer.ray, |role| matches!(role, NodeRole::Handle(_)));
        if let Some(hit) = handle_hit {
            if let NodeRole::Handle(role) = hit.role {
                self.begin_handle_drag(ctx, role);
                return;
            }
        }

        let hit = ctx
            .stage
            .scene
            .raycast(&pointer.ray, |role| !matches!(role, NodeRole::Handle(_)));
        match hit.map(|h| h.role) {
            Some(NodeRole::Track(id)) => {
                self.begin_body_drag(ctx, &id);
            }
            _ if self.state.is_dragging() => {}
            _ => self.detach(ctx.stage),
        }
    }

    fn begin_handle_drag(&mut self, ctx: &mut EditContext<'_>, role: HandleRole) {
        let Some(id) = self.state.track().cloned() else {
            return;
        };
        let Some(index) = ctx.index_of(&id) else {
            return;
        };
        let track = &ctx.tracks[index];
        let (Some(transform), Some(handle)) =
            (track.transform(ctx.stage), self.handle_position(ctx.stage, role))
        else {
            return;
        };
        let session = TransformSession {
            handle: role,
            start_vector: handle - transform.translation,
            start_rotation: track.rotation(),
            start_scale: transform.scale,
        };
        tracing::debug!("[marblie] handle drag {role:?} on {id}");
        self.state = ControllerState::HandleDrag { track: id, session };
    }

    pub fn pointer_move(&mut self, ctx: &mut EditContext<'_>, pointer: &Pointer) {
        if matches!(self.validate(ctx), AttachmentStatus::Lost(_)) {
            return;
        }
        let Some(hit) = self.update_plane_hit(&pointer.ray) else {
            return;
        };

        match self.state.clone() {
            ControllerState::BodyDrag { track, offset } => {
                let Some(index) = ctx.index_of(&track) else {
                    return;
                };
                let track = &ctx.tracks[index];
                ctx.stage
                    .scene
                    .set_translation(track.entity.node, hit.coords - offset);
                self.position_handles(ctx.stage, track);
            }
            ControllerState::HandleDrag { track, session } => {
                let Some(index) = ctx.index_of(&track) else {
                    return;
                };
                self.drag_handle(ctx.stage, &mut ctx.tracks[index], &session, hit);
            }
            ControllerState::Idle | ControllerState::Attached { .. } => {}
        }
    }

    fn drag_handle(&self, stage: &mut Stage, track: &mut Track, session: &TransformSession, hit: Point3<f32>) {
        let Some(transform) = track.transform(stage) else {
            return;
        };
        let position = transform.translation;
        let rules = track.rules();
        let raw = hit.coords - position;
        let vector = match rules.clamp {
            Some((min, max)) => clamp_length(&raw, &session.start_vector, min, max),
            None => raw,
        };
        self.move_handle(stage, session.handle, position + vector);

        match rules.rule {
            Some(TransformRule::Rotate) => self.rotate(stage, track, session, &vector),
            Some(TransformRule::RotateScale) => {
                self.rotate(stage, track, session, &vector);
                let offset = self.metrics().offset;
                let start = session.start_vector.norm() - offset;
                if start > f32::EPSILON {
                    let mut scale = session.start_scale;
                    scale.z *= (vector.norm() - offset) / start;
                    stage.scene.set_scale(track.entity.node, scale);
                }
            }
            Some(TransformRule::CurveReshape) => self.reshape(stage, track, session, hit, &vector),
            None => {}
        }
    }

    /// Turns the track about the reference axis so it follows the active handle.
    fn rotate(&self, stage: &mut Stage, track: &mut Track, session: &TransformSession, vector: &Vector3<f32>) {
        let angle = signed_angle_3d(&session.start_vector, vector, &reference_axis());
        // Counter-clockwise about +X as seen along +X is a negative right-handed turn.
        let turn = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), -angle);
        let euler = EulerXyz {
            x: session.start_rotation.x - angle,
            ..session.start_rotation
        };
        track.preview_euler(stage, euler);
        let Some(transform) = track.transform(stage) else {
            return;
        };

        let mirror = match session.handle {
            HandleRole::Right => HandleRole::Left,
            HandleRole::Left => HandleRole::Right,
            HandleRole::Middle => return,
        };
        let reach = track.bounding_radius(stage) * transform.scale.z + self.metrics().offset;
        let opposite = -session
            .start_vector
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(Vector3::z)
            * reach;
        self.move_handle(stage, mirror, transform.translation + turn * opposite);
    }

    fn reshape(
        &self,
        stage: &mut Stage,
        track: &mut Track,
        session: &TransformSession,
        hit: Point3<f32>,
        vector: &Vector3<f32>,
    ) {
        let (Some(points), Some(curve), Some((min, max))) =
            (track.curve_points().copied(), track.curve().copied(), track.rules().clamp)
        else {
            return;
        };
        let Some(position) = track.position(stage) else {
            return;
        };
        let offset = self.metrics().offset;
        let fallback = Vector3::z();
        let mut next = points;
        match session.handle {
            HandleRole::Right => {
                let raw = hit.coords - position + curve.tangent(0.0) * offset;
                next[0] = Point3::from(clamp_length(&raw, &fallback, min, max));
            }
            HandleRole::Left => {
                let raw = hit.coords - position - curve.tangent(1.0) * offset;
                next[2] = Point3::from(clamp_length(&raw, &-fallback, min, max));
            }
            HandleRole::Middle => next[1] = Point3::from(*vector),
        }
        track.reshape(stage, next);
        self.position_handles(stage, track);
    }

    /// Ends the gesture: deletes over the delete zone, otherwise commits.
    pub fn pointer_up(&mut self, ctx: &mut EditContext<'_>, pointer: &Pointer) {
        if matches!(self.validate(ctx), AttachmentStatus::Lost(_) | AttachmentStatus::Detached) {
            return;
        }
        // Releasing a press that never started a drag changes nothing.
        if !self.state.is_dragging() {
            return;
        }
        let Some(id) = self.state.track().cloned() else {
            return;
        };
        let Some(index) = ctx.index_of(&id) else {
            return;
        };

        if self.in_delete_zone(&pointer.screen) && ctx.tracks[index].kind.is_deletable() {
            let track = ctx.tracks.remove(index);
            track.begin_dispose(ctx.stage, ctx.dispose_duration);
            ctx.disposing.push(track);
            self.detach(ctx.stage);
            tracing::info!("[marblie] deleted track {id}");
            self.events.push(ControllerEvent::Deleted(id));
            return;
        }

        let track = &mut ctx.tracks[index];
        track.commit(ctx.stage);
        self.position_handles(ctx.stage, track);
        self.events.push(ControllerEvent::Edited(id.clone()));

        // A piece pulled out of the track bar keeps following the pointer.
        let keep_dragging =
            matches!(self.state, ControllerState::BodyDrag { .. }) && self.is_blocked(&pointer.screen);
        if !keep_dragging {
            self.state = ControllerState::Attached { track: id };
        }
    }

    /// Kind of the attached track, if any.
    pub fn attached_kind(&self, tracks: &[Track]) -> Option<TrackKind> {
        let id = self.state.track()?;
        tracks.iter().find(|t| t.id == *id).map(|t| t.kind)
    }
}
