//! ECS Messages for marblie.
//!
//! Note: In Bevy 0.18+, buffered events use the `Message` trait instead of `Event`.

use bevy::prelude::*;

use crate::controller::InputMode;
use crate::entity::{MarbleId, TrackId};
use crate::track::TrackKind;
use crate::util::ScreenRect;

/// Request from the UI layer (buttons, host page) to the orchestrator.
#[derive(Message, Debug, Clone, PartialEq)]
pub enum MarblieCommand {
    /// Add a piece at the pointer and start dragging it.
    AddTrack(TrackKind),
    AddRandomTrack,
    DropMarble,
    ToggleAutoDrop,
    ToggleFollow,
    ToggleDayNight,
    ToggleDebug,
    ToggleOverlay,
    /// Screen rectangle of the trash area; `None` disables deletion.
    SetDeleteZone(Option<ScreenRect>),
    /// Screen rectangles of UI panels that swallow pointer-downs.
    SetBlockers(Vec<ScreenRect>),
    SetInputMode(InputMode),
    SaveLayout,
}

/// Message fired after a track edit was committed and persisted.
#[derive(Message, Debug, Clone, PartialEq, Eq)]
pub struct TrackEditedMessage {
    pub track: TrackId,
    /// The piece was dropped on the delete zone and is being disposed.
    pub deleted: bool,
}

/// Message fired for every marble contact force reported by physics.
#[derive(Message, Debug, Clone, Copy, PartialEq)]
pub struct MarbleImpactMessage {
    pub marble: MarbleId,
    pub magnitude: f32,
}
