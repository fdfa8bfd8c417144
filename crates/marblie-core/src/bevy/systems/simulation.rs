//! Fixed-step simulation and outgoing messages.

use bevy::prelude::*;

use crate::bevy::{MarbleImpactMessage, MarblieRes, TrackEditedMessage};
use crate::controller::ControllerEvent;

/// Advances the session by one fixed step and reports marble impacts.
pub fn tick_marblie(
    marblie: Option<ResMut<MarblieRes>>,
    mut impacts: MessageWriter<MarbleImpactMessage>,
) {
    let Some(mut marblie) = marblie else {
        return;
    };
    marblie.0.tick();
    for impact in marblie.0.impacts() {
        impacts.write(MarbleImpactMessage {
            marble: impact.marble,
            magnitude: impact.magnitude,
        });
    }
}

/// Turns persisted controller edits into [`TrackEditedMessage`]s.
pub fn forward_track_edits(
    marblie: Option<ResMut<MarblieRes>>,
    mut edited: MessageWriter<TrackEditedMessage>,
) {
    let Some(mut marblie) = marblie else {
        return;
    };
    for event in marblie.0.drain_edits() {
        let message = match event {
            ControllerEvent::Edited(track) => TrackEditedMessage {
                track,
                deleted: false,
            },
            ControllerEvent::Deleted(track) => TrackEditedMessage {
                track,
                deleted: true,
            },
        };
        edited.write(message);
    }
}
