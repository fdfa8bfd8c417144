//! Command processing system.
//!
//! Applies UI commands from the shared [`CommandQueue`] and from
//! [`MarblieCommand`] messages written by other systems.

use bevy::prelude::*;

use crate::app::Marblie;
use crate::bevy::{CommandQueue, MarblieCommand, MarblieRes};

/// System to apply every pending command, queue first, then messages.
pub fn process_commands(
    command_queue: Res<CommandQueue>,
    mut commands: MessageReader<MarblieCommand>,
    marblie: Option<ResMut<MarblieRes>>,
) {
    let Some(mut marblie) = marblie else {
        return;
    };
    let pending = command_queue.drain();
    for command in pending.into_iter().chain(commands.read().cloned()) {
        apply_command(&mut marblie.0, command);
    }
}

fn apply_command(marblie: &mut Marblie, command: MarblieCommand) {
    tracing::debug!("[command] {command:?}");
    match command {
        MarblieCommand::AddTrack(kind) => {
            if let Err(e) = marblie.add_track(kind) {
                tracing::warn!("[command] cannot add {kind}: {e}");
            }
        }
        MarblieCommand::AddRandomTrack => {
            if let Err(e) = marblie.add_random_track() {
                tracing::warn!("[command] cannot add random track: {e}");
            }
        }
        MarblieCommand::DropMarble => {
            marblie.drop_marble();
        }
        MarblieCommand::ToggleAutoDrop => marblie.toggle_auto_drop(),
        MarblieCommand::ToggleFollow => marblie.toggle_follow(),
        MarblieCommand::ToggleDayNight => marblie.toggle_day_night(),
        MarblieCommand::ToggleDebug => marblie.toggle_debug(),
        MarblieCommand::ToggleOverlay => marblie.toggle_overlay(),
        MarblieCommand::SetDeleteZone(zone) => marblie.set_delete_zone(zone),
        MarblieCommand::SetBlockers(blockers) => marblie.set_blockers(blockers),
        MarblieCommand::SetInputMode(mode) => marblie.set_input_mode(mode),
        MarblieCommand::SaveLayout => marblie.save_layout(),
    }
}
