//! WASM entry points for the host page.
//!
//! The page drives the running app through JavaScript-callable functions
//! that push [`MarblieCommand`]s onto a global [`CommandQueue`]. The binary
//! hands the same queue to [`MarblieRenderPlugin`](crate::bevy::MarblieRenderPlugin).

use std::sync::atomic::{AtomicBool, Ordering};

use bevy::prelude::*;
use parking_lot::Mutex;
use wasm_bindgen::prelude::*;

use crate::bevy::{CommandQueue, MarblieCommand};
use crate::controller::InputMode;
use crate::track::TrackKind;
use crate::util::ScreenRect;

// ============================================================================
// Global State
// ============================================================================

/// Signals app shutdown; checked every frame by [`check_exit_system`].
static SHOULD_EXIT: AtomicBool = AtomicBool::new(false);

/// Set once the app is running. The winit event loop can only be created once.
static APP_STARTED: AtomicBool = AtomicBool::new(false);

static COMMAND_QUEUE: Mutex<Option<CommandQueue>> = Mutex::new(None);

/// The queue shared between the page and the app.
pub fn host_command_queue() -> CommandQueue {
    COMMAND_QUEUE.lock().get_or_insert_with(CommandQueue::new).clone()
}

/// Marks the app as started. Returns `false` if it already was.
pub fn mark_app_started() -> bool {
    !APP_STARTED.swap(true, Ordering::SeqCst)
}

/// Request the app to exit on its next frame.
#[wasm_bindgen]
pub fn request_marblie_exit() {
    tracing::info!("[marblie] exit requested by page");
    SHOULD_EXIT.store(true, Ordering::SeqCst);
}

/// Whether the app is running and not shutting down.
#[wasm_bindgen]
pub fn is_marblie_running() -> bool {
    APP_STARTED.load(Ordering::SeqCst) && !SHOULD_EXIT.load(Ordering::SeqCst)
}

/// Bevy system that turns an exit request into [`AppExit`].
pub fn check_exit_system(mut exit: MessageWriter<AppExit>) {
    if SHOULD_EXIT.load(Ordering::SeqCst) {
        tracing::info!("[marblie] check_exit_system: sending AppExit");
        exit.write(AppExit::Success);
    }
}

// ============================================================================
// Commands
// ============================================================================

fn field<T: serde::de::DeserializeOwned>(value: &serde_json::Value, name: &str) -> Result<T, JsValue> {
    serde_json::from_value(value[name].clone())
        .map_err(|e| JsValue::from_str(&format!("Invalid '{name}' field: {e}")))
}

/// Parses a page command such as `{"type": "add_track", "kind": "Funnel"}`.
fn parse_command(command_json: &str) -> Result<MarblieCommand, JsValue> {
    let value: serde_json::Value = serde_json::from_str(command_json)
        .map_err(|e| JsValue::from_str(&format!("Invalid command JSON: {e}")))?;

    let command_type = value["type"]
        .as_str()
        .ok_or_else(|| JsValue::from_str("Missing 'type' field"))?;

    let command = match command_type {
        "add_track" => MarblieCommand::AddTrack(field::<TrackKind>(&value, "kind")?),
        "add_random_track" => MarblieCommand::AddRandomTrack,
        "drop_marble" => MarblieCommand::DropMarble,
        "toggle_auto_drop" => MarblieCommand::ToggleAutoDrop,
        "toggle_follow" => MarblieCommand::ToggleFollow,
        "toggle_day_night" => MarblieCommand::ToggleDayNight,
        "toggle_debug" => MarblieCommand::ToggleDebug,
        "toggle_overlay" => MarblieCommand::ToggleOverlay,
        "set_delete_zone" => {
            MarblieCommand::SetDeleteZone(field::<Option<ScreenRect>>(&value, "zone")?)
        }
        "set_blockers" => MarblieCommand::SetBlockers(field::<Vec<ScreenRect>>(&value, "rects")?),
        "set_input_mode" => match value["mode"].as_str() {
            Some("touch") => MarblieCommand::SetInputMode(InputMode::Touch),
            Some("mouse") => MarblieCommand::SetInputMode(InputMode::Mouse),
            _ => return Err(JsValue::from_str("'mode' must be \"mouse\" or \"touch\"")),
        },
        "save_layout" => MarblieCommand::SaveLayout,
        other => return Err(JsValue::from_str(&format!("Unknown command type: {other}"))),
    };
    Ok(command)
}

/// Sends a command to the running app.
#[wasm_bindgen]
pub fn send_command(command_json: &str) -> Result<(), JsValue> {
    if SHOULD_EXIT.load(Ordering::SeqCst) {
        return Err(JsValue::from_str("marblie is shutting down"));
    }
    let command = parse_command(command_json)?;
    tracing::debug!("[marblie] page command {command:?}");
    host_command_queue().push(command);
    Ok(())
}
