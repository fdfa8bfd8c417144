//! Input handling: pointer, touch, wheel and keyboard shortcuts.

use bevy::input::mouse::{MouseScrollUnit, MouseWheel};
use bevy::prelude::*;
use bevy::window::PrimaryWindow;
use rapier3d::na::Point2;

use crate::app::Shortcut;
use crate::bevy::{MarblieRes, PointerInput};
use crate::controller::InputMode;

/// Wheel pixels per zoom step.
const PIXELS_PER_STEP: f32 = 100.0;

/// System to track the cursor and viewport of the primary window.
pub fn track_cursor(
    windows: Query<&Window, With<PrimaryWindow>>,
    mut pointer: ResMut<PointerInput>,
    marblie: Option<ResMut<MarblieRes>>,
) {
    let Ok(window) = windows.single() else {
        return;
    };
    pointer.cursor = window.cursor_position();
    if let Some(mut marblie) = marblie {
        marblie.0.set_viewport(window.width(), window.height());
    }
}

/// System to forward presses, moves and releases to the orchestrator.
///
/// An active touch wins over the mouse cursor and switches handles to the
/// larger touch metrics.
pub fn handle_pointer(
    buttons: Res<ButtonInput<MouseButton>>,
    touches: Res<Touches>,
    mut pointer: ResMut<PointerInput>,
    marblie: Option<ResMut<MarblieRes>>,
) {
    let Some(mut marblie) = marblie else {
        return;
    };
    let marblie = &mut marblie.0;

    let touch = touches
        .first_pressed_position()
        .or_else(|| touches.iter_just_released().next().map(|t| t.position()));
    let Some(position) = touch.or(pointer.cursor) else {
        if pointer.last_sent.take().is_some() {
            marblie.pointer_leave();
        }
        return;
    };
    let screen = Point2::new(position.x, position.y);

    if buttons.just_pressed(MouseButton::Left) || touches.any_just_pressed() {
        let mode = if touch.is_some() {
            InputMode::Touch
        } else {
            InputMode::Mouse
        };
        marblie.set_input_mode(mode);
        marblie.pointer_down(screen);
    } else if pointer.last_sent != Some(position) {
        marblie.pointer_move(screen);
    }

    if buttons.just_released(MouseButton::Left) || touches.any_just_released() {
        marblie.pointer_up(screen);
    }
    pointer.last_sent = Some(position);
}

/// System to zoom the camera with the mouse wheel.
pub fn handle_scroll(mut wheel: MessageReader<MouseWheel>, marblie: Option<ResMut<MarblieRes>>) {
    let Some(mut marblie) = marblie else {
        wheel.clear();
        return;
    };
    for event in wheel.read() {
        let steps = match event.unit {
            MouseScrollUnit::Line => event.y,
            MouseScrollUnit::Pixel => event.y / PIXELS_PER_STEP,
        };
        // Wheel up moves closer.
        marblie.0.scroll(-steps);
    }
}

/// System to map `M`, `D` and `H` to their shortcuts.
pub fn handle_keyboard(keys: Res<ButtonInput<KeyCode>>, marblie: Option<ResMut<MarblieRes>>) {
    let Some(mut marblie) = marblie else {
        return;
    };
    for (key, shortcut) in [
        (KeyCode::KeyM, Shortcut::DropMarble),
        (KeyCode::KeyD, Shortcut::ToggleDebug),
        (KeyCode::KeyH, Shortcut::ToggleOverlay),
    ] {
        if keys.just_pressed(key) {
            marblie.0.shortcut(shortcut);
        }
    }
}
