//! Bevy plugins for marblie.
//!
//! Provides:
//! - `MarblieHeadlessPlugin`: Session logic and input forwarding, no window or render dependencies
//! - `MarblieRenderPlugin`: `MarblieHeadlessPlugin` + camera, mesh, light and gizmo mirroring

use std::sync::Arc;

use bevy::prelude::*;

use crate::bevy::events::*;
use crate::bevy::resources::*;
use crate::bevy::systems;
use crate::app::Marblie;
use crate::config::MarblieConfig;
use crate::layout::{KeyValueStore, MemoryStore};
use crate::track::AssetLibrary;

// ============================================================================
// Headless Plugin (logic only, no rendering/window dependencies)
// ============================================================================

/// Headless plugin running the whole session without a window.
///
/// Use this plugin in tests with `MinimalPlugins` + `InputPlugin`. Pointer
/// positions come from [`PointerInput`], which the render plugin fills from
/// the primary window.
pub struct MarblieHeadlessPlugin {
    pub config: MarblieConfig,
    pub assets: AssetLibrary,
    pub store: Arc<dyn KeyValueStore>,
    pub command_queue: Option<CommandQueue>,
}

impl MarblieHeadlessPlugin {
    pub fn new(config: MarblieConfig, assets: AssetLibrary) -> Self {
        Self {
            config,
            assets,
            store: Arc::new(MemoryStore::new()),
            command_queue: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_command_queue(mut self, command_queue: CommandQueue) -> Self {
        self.command_queue = Some(command_queue);
        self
    }
}

impl Plugin for MarblieHeadlessPlugin {
    fn build(&self, app: &mut App) {
        // ====================================================================
        // Session
        // ====================================================================
        match Marblie::new(
            self.config.clone(),
            self.assets.clone(),
            Box::new(Arc::clone(&self.store)),
        ) {
            Ok(marblie) => {
                // Validated positive by the session.
                app.insert_resource(Time::<Fixed>::from_seconds(f64::from(
                    self.config.physics.timestep,
                )));
                app.insert_resource(MarblieRes(marblie));
            }
            Err(e) => tracing::error!("[marblie] cannot start session: {e}"),
        }

        app.insert_resource(self.command_queue.clone().unwrap_or_default())
            .init_resource::<PointerInput>();

        // ====================================================================
        // Messages
        // ====================================================================
        app.add_message::<MarblieCommand>()
            .add_message::<TrackEditedMessage>()
            .add_message::<MarbleImpactMessage>();

        // ====================================================================
        // Systems
        // ====================================================================
        app.add_systems(FixedUpdate, systems::tick_marblie);

        app.add_systems(
            Update,
            (
                systems::process_commands,
                systems::handle_keyboard,
                systems::handle_scroll,
                systems::handle_pointer,
                systems::forward_track_edits,
            )
                .chain(),
        );
    }
}

// ============================================================================
// Render Plugin (headless + rendering)
// ============================================================================

/// Full plugin: [`MarblieHeadlessPlugin`] plus the systems that need
/// `Window`, `Camera3d`, meshes, materials and `Gizmos`.
pub struct MarblieRenderPlugin {
    pub headless: MarblieHeadlessPlugin,
}

impl MarblieRenderPlugin {
    pub fn new(headless: MarblieHeadlessPlugin) -> Self {
        Self { headless }
    }
}

impl Plugin for MarblieRenderPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(MarblieHeadlessPlugin {
            config: self.headless.config.clone(),
            assets: self.headless.assets.clone(),
            store: Arc::clone(&self.headless.store),
            command_queue: self.headless.command_queue.clone(),
        });

        app.init_resource::<systems::RenderedScene>();
        app.add_systems(Startup, systems::setup_camera);

        // Window-dependent input
        app.add_systems(
            Update,
            systems::track_cursor.before(systems::handle_pointer),
        );

        app.add_systems(
            Update,
            (
                systems::sync_camera,
                systems::sync_scene_nodes,
                systems::sync_scene_lights,
                systems::draw_debug_lines,
            )
                .after(systems::forward_track_edits),
        );
    }
}

#[cfg(test)]
mod tests {
    use bevy::ecs::message::Messages;
    use bevy::input::ButtonState;
    use bevy::input::keyboard::{Key, KeyboardInput};
    use bevy::input::mouse::MouseButtonInput;

    use super::*;
    use crate::bevy::test_utils::TestApp;
    use crate::layout::{Layout, MemoryStore};
    use crate::track::TrackKind;

    fn edited_messages(app: &TestApp) -> Vec<TrackEditedMessage> {
        app.world()
            .resource::<Messages<TrackEditedMessage>>()
            .iter_current_update_messages()
            .cloned()
            .collect()
    }

    #[test]
    fn test_session_starts_with_default_layout() {
        let app = TestApp::new();
        let marblie = &app.marblie().0;
        assert_eq!(marblie.tracks().len(), 9);
        assert_eq!(marblie.marbles_dropped(), 1);
    }

    #[test]
    fn test_queued_command_drops_marble() {
        let mut app = TestApp::new();
        app.push_command(MarblieCommand::DropMarble);
        app.update();
        assert_eq!(app.marblie().0.marbles_dropped(), 2);
    }

    #[test]
    fn test_fixed_steps_advance_auto_drop() {
        let mut app = TestApp::new();
        app.push_command(MarblieCommand::ToggleAutoDrop);
        app.update();
        app.step_physics(200);
        assert_eq!(app.marblie().0.marbles_dropped(), 2);
    }

    #[test]
    fn test_mouse_release_commits_dragged_track() {
        let store = MemoryStore::new();
        let mut app = TestApp::with_store(Arc::new(store.clone()));
        // Held since the piece was picked from the toolbar.
        app.world_mut()
            .resource_mut::<ButtonInput<MouseButton>>()
            .press(MouseButton::Left);
        app.push_command(MarblieCommand::AddTrack(TrackKind::Funnel));
        app.update();

        app.world_mut().resource_mut::<PointerInput>().cursor = Some(Vec2::new(640.0, 360.0));
        app.world_mut().write_message(MouseButtonInput {
            button: MouseButton::Left,
            state: ButtonState::Released,
            window: Entity::PLACEHOLDER,
        });
        app.update();

        let messages = edited_messages(&app);
        assert_eq!(messages.len(), 1);
        assert!(!messages[0].deleted);
        assert_eq!(Layout::load(&store).len(), 10);
    }

    #[test]
    fn test_key_m_drops_marble() {
        let mut app = TestApp::new();
        app.world_mut().write_message(KeyboardInput {
            key_code: KeyCode::KeyM,
            logical_key: Key::Character("m".into()),
            state: ButtonState::Pressed,
            text: None,
            repeat: false,
            window: Entity::PLACEHOLDER,
        });
        app.update();
        assert_eq!(app.marblie().0.marbles_dropped(), 2);
    }

    #[test]
    fn test_invalid_config_leaves_no_session() {
        let mut config = TestApp::config();
        config.lights.probability = 2.0;
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.add_plugins(bevy::input::InputPlugin);
        app.add_plugins(MarblieHeadlessPlugin::new(
            config,
            crate::track::assets::test_library(),
        ));
        assert!(app.world().get_resource::<MarblieRes>().is_none());
    }
}
