//! Test utilities for headless Bevy integration tests.
//!
//! Provides `TestApp`, a wrapper around `bevy::app::App` that uses
//! `MinimalPlugins` + `InputPlugin` + `MarblieHeadlessPlugin` to drive a
//! session without a rendering or windowing backend.

use std::sync::Arc;

use bevy::prelude::*;

use crate::bevy::plugin::MarblieHeadlessPlugin;
use crate::bevy::resources::{CommandQueue, MarblieRes};
use crate::bevy::MarblieCommand;
use crate::config::MarblieConfig;
use crate::layout::{KeyValueStore, MemoryStore};
use crate::track::assets::test_library;

/// A headless Bevy app wrapper for testing.
pub(crate) struct TestApp {
    pub app: App,
}

impl TestApp {
    /// Seeded configuration shared by the plugin tests.
    pub fn config() -> MarblieConfig {
        MarblieConfig {
            seed: Some(11),
            ..Default::default()
        }
    }

    /// Create a new test app backed by an empty in-memory store.
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    /// Create a new test app persisting to `store`.
    pub fn with_store(store: Arc<dyn KeyValueStore>) -> Self {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.add_plugins(bevy::input::InputPlugin);
        app.add_plugins(MarblieHeadlessPlugin::new(Self::config(), test_library()).with_store(store));
        // Pause virtual time so that only explicit step_physics calls
        // advance the simulation.
        app.world_mut().resource_mut::<Time<Virtual>>().pause();
        app.update();
        Self { app }
    }

    /// Run a single frame update.
    pub fn update(&mut self) {
        self.app.update();
    }

    /// Advance the session by exactly `n` fixed timesteps.
    ///
    /// Feeds time straight into the fixed-timestep accumulator, bypassing
    /// the paused virtual clock.
    pub fn step_physics(&mut self, n: usize) {
        for _ in 0..n {
            let mut fixed = self.app.world_mut().resource_mut::<Time<Fixed>>();
            let dt = fixed.timestep();
            fixed.accumulate_overstep(dt);
            self.app.update();
        }
    }

    /// Push a command to the command queue.
    pub fn push_command(&mut self, cmd: MarblieCommand) {
        self.app.world().resource::<CommandQueue>().push(cmd);
    }

    pub fn marblie(&self) -> &MarblieRes {
        self.app.world().resource::<MarblieRes>()
    }

    /// Get a reference to the World.
    pub fn world(&self) -> &World {
        self.app.world()
    }

    /// Get a mutable reference to the World.
    pub fn world_mut(&mut self) -> &mut World {
        self.app.world_mut()
    }
}
