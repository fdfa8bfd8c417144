//! Bevy integration for marblie.
//!
//! The session itself lives in [`crate::app::Marblie`]; this module wraps it
//! in a resource, ticks it on `FixedUpdate`, forwards window input to it and
//! mirrors its scene graph into bevy meshes, lights and a `Camera3d`.

pub mod events;
pub mod plugin;
pub mod resources;
pub mod systems;

#[cfg(test)]
pub(crate) mod test_utils;

#[cfg(target_arch = "wasm32")]
pub mod wasm_entry;

#[cfg(target_arch = "wasm32")]
pub use wasm_entry::*;

pub use events::*;
pub use plugin::{MarblieHeadlessPlugin, MarblieRenderPlugin};
pub use resources::*;
pub use systems::{MainCamera, RenderedScene, SceneLightVisual, SceneNodeVisual};
