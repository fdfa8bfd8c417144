//! Marblie Core Library
//!
//! A marble-run toy: track pieces with `Rapier3D` colliders, falling marbles
//! that borrow point lights from a small pool, a pointer-driven transform
//! controller for placing pieces, and JSON layout persistence.
//!
//! The session ([`app::Marblie`]) is engine independent; the [`bevy`] module
//! ticks it on a fixed schedule and mirrors its scene into bevy.

#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod app;
pub mod camera;
pub mod config;
pub mod controller;
pub mod entity;
pub mod error;
pub mod geometry;
pub mod layout;
pub mod marble;
pub mod physics;
pub mod scene;
pub mod track;
pub mod tween;
pub mod util;

// Bevy integration
pub mod bevy;

pub use app::{Marblie, Shortcut, Toggles};
pub use config::MarblieConfig;
pub use controller::{ControllerEvent, InputMode, TransformController};
pub use entity::{MarbleId, Stage, TrackId};
pub use error::{MarblieError, Result};
pub use layout::{KeyValueStore, Layout, MemoryStore, STORAGE_KEY};
pub use marble::{Marble, MarbleManager};
pub use physics::{PHYSICS_DT, PhysicsWorld, default_gravity};
pub use track::{AssetLibrary, GltfModelSource, ProceduralModelSource, Track, TrackKind};
pub use util::ScreenRect;

#[cfg(target_arch = "wasm32")]
pub use layout::LocalStorageStore;
