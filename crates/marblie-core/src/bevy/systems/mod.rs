//! Systems for marblie.
//!
//! Organized by functionality:
//! - command: Command queue processing from the host page
//! - input: Pointer, touch, wheel and keyboard forwarding
//! - simulation: Fixed-step ticking and outgoing messages
//! - rendering: Scene, light and camera mirroring

pub mod command;
pub mod input;
pub mod rendering;
pub mod simulation;

pub use command::*;
pub use input::*;
pub use rendering::*;
pub use simulation::*;
