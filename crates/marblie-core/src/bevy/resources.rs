//! ECS Resources for marblie.

use std::collections::VecDeque;
use std::sync::Arc;

use bevy::prelude::*;
use parking_lot::Mutex;

use crate::app::Marblie;
use crate::bevy::events::MarblieCommand;

/// The running session.
#[derive(Resource, Debug)]
pub struct MarblieRes(pub Marblie);

/// Thread-safe command queue for host interop.
///
/// The page (or any other host code) pushes commands that the
/// `process_commands` system applies on the next frame.
#[derive(Resource, Clone, Default)]
pub struct CommandQueue {
    inner: Arc<Mutex<VecDeque<MarblieCommand>>>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, command: MarblieCommand) {
        self.inner.lock().push_back(command);
    }

    /// Drain all pending commands.
    pub fn drain(&self) -> Vec<MarblieCommand> {
        self.inner.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Latest pointer position in window pixels (origin top-left).
///
/// Filled from the primary window by the render plugin; headless tests set
/// it directly.
#[derive(Resource, Debug, Clone, Copy, Default, PartialEq)]
pub struct PointerInput {
    pub cursor: Option<Vec2>,
    /// Position forwarded to the orchestrator on the previous frame.
    pub last_sent: Option<Vec2>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_queue_shared_between_clones() {
        let queue = CommandQueue::new();
        let host = queue.clone();
        host.push(MarblieCommand::DropMarble);
        host.push(MarblieCommand::ToggleFollow);
        assert_eq!(queue.len(), 2);
        assert_eq!(
            queue.drain(),
            vec![MarblieCommand::DropMarble, MarblieCommand::ToggleFollow]
        );
        assert!(host.is_empty());
    }
}
