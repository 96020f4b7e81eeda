//! Server lifecycle state machine.
//!
//! ```text
//! Created → Initialized → Running → Stopping → Stopped
//!     └──────────┴──────────────────────────────↗
//! ```
//! Transitions only move forward. A server that never ran can go straight
//! to `Stopped`.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use thiserror::Error;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleState {
    Created = 0,
    Initialized = 1,
    Running = 2,
    Stopping = 3,
    Stopped = 4,
}

impl LifecycleState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => LifecycleState::Created,
            1 => LifecycleState::Initialized,
            2 => LifecycleState::Running,
            3 => LifecycleState::Stopping,
            _ => LifecycleState::Stopped,
        }
    }

    fn can_move_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Created, Initialized)
                | (Initialized, Running)
                | (Running, Stopping)
                | (Stopping, Stopped)
                | (Created, Stopped)
                | (Initialized, Stopped)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Created => "created",
            LifecycleState::Initialized => "initialized",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("cannot move server from {from} to {to}")]
    InvalidTransition { from: LifecycleState, to: LifecycleState },
}

/// Atomic holder of the current lifecycle state.
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Created as u8),
        }
    }

    pub fn current(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move to `next`, returning the state that was left.
    pub fn transition(&self, next: LifecycleState) -> Result<LifecycleState, LifecycleError> {
        let mut current = self.current();
        loop {
            if !current.can_move_to(next) {
                return Err(LifecycleError::InvalidTransition { from: current, to: next });
            }
            match self.state.compare_exchange(
                current as u8,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    tracing::debug!(from = %current, to = %next, "Lifecycle transition");
                    return Ok(current);
                }
                Err(actual) => current = LifecycleState::from_u8(actual),
            }
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
