//! Host Lifecycle State Machine
//!
//! The host runtime drives a session through a fixed sequence of phases.
//! This module turns that sequence into explicit window events so the rest of
//! the crate never has to reason about raw phase callbacks.
//!
//! # Phases and Windows
//!
//! ```text
//!  phase:   Created ─► Started ─► Resumed ─► Paused ─► Stopped ─► Destroyed
//!                         ▲          ▲          │  │       │
//!                         │          └──────────┘  │       │
//!                         │                        ▼       │
//!                         └────────────────────────────────┘
//!
//!  level:     1          2          3          2        1         0
//!
//!  Created window  ├──────────────────────────────────────────┤
//!  Started window             ├────────────────────────┤
//!  Resumed window                        ├─────────┤
//! ```
//!
//! A window is open while the current phase level is at or above the window
//! level. Every transition reports the windows it closed (innermost first)
//! and the windows it opened (outermost first), so open and close events
//! always pair up.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A phase imposed by the host runtime
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    /// Session instantiated by the host
    Created,
    /// Session visible but not interactive
    Started,
    /// Session in the foreground
    Resumed,
    /// Session left the foreground
    Paused,
    /// Session no longer visible
    Stopped,
    /// Session torn down; terminal
    Destroyed,
}

impl LifecyclePhase {
    /// All phases in nominal order
    pub const ALL: [Self; 6] = [
        Self::Created,
        Self::Started,
        Self::Resumed,
        Self::Paused,
        Self::Stopped,
        Self::Destroyed,
    ];

    /// Parse a phase name (case-insensitive)
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "created" | "create" => Some(Self::Created),
            "started" | "start" => Some(Self::Started),
            "resumed" | "resume" => Some(Self::Resumed),
            "paused" | "pause" => Some(Self::Paused),
            "stopped" | "stop" => Some(Self::Stopped),
            "destroyed" | "destroy" => Some(Self::Destroyed),
            _ => None,
        }
    }

    /// Lowercase label
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Started => "started",
            Self::Resumed => "resumed",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Destroyed => "destroyed",
        }
    }

    fn level(self) -> u8 {
        match self {
            Self::Destroyed => 0,
            Self::Created | Self::Stopped => 1,
            Self::Started | Self::Paused => 2,
            Self::Resumed => 3,
        }
    }

    /// Whether the host contract allows moving from `previous` to this phase
    #[must_use]
    pub fn can_follow(self, previous: Option<Self>) -> bool {
        matches!(
            (previous, self),
            (None, Self::Created)
                | (Some(Self::Created), Self::Started | Self::Destroyed)
                | (Some(Self::Started), Self::Resumed | Self::Stopped)
                | (Some(Self::Resumed), Self::Paused)
                | (Some(Self::Paused), Self::Resumed | Self::Stopped)
                | (Some(Self::Stopped), Self::Started | Self::Destroyed)
        )
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A span of phases during which scoped work is valid
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Window {
    /// Created through Stopped
    Created,
    /// Started, Resumed and Paused
    Started,
    /// Resumed only
    Resumed,
}

impl Window {
    /// All windows, outermost first
    pub const ALL: [Self; 3] = [Self::Created, Self::Started, Self::Resumed];

    fn level(self) -> u8 {
        match self {
            Self::Created => 1,
            Self::Started => 2,
            Self::Resumed => 3,
        }
    }

    /// Whether this window is open while `phase` is current
    #[must_use]
    pub fn contains(self, phase: LifecyclePhase) -> bool {
        phase.level() >= self.level()
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Created => "created",
            Self::Started => "started",
            Self::Resumed => "resumed",
        };
        write!(f, "{label} window")
    }
}

/// Result of an accepted phase transition
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PhaseTransition {
    /// Phase before the transition
    pub from: Option<LifecyclePhase>,
    /// Phase after the transition
    pub to: LifecyclePhase,
    /// Windows that closed, innermost first
    pub closed: Vec<Window>,
    /// Windows that opened, outermost first
    pub opened: Vec<Window>,
}

impl PhaseTransition {
    /// True when the host re-notified the current phase
    #[must_use]
    pub fn is_redundant(&self) -> bool {
        self.from == Some(self.to)
    }
}

/// Errors from the lifecycle state machine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// The host delivered a phase out of order
    #[error("invalid lifecycle transition from {} to {to}", describe(.from))]
    InvalidTransition {
        /// Current phase (None before Created)
        from: Option<LifecyclePhase>,
        /// Rejected target phase
        to: LifecyclePhase,
    },
}

fn describe(phase: &Option<LifecyclePhase>) -> &'static str {
    phase.map_or("uninitialized", |p| p.label())
}

/// Tracks the current host phase and validates transitions
#[derive(Debug, Default)]
pub struct LifecycleController {
    current: Option<LifecyclePhase>,
}

impl LifecycleController {
    /// Create a controller that has not yet seen Created
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase
    #[must_use]
    pub fn current(&self) -> Option<LifecyclePhase> {
        self.current
    }

    /// Whether Destroyed has been reached
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.current == Some(LifecyclePhase::Destroyed)
    }

    /// Whether `window` is currently open
    #[must_use]
    pub fn is_window_open(&self, window: Window) -> bool {
        self.current.is_some_and(|phase| window.contains(phase))
    }

    /// Move to `next`, reporting which windows closed and opened
    ///
    /// Re-notifying the current phase is accepted and reports no windows.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidTransition`] when the host contract
    /// does not allow `next` after the current phase. State is unchanged.
    pub fn transition(&mut self, next: LifecyclePhase) -> Result<PhaseTransition, LifecycleError> {
        let from = self.current;

        if from == Some(next) && next != LifecyclePhase::Destroyed {
            return Ok(PhaseTransition {
                from,
                to: next,
                closed: Vec::new(),
                opened: Vec::new(),
            });
        }

        if !next.can_follow(from) {
            return Err(LifecycleError::InvalidTransition { from, to: next });
        }

        let before = from.map_or(0, LifecyclePhase::level);
        let after = next.level();

        let closed = Window::ALL
            .iter()
            .rev()
            .copied()
            .filter(|w| w.level() <= before && w.level() > after)
            .collect();
        let opened = Window::ALL
            .iter()
            .copied()
            .filter(|w| w.level() <= after && w.level() > before)
            .collect();

        self.current = Some(next);
        Ok(PhaseTransition {
            from,
            to: next,
            closed,
            opened,
        })
    }
}
