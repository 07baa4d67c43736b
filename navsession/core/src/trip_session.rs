//! Trip Session Control
//!
//! Owns the trip-recording mode and is the only place that issues start/stop
//! calls to the navigation engine. Every transition is idempotent: asking for
//! the mode that is already active does nothing, so repeated signals never
//! turn into redundant engine calls.
//!
//! ```text
//!            start_replay               start_recording
//!   Replaying ◄──────────── Idle ─────────────────► Recording
//!       │      ───stop───►   ▲   ◄───stop─────         │
//!       │                    │                         │
//!       └──────── start_recording (stops replay first) ┘
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Trip-recording mode of a session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripMode {
    /// No trip session running
    #[default]
    Idle,
    /// Simulated progress along a route
    Replaying,
    /// Real trip session from sensor input
    Recording,
}

impl fmt::Display for TripMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Replaying => "replaying",
            Self::Recording => "recording",
        })
    }
}

/// The engine's own view of its real trip session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineTripState {
    /// A trip session is running
    Started,
    /// No trip session is running
    Stopped,
}

/// Navigation engine collaborator
///
/// Calls are synchronous: when a stop call returns, the engine has stopped.
pub trait NavigationEngine: Send + Sync {
    /// Current state of the real trip session
    fn trip_session_state(&self) -> EngineTripState;
    /// Start recording a real trip session
    fn start_trip_session(&self);
    /// Stop the real trip session
    fn stop_trip_session(&self);
    /// Start replaying simulated trip progress
    fn start_replay(&self);
    /// Stop replaying simulated trip progress
    fn stop_replay(&self);
}

/// Whether a requested transition changed anything
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The mode changed
    Applied,
    /// Already in the requested mode
    Unchanged,
}

impl TransitionOutcome {
    /// True when the mode changed
    #[must_use]
    pub fn is_applied(self) -> bool {
        self == Self::Applied
    }
}

/// Drives the navigation engine between Idle, Replaying and Recording
pub struct TripSessionController {
    mode: TripMode,
    engine: Arc<dyn NavigationEngine>,
}

impl TripSessionController {
    /// Create an idle controller
    #[must_use]
    pub fn new(engine: Arc<dyn NavigationEngine>) -> Self {
        Self {
            mode: TripMode::Idle,
            engine,
        }
    }

    /// Current mode
    #[must_use]
    pub fn mode(&self) -> TripMode {
        self.mode
    }

    /// Switch to replay
    ///
    /// A running recording is stopped first so the two never overlap.
    pub fn start_replay(&mut self) -> TransitionOutcome {
        match self.mode {
            TripMode::Replaying => self.unchanged("start_replay"),
            TripMode::Recording => {
                self.stop_recording();
                self.begin_replay()
            }
            TripMode::Idle => self.begin_replay(),
        }
    }

    /// Switch to a real recording
    ///
    /// A running replay is stopped first. If the engine already reports a
    /// started trip session, the mode is adopted without another start call.
    pub fn start_recording(&mut self) -> TransitionOutcome {
        match self.mode {
            TripMode::Recording => self.unchanged("start_recording"),
            TripMode::Replaying => {
                self.engine.stop_replay();
                self.begin_recording()
            }
            TripMode::Idle => self.begin_recording(),
        }
    }

    /// Return to Idle from whichever mode is active
    pub fn stop(&mut self) -> TransitionOutcome {
        match self.mode {
            TripMode::Idle => self.unchanged("stop"),
            TripMode::Replaying => {
                self.engine.stop_replay();
                self.set_mode(TripMode::Idle)
            }
            TripMode::Recording => {
                self.stop_recording();
                self.set_mode(TripMode::Idle)
            }
        }
    }

    /// Stop only if replaying
    pub fn stop_replay(&mut self) -> TransitionOutcome {
        if self.mode == TripMode::Replaying {
            self.stop()
        } else {
            self.unchanged("stop_replay")
        }
    }

    fn begin_replay(&mut self) -> TransitionOutcome {
        self.engine.start_replay();
        self.set_mode(TripMode::Replaying)
    }

    fn begin_recording(&mut self) -> TransitionOutcome {
        if self.engine.trip_session_state() == EngineTripState::Started {
            tracing::debug!("Engine trip session already started, adopting it");
        } else {
            self.engine.start_trip_session();
        }
        self.set_mode(TripMode::Recording)
    }

    fn stop_recording(&self) {
        if self.engine.trip_session_state() == EngineTripState::Stopped {
            tracing::debug!("Engine trip session already stopped");
        } else {
            self.engine.stop_trip_session();
        }
    }

    fn set_mode(&mut self, mode: TripMode) -> TransitionOutcome {
        tracing::info!(from = %self.mode, to = %mode, "Trip mode changed");
        self.mode = mode;
        TransitionOutcome::Applied
    }

    fn unchanged(&self, request: &'static str) -> TransitionOutcome {
        tracing::debug!(request, mode = %self.mode, "Redundant trip transition ignored");
        TransitionOutcome::Unchanged
    }
}

impl fmt::Debug for TripSessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TripSessionController")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}
