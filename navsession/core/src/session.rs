//! Session Runner
//!
//! A [`Session`] owns one [`SessionCoordinator`] and drives it from a single
//! task. Host notifications arrive as commands through a [`SessionHandle`];
//! stream items arrive through the coordinator's subscription scopes. The run
//! loop handles exactly one of those at a time:
//!
//! ```text
//!   SessionHandle ──cmd──► inbox ─┐
//!                                 ├─► select! (biased) ─► SessionCoordinator
//!   auto-drive / screen-state ────┘        one at a time
//! ```
//!
//! Commands win ties so a lifecycle change is never starved by a busy
//! stream. The loop ends when every handle has been dropped.

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::coordinator::SessionCoordinator;
use crate::host::{HostServices, MapStyle};
use crate::lifecycle::{LifecycleError, LifecyclePhase, PhaseTransition};
use crate::overlay::OverlayId;
use crate::screen::{NavigationIntent, Screen};
use crate::subscription::ScopeStats;
use crate::trip_session::TripMode;

/// Unique session identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a new random session id
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors surfaced to the host
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The operation is not valid in the current lifecycle state
    #[error("{operation} is not allowed while {state}")]
    InvalidState {
        /// Rejected operation
        operation: &'static str,
        /// Lifecycle state at the time
        state: String,
    },

    /// The host delivered a phase out of order
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// The session task is no longer running
    #[error("session is closed")]
    Closed,
}

impl SessionError {
    /// Build an [`SessionError::InvalidState`]
    pub fn invalid_state(operation: &'static str, state: impl Into<String>) -> Self {
        Self::InvalidState {
            operation,
            state: state.into(),
        }
    }
}

/// Point-in-time view of a session
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    /// Session id
    pub id: SessionId,
    /// Current phase
    pub phase: Option<LifecyclePhase>,
    /// Trip mode; `None` outside the Created window
    pub trip_mode: Option<TripMode>,
    /// Attached overlays, sorted
    pub overlays: Vec<OverlayId>,
    /// Auto-drive scope accounting
    pub auto_drive: ScopeStats,
    /// Screen-state scope accounting
    pub screen_state: ScopeStats,
}

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

/// A host notification queued for the run loop
#[derive(Debug)]
enum SessionCommand {
    Lifecycle(LifecyclePhase, Reply<PhaseTransition>),
    CreateScreen(Reply<Screen>),
    NewIntent(NavigationIntent, Reply<Screen>),
    MapStyleChanged(MapStyle, Reply<()>),
    Snapshot(oneshot::Sender<SessionSnapshot>),
}

/// Owns a coordinator and its command inbox
pub struct Session {
    coordinator: SessionCoordinator,
    inbox: mpsc::Receiver<SessionCommand>,
}

impl Session {
    /// Create a session and the handle that drives it
    #[must_use]
    pub fn new(config: &SessionConfig, services: HostServices) -> (Self, SessionHandle) {
        let id = SessionId::new();
        let (tx, inbox) = mpsc::channel(config.command_buffer.max(1));
        let coordinator = SessionCoordinator::new(id, config, services);

        let session = Self { coordinator, inbox };
        let handle = SessionHandle { id, tx };
        (session, handle)
    }

    /// Create a session and run it on a new task
    #[must_use]
    pub fn spawn(config: &SessionConfig, services: HostServices) -> (SessionHandle, JoinHandle<()>) {
        let (session, handle) = Self::new(config, services);
        let task = tokio::spawn(session.run());
        (handle, task)
    }

    /// Session id
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.coordinator.id()
    }

    /// Run until every handle is dropped
    pub async fn run(mut self) {
        let span = tracing::info_span!("session", id = %self.coordinator.id());

        async move {
            tracing::info!("Session loop started");

            loop {
                tokio::select! {
                    biased;

                    command = self.inbox.recv() => {
                        let Some(command) = command else {
                            break;
                        };
                        self.handle_command(command).await;
                    }

                    signal = self.coordinator.next_signal() => {
                        if let Err(e) = self.coordinator.handle_signal(signal).await {
                            tracing::warn!(?signal, error = %e, "Signal handling failed");
                        }
                    }
                }
            }

            self.coordinator.shutdown().await;
            tracing::info!("Session loop stopped");
        }
        .instrument(span)
        .await;
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        // A dropped reply receiver means the caller stopped waiting; the
        // command has still been applied.
        match command {
            SessionCommand::Lifecycle(phase, reply) => {
                let _ = reply.send(self.coordinator.on_lifecycle(phase).await);
            }
            SessionCommand::CreateScreen(reply) => {
                let _ = reply.send(self.coordinator.create_screen().await);
            }
            SessionCommand::NewIntent(intent, reply) => {
                let _ = reply.send(self.coordinator.on_new_intent(intent).await);
            }
            SessionCommand::MapStyleChanged(style, reply) => {
                let _ = reply.send(self.coordinator.on_map_style_changed(&style));
            }
            SessionCommand::Snapshot(reply) => {
                let _ = reply.send(self.coordinator.snapshot());
            }
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

/// Cloneable handle for delivering host notifications to a session
#[derive(Clone, Debug)]
pub struct SessionHandle {
    id: SessionId,
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Id of the session this handle drives
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Whether the session task is still running
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Deliver a lifecycle phase
    ///
    /// # Errors
    ///
    /// Whatever [`SessionCoordinator::on_lifecycle`] returns, or
    /// [`SessionError::Closed`].
    pub async fn lifecycle(&self, phase: LifecyclePhase) -> Result<PhaseTransition, SessionError> {
        self.request(|reply| SessionCommand::Lifecycle(phase, reply))
            .await
    }

    /// Ask for the initial screen
    ///
    /// # Errors
    ///
    /// Whatever [`SessionCoordinator::create_screen`] returns, or
    /// [`SessionError::Closed`].
    pub async fn create_screen(&self) -> Result<Screen, SessionError> {
        self.request(SessionCommand::CreateScreen).await
    }

    /// Deliver an intent
    ///
    /// # Errors
    ///
    /// Whatever [`SessionCoordinator::on_new_intent`] returns, or
    /// [`SessionError::Closed`].
    pub async fn new_intent(&self, intent: NavigationIntent) -> Result<Screen, SessionError> {
        self.request(|reply| SessionCommand::NewIntent(intent, reply))
            .await
    }

    /// Deliver a map style change
    ///
    /// # Errors
    ///
    /// Whatever [`SessionCoordinator::on_map_style_changed`] returns, or
    /// [`SessionError::Closed`].
    pub async fn map_style_changed(&self, style: MapStyle) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::MapStyleChanged(style, reply))
            .await
    }

    /// Current session state
    ///
    /// Processed in order with other commands, so every command sent before
    /// it has been applied.
    ///
    /// # Errors
    ///
    /// [`SessionError::Closed`] when the session task has stopped.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Snapshot(reply))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use crate::recording::RecordingHost;

    #[test]
    fn test_session_id_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn test_error_messages() {
        let err = SessionError::invalid_state("new_intent", "destroyed");
        assert_eq!(err.to_string(), "new_intent is not allowed while destroyed");

        let err: SessionError = LifecycleError::InvalidTransition {
            from: None,
            to: LifecyclePhase::Resumed,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "invalid lifecycle transition from uninitialized to resumed"
        );
    }

    #[tokio::test]
    async fn test_handle_round_trip() {
        let host = RecordingHost::new();
        let (handle, _task) = Session::spawn(&SessionConfig::default(), host.services());

        let transition = handle.lifecycle(LifecyclePhase::Created).await.unwrap();
        assert_eq!(transition.to, LifecyclePhase::Created);

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.id, handle.id());
        assert_eq!(snapshot.phase, Some(LifecyclePhase::Created));
        assert_eq!(snapshot.trip_mode, Some(TripMode::Idle));
    }

    #[tokio::test]
    async fn test_loop_exits_when_handles_drop() {
        let host = RecordingHost::new();
        let (handle, task) = Session::spawn(&SessionConfig::default(), host.services());

        handle.lifecycle(LifecyclePhase::Created).await.unwrap();
        handle.lifecycle(LifecyclePhase::Started).await.unwrap();
        assert_eq!(host.screen_state.subscriber_count(), 1);

        drop(handle);
        task.await.unwrap();
        // Scopes were closed on exit
        assert_eq!(host.screen_state.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_stopped_session_reports_closed() {
        let host = RecordingHost::new();
        let (session, handle) = Session::new(&SessionConfig::default(), host.services());
        drop(session);

        assert_eq!(handle.create_screen().await, Err(SessionError::Closed));
        assert!(handle.is_closed());
    }
}
