//! Session Coordinator
//!
//! The state machine at the heart of a session. Lifecycle transitions are
//! turned into window events, and each window owns a slice of the session:
//!
//! ```text
//!   Created window  ── SessionComponents (trip controller, overlays, router)
//!   Started window  ── navigation manager registration, screen-state scope,
//!                      auto-drive scope
//!   Resumed window  ── registered overlays
//! ```
//!
//! The coordinator is driven from a single task (see
//! [`Session`](crate::session::Session)); every method takes `&mut self`, so
//! lifecycle handling and signal handling can never interleave.

use std::sync::Arc;

use crate::config::SessionConfig;
use crate::host::{HostServices, MapStyle};
use crate::lifecycle::{LifecycleController, LifecyclePhase, PhaseTransition, Window};
use crate::overlay::{OverlayId, OverlayRegistry};
use crate::screen::{NavigationIntent, Screen, ScreenRouter};
use crate::session::{SessionError, SessionId, SessionSnapshot};
use crate::signals::ScreenStateChanged;
use crate::subscription::SubscriptionScope;
use crate::trip_session::{TripMode, TripSessionController};

/// Scope name of the auto-drive subscription
pub const AUTO_DRIVE_SCOPE: &str = "auto-drive";
/// Scope name of the screen-state subscription
pub const SCREEN_STATE_SCOPE: &str = "screen-state";

/// A signal delivered by one of the Started-window scopes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionSignal {
    /// The auto-drive flag has this value
    AutoDrive(bool),
    /// The app's screen state changed
    ScreenStateChanged,
}

/// Components that exist only inside the Created window
#[derive(Debug)]
struct SessionComponents {
    trip: TripSessionController,
    overlays: OverlayRegistry,
    router: ScreenRouter,
}

/// Lifecycle-scoped coordinator for one session
pub struct SessionCoordinator {
    id: SessionId,
    lifecycle: LifecycleController,
    services: HostServices,
    overlay_ids: Vec<OverlayId>,
    auto_drive: SubscriptionScope<bool>,
    screen_state: SubscriptionScope<ScreenStateChanged>,
    components: Option<SessionComponents>,
    initial_map_style: Option<MapStyle>,
    manager_registered: bool,
}

impl SessionCoordinator {
    /// Create a coordinator that has not yet seen Created
    #[must_use]
    pub fn new(id: SessionId, config: &SessionConfig, services: HostServices) -> Self {
        let auto_drive = SubscriptionScope::new(
            AUTO_DRIVE_SCOPE,
            Window::Started,
            Arc::clone(&services.auto_drive),
            config.signal_buffer,
        );
        let screen_state = SubscriptionScope::new(
            SCREEN_STATE_SCOPE,
            Window::Started,
            Arc::clone(&services.screen_state),
            config.signal_buffer,
        );

        Self {
            id,
            lifecycle: LifecycleController::new(),
            services,
            overlay_ids: config.overlays.clone(),
            auto_drive,
            screen_state,
            components: None,
            initial_map_style: config.initial_map_style.clone(),
            manager_registered: false,
        }
    }

    /// Session id
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current lifecycle phase
    #[must_use]
    pub fn phase(&self) -> Option<LifecyclePhase> {
        self.lifecycle.current()
    }

    /// Current trip mode, if the session is alive
    #[must_use]
    pub fn trip_mode(&self) -> Option<TripMode> {
        self.components.as_ref().map(|c| c.trip.mode())
    }

    /// Attached overlays, sorted
    #[must_use]
    pub fn registered_overlays(&self) -> Vec<OverlayId> {
        self.components
            .as_ref()
            .map(|c| c.overlays.registered())
            .unwrap_or_default()
    }

    /// Point-in-time view of the session
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            phase: self.phase(),
            trip_mode: self.trip_mode(),
            overlays: self.registered_overlays(),
            auto_drive: self.auto_drive.stats(),
            screen_state: self.screen_state.stats(),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Apply a host lifecycle phase
    ///
    /// Windows that closed are torn down before windows that opened are set
    /// up, and scope teardown is awaited.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidState`] before Created or after Destroyed, and
    /// [`SessionError::Lifecycle`] for an out-of-order phase.
    pub async fn on_lifecycle(
        &mut self,
        phase: LifecyclePhase,
    ) -> Result<PhaseTransition, SessionError> {
        let uninitialized = self.lifecycle.current().is_none() && phase != LifecyclePhase::Created;
        if uninitialized || self.lifecycle.is_destroyed() {
            return Err(self.invalid_state("lifecycle"));
        }

        let transition = self.lifecycle.transition(phase)?;
        if transition.is_redundant() {
            tracing::debug!(phase = %phase, "Redundant lifecycle notification ignored");
            return Ok(transition);
        }

        tracing::info!(
            from = ?transition.from,
            to = %transition.to,
            closed = ?transition.closed,
            opened = ?transition.opened,
            "Lifecycle transition"
        );

        for window in &transition.closed {
            self.close_window(*window).await;
        }
        for window in &transition.opened {
            self.open_window(*window);
        }

        Ok(transition)
    }

    fn open_window(&mut self, window: Window) {
        match window {
            Window::Created => {
                self.components = Some(SessionComponents {
                    trip: TripSessionController::new(Arc::clone(&self.services.engine)),
                    overlays: OverlayRegistry::new(
                        Arc::clone(&self.services.overlays),
                        self.overlay_ids.clone(),
                    ),
                    router: ScreenRouter::new(Arc::clone(&self.services.deep_links)),
                });
                tracing::debug!("Session components created");
                if let Some(style) = &self.initial_map_style {
                    tracing::debug!(style = %style, "Applying initial map style");
                    self.services.map_style.apply_style(style);
                }
            }
            Window::Started => {
                self.register_manager();
                self.screen_state.open();
                self.auto_drive.open();
            }
            Window::Resumed => {
                if let Some(components) = self.components.as_mut() {
                    components.overlays.register_all();
                }
            }
        }
    }

    async fn close_window(&mut self, window: Window) {
        match window {
            Window::Resumed => {
                if let Some(components) = self.components.as_mut() {
                    components.overlays.unregister_all();
                }
            }
            Window::Started => {
                self.auto_drive.close().await;
                self.screen_state.close().await;
                self.unregister_manager();
            }
            Window::Created => {
                self.components = None;
                tracing::debug!("Session components released");
            }
        }
    }

    fn register_manager(&mut self) {
        if !self.manager_registered {
            self.services.navigation_manager.register();
            self.manager_registered = true;
            tracing::debug!("Registered with navigation manager");
        }
    }

    fn unregister_manager(&mut self) {
        if self.manager_registered {
            self.services.navigation_manager.unregister();
            self.manager_registered = false;
            tracing::debug!("Unregistered from navigation manager");
        }
    }

    // ========================================================================
    // Signals
    // ========================================================================

    /// Wait for the next item from any open scope
    ///
    /// Pends forever while no scope is open. Cancel safe.
    pub async fn next_signal(&mut self) -> SessionSignal {
        let auto_drive_open = self.auto_drive.is_open();
        let screen_state_open = self.screen_state.is_open();

        tokio::select! {
            Some(enabled) = self.auto_drive.recv(), if auto_drive_open => {
                SessionSignal::AutoDrive(enabled)
            }
            Some(ScreenStateChanged) = self.screen_state.recv(), if screen_state_open => {
                SessionSignal::ScreenStateChanged
            }
            else => std::future::pending().await,
        }
    }

    /// Dispatch a signal to its handler
    ///
    /// # Errors
    ///
    /// Propagates the handler's [`SessionError`].
    pub async fn handle_signal(&mut self, signal: SessionSignal) -> Result<(), SessionError> {
        tracing::trace!(?signal, "Handling signal");
        match signal {
            SessionSignal::AutoDrive(enabled) => self.on_auto_drive(enabled).await.map(|_| ()),
            SessionSignal::ScreenStateChanged => self.on_screen_state_changed().await.map(|_| ()),
        }
    }

    /// React to the auto-drive flag
    ///
    /// Nothing happens without location permission. With permission, `true`
    /// selects replay and `false` selects a real recording; replay is always
    /// stopped before a recording is started.
    ///
    /// Returns the trip mode afterwards.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidState`] outside the Created window.
    pub async fn on_auto_drive(&mut self, enabled: bool) -> Result<TripMode, SessionError> {
        self.require_components("auto_drive")?;
        let granted = self.services.permissions.location_granted().await;
        let components = self.components_mut("auto_drive")?;

        if !granted {
            tracing::info!(enabled, "Location permission missing, trip session untouched");
            return Ok(components.trip.mode());
        }

        if enabled {
            components.trip.start_replay();
        } else {
            components.trip.stop_replay();
            components.trip.start_recording();
        }
        Ok(components.trip.mode())
    }

    /// Re-resolve and push the screen after a screen-state change
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidState`] outside the Created window.
    pub async fn on_screen_state_changed(&mut self) -> Result<Screen, SessionError> {
        self.resolve_and_push("screen_state_changed", None).await
    }

    /// Screen for the host's initial display request
    ///
    /// The screen is returned for the host to display and not pushed.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidState`] outside the Created window.
    pub async fn create_screen(&mut self) -> Result<Screen, SessionError> {
        self.require_components("create_screen")?;
        let screen = if self.services.permissions.location_granted().await {
            self.services.screen_manager.current_screen()
        } else {
            Screen::PermissionRequest
        };
        tracing::info!(screen = %screen, "Initial screen created");
        Ok(screen)
    }

    /// Route an incoming intent and push the resulting screen
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidState`] outside the Created window.
    pub async fn on_new_intent(&mut self, intent: NavigationIntent) -> Result<Screen, SessionError> {
        tracing::debug!(action = ?intent.action, payload = %intent.payload, "New intent");
        self.resolve_and_push("new_intent", Some(&intent)).await
    }

    /// Forward a map style change to the map
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidState`] outside the Created window.
    pub fn on_map_style_changed(&mut self, style: &MapStyle) -> Result<(), SessionError> {
        self.require_components("map_style_changed")?;
        tracing::debug!(style = %style, "Map style changed");
        self.services.map_style.apply_style(style);
        Ok(())
    }

    /// Close every open scope
    ///
    /// Used when the owning task exits without a Destroyed notification.
    pub async fn shutdown(&mut self) {
        self.auto_drive.close().await;
        self.screen_state.close().await;
        self.unregister_manager();
    }

    async fn resolve_and_push(
        &mut self,
        operation: &'static str,
        intent: Option<&NavigationIntent>,
    ) -> Result<Screen, SessionError> {
        self.require_components(operation)?;
        let granted = self.services.permissions.location_granted().await;
        let fallback = self.services.screen_manager.current_screen();
        let router = &self.components_mut(operation)?.router;

        let screen = router.resolve(granted, intent, fallback);
        tracing::info!(operation, screen = %screen, "Pushing screen");
        self.services.screens.push(screen.clone());
        Ok(screen)
    }

    fn require_components(&self, operation: &'static str) -> Result<(), SessionError> {
        if self.components.is_some() {
            Ok(())
        } else {
            Err(self.invalid_state(operation))
        }
    }

    fn components_mut(
        &mut self,
        operation: &'static str,
    ) -> Result<&mut SessionComponents, SessionError> {
        let state = self.state_label();
        self.components
            .as_mut()
            .ok_or_else(|| SessionError::invalid_state(operation, state))
    }

    fn invalid_state(&self, operation: &'static str) -> SessionError {
        SessionError::invalid_state(operation, self.state_label())
    }

    fn state_label(&self) -> &'static str {
        self.lifecycle.current().map_or("uninitialized", |p| p.label())
    }
}

impl std::fmt::Debug for SessionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCoordinator")
            .field("id", &self.id)
            .field("phase", &self.lifecycle.current())
            .field("components", &self.components)
            .field("auto_drive", &self.auto_drive)
            .field("screen_state", &self.screen_state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use crate::lifecycle::LifecyclePhase::{Created, Destroyed, Paused, Resumed, Started, Stopped};
    use crate::recording::{EngineCall, ManagerCall, OverlayCall, RecordingHost, StaticDeepLinks};

    fn coordinator(host: &RecordingHost) -> SessionCoordinator {
        SessionCoordinator::new(SessionId::new(), &SessionConfig::default(), host.services())
    }

    async fn drive(coordinator: &mut SessionCoordinator, phases: &[LifecyclePhase]) {
        for phase in phases {
            coordinator.on_lifecycle(*phase).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_operations_before_created_are_rejected() {
        let host = RecordingHost::new();
        let mut coordinator = coordinator(&host);

        let err = coordinator.create_screen().await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidState { operation: "create_screen", .. }));
        assert!(coordinator.on_auto_drive(true).await.is_err());
        assert!(coordinator.on_map_style_changed(&MapStyle::new("night")).is_err());
        assert!(host.journal.is_empty());
    }

    #[tokio::test]
    async fn test_phase_before_created_is_invalid_state() {
        let host = RecordingHost::new();
        let mut coordinator = coordinator(&host);

        for phase in [Started, Resumed, Paused, Stopped, Destroyed] {
            let err = coordinator.on_lifecycle(phase).await.unwrap_err();
            assert_eq!(err, SessionError::invalid_state("lifecycle", "uninitialized"));
        }
        assert_eq!(coordinator.phase(), None);
        assert!(host.journal.is_empty());

        drive(&mut coordinator, &[Created]).await;
        let err = coordinator.on_lifecycle(Resumed).await.unwrap_err();
        assert!(matches!(err, SessionError::Lifecycle(_)));
    }

    #[tokio::test]
    async fn test_resumed_window_registers_overlays() {
        let host = RecordingHost::new();
        let mut coordinator = coordinator(&host);

        drive(&mut coordinator, &[Created, Started, Resumed, Resumed]).await;
        assert_eq!(
            coordinator.registered_overlays(),
            vec![OverlayId::from("compass"), OverlayId::from("logo")]
        );
        assert_eq!(host.overlays.calls().len(), 2);

        drive(&mut coordinator, &[Paused]).await;
        assert!(coordinator.registered_overlays().is_empty());
        assert_eq!(
            host.overlays.calls()[2..].to_vec(),
            vec![
                OverlayCall::Detach(OverlayId::from("compass")),
                OverlayCall::Detach(OverlayId::from("logo")),
            ]
        );
    }

    #[tokio::test]
    async fn test_started_window_owns_both_scopes() {
        let host = RecordingHost::new();
        let mut coordinator = coordinator(&host);

        drive(&mut coordinator, &[Created, Started]).await;
        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.auto_drive.live(), 1);
        assert_eq!(snapshot.screen_state.live(), 1);

        drive(&mut coordinator, &[Resumed, Paused, Stopped]).await;
        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.auto_drive.live(), 0);
        assert_eq!(snapshot.screen_state.live(), 0);
        assert_eq!(host.screen_state.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_started_window_pairs_manager_registration() {
        let host = RecordingHost::new();
        let mut coordinator = coordinator(&host);

        drive(&mut coordinator, &[Created, Started, Started]).await;
        assert_eq!(host.navigation_manager.calls(), vec![ManagerCall::Register]);

        drive(&mut coordinator, &[Resumed, Paused, Stopped, Stopped, Started, Stopped]).await;
        assert_eq!(
            host.navigation_manager.calls(),
            vec![
                ManagerCall::Register,
                ManagerCall::Unregister,
                ManagerCall::Register,
                ManagerCall::Unregister,
            ]
        );

        drive(&mut coordinator, &[Started]).await;
        coordinator.shutdown().await;
        coordinator.shutdown().await;
        assert_eq!(host.navigation_manager.calls().len(), 6);
        assert!(!host.navigation_manager.is_registered());
    }

    #[tokio::test]
    async fn test_destroyed_while_started_unregisters() {
        let host = RecordingHost::new();
        let mut coordinator = coordinator(&host);

        drive(&mut coordinator, &[Created, Started, Resumed, Destroyed]).await;
        assert_eq!(
            host.navigation_manager.calls(),
            vec![ManagerCall::Register, ManagerCall::Unregister]
        );
    }

    #[tokio::test]
    async fn test_initial_map_style_applied_on_created() {
        let host = RecordingHost::new();
        let mut config = SessionConfig::default();
        config.initial_map_style = Some(MapStyle::new("night"));
        let mut coordinator = SessionCoordinator::new(SessionId::new(), &config, host.services());

        assert!(host.map_style.applied().is_empty());
        drive(&mut coordinator, &[Created, Started]).await;
        assert_eq!(host.map_style.applied(), vec![MapStyle::new("night")]);

        coordinator.on_map_style_changed(&MapStyle::new("day")).unwrap();
        assert_eq!(
            host.map_style.applied(),
            vec![MapStyle::new("night"), MapStyle::new("day")]
        );
    }

    #[tokio::test]
    async fn test_auto_drive_sequence_with_permission() {
        let host = RecordingHost::new();
        host.permission.set(true);
        let mut coordinator = coordinator(&host);
        drive(&mut coordinator, &[Created]).await;

        assert_eq!(coordinator.on_auto_drive(true).await.unwrap(), TripMode::Replaying);
        assert_eq!(coordinator.on_auto_drive(true).await.unwrap(), TripMode::Replaying);
        assert_eq!(coordinator.on_auto_drive(false).await.unwrap(), TripMode::Recording);
        assert_eq!(
            host.engine.calls(),
            vec![
                EngineCall::StartReplay,
                EngineCall::StopReplay,
                EngineCall::StartTripSession,
            ]
        );
    }

    #[tokio::test]
    async fn test_auto_drive_without_permission_is_inert() {
        let host = RecordingHost::new();
        let mut coordinator = coordinator(&host);
        drive(&mut coordinator, &[Created]).await;

        for enabled in [true, false, true] {
            assert_eq!(coordinator.on_auto_drive(enabled).await.unwrap(), TripMode::Idle);
        }
        assert!(host.engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_next_signal_delivers_auto_drive_value() {
        let host = RecordingHost::new();
        host.auto_drive.set(true);
        let mut coordinator = coordinator(&host);
        drive(&mut coordinator, &[Created, Started]).await;

        assert_eq!(coordinator.next_signal().await, SessionSignal::AutoDrive(true));
    }

    #[tokio::test]
    async fn test_intent_routing_pushes_screen() {
        let links = StaticDeepLinks::new().with_link("geo:1,2", Screen::named("route-preview"));
        let host = RecordingHost::with_deep_links(links);
        let mut coordinator = coordinator(&host);
        drive(&mut coordinator, &[Created]).await;

        let screen = coordinator
            .on_new_intent(NavigationIntent::navigate("geo:1,2"))
            .await
            .unwrap();
        assert_eq!(screen, Screen::PermissionRequest);

        host.permission.set(true);
        let screen = coordinator
            .on_new_intent(NavigationIntent::navigate("geo:1,2"))
            .await
            .unwrap();
        assert_eq!(screen, Screen::named("route-preview"));
        assert_eq!(
            host.screens.pushed(),
            vec![Screen::PermissionRequest, Screen::named("route-preview")]
        );
    }

    #[tokio::test]
    async fn test_create_screen_is_not_pushed() {
        let host = RecordingHost::new();
        let mut coordinator = coordinator(&host);
        drive(&mut coordinator, &[Created]).await;

        assert_eq!(coordinator.create_screen().await.unwrap(), Screen::PermissionRequest);
        host.permission.set(true);
        assert_eq!(coordinator.create_screen().await.unwrap(), Screen::named("free-drive"));
        assert!(host.screens.pushed().is_empty());
    }

    #[tokio::test]
    async fn test_destroyed_rejects_everything() {
        let host = RecordingHost::new();
        host.permission.set(true);
        let mut coordinator = coordinator(&host);
        drive(&mut coordinator, &[Created, Destroyed]).await;
        let before = host.journal.len();

        assert!(matches!(
            coordinator.on_lifecycle(Created).await,
            Err(SessionError::InvalidState { .. })
        ));
        assert!(matches!(
            coordinator.on_lifecycle(Destroyed).await,
            Err(SessionError::InvalidState { .. })
        ));
        assert!(coordinator.on_auto_drive(true).await.is_err());
        assert!(coordinator.on_screen_state_changed().await.is_err());
        assert!(coordinator.on_new_intent(NavigationIntent::other("x")).await.is_err());
        assert!(coordinator.on_map_style_changed(&MapStyle::new("day")).is_err());
        assert!(coordinator.create_screen().await.is_err());

        assert_eq!(host.journal.len(), before);
        assert_eq!(coordinator.trip_mode(), None);
    }
}
