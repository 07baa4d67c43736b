//! Recording Collaborators
//!
//! In-memory implementations of every host collaborator. Each one records
//! the calls it receives in a [`CallLog`], and a [`RecordingHost`] also
//! writes them into one shared journal so the relative order of calls
//! across collaborators can be observed.
//!
//! Used by the simulator and by tests. Waiting on a log
//! ([`CallLog::wait_for_len`]) replaces polling: the log is backed by a
//! watch channel, so waiters wake exactly when an entry lands.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::watch;

use crate::host::{HostServices, MapStyle, MapStyleSink, NavigationManager};
use crate::overlay::{OverlayId, OverlayRenderer};
use crate::permission::PermissionSwitch;
use crate::screen::{DeepLinkHandler, NavigationIntent, Screen, ScreenManager, ScreenStack};
use crate::signals::{AutoDriveToggle, ScreenStateFeed};
use crate::trip_session::{EngineTripState, NavigationEngine};

// ============================================================================
// Call log
// ============================================================================

/// Append-only log that can be awaited
pub struct CallLog<T> {
    tx: watch::Sender<Vec<T>>,
}

impl<T: Clone> CallLog<T> {
    /// Create an empty log
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Vec::new());
        Self { tx }
    }

    /// Append an entry and wake waiters
    pub fn push(&self, entry: T) {
        self.tx.send_modify(|entries| entries.push(entry));
    }

    /// Copy of every entry so far
    #[must_use]
    pub fn entries(&self) -> Vec<T> {
        self.tx.borrow().clone()
    }

    /// Entries from index `from` onwards
    #[must_use]
    pub fn since(&self, from: usize) -> Vec<T> {
        self.tx
            .borrow()
            .get(from..)
            .map(<[T]>::to_vec)
            .unwrap_or_default()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    /// Whether nothing was logged
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until at least `n` entries exist, then return them all
    pub async fn wait_for_len(&self, n: usize) -> Vec<T> {
        let mut rx = self.tx.subscribe();
        let entries = match rx.wait_for(|entries| entries.len() >= n).await {
            Ok(entries) => entries.clone(),
            // Unreachable while `self` holds the sender
            Err(_) => self.entries(),
        };
        entries
    }
}

impl<T: Clone> Default for CallLog<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for CallLog<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.tx.borrow().iter()).finish()
    }
}

/// A call to any collaborator, in journal order
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "collaborator", content = "call", rename_all = "snake_case")]
pub enum HostCall {
    /// Navigation engine call
    Engine(EngineCall),
    /// Overlay renderer call
    Overlay(OverlayCall),
    /// Screen stack push
    Screen(Screen),
    /// Map style applied
    MapStyle(MapStyle),
    /// Navigation manager registration change
    NavigationManager(ManagerCall),
}

/// Shared journal of host calls
pub type Journal = Arc<CallLog<HostCall>>;

fn record<T: Clone>(log: &CallLog<T>, journal: Option<&Journal>, call: T, wrap: fn(T) -> HostCall) {
    log.push(call.clone());
    if let Some(journal) = journal {
        journal.push(wrap(call));
    }
}

// ============================================================================
// Navigation engine
// ============================================================================

/// A navigation engine call
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineCall {
    /// `start_replay`
    StartReplay,
    /// `stop_replay`
    StopReplay,
    /// `start_trip_session`
    StartTripSession,
    /// `stop_trip_session`
    StopTripSession,
}

#[derive(Debug)]
struct EngineState {
    trip: EngineTripState,
    replaying: bool,
}

/// Engine that records calls and tracks its own trip state
#[derive(Debug)]
pub struct RecordingEngine {
    calls: CallLog<EngineCall>,
    state: Mutex<EngineState>,
    journal: Option<Journal>,
}

impl RecordingEngine {
    /// Engine with a stopped trip session
    #[must_use]
    pub fn new() -> Self {
        Self {
            calls: CallLog::new(),
            state: Mutex::new(EngineState {
                trip: EngineTripState::Stopped,
                replaying: false,
            }),
            journal: None,
        }
    }

    /// Also write calls into `journal`
    #[must_use]
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Calls received so far
    #[must_use]
    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.entries()
    }

    /// The underlying log
    #[must_use]
    pub fn log(&self) -> &CallLog<EngineCall> {
        &self.calls
    }

    /// Change the trip state behind the session's back
    pub fn set_trip_state(&self, trip: EngineTripState) {
        self.state.lock().trip = trip;
    }

    /// Whether replay is running
    #[must_use]
    pub fn is_replaying(&self) -> bool {
        self.state.lock().replaying
    }

    fn record(&self, call: EngineCall) {
        record(&self.calls, self.journal.as_ref(), call, HostCall::Engine);
    }
}

impl Default for RecordingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl NavigationEngine for RecordingEngine {
    fn trip_session_state(&self) -> EngineTripState {
        self.state.lock().trip
    }

    fn start_trip_session(&self) {
        self.state.lock().trip = EngineTripState::Started;
        self.record(EngineCall::StartTripSession);
    }

    fn stop_trip_session(&self) {
        self.state.lock().trip = EngineTripState::Stopped;
        self.record(EngineCall::StopTripSession);
    }

    fn start_replay(&self) {
        self.state.lock().replaying = true;
        self.record(EngineCall::StartReplay);
    }

    fn stop_replay(&self) {
        self.state.lock().replaying = false;
        self.record(EngineCall::StopReplay);
    }
}

// ============================================================================
// Overlays
// ============================================================================

/// An overlay renderer call
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "op", content = "overlay", rename_all = "snake_case")]
pub enum OverlayCall {
    /// `attach`
    Attach(OverlayId),
    /// `detach`
    Detach(OverlayId),
}

/// Renderer that records attach/detach calls
#[derive(Debug, Default)]
pub struct RecordingOverlays {
    calls: CallLog<OverlayCall>,
    journal: Option<Journal>,
}

impl RecordingOverlays {
    /// Empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also write calls into `journal`
    #[must_use]
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Calls received so far
    #[must_use]
    pub fn calls(&self) -> Vec<OverlayCall> {
        self.calls.entries()
    }

    /// The underlying log
    #[must_use]
    pub fn log(&self) -> &CallLog<OverlayCall> {
        &self.calls
    }
}

impl OverlayRenderer for RecordingOverlays {
    fn attach(&self, id: &OverlayId) {
        record(
            &self.calls,
            self.journal.as_ref(),
            OverlayCall::Attach(id.clone()),
            HostCall::Overlay,
        );
    }

    fn detach(&self, id: &OverlayId) {
        record(
            &self.calls,
            self.journal.as_ref(),
            OverlayCall::Detach(id.clone()),
            HostCall::Overlay,
        );
    }
}

// ============================================================================
// Screens
// ============================================================================

/// Screen stack that records pushes
#[derive(Debug, Default)]
pub struct RecordingScreens {
    pushed: CallLog<Screen>,
    journal: Option<Journal>,
}

impl RecordingScreens {
    /// Empty stack
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also write pushes into `journal`
    #[must_use]
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Screens pushed so far, oldest first
    #[must_use]
    pub fn pushed(&self) -> Vec<Screen> {
        self.pushed.entries()
    }

    /// The underlying log
    #[must_use]
    pub fn log(&self) -> &CallLog<Screen> {
        &self.pushed
    }
}

impl ScreenStack for RecordingScreens {
    fn push(&self, screen: Screen) {
        record(&self.pushed, self.journal.as_ref(), screen, HostCall::Screen);
    }
}

/// Screen manager whose current screen can be changed
#[derive(Debug)]
pub struct RecordingScreenManager {
    current: RwLock<Screen>,
}

impl RecordingScreenManager {
    /// Manager reporting `screen`
    #[must_use]
    pub fn new(screen: Screen) -> Self {
        Self {
            current: RwLock::new(screen),
        }
    }

    /// Change the reported screen
    pub fn set(&self, screen: Screen) {
        *self.current.write() = screen;
    }
}

impl Default for RecordingScreenManager {
    fn default() -> Self {
        Self::new(Screen::named("free-drive"))
    }
}

impl ScreenManager for RecordingScreenManager {
    fn current_screen(&self) -> Screen {
        self.current.read().clone()
    }
}

/// Deep-link handler backed by a fixed payload table
#[derive(Clone, Debug, Default)]
pub struct StaticDeepLinks {
    links: HashMap<String, Screen>,
}

impl StaticDeepLinks {
    /// Empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `payload` to `screen`
    #[must_use]
    pub fn with_link(mut self, payload: impl Into<String>, screen: Screen) -> Self {
        self.links.insert(payload.into(), screen);
        self
    }
}

impl DeepLinkHandler for StaticDeepLinks {
    fn handle(&self, intent: &NavigationIntent) -> Option<Screen> {
        self.links.get(&intent.payload).cloned()
    }
}

// ============================================================================
// Map style
// ============================================================================

/// Style sink that records applied styles
#[derive(Debug, Default)]
pub struct RecordingMapStyle {
    applied: CallLog<MapStyle>,
    journal: Option<Journal>,
}

impl RecordingMapStyle {
    /// Empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also write styles into `journal`
    #[must_use]
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Styles applied so far
    #[must_use]
    pub fn applied(&self) -> Vec<MapStyle> {
        self.applied.entries()
    }
}

impl MapStyleSink for RecordingMapStyle {
    fn apply_style(&self, style: &MapStyle) {
        record(
            &self.applied,
            self.journal.as_ref(),
            style.clone(),
            HostCall::MapStyle,
        );
    }
}

// ============================================================================
// Navigation manager
// ============================================================================

/// A navigation manager call
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerCall {
    /// `register`
    Register,
    /// `unregister`
    Unregister,
}

/// Navigation manager that records registration calls
#[derive(Debug, Default)]
pub struct RecordingNavigationManager {
    calls: CallLog<ManagerCall>,
    journal: Option<Journal>,
}

impl RecordingNavigationManager {
    /// Empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also write calls into `journal`
    #[must_use]
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Calls made so far
    #[must_use]
    pub fn calls(&self) -> Vec<ManagerCall> {
        self.calls.entries()
    }

    /// Whether the last call left the manager registered
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.calls.entries().last() == Some(&ManagerCall::Register)
    }
}

impl NavigationManager for RecordingNavigationManager {
    fn register(&self) {
        record(
            &self.calls,
            self.journal.as_ref(),
            ManagerCall::Register,
            HostCall::NavigationManager,
        );
    }

    fn unregister(&self) {
        record(
            &self.calls,
            self.journal.as_ref(),
            ManagerCall::Unregister,
            HostCall::NavigationManager,
        );
    }
}

// ============================================================================
// Bundle
// ============================================================================

/// Every recording collaborator plus the producers feeding the session
#[derive(Debug)]
pub struct RecordingHost {
    /// Calls to all collaborators, in order
    pub journal: Journal,
    /// Permission state
    pub permission: Arc<PermissionSwitch>,
    /// Navigation engine
    pub engine: Arc<RecordingEngine>,
    /// Overlay renderer
    pub overlays: Arc<RecordingOverlays>,
    /// Screen stack
    pub screens: Arc<RecordingScreens>,
    /// Default screen provider
    pub screen_manager: Arc<RecordingScreenManager>,
    /// Deep-link table
    pub deep_links: Arc<StaticDeepLinks>,
    /// Map style sink
    pub map_style: Arc<RecordingMapStyle>,
    /// Navigation manager registration
    pub navigation_manager: Arc<RecordingNavigationManager>,
    /// Auto-drive flag producer
    pub auto_drive: AutoDriveToggle,
    /// Screen-state producer
    pub screen_state: ScreenStateFeed,
}

impl RecordingHost {
    /// Host with permission denied, auto-drive off and no deep links
    #[must_use]
    pub fn new() -> Self {
        Self::with_deep_links(StaticDeepLinks::new())
    }

    /// Host resolving intents through `deep_links`
    #[must_use]
    pub fn with_deep_links(deep_links: StaticDeepLinks) -> Self {
        let journal: Journal = Arc::new(CallLog::new());
        Self {
            permission: Arc::new(PermissionSwitch::new(false)),
            engine: Arc::new(RecordingEngine::new().with_journal(journal.clone())),
            overlays: Arc::new(RecordingOverlays::new().with_journal(journal.clone())),
            screens: Arc::new(RecordingScreens::new().with_journal(journal.clone())),
            screen_manager: Arc::new(RecordingScreenManager::default()),
            deep_links: Arc::new(deep_links),
            map_style: Arc::new(RecordingMapStyle::new().with_journal(journal.clone())),
            navigation_manager: Arc::new(
                RecordingNavigationManager::new().with_journal(journal.clone()),
            ),
            auto_drive: AutoDriveToggle::default(),
            screen_state: ScreenStateFeed::default(),
            journal,
        }
    }

    /// Services wired to these collaborators
    #[must_use]
    pub fn services(&self) -> HostServices {
        HostServices {
            permissions: self.permission.clone(),
            engine: self.engine.clone(),
            overlays: self.overlays.clone(),
            screens: self.screens.clone(),
            screen_manager: self.screen_manager.clone(),
            deep_links: self.deep_links.clone(),
            map_style: self.map_style.clone(),
            navigation_manager: self.navigation_manager.clone(),
            auto_drive: Arc::new(self.auto_drive.source()),
            screen_state: Arc::new(self.screen_state.source()),
        }
    }
}

impl Default for RecordingHost {
    fn default() -> Self {
        Self::new()
    }
}
