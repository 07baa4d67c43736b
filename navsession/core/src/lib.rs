//! Navsession Core - Lifecycle-Scoped Coordination for In-Vehicle Navigation
//!
//! This crate coordinates a navigation session's visible screen, map overlays
//! and trip-recording mode against a lifecycle imposed by the host runtime
//! and a set of continuous signals (permission, auto-drive flag, screen
//! state, intents, map style). Every external system is reached through a
//! narrow trait, so the crate runs the same against a real head unit or the
//! in-memory recorders in [`recording`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Host Runtime                            │
//! │   lifecycle phases · intents · map style       signal streams    │
//! └──────────────┬───────────────────────────────────────┬───────────┘
//!                │ SessionHandle (commands)              │ SignalSource
//! ┌──────────────┼───────────────────────────────────────┼───────────┐
//! │              ▼          SESSION TASK                 ▼           │
//! │   ┌─────────────────────────────────────────────────────────┐    │
//! │   │                  SessionCoordinator                     │    │
//! │   │  LifecycleController ─► window open / close events      │    │
//! │   │  ┌──────────────────┐ ┌──────────────┐ ┌─────────────┐  │    │
//! │   │  │ SubscriptionScope│ │ TripSession  │ │  Overlay    │  │    │
//! │   │  │ auto-drive/screen│ │ Controller   │ │  Registry   │  │    │
//! │   │  └──────────────────┘ └──────────────┘ └─────────────┘  │    │
//! │   │                ScreenRouter (pure)                      │    │
//! │   └─────────────────────────────────────────────────────────┘    │
//! └──────────────────────────────┬───────────────────────────────────┘
//!                                │ HostServices
//!        NavigationEngine · OverlayRenderer · ScreenStack · MapStyleSink
//!                        NavigationManager
//! ```
//!
//! # Key Types
//!
//! - [`Session`]: Owns a coordinator and runs it on one task
//! - [`SessionHandle`]: Cloneable handle the host uses to deliver notifications
//! - [`SessionCoordinator`]: Lifecycle-driven state machine
//! - [`SubscriptionScope`]: Binds a signal stream to a lifecycle window
//! - [`HostServices`]: The collaborators a session is wired to
//!
//! # Quick Start
//!
//! ```ignore
//! use navsession_core::{load_config, recording::RecordingHost, LifecyclePhase, Session};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     let host = RecordingHost::new();
//!     let (handle, task) = Session::spawn(&config, host.services());
//!
//!     handle.lifecycle(LifecyclePhase::Created).await?;
//!     handle.lifecycle(LifecyclePhase::Started).await?;
//!     let screen = handle.create_screen().await?;
//!
//!     drop(handle);
//!     task.await?;
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`lifecycle`]: Phase state machine and window events
//! - [`subscription`]: Lifecycle-scoped stream subscriptions
//! - [`signals`]: Signal sources and producers
//! - [`coordinator`]: The session state machine
//! - [`session`]: Single-task runner and host handle
//! - [`trip_session`]: Replay / recording mode control
//! - [`overlay`]: Map overlay registration
//! - [`screen`]: Screen routing
//! - [`permission`]: Location permission query
//! - [`host`]: Collaborator bundle
//! - [`config`]: TOML / environment configuration
//! - [`recording`]: In-memory collaborators for simulation and tests

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod coordinator;
pub mod host;
pub mod lifecycle;
pub mod overlay;
pub mod permission;
pub mod recording;
pub mod screen;
pub mod session;
pub mod signals;
pub mod subscription;
pub mod trip_session;

// Re-exports for convenience
pub use coordinator::{SessionCoordinator, SessionSignal};
pub use host::{HostServices, MapStyle, MapStyleSink, NavigationManager};
pub use lifecycle::{LifecycleController, LifecycleError, LifecyclePhase, PhaseTransition, Window};
pub use overlay::{OverlayId, OverlayRegistry, OverlayRenderer};
pub use permission::{PermissionGate, PermissionSwitch};
pub use screen::{
    DeepLinkHandler, IntentAction, NavigationIntent, Screen, ScreenManager, ScreenRouter,
    ScreenStack,
};
pub use session::{Session, SessionError, SessionHandle, SessionId, SessionSnapshot};
pub use signals::{
    AutoDriveToggle, BroadcastSource, ScreenStateChanged, ScreenStateFeed, SignalSource,
    SignalStream, WatchSource,
};
pub use subscription::{ScopeStats, SubscriptionId, SubscriptionScope};
pub use trip_session::{
    EngineTripState, NavigationEngine, TransitionOutcome, TripMode, TripSessionController,
};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    ConfigSource, SessionConfig, SessionToml,
};
