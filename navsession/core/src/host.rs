//! Host Services
//!
//! Everything the session consumes from the outside world, bundled so it can
//! be handed to [`Session::new`](crate::session::Session::new) explicitly.
//! There is no process-wide registry: two sessions built from two bundles
//! share nothing.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::overlay::OverlayRenderer;
use crate::permission::PermissionGate;
use crate::screen::{DeepLinkHandler, ScreenManager, ScreenStack};
use crate::signals::{ScreenStateChanged, SignalSource};
use crate::trip_session::NavigationEngine;

/// Opaque map style identifier (e.g. a day or night style)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapStyle(String);

impl MapStyle {
    /// Wrap a style id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the style id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MapStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Receives map style changes
pub trait MapStyleSink: Send + Sync {
    /// Apply a style to the map surface
    fn apply_style(&self, style: &MapStyle);
}

/// Host navigation manager the session registers with while started
///
/// Registration must be paired: every `register` is followed by exactly one
/// `unregister` before the next `register`.
pub trait NavigationManager: Send + Sync {
    /// Announce the session to the host
    fn register(&self);

    /// Withdraw the session from the host
    fn unregister(&self);
}

/// Collaborators a session is wired to
#[derive(Clone)]
pub struct HostServices {
    /// Location permission query
    pub permissions: Arc<dyn PermissionGate>,
    /// Navigation engine trip controls
    pub engine: Arc<dyn NavigationEngine>,
    /// Map overlay drawing
    pub overlays: Arc<dyn OverlayRenderer>,
    /// Host screen stack
    pub screens: Arc<dyn ScreenStack>,
    /// Default screen provider
    pub screen_manager: Arc<dyn ScreenManager>,
    /// Deep-link resolution
    pub deep_links: Arc<dyn DeepLinkHandler>,
    /// Map style application
    pub map_style: Arc<dyn MapStyleSink>,
    /// Host navigation manager
    pub navigation_manager: Arc<dyn NavigationManager>,
    /// Auto-drive flag stream
    pub auto_drive: Arc<dyn SignalSource<bool>>,
    /// Screen-state change stream
    pub screen_state: Arc<dyn SignalSource<ScreenStateChanged>>,
}

impl fmt::Debug for HostServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostServices").finish_non_exhaustive()
    }
}
