//! Map Overlay Registry
//!
//! Tracks which overlays (logo, compass, ...) are attached to the map
//! surface. Registration is idempotent in both directions so repeated host
//! notifications never attach an overlay twice or detach one that is gone.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identifier of a map overlay
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OverlayId(String);

impl OverlayId {
    /// Create an overlay id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the string value
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OverlayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OverlayId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Overlay rendering collaborator (the map surface)
pub trait OverlayRenderer: Send + Sync {
    /// Start drawing the overlay
    fn attach(&self, id: &OverlayId);
    /// Stop drawing the overlay
    fn detach(&self, id: &OverlayId);
}

/// Bookkeeping for one attached overlay
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OverlayHandle {
    /// Monotonic registration number, unique within the registry
    pub registration: u64,
}

/// Owns the set of attached overlays
pub struct OverlayRegistry {
    renderer: Arc<dyn OverlayRenderer>,
    overlays: Vec<OverlayId>,
    registered: HashMap<OverlayId, OverlayHandle>,
    registrations: u64,
}

impl OverlayRegistry {
    /// Create a registry managing `overlays`
    #[must_use]
    pub fn new(renderer: Arc<dyn OverlayRenderer>, overlays: Vec<OverlayId>) -> Self {
        Self {
            renderer,
            overlays,
            registered: HashMap::new(),
            registrations: 0,
        }
    }

    /// Overlays this registry manages, in configuration order
    #[must_use]
    pub fn overlays(&self) -> &[OverlayId] {
        &self.overlays
    }

    /// Attach one overlay; returns `false` if it was already attached
    pub fn register(&mut self, id: &OverlayId) -> bool {
        if self.registered.contains_key(id) {
            tracing::debug!(overlay = %id, "Overlay already registered");
            return false;
        }

        self.registrations += 1;
        self.renderer.attach(id);
        self.registered.insert(
            id.clone(),
            OverlayHandle {
                registration: self.registrations,
            },
        );
        true
    }

    /// Detach one overlay; returns `false` if it was not attached
    pub fn unregister(&mut self, id: &OverlayId) -> bool {
        if self.registered.remove(id).is_none() {
            tracing::debug!(overlay = %id, "Overlay not registered");
            return false;
        }

        self.renderer.detach(id);
        true
    }

    /// Attach every managed overlay; returns how many were newly attached
    pub fn register_all(&mut self) -> usize {
        let overlays = self.overlays.clone();
        let attached = overlays.iter().filter(|id| self.register(id)).count();
        tracing::debug!(attached, "Overlays registered");
        attached
    }

    /// Detach every attached overlay; returns how many were detached
    pub fn unregister_all(&mut self) -> usize {
        // Reverse configuration order, like a stack
        let overlays = self.overlays.clone();
        let detached = overlays.iter().rev().filter(|id| self.unregister(id)).count();
        tracing::debug!(detached, "Overlays unregistered");
        detached
    }

    /// Whether `id` is attached
    #[must_use]
    pub fn is_registered(&self, id: &OverlayId) -> bool {
        self.registered.contains_key(id)
    }

    /// Handle of an attached overlay
    #[must_use]
    pub fn handle(&self, id: &OverlayId) -> Option<OverlayHandle> {
        self.registered.get(id).copied()
    }

    /// Attached overlays, sorted
    #[must_use]
    pub fn registered(&self) -> Vec<OverlayId> {
        let mut ids: Vec<OverlayId> = self.registered.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl fmt::Debug for OverlayRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverlayRegistry")
            .field("overlays", &self.overlays)
            .field("registered", &self.registered())
            .finish_non_exhaustive()
    }
}
