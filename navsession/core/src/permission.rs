//! Location Permission
//!
//! The permission state belongs to the host platform. It is queried fresh for
//! every decision and never cached here, because the driver can revoke it at
//! any time from outside the session.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

/// Answers whether fine location access is currently granted
#[async_trait]
pub trait PermissionGate: Send + Sync {
    /// Query the current permission state
    async fn location_granted(&self) -> bool;
}

/// Host-settable permission state
#[derive(Debug, Default)]
pub struct PermissionSwitch {
    granted: AtomicBool,
}

impl PermissionSwitch {
    /// Create a switch with an initial state
    #[must_use]
    pub fn new(granted: bool) -> Self {
        Self {
            granted: AtomicBool::new(granted),
        }
    }

    /// Grant or revoke
    pub fn set(&self, granted: bool) {
        let previous = self.granted.swap(granted, Ordering::SeqCst);
        if previous != granted {
            tracing::info!(granted, "Location permission changed");
        }
    }

    /// Current state
    #[must_use]
    pub fn get(&self) -> bool {
        self.granted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionGate for PermissionSwitch {
    async fn location_granted(&self) -> bool {
        self.get()
    }
}
