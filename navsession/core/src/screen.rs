//! Screen Routing
//!
//! Decides which screen the host should display. The decision is a pure
//! function of the permission state, an optional pending intent and the
//! screen manager's current default; the host's screen stack is only ever
//! written by the coordinator, never by the router.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A screen the host can display
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Screen {
    /// Asks the driver to grant location access
    PermissionRequest,
    /// Any other screen, identified by name
    Named(String),
}

impl Screen {
    /// Create a named screen
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Whether this is the permission request screen
    #[must_use]
    pub fn is_permission_request(&self) -> bool {
        matches!(self, Self::PermissionRequest)
    }
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PermissionRequest => f.write_str("permission-request"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// Action carried by an incoming intent
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentAction {
    /// Navigate directly to a destination
    Navigate,
    /// Anything else
    Other,
}

/// An intent delivered by the host
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationIntent {
    /// Requested action
    pub action: IntentAction,
    /// Opaque payload (e.g. a geo URI)
    pub payload: String,
}

impl NavigationIntent {
    /// Intent requesting navigation
    pub fn navigate(payload: impl Into<String>) -> Self {
        Self {
            action: IntentAction::Navigate,
            payload: payload.into(),
        }
    }

    /// Intent with an unrecognized action
    pub fn other(payload: impl Into<String>) -> Self {
        Self {
            action: IntentAction::Other,
            payload: payload.into(),
        }
    }
}

/// Turns navigate intents into screens
pub trait DeepLinkHandler: Send + Sync {
    /// Screen for the intent, or `None` when the link cannot be resolved
    fn handle(&self, intent: &NavigationIntent) -> Option<Screen>;
}

/// Handler that resolves nothing
#[derive(Clone, Copy, Debug, Default)]
pub struct NoDeepLinks;

impl DeepLinkHandler for NoDeepLinks {
    fn handle(&self, _intent: &NavigationIntent) -> Option<Screen> {
        None
    }
}

/// Source of the app's current default screen
pub trait ScreenManager: Send + Sync {
    /// Screen the app would show without any override
    fn current_screen(&self) -> Screen;
}

/// The host's screen stack
pub trait ScreenStack: Send + Sync {
    /// Display `screen` on top of the stack
    fn push(&self, screen: Screen);
}

/// Computes the screen to display
#[derive(Clone)]
pub struct ScreenRouter {
    deep_links: Arc<dyn DeepLinkHandler>,
}

impl ScreenRouter {
    /// Create a router delegating navigate intents to `deep_links`
    #[must_use]
    pub fn new(deep_links: Arc<dyn DeepLinkHandler>) -> Self {
        Self { deep_links }
    }

    /// Pick the screen to display
    ///
    /// Without location permission the permission request screen wins over
    /// everything. A navigate intent is offered to the deep-link handler;
    /// anything unresolved falls back to `fallback`.
    #[must_use]
    pub fn resolve(
        &self,
        permission_granted: bool,
        pending_intent: Option<&NavigationIntent>,
        fallback: Screen,
    ) -> Screen {
        if !permission_granted {
            return Screen::PermissionRequest;
        }

        match pending_intent {
            Some(intent) if intent.action == IntentAction::Navigate => {
                self.deep_links.handle(intent).unwrap_or_else(|| {
                    tracing::debug!(payload = %intent.payload, "Deep link unresolved, using fallback");
                    fallback
                })
            }
            _ => fallback,
        }
    }
}

impl Default for ScreenRouter {
    fn default() -> Self {
        Self::new(Arc::new(NoDeepLinks))
    }
}

impl fmt::Debug for ScreenRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScreenRouter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::StaticDeepLinks;

    fn router() -> ScreenRouter {
        let links = StaticDeepLinks::new().with_link("geo:0,0?q=coffee", Screen::named("search"));
        ScreenRouter::new(Arc::new(links))
    }

    #[test]
    fn test_denied_permission_always_wins() {
        let router = router();
        let intents = [
            None,
            Some(NavigationIntent::navigate("geo:0,0?q=coffee")),
            Some(NavigationIntent::navigate("geo:unknown")),
            Some(NavigationIntent::other("geo:0,0?q=coffee")),
        ];

        for intent in &intents {
            let screen = router.resolve(false, intent.as_ref(), Screen::named("free-drive"));
            assert_eq!(screen, Screen::PermissionRequest);
        }
    }

    #[test]
    fn test_navigate_intent_uses_deep_link() {
        let router = router();
        let intent = NavigationIntent::navigate("geo:0,0?q=coffee");
        let screen = router.resolve(true, Some(&intent), Screen::named("free-drive"));
        assert_eq!(screen, Screen::named("search"));
    }

    #[test]
    fn test_unresolved_deep_link_falls_back() {
        let router = router();
        let intent = NavigationIntent::navigate("geo:nowhere");
        let screen = router.resolve(true, Some(&intent), Screen::named("free-drive"));
        assert_eq!(screen, Screen::named("free-drive"));
    }

    #[test]
    fn test_other_action_ignores_payload() {
        let router = router();
        let intent = NavigationIntent::other("geo:0,0?q=coffee");
        let screen = router.resolve(true, Some(&intent), Screen::named("free-drive"));
        assert_eq!(screen, Screen::named("free-drive"));
    }

    #[test]
    fn test_no_intent_returns_fallback() {
        let screen = ScreenRouter::default().resolve(true, None, Screen::named("route-preview"));
        assert_eq!(screen, Screen::named("route-preview"));
    }

    #[test]
    fn test_screen_serialization() {
        let json = serde_json::to_string(&Screen::named("search")).unwrap();
        assert_eq!(json, r#"{"kind":"named","name":"search"}"#);
        let json = serde_json::to_string(&Screen::PermissionRequest).unwrap();
        assert_eq!(json, r#"{"kind":"permission_request"}"#);
    }
}
