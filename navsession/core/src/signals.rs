//! Signal Sources
//!
//! External collaborators publish long-lived signal streams (the auto-drive
//! flag, screen-state changes). A [`SignalSource`] is a factory for those
//! streams: every call to [`SignalSource::subscribe`] yields a fresh,
//! independent stream so a window re-entry never inherits state from the
//! previous subscription.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};

/// A lazy, potentially infinite stream of signal values
pub type SignalStream<T> = BoxStream<'static, T>;

/// Produces independent subscriptions to an external signal
pub trait SignalSource<T>: Send + Sync {
    /// Start a new subscription
    fn subscribe(&self) -> SignalStream<T>;
}

impl<T, F> SignalSource<T> for F
where
    F: Fn() -> SignalStream<T> + Send + Sync,
{
    fn subscribe(&self) -> SignalStream<T> {
        self()
    }
}

/// State-holding source: each subscription yields the current value first,
/// then every change
pub struct WatchSource<T> {
    rx: watch::Receiver<T>,
}

impl<T> WatchSource<T> {
    /// Wrap a watch receiver
    #[must_use]
    pub fn new(rx: watch::Receiver<T>) -> Self {
        Self { rx }
    }
}

impl<T> SignalSource<T> for WatchSource<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn subscribe(&self) -> SignalStream<T> {
        WatchStream::new(self.rx.clone()).boxed()
    }
}

/// Event source: each subscription yields only values sent after it started
///
/// The source holds a receiver, never a sender, so every subscription ends
/// once the producer drops its sender.
pub struct BroadcastSource<T> {
    rx: broadcast::Receiver<T>,
    name: &'static str,
    _parked: Option<ParkedReceiver>,
}

impl<T> BroadcastSource<T> {
    /// Wrap a broadcast receiver; subscriptions resubscribe from it
    #[must_use]
    pub fn new(name: &'static str, rx: broadcast::Receiver<T>) -> Self {
        Self {
            rx,
            name,
            _parked: None,
        }
    }
}

impl<T> SignalSource<T> for BroadcastSource<T>
where
    T: Clone + Send + 'static,
{
    fn subscribe(&self) -> SignalStream<T> {
        let name = self.name;
        BroadcastStream::new(self.rx.resubscribe())
            .filter_map(move |item| async move {
                match item {
                    Ok(value) => Some(value),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        tracing::warn!(source = name, skipped, "Signal subscriber lagged");
                        None
                    }
                }
            })
            .boxed()
    }
}

/// Externally toggled auto-drive flag
///
/// The latest value is authoritative; a new subscriber sees it immediately.
#[derive(Clone, Debug)]
pub struct AutoDriveToggle {
    tx: watch::Sender<bool>,
}

impl AutoDriveToggle {
    /// Create a toggle with an initial value
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        let (tx, _rx) = watch::channel(enabled);
        Self { tx }
    }

    /// Set the flag; subscribers are notified even when the value repeats
    pub fn set(&self, enabled: bool) {
        self.tx.send_replace(enabled);
    }

    /// Current value
    #[must_use]
    pub fn get(&self) -> bool {
        *self.tx.borrow()
    }

    /// Source for a subscription scope
    #[must_use]
    pub fn source(&self) -> WatchSource<bool> {
        WatchSource::new(self.tx.subscribe())
    }
}

impl Default for AutoDriveToggle {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Counts a receiver held by a source rather than by a subscriber
#[derive(Debug)]
struct ParkedReceiver(Arc<AtomicUsize>);

impl ParkedReceiver {
    fn new(count: &Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::Relaxed);
        Self(Arc::clone(count))
    }
}

impl Drop for ParkedReceiver {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Opaque notification that the app's screen state changed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenStateChanged;

/// Publisher of screen-state notifications
///
/// Dropping the last clone ends every subscription made from its sources.
#[derive(Clone, Debug)]
pub struct ScreenStateFeed {
    tx: broadcast::Sender<ScreenStateChanged>,
    parked: Arc<AtomicUsize>,
}

impl ScreenStateFeed {
    /// Create a feed retaining up to `capacity` undelivered notifications
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            parked: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Publish a change; returns the number of live subscribers
    pub fn notify(&self) -> usize {
        if self.tx.send(ScreenStateChanged).is_err() {
            return 0;
        }
        self.subscriber_count()
    }

    /// Number of live subscribers, not counting receivers held by sources
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx
            .receiver_count()
            .saturating_sub(self.parked.load(Ordering::Relaxed))
    }

    /// Source for a subscription scope
    #[must_use]
    pub fn source(&self) -> BroadcastSource<ScreenStateChanged> {
        BroadcastSource {
            rx: self.tx.subscribe(),
            name: "screen-state",
            _parked: Some(ParkedReceiver::new(&self.parked)),
        }
    }
}

impl Default for ScreenStateFeed {
    fn default() -> Self {
        Self::new(16)
    }
}
