//! Lifecycle-Scoped Subscriptions
//!
//! A [`SubscriptionScope`] binds one [`SignalSource`] to one lifecycle
//! [`Window`]. While the window is open a listener task consumes the source
//! and forwards items over a bounded channel; the owner pulls them with
//! [`SubscriptionScope::recv`] on its own control flow, so item handling never
//! runs concurrently with anything else the owner does.
//!
//! # Lifetime of one subscription
//!
//! ```text
//!   open()                                   close()
//!     │                                        │
//!     ├─ new CancellationToken                 ├─ cancel token
//!     ├─ new mpsc channel ──► recv() ◄── owner ├─ drop receiver (buffered items discarded)
//!     └─ spawn listener(source.subscribe())    └─ await listener exit
//! ```
//!
//! Each `open` is a fresh generation. Nothing from an earlier generation can
//! reach the owner once `close` has returned, and re-opening never inherits
//! buffered items or stream state.

use std::fmt;
use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::lifecycle::Window;
use crate::signals::{SignalSource, SignalStream};

/// Identifies one generation of a scope's subscription
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct SubscriptionId {
    /// Scope name
    pub scope: &'static str,
    /// Generation number, starting at 1
    pub generation: u64,
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.scope, self.generation)
    }
}

/// Why a listener task ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListenerExit {
    /// Cancellation was requested
    Cancelled,
    /// The source stream ended
    SourceExhausted,
    /// The receiving side went away
    ReceiverDropped,
    /// The listener task panicked or was aborted
    Failed,
}

/// Open/close accounting for a scope
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ScopeStats {
    /// Subscriptions started
    pub opened: u64,
    /// Subscriptions ended (closed or terminated)
    pub closed: u64,
    /// Subscriptions that ended because the source stream ended
    pub terminated: u64,
    /// Items handed to the owner
    pub delivered: u64,
}

impl ScopeStats {
    /// Subscriptions currently live (always 0 or 1)
    #[must_use]
    pub fn live(&self) -> u64 {
        self.opened - self.closed
    }
}

struct ActiveSubscription<T> {
    id: SubscriptionId,
    cancel: CancellationToken,
    rx: mpsc::Receiver<T>,
    listener: JoinHandle<ListenerExit>,
}

impl<T> ActiveSubscription<T> {
    async fn shutdown(self) -> ListenerExit {
        let Self {
            id,
            cancel,
            rx,
            listener,
        } = self;

        cancel.cancel();
        // Buffered items are discarded with the receiver
        drop(rx);

        match listener.await {
            Ok(exit) => {
                tracing::debug!(subscription = %id, ?exit, "Listener stopped");
                exit
            }
            Err(e) => {
                tracing::warn!(subscription = %id, error = %e, "Listener task failed");
                ListenerExit::Failed
            }
        }
    }
}

/// Binds a signal source to a lifecycle window
pub struct SubscriptionScope<T> {
    name: &'static str,
    window: Window,
    source: Arc<dyn SignalSource<T>>,
    buffer: usize,
    generation: u64,
    active: Option<ActiveSubscription<T>>,
    stats: ScopeStats,
}

impl<T: Send + 'static> SubscriptionScope<T> {
    /// Create a closed scope
    ///
    /// `buffer` bounds the number of items forwarded but not yet received.
    #[must_use]
    pub fn new(
        name: &'static str,
        window: Window,
        source: Arc<dyn SignalSource<T>>,
        buffer: usize,
    ) -> Self {
        Self {
            name,
            window,
            source,
            buffer: buffer.max(1),
            generation: 0,
            active: None,
            stats: ScopeStats::default(),
        }
    }

    /// Scope name
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Window this scope is bound to
    #[must_use]
    pub fn window(&self) -> Window {
        self.window
    }

    /// Whether a subscription is live
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.active.is_some()
    }

    /// Id of the live subscription
    #[must_use]
    pub fn current_id(&self) -> Option<SubscriptionId> {
        self.active.as_ref().map(|a| a.id)
    }

    /// Accounting snapshot
    #[must_use]
    pub fn stats(&self) -> ScopeStats {
        self.stats
    }

    /// Start a new subscription
    ///
    /// Returns `false` without side effects when one is already live.
    /// Must be called from within a Tokio runtime.
    pub fn open(&mut self) -> bool {
        if let Some(active) = &self.active {
            tracing::debug!(subscription = %active.id, "Scope already open, ignoring");
            return false;
        }

        self.generation += 1;
        let id = SubscriptionId {
            scope: self.name,
            generation: self.generation,
        };
        let (tx, rx) = mpsc::channel(self.buffer);
        let cancel = CancellationToken::new();
        let stream = self.source.subscribe();

        let span = tracing::info_span!(
            "subscription",
            scope = self.name,
            generation = self.generation
        );
        let listener = tokio::spawn(listen(stream, tx, cancel.clone()).instrument(span));

        self.active = Some(ActiveSubscription {
            id,
            cancel,
            rx,
            listener,
        });
        self.stats.opened += 1;
        tracing::debug!(subscription = %id, window = %self.window, "Scope opened");
        true
    }

    /// End the live subscription
    ///
    /// Returns once the listener task has exited. Returns `false` when
    /// nothing was live.
    pub async fn close(&mut self) -> bool {
        let Some(active) = self.active.take() else {
            return false;
        };
        self.stats.closed += 1;
        let id = active.id;
        active.shutdown().await;
        tracing::debug!(subscription = %id, "Scope closed");
        true
    }

    /// Next item from the live subscription
    ///
    /// Returns `None` immediately when closed. Returns `None` when the source
    /// ended; the scope then counts as closed and stays closed until the next
    /// [`open`](Self::open). Cancel safe.
    pub async fn recv(&mut self) -> Option<T> {
        let active = self.active.as_mut()?;

        if let Some(item) = active.rx.recv().await {
            self.stats.delivered += 1;
            return Some(item);
        }

        // Listener dropped its sender: the source is done for this window
        if let Some(active) = self.active.take() {
            self.stats.closed += 1;
            self.stats.terminated += 1;
            tracing::info!(subscription = %active.id, "Signal source ended, closing scope");
            active.shutdown().await;
        }
        None
    }
}

impl<T> Drop for SubscriptionScope<T> {
    fn drop(&mut self) {
        if let Some(active) = &self.active {
            active.cancel.cancel();
        }
    }
}

impl<T> fmt::Debug for SubscriptionScope<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionScope")
            .field("name", &self.name)
            .field("window", &self.window)
            .field("live", &self.active.as_ref().map(|a| a.id))
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

async fn listen<T>(
    mut stream: SignalStream<T>,
    tx: mpsc::Sender<T>,
    cancel: CancellationToken,
) -> ListenerExit {
    loop {
        let item = tokio::select! {
            biased;
            () = cancel.cancelled() => return ListenerExit::Cancelled,
            item = stream.next() => item,
        };

        let Some(item) = item else {
            tracing::trace!("Source exhausted");
            return ListenerExit::SourceExhausted;
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => return ListenerExit::Cancelled,
            sent = tx.send(item) => {
                if sent.is_err() {
                    return ListenerExit::ReceiverDropped;
                }
            }
        }
    }
}
