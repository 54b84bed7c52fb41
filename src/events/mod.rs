// Notification and signal bus
//
// This module provides the EventBus which fans user-facing notices and app-wide
// signals out to any number of subscribers over tokio broadcast channels.

use tokio::sync::broadcast;

/// Capacity of each broadcast channel; slow subscribers lag rather than block
const CHANNEL_CAPACITY: usize = 100;

/// App-wide signals published by the workflow
///
/// Subscribers (a UI, a proxy core supervisor) react to these without polling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Signal {
    /// The profile list changed and views should reload it
    ProfilesRefreshed,

    /// Subscription contents changed after an import
    SubscriptionsRefreshed,

    /// The active profile changed and the proxy core should be restarted
    ReloadRequested,
}

/// Fire-and-forget sink for notices and signals.
///
/// Implementations must never block and never fail the caller.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    /// Show a short message to the user
    fn notify(&self, message: &str);

    fn publish(&self, signal: Signal);
}

/// Broadcast-backed [`Notifier`]
///
/// # Usage
///
/// - [`subscribe_notices()`](Self::subscribe_notices) for user-facing messages
/// - [`subscribe_signals()`](Self::subscribe_signals) for [`Signal`]s
///
/// Sending with no subscribers is not an error.
#[derive(Clone, Debug)]
pub struct EventBus {
    notice_tx: broadcast::Sender<String>,
    signal_tx: broadcast::Sender<Signal>,
}

impl EventBus {
    pub fn new() -> Self {
        let (notice_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (signal_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            notice_tx,
            signal_tx,
        }
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<String> {
        self.notice_tx.subscribe()
    }

    pub fn subscribe_signals(&self) -> broadcast::Receiver<Signal> {
        self.signal_tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for EventBus {
    fn notify(&self, message: &str) {
        tracing::debug!("Notice: {}", message);
        // Ignore send errors - it's OK if no one is listening
        let _ = self.notice_tx.send(message.to_string());
    }

    fn publish(&self, signal: Signal) {
        tracing::debug!("Signal: {:?}", signal);
        let _ = self.signal_tx.send(signal);
    }
}
