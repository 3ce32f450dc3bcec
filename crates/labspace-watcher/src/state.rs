//! Watch subscription state machine.
//!
//! ```text
//! Resubscribing ──subscribed──▶ Streaming
//!       ▲                          │
//!       └────── gone / closed ─────┤
//!                                  │
//!                     fatal ───────┴──▶ Failed
//! ```
//!
//! An expired cursor (HTTP 410) and a stream that ends normally both lead to a
//! fresh subscription. Any other failure is terminal.

use crate::error::{is_gone, is_gone_response};

/// Where the watcher is in its subscription lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Reading events from an open subscription.
    Streaming,
    /// Opening a new subscription.
    Resubscribing,
    /// Stopped on an unrecoverable error.
    Failed,
}

/// Something that happened to the subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchSignal {
    /// A subscription was opened.
    Subscribed,
    /// The server reported the watch cursor as expired.
    Gone,
    /// The server closed the stream.
    Closed,
    /// An unrecoverable error.
    Fatal,
}

impl WatchSignal {
    /// Classify an API error.
    #[must_use]
    pub fn from_error(err: &kube::Error) -> Self {
        if is_gone(err) {
            Self::Gone
        } else {
            Self::Fatal
        }
    }

    /// Classify an error delivered inside the watch stream.
    #[must_use]
    pub fn from_response(response: &kube::core::ErrorResponse) -> Self {
        if is_gone_response(response) {
            Self::Gone
        } else {
            Self::Fatal
        }
    }
}

impl WatchState {
    /// Apply a signal.
    #[must_use]
    pub fn on(self, signal: WatchSignal) -> Self {
        match (self, signal) {
            (Self::Failed, _) | (_, WatchSignal::Fatal) => Self::Failed,
            (_, WatchSignal::Gone | WatchSignal::Closed) => Self::Resubscribing,
            (_, WatchSignal::Subscribed) => Self::Streaming,
        }
    }
}
