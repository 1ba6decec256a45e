//! # Event Source Abstraction
//!
//! Every producer of dashboard data implements [`EventSource`]. A source is
//! handed a [`FeedSender`] on `start` and pushes [`FeedEvent`]s into it until
//! `stop`. Consumers depend on the trait only, so the random demo generator,
//! the live WebSocket feed and the REST fallback poller are interchangeable.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::model::wire::Envelope;
use crate::model::{ActivityEvent, DashboardFilter, InventoryAlert, MetricSnapshot, SalesPoint};

/// Connection lifecycle signals raised by sources.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// The demo generator started producing data.
    DemoStarted,
    /// The transport opened.
    Connected,
    /// A retry was scheduled after an abnormal close.
    Reconnecting {
        /// 1-based attempt number.
        attempt: u32,
        /// Configured maximum number of attempts.
        max_attempts: u32,
        /// Delay before the attempt.
        delay: Duration,
    },
    /// A transient transport failure. Never fatal on its own.
    TransportError(String),
    /// The transport closed with the given close code.
    Closed {
        /// WebSocket close code; 1000 is a normal closure.
        code: u16,
    },
    /// Retries are exhausted; no further automatic reconnects.
    Failed {
        /// Attempts made before giving up.
        attempts: u32,
    },
    /// The source was stopped on purpose.
    Disconnected,
}

/// Bulk replacements fetched from the REST surface.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    /// `GET /api/metrics`
    Metrics(MetricSnapshot),
    /// `GET /api/sales?range=`
    Sales(Vec<SalesPoint>),
    /// `GET /api/inventory/alerts`
    Alerts(Vec<InventoryAlert>),
    /// `GET /api/user-activity`
    Activity(Vec<ActivityEvent>),
}

/// Everything a source can push to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// A decoded data message.
    Message(Envelope),
    /// A connection lifecycle change.
    Link(LinkEvent),
    /// A bulk refresh.
    Snapshot(Snapshot),
}

/// Sending half of the feed channel.
pub type FeedSender = mpsc::UnboundedSender<FeedEvent>;
/// Receiving half of the feed channel.
pub type FeedReceiver = mpsc::UnboundedReceiver<FeedEvent>;

/// A producer of dashboard events.
pub trait EventSource: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Registers `sink` and begins producing. Starting a running source only
    /// registers the additional sink.
    fn start(&self, sink: FeedSender);

    /// Cancels all scheduled work and drops every registered sink. Safe to
    /// call repeatedly and on a source that never started.
    fn stop(&self);

    /// Called when the user changes the filter selection.
    fn on_filter_change(&self, _filter: &DashboardFilter) {}
}

/// The sinks registered with one source.
#[derive(Debug, Default)]
pub(crate) struct FeedSinks {
    senders: Vec<FeedSender>,
}

impl FeedSinks {
    pub(crate) fn push(&mut self, sink: FeedSender) {
        self.senders.push(sink);
    }

    pub(crate) fn clear(&mut self) {
        self.senders.clear();
    }

    /// Sends `event` to every sink, forgetting the ones whose receiver is gone.
    pub(crate) fn broadcast(&mut self, event: FeedEvent) {
        self.senders.retain(|sink| match sink.send(event.clone()) {
            Ok(()) => true,
            Err(_) => {
                log::debug!("Feed receiver dropped. Removing sink.");
                false
            }
        });
    }
}
