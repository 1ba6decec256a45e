//! # Event Dispatcher
//!
//! Routes each [`FeedEvent`] to the matching store mutation and, for a subset
//! of kinds, a notification:
//!
//! | kind              | mutation                           | notification                 |
//! |-------------------|------------------------------------|------------------------------|
//! | `metric_update`   | replace metrics                    | none                         |
//! | `new_order`       | append sales point (orders = 1)    | success "New Order"          |
//! | `user_activity`   | prepend activity event             | none                         |
//! | `inventory_alert` | prepend alert                      | error if critical, else warn |
//!
//! Events are handled in the order they are received; nothing is batched or
//! reordered. The dispatcher never sees transport failures, only decoded
//! messages and lifecycle signals.

use chrono::Utc;

use crate::core::notifications::NotificationQueue;
use crate::core::source::{FeedEvent, LinkEvent, Snapshot};
use crate::core::store::{StateStore, StoreAction};
use crate::model::wire::{decode_message, Decoded, DashboardEvent, Envelope, WireError};
use crate::model::{non_negative, DashboardFilter, NewNotification, SalesPoint, Severity};

/// How long a new-order notification stays up.
pub const ORDER_NOTIFICATION_MS: u64 = 4000;
/// How long an inventory notification stays up.
pub const ALERT_NOTIFICATION_MS: u64 = 5000;

/// The notification a data event triggers, if any.
pub fn notification_for(event: &DashboardEvent) -> Option<NewNotification> {
    match event {
        DashboardEvent::NewOrder(order) => Some(
            NewNotification::success(
                "New Order",
                format!("Order #{} - ${:.2}", order.id, order.total_amount),
            )
            .lasting(ORDER_NOTIFICATION_MS),
        ),
        DashboardEvent::InventoryAlert(alert) => {
            let note = match alert.severity {
                Severity::Critical => NewNotification::error(
                    "Inventory Alert",
                    format!("{} is critically low in stock", alert.product_name),
                ),
                Severity::Low => NewNotification::warning(
                    "Inventory Alert",
                    format!("{} is low in stock", alert.product_name),
                ),
            };
            Some(note.lasting(ALERT_NOTIFICATION_MS))
        }
        DashboardEvent::MetricUpdate(_) | DashboardEvent::UserActivity(_) => None,
    }
}

/// The notification a lifecycle signal triggers, if any.
pub fn link_notification(link: &LinkEvent) -> Option<NewNotification> {
    match link {
        LinkEvent::DemoStarted => Some(
            NewNotification::success(
                "Demo Mode Active",
                "Generating realistic demo data for demonstration",
            )
            .lasting(5000),
        ),
        LinkEvent::Connected => Some(
            NewNotification::success("Connected", "Real-time data connection established")
                .lasting(3000),
        ),
        LinkEvent::Reconnecting {
            attempt,
            max_attempts,
            ..
        } => Some(
            NewNotification::warning(
                "Reconnecting...",
                format!("Attempting to reconnect ({}/{})", attempt, max_attempts),
            )
            .lasting(3000),
        ),
        LinkEvent::TransportError(_) => Some(
            NewNotification::error("Connection Error", "Real-time connection encountered an error")
                .lasting(4000),
        ),
        LinkEvent::Failed { .. } => Some(
            NewNotification::error(
                "Connection Failed",
                "Failed to establish real-time connection after multiple attempts",
            )
            .lasting(5000),
        ),
        LinkEvent::Closed { .. } | LinkEvent::Disconnected => None,
    }
}

/// Folds feed events into the store and the notification queue.
#[derive(Clone, Default)]
pub struct Dispatcher {
    store: StateStore,
    notifications: NotificationQueue,
}

impl Dispatcher {
    /// A dispatcher writing into the given store and queue.
    pub fn new(store: StateStore, notifications: NotificationQueue) -> Self {
        Self {
            store,
            notifications,
        }
    }

    /// The store this dispatcher mutates.
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// The queue this dispatcher notifies into.
    pub fn notifications(&self) -> &NotificationQueue {
        &self.notifications
    }

    /// Handles one feed event.
    pub fn dispatch(&self, event: FeedEvent) {
        match event {
            FeedEvent::Message(envelope) => self.dispatch_envelope(envelope),
            FeedEvent::Link(link) => self.dispatch_link(link),
            FeedEvent::Snapshot(snapshot) => self.dispatch_snapshot(snapshot),
        }
    }

    /// Decodes and handles one raw text message. Unknown kinds are logged and
    /// ignored; malformed input is returned as an error and changes nothing.
    pub fn dispatch_text(&self, text: &str) -> Result<(), WireError> {
        match decode_message(text)? {
            Decoded::Event(envelope) => self.dispatch_envelope(envelope),
            Decoded::Unknown(kind) => log::info!("Unknown message type: {}", kind),
        }
        Ok(())
    }

    /// Handles one decoded data message.
    pub fn dispatch_envelope(&self, envelope: Envelope) {
        let note = notification_for(&envelope.event);
        let action = match envelope.event {
            DashboardEvent::MetricUpdate(metrics) => StoreAction::SetMetrics(metrics),
            DashboardEvent::NewOrder(order) => StoreAction::AppendSale(SalesPoint {
                timestamp: envelope.timestamp.unwrap_or_else(Utc::now),
                sales: non_negative(order.total_amount),
                orders: 1,
                category: order.category,
            }),
            DashboardEvent::UserActivity(activity) => StoreAction::PushActivity(activity),
            DashboardEvent::InventoryAlert(alert) => StoreAction::PushAlert(alert),
        };
        self.store.apply(action);

        if let Some(note) = note {
            self.notifications.add(note);
        }
    }

    fn dispatch_link(&self, link: LinkEvent) {
        match &link {
            LinkEvent::DemoStarted | LinkEvent::Connected => {
                self.store.apply(StoreAction::SetConnected(true))
            }
            LinkEvent::Closed { .. } | LinkEvent::Failed { .. } | LinkEvent::Disconnected => {
                self.store.apply(StoreAction::SetConnected(false))
            }
            LinkEvent::Reconnecting { .. } | LinkEvent::TransportError(_) => {}
        }
        if let Some(note) = link_notification(&link) {
            self.notifications.add(note);
        }
    }

    fn dispatch_snapshot(&self, snapshot: Snapshot) {
        let action = match snapshot {
            Snapshot::Metrics(metrics) => StoreAction::SetMetrics(metrics),
            Snapshot::Sales(points) => StoreAction::ReplaceSales(points),
            Snapshot::Alerts(alerts) => StoreAction::ReplaceAlerts(alerts),
            Snapshot::Activity(events) => StoreAction::ReplaceActivity(events),
        };
        self.store.apply(action);
    }

    /// Records a new filter selection.
    pub fn set_filter(&self, filter: DashboardFilter) {
        self.store.apply(StoreAction::SetFilter(filter));
    }
}
