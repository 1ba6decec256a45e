//! # Core Engine Module
//!
//! The heart of the synchronization layer. Sources push events into a single
//! channel; the runtime's pump hands them to the dispatcher, which folds them
//! into the state store and the notification queue.
//!
//! ## Core Components:
//!
//! - **`source`**: the `EventSource` trait every producer implements, plus the
//!   `FeedEvent` vocabulary shared by producers and the dispatcher.
//!
//! - **`store`**: the bounded, observable `DashboardState` and its reducer.
//!
//! - **`notifications`**: transient user-facing messages with cancellable,
//!   id-targeted expiry.
//!
//! - **`dispatcher`**: the routing table from event kind to store mutation and
//!   notification.
//!
//! - **`runtime`**: channel, pump task and source lifecycle, with idempotent
//!   teardown.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Event source trait and the events sources emit.
pub mod source;
/// Bounded dashboard state and its reducer.
pub mod store;
/// Self-expiring notification list.
pub mod notifications;
/// Routing of feed events to mutations and notifications.
pub mod dispatcher;
/// Channel, pump and source lifecycle.
pub mod runtime;

// --- Public API Re-exports ---
pub use dispatcher::Dispatcher;
pub use notifications::NotificationQueue;
pub use runtime::DashboardRuntime;
pub use source::{EventSource, FeedEvent, FeedSender, LinkEvent, Snapshot};
pub use store::{ConnectionState, DashboardState, StateStore, StoreAction};
