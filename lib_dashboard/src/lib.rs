//! # lib_dashboard
//!
//! The client-side real-time state synchronization layer of the e-commerce
//! analytics dashboard. Event sources (a random demo generator, a reconnecting
//! WebSocket feed, a REST fallback poller) push `FeedEvent`s into a single
//! channel; the dispatcher folds them into a bounded `DashboardState` and a
//! self-expiring notification list that a view layer can observe.
//!
//! Folder-based feature gating follows the rest of the workspace:
//! `ingestors`, `retrieve` and `loggers` are optional, the model and core
//! engine are always compiled.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Domain entities and the inbound/outbound wire format.
pub mod model;
/// State store, notification queue, dispatcher and runtime.
pub mod core;

/// Event sources: demo generator, WebSocket feed, REST fallback poller.
#[cfg(feature = "ingestors")]
pub mod ingestors;
/// HTTP client for the dashboard REST surface.
#[cfg(feature = "retrieve")]
pub mod retrieve;
/// Console + file logging setup.
#[cfg(feature = "loggers")]
pub mod loggers;

// --- Public API Re-exports ---
pub use crate::core::{
    DashboardRuntime, DashboardState, Dispatcher, EventSource, FeedEvent, LinkEvent,
    NotificationQueue, StateStore,
};
pub use crate::model::wire::{decode_message, Decoded, DashboardEvent, Envelope, WireError};
