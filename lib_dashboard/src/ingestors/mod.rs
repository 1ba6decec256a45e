//! # Event Source Implementations
//!
//! The producers behind the `EventSource` trait. Each one owns its timers
//! and connections and releases them on `stop`, so a torn-down source can
//! never mutate the dashboard again.
//!
//! ## Contained Modules:
//! - **`generator`**: random demo data on a fixed tick, for running without a
//!   backend.
//! - **`socket`**: the live WebSocket feed with bounded exponential-backoff
//!   reconnects.
//! - **`polling`**: a self-scheduling REST poller refreshing whole
//!   collections alongside the stream.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Random demo event source.
pub mod generator;
/// WebSocket event source and reconnect policy.
pub mod socket;
/// Periodic REST refresh source.
pub mod polling;

// --- Public API Re-exports ---
pub use generator::{DemoGenerator, GeneratorConfig};
pub use polling::{FallbackPoller, PollingConfig, Resource};
pub use socket::{LinkPhase, ReconnectPolicy, RetryDecision, SocketConfig, SocketFeed};
