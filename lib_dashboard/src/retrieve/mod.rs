//! # Data Retrieval Module
//!
//! HTTP access to the dashboard backend's REST surface. The fallback poller
//! uses it to refresh whole collections independently of the live stream.
//!
//! ## Contained Modules:
//!
//! - **`api_client`**: `ApiClient` built on `reqwest` and `reqwest-middleware`,
//!   retrying transient failures with exponential backoff and mapping every
//!   failure into a typed `ApiError`.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// REST client with retry middleware.
pub mod api_client;

// --- Public API Re-exports ---
pub use api_client::{ApiClient, ApiError};
