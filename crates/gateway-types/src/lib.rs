//! Common types module for the Tezos transaction gateway.
//!
//! This module defines the core data types shared by all gateway components:
//! jobs and their lifecycle states, the transaction entries a job carries,
//! broker message payloads, and the normalized indexer snapshot produced
//! during confirmation polling.

/// Job records, lifecycle states, and transaction entries.
pub mod job;
/// Broker message payloads exchanged between processes.
pub mod message;
/// Normalized indexer query results.
pub mod snapshot;

// Re-export all types for convenient access
pub use job::*;
pub use message::*;
pub use snapshot::*;
