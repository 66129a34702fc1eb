//! SQLite-backed cache storage for the offline router.
//!
//! This module provides persistent storage using SQLite with async access via
//! tokio-rusqlite. It holds:
//!
//! - Named, versioned partitions of request → response entries
//! - The outbox of requests deferred to background sync
//! - The registration record of the version in control
//!
//! There is no per-entry expiry. Whole partitions are dropped when a newer
//! version activates.

pub mod connection;
pub mod hash;
pub mod migrations;
pub mod outbox;
pub mod partitions;
pub mod registration;

pub use crate::Error;

pub use connection::CacheStorage;
pub use outbox::{ANALYTICS_QUEUE, NewOutboxEntry, OutboxEntry, USER_ACTIONS_QUEUE};
pub use partitions::{Partition, PartitionInfo};
