//! Core types and shared functionality for ringside.
//!
//! This crate provides:
//! - Cache storage (partitions, outbox, registration) with a SQLite backend
//! - Unified error types
//! - Configuration structures
//! - The request/response model shared by the network and the router

pub mod cache;
pub mod config;
pub mod error;
pub mod http;

pub use cache::{CacheStorage, OutboxEntry, Partition};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use http::{Request, RequestMode, Response};
