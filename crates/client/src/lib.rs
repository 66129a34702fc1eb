//! Network access for ringside.
//!
//! This crate provides the [`Network`] seam the offline router fetches
//! through, its reqwest implementation, and URL resolution shared by the
//! server and CLI.

pub mod fetch;

pub use fetch::{HttpNetwork, Network, NetworkConfig, UrlError, resolve, resolve_all};
