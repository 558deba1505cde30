//! claimtrust Network Layer
//!
//! Read-only access to the authoritative data sources behind verification:
//! - Timeout-bounded fetcher trait with a reqwest implementation
//! - JSON/text helpers that classify 404s as "not found" rather than errors
//! - A routed stub fetcher for offline runs and tests

pub mod client;
pub mod fetch;
pub mod stub;

pub use client::*;
pub use fetch::*;
pub use stub::*;
