//! claimtrust Runtime
//!
//! Wires adapters and cross-cutting checks into one verification call:
//! - **Registry**: immutable domain → adapter map with a never-failing dispatcher
//! - **Merge**: weighted blend of domain and cross-cutting scores
//! - **Engine**: concurrent domain + cross-cutting execution under [`EngineConfig`]

pub mod config;
pub mod engine;
pub mod merge;
pub mod registry;

pub use config::*;
pub use engine::VerificationEngine;
pub use merge::{cross_cutting_aggregate, merge};
pub use registry::*;
