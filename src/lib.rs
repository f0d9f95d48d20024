//! LRC Repair - Local Reconstruction Code shard repair engine
//!
//! Rebuilds a lost data shard of a two-dimensional Local Reconstruction Code
//! while fetching as few other shards as possible. Original shards form a
//! grid; every row and every column carries a local parity shard, and a pool
//! of global parity shards protects the whole set.
//!
//! # Architecture
//!
//! ```text
//! caller ──> LrcEngine ──> RepairSession ──> StageController ──> RequestListBuilder
//!                               │
//!                               └──> AlgebraEngine (port) ──> GaloisAlgebra
//! ```
//!
//! Repair walks from the cheapest stage (the target's row) to the most
//! expensive (every surviving shard), skipping stages whose preconditions
//! fail.
//!
//! # Modules
//!
//! - [`adapters`] - Algebra engine implementations
//! - [`config`] - Engine configuration
//! - [`domain`] - Domain ports
//! - [`error`] - Error types
//! - [`lrc`] - Layout, repair sessions, encode and decode

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod lrc;

// Re-export commonly used types
pub use adapters::GaloisAlgebra;
pub use config::LrcConfig;
pub use domain::AlgebraEngine;
pub use error::{Error, Result};
pub use lrc::{
    CodeLayout, DecodeProgress, DecodeSession, Encoder, LrcEngine, ParitySet, RebuildProgress,
    RepairSession, SessionHandle, ShardIndex, ShardStatus, Stage,
};
