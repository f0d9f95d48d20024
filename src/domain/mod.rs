//! Domain Layer
//!
//! Trait abstractions the repair core depends on.
//!
//! - **Ports** (`ports.rs`) - The algebra engine seam
//!
//! # Usage
//!
//! ```ignore
//! use lrc_repair::domain::ports::AlgebraEngine;
//!
//! fn parity_count<E: AlgebraEngine>(engine: &E, layout: &CodeLayout, blocks: &[&[u8]]) -> Result<usize> {
//!     Ok(engine.encode(layout, blocks)?.len())
//! }
//! ```

pub mod ports;

pub use ports::AlgebraEngine;
