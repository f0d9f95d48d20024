//! Domain Ports (Port/Adapter Pattern)
//!
//! The repair state machine decides *what* to fetch and *when* a shard can be
//! rebuilt. The field arithmetic that actually computes shard bytes sits
//! behind the [`AlgebraEngine`] port so sessions can be driven against any
//! implementation of the code's parity equations.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Domain Layer                            │
//! │   RepairSession │ DecodeSession │ Encoder                    │
//! │                       │                                      │
//! │              AlgebraEngine (trait)                           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │                GaloisAlgebra (GF(256))                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::error::Result;
use crate::lrc::layout::{CodeLayout, ShardIndex};

// =============================================================================
// Algebra Engine Port
// =============================================================================

/// Port for the finite-field arithmetic of the LRC parity equations.
///
/// Each parity shard is one linear equation over the original shards, with
/// the coefficients given by [`CodeLayout::coefficients`].
pub trait AlgebraEngine: Send + Sync {
    /// Compute every parity block of the code.
    ///
    /// # Arguments
    /// * `layout` - Code instance
    /// * `blocks` - One block per original shard, all of equal length
    ///
    /// # Returns
    /// * Parity blocks in index order (`layout.parities()`)
    fn encode(&self, layout: &CodeLayout, blocks: &[&[u8]]) -> Result<Vec<Vec<u8>>>;

    /// Solve for the originals the given equations reference but `shards`
    /// does not hold.
    ///
    /// # Arguments
    /// * `layout` - Code instance
    /// * `shards` - Known blocks by shard index (`layout.total_shards()` slots)
    /// * `equations` - Parity indices to use; each must be present in `shards`
    ///
    /// # Returns
    /// * The solved originals as `(index, block)` pairs in index order
    fn reconstruct(
        &self,
        layout: &CodeLayout,
        shards: &[Option<Vec<u8>>],
        equations: &[ShardIndex],
    ) -> Result<Vec<(ShardIndex, Vec<u8>)>>;

    /// Name used in logs
    fn name(&self) -> &'static str {
        "algebra-engine"
    }
}
