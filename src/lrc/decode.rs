//! Full-Set Decode Session
//!
//! Collects framed shards in any order until every original block is known,
//! then hands back the original data with the frame headers stripped.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::domain::ports::AlgebraEngine;
use crate::error::{try_alloc_zeroed, Error, Result};
use crate::lrc::encode::{block_size_for, FRAME_HEADER_LEN};
use crate::lrc::layout::{CodeLayout, ShardIndex};

/// Progress of a decode session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeProgress {
    /// More shards are needed
    NeedMore,
    /// Original blocks, concatenated in index order
    Complete(Vec<u8>),
}

impl DecodeProgress {
    /// Integer form: `0` need more, `1` complete
    pub fn as_status(&self) -> i16 {
        match self {
            DecodeProgress::NeedMore => 0,
            DecodeProgress::Complete(_) => 1,
        }
    }
}

/// Decode of the full original set from framed shards
pub struct DecodeSession {
    engine: Arc<dyn AlgebraEngine>,
    layout: CodeLayout,
    shard_size: usize,
    shards: Vec<Option<Vec<u8>>>,
    output: Option<Vec<u8>>,
}

impl std::fmt::Debug for DecodeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeSession")
            .field("engine", &self.engine.name())
            .field("layout", &self.layout)
            .field("shard_size", &self.shard_size)
            .field("released", &self.output.is_none())
            .finish()
    }
}

impl DecodeSession {
    /// Open a decode session.
    ///
    /// Allocates `original_count * (shard_size - 1)` output bytes.
    #[instrument(skip(engine))]
    pub fn begin(
        engine: Arc<dyn AlgebraEngine>,
        global_count: usize,
        original_count: usize,
        shard_size: usize,
    ) -> Result<Self> {
        let block_size = block_size_for(shard_size)?;
        let layout = CodeLayout::new(original_count, global_count)?;
        let output = try_alloc_zeroed(original_count * block_size)?;

        Ok(Self {
            engine,
            layout,
            shard_size,
            shards: vec![None; layout.total_shards()],
            output: Some(output),
        })
    }

    /// Code layout
    pub fn layout(&self) -> &CodeLayout {
        &self.layout
    }

    /// Whether buffers have been released by completion, failure or free
    pub fn is_released(&self) -> bool {
        self.output.is_none()
    }

    /// Originals not yet known. Zero once the session is released.
    pub fn missing_originals(&self) -> usize {
        self.shards
            .get(..self.layout.original_count())
            .map_or(0, |originals| originals.iter().filter(|s| s.is_none()).count())
    }

    /// Add one framed shard.
    ///
    /// Shards for slots that are already known are ignored.
    #[instrument(skip(self, shard), fields(len = shard.len()))]
    pub fn decode(&mut self, shard: &[u8]) -> Result<DecodeProgress> {
        if self.output.is_none() {
            return Err(Error::StaleHandle);
        }
        if shard.len() != self.shard_size {
            return Err(Error::SizeMismatch {
                expected: self.shard_size,
                actual: shard.len(),
            });
        }
        let index = shard[0] as ShardIndex;
        if index >= self.layout.total_shards() {
            return Err(Error::InvalidArgument(format!(
                "shard index {} out of range (total {})",
                index,
                self.layout.total_shards()
            )));
        }
        if self.shards[index].is_some() {
            debug!(index, "Ignoring shard already held");
            return Ok(DecodeProgress::NeedMore);
        }

        let mut block = try_alloc_zeroed(self.shard_size - FRAME_HEADER_LEN)?;
        block.copy_from_slice(&shard[FRAME_HEADER_LEN..]);
        self.shards[index] = Some(block);

        let missing = self.missing_originals();
        if missing > 0 {
            let equations: Vec<ShardIndex> = self
                .layout
                .parities()
                .filter(|&p| self.shards[p].is_some())
                .collect();
            if equations.len() < missing {
                return Ok(DecodeProgress::NeedMore);
            }

            match self
                .engine
                .reconstruct(&self.layout, &self.shards, &equations)
            {
                Ok(solved) => {
                    for (i, block) in solved {
                        if self.shards[i].is_none() {
                            self.shards[i] = Some(block);
                        }
                    }
                }
                Err(Error::InsufficientEquations { unknowns, rank }) => {
                    debug!(unknowns, rank, "Parity equations not yet independent");
                    return Ok(DecodeProgress::NeedMore);
                }
                Err(e) => {
                    warn!(error = %e, "Decode failed");
                    self.free();
                    return Err(e);
                }
            }
            if self.missing_originals() > 0 {
                return Ok(DecodeProgress::NeedMore);
            }
        }

        let data = self.assemble()?;
        info!(
            originals = self.layout.original_count(),
            bytes = data.len(),
            "Decode complete"
        );
        self.free();
        Ok(DecodeProgress::Complete(data))
    }

    fn assemble(&mut self) -> Result<Vec<u8>> {
        let block_size = self.shard_size - FRAME_HEADER_LEN;
        let output = self.output.as_mut().ok_or(Error::StaleHandle)?;
        for (out, shard) in output
            .chunks_exact_mut(block_size)
            .zip(&self.shards[..self.layout.original_count()])
        {
            let block = shard.as_deref().ok_or(Error::NotReady)?;
            if block.len() != block_size {
                return Err(Error::EngineFailure(format!(
                    "solved block has {} bytes, expected {}",
                    block.len(),
                    block_size
                )));
            }
            out.copy_from_slice(block);
        }
        Ok(std::mem::take(output))
    }

    /// Release every buffer. Returns `false` if already released.
    pub fn free(&mut self) -> bool {
        if self.output.is_none() {
            return false;
        }
        self.output = None;
        self.shards = Vec::new();
        true
    }
}
