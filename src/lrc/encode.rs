//! Full-Set Encoder
//!
//! Produces every parity shard of a code instance from its originals.
//! Shards travel framed: one index byte followed by the shard block.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::domain::ports::AlgebraEngine;
use crate::error::{try_alloc_zeroed, Error, Result};
use crate::lrc::layout::{CodeLayout, ShardIndex};

/// Bytes of frame header in front of every block
pub const FRAME_HEADER_LEN: usize = 1;

/// Validate a framed shard size and return its block size.
pub(crate) fn block_size_for(shard_size: usize) -> Result<usize> {
    if shard_size <= FRAME_HEADER_LEN {
        return Err(Error::InvalidArgument(format!(
            "framed shard size must exceed {} byte(s), got {}",
            FRAME_HEADER_LEN, shard_size
        )));
    }
    Ok(shard_size - FRAME_HEADER_LEN)
}

/// Framed parity shards, concatenated in index order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParitySet {
    first_index: ShardIndex,
    shard_size: usize,
    data: Vec<u8>,
}

impl ParitySet {
    /// Number of parity shards
    pub fn len(&self) -> usize {
        self.data.len() / self.shard_size
    }

    /// Whether the set holds no shards
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Framed shard size
    pub fn shard_size(&self) -> usize {
        self.shard_size
    }

    /// Framed parity shard by its code index
    pub fn shard(&self, index: ShardIndex) -> Option<&[u8]> {
        let offset = index
            .checked_sub(self.first_index)?
            .checked_mul(self.shard_size)?;
        self.data.get(offset..offset.checked_add(self.shard_size)?)
    }

    /// `(index, framed shard)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (ShardIndex, &[u8])> {
        self.data
            .chunks_exact(self.shard_size)
            .enumerate()
            .map(move |(i, chunk)| (self.first_index + i, chunk))
    }

    /// All framed shards back to back
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Take the concatenated bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Parity encoder for one code instance
pub struct Encoder {
    engine: Arc<dyn AlgebraEngine>,
    layout: CodeLayout,
    shard_size: usize,
}

impl std::fmt::Debug for Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encoder")
            .field("engine", &self.engine.name())
            .field("layout", &self.layout)
            .field("shard_size", &self.shard_size)
            .finish()
    }
}

impl Encoder {
    /// Create an encoder.
    ///
    /// # Arguments
    /// * `engine` - Algebra engine computing the parity
    /// * `global_count` - Number of global parity shards
    /// * `original_count` - Number of original shards
    /// * `shard_size` - Framed shard size (header byte included)
    pub fn new(
        engine: Arc<dyn AlgebraEngine>,
        global_count: usize,
        original_count: usize,
        shard_size: usize,
    ) -> Result<Self> {
        block_size_for(shard_size)?;
        let layout = CodeLayout::new(original_count, global_count)?;
        Ok(Self {
            engine,
            layout,
            shard_size,
        })
    }

    /// Code layout
    pub fn layout(&self) -> &CodeLayout {
        &self.layout
    }

    /// Framed shard size
    pub fn shard_size(&self) -> usize {
        self.shard_size
    }

    /// Encode framed originals, concatenated in index order.
    ///
    /// Each original's header byte must equal its index.
    #[instrument(skip(self, originals), fields(original_count = self.layout.original_count()))]
    pub fn encode(&self, originals: &[u8]) -> Result<ParitySet> {
        let n = self.layout.original_count();
        let expected = n * self.shard_size;
        if originals.len() != expected {
            return Err(Error::SizeMismatch {
                expected,
                actual: originals.len(),
            });
        }

        let mut blocks = Vec::with_capacity(n);
        for (index, framed) in originals.chunks_exact(self.shard_size).enumerate() {
            if framed[0] as usize != index {
                return Err(Error::InvalidArgument(format!(
                    "original at position {} carries index {}",
                    index, framed[0]
                )));
            }
            blocks.push(&framed[FRAME_HEADER_LEN..]);
        }

        let parities = self.engine.encode(&self.layout, &blocks)?;
        let first_index = self.layout.original_count();
        let mut data = try_alloc_zeroed(parities.len() * self.shard_size)?;
        for ((i, block), out) in parities
            .iter()
            .enumerate()
            .zip(data.chunks_exact_mut(self.shard_size))
        {
            out[0] = (first_index + i) as u8;
            out[FRAME_HEADER_LEN..].copy_from_slice(block);
        }

        debug!(parities = parities.len(), "Encoded framed parity set");
        Ok(ParitySet {
            first_index,
            shard_size: self.shard_size,
            data,
        })
    }

    /// Encode unframed blocks of equal length into unframed parity blocks.
    pub fn encode_blocks(&self, blocks: &[&[u8]]) -> Result<Vec<Vec<u8>>> {
        self.engine.encode(&self.layout, blocks)
    }
}

/// Frame `block` with its index byte.
pub fn frame(index: ShardIndex, block: &[u8]) -> Result<Vec<u8>> {
    let header = u8::try_from(index).map_err(|_| {
        Error::InvalidArgument(format!("shard index {} does not fit a frame header", index))
    })?;
    let mut framed = try_alloc_zeroed(block.len() + FRAME_HEADER_LEN)?;
    framed[0] = header;
    framed[FRAME_HEADER_LEN..].copy_from_slice(block);
    Ok(framed)
}
