//! Shard Status Table
//!
//! Per-index bookkeeping of what a repair session knows about each shard.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::lrc::layout::ShardIndex;

/// What the session knows about one shard slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShardStatus {
    /// Nothing known yet
    #[default]
    Unknown,
    /// Shard bytes are held by the session
    Existing,
    /// Shard cannot be supplied
    Lost,
    /// Shard was asked for and not yet supplied
    Requested,
}

impl ShardStatus {
    /// Whether a change from `self` to `to` is legal.
    ///
    /// `Requested -> Requested` is accepted as a no-op.
    pub fn can_transition_to(self, to: ShardStatus) -> bool {
        use ShardStatus::*;
        matches!(
            (self, to),
            (Unknown, Existing)
                | (Unknown, Lost)
                | (Unknown, Requested)
                | (Lost, Requested)
                | (Requested, Existing)
                | (Requested, Lost)
                | (Requested, Requested)
        )
    }
}

impl std::fmt::Display for ShardStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ShardStatus::Unknown => "unknown",
            ShardStatus::Existing => "existing",
            ShardStatus::Lost => "lost",
            ShardStatus::Requested => "requested",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Entry {
    status: ShardStatus,
    recovered: bool,
}

/// Status of every shard slot of one session
#[derive(Debug, Clone)]
pub struct ShardStatusTable {
    entries: Vec<Entry>,
}

impl ShardStatusTable {
    /// Create a table of `len` slots, all `Unknown`
    pub fn new(len: usize) -> Self {
        Self {
            entries: vec![Entry::default(); len],
        }
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no slots
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, index: ShardIndex) -> Result<&Entry> {
        self.entries.get(index).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "shard index {} out of range (table holds {})",
                index,
                self.entries.len()
            ))
        })
    }

    /// Current status of a slot
    pub fn status(&self, index: ShardIndex) -> Result<ShardStatus> {
        Ok(self.entry(index)?.status)
    }

    /// Change a slot's status, rejecting transitions outside the legal table.
    pub fn set_status(&mut self, index: ShardIndex, status: ShardStatus) -> Result<()> {
        let from = self.entry(index)?.status;
        if !from.can_transition_to(status) {
            return Err(Error::InvalidTransition {
                index,
                from,
                to: status,
            });
        }
        self.entries[index].status = status;
        Ok(())
    }

    /// Flag a lost shard as reconstructed by the engine
    pub fn mark_recovered(&mut self, index: ShardIndex) -> Result<()> {
        let from = self.entry(index)?.status;
        if from != ShardStatus::Lost {
            return Err(Error::InvalidTransition {
                index,
                from,
                to: ShardStatus::Existing,
            });
        }
        self.entries[index].recovered = true;
        Ok(())
    }

    /// Whether a lost shard has since been reconstructed
    pub fn is_recovered(&self, index: ShardIndex) -> bool {
        self.entries.get(index).is_some_and(|e| e.recovered)
    }

    /// Whether the shard's bytes are held, supplied or reconstructed
    pub fn is_available(&self, index: ShardIndex) -> bool {
        self.entries
            .get(index)
            .is_some_and(|e| e.status == ShardStatus::Existing || e.recovered)
    }

    /// Whether the shard is lost and not reconstructed
    pub fn is_lost(&self, index: ShardIndex) -> bool {
        self.entries
            .get(index)
            .is_some_and(|e| e.status == ShardStatus::Lost && !e.recovered)
    }

    /// Number of `indices` that are `Lost` or `Requested` and not recovered
    pub fn count_missing(&self, indices: &[ShardIndex]) -> usize {
        indices
            .iter()
            .filter_map(|&i| self.entries.get(i))
            .filter(|e| {
                !e.recovered && matches!(e.status, ShardStatus::Lost | ShardStatus::Requested)
            })
            .count()
    }

    /// Number of `indices` that are `Lost` and not recovered
    pub fn count_lost(&self, indices: &[ShardIndex]) -> usize {
        indices.iter().filter(|&&i| self.is_lost(i)).count()
    }
}
