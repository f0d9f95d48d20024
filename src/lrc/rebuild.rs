//! Repair Session
//!
//! Rebuilds one lost original shard. The session asks for shards in
//! cheapest-first order, tracks what has arrived, and invokes the algebra
//! engine as soon as the current stage holds everything it needs.
//!
//! # Protocol
//!
//! ```text
//! begin ─> next_request_list ─> add_shard ... ─┬─> result ─> free
//!               ^                               │
//!               └──── NeedMore / declare_lost ──┘
//! ```
//!
//! Shards are raw blocks of exactly `shard_size` bytes, addressed by index.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::domain::ports::AlgebraEngine;
use crate::error::{try_alloc_zeroed, Error, Result};
use crate::lrc::layout::{CodeLayout, ShardIndex};
use crate::lrc::request::{Plan, RequestListBuilder};
use crate::lrc::stage::{Stage, StageController};
use crate::lrc::status::{ShardStatus, ShardStatusTable};

/// Progress reported after a shard is added
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebuildProgress {
    /// More shards are needed
    NeedMore,
    /// The target shard has been rebuilt
    Complete,
}

impl RebuildProgress {
    /// Integer form: `0` need more, `1` complete
    pub fn as_status(self) -> i16 {
        match self {
            RebuildProgress::NeedMore => 0,
            RebuildProgress::Complete => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Active,
    Complete,
    Failed { missing: usize },
    Freed,
}

/// Incremental rebuild of one lost original shard
pub struct RepairSession {
    engine: Arc<dyn AlgebraEngine>,
    layout: CodeLayout,
    lost_index: ShardIndex,
    shard_size: usize,
    table: ShardStatusTable,
    controller: StageController,
    builder: RequestListBuilder,
    shards: Vec<Option<Vec<u8>>>,
    pending: VecDeque<ShardIndex>,
    repaired: Option<Vec<u8>>,
    state: SessionState,
}

impl std::fmt::Debug for RepairSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepairSession")
            .field("engine", &self.engine.name())
            .field("lost_index", &self.lost_index)
            .field("shard_size", &self.shard_size)
            .field("stage", &self.controller.stage())
            .field("pending", &self.pending)
            .field("state", &self.state)
            .finish()
    }
}

impl RepairSession {
    /// Open a session to rebuild `lost_index`.
    ///
    /// # Arguments
    /// * `engine` - Algebra engine used for reconstruction
    /// * `global_count` - Number of global parity shards
    /// * `original_count` - Number of original shards
    /// * `lost_index` - Original shard to rebuild
    /// * `shard_size` - Exact size of every shard block
    #[instrument(skip(engine))]
    pub fn begin(
        engine: Arc<dyn AlgebraEngine>,
        global_count: usize,
        original_count: usize,
        lost_index: ShardIndex,
        shard_size: usize,
    ) -> Result<Self> {
        if shard_size == 0 {
            return Err(Error::InvalidArgument(
                "shard_size must be greater than 0".to_string(),
            ));
        }
        let layout = CodeLayout::new(original_count, global_count)?;
        if lost_index >= original_count {
            return Err(Error::InvalidArgument(format!(
                "lost index {} is not an original shard (count {})",
                lost_index, original_count
            )));
        }

        let repaired = try_alloc_zeroed(shard_size)?;
        let mut table = ShardStatusTable::new(layout.total_shards());
        table.set_status(lost_index, ShardStatus::Lost)?;

        info!(
            lost_index,
            original_count,
            total_shards = layout.total_shards(),
            "Repair session opened"
        );

        Ok(Self {
            engine,
            layout,
            lost_index,
            shard_size,
            table,
            controller: StageController::new(layout, lost_index),
            builder: RequestListBuilder::new(layout, lost_index),
            shards: vec![None; layout.total_shards()],
            pending: VecDeque::new(),
            repaired: Some(repaired),
            state: SessionState::Active,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Code layout of this session
    pub fn layout(&self) -> &CodeLayout {
        &self.layout
    }

    /// Index being rebuilt
    pub fn lost_index(&self) -> ShardIndex {
        self.lost_index
    }

    /// Exact size of every shard block
    pub fn shard_size(&self) -> usize {
        self.shard_size
    }

    /// Current repair stage
    pub fn stage(&self) -> Stage {
        self.controller.stage()
    }

    /// Whether the target has been rebuilt
    pub fn is_complete(&self) -> bool {
        self.state == SessionState::Complete
    }

    /// Whether the session has been freed
    pub fn is_freed(&self) -> bool {
        self.state == SessionState::Freed
    }

    /// Status of one shard slot
    pub fn status(&self, index: ShardIndex) -> Result<ShardStatus> {
        self.ensure_live()?;
        self.table.status(index)
    }

    // =========================================================================
    // Protocol
    // =========================================================================

    /// Shards the caller should supply next, in the order they must arrive.
    ///
    /// Repeated calls without progress return the same list. An empty list
    /// with [`is_complete`](Self::is_complete) means the target is rebuilt.
    #[instrument(skip(self), fields(lost_index = self.lost_index))]
    pub fn next_request_list(&mut self) -> Result<Vec<ShardIndex>> {
        self.ensure_usable()?;
        if self.is_complete() {
            return Ok(Vec::new());
        }

        self.drive()?;
        if self.is_complete() {
            return Ok(Vec::new());
        }

        let plan = self
            .builder
            .next_request(self.controller.stage(), &mut self.table)?;
        if let Plan::Request(indices) = plan {
            self.pending.retain(|i| indices.contains(i));
            for index in indices {
                if !self.pending.contains(&index) {
                    self.pending.push_back(index);
                }
            }
        }

        debug!(stage = %self.stage(), requested = self.pending.len(), "Request list ready");
        Ok(self.pending.iter().copied().collect())
    }

    /// Supply the block for `index`.
    ///
    /// Requested shards must arrive in request order. A shard that was never
    /// requested is accepted as long as nothing is known about it yet.
    #[instrument(skip(self, data), fields(lost_index = self.lost_index))]
    pub fn add_shard(&mut self, index: ShardIndex, data: &[u8]) -> Result<RebuildProgress> {
        self.ensure_live()?;
        if data.len() != self.shard_size {
            return Err(Error::SizeMismatch {
                expected: self.shard_size,
                actual: data.len(),
            });
        }
        self.ensure_usable()?;
        if self.is_complete() {
            return Ok(RebuildProgress::Complete);
        }

        let status = self.table.status(index)?;
        if status == ShardStatus::Requested && self.pending.contains(&index) {
            if let Some(&expected) = self.pending.front() {
                if expected != index {
                    return Err(Error::UnexpectedShard {
                        expected,
                        actual: index,
                    });
                }
            }
        }
        if !status.can_transition_to(ShardStatus::Existing) {
            return Err(Error::InvalidTransition {
                index,
                from: status,
                to: ShardStatus::Existing,
            });
        }

        let mut block = try_alloc_zeroed(self.shard_size)?;
        block.copy_from_slice(data);
        self.table.set_status(index, ShardStatus::Existing)?;
        self.shards[index] = Some(block);
        self.pending.retain(|&i| i != index);
        debug!(index, from = %status, "Shard added");

        self.drive()?;
        Ok(if self.is_complete() {
            RebuildProgress::Complete
        } else {
            RebuildProgress::NeedMore
        })
    }

    /// Report that `index` cannot be supplied.
    ///
    /// The next request list is planned around the loss.
    #[instrument(skip(self), fields(lost_index = self.lost_index))]
    pub fn declare_lost(&mut self, index: ShardIndex) -> Result<()> {
        self.ensure_usable()?;
        if self.is_complete() {
            return Ok(());
        }
        self.table.set_status(index, ShardStatus::Lost)?;
        self.pending.retain(|&i| i != index);
        debug!(index, "Shard declared lost");
        Ok(())
    }

    /// Copy of the rebuilt shard.
    pub fn result(&self) -> Result<Vec<u8>> {
        self.ensure_usable()?;
        match (&self.state, &self.repaired) {
            (SessionState::Complete, Some(repaired)) => Ok(repaired.clone()),
            _ => Err(Error::NotReady),
        }
    }

    /// Release every buffer. Returns `false` if already freed.
    pub fn free(&mut self) -> bool {
        if self.state == SessionState::Freed {
            return false;
        }
        self.release();
        self.repaired = None;
        self.state = SessionState::Freed;
        debug!(lost_index = self.lost_index, "Repair session freed");
        true
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn ensure_live(&self) -> Result<()> {
        if self.state == SessionState::Freed {
            return Err(Error::StaleHandle);
        }
        Ok(())
    }

    fn ensure_usable(&self) -> Result<()> {
        match self.state {
            SessionState::Freed => Err(Error::StaleHandle),
            SessionState::Failed { missing } => Err(Error::UnrecoverableTopology {
                lost_index: self.lost_index,
                missing,
            }),
            SessionState::Active | SessionState::Complete => Ok(()),
        }
    }

    /// Plan the current stage and reconstruct or advance until shards are
    /// needed, the target is rebuilt, or the last stage fails.
    fn drive(&mut self) -> Result<()> {
        self.controller.enter(&self.table);

        loop {
            let stage = self.controller.stage();
            match self.builder.plan(stage, &self.table) {
                Plan::Request(_) => return Ok(()),
                Plan::Unsatisfiable => {
                    debug!(stage = %stage, "Stage cannot be satisfied");
                    self.advance_or_fail()?;
                }
                Plan::Ready { equations } => match self.solve(&equations) {
                    Ok(()) => {
                        info!(
                            lost_index = self.lost_index,
                            stage = %stage,
                            "Lost shard rebuilt"
                        );
                        return Ok(());
                    }
                    Err(e) => {
                        warn!(stage = %stage, engine = self.engine.name(), error = %e, "Reconstruction attempt failed");
                        self.advance_or_fail()?;
                    }
                },
            }
        }
    }

    fn advance_or_fail(&mut self) -> Result<()> {
        if self.controller.advance(&self.table).is_some() {
            return Ok(());
        }

        let originals: Vec<ShardIndex> = (0..self.layout.original_count()).collect();
        let missing = self.table.count_lost(&originals);
        self.release();
        self.repaired = None;
        self.state = SessionState::Failed { missing };
        warn!(
            lost_index = self.lost_index,
            missing, "Lost shard is unrecoverable"
        );
        Err(Error::UnrecoverableTopology {
            lost_index: self.lost_index,
            missing,
        })
    }

    fn solve(&mut self, equations: &[ShardIndex]) -> Result<()> {
        let solved = self
            .engine
            .reconstruct(&self.layout, &self.shards, equations)?;

        let mut target = None;
        for (index, block) in solved {
            if block.len() != self.shard_size {
                return Err(Error::EngineFailure(format!(
                    "engine returned {} bytes for shard {}",
                    block.len(),
                    index
                )));
            }
            if index == self.lost_index {
                target = Some(block);
            } else if self.table.is_lost(index) {
                self.table.mark_recovered(index)?;
                self.shards[index] = Some(block);
                debug!(index, "Recovered neighbouring shard");
            }
        }

        let block = target.ok_or_else(|| {
            Error::EngineFailure(format!("shard {} was not solved", self.lost_index))
        })?;
        let repaired = self.repaired.as_mut().ok_or(Error::StaleHandle)?;
        repaired.copy_from_slice(&block);
        self.table.mark_recovered(self.lost_index)?;
        self.release();
        self.state = SessionState::Complete;
        Ok(())
    }

    fn release(&mut self) {
        self.shards = Vec::new();
        self.pending.clear();
    }
}
