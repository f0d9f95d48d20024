//! Repair Stage Machine
//!
//! Stages run from cheapest to most expensive in bytes fetched. The
//! controller only ever moves forward; a failed `GlobalRebuild` is final.
//!
//! ```text
//! Init ─┬─> HorRebuild ─> VerRebuild ─> HorRecoveryRebuild ─> VerRecoveryRebuild
//!       ├─────────────────^                ^
//!       └──────────────────────────────────┘
//!                     ─> GlobalRecoveryRebuild ─> GlobalRebuild (terminal)
//! ```

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::lrc::layout::{CodeLayout, ShardIndex};
use crate::lrc::status::ShardStatusTable;

/// Repair stage of a session
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum Stage {
    /// Nothing decided yet
    #[default]
    Init,
    /// Rebuild from the target's row
    HorRebuild,
    /// Rebuild from the target's column
    VerRebuild,
    /// Rebuild other row losses through their columns, then the row
    HorRecoveryRebuild,
    /// Rebuild other column losses through their rows, then the column
    VerRecoveryRebuild,
    /// Solve with one global parity per missing original
    GlobalRecoveryRebuild,
    /// Solve with every surviving shard
    GlobalRebuild,
}

impl Stage {
    /// The following stage, `None` after `GlobalRebuild`
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Init => Some(Stage::HorRebuild),
            Stage::HorRebuild => Some(Stage::VerRebuild),
            Stage::VerRebuild => Some(Stage::HorRecoveryRebuild),
            Stage::HorRecoveryRebuild => Some(Stage::VerRecoveryRebuild),
            Stage::VerRecoveryRebuild => Some(Stage::GlobalRecoveryRebuild),
            Stage::GlobalRecoveryRebuild => Some(Stage::GlobalRebuild),
            Stage::GlobalRebuild => None,
        }
    }

    /// Whether failure in this stage ends the session
    pub fn is_last(self) -> bool {
        self == Stage::GlobalRebuild
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::HorRebuild => "hor-rebuild",
            Stage::VerRebuild => "ver-rebuild",
            Stage::HorRecoveryRebuild => "hor-recovery-rebuild",
            Stage::VerRecoveryRebuild => "ver-recovery-rebuild",
            Stage::GlobalRecoveryRebuild => "global-recovery-rebuild",
            Stage::GlobalRebuild => "global-rebuild",
        };
        f.write_str(name)
    }
}

/// Missing counts of the groups around the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingCounts {
    /// Lost shards in the target's row group, target included
    pub horizontal: usize,
    /// Lost shards in the target's column group, target included
    pub vertical: usize,
    /// Lost originals and global parities
    pub global: usize,
}

impl MissingCounts {
    /// Count losses around `target`
    pub fn collect(layout: &CodeLayout, table: &ShardStatusTable, target: ShardIndex) -> Self {
        let row = layout.row_of(target).unwrap_or(0);
        let column = layout.column_of(target).unwrap_or(0);
        Self {
            horizontal: table.count_lost(&layout.row_group(row)),
            vertical: table.count_lost(&layout.column_group(column)),
            global: table.count_lost(&layout.global_group()),
        }
    }
}

/// Forward-only stage machine of one repair session
#[derive(Debug, Clone)]
pub struct StageController {
    stage: Stage,
    layout: CodeLayout,
    target: ShardIndex,
}

impl StageController {
    /// Start in `Init`
    pub fn new(layout: CodeLayout, target: ShardIndex) -> Self {
        Self {
            stage: Stage::Init,
            layout,
            target,
        }
    }

    /// Current stage
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Leave `Init` for the cheapest stage whose precondition holds.
    ///
    /// No-op once past `Init`.
    pub fn enter(&mut self, table: &ShardStatusTable) -> Stage {
        if self.stage == Stage::Init {
            let counts = MissingCounts::collect(&self.layout, table, self.target);
            let first = if counts.horizontal == 1 {
                Stage::HorRebuild
            } else if counts.vertical == 1 {
                Stage::VerRebuild
            } else {
                Stage::HorRecoveryRebuild
            };
            info!(
                target_shard = self.target,
                horizontal = counts.horizontal,
                vertical = counts.vertical,
                global = counts.global,
                stage = %first,
                "Entering first repair stage"
            );
            self.stage = first;
        }
        self.stage
    }

    /// Move to the next applicable stage.
    ///
    /// Local stages are skipped when more than the target is lost in their
    /// group. Returns `None` when the current stage is `GlobalRebuild`.
    pub fn advance(&mut self, table: &ShardStatusTable) -> Option<Stage> {
        let counts = MissingCounts::collect(&self.layout, table, self.target);
        let mut next = self.stage.next()?;

        loop {
            let applicable = match next {
                Stage::HorRebuild => counts.horizontal == 1,
                Stage::VerRebuild => counts.vertical == 1,
                _ => true,
            };
            if applicable {
                break;
            }
            next = next.next()?;
        }

        info!(from = %self.stage, to = %next, target_shard = self.target, "Advancing repair stage");
        self.stage = next;
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lrc::status::ShardStatus;

    fn setup(lost: &[ShardIndex]) -> (StageController, ShardStatusTable) {
        let layout = CodeLayout::new(16, 4).unwrap();
        let mut table = ShardStatusTable::new(layout.total_shards());
        for &i in lost {
            table.set_status(i, ShardStatus::Lost).unwrap();
        }
        (StageController::new(layout, lost[0]), table)
    }

    #[test]
    fn test_stage_order() {
        let mut stage = Stage::Init;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            assert!(next > stage);
            stage = next;
            seen.push(stage);
        }
        assert_eq!(seen.len(), 7);
        assert!(stage.is_last());
    }

    #[test]
    fn test_enter_single_loss_uses_row() {
        let (mut controller, table) = setup(&[5]);
        assert_eq!(controller.enter(&table), Stage::HorRebuild);
        // Re-entering does nothing
        assert_eq!(controller.enter(&table), Stage::HorRebuild);
    }

    #[test]
    fn test_enter_row_loss_uses_column() {
        let (mut controller, table) = setup(&[5, 6]);
        assert_eq!(controller.enter(&table), Stage::VerRebuild);
    }

    #[test]
    fn test_enter_row_and_column_loss() {
        let (mut controller, table) = setup(&[5, 6, 9]);
        assert_eq!(controller.enter(&table), Stage::HorRecoveryRebuild);
    }

    #[test]
    fn test_advance_skips_unmet_local_stages() {
        let (mut controller, mut table) = setup(&[5]);
        controller.enter(&table);

        // Column also broken: skip VerRebuild
        table.set_status(9, ShardStatus::Lost).unwrap();
        assert_eq!(controller.advance(&table), Some(Stage::HorRecoveryRebuild));
        assert_eq!(controller.advance(&table), Some(Stage::VerRecoveryRebuild));
        assert_eq!(
            controller.advance(&table),
            Some(Stage::GlobalRecoveryRebuild)
        );
        assert_eq!(controller.advance(&table), Some(Stage::GlobalRebuild));
        assert_eq!(controller.advance(&table), None);
        assert_eq!(controller.stage(), Stage::GlobalRebuild);
    }

    #[test]
    fn test_advance_keeps_met_local_stage() {
        let (mut controller, table) = setup(&[5]);
        controller.enter(&table);
        assert_eq!(controller.advance(&table), Some(Stage::VerRebuild));
    }

    #[test]
    fn test_missing_counts() {
        let (_, table) = setup(&[5, 6, 24]);
        let layout = CodeLayout::new(16, 4).unwrap();
        let counts = MissingCounts::collect(&layout, &table, 5);
        assert_eq!(counts.horizontal, 2);
        assert_eq!(counts.vertical, 1);
        assert_eq!(counts.global, 3);
    }
}
