//! Request List Builder
//!
//! Computes, for the current repair stage, which shards a session still needs
//! and which parity equations will rebuild the target once they arrive.

use crate::error::Result;
use crate::lrc::layout::{CodeLayout, ShardIndex};
use crate::lrc::stage::Stage;
use crate::lrc::status::{ShardStatus, ShardStatusTable};

/// Outcome of planning one stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// These shards must still arrive, in request order
    Request(Vec<ShardIndex>),
    /// Everything is held; solve with these parity equations
    Ready { equations: Vec<ShardIndex> },
    /// The stage cannot succeed with the current losses
    Unsatisfiable,
}

/// Plans shard requests for one lost target
#[derive(Debug, Clone)]
pub struct RequestListBuilder {
    layout: CodeLayout,
    target: ShardIndex,
}

impl RequestListBuilder {
    /// Create a builder for `target`, which must be an original shard.
    pub fn new(layout: CodeLayout, target: ShardIndex) -> Self {
        Self { layout, target }
    }

    /// The lost shard being rebuilt
    pub fn target(&self) -> ShardIndex {
        self.target
    }

    /// Plan `stage` and mark every newly needed shard `Requested`.
    pub fn next_request(&self, stage: Stage, table: &mut ShardStatusTable) -> Result<Plan> {
        let plan = self.plan(stage, table);
        if let Plan::Request(indices) = &plan {
            for &index in indices {
                if table.status(index)? == ShardStatus::Unknown {
                    table.set_status(index, ShardStatus::Requested)?;
                }
            }
        }
        Ok(plan)
    }

    /// Plan `stage` without touching the table.
    pub fn plan(&self, stage: Stage, table: &ShardStatusTable) -> Plan {
        let target_row = self.layout.row_of(self.target).unwrap_or(0);
        let target_column = self.layout.column_of(self.target).unwrap_or(0);

        let (needed, equations) = match stage {
            // Init has no shards of its own; the controller moves past it
            Stage::Init => return Plan::Unsatisfiable,
            Stage::HorRebuild => {
                let group = self.without_target(self.layout.row_group(target_row));
                if table.count_lost(&group) > 0 {
                    return Plan::Unsatisfiable;
                }
                (group, vec![self.layout.row_parity(target_row)])
            }
            Stage::VerRebuild => {
                let group = self.without_target(self.layout.column_group(target_column));
                if table.count_lost(&group) > 0 {
                    return Plan::Unsatisfiable;
                }
                (group, vec![self.layout.column_parity(target_column)])
            }
            Stage::HorRecoveryRebuild => match self.cross_recovery(table, Axis::Row) {
                Some(planned) => planned,
                None => return Plan::Unsatisfiable,
            },
            Stage::VerRecoveryRebuild => match self.cross_recovery(table, Axis::Column) {
                Some(planned) => planned,
                None => return Plan::Unsatisfiable,
            },
            Stage::GlobalRecoveryRebuild => match self.global_recovery(table) {
                Some(planned) => planned,
                None => return Plan::Unsatisfiable,
            },
            Stage::GlobalRebuild => match self.global_rebuild(table) {
                Some(planned) => planned,
                None => return Plan::Unsatisfiable,
            },
        };

        let outstanding: Vec<ShardIndex> = needed
            .into_iter()
            .filter(|&i| !table.is_available(i))
            .collect();

        if outstanding.is_empty() {
            Plan::Ready { equations }
        } else {
            Plan::Request(outstanding)
        }
    }

    fn without_target(&self, group: Vec<ShardIndex>) -> Vec<ShardIndex> {
        group.into_iter().filter(|&i| i != self.target).collect()
    }

    /// Rebuild the other losses of the target's row through their columns
    /// (or of its column through their rows), then the target itself.
    fn cross_recovery(
        &self,
        table: &ShardStatusTable,
        axis: Axis,
    ) -> Option<(Vec<ShardIndex>, Vec<ShardIndex>)> {
        let layout = &self.layout;
        let (home_members, home_parity) = match axis {
            Axis::Row => {
                let row = layout.row_of(self.target)?;
                (layout.row_members(row), layout.row_parity(row))
            }
            Axis::Column => {
                let column = layout.column_of(self.target)?;
                (layout.column_members(column), layout.column_parity(column))
            }
        };
        if table.is_lost(home_parity) {
            return None;
        }

        let mut needed = Vec::new();
        let mut equations = Vec::new();

        for &member in &home_members {
            if member == self.target || !table.is_lost(member) {
                continue;
            }
            let (helper_group, helper_parity) = match axis {
                Axis::Row => {
                    let column = layout.column_of(member)?;
                    (layout.column_group(column), layout.column_parity(column))
                }
                Axis::Column => {
                    let row = layout.row_of(member)?;
                    (layout.row_group(row), layout.row_parity(row))
                }
            };
            let helpers: Vec<ShardIndex> =
                helper_group.into_iter().filter(|&i| i != member).collect();
            if table.count_lost(&helpers) > 0 {
                return None;
            }
            push_unique(&mut needed, helpers);
            equations.push(helper_parity);
        }

        let rest: Vec<ShardIndex> = home_members
            .into_iter()
            .chain(std::iter::once(home_parity))
            .filter(|&i| i != self.target && !table.is_lost(i))
            .collect();
        push_unique(&mut needed, rest);
        equations.push(home_parity);

        Some((needed, equations))
    }

    /// Every surviving original plus one global parity per missing original.
    fn global_recovery(&self, table: &ShardStatusTable) -> Option<(Vec<ShardIndex>, Vec<ShardIndex>)> {
        let layout = &self.layout;
        let originals: Vec<ShardIndex> = (0..layout.original_count()).collect();
        let missing = table.count_lost(&originals);

        let globals: Vec<ShardIndex> = (0..layout.global_count())
            .map(|k| layout.global_parity(k))
            .filter(|&g| !table.is_lost(g))
            .take(missing)
            .collect();
        if globals.len() < missing {
            return None;
        }

        let mut needed: Vec<ShardIndex> = originals
            .into_iter()
            .filter(|&i| !table.is_lost(i))
            .collect();
        needed.extend(&globals);
        Some((needed, globals))
    }

    /// Every surviving shard, solved against every surviving parity.
    fn global_rebuild(&self, table: &ShardStatusTable) -> Option<(Vec<ShardIndex>, Vec<ShardIndex>)> {
        let layout = &self.layout;
        let originals: Vec<ShardIndex> = (0..layout.original_count()).collect();
        let missing = table.count_lost(&originals);

        let parities: Vec<ShardIndex> = layout.parities().filter(|&p| !table.is_lost(p)).collect();
        if missing > parities.len() {
            return None;
        }

        let mut needed: Vec<ShardIndex> = originals
            .into_iter()
            .filter(|&i| !table.is_lost(i))
            .collect();
        needed.extend(&parities);
        Some((needed, parities))
    }
}

#[derive(Debug, Clone, Copy)]
enum Axis {
    Row,
    Column,
}

fn push_unique(into: &mut Vec<ShardIndex>, indices: Vec<ShardIndex>) {
    for index in indices {
        if !into.contains(&index) {
            into.push(index);
        }
    }
}
