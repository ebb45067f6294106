//! Per-step summary.

use crate::error::Error;
use petgraph::stable_graph::NodeIndex;
use std::fmt;

/// What happened during one step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    /// Step the report belongs to.
    pub step: u64,
    /// Agents visited by the community pass.
    pub agents: usize,
    /// Agents whose label changed.
    pub label_changes: usize,
    /// Communities founded, by isolated agents or by emergence.
    pub originated: usize,
    /// Emergence switches carried out.
    pub emerged: usize,
    /// Originator token moves.
    pub token_moves: usize,
    /// Originator assignments fixed by the end-of-step sweep.
    pub repairs: usize,
    /// Agents skipped by the mobility measurement, with the reason.
    pub skipped: Vec<(NodeIndex, Error)>,
}

impl StepReport {
    /// Empty report for `step`.
    pub fn new(step: u64) -> Self {
        Self {
            step,
            ..Self::default()
        }
    }

    /// Whether the partition and the tokens were left untouched.
    pub fn is_quiet(&self) -> bool {
        self.label_changes == 0
            && self.originated == 0
            && self.emerged == 0
            && self.token_moves == 0
            && self.repairs == 0
    }
}

impl fmt::Display for StepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "step {}: {} agents, {} relabelled, {} originated, {} emerged, {} token moves, {} repairs",
            self.step,
            self.agents,
            self.label_changes,
            self.originated,
            self.emerged,
            self.token_moves,
            self.repairs
        )?;
        if !self.skipped.is_empty() {
            write!(f, ", {} skipped", self.skipped.len())?;
        }
        Ok(())
    }
}
