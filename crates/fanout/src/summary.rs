//! Caller-facing batch summary.

use crate::{
    item::ItemId,
    result::{OutcomeKind, WorkResult},
};
use serde::Serialize;
use std::fmt;

/// Counts per outcome, plus the reason for every item that did not succeed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Items dispatched.
    pub total: usize,
    /// Items that succeeded.
    pub succeeded: usize,
    /// Items whose operation failed.
    pub failed: usize,
    /// Items whose deadline elapsed first.
    pub timed_out: usize,
    /// Items cancelled before completion.
    pub cancelled: usize,
    /// `(id, reason)` for every collected item that did not succeed.
    pub reasons: Vec<(ItemId, String)>,
    /// Items whose result was never collected.
    pub missing: Vec<ItemId>,
}

impl Summary {
    /// Summarize collected results; `missing` lists uncollected items.
    pub fn new<T>(results: &[WorkResult<T>], missing: Vec<ItemId>) -> Self {
        let mut summary = Summary {
            total: results.len() + missing.len(),
            missing,
            ..Default::default()
        };
        for result in results {
            match result.kind() {
                OutcomeKind::Success => summary.succeeded += 1,
                OutcomeKind::Failed => summary.failed += 1,
                OutcomeKind::TimedOut => summary.timed_out += 1,
                OutcomeKind::Cancelled => summary.cancelled += 1,
            }
            if let Some(err) = result.error() {
                summary.reasons.push((result.id.clone(), err.to_string()));
            }
        }
        summary
    }

    /// Count for one outcome kind.
    pub fn count(&self, kind: OutcomeKind) -> usize {
        match kind {
            OutcomeKind::Success => self.succeeded,
            OutcomeKind::Failed => self.failed,
            OutcomeKind::TimedOut => self.timed_out,
            OutcomeKind::Cancelled => self.cancelled,
        }
    }

    /// Whether every dispatched item succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.succeeded == self.total
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} succeeded ({} failed, {} timed out, {} cancelled",
            self.succeeded, self.total, self.failed, self.timed_out, self.cancelled
        )?;
        if !self.missing.is_empty() {
            write!(f, ", {} missing", self.missing.len())?;
        }
        write!(f, ")")
    }
}
