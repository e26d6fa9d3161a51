//! Per-item results and the outcome taxonomy.

use crate::{context::ContextError, item::ItemId};
use serde::{Serialize, Serializer};
use std::time::Duration;

/// Why an item did not succeed.
///
/// None of these abort the batch; each is reported in the item's own result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkError {
    /// The operation itself returned an error.
    #[error("operation failed: {0}")]
    Failed(String),
    /// The context deadline elapsed before the operation completed.
    #[error("deadline exceeded")]
    TimedOut,
    /// The context was cancelled before the operation completed.
    #[error("context canceled")]
    Cancelled,
}

impl From<ContextError> for WorkError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::Canceled => Self::Cancelled,
            ContextError::DeadlineExceeded => Self::TimedOut,
        }
    }
}

/// Outcome discriminant of a [`WorkResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// The operation completed and produced a payload.
    Success,
    /// The context was cancelled first.
    Cancelled,
    /// The context deadline elapsed first.
    TimedOut,
    /// The operation returned an error or panicked.
    Failed,
}

/// The single outcome record produced for one work item.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkResult<T> {
    /// Submission position of the originating item.
    pub index: usize,
    /// Identifier of the originating item.
    pub id: ItemId,
    /// Payload on success, the reason otherwise.
    pub outcome: Result<T, WorkError>,
    /// Time from task start until the outcome was decided.
    pub elapsed: Duration,
}

impl<T> WorkResult<T> {
    /// The outcome discriminant.
    pub fn kind(&self) -> OutcomeKind {
        match &self.outcome {
            Ok(_) => OutcomeKind::Success,
            Err(WorkError::Failed(_)) => OutcomeKind::Failed,
            Err(WorkError::TimedOut) => OutcomeKind::TimedOut,
            Err(WorkError::Cancelled) => OutcomeKind::Cancelled,
        }
    }

    /// Whether the operation succeeded.
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// The payload, present only on success.
    pub fn payload(&self) -> Option<&T> {
        self.outcome.as_ref().ok()
    }

    /// The error, present on every outcome but success.
    pub fn error(&self) -> Option<&WorkError> {
        self.outcome.as_ref().err()
    }
}

impl<T: Serialize> Serialize for WorkResult<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("WorkResult", 6)?;
        state.serialize_field("index", &self.index)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("outcome", &self.kind())?;
        state.serialize_field("payload", &self.payload())?;
        state.serialize_field("error", &self.error().map(ToString::to_string))?;
        state.serialize_field("elapsed_ms", &(self.elapsed.as_millis() as u64))?;
        state.end()
    }
}
