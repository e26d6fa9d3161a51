//! Worker task: one per work item, exactly one result per task.

use crate::{
    context::Context,
    item::WorkItem,
    operation::Operation,
    result::{WorkError, WorkResult},
};
use futures_util::FutureExt;
use std::{panic::AssertUnwindSafe, sync::Arc};
use tokio::{
    sync::{Semaphore, mpsc},
    time::Instant,
};

/// Everything a spawned worker owns.
pub(crate) struct Worker<O: Operation> {
    pub index: usize,
    pub item: WorkItem,
    pub ctx: Context,
    pub op: Arc<O>,
    pub gate: Option<Arc<Semaphore>>,
    pub tx: mpsc::Sender<WorkResult<O::Output>>,
}

impl<O: Operation> Worker<O> {
    /// Run the operation and post its result.
    ///
    /// The send happens on every path, including cancellation while
    /// waiting for an admission permit.
    pub async fn run(self) {
        let Self {
            index,
            item,
            ctx,
            op,
            gate,
            tx,
        } = self;
        let started = Instant::now();

        // The permit is held until the result is sent.
        let (outcome, _permit) = match admit(&ctx, gate).await {
            Ok(permit) => (perform(&ctx, &*op, &item).await, permit),
            Err(err) => (Err(err), None),
        };

        let result = WorkResult {
            index,
            id: item.id,
            outcome,
            elapsed: started.elapsed(),
        };
        tracing::debug!(
            "item {} ({}) finished as {:?} after {}ms",
            result.index,
            result.id,
            result.kind(),
            result.elapsed.as_millis()
        );

        if tx.send(result).await.is_err() {
            tracing::debug!("collector gone, result for item {index} dropped");
        }
    }
}

/// Wait for an admission permit, unless the context fires first.
async fn admit(
    ctx: &Context,
    gate: Option<Arc<Semaphore>>,
) -> Result<Option<tokio::sync::OwnedSemaphorePermit>, WorkError> {
    let Some(gate) = gate else {
        return Ok(None);
    };
    tokio::select! {
        biased;
        reason = ctx.done() => Err(reason.into()),
        // The gate is never closed, so an acquire error only means no permit.
        permit = gate.acquire_owned() => Ok(permit.ok()),
    }
}

/// Race the operation against the context.
///
/// The context is polled first: when both are ready at once the item is
/// reported as cancelled or timed out, never as a success.
async fn perform<O: Operation>(
    ctx: &Context,
    op: &O,
    item: &WorkItem,
) -> Result<O::Output, WorkError> {
    let work = AssertUnwindSafe(async { op.execute(item).await }).catch_unwind();
    tokio::select! {
        biased;
        reason = ctx.done() => Err(reason.into()),
        outcome = work => match outcome {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(err)) => Err(WorkError::Failed(format!("{err:#}"))),
            Err(_) => Err(WorkError::Failed("operation panicked".into())),
        },
    }
}
