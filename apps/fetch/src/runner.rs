//! One simulated fetch batch, start to finish.

use crate::config::{FetchConfig, PolicyKind};
use fanout::{CancelHandle, Dispatcher, Response, Summary, WorkResult};
use rand::Rng;
use serde::Serialize;
use std::{fmt, time::Duration};

/// Everything a batch run produced, in submission order.
#[derive(Debug, Serialize)]
pub struct Report {
    /// Collected results, ordered by submission index.
    pub results: Vec<WorkResult<Response>>,
    /// Per-outcome counts.
    pub summary: Summary,
    /// Wall time of the whole batch.
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Dispatch the configured batch against the simulated operation and
/// collect it under the configured policy.
pub async fn run_batch(config: &FetchConfig) -> Report {
    let mut dispatcher =
        Dispatcher::new(config.simulation.operation()).capacity(config.batch.capacity.into());
    if let Some(limit) = config.batch.concurrency {
        dispatcher = dispatcher.limit(limit);
    }

    let batch = dispatcher.dispatch(config.batch.items(), config.batch.context_policy());
    if let (PolicyKind::PerItemCancel, Some(max)) =
        (config.batch.policy, config.batch.cancel_after_ms)
    {
        tokio::spawn(cancel_progressively(batch.cancel_handle(), batch.len(), max));
    }

    let collected = batch.collect(config.collect.collect_policy()).await;
    let summary = collected.summary();
    let elapsed = collected.elapsed();
    tracing::info!("batch finished in {}ms: {summary}", elapsed.as_millis());

    Report {
        results: collected.ordered(),
        summary,
        elapsed,
    }
}

/// Cancel items in submission order, each after a random pause.
async fn cancel_progressively(handle: CancelHandle, len: usize, max_ms: u64) {
    for index in 0..len {
        let pause = Duration::from_millis(rand::rng().random_range(0..=max_ms));
        tokio::time::sleep(pause).await;
        if handle.cancel_index(index) {
            tracing::debug!("cancelled item {index} after {}ms pause", pause.as_millis());
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for result in &self.results {
            let detail = match &result.outcome {
                Ok(response) => format!("status {}", response.status),
                Err(err) => err.to_string(),
            };
            writeln!(
                f,
                "{:<32} {:<10} {:>6}ms  {detail}",
                result.id,
                format!("{:?}", result.kind()),
                result.elapsed.as_millis(),
            )?;
        }
        for id in &self.summary.missing {
            writeln!(f, "{id:<32} {:<10} {:>6}  not collected", "Missing", "-")?;
        }
        writeln!(f, "{} in {}ms", self.summary, self.elapsed.as_millis())
    }
}
