//! Result collection.
//!
//! Results arrive in completion order. [`Collected::ordered`] re-associates
//! them with their items by submission index.

use crate::{
    dispatch::Batch,
    item::ItemId,
    result::WorkResult,
    summary::Summary,
};
use std::{collections::BTreeSet, time::Duration};
use tokio::time;

/// When collection stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectPolicy {
    /// Receive exactly one result per item.
    DrainAll,
    /// Stop at the first of: every result received, or the deadline.
    ///
    /// Items still running when the deadline elapses are cancelled and
    /// their results discarded; their sends fail instead of blocking.
    Deadline(Duration),
}

impl<T> Batch<T> {
    /// Drain the result channel under `policy`.
    ///
    /// Every context of the batch is released before this returns.
    pub async fn collect(mut self, policy: CollectPolicy) -> Collected<T> {
        let expected = self.ids.len();
        let mut results = Vec::with_capacity(expected);

        match policy {
            CollectPolicy::DrainAll => {
                for _ in 0..expected {
                    match self.rx.recv().await {
                        Some(result) => results.push(result),
                        None => {
                            tracing::warn!(
                                "result channel closed after {} of {expected} result(s)",
                                results.len()
                            );
                            break;
                        }
                    }
                }
            }
            CollectPolicy::Deadline(limit) => {
                let deadline = time::sleep(limit);
                tokio::pin!(deadline);
                while results.len() < expected {
                    tokio::select! {
                        biased;
                        received = self.rx.recv() => match received {
                            Some(result) => results.push(result),
                            None => {
                                tracing::warn!(
                                    "result channel closed after {} of {expected} result(s)",
                                    results.len()
                                );
                                break;
                            }
                        },
                        _ = &mut deadline => {
                            tracing::warn!(
                                "collection deadline of {}ms elapsed with {} of {expected} \
                                 result(s)",
                                limit.as_millis(),
                                results.len()
                            );
                            break;
                        }
                    }
                }
            }
        }

        self.cancel.cancel_all();
        let elapsed = self.started.elapsed();
        tracing::info!(
            "collected {} of {expected} result(s) in {}ms",
            results.len(),
            elapsed.as_millis()
        );

        Collected {
            results,
            ids: self.ids.to_vec(),
            elapsed,
        }
    }
}

/// The outcome of one collection phase.
#[derive(Debug)]
pub struct Collected<T> {
    /// Results in completion order.
    pub results: Vec<WorkResult<T>>,
    ids: Vec<ItemId>,
    elapsed: Duration,
}

impl<T> Collected<T> {
    /// Number of items the batch was dispatched with.
    pub fn expected(&self) -> usize {
        self.ids.len()
    }

    /// Whether every item produced a result.
    pub fn is_complete(&self) -> bool {
        self.results.len() == self.ids.len()
    }

    /// Wall time from dispatch until collection stopped.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Ids of the items whose results were not collected, in submission order.
    pub fn missing(&self) -> Vec<ItemId> {
        let seen: BTreeSet<usize> = self.results.iter().map(|r| r.index).collect();
        self.ids
            .iter()
            .enumerate()
            .filter(|(index, _)| !seen.contains(index))
            .map(|(_, id)| id.clone())
            .collect()
    }

    /// Per-outcome counts and reasons.
    pub fn summary(&self) -> Summary {
        Summary::new(&self.results, self.missing())
    }

    /// Results in submission order.
    pub fn ordered(mut self) -> Vec<WorkResult<T>> {
        self.results.sort_by_key(|r| r.index);
        self.results
    }
}

impl<T> IntoIterator for Collected<T> {
    type Item = WorkResult<T>;
    type IntoIter = std::vec::IntoIter<WorkResult<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

