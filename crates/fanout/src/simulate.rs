//! Simulated fetch operation.
//!
//! Stands in for a network call: sleeps for a latency drawn uniformly from a
//! configured range (or pinned per target), then answers with an HTTP-like
//! status. A failure rate, or an explicit set of failing targets, injects
//! operation errors.

use crate::{item::WorkItem, operation::Operation};
use anyhow::anyhow;
use rand::Rng;
use serde::Serialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    future::Future,
    time::Duration,
};

/// Payload of a successful simulated fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Response {
    /// The fetched target.
    pub target: String,
    /// Status code answered by the simulated endpoint.
    pub status: u16,
    /// Simulated latency.
    #[serde(rename = "latency_ms", serialize_with = "as_millis")]
    pub latency: Duration,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Latency and failure simulator.
#[derive(Debug, Clone)]
pub struct Simulated {
    min_latency: Duration,
    max_latency: Duration,
    failure_rate: f64,
    status: u16,
    pinned: BTreeMap<String, Duration>,
    failing: BTreeSet<String>,
}

impl Default for Simulated {
    fn default() -> Self {
        Self {
            min_latency: Duration::ZERO,
            max_latency: Duration::from_millis(500),
            failure_rate: 0.0,
            status: 200,
            pinned: BTreeMap::new(),
            failing: BTreeSet::new(),
        }
    }
}

impl Simulated {
    /// A simulator with latencies drawn from `min..=max`.
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min_latency: min.min(max),
            max_latency: max.max(min),
            ..Self::default()
        }
    }

    /// Probability in `0.0..=1.0` that an operation fails.
    pub fn failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Status code reported on success.
    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Pin the latency of one target.
    pub fn latency(mut self, target: impl Into<String>, latency: Duration) -> Self {
        self.pinned.insert(target.into(), latency);
        self
    }

    /// Make one target always fail.
    pub fn fail(mut self, target: impl Into<String>) -> Self {
        self.failing.insert(target.into());
        self
    }

    fn draw(&self, target: &str) -> (Duration, bool) {
        let mut rng = rand::rng();
        let latency = match self.pinned.get(target) {
            Some(latency) => *latency,
            None if self.min_latency == self.max_latency => self.min_latency,
            None => {
                let ms = rng.random_range(
                    self.min_latency.as_millis() as u64..=self.max_latency.as_millis() as u64,
                );
                Duration::from_millis(ms)
            }
        };
        let fails = self.failing.contains(target)
            || (self.failure_rate > 0.0 && rng.random_bool(self.failure_rate));
        (latency, fails)
    }
}

impl Operation for Simulated {
    type Output = Response;

    fn execute(&self, item: &WorkItem) -> impl Future<Output = anyhow::Result<Response>> + Send {
        let (latency, fails) = self.draw(&item.target);
        let target = item.target.clone();
        let status = self.status;
        async move {
            tracing::trace!("fetching {target} ({}ms)", latency.as_millis());
            tokio::time::sleep(latency).await;
            if fails {
                return Err(anyhow!("simulated failure fetching {target}"));
            }
            Ok(Response {
                target,
                status,
                latency,
            })
        }
    }
}
