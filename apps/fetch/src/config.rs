//! Fetch configuration loaded from TOML.
//!
//! Values are resolved lowest priority first: built-in defaults, the base
//! file, an optional `<stem>-<profile>.toml` overlay next to it, then
//! `FANOUT_<SECTION>_<KEY>` environment variables. `${VAR}` references in
//! the files are expanded before parsing. Command-line flags are applied on
//! top by the caller.

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use fanout::{ChannelCapacity, CollectPolicy, ContextPolicy, Simulated, WorkItem};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use toml::{Table, Value};

/// Default configuration filename looked up in the working directory.
pub const DEFAULT_CONFIG: &str = "fanout.toml";
/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "FANOUT_";

/// Top-level fetch configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// What to dispatch and under which context policy.
    pub batch: BatchConfig,
    /// How results are collected.
    pub collect: CollectConfig,
    /// Simulated operation parameters.
    pub simulation: SimulationConfig,
    /// Logging.
    pub log: LogConfig,
}

/// Context assignment, as named in configuration and on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    /// One deadline shared by the whole batch.
    #[default]
    SharedDeadline,
    /// One cancellable context per item.
    PerItemCancel,
    /// One timeout per item.
    PerItemTimeout,
}

/// Collection policy, as named in configuration and on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CollectKind {
    /// Wait for every result.
    #[default]
    DrainAll,
    /// Return what arrived once the collector deadline elapses.
    Deadline,
}

/// Result channel buffering, as named in configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapacityKind {
    /// One slot per item.
    #[default]
    Batch,
    /// A single slot.
    Rendezvous,
}

impl From<CapacityKind> for ChannelCapacity {
    fn from(kind: CapacityKind) -> Self {
        match kind {
            CapacityKind::Batch => ChannelCapacity::Batch,
            CapacityKind::Rendezvous => ChannelCapacity::Rendezvous,
        }
    }
}

/// `[batch]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Number of generated targets when `urls` is empty.
    pub count: usize,
    /// Explicit targets; overrides `count`.
    pub urls: Vec<String>,
    /// Context policy.
    pub policy: PolicyKind,
    /// Deadline for `shared-deadline`, per-item timeout for `per-item-timeout`.
    pub timeout_ms: u64,
    /// Maximum operations running at once.
    pub concurrency: Option<usize>,
    /// Result channel buffering.
    pub capacity: CapacityKind,
    /// Under `per-item-cancel`, cancel items one by one after random delays
    /// of up to this many milliseconds.
    pub cancel_after_ms: Option<u64>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            count: 6,
            urls: Vec::new(),
            policy: PolicyKind::default(),
            timeout_ms: 100,
            concurrency: None,
            capacity: CapacityKind::default(),
            cancel_after_ms: None,
        }
    }
}

impl BatchConfig {
    /// The work items this section describes.
    pub fn items(&self) -> Vec<WorkItem> {
        if self.urls.is_empty() {
            (0..self.count)
                .map(|i| WorkItem::url(format!("http://example.com/{i}")))
                .collect()
        } else {
            self.urls.iter().cloned().map(WorkItem::url).collect()
        }
    }

    /// The dispatcher context policy.
    pub fn context_policy(&self) -> ContextPolicy {
        let timeout = Duration::from_millis(self.timeout_ms);
        match self.policy {
            PolicyKind::SharedDeadline => ContextPolicy::SharedDeadline(timeout),
            PolicyKind::PerItemCancel => ContextPolicy::PerItemCancel,
            PolicyKind::PerItemTimeout => ContextPolicy::PerItemTimeout(timeout),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.policy != PolicyKind::PerItemCancel && self.timeout_ms == 0 {
            bail!("timeout_ms must be positive");
        }
        if self.concurrency == Some(0) {
            bail!("concurrency must be at least 1");
        }
        Ok(())
    }
}

/// `[collect]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectConfig {
    /// Collection policy.
    pub policy: CollectKind,
    /// Collector deadline for `deadline`.
    pub deadline_ms: u64,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            policy: CollectKind::default(),
            deadline_ms: 1000,
        }
    }
}

impl CollectConfig {
    /// The collector policy.
    pub fn collect_policy(&self) -> CollectPolicy {
        match self.policy {
            CollectKind::DrainAll => CollectPolicy::DrainAll,
            CollectKind::Deadline => {
                CollectPolicy::Deadline(Duration::from_millis(self.deadline_ms))
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.policy == CollectKind::Deadline && self.deadline_ms == 0 {
            bail!("deadline_ms must be positive");
        }
        Ok(())
    }
}

/// `[simulation]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Lower latency bound.
    pub min_latency_ms: u64,
    /// Upper latency bound.
    pub max_latency_ms: u64,
    /// Probability that an operation fails.
    pub failure_rate: f64,
    /// Status code on success.
    pub status: u16,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            min_latency_ms: 0,
            max_latency_ms: 500,
            failure_rate: 0.0,
            status: 200,
        }
    }
}

impl SimulationConfig {
    /// Build the simulated operation.
    pub fn operation(&self) -> Simulated {
        Simulated::new(
            Duration::from_millis(self.min_latency_ms),
            Duration::from_millis(self.max_latency_ms),
        )
        .failure_rate(self.failure_rate)
        .status(self.status)
    }

    fn validate(&self) -> Result<()> {
        if self.min_latency_ms > self.max_latency_ms {
            bail!(
                "min_latency_ms ({}) exceeds max_latency_ms ({})",
                self.min_latency_ms,
                self.max_latency_ms
            );
        }
        if !(0.0..=1.0).contains(&self.failure_rate) {
            bail!("failure_rate must be within 0.0..=1.0");
        }
        Ok(())
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// `[log]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: LogFormat::default(),
        }
    }
}

impl FetchConfig {
    /// Parse a TOML string, expanding environment variables first.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let expanded = crate::utils::expand_env_vars(toml_str);
        let config: Self = toml::from_str(&expanded)?;
        Ok(config)
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with(path, None, env_vars())
    }

    /// Load a base file, merge the profile overlay when it exists, apply
    /// environment overrides from `vars`, and validate the result.
    pub fn load_with(
        path: &Path,
        profile: Option<&str>,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self> {
        let mut table = read_table(path)?;
        if let Some(profile) = profile {
            let overlay = profile_path(path, profile);
            if overlay.exists() {
                merge(&mut table, read_table(&overlay)?);
                tracing::info!("merged profile config from {}", overlay.display());
            } else {
                tracing::info!("no {} found, using base config", overlay.display());
            }
        }
        Self::from_table(table, vars)
    }

    /// Built-in defaults with environment overrides applied.
    pub fn from_env(vars: impl IntoIterator<Item = (String, String)>) -> Result<Self> {
        Self::from_table(Table::new(), vars)
    }

    fn from_table(
        mut table: Table,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self> {
        apply_env_overrides(&mut table, vars);
        let config: Self = Value::Table(table)
            .try_into()
            .context("failed to deserialize config")?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        self.batch.validate().context("batch config")?;
        self.collect.validate().context("collect config")?;
        self.simulation.validate().context("simulation config")?;
        if self.log.level.trim().is_empty() {
            bail!("log config: level is required");
        }
        Ok(())
    }
}

/// Path of the profile overlay for `base`: `dir/<stem>-<profile>.toml`.
pub fn profile_path(base: &Path, profile: &str) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "fanout".to_owned());
    base.with_file_name(format!("{stem}-{profile}.toml"))
}

fn read_table(path: &Path) -> Result<Table> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let expanded = crate::utils::expand_env_vars(&content);
    toml::from_str(&expanded).with_context(|| format!("failed to parse {}", path.display()))
}

/// Merge `overlay` into `base`, recursing into tables.
fn merge(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        let Value::Table(incoming) = value else {
            base.insert(key, value);
            continue;
        };
        if let Some(Value::Table(existing)) = base.get_mut(&key) {
            merge(existing, incoming);
            continue;
        }
        base.insert(key, Value::Table(incoming));
    }
}

/// The process environment, skipping entries that are not valid UTF-8.
pub fn env_vars() -> impl Iterator<Item = (String, String)> {
    std::env::vars_os().filter_map(|(name, value)| {
        Some((name.into_string().ok()?, value.into_string().ok()?))
    })
}

/// Apply `FANOUT_<SECTION>_<KEY>` variables onto `table`.
///
/// `FANOUT_BATCH_TIMEOUT_MS=250` sets `batch.timeout_ms = 250`. Values are
/// read as TOML literals when they parse as one, as strings otherwise.
pub fn apply_env_overrides(table: &mut Table, vars: impl IntoIterator<Item = (String, String)>) {
    for (name, raw) in vars {
        let Some(rest) = name.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let Some((section, key)) = rest.split_once('_') else {
            continue;
        };
        let section = section.to_ascii_lowercase();
        let key = key.to_ascii_lowercase();
        let value = parse_literal(&raw);
        tracing::debug!("config override {section}.{key} from {name}");

        let entry = table
            .entry(section)
            .or_insert(Value::Table(Table::new()));
        if let Value::Table(section) = entry {
            section.insert(key, value);
        }
    }
}

fn parse_literal(raw: &str) -> Value {
    toml::from_str::<Table>(&format!("v = {raw}"))
        .ok()
        .and_then(|mut t| t.remove("v"))
        .unwrap_or_else(|| Value::String(raw.to_owned()))
}
