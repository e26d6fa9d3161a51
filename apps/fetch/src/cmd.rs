//! CLI argument parsing and subcommand handlers.

use crate::{
    config::{CollectKind, DEFAULT_CONFIG, FetchConfig, PolicyKind, env_vars},
    runner,
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Concurrent fan-out fetch dispatcher.
#[derive(Parser, Debug)]
#[command(name = "fanout", about = "Concurrent fan-out fetch dispatcher")]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (default: ./fanout.toml when present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Profile overlay merged over the base configuration.
    #[arg(long, global = true)]
    pub profile: Option<String>,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Dispatch one simulated batch and report the results.
    Run(RunArgs),
    /// Print the effective configuration.
    Config,
}

/// Flags overriding the configured batch.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Number of generated targets.
    #[arg(long)]
    pub count: Option<usize>,

    /// Context policy.
    #[arg(long, value_enum)]
    pub policy: Option<PolicyKind>,

    /// Shared deadline or per-item timeout in milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Collection policy.
    #[arg(long, value_enum)]
    pub collect: Option<CollectKind>,

    /// Collector deadline in milliseconds.
    #[arg(long)]
    pub collect_deadline_ms: Option<u64>,

    /// Maximum operations running at once.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Print results as JSON.
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    /// Apply the flags that were given onto `config`.
    pub fn apply(&self, config: &mut FetchConfig) {
        if let Some(count) = self.count {
            config.batch.count = count;
            config.batch.urls.clear();
        }
        if let Some(policy) = self.policy {
            config.batch.policy = policy;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.batch.timeout_ms = timeout_ms;
        }
        if let Some(collect) = self.collect {
            config.collect.policy = collect;
        }
        if let Some(deadline_ms) = self.collect_deadline_ms {
            config.collect.deadline_ms = deadline_ms;
        }
        if self.concurrency.is_some() {
            config.batch.concurrency = self.concurrency;
        }
    }
}

impl Cli {
    /// Resolve the configuration: file and profile when present, environment,
    /// then command-line flags.
    pub fn load_config(&self) -> Result<FetchConfig> {
        let vars = env_vars();
        let mut config = match &self.config {
            Some(path) => FetchConfig::load_with(path, self.profile.as_deref(), vars)?,
            None if Path::new(DEFAULT_CONFIG).exists() => {
                FetchConfig::load_with(Path::new(DEFAULT_CONFIG), self.profile.as_deref(), vars)?
            }
            None => FetchConfig::from_env(vars)?,
        };
        if let Command::Run(args) = &self.command {
            args.apply(&mut config);
            config.validate()?;
        }
        Ok(config)
    }

    /// Execute the parsed command against a resolved configuration.
    pub async fn run(self, config: FetchConfig) -> Result<()> {
        match self.command {
            Command::Run(args) => {
                let report = runner::run_batch(&config).await;
                if args.json {
                    let json = serde_json::to_string_pretty(&report)
                        .context("failed to serialize report")?;
                    println!("{json}");
                } else {
                    print!("{report}");
                }
            }
            Command::Config => {
                let toml = toml::to_string_pretty(&config).context("failed to serialize config")?;
                print!("{toml}");
            }
        }
        Ok(())
    }
}
