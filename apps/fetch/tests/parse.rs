//! Tests for CLI argument parsing.

use clap::Parser;
use fanout_fetch::{
    Cli, Command, FetchConfig,
    config::{CollectKind, PolicyKind},
};

#[test]
fn cli_parse_run() {
    let cli = Cli::parse_from(["fanout", "run"]);
    assert!(matches!(cli.command, Command::Run(_)));
    assert!(cli.config.is_none());
}

#[test]
fn cli_parse_config() {
    let cli = Cli::parse_from(["fanout", "config"]);
    assert!(matches!(cli.command, Command::Config));
}

#[test]
fn cli_parse_global_flags() {
    let cli = Cli::parse_from(["fanout", "--config", "x.toml", "--profile", "dev", "run"]);
    assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("x.toml")));
    assert_eq!(cli.profile.as_deref(), Some("dev"));
}

#[test]
fn cli_parse_run_flags() {
    let cli = Cli::parse_from([
        "fanout",
        "run",
        "--count",
        "10",
        "--policy",
        "per-item-cancel",
        "--timeout-ms",
        "50",
        "--collect",
        "deadline",
        "--collect-deadline-ms",
        "200",
        "--concurrency",
        "3",
        "--json",
    ]);
    let Command::Run(args) = cli.command else {
        panic!("expected Run command");
    };
    assert_eq!(args.count, Some(10));
    assert_eq!(args.policy, Some(PolicyKind::PerItemCancel));
    assert_eq!(args.collect, Some(CollectKind::Deadline));
    assert!(args.json);
}

#[test]
fn run_flags_override_config() {
    let cli = Cli::parse_from(["fanout", "run", "--count", "2", "--timeout-ms", "700"]);
    let Command::Run(args) = cli.command else {
        panic!("expected Run command");
    };

    let mut config = FetchConfig::from_toml("[batch]\nurls = [\"http://a.test\"]\n").unwrap();
    args.apply(&mut config);
    assert_eq!(config.batch.count, 2);
    assert!(config.batch.urls.is_empty());
    assert_eq!(config.batch.timeout_ms, 700);
    assert_eq!(config.batch.policy, PolicyKind::SharedDeadline);
}

#[test]
fn cli_rejects_unknown_policy() {
    assert!(Cli::try_parse_from(["fanout", "run", "--policy", "sometimes"]).is_err());
}
