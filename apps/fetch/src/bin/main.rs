//! Fanout binary entry point.
//!
//! Resolves configuration from file, profile, environment and flags,
//! installs logging, then runs the requested command.

use anyhow::Result;
use clap::Parser;
use fanout_fetch::{Cli, logging};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = {
        let _guard = logging::bootstrap();
        cli.load_config()?
    };
    logging::init(&config.log);
    tracing::debug!("resolved configuration: {config:?}");

    cli.run(config).await
}
