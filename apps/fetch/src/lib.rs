//! Fanout fetch application: configuration, logging setup and a CLI that
//! runs simulated fetch batches through the fan-out dispatcher.

pub use cmd::{Cli, Command, RunArgs};
pub use config::FetchConfig;
pub use runner::{Report, run_batch};

pub mod cmd;
pub mod config;
pub mod logging;
pub mod runner;
pub mod utils;
