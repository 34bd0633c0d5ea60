//! Library half of the `shardsim` binary: argument definitions, config
//! loading and the command handlers, kept here so they can be tested.

pub mod args;
pub mod commands;
pub mod logging;

pub use args::{Cli, Command};
pub use commands::{load_config, run};
