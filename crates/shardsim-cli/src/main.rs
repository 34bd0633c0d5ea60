use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use shardsim_cli::{load_config, logging, run, Cli};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            // Logging is not up yet; the config decides the level.
            eprintln!("shardsim: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    logging::init(&config.log_level);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match run(&cli.command, &config, &mut out) {
        Ok(()) => {
            let _ = out.flush();
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "command failed");
            ExitCode::FAILURE
        }
    }
}
