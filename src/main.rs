mod cli;
mod error;
mod git;
mod logging;
mod pipeline;
mod process;
mod report;
mod serde_helpers;

pub(crate) use error::AppResult;

use clap::Parser;
use tracing::error;

use crate::cli::{Cli, GetVerbosity};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::setup_logger(cli.cmd.get_verbosity(), cli.cmd.log_file()) {
        eprintln!("Failed to initialize logger: {}", e);
        std::process::exit(1);
    }

    match cli.cmd.run().await {
        Ok(report) => {
            // The exit code reflects whether the push actually happened.
            if report.success {
                std::process::exit(0);
            }
            std::process::exit(1);
        }
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}
