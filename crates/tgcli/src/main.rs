mod cli;
mod commands;
#[cfg(feature = "mtproto")]
mod mtproto;
mod prompt;
mod transport;

use std::process::ExitCode;

use clap::Parser;
use tgcli_core::Error;

use crate::cli::{Cli, Commands};

/// Exit status for "not authenticated"; everything else is 1.
const EXIT_UNAUTHORIZED: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = tgcli_core::logging::init("tg") {
        eprintln!("logging init failed: {e}");
    }

    let reads_messages = !matches!(cli.command, Commands::Auth { .. } | Commands::Update);
    match commands::run(cli.command).await {
        Ok(()) => {
            if reads_messages {
                commands::notify_update().await;
            }
            ExitCode::SUCCESS
        }
        Err(err) => report(&err),
    }
}

fn report(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<Error>() {
        Some(e) if e.is_unauthorized() => {
            eprintln!("Not authenticated. Run `tg auth login` first.");
            ExitCode::from(EXIT_UNAUTHORIZED)
        }
        Some(Error::Config(msg)) => {
            eprintln!("Configuration error: {msg}");
            eprintln!("Run `tg auth` to set up.");
            ExitCode::FAILURE
        }
        _ => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
