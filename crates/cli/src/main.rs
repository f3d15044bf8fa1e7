//! Shutter CLI - shutter command

use anyhow::Result;
use clap::Parser;
use cli_lib::config::{Cli, Commands, Settings};
use cli_lib::{cmd, logging};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::resolve(&cli.args)?;

    // Keep the guard alive so the file writer flushes on exit
    let _log_guard = logging::init(settings.log_file.as_deref())?;

    match cli.command {
        None => cmd::upload::run(settings).await,
        Some(Commands::Status { all }) => cmd::status::run(&settings, all),
    }
}
