use std::process::ExitCode;

use batchscribe::cli::{Cli, Commands};
use batchscribe::commands;
use batchscribe::config::Config;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("batchscribe=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Transcribe {
            files,
            backend,
            dest,
            chunk_size,
        } => {
            let config = Config::load(cli.config.as_deref())?;
            let all_ok = commands::run_transcribe(&config, files, backend, dest, chunk_size).await?;
            Ok(if all_ok {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Backends => {
            let config = Config::load(cli.config.as_deref())?;
            commands::list_backends(&config)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::InitConfig { path, force } => {
            commands::init_config(path.as_deref(), force)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
