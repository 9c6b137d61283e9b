use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod artifact;
mod cli;
mod config;
mod engine;
mod output;
mod sidecar;
mod source;
#[cfg(test)]
mod testutil;

use cli::{Cli, Command};
use config::Config;
use engine::Request;

const EXIT_REJECTED: u8 = 1;
const EXIT_ERROR: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let json = cli.json;

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_REJECTED),
        Err(err) => {
            output::render_error(&err, json);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Returns whether attendance was accepted.
async fn run(cli: Cli) -> Result<bool> {
    let mut config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    cli.apply_overrides(&mut config);
    config.validate().context("invalid configuration")?;

    let reference = cli.reference().to_path_buf();
    let request = match &cli.command {
        Command::Live(args) => Request::Live {
            reference: args.reference.clone(),
            frames: args.frames.clone(),
        },
        Command::Pair(args) => Request::Pair {
            reference: args.reference.clone(),
            probe: args.probe.clone(),
        },
    };

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "presence starting");
    let handle = engine::spawn(&config, request).context("failed to start verification")?;
    let report = handle.wait().await.context("verification did not complete")?;

    output::render_report(&report, cli.json)?;

    if let Some(log) = &config.audit_log {
        if let Err(e) = artifact::append_audit_record(log, &reference, &report) {
            tracing::warn!(log = %log.display(), error = %format!("{e:#}"), "audit record not written");
        }
    }

    Ok(report.accepted())
}
