//! sshfan
//!
//! Runs a shell script on a list of hosts over SSH, optionally through a jump
//! host. Remote output goes to stdout; logs go to stderr.
//!
//! Exit status: 0 when every host succeeded, 1 when any host failed, 2 when
//! the run could not start.

use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use color_eyre::Result;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod report;

use cli::{Cli, ReportFormat};
use config::{FileConfig, ProcessEnv};

fn init_tracing(debug: bool, json: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> Result<bool> {
    let file = FileConfig::discover(cli.config.as_deref())?;
    let config = config::merge(&cli, file, &ProcessEnv)?;

    let writer: Box<dyn Write + Send> = match cli.report {
        ReportFormat::Text => Box::new(std::io::stdout()),
        ReportFormat::Json => Box::new(std::io::stderr()),
    };

    let result = sshfan_core::run(&config, writer).await?;

    let rendered = match cli.report {
        ReportFormat::Text => report::render_text(&result),
        ReportFormat::Json => report::render_json(&result)? + "\n",
    };
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(rendered.as_bytes())?;
    stdout.flush()?;

    Ok(result.success)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.debug, cli.log_json);

    match run(cli).await {
        Ok(true) => Ok(ExitCode::SUCCESS),
        Ok(false) => Ok(ExitCode::from(1)),
        Err(report) => {
            eprintln!("Error: {report:?}");
            Ok(ExitCode::from(2))
        }
    }
}
