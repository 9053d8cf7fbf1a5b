use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use pushcloud::cli::Cli;
use pushcloud::config::UploadTuning;
use pushcloud::terminal::{TerminalPrompter, failure_message, read_password};
use pushcloud_core::{
    Copier, CopyReport, Credentials, FileSource, ReqwestTransport, TokioSleeper,
};
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<CopyReport> {
    let Cli {
        dump,
        console_url,
        username,
        password,
        ..
    } = cli;
    let tuning = UploadTuning::from_env();
    tracing::debug!(?tuning, "upload tuning");
    let source = FileSource::open(&dump)
        .await
        .with_context(|| format!("cannot read dump {}", dump.display()))?;
    let password = match password {
        Some(password) => password,
        None => read_password(&username).context("failed to read password")?,
    };
    let credentials = Credentials::new(username, password);

    let copier = Copier::with_parts(
        ReqwestTransport::with_idle_timeout(tuning.http_idle_timeout)?,
        TokioSleeper,
        TerminalPrompter::stdio(),
        tuning.retry_policy(),
    );
    let report = copier.copy(&console_url, &source, credentials).await?;
    Ok(report)
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(cli).await {
        Ok(report) => {
            eprintln!(
                "[pushcloud] uploaded {} bytes (crc32 {:08x}), import started",
                report.bytes, report.crc32
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("[pushcloud] {}", failure_message(&err));
            ExitCode::FAILURE
        }
    }
}
