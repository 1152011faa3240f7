//! imap-export: search an IMAP mailbox and export matching messages
//!
//! Connects to one mailbox, filters messages by sender, recipient, keywords
//! and date range across the inbox or every folder, and writes each match
//! as a raw `.eml`, a readable text file and a PDF document. Privacy mode
//! masks every email address in every artifact and in the file names.
//!
//! # Architecture
//!
//! - [`main`]: Process entry point with env loading, logging and exit codes
//! - [`cli`]: Command-line flags
//! - [`config`]: CLI and environment merged into a single run configuration
//! - [`errors`]: Application error model and exit status mapping
//! - [`imap`]: IMAP capability traits and the `async-imap` backend
//! - [`connect`]: Transport auto-detection and port selection
//! - [`folders`]: Folder enumeration
//! - [`mime`]: Message parsing, body extraction and HTML handling
//! - [`filter`]: Per-folder search and local predicates
//! - [`redact`]: Email address masking for privacy mode
//! - [`paths`]: Export directory and file naming
//! - [`render`]: Document renderer contract and the PDF backend
//! - [`export`]: Atomic artifact writer
//! - [`observer`]: Injected run observability
//! - [`pipeline`]: Orchestration and the run summary

mod cli;
mod config;
mod connect;
mod errors;
mod export;
mod filter;
mod folders;
mod imap;
mod mime;
mod models;
mod observer;
mod paths;
mod pipeline;
mod redact;
mod render;
#[cfg(test)]
mod test_support;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use config::RunConfig;
use imap::AsyncImapConnector;
use observer::TracingObserver;
use pipeline::RunSummary;
use render::PdfRenderer;

/// Exit status after Ctrl-C
const EXIT_INTERRUPTED: u8 = 130;

/// Application entry point
///
/// Loads the `.env` file named by `--env` (a missing file is not an error),
/// resolves the configuration, and runs one search-and-export pass.
///
/// # Exit status
///
/// - `0`: run complete
/// - `3`: run complete, but some messages or artifacts were not exported
/// - `2`: invalid configuration
/// - `1`: connection, folder listing or other fatal failure
///
/// # Example
///
/// ```no_run
/// MAILHOST=imap.example.com USERNAME=user@example.com PASSWORD=secret \
/// cargo run -- --sender boss@company.com --start-date 2023-01-01
/// ```
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let env_loaded = dotenvy::from_path(&cli.env).is_ok();

    let today = chrono::Local::now().date_naive();
    let config = RunConfig::resolve(&cli, today);
    let verbose = config.as_ref().map_or(cli.verbose, |c| c.options.verbose);
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return exit_code(e.exit_code());
        }
    };
    if env_loaded {
        tracing::debug!(path = %cli.env.display(), "loaded environment file");
    }

    let connector = AsyncImapConnector::new(config.timeouts);
    let observer = TracingObserver::new(config.options.verbose);
    let outcome = tokio::select! {
        result = pipeline::run(&connector, &config, &PdfRenderer, &observer) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted; artifacts already written are kept");
            return ExitCode::from(EXIT_INTERRUPTED);
        }
    };

    let summary = match outcome {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!(error = %e, "run aborted");
            return exit_code(e.exit_code());
        }
    };

    print_summary(&summary);
    if let Some(path) = cli.summary_json.as_deref() {
        let written = serde_json::to_vec_pretty(&summary)
            .map_err(|e| e.to_string())
            .and_then(|json| std::fs::write(path, json).map_err(|e| e.to_string()));
        if let Err(e) = written {
            tracing::error!(path = %path.display(), error = %e, "failed to write run summary");
            return exit_code(1);
        }
    }
    exit_code(summary.exit_code())
}

fn print_summary(summary: &RunSummary) {
    println!(
        "Exported {}/{} messages to {}",
        summary.exported,
        summary.selected(),
        summary.export_directory.display()
    );
    println!(
        "Folders searched: {}, skipped: {}",
        summary.folders_searched,
        summary.skipped_folders.len()
    );
    for skipped in &summary.skipped_folders {
        println!("  skipped {}: {}", skipped.folder, skipped.reason);
    }
    println!(
        "Matches: {} (duplicates {}), unreadable messages: {}, failed artifacts: {}",
        summary.matched,
        summary.duplicates,
        summary.skipped_messages,
        summary.failed_artifacts
    );
    if summary.limit_reached {
        println!("Stopped at the --max-results limit");
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
