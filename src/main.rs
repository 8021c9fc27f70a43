//! Bookfetch main entry point
//!
//! Command-line interface for the portal course-material harvester.

use anyhow::Context;
use bookfetch::config::{DEFAULT_BASE_URL, DEFAULT_DESTINATION, DEFAULT_STATE_DIR};
use bookfetch::download::DownloadReport;
use bookfetch::{Sequencer, Settings};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Bookfetch: harvest course materials from the e-learning portal
///
/// Runs a two-phase crawl against the portal: enumerate the account's course
/// subjects, then enumerate and download the books listed under each one.
/// Phase results are persisted under the state directory so an interrupted
/// run resumes without re-fetching or re-downloading.
#[derive(Parser, Debug)]
#[command(name = "bookfetch")]
#[command(version)]
#[command(about = "Course-material harvester for the e-learning portal", long_about = None)]
struct Cli {
    /// Which part of the crawl to run
    #[arg(value_enum, value_name = "MODE")]
    mode: Mode,

    /// Portal base URL
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Credentials file (two lines: username then password); prompts
    /// interactively when omitted
    #[arg(long, value_name = "FILE")]
    auth_file: Option<PathBuf>,

    /// Destination root for downloaded files
    #[arg(long, default_value = DEFAULT_DESTINATION)]
    destination: PathBuf,

    /// Directory holding the persisted subject queue and book journal
    #[arg(long, default_value = DEFAULT_STATE_DIR)]
    state_dir: PathBuf,

    /// Login attempts before giving up (0 = retry until interrupted)
    #[arg(long, default_value_t = 5)]
    max_login_attempts: u32,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Enumerate subjects and persist the queue
    Subjects,
    /// Drain the subject queue, download books, journal the results
    Books,
    /// Replay the book journal through the download gate
    DownloadAll,
    /// Subjects then books in one session
    All,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let settings = Settings::new(
        &cli.base_url,
        cli.state_dir,
        cli.destination,
        cli.auth_file,
        cli.max_login_attempts,
    )
    .context("invalid configuration")?;

    tracing::info!(base_url = %settings.base_url, mode = ?cli.mode, "starting");

    let mut sequencer = Sequencer::new(&settings)?;
    sequencer.login().await?;

    let mut report = DownloadReport::default();
    match cli.mode {
        Mode::Subjects => sequencer.run_subjects().await?,
        Mode::Books => report.absorb(sequencer.run_books().await?),
        Mode::DownloadAll => report.absorb(sequencer.run_download().await?),
        Mode::All => {
            sequencer.run_subjects().await?;
            report.absorb(sequencer.run_books().await?);
        }
    }

    if report.failed > 0 {
        anyhow::bail!("{} download(s) failed", report.failed);
    }
    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("bookfetch=info,warn"),
            1 => EnvFilter::new("bookfetch=debug,info"),
            2 => EnvFilter::new("bookfetch=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}
