mod config;
mod logging;
mod verify;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use engine_logging::engine_info;
use harvest_engine::{ensure_output_dir, Harvester, HttpFeedClient, SystemPacer};
use log::LevelFilter;

use crate::config::HarvestConfig;
use crate::logging::LogDestination;

#[derive(Parser, Debug)]
#[command(
    name = "harvest",
    version,
    about = "Incrementally archive a location-based social feed into WARC files"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll the feed and archive new or changed threads until the session ceiling.
    Run(RunArgs),
    /// Check record framing and payload digests of existing archive files.
    Verify(VerifyArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// RON configuration file.
    #[arg(short, long)]
    config: PathBuf,
    /// Also write the log to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// Log debug messages.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Args, Debug)]
struct VerifyArgs {
    /// Archive files to check.
    #[arg(required = true)]
    archives: Vec<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Run(args) => run(args),
        Command::Verify(args) => verify::run(&args.archives),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("harvest: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: RunArgs) -> Result<()> {
    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let destination = match args.log_file {
        Some(path) => LogDestination::Both(path),
        None => LogDestination::Terminal,
    };
    logging::initialize(destination, level);

    let config = HarvestConfig::load(&args.config)?;
    let settings = config.harvest_settings();
    ensure_output_dir(&settings.output_dir)
        .with_context(|| format!("preparing {}", settings.output_dir.display()))?;
    let feed = HttpFeedClient::new(config.feed_settings()).context("creating feed client")?;

    engine_info!(
        "Harvesting {} every {:?}, {} items per cycle",
        settings.locality,
        settings.poll_interval,
        settings.cycle.item_limit
    );
    let mut harvester = Harvester::new(settings, feed, config.command_delegate(), SystemPacer);
    let summary = harvester.run().context("harvest aborted")?;

    let stats = summary.stats;
    engine_info!(
        "Finished after {} cycles: {} threads archived, {} dropped, {} archive files, {} media handoffs ({} failed)",
        stats.cycles,
        stats.archived,
        stats.dropped,
        summary.archives.len(),
        stats.media_handoffs,
        stats.media_failures
    );
    Ok(())
}
