//! Glamlift - command line front end for the migration engine.
//!
//! Subcommands cover the migration lifecycle: import the harvested catalog
//! into the ledger, upload records (one, a list, a range, or everything),
//! repair incomplete metadata, verify against the live site, and report
//! ledger status. Credentials come from `GLAMLIFT_USERNAME` and
//! `GLAMLIFT_PASSWORD`; commands that never touch the remote (import,
//! status, preview) run without them.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use glamlift_core::{
    load_records, CancellationToken, CategoryExclusions, Ledger, Orchestrator, RunSummary,
    SiteConfig, SiteDefaults, ThrottleConfig, WikiClient,
};

#[derive(Parser, Debug)]
#[command(name = "glamlift")]
#[command(about = "Migrate digitized collections to a wiki media store", version)]
struct Args {
    /// Ledger database path
    #[arg(long, default_value = "glamlift.db")]
    ledger: PathBuf,

    /// MediaWiki API endpoint
    #[arg(long, default_value = SiteDefaults::API_URL)]
    api_url: String,

    /// Language code for labels and title statements
    #[arg(long, default_value = SiteDefaults::LANGUAGE)]
    language: String,

    /// Category exclusions overlay (JSON)
    #[arg(long, default_value = "category_exclusions.json")]
    exclusions: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload records and reconcile their metadata
    ///
    /// With no selector the whole ledger is processed in import order.
    Upload {
        /// Single record id to migrate
        unique_id: Option<String>,

        /// File with one record id per line
        #[arg(long, conflicts_with = "unique_id")]
        ids_file: Option<PathBuf>,

        /// Half-open catalog index range
        #[arg(long, num_args = 2, value_names = ["START", "END"],
              conflicts_with_all = ["unique_id", "ids_file"])]
        range: Option<Vec<usize>>,

        /// Seconds to wait between records
        #[arg(long, default_value_t = 5)]
        delay: u64,

        /// Render what would be sent without sending it
        #[arg(long)]
        preview: bool,
    },

    /// Re-run metadata for uploaded records that are not yet complete
    Repair {
        /// Seconds to wait between records
        #[arg(long, default_value_t = 2)]
        delay: u64,
    },

    /// Audit migrated records against the live remote
    Verify,

    /// Load a harvested catalog export into the ledger
    Import {
        /// Catalog JSON file
        catalog: PathBuf,
    },

    /// Show per-state record counts
    Status,

    /// Print the description page and statements for one record
    Preview { unique_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let ledger = Ledger::open(&args.ledger)
        .with_context(|| format!("could not open ledger {}", args.ledger.display()))?;

    match args.command {
        Command::Import { ref catalog } => import(&ledger, catalog),
        Command::Status => status(&ledger, &args),
        Command::Preview { ref unique_id } => preview(&ledger, &args, unique_id),
        Command::Upload {
            ref unique_id,
            ref ids_file,
            ref range,
            delay,
            preview,
        } => {
            upload(
                ledger,
                &args,
                unique_id.clone(),
                ids_file.clone(),
                range.clone(),
                delay,
                preview,
            )
            .await
        }
        Command::Repair { delay } => repair(ledger, &args, delay).await,
        Command::Verify => verify(ledger, &args).await,
    }
}

fn import(ledger: &Ledger, catalog: &Path) -> Result<()> {
    let records = load_records(catalog)
        .with_context(|| format!("could not load catalog {}", catalog.display()))?;
    let imported = ledger.import_records(&records)?;
    println!(
        "Imported {} records into {}",
        imported,
        ledger.db_path().display()
    );
    Ok(())
}

fn status(ledger: &Ledger, args: &Args) -> Result<()> {
    let counts = ledger.status_counts()?;
    println!("Ledger: {}", args.ledger.display());
    println!("  not started:       {}", counts.not_started);
    println!("  failed:            {}", counts.failed);
    println!("  uploaded:          {}", counts.uploaded);
    println!("  metadata partial:  {}", counts.metadata_partial);
    println!("  metadata complete: {}", counts.metadata_complete);
    println!("  total:             {}", counts.total());
    Ok(())
}

fn preview(ledger: &Ledger, args: &Args, unique_id: &str) -> Result<()> {
    let orchestrator = Orchestrator::new(ledger.clone())
        .with_language(args.language.as_str())
        .with_exclusions(CategoryExclusions::load(&args.exclusions));

    let report = orchestrator.preview_one(unique_id)?;
    println!("{} -> {}", report.unique_id, report.target_filename);
    match &report.label {
        Some(label) => println!("Label ({}): {}", args.language, label),
        None => println!("Label: (none, record has no title)"),
    }
    println!("Statements: {}", report.statement_properties.join(", "));
    println!();
    println!("{}", report.wikitext);
    Ok(())
}

async fn upload(
    ledger: Ledger,
    args: &Args,
    unique_id: Option<String>,
    ids_file: Option<PathBuf>,
    range: Option<Vec<usize>>,
    delay: u64,
    preview: bool,
) -> Result<()> {
    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let mut orchestrator = Orchestrator::new(ledger)
        .with_language(args.language.as_str())
        .with_exclusions(CategoryExclusions::load(&args.exclusions))
        .with_item_delay(Duration::from_secs(delay))
        .with_preview(preview)
        .with_cancel_token(cancel);

    if !preview {
        orchestrator = orchestrator.with_remote(remote_client(args, delay)?);
    } else {
        // With credentials the preview also logs the read-only remote diff
        match remote_client(args, delay) {
            Ok(client) => orchestrator = orchestrator.with_remote(client),
            Err(_) => info!("No credentials found; preview renders offline"),
        }
    }

    let summary = if let Some(id) = unique_id {
        orchestrator.migrate_one(&id).await?
    } else if let Some(path) = ids_file {
        let ids = read_ids(&path)?;
        if ids.is_empty() {
            bail!("ids file {} contains no record ids", path.display());
        }
        orchestrator.migrate_ids(&ids).await?
    } else if let Some(range) = range {
        // clap guarantees both bounds when --range is present
        orchestrator.migrate_range(range[0], range[1]).await?
    } else {
        orchestrator.migrate_all().await?
    };

    print_summary(&summary);
    if summary.failed > 0 {
        bail!("{} records made no progress; re-run to retry them", summary.failed);
    }
    Ok(())
}

async fn repair(ledger: Ledger, args: &Args, delay: u64) -> Result<()> {
    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let orchestrator = Orchestrator::new(ledger)
        .with_remote(remote_client(args, delay)?)
        .with_language(args.language.as_str())
        .with_exclusions(CategoryExclusions::load(&args.exclusions))
        .with_item_delay(Duration::from_secs(delay))
        .with_cancel_token(cancel);

    let summary = orchestrator.repair().await?;
    print_summary(&summary);
    if summary.failed > 0 {
        bail!("{} records made no progress; re-run to retry them", summary.failed);
    }
    Ok(())
}

async fn verify(ledger: Ledger, args: &Args) -> Result<()> {
    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let orchestrator = Orchestrator::new(ledger)
        .with_remote(remote_client(args, 5)?)
        .with_language(args.language.as_str())
        .with_exclusions(CategoryExclusions::load(&args.exclusions))
        .with_cancel_token(cancel);

    let summary = orchestrator.verify().await?;
    println!("Checked:    {}", summary.checked);
    println!("Complete:   {}", summary.complete);
    println!("Incomplete: {}", summary.incomplete);
    println!("Errors:     {}", summary.errors);
    if summary.cancelled {
        println!("Verification was cancelled before finishing.");
    }
    if summary.incomplete > 0 {
        println!("Run `glamlift repair` to fill the gaps.");
    }
    Ok(())
}

/// Build the authenticated API client; `delay` seeds the retry backoff.
fn remote_client(args: &Args, delay: u64) -> Result<Arc<WikiClient>> {
    let throttle = ThrottleConfig::new().with_base_delay(Duration::from_secs(delay));
    let config = SiteConfig::from_env(args.api_url.clone(), args.language.clone())?;
    Ok(Arc::new(WikiClient::new(config, throttle)?))
}

fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after the current record");
            cancel.cancel();
        }
    });
}

fn read_ids(path: &Path) -> Result<Vec<String>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("could not read ids file {}", path.display()))?;
    Ok(data
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect())
}

fn print_summary(summary: &RunSummary) {
    println!("Processed:         {}", summary.processed);
    println!("Uploaded:          {}", summary.uploaded);
    println!("Metadata complete: {}", summary.metadata_complete);
    println!("Metadata partial:  {}", summary.metadata_partial);
    println!("Skipped:           {}", summary.skipped);
    println!("Failed:            {}", summary.failed);
    if summary.previewed > 0 {
        println!("Previewed:         {}", summary.previewed);
    }
    if summary.cancelled {
        println!("Run was cancelled before finishing.");
    }
    if summary.metadata_partial > 0 {
        println!("Run `glamlift repair` to retry incomplete metadata.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn test_read_ids_skips_blanks_and_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids.txt");
        std::fs::write(&path, "BBB-1\n\n# niet deze\n  BBB-2  \n").unwrap();

        let ids = read_ids(&path).unwrap();
        assert_eq!(ids, vec!["BBB-1", "BBB-2"]);
    }

    #[test]
    fn test_upload_range_and_delay_parse() {
        let args = Args::parse_from([
            "glamlift", "--ledger", "x.db", "upload", "--range", "10", "20", "--delay", "7",
        ]);
        match args.command {
            Command::Upload { range, delay, .. } => {
                assert_eq!(range, Some(vec![10, 20]));
                assert_eq!(delay, 7);
            }
            other => panic!("parsed wrong command: {:?}", other),
        }
    }
}
