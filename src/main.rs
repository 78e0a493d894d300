//! Sumi-Harvest main entry point
//!
//! This is the command-line interface for the Sumi-Harvest record harvester.

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use sumi_harvest::config::{load_config_with_hash, Config, SharedConfig};
use sumi_harvest::fetch::{Fetcher, ProxyPool};
use sumi_harvest::harvest::{harvest_all, HarvestOptions};
use sumi_harvest::output::{load_statistics, print_run_summary, print_statistics};
use sumi_harvest::sources::{
    build_drivers, Bounds, CrawlRequest, DateRange, SourceContext, SourceKind,
};
use sumi_harvest::storage::{FileExporter, SqliteSink};
use sumi_harvest::{HarvestError, RecordBatcher};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Sumi-Harvest: a polite record harvester
///
/// Sumi-Harvest crawls housing listings, court cases, disaster news and
/// points of interest under a shared request policy, and stores the records
/// in SQLite tables and flat files.
#[derive(Parser, Debug)]
#[command(name = "sumi-harvest")]
#[command(version)]
#[command(about = "A polite record harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl one or more sources into the destination store
    Crawl(CrawlArgs),

    /// Validate config and show what a crawl would use
    Check,

    /// Show row counts of the destination tables and exit
    Stats,
}

#[derive(Args, Debug)]
struct CrawlArgs {
    /// Sources to crawl (housing, legal, news, poi)
    #[arg(value_name = "SOURCE", required = true)]
    sources: Vec<SourceKind>,

    /// Maximum listing pages per source
    #[arg(long)]
    max_pages: Option<u32>,

    /// Earliest publication date to keep (inclusive)
    #[arg(long, value_name = "YYYY-MM-DD")]
    start_date: Option<NaiveDate>,

    /// Latest publication date to keep (inclusive)
    #[arg(long, value_name = "YYYY-MM-DD")]
    end_date: Option<NaiveDate>,

    /// Search rectangle for the poi source
    #[arg(long, value_name = "SW_LAT,SW_LNG,NE_LAT,NE_LNG")]
    bounds: Option<Bounds>,

    /// Search keyword for the poi source
    #[arg(long)]
    category: Option<String>,

    /// Also dump every record to <DIR>/<destination>.json
    #[arg(long, value_name = "DIR")]
    export_json: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            SharedConfig::new(cfg)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let config = config.current();
    match cli.command {
        Command::Crawl(args) => handle_crawl(&config, args).await,
        Command::Check => handle_check(&config),
        Command::Stats => handle_stats(&config),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_harvest=info,warn"),
            1 => EnvFilter::new("sumi_harvest=debug,info"),
            2 => EnvFilter::new("sumi_harvest=trace,debug"),
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

/// Handles the `check` command: validates config and shows what a crawl would use
fn handle_check(config: &Config) -> anyhow::Result<()> {
    println!("=== Sumi-Harvest Check ===\n");

    let policy = &config.request_policy;
    println!("Request Policy:");
    println!("  Delay: {}s - {}s", policy.min_delay, policy.max_delay);
    println!("  Timeout: {}s", policy.timeout);
    println!(
        "  Retries: {} (backoff multiplier {})",
        policy.max_retries, policy.backoff_multiplier
    );
    println!("  Max concurrent requests: {}", policy.max_concurrent_requests);
    println!("  Proxy cooldown: {}s", policy.proxy_cooldown);

    println!("\nProxies:");
    match (&config.proxy.pool_file, config.proxy.enabled) {
        (Some(path), true) => {
            let pool = ProxyPool::from_file(path)
                .with_context(|| format!("reading proxy pool {}", path.display()))?;
            println!("  {} proxies from {}", pool.len(), path.display());
        }
        _ => println!("  Disabled (direct connections)"),
    }

    println!("\nUser Agents: {}", config.user_agents.pool.len());

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_url);
    println!("  Batch size: {}", config.storage.batch_size);
    if let Some(dir) = &config.storage.raw_html_dir {
        println!("  Raw HTML snapshots: {}", dir.display());
    }
    if let Some(dir) = &config.storage.geojson_dir {
        println!("  GeoJSON exports: {}", dir.display());
    }

    println!("\nRenderer: {} (wait {}s)", config.renderer.binary, config.renderer.wait_seconds);
    println!(
        "Baidu map key: {}",
        if config.api_keys.baidu_map.is_some() { "configured" } else { "missing" }
    );

    let sink = SqliteSink::open(&config.storage.database_url)?;
    sink.test_connection()?;

    println!("\n✓ Configuration is valid");
    println!("✓ Database connection works");
    let sources: Vec<&str> = SourceKind::ALL.iter().map(|k| k.name()).collect();
    println!("✓ Sources available: {}", sources.join(", "));

    Ok(())
}

/// Handles the `stats` command: shows row counts from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.storage.database_url);

    let sink = SqliteSink::open(&config.storage.database_url)?;
    let stats = load_statistics(&sink)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the `crawl` command
async fn handle_crawl(config: &Config, args: CrawlArgs) -> anyhow::Result<()> {
    let fetcher = Arc::new(Fetcher::from_config(config)?);
    if let Some(pool) = fetcher.proxies() {
        tracing::info!("Proxy pool: {} entries", pool.len());
    }

    let sink = SqliteSink::open(&config.storage.database_url)?;
    let batcher = RecordBatcher::new(Arc::new(sink), config.storage.batch_size);

    if let (Some(start), Some(end)) = (args.start_date, args.end_date) {
        anyhow::ensure!(start <= end, "--start-date {} is after --end-date {}", start, end);
    }

    let request = CrawlRequest {
        max_pages: args.max_pages,
        date_range: DateRange::from_bounds(args.start_date, args.end_date),
        bounds: args.bounds,
        category: args.category,
    };

    let context = SourceContext::from_config(config, fetcher);
    let drivers = build_drivers(&args.sources, &context, &request)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing up");
            on_signal.cancel();
        }
    });

    let options = HarvestOptions {
        exporter: Some(Arc::new(FileExporter::from_config(&config.storage))),
        export_json: args.export_json,
    };

    tracing::info!(
        "Starting crawl of {} source(s), batch size {}",
        drivers.len(),
        batcher.batch_size()
    );

    match harvest_all(&drivers, &request, &batcher, &cancel, &options).await {
        Ok(summaries) => {
            print_run_summary(&summaries);
            tracing::info!("Crawl completed successfully");
            Ok(())
        }
        Err(e) => {
            if let HarvestError::Persistence { summaries, .. } = &e {
                print_run_summary(summaries);
            }
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
