//! Job-Crawler main entry point
//!
//! This is the command-line interface for the configuration-driven job crawler.

use anyhow::Context;
use clap::Parser;
use job_crawler::config::{load_config_with_hash, Config};
use job_crawler::crawler::{BlueprintRegistry, CrawlContext, HttpPageFetcher, SessionController, WorkerPool};
use job_crawler::output::{print_cursors, print_run_report, RunReport};
use job_crawler::storage::{open_storage, CursorStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Job-Crawler: incremental crawling of career sites
///
/// Job-Crawler runs blueprint-described crawl sessions for every configured
/// source, persists new postings to SQLite and remembers how far each source
/// was ingested so the next run only picks up newer postings.
///
/// The `[enrichment-retry]` table is validated here but the retry scheduler
/// is not started by this binary: it needs an enrichment processor, which
/// embedding applications supply through the library.
#[derive(Parser, Debug)]
#[command(name = "job-crawler")]
#[command(version = "1.0.0")]
#[command(about = "A configuration-driven job posting crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "cursors")]
    dry_run: bool,

    /// List persisted ingestion cursors and exit
    #[arg(long, conflicts_with = "dry_run")]
    cursors: bool,

    /// Only crawl the given source codes (repeatable)
    #[arg(long = "source", value_name = "CODE")]
    sources: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config, &cli.sources)
    } else if cli.cursors {
        handle_cursors(&config)
    } else {
        handle_crawl(config, &config_hash, &cli.sources).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("job_crawler=info,warn"),
            1 => EnvFilter::new("job_crawler=debug,info"),
            2 => EnvFilter::new("job_crawler=trace,debug"),
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

fn selected<'a>(config: &'a Config, only: &'a [String]) -> impl Iterator<Item = &'a job_crawler::config::SourceConfig> {
    config
        .sources
        .iter()
        .filter(|s| s.enabled)
        .filter(move |s| only.is_empty() || only.iter().any(|code| code.trim() == s.code.trim()))
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config, only: &[String]) -> anyhow::Result<()> {
    println!("=== Job-Crawler Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Navigation timeout: {}ms", config.crawler.navigation_timeout_ms);
    println!("  Default timeout: {}ms", config.crawler.default_timeout_ms);
    println!("  Fetch attempts: {}", config.crawler.fetch_attempts);
    match config.crawler.run_budget_ms {
        Some(budget) => println!("  Run budget: {}ms", budget),
        None => println!("  Run budget: none"),
    }

    println!("\nWorker Pool:");
    println!("  Workers: {}", config.pool.workers);
    println!("  Queue capacity: {}", config.pool.queue_capacity);
    println!("  Overflow: {:?}", config.pool.overflow);

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);

    println!("\nEnrichment Retry (library only, not run by this binary):");
    println!("  Enabled: {}", config.enrichment_retry.enabled);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    // Compiling the registry checks every selector
    let registry = BlueprintRegistry::from_config(config)?;
    println!("\nBlueprints ({}):", registry.len());
    for blueprint in registry.iter() {
        let status = if !blueprint.enabled {
            "disabled"
        } else if !blueprint.is_configured() {
            "not configured"
        } else {
            "ready"
        };
        println!(
            "  - {} ({}): {:?}, up to {} pages [{}]",
            blueprint.code, blueprint.name, blueprint.paging.mode, blueprint.paging.max_pages, status
        );
    }

    let sources: Vec<_> = selected(config, only).collect();
    println!("\nSources ({}):", sources.len());
    for source in &sources {
        let context = CrawlContext::from_source(source);
        println!("  - {} -> {} (cursor {})", source.code, source.blueprint, context.cursor_key());
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would crawl {} sources", sources.len());

    Ok(())
}

/// Handles the --cursors mode: lists persisted ingestion cursors
fn handle_cursors(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))
        .with_context(|| format!("failed to open {}", config.output.database_path))?;
    let cursors = storage.list_cursors()?;
    print_cursors(&cursors);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: &str, only: &[String]) -> anyhow::Result<()> {
    let registry = BlueprintRegistry::from_config(&config)?;
    let store = Arc::new(
        open_storage(Path::new(&config.output.database_path))
            .with_context(|| format!("failed to open {}", config.output.database_path))?,
    );
    let fetcher = Arc::new(HttpPageFetcher::from_config(
        &config.user_agent,
        config.crawler.navigation_timeout(),
    )?);
    let controller = Arc::new(SessionController::new(
        fetcher,
        store.clone(),
        store.clone(),
        config.crawler.clone(),
    ));
    let pool = WorkerPool::new(controller, &config.pool);

    for code in only {
        if !config.sources.iter().any(|s| s.code.trim() == code.trim()) {
            tracing::warn!("Unknown source requested: {}", code);
        }
    }

    let mut report = RunReport::default();
    let mut handles = Vec::new();
    for source in selected(&config, only) {
        let blueprint = match registry.get(&source.blueprint) {
            Ok(blueprint) => blueprint,
            Err(e) => {
                report.push_error(&source.code, e);
                continue;
            }
        };
        match pool.submit(blueprint, CrawlContext::from_source(source)).await {
            Ok(handle) => handles.push((source.code.clone(), handle)),
            Err(e) => {
                tracing::error!("Failed to queue source {}: {}", source.code, e);
                report.push_error(&source.code, e);
            }
        }
    }
    tracing::info!("Queued {} crawl sessions", handles.len());

    for (code, handle) in handles {
        match handle.outcome().await {
            Ok(outcome) => {
                if let Some(e) = &outcome.persistence_error {
                    tracing::error!("Source {} lost persisted progress: {}", code, e);
                }
                if let Err(e) = store.record_session(&outcome, config_hash) {
                    tracing::warn!("Failed to record session for {}: {}", code, e);
                }
                report.push(&outcome);
            }
            Err(e) => {
                tracing::error!("Source {} failed: {}", code, e);
                report.push_error(code, e);
            }
        }
    }
    pool.shutdown().await;

    print_run_report(&report);

    if report.failed() > 0 {
        anyhow::bail!("{} crawl sessions failed", report.failed());
    }
    Ok(())
}
