//! Facet-Crawl main entry point
//!
//! This is the command-line interface for the adaptive partitioned crawler.

use anyhow::{bail, Context};
use clap::Parser;
use facet_crawl::config::{load_config_with_hash, Config};
use facet_crawl::crawler::Crawler;
use facet_crawl::output::{write_json_lines, write_report};
use facet_crawl::query::FacetLevel;
use facet_crawl::site::SiteKind;
use facet_crawl::{FacetLadder, SearchOptions};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Facet-Crawl: complete retrieval from capped search APIs
///
/// Facet-Crawl fetches every result of a keyword search from a remote job
/// search API that serves only a limited number of pages per query, by
/// splitting the search along configured facets and merging the partitions.
#[derive(Parser, Debug)]
#[command(name = "facet-crawl")]
#[command(version = "1.0.0")]
#[command(about = "An adaptive partitioned crawler for capped search APIs", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Search keyword
    #[arg(value_name = "KEYWORD", required_unless_present = "dry_run")]
    keyword: Option<String>,

    /// Maximum number of distinct records to collect
    #[arg(long, default_value_t = 1000)]
    max_records: usize,

    /// Extra request parameter applied to the search (repeatable)
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    params: Vec<(String, String)>,

    /// Request ascending sort order
    #[arg(long)]
    asc: bool,

    /// Write records to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Emit raw site payloads instead of normalized postings
    #[arg(long)]
    raw: bool,

    /// Validate config and show the facet ladder without searching
    #[arg(long)]
    dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    let Some(keyword) = cli.keyword.as_deref() else {
        bail!("a keyword is required unless --dry-run is given");
    };

    let options = SearchOptions {
        overrides: cli.params.iter().cloned().collect::<BTreeMap<_, _>>(),
        ascending: cli.asc,
    };

    handle_search(&cli, config, keyword, &options).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// Logs go to stderr so stdout can carry records.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("facet_crawl=info,warn"),
            1 => EnvFilter::new("facet_crawl=debug,info"),
            2 => EnvFilter::new("facet_crawl=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the configuration and the facet ladder
fn handle_dry_run(config: &Config) {
    println!("=== Facet-Crawl Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Workers: {}", config.crawler.workers);
    println!(
        "  Page capacity: {} pages x {} records = {}",
        config.crawler.max_pages,
        config.crawler.page_size,
        config.crawler.page_capacity()
    );
    println!(
        "  Jitter: {}-{}ms",
        config.crawler.jitter_min_ms, config.crawler.jitter_max_ms
    );
    println!(
        "  Retry budget: {} (backoff {}ms, rate-limit cooldown {}ms)",
        config.crawler.retry_budget,
        config.crawler.retry_backoff_ms,
        config.crawler.rate_limit_cooldown_ms
    );
    println!(
        "  Stall check: every {}ms, {} samples, after {} requests",
        config.crawler.stall_interval_ms,
        config.crawler.stall_samples,
        config.crawler.stall_min_requests
    );

    println!("\nSite:");
    println!("  Kind: {}", config.site.kind);
    println!("  Base URL: {}", config.site.base_url);
    println!("  User agent: {}", config.site.user_agent);
    if let Some(sort) = &config.site.sort {
        println!("  Sort: {}", sort);
    }
    for (key, value) in &config.site.params {
        println!("  Param: {}={}", key, value);
    }

    let ladder = FacetLadder::from_config(&config.facets);
    println!("\nFacet Ladder ({} levels):", ladder.len());
    for (index, level) in ladder.levels().iter().enumerate() {
        match level {
            FacetLevel::Enumerate { name, values } => {
                println!("  {}. {} ({} values)", index + 1, name, values.len());
            }
            FacetLevel::Refine {
                name,
                parent,
                parent_values,
            } => {
                let dense = parent_values.iter().filter(|v| v.high_density).count();
                println!(
                    "  {}. {} (refines {} high-density {} values)",
                    index + 1,
                    name,
                    dense,
                    parent
                );
            }
        }
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the main search operation
async fn handle_search(
    cli: &Cli,
    config: Config,
    keyword: &str,
    options: &SearchOptions,
) -> anyhow::Result<()> {
    let kind = SiteKind::parse(&config.site.kind)?;
    let crawler = Crawler::new(config)?;

    let outcome = crawler.search(keyword, cli.max_records, options).await?;

    let mut out: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let written = if cli.raw {
        write_json_lines(&outcome.records, &mut out)?
    } else {
        let postings = outcome.transform(kind.posting_transform().as_ref());
        write_json_lines(&postings, &mut out)?
    };
    drop(out);

    if let Some(path) = &cli.output {
        tracing::info!("Wrote {} records to {}", written, path.display());
    }

    if !cli.quiet {
        write_report(&outcome.report, &mut io::stderr().lock())?;
    }

    Ok(())
}
