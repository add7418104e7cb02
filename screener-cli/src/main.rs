//! EMA Screener CLI: backfill, daily update, status, query and serve commands.
//!
//! Commands:
//! - `backfill`: download missing histories and rebuild the summary cache
//! - `update`: append today's bar from the market snapshot (after the close)
//! - `status`: report cache, checkpoint and manifest state
//! - `query`: filter, search and sort the summary cache
//! - `serve`: run the REST API

use anyhow::{bail, Context, Result};
use chrono::NaiveTime;
use clap::{Parser, Subcommand};
use screener_core::data::{LogProgress, MarketDataProvider, NseProvider};
use screener_core::domain::SummaryRow;
use screener_core::indicators::EmaPeriod;
use screener_runner::{
    query, DailyUpdateOutcome, Pipeline, PipelineStatus, QueryParams, QueryResponse,
    ScreenerConfig, SortDirection, SortField, DEFAULT_BAND_PCT,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "screener", about = "EMA screener for NSE equities")]
struct Cli {
    /// Path to a TOML config file. Defaults to ./screener.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download missing histories and rebuild the summary cache.
    Backfill {
        /// Parallel provider sessions (overrides pipeline.workers).
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Append today's bar for every symbol in the market snapshot.
    Update {
        /// Pretend the exchange clock reads HH:MM today (for re-running a missed close).
        #[arg(long)]
        force_time: Option<String>,
    },
    /// Report cache, checkpoint and manifest state.
    Status,
    /// Filter, search and sort the summary cache.
    Query {
        /// Band filter: all, 50, 100 or 200.
        #[arg(long, default_value = "all")]
        ema_filter: String,

        /// Band half-width in percent.
        #[arg(long, default_value_t = DEFAULT_BAND_PCT)]
        band: f64,

        /// Sort column (SYMBOL, EMA_50, LAST_CLOSE, DISTANCE_PCT_200, ...).
        #[arg(long)]
        sort: Option<String>,

        /// Sort descending.
        #[arg(long, default_value_t = false)]
        desc: bool,

        /// Case-insensitive symbol substring.
        #[arg(long)]
        search: Option<String>,

        /// Print at most this many rows.
        #[arg(long)]
        limit: Option<usize>,

        /// Emit JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Run the REST API.
    Serve {
        /// Bind address (overrides server.bind).
        #[arg(long)]
        bind: Option<String>,

        /// Port (overrides server.port).
        #[arg(long)]
        port: Option<u16>,
    },
}

fn main() -> Result<()> {
    screener_server::init_tracing();
    let cli = Cli::parse();
    let config = ScreenerConfig::load(cli.config.as_deref())
        .context("failed to load configuration")?;

    match cli.command {
        Commands::Backfill { workers } => run_backfill(config, workers),
        Commands::Update { force_time } => run_update(config, force_time.as_deref()),
        Commands::Status => run_status(&config),
        Commands::Query {
            ema_filter,
            band,
            sort,
            desc,
            search,
            limit,
            json,
        } => run_query(config, &ema_filter, band, sort.as_deref(), desc, search, limit, json),
        Commands::Serve { bind, port } => run_serve(config, bind, port),
    }
}

fn nse_providers(config: &ScreenerConfig, count: usize) -> Result<Vec<Box<dyn MarketDataProvider>>> {
    (0..count)
        .map(|_| {
            NseProvider::new(config.provider.clone())
                .map(|p| Box::new(p) as Box<dyn MarketDataProvider>)
                .context("failed to build NSE provider")
        })
        .collect()
}

fn run_backfill(mut config: ScreenerConfig, workers: Option<usize>) -> Result<()> {
    if let Some(w) = workers {
        if w == 0 {
            bail!("--workers must be at least 1");
        }
        config.pipeline.workers = w;
    }

    let mut providers = nse_providers(&config, config.pipeline.workers)?;
    let pipeline = Pipeline::new(config);
    let now = pipeline.exchange_now()?;
    let report = pipeline.run_backfill(&mut providers, now, &LogProgress)?;

    println!(
        "Backfill complete: {} symbols, {} already stored, {} downloaded, {} failed, {} summarized",
        report.total_symbols,
        report.existing,
        report.downloaded,
        report.failed.len(),
        report.summarized
    );
    for failure in &report.failed {
        eprintln!("  {}: {}", failure.symbol, failure.reason);
    }
    Ok(())
}

fn run_update(config: ScreenerConfig, force_time: Option<&str>) -> Result<()> {
    let mut provider = NseProvider::new(config.provider.clone())?;
    let pipeline = Pipeline::new(config);

    let mut now = pipeline.exchange_now()?;
    if let Some(t) = force_time {
        let time = NaiveTime::parse_from_str(t, "%H:%M")
            .with_context(|| format!("invalid --force-time '{t}' (expected HH:MM)"))?;
        now = now.date().and_time(time);
    }

    match pipeline.run_daily_update(&mut provider, now)? {
        DailyUpdateOutcome::Updated(report) => {
            println!(
                "Updated {} symbols as of {} ({} skipped, {} failed)",
                report.updated,
                report.as_of,
                report.skipped,
                report.failed.len()
            );
            for failure in &report.failed {
                eprintln!("  {}: {}", failure.symbol, failure.reason);
            }
        }
        DailyUpdateOutcome::NotNeeded { reason } => println!("No update needed: {reason}"),
    }
    Ok(())
}

fn run_status(config: &ScreenerConfig) -> Result<()> {
    let status = PipelineStatus::gather(config);

    println!("Summary cache: {}", config.summary_path().display());
    if status.cache_exists {
        println!("  rows: {}", status.cache_size);
    } else {
        println!("  not built yet (run `screener backfill`)");
    }
    match (status.last_update, status.phase) {
        (Some(at), Some(phase)) => println!("Last update: {} ({phase})", at.format("%Y-%m-%d %H:%M:%S")),
        _ => println!("Last update: never"),
    }
    println!(
        "Manifest: {} backfilled, {} failed, {} missing",
        status.backfilled, status.failed, status.missing
    );
    if status.running {
        println!("A pipeline run is in progress ({})", config.lock_path().display());
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_query(
    config: ScreenerConfig,
    ema_filter: &str,
    band: f64,
    sort: Option<&str>,
    desc: bool,
    search: Option<String>,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    if !(band.is_finite() && band > 0.0) {
        bail!("--band must be a positive percentage");
    }
    let filter = if ema_filter.eq_ignore_ascii_case("all") {
        None
    } else {
        Some(ema_filter.parse::<EmaPeriod>().map_err(anyhow::Error::msg)?)
    };
    let sort = sort
        .map(str::parse::<SortField>)
        .transpose()
        .map_err(anyhow::Error::msg)?;

    let params = QueryParams {
        filter,
        band_pct: band,
        sort,
        direction: if desc { SortDirection::Desc } else { SortDirection::Asc },
        search,
    };

    let pipeline = Pipeline::new(config);
    let mut rows = query(&pipeline.summary(), &params);
    if let Some(n) = limit {
        rows.truncate(n);
    }

    if json {
        let response = QueryResponse::new(rows, &params);
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No rows (is the summary cache built?)");
        return Ok(());
    }
    print_table(&rows);
    Ok(())
}

fn print_table(rows: &[SummaryRow]) {
    fn cell(v: Option<f64>) -> String {
        v.map_or_else(|| "-".to_string(), |x| format!("{x:.2}"))
    }

    println!(
        "{:>4}  {:<14} {:>10} {:>10} {:>10} {:>10} {:>8} {:>8} {:>8}  {}",
        "#", "SYMBOL", "CLOSE", "EMA_50", "EMA_100", "EMA_200", "D50%", "D100%", "D200%", "AS_OF"
    );
    for (i, r) in rows.iter().enumerate() {
        println!(
            "{:>4}  {:<14} {:>10.2} {:>10} {:>10} {:>10} {:>8} {:>8} {:>8}  {}",
            i + 1,
            r.symbol,
            r.last_close,
            cell(r.ema_50),
            cell(r.ema_100),
            cell(r.ema_200),
            cell(r.distance_pct_50),
            cell(r.distance_pct_100),
            cell(r.distance_pct_200),
            r.as_of_date
        );
    }
}

fn run_serve(mut config: ScreenerConfig, bind: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(b) = bind {
        config.server.bind = b;
    }
    if let Some(p) = port {
        config.server.port = p;
    }

    tracing::info!("starting server on {}:{}", config.server.bind, config.server.port);
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(screener_server::serve(config))
}
