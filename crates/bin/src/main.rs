//! Marlow CLI binary.
//!
//! Portfolio volatility, P/E, Sharpe ratio and period returns against a benchmark,
//! from holdings given as `TICKER=AMOUNT` pairs.

mod input;

use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use marlow::AnalysisConfig;
use marlow_data::cache::{SqliteCache, default_cache_path};
use marlow_output::{ExportFormat, Exporter, PortfolioReport, ReportBuilder};
use marlow_risk::{Holdings, MetricsEngine};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "marlow")]
#[command(about = "Marlow: portfolio metrics from dollar holdings", long_about = None)]
#[command(version)]
struct Cli {
    /// JSON settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Volatility, P/E, trailing return and Sharpe ratio, plus period returns
    Analyze {
        #[command(flatten)]
        portfolio: PortfolioArgs,

        /// Annual risk-free rate for the Sharpe ratio
        #[arg(long)]
        risk_free_rate: Option<f64>,

        /// Lookback for the headline metrics (e.g. 1y, 6mo)
        #[arg(long)]
        history: Option<String>,
    },

    /// Period returns against a benchmark
    Returns {
        #[command(flatten)]
        portfolio: PortfolioArgs,
    },

    /// Inspect or clear the quote cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Args)]
struct PortfolioArgs {
    /// Holdings as TICKER=AMOUNT
    holdings: Vec<String>,

    /// JSON file of ticker to dollar amount
    #[arg(long = "holdings", value_name = "FILE")]
    holdings_file: Option<PathBuf>,

    /// Period labels, comma separated (e.g. 1y,6mo,1mo)
    #[arg(long, value_delimiter = ',')]
    periods: Vec<String>,

    /// Benchmark ticker
    #[arg(long)]
    benchmark: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Write output to a file instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Disable caching (always fetch fresh data)
    #[arg(long)]
    no_cache: bool,

    /// Force refresh cached data
    #[arg(long)]
    refresh: bool,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show cache location and contents
    Info,

    /// Remove cached data, for one symbol or everything
    Clear {
        /// Only clear this symbol
        symbol: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Markdown,
    Json,
    Csv,
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("marlow=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AnalysisConfig::from_file(path)?,
        None => AnalysisConfig::default(),
    };

    match cli.command {
        Commands::Analyze {
            portfolio,
            risk_free_rate,
            history,
        } => {
            if let Some(rate) = risk_free_rate {
                config.risk_free_rate = rate;
            }
            if let Some(history) = history {
                config.history = history;
            }
            apply_portfolio_args(&mut config, &portfolio);
            config.validate()?;

            let holdings = input::collect_holdings(
                portfolio.holdings_file.as_deref(),
                &portfolio.holdings,
            )?;
            let report = analyze(&config, &holdings, true).await?;
            emit(&report, portfolio.format, portfolio.output.as_deref())?;
        }
        Commands::Returns { portfolio } => {
            apply_portfolio_args(&mut config, &portfolio);
            config.validate()?;

            let holdings = input::collect_holdings(
                portfolio.holdings_file.as_deref(),
                &portfolio.holdings,
            )?;
            let report = analyze(&config, &holdings, false).await?;
            emit(&report, portfolio.format, portfolio.output.as_deref())?;
        }
        Commands::Cache { action } => cache_command(action)?,
    }

    Ok(())
}

fn apply_portfolio_args(config: &mut AnalysisConfig, args: &PortfolioArgs) {
    let periods = input::split_periods(&args.periods);
    if !periods.is_empty() {
        config.periods = periods;
    }
    if let Some(benchmark) = &args.benchmark {
        config.benchmark = benchmark.clone();
    }
    if args.no_cache {
        config.use_cache = false;
    }
    if args.refresh {
        config.force_refresh = true;
    }
}

async fn analyze(
    config: &AnalysisConfig,
    holdings: &Holdings,
    with_metrics: bool,
) -> Result<PortfolioReport, Box<dyn Error>> {
    let source = config.market_data()?;
    let engine = MetricsEngine::with_config(source, config.engine_config());
    let periods = config.lookback_periods();

    info!(
        "Analyzing {} holdings worth ${:.2} against {}",
        holdings.len(),
        holdings.total_value(),
        engine.config().benchmark
    );

    let pb = spinner("Fetching market data...");
    let (metrics, comparison) = if with_metrics {
        let (metrics, comparison) = tokio::join!(
            engine.analyze(holdings),
            engine.compare_with_benchmark(holdings, &periods)
        );
        (Some(metrics), comparison)
    } else {
        (None, engine.compare_with_benchmark(holdings, &periods).await)
    };
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    let mut builder = ReportBuilder::new()
        .holdings(holdings)
        .risk_free_rate(config.risk_free_rate)
        .history(&config.history)
        .comparison(comparison);
    if let Some(metrics) = metrics {
        builder = builder.metrics(metrics);
    }

    Ok(builder.build()?)
}

/// Spinner on stderr, `None` if the style template is rejected.
fn spinner(message: &str) -> Option<ProgressBar> {
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg} [{elapsed}]")
        .ok()?;
    let pb = ProgressBar::new_spinner();
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

fn emit(
    report: &PortfolioReport,
    format: OutputFormat,
    output: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    let rendered = match format {
        OutputFormat::Text => report.to_ascii_table(),
        OutputFormat::Markdown => report.to_markdown(),
        OutputFormat::Json => report.export_to_string(ExportFormat::PrettyJson)?,
        OutputFormat::Csv => report.export_to_string(ExportFormat::Csv)?,
    };

    match output {
        Some(path) => {
            std::fs::write(path, rendered)?;
            info!("Wrote report to {}", path.display());
        }
        None => print!("{rendered}"),
    }
    Ok(())
}

fn cache_command(action: CacheAction) -> Result<(), Box<dyn Error>> {
    let path = default_cache_path();
    debug!("Opening cache at {}", path.display());
    let cache = SqliteCache::new(&path)?;

    match action {
        CacheAction::Info => {
            let stats = cache.get_stats()?;
            println!("Cache location: {}", path.display());
            println!(
                "Cached data: {} quotes for {} symbols, {} valuation snapshots",
                stats.total_quotes, stats.unique_symbols, stats.fundamentals
            );
            if let (Some(oldest), Some(newest)) = (stats.oldest_quote, stats.newest_quote) {
                println!("Quote range: {} to {}", oldest, newest);
            }
        }
        CacheAction::Clear { symbol: Some(symbol) } => {
            cache.clear_symbol(&symbol.to_uppercase())?;
            println!("Cleared cached data for {}", symbol.to_uppercase());
        }
        CacheAction::Clear { symbol: None } => {
            cache.clear_all()?;
            println!("Cleared all cached data");
        }
    }
    Ok(())
}
