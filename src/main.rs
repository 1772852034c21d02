//! Stock Price Forecaster
//!
//! Command-line front end: loads OHLCV history from CSV and runs forecasts,
//! training and feature export.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stock_forecaster::{
    config::Config,
    data,
    forecast::{ForecastOrchestrator, ForecastRequest},
    storage::{ModelCache, ResultStore},
    types::{ForecastResult, ModelSelector, RawSeries},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "stock-forecaster")]
#[command(about = "OHLCV feature engineering and ensemble price forecasting")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Forecast future closes for one CSV file
    Forecast {
        /// OHLCV CSV with a date column
        csv: PathBuf,
        /// Symbol (defaults to the file name)
        #[arg(short, long)]
        symbol: Option<String>,
        /// Days to forecast (defaults to forecast.default_horizon)
        #[arg(short = 'n', long)]
        horizon: Option<usize>,
        /// `ensemble`, `ensemble:a,b` or a single model type
        #[arg(short, long, default_value = "ensemble")]
        model: String,
        /// Include aggregated feature importance
        #[arg(long)]
        features: bool,
        /// Omit confidence intervals
        #[arg(long)]
        no_confidence: bool,
        /// Save the result as JSON under storage.results_dir
        #[arg(long)]
        save: bool,
    },
    /// Train one model and report holdout accuracy
    Train {
        csv: PathBuf,
        #[arg(short, long)]
        symbol: Option<String>,
        #[arg(short, long, default_value = "xgboost")]
        model: String,
        /// Holdout fraction (defaults to forecast.test_size)
        #[arg(long)]
        test_size: Option<f64>,
    },
    /// Write the engineered feature matrix to CSV
    Features {
        csv: PathBuf,
        /// Output path
        #[arg(short, long, default_value = "features.csv")]
        output: PathBuf,
    },
    /// Forecast several CSV files in parallel and save every result
    Batch {
        csvs: Vec<PathBuf>,
        #[arg(short = 'n', long)]
        horizon: Option<usize>,
        #[arg(short, long, default_value = "ensemble")]
        model: String,
    },
    /// Print a saved forecast
    Show {
        job_id: String,
    },
    /// Forecast a synthetic trending series
    Demo {
        #[arg(long, default_value = "400")]
        days: usize,
        #[arg(short = 'n', long, default_value = "7")]
        horizon: usize,
        #[arg(short, long, default_value = "ensemble")]
        model: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Forecast {
            csv,
            symbol,
            horizon,
            model,
            features,
            no_confidence,
            save,
        } => {
            let options = ForecastOptions {
                horizon,
                model,
                features,
                confidence: !no_confidence,
                save,
            };
            run_forecast(config, &csv, symbol, options).await
        }
        Commands::Train {
            csv,
            symbol,
            model,
            test_size,
        } => run_train(config, &csv, symbol, &model, test_size),
        Commands::Features { csv, output } => export_features(config, &csv, &output),
        Commands::Batch {
            csvs,
            horizon,
            model,
        } => run_batch(config, csvs, horizon, &model).await,
        Commands::Show { job_id } => show_result(config, &job_id).await,
        Commands::Demo {
            days,
            horizon,
            model,
        } => run_demo(config, days, horizon, &model),
    }
}

struct ForecastOptions {
    horizon: Option<usize>,
    model: String,
    features: bool,
    confidence: bool,
    save: bool,
}

fn load_series(csv: &Path, symbol: Option<String>) -> anyhow::Result<RawSeries> {
    let symbol = symbol.unwrap_or_else(|| data::symbol_from_path(csv));
    Ok(data::load_csv(csv, &symbol)?)
}

fn orchestrator(config: Config) -> ForecastOrchestrator {
    let cache = Arc::new(ModelCache::new(config.storage.model_cache_size));
    ForecastOrchestrator::from_config(config).with_store(cache)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_forecast(
    config: Config,
    csv: &Path,
    symbol: Option<String>,
    options: ForecastOptions,
) -> anyhow::Result<()> {
    let raw = load_series(csv, symbol)?;
    let selector = ModelSelector::parse(&options.model, &config.forecast.ensemble_models);
    let horizon = options.horizon.unwrap_or(config.forecast.default_horizon);
    let request = ForecastRequest::new(raw.symbol(), horizon, selector)
        .with_features(options.features)
        .with_confidence(options.confidence);

    let results_dir = config.storage.results_path();
    let result = orchestrator(config).forecast(&raw, &request)?;
    print_json(&result)?;

    if options.save {
        let job_id = ResultStore::new(results_dir).save(&result).await?;
        tracing::info!("Saved forecast as job {}", job_id);
    }
    Ok(())
}

fn run_train(
    config: Config,
    csv: &Path,
    symbol: Option<String>,
    model: &str,
    test_size: Option<f64>,
) -> anyhow::Result<()> {
    let raw = load_series(csv, symbol)?;
    let test_size = test_size.unwrap_or(config.forecast.test_size);
    let report = orchestrator(config).train_model(&raw, raw.symbol(), model, test_size)?;
    print_json(&report)
}

fn export_features(config: Config, csv: &Path, output: &Path) -> anyhow::Result<()> {
    let raw = load_series(csv, None)?;
    let matrix = orchestrator(config).engineer_features(&raw)?;
    data::write_features_csv(&matrix, output)?;
    tracing::info!(
        "Wrote {} rows x {} features to {}",
        matrix.len(),
        matrix.num_features(),
        output.display()
    );
    Ok(())
}

async fn run_batch(
    config: Config,
    csvs: Vec<PathBuf>,
    horizon: Option<usize>,
    model: &str,
) -> anyhow::Result<()> {
    if csvs.is_empty() {
        anyhow::bail!("batch needs at least one CSV file");
    }
    let selector = ModelSelector::parse(model, &config.forecast.ensemble_models);
    let horizon = horizon.unwrap_or(config.forecast.default_horizon);
    let store = ResultStore::new(config.storage.results_path());

    let mut jobs = Vec::with_capacity(csvs.len());
    for csv in &csvs {
        match load_series(csv, None) {
            Ok(raw) => {
                let request = ForecastRequest::new(raw.symbol(), horizon, selector.clone());
                jobs.push((raw, request));
            }
            Err(e) => tracing::warn!("Skipping {}: {}", csv.display(), e),
        }
    }

    let report = Arc::new(orchestrator(config)).forecast_batch(jobs).await;
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(result) => {
                let job_id = store.save(result).await?;
                println!("{}\tok\t{}", outcome.symbol, job_id);
            }
            Err(e) => println!("{}\t{}\t{}", outcome.symbol, e.kind(), e),
        }
    }
    tracing::info!("{} of {} files forecast", report.succeeded, csvs.len());
    Ok(())
}

async fn show_result(config: Config, job_id: &str) -> anyhow::Result<()> {
    let store = ResultStore::new(config.storage.results_path());
    match store.load(job_id).await? {
        Some(stored) => print_json(&stored),
        None => anyhow::bail!("no saved forecast with job id {}", job_id),
    }
}

fn run_demo(config: Config, days: usize, horizon: usize, model: &str) -> anyhow::Result<()> {
    let start = NaiveDate::from_ymd_opt(2022, 1, 3)
        .ok_or_else(|| anyhow::anyhow!("invalid demo start date"))?;
    let raw = data::synthetic_trend("DEMO", start, days, 100.0, 140.0)?;
    let selector = ModelSelector::parse(model, &config.forecast.ensemble_models);
    let request = ForecastRequest::new("DEMO", horizon, selector).with_features(true);

    let result: ForecastResult = orchestrator(config).forecast(&raw, &request)?;
    print_json(&result)
}
