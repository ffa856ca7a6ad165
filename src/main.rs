mod batch;
mod command;
mod config;
mod error;
mod indicator;
mod model;
mod normalize;
mod notifier;
mod provider;
mod quote;
mod relay;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::error::ErrorKind;
use clap::{Parser, ValueEnum};
use derive_more::{Display, Error};
use error_stack::{Report, ResultExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use batch::BatchRunner;
use command::Envelope;
use config::AppConfig;
use notifier::terminal::TerminalNotifier;
use provider::SeriesFetcher;
use provider::yahoo::YahooChartProvider;
use relay::{ChatSource, IngestRelay, LineSource};

#[derive(Debug, Display, Error)]
pub enum AppError {
    #[display("configuration error")]
    Config,
    #[display("provider setup failed")]
    Provider,
    #[display("relay setup failed")]
    Relay,
    #[display("runtime error")]
    Runtime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Latest price and daily change
    Quote,
    /// Normalized OHLCV candles
    History,
    /// RSI over the configured asset table
    Batch,
    /// Forward stdin messages to the ingestion endpoint
    Relay,
}

impl Mode {
    /// Modes whose stdout is a single JSON line.
    fn emits_json(self) -> bool {
        !matches!(self, Self::Relay)
    }
}

#[derive(Parser)]
#[command(name = "market-pulse", about = "Market data, RSI and chat relay tool")]
struct Cli {
    /// Path to a TOML configuration file (built-in defaults when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only print the last N points per asset in batch mode
    #[arg(long)]
    tail: Option<usize>,

    #[arg(value_enum, ignore_case = true)]
    mode: Mode,

    /// Provider symbol, e.g. GC=F (quote and history)
    symbol: Option<String>,

    /// Bar interval for history (default 1d)
    interval: Option<String>,

    /// Lookback period for history (default 6mo)
    period: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            let reason = e.kind().as_str().unwrap_or("invalid arguments");
            Envelope::failure(format!("{} ({reason})", command::USAGE)).print();
            return ExitCode::FAILURE;
        }
    };

    match run(&cli).await {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            if cli.mode.emits_json() {
                Envelope::failure(report.current_context().to_string()).print();
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<ExitCode, Report<AppError>> {
    let config = config::load(cli.config.as_deref()).change_context(AppError::Config)?;

    init_tracing(&config);

    match cli.mode {
        Mode::Quote | Mode::History => run_symbol_mode(cli, &config).await,
        Mode::Batch => run_batch(cli, &config).await,
        Mode::Relay => run_relay(&config).await,
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::new(&config.general.log_level);
    // stdout carries the JSON result line; logs go to stderr
    match config.general.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

fn build_provider(config: &AppConfig) -> Result<Arc<dyn SeriesFetcher>, Report<AppError>> {
    let provider = YahooChartProvider::new(&config.provider).change_context(AppError::Provider)?;
    Ok(Arc::new(provider))
}

/// `quote` and `history`: one JSON line, exit 1 whenever `ok` is false.
async fn run_symbol_mode(cli: &Cli, config: &AppConfig) -> Result<ExitCode, Report<AppError>> {
    let Some(symbol) = cli.symbol.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
        Envelope::failure(command::USAGE).print();
        return Ok(ExitCode::FAILURE);
    };

    let provider = build_provider(config)?;

    let result = match cli.mode {
        Mode::Quote => command::quote(provider.as_ref(), symbol)
            .await
            .map(|summary| Envelope::success(summary).to_line()),
        _ => {
            let interval = cli
                .interval
                .as_deref()
                .unwrap_or(command::DEFAULT_HISTORY_INTERVAL);
            let period = cli
                .period
                .as_deref()
                .unwrap_or(command::DEFAULT_HISTORY_LOOKBACK);
            match (
                command::parse_interval(interval.trim()),
                command::parse_lookback(period.trim()),
            ) {
                (Ok(interval), Ok(lookback)) => {
                    command::history(provider.as_ref(), symbol, interval, lookback)
                        .await
                        .map(|candles| Envelope::candles(candles).to_line())
                }
                (Err(e), _) | (_, Err(e)) => Err(e),
            }
        }
    };

    match result {
        Ok(line) => {
            println!("{line}");
            Ok(ExitCode::SUCCESS)
        }
        Err(report) => {
            tracing::debug!(error = ?report, symbol, "command failed");
            Envelope::failure(report.current_context().to_string()).print();
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run_batch(cli: &Cli, config: &AppConfig) -> Result<ExitCode, Report<AppError>> {
    let settings = config.batch.settings().change_context(AppError::Config)?;
    let provider = build_provider(config)?;

    let runner = BatchRunner::new(provider, settings);
    let report = runner.run(&config.assets, &TerminalNotifier).await;

    Envelope::success(command::batch_body(&report, cli.tail)).print();
    Ok(ExitCode::SUCCESS)
}

async fn run_relay(config: &AppConfig) -> Result<ExitCode, Report<AppError>> {
    // Fail fast before listening.
    let chat_id = config
        .relay
        .require_chat_id()
        .change_context(AppError::Config)?;
    let relay = IngestRelay::new(&config.relay, chat_id).change_context(AppError::Relay)?;

    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel::<String>(256);
    let source: Box<dyn ChatSource> = Box::new(LineSource::stdin());
    let source_handle = tokio::spawn(source.run(tx, cancel.clone()));

    info!(
        chat_id,
        ingest_url = %config.relay.ingest_url,
        "relay listener active"
    );

    tokio::select! {
        _ = relay::relay_loop(rx, &relay) => {}
        signal = tokio::signal::ctrl_c() => {
            signal.change_context(AppError::Runtime)?;
            info!("ctrl+c received, shutting down");
        }
    }
    cancel.cancel();

    match tokio::time::timeout(Duration::from_secs(5), source_handle).await {
        Ok(Ok(Err(e))) => tracing::warn!(error = ?e, "chat source stopped with error"),
        Ok(Err(e)) => tracing::warn!(error = %e, "chat source task panicked"),
        _ => {}
    }

    info!("shutdown complete");
    Ok(ExitCode::SUCCESS)
}
