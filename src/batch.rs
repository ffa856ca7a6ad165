use std::sync::Arc;

use error_stack::{Report, bail};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::BatchSettings;
use crate::error::ProviderError;
use crate::indicator::Indicator;
use crate::indicator::rsi::Rsi;
use crate::model::{AssetSpec, PriceSeries, RsiValue};
use crate::normalize::close_series;
use crate::notifier::ProgressNotifier;
use crate::provider::SeriesFetcher;

/// A close series with its RSI, index-aligned.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetSeries {
    series: PriceSeries,
    rsi: Vec<RsiValue>,
}

/// One output row of an asset series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesRow {
    pub timestamp: i64,
    pub close: f64,
    pub rsi: RsiValue,
}

impl AssetSeries {
    pub fn new(series: PriceSeries, indicator: &dyn Indicator) -> Self {
        let rsi = indicator.series(&series.closes());
        Self { series, rsi }
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn rows(&self) -> impl Iterator<Item = SeriesRow> + '_ {
        self.series
            .points()
            .iter()
            .zip(&self.rsi)
            .map(|(point, rsi)| SeriesRow {
                timestamp: point.timestamp,
                close: point.close,
                rsi: *rsi,
            })
    }

    pub fn last_close(&self) -> Option<f64> {
        self.series.points().last().map(|p| p.close)
    }

    pub fn last_rsi(&self) -> RsiValue {
        self.rsi.last().copied().flatten()
    }
}

/// Why an asset produced no series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchFailure {
    pub symbol: String,
    pub reason: String,
}

pub type AssetOutcome = Result<AssetSeries, FetchFailure>;

#[derive(Debug)]
pub struct BatchEntry {
    pub asset: AssetSpec,
    pub outcome: AssetOutcome,
}

/// Batch results in asset-table order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub entries: Vec<BatchEntry>,
}

impl BatchReport {
    pub fn failed(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_err()).count()
    }
}

/// Fetches every asset in turn and computes its RSI.
///
/// Assets are processed one at a time; a failure is recorded against its
/// asset and never stops the batch.
pub struct BatchRunner {
    fetcher: Arc<dyn SeriesFetcher>,
    settings: BatchSettings,
    rsi: Rsi,
}

impl BatchRunner {
    pub fn new(fetcher: Arc<dyn SeriesFetcher>, settings: BatchSettings) -> Self {
        let rsi = Rsi::new(settings.rsi_period).unwrap_or_else(|e| {
            warn!(error = ?e, "invalid rsi period, defaulting to RSI(14)");
            Rsi::default()
        });
        Self {
            fetcher,
            settings,
            rsi,
        }
    }

    pub async fn run(&self, assets: &[AssetSpec], notifier: &dyn ProgressNotifier) -> BatchReport {
        info!(
            provider = self.fetcher.name(),
            assets = assets.len(),
            interval = %self.settings.interval,
            lookback = %self.settings.lookback,
            indicator = self.rsi.name(),
            required = self.rsi.required_samples(),
            "starting batch"
        );

        let mut report = BatchReport {
            entries: Vec::with_capacity(assets.len()),
        };

        for (i, asset) in assets.iter().enumerate() {
            notifier.started(asset, i + 1, assets.len());

            let outcome = self.run_asset(asset).await.map_err(|e| {
                warn!(error = ?e, asset = %asset.display_name, "asset failed (continuing)");
                FetchFailure {
                    symbol: asset.provider_symbol.clone(),
                    reason: e.current_context().to_string(),
                }
            });

            notifier.finished(asset, &outcome);
            report.entries.push(BatchEntry {
                asset: asset.clone(),
                outcome,
            });
        }

        info!(
            assets = report.entries.len(),
            failed = report.failed(),
            "batch complete"
        );
        report
    }

    async fn run_asset(&self, asset: &AssetSpec) -> Result<AssetSeries, Report<ProviderError>> {
        let symbol = asset.provider_symbol.as_str();
        let raw = self
            .fetcher
            .fetch_series(symbol, self.settings.interval, self.settings.lookback)
            .await?;

        let rows = raw.collapse(symbol)?;
        let series = close_series(&rows);
        if series.is_empty() {
            bail!(ProviderError::NoData);
        }

        debug!(symbol, rows = rows.len(), points = series.len(), "close series built");
        Ok(AssetSeries::new(series, &self.rsi))
    }
}
