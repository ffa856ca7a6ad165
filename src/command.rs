use std::error::Error;

use error_stack::Report;
use serde::Serialize;
use tracing::debug;

use crate::batch::{BatchReport, SeriesRow};
use crate::error::{CommandError, ProviderError};
use crate::model::{Candle, Interval, Lookback, LookbackUnit, QuoteSummary};
use crate::normalize::{close_series, normalize};
use crate::provider::SeriesFetcher;
use crate::quote::summarize;

pub const USAGE: &str =
    "Usage: market-pulse [--config <path>] <quote|history|batch|relay> <symbol> [interval] [period]";

pub const DEFAULT_HISTORY_INTERVAL: &str = "1d";
pub const DEFAULT_HISTORY_LOOKBACK: &str = "6mo";

const QUOTE_INTERVAL: Interval = Interval::Day1;
const QUOTE_LOOKBACK: Lookback = Lookback::Span {
    count: 5,
    unit: LookbackUnit::Day,
};

/// One line of command output: `{"ok": true, ...body}` or `{"ok": false, "error": ...}`.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    ok: bool,
    #[serde(flatten)]
    body: T,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
pub struct CandlesBody {
    candles: Vec<Candle>,
}

impl<T: Serialize> Envelope<T> {
    pub fn success(body: T) -> Self {
        Self { ok: true, body }
    }
}

impl Envelope<ErrorBody> {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            body: ErrorBody {
                error: message.into(),
            },
        }
    }
}

impl Envelope<CandlesBody> {
    pub fn candles(candles: Vec<Candle>) -> Self {
        Self::success(CandlesBody { candles })
    }
}

impl<T: Serialize> Envelope<T> {
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"ok":false,"error":"failed to encode output: {e}"}}"#)
        })
    }

    pub fn print(&self) {
        println!("{}", self.to_line());
    }
}

fn usage(message: impl Into<String>) -> Report<CommandError> {
    Report::new(CommandError::Usage {
        message: message.into(),
    })
}

/// Wrap a lower-level report, keeping its top context as the user-facing message.
fn failed<C>(report: Report<C>) -> Report<CommandError>
where
    C: Error + Send + Sync + 'static,
{
    let message = report.current_context().to_string();
    report.change_context(CommandError::Failed { message })
}

fn failed_with<C>(report: Report<C>, message: &str) -> Report<CommandError>
where
    C: Error + Send + Sync + 'static,
{
    report.change_context(CommandError::Failed {
        message: message.into(),
    })
}

fn quote_fetch_failed(report: Report<ProviderError>) -> Report<CommandError> {
    if matches!(report.current_context(), ProviderError::NoData) {
        failed_with(report, "No historical rows for quote")
    } else {
        failed(report)
    }
}

pub fn parse_interval(raw: &str) -> Result<Interval, Report<CommandError>> {
    Interval::parse(raw).ok_or_else(|| usage(format!("Unknown interval: {raw}")))
}

pub fn parse_lookback(raw: &str) -> Result<Lookback, Report<CommandError>> {
    Lookback::parse(raw).ok_or_else(|| usage(format!("Unknown period: {raw}")))
}

/// Latest price and its change against the previous daily close.
pub async fn quote(
    fetcher: &dyn SeriesFetcher,
    symbol: &str,
) -> Result<QuoteSummary, Report<CommandError>> {
    let raw = fetcher
        .fetch_series(symbol, QUOTE_INTERVAL, QUOTE_LOOKBACK)
        .await
        .map_err(quote_fetch_failed)?;
    let rows = raw.collapse(symbol).map_err(quote_fetch_failed)?;

    let closes = close_series(&rows).closes();
    debug!(symbol, closes = closes.len(), "summarizing quote");
    summarize(&closes).map_err(failed)
}

/// Normalized candles for `symbol`.
pub async fn history(
    fetcher: &dyn SeriesFetcher,
    symbol: &str,
    interval: Interval,
    lookback: Lookback,
) -> Result<Vec<Candle>, Report<CommandError>> {
    let raw = fetcher
        .fetch_series(symbol, interval, lookback)
        .await
        .map_err(failed)?;
    let rows = raw.collapse(symbol).map_err(failed)?;
    normalize(&rows).map_err(failed)
}

#[derive(Debug, Serialize)]
pub struct BatchBody {
    results: Vec<BatchAssetBody>,
}

#[derive(Debug, Serialize)]
pub struct BatchAssetBody {
    name: String,
    symbol: String,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    points: Option<Vec<SeriesRow>>,
}

/// Shape a batch report for output, keeping the last `tail` points per asset.
pub fn batch_body(report: &BatchReport, tail: Option<usize>) -> BatchBody {
    let results = report
        .entries
        .iter()
        .map(|entry| match &entry.outcome {
            Ok(series) => {
                let rows: Vec<SeriesRow> = series.rows().collect();
                let skip = tail.map_or(0, |n| rows.len().saturating_sub(n));
                BatchAssetBody {
                    name: entry.asset.display_name.clone(),
                    symbol: entry.asset.provider_symbol.clone(),
                    ok: true,
                    error: None,
                    points: Some(rows[skip..].to_vec()),
                }
            }
            Err(failure) => BatchAssetBody {
                name: entry.asset.display_name.clone(),
                symbol: failure.symbol.clone(),
                ok: false,
                error: Some(failure.reason.clone()),
                points: None,
            },
        })
        .collect();
    BatchBody { results }
}

#[cfg(test)]
mod tests {
    use futures::future::BoxFuture;
    use serde_json::{Value, json};

    use super::*;
    use crate::batch::{AssetSeries, BatchEntry, FetchFailure};
    use crate::indicator::rsi::Rsi;
    use crate::model::{AssetSpec, PricePoint, PriceSeries};
    use crate::provider::{RawRow, RawSeries, row};

    /// Returns the same payload for every request and records the arguments.
    struct StaticFetcher {
        payload: Option<RawSeries>,
        seen: std::sync::Mutex<Vec<(Interval, Lookback)>>,
    }

    impl StaticFetcher {
        fn new(payload: Option<RawSeries>) -> Self {
            Self {
                payload,
                seen: std::sync::Mutex::new(Vec::new()),
            }
        }
    }

    impl SeriesFetcher for StaticFetcher {
        fn name(&self) -> &str {
            "static"
        }

        fn fetch_series(
            &self,
            _symbol: &str,
            interval: Interval,
            lookback: Lookback,
        ) -> BoxFuture<'_, Result<RawSeries, Report<ProviderError>>> {
            self.seen.lock().unwrap().push((interval, lookback));
            let payload = self.payload.clone();
            Box::pin(async move { payload.ok_or_else(|| Report::new(ProviderError::NoData)) })
        }
    }

    fn closes(values: &[Value]) -> RawSeries {
        RawSeries::SingleSeries(
            values
                .iter()
                .enumerate()
                .map(|(i, v)| row(86_400 * (i as i64 + 1), v.clone()))
                .collect(),
        )
    }

    fn message(report: &Report<CommandError>) -> String {
        report.current_context().to_string()
    }

    #[tokio::test]
    async fn quote_uses_last_two_daily_closes() {
        let fetcher = StaticFetcher::new(Some(closes(&[json!(90.0), json!(100.0), json!(110.0)])));
        let summary = quote(&fetcher, "GC=F").await.unwrap();
        assert_eq!(summary.price, 110.0);
        assert!((summary.change_percent - 10.0).abs() < 1e-12);
        assert_eq!(*fetcher.seen.lock().unwrap(), vec![(QUOTE_INTERVAL, QUOTE_LOOKBACK)]);
    }

    #[tokio::test]
    async fn quote_skips_missing_closes() {
        let fetcher = StaticFetcher::new(Some(closes(&[json!(100.0), json!(110.0), json!(null)])));
        let summary = quote(&fetcher, "GC=F").await.unwrap();
        assert_eq!(summary.price, 110.0);
    }

    #[tokio::test]
    async fn quote_without_rows_reports_quote_message() {
        let fetcher = StaticFetcher::new(None);
        let err = quote(&fetcher, "GC=F").await.unwrap_err();
        assert_eq!(message(&err), "No historical rows for quote");
    }

    #[tokio::test]
    async fn quote_without_usable_closes_fails() {
        let fetcher = StaticFetcher::new(Some(closes(&[json!(null), json!("n/a")])));
        let err = quote(&fetcher, "GC=F").await.unwrap_err();
        assert_eq!(message(&err), "No close prices");
    }

    #[tokio::test]
    async fn history_returns_candles() {
        let fetcher = StaticFetcher::new(Some(closes(&[json!(1.0), json!(null), json!(2.0)])));
        let interval = parse_interval(DEFAULT_HISTORY_INTERVAL).unwrap();
        let lookback = parse_lookback(DEFAULT_HISTORY_LOOKBACK).unwrap();
        let candles = history(&fetcher, "GC=F", interval, lookback).await.unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].timestamp, 86_400_000);
    }

    #[tokio::test]
    async fn history_messages_match_failure_kind() {
        let fetcher = StaticFetcher::new(None);
        let err = history(&fetcher, "GC=F", Interval::Day1, QUOTE_LOOKBACK)
            .await
            .unwrap_err();
        assert_eq!(message(&err), "No historical rows");

        let incomplete = RawRow {
            open: Value::Null,
            ..row(1, json!(1.0))
        };
        let fetcher = StaticFetcher::new(Some(RawSeries::SingleSeries(vec![incomplete])));
        let err = history(&fetcher, "GC=F", Interval::Day1, QUOTE_LOOKBACK)
            .await
            .unwrap_err();
        assert_eq!(message(&err), "No valid candles");
    }

    #[test]
    fn bad_interval_or_period_is_usage_error() {
        let err = parse_interval("7m").unwrap_err();
        assert!(matches!(err.current_context(), CommandError::Usage { .. }));
        assert_eq!(message(&err), "Unknown interval: 7m");

        let err = parse_lookback("forever").unwrap_err();
        assert!(matches!(err.current_context(), CommandError::Usage { .. }));
    }

    #[test]
    fn envelopes_are_single_line_json() {
        let summary = QuoteSummary {
            price: 110.0,
            change: 10.0,
            change_percent: 10.0,
        };
        let line = Envelope::success(summary).to_line();
        assert!(!line.contains('\n'));
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(
            value,
            json!({"ok": true, "price": 110.0, "change": 10.0, "changePercent": 10.0})
        );

        let value: Value =
            serde_json::from_str(&Envelope::failure("No valid candles").to_line()).unwrap();
        assert_eq!(value, json!({"ok": false, "error": "No valid candles"}));
    }

    #[test]
    fn candles_envelope_shape() {
        let candle = Candle {
            timestamp: 1000,
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume: 0.0,
        };
        let value: Value =
            serde_json::from_str(&Envelope::candles(vec![candle]).to_line()).unwrap();
        assert_eq!(value["ok"], true);
        assert_eq!(value["candles"][0]["timestamp"], 1000);
        assert_eq!(value["candles"][0]["volume"], 0.0);
    }

    #[test]
    fn batch_body_keeps_order_and_tail() {
        let series = PriceSeries::from_points((0..6).map(|i| PricePoint {
            timestamp: i * 1000,
            close: 100.0 + i as f64,
        }));
        let report = BatchReport {
            entries: vec![
                BatchEntry {
                    asset: AssetSpec::new("Gold", "GC=F"),
                    outcome: Ok(AssetSeries::new(series, &Rsi::new(3).unwrap())),
                },
                BatchEntry {
                    asset: AssetSpec::new("Silver", "SI=F"),
                    outcome: Err(FetchFailure {
                        symbol: "SI=F".into(),
                        reason: "No historical rows".into(),
                    }),
                },
            ],
        };

        let value = serde_json::to_value(Envelope::success(batch_body(&report, Some(3)))).unwrap();
        assert_eq!(value["ok"], true);
        let results = value["results"].as_array().unwrap();
        assert_eq!(results[0]["name"], "Gold");
        let points = results[0]["points"].as_array().unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0]["timestamp"], 3000);
        assert_eq!(points[2]["rsi"], 100.0);
        assert_eq!(results[1]["ok"], false);
        assert_eq!(results[1]["error"], "No historical rows");
        assert!(results[1].get("points").is_none());

        let value = serde_json::to_value(batch_body(&report, None)).unwrap();
        assert_eq!(value["results"][0]["points"].as_array().unwrap().len(), 6);
        assert_eq!(value["results"][0]["points"][0]["rsi"], Value::Null);
    }
}
