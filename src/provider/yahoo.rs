use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use error_stack::{Report, ResultExt, bail};
use futures::future::BoxFuture;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::model::{Interval, Lookback};
use crate::provider::{RawColumn, RawRow, RawSeries, SeriesFetcher};

const PROVIDER_NAME: &str = "yahoo";

/// `chart.error.code` for a symbol the provider has no data for.
const NOT_FOUND_CODE: &str = "Not Found";

/// Client for the Yahoo Finance v8 chart endpoint.
pub struct YahooChartProvider {
    client: reqwest::Client,
    base_url: String,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl YahooChartProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, Report<ProviderError>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()
            .change_context(ProviderError::Client {
                provider: PROVIDER_NAME.into(),
            })?;

        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(nonzero!(1u32));
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_second))),
        })
    }
}

impl SeriesFetcher for YahooChartProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn fetch_series(
        &self,
        symbol: &str,
        interval: Interval,
        lookback: Lookback,
    ) -> BoxFuture<'_, Result<RawSeries, Report<ProviderError>>> {
        let symbol = symbol.to_owned();
        Box::pin(async move {
            // Wait for rate limiter before making the request
            self.rate_limiter.until_ready().await;

            let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol);
            let range = lookback.to_string();
            let params = [("interval", interval.as_str()), ("range", range.as_str())];

            debug!(symbol = %symbol, interval = %interval, range = %range, "requesting chart");

            let response = self
                .client
                .get(&url)
                .query(&params)
                .send()
                .await
                .change_context(ProviderError::Request {
                    provider: PROVIDER_NAME.into(),
                })
                .attach_with(|| format!("symbol: {symbol}"))?;

            if !response.status().is_success() {
                return Err(status_error(response.status()).attach(format!("symbol: {symbol}")));
            }

            let envelope: ChartEnvelope =
                response
                    .json()
                    .await
                    .change_context(ProviderError::ResponseParse {
                        provider: PROVIDER_NAME.into(),
                    })?;

            let series = envelope.into_raw_series(&symbol)?;

            info!(
                symbol = %symbol,
                interval = %interval,
                range = %range,
                "yahoo chart fetch complete"
            );

            Ok(series)
        })
    }
}

/// Unknown or delisted symbols come back as 404; everything else is a failed request.
fn status_error(status: StatusCode) -> Report<ProviderError> {
    let context = if status == StatusCode::NOT_FOUND {
        ProviderError::NoData
    } else {
        ProviderError::Request {
            provider: PROVIDER_NAME.into(),
        }
    };
    Report::new(context).attach(format!("HTTP status: {status}"))
}

// ── REST response types ───────────────────────────────────────────────────────

/// `{ "chart": { "result": [...], "error": null } }`
#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    /// Bar start times (Unix seconds). Absent when the range holds no bars.
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

/// Column arrays; entries may be `null` for bars the provider did not fill.
#[derive(Debug, Default, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Value>,
    #[serde(default)]
    high: Vec<Value>,
    #[serde(default)]
    low: Vec<Value>,
    #[serde(default)]
    close: Vec<Value>,
    #[serde(default)]
    volume: Vec<Value>,
}

impl ChartEnvelope {
    fn into_raw_series(self, symbol: &str) -> Result<RawSeries, Report<ProviderError>> {
        if let Some(err) = self.chart.error {
            let context = if err.code == NOT_FOUND_CODE {
                ProviderError::NoData
            } else {
                ProviderError::Request {
                    provider: PROVIDER_NAME.into(),
                }
            };
            return Err(Report::new(context).attach(format!("{}: {}", err.code, err.description)));
        }

        let Some(result) = self.chart.result.and_then(|r| r.into_iter().next()) else {
            bail!(ProviderError::NoData);
        };
        if result.timestamp.is_empty() || result.indicators.quote.is_empty() {
            bail!(ProviderError::NoData);
        }

        let timestamps = result.timestamp;
        let mut quotes = result.indicators.quote;
        if quotes.len() == 1 {
            let quote = quotes.remove(0);
            return Ok(RawSeries::SingleSeries(quote.rows(&timestamps)));
        }

        let columns = quotes
            .into_iter()
            .enumerate()
            .map(|(i, quote)| RawColumn {
                // The first block is the requested symbol's own quote.
                label: if i == 0 {
                    symbol.to_owned()
                } else {
                    format!("{symbol}#{i}")
                },
                rows: quote.rows(&timestamps),
            })
            .collect();
        Ok(RawSeries::MultiColumnTable(columns))
    }
}

impl ChartQuote {
    fn rows(&self, timestamps: &[i64]) -> Vec<RawRow> {
        let cell = |column: &[Value], i: usize| column.get(i).cloned().unwrap_or(Value::Null);
        timestamps
            .iter()
            .enumerate()
            .map(|(i, &timestamp)| RawRow {
                timestamp,
                open: cell(&self.open, i),
                high: cell(&self.high, i),
                low: cell(&self.low, i),
                close: cell(&self.close, i),
                volume: cell(&self.volume, i),
            })
            .collect()
    }
}
