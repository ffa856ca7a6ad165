pub mod yahoo;

use error_stack::{Report, bail};
use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::ProviderError;
use crate::model::{Interval, Lookback};

/// One provider row, cells kept as the provider sent them.
///
/// Cells are coerced to numbers by the normalizer, so a provider that sends
/// `null`, strings or non-finite values never fails the fetch itself.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// Bar start in the provider's native reference (Unix seconds).
    pub timestamp: i64,
    pub open: Value,
    pub high: Value,
    pub low: Value,
    pub close: Value,
    pub volume: Value,
}

/// A labelled column of a multi-instrument table.
#[derive(Debug, Clone, PartialEq)]
pub struct RawColumn {
    pub label: String,
    pub rows: Vec<RawRow>,
}

/// Provider payload shape, resolved once at the fetch boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum RawSeries {
    SingleSeries(Vec<RawRow>),
    MultiColumnTable(Vec<RawColumn>),
}

impl RawSeries {
    /// Collapse the payload to the rows of a single instrument.
    ///
    /// A single-column table collapses to its only column. A wider table
    /// collapses to the column labelled `symbol` and is ambiguous otherwise.
    pub fn collapse(self, symbol: &str) -> Result<Vec<RawRow>, Report<ProviderError>> {
        let rows = match self {
            Self::SingleSeries(rows) => rows,
            Self::MultiColumnTable(mut columns) => {
                if columns.is_empty() {
                    bail!(ProviderError::NoData);
                }
                if columns.len() == 1 {
                    columns.remove(0).rows
                } else if let Some(pos) = columns.iter().position(|c| c.label == symbol) {
                    columns.swap_remove(pos).rows
                } else {
                    bail!(ProviderError::AmbiguousTable {
                        columns: columns.into_iter().map(|c| c.label).collect(),
                    });
                }
            }
        };

        if rows.is_empty() {
            bail!(ProviderError::NoData);
        }
        Ok(rows)
    }
}

/// Abstraction over an external market-data provider.
///
/// Uses `BoxFuture` (from `futures` crate) instead of `async fn` in trait
/// to keep the trait object-safe (`dyn SeriesFetcher`).
pub trait SeriesFetcher: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch historical bars for `symbol`.
    ///
    /// An empty payload is reported as `ProviderError::NoData`.
    fn fetch_series(
        &self,
        symbol: &str,
        interval: Interval,
        lookback: Lookback,
    ) -> BoxFuture<'_, Result<RawSeries, Report<ProviderError>>>;
}

#[cfg(test)]
pub(crate) fn row(timestamp: i64, close: Value) -> RawRow {
    RawRow {
        timestamp,
        open: close.clone(),
        high: close.clone(),
        low: close.clone(),
        close,
        volume: Value::Null,
    }
}
