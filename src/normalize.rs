use chrono::DateTime;
use error_stack::{Report, bail};
use serde_json::Value;
use tracing::debug;

use crate::error::NormalizeError;
use crate::model::{Candle, PricePoint, PriceSeries};
use crate::provider::RawRow;

/// Coerce a provider cell into a finite number.
///
/// Accepts JSON numbers and numeric strings; anything else is absent.
pub fn coerce_f64(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

/// Convert Unix seconds into Unix milliseconds, if representable.
fn timestamp_millis(seconds: i64) -> Option<i64> {
    DateTime::from_timestamp(seconds, 0).map(|dt| dt.timestamp_millis())
}

/// Convert raw provider rows into candles, dropping incomplete rows.
///
/// Input order is preserved. Volume that is absent (or negative) becomes 0.
pub fn normalize(rows: &[RawRow]) -> Result<Vec<Candle>, Report<NormalizeError>> {
    let candles: Vec<Candle> = rows.iter().filter_map(row_to_candle).collect();

    if candles.is_empty() {
        bail!(NormalizeError::NoValidCandles);
    }

    if candles.len() < rows.len() {
        debug!(
            kept = candles.len(),
            dropped = rows.len() - candles.len(),
            "dropped incomplete rows"
        );
    }

    Ok(candles)
}

fn row_to_candle(row: &RawRow) -> Option<Candle> {
    let open = coerce_f64(&row.open)?;
    let high = coerce_f64(&row.high)?;
    let low = coerce_f64(&row.low)?;
    let close = coerce_f64(&row.close)?;
    let volume = coerce_f64(&row.volume).filter(|v| *v >= 0.0).unwrap_or(0.0);
    let timestamp = timestamp_millis(row.timestamp)?;

    Some(Candle {
        timestamp,
        open,
        high,
        low,
        close,
        volume,
    })
}

/// Extract the close column as a `PriceSeries`.
///
/// Only the close cell has to be usable; open/high/low may be missing.
pub fn close_series(rows: &[RawRow]) -> PriceSeries {
    PriceSeries::from_points(rows.iter().filter_map(|row| {
        Some(PricePoint {
            timestamp: timestamp_millis(row.timestamp)?,
            close: coerce_f64(&row.close)?,
        })
    }))
}
