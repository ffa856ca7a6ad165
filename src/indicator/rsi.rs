use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{Indicator, rolling_mean};
use crate::model::RsiValue;

pub const DEFAULT_PERIOD: usize = 14;

/// RSI (Relative Strength Index) over simple rolling means of gains and losses.
pub struct Rsi {
    period: usize,
}

impl Rsi {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        Ok(Self { period })
    }
}

impl Default for Rsi {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
        }
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        "rsi"
    }

    fn required_samples(&self) -> usize {
        self.period + 1
    }

    fn series(&self, prices: &[f64]) -> Vec<RsiValue> {
        compute_rsi(prices, self.period)
    }
}

/// Compute RSI aligned 1:1 with `closes`.
///
/// The first `period` entries are always `None`. Short inputs produce an
/// all-`None` series rather than an error.
pub fn compute_rsi(closes: &[f64], period: usize) -> Vec<RsiValue> {
    let len = closes.len();
    if period == 0 || len < period + 1 {
        return vec![None; len];
    }

    // Index 0 has no previous close; NaN keeps it out of every window.
    let mut gains = Vec::with_capacity(len);
    let mut losses = Vec::with_capacity(len);
    gains.push(f64::NAN);
    losses.push(f64::NAN);
    for w in closes.windows(2) {
        let delta = w[1] - w[0];
        if delta.is_nan() {
            gains.push(f64::NAN);
            losses.push(f64::NAN);
        } else {
            gains.push(delta.max(0.0));
            losses.push((-delta).max(0.0));
        }
    }

    let avg_gains = rolling_mean(&gains, period);
    let avg_losses = rolling_mean(&losses, period);

    avg_gains
        .into_iter()
        .zip(avg_losses)
        .enumerate()
        .map(|(i, pair)| match pair {
            _ if i < period => None,
            (Some(avg_gain), Some(avg_loss)) => rsi_value(avg_gain, avg_loss),
            _ => None,
        })
        .collect()
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> RsiValue {
    if avg_loss == 0.0 {
        // Flat window: no movement either way, no signal.
        return (avg_gain > 0.0).then_some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}
