pub mod rsi;

use crate::model::RsiValue;

/// A technical analysis indicator over a close-price series.
///
/// Prices must be in ascending chronological order (oldest first).
pub trait Indicator: Send + Sync {
    /// Unique name of this indicator (e.g., "rsi").
    fn name(&self) -> &str;

    /// Minimum number of prices required to produce at least one defined value.
    fn required_samples(&self) -> usize;

    /// Calculate one value per input price; indexes without a value are `None`.
    fn series(&self, prices: &[f64]) -> Vec<RsiValue>;
}

/// Trailing mean over exactly `window` samples, aligned with `values`.
///
/// Indexes with fewer than `window` samples, or whose window holds a
/// non-finite sample, yield `None`. Each mean is summed from its own window.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }
    for (offset, w) in values.windows(window).enumerate() {
        if w.iter().all(|v| v.is_finite()) {
            out[offset + window - 1] = Some(w.iter().sum::<f64>() / window as f64);
        }
    }
    out
}
