use error_stack::{Report, bail};

use crate::error::QuoteError;
use crate::model::QuoteSummary;

/// Summarize the latest move from a close history (oldest first).
///
/// With one close, or a previous close of zero, the change is reported as 0.
pub fn summarize(closes: &[f64]) -> Result<QuoteSummary, Report<QuoteError>> {
    let Some(&current) = closes.last() else {
        bail!(QuoteError::NoCloses);
    };
    if !current.is_finite() {
        bail!(QuoteError::InvalidPrice);
    }

    let previous = match closes.len() {
        1 => current,
        n => closes[n - 2],
    };

    let (change, change_percent) = if previous.is_finite() && previous != 0.0 {
        let change = current - previous;
        (change, change / previous * 100.0)
    } else {
        (0.0, 0.0)
    };

    Ok(QuoteSummary {
        price: current,
        change,
        change_percent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_close_has_no_change() {
        let summary = summarize(&[100.0]).unwrap();
        assert_eq!(
            summary,
            QuoteSummary {
                price: 100.0,
                change: 0.0,
                change_percent: 0.0
            }
        );
    }

    #[test]
    fn two_closes_give_change_and_percent() {
        let summary = summarize(&[100.0, 110.0]).unwrap();
        assert_eq!(summary.price, 110.0);
        assert!((summary.change - 10.0).abs() < 1e-12);
        assert!((summary.change_percent - 10.0).abs() < 1e-12);
    }

    #[test]
    fn only_last_two_closes_matter() {
        let summary = summarize(&[1.0, 2.0, 50.0, 40.0]).unwrap();
        assert_eq!(summary.price, 40.0);
        assert!((summary.change + 10.0).abs() < 1e-12);
        assert!((summary.change_percent + 20.0).abs() < 1e-12);
    }

    #[test]
    fn zero_previous_close_avoids_division() {
        let summary = summarize(&[0.0, 5.0]).unwrap();
        assert_eq!(summary.change, 0.0);
        assert_eq!(summary.change_percent, 0.0);
    }

    #[test]
    fn non_finite_previous_close_reports_no_change() {
        let summary = summarize(&[f64::NAN, 5.0]).unwrap();
        assert_eq!(summary.price, 5.0);
        assert_eq!(summary.change, 0.0);
    }

    #[test]
    fn empty_history_fails() {
        let err = summarize(&[]).unwrap_err();
        assert!(matches!(err.current_context(), QuoteError::NoCloses));
    }

    #[test]
    fn non_finite_current_price_fails() {
        let err = summarize(&[100.0, f64::INFINITY]).unwrap_err();
        assert!(matches!(err.current_context(), QuoteError::InvalidPrice));
    }
}
