use std::fmt;

use serde::{Deserialize, Serialize};

/// RSI output for one series index. `None` marks the warm-up window or a
/// window with no signal.
pub type RsiValue = Option<f64>;

/// Bar interval understood by the market-data provider.
///
/// String representations match the provider's query format (e.g. `"60m"`, `"1d"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interval {
    Min1,
    Min2,
    Min5,
    Min15,
    Min30,
    Min60,
    Min90,
    Hour1,
    Day1,
    Day5,
    Week1,
    Month1,
    Month3,
}

impl Interval {
    /// Parse a provider-format string into an `Interval`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1m" => Some(Self::Min1),
            "2m" => Some(Self::Min2),
            "5m" => Some(Self::Min5),
            "15m" => Some(Self::Min15),
            "30m" => Some(Self::Min30),
            "60m" => Some(Self::Min60),
            "90m" => Some(Self::Min90),
            "1h" => Some(Self::Hour1),
            "1d" => Some(Self::Day1),
            "5d" => Some(Self::Day5),
            "1wk" => Some(Self::Week1),
            "1mo" => Some(Self::Month1),
            "3mo" => Some(Self::Month3),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Min1 => "1m",
            Self::Min2 => "2m",
            Self::Min5 => "5m",
            Self::Min15 => "15m",
            Self::Min30 => "30m",
            Self::Min60 => "60m",
            Self::Min90 => "90m",
            Self::Hour1 => "1h",
            Self::Day1 => "1d",
            Self::Day5 => "5d",
            Self::Week1 => "1wk",
            Self::Month1 => "1mo",
            Self::Month3 => "3mo",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookbackUnit {
    Day,
    Week,
    Month,
    Year,
}

impl LookbackUnit {
    fn suffix(self) -> &'static str {
        match self {
            Self::Day => "d",
            Self::Week => "wk",
            Self::Month => "mo",
            Self::Year => "y",
        }
    }
}

/// How far back the provider should look (`"5d"`, `"6mo"`, `"ytd"`, `"max"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lookback {
    Span { count: u32, unit: LookbackUnit },
    YearToDate,
    Max,
}

impl Lookback {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ytd" => return Some(Self::YearToDate),
            "max" => return Some(Self::Max),
            _ => {}
        }

        // "wk" and "mo" must be tried before the single-letter suffixes.
        let units = [
            ("wk", LookbackUnit::Week),
            ("mo", LookbackUnit::Month),
            ("d", LookbackUnit::Day),
            ("y", LookbackUnit::Year),
        ];
        units.iter().find_map(|(suffix, unit)| {
            let digits = s.strip_suffix(suffix)?;
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let count: u32 = digits.parse().ok()?;
            (count > 0).then_some(Self::Span { count, unit: *unit })
        })
    }
}

impl fmt::Display for Lookback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Span { count, unit } => write!(f, "{count}{}", unit.suffix()),
            Self::YearToDate => write!(f, "ytd"),
            Self::Max => write!(f, "max"),
        }
    }
}

/// One validated OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candle {
    /// Bar start, milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A single point of a close-price series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PricePoint {
    pub timestamp: i64,
    pub close: f64,
}

/// Close prices with strictly increasing timestamps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Build a series, skipping non-finite closes and any point whose
    /// timestamp does not advance past the previous kept point.
    pub fn from_points(points: impl IntoIterator<Item = PricePoint>) -> Self {
        let mut kept: Vec<PricePoint> = Vec::new();
        for point in points {
            if !point.close.is_finite() {
                continue;
            }
            if kept.last().is_some_and(|last| point.timestamp <= last.timestamp) {
                tracing::debug!(timestamp = point.timestamp, "dropping out-of-order point");
                continue;
            }
            kept.push(point);
        }
        Self { points: kept }
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteSummary {
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
}

/// An entry of the batch symbol table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AssetSpec {
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(rename = "symbol")]
    pub provider_symbol: String,
}

impl AssetSpec {
    pub fn new(display_name: impl Into<String>, provider_symbol: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            provider_symbol: provider_symbol.into(),
        }
    }
}
