use crate::batch::AssetOutcome;
use crate::model::AssetSpec;
use crate::notifier::ProgressNotifier;

pub struct TerminalNotifier;

impl ProgressNotifier for TerminalNotifier {
    fn started(&self, asset: &AssetSpec, position: usize, total: usize) {
        tracing::info!(
            asset = %asset.display_name,
            symbol = %asset.provider_symbol,
            position,
            total,
            "fetching {} ({})...",
            asset.display_name,
            asset.provider_symbol,
        );
    }

    fn finished(&self, asset: &AssetSpec, outcome: &AssetOutcome) {
        match outcome {
            Ok(series) => tracing::info!(
                asset = %asset.display_name,
                points = series.len(),
                last_close = series.last_close(),
                last_rsi = series.last_rsi(),
                "series ready"
            ),
            Err(failure) => tracing::warn!(
                asset = %asset.display_name,
                symbol = %failure.symbol,
                reason = %failure.reason,
                "no data for {} ({})",
                asset.display_name,
                failure.symbol,
            ),
        }
    }
}
