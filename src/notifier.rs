pub mod terminal;

use crate::batch::AssetOutcome;
use crate::model::AssetSpec;

/// Sink for per-asset batch progress.
pub trait ProgressNotifier: Send + Sync {
    /// Called before the asset at `position` (1-based) of `total` is fetched.
    fn started(&self, asset: &AssetSpec, position: usize, total: usize);

    fn finished(&self, asset: &AssetSpec, outcome: &AssetOutcome);
}
