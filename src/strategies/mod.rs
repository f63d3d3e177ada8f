pub mod lifecycle;
pub mod stats;
pub mod threshold;
pub mod traits;

use threshold::ThresholdStrategy;
use traits::{Strategy, StrategyError};

/// Looks up a strategy implementation by its configured `kind`.
pub fn create_strategy(kind: &str) -> Result<Box<dyn Strategy>, StrategyError> {
    match kind.to_ascii_lowercase().as_str() {
        "threshold" => Ok(Box::new(ThresholdStrategy::new())),
        other => Err(StrategyError::ConfigInvalid(format!(
            "unknown strategy kind '{}'",
            other
        ))),
    }
}
