//! Command validation. Runs before every write so a rejected command never
//! reaches the network.

use crate::error::ValidationError;
use crate::model::ControlConfig;

const THRESHOLD_RANGE: std::ops::RangeInclusive<f64> = 0.0..=100.0;

/// Check a command's thresholds. Returns the command unchanged when valid.
///
/// Ordering (`low <= high`) is only enforced with the `strict-thresholds`
/// feature; by default an inverted band is passed through.
pub fn validate(cmd: ControlConfig) -> Result<ControlConfig, ValidationError> {
    check_range("low_threshold", cmd.low_threshold)?;
    check_range("high_threshold", cmd.high_threshold)?;

    if cfg!(feature = "strict-thresholds") && cmd.low_threshold > cmd.high_threshold {
        return Err(ValidationError::InvertedBand {
            low: cmd.low_threshold,
            high: cmd.high_threshold,
        });
    }

    Ok(cmd)
}

fn check_range(field: &'static str, value: f64) -> Result<(), ValidationError> {
    // NaN fails `contains`, so non-finite input is rejected here too.
    if THRESHOLD_RANGE.contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange { field, value })
    }
}

// ===========================================================================
// Tests
// ===========================================================================
