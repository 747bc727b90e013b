//! Two-threshold pump decision.
//!
//! ```text
//!   moisture:  0 ──── low ════ dead band ════ high ──── 100
//!   pump:         ON       (keep previous)        OFF
//! ```
//!
//! The dead band is what keeps the pump from chattering when moisture sits
//! near a single setpoint. In manual mode the engine never overrides the
//! operator.

use crate::model::{Mode, PumpStatus};

/// Desired pump state for the given inputs. Pure and deterministic.
///
/// With an inverted band (`low > high`) every sample is either below `low`
/// or above `high`, so the dead band vanishes; the `< low` rule wins.
pub fn decide(
    mode: Mode,
    soil_moisture: f64,
    low_threshold: f64,
    high_threshold: f64,
    previous: PumpStatus,
) -> PumpStatus {
    match mode {
        Mode::Manual => previous,
        Mode::Automatic => {
            if soil_moisture < low_threshold {
                PumpStatus::On
            } else if soil_moisture > high_threshold {
                PumpStatus::Off
            } else {
                previous
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
