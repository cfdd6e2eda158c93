//! Behaviour shared by the CeleX4 and CeleX5 controllers.

use crate::error::{BulkReadError, ControllerError};
use log::{debug, warn};
use serde::Deserialize;

// =============================================================================
// Sensor Controller Trait
// =============================================================================

/// Trait for sensor controller implementations.
///
/// Covers the operations both sensor generations support, so application
/// code can drive either one.
pub trait SensorController {
    /// Connect to the device and run the full power-up/configuration recipe.
    ///
    /// # Errors
    ///
    /// - [`ControllerError::TransportUnavailable`] if the device cannot be reached;
    ///   no configuration is attempted in that case
    /// - [`ControllerError::ConfigurationFailed`] if the device was reached but one
    ///   or more configuration steps failed
    fn open_sensor(&mut self) -> Result<(), ControllerError>;

    /// Disconnect from the device.
    fn close_sensor(&mut self);

    /// Whether the transport is connected and ready.
    fn is_sensor_ready(&self) -> bool;

    /// Set the contrast.
    fn set_contrast(&mut self, value: u32) -> Result<(), ControllerError>;

    /// Get the contrast.
    fn get_contrast(&self) -> u32;

    /// Set the brightness.
    fn set_brightness(&mut self, value: u32) -> Result<(), ControllerError>;

    /// Get the brightness.
    fn get_brightness(&self) -> u32;

    /// Set the event threshold.
    fn set_threshold(&mut self, value: u32) -> Result<(), ControllerError>;

    /// Get the event threshold.
    fn get_threshold(&self) -> u32;

    /// Set the sensor clock in MHz.
    fn set_clock_rate(&mut self, value: u32) -> Result<(), ControllerError>;

    /// Get the sensor clock in MHz.
    fn get_clock_rate(&self) -> u32;
}

// =============================================================================
// Controller Options
// =============================================================================

/// Tuning knobs shared by both controllers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ControllerOptions {
    /// Silently ignore out-of-range parameters instead of returning
    /// [`ControllerError::ParameterOutOfRange`]. Matches the vendor SDK.
    pub legacy_silent_ignore: bool,
    /// Delay between disabling the ambient-light sensor and a register write
    /// while auto-ISP is active, in milliseconds.
    pub als_settle_ms: u64,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            legacy_silent_ignore: false,
            als_settle_ms: 2,
        }
    }
}

impl ControllerOptions {
    /// Options reproducing the vendor SDK's silent handling of bad input.
    pub fn legacy() -> Self {
        Self {
            legacy_silent_ignore: true,
            ..Self::default()
        }
    }

    /// Reject an out-of-range parameter, or swallow it in legacy mode.
    pub(crate) fn reject(
        &self,
        parameter: &'static str,
        value: i64,
        min: i64,
        max: i64,
    ) -> Result<(), ControllerError> {
        let err = ControllerError::ParameterOutOfRange {
            parameter,
            value,
            min,
            max,
        };
        if self.legacy_silent_ignore {
            debug!("ignored: {}", err);
            Ok(())
        } else {
            Err(err)
        }
    }
}

/// Log a failed bulk read with its classified cause.
pub(crate) fn log_bulk_error(err: BulkReadError) {
    match err {
        BulkReadError::InvalidBlockSize(_) => warn!("bulk read: block size not supported by the endpoint"),
        BulkReadError::UnsupportedFeature(_) => warn!("bulk read: device does not support block pipes"),
        other => warn!("bulk read failed: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_strict_and_legacy() {
        let strict = ControllerOptions::default();
        assert!(matches!(
            strict.reject("clock rate", 15, 20, 100),
            Err(ControllerError::ParameterOutOfRange { value: 15, .. })
        ));
        assert!(ControllerOptions::legacy().reject("clock rate", 15, 20, 100).is_ok());
    }

    #[test]
    fn test_options_from_toml() {
        let options: ControllerOptions = toml::from_str("legacy_silent_ignore = true").unwrap();
        assert!(options.legacy_silent_ignore);
        assert_eq!(options.als_settle_ms, 2);
    }
}
