//! Unofficial Rust API for CeleX4 and CeleX5 event-based vision sensors.
//!
//! The sensors are configured through register writes over a USB/FPGA
//! bridge. Named commands, sequences and bias sliders are loaded from a
//! TOML description and replayed by a controller as ordered, masked
//! register writes.
//!
//! # Example
//!
//! ```no_run
//! use celex_sdk::{Celex4Controller, Celex4Mode, FrontPanel, SensorController, SequenceManager};
//!
//! fn main() -> Result<(), celex_sdk::ControllerError> {
//!     let manager = SequenceManager::from_file("config/celex4.toml")?;
//!     let transport = FrontPanel::new("top.bit")?;
//!     let mut sensor = Celex4Controller::new(transport, manager);
//!
//!     // Power up and load the biases
//!     sensor.open_sensor()?;
//!
//!     sensor.set_sensor_mode(Celex4Mode::Event)?;
//!     sensor.set_threshold(60)?;
//!
//!     let mut buf = vec![0u8; 128 * 1024];
//!     if let Ok(n) = sensor.read_data_from_fpga(&mut buf) {
//!         println!("read {} bytes", n);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Testing
//!
//! Use [`MockTransport`] to drive a controller without hardware:
//!
//! ```
//! use celex_sdk::{Celex5Controller, MockTransport, SensorController, SequenceManager};
//!
//! let mut sensor = Celex5Controller::new(MockTransport::new(), SequenceManager::celex5_builtin().unwrap());
//! sensor.open_sensor().unwrap();
//! sensor.set_brightness(150).unwrap();
//! assert_eq!(sensor.transport().values_written_to(23), vec![150]);
//! ```
//!
//! # Disclaimer
//!
//! This is an **unofficial** library. It is not affiliated with or endorsed by the sensor vendor.
//! Use at your own risk.

#![warn(missing_docs)]

mod celex4;
pub mod celex5;
mod controller;
mod error;
mod frontpanel;
mod manager;
mod mock;
mod modes;
mod sequence;
mod state;
mod transport;

// Re-export public API
pub use celex4::{Celex4Controller, Celex4Operation};
pub use celex5::Celex5Controller;
pub use controller::{ControllerOptions, SensorController};
pub use error::{BulkReadError, ConfigError, ControllerError};
pub use frontpanel::FrontPanel;
pub use manager::{ConfigEntry, SequenceManager};
pub use mock::MockTransport;
pub use modes::{Celex4Mode, Celex5Mode};
pub use sequence::{Command, FireReport, RegisterTarget, Sequence, Slider, StepFailure};
pub use state::{Celex4State, Celex5State};
pub use transport::{RegisterTransport, RegisterWrite};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controllers_share_trait() {
        fn configure(sensor: &mut dyn SensorController) -> Result<(), ControllerError> {
            sensor.open_sensor()?;
            sensor.set_brightness(120)?;
            Ok(())
        }

        let mut gen4 = Celex4Controller::new(MockTransport::new(), SequenceManager::celex4_builtin().unwrap());
        let mut gen5 = Celex5Controller::new(MockTransport::new(), SequenceManager::celex5_builtin().unwrap());
        configure(&mut gen4).unwrap();
        configure(&mut gen5).unwrap();

        assert_eq!(gen4.get_brightness(), 120);
        assert_eq!(gen5.get_brightness(), 120);
    }

    #[test]
    fn test_close_disconnects() {
        let mut sensor = Celex5Controller::new(MockTransport::new(), SequenceManager::celex5_builtin().unwrap());
        sensor.open_sensor().unwrap();
        assert!(sensor.is_sensor_ready());
        sensor.close_sensor();
        assert!(!sensor.is_sensor_ready());
        assert!(!sensor.transport().is_connected());
    }

    #[test]
    fn test_open_unreachable_attempts_nothing() {
        let mut sensor = Celex5Controller::new(MockTransport::unreachable(), SequenceManager::celex5_builtin().unwrap());
        assert!(matches!(sensor.open_sensor(), Err(ControllerError::TransportUnavailable)));
        assert!(sensor.transport().writes().is_empty());
    }
}
