//! CeleX4 sensor controller.
//!
//! The CeleX4 sits behind an FPGA. Biases and modes are FrontPanel wire-in
//! writes described by the loaded description; clocks and frame timing go to
//! fixed wires owned by the controller.

use crate::controller::{ControllerOptions, SensorController, log_bulk_error};
use crate::error::{BulkReadError, ControllerError};
use crate::manager::SequenceManager;
use crate::modes::Celex4Mode;
use crate::sequence::{FireReport, Sequence, StepFailure};
use crate::state::Celex4State;
use crate::transport::RegisterTransport;

use log::{debug, info, trace, warn};
use std::collections::HashMap;

/// Wire-out flagging a full SDRAM buffer (bit 0).
pub const SDRAM_FULL_WIRE: u32 = 0x20;
/// Wire-out holding the buffered data size, in 128-byte blocks.
pub const DATA_SIZE_WIRE: u32 = 0x21;
/// Block pipe carrying sensor data.
pub const DATA_PIPE: u32 = 0xA0;
/// Block size of [`DATA_PIPE`] transfers.
pub const DATA_BLOCK_SIZE: u32 = 128;

const DATA_SIZE_MASK: u32 = 0x001F_FFFF;
const FRAME_TIME_WIRE: u32 = 0x02;
const FRAME_TIME_MASK: u32 = 0x00FF_FFFF;
const IMU_INTERVAL_MASK: u32 = 0xFF00_0000;
const CLOCK_WIRE: u32 = 0x03;
const CLOCK_M_MASK: u32 = 0xFF00_0000;
const CLOCK_D_VALUE: u32 = 0x0063_0000;
const CLOCK_D_MASK: u32 = 0x00FF_0000;
const CLOCK_APPLY_BIT: u32 = 0x8000;

const MAX_CLOCK_MHZ: u32 = 50;
const BIAS_MAX: u32 = 1023;
const BIAS_REFERENCE: u32 = 512;
// Frame-time registers count 40 ns (full picture) and 160 ns (FE) ticks in 24 bits.
const FULL_PIC_TICKS_PER_MS: u32 = 25_000;
const FE_TICKS_PER_MS: u32 = 6_250;
const MAX_FULL_PIC_FRAME_MS: u32 = FRAME_TIME_MASK / FULL_PIC_TICKS_PER_MS;
const MAX_FE_FRAME_MS: u32 = FRAME_TIME_MASK / FE_TICKS_PER_MS;

/// Frame times applied by [`Celex4Controller::open_sensor`].
const OPEN_FE_FRAME_MS: u32 = 60;
const OPEN_FULL_PIC_FRAME_MS: u32 = 40;

// =============================================================================
// Operations
// =============================================================================

/// The fixed set of sequences the CeleX4 controller drives.
///
/// They are resolved against the description once, when the controller is
/// constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Celex4Operation {
    /// Sensor power-up.
    PowerUp,
    /// Reset the FPGA only.
    ResetFpga,
    /// Reset the sensor and the FPGA.
    ResetAll,
    /// Turn the ADC on.
    AdcEnable,
    /// Turn the ADC off.
    AdcDisable,
    /// Switch to full-picture mode.
    FullPicture,
    /// Switch to event mode.
    EventMode,
    /// Switch to full-picture + event mode.
    OpticalMode,
    /// Trigger one full picture.
    ForceFire,
}

impl Celex4Operation {
    /// Every operation.
    pub const ALL: [Self; 9] = [
        Self::PowerUp,
        Self::ResetFpga,
        Self::ResetAll,
        Self::AdcEnable,
        Self::AdcDisable,
        Self::FullPicture,
        Self::EventMode,
        Self::OpticalMode,
        Self::ForceFire,
    ];

    /// Name of the sequence implementing this operation.
    pub fn sequence_name(self) -> &'static str {
        match self {
            Self::PowerUp => "Power Up",
            Self::ResetFpga => "Reset-Dereset FPGA",
            Self::ResetAll => "Reset-Dereset All",
            Self::AdcEnable => "ADC Enable",
            Self::AdcDisable => "ADC Disable",
            Self::FullPicture => "Full Picture",
            Self::EventMode => "Event Mode",
            Self::OpticalMode => "Optical Mode",
            Self::ForceFire => "Force Fire",
        }
    }

    /// The mode-switch operation for `mode`.
    pub fn for_mode(mode: Celex4Mode) -> Self {
        match mode {
            Celex4Mode::FullPicture => Self::FullPicture,
            Celex4Mode::Event => Self::EventMode,
            Celex4Mode::FullPicEvent => Self::OpticalMode,
        }
    }
}

// =============================================================================
// Celex4Controller
// =============================================================================

/// Controller for a CeleX4 sensor.
///
/// # Example
///
/// ```
/// use celex_sdk::{Celex4Controller, Celex4Mode, MockTransport, SensorController, SequenceManager};
///
/// let manager = SequenceManager::celex4_builtin()?;
/// let mut sensor = Celex4Controller::new(MockTransport::new(), manager);
/// sensor.open_sensor()?;
/// sensor.set_sensor_mode(Celex4Mode::FullPicture)?;
/// sensor.set_contrast(64)?;
/// assert_eq!(sensor.get_contrast(), 64);
/// # Ok::<(), celex_sdk::ControllerError>(())
/// ```
pub struct Celex4Controller<T: RegisterTransport> {
    transport: T,
    manager: SequenceManager,
    operations: HashMap<Celex4Operation, Sequence>,
    advanced: Vec<String>,
    state: Celex4State,
    options: ControllerOptions,
}

impl<T: RegisterTransport> Celex4Controller<T> {
    /// Create a controller with default options.
    pub fn new(transport: T, manager: SequenceManager) -> Self {
        Self::with_options(transport, manager, ControllerOptions::default())
    }

    /// Create a controller with explicit options.
    pub fn with_options(transport: T, manager: SequenceManager, options: ControllerOptions) -> Self {
        let mut operations = HashMap::new();
        for op in Celex4Operation::ALL {
            match manager.sequence(op.sequence_name()) {
                Some(sequence) => {
                    operations.insert(op, sequence.clone());
                }
                None => warn!("sequence '{}' is not defined", op.sequence_name()),
            }
        }

        let mut state = Celex4State::default();
        let mut advanced = Vec::new();
        for name in manager.slider_names() {
            let Some(slider) = manager.slider(name) else {
                continue;
            };
            if !slider.shown {
                continue;
            }
            state.biases.insert(slider.name.clone(), slider.value);
            if slider.advanced {
                advanced.push(slider.name.clone());
            }
        }
        debug!(
            "CeleX4: {} operations, {} biases ({} advanced)",
            operations.len(),
            state.biases.len(),
            advanced.len()
        );

        Self {
            transport,
            manager,
            operations,
            advanced,
            state,
            options,
        }
    }

    /// Get a snapshot of the cached sensor state.
    pub fn get_state(&self) -> Celex4State {
        self.state.clone()
    }

    /// The owned transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The owned transport, mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Names of the advanced bias sliders, in definition order.
    pub fn advanced_bias_names(&self) -> &[String] {
        &self.advanced
    }

    // -------------------------------------------------------------------------
    // Firing
    // -------------------------------------------------------------------------

    fn run(&mut self, op: Celex4Operation) -> Option<FireReport> {
        match self.operations.get(&op) {
            Some(sequence) => Some(sequence.fire(&mut self.transport)),
            None => {
                warn!("'{}' is not defined, skipped", op.sequence_name());
                None
            }
        }
    }

    fn run_recipe(&mut self, op: Celex4Operation, recipe: &'static str) -> Result<(), ControllerError> {
        match self.run(op) {
            Some(report) => report.into_result(recipe),
            None => Ok(()),
        }
    }

    fn fire_slider(&mut self, report: &mut FireReport, name: &str, value: u32) {
        let Some(slider) = self.manager.slider(name) else {
            warn!("slider '{}' is not defined, skipped", name);
            return;
        };
        trace!("slider {} <- {}", name, value);
        report.record(slider.fire_with_arg(&mut self.transport, value));
        if slider.shown {
            self.state.biases.insert(name.to_string(), value);
        }
    }

    fn write_wire(&mut self, report: &mut FireReport, step: &str, address: u32, value: u32, mask: u32) {
        if self.transport.write_register(address, value, mask) {
            report.record(Ok(()));
        } else {
            warn!("{}: write of {:#x} to wire {:#04x} failed", step, value, address);
            report.record(Err(StepFailure {
                step: step.to_string(),
                address,
                value,
            }));
        }
    }

    /// Fire a sequence of the description by name.
    ///
    /// # Errors
    ///
    /// - [`ControllerError::SequenceNotDefined`] if no such sequence exists
    /// - [`ControllerError::ConfigurationFailed`] if any of its writes failed
    pub fn fire_sequence(&mut self, name: &str) -> Result<(), ControllerError> {
        let Some(sequence) = self.manager.sequence(name) else {
            warn!("sequence '{}' is not defined", name);
            return Err(ControllerError::SequenceNotDefined(name.to_string()));
        };
        sequence.fire(&mut self.transport).into_result("fire sequence")
    }

    /// Set a bias slider by name.
    ///
    /// # Errors
    ///
    /// - [`ControllerError::SequenceNotDefined`] if no such slider exists
    /// - [`ControllerError::ParameterOutOfRange`] if `value` is outside the slider bounds
    /// - [`ControllerError::StepFailed`] if the transport rejected the write
    pub fn set_bias(&mut self, name: &str, value: u32) -> Result<(), ControllerError> {
        let Some(slider) = self.manager.slider(name) else {
            warn!("slider '{}' is not defined", name);
            return Err(ControllerError::SequenceNotDefined(name.to_string()));
        };
        let template = &slider.template;
        if !template.accepts(value) {
            return self.options.reject(
                "bias",
                value.into(),
                template.min.unwrap_or(0).into(),
                template.max.unwrap_or(u32::MAX).into(),
            );
        }

        let mut report = FireReport::new();
        self.fire_slider(&mut report, name, value);
        match report.failures().first() {
            Some(failure) => Err(ControllerError::StepFailed(failure.clone())),
            None => Ok(()),
        }
    }

    /// Fire every advanced bias with its cached value.
    fn configure_settings(&mut self, report: &mut FireReport) {
        for name in self.advanced.clone() {
            let value = match self.state.biases.get(&name) {
                Some(value) => *value,
                None => match self.manager.slider(&name) {
                    Some(slider) => slider.value,
                    None => continue,
                },
            };
            self.fire_slider(report, &name, value);
        }
    }

    // -------------------------------------------------------------------------
    // Modes and FPGA control
    // -------------------------------------------------------------------------

    /// Switch the operating mode.
    ///
    /// Nothing is written, and the cached mode is kept, if the transport is
    /// not ready.
    pub fn set_sensor_mode(&mut self, mode: Celex4Mode) -> Result<(), ControllerError> {
        if !self.transport.is_ready() {
            warn!("CeleX4: not ready, mode {} not applied", mode);
            return Ok(());
        }
        self.state.mode = mode;
        info!("CeleX4: mode set to {}", mode);
        self.run_recipe(Celex4Operation::for_mode(mode), "set sensor mode")
    }

    /// The cached operating mode.
    pub fn get_sensor_mode(&self) -> Celex4Mode {
        self.state.mode
    }

    /// Reset the FPGA.
    pub fn reset_fpga(&mut self) -> Result<(), ControllerError> {
        self.run_recipe(Celex4Operation::ResetFpga, "reset FPGA")
    }

    /// Reset the sensor and the FPGA.
    pub fn reset_sensor_and_fpga(&mut self) -> Result<(), ControllerError> {
        self.run_recipe(Celex4Operation::ResetAll, "reset sensor and FPGA")
    }

    /// Turn the ADC on or off.
    pub fn enable_adc(&mut self, enable: bool) -> Result<(), ControllerError> {
        if enable {
            self.run_recipe(Celex4Operation::AdcEnable, "enable ADC")
        } else {
            self.run_recipe(Celex4Operation::AdcDisable, "disable ADC")
        }
    }

    /// Trigger a single full picture.
    pub fn trig_full_pic(&mut self) -> Result<(), ControllerError> {
        self.run_recipe(Celex4Operation::ForceFire, "trigger full picture")
    }

    // -------------------------------------------------------------------------
    // Data
    // -------------------------------------------------------------------------

    /// Whether the FPGA SDRAM buffer is full. `false` if not ready.
    pub fn is_sdram_full(&mut self) -> bool {
        if !self.transport.is_ready() {
            return false;
        }
        self.transport
            .read_register(SDRAM_FULL_WIRE, 0x0001)
            .is_some_and(|v| v != 0)
    }

    /// Bytes buffered on the FPGA, or `None` if the sensor is not ready.
    pub fn get_fpga_data_size(&mut self) -> Option<u32> {
        if !self.transport.is_ready() {
            return None;
        }
        self.transport
            .read_register(DATA_SIZE_WIRE, DATA_SIZE_MASK)
            .map(|blocks| blocks * DATA_BLOCK_SIZE)
    }

    /// Read buffered sensor data into `buf`. Returns the number of bytes read.
    ///
    /// `buf.len()` should be a multiple of [`DATA_BLOCK_SIZE`].
    pub fn read_data_from_fpga(&mut self, buf: &mut [u8]) -> Result<usize, BulkReadError> {
        if !self.transport.is_ready() {
            return Err(BulkReadError::NotReady);
        }
        let read = self.transport.read_bulk(DATA_PIPE, DATA_BLOCK_SIZE, buf);
        if read < 0 {
            let err = BulkReadError::from_code(read);
            log_bulk_error(err);
            return Err(err);
        }
        Ok(read as usize)
    }

    // -------------------------------------------------------------------------
    // Timing
    // -------------------------------------------------------------------------

    /// Set the full-picture frame time in milliseconds.
    pub fn set_full_pic_frame_time(&mut self, ms: u32) -> Result<(), ControllerError> {
        if ms == 0 || ms > MAX_FULL_PIC_FRAME_MS {
            return self.options.reject("full picture frame time", ms.into(), 1, MAX_FULL_PIC_FRAME_MS.into());
        }
        self.state.full_pic_frame_time = ms;
        let mut report = FireReport::new();
        self.apply_full_pic_frame_time(&mut report, ms);
        report.into_result("set full picture frame time")
    }

    fn apply_full_pic_frame_time(&mut self, report: &mut FireReport, ms: u32) {
        self.write_wire(report, "full picture frame time", FRAME_TIME_WIRE, ms * FULL_PIC_TICKS_PER_MS, FRAME_TIME_MASK);
        self.transport.wait(1);
    }

    /// Get the full-picture frame time in milliseconds.
    pub fn get_full_pic_frame_time(&self) -> u32 {
        self.state.full_pic_frame_time
    }

    /// Set the full-picture + event frame time in milliseconds.
    pub fn set_fe_frame_time(&mut self, ms: u32) -> Result<(), ControllerError> {
        if ms == 0 || ms > MAX_FE_FRAME_MS {
            return self.options.reject("FE frame time", ms.into(), 1, MAX_FE_FRAME_MS.into());
        }
        self.state.fe_frame_time = ms;
        let mut report = FireReport::new();
        self.apply_fe_frame_time(&mut report, ms);
        report.into_result("set FE frame time")
    }

    fn apply_fe_frame_time(&mut self, report: &mut FireReport, ms: u32) {
        self.write_wire(report, "FE frame time", FRAME_TIME_WIRE, ms * FE_TICKS_PER_MS, FRAME_TIME_MASK);
        self.transport.wait(1);
    }

    /// Get the full-picture + event frame time in milliseconds.
    pub fn get_fe_frame_time(&self) -> u32 {
        self.state.fe_frame_time
    }

    /// Set the event frame time in milliseconds.
    ///
    /// Event frames are assembled on the host; nothing is written.
    pub fn set_event_frame_time(&mut self, ms: u32) {
        self.state.event_frame_time = ms;
    }

    /// Get the event frame time in milliseconds.
    pub fn get_event_frame_time(&self) -> u32 {
        self.state.event_frame_time
    }

    /// Set the IMU sampling interval. Values above 255 are clamped.
    pub fn set_imu_interval_time(&mut self, value: u32) -> Result<(), ControllerError> {
        let value = value.min(255);
        let mut report = FireReport::new();
        self.write_wire(&mut report, "IMU interval", FRAME_TIME_WIRE, value << 24, IMU_INTERVAL_MASK);
        report.into_result("set IMU interval")
    }
}

impl<T: RegisterTransport> SensorController for Celex4Controller<T> {
    fn open_sensor(&mut self) -> Result<(), ControllerError> {
        if !self.transport.connect() || !self.transport.is_ready() {
            warn!("CeleX4: FPGA could not be opened");
            return Err(ControllerError::TransportUnavailable);
        }

        info!("CeleX4: powering up");
        match self.run(Celex4Operation::PowerUp) {
            Some(report) => report.into_result("power up")?,
            None => {
                return Err(ControllerError::SequenceNotDefined(
                    Celex4Operation::PowerUp.sequence_name().to_string(),
                ));
            }
        }

        let mut report = FireReport::new();
        self.configure_settings(&mut report);
        self.state.fe_frame_time = OPEN_FE_FRAME_MS;
        self.apply_fe_frame_time(&mut report, OPEN_FE_FRAME_MS);
        self.state.full_pic_frame_time = OPEN_FULL_PIC_FRAME_MS;
        self.apply_full_pic_frame_time(&mut report, OPEN_FULL_PIC_FRAME_MS);
        report.into_result("configure settings")
    }

    fn close_sensor(&mut self) {
        self.transport.disconnect();
    }

    fn is_sensor_ready(&self) -> bool {
        self.transport.is_ready()
    }

    /// Set the contrast by spreading the reference biases around 512.
    fn set_contrast(&mut self, value: u32) -> Result<(), ControllerError> {
        if value > 2 * (BIAS_MAX - BIAS_REFERENCE) {
            return self.options.reject("contrast", value.into(), 0, (2 * (BIAS_MAX - BIAS_REFERENCE)).into());
        }
        let ref_plus = BIAS_REFERENCE + value / 2;
        let ref_minus = BIAS_REFERENCE - value / 2;
        let ref_plus_h = (ref_plus + value / 16).min(BIAS_MAX);
        let ref_minus_h = ref_minus.saturating_sub(value / 16);

        let mut report = FireReport::new();
        self.fire_slider(&mut report, "REF+", ref_plus);
        self.fire_slider(&mut report, "REF-", ref_minus);
        self.fire_slider(&mut report, "REF+H", ref_plus_h);
        self.fire_slider(&mut report, "REF-H", ref_minus_h);
        report.into_result("set contrast")
    }

    fn get_contrast(&self) -> u32 {
        self.state.bias("REF+").saturating_sub(BIAS_REFERENCE) * 2
    }

    fn set_brightness(&mut self, value: u32) -> Result<(), ControllerError> {
        if value > BIAS_MAX {
            return self.options.reject("brightness", value.into(), 0, BIAS_MAX.into());
        }
        let mut report = FireReport::new();
        self.fire_slider(&mut report, "CDS_DC", value);
        report.into_result("set brightness")
    }

    fn get_brightness(&self) -> u32 {
        self.state.bias("CDS_DC")
    }

    /// Set the event threshold around the cached `EVT_DC` bias.
    fn set_threshold(&mut self, value: u32) -> Result<(), ControllerError> {
        let dc = self.state.bias("EVT_DC");
        let max = BIAS_MAX.saturating_sub(dc);
        if value > max {
            return self.options.reject("threshold", value.into(), 0, max.into());
        }

        let mut report = FireReport::new();
        self.fire_slider(&mut report, "EVT_VL", dc.saturating_sub(value));
        self.fire_slider(&mut report, "EVT_VH", dc + value);
        report.into_result("set threshold")
    }

    fn get_threshold(&self) -> u32 {
        self.state.bias("EVT_VH").saturating_sub(self.state.bias("EVT_DC"))
    }

    /// Set the sensor clock in MHz. Rates above 50 MHz are clamped.
    ///
    /// [`get_clock_rate`](SensorController::get_clock_rate) reports the
    /// requested rate, before clamping.
    fn set_clock_rate(&mut self, value: u32) -> Result<(), ControllerError> {
        if value == 0 {
            return self.options.reject("clock rate", 0, 1, MAX_CLOCK_MHZ.into());
        }
        self.state.clock_rate = value;
        let mhz = value.min(MAX_CLOCK_MHZ);
        info!("CeleX4: clock rate {} MHz", mhz);

        let mut report = FireReport::new();
        self.write_wire(&mut report, "clock M", CLOCK_WIRE, (2 * mhz - 1) << 24, CLOCK_M_MASK);
        self.write_wire(&mut report, "clock D", CLOCK_WIRE, CLOCK_D_VALUE, CLOCK_D_MASK);
        self.write_wire(&mut report, "clock apply", CLOCK_WIRE, 0, CLOCK_APPLY_BIT);
        self.transport.wait(1);
        self.write_wire(&mut report, "clock apply", CLOCK_WIRE, CLOCK_APPLY_BIT, CLOCK_APPLY_BIT);
        report.into_result("set clock rate")
    }

    fn get_clock_rate(&self) -> u32 {
        self.state.clock_rate
    }
}

impl<T: RegisterTransport> Drop for Celex4Controller<T> {
    fn drop(&mut self) {
        if self.transport.is_ready() {
            self.transport.disconnect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockTransport;
    use crate::transport::RegisterWrite;

    const REF_PLUS: u32 = 0x15;
    const REF_MINUS: u32 = 0x14;
    const REF_MINUS_H: u32 = 0x16;
    const REF_PLUS_H: u32 = 0x17;
    const EVT_VL: u32 = 0x10;
    const EVT_VH: u32 = 0x11;

    fn controller() -> Celex4Controller<MockTransport> {
        let manager = SequenceManager::celex4_builtin().unwrap();
        let mut sensor = Celex4Controller::new(MockTransport::new(), manager);
        sensor.open_sensor().unwrap();
        sensor.transport_mut().clear_history();
        sensor
    }

    #[test]
    fn test_contrast_64() {
        let mut sensor = controller();
        sensor.set_contrast(64).unwrap();

        let t = sensor.transport();
        assert_eq!(t.values_written_to(REF_PLUS), vec![544]);
        assert_eq!(t.values_written_to(REF_MINUS), vec![480]);
        assert_eq!(t.values_written_to(REF_PLUS_H), vec![548]);
        assert_eq!(t.values_written_to(REF_MINUS_H), vec![476]);
        assert_eq!(sensor.get_contrast(), 64);
    }

    #[test]
    fn test_threshold_uses_cached_evt_dc() {
        let mut sensor = controller();
        sensor.set_bias("EVT_DC", 500).unwrap();
        sensor.set_threshold(80).unwrap();

        assert_eq!(sensor.transport().values_written_to(EVT_VL), vec![420]);
        assert_eq!(sensor.transport().values_written_to(EVT_VH), vec![580]);
        assert_eq!(sensor.get_threshold(), 80);

        assert!(matches!(
            sensor.set_threshold(600),
            Err(ControllerError::ParameterOutOfRange { parameter: "threshold", max: 523, .. })
        ));
    }

    #[test]
    fn test_brightness() {
        let mut sensor = controller();
        sensor.set_brightness(300).unwrap();
        assert_eq!(sensor.get_brightness(), 300);
        assert_eq!(sensor.transport().values_written_to(0x1A), vec![300]);
    }

    #[test]
    fn test_open_fires_power_up_then_biases() {
        let manager = SequenceManager::celex4_builtin().unwrap();
        let mut sensor = Celex4Controller::new(MockTransport::new(), manager);
        sensor.open_sensor().unwrap();

        let writes = sensor.transport().writes();
        assert_eq!(writes[0], RegisterWrite::new(0x00, 0x1, 0x1));
        let bias_writes = writes.iter().filter(|w| (0x10..=0x1C).contains(&w.address)).count();
        assert_eq!(bias_writes, sensor.advanced_bias_names().len());
        assert_eq!(
            sensor.transport().values_written_to(FRAME_TIME_WIRE),
            vec![60 * 6_250, 40 * 25_000]
        );
        assert_eq!(sensor.get_full_pic_frame_time(), 40);
    }

    #[test]
    fn test_open_unreachable() {
        let manager = SequenceManager::celex4_builtin().unwrap();
        let mut sensor = Celex4Controller::new(MockTransport::unreachable(), manager);
        assert!(matches!(sensor.open_sensor(), Err(ControllerError::TransportUnavailable)));
        assert!(sensor.transport().writes().is_empty());
    }

    #[test]
    fn test_open_power_up_failure() {
        let manager = SequenceManager::celex4_builtin().unwrap();
        let mut sensor = Celex4Controller::new(MockTransport::new().fail_writes_to(0x00), manager);
        assert!(matches!(
            sensor.open_sensor(),
            Err(ControllerError::ConfigurationFailed { recipe: "power up", .. })
        ));
    }

    #[test]
    fn test_mode_switch() {
        let mut sensor = controller();
        sensor.set_sensor_mode(Celex4Mode::FullPicEvent).unwrap();
        assert_eq!(sensor.get_sensor_mode(), Celex4Mode::FullPicEvent);
        assert_eq!(sensor.transport().writes(), &[RegisterWrite::new(0x01, 2, 0x3)]);
    }

    #[test]
    fn test_mode_not_stored_when_not_ready() {
        let manager = SequenceManager::celex4_builtin().unwrap();
        let mut sensor = Celex4Controller::new(MockTransport::new(), manager);
        sensor.set_sensor_mode(Celex4Mode::FullPicture).unwrap();
        assert_eq!(sensor.get_sensor_mode(), Celex4Mode::Event);
        assert!(sensor.transport().writes().is_empty());
    }

    #[test]
    fn test_hidden_advanced_slider_is_never_fired() {
        let manager = SequenceManager::from_toml_str(
            r#"
            [[command]]
            name = "on"
            high_addr = 0
            value = 1

            [[command]]
            name = "HIDDEN"
            high_addr = 0x30
            value = 7
            max = 1023

            [[command]]
            name = "LEAK"
            high_addr = 0x19
            value = 600
            max = 1023

            [[sequence]]
            name = "Power Up"
            commands = ["on"]

            [[slider]]
            name = "HIDDEN"
            command = "HIDDEN"
            shown = false
            advanced = true

            [[slider]]
            name = "LEAK"
            command = "LEAK"
            advanced = true
            "#,
        )
        .unwrap();
        let mut sensor = Celex4Controller::new(MockTransport::new(), manager);
        assert_eq!(sensor.advanced_bias_names(), &["LEAK".to_string()]);

        sensor.open_sensor().unwrap();
        assert!(sensor.transport().values_written_to(0x30).is_empty());
        assert_eq!(sensor.transport().values_written_to(0x19), vec![600]);
        assert!(!sensor.get_state().biases.contains_key("HIDDEN"));
    }

    #[test]
    fn test_clock_rate() {
        let mut sensor = controller();
        sensor.set_clock_rate(80).unwrap();
        assert_eq!(sensor.get_clock_rate(), 80);
        assert_eq!(
            sensor.transport().writes(),
            &[
                RegisterWrite::new(CLOCK_WIRE, 99 << 24, CLOCK_M_MASK),
                RegisterWrite::new(CLOCK_WIRE, CLOCK_D_VALUE, CLOCK_D_MASK),
                RegisterWrite::new(CLOCK_WIRE, 0, CLOCK_APPLY_BIT),
                RegisterWrite::new(CLOCK_WIRE, CLOCK_APPLY_BIT, CLOCK_APPLY_BIT),
            ]
        );
        assert_eq!(sensor.transport().waits(), &[1]);
        assert!(sensor.set_clock_rate(0).is_err());
    }

    #[test]
    fn test_unknown_names() {
        let mut sensor = controller();
        assert!(matches!(
            sensor.fire_sequence("Nope"),
            Err(ControllerError::SequenceNotDefined(name)) if name == "Nope"
        ));
        assert!(sensor.set_bias("Nope", 1).is_err());
        assert!(sensor.transport().writes().is_empty());
    }

    #[test]
    fn test_missing_operation_is_skipped() {
        let manager = SequenceManager::from_toml_str(
            r#"
            [[command]]
            name = "on"
            high_addr = 0
            value = 1

            [[sequence]]
            name = "Power Up"
            commands = ["on"]
            "#,
        )
        .unwrap();
        let mut sensor = Celex4Controller::new(MockTransport::new(), manager);
        sensor.open_sensor().unwrap();
        sensor.transport_mut().clear_history();

        assert!(sensor.reset_fpga().is_ok());
        assert!(sensor.trig_full_pic().is_ok());
        assert!(sensor.transport().writes().is_empty());
    }

    #[test]
    fn test_fpga_status() {
        let mut sensor = controller();
        sensor.transport_mut().set_register(DATA_SIZE_WIRE, 4);
        sensor.transport_mut().set_register(SDRAM_FULL_WIRE, 1);
        assert_eq!(sensor.get_fpga_data_size(), Some(512));
        assert!(sensor.is_sdram_full());

        sensor.close_sensor();
        assert_eq!(sensor.get_fpga_data_size(), None);
        assert!(!sensor.is_sdram_full());
    }

    #[test]
    fn test_read_data_from_fpga() {
        let mut sensor = controller();
        sensor.transport_mut().push_bulk_data(vec![7; 256]);
        sensor.transport_mut().push_bulk_error(BulkReadError::UNSUPPORTED_FEATURE);

        let mut buf = [0u8; 1024];
        assert_eq!(sensor.read_data_from_fpga(&mut buf), Ok(256));
        assert_eq!(
            sensor.read_data_from_fpga(&mut buf),
            Err(BulkReadError::UnsupportedFeature(-15))
        );
        assert_eq!(sensor.read_data_from_fpga(&mut buf), Ok(0));
    }

    #[test]
    fn test_frame_times_and_imu() {
        let mut sensor = controller();
        sensor.set_full_pic_frame_time(671).unwrap();
        assert!(sensor.set_full_pic_frame_time(672).is_err());
        sensor.set_fe_frame_time(2684).unwrap();
        assert!(sensor.set_fe_frame_time(2685).is_err());
        sensor.set_imu_interval_time(1000).unwrap();

        assert_eq!(
            sensor.transport().writes().last(),
            Some(&RegisterWrite::new(FRAME_TIME_WIRE, 255 << 24, IMU_INTERVAL_MASK))
        );
        assert_eq!(sensor.get_fe_frame_time(), 2684);
    }

    #[test]
    fn test_state_biases() {
        let sensor = controller();
        let state = sensor.get_state();
        assert_eq!(state.bias("CDS_DC"), 400);
        assert_eq!(state.bias("Gain"), 1);
        assert!(!state.biases.contains_key("Resolution"));
        assert!(!sensor.advanced_bias_names().contains(&"Gain".to_string()));
    }
}
