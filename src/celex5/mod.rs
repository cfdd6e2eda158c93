//! CeleX5 sensor controller.
//!
//! The CeleX5 is configured register by register over an I2C-style bridge.
//! Most writes are only valid in configuration mode, so every setter wraps
//! its writes in an enter-CFG / enter-start handshake.

mod registers;

use crate::controller::{ControllerOptions, SensorController, log_bulk_error};
use crate::error::{BulkReadError, ControllerError};
use crate::manager::{ConfigEntry, SequenceManager};
use crate::modes::Celex5Mode;
use crate::sequence::{FireReport, RegisterTarget, StepFailure};
use crate::state::Celex5State;
use crate::transport::RegisterTransport;

use log::{debug, info, trace, warn};
use registers::*;
use std::collections::BTreeMap;

pub use registers::{ClockDividers, clock_dividers};

/// Bulk endpoint carrying MIPI frame data.
pub const MIPI_ENDPOINT: u32 = 0x81;
/// Transfer block size for MIPI reads.
pub const MIPI_BLOCK_SIZE: u32 = 1024;
/// Upper bound on the bytes returned by one [`Celex5Controller::get_mipi_data`] call.
pub const MAX_MIPI_FRAME_BYTES: usize = 1280 * 800 * 3 / 2;

const REGISTER_MASK: u32 = 0xFF;

/// The register groups written by [`Celex5Controller::open_sensor`], by name.
pub mod groups {
    /// PLL dividers.
    pub const PLL: &str = "PLL_Parameters";
    /// MIPI PHY settings.
    pub const MIPI: &str = "MIPI_Parameters";
    /// Biases, loaded once per auto-ISP profile.
    pub const SENSOR_CORE: &str = "Sensor_Core_Parameters";
    /// Fixed/loop mode control.
    pub const OPERATION_MODE: &str = "Sensor_Operation_Mode_Control_Parameters";
    /// Output packet format.
    pub const DATA_TRANSFER: &str = "Sensor_Data_Transfer_Parameters";
}

/// Compute `(EVT_VL, EVT_VH)` for a threshold around the 512 reference.
///
/// Both values are clamped to the 10-bit register range.
pub fn threshold_biases(value: u32) -> (u32, u32) {
    let low = 512u32.saturating_sub(value).min(1023);
    let high = 512u32.saturating_add(value).min(1023);
    (low, high)
}

// =============================================================================
// Celex5Controller
// =============================================================================

/// Controller for a CeleX5 sensor.
///
/// # Example
///
/// ```
/// use celex_sdk::{Celex5Controller, Celex5Mode, MockTransport, SensorController, SequenceManager};
///
/// let manager = SequenceManager::celex5_builtin()?;
/// let mut sensor = Celex5Controller::new(MockTransport::new(), manager);
/// sensor.open_sensor()?;
/// sensor.set_sensor_fixed_mode(Celex5Mode::FullPicture)?;
/// sensor.set_threshold(171)?;
/// assert_eq!(sensor.get_state().fixed_mode, Celex5Mode::FullPicture);
/// # Ok::<(), celex_sdk::ControllerError>(())
/// ```
pub struct Celex5Controller<T: RegisterTransport> {
    transport: T,
    manager: SequenceManager,
    state: Celex5State,
    options: ControllerOptions,
}

impl<T: RegisterTransport> Celex5Controller<T> {
    /// Create a controller with default options.
    pub fn new(transport: T, manager: SequenceManager) -> Self {
        Self::with_options(transport, manager, ControllerOptions::default())
    }

    /// Create a controller with explicit options.
    pub fn with_options(transport: T, manager: SequenceManager, options: ControllerOptions) -> Self {
        for name in [
            groups::PLL,
            groups::MIPI,
            groups::SENSOR_CORE,
            groups::OPERATION_MODE,
            groups::DATA_TRANSFER,
        ] {
            if manager.config_group(name).is_none() {
                warn!("config group '{}' is not defined, it will be skipped", name);
            }
        }
        Self {
            transport,
            manager,
            state: Celex5State::default(),
            options,
        }
    }

    /// Get a snapshot of the cached sensor state.
    pub fn get_state(&self) -> Celex5State {
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

    /// Every register group of the loaded description.
    pub fn get_celex5_cfg(&self) -> &BTreeMap<String, Vec<ConfigEntry>> {
        self.manager.config_groups()
    }

    // -------------------------------------------------------------------------
    // Write primitives
    // -------------------------------------------------------------------------

    fn set_als_enabled(&mut self, enable: bool) -> Result<(), StepFailure> {
        let value = if enable { ALS_ENABLE } else { ALS_DISABLE };
        if self.transport.write_register(ALS_CONTROL, value, REGISTER_MASK) {
            Ok(())
        } else {
            warn!("failed to {} the ALS sideband", if enable { "enable" } else { "disable" });
            Err(StepFailure {
                step: "ALS_CONTROL".to_string(),
                address: ALS_CONTROL,
                value,
            })
        }
    }

    /// Write one byte register. While auto-ISP is active the ALS sideband is
    /// paused around the write.
    fn wire_in(&mut self, report: &mut FireReport, name: &str, address: u32, value: u32) {
        let auto_isp = self.state.auto_isp_enabled;
        if auto_isp {
            report.record(self.set_als_enabled(false));
            self.transport.wait(self.options.als_settle_ms);
        }

        trace!("{}: address={} value={}", name, address, value);
        let ok = self.transport.write_register(address, value, REGISTER_MASK);

        if auto_isp {
            report.record(self.set_als_enabled(true));
        }

        if ok {
            report.record(Ok(()));
        } else {
            warn!("{}: write of {} to address {} failed", name, value, address);
            report.record(Err(StepFailure {
                step: name.to_string(),
                address,
                value,
            }));
        }
    }

    fn write_target(&mut self, report: &mut FireReport, name: &str, target: RegisterTarget, value: u32) {
        if let RegisterTarget::Wide { .. } = target {
            warn!("{}: three-address registers are not writable, skipped", name);
            return;
        }
        for write in target.writes(value, REGISTER_MASK) {
            self.wire_in(report, name, write.address, write.value);
        }
    }

    fn load_group(&mut self, report: &mut FireReport, group: &str) {
        let Some(entries) = self.manager.config_group(group) else {
            warn!("{}: config group not defined", group);
            return;
        };
        let writes: Vec<(String, Option<RegisterTarget>, u32)> = entries
            .iter()
            .map(|entry| (entry.name.clone(), entry.target(), entry.value))
            .collect();

        debug!("loading {} ({} registers)", group, writes.len());
        for (name, target, value) in writes {
            match target {
                Some(target) => self.write_target(report, &name, target, value),
                None => warn!("{}: '{}' has no valid address", group, name),
            }
        }
    }

    fn cfg_mode(&mut self, report: &mut FireReport) {
        self.wire_in(report, "START_EN", START_EN, 0);
        self.wire_in(report, "CFG_EN", CFG_EN, 1);
    }

    fn start_mode(&mut self, report: &mut FireReport) {
        self.wire_in(report, "CFG_EN", CFG_EN, 0);
        self.wire_in(report, "START_EN", START_EN, 1);
    }

    fn mipi_lanes(&mut self, report: &mut FireReport, enable: bool) {
        for lane in MIPI_LANES {
            self.wire_in(report, "MIPI_LANE_EN", lane, u32::from(enable));
        }
    }

    fn pll(&mut self, report: &mut FireReport, enable: bool) {
        self.wire_in(report, "PLL_PD_B", PLL_PD_B, u32::from(enable));
    }

    /// Reset the auto-ISP block so core parameters always load from profile 0.
    fn reset_auto_isp_profile(&mut self, report: &mut FireReport, trigger: bool, profile0_brightness: u32) {
        self.wire_in(report, "AUTOISP_TRIGGER", AUTOISP_TRIGGER, u32::from(trigger));
        self.wire_in(report, "AUTOISP_PROFILE_ADDR", AUTOISP_PROFILE_ADDR, 0);
        self.write_target(report, "AUTOISP_BRT_VALUE", AUTOISP_BRT_VALUE, AUTOISP_INITIAL_BRIGHTNESS);
        self.write_target(report, "BIAS_BRT_I", BIAS_BRT_I, profile0_brightness);
    }

    // -------------------------------------------------------------------------
    // Register access
    // -------------------------------------------------------------------------

    /// Write `value` to a raw address triple (`-1` for absent addresses).
    ///
    /// A present low address without a middle address splits the value into
    /// a high byte and a low byte.
    pub fn write_register(&mut self, high: i16, middle: i16, low: i16, value: u32) -> Result<(), ControllerError> {
        let Some(target) = RegisterTarget::from_raw(high.into(), middle.into(), low.into()) else {
            return self.options.reject("register address", high.into(), 0, i16::MAX.into());
        };
        let mut report = FireReport::new();
        self.write_target(&mut report, "write_register", target, value);
        report.into_result("write register")
    }

    /// Write every register of a config group with its default value.
    ///
    /// An unknown group is logged and skipped.
    pub fn write_csr_defaults(&mut self, group: &str) -> Result<(), ControllerError> {
        info!("writing CSR defaults: {}", group);
        let mut report = FireReport::new();
        self.load_group(&mut report, group);
        report.into_result("write CSR defaults")
    }

    /// Enter configuration mode.
    pub fn enter_cfg_mode(&mut self) -> Result<(), ControllerError> {
        let mut report = FireReport::new();
        self.cfg_mode(&mut report);
        report.into_result("enter CFG mode")
    }

    /// Leave configuration mode and start the sensor.
    pub fn enter_start_mode(&mut self) -> Result<(), ControllerError> {
        let mut report = FireReport::new();
        self.start_mode(&mut report);
        report.into_result("enter start mode")
    }

    /// Run the full register configuration recipe.
    ///
    /// Every step is attempted. The report lists the steps that failed.
    pub fn configure_settings(&mut self) -> FireReport {
        let mut report = FireReport::new();

        report.record(self.set_als_enabled(false));
        self.wire_in(&mut report, "PADDR_EN", PADDR_EN, 0);

        debug!("loading PLL parameters");
        self.pll(&mut report, false);
        self.load_group(&mut report, groups::PLL);
        self.pll(&mut report, true);

        debug!("loading MIPI parameters");
        self.mipi_lanes(&mut report, false);
        self.load_group(&mut report, groups::MIPI);
        self.write_target(&mut report, "MIPI_PLL_DIV_N", MIPI_PLL_DIV_N, MIPI_PLL_DIV_N_DEFAULT);
        self.mipi_lanes(&mut report, true);

        debug!("loading sensor core parameters into auto-ISP profiles");
        self.cfg_mode(&mut report);
        for profile in 0..4u32 {
            self.wire_in(&mut report, "AUTOISP_PROFILE_ADDR", AUTOISP_PROFILE_ADDR, profile);
            self.load_group(&mut report, groups::SENSOR_CORE);
            let brightness = match profile {
                0 => PROFILE0_BRIGHTNESS,
                n => self.state.isp_brightness[n as usize],
            };
            self.write_target(&mut report, "BIAS_BRT_I", BIAS_BRT_I, brightness);
        }

        self.wire_in(&mut report, "AUTOISP_BRT_EN", AUTOISP_BRT_EN, 0);
        self.wire_in(&mut report, "AUTOISP_TEM_EN", AUTOISP_TEM_EN, 0);
        self.wire_in(&mut report, "AUTOISP_TRIGGER", AUTOISP_TRIGGER, 0);
        let refresh = self.state.auto_isp_refresh_time;
        self.write_target(&mut report, "AUTOISP_REFRESH_TIME", AUTOISP_REFRESH_TIME, refresh);
        let thresholds = self.state.isp_thresholds;
        for (target, value) in AUTOISP_BRT_THRES.into_iter().zip(thresholds) {
            self.write_target(&mut report, "AUTOISP_BRT_THRES", target, value);
        }
        self.write_target(&mut report, "AUTOISP_BRT_VALUE", AUTOISP_BRT_VALUE, AUTOISP_INITIAL_BRIGHTNESS);

        self.load_group(&mut report, groups::OPERATION_MODE);
        self.load_group(&mut report, groups::DATA_TRANSFER);
        self.start_mode(&mut report);

        if report.is_success() {
            info!("configured {} registers", report.attempted());
        } else {
            warn!(
                "configuration finished with {} of {} steps failed",
                report.failures().len(),
                report.attempted()
            );
        }
        report
    }

    // -------------------------------------------------------------------------
    // Modes
    // -------------------------------------------------------------------------

    /// Set the mode used when loop mode is disabled.
    ///
    /// Also disables auto-ISP brightness tracking in the sensor so core
    /// parameters always come from profile 0.
    pub fn set_sensor_fixed_mode(&mut self, mode: Celex5Mode) -> Result<(), ControllerError> {
        self.transport.clear_buffers();
        let mut report = FireReport::new();
        report.record(self.set_als_enabled(false));

        self.cfg_mode(&mut report);
        self.wire_in(&mut report, "SENSOR_MODE_1", SENSOR_MODE_1, mode.register_value());
        self.wire_in(&mut report, "AUTOISP_BRT_EN", AUTOISP_BRT_EN, 0);
        self.reset_auto_isp_profile(&mut report, false, PROFILE0_BRIGHTNESS);
        self.start_mode(&mut report);

        self.state.fixed_mode = mode;
        info!("fixed mode set to {}", mode);
        report.into_result("set fixed mode")
    }

    /// Get the mode used when loop mode is disabled.
    pub fn get_sensor_fixed_mode(&self) -> Celex5Mode {
        self.state.fixed_mode
    }

    /// Set the mode of loop slot `slot` (1-3).
    pub fn set_sensor_loop_mode(&mut self, mode: Celex5Mode, slot: u8) -> Result<(), ControllerError> {
        if !(1..=3).contains(&slot) {
            return self.options.reject("loop slot", slot.into(), 1, 3);
        }
        self.transport.clear_buffers();

        let mut report = FireReport::new();
        self.cfg_mode(&mut report);
        self.wire_in(&mut report, "SENSOR_MODE", LOOP_MODE_BASE + u32::from(slot), mode.register_value());
        self.start_mode(&mut report);

        self.state.loop_modes[usize::from(slot) - 1] = mode;
        report.into_result("set loop mode")
    }

    /// Get the mode of loop slot `slot` (1-3), or `None` for any other slot.
    pub fn get_sensor_loop_mode(&self, slot: u8) -> Option<Celex5Mode> {
        (1..=3)
            .contains(&slot)
            .then(|| self.state.loop_modes[usize::from(slot) - 1])
    }

    /// Switch between fixed mode and loop mode.
    pub fn set_loop_mode_enabled(&mut self, enable: bool) -> Result<(), ControllerError> {
        self.state.loop_mode_enabled = enable;
        let mut report = FireReport::new();
        if self.state.auto_isp_enabled {
            report.record(self.set_als_enabled(false));
        }

        self.cfg_mode(&mut report);
        if enable {
            self.wire_in(&mut report, "SENSOR_MODE_SELECT", SENSOR_MODE_SELECT, 1);
            self.wire_in(&mut report, "AUTOISP_BRT_EN", AUTOISP_BRT_EN, 0);
            self.reset_auto_isp_profile(&mut report, true, PROFILE0_BRIGHTNESS);
        } else {
            self.wire_in(&mut report, "SENSOR_MODE_SELECT", SENSOR_MODE_SELECT, 0);
        }
        self.start_mode(&mut report);
        report.into_result("set loop mode enabled")
    }

    /// Whether loop mode is enabled.
    pub fn is_loop_mode_enabled(&self) -> bool {
        self.state.loop_mode_enabled
    }

    /// Set how long the event modes (A/B/C) run in loop mode.
    pub fn set_event_duration(&mut self, value: u32) -> Result<(), ControllerError> {
        if value > 1023 {
            return self.options.reject("event duration", value.into(), 0, 1023);
        }
        let mut report = FireReport::new();
        self.cfg_mode(&mut report);
        self.write_target(&mut report, "EVENT_DURATION", EVENT_DURATION, value);
        self.start_mode(&mut report);
        report.into_result("set event duration")
    }

    /// Set how many pictures a full-frame mode captures per loop.
    ///
    /// Event modes have no picture counter; the call is a logged no-op for them.
    pub fn set_picture_number(&mut self, num: u32, mode: Celex5Mode) -> Result<(), ControllerError> {
        if num > 255 {
            return self.options.reject("picture number", num.into(), 0, 255);
        }
        let address = match mode {
            Celex5Mode::FullPicture => PICTURE_NUMBER_1,
            Celex5Mode::FullOpticalFlowS => PICTURE_NUMBER_2,
            Celex5Mode::FullOpticalFlowM => PICTURE_NUMBER_4,
            _ => {
                debug!("{} has no picture counter", mode);
                return Ok(());
            }
        };
        let mut report = FireReport::new();
        self.cfg_mode(&mut report);
        self.wire_in(&mut report, "PICTURE_NUMBER", address, num);
        self.start_mode(&mut report);
        report.into_result("set picture number")
    }

    // -------------------------------------------------------------------------
    // Auto ISP
    // -------------------------------------------------------------------------

    /// Enable or disable automatic brightness profiles.
    pub fn set_auto_isp_enabled(&mut self, enable: bool) -> Result<(), ControllerError> {
        self.state.auto_isp_enabled = enable;
        let trigger = self.state.loop_mode_enabled;
        let mut report = FireReport::new();

        if enable {
            self.cfg_mode(&mut report);
            self.wire_in(&mut report, "AUTOISP_BRT_EN", AUTOISP_BRT_EN, 1);
            self.reset_auto_isp_profile(&mut report, trigger, PROFILE0_BRIGHTNESS_AUTO);
            self.start_mode(&mut report);
            report.record(self.set_als_enabled(true));
        } else {
            report.record(self.set_als_enabled(false));
            self.cfg_mode(&mut report);
            self.wire_in(&mut report, "AUTOISP_BRT_EN", AUTOISP_BRT_EN, 0);
            self.reset_auto_isp_profile(&mut report, trigger, PROFILE0_BRIGHTNESS);
            self.start_mode(&mut report);
        }
        report.into_result("set auto ISP enabled")
    }

    /// Whether automatic brightness profiles are enabled.
    pub fn is_auto_isp_enabled(&self) -> bool {
        self.state.auto_isp_enabled
    }

    /// Set the brightness threshold `num` (1-3) that switches between profiles.
    pub fn set_isp_threshold(&mut self, value: u32, num: usize) -> Result<(), ControllerError> {
        if !(1..=3).contains(&num) {
            return self.options.reject("ISP threshold index", num as i64, 1, 3);
        }
        self.state.isp_thresholds[num - 1] = value;
        let mut report = FireReport::new();
        self.write_target(&mut report, "AUTOISP_BRT_THRES", AUTOISP_BRT_THRES[num - 1], value);
        report.into_result("set ISP threshold")
    }

    /// Set the BIAS_BRT_I value of auto-ISP profile `num` (1-4).
    pub fn set_isp_brightness(&mut self, value: u32, num: usize) -> Result<(), ControllerError> {
        if !(1..=4).contains(&num) {
            return self.options.reject("ISP brightness index", num as i64, 1, 4);
        }
        self.state.isp_brightness[num - 1] = value;
        let mut report = FireReport::new();
        self.wire_in(&mut report, "AUTOISP_PROFILE_ADDR", AUTOISP_PROFILE_ADDR, (num - 1) as u32);
        self.write_target(&mut report, "BIAS_BRT_I", BIAS_BRT_I, value);
        report.into_result("set ISP brightness")
    }

    // -------------------------------------------------------------------------
    // Data
    // -------------------------------------------------------------------------

    /// Read the next chunk of MIPI data into `buffer`.
    ///
    /// Returns `false` (with an empty buffer) if nothing was read.
    pub fn get_mipi_data(&mut self, buffer: &mut Vec<u8>) -> bool {
        buffer.resize(MAX_MIPI_FRAME_BYTES, 0);
        let read = self.transport.read_bulk(MIPI_ENDPOINT, MIPI_BLOCK_SIZE, buffer);
        if read > 0 {
            buffer.truncate(read as usize);
            return true;
        }
        if read < 0 {
            log_bulk_error(BulkReadError::from_code(read));
        }
        buffer.clear();
        false
    }
}

impl<T: RegisterTransport> SensorController for Celex5Controller<T> {
    fn open_sensor(&mut self) -> Result<(), ControllerError> {
        if !self.transport.connect() {
            warn!("CeleX5: transport could not be opened");
            return Err(ControllerError::TransportUnavailable);
        }
        info!("CeleX5: transport open, configuring sensor");
        self.configure_settings().into_result("configure settings")
    }

    fn close_sensor(&mut self) {
        self.transport.clear_buffers();
        self.transport.disconnect();
    }

    fn is_sensor_ready(&self) -> bool {
        self.transport.is_ready()
    }

    fn set_contrast(&mut self, value: u32) -> Result<(), ControllerError> {
        self.state.contrast = value.clamp(1, 3);
        let contrast = self.state.contrast;

        let mut report = FireReport::new();
        self.cfg_mode(&mut report);
        self.wire_in(&mut report, "COL_GAIN", COL_GAIN, contrast);
        self.start_mode(&mut report);
        report.into_result("set contrast")
    }

    fn get_contrast(&self) -> u32 {
        self.state.contrast
    }

    fn set_brightness(&mut self, value: u32) -> Result<(), ControllerError> {
        self.state.brightness = value;

        let mut report = FireReport::new();
        self.cfg_mode(&mut report);
        self.write_target(&mut report, "BIAS_BRT_I", BIAS_BRT_I, value);
        self.start_mode(&mut report);
        report.into_result("set brightness")
    }

    fn get_brightness(&self) -> u32 {
        self.state.brightness
    }

    fn set_threshold(&mut self, value: u32) -> Result<(), ControllerError> {
        self.state.threshold = value;
        let (low, high) = threshold_biases(value);

        let mut report = FireReport::new();
        self.cfg_mode(&mut report);
        self.write_target(&mut report, "BIAS_EVT_VL", BIAS_EVT_VL, low);
        self.write_target(&mut report, "BIAS_EVT_VH", BIAS_EVT_VH, high);
        self.start_mode(&mut report);
        report.into_result("set threshold")
    }

    fn get_threshold(&self) -> u32 {
        self.state.threshold
    }

    /// Set the sensor clock. Supported rates are 20-100 MHz in 10 MHz steps.
    ///
    /// The cached rate is updated before the writes are issued, so
    /// [`get_clock_rate`](SensorController::get_clock_rate) reports the
    /// requested rate even if a write fails.
    fn set_clock_rate(&mut self, value: u32) -> Result<(), ControllerError> {
        let Some(dividers) = clock_dividers(value) else {
            return self.options.reject(
                "clock rate",
                value.into(),
                MIN_CLOCK_MHZ.into(),
                MAX_CLOCK_MHZ.into(),
            );
        };
        self.state.clock_rate = value;
        info!("CeleX5: clock rate {} MHz", value);

        let mut report = FireReport::new();
        self.cfg_mode(&mut report);

        self.pll(&mut report, false);
        self.wire_in(&mut report, "PLL_DIV_N", PLL_DIV_N, dividers.pll_div_n);
        self.wire_in(&mut report, "PLL_DIV_L", PLL_DIV_L, dividers.pll_div_l);
        self.wire_in(&mut report, "PLL_FOUT_DIV1", PLL_FOUT_DIV1, dividers.pll_fout_div1);
        self.wire_in(&mut report, "PLL_FOUT_DIV2", PLL_FOUT_DIV2, dividers.pll_fout_div2);
        self.pll(&mut report, true);

        self.mipi_lanes(&mut report, false);
        self.wire_in(&mut report, "MIPI_PLL_DIV_I", MIPI_PLL_DIV_I, dividers.mipi_pll_div_i);
        self.write_target(&mut report, "MIPI_PLL_DIV_N", MIPI_PLL_DIV_N, dividers.mipi_pll_div_n);
        self.mipi_lanes(&mut report, true);

        self.start_mode(&mut report);
        report.into_result("set clock rate")
    }

    fn get_clock_rate(&self) -> u32 {
        self.state.clock_rate
    }
}

impl<T: RegisterTransport> Drop for Celex5Controller<T> {
    fn drop(&mut self) {
        if self.transport.is_ready() {
            self.transport.clear_buffers();
            self.transport.disconnect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RegisterWrite;
    use crate::MockTransport;

    fn controller() -> Celex5Controller<MockTransport> {
        let manager = SequenceManager::celex5_builtin().unwrap();
        let mut sensor = Celex5Controller::new(MockTransport::new(), manager);
        sensor.open_sensor().unwrap();
        sensor.transport_mut().clear_history();
        sensor
    }

    fn w(address: u32, value: u32) -> RegisterWrite {
        RegisterWrite::new(address, value, 0xFF)
    }

    #[test]
    fn test_threshold_biases() {
        assert_eq!(threshold_biases(0), (512, 512));
        assert_eq!(threshold_biases(171), (341, 683));
        assert_eq!(threshold_biases(512), (0, 1023));
        assert_eq!(threshold_biases(1023), (0, 1023));
        for v in 0..=1023u32 {
            let (low, high) = threshold_biases(v);
            assert_eq!(low as i64, (512 - v as i64).clamp(0, 1023));
            assert_eq!(high as i64, (512 + v as i64).clamp(0, 1023));
        }
    }

    #[test]
    fn test_set_threshold_writes() {
        let mut sensor = controller();
        sensor.set_threshold(100).unwrap();
        assert_eq!(
            sensor.transport().writes(),
            &[
                w(93, 0),
                w(90, 1),
                w(2, 412 >> 8),
                w(3, 412 & 0xFF),
                w(6, 612 >> 8),
                w(7, 612 & 0xFF),
                w(90, 0),
                w(93, 1),
            ]
        );
        assert_eq!(sensor.get_threshold(), 100);
    }

    #[test]
    fn test_contrast_is_clamped() {
        let mut sensor = controller();
        sensor.set_contrast(0).unwrap();
        assert_eq!(sensor.get_contrast(), 1);
        sensor.set_contrast(9).unwrap();
        assert_eq!(sensor.get_contrast(), 3);
        assert_eq!(sensor.transport().values_written_to(COL_GAIN), vec![1, 3]);
    }

    #[test]
    fn test_enter_cfg_mode_is_not_memoized() {
        let mut sensor = controller();
        sensor.enter_cfg_mode().unwrap();
        sensor.enter_cfg_mode().unwrap();
        assert_eq!(sensor.transport().writes(), &[w(93, 0), w(90, 1), w(93, 0), w(90, 1)]);
    }

    #[test]
    fn test_clock_rate_table() {
        let mut sensor = controller();
        for mhz in (20..=100).step_by(10) {
            sensor.set_clock_rate(mhz).unwrap();
            assert_eq!(sensor.get_clock_rate(), mhz);
        }
        let dividers = clock_dividers(50).unwrap();
        assert_eq!(dividers.pll_div_n, 15);
        assert_eq!(dividers.mipi_pll_div_n, 144);
    }

    #[test]
    fn test_clock_rate_write_order() {
        let mut sensor = controller();
        sensor.set_clock_rate(20).unwrap();
        let mut expected = vec![w(93, 0), w(90, 1), w(150, 0), w(159, 12), w(160, 2), w(151, 3), w(152, 3), w(150, 1)];
        expected.extend((139..=144).map(|lane| w(lane, 0)));
        expected.extend([w(113, 3), w(115, 0), w(114, 180)]);
        expected.extend((139..=144).map(|lane| w(lane, 1)));
        expected.extend([w(90, 0), w(93, 1)]);
        assert_eq!(sensor.transport().writes(), expected.as_slice());
    }

    #[test]
    fn test_clock_rate_out_of_range() {
        let mut sensor = controller();
        for bad in [0, 10, 25, 110, 160] {
            assert!(matches!(
                sensor.set_clock_rate(bad),
                Err(ControllerError::ParameterOutOfRange { parameter: "clock rate", .. })
            ));
        }
        assert_eq!(sensor.get_clock_rate(), 100);
        assert!(sensor.transport().writes().is_empty());
    }

    #[test]
    fn test_clock_rate_legacy_mode_ignores_silently() {
        let manager = SequenceManager::celex5_builtin().unwrap();
        let mut sensor = Celex5Controller::with_options(MockTransport::new(), manager, ControllerOptions::legacy());
        assert!(sensor.set_clock_rate(15).is_ok());
        assert_eq!(sensor.get_clock_rate(), 100);
        assert!(sensor.transport().writes().is_empty());
    }

    #[test]
    fn test_clock_rate_state_is_optimistic() {
        let manager = SequenceManager::celex5_builtin().unwrap();
        let mut sensor = Celex5Controller::new(MockTransport::new().fail_all_writes(), manager);
        assert!(matches!(
            sensor.set_clock_rate(60),
            Err(ControllerError::ConfigurationFailed { recipe: "set clock rate", .. })
        ));
        assert_eq!(sensor.get_clock_rate(), 60);
    }

    #[test]
    fn test_auto_isp_enable_without_loop_mode() {
        let mut sensor = controller();
        assert!(!sensor.is_loop_mode_enabled());
        sensor.set_auto_isp_enabled(true).unwrap();

        let writes = sensor.transport().writes_excluding(ALS_CONTROL);
        assert_eq!(
            writes,
            vec![
                w(93, 0),
                w(90, 1),
                w(221, 1),
                w(223, 0),
                w(220, 0),
                w(233, 1500 >> 8),
                w(232, 1500 & 0xFF),
                w(22, 0),
                w(23, 80),
                w(90, 0),
                w(93, 1),
            ]
        );
        // Every write is bracketed by ALS off/on, and the sideband ends enabled.
        assert_eq!(sensor.transport().values_written_to(ALS_CONTROL).last(), Some(&ALS_ENABLE));
        assert_eq!(sensor.transport().waits().len(), writes.len());
    }

    #[test]
    fn test_auto_isp_disable_with_loop_mode() {
        let mut sensor = controller();
        sensor.set_loop_mode_enabled(true).unwrap();
        sensor.set_auto_isp_enabled(true).unwrap();
        sensor.transport_mut().clear_history();

        sensor.set_auto_isp_enabled(false).unwrap();
        let writes = sensor.transport().writes();
        assert_eq!(writes[0], w(ALS_CONTROL, ALS_DISABLE));
        assert_eq!(sensor.transport().values_written_to(AUTOISP_TRIGGER), vec![1]);
        assert_eq!(sensor.transport().values_written_to(23), vec![140]);
        assert_eq!(sensor.transport().values_written_to(ALS_CONTROL), vec![ALS_DISABLE]);
    }

    #[test]
    fn test_fixed_mode() {
        let mut sensor = controller();
        sensor.set_sensor_fixed_mode(Celex5Mode::FullOpticalFlowM).unwrap();
        assert_eq!(sensor.get_sensor_fixed_mode(), Celex5Mode::FullOpticalFlowM);
        assert_eq!(sensor.transport().values_written_to(SENSOR_MODE_1), vec![6]);
        assert_eq!(sensor.transport().values_written_to(AUTOISP_TRIGGER), vec![0]);
        assert_eq!(sensor.transport().clear_count(), 1);
    }

    #[test]
    fn test_loop_modes() {
        let mut sensor = controller();
        assert_eq!(sensor.get_sensor_loop_mode(1), Some(Celex5Mode::FullPicture));
        assert_eq!(sensor.get_sensor_loop_mode(0), None);
        assert_eq!(sensor.get_sensor_loop_mode(4), None);

        sensor.set_sensor_loop_mode(Celex5Mode::EventIntensity, 3).unwrap();
        assert_eq!(sensor.get_sensor_loop_mode(3), Some(Celex5Mode::EventIntensity));
        assert_eq!(sensor.transport().values_written_to(55), vec![2]);

        assert!(matches!(
            sensor.set_sensor_loop_mode(Celex5Mode::FullPicture, 4),
            Err(ControllerError::ParameterOutOfRange { parameter: "loop slot", .. })
        ));
    }

    #[test]
    fn test_isp_profiles() {
        let mut sensor = controller();
        sensor.set_isp_brightness(160, 3).unwrap();
        assert_eq!(sensor.transport().writes(), &[w(220, 2), w(22, 0), w(23, 160)]);
        assert_eq!(sensor.get_state().isp_brightness[2], 160);

        sensor.set_isp_threshold(700, 2).unwrap();
        assert_eq!(sensor.transport().values_written_to(237), vec![700 >> 8]);
        assert_eq!(sensor.get_state().isp_thresholds, [60, 700, 2500]);

        assert!(sensor.set_isp_threshold(1, 4).is_err());
        assert!(sensor.set_isp_brightness(1, 0).is_err());
    }

    #[test]
    fn test_picture_number_and_event_duration() {
        let mut sensor = controller();
        sensor.set_picture_number(5, Celex5Mode::FullOpticalFlowS).unwrap();
        assert_eq!(sensor.transport().values_written_to(PICTURE_NUMBER_2), vec![5]);

        sensor.transport_mut().clear_history();
        sensor.set_picture_number(5, Celex5Mode::EventAddressOnly).unwrap();
        assert!(sensor.transport().writes().is_empty());

        sensor.set_event_duration(0x2A5).unwrap();
        assert_eq!(sensor.transport().values_written_to(58), vec![0x2]);
        assert_eq!(sensor.transport().values_written_to(57), vec![0xA5]);
    }

    #[test]
    fn test_write_register_split_and_single() {
        let mut sensor = controller();
        sensor.write_register(115, -1, 114, 300).unwrap();
        sensor.write_register(45, -1, -1, 2).unwrap();
        sensor.write_register(1, 2, 3, 7).unwrap();
        assert_eq!(sensor.transport().writes(), &[w(115, 1), w(114, 44), w(45, 2)]);
        assert!(sensor.write_register(-1, -1, -1, 0).is_err());
    }

    #[test]
    fn test_als_failures_are_reported() {
        let manager = SequenceManager::celex5_builtin().unwrap();
        let mut sensor = Celex5Controller::new(MockTransport::new().fail_writes_to(ALS_CONTROL), manager);
        sensor.open_sensor().unwrap_err();
        sensor.set_auto_isp_enabled(true).unwrap_err();

        match sensor.set_contrast(2) {
            Err(ControllerError::ConfigurationFailed { recipe, failures }) => {
                assert_eq!(recipe, "set contrast");
                assert_eq!(failures.len(), 10);
                assert!(failures.iter().all(|f| f.address == ALS_CONTROL));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(sensor.get_contrast(), 2);
    }

    #[test]
    fn test_get_mipi_data() {
        let mut sensor = controller();
        sensor.transport_mut().push_bulk_data(vec![1, 2, 3]);
        sensor.transport_mut().push_bulk_error(BulkReadError::INVALID_BLOCK_SIZE);

        let mut buffer = Vec::new();
        assert!(sensor.get_mipi_data(&mut buffer));
        assert_eq!(buffer, vec![1, 2, 3]);
        assert!(!sensor.get_mipi_data(&mut buffer));
        assert!(buffer.is_empty());
        assert!(!sensor.get_mipi_data(&mut buffer));
    }
}
