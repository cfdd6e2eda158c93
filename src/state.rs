//! Controller state snapshots.

use crate::modes::{Celex4Mode, Celex5Mode};
use std::collections::BTreeMap;

/// Cached state of a CeleX4 controller.
///
/// Use [`Celex4Controller::get_state`](crate::Celex4Controller::get_state) to obtain it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Celex4State {
    /// Current operating mode.
    pub mode: Celex4Mode,
    /// Sensor clock in MHz, as last requested.
    pub clock_rate: u32,
    /// Full-picture frame time in milliseconds.
    pub full_pic_frame_time: u32,
    /// Event frame time in milliseconds.
    pub event_frame_time: u32,
    /// Full-picture + event frame time in milliseconds.
    pub fe_frame_time: u32,
    /// Last value written to each shown bias slider, by slider name.
    pub biases: BTreeMap<String, u32>,
}

impl Default for Celex4State {
    fn default() -> Self {
        Self {
            mode: Celex4Mode::Event,
            clock_rate: 25,
            full_pic_frame_time: 20,
            event_frame_time: 60,
            fe_frame_time: 60,
            biases: BTreeMap::new(),
        }
    }
}

impl Celex4State {
    /// Cached value of a bias slider, 0 if unknown.
    pub fn bias(&self, name: &str) -> u32 {
        self.biases.get(name).copied().unwrap_or(0)
    }
}

/// Cached state of a CeleX5 controller.
///
/// Use [`Celex5Controller::get_state`](crate::Celex5Controller::get_state) to obtain it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Celex5State {
    /// Mode used when loop mode is disabled.
    pub fixed_mode: Celex5Mode,
    /// Modes of loop slots 1-3.
    pub loop_modes: [Celex5Mode; 3],
    /// Whether the sensor cycles through the loop slots.
    pub loop_mode_enabled: bool,
    /// Sensor clock in MHz, as last requested.
    pub clock_rate: u32,
    /// Column gain (1-3).
    pub contrast: u32,
    /// BIAS_BRT_I value.
    pub brightness: u32,
    /// Event threshold around the 512 reference.
    pub threshold: u32,
    /// Whether automatic brightness profiles are active.
    pub auto_isp_enabled: bool,
    /// Brightness thresholds switching between the auto-ISP profiles.
    pub isp_thresholds: [u32; 3],
    /// BIAS_BRT_I value of each auto-ISP profile.
    pub isp_brightness: [u32; 4],
    /// Auto-ISP refresh time.
    pub auto_isp_refresh_time: u32,
}

impl Default for Celex5State {
    fn default() -> Self {
        Self {
            fixed_mode: Celex5Mode::EventAddressOnly,
            loop_modes: [
                Celex5Mode::FullPicture,
                Celex5Mode::EventAddressOnly,
                Celex5Mode::FullOpticalFlowS,
            ],
            loop_mode_enabled: false,
            clock_rate: 100,
            contrast: 1,
            brightness: 140,
            threshold: 171,
            auto_isp_enabled: false,
            isp_thresholds: [60, 500, 2500],
            isp_brightness: [100, 130, 150, 175],
            auto_isp_refresh_time: 80,
        }
    }
}
