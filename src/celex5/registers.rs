//! CeleX5 sensor register map.
//!
//! Single-byte registers are plain addresses. 10-bit values are split over a
//! high and a low byte register and are given as [`RegisterTarget::Split`].

use crate::sequence::RegisterTarget;

// Sensor core biases
pub const BIAS_EVT_VL: RegisterTarget = RegisterTarget::Split { high: 2, low: 3 };
pub const BIAS_EVT_VH: RegisterTarget = RegisterTarget::Split { high: 6, low: 7 };
pub const BIAS_BRT_I: RegisterTarget = RegisterTarget::Split { high: 22, low: 23 };
pub const COL_GAIN: u32 = 45;

// Operation mode control
/// Loop slot `n` (1-3) lives at `LOOP_MODE_BASE + n`; slot 1 doubles as the fixed mode.
pub const LOOP_MODE_BASE: u32 = 52;
pub const SENSOR_MODE_1: u32 = 53;
pub const EVENT_DURATION: RegisterTarget = RegisterTarget::Split { high: 58, low: 57 };
pub const PICTURE_NUMBER_1: u32 = 59;
pub const PICTURE_NUMBER_2: u32 = 60;
pub const PICTURE_NUMBER_4: u32 = 62;
pub const SENSOR_MODE_SELECT: u32 = 64;

// Configuration handshake
pub const CFG_EN: u32 = 90;
pub const START_EN: u32 = 93;
pub const PADDR_EN: u32 = 94;

// MIPI
pub const MIPI_PLL_DIV_I: u32 = 113;
pub const MIPI_PLL_DIV_N: RegisterTarget = RegisterTarget::Split { high: 115, low: 114 };
pub const MIPI_LANES: std::ops::RangeInclusive<u32> = 139..=144;

// PLL
pub const PLL_PD_B: u32 = 150;
pub const PLL_FOUT_DIV1: u32 = 151;
pub const PLL_FOUT_DIV2: u32 = 152;
pub const PLL_DIV_N: u32 = 159;
pub const PLL_DIV_L: u32 = 160;

// Auto ISP
pub const AUTOISP_PROFILE_ADDR: u32 = 220;
pub const AUTOISP_BRT_EN: u32 = 221;
pub const AUTOISP_TEM_EN: u32 = 222;
pub const AUTOISP_TRIGGER: u32 = 223;
pub const AUTOISP_REFRESH_TIME: RegisterTarget = RegisterTarget::Split { high: 225, low: 224 };
pub const AUTOISP_BRT_VALUE: RegisterTarget = RegisterTarget::Split { high: 233, low: 232 };
pub const AUTOISP_BRT_THRES: [RegisterTarget; 3] = [
    RegisterTarget::Split { high: 235, low: 234 },
    RegisterTarget::Split { high: 237, low: 236 },
    RegisterTarget::Split { high: 239, low: 238 },
];

/// Ambient-light-sensor sideband control: 0 enables reads, 2 disables them.
pub const ALS_CONTROL: u32 = 254;
pub const ALS_ENABLE: u32 = 0;
pub const ALS_DISABLE: u32 = 2;

/// Initial auto-ISP brightness value.
pub const AUTOISP_INITIAL_BRIGHTNESS: u32 = 1500;
/// BIAS_BRT_I written to profile 0 when auto-ISP is off.
pub const PROFILE0_BRIGHTNESS: u32 = 140;
/// BIAS_BRT_I written to profile 0 when auto-ISP is on.
pub const PROFILE0_BRIGHTNESS_AUTO: u32 = 80;
/// MIPI_PLL_DIV_N written after the MIPI parameter group on open.
pub const MIPI_PLL_DIV_N_DEFAULT: u32 = 120;

/// PLL and MIPI dividers for one supported clock rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockDividers {
    /// PLL_DIV_N (register 159).
    pub pll_div_n: u32,
    /// PLL_DIV_L (register 160).
    pub pll_div_l: u32,
    /// PLL_FOUT_DIV1 (register 151).
    pub pll_fout_div1: u32,
    /// PLL_FOUT_DIV2 (register 152).
    pub pll_fout_div2: u32,
    /// MIPI_PLL_DIV_I (register 113).
    pub mipi_pll_div_i: u32,
    /// MIPI_PLL_DIV_N (registers 115/114).
    pub mipi_pll_div_n: u32,
}

const fn dividers(n: u32, l: u32, div1: u32, div2: u32, mipi_i: u32, mipi_n: u32) -> ClockDividers {
    ClockDividers {
        pll_div_n: n,
        pll_div_l: l,
        pll_fout_div1: div1,
        pll_fout_div2: div2,
        mipi_pll_div_i: mipi_i,
        mipi_pll_div_n: mipi_n,
    }
}

pub const MIN_CLOCK_MHZ: u32 = 20;
pub const MAX_CLOCK_MHZ: u32 = 100;
pub const CLOCK_STEP_MHZ: u32 = 10;

/// Dividers for 20, 30, ..., 100 MHz, indexed by `mhz / 10 - 2`.
pub const CLOCK_TABLE: [ClockDividers; 9] = [
    dividers(12, 2, 3, 3, 3, 180),
    dividers(18, 3, 2, 2, 2, 180),
    dividers(12, 2, 1, 3, 3, 180),
    dividers(15, 2, 1, 3, 3, 144),
    dividers(18, 2, 1, 3, 2, 180),
    dividers(21, 2, 1, 3, 2, 153),
    dividers(12, 2, 0, 3, 3, 180),
    dividers(18, 3, 0, 2, 2, 180),
    dividers(15, 2, 0, 3, 3, 144),
];

/// Look up the dividers for a clock rate. `None` if the rate is unsupported.
pub fn clock_dividers(mhz: u32) -> Option<ClockDividers> {
    if !(MIN_CLOCK_MHZ..=MAX_CLOCK_MHZ).contains(&mhz) || mhz % CLOCK_STEP_MHZ != 0 {
        return None;
    }
    CLOCK_TABLE.get((mhz / CLOCK_STEP_MHZ - 2) as usize).copied()
}
