//! Sensor operating mode definitions.

use std::fmt;

// =============================================================================
// CeleX4 Modes
// =============================================================================

/// Operating mode of a CeleX4 sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Celex4Mode {
    /// Full-frame pictures only.
    FullPicture,
    /// Events only.
    #[default]
    Event,
    /// Alternating full pictures and events.
    FullPicEvent,
}

impl Celex4Mode {
    /// Numeric mode id used by the vendor API.
    pub fn id(self) -> i32 {
        match self {
            Self::FullPicture => 0,
            Self::Event => 1,
            Self::FullPicEvent => 2,
        }
    }

    /// Parse a vendor mode id.
    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            0 => Some(Self::FullPicture),
            1 => Some(Self::Event),
            2 => Some(Self::FullPicEvent),
            _ => None,
        }
    }
}

impl fmt::Display for Celex4Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FullPicture => "Full Picture",
            Self::Event => "Event",
            Self::FullPicEvent => "Full Picture + Event",
        };
        f.write_str(name)
    }
}

// =============================================================================
// CeleX5 Modes
// =============================================================================

/// Operating mode of a CeleX5 sensor.
///
/// The discriminant is the value written to the sensor mode registers
/// (53 for fixed mode and loop slot 1, 54 and 55 for loop slots 2 and 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Celex5Mode {
    /// Mode A: event addresses only.
    #[default]
    EventAddressOnly = 0,
    /// Mode B: events with optical-flow timestamps.
    EventOpticalFlow = 1,
    /// Mode C: events with intensity.
    EventIntensity = 2,
    /// Mode D: full pictures.
    FullPicture = 3,
    /// Mode E: full-frame optical flow, single.
    FullOpticalFlowS = 4,
    /// Mode G: full-frame optical flow, multiple.
    FullOpticalFlowM = 6,
}

impl Celex5Mode {
    /// Value written to the mode register.
    pub fn register_value(self) -> u32 {
        self as u32
    }

    /// Parse a mode register value.
    pub fn from_register(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::EventAddressOnly),
            1 => Some(Self::EventOpticalFlow),
            2 => Some(Self::EventIntensity),
            3 => Some(Self::FullPicture),
            4 => Some(Self::FullOpticalFlowS),
            6 => Some(Self::FullOpticalFlowM),
            _ => None,
        }
    }
}

impl fmt::Display for Celex5Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::EventAddressOnly => "Event Address Only",
            Self::EventOpticalFlow => "Event Optical Flow",
            Self::EventIntensity => "Event Intensity",
            Self::FullPicture => "Full Picture",
            Self::FullOpticalFlowS => "Full Optical Flow S",
            Self::FullOpticalFlowM => "Full Optical Flow M",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_celex5_register_values() {
        for mode in [
            Celex5Mode::EventAddressOnly,
            Celex5Mode::EventOpticalFlow,
            Celex5Mode::EventIntensity,
            Celex5Mode::FullPicture,
            Celex5Mode::FullOpticalFlowS,
            Celex5Mode::FullOpticalFlowM,
        ] {
            assert_eq!(Celex5Mode::from_register(mode.register_value()), Some(mode));
        }
        assert_eq!(Celex5Mode::FullOpticalFlowM.register_value(), 6);
        assert_eq!(Celex5Mode::from_register(5), None);
    }

    #[test]
    fn test_celex4_ids() {
        assert_eq!(Celex4Mode::from_id(Celex4Mode::FullPicEvent.id()), Some(Celex4Mode::FullPicEvent));
        assert_eq!(Celex4Mode::from_id(-1), None);
        assert_eq!(Celex4Mode::default(), Celex4Mode::Event);
    }
}
