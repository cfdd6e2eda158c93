//! Command, sequence and slider definitions, and how they are fired.

use crate::transport::{RegisterTransport, RegisterWrite};
use log::{debug, trace, warn};
use std::fmt;

/// Sentinel used by the description format for an absent address.
pub const ABSENT_ADDRESS: i32 = -1;

// =============================================================================
// Register Target
// =============================================================================

/// Where a command's value lands.
///
/// Built once from the raw `(high, middle, low)` address triple of the
/// description, where `-1` marks an absent address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterTarget {
    /// The whole value goes to one address.
    Single(u32),
    /// Bits `[15:8]` go to `high`, bits `[7:0]` go to `low`.
    Split {
        /// Address receiving `value >> 8`.
        high: u32,
        /// Address receiving `value & 0xFF`.
        low: u32,
    },
    /// Three-address registers. No supported device writes these.
    Wide {
        /// High address.
        high: u32,
        /// Middle address.
        middle: u32,
        /// Low address.
        low: u32,
    },
}

impl RegisterTarget {
    /// Resolve a raw address triple. Returns `None` if `high` is absent.
    pub fn from_raw(high: i32, middle: i32, low: i32) -> Option<Self> {
        if high < 0 {
            return None;
        }
        let high = high as u32;
        Some(match (middle, low) {
            (_, l) if l < 0 => Self::Single(high),
            (m, l) if m < 0 => Self::Split {
                high,
                low: l as u32,
            },
            (m, l) => Self::Wide {
                high,
                middle: m as u32,
                low: l as u32,
            },
        })
    }

    /// The raw `(high, middle, low)` triple, with `-1` for absent addresses.
    pub fn to_raw(self) -> (i32, i32, i32) {
        match self {
            Self::Single(high) => (high as i32, ABSENT_ADDRESS, ABSENT_ADDRESS),
            Self::Split { high, low } => (high as i32, ABSENT_ADDRESS, low as i32),
            Self::Wide { high, middle, low } => (high as i32, middle as i32, low as i32),
        }
    }

    /// Decompose `value` into the transport writes this target needs.
    ///
    /// `mask` applies to single-address writes only. Split bytes are always
    /// masked `0xFF`. Wide targets produce no writes.
    pub fn writes(self, value: u32, mask: u32) -> impl Iterator<Item = RegisterWrite> {
        let pair = match self {
            Self::Single(address) => [Some(RegisterWrite::new(address, value, mask)), None],
            Self::Split { high, low } => [
                Some(RegisterWrite::new(high, value >> 8, 0xFF)),
                Some(RegisterWrite::new(low, value & 0xFF, 0xFF)),
            ],
            Self::Wide { .. } => [None, None],
        };
        pair.into_iter().flatten()
    }
}

// =============================================================================
// Step Failures
// =============================================================================

/// A register write the transport rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    /// Name of the command or register being written.
    pub step: String,
    /// Address that failed.
    pub address: u32,
    /// Value that was being written.
    pub value: u32,
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (address {} <- {})", self.step, self.address, self.value)
    }
}

/// Outcome of a multi-step recipe.
///
/// Recipes never stop at the first failure. Every step is attempted and the
/// failures are collected here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FireReport {
    attempted: usize,
    failures: Vec<StepFailure>,
}

impl FireReport {
    /// Create an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one step.
    pub fn record(&mut self, outcome: Result<(), StepFailure>) {
        self.attempted += 1;
        if let Err(failure) = outcome {
            self.failures.push(failure);
        }
    }

    /// Number of steps attempted.
    pub fn attempted(&self) -> usize {
        self.attempted
    }

    /// Failed steps, in execution order.
    pub fn failures(&self) -> &[StepFailure] {
        &self.failures
    }

    /// Whether every step succeeded.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Convert into a `Result`, naming the recipe on failure.
    pub fn into_result(self, recipe: &'static str) -> Result<(), crate::ControllerError> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(crate::ControllerError::ConfigurationFailed {
                recipe,
                failures: self.failures,
            })
        }
    }
}

// =============================================================================
// Command
// =============================================================================

/// A single named register write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command name, unique within a description.
    pub name: String,
    /// Destination address(es).
    pub target: RegisterTarget,
    /// Value written when fired without an override.
    pub value: u32,
    /// Lower bound for `value`, if any.
    pub min: Option<u32>,
    /// Upper bound for `value`, if any.
    pub max: Option<u32>,
    /// UI step size.
    pub step: u32,
    /// Mask applied to single-address writes.
    pub mask: u32,
    /// Delay after the write, in milliseconds.
    pub settle_ms: u64,
}

impl Command {
    /// Whether `value` lies within this command's bounds.
    pub fn accepts(&self, value: u32) -> bool {
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max)
    }

    /// Write the stored value.
    pub fn fire<T: RegisterTransport + ?Sized>(&self, transport: &mut T) -> Result<(), StepFailure> {
        self.fire_with_value(transport, self.value)
    }

    /// Write `value` instead of the stored value.
    ///
    /// Both halves of a split write are attempted even if the first fails.
    pub fn fire_with_value<T: RegisterTransport + ?Sized>(
        &self,
        transport: &mut T,
        value: u32,
    ) -> Result<(), StepFailure> {
        if let RegisterTarget::Wide { .. } = self.target {
            warn!("{}: three-address registers are not writable, skipped", self.name);
            return Ok(());
        }

        let mut failure = None;
        for write in self.target.writes(value, self.mask) {
            trace!(
                "{}: address={:#x} value={:#x} mask={:#x}",
                self.name, write.address, write.value, write.mask
            );
            if !transport.write_register(write.address, write.value, write.mask) {
                warn!("{}: write to address {} failed", self.name, write.address);
                failure.get_or_insert(StepFailure {
                    step: self.name.clone(),
                    address: write.address,
                    value: write.value,
                });
            }
        }
        if self.settle_ms > 0 {
            transport.wait(self.settle_ms);
        }

        match failure {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }
}

// =============================================================================
// Sequence
// =============================================================================

/// A named, ordered list of commands executed as one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    /// Sequence name, unique within a description.
    pub name: String,
    /// Commands in execution order.
    pub commands: Vec<Command>,
}

impl Sequence {
    /// Fire every command in order.
    ///
    /// A failing command does not stop the sequence; the report lists every
    /// failure.
    pub fn fire<T: RegisterTransport + ?Sized>(&self, transport: &mut T) -> FireReport {
        debug!("firing sequence '{}' ({} commands)", self.name, self.commands.len());
        let mut report = FireReport::new();
        for command in &self.commands {
            report.record(command.fire(transport));
        }
        report
    }
}

// =============================================================================
// Slider
// =============================================================================

/// A named, value-parameterised bias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slider {
    /// Slider name, unique within a description.
    pub name: String,
    /// Current (initial) value.
    pub value: u32,
    /// Whether the slider is user-visible.
    pub shown: bool,
    /// Whether the slider belongs to the advanced bias set.
    pub advanced: bool,
    /// Command replayed with the slider's value.
    pub template: Command,
}

impl Slider {
    /// Fire the template with the slider's current value.
    pub fn fire<T: RegisterTransport + ?Sized>(&self, transport: &mut T) -> Result<(), StepFailure> {
        self.template.fire_with_value(transport, self.value)
    }

    /// Fire the template with `value`. The slider's own value is not changed.
    pub fn fire_with_arg<T: RegisterTransport + ?Sized>(
        &self,
        transport: &mut T,
        value: u32,
    ) -> Result<(), StepFailure> {
        self.template.fire_with_value(transport, value)
    }
}
