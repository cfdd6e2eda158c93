//! Error types for the CeleX sensor controllers.

use crate::sequence::StepFailure;

/// Errors that can occur when driving a CeleX sensor.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// The transport could not be opened, or reports itself as not ready.
    #[error("Transport unavailable: device not connected or could not be opened")]
    TransportUnavailable,

    /// A multi-step recipe finished with one or more failed register writes.
    #[error("{recipe} finished with {} failed step(s)", failures.len())]
    ConfigurationFailed {
        /// The recipe that was being executed.
        recipe: &'static str,
        /// Every step that failed, in execution order.
        failures: Vec<StepFailure>,
    },

    /// A single register write was rejected by the transport.
    #[error("Register write failed: {0}")]
    StepFailed(StepFailure),

    /// No sequence or slider with this name exists in the loaded description.
    #[error("Sequence not defined: {0}")]
    SequenceNotDefined(String),

    /// A parameter was outside the range supported by the device.
    #[error("Invalid value {value} for {parameter} (expected {min}-{max})")]
    ParameterOutOfRange {
        /// The parameter name.
        parameter: &'static str,
        /// The invalid value provided.
        value: i64,
        /// Minimum allowed value.
        min: i64,
        /// Maximum allowed value.
        max: i64,
    },

    /// The configuration description could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Failed to load the transport's shared library.
    #[error("Failed to load library: {0}")]
    Library(#[from] libloading::Error),

    /// An I/O error occurred (e.g., the bitfile is missing).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while loading a configuration description.
///
/// Only whole-document failures surface here. Malformed individual entries
/// are skipped and logged by the loader.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The description file could not be read.
    #[error("Failed to read description: {0}")]
    Io(#[from] std::io::Error),

    /// The description is not valid TOML.
    #[error("Failed to parse description: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Classified failure of a bulk pipe read.
///
/// The transport reports failures as negative codes. They are logged
/// distinctly, but callers only need to know that the read failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BulkReadError {
    /// The device is not connected or not ready.
    #[error("Device not ready")]
    NotReady,

    /// The requested block size is not supported by the endpoint.
    #[error("Block size not supported (code {0})")]
    InvalidBlockSize(i64),

    /// The device firmware does not support block pipe transfers.
    #[error("Unsupported feature (code {0})")]
    UnsupportedFeature(i64),

    /// Any other transfer failure.
    #[error("Transfer failed (code {0})")]
    TransferFailed(i64),
}

impl BulkReadError {
    /// FrontPanel error code for an invalid block size.
    pub const INVALID_BLOCK_SIZE: i64 = -10;
    /// FrontPanel error code for an unsupported feature.
    pub const UNSUPPORTED_FEATURE: i64 = -15;

    /// Classify a negative transfer result code.
    pub fn from_code(code: i64) -> Self {
        match code {
            Self::INVALID_BLOCK_SIZE => Self::InvalidBlockSize(code),
            Self::UNSUPPORTED_FEATURE => Self::UnsupportedFeature(code),
            _ => Self::TransferFailed(code),
        }
    }
}
