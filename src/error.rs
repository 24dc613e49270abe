
use core::fmt;

use crate::frame::Payload;

/// MAC errors, generic over the underlying radio error (E)
#[derive(Debug, Clone, PartialEq)]
pub enum MacError<E> {
    /// A send is already pending, the payload is returned
    BufferFull(Payload),

    /// Invalid configuration
    Config(ConfigError),

    /// Wrapper for unhandled / underlying radio errors
    Radio(E),
}

impl <E> From<ConfigError> for MacError<E> {
    fn from(e: ConfigError) -> Self {
        MacError::Config(e)
    }
}

/// Configuration errors, reported when the timing model is constructed
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigError {
    /// Bits per second must be non-zero
    BitRate,
    /// Simulation steps per second must be non-zero
    StepRate,
    /// Cycle length must be non-zero
    CycleLength,
    /// Frame lengths must be non-zero
    FrameLength,
    /// At least one data attempt is required
    DataRetries,
    /// Carrier sensing does not fit within the cycle
    CarrierSense{ carrier_sense: u64, cycle: u64 },
    /// The preamble train needed to cover a cycle exceeds the retry counter
    Preambles(u64),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::BitRate => write!(f, "bits per second must be non-zero"),
            ConfigError::StepRate => write!(f, "steps per second must be non-zero"),
            ConfigError::CycleLength => write!(f, "cycle length must be non-zero"),
            ConfigError::FrameLength => write!(f, "frame lengths must be non-zero"),
            ConfigError::DataRetries => write!(f, "at least one data attempt is required"),
            ConfigError::CarrierSense{ carrier_sense, cycle } => write!(f,
                "carrier sense duration ({} steps) must be shorter than the cycle ({} steps)",
                carrier_sense, cycle),
            ConfigError::Preambles(n) => write!(f, "{} preambles per cycle exceeds the retry counter", n),
        }
    }
}

/// Payload construction errors
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PayloadError {
    /// Payload exceeds the maximum length
    TooLong(usize),
}
