//! Unified error types for the reach rig.
//!
//! A single `Error` enum that every subsystem converts into, so the
//! binary and the sequencer handle failures uniformly.  All variants are
//! `Copy` and allocation-free.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The session configuration is invalid.  Raised before any hardware
    /// or session state exists.
    Config(ConfigError),
    /// A backend could not claim or initialise its sensor/actuator lines.
    HardwareInit(&'static str),
    /// A sensor read or actuator write failed mid-session.
    Hardware(HardwareError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::HardwareInit(msg) => write!(f, "hardware init: {msg}"),
            Self::Hardware(e) => write!(f, "hardware: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Only one or two spouts exist on the apparatus.
    InvalidSpoutCount(u8),
    /// The ITI lower bound exceeds the upper bound.
    InvalidItiRange { min_ms: u64, max_ms: u64 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSpoutCount(n) => write!(f, "spout_count must be 1 or 2, got {n}"),
            Self::InvalidItiRange { min_ms, max_ms } => {
                write!(f, "iti minimum {min_ms} ms exceeds maximum {max_ms} ms")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Hardware errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareError {
    /// Reading an input line failed.
    GpioRead { pin: u8 },
    /// Driving an output line failed.
    GpioWrite { pin: u8 },
    /// A sensor listener thread died or could not be spawned.
    Listener,
}

impl fmt::Display for HardwareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GpioRead { pin } => write!(f, "GPIO {pin} read failed"),
            Self::GpioWrite { pin } => write!(f, "GPIO {pin} write failed"),
            Self::Listener => write!(f, "sensor listener thread failed"),
        }
    }
}

impl std::error::Error for HardwareError {}

impl From<HardwareError> for Error {
    fn from(e: HardwareError) -> Self {
        Self::Hardware(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
