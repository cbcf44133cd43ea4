//! Sensor identities, timepoints, and raw input edges.
//!
//! Every event in the system carries the identity of the sensor that
//! produced it, so nothing downstream has to map pin numbers back to
//! spouts or paws.

pub mod debounce;

use core::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Timepoints
// ---------------------------------------------------------------------------

/// Wall-clock instant in seconds since the Unix epoch.
///
/// Taken at the moment an edge is observed, never at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timepoint(pub f64);

impl Timepoint {
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0.0, |d| d.as_secs_f64());
        Self(secs)
    }

    pub fn as_secs(self) -> f64 {
        self.0
    }

    /// Milliseconds from `earlier` to `self` (negative if `earlier` is later).
    pub fn millis_since(self, earlier: Timepoint) -> f64 {
        (self.0 - earlier.0) * 1000.0
    }
}

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

/// Left or right paw rest.  Indices are fixed: 0 = left, 1 = right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Paw {
    Left = 0,
    Right = 1,
}

impl Paw {
    pub const BOTH: [Paw; 2] = [Paw::Left, Paw::Right];

    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Reach target index (0 or 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpoutId(pub u8);

impl SpoutId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// The other spout of a two-spout rig.
    pub const fn other(self) -> SpoutId {
        SpoutId(1 - self.0)
    }
}

impl fmt::Display for SpoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "spout {}", self.0)
    }
}

/// Push-button index (0 or 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ButtonId(pub u8);

impl ButtonId {
    pub const START: ButtonId = ButtonId(0);

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

// ---------------------------------------------------------------------------
// Raw inputs
// ---------------------------------------------------------------------------

/// A physical or simulated edge, before phase routing and debounce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawInput {
    /// Paw left its rest (falling edge on the paw sensor).
    PawLift(Paw),
    /// Spout touch sensor went high.
    SpoutTouch(SpoutId),
    /// Button pressed (falling edge, active-low).
    ButtonPress(ButtonId),
}

impl RawInput {
    /// Number of distinct debounce slots.
    pub const SLOTS: usize = 6;

    /// Debounce slot: one per physical sensor.
    pub const fn slot(self) -> usize {
        match self {
            Self::PawLift(p) => p.index(),
            Self::SpoutTouch(s) => 2 + s.index(),
            Self::ButtonPress(b) => 4 + b.index(),
        }
    }
}
