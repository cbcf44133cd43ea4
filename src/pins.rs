//! GPIO pin assignments and debounce windows for the training box.
//!
//! Single source of truth: backends receive a [`PinTable`] at
//! construction rather than hard-coding numbers.  Numbers are BCM.

use crate::config::MAX_SPOUTS;

/// Lines belonging to one reach target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpoutPins {
    /// Digital output: cue LED (active HIGH).
    pub cue: u8,
    /// Digital input: capacitive touch sensor, HIGH while touched.
    pub touch: u8,
    /// Digital output: reward solenoid valve (active HIGH).
    pub solenoid: u8,
}

/// Every line the rig uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinTable {
    /// Push-buttons, active-low with pull-ups.  Button 0 starts the
    /// session and toggles shaping during the ITI.
    pub buttons: [u8; 2],
    /// Paw-rest sensors `[left, right]`, HIGH while the paw rests.
    pub paw_sensors: [u8; 2],
    pub spouts: [SpoutPins; MAX_SPOUTS],
}

pub const DEFAULT_PINS: PinTable = PinTable {
    buttons: [4, 13],
    paw_sensors: [17, 18],
    spouts: [
        SpoutPins { cue: 5, touch: 27, solenoid: 25 },
        SpoutPins { cue: 22, touch: 23, solenoid: 24 },
    ],
};

impl Default for PinTable {
    fn default() -> Self {
        DEFAULT_PINS
    }
}

// ---------------------------------------------------------------------------
// Debounce windows
// ---------------------------------------------------------------------------

/// Minimum gap between accepted edges on one sensor, per monitoring phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceProfile {
    /// Paw lifts and spout touches during the ITI.
    pub iti_ms: u32,
    /// Target / non-target touches during a trial.
    pub trial_ms: u32,
    /// Paw lifts during a trial.
    pub lift_ms: u32,
    pub button_ms: u32,
}

impl DebounceProfile {
    /// Windows used on the physical rig.
    pub const HARDWARE: Self = Self {
        iti_ms: 100,
        trial_ms: 1000,
        lift_ms: 50,
        button_ms: 500,
    };

    /// Every edge accepted.
    pub const NONE: Self = Self {
        iti_ms: 0,
        trial_ms: 0,
        lift_ms: 0,
        button_ms: 0,
    };
}
