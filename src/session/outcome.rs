//! Trial outcomes and the single-assignment latch that resolves them.

use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// Result of one cue window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum TrialOutcome {
    Pending = 0,
    Rewarded = 1,
    Incorrect = 2,
    Missed = 3,
}

impl TrialOutcome {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Rewarded,
            2 => Self::Incorrect,
            3 => Self::Missed,
            _ => Self::Pending,
        }
    }

    pub fn is_terminal(self) -> bool {
        self != Self::Pending
    }

    /// Whether the post-trial delay (sized to the reward) applies.
    pub fn holds_after_trial(self) -> bool {
        matches!(self, Self::Rewarded | Self::Incorrect)
    }
}

impl fmt::Display for TrialOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Rewarded => "successful reach",
            Self::Incorrect => "incorrect reach",
            Self::Missed => "missed reach",
        })
    }
}

/// Holds one trial's outcome.  The first terminal value written wins;
/// later writes are no-ops until [`OutcomeLatch::rearm`].
#[derive(Debug, Default)]
pub struct OutcomeLatch(AtomicU8);

impl OutcomeLatch {
    pub const fn new() -> Self {
        Self(AtomicU8::new(TrialOutcome::Pending as u8))
    }

    /// Try to resolve the trial.  Returns `true` if this call set it.
    pub fn latch(&self, outcome: TrialOutcome) -> bool {
        if !outcome.is_terminal() {
            return false;
        }
        self.0
            .compare_exchange(
                TrialOutcome::Pending as u8,
                outcome as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn get(&self) -> TrialOutcome {
        TrialOutcome::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn is_resolved(&self) -> bool {
        self.get().is_terminal()
    }

    /// Back to `Pending` for the next trial.
    pub fn rearm(&self) {
        self.0.store(TrialOutcome::Pending as u8, Ordering::Release);
    }
}
