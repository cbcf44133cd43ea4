//! Outbound session events.
//!
//! The [`Sequencer`](crate::session::Sequencer) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them (log, redraw a terminal, record in a
//! test).

use crate::config::SessionConfig;
use crate::session::{EndReason, TrialOutcome};
use crate::sensors::{Paw, SpoutId};

/// Structured events emitted by the sequencer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Settings for the session about to start.
    Settings(SessionConfig),

    /// The start signal fired.
    Started,

    /// A target was drawn and the ITI is about to begin.
    TrialDrawn { trial: u32, spout: SpoutId },

    /// Both paws rest; the countdown began.
    ItiCountdown { ms: u64 },

    /// A paw lifted during the countdown.
    ItiReset { paw: Paw },

    /// A spout was touched outside a trial.
    SpontaneousReach { spout: SpoutId },

    /// The operator toggled shaping for the next trial.
    ShapingToggled { shaping: bool },

    /// The cue was lit.
    CueOn { trial: u32, spout: SpoutId },

    /// A trial resolved.
    TrialResolved { trial: u32, outcome: TrialOutcome },

    /// The session ended.
    Ended(EndReason),
}
