//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing session events to the `log`
//! facade.  Milestones go out at `info`, per-sensor detail at `debug`.

use log::{debug, info};

use crate::app::events::SessionEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`SessionEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::Settings(c) => {
                debug!(
                    "SETTINGS | spouts={} duration={}s cue={}ms iti={:?}ms reward={}ms shaping={}",
                    c.spout_count, c.duration_secs, c.cue_duration_ms, c.iti, c.reward_duration_ms, c.shaping
                );
            }
            SessionEvent::Started => info!("START | session running"),
            SessionEvent::TrialDrawn { trial, spout } => {
                debug!("TRIAL | #{trial} target={spout}");
            }
            SessionEvent::ItiCountdown { ms } => debug!("ITI | countdown {ms} ms"),
            SessionEvent::ItiReset { paw } => debug!("ITI | reset by {paw:?} paw"),
            SessionEvent::SpontaneousReach { spout } => debug!("ITI | spontaneous reach on {spout}"),
            SessionEvent::ShapingToggled { shaping } => info!("ITI | shaping={shaping}"),
            SessionEvent::CueOn { trial, spout } => debug!("TRIAL | #{trial} cue on {spout}"),
            SessionEvent::TrialResolved { trial, outcome } => {
                debug!("TRIAL | #{trial} {outcome}");
            }
            SessionEvent::Ended(reason) => info!("END | {reason}"),
        }
    }
}
