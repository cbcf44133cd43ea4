//! Shared mutable context threaded through every session state handler.
//!
//! `SessionContext` is the blackboard the handlers read and write: the
//! rig, the event queue, the live record, the outcome latch, deadlines,
//! and the flags that make every "exactly once" hardware call exactly
//! once.  Only the primary thread touches it.

use std::time::{Duration, Instant};

use log::{debug, error, warn};
use rand::rngs::StdRng;

use super::StateId;
use crate::app::events::SessionEvent;
use crate::app::ports::{EventSink, Rig};
use crate::cancel::CancelToken;
use crate::config::SessionConfig;
use crate::error::Error;
use crate::events::{Epoch, EventQueue, SensorEvent};
use crate::session::outcome::OutcomeLatch;
use crate::session::record::SessionRecord;
use crate::session::EndReason;
use crate::sensors::SpoutId;

pub struct SessionContext<R: Rig> {
    // -- Collaborators --
    pub config: SessionConfig,
    pub rig: R,
    pub queue: EventQueue,
    pub sink: Box<dyn EventSink>,
    pub cancel: CancelToken,
    pub rng: StdRng,

    // -- Session data --
    pub record: SessionRecord,
    pub latch: OutcomeLatch,

    // -- Timing --
    pub session_end: Option<Instant>,
    pub iti_deadline: Option<Instant>,
    pub cue_deadline: Option<Instant>,
    pub hold_until: Option<Instant>,

    // -- Current trial --
    pub spout: SpoutId,
    pub trial: u32,
    /// Reward at cue onset for the upcoming trial.  Reset from config at
    /// every ITI; the start button flips it.
    pub shaping: bool,

    // -- Monitoring windows --
    /// Epoch of the window events are accepted from.
    pub armed: Option<Epoch>,
    /// ITI monitoring armed and not yet disabled.
    pub iti_live: bool,
    /// Cue delivered and `end_trial` not yet called.
    pub trial_open: bool,

    pub end: Option<EndReason>,
    pub cleaned_up: bool,
}

impl<R: Rig> SessionContext<R> {
    pub fn new(
        config: SessionConfig,
        rig: R,
        queue: EventQueue,
        sink: Box<dyn EventSink>,
        cancel: CancelToken,
        rng: StdRng,
    ) -> Self {
        let shaping = config.shaping;
        Self {
            config,
            rig,
            queue,
            sink,
            cancel,
            rng,
            record: SessionRecord::new(),
            latch: OutcomeLatch::new(),
            session_end: None,
            iti_deadline: None,
            cue_deadline: None,
            hold_until: None,
            spout: SpoutId(0),
            trial: 0,
            shaping,
            armed: None,
            iti_live: false,
            trial_open: false,
            end: None,
            cleaned_up: false,
        }
    }

    pub fn emit(&mut self, event: SessionEvent) {
        self.sink.emit(&event);
    }

    pub fn reward_duration(&self) -> Duration {
        Duration::from_millis(self.config.reward_duration_ms)
    }

    /// End the session for `reason`.  The first reason sticks.
    pub fn end_with(&mut self, reason: EndReason) -> Option<StateId> {
        if self.end.is_none() {
            self.end = Some(reason);
        }
        Some(StateId::SessionEnd)
    }

    /// Record a mid-session failure.  Usable from `on_enter`, where no
    /// transition can be returned; the next `on_update` picks it up.
    pub fn fault(&mut self, e: Error) {
        error!("Rig fault, ending session: {e}");
        if self.end.is_none() {
            self.end = Some(EndReason::HardwareFault(e));
        }
    }

    pub fn fail(&mut self, e: Error) -> Option<StateId> {
        self.fault(e);
        Some(StateId::SessionEnd)
    }

    /// Checked at the top of every update: operator abort, deferred faults,
    /// and faults raised by the rig's own threads.
    pub fn interrupted(&mut self) -> Option<StateId> {
        if self.end.is_some() {
            return Some(StateId::SessionEnd);
        }
        if self.cancel.is_cancelled() {
            return self.end_with(EndReason::Aborted);
        }
        if let Err(e) = self.rig.check() {
            return self.fail(e);
        }
        None
    }

    /// Next event from the armed window.  Events from a closed window
    /// raced its disable and are dropped.
    pub fn next_event(&mut self) -> Option<SensorEvent> {
        while let Some(event) = self.queue.pop() {
            if Some(event.epoch) == self.armed {
                return Some(event);
            }
            if self.armed.is_some() {
                warn!(
                    "Stale {:?} from window {} (armed {:?}), ignored",
                    event.kind, event.epoch, self.armed
                );
            } else {
                debug!("{:?} arrived with no window armed, ignored", event.kind);
            }
        }
        None
    }

    pub fn past(deadline: Option<Instant>) -> bool {
        deadline.is_none_or(|d| Instant::now() >= d)
    }
}
