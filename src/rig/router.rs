//! Phase-aware routing of raw sensor edges to typed events.
//!
//! Every backend funnels its edges (GPIO levels, key presses, injected
//! calls) through one [`EventRouter`].  The router knows which monitoring
//! window is armed and turns a raw edge into the event that window
//! expects:
//!
//! | Phase  | Paw lift                | Spout touch                    | Button        |
//! |--------|-------------------------|--------------------------------|---------------|
//! | Idle   | dropped                 | dropped                        | counted only  |
//! | ITI    | `Reset` (ITI window)    | `SpontaneousReach` (ITI window)| `Button` if armed |
//! | Trial  | lift logged (lift window)| `Reward` / `Incorrect` (trial window) | counted only |
//!
//! Debouncing happens here, before an edge becomes an event.  Each arm
//! call opens a new epoch, clears debounce history, and disarms buttons.

use std::sync::Arc;
use std::time::Instant;

use log::debug;
use parking_lot::Mutex;

use super::LiftLog;
use crate::events::{Epoch, EventSender, SensorEvent, SensorKind};
use crate::pins::DebounceProfile;
use crate::sensors::debounce::Debouncer;
use crate::sensors::{ButtonId, RawInput, SpoutId, Timepoint};

/// Which monitoring window is armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Iti,
    Trial { target: SpoutId },
}

struct RouterState {
    phase: Phase,
    epoch: Epoch,
    buttons_armed: [bool; 2],
    button_presses: [u32; 2],
    debouncer: Debouncer,
    profile: DebounceProfile,
    spout_count: usize,
    lift_logs: [LiftLog; 2],
    events: Option<EventSender>,
}

/// Cheaply cloneable; clones share state.
#[derive(Clone)]
pub struct EventRouter {
    state: Arc<Mutex<RouterState>>,
    origin: Instant,
}

impl EventRouter {
    pub fn new(profile: DebounceProfile, spout_count: usize, lift_logs: [LiftLog; 2]) -> Self {
        Self {
            state: Arc::new(Mutex::new(RouterState {
                phase: Phase::Idle,
                epoch: 0,
                buttons_armed: [false; 2],
                button_presses: [0; 2],
                debouncer: Debouncer::new(),
                profile,
                spout_count,
                lift_logs,
                events: None,
            })),
            origin: Instant::now(),
        }
    }

    /// Register where events are delivered.
    pub fn connect(&self, events: EventSender) {
        self.state.lock().events = Some(events);
    }

    /// Arm the ITI window: paw lifts reset, spout touches are spontaneous.
    pub fn arm_iti(&self) -> Epoch {
        self.arm(Phase::Iti)
    }

    /// Arm a trial window for `target`.
    pub fn arm_trial(&self, target: SpoutId) -> Epoch {
        self.arm(Phase::Trial { target })
    }

    /// Deliver presses of `button` as events while the current window is open.
    pub fn arm_button(&self, button: ButtonId) {
        if let Some(armed) = self.state.lock().buttons_armed.get_mut(button.index()) {
            *armed = true;
        }
    }

    /// Close the current window.  Later edges are dropped.
    pub fn disarm(&self) {
        let mut st = self.state.lock();
        st.phase = Phase::Idle;
        st.buttons_armed = [false; 2];
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    pub fn epoch(&self) -> Epoch {
        self.state.lock().epoch
    }

    /// Debounced presses of `button` seen since construction, armed or not.
    pub fn button_presses(&self, button: ButtonId) -> u32 {
        self.state
            .lock()
            .button_presses
            .get(button.index())
            .copied()
            .unwrap_or(0)
    }

    /// Route one edge observed at `at`.  Returns the event kind delivered,
    /// if any.  Safe to call from any thread; never blocks on the consumer.
    pub fn route(&self, input: RawInput, at: Timepoint) -> Option<SensorKind> {
        let now_ms = self.origin.elapsed().as_millis() as u32;
        let mut st = self.state.lock();
        let profile = st.profile;

        let kind = match (st.phase, input) {
            (_, RawInput::ButtonPress(b)) => {
                if b.index() >= 2 || !st.debouncer.accept(input, now_ms, profile.button_ms) {
                    return None;
                }
                st.button_presses[b.index()] += 1;
                let armed = st.buttons_armed[b.index()] && st.phase != Phase::Idle;
                armed.then_some(SensorKind::Button(b))?
            }
            (_, RawInput::SpoutTouch(s)) if s.index() >= st.spout_count => return None,
            (Phase::Idle, _) => {
                debug!("Edge {:?} outside any window, dropped", input);
                return None;
            }
            (Phase::Iti, RawInput::PawLift(p)) => {
                st.debouncer.accept(input, now_ms, profile.iti_ms).then_some(SensorKind::Reset(p))?
            }
            (Phase::Iti, RawInput::SpoutTouch(s)) => st
                .debouncer
                .accept(input, now_ms, profile.iti_ms)
                .then_some(SensorKind::SpontaneousReach(s))?,
            (Phase::Trial { .. }, RawInput::PawLift(p)) => {
                if st.debouncer.accept(input, now_ms, profile.lift_ms) {
                    st.lift_logs[p.index()].record(at);
                }
                return None;
            }
            (Phase::Trial { target }, RawInput::SpoutTouch(s)) => {
                if !st.debouncer.accept(input, now_ms, profile.trial_ms) {
                    return None;
                }
                if s == target {
                    SensorKind::Reward(s)
                } else {
                    SensorKind::Incorrect(s)
                }
            }
        };

        let event = SensorEvent { kind, at, epoch: st.epoch };
        match &st.events {
            Some(tx) if tx.push(event) => Some(kind),
            _ => None,
        }
    }

    fn arm(&self, phase: Phase) -> Epoch {
        let mut st = self.state.lock();
        st.epoch = st.epoch.wrapping_add(1);
        st.phase = phase;
        st.buttons_armed = [false; 2];
        st.debouncer.reset();
        st.epoch
    }
}
