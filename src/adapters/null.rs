//! Null-simulation backend.
//!
//! No lines, no threads.  Actuator commands are recorded in an
//! [`ActuatorLog`]; sensor edges only happen when something calls a
//! [`SimInjector`].  Used for headless runs and tests.

use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{self, RecvTimeoutError};
use log::{info, warn};
use parking_lot::Mutex;

use super::WAIT_POLL;
use crate::app::ports::Rig;
use crate::cancel::CancelToken;
use crate::error::Result;
use crate::events::{Epoch, EventSender, SensorKind};
use crate::pins::{DebounceProfile, PinTable};
use crate::rig::router::{EventRouter, Phase};
use crate::rig::Apparatus;
use crate::sensors::{ButtonId, Paw, RawInput, SpoutId, Timepoint};

// ── Actuator record ───────────────────────────────────────────

/// One command a simulated backend received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorCall {
    Cue { spout: SpoutId, on: bool },
    Reward { spout: SpoutId, ms: u64 },
    AllOff,
}

/// Shared, append-only history of actuator commands.
#[derive(Debug, Clone, Default)]
pub struct ActuatorLog(Arc<Mutex<Vec<ActuatorCall>>>);

impl ActuatorLog {
    pub fn push(&self, call: ActuatorCall) {
        self.0.lock().push(call);
    }

    pub fn calls(&self) -> Vec<ActuatorCall> {
        self.0.lock().clone()
    }

    /// Spouts that dispensed, in order.
    pub fn rewards(&self) -> Vec<SpoutId> {
        self.0
            .lock()
            .iter()
            .filter_map(|c| match c {
                ActuatorCall::Reward { spout, .. } => Some(*spout),
                _ => None,
            })
            .collect()
    }

    pub fn cleanups(&self) -> usize {
        self.0.lock().iter().filter(|c| **c == ActuatorCall::AllOff).count()
    }
}

// ── Injector ──────────────────────────────────────────────────

/// Drives simulated sensor edges into a backend's router.  Each call is
/// one edge, timestamped at the call.
#[derive(Clone)]
pub struct SimInjector {
    router: EventRouter,
}

impl SimInjector {
    pub fn new(router: EventRouter) -> Self {
        Self { router }
    }

    pub fn lift(&self, paw: Paw) -> Option<SensorKind> {
        self.router.route(RawInput::PawLift(paw), Timepoint::now())
    }

    pub fn touch(&self, spout: SpoutId) -> Option<SensorKind> {
        self.router.route(RawInput::SpoutTouch(spout), Timepoint::now())
    }

    pub fn press(&self, button: ButtonId) -> Option<SensorKind> {
        self.router.route(RawInput::ButtonPress(button), Timepoint::now())
    }

    /// The monitoring window currently armed.
    pub fn phase(&self) -> Phase {
        self.router.phase()
    }
}

// ── Backend ───────────────────────────────────────────────────

/// How `wait_to_start` decides the session may begin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartGate {
    #[default]
    Immediate,
    /// Wait for a line on stdin.
    Enter,
}

pub struct NullRig {
    apparatus: Apparatus,
    router: EventRouter,
    rest_delay: Duration,
    start_gate: StartGate,
    actuators: ActuatorLog,
    cancel: CancelToken,
    cleaned_up: bool,
}

impl NullRig {
    pub fn new(spout_count: usize) -> Result<Self> {
        Self::with_pins(PinTable::default(), spout_count)
    }

    pub fn with_pins(pins: PinTable, spout_count: usize) -> Result<Self> {
        let apparatus = Apparatus::new(pins, spout_count)?;
        let router = EventRouter::new(DebounceProfile::NONE, spout_count, apparatus.lift_logs());
        Ok(Self {
            apparatus,
            router,
            rest_delay: Duration::ZERO,
            start_gate: StartGate::Immediate,
            actuators: ActuatorLog::default(),
            cancel: CancelToken::new(),
            cleaned_up: false,
        })
    }

    /// Pretend the paws take `delay` to settle on every `wait_for_rest`.
    pub fn with_rest_delay(mut self, delay: Duration) -> Self {
        self.rest_delay = delay;
        self
    }

    pub fn with_start_gate(mut self, gate: StartGate) -> Self {
        self.start_gate = gate;
        self
    }

    pub fn injector(&self) -> SimInjector {
        SimInjector::new(self.router.clone())
    }

    pub fn actuators(&self) -> ActuatorLog {
        self.actuators.clone()
    }
}

impl Rig for NullRig {
    fn apparatus(&self) -> &Apparatus {
        &self.apparatus
    }

    fn apparatus_mut(&mut self) -> &mut Apparatus {
        &mut self.apparatus
    }

    fn initialize(&mut self, events: EventSender, cancel: &CancelToken) -> Result<()> {
        self.router.connect(events);
        self.cancel = cancel.clone();
        info!("Null rig ready with {} spout(s)", self.apparatus.spout_count());
        Ok(())
    }

    fn wait_to_start(&mut self, cancel: &CancelToken) -> Result<bool> {
        match self.start_gate {
            StartGate::Immediate => Ok(!cancel.is_cancelled()),
            StartGate::Enter => {
                info!("Press enter to begin.");
                let (tx, rx) = channel::bounded(1);
                // A blocked stdin read cannot be interrupted; on abort the
                // reader is left to die with the process.
                std::thread::spawn(move || {
                    let mut line = String::new();
                    let _ = std::io::stdin().read_line(&mut line);
                    let _ = tx.send(());
                });
                loop {
                    if cancel.is_cancelled() {
                        return Ok(false);
                    }
                    match rx.recv_timeout(WAIT_POLL) {
                        Ok(()) => return Ok(true),
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => return Ok(true),
                    }
                }
            }
        }
    }

    fn monitor_sensors(&mut self) -> Result<Epoch> {
        Ok(self.router.arm_iti())
    }

    fn set_button_callback(&mut self, button: ButtonId) -> Result<()> {
        self.router.arm_button(button);
        Ok(())
    }

    fn wait_for_rest(&mut self, cancel: &CancelToken) -> Result<bool> {
        Ok(cancel.sleep(self.rest_delay, WAIT_POLL))
    }

    fn disable_sensors(&mut self) -> Result<()> {
        self.router.disarm();
        Ok(())
    }

    fn start_trial(&mut self, spout: SpoutId) -> Result<Epoch> {
        self.set_cue(spout, true)?;
        if let Some(s) = self.apparatus.spout_mut(spout) {
            s.record_cue_onset(Timepoint::now());
        }
        Ok(self.router.arm_trial(spout))
    }

    fn set_cue(&mut self, spout: SpoutId, on: bool) -> Result<()> {
        match self.apparatus.spout_mut(spout) {
            Some(s) => {
                s.set_cue(on);
                self.actuators.push(ActuatorCall::Cue { spout, on });
            }
            None => warn!("No {spout} on this rig"),
        }
        Ok(())
    }

    fn dispense_water(&mut self, spout: SpoutId, duration: Duration) -> Result<()> {
        self.actuators.push(ActuatorCall::Reward { spout, ms: duration.as_millis() as u64 });
        self.cancel.sleep(duration, WAIT_POLL);
        Ok(())
    }

    fn end_trial(&mut self) -> Result<()> {
        self.router.disarm();
        self.cues_off()
    }

    fn cleanup(&mut self) {
        if self.cleaned_up {
            return;
        }
        self.cleaned_up = true;
        self.router.disarm();
        let ids: Vec<SpoutId> = self.apparatus.spouts().iter().map(|s| s.id).collect();
        for id in ids {
            if let Some(s) = self.apparatus.spout_mut(id) {
                s.set_cue(false);
            }
        }
        self.actuators.push(ActuatorCall::AllOff);
    }
}
