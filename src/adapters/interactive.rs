//! Interactive-simulation backend.
//!
//! Keys stand in for sensors:
//!
//! | Key | Sensor              |
//! |-----|---------------------|
//! | `v` | left paw lift       |
//! | `n` | right paw lift      |
//! | `g` | spout 0 touch       |
//! | `h` | spout 1 touch       |
//! | `1` | button 0 (start)    |
//! | `2` | button 1            |
//!
//! Keys arrive on a channel (the terminal reader, or a test).  Each
//! monitoring phase runs one listener thread that forwards keys to the
//! router.  A listener is torn down with an explicit handshake: a stop
//! message wakes it out of its blocking receive, then it is joined.  A new
//! phase never starts before the previous listener has been joined.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;
use log::{debug, info, warn};

use super::WAIT_POLL;
use super::null::{ActuatorCall, ActuatorLog};
use crate::app::ports::Rig;
use crate::cancel::CancelToken;
use crate::error::{HardwareError, Result};
use crate::events::{Epoch, EventSender};
use crate::pins::{DebounceProfile, PinTable};
use crate::rig::Apparatus;
use crate::rig::router::EventRouter;
use crate::sensors::{ButtonId, Paw, RawInput, SpoutId, Timepoint};

/// How long the simulated paws take to settle.
const REST_DELAY: Duration = Duration::from_millis(200);

/// Sensor edge a key stands for, if any.
pub fn key_input(key: char) -> Option<RawInput> {
    match key {
        'v' => Some(RawInput::PawLift(Paw::Left)),
        'n' => Some(RawInput::PawLift(Paw::Right)),
        'g' => Some(RawInput::SpoutTouch(SpoutId(0))),
        'h' => Some(RawInput::SpoutTouch(SpoutId(1))),
        '1' => Some(RawInput::ButtonPress(ButtonId(0))),
        '2' => Some(RawInput::ButtonPress(ButtonId(1))),
        _ => None,
    }
}

struct Listener {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

pub struct InteractiveRig {
    apparatus: Apparatus,
    router: EventRouter,
    keys: Receiver<char>,
    listener: Option<Listener>,
    actuators: ActuatorLog,
    rest_delay: Duration,
    cancel: CancelToken,
    cleaned_up: bool,
}

impl InteractiveRig {
    pub fn new(keys: Receiver<char>, spout_count: usize) -> Result<Self> {
        let apparatus = Apparatus::new(PinTable::default(), spout_count)?;
        let router =
            EventRouter::new(DebounceProfile::HARDWARE, spout_count, apparatus.lift_logs());
        Ok(Self {
            apparatus,
            router,
            keys,
            listener: None,
            actuators: ActuatorLog::default(),
            rest_delay: REST_DELAY,
            cancel: CancelToken::new(),
            cleaned_up: false,
        })
    }

    pub fn with_debounce(mut self, profile: DebounceProfile) -> Self {
        self.router =
            EventRouter::new(profile, self.apparatus.spout_count(), self.apparatus.lift_logs());
        self
    }

    pub fn with_rest_delay(mut self, delay: Duration) -> Self {
        self.rest_delay = delay;
        self
    }

    pub fn actuators(&self) -> ActuatorLog {
        self.actuators.clone()
    }

    /// Whether a listener thread is currently running.
    pub fn listening(&self) -> bool {
        self.listener.is_some()
    }

    fn start_listener(&mut self) -> Result<()> {
        self.stop_listener()?;

        // Keys typed before this phase belong to no one.
        while self.keys.try_recv().is_ok() {}

        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let keys = self.keys.clone();
        let router = self.router.clone();
        let handle = thread::Builder::new()
            .name("key-listener".into())
            .spawn(move || {
                loop {
                    select! {
                        recv(keys) -> key => match key {
                            Ok(key) => {
                                if let Some(input) = key_input(key) {
                                    let at = Timepoint::now();
                                    if let Some(kind) = router.route(input, at) {
                                        debug!("Key {key:?} -> {kind:?}");
                                    }
                                }
                            }
                            Err(_) => return,
                        },
                        recv(stop_rx) -> _ => return,
                    }
                }
            })
            .map_err(|_| HardwareError::Listener)?;

        self.listener = Some(Listener { stop: stop_tx, handle });
        Ok(())
    }

    fn stop_listener(&mut self) -> Result<()> {
        let Some(listener) = self.listener.take() else {
            return Ok(());
        };
        let _ = listener.stop.send(());
        listener.handle.join().map_err(|_| HardwareError::Listener)?;
        Ok(())
    }
}

impl Rig for InteractiveRig {
    fn apparatus(&self) -> &Apparatus {
        &self.apparatus
    }

    fn apparatus_mut(&mut self) -> &mut Apparatus {
        &mut self.apparatus
    }

    fn initialize(&mut self, events: EventSender, cancel: &CancelToken) -> Result<()> {
        self.router.connect(events);
        self.cancel = cancel.clone();
        info!("Keys: v/n paws, g/h spouts, 1/2 buttons");
        Ok(())
    }

    fn wait_to_start(&mut self, cancel: &CancelToken) -> Result<bool> {
        info!("Hit button 1 to begin.");
        let baseline = self.router.button_presses(ButtonId::START);
        self.start_listener()?;
        let started = loop {
            if cancel.is_cancelled() {
                break false;
            }
            if self.router.button_presses(ButtonId::START) > baseline {
                break true;
            }
            thread::sleep(WAIT_POLL);
        };
        self.stop_listener()?;
        Ok(started)
    }

    fn monitor_sensors(&mut self) -> Result<Epoch> {
        let epoch = self.router.arm_iti();
        self.start_listener()?;
        Ok(epoch)
    }

    fn set_button_callback(&mut self, button: ButtonId) -> Result<()> {
        self.router.arm_button(button);
        Ok(())
    }

    fn wait_for_rest(&mut self, cancel: &CancelToken) -> Result<bool> {
        debug!("Waiting for rest...");
        Ok(cancel.sleep(self.rest_delay, WAIT_POLL))
    }

    fn disable_sensors(&mut self) -> Result<()> {
        self.router.disarm();
        self.stop_listener()
    }

    fn start_trial(&mut self, spout: SpoutId) -> Result<Epoch> {
        self.stop_listener()?;
        self.set_cue(spout, true)?;
        if let Some(s) = self.apparatus.spout_mut(spout) {
            s.record_cue_onset(Timepoint::now());
        }
        let epoch = self.router.arm_trial(spout);
        self.start_listener()?;
        Ok(epoch)
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
        info!("Water from {spout}");
        self.actuators.push(ActuatorCall::Reward { spout, ms: duration.as_millis() as u64 });
        self.cancel.sleep(duration, WAIT_POLL);
        Ok(())
    }

    fn end_trial(&mut self) -> Result<()> {
        self.router.disarm();
        self.stop_listener()?;
        self.cues_off()
    }

    fn cleanup(&mut self) {
        if self.cleaned_up {
            return;
        }
        self.cleaned_up = true;
        self.router.disarm();
        if let Err(e) = self.stop_listener() {
            warn!("Key listener did not stop cleanly: {e}");
        }
        let ids: Vec<SpoutId> = self.apparatus.spouts().iter().map(|s| s.id).collect();
        for id in ids {
            if let Some(s) = self.apparatus.spout_mut(id) {
                s.set_cue(false);
            }
        }
        self.actuators.push(ActuatorCall::AllOff);
    }
}

impl Drop for InteractiveRig {
    fn drop(&mut self) {
        let _ = self.stop_listener();
    }
}
