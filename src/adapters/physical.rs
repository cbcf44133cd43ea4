//! Physical backend: real lines through `embedded-hal` 1.0 pins.
//!
//! ## Hardware
//!
//! | Line        | Direction | Level                               |
//! |-------------|-----------|-------------------------------------|
//! | paw rest    | input     | HIGH while the paw rests (pull-down)|
//! | spout touch | input     | HIGH while touched                  |
//! | button      | input     | LOW while pressed (pull-up)         |
//! | cue LED     | output    | active HIGH                         |
//! | solenoid    | output    | active HIGH                         |
//!
//! A watcher thread samples every input at a fixed period and turns
//! level changes into edges (paw falling, touch rising, button falling),
//! timestamped when the change is seen.  Edges go through the shared
//! [`EventRouter`], which applies the hardware debounce windows.  The
//! watcher publishes paw levels in atomics for `wait_for_rest`.
//!
//! A failed read stops the watcher and parks the error where
//! [`Rig::check`] reports it; the sequencer then ends the session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use embedded_hal::digital::{InputPin, OutputPin};
use log::{debug, error, info, warn};
use parking_lot::Mutex;

use super::WAIT_POLL;
use crate::app::ports::Rig;
use crate::cancel::CancelToken;
use crate::config::MAX_SPOUTS;
use crate::error::{Error, HardwareError, Result};
use crate::events::{Epoch, EventSender};
use crate::pins::{DebounceProfile, PinTable, SpoutPins};
use crate::rig::Apparatus;
use crate::rig::router::EventRouter;
use crate::sensors::{ButtonId, Paw, RawInput, SpoutId, Timepoint};

/// Input sampling period.
pub const SAMPLE_PERIOD: Duration = Duration::from_millis(1);

/// Input lines, handed to the watcher thread at `initialize`.
pub struct SensorInputs<I> {
    /// `[left, right]`.
    pub paws: [I; 2],
    /// One per spout in use.
    pub touches: Vec<I>,
    pub buttons: [I; 2],
}

/// Output lines of one spout.
pub struct SpoutOutputs<O> {
    pub cue: O,
    pub solenoid: O,
}

// ── Edge detection ────────────────────────────────────────────

/// Turns sampled levels into sensor edges.
pub struct EdgeWatcher<I> {
    inputs: SensorInputs<I>,
    pins: PinTable,
    paw_high: [bool; 2],
    touch_high: Vec<bool>,
    button_high: [bool; 2],
}

fn read<I: InputPin>(pin: &mut I, number: u8) -> core::result::Result<bool, HardwareError> {
    pin.is_high().map_err(|e| {
        error!("GPIO {number} read failed: {e:?}");
        HardwareError::GpioRead { pin: number }
    })
}

impl<I: InputPin> EdgeWatcher<I> {
    /// Take the initial levels.  No edges are reported for them.
    pub fn new(mut inputs: SensorInputs<I>, pins: PinTable) -> core::result::Result<Self, HardwareError> {
        inputs.touches.truncate(MAX_SPOUTS);
        let mut paw_high = [false; 2];
        for (i, pin) in inputs.paws.iter_mut().enumerate() {
            paw_high[i] = read(pin, pins.paw_sensors[i])?;
        }
        let mut touch_high = Vec::with_capacity(inputs.touches.len());
        for (i, pin) in inputs.touches.iter_mut().enumerate() {
            touch_high.push(read(pin, pins.spouts[i].touch)?);
        }
        let mut button_high = [true; 2];
        for (i, pin) in inputs.buttons.iter_mut().enumerate() {
            button_high[i] = read(pin, pins.buttons[i])?;
        }
        Ok(Self { inputs, pins, paw_high, touch_high, button_high })
    }

    /// `[left, right]`, as of the last sample.
    pub fn paws_resting(&self) -> [bool; 2] {
        self.paw_high
    }

    /// Sample every line once, calling `on_edge` for each edge found.
    pub fn sample(&mut self, mut on_edge: impl FnMut(RawInput)) -> core::result::Result<(), HardwareError> {
        for (i, pin) in self.inputs.paws.iter_mut().enumerate() {
            let high = read(pin, self.pins.paw_sensors[i])?;
            if self.paw_high[i] && !high {
                on_edge(RawInput::PawLift(Paw::BOTH[i]));
            }
            self.paw_high[i] = high;
        }
        for (i, pin) in self.inputs.touches.iter_mut().enumerate() {
            let high = read(pin, self.pins.spouts[i].touch)?;
            if !self.touch_high[i] && high {
                on_edge(RawInput::SpoutTouch(SpoutId(i as u8)));
            }
            self.touch_high[i] = high;
        }
        for (i, pin) in self.inputs.buttons.iter_mut().enumerate() {
            let high = read(pin, self.pins.buttons[i])?;
            if self.button_high[i] && !high {
                on_edge(RawInput::ButtonPress(ButtonId(i as u8)));
            }
            self.button_high[i] = high;
        }
        Ok(())
    }
}

struct WatcherThread {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

// ── Backend ───────────────────────────────────────────────────

pub struct PhysicalRig<I, O>
where
    I: InputPin + Send + 'static,
    O: OutputPin,
{
    apparatus: Apparatus,
    router: EventRouter,
    inputs: Option<SensorInputs<I>>,
    outputs: Vec<SpoutOutputs<O>>,
    paws_resting: Arc<[AtomicBool; 2]>,
    fault: Arc<Mutex<Option<HardwareError>>>,
    watcher: Option<WatcherThread>,
    sample_period: Duration,
    cancel: CancelToken,
    cleaned_up: bool,
}

impl<I, O> PhysicalRig<I, O>
where
    I: InputPin + Send + 'static,
    O: OutputPin,
{
    /// One [`SpoutOutputs`] and one touch input per spout in use.
    pub fn new(pins: PinTable, inputs: SensorInputs<I>, outputs: Vec<SpoutOutputs<O>>) -> Result<Self> {
        if inputs.touches.len() != outputs.len() {
            return Err(Error::HardwareInit("touch inputs and spout outputs differ in count"));
        }
        let apparatus = Apparatus::new(pins, outputs.len())?;
        let router =
            EventRouter::new(DebounceProfile::HARDWARE, outputs.len(), apparatus.lift_logs());
        Ok(Self {
            apparatus,
            router,
            inputs: Some(inputs),
            outputs,
            paws_resting: Arc::new([AtomicBool::new(false), AtomicBool::new(false)]),
            fault: Arc::new(Mutex::new(None)),
            watcher: None,
            sample_period: SAMPLE_PERIOD,
            cancel: CancelToken::new(),
            cleaned_up: false,
        })
    }

    pub fn with_debounce(mut self, profile: DebounceProfile) -> Self {
        self.router =
            EventRouter::new(profile, self.apparatus.spout_count(), self.apparatus.lift_logs());
        self
    }

    fn stop_watcher(&mut self) {
        if let Some(w) = self.watcher.take() {
            w.stop.store(true, Ordering::Release);
            if w.handle.join().is_err() {
                warn!("Edge watcher panicked");
            }
        }
    }

    /// Pin numbers and output lines of `spout`.
    fn lines(&mut self, spout: SpoutId) -> Result<(SpoutPins, &mut SpoutOutputs<O>)> {
        let pins = self
            .apparatus
            .spout(spout)
            .map(|s| s.pins)
            .ok_or(Error::HardwareInit("no such spout on this rig"))?;
        let out = self
            .outputs
            .get_mut(spout.index())
            .ok_or(Error::HardwareInit("no such spout on this rig"))?;
        Ok((pins, out))
    }
}

impl<I, O> Rig for PhysicalRig<I, O>
where
    I: InputPin + Send + 'static,
    O: OutputPin,
{
    fn apparatus(&self) -> &Apparatus {
        &self.apparatus
    }

    fn apparatus_mut(&mut self) -> &mut Apparatus {
        &mut self.apparatus
    }

    fn initialize(&mut self, events: EventSender, cancel: &CancelToken) -> Result<()> {
        let inputs = self
            .inputs
            .take()
            .ok_or(Error::HardwareInit("rig already initialised"))?;

        for i in 0..self.outputs.len() {
            let pins = self.apparatus.pins().spouts[i];
            let out = &mut self.outputs[i];
            out.cue.set_low().map_err(|_| HardwareError::GpioWrite { pin: pins.cue })?;
            out.solenoid
                .set_low()
                .map_err(|_| HardwareError::GpioWrite { pin: pins.solenoid })?;
        }

        let mut watcher = EdgeWatcher::new(inputs, *self.apparatus.pins())?;
        for (flag, level) in self.paws_resting.iter().zip(watcher.paws_resting()) {
            flag.store(level, Ordering::Release);
        }
        self.router.connect(events);
        self.cancel = cancel.clone();

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let router = self.router.clone();
        let resting = Arc::clone(&self.paws_resting);
        let fault = Arc::clone(&self.fault);
        let period = self.sample_period;

        let handle = thread::Builder::new()
            .name("edge-watcher".into())
            .spawn(move || {
                while !stop_flag.load(Ordering::Acquire) {
                    let sampled = watcher.sample(|input| {
                        let at = Timepoint::now();
                        if let Some(kind) = router.route(input, at) {
                            debug!("Edge {input:?} -> {kind:?}");
                        }
                    });
                    if let Err(e) = sampled {
                        *fault.lock() = Some(e);
                        return;
                    }
                    for (flag, level) in resting.iter().zip(watcher.paws_resting()) {
                        flag.store(level, Ordering::Release);
                    }
                    thread::sleep(period);
                }
            })
            .map_err(|_| HardwareError::Listener)?;

        self.watcher = Some(WatcherThread { stop, handle });
        info!("Rig lines claimed, {} spout(s)", self.outputs.len());
        Ok(())
    }

    fn wait_to_start(&mut self, cancel: &CancelToken) -> Result<bool> {
        info!("Press button 1 to begin.");
        let baseline = self.router.button_presses(ButtonId::START);
        loop {
            if cancel.is_cancelled() {
                return Ok(false);
            }
            self.check()?;
            if self.router.button_presses(ButtonId::START) > baseline {
                return Ok(true);
            }
            thread::sleep(WAIT_POLL);
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
        debug!("Waiting for rest...");
        loop {
            if cancel.is_cancelled() {
                return Ok(false);
            }
            self.check()?;
            if self.paws_resting.iter().all(|p| p.load(Ordering::Acquire)) {
                return Ok(true);
            }
            thread::sleep(WAIT_POLL);
        }
    }

    fn disable_sensors(&mut self) -> Result<()> {
        self.router.disarm();
        Ok(())
    }

    fn start_trial(&mut self, spout: SpoutId) -> Result<Epoch> {
        self.router.disarm();
        self.set_cue(spout, true)?;
        if let Some(s) = self.apparatus.spout_mut(spout) {
            s.record_cue_onset(Timepoint::now());
        }
        Ok(self.router.arm_trial(spout))
    }

    fn set_cue(&mut self, spout: SpoutId, on: bool) -> Result<()> {
        let (pins, out) = self.lines(spout)?;
        let written = if on { out.cue.set_high() } else { out.cue.set_low() };
        written.map_err(|_| HardwareError::GpioWrite { pin: pins.cue })?;
        if let Some(s) = self.apparatus.spout_mut(spout) {
            s.set_cue(on);
        }
        Ok(())
    }

    fn dispense_water(&mut self, spout: SpoutId, duration: Duration) -> Result<()> {
        let cancel = self.cancel.clone();
        let (pins, out) = self.lines(spout)?;
        let pin = pins.solenoid;
        out.solenoid.set_high().map_err(|_| HardwareError::GpioWrite { pin })?;
        cancel.sleep(duration, WAIT_POLL);
        out.solenoid.set_low().map_err(|_| HardwareError::GpioWrite { pin })?;
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
        self.stop_watcher();

        let pins = self.apparatus.pins().spouts;
        for (i, out) in self.outputs.iter_mut().enumerate() {
            if out.solenoid.set_low().is_err() {
                error!("GPIO {} stuck: solenoid may be open", pins[i].solenoid);
            }
            if out.cue.set_low().is_err() {
                warn!("GPIO {} write failed during cleanup", pins[i].cue);
            }
        }
        let ids: Vec<SpoutId> = self.apparatus.spouts().iter().map(|s| s.id).collect();
        for id in ids {
            if let Some(s) = self.apparatus.spout_mut(id) {
                s.set_cue(false);
            }
        }
        info!("Rig lines released");
    }

    fn check(&self) -> Result<()> {
        match *self.fault.lock() {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

impl<I, O> Drop for PhysicalRig<I, O>
where
    I: InputPin + Send + 'static,
    O: OutputPin,
{
    fn drop(&mut self) {
        self.cleanup();
    }
}
