//! Physical backend over mock `embedded-hal` lines.
//!
//! Every line is a shared level the test can flip; outputs also keep the
//! history of levels written to them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use embedded_hal::digital::{self, ErrorKind, ErrorType, InputPin, OutputPin};
use parking_lot::Mutex;
use reach::adapters::physical::{PhysicalRig, SensorInputs, SpoutOutputs};
use reach::app::events::SessionEvent;
use reach::error::{Error, HardwareError};
use reach::pins::{DEFAULT_PINS, DebounceProfile};
use reach::sensors::SpoutId;
use reach::session::{EndReason, Sequencer, TrialOutcome};
use reach::CancelToken;

use crate::harness::{Recorder, quick_config, spawn_session, wait_until};

const PATIENCE: Duration = Duration::from_secs(5);

// ── Mock line ─────────────────────────────────────────────────

#[derive(Debug)]
pub struct LineFault;

impl digital::Error for LineFault {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

#[derive(Clone, Default)]
pub struct Line {
    level: Arc<AtomicBool>,
    broken: Arc<AtomicBool>,
    writes: Arc<Mutex<Vec<bool>>>,
}

#[allow(dead_code)]
impl Line {
    fn at(level: bool) -> Self {
        let line = Self::default();
        line.set(level);
        line
    }

    fn set(&self, level: bool) {
        self.level.store(level, Ordering::Release);
    }

    fn level(&self) -> bool {
        self.level.load(Ordering::Acquire)
    }

    fn break_line(&self) {
        self.broken.store(true, Ordering::Release);
    }

    fn writes(&self) -> Vec<bool> {
        self.writes.lock().clone()
    }
}

impl ErrorType for Line {
    type Error = LineFault;
}

impl InputPin for Line {
    fn is_high(&mut self) -> Result<bool, LineFault> {
        if self.broken.load(Ordering::Acquire) {
            return Err(LineFault);
        }
        Ok(self.level())
    }

    fn is_low(&mut self) -> Result<bool, LineFault> {
        self.is_high().map(|h| !h)
    }
}

impl OutputPin for Line {
    fn set_low(&mut self) -> Result<(), LineFault> {
        if self.broken.load(Ordering::Acquire) {
            return Err(LineFault);
        }
        self.set(false);
        self.writes.lock().push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), LineFault> {
        if self.broken.load(Ordering::Acquire) {
            return Err(LineFault);
        }
        self.set(true);
        self.writes.lock().push(true);
        Ok(())
    }
}

// ── Bench ─────────────────────────────────────────────────────

/// Test-side handles on every line of a two-spout rig.
struct Bench {
    paws: [Line; 2],
    touches: [Line; 2],
    buttons: [Line; 2],
    cues: [Line; 2],
    solenoids: [Line; 2],
}

impl Bench {
    /// Paws resting, nothing touched, buttons released.
    fn new() -> Self {
        Self {
            paws: [Line::at(true), Line::at(true)],
            touches: [Line::at(false), Line::at(false)],
            buttons: [Line::at(true), Line::at(true)],
            cues: [Line::default(), Line::default()],
            solenoids: [Line::default(), Line::default()],
        }
    }

    fn rig(&self, spouts: usize) -> PhysicalRig<Line, Line> {
        let inputs = SensorInputs {
            paws: self.paws.clone(),
            touches: self.touches[..spouts].to_vec(),
            buttons: self.buttons.clone(),
        };
        let outputs = (0..spouts)
            .map(|i| SpoutOutputs { cue: self.cues[i].clone(), solenoid: self.solenoids[i].clone() })
            .collect();
        PhysicalRig::new(DEFAULT_PINS, inputs, outputs)
            .unwrap()
            .with_debounce(DebounceProfile::NONE)
    }

    /// Press and release a button, slowly enough for the sampler.
    fn click(&self, button: usize) {
        self.buttons[button].set(false);
        std::thread::sleep(Duration::from_millis(15));
        self.buttons[button].set(true);
        std::thread::sleep(Duration::from_millis(15));
    }

    fn start(&self, events: &Recorder) -> bool {
        wait_until(PATIENCE, || {
            if events.when(|e| *e == SessionEvent::Started).is_some() {
                return true;
            }
            self.click(0);
            false
        })
    }

    fn all_outputs_low(&self) -> bool {
        self.cues.iter().chain(&self.solenoids).all(|l| !l.level())
    }
}

fn cued_spout(events: &Recorder) -> Option<SpoutId> {
    events.find(|e| match e {
        SessionEvent::CueOn { trial: 1, spout } => Some(*spout),
        _ => None,
    })
}

// ── Tests ─────────────────────────────────────────────────────

#[test]
fn touch_line_rewards_through_the_solenoid() {
    let bench = Bench::new();
    let session = spawn_session(quick_config(2), bench.rig(2), 31);
    let ev = session.events.clone();
    assert!(bench.start(&ev));

    assert!(wait_until(PATIENCE, || cued_spout(&ev).is_some()));
    let target = cued_spout(&ev).unwrap();
    assert!(bench.cues[target.index()].level());

    bench.touches[target.index()].set(true);
    assert!(wait_until(PATIENCE, || {
        ev.count(|e| matches!(e, SessionEvent::TrialResolved { trial: 1, .. })) == 1
    }));
    bench.touches[target.index()].set(false);
    let report = session.abort();

    assert_eq!(report.record.trials[0].outcome, TrialOutcome::Rewarded);
    // Opened once for the reward and closed again, plus the closing writes.
    let solenoid = bench.solenoids[target.index()].writes();
    assert_eq!(solenoid.iter().filter(|w| **w).count(), 1);
    assert!(bench.all_outputs_low());
}

#[test]
fn lifted_paw_holds_the_countdown() {
    let bench = Bench::new();
    let session = spawn_session(quick_config(1), bench.rig(1), 32);
    let ev = session.events.clone();

    bench.paws[0].set(false);
    assert!(bench.start(&ev));
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(ev.count(|e| matches!(e, SessionEvent::ItiCountdown { .. })), 0);

    bench.paws[0].set(true);
    assert!(wait_until(PATIENCE, || {
        ev.when(|e| matches!(e, SessionEvent::ItiCountdown { .. })).is_some()
    }));
    let _ = session.abort();
    assert!(bench.all_outputs_low());
}

#[test]
fn read_fault_ends_session_with_partial_data() {
    let bench = Bench::new();
    let session = spawn_session(quick_config(2), bench.rig(2), 33);
    let ev = session.events.clone();
    assert!(bench.start(&ev));
    assert!(wait_until(PATIENCE, || cued_spout(&ev).is_some()));

    bench.touches[1].break_line();
    let report = session.join();

    let pin = DEFAULT_PINS.spouts[1].touch;
    assert_eq!(
        report.end,
        EndReason::HardwareFault(Error::Hardware(HardwareError::GpioRead { pin }))
    );
    assert!(report.record.manual);
    assert_eq!(report.record.trial_count, 1);
    assert!(report.record.trials[0].outcome.is_terminal());
    assert!(bench.all_outputs_low());
}

#[test]
fn broken_output_fails_initialisation() {
    let bench = Bench::new();
    bench.cues[0].break_line();
    let sequencer = Sequencer::new(quick_config(2), bench.rig(2)).unwrap();
    let err = sequencer.run(&CancelToken::new()).err().unwrap();
    let pin = DEFAULT_PINS.spouts[0].cue;
    assert_eq!(err, Error::Hardware(HardwareError::GpioWrite { pin }));
}

#[test]
fn cleanup_is_idempotent() {
    use reach::app::ports::Rig;
    use reach::events::EventQueue;

    let bench = Bench::new();
    let mut rig = bench.rig(2);
    let queue = EventQueue::new();
    rig.initialize(queue.sender(), &CancelToken::new()).unwrap();
    rig.set_cue(SpoutId(1), true).unwrap();
    assert!(bench.cues[1].level());

    rig.cleanup();
    let after_once: Vec<Vec<bool>> = bench.cues.iter().map(Line::writes).collect();
    rig.cleanup();
    let after_twice: Vec<Vec<bool>> = bench.cues.iter().map(Line::writes).collect();

    assert_eq!(after_once, after_twice);
    assert!(bench.all_outputs_low());
}
