//! Interactive backend fed keys through a channel, the way the terminal
//! reader feeds it.

use std::time::Duration;

use crossbeam::channel::{self, Sender};
use reach::adapters::interactive::InteractiveRig;
use reach::app::events::SessionEvent;
use reach::config::SessionConfig;
use reach::pins::DebounceProfile;
use reach::sensors::{Paw, SpoutId};
use reach::session::{EndReason, TrialOutcome};

use crate::harness::{Recorder, quick_config, spawn_session, wait_until};

const PATIENCE: Duration = Duration::from_secs(5);

fn rig(spouts: usize) -> (Sender<char>, InteractiveRig) {
    let (tx, rx) = channel::unbounded();
    let rig = InteractiveRig::new(rx, spouts)
        .unwrap()
        .with_debounce(DebounceProfile::NONE)
        .with_rest_delay(Duration::ZERO);
    (tx, rig)
}

/// Keep pressing `1` until the session starts.  Keys sent before the
/// start listener is up are flushed, so a single press can be lost.
fn press_start(keys: &Sender<char>, events: &Recorder) -> bool {
    wait_until(PATIENCE, || {
        if events.when(|e| *e == SessionEvent::Started).is_some() {
            return true;
        }
        keys.send('1').unwrap();
        std::thread::sleep(Duration::from_millis(20));
        false
    })
}

#[test]
fn key_grasp_on_cued_spout_is_rewarded() {
    let (keys, rig) = rig(2);
    let log = rig.actuators();
    let session = spawn_session(quick_config(2), rig, 21);
    let ev = session.events.clone();
    assert!(press_start(&keys, &ev));

    assert!(wait_until(PATIENCE, || {
        ev.find(|e| match e {
            SessionEvent::CueOn { trial: 1, spout } => Some(*spout),
            _ => None,
        })
        .is_some()
    }));
    let target = ev
        .find(|e| match e {
            SessionEvent::CueOn { trial: 1, spout } => Some(*spout),
            _ => None,
        })
        .unwrap();
    keys.send(if target == SpoutId(0) { 'g' } else { 'h' }).unwrap();

    assert!(wait_until(PATIENCE, || {
        ev.count(|e| matches!(e, SessionEvent::TrialResolved { trial: 1, .. })) == 1
    }));
    let report = session.abort();

    assert_eq!(report.record.trials[0].outcome, TrialOutcome::Rewarded);
    assert_eq!(report.record.touch_timepoints[target.index()].len(), 1);
    assert!(log.rewards().contains(&target));
    assert_eq!(log.cleanups(), 1);
}

#[test]
fn lift_key_breaks_the_iti() {
    let (keys, rig) = rig(1);
    let config = SessionConfig { iti: [400, 400], ..quick_config(1) };
    let session = spawn_session(config, rig, 22);
    let ev = session.events.clone();
    assert!(press_start(&keys, &ev));

    assert!(wait_until(PATIENCE, || {
        ev.when(|e| matches!(e, SessionEvent::ItiCountdown { .. })).is_some()
    }));
    keys.send('n').unwrap();
    assert!(wait_until(PATIENCE, || {
        ev.when(|e| *e == SessionEvent::ItiReset { paw: Paw::Right }).is_some()
    }));
    let report = session.abort();

    assert_eq!(report.record.resets_timepoints[1].len(), 1);
    assert_eq!(report.end, EndReason::Aborted);
}

#[test]
fn abort_while_waiting_to_start_does_not_hang() {
    let (_keys, rig) = rig(1);
    let log = rig.actuators();
    let session = spawn_session(quick_config(1), rig, 23);
    let ev = session.events.clone();
    assert!(wait_until(PATIENCE, || {
        ev.when(|e| matches!(e, SessionEvent::Settings(_))).is_some()
    }));

    let report = session.abort();
    assert_eq!(report.end, EndReason::Aborted);
    assert_eq!(report.record.trial_count, 0);
    assert_eq!(log.cleanups(), 1);
}

#[test]
fn repeated_monitoring_cycles_leave_no_listener_behind() {
    use reach::app::ports::Rig;
    use reach::events::EventQueue;

    let (keys, mut rig) = rig(2);
    let queue = EventQueue::new();
    rig.initialize(queue.sender(), &reach::CancelToken::new()).unwrap();

    for _ in 0..20 {
        rig.monitor_sensors().unwrap();
        assert!(rig.listening());
        rig.disable_sensors().unwrap();
        assert!(!rig.listening());
        rig.start_trial(SpoutId(1)).unwrap();
        assert!(rig.listening());
        rig.end_trial().unwrap();
        assert!(!rig.listening());
    }

    // The sender side outlives every listener; nothing is left reading it.
    keys.send('g').unwrap();
    std::thread::sleep(Duration::from_millis(20));
    assert!(queue.is_empty());
    rig.cleanup();
}
