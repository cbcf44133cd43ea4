//! Whole sessions on the null backend, driven through `SimInjector`.

use std::time::{Duration, Instant};

use reach::adapters::null::{ActuatorCall, NullRig};
use reach::app::events::SessionEvent;
use reach::config::SessionConfig;
use reach::error::{ConfigError, Error};
use reach::events::SensorKind;
use reach::rig::router::Phase;
use reach::sensors::{ButtonId, Paw, SpoutId};
use reach::session::{EndReason, Sequencer, TrialOutcome};

use crate::harness::{quick_config, spawn_session, wait_until};

const PATIENCE: Duration = Duration::from_secs(5);

fn target_of(phase: Phase) -> Option<SpoutId> {
    match phase {
        Phase::Trial { target } => Some(target),
        _ => None,
    }
}

// ── Configuration ─────────────────────────────────────────────

#[test]
fn invalid_spout_count_fails_before_rig_use() {
    let config = SessionConfig { spout_count: 3, ..SessionConfig::default() };
    let rig = NullRig::new(2).unwrap();
    let log = rig.actuators();
    let err = Sequencer::new(config, rig).err().unwrap();
    assert_eq!(err, Error::Config(ConfigError::InvalidSpoutCount(3)));
    assert!(log.calls().is_empty());
}

#[test]
fn inverted_iti_range_is_rejected() {
    let config = SessionConfig { iti: [600, 500], ..SessionConfig::default() };
    let err = Sequencer::new(config, NullRig::new(1).unwrap()).err().unwrap();
    assert_eq!(
        err,
        Error::Config(ConfigError::InvalidItiRange { min_ms: 600, max_ms: 500 })
    );
}

#[test]
fn rig_and_config_must_agree_on_spouts() {
    let err = Sequencer::new(quick_config(2), NullRig::new(1).unwrap()).err().unwrap();
    assert!(matches!(err, Error::HardwareInit(_)));
}

// ── Unattended session ────────────────────────────────────────

#[test]
fn unattended_session_misses_every_trial() {
    let config = SessionConfig {
        spout_count: 1,
        duration_secs: 5,
        cue_duration_ms: 2000,
        iti: [500, 500],
        reward_duration_ms: 150,
        shaping: false,
    };
    let rig = NullRig::new(1).unwrap();
    let log = rig.actuators();
    let report = spawn_session(config, rig, 1).join();

    assert_eq!(report.end, EndReason::Completed);
    assert!(!report.record.manual);
    assert_eq!(report.record.trial_count, 2);
    assert_eq!(report.record.reward_count, 0);
    assert!(report.record.trials.iter().all(|t| t.outcome == TrialOutcome::Missed));
    assert_eq!(report.record.cue_timepoints[0].len(), 2);
    assert!(report.record.touch_timepoints[0].is_empty());
    assert_eq!(report.record.duration, 5.0);
    assert!(log.rewards().is_empty());
    assert_eq!(log.cleanups(), 1);
}

// ── Grasps ────────────────────────────────────────────────────

#[test]
fn grasp_on_target_rewards_once() {
    let rig = NullRig::new(2).unwrap();
    let inject = rig.injector();
    let log = rig.actuators();
    let session = spawn_session(quick_config(2), rig, 7);

    assert!(wait_until(PATIENCE, || target_of(inject.phase()).is_some()));
    let target = target_of(inject.phase()).unwrap();
    std::thread::sleep(Duration::from_millis(100));
    inject.touch(target);

    let ev = session.events.clone();
    assert!(wait_until(PATIENCE, || {
        ev.find(|e| match e {
            SessionEvent::TrialResolved { trial: 1, outcome } => Some(*outcome),
            _ => None,
        })
        .is_some()
    }));
    let report = session.abort();

    let record = &report.record;
    assert_eq!(record.trials[0].spout, target);
    assert_eq!(record.trials[0].outcome, TrialOutcome::Rewarded);
    assert_eq!(record.reward_count, 1);
    let touches = &record.touch_timepoints[target.index()];
    assert_eq!(touches.len(), 1);
    assert!(touches[0] >= record.cue_timepoints[target.index()][0]);
    assert!(record.touch_timepoints[target.other().index()].is_empty());
    assert_eq!(log.rewards(), vec![target]);

    let rt = record.reaction_times_ms();
    let first = rt[target.index()][0].expect("rewarded trial has a reaction time");
    assert!(first >= 90.0, "reaction time {first} ms");
}

#[test]
fn grasp_on_other_spout_is_incorrect() {
    let config = SessionConfig { iti: [500, 500], ..quick_config(2) };
    let rig = NullRig::new(2).unwrap();
    let inject = rig.injector();
    let log = rig.actuators();
    let session = spawn_session(config, rig, 11);

    assert!(wait_until(PATIENCE, || target_of(inject.phase()).is_some()));
    let target = target_of(inject.phase()).unwrap();
    inject.touch(target.other());

    let ev = session.events.clone();
    assert!(wait_until(PATIENCE, || {
        ev.count(|e| matches!(e, SessionEvent::TrialResolved { .. })) == 1
    }));
    // A late touch on the target after the window closed changes nothing.
    inject.touch(target);
    let report = session.abort();

    assert_eq!(report.record.trials[0].outcome, TrialOutcome::Incorrect);
    assert_eq!(report.record.reward_count, 0);
    assert_eq!(report.record.touch_timepoints[target.other().index()].len(), 1);
    assert!(report.record.touch_timepoints[target.index()].is_empty());
    assert!(log.rewards().is_empty());
    assert_eq!(report.summary.incorrect, 1);
}

#[test]
fn first_grasp_wins_the_trial() {
    let rig = NullRig::new(2).unwrap();
    let inject = rig.injector();
    let session = spawn_session(quick_config(2), rig, 3);

    assert!(wait_until(PATIENCE, || target_of(inject.phase()).is_some()));
    let target = target_of(inject.phase()).unwrap();
    inject.touch(target);
    inject.touch(target.other());

    let ev = session.events.clone();
    assert!(wait_until(PATIENCE, || {
        ev.count(|e| matches!(e, SessionEvent::TrialResolved { .. })) == 1
    }));
    let report = session.abort();

    let first = report.record.trials[0];
    assert_eq!(first.outcome, TrialOutcome::Rewarded);
    assert_eq!(report.record.reward_count, 1);
    assert!(
        report
            .record
            .trials
            .iter()
            .all(|t| t.outcome.is_terminal())
    );
}

// ── ITI ───────────────────────────────────────────────────────

#[test]
fn paw_lift_restarts_the_countdown() {
    let config = SessionConfig { iti: [300, 300], ..quick_config(1) };
    let rig = NullRig::new(1).unwrap();
    let inject = rig.injector();
    let session = spawn_session(config, rig, 5);
    let ev = session.events.clone();

    assert!(wait_until(PATIENCE, || {
        ev.when(|e| matches!(e, SessionEvent::ItiCountdown { .. })).is_some()
    }));
    let first_countdown = ev.when(|e| matches!(e, SessionEvent::ItiCountdown { .. })).unwrap();
    std::thread::sleep(Duration::from_millis(50));
    inject.lift(Paw::Left);

    assert!(wait_until(PATIENCE, || {
        ev.when(|e| matches!(e, SessionEvent::CueOn { .. })).is_some()
    }));
    let cue = ev.when(|e| matches!(e, SessionEvent::CueOn { .. })).unwrap();
    let report = session.abort();

    assert_eq!(ev.count(|e| *e == SessionEvent::ItiReset { paw: Paw::Left }), 1);
    assert!(ev.count(|e| matches!(e, SessionEvent::ItiCountdown { .. })) >= 2);
    assert!(cue.duration_since(first_countdown) >= Duration::from_millis(350));
    assert_eq!(report.record.resets_timepoints[0].len(), 1);
    assert!(report.record.resets_timepoints[1].is_empty());
    assert_eq!(report.summary.iti_resets, [1, 0]);
}

#[test]
fn spontaneous_reach_is_logged_without_breaking_the_iti() {
    let config = SessionConfig { iti: [400, 400], ..quick_config(2) };
    let rig = NullRig::new(2).unwrap();
    let inject = rig.injector();
    let session = spawn_session(config, rig, 9);
    let ev = session.events.clone();

    assert!(wait_until(PATIENCE, || {
        ev.when(|e| matches!(e, SessionEvent::ItiCountdown { .. })).is_some()
    }));
    inject.touch(SpoutId(1));

    assert!(wait_until(PATIENCE, || {
        ev.when(|e| matches!(e, SessionEvent::CueOn { .. })).is_some()
    }));
    let report = session.abort();

    assert_eq!(ev.count(|e| matches!(e, SessionEvent::ItiCountdown { .. })), 1);
    assert_eq!(ev.count(|e| *e == SessionEvent::SpontaneousReach { spout: SpoutId(1) }), 1);
    assert_eq!(report.record.spont_reach_timepoints[1].len(), 1);
    assert!(report.record.spont_reach_timepoints[0].is_empty());
    assert_eq!(report.summary.spontaneous_reaches, 1);
}

#[test]
fn button_toggles_shaping_for_the_next_trial() {
    let config = SessionConfig { iti: [300, 300], ..quick_config(1) };
    let rig = NullRig::new(1).unwrap();
    let inject = rig.injector();
    let log = rig.actuators();
    let session = spawn_session(config, rig, 2);
    let ev = session.events.clone();

    assert!(wait_until(PATIENCE, || {
        ev.when(|e| matches!(e, SessionEvent::TrialDrawn { .. })).is_some()
    }));
    assert_eq!(inject.phase(), Phase::Iti);
    inject.press(ButtonId::START);

    assert!(wait_until(PATIENCE, || {
        ev.when(|e| matches!(e, SessionEvent::CueOn { .. })).is_some()
    }));
    // Shaping rewards at cue onset, without a grasp.
    assert!(wait_until(PATIENCE, || log.rewards() == vec![SpoutId(0)]));
    let report = session.abort();

    assert!(ev.events().contains(&SessionEvent::ShapingToggled { shaping: true }));
    assert_eq!(report.record.trials[0].outcome, TrialOutcome::Missed);
    assert!(!report.record.shaping, "config shaping is not changed by the toggle");
}

// ── Cued lifts ────────────────────────────────────────────────

#[test]
fn only_lifts_during_the_cue_are_cued_lifts() {
    let config = SessionConfig { iti: [300, 300], cue_duration_ms: 5000, ..quick_config(1) };
    let rig = NullRig::new(1).unwrap();
    let inject = rig.injector();
    let session = spawn_session(config, rig, 12);
    let ev = session.events.clone();

    assert!(wait_until(PATIENCE, || {
        ev.when(|e| matches!(e, SessionEvent::ItiCountdown { .. })).is_some()
    }));
    inject.lift(Paw::Left);
    assert!(wait_until(PATIENCE, || target_of(inject.phase()).is_some()));
    inject.lift(Paw::Right);
    std::thread::sleep(Duration::from_millis(50));
    let report = session.abort();

    let record = &report.record;
    assert_eq!(record.resets_timepoints[0].len(), 1);
    assert!(record.resets_timepoints[1].is_empty());
    assert!(record.cued_lift_timepoints[0].is_empty());
    assert_eq!(record.cued_lift_timepoints[1].len(), 1);
    assert!(record.cued_lift_timepoints[1][0] >= record.cue_timepoints[0][0]);
    // A lift never resolves the trial.
    assert_eq!(record.trials[0].outcome, TrialOutcome::Missed);
}

// ── Abort ─────────────────────────────────────────────────────

#[test]
fn abort_mid_trial_keeps_partial_data() {
    let config = SessionConfig { cue_duration_ms: 5000, ..quick_config(1) };
    let rig = NullRig::new(1).unwrap();
    let inject = rig.injector();
    let log = rig.actuators();
    let session = spawn_session(config, rig, 4);

    assert!(wait_until(PATIENCE, || target_of(inject.phase()).is_some()));
    std::thread::sleep(Duration::from_millis(100));
    let aborted_at = Instant::now();
    let report = session.abort();
    assert!(aborted_at.elapsed() < Duration::from_secs(1));

    assert_eq!(report.end, EndReason::Aborted);
    assert!(report.record.manual);
    assert_eq!(report.record.trial_count, 1);
    assert_eq!(report.record.trials[0].outcome, TrialOutcome::Missed);
    assert!(report.record.duration < 5.0);
    assert_eq!(log.cleanups(), 1);
    assert_eq!(log.calls().last(), Some(&ActuatorCall::AllOff));
}

#[test]
fn grasp_just_before_abort_is_kept() {
    let config = SessionConfig { cue_duration_ms: 5000, ..quick_config(1) };
    let rig = NullRig::new(1).unwrap();
    let inject = rig.injector();
    let log = rig.actuators();
    let session = spawn_session(config, rig, 8);

    assert!(wait_until(PATIENCE, || target_of(inject.phase()).is_some()));
    assert_eq!(inject.touch(SpoutId(0)), Some(SensorKind::Reward(SpoutId(0))));
    let report = session.abort();

    let record = &report.record;
    assert_eq!(report.end, EndReason::Aborted);
    assert!(record.manual);
    assert_eq!(record.trial_count, 1);
    assert_eq!(record.trials[0].outcome, TrialOutcome::Rewarded);
    assert_eq!(record.reward_count, 1);
    assert_eq!(record.touch_timepoints[0].len(), 1);
    assert!(log.rewards().len() <= 1);
    assert_eq!(log.cleanups(), 1);
}

#[test]
fn wrong_grasp_just_before_abort_is_kept() {
    let config = SessionConfig { cue_duration_ms: 5000, ..quick_config(2) };
    let rig = NullRig::new(2).unwrap();
    let inject = rig.injector();
    let session = spawn_session(config, rig, 10);

    assert!(wait_until(PATIENCE, || target_of(inject.phase()).is_some()));
    let target = target_of(inject.phase()).unwrap();
    inject.touch(target.other());
    let report = session.abort();

    assert_eq!(report.record.trials[0].outcome, TrialOutcome::Incorrect);
    assert_eq!(report.record.reward_count, 0);
    assert_eq!(report.record.touch_timepoints[target.other().index()].len(), 1);
}

#[test]
fn abort_before_start_ends_cleanly() {
    let rig = NullRig::new(1)
        .unwrap()
        .with_rest_delay(Duration::from_secs(60));
    let log = rig.actuators();
    let session = spawn_session(quick_config(1), rig, 6);
    let ev = session.events.clone();

    assert!(wait_until(PATIENCE, || ev.when(|e| *e == SessionEvent::Started).is_some()));
    let report = session.abort();

    assert_eq!(report.end, EndReason::Aborted);
    assert_eq!(report.record.trial_count, 0);
    assert_eq!(log.cleanups(), 1);
    assert_eq!(ev.count(|e| matches!(e, SessionEvent::Ended(_))), 1);
}
