//! Session state handlers and table builder.
//!
//! Each state is three plain `fn` pointers, generic over the rig.
//!
//! ```text
//!  AWAITING_START ──[start]──▶ TRIAL_SETUP ──[past end time]──▶ SESSION_END
//!                                   │  ▲
//!                     [draw spout, arm ITI]
//!                                   ▼  │
//!                           WAITING_FOR_REST ◀──[paw lift]──┐
//!                                   │                       │
//!                              [both paws]                  │
//!                                   ▼                       │
//!                             COUNTING_DOWN ────────────────┘
//!                                   │
//!                             [ITI elapsed]
//!                                   ▼
//!                                 TRIAL ──[grasp | cue timeout]──▶ POST_TRIAL
//!                                                                     │
//!                                     TRIAL_SETUP ◀──[hold elapsed]───┘
//!
//!  Any state ──[abort | rig fault]──▶ SESSION_END
//! ```

use std::time::{Duration, Instant};

use chrono::Local;
use log::{debug, info, warn};

use super::context::SessionContext;
use super::{StateDescriptor, StateId};
use crate::app::events::SessionEvent;
use crate::app::ports::Rig;
use crate::events::SensorKind;
use crate::session::outcome::TrialOutcome;
use crate::session::{EndReason, draw_iti_ms, draw_spout};
use crate::sensors::ButtonId;

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

pub fn build_state_table<R: Rig>() -> [StateDescriptor<SessionContext<R>>; StateId::COUNT] {
    [
        StateDescriptor {
            id: StateId::AwaitingStart,
            name: "AwaitingStart",
            on_enter: Some(awaiting_start_enter::<R>),
            on_exit: None,
            on_update: awaiting_start_update::<R>,
        },
        StateDescriptor {
            id: StateId::TrialSetup,
            name: "TrialSetup",
            on_enter: None,
            on_exit: None,
            on_update: trial_setup_update::<R>,
        },
        StateDescriptor {
            id: StateId::WaitingForRest,
            name: "WaitingForRest",
            on_enter: None,
            on_exit: None,
            on_update: waiting_for_rest_update::<R>,
        },
        StateDescriptor {
            id: StateId::CountingDown,
            name: "CountingDown",
            on_enter: None,
            on_exit: None,
            on_update: counting_down_update::<R>,
        },
        StateDescriptor {
            id: StateId::Trial,
            name: "Trial",
            on_enter: Some(trial_enter::<R>),
            on_exit: None,
            on_update: trial_update::<R>,
        },
        StateDescriptor {
            id: StateId::PostTrial,
            name: "PostTrial",
            on_enter: Some(post_trial_enter::<R>),
            on_exit: None,
            on_update: post_trial_update::<R>,
        },
        StateDescriptor {
            id: StateId::SessionEnd,
            name: "SessionEnd",
            on_enter: Some(session_end_enter::<R>),
            on_exit: None,
            on_update: session_end_update::<R>,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  AWAITING_START
// ═══════════════════════════════════════════════════════════════════════════

fn awaiting_start_enter<R: Rig>(ctx: &mut SessionContext<R>) {
    let c = &ctx.config;
    info!("_________________________________");
    info!("Spouts:      {}", c.spout_count);
    info!("Duration:    {} s", c.duration_secs);
    info!("Cue:         {} ms", c.cue_duration_ms);
    info!("ITI:         {} - {} ms", c.iti_min_ms(), c.iti_max_ms());
    info!("Reward:      {} ms", c.reward_duration_ms);
    info!("Shaping:     {}", c.shaping);
    info!("_________________________________");
    let settings = SessionEvent::Settings(ctx.config.clone());
    ctx.emit(settings);
}

fn awaiting_start_update<R: Rig>(ctx: &mut SessionContext<R>) -> Option<StateId> {
    if let Some(next) = ctx.interrupted() {
        return Some(next);
    }
    let cancel = ctx.cancel.clone();
    match ctx.rig.wait_to_start(&cancel) {
        Ok(true) => {
            ctx.record.begin(Local::now());
            ctx.session_end =
                Some(Instant::now() + Duration::from_secs(ctx.config.duration_secs));
            ctx.emit(SessionEvent::Started);
            Some(StateId::TrialSetup)
        }
        Ok(false) => ctx.end_with(EndReason::Aborted),
        Err(e) => ctx.fail(e),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  TRIAL_SETUP: end check, target draw, ITI arming
// ═══════════════════════════════════════════════════════════════════════════

fn trial_setup_update<R: Rig>(ctx: &mut SessionContext<R>) -> Option<StateId> {
    if let Some(next) = ctx.interrupted() {
        return Some(next);
    }
    if SessionContext::<R>::past(ctx.session_end) {
        info!("Session time elapsed");
        return ctx.end_with(EndReason::Completed);
    }

    // Drawn before the ITI so the draw is independent of how the ITI goes.
    ctx.spout = draw_spout(&mut ctx.rng, ctx.config.spouts());
    ctx.trial = ctx.record.trial_count() + 1;
    ctx.shaping = ctx.config.shaping;

    let epoch = match ctx.rig.monitor_sensors() {
        Ok(epoch) => epoch,
        Err(e) => return ctx.fail(e),
    };
    ctx.armed = Some(epoch);
    ctx.iti_live = true;
    if let Err(e) = ctx.rig.set_button_callback(ButtonId::START) {
        return ctx.fail(e);
    }

    let elapsed = Local::now().signed_duration_since(ctx.record.started()).num_seconds();
    info!("# ---- Starting trial #{} -- {:4} s ---- #", ctx.trial, elapsed);
    ctx.emit(SessionEvent::TrialDrawn { trial: ctx.trial, spout: ctx.spout });
    Some(StateId::WaitingForRest)
}

// ═══════════════════════════════════════════════════════════════════════════
//  ITI: WAITING_FOR_REST → COUNTING_DOWN
// ═══════════════════════════════════════════════════════════════════════════

/// Apply pending ITI events.  Returns `true` if a paw lift broke the ITI.
fn drain_iti_events<R: Rig>(ctx: &mut SessionContext<R>) -> bool {
    let mut broken = false;
    while let Some(event) = ctx.next_event() {
        match event.kind {
            SensorKind::Reset(paw) => {
                ctx.record.record_reset(paw, event.at);
                ctx.emit(SessionEvent::ItiReset { paw });
                broken = true;
            }
            SensorKind::SpontaneousReach(spout) => {
                ctx.record.record_spontaneous_reach(spout, event.at);
                ctx.emit(SessionEvent::SpontaneousReach { spout });
            }
            SensorKind::Button(ButtonId::START) => {
                ctx.shaping = !ctx.shaping;
                info!("Shaping {} for the next trial", if ctx.shaping { "on" } else { "off" });
                ctx.emit(SessionEvent::ShapingToggled { shaping: ctx.shaping });
            }
            other => debug!("{other:?} ignored during ITI"),
        }
    }
    broken
}

fn waiting_for_rest_update<R: Rig>(ctx: &mut SessionContext<R>) -> Option<StateId> {
    if let Some(next) = ctx.interrupted() {
        return Some(next);
    }
    drain_iti_events(ctx);

    let cancel = ctx.cancel.clone();
    match ctx.rig.wait_for_rest(&cancel) {
        Ok(true) => {}
        Ok(false) => return ctx.end_with(EndReason::Aborted),
        Err(e) => return ctx.fail(e),
    }
    // Lifts seen while the paws were still settling do not break the
    // countdown that follows.
    drain_iti_events(ctx);

    let ms = draw_iti_ms(&mut ctx.rng, &ctx.config);
    ctx.iti_deadline = Some(Instant::now() + Duration::from_millis(ms));
    debug!("ITI countdown {ms} ms");
    ctx.emit(SessionEvent::ItiCountdown { ms });
    Some(StateId::CountingDown)
}

fn counting_down_update<R: Rig>(ctx: &mut SessionContext<R>) -> Option<StateId> {
    if let Some(next) = ctx.interrupted() {
        return Some(next);
    }
    if drain_iti_events(ctx) {
        return Some(StateId::WaitingForRest);
    }
    if !SessionContext::<R>::past(ctx.iti_deadline) {
        return None;
    }

    ctx.iti_deadline = None;
    if ctx.iti_live {
        ctx.iti_live = false;
        ctx.armed = None;
        if let Err(e) = ctx.rig.disable_sensors() {
            return ctx.fail(e);
        }
    }
    Some(StateId::Trial)
}

// ═══════════════════════════════════════════════════════════════════════════
//  TRIAL
// ═══════════════════════════════════════════════════════════════════════════

fn trial_enter<R: Rig>(ctx: &mut SessionContext<R>) {
    ctx.latch.rearm();
    let epoch = match ctx.rig.start_trial(ctx.spout) {
        Ok(epoch) => epoch,
        Err(e) => return ctx.fault(e),
    };
    ctx.armed = Some(epoch);
    ctx.trial_open = true;
    ctx.trial = ctx.record.open_trial(ctx.spout);
    info!("Cue illuminated on {}", ctx.spout);
    ctx.emit(SessionEvent::CueOn { trial: ctx.trial, spout: ctx.spout });

    if ctx.shaping {
        let duration = ctx.reward_duration();
        if let Err(e) = ctx.rig.dispense_water(ctx.spout, duration) {
            return ctx.fault(e);
        }
    }
    ctx.cue_deadline =
        Some(Instant::now() + Duration::from_millis(ctx.config.cue_duration_ms));
}

/// Apply pending grasp events.  Only the first one to latch acts.
/// Water is owed for a rewarded grasp only while the session runs.
fn drain_trial_events<R: Rig>(
    ctx: &mut SessionContext<R>,
    dispense: bool,
) -> crate::error::Result<()> {
    while let Some(event) = ctx.next_event() {
        match event.kind {
            SensorKind::Reward(spout) => {
                if !ctx.latch.latch(TrialOutcome::Rewarded) {
                    continue;
                }
                ctx.rig.successful_grasp(spout, event.at)?;
                if dispense && !ctx.shaping {
                    let duration = ctx.reward_duration();
                    ctx.rig.dispense_water(ctx.spout, duration)?;
                }
            }
            SensorKind::Incorrect(_) => {
                if !ctx.latch.latch(TrialOutcome::Incorrect) {
                    continue;
                }
                ctx.rig.incorrect_grasp(ctx.spout, event.at)?;
            }
            other => debug!("{other:?} ignored during trial"),
        }
    }
    Ok(())
}

/// Call `end_trial` if the trial is still open and store its outcome.
fn close_trial<R: Rig>(ctx: &mut SessionContext<R>) -> crate::error::Result<()> {
    if !ctx.trial_open {
        return Ok(());
    }
    ctx.trial_open = false;
    ctx.armed = None;
    ctx.cue_deadline = None;
    ctx.latch.latch(TrialOutcome::Missed);
    let outcome = ctx.latch.get();
    ctx.record.resolve_trial(outcome);

    info!("Trial {}: {}  (total rewards: {})", ctx.trial, outcome, ctx.record.reward_count());
    ctx.emit(SessionEvent::TrialResolved { trial: ctx.trial, outcome });
    ctx.rig.end_trial()
}

fn trial_update<R: Rig>(ctx: &mut SessionContext<R>) -> Option<StateId> {
    if let Some(next) = ctx.interrupted() {
        return Some(next);
    }
    if let Err(e) = drain_trial_events(ctx, true) {
        return ctx.fail(e);
    }
    if !ctx.latch.is_resolved() && !SessionContext::<R>::past(ctx.cue_deadline) {
        return None;
    }
    match close_trial(ctx) {
        Ok(()) => Some(StateId::PostTrial),
        Err(e) => ctx.fail(e),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  POST_TRIAL
// ═══════════════════════════════════════════════════════════════════════════

fn post_trial_enter<R: Rig>(ctx: &mut SessionContext<R>) {
    let hold = if ctx.latch.get().holds_after_trial() {
        ctx.reward_duration()
    } else {
        Duration::ZERO
    };
    ctx.hold_until = Some(Instant::now() + hold);
}

fn post_trial_update<R: Rig>(ctx: &mut SessionContext<R>) -> Option<StateId> {
    if let Some(next) = ctx.interrupted() {
        return Some(next);
    }
    if SessionContext::<R>::past(ctx.hold_until) {
        ctx.hold_until = None;
        return Some(StateId::TrialSetup);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  SESSION_END
// ═══════════════════════════════════════════════════════════════════════════

fn session_end_enter<R: Rig>(ctx: &mut SessionContext<R>) {
    // Edges seen before the stop still belong to the open window.
    if ctx.trial_open {
        if let Err(e) = drain_trial_events(ctx, false) {
            warn!("Grasp bookkeeping failed during shutdown: {e}");
        }
    } else if ctx.iti_live {
        drain_iti_events(ctx);
    }

    // An interrupted trial keeps whatever outcome it already latched.
    if let Err(e) = close_trial(ctx) {
        warn!("end_trial failed during shutdown: {e}");
    }
    if ctx.iti_live {
        ctx.iti_live = false;
        ctx.armed = None;
        if let Err(e) = ctx.rig.disable_sensors() {
            warn!("disable_sensors failed during shutdown: {e}");
        }
    }
    if !ctx.cleaned_up {
        ctx.cleaned_up = true;
        ctx.rig.cleanup();
    }

    let reason = *ctx.end.get_or_insert(EndReason::Completed);
    info!("Session ended: {reason}");
    ctx.emit(SessionEvent::Ended(reason));
}

fn session_end_update<R: Rig>(_ctx: &mut SessionContext<R>) -> Option<StateId> {
    None
}
