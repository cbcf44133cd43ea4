//! Port traits: the boundary between the trial sequencer and the rig.
//!
//! ```text
//!   Backend ──▶ Rig trait ──▶ Sequencer (domain)
//! ```
//!
//! Backends (physical pins, null simulation, interactive simulation)
//! implement [`Rig`].  The [`Sequencer`](crate::session::Sequencer)
//! consumes it via generics, so the session logic never touches pins,
//! threads, or terminals directly.
//!
//! Sensor callbacks do not cross this boundary as closures.  A backend
//! is handed an [`EventSender`] at [`Rig::initialize`] and pushes typed
//! [`SensorEvent`](crate::events::SensorEvent)s into it from whatever
//! context observes the edge.  Arming calls return the [`Epoch`] their
//! events will carry.

use std::time::Duration;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::events::{Epoch, EventSender};
use crate::rig::Apparatus;
use crate::sensors::{ButtonId, SpoutId, Timepoint};

// ───────────────────────────────────────────────────────────────
// Rig port (hardware abstraction)
// ───────────────────────────────────────────────────────────────

/// Capability set every backend provides.
///
/// All methods are called from the primary thread.  Monitoring is
/// asynchronous from the point of arming: `monitor_sensors` and
/// `start_trial` return immediately and events arrive through the
/// sender given to `initialize`.
pub trait Rig {
    /// The pin/sensor model the backend drives.
    fn apparatus(&self) -> &Apparatus;

    fn apparatus_mut(&mut self) -> &mut Apparatus;

    /// Claim lines and register the event sink.  Called once, before
    /// `wait_to_start`.  `cancel` is the session's token; blocking
    /// actuator pulses end early once it fires.
    fn initialize(&mut self, events: EventSender, cancel: &CancelToken) -> Result<()>;

    /// Block until the operator starts the session.  Returns `false` if
    /// `cancel` fired first.
    fn wait_to_start(&mut self, cancel: &CancelToken) -> Result<bool>;

    /// Arm the ITI window.  Paw lifts arrive as `Reset`, spout touches as
    /// `SpontaneousReach`.
    fn monitor_sensors(&mut self) -> Result<Epoch>;

    /// Deliver presses of `button` as `Button` events for the current
    /// window.
    fn set_button_callback(&mut self, button: ButtonId) -> Result<()>;

    /// Block until both paws rest.  Returns `false` if `cancel` fired first.
    fn wait_for_rest(&mut self, cancel: &CancelToken) -> Result<bool>;

    /// Close the ITI window.
    fn disable_sensors(&mut self) -> Result<()>;

    /// Light the cue on `spout`, record the onset, and arm the trial
    /// window.  Grasps arrive as `Reward` / `Incorrect`.
    fn start_trial(&mut self, spout: SpoutId) -> Result<Epoch>;

    /// Drive one cue line.
    fn set_cue(&mut self, spout: SpoutId, on: bool) -> Result<()>;

    /// Darken the cues and record a touch on the cued spout.
    fn successful_grasp(&mut self, spout: SpoutId, at: Timepoint) -> Result<()> {
        self.cues_off()?;
        if let Some(s) = self.apparatus_mut().spout_mut(spout) {
            s.record_touch(at);
        }
        Ok(())
    }

    /// Darken the cues and record a touch on the spout that was *not* cued.
    fn incorrect_grasp(&mut self, target: SpoutId, at: Timepoint) -> Result<()> {
        self.cues_off()?;
        if let Some(other) = self.apparatus().other_spout(target) {
            if let Some(s) = self.apparatus_mut().spout_mut(other) {
                s.record_touch(at);
            }
        }
        Ok(())
    }

    /// Open the solenoid on `spout` for `duration`.  Blocks for the pulse,
    /// or until the session is cancelled.
    fn dispense_water(&mut self, spout: SpoutId, duration: Duration) -> Result<()>;

    /// Darken cues and close the trial window.
    fn end_trial(&mut self) -> Result<()>;

    /// Drive every actuator OFF and stop all listeners.  Idempotent; only
    /// the first call has an effect.
    fn cleanup(&mut self);

    /// Surface asynchronous faults (e.g. a watcher thread that failed a
    /// read).  Polled by the sequencer every tick.
    fn check(&self) -> Result<()> {
        Ok(())
    }

    /// Darken every cue that is lit.
    fn cues_off(&mut self) -> Result<()> {
        let lit: Vec<SpoutId> = self
            .apparatus()
            .spouts()
            .iter()
            .filter(|s| s.cue_on())
            .map(|s| s.id)
            .collect();
        for id in lit {
            self.set_cue(id, false)?;
        }
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Event sink port (domain → logging / UI)
// ───────────────────────────────────────────────────────────────

/// The sequencer emits structured [`SessionEvent`](super::events::SessionEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::SessionEvent);
}
