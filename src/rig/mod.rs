//! Pin/sensor model of one training apparatus.
//!
//! The [`Apparatus`] is plain data shared by every backend: the pin
//! table, one [`Spout`] per reach target in use, and the two
//! [`PawSensor`]s.  Backends own it for their lifetime; the sequencer
//! reads it once at collation time.
//!
//! Paw lift lists are appended from event context (the edge watcher or
//! key listener thread) while the primary thread may read them, so each
//! list sits behind its own lock ([`LiftLog`]).  Everything else is only
//! touched from the primary thread.

pub mod router;

use std::sync::Arc;

use heapless::Vec as FixedVec;
use parking_lot::Mutex;

use crate::config::MAX_SPOUTS;
use crate::error::{Error, Result};
use crate::pins::{PinTable, SpoutPins};
use crate::sensors::{Paw, SpoutId, Timepoint};

// ---------------------------------------------------------------------------
// Spout
// ---------------------------------------------------------------------------

/// One reach target: cue light, touch sensor, and reward solenoid.
#[derive(Debug, Clone)]
pub struct Spout {
    pub id: SpoutId,
    pub pins: SpoutPins,
    cue_on: bool,
    cue_timepoints: Vec<Timepoint>,
    touch_timepoints: Vec<Timepoint>,
}

impl Spout {
    pub fn new(id: SpoutId, pins: SpoutPins) -> Self {
        Self {
            id,
            pins,
            cue_on: false,
            cue_timepoints: Vec::new(),
            touch_timepoints: Vec::new(),
        }
    }

    pub fn cue_on(&self) -> bool {
        self.cue_on
    }

    /// Track the cue line level.  Backends call this after driving the pin.
    pub fn set_cue(&mut self, on: bool) {
        self.cue_on = on;
    }

    pub fn record_cue_onset(&mut self, at: Timepoint) {
        self.cue_timepoints.push(at);
    }

    pub fn record_touch(&mut self, at: Timepoint) {
        self.touch_timepoints.push(at);
    }

    pub fn cue_timepoints(&self) -> &[Timepoint] {
        &self.cue_timepoints
    }

    pub fn touch_timepoints(&self) -> &[Timepoint] {
        &self.touch_timepoints
    }
}

// ---------------------------------------------------------------------------
// Paw sensors
// ---------------------------------------------------------------------------

/// Lock-protected list of cued lift timepoints for one paw.
#[derive(Debug, Clone, Default)]
pub struct LiftLog(Arc<Mutex<Vec<Timepoint>>>);

impl LiftLog {
    /// Safe to call from any thread.
    pub fn record(&self, at: Timepoint) {
        self.0.lock().push(at);
    }

    pub fn snapshot(&self) -> Vec<Timepoint> {
        self.0.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Left or right paw rest.
#[derive(Debug, Clone)]
pub struct PawSensor {
    pub paw: Paw,
    pub pin: u8,
    lifts: LiftLog,
}

impl PawSensor {
    pub fn new(paw: Paw, pin: u8) -> Self {
        Self { paw, pin, lifts: LiftLog::default() }
    }

    /// A handle for event context to append lifts through.
    pub fn lift_log(&self) -> LiftLog {
        self.lifts.clone()
    }

    pub fn lift_timepoints(&self) -> Vec<Timepoint> {
        self.lifts.snapshot()
    }
}

// ---------------------------------------------------------------------------
// Apparatus
// ---------------------------------------------------------------------------

/// Logical hardware entities of one rig.
#[derive(Debug, Clone)]
pub struct Apparatus {
    pins: PinTable,
    spouts: FixedVec<Spout, MAX_SPOUTS>,
    /// Indexed `[left, right]`.
    paws: [PawSensor; 2],
}

impl Apparatus {
    pub fn new(pins: PinTable, spout_count: usize) -> Result<Self> {
        if spout_count == 0 || spout_count > MAX_SPOUTS {
            return Err(Error::HardwareInit("apparatus has one or two spouts"));
        }
        let mut spouts = FixedVec::new();
        for (idx, spout_pins) in pins.spouts.iter().take(spout_count).enumerate() {
            // Capacity is MAX_SPOUTS and `take` never exceeds it.
            let _ = spouts.push(Spout::new(SpoutId(idx as u8), *spout_pins));
        }
        Ok(Self {
            pins,
            spouts,
            paws: [
                PawSensor::new(Paw::Left, pins.paw_sensors[0]),
                PawSensor::new(Paw::Right, pins.paw_sensors[1]),
            ],
        })
    }

    pub fn pins(&self) -> &PinTable {
        &self.pins
    }

    pub fn spout_count(&self) -> usize {
        self.spouts.len()
    }

    pub fn spouts(&self) -> &[Spout] {
        &self.spouts
    }

    pub fn spout(&self, id: SpoutId) -> Option<&Spout> {
        self.spouts.get(id.index())
    }

    pub fn spout_mut(&mut self, id: SpoutId) -> Option<&mut Spout> {
        self.spouts.get_mut(id.index())
    }

    pub fn paws(&self) -> &[PawSensor; 2] {
        &self.paws
    }

    pub fn lift_logs(&self) -> [LiftLog; 2] {
        [self.paws[0].lift_log(), self.paws[1].lift_log()]
    }

    /// `[left, right]` cued lift timepoints.
    pub fn lift_timepoints(&self) -> [Vec<Timepoint>; 2] {
        [self.paws[0].lift_timepoints(), self.paws[1].lift_timepoints()]
    }

    /// The non-target spout of a trial, if the rig has one.
    pub fn other_spout(&self, target: SpoutId) -> Option<SpoutId> {
        (self.spout_count() > 1).then(|| target.other())
    }
}
