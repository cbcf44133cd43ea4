//! Sensor event channel.
//!
//! Events are produced by:
//! - the physical backend's edge watcher thread
//! - the interactive backend's key listener thread
//! - `SimInjector` calls (null backend, tests)
//!
//! and consumed by the sequencer on the primary thread, once per poll
//! tick, in FIFO order.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Edge watcher │────▶│              │     │              │
//! │ Key listener │────▶│ Event Queue  │────▶│  Sequencer   │
//! │ SimInjector  │────▶│  (bounded)   │     │  (consumer)  │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! Each event carries the monitoring epoch it was armed under.  The
//! sequencer drops events from a closed epoch; these arrive when an edge
//! races a `disable_sensors`/`end_trial` call.

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use log::warn;

use crate::sensors::{ButtonId, Paw, SpoutId, Timepoint};

/// Maximum number of pending events.
pub const EVENT_QUEUE_CAP: usize = 64;

/// Identifies one armed monitoring window (one ITI or one trial).
pub type Epoch = u32;

/// What a sensor edge means in the phase it was armed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    // ── ITI ───────────────────────────────────────────────
    /// A paw left its rest before the countdown elapsed.
    Reset(Paw),
    /// A spout was touched outside a trial.
    SpontaneousReach(SpoutId),
    /// A button was pressed.
    Button(ButtonId),

    // ── Trial ─────────────────────────────────────────────
    /// The cued spout was grasped.
    Reward(SpoutId),
    /// The non-cued spout was grasped (carries the spout touched).
    Incorrect(SpoutId),
}

/// A timestamped, typed sensor event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorEvent {
    pub kind: SensorKind,
    /// Taken when the edge was observed.
    pub at: Timepoint,
    pub epoch: Epoch,
}

// ── Queue ─────────────────────────────────────────────────────

/// Bounded MPSC queue; producers hold [`EventSender`] clones.
pub struct EventQueue {
    tx: Sender<SensorEvent>,
    rx: Receiver<SensorEvent>,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    pub fn new() -> Self {
        let (tx, rx) = channel::bounded(EVENT_QUEUE_CAP);
        Self { tx, rx }
    }

    /// A producer handle for a backend or injector.
    pub fn sender(&self) -> EventSender {
        EventSender { tx: self.tx.clone() }
    }

    /// Pop the next event, if any.
    pub fn pop(&self) -> Option<SensorEvent> {
        self.rx.try_recv().ok()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }
}

/// Producer half.  Never blocks: a full queue drops the event.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<SensorEvent>,
}

impl EventSender {
    /// Push an event.  Returns `false` if it was dropped.
    pub fn push(&self, event: SensorEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(ev)) => {
                warn!("Event queue full, dropping {:?}", ev.kind);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}
