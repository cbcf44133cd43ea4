//! The trial sequencer: runs one training session on any [`Rig`].
//!
//! ```text
//!   SessionConfig ──▶ Sequencer::new ──▶ run(cancel) ──▶ SessionReport
//!                          │                 │
//!                      validate        Fsm<SessionContext<R>>
//! ```
//!
//! The run loop is single-threaded.  Sensor events produced on backend
//! threads reach it through the bounded event queue and are applied at
//! the top of each tick; every wait polls at [`POLL_INTERVAL`] so an abort
//! is seen within one interval.

pub mod outcome;
pub mod record;

use core::fmt;
use std::time::Duration;

use chrono::Local;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::adapters::log_sink::LogEventSink;
use crate::app::ports::{EventSink, Rig};
use crate::cancel::CancelToken;
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::events::EventQueue;
use crate::fsm::context::SessionContext;
use crate::fsm::{Fsm, StateId, states};
use crate::sensors::SpoutId;

pub use outcome::{OutcomeLatch, TrialOutcome};
pub use record::{CollatedSession, SessionRecord, TrainingSummary, TrialRecord};

/// Tick period while waiting on a deadline.
pub const POLL_INTERVAL: Duration = Duration::from_millis(8);

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The session duration elapsed.
    Completed,
    /// The operator stopped the session.
    Aborted,
    /// A rig read or write failed mid-session.
    HardwareFault(Error),
}

impl EndReason {
    /// Whether the session stopped before its scheduled end.
    pub fn is_manual(self) -> bool {
        self != Self::Completed
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::Aborted => f.write_str("stopped by operator"),
            Self::HardwareFault(e) => write!(f, "rig fault ({e})"),
        }
    }
}

/// Everything a finished session produced.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub record: CollatedSession,
    pub summary: TrainingSummary,
    pub end: EndReason,
}

/// Uniform draw over the spouts in use.
pub fn draw_spout<G: Rng + ?Sized>(rng: &mut G, spout_count: usize) -> SpoutId {
    SpoutId(rng.random_range(0..spout_count.max(1)) as u8)
}

/// Uniform ITI duration in `[min, max]` milliseconds.
pub fn draw_iti_ms<G: Rng + ?Sized>(rng: &mut G, config: &SessionConfig) -> u64 {
    rng.random_range(config.iti_min_ms()..=config.iti_max_ms())
}

pub struct Sequencer<R: Rig> {
    config: SessionConfig,
    rig: R,
    sink: Box<dyn EventSink>,
    rng: StdRng,
}

impl<R: Rig> Sequencer<R> {
    /// Validate `config` and bind it to `rig`.  Fails before the rig is
    /// touched if the configuration is invalid.
    pub fn new(config: SessionConfig, rig: R) -> Result<Self> {
        config.validate()?;
        if usize::from(config.spout_count) != rig.apparatus().spout_count() {
            return Err(Error::HardwareInit("rig spout count differs from config"));
        }
        Ok(Self {
            config,
            rig,
            sink: Box::new(LogEventSink::new()),
            rng: StdRng::from_os_rng(),
        })
    }

    /// Route session events somewhere other than the log.
    pub fn with_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Make target and ITI draws reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Run the session to completion, abort, or rig fault.
    ///
    /// Returns `Err` only if the rig fails to initialise; every session
    /// that got that far yields a report, partial or not.
    pub fn run(self, cancel: &CancelToken) -> Result<SessionReport> {
        let Self { config, mut rig, sink, rng } = self;

        let queue = EventQueue::new();
        if let Err(e) = rig.initialize(queue.sender(), cancel) {
            warn!("Rig initialisation failed: {e}");
            rig.cleanup();
            return Err(e);
        }

        let mut ctx = SessionContext::new(config, rig, queue, sink, cancel.clone(), rng);
        let mut fsm = Fsm::new(states::build_state_table::<R>(), StateId::AwaitingStart);
        fsm.start(&mut ctx);

        loop {
            let before = fsm.current_state();
            let after = fsm.tick(&mut ctx);
            if after.is_terminal() {
                break;
            }
            if after == before {
                std::thread::sleep(POLL_INTERVAL);
            }
        }

        let end = ctx.end.unwrap_or(EndReason::Completed);
        let SessionContext { config, rig, record, .. } = ctx;
        let record = record.collate(&config, rig.apparatus(), end.is_manual(), Local::now());
        let summary = record.summary();

        info!("# __________ The End __________ #");
        for line in summary.to_string().lines() {
            info!("{line}");
        }
        Ok(SessionReport { record, summary, end })
    }
}
