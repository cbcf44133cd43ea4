//! Shared plumbing for driving whole sessions from a test thread.
//!
//! A session runs on its own thread, exactly as the binary runs it on the
//! primary thread; the test thread plays the mouse.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use reach::app::events::SessionEvent;
use reach::app::ports::{EventSink, Rig};
use reach::{CancelToken, Result, SessionConfig, SessionReport, Sequencer};

// ── Recording sink ────────────────────────────────────────────

/// Keeps every session event with the instant it was emitted.
#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<(Instant, SessionEvent)>>>);

#[allow(dead_code)]
impl Recorder {
    pub fn events(&self) -> Vec<SessionEvent> {
        self.0.lock().iter().map(|(_, e)| e.clone()).collect()
    }

    pub fn timed(&self) -> Vec<(Instant, SessionEvent)> {
        self.0.lock().clone()
    }

    /// First event matching `pred`, if emitted yet.
    pub fn find<T>(&self, pred: impl Fn(&SessionEvent) -> Option<T>) -> Option<T> {
        self.0.lock().iter().find_map(|(_, e)| pred(e))
    }

    /// When the first event matching `pred` was emitted.
    pub fn when(&self, pred: impl Fn(&SessionEvent) -> bool) -> Option<Instant> {
        self.0.lock().iter().find(|(_, e)| pred(e)).map(|(t, _)| *t)
    }

    pub fn count(&self, pred: impl Fn(&SessionEvent) -> bool) -> usize {
        self.0.lock().iter().filter(|(_, e)| pred(e)).count()
    }
}

impl EventSink for Recorder {
    fn emit(&mut self, event: &SessionEvent) {
        self.0.lock().push((Instant::now(), event.clone()));
    }
}

// ── Running sessions ──────────────────────────────────────────

pub struct Running {
    pub cancel: CancelToken,
    pub events: Recorder,
    handle: JoinHandle<Result<SessionReport>>,
}

impl Running {
    /// Cancel and collect the report.
    pub fn abort(self) -> SessionReport {
        self.cancel.cancel();
        self.join()
    }

    pub fn join(self) -> SessionReport {
        self.handle
            .join()
            .expect("session thread panicked")
            .expect("session failed to initialise")
    }
}

/// Run a seeded session on a background thread.
pub fn spawn_session<R>(config: SessionConfig, rig: R, seed: u64) -> Running
where
    R: Rig + Send + 'static,
{
    let cancel = CancelToken::new();
    let events = Recorder::default();
    let token = cancel.clone();
    let sink = events.clone();
    let handle = thread::spawn(move || {
        Sequencer::new(config, rig)?.with_sink(sink).with_seed(seed).run(&token)
    });
    Running { cancel, events, handle }
}

/// Poll `cond` every few milliseconds until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

/// Config with short timings, suitable for tests.
pub fn quick_config(spout_count: u8) -> SessionConfig {
    SessionConfig {
        spout_count,
        duration_secs: 30,
        cue_duration_ms: 2000,
        iti: [50, 50],
        reward_duration_ms: 20,
        shaping: false,
    }
}
