//! Session bookkeeping: the live accumulator, its collated form, and the
//! end-of-session summary.

use core::fmt;

use chrono::{DateTime, Duration as ChronoDuration, Local};
use serde::{Deserialize, Serialize};

use super::outcome::TrialOutcome;
use crate::config::SessionConfig;
use crate::rig::Apparatus;
use crate::sensors::{Paw, SpoutId, Timepoint};

/// One delivered cue and how it resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub spout: SpoutId,
    pub outcome: TrialOutcome,
}

// ---------------------------------------------------------------------------
// Live record
// ---------------------------------------------------------------------------

/// Mutable accumulator owned by the primary thread for the whole session.
///
/// Cue and touch timepoints live on the [`Apparatus`] spouts and cued
/// lifts on its paw sensors; they are pulled in at [`collate`](Self::collate).
#[derive(Debug, Clone)]
pub struct SessionRecord {
    started: DateTime<Local>,
    resets: [Vec<Timepoint>; 2],
    spontaneous: Vec<(SpoutId, Timepoint)>,
    reward_count: u32,
    trials: Vec<TrialRecord>,
}

impl Default for SessionRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRecord {
    pub fn new() -> Self {
        Self {
            started: Local::now(),
            resets: [Vec::new(), Vec::new()],
            spontaneous: Vec::new(),
            reward_count: 0,
            trials: Vec::new(),
        }
    }

    /// Mark the moment the start signal fired.
    pub fn begin(&mut self, at: DateTime<Local>) {
        self.started = at;
    }

    pub fn started(&self) -> DateTime<Local> {
        self.started
    }

    pub fn record_reset(&mut self, paw: Paw, at: Timepoint) {
        self.resets[paw.index()].push(at);
    }

    pub fn record_spontaneous_reach(&mut self, spout: SpoutId, at: Timepoint) {
        self.spontaneous.push((spout, at));
    }

    /// Register a delivered cue.  Returns the 1-based trial number.
    pub fn open_trial(&mut self, spout: SpoutId) -> u32 {
        self.trials.push(TrialRecord { spout, outcome: TrialOutcome::Pending });
        self.trials.len() as u32
    }

    /// Store the outcome of the open trial.  A trial that already has a
    /// terminal outcome keeps it.
    pub fn resolve_trial(&mut self, outcome: TrialOutcome) {
        let Some(last) = self.trials.last_mut() else {
            return;
        };
        if last.outcome.is_terminal() || !outcome.is_terminal() {
            return;
        }
        last.outcome = outcome;
        if outcome == TrialOutcome::Rewarded {
            self.reward_count += 1;
        }
    }

    pub fn trial_count(&self) -> u32 {
        self.trials.len() as u32
    }

    pub fn reward_count(&self) -> u32 {
        self.reward_count
    }

    pub fn trials(&self) -> &[TrialRecord] {
        &self.trials
    }

    /// `[left, right]` ITI reset timepoints.
    pub fn resets(&self) -> &[Vec<Timepoint>; 2] {
        &self.resets
    }

    pub fn spontaneous_reaches(&self) -> &[(SpoutId, Timepoint)] {
        &self.spontaneous
    }

    /// Freeze the record into its output form.
    ///
    /// When the session ended early (`manual`), `end` becomes the end time
    /// and the duration is recomputed from it.  Otherwise the scheduled
    /// end is reported.
    pub fn collate(
        self,
        config: &SessionConfig,
        apparatus: &Apparatus,
        manual: bool,
        end: DateTime<Local>,
    ) -> CollatedSession {
        let (end_time, duration) = if manual {
            let secs = (end - self.started).num_milliseconds().max(0) as f64 / 1000.0;
            (end, secs)
        } else {
            let scheduled = ChronoDuration::seconds(config.duration_secs as i64);
            (self.started + scheduled, config.duration_secs as f64)
        };

        let spouts = apparatus.spouts();
        let mut spont_reach_timepoints = vec![Vec::new(); spouts.len()];
        for (spout, at) in &self.spontaneous {
            if let Some(list) = spont_reach_timepoints.get_mut(spout.index()) {
                list.push(*at);
            }
        }

        CollatedSession {
            spout_count: config.spout_count,
            duration,
            cue_duration_ms: config.cue_duration_ms,
            iti: config.iti,
            reward_duration_ms: config.reward_duration_ms,
            shaping: config.shaping,
            date: self.started.format("%Y-%m-%d").to_string(),
            start_time: self.started.format("%H:%M:%S").to_string(),
            end_time: end_time.format("%H:%M:%S").to_string(),
            cue_timepoints: spouts.iter().map(|s| s.cue_timepoints().to_vec()).collect(),
            touch_timepoints: spouts.iter().map(|s| s.touch_timepoints().to_vec()).collect(),
            cued_lift_timepoints: apparatus.lift_timepoints(),
            resets_timepoints: self.resets,
            spont_reach_timepoints,
            reward_count: self.reward_count,
            trial_count: self.trials.len() as u32,
            trials: self.trials,
            manual,
        }
    }
}

// ---------------------------------------------------------------------------
// Collated record
// ---------------------------------------------------------------------------

/// Finalised session data, the shape persisted as JSON.
///
/// Spout-indexed lists have exactly `spout_count` entries; paw-indexed
/// lists are `[left, right]`.  Timepoints are epoch seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollatedSession {
    pub spout_count: u8,
    /// Seconds.  Recomputed from the actual end on a manual stop.
    pub duration: f64,
    pub cue_duration_ms: u64,
    pub iti: [u64; 2],
    pub reward_duration_ms: u64,
    pub shaping: bool,
    /// `YYYY-MM-DD`, local.
    pub date: String,
    /// `HH:MM:SS`, local.
    pub start_time: String,
    pub end_time: String,
    pub cue_timepoints: Vec<Vec<Timepoint>>,
    pub touch_timepoints: Vec<Vec<Timepoint>>,
    pub cued_lift_timepoints: [Vec<Timepoint>; 2],
    pub resets_timepoints: [Vec<Timepoint>; 2],
    pub spont_reach_timepoints: Vec<Vec<Timepoint>>,
    pub reward_count: u32,
    pub trial_count: u32,
    #[serde(default)]
    pub trials: Vec<TrialRecord>,
    #[serde(default)]
    pub manual: bool,
}

impl CollatedSession {
    /// Cue-to-grasp latency in milliseconds, per spout, one entry per cue.
    ///
    /// Each cue onset is matched with the first touch on the same spout
    /// before the next cue on any spout.  `None` where no such touch exists
    /// (missed or incorrect trials).
    pub fn reaction_times_ms(&self) -> Vec<Vec<Option<f64>>> {
        let mut all_cues: Vec<f64> = self.cue_timepoints.iter().flatten().map(|t| t.0).collect();
        all_cues.sort_by(f64::total_cmp);

        self.cue_timepoints
            .iter()
            .zip(&self.touch_timepoints)
            .map(|(cues, touches)| {
                cues.iter()
                    .map(|cue| {
                        let window_end = all_cues
                            .iter()
                            .copied()
                            .find(|&c| c > cue.0)
                            .unwrap_or(f64::INFINITY);
                        touches
                            .iter()
                            .find(|t| t.0 >= cue.0 && t.0 < window_end)
                            .map(|t| t.millis_since(*cue))
                    })
                    .collect()
            })
            .collect()
    }

    pub fn summary(&self) -> TrainingSummary {
        let count = |o: TrialOutcome| self.trials.iter().filter(|t| t.outcome == o).count() as u32;
        TrainingSummary {
            trials: self.trial_count,
            rewarded: self.reward_count,
            incorrect: count(TrialOutcome::Incorrect),
            missed: count(TrialOutcome::Missed),
            spontaneous_reaches: self.spont_reach_timepoints.iter().map(Vec::len).sum::<usize>() as u32,
            iti_resets: [
                self.resets_timepoints[0].len() as u32,
                self.resets_timepoints[1].len() as u32,
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Training results shown to the operator at the end of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrainingSummary {
    pub trials: u32,
    pub rewarded: u32,
    pub incorrect: u32,
    pub missed: u32,
    pub spontaneous_reaches: u32,
    /// `[left, right]`.
    pub iti_resets: [u32; 2],
}

impl TrainingSummary {
    /// Share of trials, in percent.  Zero when no trial ran.
    pub fn percent(&self, n: u32) -> f64 {
        if self.trials == 0 {
            0.0
        } else {
            100.0 * f64::from(n) / f64::from(self.trials)
        }
    }
}

impl fmt::Display for TrainingSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Trials:            {}", self.trials)?;
        writeln!(
            f,
            "Correct reaches:   {} ({:.1}%)",
            self.rewarded,
            self.percent(self.rewarded)
        )?;
        writeln!(
            f,
            "Incorrect reaches: {} ({:.1}%)",
            self.incorrect,
            self.percent(self.incorrect)
        )?;
        writeln!(f, "Missed cues:       {} ({:.1}%)", self.missed, self.percent(self.missed))?;
        writeln!(f, "Spont. reaches:    {}", self.spontaneous_reaches)?;
        writeln!(f, "ITI resets:        {}", self.iti_resets[0] + self.iti_resets[1])?;
        writeln!(f, "    left paw:      {}", self.iti_resets[0])?;
        write!(f, "    right paw:     {}", self.iti_resets[1])
    }
}
