//! Session configuration parameters.
//!
//! Supplied by the operator (JSON file or defaults) and immutable once a
//! session starts.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Largest number of spouts an apparatus carries.
pub const MAX_SPOUTS: usize = 2;

/// Training settings for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Number of reach targets in use (1 or 2).
    pub spout_count: u8,
    /// Session length in seconds.
    #[serde(rename = "duration")]
    pub duration_secs: u64,
    /// How long the cue stays lit waiting for a grasp (milliseconds).
    pub cue_duration_ms: u64,
    /// Inter-trial interval bounds `[min, max]` in milliseconds.
    pub iti: [u64; 2],
    /// Solenoid open time per reward (milliseconds).
    pub reward_duration_ms: u64,
    /// Reward at cue onset instead of on grasp.
    pub shaping: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            spout_count: 1,
            duration_secs: 2400, // 40 min
            cue_duration_ms: 10_000,
            iti: [4000, 6000],
            reward_duration_ms: 220,
            shaping: false,
        }
    }
}

impl SessionConfig {
    /// Reject configurations the sequencer cannot run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_SPOUTS as u8).contains(&self.spout_count) {
            return Err(ConfigError::InvalidSpoutCount(self.spout_count));
        }
        let [min_ms, max_ms] = self.iti;
        if min_ms > max_ms {
            return Err(ConfigError::InvalidItiRange { min_ms, max_ms });
        }
        Ok(())
    }

    /// Parse a JSON mapping.  Every key is required.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn iti_min_ms(&self) -> u64 {
        self.iti[0]
    }

    pub fn iti_max_ms(&self) -> u64 {
        self.iti[1]
    }

    pub fn spouts(&self) -> usize {
        self.spout_count as usize
    }
}
