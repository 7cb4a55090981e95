use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::challenge::ChallengeSequence;
use crate::engine::{Phase, TimingSession};

/// Percent of the per-symbol budget a response may use and still count as perfect
pub const PERFECT_PERCENT: u128 = 60;

/// Result of one play-through, produced once the session reaches a terminal phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub success: bool,
    pub buttons_correct: usize,
    pub total_buttons: usize,
    pub time_taken_seconds: f64,
    pub perfect: bool,
}

impl Outcome {
    pub fn evaluate(
        session: &TimingSession,
        sequence: &ChallengeSequence,
        time_taken: Duration,
    ) -> Self {
        let success = session.phase == Phase::Succeeded;
        let perfect = success && is_perfect(&session.sample_durations, sequence.time_per_symbol());

        Self {
            success,
            buttons_correct: session.correct_count,
            total_buttons: sequence.len(),
            time_taken_seconds: time_taken.as_secs_f64(),
            perfect,
        }
    }

    /// Percentage of buttons hit, as reported back to the player
    pub fn accuracy(&self) -> f64 {
        if self.total_buttons == 0 {
            return 0.0;
        }
        (self.buttons_correct as f64 / self.total_buttons as f64) * 100.0
    }
}

pub fn is_perfect(samples: &[Duration], time_per_symbol: Duration) -> bool {
    // integer nanos so the boundary stays exact for any budget
    let budget = time_per_symbol.as_nanos() * PERFECT_PERCENT;
    samples.iter().all(|d| d.as_nanos() * 100 <= budget)
}

/// Attempt report handed to whoever records captures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatchAttempt {
    pub pokemon_id: u32,
    pub success: bool,
    pub buttons_correct: usize,
    pub total_buttons: usize,
    pub time_taken_seconds: f64,
    pub perfect: bool,
}

impl CatchAttempt {
    pub fn new(pokemon_id: u32, outcome: &Outcome) -> Self {
        Self {
            pokemon_id,
            success: outcome.success,
            buttons_correct: outcome.buttons_correct,
            total_buttons: outcome.total_buttons,
            time_taken_seconds: outcome.time_taken_seconds,
            perfect: outcome.perfect,
        }
    }

    pub fn accuracy(&self) -> f64 {
        if self.total_buttons == 0 {
            return 0.0;
        }
        (self.buttons_correct as f64 / self.total_buttons as f64) * 100.0
    }
}
