//! VAD mood model (§3 Mood, §4.3): valence/arousal/dominance, each clamped to
//! `[-1, 1]`, with lazy decay toward a per-agent default applied on read.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

fn clamp(v: f32) -> f32 {
    v.clamp(-1.0, 1.0)
}

/// Valence/arousal/dominance mood state. Mutation only happens through
/// [`Mood::apply_shift`] and [`Mood::decay_toward`] so every value stays
/// clamped by construction.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mood {
    pub valence: f32,
    pub arousal: f32,
    pub dominance: f32,
}

impl Default for Mood {
    fn default() -> Self {
        Self {
            valence: 0.0,
            arousal: 0.0,
            dominance: 0.0,
        }
    }
}

impl Mood {
    pub fn new(valence: f32, arousal: f32, dominance: f32) -> Self {
        Self {
            valence: clamp(valence),
            arousal: clamp(arousal),
            dominance: clamp(dominance),
        }
    }

    /// Adds the given shifts, clamping each axis back into `[-1, 1]`.
    pub fn apply_shift(&mut self, valence: f32, arousal: f32, dominance: f32) {
        self.valence = clamp(self.valence + valence);
        self.arousal = clamp(self.arousal + arousal);
        self.dominance = clamp(self.dominance + dominance);
    }

    /// Moves every axis a `rate` fraction of the way toward `target`.
    /// `rate` of `0.0` is a no-op, `1.0` snaps straight to `target`.
    pub fn decay_toward(&mut self, target: Mood, rate: f32) {
        let rate = rate.clamp(0.0, 1.0);
        self.valence = clamp(self.valence + (target.valence - self.valence) * rate);
        self.arousal = clamp(self.arousal + (target.arousal - self.arousal) * rate);
        self.dominance = clamp(self.dominance + (target.dominance - self.dominance) * rate);
    }
}

/// Tracks a [`Mood`] plus the agent's resting default and last-update time, so
/// decay can be applied lazily whenever the mood is read rather than on a
/// fixed timer.
#[derive(Clone, Debug)]
pub struct MoodState {
    current: Mood,
    baseline: Mood,
    /// Fraction of the way back to baseline per hour of elapsed wall time.
    decay_rate_per_hour: f32,
    last_touched: SystemTime,
}

impl MoodState {
    pub fn new(baseline: Mood, decay_rate_per_hour: f32) -> Self {
        Self {
            current: baseline,
            baseline,
            decay_rate_per_hour,
            last_touched: SystemTime::now(),
        }
    }

    /// Applies decay proportional to elapsed time since the last touch, then
    /// returns the resulting mood. Call this before every read.
    pub fn settle(&mut self, now: SystemTime) -> Mood {
        let elapsed_hours = now
            .duration_since(self.last_touched)
            .unwrap_or(Duration::ZERO)
            .as_secs_f32()
            / 3600.0;
        if elapsed_hours > 0.0 {
            let rate = (self.decay_rate_per_hour * elapsed_hours).min(1.0);
            self.current.decay_toward(self.baseline, rate);
            self.last_touched = now;
        }
        self.current
    }

    pub fn apply_shift(&mut self, now: SystemTime, valence: f32, arousal: f32, dominance: f32) {
        self.settle(now);
        self.current.apply_shift(valence, arousal, dominance);
        self.last_touched = now;
    }

    pub fn current(&self) -> Mood {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_shift_clamps_to_unit_range() {
        let mut mood = Mood::default();
        mood.apply_shift(2.0, -2.0, 0.5);
        assert_eq!(mood.valence, 1.0);
        assert_eq!(mood.arousal, -1.0);
        assert_eq!(mood.dominance, 0.5);
    }

    #[test]
    fn decay_toward_full_rate_snaps_to_target() {
        let mut mood = Mood::new(1.0, 1.0, 1.0);
        mood.decay_toward(Mood::default(), 1.0);
        assert_eq!(mood, Mood::default());
    }

    #[test]
    fn decay_toward_zero_rate_is_noop() {
        let mut mood = Mood::new(0.5, 0.5, 0.5);
        let before = mood;
        mood.decay_toward(Mood::default(), 0.0);
        assert_eq!(mood, before);
    }

    /// **Scenario**: settling after an hour with decay_rate 0.5 halves the
    /// distance to baseline.
    #[test]
    fn settle_applies_proportional_decay() {
        let mut state = MoodState::new(Mood::default(), 0.5);
        state.current = Mood::new(1.0, 0.0, 0.0);
        let now = state.last_touched + Duration::from_secs(3600);
        let mood = state.settle(now);
        assert!((mood.valence - 0.5).abs() < 1e-5);
    }

    #[test]
    fn settle_with_no_elapsed_time_is_noop() {
        let mut state = MoodState::new(Mood::default(), 0.5);
        state.current = Mood::new(1.0, 0.0, 0.0);
        let now = state.last_touched;
        let mood = state.settle(now);
        assert_eq!(mood.valence, 1.0);
    }

    #[test]
    fn apply_shift_on_state_settles_before_shifting() {
        let mut state = MoodState::new(Mood::default(), 1.0);
        state.current = Mood::new(1.0, 0.0, 0.0);
        let later = state.last_touched + Duration::from_secs(3600);
        state.apply_shift(later, 0.0, 0.0, 0.0);
        assert!((state.current().valence).abs() < 1e-5);
    }
}
