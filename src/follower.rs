//! Score Follower
//!
//! A sequential, debounced matcher that walks an expected melody one event at
//! a time. The follower only ever moves forward: it never skips an event and
//! never revisits one, so its position doubles as the count of recognized
//! notes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    autocorr::{AutocorrConfig, AutocorrError, AutocorrEstimator},
    classifier::{NoteId, PitchEstimate, ReferenceNoteSet},
    score::{DurationClass, DurationTable, Score},
    signal::SampleBuffer,
};

/// Errors from following a recording.
#[derive(Debug, Error)]
pub enum FollowError {
    /// Fewer notes were recognized than the score holds.
    #[error("recognized {recognized} of {expected} notes")]
    Incomplete {
        /// Notes matched in order.
        recognized: usize,
        /// Length of the score.
        expected: usize,
    },

    /// Frame geometry is unusable.
    #[error("invalid frame geometry: frame_size {frame_size}, hop_size {hop_size}")]
    InvalidFrames {
        /// Configured frame size.
        frame_size: usize,
        /// Configured hop.
        hop_size: usize,
    },

    /// The hold fraction is negative or not finite.
    #[error("hold fraction {0} is invalid")]
    InvalidHoldFraction(f64),

    /// The recording is shorter than a single frame.
    #[error("recording of {available} samples is shorter than one {frame_size}-sample frame")]
    BufferTooShort {
        /// Configured frame size.
        frame_size: usize,
        /// Samples in the recording.
        available: usize,
    },

    /// The pitch estimator rejected its configuration.
    #[error(transparent)]
    Autocorr(#[from] AutocorrError),
}

/// Debounce parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoldConfig {
    /// Lower bound on the hold time in milliseconds.
    pub floor_ms: u32,
    /// Fraction of the nominal duration that must elapse between matches.
    pub fraction: f64,
    /// Nominal duration of each class.
    pub durations: DurationTable,
}

impl HoldConfig {
    /// Minimum time since the previous accepted match before an event of
    /// `class` may be accepted.
    pub fn min_hold_ms(&self, class: DurationClass) -> u64 {
        let scaled = (self.durations.nominal_ms(class) as f64 * self.fraction).floor() as u64;
        scaled.max(self.floor_ms as u64)
    }
}

impl Default for HoldConfig {
    fn default() -> Self {
        HoldConfig {
            floor_ms: 110,
            fraction: 0.45,
            durations: DurationTable::default(),
        }
    }
}

/// Outcome of one follower step.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Step {
    /// The expected note was accepted; `index` is the event just matched.
    Advanced {
        /// Zero-based score position of the matched event.
        index: usize,
    },
    /// The expected note was heard, but too soon after the previous match.
    Held,
    /// The detected note differs from the expected one.
    Mismatch,
    /// The whole score has already been recognized.
    Finished,
}

/// Follower state: a pointer into the score and the time of the last match.
#[derive(Debug, Clone)]
pub struct ScoreFollower<'a> {
    score: &'a Score,
    hold: HoldConfig,
    position: usize,
    last_match_ms: Option<u64>,
    matched_at_ms: Vec<u64>,
}

impl<'a> ScoreFollower<'a> {
    /// Start at the beginning of `score`.
    pub fn new(score: &'a Score, hold: HoldConfig) -> Self {
        ScoreFollower {
            score,
            hold,
            position: 0,
            last_match_ms: None,
            matched_at_ms: Vec::with_capacity(score.len()),
        }
    }

    /// Number of events recognized so far.
    pub fn position(&self) -> usize {
        self.position
    }

    /// `true` once every event has been recognized.
    pub fn is_finished(&self) -> bool {
        self.position == self.score.len()
    }

    /// Time of the last accepted match.
    pub fn last_match_ms(&self) -> Option<u64> {
        self.last_match_ms
    }

    /// Acceptance time of each recognized event, in score order.
    pub fn matched_at_ms(&self) -> &[u64] {
        &self.matched_at_ms
    }

    /// Feed the note detected at `now_ms`.
    ///
    /// This is the only way the follower's state changes. The pointer moves by
    /// at most one and only when `detected` is the expected note and the hold
    /// time of that event has passed since the previous accepted match.
    pub fn step(&mut self, detected: NoteId, now_ms: u64) -> Step {
        let Some(expected) = self.score.get(self.position) else {
            return Step::Finished;
        };
        if detected != expected.note {
            return Step::Mismatch;
        }
        if let Some(last) = self.last_match_ms {
            if now_ms.saturating_sub(last) < self.hold.min_hold_ms(expected.duration) {
                return Step::Held;
            }
        }

        let index = self.position;
        self.position += 1;
        self.last_match_ms = Some(now_ms);
        self.matched_at_ms.push(now_ms);
        Step::Advanced { index }
    }

    /// Freeze the current state into a report.
    pub fn report(&self) -> FollowReport {
        FollowReport {
            recognized: self.position,
            expected: self.score.len(),
            matched_at_ms: self.matched_at_ms.clone(),
        }
    }
}

/// Result of following a whole recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowReport {
    /// Events recognized in order.
    pub recognized: usize,
    /// Events in the score.
    pub expected: usize,
    /// Acceptance time of each recognized event.
    pub matched_at_ms: Vec<u64>,
}

impl FollowReport {
    /// `true` when the whole score was recognized.
    pub fn is_complete(&self) -> bool {
        self.recognized == self.expected
    }

    /// `Err(FollowError::Incomplete)` unless every event was recognized.
    pub fn verify(&self) -> Result<(), FollowError> {
        if self.is_complete() {
            Ok(())
        } else {
            Err(FollowError::Incomplete {
                recognized: self.recognized,
                expected: self.expected,
            })
        }
    }
}

/// Frame geometry, pitch search and debounce for following a recording.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowConfig {
    /// Samples per analysis frame (power of two).
    pub frame_size: usize,
    /// Samples between frame starts; one follower step per hop.
    pub hop_size: usize,
    /// Autocorrelation search parameters.
    pub autocorr: AutocorrConfig,
    /// Debounce parameters.
    pub hold: HoldConfig,
}

impl Default for FollowConfig {
    fn default() -> Self {
        FollowConfig {
            frame_size: 1024,
            hop_size: 512,
            autocorr: AutocorrConfig::default(),
            hold: HoldConfig::default(),
        }
    }
}

/// Run the follower over `recording`, one step per hop, until the score is
/// recognized or the recording ends.
pub fn follow_recording(
    recording: &SampleBuffer,
    score: &Score,
    references: &ReferenceNoteSet,
    config: &FollowConfig,
) -> Result<FollowReport, FollowError> {
    let FollowConfig {
        frame_size,
        hop_size,
        ..
    } = *config;
    if !frame_size.is_power_of_two() || hop_size == 0 || hop_size > frame_size {
        return Err(FollowError::InvalidFrames {
            frame_size,
            hop_size,
        });
    }
    if !(config.hold.fraction >= 0.0 && config.hold.fraction.is_finite()) {
        return Err(FollowError::InvalidHoldFraction(config.hold.fraction));
    }
    if recording.len() < frame_size {
        return Err(FollowError::BufferTooShort {
            frame_size,
            available: recording.len(),
        });
    }

    let mut estimator = AutocorrEstimator::new(config.autocorr)?;
    let mut follower = ScoreFollower::new(score, config.hold);
    let rate = recording.sample_rate();

    for frame in recording.frames(frame_size, hop_size) {
        if follower.is_finished() {
            break;
        }
        let estimate = PitchEstimate::from(estimator.estimate(frame.samples, rate));
        let detected = references.classify(&estimate);
        let now_ms = frame.start_ms(rate);
        if let Step::Advanced { index } = follower.step(detected, now_ms) {
            log::debug!("matched score event {} (note {}) at {} ms", index, detected, now_ms);
        }
    }

    let report = follower.report();
    log::info!("recognized {}/{} notes", report.recognized, report.expected);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::ScoreEvent;

    fn score(notes: &[(u16, DurationClass)]) -> Score {
        Score::new(
            notes
                .iter()
                .map(|&(n, duration)| ScoreEvent { note: NoteId(n), duration })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn hold_uses_floor_and_fraction() {
        let hold = HoldConfig::default();
        assert_eq!(hold.min_hold_ms(DurationClass::Sixteenth), 110);
        assert_eq!(hold.min_hold_ms(DurationClass::Eighth), 110);
        assert_eq!(hold.min_hold_ms(DurationClass::Quarter), 202);
        assert_eq!(hold.min_hold_ms(DurationClass::Half), 405);
        assert_eq!(hold.min_hold_ms(DurationClass::Whole), 810);
    }

    #[test]
    fn first_match_needs_no_hold() {
        let s = score(&[(3, DurationClass::Half)]);
        let mut f = ScoreFollower::new(&s, HoldConfig::default());
        assert_eq!(f.step(NoteId(3), 0), Step::Advanced { index: 0 });
        assert!(f.is_finished());
        assert_eq!(f.step(NoteId(3), 5000), Step::Finished);
        assert_eq!(f.position(), 1);
    }

    #[test]
    fn repeated_note_is_debounced() {
        let s = score(&[(2, DurationClass::Quarter), (2, DurationClass::Quarter)]);
        let mut f = ScoreFollower::new(&s, HoldConfig::default());
        assert_eq!(f.step(NoteId(2), 100), Step::Advanced { index: 0 });
        assert_eq!(f.step(NoteId(2), 200), Step::Held);
        assert_eq!(f.step(NoteId(2), 301), Step::Held);
        assert_eq!(f.step(NoteId(2), 302), Step::Advanced { index: 1 });
        assert_eq!(f.matched_at_ms(), &[100, 302]);
    }

    #[test]
    fn no_skipping_ahead() {
        let s = score(&[(1, DurationClass::Eighth), (2, DurationClass::Eighth)]);
        let mut f = ScoreFollower::new(&s, HoldConfig::default());
        assert_eq!(f.step(NoteId(2), 0), Step::Mismatch);
        assert_eq!(f.step(NoteId::SILENCE, 10), Step::Mismatch);
        assert_eq!(f.position(), 0);
        assert_eq!(f.last_match_ms(), None);
    }

    #[test]
    fn pointer_never_moves_back_or_past_the_end() {
        let s = score(&[
            (1, DurationClass::Sixteenth),
            (2, DurationClass::Eighth),
            (2, DurationClass::Quarter),
            (3, DurationClass::Half),
            (1, DurationClass::Whole),
        ]);
        for seed in 0..20u64 {
            let mut state = seed;
            let mut next = move || {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                state >> 33
            };
            let mut f = ScoreFollower::new(&s, HoldConfig::default());
            let mut now_ms = 0u64;
            let mut before = f.position();
            for _ in 0..500 {
                now_ms += next() % 120;
                let detected = NoteId((next() % 4) as u16);
                let step = f.step(detected, now_ms);
                let after = f.position();
                assert!(after >= before && after <= before + 1, "seed {seed}");
                assert!(after <= s.len(), "seed {seed}");
                assert_eq!(after == before + 1, matches!(step, Step::Advanced { .. }));
                assert_eq!(f.matched_at_ms().len(), after);
                before = after;
            }
        }
    }

    #[test]
    fn verify_reports_shortfall() {
        let s = score(&[(1, DurationClass::Eighth), (2, DurationClass::Eighth)]);
        let mut f = ScoreFollower::new(&s, HoldConfig::default());
        f.step(NoteId(1), 0);
        let report = f.report();
        assert!(!report.is_complete());
        assert!(matches!(
            report.verify(),
            Err(FollowError::Incomplete { recognized: 1, expected: 2 })
        ));
    }
}
