//! Note Classifier
//!
//! Maps a pitch estimate to the nearest member of a finite reference note set.
//! A [`ReferenceNoteSet`] must exist before anything can be classified; it is
//! built once (from a musical table or from reference recordings) and then only
//! read.

use std::fmt::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    notation::Pitch,
    signal::SampleBuffer,
    spectral::{SpectralAnalyzer, SpectralError},
};

/// Identifier of a reference note; `0` is reserved for silence.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct NoteId(pub u16);

impl NoteId {
    /// The silence label.
    pub const SILENCE: NoteId = NoteId(0);

    /// `true` for the silence label.
    pub const fn is_silence(self) -> bool {
        self.0 == 0
    }
}

impl Display for NoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A per-frame pitch estimate awaiting classification.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum PitchEstimate {
    /// Gated or unpitched frame.
    Silent,
    /// A frequency in Hz (autocorrelation estimate).
    Frequency(f32),
    /// A dominant spectral bin and its centre frequency.
    Bin {
        /// Bin index.
        bin: usize,
        /// Bin centre frequency in Hz.
        frequency: f32,
    },
}

impl From<Option<f32>> for PitchEstimate {
    fn from(hz: Option<f32>) -> Self {
        match hz {
            Some(hz) => PitchEstimate::Frequency(hz),
            None => PitchEstimate::Silent,
        }
    }
}

/// The unit reference values are expressed in.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReferenceDomain {
    /// Canonical frequencies in Hz.
    Frequency,
    /// Representative dominant bins for one frame geometry.
    Bin {
        /// Transform size the bins were measured with.
        frame_size: usize,
        /// Sample rate of the reference recordings.
        sample_rate: u32,
    },
}

/// One entry of a [`ReferenceNoteSet`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceNote {
    /// Identifier, `1..=K` in insertion order.
    pub id: NoteId,
    /// Reference frequency or bin.
    pub value: f32,
    /// Optional human-readable name, e.g. `C#5`.
    pub label: Option<String>,
}

/// Errors from building reference sets.
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// No reference notes were supplied.
    #[error("reference note set is empty")]
    EmptyReferenceSet,

    /// A reference value is negative or not finite.
    #[error("reference value {value} at position {index} is not a finite, non-negative number")]
    InvalidValue {
        /// Zero-based position of the value.
        index: usize,
        /// The offending value.
        value: f32,
    },

    /// The set would hold more notes than identifiers allow.
    #[error("reference set of {0} notes exceeds the identifier range")]
    TooManyNotes(usize),

    /// The requested pitch range is reversed.
    #[error("pitch range {low}..={high} is empty")]
    EmptyRange {
        /// Lowest pitch.
        low: Pitch,
        /// Highest pitch.
        high: Pitch,
    },

    /// A reference recording holds no frame above the energy gate.
    #[error("reference recording {index} has no frames above the silence gate")]
    SilentRecording {
        /// Zero-based recording index.
        index: usize,
    },

    /// Reference recordings disagree on sample rate.
    #[error("reference recording {index} is sampled at {got} Hz, expected {expected} Hz")]
    SampleRateMismatch {
        /// Zero-based recording index.
        index: usize,
        /// Rate of the first recording.
        expected: u32,
        /// Rate of this recording.
        got: u32,
    },

    /// Bins measured for one frame geometry cannot classify another.
    #[error("reference bins were measured at {expected_frame_size} samples / {expected_rate} Hz, got {frame_size} / {sample_rate}")]
    IncompatibleGeometry {
        /// Reference frame size.
        expected_frame_size: usize,
        /// Reference sample rate.
        expected_rate: u32,
        /// Analysed frame size.
        frame_size: usize,
        /// Analysed sample rate.
        sample_rate: u32,
    },

    /// Spectral analysis of a reference recording failed.
    #[error(transparent)]
    Spectral(#[from] SpectralError),
}

/// Ordered, immutable set of reference notes.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceNoteSet {
    domain: ReferenceDomain,
    notes: Vec<ReferenceNote>,
}

impl ReferenceNoteSet {
    fn from_entries<I>(domain: ReferenceDomain, entries: I) -> Result<Self, ClassifierError>
    where
        I: IntoIterator<Item = (Option<String>, f32)>,
    {
        let mut notes = Vec::new();
        for (index, (label, value)) in entries.into_iter().enumerate() {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ClassifierError::InvalidValue { index, value });
            }
            let id = u16::try_from(index + 1).map_err(|_| ClassifierError::TooManyNotes(index + 1))?;
            notes.push(ReferenceNote {
                id: NoteId(id),
                value,
                label,
            });
        }
        if notes.is_empty() {
            return Err(ClassifierError::EmptyReferenceSet);
        }
        Ok(ReferenceNoteSet { domain, notes })
    }

    /// Set of canonical frequencies, numbered from 1 in order.
    pub fn from_frequencies<I: IntoIterator<Item = f32>>(frequencies: I) -> Result<Self, ClassifierError> {
        Self::from_entries(
            ReferenceDomain::Frequency,
            frequencies.into_iter().map(|hz| (None, hz)),
        )
    }

    /// Set of named canonical frequencies, numbered from 1 in order.
    pub fn from_labeled_frequencies<I, S>(entries: I) -> Result<Self, ClassifierError>
    where
        I: IntoIterator<Item = (S, f32)>,
        S: Into<String>,
    {
        Self::from_entries(
            ReferenceDomain::Frequency,
            entries.into_iter().map(|(label, hz)| (Some(label.into()), hz)),
        )
    }

    /// Set of representative bins measured at `frame_size` / `sample_rate`.
    pub fn from_bins<I: IntoIterator<Item = usize>>(
        bins: I,
        frame_size: usize,
        sample_rate: u32,
    ) -> Result<Self, ClassifierError> {
        Self::from_entries(
            ReferenceDomain::Bin {
                frame_size,
                sample_rate,
            },
            bins.into_iter().map(|bin| (None, bin as f32)),
        )
    }

    /// Every chromatic pitch from `low` to `high` inclusive, labelled by name.
    pub fn equal_tempered(low: Pitch, high: Pitch) -> Result<Self, ClassifierError> {
        if low > high {
            return Err(ClassifierError::EmptyRange { low, high });
        }
        let pitches = (low.midi()..=high.midi()).filter_map(Pitch::from_midi);
        Self::from_labeled_frequencies(pitches.map(|p| (p.to_string(), p.frequency())))
    }

    /// The value domain.
    pub fn domain(&self) -> ReferenceDomain {
        self.domain
    }

    /// All notes in identifier order.
    pub fn notes(&self) -> &[ReferenceNote] {
        &self.notes
    }

    /// Number of reference notes (K).
    pub fn len(&self) -> usize {
        self.notes.len()
    }

    /// Always `false`; an empty set cannot be built.
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Look up a note by identifier.
    pub fn get(&self, id: NoteId) -> Option<&ReferenceNote> {
        if id.is_silence() {
            return None;
        }
        self.notes.get(id.0 as usize - 1)
    }

    /// Identifier of the note whose label parses to `pitch` (enharmonics match).
    pub fn id_for_pitch(&self, pitch: Pitch) -> Option<NoteId> {
        self.notes
            .iter()
            .find(|n| {
                n.label
                    .as_deref()
                    .and_then(|l| l.parse::<Pitch>().ok())
                    .is_some_and(|p| p == pitch)
            })
            .map(|n| n.id)
    }

    /// Check that bin-domain references fit the given frame geometry.
    pub fn check_geometry(&self, frame_size: usize, sample_rate: u32) -> Result<(), ClassifierError> {
        match self.domain {
            ReferenceDomain::Bin {
                frame_size: expected_frame_size,
                sample_rate: expected_rate,
            } if expected_frame_size != frame_size || expected_rate != sample_rate => {
                Err(ClassifierError::IncompatibleGeometry {
                    expected_frame_size,
                    expected_rate,
                    frame_size,
                    sample_rate,
                })
            }
            _ => Ok(()),
        }
    }

    /// Express `estimate` in this set's domain; `None` means silence.
    fn value_of(&self, estimate: &PitchEstimate) -> Option<f32> {
        let value = match (*estimate, self.domain) {
            (PitchEstimate::Silent, _) => return None,
            (PitchEstimate::Frequency(hz), ReferenceDomain::Frequency)
            | (PitchEstimate::Bin { frequency: hz, .. }, ReferenceDomain::Frequency) => hz,
            (PitchEstimate::Bin { bin, .. }, ReferenceDomain::Bin { .. }) => bin as f32,
            (
                PitchEstimate::Frequency(hz),
                ReferenceDomain::Bin {
                    frame_size,
                    sample_rate,
                },
            ) => hz * frame_size as f32 / sample_rate as f32,
        };
        (value.is_finite() && value > 0.0).then_some(value)
    }

    /// Nearest reference note to `estimate`.
    ///
    /// Silence maps to [`NoteId::SILENCE`]; on equal distance the lowest
    /// identifier wins.
    pub fn classify(&self, estimate: &PitchEstimate) -> NoteId {
        let Some(value) = self.value_of(estimate) else {
            return NoteId::SILENCE;
        };
        let mut best = NoteId::SILENCE;
        let mut best_distance = f32::INFINITY;
        for note in &self.notes {
            let distance = (value - note.value).abs();
            if distance < best_distance {
                best_distance = distance;
                best = note.id;
            }
        }
        best
    }
}

/// Derives a bin-domain [`ReferenceNoteSet`] from one recording per note.
pub struct ReferenceSetBuilder {
    analyzer: SpectralAnalyzer,
    min_kept_frames: usize,
}

impl ReferenceSetBuilder {
    /// Use `analyzer` for every reference recording; keeps at least 10 frames.
    pub fn new(analyzer: SpectralAnalyzer) -> Self {
        ReferenceSetBuilder {
            analyzer,
            min_kept_frames: 10,
        }
    }

    /// Lower bound on the number of loudest frames voted over.
    pub fn min_kept_frames(mut self, n: usize) -> Self {
        self.min_kept_frames = n.max(1);
        self
    }

    /// Most frequent dominant bin among the loudest third of gated frames.
    ///
    /// Equal counts resolve to the bin met first in loudness order.
    pub fn representative_bin(&self, recording: &SampleBuffer) -> Result<Option<usize>, ClassifierError> {
        let analysis = self.analyzer.analyze(recording)?;
        let mut voiced: Vec<(usize, f32)> = analysis
            .frames
            .iter()
            .filter_map(|f| f.peak.map(|p| (p.bin, f.rms)))
            .collect();
        if voiced.is_empty() {
            return Ok(None);
        }
        voiced.sort_by(|a, b| b.1.total_cmp(&a.1));
        let keep = (voiced.len() / 3).max(self.min_kept_frames).min(voiced.len());

        let mut counts: Vec<(usize, usize)> = Vec::new();
        for &(bin, _) in &voiced[..keep] {
            match counts.iter_mut().find(|(b, _)| *b == bin) {
                Some((_, count)) => *count += 1,
                None => counts.push((bin, 1)),
            }
        }
        let mut winner = counts[0];
        for &candidate in &counts[1..] {
            if candidate.1 > winner.1 {
                winner = candidate;
            }
        }
        Ok(Some(winner.0))
    }

    /// Build the set; recording `i` becomes note `i + 1`.
    pub fn build<'a, I>(&self, recordings: I) -> Result<ReferenceNoteSet, ClassifierError>
    where
        I: IntoIterator<Item = &'a SampleBuffer>,
    {
        let mut bins = Vec::new();
        let mut sample_rate = None;
        for (index, recording) in recordings.into_iter().enumerate() {
            let expected = *sample_rate.get_or_insert(recording.sample_rate());
            if recording.sample_rate() != expected {
                return Err(ClassifierError::SampleRateMismatch {
                    index,
                    expected,
                    got: recording.sample_rate(),
                });
            }
            let bin = self
                .representative_bin(recording)?
                .ok_or(ClassifierError::SilentRecording { index })?;
            log::debug!("reference note {} -> bin {}", index + 1, bin);
            bins.push(bin);
        }
        let sample_rate = sample_rate.ok_or(ClassifierError::EmptyReferenceSet)?;
        ReferenceNoteSet::from_bins(bins, self.analyzer.config().frame_size, sample_rate)
    }
}
