//! Temporal Smoother & Segmenter
//!
//! Turns a per-frame label sequence into an ordered list of note segments:
//! majority smoothing over a small window, run extraction, then reconciliation
//! of runs shorter than the minimum duration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    classifier::{ClassifierError, NoteId, ReferenceNoteSet},
    signal::SampleBuffer,
    spectral::{SpectralAnalyzer, SpectralError},
};

/// Errors returned by the segmenter.
#[derive(Debug, Error)]
pub enum SegmentError {
    /// Frame size, hop or sample rate is zero.
    #[error("frame timing must be positive (frame_size {frame_size}, hop_size {hop_size}, sample_rate {sample_rate})")]
    InvalidTiming {
        /// Configured frame size.
        frame_size: usize,
        /// Configured hop.
        hop_size: usize,
        /// Sample rate.
        sample_rate: u32,
    },

    /// The minimum segment duration is negative or not finite.
    #[error("minimum segment duration {0} s is invalid")]
    InvalidMinDuration(f64),

    /// Spectral analysis failed while labelling frames.
    #[error(transparent)]
    Spectral(#[from] SpectralError),

    /// The reference set does not fit the analysed recording.
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}

/// Smoothing and short-segment parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Half-width of the majority window (window = `2 * radius + 1` frames).
    pub radius: usize,
    /// Runs shorter than this many seconds are merged or dropped.
    pub min_duration_secs: f64,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        SegmentConfig {
            radius: 2,
            min_duration_secs: 0.12,
        }
    }
}

/// Maps frame indices to seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTiming {
    /// Samples per frame.
    pub frame_size: usize,
    /// Samples between frame starts.
    pub hop_size: usize,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl FrameTiming {
    /// Start of frame `index` in seconds.
    pub fn start_secs(&self, index: usize) -> f64 {
        (index * self.hop_size) as f64 / self.sample_rate as f64
    }

    /// End of frame `index` in seconds.
    pub fn end_secs(&self, index: usize) -> f64 {
        (index * self.hop_size + self.frame_size) as f64 / self.sample_rate as f64
    }

    /// Duration credited to a run of `frames` frames.
    pub fn run_secs(&self, frames: usize) -> f64 {
        (frames * self.hop_size) as f64 / self.sample_rate as f64
    }
}

/// A maximal run of one note after smoothing and reconciliation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    /// Note label (0 = silence).
    pub note: NoteId,
    /// First frame of the segment.
    pub start_frame: usize,
    /// One past the last frame of the segment.
    pub end_frame: usize,
    /// Start time in seconds.
    pub start_secs: f64,
    /// End time in seconds.
    pub end_secs: f64,
}

impl Segment {
    /// Length in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.end_secs - self.start_secs
    }

    /// Number of frames covered.
    pub fn frame_count(&self) -> usize {
        self.end_frame - self.start_frame
    }
}

/// Rebuild the per-frame label sequence a segment list describes.
pub fn expand(segments: &[Segment]) -> Vec<NoteId> {
    let mut labels = Vec::new();
    for seg in segments {
        labels.resize(seg.start_frame, NoteId::SILENCE);
        labels.resize(seg.end_frame, seg.note);
    }
    labels
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Run {
    note: NoteId,
    start: usize,
    end: usize,
}

/// Batch smoother and segmenter for one frame geometry.
#[derive(Debug, Clone)]
pub struct Segmenter {
    config: SegmentConfig,
    timing: FrameTiming,
}

impl Segmenter {
    /// Validate parameters and create a segmenter.
    pub fn new(config: SegmentConfig, timing: FrameTiming) -> Result<Self, SegmentError> {
        if timing.frame_size == 0 || timing.hop_size == 0 || timing.sample_rate == 0 {
            return Err(SegmentError::InvalidTiming {
                frame_size: timing.frame_size,
                hop_size: timing.hop_size,
                sample_rate: timing.sample_rate,
            });
        }
        if !(config.min_duration_secs >= 0.0 && config.min_duration_secs.is_finite()) {
            return Err(SegmentError::InvalidMinDuration(config.min_duration_secs));
        }

        let min_frames = (config.min_duration_secs / timing.run_secs(1)).ceil() as usize;
        if min_frames < 2 * config.radius + 1 {
            log::warn!(
                "minimum segment of {} frames is shorter than the {}-frame smoothing window; \
                 re-segmenting output may not be stable",
                min_frames,
                2 * config.radius + 1
            );
        }

        Ok(Segmenter { config, timing })
    }

    /// The segmenter's parameters.
    pub fn config(&self) -> &SegmentConfig {
        &self.config
    }

    /// The frame geometry.
    pub fn timing(&self) -> &FrameTiming {
        &self.timing
    }

    /// Replace each label with the most frequent label in its window.
    ///
    /// The window is clipped at the ends of the sequence. On equal counts the
    /// label met first scanning the window left to right wins.
    pub fn smooth(&self, labels: &[NoteId]) -> Vec<NoteId> {
        let r = self.config.radius;
        let mut counts: Vec<(NoteId, usize)> = Vec::with_capacity(2 * r + 1);
        (0..labels.len())
            .map(|i| {
                let lo = i.saturating_sub(r);
                let hi = (i + r + 1).min(labels.len());
                counts.clear();
                for &label in &labels[lo..hi] {
                    match counts.iter_mut().find(|(l, _)| *l == label) {
                        Some((_, n)) => *n += 1,
                        None => counts.push((label, 1)),
                    }
                }
                let mut best = counts[0];
                for &c in &counts[1..] {
                    if c.1 > best.1 {
                        best = c;
                    }
                }
                best.0
            })
            .collect()
    }

    fn runs(labels: &[NoteId]) -> Vec<Run> {
        let mut runs: Vec<Run> = Vec::new();
        for (i, &note) in labels.iter().enumerate() {
            match runs.last_mut() {
                Some(run) if run.note == note => run.end = i + 1,
                _ => runs.push(Run {
                    note,
                    start: i,
                    end: i + 1,
                }),
            }
        }
        runs
    }

    fn is_short(&self, run: &Run) -> bool {
        self.timing.run_secs(run.end - run.start) < self.config.min_duration_secs
    }

    /// Merge or drop short runs.
    ///
    /// A short run between two runs of the same note joins them; any other short
    /// run is dropped and its frames go to the preceding kept segment (or the
    /// next one at the start of the recording).
    fn reconcile(&self, runs: &[Run]) -> Vec<Run> {
        let mut kept: Vec<Run> = Vec::new();
        let mut pending_start: Option<usize> = None;

        for (i, run) in runs.iter().enumerate() {
            if self.is_short(run) {
                match kept.last_mut() {
                    Some(prev) => {
                        let bridged = runs.get(i + 1).is_some_and(|next| next.note == prev.note);
                        log::trace!(
                            "{} short run of note {} at frames {}..{}",
                            if bridged { "merging" } else { "dropping" },
                            run.note,
                            run.start,
                            run.end
                        );
                        prev.end = run.end;
                    }
                    None => {
                        pending_start.get_or_insert(run.start);
                    }
                }
                continue;
            }

            let mut run = *run;
            if let Some(start) = pending_start.take() {
                run.start = start;
            }
            match kept.last_mut() {
                Some(prev) if prev.note == run.note => prev.end = run.end,
                _ => kept.push(run),
            }
        }
        kept
    }

    /// Smooth, split into runs, reconcile short runs and attach times.
    ///
    /// Segments are contiguous and time-ordered; a segment ends where the next
    /// one starts, and the last one ends with its final frame.
    pub fn segment(&self, labels: &[NoteId]) -> Vec<Segment> {
        let smoothed = self.smooth(labels);
        let kept = self.reconcile(&Self::runs(&smoothed));

        let segments: Vec<Segment> = kept
            .iter()
            .enumerate()
            .map(|(i, run)| {
                let end_secs = match kept.get(i + 1) {
                    Some(next) => self.timing.start_secs(next.start),
                    None => self.timing.end_secs(run.end - 1),
                };
                Segment {
                    note: run.note,
                    start_frame: run.start,
                    end_frame: run.end,
                    start_secs: self.timing.start_secs(run.start),
                    end_secs,
                }
            })
            .collect();

        log::debug!("segmented {} frames into {} segments", labels.len(), segments.len());
        segments
    }
}

/// Label every frame of `recording` by spectral analysis and nearest-note lookup.
pub fn label_frames(
    recording: &SampleBuffer,
    analyzer: &SpectralAnalyzer,
    references: &ReferenceNoteSet,
) -> Result<Vec<NoteId>, SegmentError> {
    references.check_geometry(analyzer.config().frame_size, recording.sample_rate())?;
    let analysis = analyzer.analyze(recording)?;
    Ok(analysis
        .frames
        .iter()
        .map(|frame| references.classify(&frame.estimate()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[u16]) -> Vec<NoteId> {
        raw.iter().map(|&n| NoteId(n)).collect()
    }

    fn segmenter(radius: usize, min_frames: usize) -> Segmenter {
        // one frame per 100 ms keeps the arithmetic readable
        let timing = FrameTiming {
            frame_size: 200,
            hop_size: 100,
            sample_rate: 1000,
        };
        let config = SegmentConfig {
            radius,
            min_duration_secs: min_frames as f64 * 0.1 - 0.05,
        };
        Segmenter::new(config, timing).unwrap()
    }

    #[test]
    fn majority_ties_prefer_leftmost() {
        let s = segmenter(1, 1);
        assert_eq!(s.smooth(&ids(&[1, 2, 3])), ids(&[1, 1, 2]));
        assert_eq!(s.smooth(&ids(&[])), ids(&[]));
    }

    #[test]
    fn runs_cover_sequence() {
        let runs = Segmenter::runs(&ids(&[1, 1, 2, 2, 2, 1]));
        assert_eq!(
            runs,
            vec![
                Run { note: NoteId(1), start: 0, end: 2 },
                Run { note: NoteId(2), start: 2, end: 5 },
                Run { note: NoteId(1), start: 5, end: 6 },
            ]
        );
    }

    #[test]
    fn short_run_between_equal_neighbours_merges() {
        let s = segmenter(0, 3);
        let segs = s.segment(&ids(&[4, 4, 4, 4, 9, 4, 4, 4, 4]));
        assert_eq!(segs.len(), 1);
        assert_eq!((segs[0].note, segs[0].start_frame, segs[0].end_frame), (NoteId(4), 0, 9));
    }

    #[test]
    fn short_run_between_different_notes_is_absorbed_by_previous() {
        let s = segmenter(0, 3);
        let segs = s.segment(&ids(&[1, 1, 1, 1, 9, 2, 2, 2, 2]));
        let spans: Vec<_> = segs.iter().map(|g| (g.note, g.start_frame, g.end_frame)).collect();
        assert_eq!(spans, vec![(NoteId(1), 0, 5), (NoteId(2), 5, 9)]);
    }

    #[test]
    fn leading_short_run_goes_to_next_segment() {
        let s = segmenter(0, 3);
        let segs = s.segment(&ids(&[7, 2, 2, 2, 2]));
        assert_eq!(segs.len(), 1);
        assert_eq!((segs[0].note, segs[0].start_frame, segs[0].end_frame), (NoteId(2), 0, 5));
        assert_eq!(segs[0].start_secs, 0.0);
    }

    #[test]
    fn all_short_yields_nothing() {
        let s = segmenter(0, 5);
        assert!(s.segment(&ids(&[1, 1, 2, 2, 3])).is_empty());
    }

    #[test]
    fn end_time_of_last_segment_includes_frame() {
        let s = segmenter(0, 1);
        let segs = s.segment(&ids(&[1, 1, 2, 2]));
        assert_eq!(segs.len(), 2);
        assert!((segs[0].end_secs - 0.2).abs() < 1e-12);
        assert!((segs[1].start_secs - 0.2).abs() < 1e-12);
        // frame 3 starts at 0.3 s and is 0.2 s long
        assert!((segs[1].end_secs - 0.5).abs() < 1e-12);
    }

    #[test]
    fn expand_restores_labels() {
        let s = segmenter(0, 1);
        let labels = ids(&[0, 0, 3, 3, 3, 1]);
        assert_eq!(expand(&s.segment(&labels)), labels);
    }

    #[test]
    fn invalid_parameters() {
        let timing = FrameTiming { frame_size: 0, hop_size: 1, sample_rate: 1 };
        assert!(matches!(
            Segmenter::new(SegmentConfig::default(), timing),
            Err(SegmentError::InvalidTiming { .. })
        ));
        let timing = FrameTiming { frame_size: 4, hop_size: 1, sample_rate: 1 };
        let config = SegmentConfig { radius: 1, min_duration_secs: f64::NAN };
        assert!(matches!(Segmenter::new(config, timing), Err(SegmentError::InvalidMinDuration(_))));
    }
}
