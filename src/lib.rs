//! # melody_recognizer
//!
//! Monophonic note recognition for recorded melodies: frame-wise pitch
//! estimation, nearest-note classification against a finite reference set,
//! temporal smoothing into note segments, and a debounced follower that checks
//! a performance against an expected score.
//!
//! ## Example
//! ```rust
//! use melody_recognizer::{
//!     segment::{label_frames, FrameTiming, SegmentConfig, Segmenter},
//!     ReferenceNoteSet, SampleBuffer, SpectralAnalyzer,
//! };
//!
//! fn run() -> Result<(), Box<dyn std::error::Error>> {
//!     // 1) Two seconds of A4 at 44.1 kHz
//!     let rate = 44_100;
//!     let samples: Vec<f32> = (0..2 * rate)
//!         .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / rate as f32).sin())
//!         .collect();
//!     let recording = SampleBuffer::new(samples, rate)?;
//!
//!     // 2) Label every frame against an equal-tempered reference set
//!     let analyzer = SpectralAnalyzer::builder().build()?;
//!     let references = ReferenceNoteSet::equal_tempered("C4".parse()?, "B5".parse()?)?;
//!     let labels = label_frames(&recording, &analyzer, &references)?;
//!
//!     // 3) Smooth and segment
//!     let config = analyzer.config();
//!     let timing = FrameTiming {
//!         frame_size: config.frame_size,
//!         hop_size: config.hop_size,
//!         sample_rate: rate,
//!     };
//!     let segmenter = Segmenter::new(SegmentConfig::default(), timing)?;
//!     for segment in segmenter.segment(&labels) {
//!         println!(
//!             "note {} from {:.2}s to {:.2}s",
//!             segment.note, segment.start_secs, segment.end_secs
//!         );
//!     }
//!
//!     Ok(())
//! }
//! # run().unwrap();
//! ```
//!
//! ## Features
//! - `cli` (default): builds the `melody-check` binary (`clap`, `anyhow`, `env_logger`)

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rust_2018_idioms)]
#![deny(clippy::all)]

/// Sample buffers and framing.
pub use signal::{Frame, SampleBuffer, SignalError};

/// WAV decoding.
pub use wav::{open_wav, parse_wav, read_wav, WavError};

/// Cached real-input transform.
pub use transform::{TransformCache, TransformEngine, TransformError};

/// Dominant-bin frame analysis.
pub use spectral::{SilenceGate, SpectralAnalyzer, SpectralAnalyzerBuilder, SpectralConfig, SpectralError};

/// Autocorrelation pitch estimation.
pub use autocorr::{AutocorrConfig, AutocorrError, AutocorrEstimator};

/// Pitch names.
pub use notation::{NotationError, Pitch, PitchClass};

/// Reference notes and classification.
pub use classifier::{ClassifierError, NoteId, PitchEstimate, ReferenceNoteSet, ReferenceSetBuilder};

/// Smoothing and segmentation.
pub use segment::{Segment, SegmentConfig, SegmentError, Segmenter};

/// Expected melodies.
pub use score::{DurationClass, DurationTable, Score, ScoreError, ScoreEvent};

/// Score following.
pub use follower::{follow_recording, FollowConfig, FollowError, FollowReport, HoldConfig, ScoreFollower, Step};

/// TOML settings.
pub use config::{ConfigError, Settings};

/// Sample buffers and fixed-size framing.
pub mod signal;

/// Mono WAV reader.
pub mod wav;

/// Radix-2 transform with precomputed tables.
pub mod transform;

/// Spectral frame analyzer.
pub mod spectral;

/// Autocorrelation pitch estimator.
pub mod autocorr;

/// Note names and equal temperament.
pub mod notation;

/// Note classifier and reference note sets.
pub mod classifier;

/// Temporal smoother and segmenter.
pub mod segment;

/// Expected melody.
pub mod score;

/// Sequential score follower.
pub mod follower;

/// Settings file.
pub mod config;
