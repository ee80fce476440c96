mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use cli::{Cli, Command};
use melody_recognizer::{
    config::Settings,
    follow_recording, open_wav,
    segment::{label_frames, FrameTiming},
    NoteId, ReferenceNoteSet, ReferenceSetBuilder, SampleBuffer, Score, Segmenter, SpectralAnalyzer,
};

fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => {
            let settings = Settings::load(path)
                .with_context(|| format!("failed to load settings from {}", path.display()))?;
            log::info!("Loaded settings from {}", path.display());
            settings
        }
        None => Settings::default(),
    };

    match &cli.command {
        Command::Segment { input, reference } => {
            segment(&settings, input, reference)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Follow { input, score } => follow(&settings, input, score),
    }
}

fn load(path: &Path) -> Result<SampleBuffer> {
    open_wav(path).with_context(|| format!("failed to read {}", path.display()))
}

fn segment(settings: &Settings, input: &Path, reference: &[PathBuf]) -> Result<()> {
    let analyzer = SpectralAnalyzer::builder()
        .config(settings.spectral.clone())
        .build()
        .context("invalid spectral settings")?;

    let references = if reference.is_empty() {
        settings
            .reference
            .equal_tempered()
            .context("invalid reference range")?
    } else {
        let recordings = reference.iter().map(|p| load(p)).collect::<Result<Vec<_>>>()?;
        ReferenceSetBuilder::new(analyzer.clone())
            .min_kept_frames(settings.reference.min_kept_frames)
            .build(&recordings)
            .context("failed to build reference set")?
    };
    log::info!("Using {} reference notes", references.len());

    let recording = load(input)?;
    let labels = label_frames(&recording, &analyzer, &references)
        .with_context(|| format!("failed to analyse {}", input.display()))?;

    let timing = FrameTiming {
        frame_size: analyzer.config().frame_size,
        hop_size: analyzer.config().hop_size,
        sample_rate: recording.sample_rate(),
    };
    let segmenter = Segmenter::new(settings.segment, timing).context("invalid segment settings")?;
    let segments = segmenter.segment(&labels);
    log::info!("Found {} segments in {:.2}s", segments.len(), recording.duration_secs());

    for s in &segments {
        println!(
            "{:>8.3} {:>8.3}  {}",
            s.start_secs,
            s.end_secs,
            note_name(&references, s.note)
        );
    }
    Ok(())
}

fn follow(settings: &Settings, input: &Path, score_path: &Path) -> Result<ExitCode> {
    let references = settings
        .reference
        .equal_tempered()
        .context("invalid reference range")?;

    let text = std::fs::read_to_string(score_path)
        .with_context(|| format!("failed to read {}", score_path.display()))?;
    let pitches = Score::parse_pitches(&text)
        .with_context(|| format!("failed to parse {}", score_path.display()))?;
    let score = Score::from_pitches(&references, &pitches)?;

    let recording = load(input)?;
    let report = follow_recording(&recording, &score, &references, &settings.follow)?;

    println!("{}/{}", report.recognized, report.expected);
    match report.verify() {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            log::warn!("{}", e);
            Ok(ExitCode::from(1))
        }
    }
}

fn note_name(references: &ReferenceNoteSet, id: NoteId) -> String {
    if id.is_silence() {
        return "-".to_string();
    }
    match references.get(id).and_then(|n| n.label.clone()) {
        Some(label) => label,
        None => id.to_string(),
    }
}
