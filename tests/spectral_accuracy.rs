//! Integration tests for the transform tables and dominant-bin estimation on
//! synthesized tones.

use melody_recognizer::{
    classifier::PitchEstimate, NoteId, ReferenceNoteSet, SampleBuffer, SilenceGate,
    SpectralAnalyzer, TransformCache, TransformEngine,
};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use rustfft::{num_complex::Complex, FftPlanner};
use std::f64::consts::PI;
use std::sync::{Arc, Mutex};

fn sine(hz: f64, rate: u32, len: usize, amp: f64) -> Vec<f32> {
    (0..len)
        .map(|i| (amp * (2.0 * PI * hz * i as f64 / rate as f64).sin()) as f32)
        .collect()
}

/// Hann-windowed magnitudes computed with rustfft's planner.
fn oracle_spectrum(frame: &[f32]) -> Vec<f64> {
    let n = frame.len();
    let mut buffer: Vec<Complex<f64>> = frame
        .iter()
        .enumerate()
        .map(|(i, &s)| {
            let w = 0.5 - 0.5 * (2.0 * PI * i as f64 / (n - 1) as f64).cos();
            Complex::new(s as f64 * w, 0.0)
        })
        .collect();
    FftPlanner::<f64>::new().plan_fft_forward(n).process(&mut buffer);
    buffer[..n / 2].iter().map(|c| c.norm()).collect()
}

#[test]
fn matches_reference_fft() {
    for &size in &[2usize, 8, 64, 1024, 4096] {
        let engine = TransformEngine::new(size).unwrap();
        // a chord of three partials plus a DC offset and a ramp
        let frame: Vec<f32> = (0..size)
            .map(|i| {
                let t = i as f64 / size as f64;
                (0.1 + 0.3 * (2.0 * PI * 5.0 * t).sin()
                    + 0.2 * (2.0 * PI * 17.3 * t).cos()
                    + 0.1 * (2.0 * PI * 40.0 * t).sin()
                    + 0.05 * t) as f32
            })
            .collect();

        let ours = engine.spectrum(&frame).unwrap();
        let theirs = oracle_spectrum(&frame);
        assert_eq!(ours.len(), size / 2);
        for (bin, (&a, &b)) in ours.iter().zip(&theirs).enumerate() {
            assert!(
                (a as f64 - b).abs() <= 1e-3,
                "size {size} bin {bin}: {a} vs {b}"
            );
        }
    }
}

#[test]
fn cache_shares_tables_between_analyzers() {
    let mut cache = TransformCache::new();
    let a = SpectralAnalyzer::builder().frame_size(2048).build_with_cache(&mut cache).unwrap();
    let b = SpectralAnalyzer::builder()
        .frame_size(2048)
        .hop_size(512)
        .build_with_cache(&mut cache)
        .unwrap();
    let _c = SpectralAnalyzer::builder().frame_size(1024).hop_size(256).build_with_cache(&mut cache).unwrap();
    assert_eq!(cache.len(), 2);
    assert_eq!(a.config().frame_size, b.config().frame_size);
}

#[test]
fn pure_tones_land_within_one_bin() {
    let rate = 44_100;
    let frame_size = 4096;
    let analyzer = SpectralAnalyzer::builder().frame_size(frame_size).build().unwrap();

    // 110 Hz to ~1.8 kHz in quarter-tone steps, off-bin frequencies included
    let tones: Vec<f64> = (0..100).map(|k| 110.0 * 2f64.powf(k as f64 / 24.0)).collect();
    let failures = Arc::new(Mutex::new(Vec::<String>::new()));

    tones.par_iter().for_each(|&hz| {
        let frame = sine(hz, rate, frame_size, 0.5);
        let peak = analyzer.dominant_peak(&frame, rate).unwrap().unwrap();
        let expected = hz * frame_size as f64 / rate as f64;
        if (peak.bin as f64 - expected).abs() > 1.0 {
            failures
                .lock()
                .unwrap()
                .push(format!("{hz:.2} Hz: expected bin ~{expected:.2}, got {}", peak.bin));
        }
    });

    let failures = Arc::try_unwrap(failures).unwrap().into_inner().unwrap();
    if !failures.is_empty() {
        panic!("{} tones off by more than one bin:\n{}", failures.len(), failures.join("\n"));
    }
}

#[test]
fn silence_is_always_label_zero() {
    let references = ReferenceNoteSet::equal_tempered("C4".parse().unwrap(), "C6".parse().unwrap()).unwrap();
    let recording = SampleBuffer::new(vec![0.0; 4096 * 4], 44_100).unwrap();

    for gate in [
        SilenceGate::Fixed { threshold: 0.0 },
        SilenceGate::Fixed { threshold: 0.01 },
        SilenceGate::adaptive(),
        SilenceGate::Adaptive { percentile: 0.0, scale: 0.0, floor: 0.0 },
    ] {
        let analyzer = SpectralAnalyzer::builder().silence_gate(gate).build().unwrap();
        let analysis = analyzer.analyze(&recording).unwrap();
        assert_eq!(analysis.frames.len(), 13);
        for frame in &analysis.frames {
            assert_eq!(frame.estimate(), PitchEstimate::Silent);
            assert_eq!(references.classify(&frame.estimate()), NoteId::SILENCE);
        }
    }
}

#[test]
fn adaptive_gate_tracks_noise_floor() {
    let rate = 44_100;
    // half a second of faint noise-like hum, then a loud tone
    let mut samples = sine(60.0, rate, rate as usize / 2, 0.003);
    samples.extend(sine(440.0, rate, rate as usize, 0.5));
    let recording = SampleBuffer::new(samples, rate).unwrap();

    let analyzer = SpectralAnalyzer::builder().silence_gate(SilenceGate::adaptive()).build().unwrap();
    let analysis = analyzer.analyze(&recording).unwrap();
    assert!(analysis.threshold >= 0.004);

    let first = &analysis.frames[0];
    assert!(first.peak.is_none(), "hum should be gated, rms {}", first.rms);
    let last = analysis.frames.last().unwrap();
    let peak = last.peak.unwrap();
    assert_eq!(peak.bin, 41); // 440 * 4096 / 44100 = 40.87
}
