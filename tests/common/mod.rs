//! Synthesized recordings shared by the integration tests.

#![allow(dead_code)]

use melody_recognizer::{Pitch, SampleBuffer};
use std::f64::consts::PI;

pub const RATE: u32 = 44_100;

/// One part of a synthesized melody.
#[derive(Debug, Clone, Copy)]
pub enum Part {
    Tone(&'static str, f64),
    Rest(f64),
}

pub fn pitch(name: &str) -> Pitch {
    name.parse().unwrap()
}

pub fn tone(hz: f64, secs: f64, amp: f64) -> Vec<f32> {
    let len = (secs * RATE as f64).round() as usize;
    (0..len)
        .map(|i| (amp * (2.0 * PI * hz * i as f64 / RATE as f64).sin()) as f32)
        .collect()
}

pub fn rest(secs: f64) -> Vec<f32> {
    vec![0.0; (secs * RATE as f64).round() as usize]
}

pub fn melody(parts: &[Part]) -> SampleBuffer {
    let mut samples = Vec::new();
    for part in parts {
        match *part {
            Part::Tone(name, secs) => {
                samples.extend(tone(pitch(name).frequency() as f64, secs, 0.5))
            }
            Part::Rest(secs) => samples.extend(rest(secs)),
        }
    }
    SampleBuffer::new(samples, RATE).unwrap()
}
