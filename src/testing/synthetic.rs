// Synthetic motor recordings - seeded fixtures for every condition
//
// Each condition is modelled as a rotating hum (fundamental plus a few
// harmonics with slow speed wobble), broadband noise and optional bearing
// knocks (short decaying bursts at a fixed rate). The profiles are far
// enough apart spectrally that a trained classifier separates them
// cleanly, which makes them useful for end-to-end tests and demos without
// shipping real recordings.

use std::f32::consts::PI;
use std::path::Path;

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::audio::{write_wav, RawRecording};
use crate::config::SourceRecording;
use crate::error::AudioError;

/// Condition labels with a built-in profile, in vocabulary order
pub const CONDITIONS: [&str; 3] = ["new", "red", "used"];

/// Peak amplitude after synthesis
const PEAK: f32 = 0.9;

/// Relative depth of the slow speed wobble
const WOBBLE_DEPTH: f32 = 0.01;
const WOBBLE_HZ: f32 = 0.5;

/// Acoustic signature of one motor condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotorProfile {
    pub fundamental_hz: f32,
    /// Amplitudes of harmonics 2, 3, ... relative to the fundamental
    pub harmonics: Vec<f32>,
    /// Uniform noise amplitude relative to the fundamental
    pub noise_level: f32,
    /// Bearing knocks per second (0 disables them)
    pub knock_rate_hz: f32,
    pub knock_amplitude: f32,
}

impl MotorProfile {
    /// Built-in profile for `new`, `used` or `red`
    pub fn for_condition(label: &str) -> Option<Self> {
        match label {
            "new" => Some(Self {
                fundamental_hz: 180.0,
                harmonics: vec![0.3, 0.1],
                noise_level: 0.02,
                knock_rate_hz: 0.0,
                knock_amplitude: 0.0,
            }),
            "used" => Some(Self {
                fundamental_hz: 700.0,
                harmonics: vec![0.5, 0.3, 0.2],
                noise_level: 0.15,
                knock_rate_hz: 0.0,
                knock_amplitude: 0.0,
            }),
            "red" => Some(Self {
                fundamental_hz: 2_400.0,
                harmonics: vec![0.6, 0.4],
                noise_level: 0.4,
                knock_rate_hz: 12.0,
                knock_amplitude: 0.8,
            }),
            _ => None,
        }
    }
}

/// Render `seconds` of audio for `profile`
///
/// The seed varies the exact speed, harmonic phases and noise, so two seeds
/// give two different recordings of the same condition.
pub fn synthesize(profile: &MotorProfile, sample_rate: u32, seconds: f32, seed: u64) -> RawRecording {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = (sample_rate as f32 * seconds).max(0.0) as usize;
    let sr = sample_rate.max(1) as f32;

    let fundamental = profile.fundamental_hz * (1.0 + rng.gen_range(-0.03..0.03));
    let phases: Vec<f32> = (0..=profile.harmonics.len())
        .map(|_| rng.gen_range(0.0..2.0 * PI))
        .collect();
    let knock_period = if profile.knock_rate_hz > 0.0 {
        Some((sr / profile.knock_rate_hz).max(1.0) as usize)
    } else {
        None
    };
    let knock_decay = (-1.0 / (0.004 * sr)).exp();

    let mut samples = Vec::with_capacity(n);
    let mut phase = 0.0f32;
    let mut knock_env = 0.0f32;

    for i in 0..n {
        let t = i as f32 / sr;
        let speed = 1.0 + WOBBLE_DEPTH * (2.0 * PI * WOBBLE_HZ * t).sin();
        phase = (phase + fundamental * speed / sr).fract();

        let mut value = (2.0 * PI * phase + phases[0]).sin();
        for (h, (&amp, &offset)) in profile.harmonics.iter().zip(&phases[1..]).enumerate() {
            let order = (h + 2) as f32;
            value += amp * (2.0 * PI * phase * order + offset).sin();
        }
        if profile.noise_level > 0.0 {
            value += profile.noise_level * rng.gen_range(-1.0..1.0);
        }
        if let Some(period) = knock_period {
            if i % period == 0 {
                knock_env = profile.knock_amplitude;
            }
            value += knock_env * rng.gen_range(-1.0..1.0);
            knock_env *= knock_decay;
        }
        samples.push(value);
    }

    let peak = samples.iter().fold(0.0f32, |m, v| m.max(v.abs()));
    if peak > 0.0 {
        for sample in &mut samples {
            *sample *= PEAK / peak;
        }
    }

    RawRecording::new(samples, sample_rate, None)
}

/// Write `per_class` WAV files for every built-in condition into `dir`
///
/// Files are named `{label}_{k}.wav`; the returned list pairs them with
/// their labels, relative to `dir`.
pub fn write_corpus(
    dir: &Path,
    per_class: usize,
    seconds: f32,
    sample_rate: u32,
) -> Result<Vec<SourceRecording>, AudioError> {
    std::fs::create_dir_all(dir).map_err(|err| AudioError::write_failed(dir, err))?;

    let mut sources = Vec::with_capacity(CONDITIONS.len() * per_class);
    for (c, label) in CONDITIONS.iter().enumerate() {
        let Some(profile) = MotorProfile::for_condition(label) else {
            continue;
        };
        for k in 0..per_class {
            let file = format!("{label}_{k}.wav");
            let seed = (c * 1_000 + k) as u64;
            let recording = synthesize(&profile, sample_rate, seconds, seed).with_label(*label);
            write_wav(&dir.join(&file), &recording)?;
            sources.push(SourceRecording::new(file, *label));
        }
    }

    log::info!(
        "Wrote {} synthetic recordings to {}",
        sources.len(),
        dir.display()
    );
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioDecoder, WavDecoder};

    #[test]
    fn test_every_condition_has_a_profile() {
        for label in CONDITIONS {
            assert!(MotorProfile::for_condition(label).is_some(), "{label}");
        }
        assert!(MotorProfile::for_condition("broken").is_none());
    }

    #[test]
    fn test_synthesis_is_seeded() {
        let profile = MotorProfile::for_condition("red").unwrap();
        let a = synthesize(&profile, 8_000, 0.5, 3);
        let b = synthesize(&profile, 8_000, 0.5, 3);
        let c = synthesize(&profile, 8_000, 0.5, 4);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_length_and_peak() {
        let profile = MotorProfile::for_condition("new").unwrap();
        let recording = synthesize(&profile, 22_050, 2.0, 1);
        assert_eq!(recording.samples.len(), 44_100);
        let peak = recording.samples.iter().fold(0.0f32, |m, v| m.max(v.abs()));
        approx::assert_relative_eq!(peak, PEAK, epsilon = 1e-5);
    }

    #[test]
    fn test_write_corpus_roundtrips_through_wav() {
        let dir = tempfile::tempdir().unwrap();
        let sources = write_corpus(dir.path(), 2, 0.25, 8_000).unwrap();
        assert_eq!(sources.len(), 6);
        assert_eq!(sources[0], SourceRecording::new("new_0.wav", "new"));

        for source in &sources {
            let decoded = WavDecoder.decode(&dir.path().join(&source.file)).unwrap();
            assert_eq!(decoded.sample_rate, 8_000);
            assert_eq!(decoded.samples.len(), 2_000);
        }
    }

    #[test]
    fn test_write_corpus_over_a_file_fails_to_write() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("taken");
        std::fs::write(&blocker, b"not a directory").unwrap();
        assert!(matches!(
            write_corpus(&blocker.join("corpus"), 1, 0.1, 8_000),
            Err(AudioError::WriteFailed { .. })
        ));
    }
}
