// WAV decoder - RIFF/WAVE reading and writing via hound
//
// Integer PCM is scaled to `[-1, 1]` by its bit depth and multichannel
// files are mixed down to mono by averaging each frame.

use std::path::Path;

use super::{AudioDecoder, RawRecording};
use crate::error::AudioError;

/// Decoder for RIFF/WAVE files
#[derive(Debug, Clone, Copy, Default)]
pub struct WavDecoder;

impl AudioDecoder for WavDecoder {
    fn decode(&self, path: &Path) -> Result<RawRecording, AudioError> {
        let (samples, sample_rate) = read_wav(path)?;
        Ok(RawRecording::new(samples, sample_rate, None))
    }
}

fn read_wav(path: &Path) -> Result<(Vec<f32>, u32), AudioError> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|err| AudioError::unreadable(path, format!("failed to open: {err}")))?;
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(AudioError::unreadable(path, "zero channels"));
    }
    if spec.sample_rate == 0 {
        return Err(AudioError::unreadable(path, "zero sample rate"));
    }

    let interleaved = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<f32>, _>>()
            .map_err(|err| AudioError::unreadable(path, err))?,
        hound::SampleFormat::Int => match spec.bits_per_sample {
            8 | 16 | 24 | 32 => {
                let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|sample| sample.map(|v| v as f32 / scale))
                    .collect::<Result<Vec<f32>, _>>()
                    .map_err(|err| AudioError::unreadable(path, err))?
            }
            bits => {
                return Err(AudioError::unreadable(
                    path,
                    format!("unsupported bits_per_sample={bits}"),
                ));
            }
        },
    };

    let channels = spec.channels as usize;
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    log::debug!(
        "Decoded {} ({} Hz, {} ch, {} frames)",
        path.display(),
        spec.sample_rate,
        spec.channels,
        samples.len()
    );

    Ok((samples, spec.sample_rate))
}

/// Write a recording as 16-bit mono PCM
///
/// Samples are clamped to `[-1, 1]` before quantization.
pub fn write_wav(path: &Path, recording: &RawRecording) -> Result<(), AudioError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: recording.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|err| AudioError::write_failed(path, err))?;
    for &sample in &recording.samples {
        let quantized = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        writer
            .write_sample(quantized)
            .map_err(|err| AudioError::write_failed(path, err))?;
    }
    writer
        .finalize()
        .map_err(|err| AudioError::write_failed(path, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_16_bit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<f32> = (0..2_205).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();
        let recording = RawRecording::new(samples.clone(), 22_050, None);

        write_wav(&path, &recording).unwrap();
        let decoded = WavDecoder.decode(&path).unwrap();

        assert_eq!(decoded.sample_rate, 22_050);
        assert_eq!(decoded.samples.len(), samples.len());
        let lsb = 1.0 / i16::MAX as f32;
        for (a, b) in decoded.samples.iter().zip(&samples) {
            assert!((a - b).abs() <= 1.5 * lsb, "{a} vs {b}");
        }
        assert!(decoded.label.is_none());
    }

    #[test]
    fn test_stereo_is_mixed_down() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8_000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..10 {
            writer.write_sample(0.5f32).unwrap();
            writer.write_sample(-0.25f32).unwrap();
        }
        writer.finalize().unwrap();

        let decoded = WavDecoder.decode(&path).unwrap();
        assert_eq!(decoded.samples, vec![0.125; 10]);
    }

    #[test]
    fn test_missing_file_is_unreadable() {
        let err = WavDecoder
            .decode(Path::new("/nonexistent/motor.wav"))
            .unwrap_err();
        assert!(matches!(err, AudioError::UnreadableAudio { .. }));
    }

    #[test]
    fn test_garbage_file_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.wav");
        std::fs::write(&path, b"definitely not a riff header").unwrap();
        assert!(matches!(
            WavDecoder.decode(&path),
            Err(AudioError::UnreadableAudio { .. })
        ));
    }

    #[test]
    fn test_write_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent").join("motor.wav");
        let recording = RawRecording::new(vec![0.25; 8], 8_000, None);
        assert!(matches!(
            write_wav(&path, &recording),
            Err(AudioError::WriteFailed { .. })
        ));
    }
}
