// Signal normalizer - zero mean / unit variance rescaling
//
// Statistics are accumulated in f64 so that ten-second recordings at
// 22 kHz do not lose precision in the running sums.

use crate::error::AudioError;

/// Mean and population standard deviation of a sample sequence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalStats {
    pub mean: f64,
    pub std_dev: f64,
}

impl SignalStats {
    /// Compute statistics over the entire input
    ///
    /// # Returns
    /// * `Err(AudioError::DegenerateSignal)` - empty input, zero or non-finite stddev
    pub fn measure(samples: &[f32]) -> Result<Self, AudioError> {
        if samples.is_empty() {
            return Err(AudioError::DegenerateSignal {
                reason: "signal has no samples".to_string(),
            });
        }

        let n = samples.len() as f64;
        let mean = samples.iter().map(|&x| x as f64).sum::<f64>() / n;
        let variance = samples
            .iter()
            .map(|&x| {
                let d = x as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n;
        let std_dev = variance.sqrt();

        if !std_dev.is_finite() || std_dev == 0.0 {
            return Err(AudioError::DegenerateSignal {
                reason: format!("standard deviation is {std_dev} over {} samples", samples.len()),
            });
        }

        Ok(Self { mean, std_dev })
    }
}

/// Rescale samples to `(x - mean) / stddev`
///
/// Output has the same length as the input. Silent or constant recordings
/// fail with `DegenerateSignal`; the caller decides whether to skip them.
pub fn normalize(samples: &[f32]) -> Result<Vec<f32>, AudioError> {
    let stats = SignalStats::measure(samples)?;
    Ok(samples
        .iter()
        .map(|&x| ((x as f64 - stats.mean) / stats.std_dev) as f32)
        .collect())
}
