// FFT module - short-time power spectra
//
// Frames are taken from a centered, reflect-padded signal and weighted with
// a periodic Hann window before the forward FFT. Only the non-negative
// frequency half of the power spectrum is returned.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// FFT processor that computes power spectra from audio frames
pub struct FftProcessor {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    /// Periodic Hann window (pre-computed)
    window: Vec<f32>,
}

impl FftProcessor {
    /// Create a new FFT processor
    ///
    /// # Arguments
    /// * `fft_size` - FFT frame size (2048 for the default feature layout)
    pub fn new(fft_size: usize) -> Self {
        let window = (0..fft_size)
            .map(|i| {
                0.5 * (1.0 - ((2.0 * std::f32::consts::PI * i as f32) / fft_size as f32).cos())
            })
            .collect();

        let fft = FftPlanner::new().plan_fft_forward(fft_size);

        Self {
            fft,
            fft_size,
            window,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of bins in each power spectrum (`fft_size / 2 + 1`)
    pub fn num_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    /// Compute the power spectrum `|X|^2` of one frame
    ///
    /// # Arguments
    /// * `frame` - Exactly `fft_size` samples
    pub fn power_spectrum(&self, frame: &[f32]) -> Vec<f32> {
        debug_assert_eq!(frame.len(), self.fft_size);

        let mut buffer: Vec<Complex<f32>> = frame
            .iter()
            .zip(&self.window)
            .map(|(&sample, &w)| Complex::new(sample * w, 0.0))
            .collect();

        self.fft.process(&mut buffer);

        buffer[..self.num_bins()]
            .iter()
            .map(|c| c.norm_sqr())
            .collect()
    }

    /// Power spectra of a centered STFT over `signal`
    ///
    /// The signal is reflect-padded by `fft_size / 2` on both sides, so a
    /// signal of `hop * (frames - 1)` samples yields exactly `frames` spectra.
    pub fn stft_power(&self, signal: &[f32], hop: usize) -> Vec<Vec<f32>> {
        let padded = reflect_pad(signal, self.fft_size / 2);
        if padded.len() < self.fft_size {
            return Vec::new();
        }
        let frames = 1 + (padded.len() - self.fft_size) / hop;

        (0..frames)
            .map(|t| {
                let start = t * hop;
                self.power_spectrum(&padded[start..start + self.fft_size])
            })
            .collect()
    }
}

/// Mirror `pad` samples at each edge, excluding the edge sample itself
///
/// Requires `signal.len() > pad`.
fn reflect_pad(signal: &[f32], pad: usize) -> Vec<f32> {
    let n = signal.len();
    debug_assert!(n > pad);

    let mut padded = Vec::with_capacity(n + 2 * pad);
    padded.extend((1..=pad).rev().map(|i| signal[i]));
    padded.extend_from_slice(signal);
    padded.extend((1..=pad).map(|i| signal[n - 1 - i]));
    padded
}
