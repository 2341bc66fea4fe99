// Mel module - perceptual filterbank and cepstral transform
//
// Filters use the Slaney mel scale (linear below 1 kHz, logarithmic above)
// with Slaney area normalization. Each filter is stored sparsely as a start
// bin plus its non-zero weights.
//
// References:
// - Slaney, M. (1998). Auditory Toolbox, Technical Report #1998-010
// - Davis, S. & Mermelstein, P. (1980). Comparison of parametric
//   representations for monosyllabic word recognition

/// Floor applied to power values before the dB conversion
const AMIN: f32 = 1e-10;

/// Dynamic range kept below the window's loudest mel value (dB)
const TOP_DB: f32 = 80.0;

const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

fn log_step() -> f64 {
    6.4f64.ln() / 27.0
}

/// Convert Hz to Slaney mels
pub fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

/// Convert Slaney mels to Hz
pub fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

struct MelFilter {
    start_bin: usize,
    weights: Vec<f32>,
}

/// Triangular mel filterbank spanning 0 Hz to Nyquist
pub struct MelFilterbank {
    filters: Vec<MelFilter>,
}

impl MelFilterbank {
    /// Build `n_mels` filters over the `fft_size / 2 + 1` bins of a power spectrum
    pub fn new(sample_rate: u32, fft_size: usize, n_mels: usize) -> Self {
        let num_bins = fft_size / 2 + 1;
        let nyquist = sample_rate as f64 / 2.0;

        let max_mel = hz_to_mel(nyquist);
        let edges: Vec<f64> = (0..n_mels + 2)
            .map(|i| mel_to_hz(max_mel * i as f64 / (n_mels + 1) as f64))
            .collect();
        let bin_freq = |k: usize| k as f64 * sample_rate as f64 / fft_size as f64;

        let filters = (0..n_mels)
            .map(|m| {
                let (lower, center, upper) = (edges[m], edges[m + 1], edges[m + 2]);
                let enorm = 2.0 / (upper - lower);

                let mut start_bin = None;
                let mut weights = Vec::new();
                for k in 0..num_bins {
                    let f = bin_freq(k);
                    let rising = (f - lower) / (center - lower);
                    let falling = (upper - f) / (upper - center);
                    let w = rising.min(falling).max(0.0) * enorm;
                    if w > 0.0 {
                        start_bin.get_or_insert(k);
                        weights.push(w as f32);
                    } else if start_bin.is_some() {
                        break;
                    }
                }

                MelFilter {
                    start_bin: start_bin.unwrap_or(0),
                    weights,
                }
            })
            .collect();

        Self { filters }
    }

    pub fn num_filters(&self) -> usize {
        self.filters.len()
    }

    /// Project a power spectrum onto the mel filters
    pub fn apply(&self, power: &[f32]) -> Vec<f32> {
        self.filters
            .iter()
            .map(|filter| {
                power[filter.start_bin..]
                    .iter()
                    .zip(&filter.weights)
                    .map(|(p, w)| p * w)
                    .sum()
            })
            .collect()
    }
}

/// Convert mel power frames to dB in place, clamped to `max - 80 dB`
pub fn power_to_db(frames: &mut [Vec<f32>]) {
    let mut max_db = f32::NEG_INFINITY;
    for frame in frames.iter_mut() {
        for value in frame.iter_mut() {
            *value = 10.0 * value.max(AMIN).log10();
            max_db = max_db.max(*value);
        }
    }
    let floor = max_db - TOP_DB;
    for value in frames.iter_mut().flat_map(|frame| frame.iter_mut()) {
        *value = value.max(floor);
    }
}

/// Orthonormal DCT-II, truncated to the first `n_out` coefficients
pub struct CepstralTransform {
    n_in: usize,
    n_out: usize,
    basis: Vec<f32>,
}

impl CepstralTransform {
    pub fn new(n_in: usize, n_out: usize) -> Self {
        let scale0 = (1.0 / n_in as f64).sqrt();
        let scale = (2.0 / n_in as f64).sqrt();
        let mut basis = Vec::with_capacity(n_in * n_out);
        for k in 0..n_out {
            let s = if k == 0 { scale0 } else { scale };
            for n in 0..n_in {
                let angle = std::f64::consts::PI * k as f64 * (2 * n + 1) as f64 / (2 * n_in) as f64;
                basis.push((s * angle.cos()) as f32);
            }
        }
        Self { n_in, n_out, basis }
    }

    /// Transform one log-mel frame into `n_out` cepstral coefficients
    pub fn apply(&self, log_mel: &[f32], out: &mut Vec<f32>) {
        debug_assert_eq!(log_mel.len(), self.n_in);
        out.extend(self.basis.chunks_exact(self.n_in).take(self.n_out).map(|row| {
            row.iter().zip(log_mel).map(|(b, x)| b * x).sum::<f32>()
        }));
    }
}
