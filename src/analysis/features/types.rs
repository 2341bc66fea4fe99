// Types module - feature window matrix
//
// A FeatureWindow is stored time-major: row `t` holds the `bands`
// cepstral coefficients of analysis frame `t`, which is the order the
// recurrent classifier consumes them in.

/// Fixed-shape `frames × bands` matrix of cepstral coefficients
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureWindow {
    frames: usize,
    bands: usize,
    values: Vec<f32>,
}

impl FeatureWindow {
    /// Wrap a row-major `frames × bands` buffer
    ///
    /// Returns `None` if the buffer length does not match the shape.
    pub fn from_rows(frames: usize, bands: usize, values: Vec<f32>) -> Option<Self> {
        (values.len() == frames * bands).then_some(Self {
            frames,
            bands,
            values,
        })
    }

    /// Number of time steps
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Coefficients per time step
    pub fn bands(&self) -> usize {
        self.bands
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.frames, self.bands)
    }

    /// Row-major coefficient buffer
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Coefficients of time step `t`
    pub fn row(&self, t: usize) -> &[f32] {
        &self.values[t * self.bands..(t + 1) * self.bands]
    }
}
