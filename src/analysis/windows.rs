// Window generator - 50% overlapping fixed-length windows
//
// Yields every candidate `(start, end)` pair whose start lies inside the
// signal. Candidates running past the end are still yielded; callers drop
// them instead of zero-padding (see `complete_windows`).

/// Lazy, restartable iterator over `(start, end)` window bounds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowGenerator {
    len: usize,
    window_size: usize,
    step: usize,
    next_start: usize,
}

impl WindowGenerator {
    /// Create a generator for a signal of `len` samples
    ///
    /// The step is `window_size / 2`, clamped to at least one sample.
    pub fn new(len: usize, window_size: usize) -> Self {
        Self {
            len,
            window_size,
            step: (window_size / 2).max(1),
            next_start: 0,
        }
    }

    /// Distance between successive window starts
    pub fn step(&self) -> usize {
        self.step
    }

    /// Start over from the first window
    pub fn restart(&mut self) {
        self.next_start = 0;
    }
}

impl Iterator for WindowGenerator {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_start >= self.len {
            return None;
        }
        let start = self.next_start;
        self.next_start += self.step;
        Some((start, start + self.window_size))
    }
}

/// Windows that fit entirely inside a signal of `len` samples
pub fn complete_windows(len: usize, window_size: usize) -> impl Iterator<Item = (usize, usize)> {
    WindowGenerator::new(len, window_size).filter(move |&(_, end)| end <= len)
}

/// Number of complete windows: `floor((L - ws) / (ws / 2)) + 1`, or 0 if `L < ws`
pub fn window_count(len: usize, window_size: usize) -> usize {
    if window_size == 0 || len < window_size {
        return 0;
    }
    let step = (window_size / 2).max(1);
    (len - window_size) / step + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_advance_by_half_window() {
        let starts: Vec<usize> = WindowGenerator::new(100, 20).map(|(s, _)| s).collect();
        assert_eq!(starts.first(), Some(&0));
        assert!(starts.windows(2).all(|pair| pair[1] - pair[0] == 10));
        assert_eq!(*starts.last().unwrap(), 90);
    }

    #[test]
    fn test_every_window_has_fixed_length() {
        assert!(WindowGenerator::new(1_000, 64).all(|(s, e)| e - s == 64));
    }

    #[test]
    fn test_generator_is_restartable() {
        let mut generator = WindowGenerator::new(50, 10);
        let first: Vec<_> = generator.clone().collect();
        let consumed: Vec<_> = generator.by_ref().collect();
        generator.restart();
        let again: Vec<_> = generator.collect();
        assert_eq!(first, consumed);
        assert_eq!(first, again);
    }

    #[test]
    fn test_complete_window_count_matches_formula() {
        for (len, ws) in [(220_500, 20_480), (20_480, 20_480), (30_719, 20_480), (100, 20), (7, 8)] {
            let produced = complete_windows(len, ws).count();
            assert_eq!(produced, window_count(len, ws), "len={len} ws={ws}");
        }
        assert_eq!(window_count(220_500, 20_480), 20);
        assert_eq!(window_count(20_479, 20_480), 0);
    }

    #[test]
    fn test_overflowing_candidates_are_yielded_but_filtered() {
        let all: Vec<_> = WindowGenerator::new(25, 10).collect();
        assert_eq!(all, vec![(0, 10), (5, 15), (10, 20), (15, 25), (20, 30)]);
        let complete: Vec<_> = complete_windows(25, 10).collect();
        assert_eq!(complete.len(), 4);
    }

    #[test]
    fn test_empty_signal_yields_nothing() {
        assert_eq!(WindowGenerator::new(0, 16).count(), 0);
    }
}
