// BatchCycle - endless mini-batch index stream over the training split
//
// Walks the examples in order and wraps around at the end, so every
// iteration gets exactly `batch_size` indices no matter how the split size
// divides. With epoch shuffling enabled the visiting order is re-drawn from
// a seeded RNG each time the cycle wraps.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

pub struct BatchCycle {
    order: Vec<usize>,
    batch_size: usize,
    cursor: usize,
    epoch: usize,
    rng: Option<StdRng>,
}

impl BatchCycle {
    pub fn new(len: usize, batch_size: usize) -> Self {
        Self {
            order: (0..len).collect(),
            batch_size,
            cursor: 0,
            epoch: 0,
            rng: None,
        }
    }

    /// Reshuffle the visiting order at the start of every epoch
    pub fn with_epoch_shuffle(mut self, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        self.order.shuffle(&mut rng);
        self.rng = Some(rng);
        self
    }

    /// Completed passes over the data
    pub fn epoch(&self) -> usize {
        self.epoch
    }
}

impl Iterator for BatchCycle {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.order.is_empty() || self.batch_size == 0 {
            return None;
        }

        let mut batch = Vec::with_capacity(self.batch_size);
        while batch.len() < self.batch_size {
            if self.cursor == self.order.len() {
                self.cursor = 0;
                self.epoch += 1;
                if let Some(rng) = self.rng.as_mut() {
                    self.order.shuffle(rng);
                }
            }
            batch.push(self.order[self.cursor]);
            self.cursor += 1;
        }
        Some(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycles_in_order() {
        let batches: Vec<_> = BatchCycle::new(5, 2).take(4).collect();
        assert_eq!(
            batches,
            vec![vec![0, 1], vec![2, 3], vec![4, 0], vec![1, 2]]
        );
    }

    #[test]
    fn test_epoch_counts_wraps() {
        let mut cycle = BatchCycle::new(4, 4);
        cycle.next();
        assert_eq!(cycle.epoch(), 0);
        cycle.next();
        assert_eq!(cycle.epoch(), 1);
    }

    #[test]
    fn test_batch_larger_than_data_repeats() {
        let batch = BatchCycle::new(3, 7).next().unwrap();
        assert_eq!(batch, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_empty_yields_nothing() {
        assert!(BatchCycle::new(0, 4).next().is_none());
    }

    #[test]
    fn test_shuffled_epochs_are_permutations_and_seeded() {
        let a: Vec<_> = BatchCycle::new(10, 10).with_epoch_shuffle(3).take(3).collect();
        let b: Vec<_> = BatchCycle::new(10, 10).with_epoch_shuffle(3).take(3).collect();
        assert_eq!(a, b);
        for epoch in &a {
            let mut sorted = epoch.clone();
            sorted.sort();
            assert_eq!(sorted, (0..10).collect::<Vec<_>>());
        }
    }
}
