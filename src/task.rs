//! The copying task.
//!
//! Each sample is a row of `len_sequence` random payload symbols, followed by a stretch of wait
//! symbols with a single marker at its end. The target row stays silent (wait symbols) until the
//! marker has been seen and then has to reproduce the payload.
//!
//! ```text
//! input:  p1 p2 p3 0 0 0 ... 0 M 0  0  0
//! target: 0  0  0  0 0 0 ... 0 0 p1 p2 p3
//! ```

use crate::baseline;
use crate::error::{CopyTaskError, Result};
use crate::matrix::Matrix;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Element type of generated batches.
pub type Symbol = u32;

pub const WAIT_SYMBOL: Symbol = 0;

/// Parameters of a copying task. Shared by the generator and by the model so that embedding and
/// output layer sizes always agree with the data.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(default)]
pub struct CopyTask {
    len_wait: usize,
    len_sequence: usize,
    num_symbols: usize,
}

/// One batch of copying task samples. Row `i` of `inputs` pairs with row `i` of `targets`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CopyBatch {
    pub inputs: Matrix<Symbol>,
    pub targets: Matrix<Symbol>,
}

impl Default for CopyTask {
    fn default() -> Self {
        CopyTask {
            len_wait: 100,
            len_sequence: 10,
            num_symbols: 8,
        }
    }
}

impl CopyTask {
    pub fn new(len_wait: usize, len_sequence: usize, num_symbols: usize) -> Result<Self> {
        let task = CopyTask {
            len_wait,
            len_sequence,
            num_symbols,
        };
        task.validate()?;
        Ok(task)
    }

    /// Checks the invariants `new` enforces. Needed again after deserialization.
    pub fn validate(&self) -> Result<()> {
        if self.len_wait < 1 {
            return Err(CopyTaskError::invalid(
                "len_wait",
                self.len_wait,
                "must be at least 1 so the marker fits",
            ));
        }
        if self.num_symbols < 1 {
            return Err(CopyTaskError::invalid(
                "num_symbols",
                self.num_symbols,
                "must be at least 1",
            ));
        }
        if self.num_symbols >= Symbol::MAX as usize {
            return Err(CopyTaskError::invalid(
                "num_symbols",
                self.num_symbols,
                "marker symbol would not fit the symbol type",
            ));
        }
        if self
            .len_sequence
            .checked_mul(2)
            .and_then(|x| x.checked_add(self.len_wait))
            .is_none()
        {
            return Err(CopyTaskError::invalid(
                "len_sequence",
                self.len_sequence,
                "total length overflows",
            ));
        }
        Ok(())
    }

    pub fn len_wait(&self) -> usize {
        self.len_wait
    }

    pub fn len_sequence(&self) -> usize {
        self.len_sequence
    }

    pub fn num_symbols(&self) -> usize {
        self.num_symbols
    }

    pub fn total_length(&self) -> usize {
        self.len_wait + 2 * self.len_sequence
    }

    pub fn wait_symbol(&self) -> Symbol {
        WAIT_SYMBOL
    }

    pub fn marker_symbol(&self) -> Symbol {
        self.num_symbols as Symbol + 1
    }

    pub fn marker_position(&self) -> usize {
        self.len_sequence + self.len_wait - 1
    }

    /// Number of distinct input symbols: wait, the payload alphabet and the marker.
    pub fn input_vocabulary(&self) -> usize {
        self.num_symbols + 2
    }

    /// Number of distinct target symbols. The marker never shows up in targets.
    pub fn output_classes(&self) -> usize {
        self.num_symbols + 1
    }

    pub fn baseline_loss(&self) -> Result<f64> {
        baseline::baseline_loss(self.len_sequence, self.num_symbols, self.len_wait)
    }

    pub fn memoryless_accuracy(&self) -> Result<f64> {
        baseline::memoryless_accuracy(self.len_sequence, self.num_symbols, self.len_wait)
    }

    /// Generates `n_data` fresh samples. All randomness comes from `rng`.
    pub fn generate<R: Rng>(&self, n_data: usize, rng: &mut R) -> Result<CopyBatch> {
        if n_data < 1 {
            return Err(CopyTaskError::invalid("n_data", n_data, "must be at least 1"));
        }
        let total = self.total_length();
        let marker_at = self.marker_position();
        let marker = self.marker_symbol();
        let num_symbols = self.num_symbols as Symbol;

        let mut inputs: Matrix<Symbol> = Matrix::zeros(n_data, total);
        let mut targets: Matrix<Symbol> = Matrix::zeros(n_data, total);

        for row in 0..n_data {
            for idx in 0..self.len_sequence {
                let symbol: Symbol = rng.random_range(1..=num_symbols);
                inputs.set(row, idx, symbol);
                targets.set(row, self.len_sequence + self.len_wait + idx, symbol);
            }
            inputs.set(row, marker_at, marker);
        }

        debug!(
            n_data,
            total_length = total,
            num_symbols = self.num_symbols,
            "generated copy task batch"
        );
        Ok(CopyBatch { inputs, targets })
    }
}

impl CopyBatch {
    pub fn len(&self) -> usize {
        self.inputs.rows()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.rows() == 0
    }

    pub fn sequence_length(&self) -> usize {
        self.inputs.cols()
    }

    pub fn sample(&self, idx: usize) -> (&[Symbol], &[Symbol]) {
        (self.inputs.row(idx), self.targets.row(idx))
    }

    pub fn samples(&self) -> impl Iterator<Item = (&[Symbol], &[Symbol])> + '_ {
        self.inputs.iter_rows().zip(self.targets.iter_rows())
    }
}

/// Positional form of [`CopyTask::generate`]: `(len_wait, n_data, len_sequence, num_symbols)`.
pub fn generate<R: Rng>(
    len_wait: usize,
    n_data: usize,
    len_sequence: usize,
    num_symbols: usize,
    rng: &mut R,
) -> Result<CopyBatch> {
    CopyTask::new(len_wait, len_sequence, num_symbols)?.generate(n_data, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::TestResult;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn check_batch(task: &CopyTask, batch: &CopyBatch) -> bool {
        let ls = task.len_sequence();
        let lw = task.len_wait();
        let marker = task.marker_symbol();

        for (input, target) in batch.samples() {
            if input.len() != lw + 2 * ls || target.len() != lw + 2 * ls {
                return false;
            }
            if input.iter().filter(|s| **s == marker).count() != 1 {
                return false;
            }
            if input[ls + lw - 1] != marker {
                return false;
            }
            for idx in 0..ls {
                if input[idx] < 1 || input[idx] > task.num_symbols() as Symbol {
                    return false;
                }
                if target[ls + lw + idx] != input[idx] {
                    return false;
                }
            }
            for idx in ls..input.len() {
                if idx != ls + lw - 1 && input[idx] != WAIT_SYMBOL {
                    return false;
                }
            }
            if target[..ls + lw].iter().any(|s| *s != WAIT_SYMBOL) {
                return false;
            }
        }
        true
    }

    quickcheck! {
        fn generated_batches_hold_invariants(len_wait: u8, len_sequence: u8, num_symbols: u8, n_data: u8, seed: u64) -> TestResult {
            if len_wait == 0 || num_symbols == 0 || n_data == 0 {
                return TestResult::discard();
            }
            let task = CopyTask::new(len_wait as usize, len_sequence as usize % 32, num_symbols as usize).unwrap();
            let mut rng = StdRng::seed_from_u64(seed);
            let batch = task.generate(n_data as usize % 16 + 1, &mut rng).unwrap();
            TestResult::from_bool(batch.sequence_length() == task.total_length() && check_batch(&task, &batch))
        }
    }

    #[test]
    fn small_scenario() {
        let mut rng = StdRng::seed_from_u64(1);
        let batch = generate(20, 1, 5, 3, &mut rng).unwrap();
        assert_eq!(batch.len(), 1);
        let (input, target) = batch.sample(0);
        assert_eq!(input.len(), 30);
        assert_eq!(target.len(), 30);

        for idx in 0..5 {
            assert!((1..=3).contains(&input[idx]));
        }
        assert_eq!(input[24], 4);
        for idx in 5..30 {
            if idx != 24 {
                assert_eq!(input[idx], 0);
            }
        }
        assert!(target[..25].iter().all(|s| *s == 0));
        assert_eq!(&target[25..30], &input[0..5]);
    }

    #[test]
    fn single_symbol_alphabet() {
        let mut rng = StdRng::seed_from_u64(2);
        let task = CopyTask::new(4, 6, 1).unwrap();
        assert_eq!(task.marker_symbol(), 2);
        let batch = task.generate(8, &mut rng).unwrap();
        for (input, target) in batch.samples() {
            assert!(input[..6].iter().all(|s| *s == 1));
            assert_eq!(input[9], 2);
            assert!(target[10..].iter().all(|s| *s == 1));
        }
    }

    #[test]
    fn empty_payload_is_just_waiting() {
        let mut rng = StdRng::seed_from_u64(3);
        let batch = generate(3, 2, 0, 5, &mut rng).unwrap();
        for (input, target) in batch.samples() {
            assert_eq!(input, &[0, 0, 6]);
            assert_eq!(target, &[0, 0, 0]);
        }
    }

    #[test]
    fn wait_of_one_puts_marker_right_after_payload() {
        let mut rng = StdRng::seed_from_u64(4);
        let task = CopyTask::new(1, 3, 2).unwrap();
        let batch = task.generate(1, &mut rng).unwrap();
        let (input, _) = batch.sample(0);
        assert_eq!(input.len(), 7);
        assert_eq!(input[3], 3);
    }

    #[test]
    fn same_seed_same_batch() {
        let task = CopyTask::new(10, 8, 8).unwrap();
        let a = task.generate(4, &mut StdRng::seed_from_u64(99)).unwrap();
        let b = task.generate(4, &mut StdRng::seed_from_u64(99)).unwrap();
        let c = task.generate(4, &mut StdRng::seed_from_u64(100)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let mut rng = StdRng::seed_from_u64(5);
        assert!(matches!(
            generate(0, 1, 5, 3, &mut rng),
            Err(CopyTaskError::InvalidParameter { name: "len_wait", .. })
        ));
        assert!(matches!(
            generate(5, 0, 5, 3, &mut rng),
            Err(CopyTaskError::InvalidParameter { name: "n_data", .. })
        ));
        assert!(matches!(
            generate(5, 1, 5, 0, &mut rng),
            Err(CopyTaskError::InvalidParameter { name: "num_symbols", .. })
        ));
        assert!(CopyTask::new(5, 5, Symbol::MAX as usize).is_err());
    }

    #[test]
    fn sizes_follow_the_alphabet() {
        let task = CopyTask::new(100, 10, 8).unwrap();
        assert_eq!(task.total_length(), 120);
        assert_eq!(task.input_vocabulary(), 10);
        assert_eq!(task.output_classes(), 9);
        assert_eq!(task.marker_position(), 109);
    }
}
