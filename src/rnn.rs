use crate::error::Result;
use crate::task::{CopyBatch, Symbol};

pub trait RNNState {
    /// Feeds one symbol and returns the logits for this step.
    fn propagate<'a>(&'a mut self, input: Symbol) -> Result<&'a [f64]>;
    fn reset(&mut self);
}

pub trait RNN {
    type RNNState;

    fn start(&self) -> Self::RNNState;
}

/// A model that maps a symbol sequence to per-step class scores.
pub trait SequenceModel {
    /// Per-step logits, one vector per input symbol.
    fn forward(&self, input: &[Symbol]) -> Result<Vec<Vec<f64>>>;

    /// Mean per-step cross-entropy over the whole batch.
    fn loss(&self, batch: &CopyBatch) -> Result<f64>;

    /// Fraction of steps where the most likely class is the target.
    fn accuracy(&self, batch: &CopyBatch) -> Result<f64>;

    fn predict(&self, input: &[Symbol]) -> Result<Vec<Symbol>>;
}
