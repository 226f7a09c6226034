// Embedding -> tanh recurrence -> linear readout, sized from a CopyTask.
//
// The recurrent matrix starts out orthogonal. Nothing keeps it orthogonal during training.
//
// Gradients are computed by hand: backpropagation through time over the whole sequence. The
// forward pass records hidden states, the backward pass walks them in reverse and accumulates
// into a zeroed model of the same shape.

use crate::error::{CopyTaskError, Result};
use crate::math::{argmax, cross_entropy, softmax};
use crate::matrix::Matrix;
use crate::rnn::{RNNState, SequenceModel, RNN};
use crate::task::{CopyBatch, CopyTask, Symbol};
use rand::Rng;
use rand_distr::StandardNormal;
use rayon::prelude::*;
use rcmaes::Vectorizable;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(default)]
pub struct ModelConfig {
    pub hidden_size: usize,
    pub embedding_size: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            hidden_size: 64,
            embedding_size: 16,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<()> {
        if self.hidden_size < 1 {
            return Err(CopyTaskError::invalid(
                "hidden_size",
                self.hidden_size,
                "must be at least 1",
            ));
        }
        if self.embedding_size < 1 {
            return Err(CopyTaskError::invalid(
                "embedding_size",
                self.embedding_size,
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "CopyModelParts")]
pub struct CopyModel {
    task: CopyTask,
    config: ModelConfig,

    embedding: Matrix<f64>, // vocabulary x embedding
    w_in: Matrix<f64>,      // hidden x embedding
    w_rec: Matrix<f64>,     // hidden x hidden
    b_hidden: Vec<f64>,
    w_out: Matrix<f64>, // classes x hidden
    b_out: Vec<f64>,
}

// Wire form of `CopyModel`; weight shapes are checked against the task and config on load.
#[derive(Deserialize)]
struct CopyModelParts {
    task: CopyTask,
    config: ModelConfig,
    embedding: Matrix<f64>,
    w_in: Matrix<f64>,
    w_rec: Matrix<f64>,
    b_hidden: Vec<f64>,
    w_out: Matrix<f64>,
    b_out: Vec<f64>,
}

impl TryFrom<CopyModelParts> for CopyModel {
    type Error = CopyTaskError;

    fn try_from(parts: CopyModelParts) -> Result<Self> {
        parts.task.validate()?;
        parts.config.validate()?;
        let model = CopyModel {
            task: parts.task,
            config: parts.config,
            embedding: parts.embedding,
            w_in: parts.w_in,
            w_rec: parts.w_rec,
            b_hidden: parts.b_hidden,
            w_out: parts.w_out,
            b_out: parts.b_out,
        };
        if !model.same_shape(&model.zero_like()) {
            return Err(CopyTaskError::Config(
                "model weights do not match its task and configuration".to_string(),
            ));
        }
        Ok(model)
    }
}

/// Loss and accuracies from one forward pass over a batch.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Evaluation {
    /// Mean per-step cross-entropy.
    pub loss: f64,
    pub accuracy: f64,
    /// `None` when the task has no payload.
    pub payload_accuracy: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct CopyModelState {
    model: CopyModel,
    hidden: Vec<f64>,
    next_hidden: Vec<f64>,
    logits: Vec<f64>,
}

// Activations of one forward pass. Row 0 of `hiddens` is the initial (zero) state, row t+1 is
// the state after consuming input t.
struct Trace {
    hiddens: Matrix<f64>,
    logits: Matrix<f64>,
}

impl Vectorizable for CopyModel {
    type Context = (CopyTask, ModelConfig);

    fn to_vec(&self) -> (Vec<f64>, Self::Context) {
        let mut result: Vec<f64> = Vec::with_capacity(self.num_parameters());
        result.extend_from_slice(self.embedding.as_slice());
        result.extend_from_slice(self.w_in.as_slice());
        result.extend_from_slice(self.w_rec.as_slice());
        result.extend_from_slice(&self.b_hidden);
        result.extend_from_slice(self.w_out.as_slice());
        result.extend_from_slice(&self.b_out);
        (result, (self.task, self.config))
    }

    fn from_vec(vec: &[f64], ctx: &Self::Context) -> Self {
        let mut model = CopyModel::zeros(ctx.0, ctx.1);
        let mut vec = vec;
        for part in model.parts_mut() {
            let (head, rest) = vec.split_at(part.len());
            part.copy_from_slice(head);
            vec = rest;
        }
        assert!(vec.is_empty());
        model
    }
}

impl CopyModel {
    /// All-zero model. Call `randomize` before training with gradients.
    pub fn new(task: &CopyTask, config: ModelConfig) -> Result<Self> {
        task.validate()?;
        config.validate()?;
        Ok(Self::zeros(*task, config))
    }

    fn zeros(task: CopyTask, config: ModelConfig) -> Self {
        let h = config.hidden_size;
        let e = config.embedding_size;
        CopyModel {
            task,
            config,
            embedding: Matrix::zeros(task.input_vocabulary(), e),
            w_in: Matrix::zeros(h, e),
            w_rec: Matrix::zeros(h, h),
            b_hidden: vec![0.0; h],
            w_out: Matrix::zeros(task.output_classes(), h),
            b_out: vec![0.0; task.output_classes()],
        }
    }

    fn parts_mut(&mut self) -> [&mut [f64]; 6] {
        [
            self.embedding.as_mut_slice(),
            self.w_in.as_mut_slice(),
            self.w_rec.as_mut_slice(),
            self.b_hidden.as_mut_slice(),
            self.w_out.as_mut_slice(),
            self.b_out.as_mut_slice(),
        ]
    }

    pub fn task(&self) -> &CopyTask {
        &self.task
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Same task, same config and same dimensions for every weight.
    pub fn same_shape(&self, other: &CopyModel) -> bool {
        fn dims(m: &Matrix<f64>) -> (usize, usize) {
            (m.rows(), m.cols())
        }
        self.task == other.task
            && self.config == other.config
            && dims(&self.embedding) == dims(&other.embedding)
            && dims(&self.w_in) == dims(&other.w_in)
            && dims(&self.w_rec) == dims(&other.w_rec)
            && self.b_hidden.len() == other.b_hidden.len()
            && dims(&self.w_out) == dims(&other.w_out)
            && self.b_out.len() == other.b_out.len()
    }

    pub fn zero_like(&self) -> Self {
        Self::zeros(self.task, self.config)
    }

    pub fn set_zero(&mut self) {
        for part in self.parts_mut() {
            for v in part.iter_mut() {
                *v = 0.0;
            }
        }
    }

    pub fn num_parameters(&self) -> usize {
        self.embedding.len()
            + self.w_in.len()
            + self.w_rec.len()
            + self.b_hidden.len()
            + self.w_out.len()
            + self.b_out.len()
    }

    /// Small uniform weights, zero biases and an orthogonal recurrent matrix.
    pub fn randomize<R: Rng>(&mut self, rng: &mut R) {
        let in_scale = 1.0 / (self.config.embedding_size as f64).sqrt();
        let out_scale = 1.0 / (self.config.hidden_size as f64).sqrt();

        for v in self.embedding.as_mut_slice().iter_mut() {
            *v = rng.random_range(-1.0..1.0);
        }
        for v in self.w_in.as_mut_slice().iter_mut() {
            *v = rng.random_range(-in_scale..in_scale);
        }
        for v in self.w_out.as_mut_slice().iter_mut() {
            *v = rng.random_range(-out_scale..out_scale);
        }
        for v in self.b_hidden.iter_mut() {
            *v = 0.0;
        }
        for v in self.b_out.iter_mut() {
            *v = 0.0;
        }
        self.w_rec = random_orthogonal(self.config.hidden_size, rng);
    }

    fn check_input(&self, symbol: Symbol) -> Result<usize> {
        let idx = symbol as usize;
        if idx >= self.task.input_vocabulary() {
            return Err(CopyTaskError::invalid(
                "input symbol",
                symbol,
                "outside of the input vocabulary",
            ));
        }
        Ok(idx)
    }

    fn check_target(&self, symbol: Symbol) -> Result<usize> {
        let idx = symbol as usize;
        if idx >= self.task.output_classes() {
            return Err(CopyTaskError::invalid(
                "target symbol",
                symbol,
                "outside of the output classes",
            ));
        }
        Ok(idx)
    }

    #[inline]
    fn step(&self, input: usize, h_prev: &[f64], h: &mut [f64], logits: &mut [f64]) {
        h.copy_from_slice(&self.b_hidden);
        self.w_in.mul_vec_add(self.embedding.row(input), h);
        self.w_rec.mul_vec_add(h_prev, h);
        for v in h.iter_mut() {
            *v = v.tanh();
        }
        logits.copy_from_slice(&self.b_out);
        self.w_out.mul_vec_add(h, logits);
    }

    fn run(&self, input: &[Symbol]) -> Result<Trace> {
        let nhidden = self.config.hidden_size;
        let mut hiddens: Matrix<f64> = Matrix::zeros(input.len() + 1, nhidden);
        let mut logits: Matrix<f64> = Matrix::zeros(input.len(), self.task.output_classes());
        let mut h_prev = vec![0.0; nhidden];
        for (t, symbol) in input.iter().enumerate() {
            let idx = self.check_input(*symbol)?;
            let h = hiddens.row_mut(t + 1);
            self.step(idx, &h_prev, h, logits.row_mut(t));
            h_prev.copy_from_slice(hiddens.row(t + 1));
        }
        Ok(Trace { hiddens, logits })
    }

    // Validates shape and every symbol, so scoring and backprop can index without checks.
    fn check_batch(&self, batch: &CopyBatch) -> Result<usize> {
        if batch.inputs.rows() != batch.targets.rows() || batch.inputs.cols() != batch.targets.cols()
        {
            return Err(CopyTaskError::invalid(
                "batch",
                format!(
                    "{}x{} vs {}x{}",
                    batch.inputs.rows(),
                    batch.inputs.cols(),
                    batch.targets.rows(),
                    batch.targets.cols()
                ),
                "inputs and targets differ in shape",
            ));
        }
        if batch.sequence_length() != self.task.total_length() {
            return Err(CopyTaskError::invalid(
                "batch sequence length",
                batch.sequence_length(),
                "does not match the task's total length",
            ));
        }
        let steps = batch.len() * batch.sequence_length();
        if steps == 0 {
            return Err(CopyTaskError::DomainError("batch has no steps".to_string()));
        }
        for symbol in batch.inputs.as_slice() {
            self.check_input(*symbol)?;
        }
        for symbol in batch.targets.as_slice() {
            self.check_target(*symbol)?;
        }
        Ok(steps)
    }

    /// Per-sample (loss sum, correct steps, correct payload steps). `batch` must have passed
    /// `check_batch`.
    fn score_samples(&self, batch: &CopyBatch) -> Result<Vec<(f64, usize, usize)>> {
        let payload_from = self.task.len_sequence() + self.task.len_wait();
        (0..batch.len())
            .into_par_iter()
            .map(|row| -> Result<(f64, usize, usize)> {
                let (input, target) = batch.sample(row);
                let trace = self.run(input)?;
                let mut loss = 0.0;
                let mut correct = 0;
                let mut payload_correct = 0;
                for t in 0..input.len() {
                    let tgt = target[t] as usize;
                    let logits = trace.logits.row(t);
                    loss += cross_entropy(logits, tgt);
                    if argmax(logits) == tgt {
                        correct += 1;
                        if t >= payload_from {
                            payload_correct += 1;
                        }
                    }
                }
                Ok((loss, correct, payload_correct))
            })
            .collect()
    }

    /// Loss, accuracy and payload accuracy with a single forward pass per sample.
    pub fn evaluate(&self, batch: &CopyBatch) -> Result<Evaluation> {
        let steps = self.check_batch(batch)?;
        let mut loss = 0.0;
        let mut correct = 0;
        let mut payload_correct = 0;
        for (l, c, p) in self.score_samples(batch)? {
            loss += l;
            correct += c;
            payload_correct += p;
        }
        let payload_steps = batch.len() * self.task.len_sequence();
        Ok(Evaluation {
            loss: loss / steps as f64,
            accuracy: correct as f64 / steps as f64,
            payload_accuracy: if payload_steps == 0 {
                None
            } else {
                Some(payload_correct as f64 / payload_steps as f64)
            },
        })
    }

    /// Accuracy restricted to the final `len_sequence` steps, where the payload is reproduced.
    /// Returns `None` when the task has no payload.
    pub fn payload_accuracy(&self, batch: &CopyBatch) -> Result<Option<f64>> {
        Ok(self.evaluate(batch)?.payload_accuracy)
    }

    /// Backpropagation through time for the mean per-step cross-entropy of `batch`.
    ///
    /// Gradients are added to `grad` (so it should usually be zeroed first). Returns the loss.
    /// On error `grad` is left untouched.
    pub fn backpropagate(&self, batch: &CopyBatch, grad: &mut CopyModel) -> Result<f64> {
        if !self.same_shape(grad) {
            return Err(CopyTaskError::invalid(
                "grad",
                format!("{:?} {:?}", grad.task, grad.config),
                "gradient model differs in shape from the model",
            ));
        }
        let steps = self.check_batch(batch)?;

        let scale = 1.0 / steps as f64;
        let nhidden = self.config.hidden_size;
        let nclasses = self.task.output_classes();

        let mut total_loss = 0.0;
        let mut dy = vec![0.0; nclasses];
        let mut dh = vec![0.0; nhidden];
        let mut dh_next = vec![0.0; nhidden];
        let mut da = vec![0.0; nhidden];

        for (input, target) in batch.samples() {
            let trace = self.run(input)?;
            for v in dh_next.iter_mut() {
                *v = 0.0;
            }

            for t in (0..input.len()).rev() {
                let tgt = target[t] as usize;
                let logits = trace.logits.row(t);
                total_loss += cross_entropy(logits, tgt);

                dy.copy_from_slice(logits);
                softmax(&mut dy);
                dy[tgt] -= 1.0;
                for v in dy.iter_mut() {
                    *v *= scale;
                }

                let h = trace.hiddens.row(t + 1);
                let h_prev = trace.hiddens.row(t);

                grad.w_out.add_outer(&dy, h);
                for (g, d) in grad.b_out.iter_mut().zip(dy.iter()) {
                    *g += *d;
                }

                dh.copy_from_slice(&dh_next);
                self.w_out.transpose_mul_vec_add(&dy, &mut dh);

                for idx in 0..nhidden {
                    da[idx] = dh[idx] * (1.0 - h[idx] * h[idx]);
                }
                for (g, d) in grad.b_hidden.iter_mut().zip(da.iter()) {
                    *g += *d;
                }

                let symbol = input[t] as usize;
                grad.w_in.add_outer(&da, self.embedding.row(symbol));
                grad.w_rec.add_outer(&da, h_prev);
                self.w_in
                    .transpose_mul_vec_add(&da, grad.embedding.row_mut(symbol));

                for v in dh_next.iter_mut() {
                    *v = 0.0;
                }
                self.w_rec.transpose_mul_vec_add(&da, &mut dh_next);
            }
        }

        Ok(total_loss * scale)
    }
}

impl SequenceModel for CopyModel {
    fn forward(&self, input: &[Symbol]) -> Result<Vec<Vec<f64>>> {
        let trace = self.run(input)?;
        Ok(trace.logits.iter_rows().map(|r| r.to_vec()).collect())
    }

    fn loss(&self, batch: &CopyBatch) -> Result<f64> {
        Ok(self.evaluate(batch)?.loss)
    }

    fn accuracy(&self, batch: &CopyBatch) -> Result<f64> {
        Ok(self.evaluate(batch)?.accuracy)
    }

    fn predict(&self, input: &[Symbol]) -> Result<Vec<Symbol>> {
        let trace = self.run(input)?;
        Ok(trace
            .logits
            .iter_rows()
            .map(|logits| argmax(logits) as Symbol)
            .collect())
    }
}

impl RNN for CopyModel {
    type RNNState = CopyModelState;

    fn start(&self) -> Self::RNNState {
        CopyModelState {
            model: self.clone(),
            hidden: vec![0.0; self.config.hidden_size],
            next_hidden: vec![0.0; self.config.hidden_size],
            logits: vec![0.0; self.task.output_classes()],
        }
    }
}

impl RNNState for CopyModelState {
    fn propagate<'a>(&'a mut self, input: Symbol) -> Result<&'a [f64]> {
        let idx = self.model.check_input(input)?;
        self.model
            .step(idx, &self.hidden, &mut self.next_hidden, &mut self.logits);
        std::mem::swap(&mut self.hidden, &mut self.next_hidden);
        Ok(&self.logits)
    }

    fn reset(&mut self) {
        for h in self.hidden.iter_mut() {
            *h = 0.0;
        }
    }
}

// Gram-Schmidt on a Gaussian matrix. Rows come out orthonormal.
fn random_orthogonal<R: Rng>(n: usize, rng: &mut R) -> Matrix<f64> {
    let mut m: Matrix<f64> = Matrix::zeros(n, n);
    let mut row = 0;
    while row < n {
        let mut v: Vec<f64> = (0..n).map(|_| rng.sample::<f64, _>(StandardNormal)).collect();
        for prev in 0..row {
            let p = m.row(prev);
            let dot: f64 = v.iter().zip(p.iter()).map(|(a, b)| a * b).sum();
            for (x, y) in v.iter_mut().zip(p.iter()) {
                *x -= dot * y;
            }
        }
        let norm: f64 = v.iter().map(|x| x * x).sum::<f64>().sqrt();
        // nearly dependent draw, try again
        if norm < 1e-6 {
            continue;
        }
        for (dst, x) in m.row_mut(row).iter_mut().zip(v.iter()) {
            *dst = x / norm;
        }
        row += 1;
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tiny() -> (CopyTask, CopyModel, StdRng) {
        let mut rng = StdRng::seed_from_u64(42);
        let task = CopyTask::new(3, 2, 3).unwrap();
        let mut model = CopyModel::new(
            &task,
            ModelConfig {
                hidden_size: 5,
                embedding_size: 3,
            },
        )
        .unwrap();
        model.randomize(&mut rng);
        (task, model, rng)
    }

    #[test]
    pub fn to_vec_and_from_vec_is_id() {
        let (_task, model, _rng) = tiny();
        let (vec, ctx) = model.to_vec();
        assert_eq!(vec.len(), model.num_parameters());
        let model2 = CopyModel::from_vec(&vec, &ctx);
        assert_eq!(model, model2);
    }

    #[test]
    fn recurrent_matrix_starts_orthogonal() {
        let mut rng = StdRng::seed_from_u64(7);
        let m = random_orthogonal(12, &mut rng);
        for a in 0..12 {
            for b in 0..12 {
                let dot: f64 = m.row(a).iter().zip(m.row(b).iter()).map(|(x, y)| x * y).sum();
                let expected = if a == b { 1.0 } else { 0.0 };
                assert!((dot - expected).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn zero_model_is_uniform() {
        let task = CopyTask::new(10, 4, 7).unwrap();
        let model = CopyModel::new(&task, ModelConfig::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let batch = task.generate(3, &mut rng).unwrap();
        let loss = model.loss(&batch).unwrap();
        assert!((loss - (task.output_classes() as f64).ln()).abs() < 1e-12);
    }

    #[test]
    fn streaming_state_matches_forward() {
        let (task, model, mut rng) = tiny();
        let batch = task.generate(1, &mut rng).unwrap();
        let (input, _) = batch.sample(0);
        let logits = model.forward(input).unwrap();
        assert_eq!(logits.len(), task.total_length());

        let mut st = model.start();
        for (t, symbol) in input.iter().enumerate() {
            let out = st.propagate(*symbol).unwrap();
            for (a, b) in out.iter().zip(logits[t].iter()) {
                assert!((a - b).abs() < 1e-12);
            }
        }
        st.reset();
        let first = st.propagate(input[0]).unwrap().to_vec();
        assert_eq!(first, logits[0]);
    }

    #[test]
    fn predict_gives_one_symbol_per_step() {
        let (task, model, mut rng) = tiny();
        let batch = task.generate(1, &mut rng).unwrap();
        let predicted = model.predict(batch.sample(0).0).unwrap();
        assert_eq!(predicted.len(), task.total_length());
        assert!(predicted
            .iter()
            .all(|s| (*s as usize) < task.output_classes()));
    }

    #[test]
    fn rejects_symbols_outside_vocabulary() {
        let (task, model, _rng) = tiny();
        let bad = vec![task.marker_symbol() + 1];
        assert!(matches!(
            model.forward(&bad),
            Err(CopyTaskError::InvalidParameter { .. })
        ));
        let mut st = model.start();
        assert!(st.propagate(task.marker_symbol() + 1).is_err());
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let (task, model, mut rng) = tiny();
        let batch = task.generate(2, &mut rng).unwrap();

        let mut grad = model.zero_like();
        let loss = model.backpropagate(&batch, &mut grad).unwrap();
        assert!((loss - model.loss(&batch).unwrap()).abs() < 1e-12);

        let (params, ctx) = model.to_vec();
        let (analytic, _) = grad.to_vec();
        let eps = 1e-5;
        for idx in 0..params.len() {
            let mut plus = params.clone();
            plus[idx] += eps;
            let mut minus = params.clone();
            minus[idx] -= eps;
            let lp = CopyModel::from_vec(&plus, &ctx).loss(&batch).unwrap();
            let lm = CopyModel::from_vec(&minus, &ctx).loss(&batch).unwrap();
            let numeric = (lp - lm) / (2.0 * eps);
            assert!(
                (numeric - analytic[idx]).abs() < 1e-6 + 1e-4 * numeric.abs(),
                "param {}: numeric {} analytic {}",
                idx,
                numeric,
                analytic[idx]
            );
        }
    }

    #[test]
    fn perfect_scores_on_payload_free_task() {
        // Without a payload every target is the wait symbol; a large wait bias gets it all right.
        let task = CopyTask::new(4, 0, 3).unwrap();
        let mut model = CopyModel::new(&task, ModelConfig::default()).unwrap();
        model.b_out[0] = 10.0;
        let mut rng = StdRng::seed_from_u64(3);
        let batch = task.generate(2, &mut rng).unwrap();
        assert_eq!(model.accuracy(&batch).unwrap(), 1.0);
        assert_eq!(model.payload_accuracy(&batch).unwrap(), None);
    }

    #[test]
    fn evaluate_agrees_with_separate_scores() {
        let (task, model, mut rng) = tiny();
        let batch = task.generate(8, &mut rng).unwrap();
        let eval = model.evaluate(&batch).unwrap();
        assert_eq!(eval.loss, model.loss(&batch).unwrap());
        assert_eq!(eval.accuracy, model.accuracy(&batch).unwrap());
        assert_eq!(eval.payload_accuracy, model.payload_accuracy(&batch).unwrap());
        assert!(eval.payload_accuracy.is_some());
    }

    #[test]
    fn rejects_batch_of_another_task() {
        let (_task, model, mut rng) = tiny();
        let other = CopyTask::new(1, 1, 3).unwrap();
        let batch = other.generate(4, &mut rng).unwrap();
        assert!(matches!(
            model.loss(&batch),
            Err(CopyTaskError::InvalidParameter { .. })
        ));
        assert!(matches!(
            model.payload_accuracy(&batch),
            Err(CopyTaskError::InvalidParameter { .. })
        ));
        let mut grad = model.zero_like();
        assert!(model.backpropagate(&batch, &mut grad).is_err());
    }

    #[test]
    fn truncated_batch_does_not_deserialize() {
        let json = r#"{"inputs":{"nrows":2,"ncols":7,"items":[0]},
                       "targets":{"nrows":2,"ncols":7,"items":[0]}}"#;
        assert!(serde_json::from_str::<CopyBatch>(json).is_err());
    }

    #[test]
    fn failed_backprop_leaves_gradient_untouched() {
        let (task, model, mut rng) = tiny();
        let mut batch = task.generate(2, &mut rng).unwrap();
        batch.targets.set(1, 0, task.marker_symbol());

        let mut grad = model.zero_like();
        assert!(matches!(
            model.backpropagate(&batch, &mut grad),
            Err(CopyTaskError::InvalidParameter { .. })
        ));
        assert_eq!(grad, model.zero_like());
    }

    #[test]
    fn backprop_rejects_mismatched_gradient() {
        let (task, model, mut rng) = tiny();
        let batch = task.generate(2, &mut rng).unwrap();
        let mut grad = CopyModel::new(
            &task,
            ModelConfig {
                hidden_size: 6,
                embedding_size: 3,
            },
        )
        .unwrap();
        assert!(matches!(
            model.backpropagate(&batch, &mut grad),
            Err(CopyTaskError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn model_json_roundtrip_checks_weight_shapes() {
        let (_task, model, _rng) = tiny();
        let json = serde_json::to_string(&model).unwrap();
        let back: CopyModel = serde_json::from_str(&json).unwrap();
        assert!(back.same_shape(&model));

        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value["config"]["hidden_size"] = serde_json::json!(6);
        assert!(serde_json::from_value::<CopyModel>(value).is_err());
    }
}
