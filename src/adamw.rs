use crate::error::Result;
use crate::model::CopyModel;
use crate::task::CopyBatch;
use rcmaes::Vectorizable;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(default)]
pub struct AdamWConfiguration {
    pub(crate) beta1: f64,
    pub(crate) beta2: f64,
    pub(crate) epsilon: f64,
    pub(crate) learning_rate: f64,
    pub(crate) weight_decay: f64,
    pub(crate) gradient_clip: Option<f64>,
}

impl AdamWConfiguration {
    pub fn new() -> Self {
        AdamWConfiguration {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            learning_rate: 0.001,
            weight_decay: 0.0,
            gradient_clip: None,
        }
    }

    /// Clamps every per-parameter update to `[-gradient_clip, gradient_clip]`.
    pub fn gradient_clip(self, gradient_clip: f64) -> Self {
        Self {
            gradient_clip: Some(gradient_clip),
            ..self
        }
    }

    pub fn learning_rate(self, learning_rate: f64) -> Self {
        Self {
            learning_rate,
            ..self
        }
    }

    pub fn weight_decay(self, weight_decay: f64) -> Self {
        Self {
            weight_decay,
            ..self
        }
    }

    pub fn beta1(self, beta1: f64) -> Self {
        Self { beta1, ..self }
    }

    pub fn beta2(self, beta2: f64) -> Self {
        Self { beta2, ..self }
    }

    pub fn epsilon(self, epsilon: f64) -> Self {
        Self { epsilon, ..self }
    }

    pub fn get_learning_rate(&self) -> f64 {
        self.learning_rate
    }
}

impl Default for AdamWConfiguration {
    fn default() -> Self {
        Self::new()
    }
}

/// AdamW optimizer state for a `CopyModel`, including the gradient buffer backprop writes into.
#[derive(Clone, Debug)]
pub struct AdamW {
    config: AdamWConfiguration,
    first_moment: Vec<f64>,
    second_moment: Vec<f64>,
    iteration: i64,
    gradient: CopyModel,
}

impl AdamW {
    pub fn new(config: AdamWConfiguration, model: &CopyModel) -> Self {
        let nparameters = model.num_parameters();
        AdamW {
            config,
            first_moment: vec![0.0; nparameters],
            second_moment: vec![0.0; nparameters],
            iteration: 1,
            gradient: model.zero_like(),
        }
    }

    pub fn config(&self) -> &AdamWConfiguration {
        &self.config
    }

    /// Number of `step` calls so far.
    pub fn steps_taken(&self) -> i64 {
        self.iteration - 1
    }

    pub fn zero_gradients(&mut self) {
        self.gradient.set_zero();
    }

    pub fn gradient(&self) -> &CopyModel {
        &self.gradient
    }

    pub fn gradient_mut(&mut self) -> &mut CopyModel {
        &mut self.gradient
    }

    /// Accumulates the gradient of `model`'s loss on `batch`. Returns the loss.
    pub fn backward(&mut self, model: &CopyModel, batch: &CopyBatch) -> Result<f64> {
        model.backpropagate(batch, &mut self.gradient)
    }

    /// Applies one update from the accumulated gradient.
    pub fn step(&mut self, model: &mut CopyModel) {
        let (mut vec, ctx) = model.to_vec();
        let (gvec, _gctx) = self.gradient.to_vec();
        let nparameters = vec.len();
        assert_eq!(nparameters, gvec.len());
        assert_eq!(nparameters, self.first_moment.len());

        let beta1 = self.config.beta1;
        let beta2 = self.config.beta2;
        let learning_rate = self.config.learning_rate;

        // exponent saturates; beta^t is zero long before this anyway
        let iteration: i32 = if self.iteration > 1_000_000 {
            1_000_000
        } else {
            self.iteration as i32
        };
        let beta1_t = 1.0 - beta1.powi(iteration);
        let beta2_t = 1.0 - beta2.powi(iteration);

        for p in 0..nparameters {
            let g = gvec[p];
            self.first_moment[p] = beta1 * self.first_moment[p] + (1.0 - beta1) * g;
            self.second_moment[p] = beta2 * self.second_moment[p] + (1.0 - beta2) * g * g;

            let bias_correction1 = self.first_moment[p] / beta1_t;
            let bias_correction2 = self.second_moment[p] / beta2_t;

            let mut adjustment =
                learning_rate * bias_correction1 / (bias_correction2.sqrt() + self.config.epsilon);
            if let Some(clip) = self.config.gradient_clip {
                adjustment = adjustment.max(-clip).min(clip);
            }

            // parameter = parameter - adjustment - weight_decay * parameter
            let decay = self.config.weight_decay * vec[p];
            vec[p] -= adjustment;
            vec[p] -= decay;
        }

        *model = CopyModel::from_vec(&vec, &ctx);
        self.iteration += 1;
    }
}
