use crate::adamw::AdamW;
use crate::config::{ExperimentConfig, TrainingMethod};
use crate::error::Result;
use crate::model::{CopyModel, Evaluation, ModelConfig};
use crate::rnn::SequenceModel;
use crate::stop_condition::PlateauDetector;
use crate::task::CopyTask;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use rcmaes::cosyne::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// One evaluation point on the training curve.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TrainingRecord {
    pub iteration: usize,
    /// Loss on the batch used for the update (best candidate's score for CoSyNE).
    pub train_loss: f64,
    pub eval_loss: f64,
    pub eval_accuracy: f64,
    pub payload_accuracy: Option<f64>,
    pub sigma: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TrainingReport {
    pub task: CopyTask,
    pub model: ModelConfig,
    pub method: TrainingMethod,
    pub num_parameters: usize,
    pub baseline_loss: f64,
    pub memoryless_accuracy: f64,
    pub records: Vec<TrainingRecord>,
    pub iterations_run: usize,
    pub stopped_early: bool,
}

impl TrainingReport {
    pub fn final_record(&self) -> Option<&TrainingRecord> {
        self.records.last()
    }

    /// Whether the last evaluation got below the no-learning loss.
    pub fn beats_baseline(&self) -> bool {
        match self.final_record() {
            Some(r) => r.eval_loss < self.baseline_loss,
            None => false,
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }
}

/// Owns the model, the random state and the configuration of one experiment.
pub struct Trainer {
    config: ExperimentConfig,
    model: CopyModel,
    rng: StdRng,
    baseline_loss: f64,
    memoryless_accuracy: f64,
}

impl Trainer {
    pub fn new(config: ExperimentConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.training.seed);
        let mut model = CopyModel::new(&config.task, config.model)?;
        model.randomize(&mut rng);
        let baseline_loss = config.task.baseline_loss()?;
        let memoryless_accuracy = config.task.memoryless_accuracy()?;
        Ok(Trainer {
            config,
            model,
            rng,
            baseline_loss,
            memoryless_accuracy,
        })
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn model(&self) -> &CopyModel {
        &self.model
    }

    pub fn into_model(self) -> CopyModel {
        self.model
    }

    pub fn baseline_loss(&self) -> f64 {
        self.baseline_loss
    }

    /// Scores the model on a fresh batch of `eval_batch_size` samples.
    pub fn evaluate(&mut self) -> Result<Evaluation> {
        let batch = self
            .config
            .task
            .generate(self.config.training.eval_batch_size, &mut self.rng)?;
        self.model.evaluate(&batch)
    }

    fn record(
        &mut self,
        iteration: usize,
        train_loss: f64,
        sigma: Option<f64>,
    ) -> Result<TrainingRecord> {
        let Evaluation {
            loss: eval_loss,
            accuracy: eval_accuracy,
            payload_accuracy,
        } = self.evaluate()?;
        info!(
            iteration,
            train_loss,
            eval_loss,
            eval_accuracy,
            payload_accuracy = payload_accuracy.unwrap_or(f64::NAN),
            baseline = self.baseline_loss,
            sigma = sigma.unwrap_or(f64::NAN),
            "evaluation"
        );
        Ok(TrainingRecord {
            iteration,
            train_loss,
            eval_loss,
            eval_accuracy,
            payload_accuracy,
            sigma,
        })
    }

    fn report(
        &self,
        records: Vec<TrainingRecord>,
        iterations_run: usize,
        stopped_early: bool,
    ) -> TrainingReport {
        TrainingReport {
            task: self.config.task,
            model: self.config.model,
            method: self.config.training.method,
            num_parameters: self.model.num_parameters(),
            baseline_loss: self.baseline_loss,
            memoryless_accuracy: self.memoryless_accuracy,
            records,
            iterations_run,
            stopped_early,
        }
    }

    pub fn train(&mut self) -> Result<TrainingReport> {
        info!(
            method = ?self.config.training.method,
            iterations = self.config.training.iterations,
            total_length = self.config.task.total_length(),
            num_parameters = self.model.num_parameters(),
            baseline = self.baseline_loss,
            "starting training"
        );
        match self.config.training.method {
            TrainingMethod::AdamW => self.train_adamw(),
            TrainingMethod::Cosyne => self.train_cosyne(),
        }
    }

    fn train_adamw(&mut self) -> Result<TrainingReport> {
        let settings = self.config.training.clone();
        let mut adamw = AdamW::new(settings.adamw, &self.model);
        let mut plateau = settings
            .plateau_window
            .map(|window| PlateauDetector::new(window, settings.plateau_threshold));

        let mut records = Vec::new();
        let mut iterations_run = 0;
        let mut stopped_early = false;

        for iteration in 1..=settings.iterations {
            let batch = self
                .config
                .task
                .generate(settings.batch_size, &mut self.rng)?;
            adamw.zero_gradients();
            let loss = adamw.backward(&self.model, &batch)?;
            adamw.step(&mut self.model);
            iterations_run = iteration;

            if iteration % settings.log_every == 0 || iteration == settings.iterations {
                let record = self.record(iteration, loss, None)?;
                let eval_loss = record.eval_loss;
                records.push(record);
                if let Some(ref mut plateau) = plateau {
                    if plateau.push_and_check(eval_loss) {
                        warn!(iteration, eval_loss, "loss stopped going down, stopping early");
                        stopped_early = true;
                        break;
                    }
                }
            }
        }

        Ok(self.report(records, iterations_run, stopped_early))
    }

    fn train_cosyne(&mut self) -> Result<TrainingReport> {
        let settings = self.config.training.clone();
        let mut cosyne = Cosyne::new(
            &self.model,
            &CosyneSettings::default()
                .sigma(settings.cosyne.sigma)
                .shrinkage_multiplier(settings.cosyne.shrinkage_multiplier),
        );
        let mut scores = PlateauDetector::new(settings.cosyne.sigma_decay_every, 0.5);

        let mut records = Vec::new();
        for iteration in 1..=settings.iterations {
            let batch = self
                .config
                .task
                .generate(settings.batch_size, &mut self.rng)?;

            // every candidate is scored on the same batch
            let candidates: Vec<CosyneCandidate<CopyModel>> = cosyne
                .ask()
                .into_par_iter()
                .map(|mut candidate| -> Result<CosyneCandidate<CopyModel>> {
                    let score = candidate.item().loss(&batch)?;
                    candidate.set_score(score);
                    Ok(candidate)
                })
                .collect::<Result<_>>()?;

            let mut best_score: f64 = std::f64::INFINITY;
            for cand in candidates.iter() {
                if cand.score() < best_score {
                    best_score = cand.score();
                    self.model = cand.item().clone();
                }
            }
            cosyne.tell(candidates);

            let trend = scores.push(best_score);
            if iteration % settings.cosyne.sigma_decay_every == 0 {
                if let Some(p) = trend {
                    if p <= 0.5 {
                        let old_sigma = cosyne.sigma();
                        cosyne.set_sigma(old_sigma * 0.5);
                        info!(iteration, old_sigma, sigma = cosyne.sigma(), "sigma adjusted");
                    }
                }
            }

            if iteration % settings.log_every == 0 || iteration == settings.iterations {
                let record = self.record(iteration, best_score, Some(cosyne.sigma()))?;
                records.push(record);
            }
        }

        Ok(self.report(records, settings.iterations, false))
    }
}
