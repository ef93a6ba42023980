//! # Training Loop
//!
//! Fits a learned vector field to a trajectory:
//!
//! ```text
//! repeat niters times:
//!     sample batch -> rollout -> loss -> backward -> optimizer step
//!     every test_freq iterations: full-trajectory evaluation
//! ```

use std::path::Path;
use std::time::Instant;

use ndarray::Array2;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::meter::RunningAverageMeter;
use super::optim::Optimizer;
use super::viz::Visualizer;
use crate::config::TrainingConfig;
use crate::data::{Batch, BatchSampler, TrajectoryDataset};
use crate::error::{Error, Result};
use crate::model::{LearnedField, VectorFieldModel};
use crate::ode::{Integrator, VectorField};

/// Full-trajectory evaluation result
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub iteration: usize,
    pub loss: f64,
}

/// Summary of a training run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Batch loss of every iteration
    pub losses: Vec<f64>,
    pub evaluations: Vec<Evaluation>,
    /// EMA of the batch loss at the end of the run
    pub final_loss_avg: f64,
    /// EMA of the iteration wall-clock time in seconds
    pub final_time_avg: f64,
}

impl TrainingReport {
    pub fn iterations(&self) -> usize {
        self.losses.len()
    }

    /// Most recent evaluation loss
    pub fn last_evaluation(&self) -> Option<&Evaluation> {
        self.evaluations.last()
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}

/// Trainer for a vector field on one trajectory
pub struct Trainer<'a> {
    config: TrainingConfig,
    dataset: &'a TrajectoryDataset,
    model: VectorFieldModel,
    integrator: Integrator,
    optimizer: Box<dyn Optimizer>,
    time_meter: RunningAverageMeter,
    loss_meter: RunningAverageMeter,
    visualizer: Option<Box<dyn Visualizer + 'a>>,
    eval_count: usize,
}

impl<'a> Trainer<'a> {
    /// Create a trainer with a freshly initialized learned field
    pub fn new<R: Rng + ?Sized>(
        config: TrainingConfig,
        dataset: &'a TrajectoryDataset,
        rng: &mut R,
    ) -> Result<Self> {
        config.validate()?;
        let field = LearnedField::new(dataset.dim(), &config.model, rng)?;
        Self::with_model(config, dataset, field.into())
    }

    /// Create a trainer for an existing model
    pub fn with_model(
        config: TrainingConfig,
        dataset: &'a TrajectoryDataset,
        model: VectorFieldModel,
    ) -> Result<Self> {
        config.validate()?;
        if !model.is_trainable() {
            return Err(Error::NotTrainable(model.name().to_string()));
        }
        if model.dim() != dataset.dim() {
            return Err(Error::shape("model state dimension", dataset.dim(), model.dim()));
        }

        let device = config.device.resolve();
        let integrator = config.integrator();
        let optimizer = config.optimizer.build(config.learning_rate);
        let time_meter = RunningAverageMeter::new(config.meter_momentum)?;
        let loss_meter = RunningAverageMeter::new(config.meter_momentum)?;

        info!(
            "Trainer ready: {} parameters, method {}, {:?} gradients, optimizer {}, device {}",
            model.num_params(),
            integrator.method(),
            integrator.gradient_mode(),
            optimizer.name(),
            device
        );

        Ok(Self {
            config,
            dataset,
            model,
            integrator,
            optimizer,
            time_meter,
            loss_meter,
            visualizer: None,
            eval_count: 0,
        })
    }

    /// Attach an observer for evaluations; used only when `config.viz` is set
    pub fn with_visualizer(mut self, visualizer: Box<dyn Visualizer + 'a>) -> Self {
        self.visualizer = Some(visualizer);
        self
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn model(&self) -> &VectorFieldModel {
        &self.model
    }

    pub fn into_model(self) -> VectorFieldModel {
        self.model
    }

    pub fn time_meter(&self) -> &RunningAverageMeter {
        &self.time_meter
    }

    pub fn loss_meter(&self) -> &RunningAverageMeter {
        &self.loss_meter
    }

    /// Run `niters` iterations, evaluating every `test_freq`.
    ///
    /// The first error aborts the run. Parameters keep the values of the
    /// last completed update.
    pub fn run<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<TrainingReport> {
        let mut report = TrainingReport {
            losses: Vec::with_capacity(self.config.niters),
            ..TrainingReport::default()
        };

        info!(
            "Starting training: {} iterations, batch {} x {} states",
            self.config.niters, self.config.batch_size, self.config.batch_time
        );

        for itr in 1..=self.config.niters {
            let loss = self.train_step(rng).map_err(|e| e.at_iteration(itr))?;
            report.losses.push(loss);
            debug!(
                "Iter {:04} | Loss {:.6} ({:.6}) | Time {:.4}s ({:.4}s)",
                itr,
                loss,
                self.loss_meter.avg(),
                self.time_meter.val().unwrap_or(0.0),
                self.time_meter.avg()
            );

            if itr % self.config.test_freq == 0 {
                let loss = self.evaluate(itr).map_err(|e| e.at_iteration(itr))?;
                report.evaluations.push(Evaluation {
                    iteration: itr,
                    loss,
                });
            }
        }

        report.final_loss_avg = self.loss_meter.avg();
        report.final_time_avg = self.time_meter.avg();
        info!(
            "Training completed. Running loss {:.6}, {:.4}s per iteration",
            report.final_loss_avg, report.final_time_avg
        );
        Ok(report)
    }

    /// Sample a batch and fit it
    pub fn train_step<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<f64> {
        let start = Instant::now();
        let batch = BatchSampler::new(self.dataset).sample(
            rng,
            self.config.batch_size,
            self.config.batch_time,
        )?;
        let loss = self.fit_batch(&batch)?;

        self.time_meter.update(start.elapsed().as_secs_f64());
        self.loss_meter.update(loss);
        Ok(loss)
    }

    /// Rollout -> loss -> backward -> update on one batch, returning the
    /// loss before the update
    pub fn fit_batch(&mut self, batch: &Batch) -> Result<f64> {
        let name = self.model.name().to_string();
        let params = self
            .model
            .parameters_mut()
            .ok_or_else(|| Error::NotTrainable(name.clone()))?;
        self.optimizer.zero_grad(params);

        let times = batch.time_offsets.to_vec();
        let rollout = self
            .integrator
            .rollout(&self.model, batch.initial_states.view(), &times)?;
        let loss = self.config.loss.compute(rollout.states(), &batch.targets)?;
        let cotangent = self.config.loss.gradient(rollout.states(), &batch.targets)?;
        let grad = rollout.backward(&self.model, &cotangent)?;

        let params = self.model.parameters_mut().ok_or(Error::NotTrainable(name))?;
        params.accumulate_grad(&grad)?;
        self.optimizer.apply(params)?;
        Ok(loss)
    }

    /// Loss of the current model on a batch, without gradients
    pub fn batch_loss(&self, batch: &Batch) -> Result<f64> {
        let times = batch.time_offsets.to_vec();
        let predicted = self
            .integrator
            .integrate_batch(&self.model, batch.initial_states.view(), &times)?;
        self.config.loss.compute(&predicted, &batch.targets)
    }

    /// Integrate the full trajectory without gradients and report its loss
    pub fn evaluate(&mut self, itr: usize) -> Result<f64> {
        let predicted = self.predict()?;
        let loss = self.config.loss.compute(&predicted, self.dataset.states())?;
        info!("Iter {:04} | Total Loss {:.6}", itr, loss);

        if self.config.viz {
            if let Some(viz) = self.visualizer.as_mut() {
                viz.render(self.dataset.trajectory(), &predicted, &self.model, self.eval_count)?;
            }
        }
        self.eval_count += 1;
        Ok(loss)
    }

    /// Predicted states over the dataset's time mesh from its initial condition
    pub fn predict(&self) -> Result<Array2<f64>> {
        let times = self.dataset.times().to_vec();
        self.integrator
            .integrate(&self.model, &self.dataset.initial_condition(), &times)
    }
}
