//! Batch trainer with cooperative cancellation and progress events.
//!
//! The driver loop runs per epoch, per batch, per sample: every sample
//! gets a fresh recording graph, its loss seeds the tape walk, and
//! gradients accumulate into the shared parameter tensors. Once per
//! batch the optimizer consumes them with `grad_gain = 1 / batch_len`,
//! averaging the accumulated sum.
//!
//! Cancellation is checked at batch boundaries only. An accepted
//! cancellation stops further optimizer calls but never rolls back
//! updates already applied; the network stays consistent.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use crossbeam::channel::{unbounded, Receiver, Sender};
use tracing::{debug, info, warn};

use neurso_ad::Graph;
use neurso_nn::{Loss, Network, NetworkSnapshot};

use crate::dataset::{Dataset, Sample};
use crate::optimizer::{Optimizer, OptimizerConfig};

/// Progress events emitted over the trainer's channel.
#[derive(Debug, Clone, PartialEq)]
pub enum TrainingEvent {
    TrainingStarted {
        epochs: usize,
    },
    EpochPassed {
        epoch: usize,
        loss: f32,
        validation_loss: Option<f32>,
    },
    CheckPointSaved {
        epoch: usize,
    },
    TrainingFinished {
        final_loss: f32,
    },
    /// A fault stopped the run; the `train` call also returns `Err`.
    TrainingStopped {
        reason: String,
    },
    TrainingCancelled {
        epoch: usize,
    },
}

/// Shared flag for cooperative cancellation. Clone it, hand one copy to
/// the trainer, keep the other to call [`cancel`](Self::cancel).
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Driver-loop knobs.
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    pub grad_clip: f32,
    pub l1: f32,
    pub l2: f32,
    /// Trailing fraction of the dataset held out for per-epoch
    /// validation loss.
    pub validation_split: f32,
    /// Save a snapshot every N epochs; requires `checkpoint_path`.
    pub checkpoint_every: Option<usize>,
    pub checkpoint_path: Option<PathBuf>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            batch_size: 1,
            learning_rate: 0.01,
            grad_clip: 5.0,
            l1: 0.0,
            l2: 0.0,
            validation_split: 0.0,
            checkpoint_every: None,
            checkpoint_path: None,
        }
    }
}

/// Handle returned by [`Trainer::train_async`].
pub struct TrainingHandle {
    pub events: Receiver<TrainingEvent>,
    pub token: CancellationToken,
    thread: JoinHandle<Result<(Network, f32)>>,
}

impl TrainingHandle {
    /// Block until the worker finishes; returns the trained network and
    /// the final epoch loss.
    pub fn join(self) -> Result<(Network, f32)> {
        self.thread
            .join()
            .map_err(|_| anyhow::anyhow!("training thread panicked"))?
    }
}

/// Batch trainer binding a loss and an optimizer to the driver loop.
pub struct Trainer {
    config: TrainerConfig,
    loss: Loss,
    optimizer: Optimizer,
}

impl Trainer {
    /// Build a trainer with plain SGD derived from the config's rate,
    /// clip, and regularization knobs.
    pub fn new(config: TrainerConfig, loss: Loss) -> Self {
        let optimizer = OptimizerConfig::sgd(config.learning_rate)
            .with_grad_clip(config.grad_clip)
            .with_l1(config.l1)
            .with_l2(config.l2)
            .build();
        Self {
            config,
            loss,
            optimizer,
        }
    }

    /// Build a trainer around an explicit optimizer configuration.
    pub fn with_optimizer(config: TrainerConfig, loss: Loss, optimizer: OptimizerConfig) -> Self {
        Self {
            config,
            loss,
            optimizer: optimizer.build(),
        }
    }

    /// Blocking training run. Returns the final epoch's mean loss.
    ///
    /// Faults emit [`TrainingEvent::TrainingStopped`] before surfacing
    /// as `Err`; cancellation emits
    /// [`TrainingEvent::TrainingCancelled`] and returns `Ok`.
    pub fn train(
        &mut self,
        network: &mut Network,
        dataset: Dataset,
        events: Option<&Sender<TrainingEvent>>,
        token: &CancellationToken,
    ) -> Result<f32> {
        match self.run(network, dataset, events, token) {
            Ok(loss) => Ok(loss),
            Err(err) => {
                warn!(error = %err, "training stopped by fault");
                emit(
                    events,
                    TrainingEvent::TrainingStopped {
                        reason: err.to_string(),
                    },
                );
                Err(err)
            }
        }
    }

    /// Spawn the run on a worker thread. The returned handle carries the
    /// event receiver and a cancellation token; `join` recovers the
    /// network.
    pub fn train_async(mut self, mut network: Network, dataset: Dataset) -> TrainingHandle {
        let (tx, rx) = unbounded();
        let token = CancellationToken::new();
        let worker_token = token.clone();
        let thread = thread::spawn(move || {
            let loss = self.train(&mut network, dataset, Some(&tx), &worker_token)?;
            Ok((network, loss))
        });
        TrainingHandle {
            events: rx,
            token,
            thread,
        }
    }

    fn run(
        &mut self,
        network: &mut Network,
        dataset: Dataset,
        events: Option<&Sender<TrainingEvent>>,
        token: &CancellationToken,
    ) -> Result<f32> {
        anyhow::ensure!(!dataset.is_empty(), "cannot train on an empty dataset");
        anyhow::ensure!(self.config.batch_size > 0, "batch_size must be at least 1");

        let (train_set, validation_set) = dataset.validation_split(self.config.validation_split);
        anyhow::ensure!(
            !train_set.is_empty(),
            "validation split left no training data"
        );

        info!(
            epochs = self.config.epochs,
            batch_size = self.config.batch_size,
            samples = train_set.len(),
            "training started"
        );
        emit(
            events,
            TrainingEvent::TrainingStarted {
                epochs: self.config.epochs,
            },
        );

        let mut last_loss = 0.0;
        for epoch in 0..self.config.epochs {
            let epoch_loss = match self.run_epoch(network, &train_set, token)? {
                Some(loss) => loss,
                None => {
                    warn!(epoch, "training cancelled");
                    emit(events, TrainingEvent::TrainingCancelled { epoch });
                    return Ok(last_loss);
                }
            };
            last_loss = epoch_loss;

            let validation_loss = if validation_set.is_empty() {
                None
            } else {
                Some(self.validate(network, &validation_set)?)
            };
            debug!(epoch, loss = epoch_loss, ?validation_loss, "epoch passed");
            emit(
                events,
                TrainingEvent::EpochPassed {
                    epoch,
                    loss: epoch_loss,
                    validation_loss,
                },
            );

            if let (Some(every), Some(path)) =
                (self.config.checkpoint_every, &self.config.checkpoint_path)
            {
                if every > 0 && (epoch + 1) % every == 0 {
                    let file = File::create(path)
                        .with_context(|| format!("creating checkpoint {}", path.display()))?;
                    NetworkSnapshot::capture(network).to_writer(BufWriter::new(file))?;
                    emit(events, TrainingEvent::CheckPointSaved { epoch });
                }
            }
        }

        info!(final_loss = last_loss, "training finished");
        emit(
            events,
            TrainingEvent::TrainingFinished {
                final_loss: last_loss,
            },
        );
        Ok(last_loss)
    }

    /// One pass over the training set. Returns `None` if cancellation
    /// was observed at a batch boundary.
    fn run_epoch(
        &mut self,
        network: &mut Network,
        train_set: &Dataset,
        token: &CancellationToken,
    ) -> Result<Option<f32>> {
        let mut total = 0.0;
        let mut units = 0usize;
        match train_set {
            Dataset::Flat(samples) => {
                for batch in samples.chunks(self.config.batch_size) {
                    if token.is_cancelled() {
                        return Ok(None);
                    }
                    for sample in batch {
                        total += self.backward_sample(network, sample)?;
                        units += 1;
                    }
                    self.apply_batch(network, batch.len())?;
                }
            }
            Dataset::Sequential(sequences) => {
                for batch in sequences.chunks(self.config.batch_size) {
                    if token.is_cancelled() {
                        return Ok(None);
                    }
                    for sequence in batch {
                        total += self.backward_sequence(network, sequence)?;
                        units += 1;
                    }
                    self.apply_batch(network, batch.len())?;
                }
            }
        }
        Ok(Some(total / units.max(1) as f32))
    }

    /// Forward, measure, seed, and backpropagate one flat sample.
    fn backward_sample(&self, network: &mut Network, sample: &Sample) -> Result<f32> {
        let mut graph = Graph::recording();
        let out = network.forward_tensor(&mut graph, sample.input.clone())?;
        let out_ref = graph.value(out);
        let loss_value = {
            let mut actual = out_ref.write();
            let value = self.loss.measure(&actual.data, &sample.target)?;
            self.loss.backward(&mut actual, &sample.target)?;
            value
        };
        graph.backward();
        Ok(loss_value)
    }

    /// Drive a whole sequence through one graph so the tape spans every
    /// timestep, then apply the loss to the final output.
    fn backward_sequence(&self, network: &mut Network, sequence: &[Sample]) -> Result<f32> {
        let last = sequence
            .last()
            .ok_or_else(|| anyhow::anyhow!("empty sequence in sequential dataset"))?;
        network.reset_state();
        let mut graph = Graph::recording();
        let mut out = None;
        for sample in sequence {
            out = Some(network.forward_tensor(&mut graph, sample.input.clone())?);
        }
        let out_ref = graph.value(out.unwrap());
        let loss_value = {
            let mut actual = out_ref.write();
            let value = self.loss.measure(&actual.data, &last.target)?;
            self.loss.backward(&mut actual, &last.target)?;
            value
        };
        graph.backward();
        Ok(loss_value)
    }

    /// Consume the batch's accumulated gradients, averaged over its
    /// length.
    fn apply_batch(&mut self, network: &mut Network, batch_len: usize) -> Result<()> {
        self.optimizer.set_grad_gain(1.0 / batch_len.max(1) as f32);
        self.optimizer.step(&network.parameters())?;
        Ok(())
    }

    /// Mean loss over a held-out set; no recording, no updates.
    fn validate(&self, network: &mut Network, validation_set: &Dataset) -> Result<f32> {
        let mut total = 0.0;
        let mut units = 0usize;
        match validation_set {
            Dataset::Flat(samples) => {
                for sample in samples {
                    let out = network.predict(sample.input.clone())?;
                    total += self.loss.measure(&out.data, &sample.target)?;
                    units += 1;
                }
            }
            Dataset::Sequential(sequences) => {
                for sequence in sequences {
                    let last = match sequence.last() {
                        Some(last) => last,
                        None => continue,
                    };
                    network.reset_state();
                    let mut out = None;
                    for sample in sequence {
                        out = Some(network.predict(sample.input.clone())?);
                    }
                    if let Some(out) = out {
                        total += self.loss.measure(&out.data, &last.target)?;
                        units += 1;
                    }
                }
            }
        }
        Ok(total / units.max(1) as f32)
    }
}

fn emit(events: Option<&Sender<TrainingEvent>>, event: TrainingEvent) {
    if let Some(tx) = events {
        // A dropped receiver is not a fault; training continues.
        let _ = tx.send(event);
    }
}
