//! Objective interface and the standard propose/evaluate/record runner.

use std::sync::Arc;

use hp_data::EvaluationRecorder;
use hp_types::{Configuration, HpResult, SearchSpace, TrialIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::TaskContext;
use crate::progress::print_iteration;
use crate::sampler::Sampler;

/// One evaluation of the black-box objective.
///
/// The scheduler only looks at success or failure; results are persisted by
/// the objective itself.
pub trait Objective: Send + Sync {
    fn run(&self, ctx: &TaskContext) -> HpResult<()>;
}

impl<F> Objective for F
where
    F: Fn(&TaskContext) -> HpResult<()> + Send + Sync,
{
    fn run(&self, ctx: &TaskContext) -> HpResult<()> {
        self(ctx)
    }
}

/// Outcome of evaluating one configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub loss: f64,
    pub accuracy: Option<f64>,
}

impl Evaluation {
    pub fn loss(loss: f64) -> Self {
        Self {
            loss,
            accuracy: None,
        }
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }
}

/// Objective that proposes from history, evaluates, and records the result.
///
/// Only the history read and the proposal happen under the history lock; the
/// evaluation function runs unlocked.
pub struct TrialRunner<S, F> {
    recorder: Arc<EvaluationRecorder>,
    space: SearchSpace,
    sampler: S,
    evaluate: F,
    seed: Option<u64>,
    verbose: bool,
    print_freq: usize,
}

impl<S, F> TrialRunner<S, F>
where
    S: Sampler,
    F: Fn(&TaskContext, &Configuration) -> HpResult<Evaluation> + Send + Sync,
{
    pub fn new(recorder: Arc<EvaluationRecorder>, space: SearchSpace, sampler: S, evaluate: F) -> Self {
        Self {
            recorder,
            space,
            sampler,
            evaluate,
            seed: None,
            verbose: false,
            print_freq: 1,
        }
    }

    /// Seed proposals; trial `i` draws from `seed + i`.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Print a progress banner every `print_freq` trials.
    pub fn with_verbose(mut self, verbose: bool, print_freq: usize) -> Self {
        self.verbose = verbose;
        self.print_freq = print_freq.max(1);
        self
    }

    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    fn rng_for(&self, trial_index: TrialIndex) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(trial_index as u64)),
            None => StdRng::from_entropy(),
        }
    }
}

impl<S, F> Objective for TrialRunner<S, F>
where
    S: Sampler,
    F: Fn(&TaskContext, &Configuration) -> HpResult<Evaluation> + Send + Sync,
{
    fn run(&self, ctx: &TaskContext) -> HpResult<()> {
        let mut rng = self.rng_for(ctx.trial_index);

        let config = ctx.propose(|| -> HpResult<Configuration> {
            let history = self.recorder.load_history(&ctx.run, &self.space)?;
            Ok(self.sampler.propose(&self.space, &history, &mut rng))
        })?;
        debug!(
            run = %ctx.run,
            trial_index = ctx.trial_index,
            slot_id = ctx.slot_id,
            sampler = self.sampler.name(),
            "proposed configuration"
        );

        let evaluation = (self.evaluate)(ctx, &config)?;
        self.recorder
            .record(&ctx.run, ctx.trial_index, &config, evaluation.loss)?;

        if self.verbose && ctx.trial_index % self.print_freq == 0 {
            print_iteration(ctx.trial_index, evaluation.loss, evaluation.accuracy);
        }
        Ok(())
    }
}
