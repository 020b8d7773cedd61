//! Command-line arguments and the driver they configure.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use hp_data::EvaluationRecorder;
use hp_optimizer::{
    Evaluation, HistorySampler, OptimizeOptions, RunReport, Scheduler, TaskContext, TrialRunner,
};
use hp_types::{Configuration, HpResult, RunId};
use tracing::info;

use crate::benchmarks::Benchmark;

#[derive(Parser, Debug, Clone)]
#[command(name = "hp-optimize")]
#[command(about = "Resumable hyperparameter search over benchmark objectives")]
pub struct Args {
    /// Objective to minimize; also names the run's log directory.
    #[arg(long, value_enum, default_value_t = Benchmark::Sphere)]
    pub model: Benchmark,

    /// Number of search dimensions.
    #[arg(long, default_value_t = 2)]
    pub dim: usize,

    /// Parallel execution slots.
    #[arg(long, default_value_t = 1)]
    pub par: usize,

    /// Random trials before the sampler starts exploiting history.
    #[arg(long)]
    pub ini: usize,

    /// Run number within the model.
    #[arg(long, default_value_t = 0)]
    pub exp: u32,

    /// New evaluations to run in this invocation.
    #[arg(long, default_value_t = 100)]
    pub eva: usize,

    /// 0 discards the run's previous evaluations, 1 resumes from them.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=1))]
    pub res: u8,

    /// Seed for reproducible proposals.
    #[arg(long)]
    pub seed: Option<u64>,

    /// 1 prints a banner per printed evaluation.
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=1))]
    pub veb: u8,

    /// Print every `fre`-th evaluation when verbose.
    #[arg(long, default_value_t = 1)]
    pub fre: usize,

    /// Root directory of the evaluation logs.
    #[arg(long, env = "HPSCHED_EVAL_ROOT", default_value = "evaluation")]
    pub root: PathBuf,

    /// Optional JSON output path for the run report.
    #[arg(long)]
    pub report: Option<PathBuf>,
}

impl Args {
    pub fn run_id(&self) -> RunId {
        RunId::new(self.model.name(), self.exp)
    }

    pub fn options(&self) -> OptimizeOptions {
        OptimizeOptions::default()
            .with_max_new_trials(self.eva)
            .with_parallelism(self.par)
    }
}

/// Run one optimization invocation as described by `args`.
pub fn run(args: &Args) -> Result<RunReport> {
    if args.dim == 0 {
        bail!("--dim must be at least 1");
    }

    let run = args.run_id();
    let recorder = Arc::new(EvaluationRecorder::new(&args.root));

    if args.res == 0 {
        recorder
            .clear_run(&run)
            .with_context(|| format!("failed to clear previous evaluations of {run}"))?;
    }

    let benchmark = args.model;
    let dim = args.dim;
    let evaluate = move |_: &TaskContext, config: &Configuration| -> HpResult<Evaluation> {
        Ok(Evaluation::loss(benchmark.evaluate_config(config, dim)?))
    };

    let mut runner = TrialRunner::new(
        Arc::clone(&recorder),
        benchmark.search_space(dim)?,
        HistorySampler::new(args.ini),
        evaluate,
    )
    .with_verbose(args.veb == 1, args.fre);
    if let Some(seed) = args.seed {
        runner = runner.with_seed(seed);
    }

    info!(
        run = %run,
        root = %args.root.display(),
        dim,
        slots = args.par,
        evaluations = args.eva,
        "configured run"
    );

    let report = Scheduler::new(recorder)
        .optimize(&run, runner, &args.options())
        .with_context(|| format!("optimization of {run} failed"))?;

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
    }

    Ok(report)
}
