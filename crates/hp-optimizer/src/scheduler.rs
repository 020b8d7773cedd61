//! Trial scheduler: resumption, sequential and slot-bounded parallel execution.

use std::any::Any;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use hp_data::EvaluationLog;
use hp_types::{HpResult, RunId, SlotId, TrialError, TrialIndex};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::context::{HistoryLock, TaskContext};
use crate::objective::Objective;
use crate::slots::SlotTable;
use crate::trial::{ExecutionMode, RunReport};

/// Scheduler tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Longest wait for a completion notification before re-checking liveness.
    pub poll_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl SchedulerConfig {
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Per-invocation options of [`Scheduler::optimize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizeOptions {
    /// Trials to run on top of those already in the log.
    pub max_new_trials: usize,

    /// `None` or `<= 1` runs sequentially; `>= 2` runs that many slots.
    pub parallelism: Option<usize>,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            max_new_trials: 100,
            parallelism: None,
        }
    }
}

impl OptimizeOptions {
    pub fn with_max_new_trials(mut self, n: usize) -> Self {
        self.max_new_trials = n;
        self
    }

    pub fn with_parallelism(mut self, n: usize) -> Self {
        self.parallelism = Some(n);
        self
    }

    pub fn mode(&self) -> ExecutionMode {
        match self.parallelism {
            Some(slots) if slots >= 2 => ExecutionMode::Parallel { slots },
            _ => ExecutionMode::Sequential,
        }
    }
}

/// A launched trial and the slot it holds.
struct TaskHandle {
    slot_id: SlotId,
    trial_index: TrialIndex,
    handle: JoinHandle<HpResult<()>>,
}

/// Notifies the scheduler when a trial thread exits, including by panic.
struct SlotRelease {
    slot_id: SlotId,
    tx: Sender<SlotId>,
}

impl Drop for SlotRelease {
    fn drop(&mut self) {
        let _ = self.tx.send(self.slot_id);
    }
}

/// Decides how many trials remain, where each one runs, and when a run is done.
pub struct Scheduler {
    log: Arc<dyn EvaluationLog>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(log: Arc<dyn EvaluationLog>) -> Self {
        Self {
            log,
            config: SchedulerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Index of the next trial of `run`: the number already in the log,
    /// failed trials included.
    pub fn resume_point(&self, run: &RunId) -> TrialIndex {
        self.log.record_count(run)
    }

    /// Run `options.max_new_trials` more trials of `run`.
    ///
    /// Returns once every launched trial has terminated. In sequential mode an
    /// objective error aborts the invocation; in parallel mode failed trials
    /// count toward the target and are reported, never retried.
    pub fn optimize<O>(&self, run: &RunId, objective: O, options: &OptimizeOptions) -> HpResult<RunReport>
    where
        O: Objective + 'static,
    {
        let start = self.resume_point(run);
        let target = start + options.max_new_trials;
        let mode = options.mode();

        info!(
            run = %run,
            start,
            target,
            mode = ?mode,
            "starting optimization"
        );

        let report = match mode {
            ExecutionMode::Sequential => self.run_sequential(run, &objective, start, target)?,
            ExecutionMode::Parallel { slots } => {
                self.run_parallel(run, Arc::new(objective), start, target, slots)?
            }
        };

        info!(
            run = %run,
            launched = report.launched,
            completed = report.completed,
            failed = report.failed,
            peak_concurrency = report.peak_concurrency,
            "optimization finished"
        );
        Ok(report)
    }

    fn run_sequential<O: Objective>(
        &self,
        run: &RunId,
        objective: &O,
        start: TrialIndex,
        target: TrialIndex,
    ) -> HpResult<RunReport> {
        let mut report = RunReport::new(run.clone(), ExecutionMode::Sequential, start, target);

        for trial_index in start..target {
            let ctx = TaskContext::sequential(run.clone(), trial_index);
            report.launch(trial_index, ctx.slot_id, 1);
            debug!(run = %run, trial_index, "running trial");

            if let Err(e) = objective.run(&ctx) {
                error!(run = %run, trial_index, error = %e, "trial failed, aborting run");
                mark_failed(&*self.log, run, trial_index);
                return Err(TrialError::ObjectiveFailed {
                    trial_index,
                    message: e.to_string(),
                }
                .into());
            }
            report.complete(trial_index);
        }

        report.finish();
        Ok(report)
    }

    fn run_parallel<O: Objective + 'static>(
        &self,
        run: &RunId,
        objective: Arc<O>,
        start: TrialIndex,
        target: TrialIndex,
        slots: usize,
    ) -> HpResult<RunReport> {
        let mut report = RunReport::new(run.clone(), ExecutionMode::Parallel { slots }, start, target);
        let lock = HistoryLock::new();
        let (done_tx, done_rx) = crossbeam_channel::unbounded::<SlotId>();
        let mut table = SlotTable::new(slots);
        let mut active: Vec<TaskHandle> = Vec::with_capacity(slots);
        let mut next_index = start;

        loop {
            while next_index < target {
                let Some(slot_id) = table.acquire() else {
                    break;
                };

                let ctx = TaskContext::parallel(run.clone(), slot_id, next_index, lock.clone());
                let task = match spawn_trial(&objective, ctx, &done_tx) {
                    Ok(task) => task,
                    Err(e) => {
                        table.release(slot_id);
                        error!(run = %run, trial_index = next_index, error = %e, "could not launch trial");
                        drain(&*self.log, active, &mut table, &mut report);
                        return Err(e);
                    }
                };

                active.push(task);
                report.launch(next_index, slot_id, active.len());
                debug!(run = %run, trial_index = next_index, slot_id, live = active.len(), "launched trial");
                next_index += 1;
            }

            if next_index >= target {
                break;
            }

            self.wait_for_slot(&done_rx, &mut active, &mut table, &mut report);
        }

        if !active.is_empty() {
            info!(run = %run, in_flight = active.len(), "all trials launched, waiting for in-flight trials");
        }
        drain(&*self.log, active, &mut table, &mut report);

        report.finish();
        Ok(report)
    }

    /// Block until at least one trial finished or the poll interval elapsed,
    /// then reap every terminated trial.
    fn wait_for_slot(
        &self,
        done_rx: &Receiver<SlotId>,
        active: &mut Vec<TaskHandle>,
        table: &mut SlotTable,
        report: &mut RunReport,
    ) {
        match done_rx.recv_timeout(self.config.poll_interval) {
            Ok(slot_id) => reap_slot(&*self.log, slot_id, active, table, report),
            Err(RecvTimeoutError::Timeout) => {
                let mut i = 0;
                while i < active.len() {
                    if active[i].handle.is_finished() {
                        settle(&*self.log, active.swap_remove(i), table, report);
                    } else {
                        i += 1;
                    }
                }
            }
            // The scheduler holds a sender for the whole run.
            Err(RecvTimeoutError::Disconnected) => {}
        }

        for slot_id in done_rx.try_iter() {
            reap_slot(&*self.log, slot_id, active, table, report);
        }
    }
}

fn spawn_trial<O: Objective + 'static>(
    objective: &Arc<O>,
    ctx: TaskContext,
    done_tx: &Sender<SlotId>,
) -> HpResult<TaskHandle> {
    let slot_id = ctx.slot_id;
    let trial_index = ctx.trial_index;
    let objective = Arc::clone(objective);
    let tx = done_tx.clone();

    let handle = thread::Builder::new()
        .name(format!("trial-{trial_index}-slot-{slot_id}"))
        .spawn(move || {
            let _release = SlotRelease { slot_id, tx };
            objective.run(&ctx)
        })
        .map_err(|e| TrialError::Spawn {
            trial_index,
            message: e.to_string(),
        })?;

    Ok(TaskHandle {
        slot_id,
        trial_index,
        handle,
    })
}

/// Reap the trial holding `slot_id`, if it is still tracked.
fn reap_slot(
    log: &dyn EvaluationLog,
    slot_id: SlotId,
    active: &mut Vec<TaskHandle>,
    table: &mut SlotTable,
    report: &mut RunReport,
) {
    if let Some(pos) = active.iter().position(|t| t.slot_id == slot_id) {
        settle(log, active.swap_remove(pos), table, report);
    }
}

/// Join every remaining trial.
fn drain(log: &dyn EvaluationLog, active: Vec<TaskHandle>, table: &mut SlotTable, report: &mut RunReport) {
    for task in active {
        settle(log, task, table, report);
    }
}

/// Join a terminated trial, free its slot, and record the outcome.
///
/// Failed trials are written to the log so they stay counted on resume.
fn settle(log: &dyn EvaluationLog, task: TaskHandle, table: &mut SlotTable, report: &mut RunReport) {
    let TaskHandle {
        slot_id,
        trial_index,
        handle,
    } = task;
    table.release(slot_id);

    match handle.join() {
        Ok(Ok(())) => {
            debug!(trial_index, slot_id, "trial completed");
            report.complete(trial_index);
        }
        Ok(Err(e)) => {
            warn!(trial_index, slot_id, error = %e, "trial failed");
            mark_failed(log, &report.run, trial_index);
            report.fail(trial_index, e.to_string());
        }
        Err(payload) => {
            let err = TrialError::Panicked {
                trial_index,
                slot_id,
                message: panic_message(&*payload),
            };
            warn!(trial_index, slot_id, error = %err, "trial panicked");
            mark_failed(log, &report.run, trial_index);
            report.fail(trial_index, err.to_string());
        }
    }
}

fn mark_failed(log: &dyn EvaluationLog, run: &RunId, trial_index: TrialIndex) {
    if let Err(e) = log.record_failure(run, trial_index) {
        error!(run = %run, trial_index, error = %e, "could not record failed trial");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
