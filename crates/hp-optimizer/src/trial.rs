//! Trial tracking and run reports.

use chrono::{DateTime, Utc};
use hp_types::{RunId, SlotId, TrialIndex};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique id of one `optimize` invocation.
pub type SessionId = Uuid;

/// How the scheduler executed a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    Sequential,
    Parallel { slots: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialStatus {
    Running,
    Completed,
    Failed,
}

/// One launched trial as seen by the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub trial_index: TrialIndex,
    pub slot_id: SlotId,
    pub status: TrialStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl TrialRecord {
    /// A trial that has just been launched.
    pub fn running(trial_index: TrialIndex, slot_id: SlotId) -> Self {
        Self {
            trial_index,
            slot_id,
            status: TrialStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_completed(&mut self) {
        self.status = TrialStatus::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.status = TrialStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }
}

/// Summary of one `optimize` invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub session_id: SessionId,
    pub run: RunId,
    pub mode: ExecutionMode,

    /// Trials already in the log when the invocation started.
    pub first_trial: TrialIndex,

    /// `first_trial` plus the requested number of new trials.
    pub target: TrialIndex,

    pub launched: usize,
    pub completed: usize,
    pub failed: usize,

    /// Most trials observed live at once.
    pub peak_concurrency: usize,

    /// Launched trials in launch order.
    pub trials: Vec<TrialRecord>,

    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    pub fn new(run: RunId, mode: ExecutionMode, first_trial: TrialIndex, target: TrialIndex) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            run,
            mode,
            first_trial,
            target,
            launched: 0,
            completed: 0,
            failed: 0,
            peak_concurrency: 0,
            trials: Vec::with_capacity(target.saturating_sub(first_trial)),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub(crate) fn launch(&mut self, trial_index: TrialIndex, slot_id: SlotId, live: usize) {
        self.trials.push(TrialRecord::running(trial_index, slot_id));
        self.launched += 1;
        self.peak_concurrency = self.peak_concurrency.max(live);
    }

    fn record_mut(&mut self, trial_index: TrialIndex) -> Option<&mut TrialRecord> {
        // Trials are pushed in index order starting at `first_trial`.
        let pos = trial_index.checked_sub(self.first_trial)?;
        self.trials
            .get_mut(pos)
            .filter(|record| record.trial_index == trial_index)
    }

    pub(crate) fn complete(&mut self, trial_index: TrialIndex) {
        if let Some(record) = self.record_mut(trial_index) {
            record.mark_completed();
            self.completed += 1;
        }
    }

    pub(crate) fn fail(&mut self, trial_index: TrialIndex, error: String) {
        if let Some(record) = self.record_mut(trial_index) {
            record.mark_failed(error);
            self.failed += 1;
        }
    }

    pub(crate) fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Trial indices in launch order.
    pub fn trial_indices(&self) -> Vec<TrialIndex> {
        self.trials.iter().map(|t| t.trial_index).collect()
    }

    /// Trials still running when the report was taken.
    pub fn in_flight(&self) -> usize {
        self.launched - self.completed - self.failed
    }
}
