pub mod recorder;

pub use recorder::*;

use std::collections::HashMap;

use hp_types::{HpResult, RunId, TrialIndex};
use parking_lot::RwLock;

/// Source of the number of trials already used by a run.
///
/// The scheduler only needs the record count, never record contents. Every
/// launched trial must end up counted, including failed ones, or a resumed
/// run would hand out the same index twice.
pub trait EvaluationLog: Send + Sync {
    fn record_count(&self, run: &RunId) -> usize;

    /// Count a trial that ended without recording a result.
    fn record_failure(&self, run: &RunId, trial_index: TrialIndex) -> HpResult<()>;
}

impl EvaluationLog for EvaluationRecorder {
    fn record_count(&self, run: &RunId) -> usize {
        EvaluationRecorder::record_count(self, run)
    }

    fn record_failure(&self, run: &RunId, trial_index: TrialIndex) -> HpResult<()> {
        EvaluationRecorder::record_failure(self, run, trial_index)
    }
}

/// In-memory evaluation log for embedders that persist results elsewhere.
#[derive(Debug, Default)]
pub struct MemoryLog {
    counts: RwLock<HashMap<RunId, usize>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, run: &RunId, count: usize) {
        self.counts.write().insert(run.clone(), count);
    }

    /// Mark one more trial of `run` as completed.
    pub fn increment(&self, run: &RunId) {
        *self.counts.write().entry(run.clone()).or_insert(0) += 1;
    }
}

impl EvaluationLog for MemoryLog {
    fn record_count(&self, run: &RunId) -> usize {
        self.counts.read().get(run).copied().unwrap_or(0)
    }

    fn record_failure(&self, run: &RunId, _trial_index: TrialIndex) -> HpResult<()> {
        self.increment(run);
        Ok(())
    }
}
