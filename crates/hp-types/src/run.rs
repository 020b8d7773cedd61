//! Run identity shared by the scheduler and the evaluation log.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a trial in a run's history. Never reused within a run.
pub type TrialIndex = usize;

/// Identifier of one concurrent execution resource, in `[0, parallelism)`.
pub type SlotId = usize;

/// Stable key of one optimization session.
///
/// Locates the persisted evaluation log and lets trial counting resume across
/// process restarts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId {
    pub model: String,
    pub number: u32,
}

impl RunId {
    pub fn new(model: impl Into<String>, number: u32) -> Self {
        Self {
            model: model.into(),
            number,
        }
    }

    /// Relative directory of this run's log, e.g. `cnn/007`.
    pub fn dir_fragment(&self) -> String {
        format!("{}/{:0>3}", self.model, self.number)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{:0>3}", self.model, self.number)
    }
}
