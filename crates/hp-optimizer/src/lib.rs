//! # hp-optimizer
//!
//! Resumable trial scheduling for HyperSched.
//!
//! Counts the trials already in a run's evaluation log, then runs the
//! requested number of new trials either one after another or across a fixed
//! number of parallel execution slots. Also provides the standard
//! propose/evaluate/record objective and the samplers it proposes with.

mod context;
mod objective;
mod progress;
mod sampler;
mod scheduler;
mod slots;
mod trial;

pub use context::{HistoryLock, TaskContext, DEVICE_ENV_VAR};
pub use objective::{Evaluation, Objective, TrialRunner};
pub use progress::{format_iteration, print_iteration};
pub use sampler::{HistorySampler, RandomSampler, Sampler};
pub use scheduler::{OptimizeOptions, Scheduler, SchedulerConfig};
pub use slots::SlotTable;
pub use trial::{ExecutionMode, RunReport, SessionId, TrialRecord, TrialStatus};
