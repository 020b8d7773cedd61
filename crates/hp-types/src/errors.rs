use thiserror::Error;

/// Main error type for HyperSched
#[derive(Error, Debug)]
pub enum HpError {
    #[error("Search space error: {0}")]
    Space(#[from] SpaceError),

    #[error("Evaluation log error: {0}")]
    Record(#[from] RecordError),

    #[error("Trial error: {0}")]
    Trial(#[from] TrialError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Errors raised while building a hyperparameter search space.
///
/// All of these are configuration errors: they surface immediately and are
/// never retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpaceError {
    #[error("The hp_type must be chosen from [int, float, cat], got {hp_type:?}")]
    UnsupportedType { hp_type: String },

    #[error("Invalid bounds for {name}: lower {lower} must be below upper {upper}")]
    InvalidBounds { name: String, lower: f64, upper: f64 },

    #[error("Log-scale parameter {name} needs a positive lower bound, got {lower}")]
    NonPositiveLogBound { name: String, lower: f64 },

    #[error("Quantization step for {name} must be positive, got {q}")]
    InvalidQuantization { name: String, q: f64 },

    #[error("Default value {value} for {name} is outside [{lower}, {upper}]")]
    DefaultOutOfRange {
        name: String,
        value: f64,
        lower: f64,
        upper: f64,
    },

    #[error("Categorical parameter {name} has no choices")]
    EmptyChoices { name: String },

    #[error("Value {value} is not a choice of {name}")]
    UnknownChoice { name: String, value: String },

    #[error("Parameter {name} is defined twice")]
    DuplicateName { name: String },
}

/// Errors raised by the evaluation log.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Evaluation log unreadable: {path}: {message}")]
    Unreadable { path: String, message: String },

    #[error("Failed to append to {path}: {message}")]
    Write { path: String, message: String },

    #[error("Malformed row in {path} at line {line}: {message}")]
    Parse {
        path: String,
        line: usize,
        message: String,
    },
}

/// Errors raised while running a trial.
#[derive(Error, Debug)]
pub enum TrialError {
    #[error("Objective failed on trial {trial_index}: {message}")]
    ObjectiveFailed { trial_index: usize, message: String },

    #[error("Trial {trial_index} on slot {slot_id} panicked: {message}")]
    Panicked {
        trial_index: usize,
        slot_id: usize,
        message: String,
    },

    #[error("Failed to launch trial {trial_index}: {message}")]
    Spawn { trial_index: usize, message: String },
}

/// Result type alias for HyperSched operations
pub type HpResult<T> = Result<T, HpError>;

/// Helper trait for converting string errors
pub trait IntoHpError {
    fn into_hp_error(self) -> HpError;
}

impl IntoHpError for String {
    fn into_hp_error(self) -> HpError {
        HpError::Internal(self)
    }
}

impl IntoHpError for &str {
    fn into_hp_error(self) -> HpError {
        HpError::Internal(self.to_string())
    }
}

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::HpError::Validation(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::HpError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::HpError::Config(format!($($arg)*))
    };
}
