//! Hyperparameter search space description.
//!
//! The scheduler never interprets a space; it is consumed by samplers and by
//! the evaluation log, which needs the parameter kinds to read values back.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::errors::SpaceError;
use crate::run::TrialIndex;

/// A concrete parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    Json(serde_json::Value),
}

impl ParameterValue {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Json(v) => v.as_f64(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Int(v) => serde_json::Value::from(*v),
            Self::Float(v) => serde_json::Value::from(*v),
            Self::Json(v) => v.clone(),
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Json(v) => write!(f, "{}", choice_label(v)),
        }
    }
}

/// Text form of a categorical choice as it appears in the evaluation log.
fn choice_label(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Describes how a parameter is sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterKind {
    /// Integer range [lower, upper] inclusive.
    Int {
        lower: i64,
        upper: i64,
        log: bool,
        q: Option<i64>,
    },
    /// Continuous range [lower, upper].
    Float {
        lower: f64,
        upper: f64,
        log: bool,
        q: Option<f64>,
    },
    /// Categorical choices.
    Categorical { choices: Vec<serde_json::Value> },
}

/// A single parameter dimension in the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    pub name: String,
    pub kind: ParameterKind,
    pub default: ParameterValue,
}

/// Declarative description handed to [`create_hyperparameter`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterSpec {
    pub lower: f64,
    pub upper: f64,
    pub default: Option<ParameterValue>,
    pub log: bool,
    pub q: Option<f64>,
    pub choices: Vec<serde_json::Value>,
}

impl HyperparameterSpec {
    pub fn range(lower: f64, upper: f64) -> Self {
        Self {
            lower,
            upper,
            ..Self::default()
        }
    }

    pub fn choices(choices: Vec<serde_json::Value>) -> Self {
        Self {
            choices,
            ..Self::default()
        }
    }

    pub fn with_default(mut self, default: ParameterValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_log(mut self, log: bool) -> Self {
        self.log = log;
        self
    }

    pub fn with_q(mut self, q: f64) -> Self {
        self.q = Some(q);
        self
    }
}

/// Build a validated parameter definition.
///
/// `hp_type` must be one of `int`, `float` or `cat`; anything else is a
/// configuration error.
pub fn create_hyperparameter(
    hp_type: &str,
    name: impl Into<String>,
    spec: HyperparameterSpec,
) -> Result<ParameterDef, SpaceError> {
    let name = name.into();
    match hp_type {
        "int" | "float" => {
            if !(spec.lower < spec.upper) {
                return Err(SpaceError::InvalidBounds {
                    name,
                    lower: spec.lower,
                    upper: spec.upper,
                });
            }
            if spec.log && spec.lower <= 0.0 {
                return Err(SpaceError::NonPositiveLogBound {
                    name,
                    lower: spec.lower,
                });
            }
            if let Some(q) = spec.q {
                if !(q > 0.0) {
                    return Err(SpaceError::InvalidQuantization { name, q });
                }
            }

            let kind = if hp_type == "int" {
                let lower = spec.lower.round() as i64;
                if spec.log && lower <= 0 {
                    return Err(SpaceError::NonPositiveLogBound {
                        name,
                        lower: spec.lower,
                    });
                }
                ParameterKind::Int {
                    lower,
                    upper: spec.upper.round() as i64,
                    log: spec.log,
                    q: spec.q.map(|q| (q.round() as i64).max(1)),
                }
            } else {
                ParameterKind::Float {
                    lower: spec.lower,
                    upper: spec.upper,
                    log: spec.log,
                    q: spec.q,
                }
            };

            let default = match spec.default {
                Some(value) => {
                    let v = value.as_f64().unwrap_or(f64::NAN);
                    if !(v >= spec.lower && v <= spec.upper) {
                        return Err(SpaceError::DefaultOutOfRange {
                            name,
                            value: v,
                            lower: spec.lower,
                            upper: spec.upper,
                        });
                    }
                    numeric_value(&kind, v)
                }
                None => derived_default(&kind),
            };

            Ok(ParameterDef {
                name,
                kind,
                default,
            })
        }
        "cat" => {
            if spec.choices.is_empty() {
                return Err(SpaceError::EmptyChoices { name });
            }
            let default = match spec.default {
                Some(value) => {
                    let json = value.to_json();
                    if !spec.choices.contains(&json) {
                        return Err(SpaceError::UnknownChoice {
                            name,
                            value: value.to_string(),
                        });
                    }
                    ParameterValue::Json(json)
                }
                None => ParameterValue::Json(spec.choices[0].clone()),
            };
            Ok(ParameterDef {
                name,
                kind: ParameterKind::Categorical {
                    choices: spec.choices,
                },
                default,
            })
        }
        other => Err(SpaceError::UnsupportedType {
            hp_type: other.to_string(),
        }),
    }
}

/// Midpoint of the range (geometric on log scale), snapped to the grid.
fn derived_default(kind: &ParameterKind) -> ParameterValue {
    match kind {
        ParameterKind::Int {
            lower, upper, log, ..
        } => {
            let (l, u) = (*lower as f64, *upper as f64);
            let mid = if *log { (l * u).sqrt() } else { (l + u) / 2.0 };
            numeric_value(kind, mid)
        }
        ParameterKind::Float {
            lower, upper, log, ..
        } => {
            let mid = if *log {
                (lower * upper).sqrt()
            } else {
                (lower + upper) / 2.0
            };
            numeric_value(kind, mid)
        }
        ParameterKind::Categorical { choices } => ParameterValue::Json(
            choices.first().cloned().unwrap_or(serde_json::Value::Null),
        ),
    }
}

/// Quantize, clamp and type a raw numeric draw for `kind`.
fn numeric_value(kind: &ParameterKind, raw: f64) -> ParameterValue {
    match kind {
        ParameterKind::Int {
            lower, upper, q, ..
        } => {
            let (l, u) = (*lower as f64, *upper as f64);
            let snapped = match q {
                Some(q) => ((raw - l) / *q as f64).round() * *q as f64 + l,
                None => raw.round(),
            };
            ParameterValue::Int(snapped.clamp(l, u) as i64)
        }
        ParameterKind::Float {
            lower, upper, q, ..
        } => {
            let snapped = match q {
                Some(q) => ((raw - lower) / q).round() * q + lower,
                None => raw,
            };
            ParameterValue::Float(snapped.clamp(*lower, *upper))
        }
        ParameterKind::Categorical { .. } => ParameterValue::Float(raw),
    }
}

impl ParameterDef {
    /// Draw a value uniformly (log-uniformly when `log` is set).
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ParameterValue {
        match &self.kind {
            ParameterKind::Int {
                lower, upper, log, ..
            } => {
                let raw = if *log {
                    rng.gen_range((*lower as f64).ln()..=(*upper as f64).ln()).exp()
                } else {
                    rng.gen_range(*lower..=*upper) as f64
                };
                numeric_value(&self.kind, raw)
            }
            ParameterKind::Float {
                lower, upper, log, ..
            } => {
                let raw = if *log {
                    rng.gen_range(lower.ln()..=upper.ln()).exp()
                } else {
                    rng.gen_range(*lower..=*upper)
                };
                numeric_value(&self.kind, raw)
            }
            ParameterKind::Categorical { choices } => {
                let idx = rng.gen_range(0..choices.len());
                ParameterValue::Json(choices[idx].clone())
            }
        }
    }

    /// Snap an arbitrary numeric value onto this parameter's domain.
    ///
    /// Categorical parameters return the default.
    pub fn clip(&self, raw: f64) -> ParameterValue {
        match &self.kind {
            ParameterKind::Categorical { .. } => self.default.clone(),
            kind => numeric_value(kind, raw),
        }
    }

    /// Whether the parameter is sampled on a log scale.
    pub fn is_log(&self) -> bool {
        match &self.kind {
            ParameterKind::Int { log, .. } | ParameterKind::Float { log, .. } => *log,
            ParameterKind::Categorical { .. } => false,
        }
    }

    /// Numeric bounds, `None` for categoricals.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        match &self.kind {
            ParameterKind::Int { lower, upper, .. } => Some((*lower as f64, *upper as f64)),
            ParameterKind::Float { lower, upper, .. } => Some((*lower, *upper)),
            ParameterKind::Categorical { .. } => None,
        }
    }

    /// Parse a value persisted in the evaluation log.
    pub fn parse_value(&self, cell: &str) -> Option<ParameterValue> {
        let cell = cell.trim();
        match &self.kind {
            ParameterKind::Int { .. } => cell
                .parse::<i64>()
                .ok()
                .or_else(|| cell.parse::<f64>().ok().map(|v| v.round() as i64))
                .map(ParameterValue::Int),
            ParameterKind::Float { .. } => cell.parse::<f64>().ok().map(ParameterValue::Float),
            ParameterKind::Categorical { choices } => choices
                .iter()
                .find(|choice| choice_label(choice) == cell)
                .map(|choice| ParameterValue::Json(choice.clone())),
        }
    }
}

/// The full search space: an ordered list of parameter definitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub parameters: Vec<ParameterDef>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
        }
    }

    pub fn with(mut self, def: ParameterDef) -> Self {
        self.parameters.push(def);
        self
    }

    /// Like [`with`](Self::with) but rejects a name that is already defined.
    pub fn try_with(self, def: ParameterDef) -> Result<Self, SpaceError> {
        if self.get(&def.name).is_some() {
            return Err(SpaceError::DuplicateName { name: def.name });
        }
        Ok(self.with(def))
    }

    /// Add a validated integer range. Fails on an inverted range or a name
    /// that is already defined.
    pub fn add_int(self, name: impl Into<String>, lower: i64, upper: i64) -> Result<Self, SpaceError> {
        self.add("int", name, HyperparameterSpec::range(lower as f64, upper as f64))
    }

    pub fn add_float(self, name: impl Into<String>, lower: f64, upper: f64) -> Result<Self, SpaceError> {
        self.add("float", name, HyperparameterSpec::range(lower, upper))
    }

    pub fn add_log_float(self, name: impl Into<String>, lower: f64, upper: f64) -> Result<Self, SpaceError> {
        self.add("float", name, HyperparameterSpec::range(lower, upper).with_log(true))
    }

    pub fn add_choice(
        self,
        name: impl Into<String>,
        choices: Vec<serde_json::Value>,
    ) -> Result<Self, SpaceError> {
        self.add("cat", name, HyperparameterSpec::choices(choices))
    }

    /// Build a parameter with [`create_hyperparameter`] and append it.
    pub fn add(
        self,
        hp_type: &str,
        name: impl Into<String>,
        spec: HyperparameterSpec,
    ) -> Result<Self, SpaceError> {
        self.try_with(create_hyperparameter(hp_type, name, spec)?)
    }

    pub fn get(&self, name: &str) -> Option<&ParameterDef> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|p| p.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// The configuration made of every parameter's default.
    pub fn defaults(&self) -> Configuration {
        self.parameters
            .iter()
            .map(|p| (p.name.clone(), p.default.clone()))
            .collect()
    }
}

/// One candidate: parameter name to value.
pub type Configuration = HashMap<String, ParameterValue>;

/// A completed trial as read back from history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub trial_index: TrialIndex,
    pub config: Configuration,
    pub loss: f64,
}
