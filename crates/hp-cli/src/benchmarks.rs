//! Synthetic objectives for exercising the scheduler end to end.

use clap::ValueEnum;
use hp_types::{validation_error, Configuration, HpResult, SearchSpace};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Benchmark {
    Sphere,
    Rosenbrock,
    #[value(name = "styblinski_tang")]
    StyblinskiTang,
}

impl Benchmark {
    pub fn name(&self) -> &'static str {
        match self {
            Benchmark::Sphere => "sphere",
            Benchmark::Rosenbrock => "rosenbrock",
            Benchmark::StyblinskiTang => "styblinski_tang",
        }
    }

    /// Usual per-coordinate search domain.
    pub fn bounds(&self) -> (f64, f64) {
        match self {
            Benchmark::Sphere => (-5.12, 5.12),
            Benchmark::Rosenbrock => (-2.048, 2.048),
            Benchmark::StyblinskiTang => (-5.0, 5.0),
        }
    }

    /// Float parameters `x0..x{dim-1}` over [`Benchmark::bounds`].
    pub fn search_space(&self, dim: usize) -> HpResult<SearchSpace> {
        let (lower, upper) = self.bounds();
        let space = (0..dim).try_fold(SearchSpace::new(), |space, i| {
            space.add_float(coordinate(i), lower, upper)
        })?;
        Ok(space)
    }

    pub fn evaluate(&self, x: &[f64]) -> f64 {
        match self {
            Benchmark::Sphere => x.iter().map(|v| v * v).sum(),
            Benchmark::Rosenbrock => x
                .windows(2)
                .map(|w| 100.0 * (w[1] - w[0] * w[0]).powi(2) + (1.0 - w[0]).powi(2))
                .sum(),
            Benchmark::StyblinskiTang => {
                0.5 * x
                    .iter()
                    .map(|v| v.powi(4) - 16.0 * v * v + 5.0 * v)
                    .sum::<f64>()
            }
        }
    }

    /// Evaluate a proposed configuration of `dim` coordinates.
    pub fn evaluate_config(&self, config: &Configuration, dim: usize) -> HpResult<f64> {
        let point = (0..dim)
            .map(|i| {
                let name = coordinate(i);
                config
                    .get(&name)
                    .and_then(|v| v.as_f64())
                    .ok_or_else(|| validation_error!("configuration has no numeric `{name}`"))
            })
            .collect::<HpResult<Vec<_>>>()?;
        Ok(self.evaluate(&point))
    }
}

fn coordinate(i: usize) -> String {
    format!("x{i}")
}
