// ─────────────────────────────────────────────────────────────────────
// QOSync — Kernel Error Hierarchy
// ─────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pipeline stage an error is attributed to.
///
/// Sweep layers use this to mark a single grid point as failed without
/// halting the remaining points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Configuration,
    DriftStability,
    Integration,
    Measure,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Configuration => "configuration",
            Stage::DriftStability => "drift-stability",
            Stage::Integration => "integration",
            Stage::Measure => "measure",
        };
        f.write_str(name)
    }
}

/// Root error type for all kernel failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QomError {
    /// Missing, unknown or out-of-range parameter for the selected topology.
    #[error("config error: {0}")]
    Config(String),

    /// Input dimensions do not match the topology layout.
    #[error("shape error: {0}")]
    Shape(String),

    /// Drift matrix has an eigenvalue with non-negative real part.
    #[error("unstable drift matrix: max Re(λ) = {max_real_part:.6e} (must be < 0)")]
    Instability { max_real_part: f64 },

    /// ODE integration failed (step underflow, budget, non-finite state).
    #[error("integration error: {0}")]
    Integration(String),

    /// Stationary mode iteration did not settle.
    #[error("no convergence after {iterations} iterations (residual {residual:.3e})")]
    NonConvergence { iterations: usize, residual: f64 },

    /// Covariance matrix or trajectory rejected by a measure.
    #[error("malformed state: {0}")]
    Malformed(String),

    /// Linear solve failed or produced non-finite values.
    #[error("numerical error: {0}")]
    Numerical(String),
}

impl QomError {
    /// Stage of the evaluation that produced this error.
    pub fn stage(&self) -> Stage {
        match self {
            QomError::Config(_) | QomError::Shape(_) => Stage::Configuration,
            QomError::Instability { .. } | QomError::Numerical(_) => Stage::DriftStability,
            QomError::Integration(_) | QomError::NonConvergence { .. } => Stage::Integration,
            QomError::Malformed(_) => Stage::Measure,
        }
    }
}

pub type QomResult<T> = Result<T, QomError>;
