// ─────────────────────────────────────────────────────────────────────
// QOSync — Synchronization Measures
// ─────────────────────────────────────────────────────────────────────
//! Quantum synchronization of two modes from their quadrature
//! fluctuations.
//!
//! Phase synchronization rotates each mode's fluctuations into the frame
//! of its mean amplitude, `p'ₖ = −sin φₖ qₖ + cos φₖ pₖ`, and measures the
//! relative momentum `p₋ = (p'ᵢ − p'ⱼ)/√2`:
//!
//!   S_p = 1 / (2⟨p₋²⟩)
//!
//! Complete synchronization uses the unrotated differences,
//! `S_c = 1 / ⟨q₋² + p₋²⟩`. Both equal 1 for uncorrelated vacua.

use nalgebra::DMatrix;
use num_complex::Complex64;
use qosync_types::{QomError, QomResult};

use crate::validate::{validate_covariance, validate_trajectory};

/// Phases `arg(mode)` of the two modes in `pair`.
pub fn mode_phases(modes: &[Complex64], pair: [usize; 2]) -> QomResult<[f64; 2]> {
    let phase = |k: usize| {
        modes.get(k).map(|m| m.arg()).ok_or_else(|| {
            QomError::Shape(format!("mode index {k} out of range for {} modes", modes.len()))
        })
    };
    Ok([phase(pair[0])?, phase(pair[1])?])
}

/// `⟨u₋²⟩` for `u₋ = (uᵢ − uⱼ)/√2`, where `uₖ = wₖ · (qₖ, pₖ)`.
fn difference_variance(v: &DMatrix<f64>, pair: [usize; 2], w: [[f64; 2]; 2]) -> f64 {
    let quad = |k: usize| [2 * pair[k], 2 * pair[k] + 1];
    let bilinear = |a: usize, b: usize| {
        let (qa, qb) = (quad(a), quad(b));
        let mut acc = 0.0;
        for (r, wr) in qa.iter().zip(w[a]) {
            for (c, wc) in qb.iter().zip(w[b]) {
                acc += wr * wc * v[(*r, *c)];
            }
        }
        acc
    };
    0.5 * (bilinear(0, 0) + bilinear(1, 1) - 2.0 * bilinear(0, 1))
}

fn pair_indices(pair: [usize; 2]) -> QomResult<[usize; 4]> {
    if pair[0] == pair[1] {
        return Err(QomError::Shape(format!(
            "synchronization needs two distinct modes, got {pair:?}"
        )));
    }
    Ok([2 * pair[0], 2 * pair[0] + 1, 2 * pair[1], 2 * pair[1] + 1])
}

fn positive(value: f64, what: &str) -> QomResult<f64> {
    if value > 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(QomError::Malformed(format!(
            "{what} must be positive, got {value:.3e}"
        )))
    }
}

/// Phase synchronization `S_p` of `pair` given the mean-amplitude phases.
pub fn phase_synchronization(v: &DMatrix<f64>, phases: [f64; 2], pair: [usize; 2]) -> QomResult<f64> {
    validate_covariance(v, &pair_indices(pair)?)?;
    let w = phases.map(|phi| [-phi.sin(), phi.cos()]);
    let p_minus = positive(difference_variance(v, pair, w), "⟨p₋²⟩")?;
    Ok(1.0 / (2.0 * p_minus))
}

/// Complete synchronization `S_c` of `pair`.
pub fn complete_synchronization(v: &DMatrix<f64>, pair: [usize; 2]) -> QomResult<f64> {
    validate_covariance(v, &pair_indices(pair)?)?;
    let q_minus = difference_variance(v, pair, [[1.0, 0.0], [1.0, 0.0]]);
    let p_minus = difference_variance(v, pair, [[0.0, 1.0], [0.0, 1.0]]);
    let total = positive(q_minus + p_minus, "⟨q₋² + p₋²⟩")?;
    Ok(1.0 / total)
}

/// `S_p` at every sample of a trajectory.
pub fn phase_synchronization_series(
    covariances: &[DMatrix<f64>],
    phases: &[[f64; 2]],
    pair: [usize; 2],
) -> QomResult<Vec<f64>> {
    validate_trajectory(covariances.len(), Some(phases.len()))?;
    covariances
        .iter()
        .zip(phases)
        .map(|(v, phi)| phase_synchronization(v, *phi, pair))
        .collect()
}
