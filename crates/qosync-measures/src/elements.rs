// ─────────────────────────────────────────────────────────────────────
// QOSync — Correlation Elements
// ─────────────────────────────────────────────────────────────────────
//! Raw covariance elements and phonon occupancies.

use nalgebra::DMatrix;
use qosync_types::{QomError, QomResult};

use crate::validate::{validate_covariance, validate_trajectory};

/// Series of the element `V[row][col]` over a trajectory.
pub fn correlation_elements(
    covariances: &[DMatrix<f64>],
    row: usize,
    col: usize,
) -> QomResult<Vec<f64>> {
    validate_trajectory(covariances.len(), None)?;
    covariances
        .iter()
        .map(|v| {
            validate_covariance(v, &[row, col])?;
            Ok(v[(row, col)])
        })
        .collect()
}

/// Thermal occupancy `n = (V_qq + V_pp − 1)/2` of the mode whose
/// quadratures are `(2·mode, 2·mode + 1)`.
pub fn phonon_occupancy(v: &DMatrix<f64>, mode: usize) -> QomResult<f64> {
    let (q, p) = (2 * mode, 2 * mode + 1);
    validate_covariance(v, &[q, p])?;
    Ok((v[(q, q)] + v[(p, p)] - 1.0) / 2.0)
}

/// `n_second − n_first` for a pair of mechanical modes.
pub fn occupancy_difference(v: &DMatrix<f64>, pair: [usize; 2]) -> QomResult<f64> {
    if pair[0] == pair[1] {
        return Err(QomError::Shape(format!(
            "occupancy difference needs two distinct modes, got {pair:?}"
        )));
    }
    Ok(phonon_occupancy(v, pair[1])? - phonon_occupancy(v, pair[0])?)
}
