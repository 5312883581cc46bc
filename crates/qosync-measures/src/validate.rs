// ─────────────────────────────────────────────────────────────────────
// QOSync — Covariance Validation
// ─────────────────────────────────────────────────────────────────────

use log::warn;
use nalgebra::DMatrix;
use qosync_types::{QomError, QomResult};

/// Allowed asymmetry relative to the largest entry.
pub const SYMMETRY_TOL: f64 = 1e-9;

/// Reject a covariance that is not square, not finite, asymmetric, or
/// has a negative variance at any of the designated `indices`.
pub fn validate_covariance(v: &DMatrix<f64>, indices: &[usize]) -> QomResult<()> {
    if !v.is_square() || v.nrows() == 0 {
        return Err(QomError::Malformed(format!(
            "covariance must be square and non-empty, got {:?}",
            v.shape()
        )));
    }
    if let Some(&i) = indices.iter().find(|&&i| i >= v.nrows()) {
        return Err(QomError::Shape(format!(
            "quadrature index {i} out of range for {}×{} covariance",
            v.nrows(),
            v.ncols()
        )));
    }
    if v.iter().any(|x| !x.is_finite()) {
        return Err(QomError::Malformed(
            "covariance contains non-finite entries".to_string(),
        ));
    }
    let scale = v.amax().max(1.0);
    let asym = (v - v.transpose()).amax();
    if asym > SYMMETRY_TOL * scale {
        warn!("rejecting covariance with asymmetry {asym:.3e}");
        return Err(QomError::Malformed(format!(
            "covariance asymmetric by {asym:.3e}"
        )));
    }
    for &i in indices {
        if v[(i, i)] < 0.0 {
            warn!("rejecting covariance with V[{i}][{i}] = {:.3e}", v[(i, i)]);
            return Err(QomError::Malformed(format!(
                "negative variance V[{i}][{i}] = {:.3e}",
                v[(i, i)]
            )));
        }
    }
    Ok(())
}

/// Reject an empty trajectory or one whose companion series differs in length.
pub fn validate_trajectory(len: usize, companion: Option<usize>) -> QomResult<()> {
    if len == 0 {
        return Err(QomError::Malformed("empty trajectory".to_string()));
    }
    match companion {
        Some(other) if other != len => Err(QomError::Malformed(format!(
            "trajectory length mismatch: {len} vs {other}"
        ))),
        _ => Ok(()),
    }
}
