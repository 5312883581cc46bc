// ─────────────────────────────────────────────────────────────────────
// QOSync — Lyapunov Exponents
// ─────────────────────────────────────────────────────────────────────
//! Growth rates of fluctuations around a trajectory.
//!
//! Two estimates:
//!
//! - spectral: eigenvalues of one drift matrix (instantaneous or built at
//!   time-averaged modes), sorted by ascending real part then imaginary
//!   part; the transverse rate is the spectral abscissa of the drift's
//!   minus-subspace block, or a subset addressed by sorted index
//! - product: the tangent basis is advanced by `exp(Aₖ·dt)` and
//!   re-orthonormalized by QR every `renorm_every` steps; the exponents
//!   are `Σ ln|R_kk| / T`

use log::debug;
use nalgebra::DMatrix;
use num_complex::Complex64;
use qosync_types::{QomError, QomResult};
use serde::{Deserialize, Serialize};

use crate::validate::validate_trajectory;

fn check_drift(a: &DMatrix<f64>) -> QomResult<()> {
    if !a.is_square() || a.nrows() == 0 {
        return Err(QomError::Shape(format!(
            "drift matrix must be square and non-empty, got {:?}",
            a.shape()
        )));
    }
    if a.iter().any(|x| !x.is_finite()) {
        return Err(QomError::Malformed(
            "drift matrix contains non-finite entries".to_string(),
        ));
    }
    Ok(())
}

/// Eigenvalues of `a`, ascending by real part, ties by imaginary part.
pub fn sorted_eigenvalues(a: &DMatrix<f64>) -> QomResult<Vec<Complex64>> {
    check_drift(a)?;
    let mut eigen: Vec<Complex64> = a.complex_eigenvalues().iter().copied().collect();
    if eigen.iter().any(|l| !l.re.is_finite() || !l.im.is_finite()) {
        return Err(QomError::Numerical(
            "eigenvalue computation did not produce finite values".to_string(),
        ));
    }
    eigen.sort_by(|x, y| x.re.total_cmp(&y.re).then(x.im.total_cmp(&y.im)));
    Ok(eigen)
}

/// Largest real part among the sorted eigenvalues at `indices`.
pub fn max_real_part(a: &DMatrix<f64>, indices: &[usize]) -> QomResult<f64> {
    if indices.is_empty() {
        return Err(QomError::Shape("no eigenvalue indices selected".to_string()));
    }
    let eigen = sorted_eigenvalues(a)?;
    indices.iter().try_fold(f64::NEG_INFINITY, |acc, &k| {
        eigen.get(k).map(|l| acc.max(l.re)).ok_or_else(|| {
            QomError::Shape(format!(
                "eigenvalue index {k} out of range for {} eigenvalues",
                eigen.len()
            ))
        })
    })
}

/// Largest real part over the whole spectrum of `a`.
pub fn spectral_abscissa(a: &DMatrix<f64>) -> QomResult<f64> {
    let eigen = sorted_eigenvalues(a)?;
    Ok(eigen.last().map_or(f64::NEG_INFINITY, |l| l.re))
}

/// [`max_real_part`] for every drift matrix of a sequence.
pub fn max_real_part_series(drifts: &[DMatrix<f64>], indices: &[usize]) -> QomResult<Vec<f64>> {
    validate_trajectory(drifts.len(), None)?;
    drifts.iter().map(|a| max_real_part(a, indices)).collect()
}

/// Settings of the QR product estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProductMethod {
    /// Sampling interval of the drift sequence.
    pub dt: f64,
    /// Steps between re-orthonormalizations.
    pub renorm_every: usize,
}

impl ProductMethod {
    pub fn new(dt: f64) -> Self {
        Self {
            dt,
            renorm_every: 10,
        }
    }

    pub fn validate(&self) -> QomResult<()> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(QomError::Config(format!("dt must be positive, got {}", self.dt)));
        }
        if self.renorm_every == 0 {
            return Err(QomError::Config("renorm_every must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Full Lyapunov spectrum of the linear flow `δu̇ = A(t) δu`, sorted
/// descending.
pub fn product_exponents(drifts: &[DMatrix<f64>], method: &ProductMethod) -> QomResult<Vec<f64>> {
    method.validate()?;
    validate_trajectory(drifts.len(), None)?;
    let n = drifts[0].nrows();
    let mut basis = DMatrix::<f64>::identity(n, n);
    let mut sums = vec![0.0; n];
    let mut renorms = 0usize;

    for (k, a) in drifts.iter().enumerate() {
        check_drift(a)?;
        if a.nrows() != n {
            return Err(QomError::Shape(format!(
                "drift {k} is {:?}, expected {n}×{n}",
                a.shape()
            )));
        }
        basis = (a * method.dt).exp() * basis;
        if (k + 1) % method.renorm_every == 0 || k + 1 == drifts.len() {
            let qr = basis.qr();
            let r = qr.r();
            for (i, sum) in sums.iter_mut().enumerate() {
                let stretch = r[(i, i)].abs();
                if !(stretch > 0.0 && stretch.is_finite()) {
                    return Err(QomError::Numerical(format!(
                        "tangent basis degenerate at step {k} (|R_{i}{i}| = {stretch:.3e})"
                    )));
                }
                *sum += stretch.ln();
            }
            basis = qr.q();
            renorms += 1;
        }
    }

    let total = drifts.len() as f64 * method.dt;
    let mut exponents: Vec<f64> = sums.into_iter().map(|s| s / total).collect();
    exponents.sort_by(|x, y| y.total_cmp(x));
    debug!(
        "product Lyapunov spectrum over {} steps ({renorms} renormalizations): {exponents:?}",
        drifts.len()
    );
    Ok(exponents)
}
