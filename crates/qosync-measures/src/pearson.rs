// ─────────────────────────────────────────────────────────────────────
// QOSync — Pearson Correlator
// ─────────────────────────────────────────────────────────────────────

use nalgebra::DMatrix;
use qosync_types::{MeasureWindow, QomError, QomResult};

use crate::validate::{validate_covariance, validate_trajectory};
use crate::window::window_slice;

/// `⟨V_ij⟩ / √(⟨V_ii⟩⟨V_jj⟩)` with every average taken over `window`.
///
/// Non-positive averaged variances are rejected as `Malformed`; a
/// vanishing averaged cross element then gives exactly `0`.
pub fn pearson_correlator(
    covariances: &[DMatrix<f64>],
    pair: [usize; 2],
    window: &MeasureWindow,
) -> QomResult<f64> {
    validate_trajectory(covariances.len(), None)?;
    let samples = window_slice(covariances, window)?;
    let [i, j] = pair;
    let (mut cross, mut var_i, mut var_j) = (0.0, 0.0, 0.0);
    for v in samples {
        validate_covariance(v, &[i, j])?;
        cross += v[(i, j)];
        var_i += v[(i, i)];
        var_j += v[(j, j)];
    }
    let n = samples.len() as f64;
    let (cross, var_i, var_j) = (cross / n, var_i / n, var_j / n);
    if var_i <= 0.0 || var_j <= 0.0 {
        return Err(QomError::Malformed(format!(
            "averaged variances ⟨V_{i}{i}⟩ = {var_i:.3e}, ⟨V_{j}{j}⟩ = {var_j:.3e} must be positive"
        )));
    }
    if cross == 0.0 {
        return Ok(0.0);
    }
    Ok(cross / (var_i * var_j).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(cross: f64, var: f64) -> DMatrix<f64> {
        let mut v = DMatrix::identity(8, 8) * var;
        v[(3, 7)] = cross;
        v[(7, 3)] = cross;
        v
    }

    #[test]
    fn test_window_average() {
        // transient sample excluded by the window
        let covs = vec![sample(0.9, 1.0), sample(0.2, 1.0), sample(0.4, 1.0)];
        let w = MeasureWindow::trailing(covs.len(), 2);
        let c = pearson_correlator(&covs, [3, 7], &w).unwrap();
        assert!((c - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_uncorrelated_is_exactly_zero() {
        let covs = vec![sample(0.0, 0.5), sample(0.0, 2.0)];
        assert_eq!(
            pearson_correlator(&covs, [3, 7], &MeasureWindow::default()).unwrap(),
            0.0
        );
    }

    #[test]
    fn test_zero_variance_is_malformed() {
        let covs = vec![sample(0.0, 0.0)];
        assert!(matches!(
            pearson_correlator(&covs, [3, 7], &MeasureWindow::default()),
            Err(QomError::Malformed(_))
        ));
    }

    #[test]
    fn test_negative_variance_and_empty() {
        let mut v = sample(0.1, 1.0);
        v[(7, 7)] = -0.5;
        assert!(pearson_correlator(&[v], [3, 7], &MeasureWindow::default()).is_err());
        assert!(pearson_correlator(&[], [3, 7], &MeasureWindow::default()).is_err());
    }

    #[test]
    fn test_anticorrelated() {
        let covs = vec![sample(-0.5, 1.0)];
        let c = pearson_correlator(&covs, [3, 7], &MeasureWindow::default()).unwrap();
        assert!((c + 0.5).abs() < 1e-12);
    }
}
