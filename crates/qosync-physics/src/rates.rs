// ─────────────────────────────────────────────────────────────────────
// QOSync — Mode and Covariance Rates
// ─────────────────────────────────────────────────────────────────────
//! Right-hand sides of the coupled equations of motion.
//!
//!   α̇ᵢ = (−κᵢ + iΔᵢ) αᵢ + drive/injection
//!   β̇ᵢ = i gᵢ conj(αᵢ) + (−γᵢ − iωᵢ) βᵢ
//!   V̇  = A V + V Aᵀ + D

use nalgebra::DMatrix;
use num_complex::Complex64;
use qosync_types::{ParameterSet, QomError, QomResult, Topology};

use crate::couplings::{reduced_detuning, EffectiveCouplings};
use crate::layout::{mechanical_mode, optical_mode, N_SUBSYSTEMS};

const I: Complex64 = Complex64::new(0.0, 1.0);

/// Mode rates of the full (optical + mechanical) topologies.
pub fn mode_rates(
    params: &ParameterSet,
    modes: &[Complex64],
    out: &mut [Complex64],
) -> QomResult<()> {
    let ec = EffectiveCouplings::from_modes(params, modes)?;
    if out.len() != modes.len() {
        return Err(QomError::Shape(format!(
            "rate buffer holds {} modes, expected {}",
            out.len(),
            modes.len()
        )));
    }

    let alphas = [modes[optical_mode(0)], modes[optical_mode(1)]];
    let drive = Complex64::new(params.amp_drive, 0.0);
    for i in 0..N_SUBSYSTEMS {
        let alpha = alphas[i];
        let beta = modes[mechanical_mode(i)];
        out[optical_mode(i)] = Complex64::new(-params.kappas[i], ec.detunings[i]) * alpha;
        out[mechanical_mode(i)] = I * ec.gs[i] * alpha.conj()
            + Complex64::new(-params.gammas[i], -ec.omegas[i]) * beta;
    }

    match params.topology {
        Topology::Bidirectional => {
            out[optical_mode(0)] += I * params.lambda * alphas[1] + drive;
            out[optical_mode(1)] += I * params.lambda * alphas[0] + drive;
        }
        Topology::Unidirectional | Topology::UnidirectionalPlusMinus => {
            out[optical_mode(0)] += drive;
            out[optical_mode(1)] +=
                -2.0 * params.transfer_rate() * alphas[0] + params.injected_drive();
        }
        Topology::UnidirectionalReduced => {
            return Err(QomError::Config(
                "reduced topology has no mechanical mode rates".to_string(),
            ))
        }
    }
    Ok(())
}

/// Cavity-field rates of the reduced model (fixed detuning, no backaction).
pub fn reduced_mode_rates(
    params: &ParameterSet,
    modes: &[Complex64],
    out: &mut [Complex64],
) -> QomResult<()> {
    if modes.len() != N_SUBSYSTEMS || out.len() != N_SUBSYSTEMS {
        return Err(QomError::Shape(format!(
            "reduced model carries {N_SUBSYSTEMS} modes, got {} / {}",
            modes.len(),
            out.len()
        )));
    }
    let delta_0 = reduced_detuning(params);
    for i in 0..N_SUBSYSTEMS {
        out[i] = Complex64::new(-params.kappas[i], delta_0) * modes[i];
    }
    out[0] += params.amp_drive;
    out[1] += -2.0 * params.transfer_rate() * modes[0] + params.injected_drive();
    Ok(())
}

/// Evaluates `A V + V Aᵀ + D` into a caller buffer using owned scratch.
#[derive(Debug, Clone)]
pub struct CovarianceRates {
    a_t: DMatrix<f64>,
    av: DMatrix<f64>,
    va_t: DMatrix<f64>,
}

impl CovarianceRates {
    pub fn new(n: usize) -> Self {
        Self {
            a_t: DMatrix::zeros(n, n),
            av: DMatrix::zeros(n, n),
            va_t: DMatrix::zeros(n, n),
        }
    }

    pub fn dim(&self) -> usize {
        self.av.nrows()
    }

    /// Write the symmetrized covariance derivative into `out`.
    ///
    /// The lower triangle is overwritten with the upper triangle of the
    /// raw result (mirrored, not averaged).
    pub fn evaluate(
        &mut self,
        a: &DMatrix<f64>,
        d: &DMatrix<f64>,
        v: &DMatrix<f64>,
        out: &mut DMatrix<f64>,
    ) -> QomResult<()> {
        let n = self.dim();
        for (name, m) in [("drift", a), ("noise", d), ("covariance", v)] {
            if m.shape() != (n, n) {
                return Err(QomError::Shape(format!(
                    "{name} matrix is {:?}, expected ({n}, {n})",
                    m.shape()
                )));
            }
        }
        if out.shape() != (n, n) {
            *out = DMatrix::zeros(n, n);
        }

        a.transpose_to(&mut self.a_t);
        self.av.gemm(1.0, a, v, 0.0);
        self.va_t.gemm(1.0, v, &self.a_t, 0.0);
        for c in 0..n {
            for r in 0..=c {
                out[(r, c)] = self.av[(r, c)] + self.va_t[(r, c)] + d[(r, c)];
            }
        }
        for c in 0..n {
            for r in (c + 1)..n {
                out[(r, c)] = out[(c, r)];
            }
        }
        Ok(())
    }
}

/// Allocating convenience wrapper around [`CovarianceRates::evaluate`].
pub fn covariance_rates(
    a: &DMatrix<f64>,
    d: &DMatrix<f64>,
    v: &DMatrix<f64>,
) -> QomResult<DMatrix<f64>> {
    let n = v.nrows();
    let mut out = DMatrix::zeros(n, n);
    CovarianceRates::new(n).evaluate(a, d, v, &mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drift::DriftBuilder;
    use qosync_types::ParameterInput;

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    #[test]
    fn test_vacuum_rates_are_pure_drive() {
        let p = ParameterSet::defaults(Topology::Bidirectional);
        let modes = [c(0.0, 0.0); 4];
        let mut out = [c(0.0, 0.0); 4];
        mode_rates(&p, &modes, &mut out).unwrap();
        assert_eq!(out[0], c(52.0, 0.0));
        assert_eq!(out[2], c(52.0, 0.0));
        assert_eq!(out[1], c(0.0, 0.0));
    }

    #[test]
    fn test_unidirectional_injection() {
        let mut input = ParameterInput::new(Topology::Unidirectional);
        input.eta = Some(1.0);
        input.amp_drive = Some(0.0);
        let p = ParameterSet::from_input(&input).unwrap();
        let modes = [c(1.0, 0.0), c(0.0, 0.0), c(0.0, 0.0), c(0.0, 0.0)];
        let mut out = [c(0.0, 0.0); 4];
        mode_rates(&p, &modes, &mut out).unwrap();
        assert!((out[2] - c(-2.0 * 0.15, 0.0)).norm() < 1e-15, "α₂ rate {}", out[2]);
    }

    #[test]
    fn test_mode_rates_match_drift_linearization() {
        // Central-difference Jacobian of the (Re, Im) mode equations equals A.
        let p = ParameterSet::defaults(Topology::Unidirectional);
        let base = [c(3.0, -2.0), c(1.5, 0.5), c(-1.0, 2.5), c(0.7, -0.2)];
        let mut drift = DriftBuilder::new(&p);
        let a = drift.build(&p, &base).unwrap().clone();

        let h = 1e-6;
        let mut plus = [c(0.0, 0.0); 4];
        let mut minus = [c(0.0, 0.0); 4];
        for col in 0..8 {
            let mut mp = base;
            let mut mm = base;
            let k = col / 2;
            let dir = if col % 2 == 0 { c(h, 0.0) } else { c(0.0, h) };
            mp[k] += dir;
            mm[k] -= dir;
            mode_rates(&p, &mp, &mut plus).unwrap();
            mode_rates(&p, &mm, &mut minus).unwrap();
            for row in 0..8 {
                let k_out = row / 2;
                let diff = (plus[k_out] - minus[k_out]) / (2.0 * h);
                let fd = if row % 2 == 0 { diff.re } else { diff.im };
                assert!(
                    (fd - a[(row, col)]).abs() < 1e-6,
                    "J[{row}][{col}] = {fd} vs A = {}",
                    a[(row, col)]
                );
            }
        }
    }

    #[test]
    fn test_reduced_rates_vanish_at_steady_state() {
        let p = ParameterSet::defaults(Topology::UnidirectionalReduced);
        let alphas = crate::couplings::reduced_steady_alphas(&p);
        let mut out = [c(0.0, 0.0); 2];
        reduced_mode_rates(&p, &alphas, &mut out).unwrap();
        assert!(out.iter().all(|r| r.norm() < 1e-10), "{out:?}");
    }

    #[test]
    fn test_covariance_rates_mirror_upper() {
        let a = DMatrix::from_row_slice(2, 2, &[-1.0, 2.0, 0.5, -3.0]);
        let d = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0]);
        let v = DMatrix::from_row_slice(2, 2, &[1.0, 0.2, 0.2, 2.0]);
        let dv = covariance_rates(&a, &d, &v).unwrap();
        let raw = &a * &v + &v * a.transpose() + &d;
        assert_eq!(dv[(0, 1)], raw[(0, 1)]);
        assert_eq!(dv[(1, 0)], raw[(0, 1)]);
        assert!((dv[(0, 0)] - raw[(0, 0)]).abs() < 1e-15);
    }

    #[test]
    fn test_covariance_rates_vanish_at_vacuum() {
        let p = ParameterSet::defaults(Topology::Bidirectional);
        let mut drift = DriftBuilder::new(&p);
        let a = drift.build(&p, &[c(0.0, 0.0); 4]).unwrap().clone();
        let d = crate::noise::build_noise(&p).unwrap();
        let v = DMatrix::identity(8, 8) * 0.5;
        let dv = covariance_rates(&a, &d, &v).unwrap();
        assert!(dv.amax() < 1e-15, "vacuum is not stationary: {}", dv.amax());
    }

    #[test]
    fn test_covariance_rates_shape_mismatch() {
        let a = DMatrix::zeros(4, 4);
        let d = DMatrix::zeros(8, 8);
        let v = DMatrix::zeros(8, 8);
        let mut out = DMatrix::zeros(8, 8);
        let r = CovarianceRates::new(8).evaluate(&a, &d, &v, &mut out);
        assert!(matches!(r, Err(QomError::Shape(_))));
    }
}
