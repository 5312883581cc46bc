// ─────────────────────────────────────────────────────────────────────
// QOSync — Stationary Solver
// ─────────────────────────────────────────────────────────────────────
//! Steady state without time integration.
//!
//! 1. Stationary modes: fixed point of the mode rates.
//! 2. Drift at that point; stability requires max Re λ(A) < 0.
//! 3. Covariance from the continuous Lyapunov equation
//!
//!      A V + V Aᵀ + D = 0
//!
//!    solved as `(I ⊗ A + A ⊗ I) vec(V) = −vec(D)` (column-major vec).

use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use qosync_types::{ParameterSet, QomError, QomResult, Topology};

use crate::couplings::reduced_steady_alphas;
use crate::layout::{mechanical_mode, optical_mode, N_SUBSYSTEMS};
use crate::systems::QomSystem;

/// Relative tolerance of the mode fixed-point iteration.
pub const MODE_TOLERANCE: f64 = 1e-12;

/// Iteration cap of the mode fixed point.
pub const MAX_MODE_ITERATIONS: usize = 1000;

const I: Complex64 = Complex64::new(0.0, 1.0);

/// Largest real part among the eigenvalues of `a`.
pub fn max_real_eigenvalue(a: &DMatrix<f64>) -> QomResult<f64> {
    if !a.is_square() || a.nrows() == 0 {
        return Err(QomError::Shape(format!(
            "drift matrix must be square and non-empty, got {:?}",
            a.shape()
        )));
    }
    if a.iter().any(|x| !x.is_finite()) {
        return Err(QomError::Numerical(
            "drift matrix contains non-finite entries".to_string(),
        ));
    }
    let max = a
        .complex_eigenvalues()
        .iter()
        .map(|l| l.re)
        .fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return Err(QomError::Numerical(
            "eigenvalue computation did not produce finite values".to_string(),
        ));
    }
    Ok(max)
}

/// Fails with `Instability` unless every eigenvalue has Re λ < 0.
pub fn check_stability(a: &DMatrix<f64>) -> QomResult<f64> {
    let max = max_real_eigenvalue(a)?;
    if max >= 0.0 {
        warn!("unstable drift matrix: max Re(λ) = {max:.6e}");
        return Err(QomError::Instability { max_real_part: max });
    }
    Ok(max)
}

/// Solve `A V + V Aᵀ + D = 0` for a stable `A`.
///
/// The solution is symmetrized as `(V + Vᵀ)/2` before it is returned.
pub fn solve_lyapunov(a: &DMatrix<f64>, d: &DMatrix<f64>) -> QomResult<DMatrix<f64>> {
    let n = a.nrows();
    if !a.is_square() || d.shape() != (n, n) {
        return Err(QomError::Shape(format!(
            "drift {:?} and noise {:?} must be square of equal size",
            a.shape(),
            d.shape()
        )));
    }
    check_stability(a)?;

    let id = DMatrix::<f64>::identity(n, n);
    let k = id.kronecker(a) + a.kronecker(&id);
    let rhs = -DVector::from_column_slice(d.as_slice());
    let vec_v = k.lu().solve(&rhs).ok_or_else(|| {
        QomError::Numerical("Lyapunov operator is singular".to_string())
    })?;
    if vec_v.iter().any(|x| !x.is_finite()) {
        return Err(QomError::Numerical(
            "Lyapunov solution contains non-finite entries".to_string(),
        ));
    }
    let v = DMatrix::from_column_slice(n, n, vec_v.as_slice());
    Ok((&v + v.transpose()) * 0.5)
}

/// Modes with vanishing rates for the full topologies (closed form for the
/// reduced model).
///
/// Iterates αᵢ = Fᵢ/(κᵢ − iΔᵢ), βᵢ = i g0ᵢ|αᵢ|²/(γᵢ + iωᵢ) with Δᵢ refreshed
/// from Re βᵢ until the update is below [`MODE_TOLERANCE`] relative.
pub fn fixed_point_modes(params: &ParameterSet) -> QomResult<Vec<Complex64>> {
    if params.topology == Topology::UnidirectionalReduced {
        return Ok(reduced_steady_alphas(params).to_vec());
    }
    let omegas = params.omega_ms();
    let bare = params.bare_detunings();
    let drive = Complex64::new(params.amp_drive, 0.0);
    let mut modes = vec![Complex64::new(0.0, 0.0); 2 * N_SUBSYSTEMS];
    let mut residual = f64::INFINITY;

    for iteration in 1..=MAX_MODE_ITERATIONS {
        let detunings: [f64; 2] = std::array::from_fn(|i| {
            bare[i] + 2.0 * params.g0s[i] * modes[mechanical_mode(i)].re
        });
        let denom: [Complex64; 2] =
            std::array::from_fn(|i| Complex64::new(params.kappas[i], -detunings[i]));

        let alphas = match params.topology {
            Topology::Bidirectional => {
                // (κᵢ − iΔᵢ)αᵢ − iλ α_other = A_l
                let off = -I * params.lambda;
                let det = denom[0] * denom[1] - off * off;
                if det.norm() == 0.0 {
                    return Err(QomError::Numerical(
                        "singular cavity system in stationary mode solve".to_string(),
                    ));
                }
                [
                    (drive * denom[1] - off * drive) / det,
                    (denom[0] * drive - off * drive) / det,
                ]
            }
            _ => {
                let a1 = drive / denom[0];
                let a2 = (params.injected_drive() - 2.0 * params.transfer_rate() * a1) / denom[1];
                [a1, a2]
            }
        };

        let mut next = vec![Complex64::new(0.0, 0.0); 2 * N_SUBSYSTEMS];
        for i in 0..N_SUBSYSTEMS {
            next[optical_mode(i)] = alphas[i];
            next[mechanical_mode(i)] = I * params.g0s[i] * alphas[i].norm_sqr()
                / Complex64::new(params.gammas[i], omegas[i]);
        }

        let change = next
            .iter()
            .zip(&modes)
            .map(|(a, b)| (a - b).norm())
            .fold(0.0, f64::max);
        let scale = next.iter().map(|m| m.norm()).fold(0.0, f64::max);
        residual = change / scale.max(f64::MIN_POSITIVE);
        modes = next;
        if change <= MODE_TOLERANCE * scale || scale == 0.0 {
            debug!("stationary modes converged after {iteration} iterations");
            return Ok(modes);
        }
    }
    warn!("stationary modes did not converge (residual {residual:.3e})");
    Err(QomError::NonConvergence {
        iterations: MAX_MODE_ITERATIONS,
        residual,
    })
}

/// Stationary modes, drift and covariance of one system.
#[derive(Debug, Clone, PartialEq)]
pub struct StationaryState {
    pub modes: Vec<Complex64>,
    pub drift: DMatrix<f64>,
    pub covariance: DMatrix<f64>,
    /// Largest real part of the drift spectrum (negative).
    pub max_real_part: f64,
}

/// Full stationary solve: modes → drift → Lyapunov equation.
pub fn stationary_state(system: &mut dyn QomSystem) -> QomResult<StationaryState> {
    let modes = system.stationary_modes()?;
    let (a, d) = system.drift_and_noise(&modes)?;
    let max_real_part = check_stability(a)?;
    let covariance = solve_lyapunov(a, d)?;
    let drift = a.clone();
    info!(
        "stationary {:?} state solved (max Re λ = {max_real_part:.4e})",
        system.topology()
    );
    Ok(StationaryState {
        modes,
        drift,
        covariance,
        max_real_part,
    })
}
