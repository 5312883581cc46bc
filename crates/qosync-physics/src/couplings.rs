// ─────────────────────────────────────────────────────────────────────
// QOSync — Effective Couplings
// ─────────────────────────────────────────────────────────────────────
//! Mean-field dressed detunings and couplings.
//!
//! The drift builder and the mode rates both read from here, so the
//! linearization and the classical equations of motion can never use
//! different definitions of Δᵢ or gᵢ.
//!
//!   Δᵢ = sign · ωᵢ + 2 g0ᵢ Re βᵢ
//!   gᵢ = g0ᵢ αᵢ

use num_complex::Complex64;
use qosync_types::{ParameterSet, QomError, QomResult};

use crate::layout::{mechanical_mode, optical_mode, N_SUBSYSTEMS};

/// Dressed parameters of both subsystems at one mode vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectiveCouplings {
    /// Mechanical frequencies ωᵢ.
    pub omegas: [f64; 2],
    /// Effective detunings Δᵢ.
    pub detunings: [f64; 2],
    /// Effective optomechanical couplings gᵢ.
    pub gs: [Complex64; 2],
}

impl EffectiveCouplings {
    /// Couplings at `modes = [α₁, β₁, α₂, β₂]`.
    pub fn from_modes(params: &ParameterSet, modes: &[Complex64]) -> QomResult<Self> {
        let expected = 2 * N_SUBSYSTEMS;
        if modes.len() != expected {
            return Err(QomError::Shape(format!(
                "expected {expected} modes, got {}",
                modes.len()
            )));
        }
        let omegas = params.omega_ms();
        let bare = params.bare_detunings();
        let mut detunings = [0.0; 2];
        let mut gs = [Complex64::new(0.0, 0.0); 2];
        for i in 0..N_SUBSYSTEMS {
            let alpha = modes[optical_mode(i)];
            let beta = modes[mechanical_mode(i)];
            detunings[i] = bare[i] + 2.0 * params.g0s[i] * beta.re;
            gs[i] = params.g0s[i] * alpha;
        }
        Ok(Self {
            omegas,
            detunings,
            gs,
        })
    }
}

/// Coefficients of the reduced model, where the cavity fields sit at
/// their classical steady state and only the mechanics fluctuate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReducedCoefficients {
    /// Closed-form steady cavity amplitudes.
    pub alphas: [Complex64; 2],
    /// Gᵢ = g0ᵢ αᵢ.
    pub gs: [Complex64; 2],
    /// Optomechanical anti-damping Γᵢ = |Gᵢ|²/κᵢ.
    pub gammas_eff: [f64; 2],
    /// Cross-oscillator coefficient χ = 2 conj(G₁) G₂ √η / √(κ₁κ₂).
    pub chi: Complex64,
    /// Noise coefficients ηᵢⁿ = √(2/κᵢ) Gᵢ.
    pub noise_coeffs: [Complex64; 2],
}

impl ReducedCoefficients {
    pub fn new(params: &ParameterSet) -> Self {
        let alphas = reduced_steady_alphas(params);
        let kappas = params.kappas;
        let gs = [params.g0s[0] * alphas[0], params.g0s[1] * alphas[1]];
        let gammas_eff = [gs[0].norm_sqr() / kappas[0], gs[1].norm_sqr() / kappas[1]];
        // √η/√(κ₁κ₂) stays finite at η = 0, unlike η/√(ηκ₁κ₂).
        let chi = 2.0 * gs[0].conj() * gs[1] * params.eta.sqrt() / (kappas[0] * kappas[1]).sqrt();
        let noise_coeffs = [
            (2.0 / kappas[0]).sqrt() * gs[0],
            (2.0 / kappas[1]).sqrt() * gs[1],
        ];
        Self {
            alphas,
            gs,
            gammas_eff,
            chi,
            noise_coeffs,
        }
    }
}

/// Detuning of the (identical) cavities in the reduced model.
pub fn reduced_detuning(params: &ParameterSet) -> f64 {
    params.detuning_sign * params.omega_m
}

/// Closed-form classical steady state of the unidirectional cavities.
pub fn reduced_steady_alphas(params: &ParameterSet) -> [Complex64; 2] {
    let delta_0 = reduced_detuning(params);
    let kappas = params.kappas;
    let a1 = Complex64::new(params.amp_drive, 0.0) / Complex64::new(kappas[0], -delta_0);
    let a2 = (Complex64::new(params.injected_drive(), 0.0) - 2.0 * params.transfer_rate() * a1)
        / Complex64::new(kappas[1], -delta_0);
    [a1, a2]
}

#[cfg(test)]
mod tests {
    use super::*;
    use qosync_types::{ParameterInput, Topology};

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    #[test]
    fn test_effective_couplings_shift() {
        let p = ParameterSet::defaults(Topology::Bidirectional);
        let modes = [c(2.0, 1.0), c(3.0, -1.0), c(0.0, 0.0), c(-1.0, 4.0)];
        let ec = EffectiveCouplings::from_modes(&p, &modes).unwrap();
        assert!((ec.detunings[0] - (1.0 + 2.0 * 0.005 * 3.0)).abs() < 1e-15);
        assert!((ec.detunings[1] - (1.01 - 2.0 * 0.005)).abs() < 1e-15);
        assert_eq!(ec.gs[0], c(0.01, 0.005));
        assert_eq!(ec.gs[1], c(0.0, 0.0));
        assert_eq!(ec.omegas, [1.0, 1.01]);
    }

    #[test]
    fn test_effective_couplings_shape() {
        let p = ParameterSet::defaults(Topology::Unidirectional);
        let r = EffectiveCouplings::from_modes(&p, &[c(0.0, 0.0); 3]);
        assert!(matches!(r, Err(QomError::Shape(_))));
    }

    #[test]
    fn test_reduced_steady_state_solves_mode_rates() {
        let p = ParameterSet::defaults(Topology::UnidirectionalReduced);
        let a = reduced_steady_alphas(&p);
        let d0 = reduced_detuning(&p);
        let r1 = (c(-p.kappas[0], d0)) * a[0] + p.amp_drive;
        let r2 = (c(-p.kappas[1], d0)) * a[1] - 2.0 * p.transfer_rate() * a[0]
            + p.injected_drive();
        assert!(r1.norm() < 1e-10, "residual 1 = {r1}");
        assert!(r2.norm() < 1e-10, "residual 2 = {r2}");
    }

    #[test]
    fn test_reduced_chi_vanishes_without_transmission() {
        let mut input = ParameterInput::new(Topology::UnidirectionalReduced);
        input.eta = Some(0.0);
        let p = ParameterSet::from_input(&input).unwrap();
        let rc = ReducedCoefficients::new(&p);
        assert_eq!(rc.chi, c(0.0, 0.0));
        assert!(rc.gammas_eff.iter().all(|g| g.is_finite()));
    }
}
