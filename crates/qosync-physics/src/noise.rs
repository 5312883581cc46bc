// ─────────────────────────────────────────────────────────────────────
// QOSync — Noise Matrix Builder
// ─────────────────────────────────────────────────────────────────────
//! Diffusion matrix D of the input vacuum and thermal noise.
//!
//! Optical quadratures carry `κᵢ`, mechanical ones `γᵢ(2n_thᵢ + 1)`. The
//! unidirectional channel correlates the two cavity inputs with
//! `√(ηκ₁κ₂)`, placed symmetrically. D does not depend on the modes and
//! is built once per system.

use nalgebra::DMatrix;
use qosync_types::{ParameterSet, QomError, QomResult, Topology};

use crate::couplings::ReducedCoefficients;
use crate::layout::{block_offset, plus_minus_transform, BLOCK, N_SUBSYSTEMS, P, Q, X, Y};

const SYMMETRY_TOL: f64 = 1e-12;
const PSD_TOL: f64 = 1e-12;

/// Build and verify D for the parameter topology.
pub fn build_noise(params: &ParameterSet) -> QomResult<DMatrix<f64>> {
    match params.topology {
        Topology::Bidirectional => {
            let d = lab_noise(params, false);
            check_noise_invariants(&d, BLOCK)?;
            Ok(d)
        }
        Topology::Unidirectional => {
            let d = lab_noise(params, true);
            check_noise_invariants(&d, BLOCK)?;
            Ok(d)
        }
        Topology::UnidirectionalPlusMinus => {
            let d = lab_noise(params, true);
            check_noise_invariants(&d, BLOCK)?;
            let t = plus_minus_transform();
            Ok(&t * d * &t)
        }
        Topology::UnidirectionalReduced => {
            build_reduced_noise(params, &ReducedCoefficients::new(params))
        }
    }
}

/// Reduced-model D from already computed coefficients.
pub(crate) fn build_reduced_noise(
    params: &ParameterSet,
    rc: &ReducedCoefficients,
) -> QomResult<DMatrix<f64>> {
    let d = reduced_noise(params, rc);
    check_noise_invariants(&d, 2)?;
    Ok(d)
}

fn lab_noise(params: &ParameterSet, channel: bool) -> DMatrix<f64> {
    let n = N_SUBSYSTEMS * BLOCK;
    let mut d = DMatrix::zeros(n, n);
    for i in 0..N_SUBSYSTEMS {
        let o = block_offset(i);
        let thermal = params.gammas[i] * (2.0 * params.n_ths[i] + 1.0);
        d[(o + X, o + X)] = params.kappas[i];
        d[(o + Y, o + Y)] = params.kappas[i];
        d[(o + Q, o + Q)] = thermal;
        d[(o + P, o + P)] = thermal;
    }
    if channel {
        let t = params.transfer_rate();
        let o = block_offset(1);
        for k in [X, Y] {
            d[(k, o + k)] = t;
            d[(o + k, k)] = t;
        }
    }
    d
}

fn reduced_noise(params: &ParameterSet, rc: &ReducedCoefficients) -> DMatrix<f64> {
    let mut d = DMatrix::zeros(4, 4);
    let [e1, e2] = rc.noise_coeffs;
    for i in 0..N_SUBSYSTEMS {
        let v = rc.noise_coeffs[i].norm_sqr() / 2.0
            + params.gammas[i] * (2.0 * params.n_ths[i] + 1.0);
        d[(2 * i, 2 * i)] = v;
        d[(2 * i + 1, 2 * i + 1)] = v;
    }
    let se = params.eta.sqrt();
    let same = -se / 2.0 * (e1.im * e2.im - se * e1.re * e2.re);
    let diff = se / 2.0 * (e1.im * e2.re / 2.0 - se * e1.re * e2.im);
    d[(0, 2)] = same;
    d[(2, 0)] = same;
    d[(1, 3)] = same;
    d[(3, 1)] = same;
    d[(0, 3)] = diff;
    d[(3, 0)] = diff;
    d[(1, 2)] = -diff;
    d[(2, 1)] = -diff;
    d
}

/// D must be symmetric with positive semi-definite diagonal blocks of
/// size `block` (one per subsystem).
pub fn check_noise_invariants(d: &DMatrix<f64>, block: usize) -> QomResult<()> {
    if !d.is_square() || block == 0 || d.nrows() % block != 0 {
        return Err(QomError::Shape(format!(
            "noise matrix {:?} does not split into {block}×{block} blocks",
            d.shape()
        )));
    }
    let scale = d.amax().max(1.0);
    let asym = (d - d.transpose()).amax();
    if asym > SYMMETRY_TOL * scale {
        return Err(QomError::Numerical(format!(
            "noise matrix asymmetric by {asym:.3e}"
        )));
    }
    for start in (0..d.nrows()).step_by(block) {
        let sub = d.view((start, start), (block, block)).clone_owned();
        let min_eig = sub.symmetric_eigenvalues().min();
        if min_eig < -PSD_TOL * scale {
            return Err(QomError::Numerical(format!(
                "noise block at {start} not positive semi-definite (λ_min = {min_eig:.3e})"
            )));
        }
    }
    Ok(())
}
