// ─────────────────────────────────────────────────────────────────────
// QOSync — Drift Matrix Builder
// ─────────────────────────────────────────────────────────────────────
//! Real drift matrix A of the quadrature fluctuations.
//!
//! Per subsystem block `[x, y, q, p]` at offset `o = 4i`:
//!
//!   ⎡ −κ   −Δ   −2 Im g    0 ⎤
//!   ⎢  Δ   −κ    2 Re g    0 ⎥
//!   ⎢  0    0     −γ       ω ⎥
//!   ⎣ 2Re g 2Im g −ω      −γ ⎦
//!
//! Bidirectional cavities exchange photons through `±λ` between the two
//! optical blocks; the unidirectional channel feeds `−2√(ηκ₁κ₂)` from
//! cavity 1 into cavity 2 only.
//!
//! The buffer and any basis-change scratch are sized once for the
//! topology. Every entry a topology can write is rewritten on each call;
//! the others stay zero from creation. The reduced drift does not depend
//! on the modes and is filled once, at construction.

use nalgebra::DMatrix;
use num_complex::Complex64;
use qosync_types::{ParameterSet, QomError, QomResult, Topology};

use crate::couplings::{EffectiveCouplings, ReducedCoefficients};
use crate::layout::{block_offset, plus_minus_transform, N_SUBSYSTEMS, P, Q, X, Y};

#[derive(Debug, Clone)]
enum Frame {
    /// Lab quadratures, filled in place.
    Lab,
    /// Lab drift assembled in scratch, then rotated by `T·A·T`.
    Collective {
        lab: DMatrix<f64>,
        product: DMatrix<f64>,
        transform: DMatrix<f64>,
    },
    /// Mode-independent matrix fixed at construction.
    Constant,
}

/// Owns the drift buffer of one system instance (one per worker).
#[derive(Debug, Clone)]
pub struct DriftBuilder {
    topology: Topology,
    matrix: DMatrix<f64>,
    frame: Frame,
}

impl DriftBuilder {
    /// Builder for `params.topology`. The reduced topology computes its
    /// coefficients here; use [`DriftBuilder::reduced`] to pass them in.
    pub fn new(params: &ParameterSet) -> Self {
        let topology = params.topology;
        let n = topology.n_quadratures();
        let frame = match topology {
            Topology::Bidirectional | Topology::Unidirectional => Frame::Lab,
            Topology::UnidirectionalPlusMinus => Frame::Collective {
                lab: DMatrix::zeros(n, n),
                product: DMatrix::zeros(n, n),
                transform: plus_minus_transform(),
            },
            Topology::UnidirectionalReduced => {
                return Self::reduced(params, &ReducedCoefficients::new(params))
            }
        };
        Self {
            topology,
            matrix: DMatrix::zeros(n, n),
            frame,
        }
    }

    /// Reduced-model builder holding the constant drift for `rc`.
    pub fn reduced(params: &ParameterSet, rc: &ReducedCoefficients) -> Self {
        let topology = Topology::UnidirectionalReduced;
        let n = topology.n_quadratures();
        let mut matrix = DMatrix::zeros(n, n);
        fill_reduced(&mut matrix, params, rc);
        Self {
            topology,
            matrix,
            frame: Frame::Constant,
        }
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    /// Fill the buffer for `modes` and return it.
    ///
    /// A constant (reduced) drift only checks the mode count; its values
    /// come from the parameters the builder was created with.
    pub fn build(&mut self, params: &ParameterSet, modes: &[Complex64]) -> QomResult<&DMatrix<f64>> {
        if params.topology != self.topology {
            return Err(QomError::Config(format!(
                "drift builder for {:?} received {:?} parameters",
                self.topology, params.topology
            )));
        }
        match &mut self.frame {
            Frame::Lab => {
                let ec = EffectiveCouplings::from_modes(params, modes)?;
                fill_subsystem_blocks(&mut self.matrix, params, &ec);
                if self.topology == Topology::Bidirectional {
                    fill_bidirectional_cross(&mut self.matrix, params.lambda);
                } else {
                    fill_unidirectional_cross(&mut self.matrix, params.transfer_rate());
                }
            }
            Frame::Collective {
                lab,
                product,
                transform,
            } => {
                let ec = EffectiveCouplings::from_modes(params, modes)?;
                fill_subsystem_blocks(lab, params, &ec);
                fill_unidirectional_cross(lab, params.transfer_rate());
                transform.mul_to(lab, product);
                product.mul_to(transform, &mut self.matrix);
            }
            Frame::Constant => {
                if modes.len() != self.topology.n_modes() {
                    return Err(QomError::Shape(format!(
                        "expected {} modes, got {}",
                        self.topology.n_modes(),
                        modes.len()
                    )));
                }
            }
        }
        Ok(&self.matrix)
    }

    /// Last matrix built.
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }
}

fn fill_subsystem_blocks(a: &mut DMatrix<f64>, params: &ParameterSet, ec: &EffectiveCouplings) {
    for i in 0..N_SUBSYSTEMS {
        let o = block_offset(i);
        let (kappa, gamma) = (params.kappas[i], params.gammas[i]);
        let (delta, omega, g) = (ec.detunings[i], ec.omegas[i], ec.gs[i]);

        a[(o + X, o + X)] = -kappa;
        a[(o + X, o + Y)] = -delta;
        a[(o + X, o + Q)] = -2.0 * g.im;

        a[(o + Y, o + X)] = delta;
        a[(o + Y, o + Y)] = -kappa;
        a[(o + Y, o + Q)] = 2.0 * g.re;

        a[(o + Q, o + Q)] = -gamma;
        a[(o + Q, o + P)] = omega;

        a[(o + P, o + X)] = 2.0 * g.re;
        a[(o + P, o + Y)] = 2.0 * g.im;
        a[(o + P, o + Q)] = -omega;
        a[(o + P, o + P)] = -gamma;
    }
}

fn fill_bidirectional_cross(a: &mut DMatrix<f64>, lambda: f64) {
    for i in 0..N_SUBSYSTEMS {
        let o = block_offset(i);
        let other = block_offset(N_SUBSYSTEMS - 1 - i);
        a[(o + X, other + Y)] = -lambda;
        a[(o + Y, other + X)] = lambda;
    }
}

fn fill_unidirectional_cross(a: &mut DMatrix<f64>, transfer: f64) {
    let o = block_offset(1);
    a[(o + X, X)] = -2.0 * transfer;
    a[(o + Y, Y)] = -2.0 * transfer;
}

/// Reduced model on `[q₁, p₁, q₂, p₂]`, in the frame of the left oscillator.
fn fill_reduced(a: &mut DMatrix<f64>, params: &ParameterSet, rc: &ReducedCoefficients) {
    for i in 0..N_SUBSYSTEMS {
        let damping = rc.gammas_eff[i] - params.gammas[i];
        a[(2 * i, 2 * i)] = damping;
        a[(2 * i + 1, 2 * i + 1)] = damping;
    }
    let chi = rc.chi;
    a[(2, 0)] = -chi.re;
    a[(2, 1)] = chi.im;
    a[(3, 0)] = -chi.im;
    a[(3, 1)] = -chi.re;
    a[(2, 3)] = params.delta;
    a[(3, 2)] = -params.delta;
}

#[cfg(test)]
mod tests {
    use super::*;
    use qosync_types::ParameterInput;

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    fn sample_modes() -> [Complex64; 4] {
        [c(3.0, -2.0), c(1.5, 0.5), c(-1.0, 2.5), c(0.7, -0.2)]
    }

    #[test]
    fn test_bidirectional_block_pattern() {
        let p = ParameterSet::defaults(Topology::Bidirectional);
        let modes = sample_modes();
        let ec = EffectiveCouplings::from_modes(&p, &modes).unwrap();
        let mut builder = DriftBuilder::new(&p);
        let a = builder.build(&p, &modes).unwrap();
        assert_eq!(a.shape(), (8, 8));
        assert_eq!(a[(0, 0)], -p.kappas[0]);
        assert_eq!(a[(1, 0)], ec.detunings[0]);
        assert_eq!(a[(7, 4)], 2.0 * ec.gs[1].re);
        assert_eq!(a[(6, 7)], ec.omegas[1]);
        assert_eq!(a[(0, 5)], -p.lambda);
        assert_eq!(a[(1, 4)], p.lambda);
        assert_eq!(a[(4, 1)], -p.lambda);
        assert_eq!(a[(5, 0)], p.lambda);
        // no direct optical→optical feed outside the λ pattern
        assert_eq!(a[(4, 0)], 0.0);
    }

    #[test]
    fn test_unidirectional_is_one_way() {
        let p = ParameterSet::defaults(Topology::Unidirectional);
        let mut builder = DriftBuilder::new(&p);
        let a = builder.build(&p, &sample_modes()).unwrap();
        let t = p.transfer_rate();
        assert_eq!(a[(4, 0)], -2.0 * t);
        assert_eq!(a[(5, 1)], -2.0 * t);
        for r in 0..4 {
            for col in 4..8 {
                assert_eq!(a[(r, col)], 0.0, "subsystem 1 must not see subsystem 2 at ({r},{col})");
            }
        }
    }

    #[test]
    fn test_zero_transmission_has_no_cross_drift() {
        let mut input = ParameterInput::new(Topology::Unidirectional);
        input.eta = Some(0.0);
        let p = ParameterSet::from_input(&input).unwrap();
        let mut builder = DriftBuilder::new(&p);
        let a = builder.build(&p, &sample_modes()).unwrap();
        for r in 0..8 {
            for col in 0..8 {
                if r / 4 != col / 4 {
                    assert_eq!(a[(r, col)], 0.0, "cross entry ({r},{col})");
                }
            }
        }
    }

    #[test]
    fn test_buffer_is_fully_rewritten() {
        let p = ParameterSet::defaults(Topology::Bidirectional);
        let mut builder = DriftBuilder::new(&p);
        builder.build(&p, &sample_modes()).unwrap();
        let zeros = [c(0.0, 0.0); 4];
        let reused = builder.build(&p, &zeros).unwrap().clone();
        let fresh = DriftBuilder::new(&p)
            .build(&p, &zeros)
            .unwrap()
            .clone();
        assert_eq!(reused, fresh);
    }

    #[test]
    fn test_plus_minus_is_similarity_of_unidirectional() {
        let p_uni = ParameterSet::defaults(Topology::Unidirectional);
        let mut p_pm = p_uni.clone();
        p_pm.topology = Topology::UnidirectionalPlusMinus;
        let modes = sample_modes();
        let a_uni = DriftBuilder::new(&p_uni)
            .build(&p_uni, &modes)
            .unwrap()
            .clone();
        let a_pm = DriftBuilder::new(&p_pm)
            .build(&p_pm, &modes)
            .unwrap()
            .clone();
        let t = plus_minus_transform();
        let back = &t * &a_pm * &t;
        let err = (back - a_uni).amax();
        assert!(err < 1e-12, "T A± T differs from A by {err}");
    }

    #[test]
    fn test_collective_builder_ready_after_construction() {
        let p = ParameterSet::defaults(Topology::UnidirectionalPlusMinus);
        let modes = sample_modes();
        let mut builder = DriftBuilder::new(&p);
        let first = builder.build(&p, &modes).unwrap().clone();
        let mut copy = builder.clone();
        assert_eq!(copy.build(&p, &modes).unwrap(), &first);
        assert_eq!(builder.build(&p, &modes).unwrap(), &first);
    }

    #[test]
    fn test_reduced_pattern() {
        let p = ParameterSet::defaults(Topology::UnidirectionalReduced);
        let rc = ReducedCoefficients::new(&p);
        let mut builder = DriftBuilder::new(&p);
        let a = builder.build(&p, &[c(0.0, 0.0); 2]).unwrap();
        assert_eq!(a.shape(), (4, 4));
        assert_eq!(a[(0, 0)], rc.gammas_eff[0] - p.gammas[0]);
        assert_eq!(a[(3, 1)], -rc.chi.re);
        assert_eq!(a[(2, 3)], p.delta);
        assert_eq!(a[(0, 2)], 0.0);
    }

    #[test]
    fn test_reduced_drift_filled_at_construction() {
        let p = ParameterSet::defaults(Topology::UnidirectionalReduced);
        let rc = ReducedCoefficients::new(&p);
        let mut builder = DriftBuilder::reduced(&p, &rc);
        let before = builder.matrix().clone();
        assert_eq!(before[(2, 0)], -rc.chi.re);
        assert_eq!(before[(1, 1)], rc.gammas_eff[0] - p.gammas[0]);

        let built = builder.build(&p, &[c(4.0, -3.0), c(1.0, 2.0)]).unwrap();
        assert_eq!(built, &before);
        assert_eq!(DriftBuilder::new(&p).matrix(), &before);
        assert!(matches!(
            builder.build(&p, &[c(0.0, 0.0); 4]),
            Err(QomError::Shape(_))
        ));
    }

    #[test]
    fn test_topology_mismatch_rejected() {
        let p = ParameterSet::defaults(Topology::Unidirectional);
        let mut builder = DriftBuilder::new(&ParameterSet::defaults(Topology::Bidirectional));
        assert!(builder.build(&p, &sample_modes()).is_err());
    }
}
