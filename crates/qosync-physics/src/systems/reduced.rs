// ─────────────────────────────────────────────────────────────────────
// QOSync — Reduced Unidirectional Model
// ─────────────────────────────────────────────────────────────────────
//! Unidirectional network with the cavity fields adiabatically
//! eliminated. Only the two mechanical quadrature pairs fluctuate; the
//! effective damping Γᵢ and cross coefficient χ follow algebraically
//! from the steady cavity amplitudes, so A and D are constant. The
//! coefficients are computed once per system and shared by both.

use nalgebra::DMatrix;
use num_complex::Complex64;
use qosync_types::{ParameterSet, QomError, QomResult, Topology};

use super::QomSystem;
use crate::couplings::{reduced_steady_alphas, ReducedCoefficients};
use crate::drift::DriftBuilder;
use crate::layout::VACUUM_VARIANCE;
use crate::noise::build_reduced_noise;
use crate::rates::reduced_mode_rates;

#[derive(Debug, Clone)]
pub struct UnidirectionalReduced {
    params: ParameterSet,
    coefficients: ReducedCoefficients,
    drift: DriftBuilder,
    noise: DMatrix<f64>,
}

impl UnidirectionalReduced {
    pub fn new(params: ParameterSet) -> QomResult<Self> {
        if params.topology != Topology::UnidirectionalReduced {
            return Err(QomError::Config(format!(
                "expected UnidirectionalReduced parameters, got {:?}",
                params.topology
            )));
        }
        params.validate()?;
        let coefficients = ReducedCoefficients::new(&params);
        let noise = build_reduced_noise(&params, &coefficients)?;
        Ok(Self {
            drift: DriftBuilder::reduced(&params, &coefficients),
            coefficients,
            noise,
            params,
        })
    }

    pub fn coefficients(&self) -> &ReducedCoefficients {
        &self.coefficients
    }
}

impl QomSystem for UnidirectionalReduced {
    fn params(&self) -> &ParameterSet {
        &self.params
    }

    fn mode_rates(&self, _t: f64, modes: &[Complex64], out: &mut [Complex64]) -> QomResult<()> {
        reduced_mode_rates(&self.params, modes, out)
    }

    fn build_drift(&mut self, modes: &[Complex64]) -> QomResult<&DMatrix<f64>> {
        self.drift.build(&self.params, modes)
    }

    fn noise(&self) -> &DMatrix<f64> {
        &self.noise
    }

    fn drift_and_noise(
        &mut self,
        modes: &[Complex64],
    ) -> QomResult<(&DMatrix<f64>, &DMatrix<f64>)> {
        let a = self.drift.build(&self.params, modes)?;
        Ok((a, &self.noise))
    }

    fn initial_values(&self) -> (Vec<Complex64>, DMatrix<f64>) {
        let mut v = DMatrix::zeros(4, 4);
        for i in 0..2 {
            let var = self.params.n_ths[i] + VACUUM_VARIANCE;
            v[(2 * i, 2 * i)] = var;
            v[(2 * i + 1, 2 * i + 1)] = var;
        }
        (vec![Complex64::new(0.0, 0.0); 2], v)
    }

    fn stationary_modes(&self) -> QomResult<Vec<Complex64>> {
        Ok(reduced_steady_alphas(&self.params).to_vec())
    }

    fn mechanical_pair(&self) -> [usize; 2] {
        [0, 1]
    }
}
