// ─────────────────────────────────────────────────────────────────────
// QOSync — Unidirectionally Coupled Cavities
// ─────────────────────────────────────────────────────────────────────
//! Cavity 1 output is fed into cavity 2 through a channel of transmission
//! η. The plus-minus variant propagates the same dynamics with the
//! fluctuations expressed in the collective basis `u± = (u₁ ± u₂)/√2`;
//! its mode vector stays in the lab basis.

use nalgebra::DMatrix;
use num_complex::Complex64;
use qosync_types::{ParameterSet, QomError, QomResult, Topology};

use super::{thermal_covariance, QomSystem};
use crate::drift::DriftBuilder;
use crate::layout::plus_minus_transform;
use crate::noise::build_noise;
use crate::rates::mode_rates;
use crate::stationary::fixed_point_modes;

#[derive(Debug, Clone)]
pub struct Unidirectional {
    params: ParameterSet,
    drift: DriftBuilder,
    noise: DMatrix<f64>,
    // Present only in the collective basis.
    transform: Option<DMatrix<f64>>,
}

impl Unidirectional {
    pub fn new(params: ParameterSet) -> QomResult<Self> {
        let transform = match params.topology {
            Topology::Unidirectional => None,
            Topology::UnidirectionalPlusMinus => Some(plus_minus_transform()),
            other => {
                return Err(QomError::Config(format!(
                    "expected unidirectional parameters, got {other:?}"
                )))
            }
        };
        params.validate()?;
        let noise = build_noise(&params)?;
        Ok(Self {
            drift: DriftBuilder::new(&params),
            noise,
            transform,
            params,
        })
    }

    pub fn is_collective(&self) -> bool {
        self.transform.is_some()
    }
}

impl QomSystem for Unidirectional {
    fn params(&self) -> &ParameterSet {
        &self.params
    }

    fn mode_rates(&self, _t: f64, modes: &[Complex64], out: &mut [Complex64]) -> QomResult<()> {
        mode_rates(&self.params, modes, out)
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
        let modes = vec![Complex64::new(0.0, 0.0); self.n_modes()];
        let lab = thermal_covariance(&self.params);
        let covariance = match &self.transform {
            Some(t) => t * lab * t,
            None => lab,
        };
        (modes, covariance)
    }

    fn stationary_modes(&self) -> QomResult<Vec<Complex64>> {
        fixed_point_modes(&self.params)
    }

    fn drift_is_collective(&self) -> bool {
        self.is_collective()
    }

    fn to_lab_basis(&self, covariance: &DMatrix<f64>) -> DMatrix<f64> {
        match &self.transform {
            Some(t) => t * covariance * t,
            None => covariance.clone(),
        }
    }
}
