// ─────────────────────────────────────────────────────────────────────
// QOSync — Bidirectionally Coupled Cavities
// ─────────────────────────────────────────────────────────────────────

use nalgebra::DMatrix;
use num_complex::Complex64;
use qosync_types::{ParameterSet, QomError, QomResult, Topology};

use super::{thermal_covariance, QomSystem};
use crate::drift::DriftBuilder;
use crate::noise::build_noise;
use crate::rates::mode_rates;
use crate::stationary::fixed_point_modes;

/// Two cavities exchanging photons through a channel of strength λ.
#[derive(Debug, Clone)]
pub struct Bidirectional {
    params: ParameterSet,
    drift: DriftBuilder,
    noise: DMatrix<f64>,
}

impl Bidirectional {
    pub fn new(params: ParameterSet) -> QomResult<Self> {
        if params.topology != Topology::Bidirectional {
            return Err(QomError::Config(format!(
                "expected Bidirectional parameters, got {:?}",
                params.topology
            )));
        }
        params.validate()?;
        let noise = build_noise(&params)?;
        Ok(Self {
            drift: DriftBuilder::new(&params),
            noise,
            params,
        })
    }
}

impl QomSystem for Bidirectional {
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
        (
            vec![Complex64::new(0.0, 0.0); self.n_modes()],
            thermal_covariance(&self.params),
        )
    }

    fn stationary_modes(&self) -> QomResult<Vec<Complex64>> {
        fixed_point_modes(&self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qosync_types::ParameterInput;

    #[test]
    fn test_rejects_foreign_topology() {
        let p = ParameterSet::defaults(Topology::Unidirectional);
        assert!(Bidirectional::new(p).is_err());
    }

    #[test]
    fn test_stationary_modes_zero_rates() {
        let mut input = ParameterInput::new(Topology::Bidirectional);
        input.amp_drive = Some(2.0);
        let system = Bidirectional::new(ParameterSet::from_input(&input).unwrap()).unwrap();
        let modes = system.stationary_modes().unwrap();
        let mut out = vec![Complex64::new(0.0, 0.0); 4];
        system.mode_rates(0.0, &modes, &mut out).unwrap();
        let worst = out.iter().map(|r| r.norm()).fold(0.0, f64::max);
        assert!(worst < 1e-9, "max |rate| at stationary modes = {worst:.3e}");
    }
}
