// ─────────────────────────────────────────────────────────────────────
// QOSync — Topology Systems
// ─────────────────────────────────────────────────────────────────────
//! One polymorphic interface over the four coupling topologies.
//!
//! A system owns its validated parameters, its drift buffer and its
//! (mode-independent) noise matrix. Instances are never shared between
//! concurrently running trajectories: each worker builds its own.

mod bidirectional;
mod reduced;
mod unidirectional;

pub use bidirectional::Bidirectional;
pub use reduced::UnidirectionalReduced;
pub use unidirectional::Unidirectional;

use log::debug;
use nalgebra::DMatrix;
use num_complex::Complex64;
use qosync_types::{ParameterSet, QomResult, Topology};

use crate::layout::{
    block_offset, mechanical_mode, transverse_block, N_SUBSYSTEMS, P, Q, VACUUM_VARIANCE, X, Y,
};

/// Capability set shared by every topology.
pub trait QomSystem: Send {
    fn params(&self) -> &ParameterSet;

    fn topology(&self) -> Topology {
        self.params().topology
    }

    /// Length of the mode vector.
    fn n_modes(&self) -> usize {
        self.topology().n_modes()
    }

    /// Side length of the covariance matrix.
    fn n_quadratures(&self) -> usize {
        self.topology().n_quadratures()
    }

    /// Complex mode rates at `modes` into `out`.
    fn mode_rates(&self, t: f64, modes: &[Complex64], out: &mut [Complex64]) -> QomResult<()>;

    /// Drift matrix at `modes`, written into the system's own buffer.
    fn build_drift(&mut self, modes: &[Complex64]) -> QomResult<&DMatrix<f64>>;

    /// Noise matrix (constant for the parameter set).
    fn noise(&self) -> &DMatrix<f64>;

    /// Drift at `modes` together with the noise, borrowed at once.
    fn drift_and_noise(
        &mut self,
        modes: &[Complex64],
    ) -> QomResult<(&DMatrix<f64>, &DMatrix<f64>)>;

    /// Initial modes and covariance of a trajectory.
    fn initial_values(&self) -> (Vec<Complex64>, DMatrix<f64>);

    /// Modes at which all mode rates vanish.
    fn stationary_modes(&self) -> QomResult<Vec<Complex64>>;

    /// Covariance "mode" indices of the two mechanical oscillators.
    fn mechanical_pair(&self) -> [usize; 2] {
        [mechanical_mode(0), mechanical_mode(1)]
    }

    /// Whether [`QomSystem::build_drift`] works in the collective basis.
    fn drift_is_collective(&self) -> bool {
        false
    }

    /// Drift block of `u₁ − u₂` at `modes`, the linearization transverse
    /// to the synchronization manifold.
    fn transverse_drift(&mut self, modes: &[Complex64]) -> QomResult<DMatrix<f64>> {
        let collective = self.drift_is_collective();
        transverse_block(self.build_drift(modes)?, collective)
    }

    /// Covariance expressed in the lab quadrature basis.
    fn to_lab_basis(&self, covariance: &DMatrix<f64>) -> DMatrix<f64> {
        covariance.clone()
    }
}

/// Build the system selected by `params.topology`.
pub fn build_system(params: &ParameterSet) -> QomResult<Box<dyn QomSystem>> {
    params.validate()?;
    debug!("building {:?} system", params.topology);
    let system: Box<dyn QomSystem> = match params.topology {
        Topology::Bidirectional => Box::new(Bidirectional::new(params.clone())?),
        Topology::Unidirectional | Topology::UnidirectionalPlusMinus => {
            Box::new(Unidirectional::new(params.clone())?)
        }
        Topology::UnidirectionalReduced => Box::new(UnidirectionalReduced::new(params.clone())?),
    };
    Ok(system)
}

/// Vacuum/thermal block-diagonal covariance of the full topologies.
pub(crate) fn thermal_covariance(params: &ParameterSet) -> DMatrix<f64> {
    let n = N_SUBSYSTEMS * crate::layout::BLOCK;
    let mut v = DMatrix::zeros(n, n);
    for i in 0..N_SUBSYSTEMS {
        let o = block_offset(i);
        v[(o + X, o + X)] = VACUUM_VARIANCE;
        v[(o + Y, o + Y)] = VACUUM_VARIANCE;
        v[(o + Q, o + Q)] = params.n_ths[i] + VACUUM_VARIANCE;
        v[(o + P, o + P)] = params.n_ths[i] + VACUUM_VARIANCE;
    }
    v
}
