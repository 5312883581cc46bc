// ─────────────────────────────────────────────────────────────────────
// QOSync — Coupled Propagator
// ─────────────────────────────────────────────────────────────────────
//! Drives the mode and covariance equations together through the
//! integration service.
//!
//! Flat real state layout: the modes interleaved as `(Re, Im)` pairs,
//! followed by the covariance in column-major order. The same buffers
//! are reused for every derivative evaluation of a trajectory.

use log::{debug, info, warn};
use nalgebra::DMatrix;
use num_complex::Complex64;
use qosync_types::{QomError, QomResult, SolverConfig, TimeGrid};
use serde::{Deserialize, Serialize};

use crate::integrator::{OdeSolver, OdeSystem};
use crate::rates::CovarianceRates;
use crate::systems::QomSystem;

/// Tolerated negative excursion of a variance, relative to the largest one.
const VARIANCE_TOL: f64 = 1e-9;

/// Mode and covariance samples on a time grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub times: Vec<f64>,
    pub modes: Vec<Vec<Complex64>>,
    pub covariances: Vec<DMatrix<f64>>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Time-averaged modes over samples `[start, end)`.
    pub fn mean_modes(&self, start: usize, end: usize) -> QomResult<Vec<Complex64>> {
        if start >= end || end > self.modes.len() {
            return Err(QomError::Malformed(format!(
                "window [{start}, {end}) outside trajectory of {} samples",
                self.modes.len()
            )));
        }
        let n = self.modes[start].len();
        let mut mean = vec![Complex64::new(0.0, 0.0); n];
        for sample in &self.modes[start..end] {
            for (m, s) in mean.iter_mut().zip(sample) {
                *m += s;
            }
        }
        let count = (end - start) as f64;
        Ok(mean.into_iter().map(|m| m / count).collect())
    }
}

struct CoupledRates<'s> {
    system: &'s mut dyn QomSystem,
    modes: Vec<Complex64>,
    mode_rates: Vec<Complex64>,
    v: DMatrix<f64>,
    dv: DMatrix<f64>,
    cov: CovarianceRates,
}

impl<'s> CoupledRates<'s> {
    fn new(system: &'s mut dyn QomSystem) -> Self {
        let (m, n) = (system.n_modes(), system.n_quadratures());
        Self {
            system,
            modes: vec![Complex64::new(0.0, 0.0); m],
            mode_rates: vec![Complex64::new(0.0, 0.0); m],
            v: DMatrix::zeros(n, n),
            dv: DMatrix::zeros(n, n),
            cov: CovarianceRates::new(n),
        }
    }
}

impl OdeSystem for CoupledRates<'_> {
    fn dim(&self) -> usize {
        2 * self.modes.len() + self.v.len()
    }

    fn rates(&mut self, t: f64, y: &[f64], dy: &mut [f64]) -> QomResult<()> {
        let split = 2 * self.modes.len();
        unpack_modes(&y[..split], &mut self.modes);
        self.v.copy_from_slice(&y[split..]);

        self.system.mode_rates(t, &self.modes, &mut self.mode_rates)?;
        let (a, d) = self.system.drift_and_noise(&self.modes)?;
        self.cov.evaluate(a, d, &self.v, &mut self.dv)?;

        pack_modes(&self.mode_rates, &mut dy[..split]);
        dy[split..].copy_from_slice(self.dv.as_slice());
        Ok(())
    }
}

struct CovarianceOnly<'m> {
    a: &'m DMatrix<f64>,
    d: &'m DMatrix<f64>,
    v: DMatrix<f64>,
    dv: DMatrix<f64>,
    cov: CovarianceRates,
}

impl OdeSystem for CovarianceOnly<'_> {
    fn dim(&self) -> usize {
        self.v.len()
    }

    fn rates(&mut self, _t: f64, y: &[f64], dy: &mut [f64]) -> QomResult<()> {
        self.v.copy_from_slice(y);
        self.cov.evaluate(self.a, self.d, &self.v, &mut self.dv)?;
        dy.copy_from_slice(self.dv.as_slice());
        Ok(())
    }
}

fn pack_modes(modes: &[Complex64], out: &mut [f64]) {
    for (k, m) in modes.iter().enumerate() {
        out[2 * k] = m.re;
        out[2 * k + 1] = m.im;
    }
}

fn unpack_modes(flat: &[f64], modes: &mut [Complex64]) {
    for (k, m) in modes.iter_mut().enumerate() {
        *m = Complex64::new(flat[2 * k], flat[2 * k + 1]);
    }
}

/// Propagate from the system's own initial values.
pub fn propagate(
    system: &mut dyn QomSystem,
    grid: &TimeGrid,
    solver: &SolverConfig,
) -> QomResult<Trajectory> {
    let (modes_0, covariance_0) = system.initial_values();
    propagate_from(system, &modes_0, &covariance_0, grid, solver)
}

/// Propagate modes and covariance together from `(modes_0, covariance_0)`.
pub fn propagate_from(
    system: &mut dyn QomSystem,
    modes_0: &[Complex64],
    covariance_0: &DMatrix<f64>,
    grid: &TimeGrid,
    solver: &SolverConfig,
) -> QomResult<Trajectory> {
    grid.validate()?;
    let (m, n) = (system.n_modes(), system.n_quadratures());
    if modes_0.len() != m || covariance_0.shape() != (n, n) {
        return Err(QomError::Shape(format!(
            "initial values ({} modes, {:?} covariance) do not match {:?}",
            modes_0.len(),
            covariance_0.shape(),
            system.topology()
        )));
    }
    let topology = system.topology();
    debug!(
        "propagating {topology:?} over [{}, {}] with {} samples ({:?})",
        grid.t_min, grid.t_max, grid.t_dim, solver.method
    );

    let mut y0 = vec![0.0; 2 * m + n * n];
    pack_modes(modes_0, &mut y0[..2 * m]);
    y0[2 * m..].copy_from_slice(covariance_0.as_slice());

    let times = grid.times();
    let mut ode = OdeSolver::new(*solver)?;
    let mut rates = CoupledRates::new(system);
    let states = ode.integrate(&mut rates, &y0, &times).map_err(|e| {
        warn!("{topology:?} trajectory failed: {e}");
        e
    })?;

    let mut modes = Vec::with_capacity(states.len());
    let mut covariances = Vec::with_capacity(states.len());
    for (state, &t) in states.iter().zip(&times) {
        let mut sample = vec![Complex64::new(0.0, 0.0); m];
        unpack_modes(&state[..2 * m], &mut sample);
        let v = DMatrix::from_column_slice(n, n, &state[2 * m..]);
        check_variances(&v, t)?;
        modes.push(sample);
        covariances.push(v);
    }
    info!(
        "{topology:?} trajectory complete: {} samples, {} steps",
        times.len(),
        ode.steps_taken()
    );
    Ok(Trajectory {
        times,
        modes,
        covariances,
    })
}

/// Real-valued covariance propagation with A and D held fixed.
pub fn propagate_covariance(
    a: &DMatrix<f64>,
    d: &DMatrix<f64>,
    covariance_0: &DMatrix<f64>,
    grid: &TimeGrid,
    solver: &SolverConfig,
) -> QomResult<Vec<DMatrix<f64>>> {
    grid.validate()?;
    let n = covariance_0.nrows();
    if !covariance_0.is_square() {
        return Err(QomError::Shape(format!(
            "covariance must be square, got {:?}",
            covariance_0.shape()
        )));
    }
    let mut system = CovarianceOnly {
        a,
        d,
        v: DMatrix::zeros(n, n),
        dv: DMatrix::zeros(n, n),
        cov: CovarianceRates::new(n),
    };
    let times = grid.times();
    let mut ode = OdeSolver::new(*solver)?;
    let states = ode
        .integrate(&mut system, covariance_0.as_slice(), &times)
        .map_err(|e| {
            warn!("covariance propagation failed: {e}");
            e
        })?;
    let mut out = Vec::with_capacity(states.len());
    for (state, &t) in states.iter().zip(&times) {
        let v = DMatrix::from_column_slice(n, n, state);
        check_variances(&v, t)?;
        out.push(v);
    }
    Ok(out)
}

fn check_variances(v: &DMatrix<f64>, t: f64) -> QomResult<()> {
    let diag = v.diagonal();
    let scale = diag.amax().max(1.0);
    match diag.iter().position(|&x| x < -VARIANCE_TOL * scale) {
        Some(i) => {
            warn!("negative variance V[{i}][{i}] = {:.3e} at t = {t:.6e}", diag[i]);
            Err(QomError::Integration(format!(
                "negative variance V[{i}][{i}] = {:.3e} at t = {t:.6e}",
                diag[i]
            )))
        }
        None => Ok(()),
    }
}
