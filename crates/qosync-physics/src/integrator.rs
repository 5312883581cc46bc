// ─────────────────────────────────────────────────────────────────────
// QOSync — ODE Integration Service
// ─────────────────────────────────────────────────────────────────────
//! Real-valued initial value solver used by the propagator.
//!
//! Two methods:
//!   - Dormand–Prince 5(4) with embedded error control (FSAL). Steps are
//!     clipped to land exactly on every output time.
//!   - Classical RK4 with a fixed number of substeps per output interval.
//!
//! Stage buffers are allocated once per solver and reused across runs.
//! Any failure is fatal for the trajectory; nothing is truncated.

use log::warn;
use qosync_types::{OdeMethod, QomError, QomResult, SolverConfig};

/// A real ODE system `dy/dt = f(t, y)`.
pub trait OdeSystem {
    fn dim(&self) -> usize;
    fn rates(&mut self, t: f64, y: &[f64], dy: &mut [f64]) -> QomResult<()>;
}

// Dormand–Prince tableau.
const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;
const A71: f64 = 35.0 / 384.0;
const A73: f64 = 500.0 / 1113.0;
const A74: f64 = 125.0 / 192.0;
const A75: f64 = -2187.0 / 6784.0;
const A76: f64 = 11.0 / 84.0;

// 5th minus embedded 4th order weights.
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 10.0;

/// Reusable solver with owned stage buffers.
#[derive(Debug, Clone)]
pub struct OdeSolver {
    config: SolverConfig,
    k: [Vec<f64>; 7],
    y_stage: Vec<f64>,
    y_new: Vec<f64>,
    steps_taken: usize,
}

impl OdeSolver {
    pub fn new(config: SolverConfig) -> QomResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            k: Default::default(),
            y_stage: Vec::new(),
            y_new: Vec::new(),
            steps_taken: 0,
        })
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Internal steps taken by the last run.
    pub fn steps_taken(&self) -> usize {
        self.steps_taken
    }

    /// Integrate from `y0` at `times[0]`, returning the state at every time.
    pub fn integrate<S: OdeSystem + ?Sized>(
        &mut self,
        system: &mut S,
        y0: &[f64],
        times: &[f64],
    ) -> QomResult<Vec<Vec<f64>>> {
        let n = system.dim();
        if y0.len() != n {
            return Err(QomError::Shape(format!(
                "initial state has {} entries, system expects {n}",
                y0.len()
            )));
        }
        if times.is_empty() {
            return Err(QomError::Config("empty output time grid".to_string()));
        }
        if times.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(QomError::Config(
                "output times must be strictly increasing".to_string(),
            ));
        }
        check_finite(y0, times[0], "initial state")?;

        for buf in self.k.iter_mut() {
            buf.clear();
            buf.resize(n, 0.0);
        }
        self.y_stage.clear();
        self.y_stage.resize(n, 0.0);
        self.y_new.clear();
        self.y_new.resize(n, 0.0);
        self.steps_taken = 0;

        let mut out = Vec::with_capacity(times.len());
        out.push(y0.to_vec());
        let mut y = y0.to_vec();

        match self.config.method {
            OdeMethod::DormandPrince45 => self.run_dopri(system, &mut y, times, &mut out)?,
            OdeMethod::Rk4 => self.run_rk4(system, &mut y, times, &mut out)?,
        }
        Ok(out)
    }

    fn run_rk4<S: OdeSystem + ?Sized>(
        &mut self,
        system: &mut S,
        y: &mut [f64],
        times: &[f64],
        out: &mut Vec<Vec<f64>>,
    ) -> QomResult<()> {
        let n = y.len();
        let substeps = self.config.substeps;
        for w in times.windows(2) {
            let h = (w[1] - w[0]) / substeps as f64;
            for s in 0..substeps {
                let t = w[0] + s as f64 * h;
                self.bump_steps(t)?;

                let [k1, k2, k3, k4, ..] = &mut self.k;
                eval(system, t, y, k1)?;
                for i in 0..n {
                    self.y_stage[i] = y[i] + 0.5 * h * k1[i];
                }
                eval(system, t + 0.5 * h, &self.y_stage, k2)?;
                for i in 0..n {
                    self.y_stage[i] = y[i] + 0.5 * h * k2[i];
                }
                eval(system, t + 0.5 * h, &self.y_stage, k3)?;
                for i in 0..n {
                    self.y_stage[i] = y[i] + h * k3[i];
                }
                eval(system, t + h, &self.y_stage, k4)?;
                for i in 0..n {
                    y[i] += h / 6.0 * (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]);
                }
            }
            check_finite(y, w[1], "state")?;
            out.push(y.to_vec());
        }
        Ok(())
    }

    fn run_dopri<S: OdeSystem + ?Sized>(
        &mut self,
        system: &mut S,
        y: &mut Vec<f64>,
        times: &[f64],
        out: &mut Vec<Vec<f64>>,
    ) -> QomResult<()> {
        let mut t = times[0];
        eval(system, t, y, &mut self.k[0])?;
        let mut h = self.initial_step(system, t, y, times[times.len() - 1] - t)?;

        for &t_out in &times[1..] {
            while t < t_out {
                let remaining = t_out - t;
                let landing = h * (1.0 + 1e-10) >= remaining;
                let h_try = if landing { remaining } else { h };
                if h_try <= 16.0 * f64::EPSILON * t.abs().max(1.0) {
                    warn!("step size underflow at t = {t:.6e} (h = {h_try:.3e})");
                    return Err(QomError::Integration(format!(
                        "step size underflow at t = {t:.6e} (h = {h_try:.3e})"
                    )));
                }
                self.bump_steps(t)?;

                let err = self.dopri_step(system, t, y, h_try)?;
                let factor = if err == 0.0 {
                    MAX_FACTOR
                } else {
                    (SAFETY * err.powf(-0.2)).clamp(MIN_FACTOR, MAX_FACTOR)
                };

                if err <= 1.0 {
                    t = if landing { t_out } else { t + h_try };
                    std::mem::swap(y, &mut self.y_new);
                    // FSAL: last stage is the derivative at the new point
                    let (head, tail) = self.k.split_at_mut(6);
                    head[0].copy_from_slice(&tail[0]);
                    check_finite(y, t, "state")?;
                    // a clipped landing step says nothing about the natural step size
                    if !landing || factor < 1.0 {
                        h = h_try * factor;
                    }
                } else {
                    h = h_try * factor.min(1.0);
                }
            }
            out.push(y.clone());
        }
        Ok(())
    }

    /// One Dormand–Prince step from `(t, y)`; `k[0]` must hold f(t, y).
    /// Leaves the proposal in `y_new` and returns the scaled error norm.
    fn dopri_step<S: OdeSystem + ?Sized>(
        &mut self,
        system: &mut S,
        t: f64,
        y: &[f64],
        h: f64,
    ) -> QomResult<f64> {
        let n = y.len();
        let (rtol, atol) = (self.config.rtol, self.config.atol);
        let [k1, k2, k3, k4, k5, k6, k7] = &mut self.k;
        let ys = &mut self.y_stage;

        for i in 0..n {
            ys[i] = y[i] + h * A21 * k1[i];
        }
        eval(system, t + C2 * h, ys, k2)?;
        for i in 0..n {
            ys[i] = y[i] + h * (A31 * k1[i] + A32 * k2[i]);
        }
        eval(system, t + C3 * h, ys, k3)?;
        for i in 0..n {
            ys[i] = y[i] + h * (A41 * k1[i] + A42 * k2[i] + A43 * k3[i]);
        }
        eval(system, t + C4 * h, ys, k4)?;
        for i in 0..n {
            ys[i] = y[i] + h * (A51 * k1[i] + A52 * k2[i] + A53 * k3[i] + A54 * k4[i]);
        }
        eval(system, t + C5 * h, ys, k5)?;
        for i in 0..n {
            ys[i] = y[i]
                + h * (A61 * k1[i] + A62 * k2[i] + A63 * k3[i] + A64 * k4[i] + A65 * k5[i]);
        }
        eval(system, t + h, ys, k6)?;
        for i in 0..n {
            self.y_new[i] = y[i]
                + h * (A71 * k1[i] + A73 * k3[i] + A74 * k4[i] + A75 * k5[i] + A76 * k6[i]);
        }
        eval(system, t + h, &self.y_new, k7)?;

        let mut acc = 0.0;
        for i in 0..n {
            let e = h
                * (E1 * k1[i] + E3 * k3[i] + E4 * k4[i] + E5 * k5[i] + E6 * k6[i] + E7 * k7[i]);
            let scale = atol + rtol * y[i].abs().max(self.y_new[i].abs());
            acc += (e / scale).powi(2);
        }
        let err = (acc / n.max(1) as f64).sqrt();
        if !err.is_finite() {
            return Err(QomError::Integration(format!(
                "non-finite error estimate at t = {t:.6e}"
            )));
        }
        Ok(err)
    }

    /// Starting step from the local derivative scales; `k[0]` holds f(t, y).
    fn initial_step<S: OdeSystem + ?Sized>(
        &mut self,
        system: &mut S,
        t: f64,
        y: &[f64],
        span: f64,
    ) -> QomResult<f64> {
        let n = y.len();
        let (rtol, atol) = (self.config.rtol, self.config.atol);
        let scale = |v: f64| atol + rtol * v.abs();
        let rms = |f: &dyn Fn(usize) -> f64| {
            ((0..n).map(|i| f(i).powi(2)).sum::<f64>() / n.max(1) as f64).sqrt()
        };

        let f0 = &self.k[0];
        let d0 = rms(&|i| y[i] / scale(y[i]));
        let d1 = rms(&|i| f0[i] / scale(y[i]));
        let h0 = if d0 < 1e-5 || d1 < 1e-5 {
            1e-6
        } else {
            0.01 * d0 / d1
        }
        .min(span);

        for i in 0..n {
            self.y_stage[i] = y[i] + h0 * f0[i];
        }
        let [k1, k2, ..] = &mut self.k;
        eval(system, t + h0, &self.y_stage, k2)?;
        let k1 = &*k1;
        let k2 = &*k2;
        let d2 = rms(&|i| (k2[i] - k1[i]) / scale(y[i])) / h0;

        let h1 = if d1.max(d2) <= 1e-15 {
            (h0 * 1e-3).max(1e-6)
        } else {
            (0.01 / d1.max(d2)).powf(0.2)
        };
        Ok((100.0 * h0).min(h1).min(span))
    }

    fn bump_steps(&mut self, t: f64) -> QomResult<()> {
        self.steps_taken += 1;
        if self.steps_taken > self.config.max_steps {
            warn!(
                "step budget of {} exhausted at t = {t:.6e}",
                self.config.max_steps
            );
            return Err(QomError::Integration(format!(
                "step budget of {} exhausted at t = {t:.6e}",
                self.config.max_steps
            )));
        }
        Ok(())
    }
}

fn eval<S: OdeSystem + ?Sized>(
    system: &mut S,
    t: f64,
    y: &[f64],
    dy: &mut [f64],
) -> QomResult<()> {
    system.rates(t, y, dy)?;
    check_finite(dy, t, "derivative")
}

fn check_finite(v: &[f64], t: f64, what: &str) -> QomResult<()> {
    match v.iter().position(|x| !x.is_finite()) {
        Some(i) => Err(QomError::Integration(format!(
            "non-finite {what} component {i} at t = {t:.6e}"
        ))),
        None => Ok(()),
    }
}
