// ─────────────────────────────────────────────────────────────────────
// QOSync — Parameter Set and Run Configuration
// ─────────────────────────────────────────────────────────────────────
//! Validated configuration for one dynamical evaluation.
//!
//! `ParameterInput` is the raw mapping handed over by a caller (every
//! physical field optional). `ParameterSet::from_input` is the only place
//! defaults are applied, and only to absent fields: an explicit `0.0`
//! is kept as given.

use serde::{Deserialize, Serialize};

use crate::error::{QomError, QomResult};

/// Coupling topology of the two cavities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    /// Both optical modes coupled through a shared channel of strength λ.
    Bidirectional,
    /// Cavity 1 output drives cavity 2 with transmission η.
    Unidirectional,
    /// Unidirectional, optical modes adiabatically eliminated.
    UnidirectionalReduced,
    /// Unidirectional, correlations in the collective (±) quadrature basis.
    UnidirectionalPlusMinus,
}

impl Topology {
    pub fn is_unidirectional(self) -> bool {
        !matches!(self, Topology::Bidirectional)
    }

    /// Number of complex mode amplitudes propagated.
    pub fn n_modes(self) -> usize {
        match self {
            Topology::UnidirectionalReduced => 2,
            _ => 4,
        }
    }

    /// Side length of the covariance / drift / noise matrices.
    pub fn n_quadratures(self) -> usize {
        2 * self.n_modes()
    }

    fn default_delta(self) -> f64 {
        match self {
            Topology::UnidirectionalReduced => 0.005,
            _ => 0.01,
        }
    }
}

/// Raw, partially specified parameters (e.g. parsed from JSON).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterInput {
    pub topology: Topology,
    pub amp_drive: Option<f64>,
    pub detuning_sign: Option<f64>,
    pub delta: Option<f64>,
    pub eta: Option<f64>,
    pub lambda: Option<f64>,
    pub g0s: Option<[f64; 2]>,
    pub gammas: Option<[f64; 2]>,
    pub kappas: Option<[f64; 2]>,
    pub n_ths: Option<[f64; 2]>,
    pub omega_m: Option<f64>,
}

impl ParameterInput {
    /// Input with every field absent (all defaults).
    pub fn new(topology: Topology) -> Self {
        Self {
            topology,
            amp_drive: None,
            detuning_sign: None,
            delta: None,
            eta: None,
            lambda: None,
            g0s: None,
            gammas: None,
            kappas: None,
            n_ths: None,
            omega_m: None,
        }
    }
}

/// Validated, fully populated parameters for one topology.
///
/// Read-only during a trajectory evaluation. All rates are normalized to
/// the left mechanical frequency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub topology: Topology,
    /// Laser drive amplitude A_l.
    pub amp_drive: f64,
    /// Sign of the laser detuning (±1).
    pub detuning_sign: f64,
    /// Mechanical frequency mismatch ω_mR − ω_mL.
    pub delta: f64,
    /// Channel transmission (unidirectional variants; 0 otherwise).
    pub eta: f64,
    /// Optical channel coupling (bidirectional; 0 otherwise).
    pub lambda: f64,
    pub g0s: [f64; 2],
    pub gammas: [f64; 2],
    pub kappas: [f64; 2],
    pub n_ths: [f64; 2],
    pub omega_m: f64,
}

impl ParameterSet {
    /// Apply per-topology defaults to absent fields and validate.
    pub fn from_input(input: &ParameterInput) -> QomResult<Self> {
        let topology = input.topology;

        if topology.is_unidirectional() && input.lambda.is_some() {
            return Err(QomError::Config(format!(
                "lambda is not a parameter of the {topology:?} topology"
            )));
        }
        if !topology.is_unidirectional() && input.eta.is_some() {
            return Err(QomError::Config(
                "eta is not a parameter of the Bidirectional topology".to_string(),
            ));
        }

        let params = Self::fill_defaults(input);
        params.validate()?;
        Ok(params)
    }

    /// All defaults for a topology.
    pub fn defaults(topology: Topology) -> Self {
        Self::fill_defaults(&ParameterInput::new(topology))
    }

    fn fill_defaults(input: &ParameterInput) -> Self {
        let topology = input.topology;
        Self {
            topology,
            amp_drive: input.amp_drive.unwrap_or(52.0),
            detuning_sign: input.detuning_sign.unwrap_or(1.0),
            delta: input.delta.unwrap_or(topology.default_delta()),
            eta: if topology.is_unidirectional() {
                input.eta.unwrap_or(0.75)
            } else {
                0.0
            },
            lambda: if topology.is_unidirectional() {
                0.0
            } else {
                input.lambda.unwrap_or(0.075)
            },
            g0s: input.g0s.unwrap_or([0.005, 0.005]),
            gammas: input.gammas.unwrap_or([0.005, 0.005]),
            kappas: input.kappas.unwrap_or([0.15, 0.15]),
            n_ths: input.n_ths.unwrap_or([0.0, 0.0]),
            omega_m: input.omega_m.unwrap_or(1.0),
        }
    }

    /// Validate ranges of every field.
    pub fn validate(&self) -> QomResult<()> {
        let scalars = [
            ("amp_drive", self.amp_drive),
            ("detuning_sign", self.detuning_sign),
            ("delta", self.delta),
            ("eta", self.eta),
            ("lambda", self.lambda),
            ("omega_m", self.omega_m),
        ];
        for (name, v) in scalars {
            if !v.is_finite() {
                return Err(QomError::Config(format!("{name} must be finite, got {v}")));
            }
        }
        let pairs = [
            ("g0s", self.g0s),
            ("gammas", self.gammas),
            ("kappas", self.kappas),
            ("n_ths", self.n_ths),
        ];
        for (name, pair) in pairs {
            if pair.iter().any(|v| !v.is_finite()) {
                return Err(QomError::Config(format!(
                    "{name} must be finite, got {pair:?}"
                )));
            }
        }

        if self.detuning_sign != 1.0 && self.detuning_sign != -1.0 {
            return Err(QomError::Config(format!(
                "detuning_sign must be +1 or -1, got {}",
                self.detuning_sign
            )));
        }
        if self.amp_drive < 0.0 {
            return Err(QomError::Config(format!(
                "amp_drive must be >= 0, got {}",
                self.amp_drive
            )));
        }
        if self.omega_m <= 0.0 {
            return Err(QomError::Config(format!(
                "omega_m must be > 0, got {}",
                self.omega_m
            )));
        }
        if self.omega_m + self.delta <= 0.0 {
            return Err(QomError::Config(format!(
                "omega_m + delta must be > 0, got {} + {}",
                self.omega_m, self.delta
            )));
        }
        if !(0.0..=1.0).contains(&self.eta) {
            return Err(QomError::Config(format!(
                "eta must be in [0, 1], got {}",
                self.eta
            )));
        }
        if self.kappas.iter().any(|&k| k <= 0.0) {
            return Err(QomError::Config(format!(
                "kappas must be > 0, got {:?}",
                self.kappas
            )));
        }
        if self.gammas.iter().any(|&g| g <= 0.0) {
            return Err(QomError::Config(format!(
                "gammas must be > 0, got {:?}",
                self.gammas
            )));
        }
        if self.g0s.iter().any(|&g| g < 0.0) {
            return Err(QomError::Config(format!(
                "g0s must be >= 0, got {:?}",
                self.g0s
            )));
        }
        if self.n_ths.iter().any(|&n| n < 0.0) {
            return Err(QomError::Config(format!(
                "n_ths must be >= 0, got {:?}",
                self.n_ths
            )));
        }
        Ok(())
    }

    /// Load from a JSON mapping (absent fields take defaults).
    pub fn from_json(json: &str) -> QomResult<Self> {
        let input: ParameterInput = serde_json::from_str(json)
            .map_err(|e| QomError::Config(format!("JSON parse error: {e}")))?;
        Self::from_input(&input)
    }

    /// Compact JSON rendering, used to tag failed evaluations.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("<unserializable: {e}>"))
    }

    /// Mechanical frequencies [ω_mL, ω_mL + δ].
    pub fn omega_ms(&self) -> [f64; 2] {
        [self.omega_m, self.omega_m + self.delta]
    }

    /// Bare laser detunings Δ₀ᵢ = sign · ωᵢ.
    pub fn bare_detunings(&self) -> [f64; 2] {
        let w = self.omega_ms();
        [self.detuning_sign * w[0], self.detuning_sign * w[1]]
    }

    /// Beamsplitter transfer rate √(η κ₁ κ₂).
    pub fn transfer_rate(&self) -> f64 {
        (self.eta * self.kappas[0] * self.kappas[1]).sqrt()
    }

    /// External drive reaching cavity 2 in the unidirectional layout.
    pub fn injected_drive(&self) -> f64 {
        (self.eta.sqrt() + (1.0 - self.eta).sqrt()) * self.amp_drive
    }
}

/// Uniform time grid `linspace(t_min, t_max, t_dim)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeGrid {
    pub t_min: f64,
    pub t_max: f64,
    pub t_dim: usize,
}

impl Default for TimeGrid {
    fn default() -> Self {
        Self {
            t_min: 0.0,
            t_max: 1000.0,
            t_dim: 10001,
        }
    }
}

impl TimeGrid {
    pub fn new(t_min: f64, t_max: f64, t_dim: usize) -> QomResult<Self> {
        let grid = Self { t_min, t_max, t_dim };
        grid.validate()?;
        Ok(grid)
    }

    pub fn validate(&self) -> QomResult<()> {
        if !self.t_min.is_finite() || !self.t_max.is_finite() {
            return Err(QomError::Config(format!(
                "time grid bounds must be finite, got [{}, {}]",
                self.t_min, self.t_max
            )));
        }
        if self.t_max <= self.t_min {
            return Err(QomError::Config(format!(
                "t_max must exceed t_min, got [{}, {}]",
                self.t_min, self.t_max
            )));
        }
        if self.t_dim < 2 {
            return Err(QomError::Config(format!(
                "t_dim must be >= 2, got {}",
                self.t_dim
            )));
        }
        Ok(())
    }

    pub fn dt(&self) -> f64 {
        (self.t_max - self.t_min) / (self.t_dim - 1) as f64
    }

    pub fn times(&self) -> Vec<f64> {
        let dt = self.dt();
        (0..self.t_dim)
            .map(|k| {
                if k + 1 == self.t_dim {
                    self.t_max
                } else {
                    self.t_min + k as f64 * dt
                }
            })
            .collect()
    }
}

/// Numerical method of the integration service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OdeMethod {
    /// Adaptive Dormand–Prince 5(4).
    DormandPrince45,
    /// Classical Runge–Kutta with fixed substeps per grid interval.
    Rk4,
}

/// Integration-service settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    pub method: OdeMethod,
    /// Relative tolerance (adaptive methods).
    pub rtol: f64,
    /// Absolute tolerance (adaptive methods).
    pub atol: f64,
    /// Total step budget for one trajectory.
    pub max_steps: usize,
    /// Substeps per grid interval (fixed-step methods).
    pub substeps: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            method: OdeMethod::DormandPrince45,
            rtol: 1e-6,
            atol: 1e-9,
            max_steps: 5_000_000,
            substeps: 10,
        }
    }
}

impl SolverConfig {
    pub fn rk4(substeps: usize) -> Self {
        Self {
            method: OdeMethod::Rk4,
            substeps,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> QomResult<()> {
        if !(self.rtol > 0.0) || !(self.atol > 0.0) {
            return Err(QomError::Config(format!(
                "rtol and atol must be > 0, got {} / {}",
                self.rtol, self.atol
            )));
        }
        if self.max_steps == 0 {
            return Err(QomError::Config("max_steps must be > 0".to_string()));
        }
        if self.substeps == 0 {
            return Err(QomError::Config("substeps must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Index window `[start, end)` into a trajectory.
///
/// `end = None` runs to the end of the trajectory, so `start` alone
/// selects a trailing post-transient window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureWindow {
    pub start: usize,
    pub end: Option<usize>,
}

impl MeasureWindow {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    /// The last `count` samples.
    pub fn trailing(len: usize, count: usize) -> Self {
        Self {
            start: len.saturating_sub(count),
            end: Some(len),
        }
    }

    /// Concrete bounds for a trajectory of `len` samples.
    pub fn resolve(&self, len: usize) -> QomResult<(usize, usize)> {
        if len == 0 {
            return Err(QomError::Malformed("empty trajectory".to_string()));
        }
        let end = self.end.unwrap_or(len);
        if end > len {
            return Err(QomError::Malformed(format!(
                "window end {end} exceeds trajectory length {len}"
            )));
        }
        if self.start >= end {
            return Err(QomError::Malformed(format!(
                "empty window [{}, {end})",
                self.start
            )));
        }
        Ok((self.start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_bidirectional() {
        let p = ParameterSet::defaults(Topology::Bidirectional);
        assert_eq!(p.amp_drive, 52.0);
        assert_eq!(p.lambda, 0.075);
        assert_eq!(p.eta, 0.0);
        assert_eq!(p.kappas, [0.15, 0.15]);
        assert_eq!(p.delta, 0.01);
    }

    #[test]
    fn test_defaults_reduced_delta() {
        let p = ParameterSet::defaults(Topology::UnidirectionalReduced);
        assert_eq!(p.delta, 0.005);
        assert_eq!(p.eta, 0.75);
    }

    #[test]
    fn test_explicit_zero_is_not_defaulted() {
        let mut input = ParameterInput::new(Topology::Unidirectional);
        input.amp_drive = Some(0.0);
        input.eta = Some(0.0);
        input.delta = Some(0.0);
        let p = ParameterSet::from_input(&input).unwrap();
        assert_eq!(p.amp_drive, 0.0);
        assert_eq!(p.eta, 0.0);
        assert_eq!(p.delta, 0.0);
    }

    #[test]
    fn test_foreign_field_rejected() {
        let mut input = ParameterInput::new(Topology::Bidirectional);
        input.eta = Some(0.5);
        assert!(matches!(
            ParameterSet::from_input(&input),
            Err(QomError::Config(_))
        ));

        let mut input = ParameterInput::new(Topology::Unidirectional);
        input.lambda = Some(0.1);
        assert!(ParameterSet::from_input(&input).is_err());
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut input = ParameterInput::new(Topology::Unidirectional);
        input.eta = Some(1.5);
        assert!(ParameterSet::from_input(&input).is_err());

        let mut input = ParameterInput::new(Topology::Bidirectional);
        input.kappas = Some([0.15, 0.0]);
        assert!(ParameterSet::from_input(&input).is_err());

        let mut input = ParameterInput::new(Topology::Bidirectional);
        input.detuning_sign = Some(0.5);
        assert!(ParameterSet::from_input(&input).is_err());

        let mut input = ParameterInput::new(Topology::Bidirectional);
        input.n_ths = Some([f64::NAN, 0.0]);
        assert!(ParameterSet::from_input(&input).is_err());
    }

    #[test]
    fn test_from_json_partial() {
        let p = ParameterSet::from_json(
            r#"{"topology": "unidirectional", "eta": 0.5, "n_ths": [1.0, 2.0]}"#,
        )
        .unwrap();
        assert_eq!(p.topology, Topology::Unidirectional);
        assert_eq!(p.eta, 0.5);
        assert_eq!(p.n_ths, [1.0, 2.0]);
        assert_eq!(p.omega_m, 1.0);
    }

    #[test]
    fn test_from_json_unknown_field() {
        let r = ParameterSet::from_json(r#"{"topology": "bidirectional", "bogus": 1.0}"#);
        assert!(matches!(r, Err(QomError::Config(_))));
    }

    #[test]
    fn test_derived_quantities() {
        let mut input = ParameterInput::new(Topology::Unidirectional);
        input.eta = Some(1.0);
        input.kappas = Some([0.1, 0.4]);
        input.detuning_sign = Some(-1.0);
        let p = ParameterSet::from_input(&input).unwrap();
        assert!((p.transfer_rate() - 0.2).abs() < 1e-15);
        assert_eq!(p.injected_drive(), 52.0);
        assert_eq!(p.bare_detunings(), [-1.0, -1.01]);
    }

    #[test]
    fn test_time_grid() {
        let g = TimeGrid::new(0.0, 1.0, 11).unwrap();
        let t = g.times();
        assert_eq!(t.len(), 11);
        assert_eq!(t[10], 1.0);
        assert!((g.dt() - 0.1).abs() < 1e-15);
        assert!(TimeGrid::new(1.0, 1.0, 11).is_err());
        assert!(TimeGrid::new(0.0, 1.0, 1).is_err());
    }

    #[test]
    fn test_window_resolve() {
        assert_eq!(MeasureWindow::default().resolve(5).unwrap(), (0, 5));
        assert_eq!(MeasureWindow::trailing(10, 3).resolve(10).unwrap(), (7, 10));
        assert!(MeasureWindow::new(3, 3).resolve(10).is_err());
        assert!(MeasureWindow::new(0, 11).resolve(10).is_err());
        assert!(matches!(
            MeasureWindow::default().resolve(0),
            Err(QomError::Malformed(_))
        ));
    }

    #[test]
    fn test_solver_config_validate() {
        assert!(SolverConfig::default().validate().is_ok());
        assert!(SolverConfig::rk4(0).validate().is_err());
    }
}
