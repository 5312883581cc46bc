// ─────────────────────────────────────────────────────────────────────
// QOSync — Point Evaluation
// ─────────────────────────────────────────────────────────────────────
//! Dynamic and stationary evaluation of one parameter point.
//!
//! Dynamics: build system → propagate → window-averaged phase sync and
//! discord, Pearson correlator, final occupancy difference, transverse
//! exponent of the drift at the window-mean modes.
//!
//! The transverse exponent is the spectral abscissa of the drift block
//! acting on `u₁ − u₂`, unless the request names sorted-eigenvalue
//! indices of the full drift instead.
//!
//! Stationary: build system → stationary modes, drift and Lyapunov
//! covariance → the same measures on the single stationary state.

use std::fmt;

use log::{debug, info, warn};
use nalgebra::DMatrix;
use num_complex::Complex64;
use qosync_measures::{
    complete_synchronization, gaussian_discord, gaussian_discord_series, max_real_part,
    mode_phases, occupancy_difference, pearson_correlator, phase_synchronization,
    phase_synchronization_series, spectral_abscissa, window_mean,
};
use qosync_physics::{build_system, propagate, stationary_state, QomSystem, Trajectory};
use qosync_types::{
    MeasureWindow, ParameterSet, QomError, QomResult, SolverConfig, Stage, TimeGrid, Topology,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Progress of one point evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Parameters validated, system and initial values built.
    Initializing,
    /// Propagation, or the stationary solve for stationary points.
    Integrating,
    /// Measures extracted from the trajectory or stationary state.
    PostProcessing,
    Complete,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Initializing => "initializing",
            Phase::Integrating => "integrating",
            Phase::PostProcessing => "post-processing",
            Phase::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// A failed parameter point.
#[derive(Debug, Clone, Error)]
#[error("{stage} failure while {phase}: {source}")]
pub struct PointError {
    pub stage: Stage,
    pub phase: Phase,
    /// Parameters in effect, as JSON.
    pub params_json: String,
    #[source]
    pub source: QomError,
}

impl PointError {
    pub fn new(phase: Phase, params: &ParameterSet, source: QomError) -> Self {
        warn!("point failed while {phase}: {source}");
        Self {
            stage: source.stage(),
            phase,
            params_json: params.to_json(),
            source,
        }
    }
}

/// Which modes, quadratures and samples the measures use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasureRequest {
    /// Modes for synchronization and discord.
    pub mode_pair: [usize; 2],
    /// Quadratures for the Pearson correlator.
    pub pearson_pair: [usize; 2],
    /// Post-transient samples.
    pub window: MeasureWindow,
    /// Sorted-eigenvalue indices of the full drift to read the transverse
    /// exponent from. `None` uses the whole spectrum of the `u₁ − u₂`
    /// block.
    pub transverse: Option<Vec<usize>>,
    /// Attach the full trajectory to a dynamics report.
    pub keep_trajectory: bool,
}

impl Default for MeasureRequest {
    fn default() -> Self {
        Self {
            mode_pair: [1, 3],
            pearson_pair: [3, 7],
            window: MeasureWindow::default(),
            transverse: None,
            keep_trajectory: false,
        }
    }
}

impl MeasureRequest {
    /// Defaults adapted to the state layout of `topology`.
    pub fn for_topology(topology: Topology) -> Self {
        match topology {
            Topology::UnidirectionalReduced => Self {
                mode_pair: [0, 1],
                pearson_pair: [1, 3],
                ..Self::default()
            },
            _ => Self::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicsReport {
    pub topology: Topology,
    pub phase: Phase,
    /// Window-averaged phase synchronization.
    pub phase_sync: f64,
    /// Complete synchronization at the last sample.
    pub complete_sync: f64,
    /// Window-averaged Gaussian discord.
    pub discord: f64,
    pub pearson: f64,
    /// `n₂ − n₁` of the mechanical modes at the last sample.
    pub occupancy_difference: f64,
    /// Largest transverse real part of the drift at the window-mean modes.
    pub max_transverse_exponent: f64,
    pub samples: usize,
    pub final_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trajectory: Option<Trajectory>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationaryReport {
    pub topology: Topology,
    pub phase: Phase,
    pub modes: Vec<Complex64>,
    pub phase_sync: f64,
    pub complete_sync: f64,
    pub discord: f64,
    pub pearson: f64,
    pub occupancy_difference: f64,
    pub max_transverse_real_part: f64,
}

/// Mean-amplitude phases of `pair`; the reduced model works in the
/// rotating frame of the mechanical modes, where the phases vanish.
fn sample_phases(topology: Topology, modes: &[Complex64], pair: [usize; 2]) -> QomResult<[f64; 2]> {
    match topology {
        Topology::UnidirectionalReduced => Ok([0.0, 0.0]),
        _ => mode_phases(modes, pair),
    }
}

/// Transverse exponent of the drift at `modes`.
fn transverse_exponent(
    system: &mut dyn QomSystem,
    modes: &[Complex64],
    indices: Option<&[usize]>,
) -> QomResult<f64> {
    match indices {
        Some(indices) => max_real_part(system.build_drift(modes)?, indices),
        None => spectral_abscissa(&system.transverse_drift(modes)?),
    }
}

/// Propagate one point and extract its dynamic measures.
pub fn evaluate_dynamics(
    params: &ParameterSet,
    grid: &TimeGrid,
    solver: &SolverConfig,
    request: &MeasureRequest,
) -> Result<DynamicsReport, PointError> {
    let at = |phase: Phase| move |source: QomError| PointError::new(phase, params, source);

    debug!(
        "evaluating {:?} dynamics on [{}, {}] with {} samples",
        params.topology, grid.t_min, grid.t_max, grid.t_dim
    );
    let mut system = build_system(params).map_err(at(Phase::Initializing))?;
    solver.validate().map_err(at(Phase::Initializing))?;

    let trajectory = propagate(system.as_mut(), grid, solver).map_err(at(Phase::Integrating))?;

    let report = dynamics_measures(system.as_mut(), trajectory, request)
        .map_err(at(Phase::PostProcessing))?;
    info!(
        "{:?} point complete: S_p = {:.4}, discord = {:.4e}, Λ⊥ = {:.4e}",
        report.topology, report.phase_sync, report.discord, report.max_transverse_exponent
    );
    Ok(report)
}

fn dynamics_measures(
    system: &mut dyn QomSystem,
    trajectory: Trajectory,
    request: &MeasureRequest,
) -> QomResult<DynamicsReport> {
    let topology = system.topology();
    let (start, end) = request.window.resolve(trajectory.len())?;
    let lab: Vec<DMatrix<f64>> = trajectory.covariances[start..end]
        .iter()
        .map(|v| system.to_lab_basis(v))
        .collect();
    let phases = trajectory.modes[start..end]
        .iter()
        .map(|m| sample_phases(topology, m, request.mode_pair))
        .collect::<QomResult<Vec<_>>>()?;

    let whole = MeasureWindow::default();
    let phase_sync = window_mean(
        &phase_synchronization_series(&lab, &phases, request.mode_pair)?,
        &whole,
    )?;
    let discord = window_mean(&gaussian_discord_series(&lab, request.mode_pair)?, &whole)?;
    let pearson = pearson_correlator(&lab, request.pearson_pair, &whole)?;

    let last = system.to_lab_basis(&trajectory.covariances[trajectory.len() - 1]);
    let complete_sync = complete_synchronization(&last, request.mode_pair)?;
    let occupancy_difference = occupancy_difference(&last, system.mechanical_pair())?;

    let mean_modes = trajectory.mean_modes(start, end)?;
    let max_transverse_exponent =
        transverse_exponent(system, &mean_modes, request.transverse.as_deref())?;

    Ok(DynamicsReport {
        topology,
        phase: Phase::Complete,
        phase_sync,
        complete_sync,
        discord,
        pearson,
        occupancy_difference,
        max_transverse_exponent,
        samples: trajectory.len(),
        final_time: trajectory.times[trajectory.len() - 1],
        trajectory: request.keep_trajectory.then_some(trajectory),
    })
}

/// Solve the stationary state of one point and extract its measures.
pub fn evaluate_stationary(
    params: &ParameterSet,
    request: &MeasureRequest,
) -> Result<StationaryReport, PointError> {
    let at = |phase: Phase| move |source: QomError| PointError::new(phase, params, source);

    debug!("evaluating {:?} stationary state", params.topology);
    let mut system = build_system(params).map_err(at(Phase::Initializing))?;
    let state = stationary_state(system.as_mut()).map_err(at(Phase::Integrating))?;
    let max_transverse_real_part =
        transverse_exponent(system.as_mut(), &state.modes, request.transverse.as_deref())
            .map_err(at(Phase::PostProcessing))?;

    let measures = || -> QomResult<StationaryReport> {
        let v = system.to_lab_basis(&state.covariance);
        let phases = sample_phases(system.topology(), &state.modes, request.mode_pair)?;
        Ok(StationaryReport {
            topology: system.topology(),
            phase: Phase::Complete,
            modes: state.modes.clone(),
            phase_sync: phase_synchronization(&v, phases, request.mode_pair)?,
            complete_sync: complete_synchronization(&v, request.mode_pair)?,
            discord: gaussian_discord(&v, request.mode_pair)?,
            pearson: pearson_correlator(
                std::slice::from_ref(&v),
                request.pearson_pair,
                &MeasureWindow::default(),
            )?,
            occupancy_difference: occupancy_difference(&v, system.mechanical_pair())?,
            max_transverse_real_part,
        })
    };
    let report = measures().map_err(at(Phase::PostProcessing))?;
    info!(
        "{:?} stationary point complete: S_p = {:.4}, discord = {:.4e}",
        report.topology, report.phase_sync, report.discord
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qosync_types::{OdeMethod, ParameterInput};

    fn params(topology: Topology, amp: f64) -> ParameterSet {
        let mut input = ParameterInput::new(topology);
        input.amp_drive = Some(amp);
        ParameterSet::from_input(&input).unwrap()
    }

    fn short_grid() -> TimeGrid {
        TimeGrid::new(0.0, 20.0, 201).unwrap()
    }

    fn trailing(grid: &TimeGrid, count: usize) -> MeasureRequest {
        MeasureRequest {
            window: MeasureWindow::trailing(grid.t_dim, count),
            ..MeasureRequest::default()
        }
    }

    #[test]
    fn test_dynamics_report_is_finite() {
        let grid = short_grid();
        let report = evaluate_dynamics(
            &params(Topology::Bidirectional, 1.0),
            &grid,
            &SolverConfig::rk4(5),
            &trailing(&grid, 50),
        )
        .unwrap();
        assert_eq!(report.phase, Phase::Complete);
        assert_eq!(report.samples, 201);
        assert!((report.final_time - 20.0).abs() < 1e-12);
        assert!(report.phase_sync > 0.0 && report.phase_sync.is_finite());
        assert!(report.complete_sync > 0.0 && report.complete_sync.is_finite());
        assert!(report.discord > -1e-12 && report.discord.is_finite());
        assert!(report.pearson.abs() <= 1.0 + 1e-12);
        assert!(report.max_transverse_exponent.is_finite());
        assert!(report.trajectory.is_none());
    }

    #[test]
    fn test_plus_minus_reports_match_lab_basis() {
        let grid = short_grid();
        let request = trailing(&grid, 20);
        let solver = SolverConfig::rk4(5);
        let lab = evaluate_dynamics(
            &params(Topology::Unidirectional, 1.0),
            &grid,
            &solver,
            &request,
        )
        .unwrap();
        let collective = evaluate_dynamics(
            &params(Topology::UnidirectionalPlusMinus, 1.0),
            &grid,
            &solver,
            &request,
        )
        .unwrap();
        let close = |a: f64, b: f64| (a - b).abs() <= 1e-6 * a.abs().max(b.abs()) + 1e-9;
        assert!(close(lab.phase_sync, collective.phase_sync), "{lab:?} vs {collective:?}");
        assert!(close(lab.discord, collective.discord), "{lab:?} vs {collective:?}");
        assert!(
            close(lab.occupancy_difference, collective.occupancy_difference),
            "{lab:?} vs {collective:?}"
        );
        assert!(close(
            lab.max_transverse_exponent,
            collective.max_transverse_exponent
        ));
    }

    #[test]
    fn test_reduced_dynamics_uses_mechanical_layout() {
        let grid = short_grid();
        let request = MeasureRequest {
            window: MeasureWindow::trailing(grid.t_dim, 50),
            keep_trajectory: true,
            ..MeasureRequest::for_topology(Topology::UnidirectionalReduced)
        };
        let report = evaluate_dynamics(
            &params(Topology::UnidirectionalReduced, 1.0),
            &grid,
            &SolverConfig::rk4(5),
            &request,
        )
        .unwrap();
        assert!(report.phase_sync.is_finite());
        let trajectory = report.trajectory.unwrap();
        assert_eq!(trajectory.covariances[0].shape(), (4, 4));
        assert_eq!(trajectory.len(), 201);
    }

    #[test]
    fn test_integration_failure_is_tagged() {
        let solver = SolverConfig {
            method: OdeMethod::DormandPrince45,
            max_steps: 1,
            ..SolverConfig::default()
        };
        let err = evaluate_dynamics(
            &params(Topology::Bidirectional, 1.0),
            &short_grid(),
            &solver,
            &MeasureRequest::default(),
        )
        .unwrap_err();
        assert_eq!(err.phase, Phase::Integrating);
        assert_eq!(err.stage, Stage::Integration);
        assert!(err.params_json.contains("amp_drive"));
        assert!(err.to_string().contains("integrating"));
    }

    #[test]
    fn test_window_outside_trajectory_is_post_processing_error() {
        let request = MeasureRequest {
            window: MeasureWindow::new(0, 1000),
            ..MeasureRequest::default()
        };
        let err = evaluate_dynamics(
            &params(Topology::Bidirectional, 1.0),
            &short_grid(),
            &SolverConfig::rk4(2),
            &request,
        )
        .unwrap_err();
        assert_eq!(err.phase, Phase::PostProcessing);
        assert_eq!(err.stage, Stage::Measure);
    }

    #[test]
    fn test_stationary_vacuum() {
        let report =
            evaluate_stationary(&params(Topology::Bidirectional, 0.0), &MeasureRequest::default())
                .unwrap();
        assert!(report.modes.iter().all(|m| m.norm() == 0.0));
        assert!((report.phase_sync - 1.0).abs() < 1e-9, "{report:?}");
        assert!(report.discord.abs() < 1e-9, "{report:?}");
        assert!(report.pearson.abs() < 1e-9, "{report:?}");
        assert!(report.occupancy_difference.abs() < 1e-9);
        assert!(report.max_transverse_real_part < 0.0);
    }

    #[test]
    fn test_stationary_driven_unidirectional() {
        let mut input = ParameterInput::new(Topology::Unidirectional);
        input.amp_drive = Some(1.0);
        input.n_ths = Some([1.0, 1.0]);
        let p = ParameterSet::from_input(&input).unwrap();
        let report = evaluate_stationary(&p, &MeasureRequest::default()).unwrap();
        assert!(report.phase_sync > 0.0 && report.phase_sync.is_finite());
        assert!(report.discord.is_finite());
        // u₁ − u₂ block at the fixed point, above the leading full-drift
        // eigenvalue of −4.69995e-3.
        assert!(
            (report.max_transverse_real_part + 3.055105e-3).abs() < 1e-8,
            "{report:?}"
        );
    }

    #[test]
    fn test_stationary_transverse_by_sorted_index() {
        let p = params(Topology::Unidirectional, 1.0);
        let request = MeasureRequest {
            transverse: Some(vec![6, 7]),
            ..MeasureRequest::default()
        };
        let report = evaluate_stationary(&p, &request).unwrap();
        assert!(
            (report.max_transverse_real_part + 4.699953e-3).abs() < 1e-8,
            "{report:?}"
        );
    }

    #[test]
    fn test_stationary_instability_is_tagged() {
        let p = ParameterSet::defaults(Topology::UnidirectionalReduced);
        let err = evaluate_stationary(
            &p,
            &MeasureRequest::for_topology(Topology::UnidirectionalReduced),
        )
        .unwrap_err();
        assert_eq!(err.stage, Stage::DriftStability);
        assert_eq!(err.phase, Phase::Integrating);
        assert!(matches!(err.source, QomError::Instability { .. }));
    }

    #[test]
    fn test_request_defaults_from_json() {
        let request: MeasureRequest = serde_json::from_str(r#"{"mode_pair": [0, 2]}"#).unwrap();
        assert_eq!(request.mode_pair, [0, 2]);
        assert_eq!(request.pearson_pair, [3, 7]);
        assert_eq!(request.transverse, None);
        assert_eq!(request.window, MeasureWindow::default());

        let reduced = MeasureRequest::for_topology(Topology::UnidirectionalReduced);
        assert_eq!(reduced.mode_pair, [0, 1]);
        assert_eq!(reduced.transverse, None);

        let indexed: MeasureRequest = serde_json::from_str(r#"{"transverse": [2, 3]}"#).unwrap();
        assert_eq!(indexed.transverse, Some(vec![2, 3]));
    }

    #[test]
    fn test_report_serializes_without_trajectory() {
        let grid = TimeGrid::new(0.0, 2.0, 11).unwrap();
        let report = evaluate_dynamics(
            &params(Topology::Bidirectional, 1.0),
            &grid,
            &SolverConfig::rk4(4),
            &MeasureRequest::default(),
        )
        .unwrap();
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"phase_sync\""));
        assert!(!json.contains("trajectory"));
    }
}
