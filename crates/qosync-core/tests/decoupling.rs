// ─────────────────────────────────────────────────────────────────────
// QOSync — Channel Decoupling
// ─────────────────────────────────────────────────────────────────────
//! A closed unidirectional channel (η = 0) must leave the two subsystems
//! statistically independent over a whole propagated trajectory.

use qosync_core::{evaluate_dynamics, MeasureRequest};
use qosync_physics::Trajectory;
use qosync_types::{ParameterInput, ParameterSet, SolverConfig, TimeGrid, Topology};

fn unidirectional(eta: f64, tweak: impl FnOnce(&mut ParameterInput)) -> ParameterSet {
    let mut input = ParameterInput::new(Topology::Unidirectional);
    input.amp_drive = Some(1.0);
    input.eta = Some(eta);
    tweak(&mut input);
    ParameterSet::from_input(&input).unwrap()
}

fn run(params: &ParameterSet) -> Trajectory {
    let grid = TimeGrid::new(0.0, 20.0, 201).unwrap();
    let request = MeasureRequest {
        keep_trajectory: true,
        ..MeasureRequest::default()
    };
    evaluate_dynamics(params, &grid, &SolverConfig::rk4(5), &request)
        .unwrap()
        .trajectory
        .unwrap()
}

fn max_cross(trajectory: &Trajectory) -> f64 {
    trajectory
        .covariances
        .iter()
        .flat_map(|v| (0..4).flat_map(move |r| (4..8).map(move |c| v[(r, c)].abs())))
        .fold(0.0, f64::max)
}

#[test]
fn test_closed_channel_keeps_cross_covariance_zero() {
    let trajectory = run(&unidirectional(0.0, |_| {}));
    assert_eq!(trajectory.len(), 201);
    let cross = max_cross(&trajectory);
    assert!(cross <= 1e-12, "cross covariance reached {cross:.3e}");
}

#[test]
fn test_open_channel_correlates_subsystems() {
    let cross = max_cross(&run(&unidirectional(0.75, |_| {})));
    assert!(cross > 1e-6, "cross covariance stayed at {cross:.3e}");
}

#[test]
fn test_closed_channel_hides_first_subsystem() {
    let base = run(&unidirectional(0.0, |_| {}));
    let altered = run(&unidirectional(0.0, |input| {
        input.g0s = Some([0.02, 0.005]);
        input.gammas = Some([0.01, 0.005]);
        input.n_ths = Some([2.0, 0.0]);
    }));

    // the change is visible in subsystem 1
    let last = base.len() - 1;
    assert!((base.modes[last][1] - altered.modes[last][1]).norm() > 1e-6);

    for k in 0..base.len() {
        for m in 2..4 {
            let diff = (base.modes[k][m] - altered.modes[k][m]).norm();
            assert!(diff <= 1e-12, "mode {m} differs by {diff:.3e} at sample {k}");
        }
        let (v, w) = (&base.covariances[k], &altered.covariances[k]);
        for r in 4..8 {
            for c in 4..8 {
                let diff = (v[(r, c)] - w[(r, c)]).abs();
                assert!(diff <= 1e-12, "V[{r},{c}] differs by {diff:.3e} at sample {k}");
            }
        }
    }
}
