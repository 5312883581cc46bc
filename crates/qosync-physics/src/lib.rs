// ─────────────────────────────────────────────────────────────────────
// QOSync — Optomechanical Network Physics
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Linearized quantum dynamics of two coupled cavity-oscillator
//! subsystems: drift and noise matrices, mode and covariance rates,
//! coupled propagation and the stationary Lyapunov solve.

#![deny(unsafe_code)]

pub mod couplings;
pub mod drift;
pub mod integrator;
pub mod layout;
pub mod noise;
pub mod propagator;
pub mod rates;
pub mod stationary;
pub mod systems;

pub use couplings::{EffectiveCouplings, ReducedCoefficients};
pub use drift::DriftBuilder;
pub use integrator::{OdeSolver, OdeSystem};
pub use layout::{collective_transform, plus_minus_transform, transverse_block};
pub use noise::{build_noise, check_noise_invariants};
pub use propagator::{propagate, propagate_covariance, propagate_from, Trajectory};
pub use rates::{covariance_rates, mode_rates, reduced_mode_rates, CovarianceRates};
pub use stationary::{
    check_stability, fixed_point_modes, max_real_eigenvalue, solve_lyapunov, stationary_state,
    StationaryState,
};
pub use systems::{build_system, QomSystem};
