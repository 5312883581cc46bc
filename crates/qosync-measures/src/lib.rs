// ─────────────────────────────────────────────────────────────────────
// QOSync — Correlation Measures
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Scalar measures extracted from quadrature covariances and drift
//! matrices.
//!
//! - Synchronization: phase (S_p) and complete (S_c)
//! - Gaussian discord of a two-mode reduced state
//! - Pearson correlator over a trajectory window
//! - Correlation elements and phonon occupancies
//! - Lyapunov exponents: spectral and product (QR) estimates
//!
//! Every measure validates its input first and reports `Malformed`
//! rather than returning a NaN.

pub mod discord;
pub mod elements;
pub mod lyapunov;
pub mod pearson;
pub mod sync;
pub mod validate;
pub mod window;

pub use discord::{gaussian_discord, gaussian_discord_series, SymplecticInvariants};
pub use elements::{correlation_elements, occupancy_difference, phonon_occupancy};
pub use lyapunov::{
    max_real_part, max_real_part_series, product_exponents, sorted_eigenvalues, spectral_abscissa,
    ProductMethod,
};
pub use pearson::pearson_correlator;
pub use sync::{
    complete_synchronization, mode_phases, phase_synchronization, phase_synchronization_series,
};
pub use validate::{validate_covariance, validate_trajectory};
pub use window::{window_mean, window_slice};
