// ─────────────────────────────────────────────────────────────────────
// QOSync — Kernel Types
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Type definitions, configuration, and error hierarchy for the
//! QOSync kernel — coupled mode/covariance dynamics of pairs of
//! optomechanical cavities.

pub mod config;
pub mod error;

pub use config::{
    MeasureWindow, OdeMethod, ParameterInput, ParameterSet, SolverConfig, TimeGrid, Topology,
};
pub use error::{QomError, QomResult, Stage};
