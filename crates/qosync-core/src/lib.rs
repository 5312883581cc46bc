// ─────────────────────────────────────────────────────────────────────
// QOSync — Evaluation Pipeline
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! One parameter point in, one measure report out.
//!
//! A point moves through `Initializing → Integrating → PostProcessing →
//! Complete`. Failures are fatal for the point and carry the stage, the
//! phase reached and the parameters that were in effect.
//!
//! # Invariants
//!
//! 1. **No silent truncation**: a failed integration step aborts the
//!    point; a report always covers the full time grid.
//!
//! 2. **Pure per point**: every evaluation builds its own system and
//!    scratch buffers, so independent points may run on separate
//!    threads without coordination.
//!
//! 3. **Lab-basis measures**: collective-coordinate topologies are
//!    transformed back before any measure is taken.

pub mod pipeline;

pub use pipeline::{
    evaluate_dynamics, evaluate_stationary, DynamicsReport, MeasureRequest, Phase, PointError,
    StationaryReport,
};
