// ─────────────────────────────────────────────────────────────────────
// QOSync — Gaussian Discord
// ─────────────────────────────────────────────────────────────────────
//! Gaussian quantum discord of a two-mode reduced state.
//!
//! With `σ = 2V` restricted to modes `(i, j)` and written in blocks
//!
//!   σ = | α  γ |
//!       | γᵀ β |
//!
//! the local invariants are `A = det α`, `B = det β`, `C = det γ` and
//! `D = det σ`. The discord (measurement on mode `j`) is
//!
//!   D_G = f(√B) − f(ν₋) − f(ν₊) + f(√E_min)
//!
//! where `ν±` are the symplectic eigenvalues and `E_min` takes one of
//! two closed forms depending on `(D − AB)² ≤ (1 + B)C²(A + D)`.

use log::trace;
use nalgebra::DMatrix;
use qosync_types::{QomError, QomResult};
use serde::{Deserialize, Serialize};

use crate::validate::{validate_covariance, validate_trajectory};

/// Below this `|B − 1|` the first branch divides by ~0; the second
/// branch is used instead.
const PURE_MODE_GUARD: f64 = 1e-12;

/// Symplectic invariants of a two-mode block in `σ = 2V` units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SymplecticInvariants {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
}

impl SymplecticInvariants {
    /// Invariants of modes `pair` inside the full covariance `v`.
    pub fn from_covariance(v: &DMatrix<f64>, pair: [usize; 2]) -> Self {
        let (i, j) = (2 * pair[0], 2 * pair[1]);
        let idx = [i, i + 1, j, j + 1];
        let sigma = DMatrix::from_fn(4, 4, |r, c| 2.0 * v[(idx[r], idx[c])]);
        let det2 = |r: usize, c: usize| {
            sigma[(r, c)] * sigma[(r + 1, c + 1)] - sigma[(r, c + 1)] * sigma[(r + 1, c)]
        };
        Self {
            a: det2(0, 0),
            b: det2(2, 2),
            c: det2(0, 2),
            d: sigma.determinant(),
        }
    }

    /// Symplectic eigenvalues `(ν₋, ν₊)`.
    pub fn symplectic_eigenvalues(&self) -> (f64, f64) {
        let delta = self.a + self.b + 2.0 * self.c;
        let root = (delta * delta - 4.0 * self.d).max(0.0).sqrt();
        (
            ((delta - root) / 2.0).max(0.0).sqrt(),
            ((delta + root) / 2.0).max(0.0).sqrt(),
        )
    }

    fn first_branch(&self) -> bool {
        let Self { a, b, c, d } = *self;
        (d - a * b).powi(2) <= (1.0 + b) * c * c * (a + d) && (b - 1.0).abs() > PURE_MODE_GUARD
    }

    /// Minimal conditional determinant over Gaussian measurements on mode `j`.
    pub fn e_min(&self) -> f64 {
        let Self { a, b, c, d } = *self;
        if self.first_branch() {
            let inner = (c * c + (b - 1.0) * (d - a)).max(0.0);
            (2.0 * c * c + (b - 1.0) * (d - a) + 2.0 * c.abs() * inner.sqrt()) / (b - 1.0).powi(2)
        } else {
            let inner = (c.powi(4) + (d - a * b).powi(2) - 2.0 * c * c * (a * b + d)).max(0.0);
            (a * b - c * c + d - inner.sqrt()) / (2.0 * b)
        }
    }
}

/// `f(x) = ((x+1)/2) ln((x+1)/2) − ((x−1)/2) ln((x−1)/2)`, zero for `x ≤ 1`.
fn entropy_fn(x: f64) -> f64 {
    if x <= 1.0 {
        return 0.0;
    }
    let plus = (x + 1.0) / 2.0;
    let minus = (x - 1.0) / 2.0;
    plus * plus.ln() - minus * minus.ln()
}

/// Gaussian discord of modes `pair` in covariance `v`.
///
/// A vanishing cross block (product state) gives exactly `0`.
pub fn gaussian_discord(v: &DMatrix<f64>, pair: [usize; 2]) -> QomResult<f64> {
    if pair[0] == pair[1] {
        return Err(QomError::Shape(format!(
            "discord needs two distinct modes, got {pair:?}"
        )));
    }
    let (i, j) = (2 * pair[0], 2 * pair[1]);
    validate_covariance(v, &[i, i + 1, j, j + 1])?;
    let cross_zero = [i, i + 1]
        .iter()
        .all(|&r| v[(r, j)] == 0.0 && v[(r, j + 1)] == 0.0);
    if cross_zero {
        return Ok(0.0);
    }

    let inv = SymplecticInvariants::from_covariance(v, pair);
    if inv.b <= 0.0 {
        return Err(QomError::Malformed(format!(
            "local determinant of mode {} is non-positive ({:.3e})",
            pair[1], inv.b
        )));
    }
    let (nu_minus, nu_plus) = inv.symplectic_eigenvalues();
    let e_min = inv.e_min();
    trace!(
        "discord invariants {inv:?}, ν = ({nu_minus:.6}, {nu_plus:.6}), E_min = {e_min:.6}"
    );
    let discord = entropy_fn(inv.b.sqrt()) - entropy_fn(nu_minus) - entropy_fn(nu_plus)
        + entropy_fn(e_min.max(0.0).sqrt());
    if !discord.is_finite() {
        return Err(QomError::Numerical(format!(
            "discord evaluated to {discord} for {inv:?}"
        )));
    }
    Ok(discord)
}

/// Discord at every sample of a trajectory.
pub fn gaussian_discord_series(
    covariances: &[DMatrix<f64>],
    pair: [usize; 2],
) -> QomResult<Vec<f64>> {
    validate_trajectory(covariances.len(), None)?;
    covariances
        .iter()
        .map(|v| gaussian_discord(v, pair))
        .collect()
}
