// ─────────────────────────────────────────────────────────────────────
// QOSync — Mode and Quadrature Layout
// ─────────────────────────────────────────────────────────────────────
//! Index conventions shared by every builder and measure.
//!
//! Full topologies carry modes `[α₁, β₁, α₂, β₂]`; mode `k` owns the
//! quadrature pair `(2k, 2k+1)`, so subsystem `i` spans the block
//! `[x, y, q, p]` starting at `4i`. The reduced topology keeps only the
//! two mechanical quadrature pairs `[q₁, p₁, q₂, p₂]`.
//!
//! In both layouts the second subsystem starts halfway through the
//! quadrature vector, so the collective basis `u± = (u₁ ± u₂)/√2` pairs
//! index `k` with `k + n/2`.

use nalgebra::DMatrix;
use qosync_types::{QomError, QomResult};

/// Number of coupled subsystems.
pub const N_SUBSYSTEMS: usize = 2;

/// Quadratures per subsystem block (x, y, q, p).
pub const BLOCK: usize = 4;

pub const X: usize = 0;
pub const Y: usize = 1;
pub const Q: usize = 2;
pub const P: usize = 3;

/// Vacuum variance of a single quadrature.
pub const VACUUM_VARIANCE: f64 = 0.5;

/// First quadrature index of subsystem `i`.
#[inline]
pub fn block_offset(i: usize) -> usize {
    BLOCK * i
}

/// Index of the optical mode of subsystem `i`.
#[inline]
pub fn optical_mode(i: usize) -> usize {
    2 * i
}

/// Index of the mechanical mode of subsystem `i`.
#[inline]
pub fn mechanical_mode(i: usize) -> usize {
    2 * i + 1
}

/// Quadrature pair `(position, momentum)` owned by mode `k`.
#[inline]
pub fn mode_quadratures(k: usize) -> (usize, usize) {
    (2 * k, 2 * k + 1)
}

/// Orthogonal involution pairing quadrature `k` with `k + n/2`: the
/// plus half comes first, then the minus half. `T = Tᵀ = T⁻¹`.
pub fn collective_transform(n: usize) -> DMatrix<f64> {
    let s = std::f64::consts::FRAC_1_SQRT_2;
    let half = n / 2;
    let mut t = DMatrix::zeros(n, n);
    for k in 0..half {
        t[(k, k)] = s;
        t[(k, k + half)] = s;
        t[(k + half, k)] = s;
        t[(k + half, k + half)] = -s;
    }
    t
}

/// Maps lab quadratures `[x₁,y₁,q₁,p₁,x₂,y₂,q₂,p₂]` onto
/// `[x₊,y₊,q₊,p₊,x₋,y₋,q₋,p₋]`.
pub fn plus_minus_transform() -> DMatrix<f64> {
    collective_transform(N_SUBSYSTEMS * BLOCK)
}

/// Minus-minus block of the drift in the collective basis: the
/// linearized dynamics of `u₁ − u₂`, transverse to the synchronization
/// manifold. `a` is in the lab basis unless `collective` is set.
pub fn transverse_block(a: &DMatrix<f64>, collective: bool) -> QomResult<DMatrix<f64>> {
    let n = a.nrows();
    if !a.is_square() || n == 0 || n % 2 != 0 {
        return Err(QomError::Shape(format!(
            "drift {:?} has no plus/minus split",
            a.shape()
        )));
    }
    let half = n / 2;
    if collective {
        return Ok(a.view((half, half), (half, half)).into_owned());
    }
    let t = collective_transform(n);
    let rotated = &t * a * &t;
    Ok(rotated.view((half, half), (half, half)).into_owned())
}
