// ─────────────────────────────────────────────────────────────────────
// QOSync — Trajectory Windows
// ─────────────────────────────────────────────────────────────────────
//! Post-transient windows over measure series.

use qosync_types::{MeasureWindow, QomError, QomResult};

/// Samples of `series` inside `window`.
pub fn window_slice<'a, T>(series: &'a [T], window: &MeasureWindow) -> QomResult<&'a [T]> {
    let (start, end) = window.resolve(series.len())?;
    Ok(&series[start..end])
}

/// Mean of `series` over `window`; non-finite samples are rejected.
pub fn window_mean(series: &[f64], window: &MeasureWindow) -> QomResult<f64> {
    let slice = window_slice(series, window)?;
    if let Some(i) = slice.iter().position(|x| !x.is_finite()) {
        return Err(QomError::Malformed(format!(
            "non-finite sample at window offset {i}"
        )));
    }
    Ok(slice.iter().sum::<f64>() / slice.len() as f64)
}
