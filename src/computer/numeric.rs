//! Small numeric helpers shared by the attention computers.
//!
//! All division guards live here so the fallback policy can be read in one
//! place.

use crate::history::{mean, ReturnHistory};

/// `num / den`, or `fallback` when the denominator is zero or not finite.
///
/// Used for every mastering-rate normalization. The computers pass the task's
/// previous rate as the fallback, so a collapsed `[min, max]` range freezes the
/// rate instead of producing NaN.
///
/// Rates start at 0, so a task whose returns never vary keeps rate 0 for
/// good. Under ancestor gating (`lp_pot_rr`, and `nlp_pot_manc_rd` without
/// initial bounds) every dependent of such a task stays at zero attention.
/// Pass initial bounds when a task may plateau at a constant return.
pub fn safe_ratio(num: f64, den: f64, fallback: f64) -> f64 {
    if den == 0.0 || !den.is_finite() {
        fallback
    } else {
        num / den
    }
}

/// Mastering rate of `ret` within `[lo, hi]`, clipping `ret` into the range first.
///
/// Unknown bounds (two-stage bounds not yet committed) also take the fallback.
pub fn mastering_rate(ret: f64, lo: Option<f64>, hi: Option<f64>, previous: f64) -> f64 {
    match (lo, hi) {
        (Some(lo), Some(hi)) if lo <= hi => safe_ratio(ret.clamp(lo, hi) - lo, hi - lo, previous),
        _ => previous,
    }
}

pub fn absolute(values: &[f64]) -> Vec<f64> {
    values.iter().map(|v| v.abs()).collect()
}

/// Divide by the maximum; left untouched when the maximum is exactly zero.
pub fn normalize_by_max(values: &[f64]) -> Vec<f64> {
    let max = values.iter().copied().fold(0.0_f64, f64::max);
    if max == 0.0 {
        values.to_vec()
    } else {
        values.iter().map(|v| v / max).collect()
    }
}

/// `(1 - prop) * a + prop * b`, element-wise.
pub fn convex_blend(a: &[f64], b: &[f64], prop: f64) -> Vec<f64> {
    a.iter()
        .zip(b)
        .map(|(x, y)| (1.0 - prop) * x + prop * y)
        .collect()
}

/// `a + coef * b`, element-wise.
pub fn weighted_blend(a: &[f64], b: &[f64], coef: f64) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| x + coef * y).collect()
}

/// Mean of the most recent `k` returns of a task.
pub fn windowed_mean(history: &ReturnHistory, k: usize) -> Option<f64> {
    mean(history.last(k).1)
}
