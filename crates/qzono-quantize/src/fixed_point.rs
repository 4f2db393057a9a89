//! Elementwise fixed-point quantization.
//!
//! Rounding is half-away-from-zero (`f64::round`) everywhere in this
//! workspace, including the round-clamp transformer in `qzono-propagate`.

use crate::QuantParams;
use ndarray::{Array, ArrayBase, Data, Dimension};
use qzono_core::Bound;

/// `clamp(round(x · 2^s), lo, hi) · 2^-s`.
#[inline]
pub fn quantize_scalar(x: f64, params: &QuantParams) -> f64 {
    let (lo, hi) = params.int_range();
    (x * params.scale_factor()).round().clamp(lo, hi) * params.step()
}

/// Elementwise [`quantize_scalar`].
pub fn quantize_array<S, D>(values: &ArrayBase<S, D>, params: &QuantParams) -> Array<f64, D>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    values.mapv(|x| quantize_scalar(x, params))
}

/// Range of the quantization error `q(x) - x` over `x ∈ bound`.
///
/// Inside the representable range the error is at most half a step; beyond
/// it the clamp adds the distance to the nearest representable value.
pub fn rounding_error_range(bound: &Bound, params: &QuantParams) -> Bound {
    let half_step = 0.5 * params.step();
    let representable = params.representable_range();
    Bound::new(
        -half_step + (representable.upper - bound.upper).min(0.0),
        half_step + (representable.lower - bound.lower).max(0.0),
    )
}
