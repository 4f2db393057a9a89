//! Per-neuron abstract transformers.
//!
//! Each transformer replaces a scalar nonlinearity `f` over an interval
//! `[l, u]` by a triplet `(λ, μ, E)` such that
//! `f(x) ∈ [λx + μ - E, λx + μ + E]` for every `x ∈ [l, u]`.
//! Neurons are handled independently from their own interval.
//!
//! - [`relu_neuron`]: minimal-area triangle relaxation of `max(x, 0)`.
//! - [`round_clamp_neuron`]: relaxation of `clamp(round(x), 0, Cub)` with a
//!   six-way case split on `[l, u]` against `0` and `Cub`.

use ndarray::Array1;
use qzono_core::Bound;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// `(λ, μ, E)` for a single neuron.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NeuronTriplet {
    pub lambda: f64,
    pub mu: f64,
    pub error: f64,
}

impl NeuronTriplet {
    #[inline]
    pub const fn new(lambda: f64, mu: f64, error: f64) -> Self {
        Self { lambda, mu, error }
    }

    /// The constant function `value`.
    #[inline]
    pub const fn constant(value: f64) -> Self {
        Self::new(0.0, value, 0.0)
    }

    /// Slope `λ` with the band between intercepts `b2 <= b1`.
    #[inline]
    fn from_intercepts(lambda: f64, b1: f64, b2: f64) -> Self {
        Self::new(lambda, 0.5 * (b1 + b2), 0.5 * (b1 - b2))
    }

    /// Band `[λx + μ - E, λx + μ + E]` at `x`.
    #[inline]
    pub fn band_at(&self, x: f64) -> Bound {
        Bound::from_center_radius(self.lambda * x + self.mu, self.error)
    }
}

/// Diagonal triplet for a whole layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Triplet {
    pub lambda: Array1<f64>,
    pub mu: Array1<f64>,
    pub error: Array1<f64>,
}

impl Triplet {
    pub fn dim(&self) -> usize {
        self.lambda.len()
    }
}

impl FromIterator<NeuronTriplet> for Triplet {
    fn from_iter<I: IntoIterator<Item = NeuronTriplet>>(iter: I) -> Self {
        let neurons: Vec<NeuronTriplet> = iter.into_iter().collect();
        Self {
            lambda: neurons.iter().map(|t| t.lambda).collect(),
            mu: neurons.iter().map(|t| t.mu).collect(),
            error: neurons.iter().map(|t| t.error).collect(),
        }
    }
}

// =============================================================================
// ReLU
// =============================================================================

/// Stability of a ReLU neuron over its input interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReluCase {
    /// `u <= 0`
    Inactive,
    /// `l >= 0`
    Active,
    /// `l < 0 < u`
    Unstable,
}

/// ReLU relaxation over `[l, u]`.
pub fn relu_neuron(bound: &Bound) -> (NeuronTriplet, ReluCase) {
    let (l, u) = (bound.lower, bound.upper);
    if u <= 0.0 {
        (NeuronTriplet::constant(0.0), ReluCase::Inactive)
    } else if l >= 0.0 {
        (NeuronTriplet::new(1.0, 0.0, 0.0), ReluCase::Active)
    } else {
        let lambda = u / (u - l);
        let offset = -u * l / (2.0 * (u - l));
        (NeuronTriplet::new(lambda, offset, offset), ReluCase::Unstable)
    }
}

/// ReLU relaxation of every neuron of a layer.
pub fn relu_triplet(bounds: &[Bound]) -> (Triplet, Vec<ReluCase>) {
    let (neurons, cases): (Vec<_>, Vec<_>) = bounds.iter().map(relu_neuron).unzip();
    (neurons.into_iter().collect(), cases)
}

// =============================================================================
// Round and clamp
// =============================================================================

/// Position of `[l, u]` relative to the clamp range `[0, Cub]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoundClampCase {
    /// `u <= 0`: constant 0.
    Zero,
    /// `l >= Cub`: constant `Cub`.
    Saturated,
    /// `0 <= l, u <= Cub`: identity plus rounding.
    Interior,
    /// `l <= 0, u >= Cub`
    SpansBoth,
    /// `l <= 0, u <= Cub`
    SpansLower,
    /// `0 < l < Cub < u`
    SpansUpper,
}

impl RoundClampCase {
    pub const COUNT: usize = 6;

    /// Position in `0..COUNT`, in declaration order.
    pub const fn index(self) -> usize {
        match self {
            RoundClampCase::Zero => 0,
            RoundClampCase::Saturated => 1,
            RoundClampCase::Interior => 2,
            RoundClampCase::SpansBoth => 3,
            RoundClampCase::SpansLower => 4,
            RoundClampCase::SpansUpper => 5,
        }
    }
}

/// `clamp(round(x), 0, Cub)` with ties rounded away from zero.
#[inline]
pub fn round_clamp(x: f64, ceiling: f64) -> f64 {
    x.round().clamp(0.0, ceiling)
}

/// Closed-form round-and-clamp relaxation.
///
/// Sound for every integer in `[l, u]`; see [`round_clamp_neuron`] for
/// real-valued inputs.
pub fn round_clamp_formula(bound: &Bound, ceiling: f64) -> (NeuronTriplet, RoundClampCase) {
    let (l, u, cub) = (bound.lower, bound.upper, ceiling);

    if u <= 0.0 {
        return (NeuronTriplet::constant(0.0), RoundClampCase::Zero);
    }
    if l >= cub {
        return (NeuronTriplet::constant(cub), RoundClampCase::Saturated);
    }
    if l >= 0.0 && u <= cub {
        return (NeuronTriplet::new(1.0, 0.0, 0.5), RoundClampCase::Interior);
    }

    if l <= 0.0 && u >= cub {
        let steep_from_top = (cub - l <= u && cub - l >= 0.5) || (u <= cub - l && l >= -0.5);
        let a = if steep_from_top {
            cub / (u - 0.5)
        } else {
            cub / (cub - l - 0.5)
        };
        let b1 = (-a * l).max(cub - a * (cub - 0.5));
        let b2 = (-0.5 * a).min(cub - a * u);
        return (
            NeuronTriplet::from_intercepts(a, b1, b2),
            RoundClampCase::SpansBoth,
        );
    }

    if l <= 0.0 {
        let ru = u.round();
        if ru == 0.0 {
            return (NeuronTriplet::constant(0.0), RoundClampCase::SpansLower);
        }
        let a = ru / (ru - l - 0.5);
        let b1 = -a * l;
        let b2 = -0.5 * a;
        return (
            NeuronTriplet::from_intercepts(a, b1, b2),
            RoundClampCase::SpansLower,
        );
    }

    let rl = l.round();
    if rl == cub {
        return (NeuronTriplet::constant(cub), RoundClampCase::SpansUpper);
    }
    let a = (cub - rl) / (u - rl - 0.5);
    let b1 = cub - a * (cub - 0.5);
    let b2 = cub - a * u;
    (
        NeuronTriplet::from_intercepts(a, b1, b2),
        RoundClampCase::SpansUpper,
    )
}

/// Exact range of `round_clamp(x) - λx` over `x ∈ [l, u]`.
///
/// Between rounding jumps the deviation is linear in `x`, and across steps
/// its extremes move linearly in the step index, so it suffices to look at
/// the endpoints and at both sides of the first and last jump.
pub fn staircase_deviation(bound: &Bound, ceiling: f64, lambda: f64) -> Bound {
    let (l, u) = (bound.lower, bound.upper);
    let deviation = |x: f64, y: f64| y - lambda * x;

    let mut range = Bound::concrete(deviation(l, round_clamp(l, ceiling)))
        .include(deviation(u, round_clamp(u, ceiling)));

    // Smallest k with k + 0.5 > l; a jump at l itself is already the endpoint.
    let first = ((l - 0.5).floor() + 1.0).max(0.0);
    let last = (u - 0.5).floor().min(ceiling - 1.0);
    if first <= last {
        for k in [first, last] {
            let jump = k + 0.5;
            if l < jump && jump <= u {
                range = range.include(deviation(jump, k)).include(deviation(jump, k + 1.0));
            }
        }
    }
    range
}

/// Round-and-clamp relaxation sound for real-valued `x ∈ [l, u]`.
///
/// Applies [`round_clamp_formula`] and widens `(μ, E)` to the exact
/// staircase deviation when the formula band does not already contain it.
pub fn round_clamp_neuron(bound: &Bound, ceiling: f64) -> (NeuronTriplet, RoundClampCase) {
    let (triplet, case) = round_clamp_formula(bound, ceiling);
    let band = Bound::from_center_radius(triplet.mu, triplet.error);
    let deviation = staircase_deviation(bound, ceiling, triplet.lambda);
    if band.encloses(&deviation) {
        return (triplet, case);
    }

    let widened = band.union(&deviation);
    trace!(
        lower = bound.lower,
        upper = bound.upper,
        ?case,
        error = triplet.error,
        widened = widened.radius(),
        "widening round-clamp triplet"
    );
    (
        NeuronTriplet::new(triplet.lambda, widened.midpoint(), widened.radius()),
        case,
    )
}

/// Round-and-clamp relaxation of every neuron of a layer.
pub fn round_clamp_triplet(bounds: &[Bound], ceiling: f64) -> (Triplet, Vec<RoundClampCase>) {
    let (neurons, cases): (Vec<_>, Vec<_>) = bounds
        .iter()
        .map(|b| round_clamp_neuron(b, ceiling))
        .unzip();
    (neurons.into_iter().collect(), cases)
}
