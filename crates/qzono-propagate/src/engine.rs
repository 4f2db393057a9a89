//! Quantization error propagation.
//!
//! Three zonotopes are tracked through the network in the integer domain
//! (scale `F = 2^scaling_activations`):
//!
//! - `Z`: the real-valued trajectory,
//! - `Z̃`: the error between quantized and real trajectory,
//! - `Ẑ = Z ⊕ Z̃`: the quantized trajectory, recomputed when needed.
//!
//! `Z` and `Z̃` share their noise symbols: column `j` of both generator
//! matrices belongs to the same symbol, which is what allows the elementwise
//! error recurrences below.
//!
//! Affine layer (with `ΔW = s·Ŵ - s·W`, `Δb = F·b̂ - F·b`):
//! ```text
//! Z̃ <- (ΔW·c + s·Ŵ·c̃ + Δb,  ΔW·G + s·Ŵ·G̃)
//! Z  <- (s·W·c + F·b,       s·W·G)
//! ```
//!
//! ReLU layer, with `(λ, μ, E)` the ReLU triplet of `Z` and `(λ̂, μ̂, Ê)` the
//! round-clamp triplet of `Ẑ`:
//! ```text
//! Z̃ <- (Δλ·c + λ̂·c̃ + Δμ,  [Δλ·G + λ̂·G̃ | -E | Ê])
//! Z  <- (λ·c + μ,           [λ·G        |  E | 0])
//! ```
//! The two relaxation residuals get separate symbols since they are
//! independent. Every ReLU layer of width `w` adds `2w` generators.
//!
//! The result is `Z̃ / F` after the last layer.

use crate::network::{Activation, FixedPointNetwork, Network, ScaledLayer};
use crate::transformers::{relu_triplet, round_clamp_triplet, ReluCase, RoundClampCase};
use ndarray::{Array1, Array2};
use qzono_core::{ensure_dim, Bound, QzonoError, Result};
use qzono_quantize::{
    quantize_region, rounding_error_range, InputQuantization, QuantConfig,
    MAX_VERTEX_ENUMERATION_DIM,
};
use qzono_zonotope::{scale_rows, Zonotope};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, trace};

/// Engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How the input region is quantized.
    pub input_quantization: InputQuantization,
    /// Largest input dimension for vertex enumeration.
    pub max_vertex_dim: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            input_quantization: InputQuantization::Auto,
            max_vertex_dim: MAX_VERTEX_ENUMERATION_DIM,
        }
    }
}

/// Per-layer record of a propagation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerTrace {
    pub layer_index: usize,
    pub activation: Activation,
    /// Generators of the real-valued zonotope after this layer.
    pub exact_generators: usize,
    /// Generators of the error zonotope after this layer.
    pub error_generators: usize,
    /// Interval hull of the error after this layer, in real units.
    pub error_bounds: Vec<Bound>,
    /// ReLU neurons with `l < 0 < u` on the real trajectory.
    pub unstable_neurons: usize,
    /// Round-clamp case counts on the quantized trajectory, by
    /// [`RoundClampCase::index`].
    pub round_clamp_cases: [usize; RoundClampCase::COUNT],
}

/// Result of [`ErrorPropagator::propagate`].
#[derive(Debug, Clone)]
pub struct QuantErrorResult {
    /// Zonotope enclosing `forward_quantized(x) - forward(x)` over the region.
    pub error: Zonotope,
    pub trace: Vec<LayerTrace>,
    /// Input quantization that was applied.
    pub input_quantization: InputQuantization,
}

impl QuantErrorResult {
    /// Interval hull of the error zonotope.
    pub fn error_bounds(&self) -> Vec<Bound> {
        self.error.interval_hull()
    }

    pub fn num_generators(&self) -> usize {
        self.error.num_generators()
    }
}

/// Drives the three-zonotope recurrence across a network.
#[derive(Debug, Clone, Default)]
pub struct ErrorPropagator {
    config: EngineConfig,
}

/// Real-valued zonotope and error zonotope on shared noise symbols.
struct PropagationState {
    exact: Zonotope,
    error: Zonotope,
}

impl ErrorPropagator {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Enclose the quantization error of `network` over `input`.
    #[instrument(skip(self, network, quant, input), fields(layers = network.len(), input_dim = input.dim()))]
    pub fn propagate(
        &self,
        network: &Network,
        quant: &QuantConfig,
        input: &Zonotope,
    ) -> Result<QuantErrorResult> {
        ensure_dim("input region", network.input_dim(), input.dim())?;
        let fixed = network.fixed_point(quant)?;
        let scale = fixed.scale();

        let (mut state, used) = self.initialize(&fixed, input)?;
        info!(
            input_generators = input.num_generators(),
            method = %used,
            scale,
            ceiling = fixed.ceiling(),
            "starting quantization error propagation"
        );

        let mut trace = Vec::with_capacity(fixed.layers().len());
        for (index, layer) in fixed.layers().iter().enumerate() {
            let record = step_layer(&mut state, layer, index, &fixed)
                .map_err(|e| e.in_layer(index, layer.activation.to_string()))?;
            trace.push(record);
        }

        let error = state.error.scale(1.0 / scale);
        debug!(
            generators = error.num_generators(),
            "quantization error propagation finished"
        );
        Ok(QuantErrorResult {
            error,
            trace,
            input_quantization: used,
        })
    }

    /// Build `(Z, Z̃)` from the input region.
    ///
    /// `Ẑ` is the quantized box `[q(l), q(u)]`. On `Z`'s symbols the error is
    /// the affine trend mapping `[l, u]` onto that box, `(ĝ_i / g_i - 1)·G_i`,
    /// and one fresh symbol per dimension carries the residual between the
    /// trend and the actual rounding error.
    fn initialize(
        &self,
        fixed: &FixedPointNetwork,
        input: &Zonotope,
    ) -> Result<(PropagationState, InputQuantization)> {
        let params = fixed.input_params();
        let hull = input.finite_interval_hull()?;
        let (quantized, used) = quantize_region(
            input,
            params,
            self.config.input_quantization,
            self.config.max_vertex_dim,
        )?;
        let quantized_hull = quantized.interval_hull();
        let radii = input.radii();
        let quantized_radii = quantized.radii();

        let n = input.dim();
        let mut trend = Array1::<f64>::zeros(n);
        let mut residual = Array1::<f64>::zeros(n);
        for i in 0..n {
            if radii[i] == 0.0 {
                continue;
            }
            trend[i] = quantized_radii[i] / radii[i] - 1.0;
            let range = rounding_error_range(&hull[i], params);
            let at_lower = quantized_hull[i].lower - hull[i].lower;
            let at_upper = quantized_hull[i].upper - hull[i].upper;
            residual[i] = (range.upper - at_lower.min(at_upper))
                .max(at_lower.max(at_upper) - range.lower);
        }
        trace!(?trend, ?residual, "input quantization error");

        let error_center = quantized.center() - input.center();
        let error = Zonotope::new(error_center, scale_rows(&trend, input.generators())?)?
            .with_generators(&Array2::from_diag(&residual))?;
        let exact = input.pad_generators(n);
        Ok((PropagationState { exact, error }, used))
    }
}

fn step_layer(
    state: &mut PropagationState,
    layer: &ScaledLayer,
    index: usize,
    fixed: &FixedPointNetwork,
) -> Result<LayerTrace> {
    affine_step(state, layer)?;

    let mut unstable_neurons = 0;
    let mut round_clamp_cases = [0; RoundClampCase::COUNT];
    if layer.activation == Activation::ReLU {
        let (relu_cases, rc_cases) = relu_step(state, fixed.ceiling())?;
        unstable_neurons = relu_cases
            .iter()
            .filter(|c| **c == ReluCase::Unstable)
            .count();
        for case in rc_cases {
            round_clamp_cases[case.index()] += 1;
        }
    }

    let error_bounds = state.error.scale(1.0 / fixed.scale()).interval_hull();
    debug!(
        layer = index,
        activation = %layer.activation,
        exact_generators = state.exact.num_generators(),
        error_generators = state.error.num_generators(),
        unstable_neurons,
        "propagated layer"
    );
    Ok(LayerTrace {
        layer_index: index,
        activation: layer.activation,
        exact_generators: state.exact.num_generators(),
        error_generators: state.error.num_generators(),
        error_bounds,
        unstable_neurons,
        round_clamp_cases,
    })
}

fn ensure_aligned(state: &PropagationState) -> Result<()> {
    ensure_dim(
        "error generator alignment",
        state.exact.num_generators(),
        state.error.num_generators(),
    )?;
    ensure_dim("error dimension", state.exact.dim(), state.error.dim())
}

fn affine_step(state: &mut PropagationState, layer: &ScaledLayer) -> Result<()> {
    ensure_aligned(state)?;
    ensure_dim("layer input", layer.input_dim(), state.exact.dim())?;

    let delta_w = &layer.weight_hat - &layer.weight;
    let delta_b = &layer.bias_hat - &layer.bias;
    let (c, g) = (state.exact.center(), state.exact.generators());
    let (ec, eg) = (state.error.center(), state.error.generators());

    let error_center = delta_w.dot(c) + layer.weight_hat.dot(ec) + delta_b;
    let error_generators = delta_w.dot(g) + layer.weight_hat.dot(eg);

    state.error = Zonotope::new(error_center, error_generators)?;
    state.exact = state.exact.affine_map(&layer.weight, &layer.bias)?;
    Ok(())
}

fn relu_step(
    state: &mut PropagationState,
    ceiling: f64,
) -> Result<(Vec<ReluCase>, Vec<RoundClampCase>)> {
    ensure_aligned(state)?;
    let quantized = state.exact.minkowski_sum(&state.error)?;

    let (exact_t, relu_cases) = relu_triplet(&state.exact.finite_interval_hull()?);
    let (quant_t, rc_cases) = round_clamp_triplet(&quantized.finite_interval_hull()?, ceiling);

    let delta_lambda = &quant_t.lambda - &exact_t.lambda;
    let delta_mu = &quant_t.mu - &exact_t.mu;
    let (c, g) = (state.exact.center(), state.exact.generators());
    let (ec, eg) = (state.error.center(), state.error.generators());

    let error_center = &delta_lambda * c + &quant_t.lambda * ec + delta_mu;
    let error_generators = scale_rows(&delta_lambda, g)? + scale_rows(&quant_t.lambda, eg)?;
    let width = c.len();

    state.error = Zonotope::new(error_center, error_generators)?
        .with_generators(&Array2::from_diag(&exact_t.error.mapv(|e| -e)))?
        .with_generators(&Array2::from_diag(&quant_t.error))?;

    let exact_center = &exact_t.lambda * c + &exact_t.mu;
    state.exact = Zonotope::new(exact_center, scale_rows(&exact_t.lambda, g)?)?
        .with_generators(&Array2::from_diag(&exact_t.error))?
        .pad_generators(width);
    Ok((relu_cases, rc_cases))
}

/// Sound enclosure of the quantization error of `network` over `input`,
/// with the default engine configuration.
pub fn quantization_error_zonotope(
    network: &Network,
    quant: &QuantConfig,
    input: &Zonotope,
) -> Result<Zonotope> {
    ErrorPropagator::default()
        .propagate(network, quant, input)
        .map(|result| result.error)
}
