//! Sound zonotope propagation of fixed-point quantization error.
//!
//! Given a feed-forward ReLU network, a quantization configuration and an
//! input region, [`quantization_error_zonotope`] returns a zonotope that
//! contains `forward_quantized(x) - forward(x)` for every `x` in the region.
//!
//! - [`transformers`]: per-neuron ReLU and round-and-clamp triplets
//! - [`network`]: layers, networks and concrete forward passes
//! - [`engine`]: the three-zonotope error recurrence
//! - [`loader`]: JSON network loading
//! - [`empirical`]: Monte-Carlo error sampling for cross-validation
//! - [`parallel`]: batch propagation across input regions
//!
//! # Example
//! ```ignore
//! use qzono_propagate::{load_network_json, quantization_error_zonotope, QuantConfig, Zonotope};
//!
//! let network = load_network_json(&json)?;
//! let error = quantization_error_zonotope(&network, &QuantConfig::default(), &region)?;
//! for bound in error.interval_hull() {
//!     println!("{bound}");
//! }
//! ```

pub mod empirical;
pub mod engine;
pub mod loader;
pub mod network;
pub mod parallel;
pub mod transformers;

pub use empirical::{EmpiricalSampler, SamplerConfig};
pub use engine::{
    quantization_error_zonotope, EngineConfig, ErrorPropagator, LayerTrace, QuantErrorResult,
};
pub use loader::{load_network_json, load_network_path};
pub use network::{Activation, FixedPointNetwork, Layer, Network, ScaledLayer};
pub use parallel::{quantization_error_batch, BatchConfig, BatchPropagator};
pub use transformers::{
    relu_neuron, relu_triplet, round_clamp, round_clamp_formula, round_clamp_neuron,
    round_clamp_triplet, staircase_deviation, NeuronTriplet, ReluCase, RoundClampCase, Triplet,
};

pub use qzono_core::{Bound, QzonoError, Result};
pub use qzono_quantize::{InputQuantization, QuantConfig, QuantParams, QuantRole, QuantStrategy};
pub use qzono_zonotope::Zonotope;

#[cfg(test)]
mod tests;
