//! Fixed-point quantization for neural network error analysis.
//!
//! - [`QuantParams`]: one fixed-point format (strategy, bit width, scaling)
//! - [`QuantConfig`]: formats for input, weights, biases and activations
//! - [`quantize_scalar`] / [`quantize_array`]: elementwise quantization
//! - [`quantize_zonotope`]: box over-approximation of a quantized region
//!
//! ## Usage
//!
//! ```ignore
//! use qzono_quantize::{quantize_scalar, QuantParams};
//!
//! let int4 = QuantParams::symmetric(4, 0)?;
//! assert_eq!(quantize_scalar(100.0, &int4), 7.0);
//! assert_eq!(quantize_scalar(-100.0, &int4), -8.0);
//! ```

pub mod config;
pub mod fixed_point;
pub mod region;

pub use config::{QuantConfig, QuantParams, QuantRole, QuantStrategy, MAX_BITS, MAX_SCALING};
pub use fixed_point::{quantize_array, quantize_scalar, rounding_error_range};
pub use region::{
    quantize_region, quantize_zonotope, quantize_zonotope_per_dimension, quantized_hull,
    InputQuantization, MAX_VERTEX_ENUMERATION_DIM,
};
