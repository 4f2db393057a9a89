//! Core types for zonotope-based quantization error analysis.
//!
//! This crate provides the interval type returned when a zonotope is
//! concretized and the error taxonomy shared by the quantization and
//! propagation crates.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A bound on a scalar value: [lower, upper].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub lower: f64,
    pub upper: f64,
}

impl Bound {
    /// Create a new bound.
    #[inline]
    pub fn new(lower: f64, upper: f64) -> Self {
        debug_assert!(lower <= upper, "Invalid bound: {lower} > {upper}");
        Self { lower, upper }
    }

    /// Create a concrete (point) bound.
    #[inline]
    pub fn concrete(value: f64) -> Self {
        Self {
            lower: value,
            upper: value,
        }
    }

    /// Bound described by its midpoint and (non-negative) radius.
    #[inline]
    pub fn from_center_radius(center: f64, radius: f64) -> Self {
        debug_assert!(radius >= 0.0, "Negative radius: {radius}");
        Self {
            lower: center - radius,
            upper: center + radius,
        }
    }

    /// Check if this bound contains a value.
    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }

    /// Check if this bound contains another bound entirely.
    #[inline]
    pub fn encloses(&self, other: &Bound) -> bool {
        self.lower <= other.lower && other.upper <= self.upper
    }

    /// Width of the bound interval.
    #[inline]
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    #[inline]
    pub fn midpoint(&self) -> f64 {
        0.5 * (self.lower + self.upper)
    }

    #[inline]
    pub fn radius(&self) -> f64 {
        0.5 * (self.upper - self.lower)
    }

    /// Check if bounds have exploded to infinity or NaN.
    #[inline]
    pub fn is_unbounded(&self) -> bool {
        !self.lower.is_finite() || !self.upper.is_finite()
    }

    /// Union of two bounds (convex hull).
    #[inline]
    pub fn union(&self, other: &Bound) -> Bound {
        Bound {
            lower: self.lower.min(other.lower),
            upper: self.upper.max(other.upper),
        }
    }

    /// Smallest bound containing this one and `value`.
    #[inline]
    pub fn include(&self, value: f64) -> Bound {
        Bound {
            lower: self.lower.min(value),
            upper: self.upper.max(value),
        }
    }
}

impl std::fmt::Display for Bound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:.6e}, {:.6e}]", self.lower, self.upper)
    }
}

/// Error types for quantization error analysis.
///
/// Every failure is terminal for the call that produced it: the analysis is
/// a deterministic pure function of its inputs, so nothing is retried.
#[derive(Debug, Error)]
pub enum QzonoError {
    #[error("Shape mismatch in {context}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        context: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Unsupported activation: {0}")]
    UnsupportedActivation(String),

    #[error("Invalid quantization configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid network: {0}")]
    InvalidNetwork(String),

    #[error("Vertex enumeration over {dim} dimensions exceeds the limit of {limit}")]
    DimensionLimit { dim: usize, limit: usize },

    #[error("Numerical instability: {0}")]
    NumericalInstability(String),

    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Layer {layer_index} ({activation}) failed: {source}")]
    LayerError {
        layer_index: usize,
        activation: String,
        #[source]
        source: Box<QzonoError>,
    },
}

impl QzonoError {
    /// Create a ShapeMismatch error, panicking if shapes are identical (bug indicator).
    #[track_caller]
    pub fn shape_mismatch(context: impl Into<String>, expected: Vec<usize>, got: Vec<usize>) -> Self {
        if expected == got {
            let loc = std::panic::Location::caller();
            panic!(
                "BUG at {}:{}:{}: ShapeMismatch created with identical shapes: {:?}.",
                loc.file(),
                loc.line(),
                loc.column(),
                expected
            );
        }
        QzonoError::ShapeMismatch {
            context: context.into(),
            expected,
            got,
        }
    }

    /// Attach the position of the failing layer.
    pub fn in_layer(self, layer_index: usize, activation: impl Into<String>) -> Self {
        QzonoError::LayerError {
            layer_index,
            activation: activation.into(),
            source: Box::new(self),
        }
    }
}

pub type Result<T> = std::result::Result<T, QzonoError>;

/// Check that two dimensions agree, producing a ShapeMismatch otherwise.
#[inline]
#[track_caller]
pub fn ensure_dim(context: &str, expected: usize, got: usize) -> Result<()> {
    if expected == got {
        Ok(())
    } else {
        Err(QzonoError::shape_mismatch(context, vec![expected], vec![got]))
    }
}
