//! Quantization of zonotope regions.
//!
//! The quantized image of a zonotope is over-approximated by an axis-aligned
//! box, discarding all correlation between dimensions. Two ways of computing
//! that box are offered:
//!
//! - **Vertex enumeration**: quantize every corner of the interval hull and
//!   take the bounding box. Cost is `2^n` in the input dimension, so it is
//!   refused above a dimension cap.
//! - **Per dimension**: since the scalar quantizer is monotone, the same box
//!   is `[q(l_i), q(u_i)]` per dimension, computed in `O(n)`.

use crate::{quantize_scalar, QuantParams};
use qzono_core::{Bound, QzonoError, Result};
use qzono_zonotope::{box_to_zonotope, box_vertices, vertices_to_box, Zonotope};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default cap for vertex enumeration (65 536 vertices).
pub const MAX_VERTEX_ENUMERATION_DIM: usize = 16;

/// How the input region is quantized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputQuantization {
    /// Enumerate the `2^n` hull vertices; fails above the dimension cap.
    VertexEnumeration,
    /// Closed-form per-dimension box.
    PerDimension,
    /// Enumerate up to the cap, closed form above it.
    #[default]
    Auto,
}

impl std::fmt::Display for InputQuantization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputQuantization::VertexEnumeration => write!(f, "vertex_enumeration"),
            InputQuantization::PerDimension => write!(f, "per_dimension"),
            InputQuantization::Auto => write!(f, "auto"),
        }
    }
}

/// Quantize a zonotope by enumerating the vertices of its interval hull.
///
/// Returns the axis-aligned zonotope of the quantized vertices' bounding box.
pub fn quantize_zonotope(z: &Zonotope, params: &QuantParams, max_dim: usize) -> Result<Zonotope> {
    let hull = z.finite_interval_hull()?;
    let quantized: Vec<_> = box_vertices(&hull, max_dim)?
        .into_iter()
        .map(|v| v.mapv(|x| quantize_scalar(x, params)))
        .collect();
    if quantized.is_empty() {
        return Err(QzonoError::NumericalInstability(
            "vertex enumeration produced no vertices".to_string(),
        ));
    }
    Ok(box_to_zonotope(&vertices_to_box(&quantized)?))
}

/// Closed-form equivalent of [`quantize_zonotope`], linear in the dimension.
pub fn quantize_zonotope_per_dimension(z: &Zonotope, params: &QuantParams) -> Result<Zonotope> {
    Ok(box_to_zonotope(&quantized_hull(&z.finite_interval_hull()?, params)))
}

/// `[q(l_i), q(u_i)]` for each interval.
pub fn quantized_hull(hull: &[Bound], params: &QuantParams) -> Vec<Bound> {
    hull.iter()
        .map(|b| Bound::new(quantize_scalar(b.lower, params), quantize_scalar(b.upper, params)))
        .collect()
}

/// Quantize a region with the chosen method.
///
/// Returns the quantized zonotope and the method that was actually applied
/// (`Auto` resolves to one of the other two).
pub fn quantize_region(
    z: &Zonotope,
    params: &QuantParams,
    method: InputQuantization,
    max_vertex_dim: usize,
) -> Result<(Zonotope, InputQuantization)> {
    match method {
        InputQuantization::VertexEnumeration => Ok((
            quantize_zonotope(z, params, max_vertex_dim)?,
            InputQuantization::VertexEnumeration,
        )),
        InputQuantization::PerDimension => Ok((
            quantize_zonotope_per_dimension(z, params)?,
            InputQuantization::PerDimension,
        )),
        InputQuantization::Auto if z.dim() <= max_vertex_dim => {
            debug!(dim = z.dim(), "quantizing input region by vertex enumeration");
            Ok((
                quantize_zonotope(z, params, max_vertex_dim)?,
                InputQuantization::VertexEnumeration,
            ))
        }
        InputQuantization::Auto => {
            warn!(
                dim = z.dim(),
                limit = max_vertex_dim,
                "input dimension exceeds vertex enumeration cap, using per-dimension quantization"
            );
            Ok((
                quantize_zonotope_per_dimension(z, params)?,
                InputQuantization::PerDimension,
            ))
        }
    }
}
