//! Minimal geometry over boxes and zonotopes.
//!
//! Free-function forms of the operations the quantizer and the propagation
//! engine need: affine map, interval hull, box vertices, vertices to box and
//! box to zonotope.

use crate::Zonotope;
use ndarray::{Array1, Array2, Axis};
use qzono_core::{ensure_dim, Bound, QzonoError, Result};
use tracing::trace;

/// Exact affine image of a zonotope.
pub fn affine_map(z: &Zonotope, weight: &Array2<f64>, bias: &Array1<f64>) -> Result<Zonotope> {
    z.affine_map(weight, bias)
}

/// Axis-aligned bounding box of a zonotope.
pub fn interval_hull(z: &Zonotope) -> Vec<Bound> {
    z.interval_hull()
}

/// All `2^n` corners of a box, lowest dimension varying fastest.
///
/// Refuses boxes with more than `max_dim` dimensions.
pub fn box_vertices(bounds: &[Bound], max_dim: usize) -> Result<Vec<Array1<f64>>> {
    let n = bounds.len();
    if n > max_dim || n >= usize::BITS as usize {
        return Err(QzonoError::DimensionLimit {
            dim: n,
            limit: max_dim,
        });
    }
    let count = 1usize << n;
    trace!(dim = n, vertices = count, "enumerating box vertices");

    Ok((0..count)
        .map(|mask| {
            Array1::from_iter(bounds.iter().enumerate().map(|(i, b)| {
                if (mask >> i) & 1 == 1 {
                    b.upper
                } else {
                    b.lower
                }
            }))
        })
        .collect())
}

/// Bounding box of a finite point set.
pub fn vertices_to_box(vertices: &[Array1<f64>]) -> Result<Vec<Bound>> {
    let first = vertices.first().ok_or_else(|| {
        QzonoError::InvalidConfig("cannot bound an empty vertex set".to_string())
    })?;
    let mut bounds: Vec<Bound> = first.iter().map(|&v| Bound::concrete(v)).collect();
    for vertex in &vertices[1..] {
        ensure_dim("vertex dimension", bounds.len(), vertex.len())?;
        for (b, &v) in bounds.iter_mut().zip(vertex.iter()) {
            *b = b.include(v);
        }
    }
    Ok(bounds)
}

/// Axis-aligned zonotope of a box.
pub fn box_to_zonotope(bounds: &[Bound]) -> Zonotope {
    Zonotope::from_bounds(bounds)
}

/// `diag(factors) · matrix`, i.e. row `i` multiplied by `factors[i]`.
pub fn scale_rows(factors: &Array1<f64>, matrix: &Array2<f64>) -> Result<Array2<f64>> {
    ensure_dim("row scaling", matrix.nrows(), factors.len())?;
    Ok(matrix * &factors.view().insert_axis(Axis(1)))
}
