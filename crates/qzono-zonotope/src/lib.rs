//! Zonotope abstract domain.
//!
//! A zonotope is the set `{c + G·ξ : ξ ∈ [-1, 1]^m}` for a center `c ∈ R^n`
//! and a generator matrix `G ∈ R^{n×m}` whose columns are independent noise
//! symbols. Zonotopes are closed under affine maps, so [`Zonotope::affine_map`]
//! is exact; [`Zonotope::interval_hull`] is the exact axis-aligned box.
//!
//! There is no generator reduction. Every nonlinear layer appends columns and
//! the cost of each later affine map grows with them (see the `propagation`
//! benchmarks in `qzono-propagate`).
//!
//! # Example
//! ```ignore
//! use ndarray::{arr1, arr2};
//! use qzono_zonotope::Zonotope;
//!
//! let z = Zonotope::new(arr1(&[0.0, 0.0]), arr2(&[[0.01, 0.0], [0.0, 0.01]]))?;
//! let y = z.affine_map(&arr2(&[[1.0, 0.5]]), &arr1(&[0.1]))?;
//! let hull = y.interval_hull();
//! ```

pub mod geometry;

use ndarray::{s, Array1, Array2, Axis};
use qzono_core::{ensure_dim, Bound, QzonoError, Result};

pub use geometry::{
    affine_map, box_to_zonotope, box_vertices, interval_hull, scale_rows, vertices_to_box,
};

/// Immutable zonotope value: center vector and generator columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Zonotope {
    center: Array1<f64>,
    generators: Array2<f64>,
}

impl Zonotope {
    /// Create a zonotope, checking that generator rows match the center.
    pub fn new(center: Array1<f64>, generators: Array2<f64>) -> Result<Self> {
        ensure_dim("zonotope generator rows", center.len(), generators.nrows())?;
        if center.iter().chain(generators.iter()).any(|v| !v.is_finite()) {
            return Err(QzonoError::NumericalInstability(
                "zonotope has non-finite center or generator entries".to_string(),
            ));
        }
        Ok(Self { center, generators })
    }

    /// A single point (no generators).
    pub fn point(center: Array1<f64>) -> Self {
        let n = center.len();
        Self {
            center,
            generators: Array2::zeros((n, 0)),
        }
    }

    /// Axis-aligned zonotope of a box, one generator per dimension.
    pub fn from_bounds(bounds: &[Bound]) -> Self {
        let center = Array1::from_iter(bounds.iter().map(Bound::midpoint));
        let radii = Array1::from_iter(bounds.iter().map(Bound::radius));
        Self {
            center,
            generators: Array2::from_diag(&radii),
        }
    }

    #[inline]
    pub fn center(&self) -> &Array1<f64> {
        &self.center
    }

    #[inline]
    pub fn generators(&self) -> &Array2<f64> {
        &self.generators
    }

    /// Dimension `n` of the ambient space.
    #[inline]
    pub fn dim(&self) -> usize {
        self.center.len()
    }

    /// Number of generators (noise symbols) `m`.
    #[inline]
    pub fn num_generators(&self) -> usize {
        self.generators.ncols()
    }

    /// Exact image under `x -> W·x + b`.
    pub fn affine_map(&self, weight: &Array2<f64>, bias: &Array1<f64>) -> Result<Self> {
        ensure_dim("affine map input", weight.ncols(), self.dim())?;
        ensure_dim("affine map bias", weight.nrows(), bias.len())?;
        Ok(Self {
            center: weight.dot(&self.center) + bias,
            generators: weight.dot(&self.generators),
        })
    }

    /// Uniform scaling of center and generators.
    pub fn scale(&self, factor: f64) -> Self {
        Self {
            center: &self.center * factor,
            generators: &self.generators * factor,
        }
    }

    /// Per-dimension generator radius `Σ_j |G_ij|`.
    pub fn radii(&self) -> Array1<f64> {
        self.generators.mapv(f64::abs).sum_axis(Axis(1))
    }

    /// Interval hull `c_i ± Σ_j |G_ij|`.
    pub fn interval_hull(&self) -> Vec<Bound> {
        self.center
            .iter()
            .zip(self.radii().iter())
            .map(|(&c, &r)| Bound::from_center_radius(c, r))
            .collect()
    }

    /// Interval hull, failing if any coordinate is infinite or NaN.
    pub fn finite_interval_hull(&self) -> Result<Vec<Bound>> {
        let hull = self.interval_hull();
        if let Some((i, b)) = hull.iter().enumerate().find(|(_, b)| b.is_unbounded()) {
            return Err(QzonoError::NumericalInstability(format!(
                "interval hull of dimension {i} is not finite: {b}"
            )));
        }
        Ok(hull)
    }

    /// Minkowski sum by concatenation: centers add, generator sets are kept
    /// side by side, so the result has `m_self + m_other` generators.
    pub fn minkowski_sum(&self, other: &Zonotope) -> Result<Self> {
        ensure_dim("minkowski sum", self.dim(), other.dim())?;
        Ok(Self {
            center: &self.center + &other.center,
            generators: concat_columns(&self.generators, &other.generators),
        })
    }

    /// Append generator columns (must have `n` rows).
    pub fn with_generators(&self, columns: &Array2<f64>) -> Result<Self> {
        ensure_dim("appended generator rows", self.dim(), columns.nrows())?;
        Ok(Self {
            center: self.center.clone(),
            generators: concat_columns(&self.generators, columns),
        })
    }

    /// Append `extra` all-zero generator columns.
    pub fn pad_generators(&self, extra: usize) -> Self {
        Self {
            center: self.center.clone(),
            generators: concat_columns(&self.generators, &Array2::zeros((self.dim(), extra))),
        }
    }

    /// Concrete point `c + G·ξ` for a noise assignment `ξ`.
    pub fn point_at(&self, xi: &Array1<f64>) -> Result<Array1<f64>> {
        ensure_dim("noise assignment", self.num_generators(), xi.len())?;
        Ok(&self.center + &self.generators.dot(xi))
    }
}

/// `[a | b]` for matrices with equal row counts.
pub(crate) fn concat_columns(a: &Array2<f64>, b: &Array2<f64>) -> Array2<f64> {
    debug_assert_eq!(a.nrows(), b.nrows());
    let split = a.ncols();
    let mut out = Array2::zeros((a.nrows(), split + b.ncols()));
    out.slice_mut(s![.., ..split]).assign(a);
    out.slice_mut(s![.., split..]).assign(b);
    out
}
