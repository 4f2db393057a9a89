//! Monte-Carlo estimate of the quantization error.
//!
//! Samples points from a zonotope, evaluates the fixed-point and the real
//! network on each, and records the per-output min/max of the difference.
//! The result is an under-approximation and only serves to cross-check the
//! sound enclosure computed by the engine.
//!
//! Sampling is split into fixed-size chunks, each with its own seed
//! (`seed + chunk`), so results do not depend on the number of threads.

use crate::network::Network;
use ndarray::Array1;
use qzono_core::{ensure_dim, Bound, QzonoError, Result};
use qzono_quantize::QuantConfig;
use qzono_zonotope::Zonotope;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Configuration for empirical sampling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Total number of sampled points.
    pub num_samples: usize,
    /// Fraction of samples drawn from the corners `ξ ∈ {-1, 1}^m`.
    pub vertex_fraction: f64,
    /// Base seed; chunk `k` uses `seed + k`.
    pub seed: u64,
    /// Samples per chunk.
    pub chunk_size: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            num_samples: 10_000,
            vertex_fraction: 0.3,
            seed: 42,
            chunk_size: 1024,
        }
    }
}

/// Empirical error sampler.
#[derive(Debug, Clone)]
pub struct EmpiricalSampler {
    config: SamplerConfig,
}

impl EmpiricalSampler {
    pub fn new(config: SamplerConfig) -> Result<Self> {
        if !(0.0..=1.0).contains(&config.vertex_fraction) {
            return Err(QzonoError::InvalidConfig(format!(
                "vertex fraction {} is outside [0, 1]",
                config.vertex_fraction
            )));
        }
        if config.num_samples == 0 || config.chunk_size == 0 {
            return Err(QzonoError::InvalidConfig(
                "sample count and chunk size must be positive".to_string(),
            ));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Per-output min/max of `forward_quantized(x) - forward(x)` over samples.
    pub fn sample_error(
        &self,
        network: &Network,
        quant: &QuantConfig,
        region: &Zonotope,
    ) -> Result<Vec<Bound>> {
        ensure_dim("sampled region", network.input_dim(), region.dim())?;
        let fixed = network.fixed_point(quant)?;
        let num_chunks = self.config.num_samples.div_ceil(self.config.chunk_size);
        info!(
            samples = self.config.num_samples,
            chunks = num_chunks,
            "sampling quantization error"
        );

        let chunk_bounds = (0..num_chunks)
            .into_par_iter()
            .map(|chunk| {
                let start = chunk * self.config.chunk_size;
                let count = self.config.chunk_size.min(self.config.num_samples - start);
                let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(chunk as u64));
                let mut bounds: Option<Vec<Bound>> = None;
                for _ in 0..count {
                    let x = region.point_at(&self.draw_noise(region.num_generators(), &mut rng))?;
                    let error = fixed.error(&x)?;
                    bounds = Some(match bounds {
                        None => error.iter().map(|&e| Bound::concrete(e)).collect(),
                        Some(b) => b.iter().zip(error.iter()).map(|(b, &e)| b.include(e)).collect(),
                    });
                }
                Ok(bounds)
            })
            .collect::<Result<Vec<_>>>()?;

        let merged = chunk_bounds
            .into_iter()
            .flatten()
            .reduce(|a, b| a.iter().zip(b.iter()).map(|(x, y)| x.union(y)).collect())
            .ok_or_else(|| QzonoError::InvalidConfig("no samples drawn".to_string()))?;
        debug!(?merged, "sampled error range");
        Ok(merged)
    }

    /// Noise assignment: a random corner with probability `vertex_fraction`,
    /// otherwise uniform in `[-1, 1]^m`.
    fn draw_noise(&self, m: usize, rng: &mut StdRng) -> Array1<f64> {
        if rng.random_bool(self.config.vertex_fraction) {
            (0..m)
                .map(|_| if rng.random_bool(0.5) { 1.0 } else { -1.0 })
                .collect()
        } else {
            (0..m).map(|_| rng.random_range(-1.0..=1.0)).collect()
        }
    }
}
