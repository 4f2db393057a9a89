//! Parallel error propagation over many input regions.
//!
//! Engine calls are pure and independent, so a batch of input regions is
//! distributed across rayon workers. Output order matches input order.
//!
//! # Example
//! ```ignore
//! use qzono_propagate::parallel::{BatchConfig, BatchPropagator};
//!
//! let propagator = BatchPropagator::new(BatchConfig::default());
//! let results = propagator.propagate_batch(&network, &quant, &regions)?;
//! ```

use crate::engine::{EngineConfig, ErrorPropagator, QuantErrorResult};
use crate::network::Network;
use qzono_core::{QzonoError, Result};
use qzono_quantize::QuantConfig;
use qzono_zonotope::Zonotope;
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, trace};

/// Configuration for batch propagation.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub engine: EngineConfig,

    /// Minimum number of regions before enabling parallelism.
    /// Below this threshold, serial execution is used to avoid overhead.
    pub min_regions_for_parallel: usize,

    /// Maximum number of threads to use.
    /// None means use rayon's default (typically number of cores).
    pub max_threads: Option<usize>,

    /// Whether to report progress during propagation.
    pub report_progress: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            min_regions_for_parallel: 4,
            max_threads: None,
            report_progress: false,
        }
    }
}

/// Runs the error propagation engine over batches of regions.
pub struct BatchPropagator {
    config: BatchConfig,
}

impl BatchPropagator {
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Propagate every region, in parallel above the configured threshold.
    pub fn propagate_batch(
        &self,
        network: &Network,
        quant: &QuantConfig,
        regions: &[Zonotope],
    ) -> Result<Vec<QuantErrorResult>> {
        let count = regions.len();
        let propagator = ErrorPropagator::new(self.config.engine);

        if count < self.config.min_regions_for_parallel {
            debug!(regions = count, "propagating batch serially");
            return regions
                .iter()
                .map(|region| propagator.propagate(network, quant, region))
                .collect();
        }

        info!(
            regions = count,
            max_threads = ?self.config.max_threads,
            "propagating batch in parallel"
        );

        let pool = match self.config.max_threads {
            Some(threads) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| {
                        QzonoError::InvalidConfig(format!("Failed to create thread pool: {e}"))
                    })?,
            ),
            None => None,
        };

        let progress = AtomicUsize::new(0);
        let report_progress = self.config.report_progress;
        let propagate_one = |(index, region): (usize, &Zonotope)| -> Result<QuantErrorResult> {
            trace!("Propagating region {}/{}", index + 1, count);
            let result = propagator.propagate(network, quant, region)?;
            if report_progress {
                let completed = progress.fetch_add(1, Ordering::Relaxed) + 1;
                if completed % 10 == 0 || completed == count {
                    debug!("Progress: {}/{} regions", completed, count);
                }
            }
            Ok(result)
        };

        match pool {
            Some(pool) => pool.install(|| {
                regions
                    .par_iter()
                    .enumerate()
                    .map(propagate_one)
                    .collect()
            }),
            None => regions
                .par_iter()
                .enumerate()
                .map(propagate_one)
                .collect(),
        }
    }
}

/// Error zonotopes for many input regions with default settings.
pub fn quantization_error_batch(
    network: &Network,
    quant: &QuantConfig,
    regions: &[Zonotope],
) -> Result<Vec<Zonotope>> {
    let results =
        BatchPropagator::new(BatchConfig::default()).propagate_batch(network, quant, regions)?;
    Ok(results.into_iter().map(|r| r.error).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::quantization_error_zonotope;
    use crate::network::{Activation, Layer};
    use ndarray::{arr1, arr2, Array2};

    fn net() -> Network {
        Network::new(vec![
            Layer::new(arr2(&[[0.8, -0.4], [0.2, 0.6]]), arr1(&[0.0, 0.1]), Activation::ReLU)
                .unwrap(),
            Layer::new(arr2(&[[1.0, -1.0]]), arr1(&[0.0]), Activation::Identity).unwrap(),
        ])
        .unwrap()
    }

    fn regions(count: usize) -> Vec<Zonotope> {
        (0..count)
            .map(|i| {
                let c = -0.5 + i as f64 * 0.1;
                Zonotope::new(arr1(&[c, -c]), Array2::eye(2) * 0.02).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_default_config() {
        let config = BatchConfig::default();
        assert_eq!(config.min_regions_for_parallel, 4);
        assert!(config.max_threads.is_none());
        assert!(!config.report_progress);
    }

    #[test]
    fn test_batch_matches_individual_calls() {
        let quant = QuantConfig::default();
        let regions = regions(9);
        let batch = quantization_error_batch(&net(), &quant, &regions).unwrap();
        assert_eq!(batch.len(), regions.len());
        for (region, error) in regions.iter().zip(batch.iter()) {
            let single = quantization_error_zonotope(&net(), &quant, region).unwrap();
            assert_eq!(&single, error);
        }
    }

    #[test]
    fn test_serial_below_threshold() {
        let propagator = BatchPropagator::new(BatchConfig {
            min_regions_for_parallel: 100,
            ..Default::default()
        });
        let results = propagator
            .propagate_batch(&net(), &QuantConfig::default(), &regions(3))
            .unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_parallel_with_max_threads() {
        let propagator = BatchPropagator::new(BatchConfig {
            max_threads: Some(2),
            report_progress: true,
            ..Default::default()
        });
        let results = propagator
            .propagate_batch(&net(), &QuantConfig::default(), &regions(12))
            .unwrap();
        assert_eq!(results.len(), 12);
    }

    #[test]
    fn test_batch_error_propagates() {
        let mut bad = regions(5);
        bad[3] = Zonotope::point(arr1(&[0.0, 0.0, 0.0]));
        assert!(quantization_error_batch(&net(), &QuantConfig::default(), &bad).is_err());
    }

    #[test]
    fn test_empty_batch() {
        let results = quantization_error_batch(&net(), &QuantConfig::default(), &[]).unwrap();
        assert!(results.is_empty());
    }
}
