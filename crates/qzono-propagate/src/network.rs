//! Feed-forward networks and their concrete forward passes.
//!
//! [`FixedPointNetwork`] holds the per-layer parameters in the integer domain
//! the propagation engine works in: with `F = 2^scaling_activations` the first
//! layer's weights are lifted by `F`, later layers' by 1, and biases always
//! by `F`. Its quantized pass evaluates
//! `a_k = clamp(round(s_k·Ŵ_k·a_{k-1} + F·b̂_k), 0, Cub)` on ReLU layers and
//! returns `a_N / F`.

use ndarray::{Array1, Array2};
use qzono_core::{ensure_dim, QzonoError, Result};
use qzono_quantize::{quantize_array, QuantConfig, QuantParams};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::transformers::round_clamp;

/// Activation of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    ReLU,
    Identity,
}

impl std::fmt::Display for Activation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Activation::ReLU => write!(f, "ReLU"),
            Activation::Identity => write!(f, "Identity"),
        }
    }
}

impl FromStr for Activation {
    type Err = QzonoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "relu" => Ok(Activation::ReLU),
            "identity" | "id" | "linear" => Ok(Activation::Identity),
            _ => Err(QzonoError::UnsupportedActivation(s.to_string())),
        }
    }
}

/// Dense layer `act(W·x + b)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub weight: Array2<f64>,
    pub bias: Array1<f64>,
    pub activation: Activation,
}

impl Layer {
    pub fn new(weight: Array2<f64>, bias: Array1<f64>, activation: Activation) -> Result<Self> {
        ensure_dim("layer bias", weight.nrows(), bias.len())?;
        if weight.iter().chain(bias.iter()).any(|v| !v.is_finite()) {
            return Err(QzonoError::InvalidNetwork(
                "layer parameters must be finite".to_string(),
            ));
        }
        Ok(Self {
            weight,
            bias,
            activation,
        })
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.weight.ncols()
    }

    #[inline]
    pub fn output_dim(&self) -> usize {
        self.weight.nrows()
    }

    fn apply(&self, x: &Array1<f64>) -> Array1<f64> {
        let pre = self.weight.dot(x) + &self.bias;
        match self.activation {
            Activation::ReLU => pre.mapv(|v| v.max(0.0)),
            Activation::Identity => pre,
        }
    }
}

/// Ordered sequence of layers.
#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    layers: Vec<Layer>,
}

impl Network {
    /// Create a network, checking that consecutive layers chain.
    pub fn new(layers: Vec<Layer>) -> Result<Self> {
        if layers.is_empty() {
            return Err(QzonoError::InvalidNetwork(
                "network has no layers".to_string(),
            ));
        }
        for (k, pair) in layers.windows(2).enumerate() {
            ensure_dim(
                &format!("layer {} input", k + 1),
                pair[0].output_dim(),
                pair[1].input_dim(),
            )?;
        }
        Ok(Self { layers })
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn input_dim(&self) -> usize {
        self.layers.first().map_or(0, Layer::input_dim)
    }

    pub fn output_dim(&self) -> usize {
        self.layers.last().map_or(0, Layer::output_dim)
    }

    /// Number of ReLU layers.
    pub fn num_nonlinear(&self) -> usize {
        self.layers
            .iter()
            .filter(|l| l.activation == Activation::ReLU)
            .count()
    }

    /// Real-valued forward pass.
    pub fn forward(&self, x: &Array1<f64>) -> Result<Array1<f64>> {
        ensure_dim("network input", self.input_dim(), x.len())?;
        Ok(self
            .layers
            .iter()
            .fold(x.clone(), |activation, layer| layer.apply(&activation)))
    }

    /// Fixed-point forward pass under `config`.
    pub fn forward_quantized(&self, x: &Array1<f64>, config: &QuantConfig) -> Result<Array1<f64>> {
        self.fixed_point(config)?.forward_quantized(x)
    }

    /// Quantize and lift the parameters into the integer domain.
    pub fn fixed_point(&self, config: &QuantConfig) -> Result<FixedPointNetwork> {
        config.validate()?;
        let scale = config.activation_scale();
        let layers = self
            .layers
            .iter()
            .enumerate()
            .map(|(k, layer)| ScaledLayer::new(layer, if k == 0 { scale } else { 1.0 }, scale, config))
            .collect();
        Ok(FixedPointNetwork {
            layers,
            input: config.input,
            scale,
            ceiling: config.activation_ceiling(),
        })
    }
}

/// Real and quantized parameters of one layer, lifted into the integer domain.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaledLayer {
    /// `s·W`
    pub weight: Array2<f64>,
    /// `s·Ŵ`
    pub weight_hat: Array2<f64>,
    /// `F·b`
    pub bias: Array1<f64>,
    /// `F·b̂`
    pub bias_hat: Array1<f64>,
    pub activation: Activation,
}

impl ScaledLayer {
    fn new(layer: &Layer, weight_scale: f64, bias_scale: f64, config: &QuantConfig) -> Self {
        Self {
            weight: &layer.weight * weight_scale,
            weight_hat: quantize_array(&layer.weight, &config.weights) * weight_scale,
            bias: &layer.bias * bias_scale,
            bias_hat: quantize_array(&layer.bias, &config.biases) * bias_scale,
            activation: layer.activation,
        }
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.weight.ncols()
    }

    #[inline]
    pub fn output_dim(&self) -> usize {
        self.weight.nrows()
    }
}

/// A network prepared for fixed-point evaluation and error propagation.
#[derive(Debug, Clone)]
pub struct FixedPointNetwork {
    layers: Vec<ScaledLayer>,
    input: QuantParams,
    scale: f64,
    ceiling: f64,
}

impl FixedPointNetwork {
    pub fn layers(&self) -> &[ScaledLayer] {
        &self.layers
    }

    pub fn input_params(&self) -> &QuantParams {
        &self.input
    }

    /// Integer-domain lift `F`.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Round-clamp ceiling `Cub`.
    pub fn ceiling(&self) -> f64 {
        self.ceiling
    }

    pub fn input_dim(&self) -> usize {
        self.layers.first().map_or(0, ScaledLayer::input_dim)
    }

    /// Real-valued pass in the integer domain, rescaled by `1/F`.
    pub fn forward_real(&self, x: &Array1<f64>) -> Result<Array1<f64>> {
        ensure_dim("network input", self.input_dim(), x.len())?;
        let mut a = x.clone();
        for layer in &self.layers {
            let pre = layer.weight.dot(&a) + &layer.bias;
            a = match layer.activation {
                Activation::ReLU => pre.mapv(|v| v.max(0.0)),
                Activation::Identity => pre,
            };
        }
        Ok(a / self.scale)
    }

    /// Fixed-point pass, rescaled by `1/F`.
    pub fn forward_quantized(&self, x: &Array1<f64>) -> Result<Array1<f64>> {
        ensure_dim("network input", self.input_dim(), x.len())?;
        let mut a = quantize_array(x, &self.input);
        for layer in &self.layers {
            let pre = layer.weight_hat.dot(&a) + &layer.bias_hat;
            a = match layer.activation {
                Activation::ReLU => pre.mapv(|v| round_clamp(v, self.ceiling)),
                Activation::Identity => pre,
            };
        }
        Ok(a / self.scale)
    }

    /// `forward_quantized(x) - forward_real(x)`.
    pub fn error(&self, x: &Array1<f64>) -> Result<Array1<f64>> {
        Ok(self.forward_quantized(x)? - self.forward_real(x)?)
    }
}
