//! Fixed-point formats and the per-role quantization configuration.

use qzono_core::{Bound, QzonoError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Largest supported bit width. Integers up to `2^52` are exact in `f64`.
pub const MAX_BITS: u32 = 52;

/// Largest supported magnitude of the fractional-bit scaling.
pub const MAX_SCALING: i32 = 64;

/// Representable integer range of a fixed-point format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantStrategy {
    /// `[0, 2^bits - 1]`
    #[serde(alias = "positive")]
    PositiveOnly,
    /// `[-2^(bits-1), 2^(bits-1) - 1]`
    #[default]
    Symmetric,
}

impl std::fmt::Display for QuantStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuantStrategy::PositiveOnly => write!(f, "positive_only"),
            QuantStrategy::Symmetric => write!(f, "symmetric"),
        }
    }
}

/// A fixed-point format: strategy, bit width and fractional-bit scaling.
///
/// A value `x` is represented as `clamp(round(x · 2^scaling), lo, hi) · 2^-scaling`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuantParams {
    pub strategy: QuantStrategy,
    pub bits: u32,
    pub scaling: i32,
}

impl QuantParams {
    /// Create and validate a format.
    pub fn new(strategy: QuantStrategy, bits: u32, scaling: i32) -> Result<Self> {
        let params = Self {
            strategy,
            bits,
            scaling,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn symmetric(bits: u32, scaling: i32) -> Result<Self> {
        Self::new(QuantStrategy::Symmetric, bits, scaling)
    }

    pub fn positive_only(bits: u32, scaling: i32) -> Result<Self> {
        Self::new(QuantStrategy::PositiveOnly, bits, scaling)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bits == 0 {
            return Err(QzonoError::InvalidConfig(
                "bit width must be at least 1".to_string(),
            ));
        }
        if self.bits > MAX_BITS {
            return Err(QzonoError::InvalidConfig(format!(
                "bit width {} exceeds the maximum of {MAX_BITS}",
                self.bits
            )));
        }
        if self.scaling.abs() > MAX_SCALING {
            return Err(QzonoError::InvalidConfig(format!(
                "scaling {} is outside [-{MAX_SCALING}, {MAX_SCALING}]",
                self.scaling
            )));
        }
        Ok(())
    }

    /// Integer range `(lo, hi)` of the strategy.
    pub fn int_range(&self) -> (f64, f64) {
        match self.strategy {
            QuantStrategy::PositiveOnly => (0.0, 2f64.powi(self.bits as i32) - 1.0),
            QuantStrategy::Symmetric => {
                let half = 2f64.powi(self.bits as i32 - 1);
                (-half, half - 1.0)
            }
        }
    }

    /// Multiplier `2^scaling` into the integer domain.
    #[inline]
    pub fn scale_factor(&self) -> f64 {
        2f64.powi(self.scaling)
    }

    /// Resolution `2^-scaling`.
    #[inline]
    pub fn step(&self) -> f64 {
        2f64.powi(-self.scaling)
    }

    /// Smallest and largest representable real values.
    pub fn representable_range(&self) -> Bound {
        let (lo, hi) = self.int_range();
        let step = self.step();
        Bound::new(lo * step, hi * step)
    }
}

/// Tensor role a format applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantRole {
    Input,
    Weights,
    Biases,
    Activations,
}

impl QuantRole {
    pub const ALL: [QuantRole; 4] = [
        QuantRole::Input,
        QuantRole::Weights,
        QuantRole::Biases,
        QuantRole::Activations,
    ];
}

impl std::fmt::Display for QuantRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuantRole::Input => write!(f, "input"),
            QuantRole::Weights => write!(f, "weights"),
            QuantRole::Biases => write!(f, "biases"),
            QuantRole::Activations => write!(f, "activations"),
        }
    }
}

impl FromStr for QuantRole {
    type Err = QzonoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "input" => Ok(QuantRole::Input),
            "weights" => Ok(QuantRole::Weights),
            "biases" => Ok(QuantRole::Biases),
            "activations" => Ok(QuantRole::Activations),
            other => Err(QzonoError::InvalidConfig(format!(
                "unknown quantization role '{other}'"
            ))),
        }
    }
}

/// Formats for the four tensor roles of a quantized network.
///
/// Activations define the integer domain the propagation runs in: their
/// scaling gives the lift `F = 2^scaling` and their bit width gives the
/// round-clamp ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantConfig {
    pub input: QuantParams,
    pub weights: QuantParams,
    pub biases: QuantParams,
    pub activations: QuantParams,
}

impl Default for QuantConfig {
    /// 8-bit symmetric input, 10-bit symmetric parameters, 10-bit unsigned
    /// activations, all with 8 fractional bits.
    fn default() -> Self {
        Self {
            input: QuantParams {
                strategy: QuantStrategy::Symmetric,
                bits: 8,
                scaling: 8,
            },
            weights: QuantParams {
                strategy: QuantStrategy::Symmetric,
                bits: 10,
                scaling: 8,
            },
            biases: QuantParams {
                strategy: QuantStrategy::Symmetric,
                bits: 10,
                scaling: 8,
            },
            activations: QuantParams {
                strategy: QuantStrategy::PositiveOnly,
                bits: 10,
                scaling: 8,
            },
        }
    }
}

impl QuantConfig {
    /// Create and validate a configuration.
    pub fn new(
        input: QuantParams,
        weights: QuantParams,
        biases: QuantParams,
        activations: QuantParams,
    ) -> Result<Self> {
        let config = Self {
            input,
            weights,
            biases,
            activations,
        };
        config.validate()?;
        Ok(config)
    }

    /// Same format for every role.
    pub fn uniform(params: QuantParams) -> Result<Self> {
        Self::new(params, params, params, params)
    }

    /// Parse from JSON, e.g.
    /// `{"input": {"strategy": "symmetric", "bits": 8, "scaling": 8}, ...}`.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: QuantConfig = serde_json::from_str(json)
            .map_err(|e| QzonoError::InvalidConfig(format!("quantization config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| QzonoError::InvalidConfig(format!("quantization config: {e}")))
    }

    pub fn get(&self, role: QuantRole) -> &QuantParams {
        match role {
            QuantRole::Input => &self.input,
            QuantRole::Weights => &self.weights,
            QuantRole::Biases => &self.biases,
            QuantRole::Activations => &self.activations,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for role in QuantRole::ALL {
            self.get(role).validate().map_err(|e| match e {
                QzonoError::InvalidConfig(msg) => QzonoError::InvalidConfig(format!("{role}: {msg}")),
                other => other,
            })?;
        }
        Ok(())
    }

    /// Round-clamp ceiling `Cub = 2^bits - 1` of quantized activations.
    ///
    /// Activations follow a ReLU, so the clamp range is `[0, Cub]` for either
    /// strategy; the sign bit of a symmetric format is not spent on them.
    /// `bits >= 1` keeps `Cub >= 1`.
    #[inline]
    pub fn activation_ceiling(&self) -> f64 {
        2f64.powi(self.activations.bits as i32) - 1.0
    }

    /// Integer-domain lift `F = 2^scaling_activations`.
    #[inline]
    pub fn activation_scale(&self) -> f64 {
        self.activations.scale_factor()
    }
}
