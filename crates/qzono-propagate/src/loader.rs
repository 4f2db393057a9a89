//! JSON network loader.
//!
//! The document is an object keyed by layer name, in layer order:
//!
//! ```json
//! {
//!   "fc1": { "weights": [[1.0, -0.3, 0.7], [0.5, 0.8, -0.6]], "biases": [0.1, -0.2, 0.3] },
//!   "fc2": { "weights": [[0.4], [-0.7], [1.2]], "biases": [0.5] }
//! }
//! ```
//!
//! `weights` is a list of columns: entry `j` holds the weights leaving input
//! neuron `j`. The last layer is Identity and every other layer ReLU; an
//! optional `"activation"` field must agree with that.

use crate::network::{Activation, Layer, Network};
use ndarray::{Array1, Array2};
use qzono_core::{QzonoError, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct RawLayer {
    weights: Vec<Vec<f64>>,
    biases: Vec<f64>,
    #[serde(default)]
    activation: Option<String>,
}

/// Parse a network from a JSON document.
pub fn load_network_json(json: &str) -> Result<Network> {
    let document: serde_json::Value =
        serde_json::from_str(json).map_err(|e| QzonoError::ModelLoad(format!("invalid JSON: {e}")))?;
    let entries = document.as_object().ok_or_else(|| {
        QzonoError::ModelLoad("expected an object keyed by layer name".to_string())
    })?;

    let count = entries.len();
    let layers = entries
        .iter()
        .enumerate()
        .map(|(index, (name, value))| {
            let raw: RawLayer = serde_json::from_value(value.clone())
                .map_err(|e| QzonoError::ModelLoad(format!("layer '{name}': {e}")))?;
            let expected = if index + 1 == count {
                Activation::Identity
            } else {
                Activation::ReLU
            };
            build_layer(name, raw, expected)
        })
        .collect::<Result<Vec<_>>>()?;

    let network = Network::new(layers)?;
    debug!(
        layers = network.len(),
        input_dim = network.input_dim(),
        output_dim = network.output_dim(),
        "loaded network"
    );
    Ok(network)
}

/// Read and parse a JSON network file.
pub fn load_network_path(path: impl AsRef<Path>) -> Result<Network> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)
        .map_err(|e| QzonoError::ModelLoad(format!("{}: {e}", path.display())))?;
    load_network_json(&json)
}

fn build_layer(name: &str, raw: RawLayer, expected: Activation) -> Result<Layer> {
    if let Some(tag) = &raw.activation {
        let declared: Activation = tag.parse()?;
        if declared != expected {
            return Err(QzonoError::ModelLoad(format!(
                "layer '{name}' declares {declared} but must be {expected}"
            )));
        }
    }

    let inputs = raw.weights.len();
    let outputs = raw.biases.len();
    if inputs == 0 {
        return Err(QzonoError::ModelLoad(format!(
            "layer '{name}' has no weight columns"
        )));
    }
    if let Some((j, column)) = raw
        .weights
        .iter()
        .enumerate()
        .find(|(_, column)| column.len() != outputs)
    {
        return Err(QzonoError::ModelLoad(format!(
            "layer '{name}': weight column {j} has {} entries, expected {outputs}",
            column.len()
        )));
    }

    let weight = Array2::from_shape_fn((outputs, inputs), |(i, j)| raw.weights[j][i]);
    Layer::new(weight, Array1::from(raw.biases), expected)
        .map_err(|e| QzonoError::ModelLoad(format!("layer '{name}': {e}")))
}
