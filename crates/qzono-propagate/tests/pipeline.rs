//! JSON network and config in, error enclosure out, cross-checked by sampling.

use ndarray::{arr1, Array2};
use qzono_propagate::{
    load_network_json, quantization_error_batch, quantization_error_zonotope, EmpiricalSampler,
    ErrorPropagator, QuantConfig, QzonoError, SamplerConfig, Zonotope,
};

const NETWORK: &str = r#"{
    "dense_1": {
        "weights": [[0.52, -0.31, 0.08, 0.77], [-0.45, 0.66, 0.29, -0.12], [0.13, 0.05, -0.58, 0.41]],
        "biases": [0.02, -0.07, 0.11, 0.0]
    },
    "dense_2": {
        "weights": [[0.35, -0.62], [0.71, 0.18], [-0.27, 0.44], [0.09, -0.83]],
        "biases": [0.05, -0.03]
    },
    "output": {
        "weights": [[1.1, -0.4], [-0.9, 0.6]],
        "biases": [0.1, -0.1]
    }
}"#;

const QUANT: &str = r#"{
    "input": {"strategy": "symmetric", "bits": 8, "scaling": 6},
    "weights": {"strategy": "symmetric", "bits": 8, "scaling": 6},
    "biases": {"strategy": "symmetric", "bits": 8, "scaling": 6},
    "activations": {"strategy": "positive_only", "bits": 8, "scaling": 6}
}"#;

fn region(center: [f64; 3], radius: f64) -> Zonotope {
    Zonotope::new(arr1(&center), Array2::eye(3) * radius).unwrap()
}

#[test]
fn test_json_pipeline_is_sound() {
    let network = load_network_json(NETWORK).unwrap();
    let quant = QuantConfig::from_json_str(QUANT).unwrap();
    let input = region([0.2, -0.1, 0.4], 0.05);

    let result = ErrorPropagator::default()
        .propagate(&network, &quant, &input)
        .unwrap();
    assert_eq!(result.trace.len(), 3);
    assert_eq!(result.num_generators(), 3 + 3 + 2 * (4 + 2));

    let enclosure = result.error_bounds();
    let sampled = EmpiricalSampler::new(SamplerConfig {
        num_samples: 3000,
        ..SamplerConfig::default()
    })
    .unwrap()
    .sample_error(&network, &quant, &input)
    .unwrap();

    assert_eq!(enclosure.len(), 2);
    for (e, s) in enclosure.iter().zip(sampled.iter()) {
        assert!(
            e.lower - 1e-9 <= s.lower && s.upper <= e.upper + 1e-9,
            "sampled {s} escapes enclosure {e}"
        );
    }
}

#[test]
fn test_batch_over_regions() {
    let network = load_network_json(NETWORK).unwrap();
    let quant = QuantConfig::from_json_str(QUANT).unwrap();
    let regions: Vec<Zonotope> = (0..6)
        .map(|i| region([0.1 * i as f64, -0.05 * i as f64, 0.2], 0.02))
        .collect();

    let errors = quantization_error_batch(&network, &quant, &regions).unwrap();
    assert_eq!(errors.len(), regions.len());
    for (region, error) in regions.iter().zip(errors.iter()) {
        assert_eq!(
            error,
            &quantization_error_zonotope(&network, &quant, region).unwrap()
        );
        assert!(error.finite_interval_hull().is_ok());
    }
}

#[test]
fn test_unsupported_activation_is_fatal() {
    let json = r#"{
        "dense_1": { "weights": [[1.0]], "biases": [0.0], "activation": "sigmoid" },
        "output": { "weights": [[1.0]], "biases": [0.0] }
    }"#;
    let err = load_network_json(json).unwrap_err();
    assert!(matches!(err, QzonoError::UnsupportedActivation(_)));
    assert!(err.to_string().contains("sigmoid"));
}

#[test]
fn test_bad_quant_config_is_rejected() {
    let json = QUANT.replace("\"positive_only\", \"bits\": 8", "\"positive_only\", \"bits\": 0");
    let err = QuantConfig::from_json_str(&json).unwrap_err();
    assert!(matches!(err, QzonoError::InvalidConfig(_)));
}
