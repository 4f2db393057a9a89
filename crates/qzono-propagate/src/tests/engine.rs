//! End-to-end tests for quantization error propagation.

use crate::*;
use approx::assert_relative_eq;
use ndarray::{arr1, arr2, Array2};

/// 2-3-1 network: ReLU hidden layer, Identity output.
fn regression_network() -> Network {
    Network::new(vec![
        Layer::new(
            arr2(&[[1.0, 0.5], [-0.3, 0.8], [0.7, -0.6]]),
            arr1(&[0.1, -0.2, 0.3]),
            Activation::ReLU,
        )
        .unwrap(),
        Layer::new(arr2(&[[0.4, -0.7, 1.2]]), arr1(&[0.5]), Activation::Identity).unwrap(),
    ])
    .unwrap()
}

fn regression_region() -> Zonotope {
    Zonotope::new(arr1(&[0.0, 0.0]), Array2::eye(2) * 0.01).unwrap()
}

/// Same bit width and scaling for every role; unsigned activations.
fn config(bits: u32, scaling: i32) -> QuantConfig {
    let symmetric = QuantParams::symmetric(bits, scaling).unwrap();
    QuantConfig::new(
        symmetric,
        symmetric,
        symmetric,
        QuantParams::positive_only(bits, scaling).unwrap(),
    )
    .unwrap()
}

fn width(error: &Zonotope) -> f64 {
    error.interval_hull()[0].width()
}

// =============================================================================
// END-TO-END REGRESSION
// =============================================================================

#[test]
fn test_regression_network_bounds() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("qzono_propagate=debug")
        .with_test_writer()
        .try_init();

    let error = quantization_error_zonotope(
        &regression_network(),
        &QuantConfig::default(),
        &regression_region(),
    )
    .unwrap();

    assert_eq!(error.dim(), 1);
    let hull = error.finite_interval_hull().unwrap();
    assert!(hull[0].contains(0.0), "{}", hull[0]);
    assert_relative_eq!(hull[0].lower, -0.011425863409042338, epsilon = 1e-9);
    assert_relative_eq!(hull[0].upper, 0.013763509893417384, epsilon = 1e-9);
}

#[test]
fn test_regression_network_contains_sampled_error() {
    let network = regression_network();
    let quant = QuantConfig::default();
    let region = regression_region();

    let enclosure = quantization_error_zonotope(&network, &quant, &region)
        .unwrap()
        .interval_hull();
    let sampled = EmpiricalSampler::new(SamplerConfig {
        num_samples: 5000,
        ..SamplerConfig::default()
    })
    .unwrap()
    .sample_error(&network, &quant, &region)
    .unwrap();

    assert!(
        enclosure[0].encloses(&sampled[0]),
        "sampled {} escapes enclosure {}",
        sampled[0],
        enclosure[0]
    );
    // The sampled range is a non-trivial part of the enclosure.
    assert!(sampled[0].width() > 0.25 * enclosure[0].width());
}

#[test]
fn test_regression_network_generator_count() {
    let result = ErrorPropagator::default()
        .propagate(&regression_network(), &QuantConfig::default(), &regression_region())
        .unwrap();
    // 2 input symbols + 2 input rounding residuals + 2 · 3 ReLU residuals.
    assert_eq!(result.num_generators(), 10);

    let first = &result.trace[0];
    assert_eq!(first.exact_generators, 10);
    assert_eq!(first.error_generators, 10);
    let second = &result.trace[1];
    assert_eq!(second.error_generators, 10);
    assert_eq!(second.unstable_neurons, 0);
}

// =============================================================================
// GENERATOR GROWTH
// =============================================================================

#[test]
fn test_generator_growth_per_layer() {
    let widths = [4usize, 3, 5, 2];
    let mut layers = Vec::new();
    let mut inputs = 2;
    for (k, &outputs) in widths.iter().enumerate() {
        let weight = Array2::from_shape_fn((outputs, inputs), |(i, j)| {
            0.3 * ((i + 2 * j + k) as f64).sin()
        });
        let activation = if k + 1 == widths.len() {
            Activation::Identity
        } else {
            Activation::ReLU
        };
        layers.push(Layer::new(weight, ndarray::Array1::zeros(outputs), activation).unwrap());
        inputs = outputs;
    }
    let network = Network::new(layers).unwrap();

    let result = ErrorPropagator::default()
        .propagate(&network, &QuantConfig::default(), &regression_region())
        .unwrap();

    let mut expected = 2 + 2;
    for (trace, &w) in result.trace.iter().zip(widths.iter()) {
        if trace.activation == Activation::ReLU {
            expected += 2 * w;
        }
        assert_eq!(trace.error_generators, expected, "layer {}", trace.layer_index);
        assert_eq!(trace.exact_generators, expected);
    }
    assert_eq!(result.num_generators(), 4 + 2 * (4 + 3 + 5));
}

#[test]
fn test_identity_only_network_adds_no_relu_generators() {
    let network = Network::new(vec![
        Layer::new(arr2(&[[1.0, 1.0], [0.5, -0.5]]), arr1(&[0.0, 0.0]), Activation::Identity)
            .unwrap(),
        Layer::new(arr2(&[[1.0, -1.0]]), arr1(&[0.25]), Activation::Identity).unwrap(),
    ])
    .unwrap();
    let error =
        quantization_error_zonotope(&network, &QuantConfig::default(), &regression_region())
            .unwrap();
    assert_eq!(error.num_generators(), 4);
}

// =============================================================================
// MONOTONICITY
// =============================================================================

/// Wider formats should not widen the enclosure. A failure here points to a
/// loss of relaxation tightness, not to unsoundness.
#[test]
fn test_enclosure_shrinks_with_bit_width() {
    let network = regression_network();
    let region = regression_region();
    let widths: Vec<f64> = [6, 8, 10, 12, 14, 16]
        .iter()
        .map(|&bits| width(&quantization_error_zonotope(&network, &config(bits, 8), &region).unwrap()))
        .collect();
    for pair in widths.windows(2) {
        assert!(pair[1] <= pair[0] + 1e-12, "widths {widths:?}");
    }
}

#[test]
fn test_enclosure_shrinks_with_scaling() {
    let network = regression_network();
    let region = regression_region();
    let widths: Vec<f64> = [4, 6, 8, 10]
        .iter()
        .map(|&scaling| {
            width(&quantization_error_zonotope(&network, &config(16, scaling), &region).unwrap())
        })
        .collect();
    for pair in widths.windows(2) {
        assert!(pair[1] < pair[0], "widths {widths:?}");
    }
}

// =============================================================================
// ACTIVATION FORMAT
// =============================================================================

/// Activations between 2^(b-1) and 2^b - 1 must not be treated as clamped
/// when the activation format is symmetric.
#[test]
fn test_symmetric_activations_clamp_at_full_width() {
    let network = Network::new(vec![
        Layer::new(arr2(&[[3.0]]), arr1(&[0.0]), Activation::ReLU).unwrap(),
        Layer::new(arr2(&[[1.0]]), arr1(&[0.0]), Activation::Identity).unwrap(),
    ])
    .unwrap();
    // Integer-domain pre-activations span [460.8, 921.6].
    let region = Zonotope::new(arr1(&[0.9]), arr2(&[[0.3]])).unwrap();
    let format = |activations| {
        QuantConfig::new(
            QuantParams::symmetric(8, 6).unwrap(),
            QuantParams::symmetric(12, 8).unwrap(),
            QuantParams::symmetric(10, 8).unwrap(),
            activations,
        )
        .unwrap()
    };
    let signed = format(QuantParams::symmetric(10, 8).unwrap());
    let unsigned = format(QuantParams::positive_only(10, 8).unwrap());
    assert_eq!(signed.activation_ceiling(), 1023.0);

    let enclosure = quantization_error_zonotope(&network, &signed, &region).unwrap();
    assert_eq!(
        enclosure,
        quantization_error_zonotope(&network, &unsigned, &region).unwrap()
    );
    let hull = enclosure.interval_hull();
    assert!(hull[0].width() < 0.25, "{}", hull[0]);

    let top = network.fixed_point(&signed).unwrap().error(&arr1(&[1.2])).unwrap();
    assert!(top[0].abs() < 0.05, "error at the top of the region: {}", top[0]);
    assert!(hull[0].contains(top[0]));

    let sampled = EmpiricalSampler::new(SamplerConfig {
        num_samples: 2000,
        ..SamplerConfig::default()
    })
    .unwrap()
    .sample_error(&network, &signed, &region)
    .unwrap();
    assert!(
        hull[0].lower - 1e-9 <= sampled[0].lower && sampled[0].upper <= hull[0].upper + 1e-9,
        "sampled {} escapes enclosure {}",
        sampled[0],
        hull[0]
    );
}

// =============================================================================
// INPUT QUANTIZATION
// =============================================================================

#[test]
fn test_input_quantization_methods_agree() {
    let network = regression_network();
    let quant = QuantConfig::default();
    let region = Zonotope::new(arr1(&[0.1, -0.2]), arr2(&[[0.03, 0.01], [-0.02, 0.04]])).unwrap();

    let run = |method| {
        ErrorPropagator::new(EngineConfig {
            input_quantization: method,
            ..EngineConfig::default()
        })
        .propagate(&network, &quant, &region)
        .unwrap()
    };
    let enumerated = run(InputQuantization::VertexEnumeration);
    let closed_form = run(InputQuantization::PerDimension);
    let auto = run(InputQuantization::Auto);

    assert_eq!(enumerated.error, closed_form.error);
    assert_eq!(auto.error, enumerated.error);
    assert_eq!(auto.input_quantization, InputQuantization::VertexEnumeration);
    assert_eq!(closed_form.input_quantization, InputQuantization::PerDimension);
}

#[test]
fn test_correlated_input_region_is_sound() {
    let network = regression_network();
    let quant = QuantConfig::default();
    let region = Zonotope::new(arr1(&[0.1, -0.2]), arr2(&[[0.3, 0.1], [-0.2, 0.4]])).unwrap();

    let enclosure = quantization_error_zonotope(&network, &quant, &region)
        .unwrap()
        .interval_hull();
    let sampled = EmpiricalSampler::new(SamplerConfig {
        num_samples: 4000,
        seed: 7,
        ..SamplerConfig::default()
    })
    .unwrap()
    .sample_error(&network, &quant, &region)
    .unwrap();
    assert!(
        enclosure[0].lower - 1e-9 <= sampled[0].lower && sampled[0].upper <= enclosure[0].upper + 1e-9,
        "sampled {} escapes enclosure {}",
        sampled[0],
        enclosure[0]
    );
}

#[test]
fn test_high_dimensional_input_uses_closed_form() {
    let n = 20;
    let network = Network::new(vec![
        Layer::new(Array2::from_elem((2, n), 0.05), ndarray::Array1::zeros(2), Activation::ReLU)
            .unwrap(),
        Layer::new(arr2(&[[1.0, -1.0]]), arr1(&[0.0]), Activation::Identity).unwrap(),
    ])
    .unwrap();
    let region = Zonotope::new(ndarray::Array1::from_elem(n, 0.1), Array2::eye(n) * 0.01).unwrap();

    let result = ErrorPropagator::default()
        .propagate(&network, &QuantConfig::default(), &region)
        .unwrap();
    assert_eq!(result.input_quantization, InputQuantization::PerDimension);
    assert_eq!(result.num_generators(), n + n + 2 * 2);
}

// =============================================================================
// LOADER TO ENGINE
// =============================================================================

#[test]
fn test_loaded_network_matches_constructed() {
    let json = r#"{
        "fc1": { "weights": [[1.0, -0.3, 0.7], [0.5, 0.8, -0.6]], "biases": [0.1, -0.2, 0.3] },
        "fc2": { "weights": [[0.4], [-0.7], [1.2]], "biases": [0.5] }
    }"#;
    let loaded = load_network_json(json).unwrap();
    assert_eq!(loaded, regression_network());

    let a = quantization_error_zonotope(&loaded, &QuantConfig::default(), &regression_region());
    let b = quantization_error_zonotope(
        &regression_network(),
        &QuantConfig::default(),
        &regression_region(),
    );
    assert_eq!(a.unwrap(), b.unwrap());
}
