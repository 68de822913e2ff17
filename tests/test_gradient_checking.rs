// Numerical gradient checking for the ConvMaxPool backward pass.
// Analytical gradients are compared against central finite differences of
// a linear probe loss L = Σ y · r, in f64.

use approx::assert_relative_eq;
use convpool::gradients::{clip_gradients, compute_grad_norm};
use convpool::{Activation, BorderMode, ConvMaxPool, ConvPoolConfig, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const H: f64 = 1e-6;

fn build(
    mode: BorderMode,
    pool: (usize, usize),
    act: Option<Activation>,
    seed: u64,
) -> ConvMaxPool<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut cfg = ConvPoolConfig::new([3, 2, 3, 2], [2, 2, 6, 7])
        .with_border_mode(mode)
        .with_pool_size(pool)
        .with_std(0.5);
    cfg.activation = act;
    let weight = Tensor::from_fn(vec![3, 2, 3, 2], |_| rng.random_range(-0.5..0.5));
    let bias = Tensor::from_fn(vec![3], |_| rng.random_range(-0.2..0.2));
    ConvMaxPool::with_parameters(cfg, weight, bias).unwrap()
}

fn input(seed: u64) -> Tensor<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Tensor::from_fn(vec![2, 2, 6, 7], |_| rng.random_range(-1.0..1.0))
}

fn probe(shape: &[usize]) -> Tensor<f64> {
    Tensor::from_fn(shape.to_vec(), |i| ((i * 31 % 13) as f64 - 6.0) / 6.0)
}

fn dot(y: &Tensor<f64>, r: &Tensor<f64>) -> f64 {
    assert_eq!(y.shape, r.shape);
    y.data.iter().zip(&r.data).map(|(a, b)| a * b).sum()
}

fn loss(layer: &ConvMaxPool<f64>, x: &Tensor<f64>, r: &Tensor<f64>) -> f64 {
    dot(&layer.output(x).unwrap(), r)
}

fn check_layer(layer: &ConvMaxPool<f64>) {
    let x = input(17);
    let (y, cache) = layer.forward(&x).unwrap();
    let r = probe(&y.shape);
    let grads = layer.backward(&r, &cache).unwrap();
    let label = format!(
        "{:?} {:?} {:?}",
        layer.border_mode(),
        layer.pool_size(),
        layer.activation()
    );

    for idx in 0..layer.weight.len() {
        let mut plus = layer.clone();
        plus.weight.data[idx] += H;
        let mut minus = layer.clone();
        minus.weight.data[idx] -= H;
        let numeric = (loss(&plus, &x, &r) - loss(&minus, &x, &r)) / (2.0 * H);
        assert_relative_eq!(
            grads.weight.data[idx],
            numeric,
            epsilon = 1e-6,
            max_relative = 1e-4
        );
    }

    for idx in 0..layer.bias.len() {
        let mut plus = layer.clone();
        plus.bias.data[idx] += H;
        let mut minus = layer.clone();
        minus.bias.data[idx] -= H;
        let numeric = (loss(&plus, &x, &r) - loss(&minus, &x, &r)) / (2.0 * H);
        assert_relative_eq!(
            grads.bias.data[idx],
            numeric,
            epsilon = 1e-6,
            max_relative = 1e-4
        );
    }

    for idx in (0..x.len()).step_by(5) {
        let mut plus = x.clone();
        plus.data[idx] += H;
        let mut minus = x.clone();
        minus.data[idx] -= H;
        let numeric = (loss(layer, &plus, &r) - loss(layer, &minus, &r)) / (2.0 * H);
        assert!(
            (grads.input.data[idx] - numeric).abs() <= 1e-6 + 1e-4 * numeric.abs(),
            "{}: input grad {} vs numeric {} at {}",
            label,
            grads.input.data[idx],
            numeric,
            idx
        );
    }
}

#[test]
fn test_gradients_all_modes_and_activations() {
    let activations = [
        None,
        Some(Activation::Tanh),
        Some(Activation::Sigmoid),
        Some(Activation::Softplus),
        Some(Activation::Relu),
    ];
    for mode in [BorderMode::Valid, BorderMode::Same, BorderMode::Full] {
        for pool in [(1, 1), (2, 2), (2, 3)] {
            for (i, act) in activations.iter().enumerate() {
                check_layer(&build(mode, pool, *act, 100 + i as u64));
            }
        }
    }
}

#[test]
fn test_gradients_through_dropout() {
    let layer = build(BorderMode::Same, (2, 2), Some(Activation::Tanh), 5);
    let x = input(3);
    let p = 0.4;
    let (y, cache) = layer
        .forward_dropout(&x, true, &mut StdRng::seed_from_u64(21), p)
        .unwrap();
    let r = probe(&y.shape);
    let grads = layer.backward(&r, &cache).unwrap();

    // Re-seeding reproduces the mask, so the loss is deterministic
    let dropped_loss = |layer: &ConvMaxPool<f64>| {
        let y = layer
            .drop_output(&x, true, &mut StdRng::seed_from_u64(21), p)
            .unwrap();
        dot(&y, &r)
    };
    for idx in 0..layer.weight.len() {
        let mut plus = layer.clone();
        plus.weight.data[idx] += H;
        let mut minus = layer.clone();
        minus.weight.data[idx] -= H;
        let numeric = (dropped_loss(&plus) - dropped_loss(&minus)) / (2.0 * H);
        assert_relative_eq!(
            grads.weight.data[idx],
            numeric,
            epsilon = 1e-6,
            max_relative = 1e-4
        );
    }
}

#[test]
fn test_dropout_off_backward_matches_plain_backward() {
    let layer = build(BorderMode::Full, (2, 2), Some(Activation::Relu), 9);
    let x = input(4);
    let (y1, c1) = layer.forward(&x).unwrap();
    let (y2, c2) = layer
        .forward_dropout(&x, false, &mut StdRng::seed_from_u64(0), 0.5)
        .unwrap();
    assert_eq!(y1, y2);
    let r = probe(&y1.shape);
    let g1 = layer.backward(&r, &c1).unwrap();
    let g2 = layer.backward(&r, &c2).unwrap();
    assert_eq!(g1.weight, g2.weight);
    assert_eq!(g1.input, g2.input);
}

#[test]
fn test_bias_gradient_counts_pooled_positions() {
    // Without activation, dL/db[c] = Σ r over channel c
    let layer = build(BorderMode::Valid, (2, 2), None, 1);
    let x = input(2);
    let (y, cache) = layer.forward(&x).unwrap();
    let r = Tensor::full(y.shape.clone(), 1.0);
    let grads = layer.backward(&r, &cache).unwrap();
    let [batch, _, h, w] = y.dims4();
    for &g in &grads.bias.data {
        assert_eq!(g, (batch * h * w) as f64);
    }
}

#[test]
fn test_clip_after_backward() {
    let layer = build(BorderMode::Same, (1, 1), Some(Activation::Softplus), 12);
    let x = input(6);
    let (y, cache) = layer.forward(&x).unwrap();
    let mut grads = layer.backward(&probe(&y.shape), &cache).unwrap();
    let input_grad = grads.input.clone();
    let before = compute_grad_norm(&grads);
    assert!(before > 0.1);
    let reported = clip_gradients(&mut grads, 0.1);
    assert_relative_eq!(reported, before);
    assert_relative_eq!(compute_grad_norm(&grads), 0.1, epsilon = 1e-12);
    assert_eq!(grads.input, input_grad);
}
