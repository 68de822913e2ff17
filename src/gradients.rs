//! Gradient Utilities
//!
//! Helpers for inspecting and bounding the parameter gradients returned by
//! [`ConvMaxPool::backward`](crate::ConvMaxPool::backward) before they are
//! handed to an optimizer.
//!
//! ## Algorithm
//!
//! ```text
//! norm = √(Σ gradient²)  // over weight and bias gradients
//! if norm > max_norm:
//!     gradients *= (max_norm / norm)
//! ```
//!
//! Every parameter gradient is scaled by the same factor, so their relative
//! magnitudes are preserved. The input gradient is left alone: it belongs to
//! the previous layer.
//!
//! ## Example
//!
//! ```rust,no_run
//! use convpool::gradients::{clip_gradients, compute_grad_norm};
//! # use convpool::ConvPoolGradients;
//! # let grads: ConvPoolGradients<f32> = todo!();
//! let norm = compute_grad_norm(&grads);
//! let mut grads = grads;
//! clip_gradients(&mut grads, 1.0);
//! ```

use crate::layers::ConvPoolGradients;
use crate::scalar::Scalar;
use rayon::prelude::*;

/// Compute the L2 norm of the weight and bias gradients
pub fn compute_grad_norm<T: Scalar>(grads: &ConvPoolGradients<T>) -> T {
    let sum_sq_parallel =
        |data: &[T]| -> T { data.par_iter().map(|&v| v * v).reduce(T::zero, |a, b| a + b) };

    let weight_sq = sum_sq_parallel(grads.weight.data.as_slice());
    let bias_sq = sum_sq_parallel(grads.bias.data.as_slice());
    (weight_sq + bias_sq).sqrt()
}

/// Scale the weight and bias gradients so their joint norm is at most `max_norm`
///
/// # Returns
///
/// The norm before clipping
pub fn clip_gradients<T: Scalar>(grads: &mut ConvPoolGradients<T>, max_norm: T) -> T {
    let norm = compute_grad_norm(grads);
    if norm > max_norm && norm > T::zero() {
        let scale = max_norm / norm;
        grads.weight.data.par_iter_mut().for_each(|v| *v = *v * scale);
        grads.bias.data.par_iter_mut().for_each(|v| *v = *v * scale);
    }
    norm
}
