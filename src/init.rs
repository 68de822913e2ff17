//! Weight Initialization
//!
//! Convolution filters are initialized according to the activation that
//! follows them:
//!
//! - **Glorot uniform** for saturating activations (tanh, sigmoid):
//!   `W ~ U[-bound, bound]`, `bound = √(6 / (fan_in + fan_out))`
//! - **Normal** for rectifying activations (softplus, relu):
//!   `W ~ N(0, std²)`
//!
//! ## Fan Computation
//!
//! For a filter of shape `[out, in, kh, kw]` followed by `ph × pw` pooling:
//!
//! ```text
//! fan_in  = in × kh × kw
//! fan_out = out × kh × kw / (ph × pw)
//! ```
//!
//! Each unit in the lower layer receives a gradient from `out × kh × kw`
//! positions, divided by the pooling area. `fan_out` is a real number.

use crate::error::{LayerError, Result};
use crate::layers::Activation;
use crate::scalar::Scalar;
use crate::tensor::Tensor;
use rand::distr::{Distribution, Uniform};
use rand::Rng;

/// Filter initialization scheme
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitKind {
    /// Uniform in ±√(6 / (fan_in + fan_out))
    GlorotUniform,
    /// Zero-mean normal with a configured standard deviation
    Normal,
}

impl InitKind {
    /// Initializer for an optional activation
    ///
    /// A layer with no activation has no initialization policy and is
    /// rejected with [`LayerError::UnsupportedActivation`].
    pub fn for_activation(activation: Option<Activation>) -> Result<Self> {
        activation
            .map(Activation::init_kind)
            .ok_or_else(|| LayerError::UnsupportedActivation("none".to_string()))
    }
}

/// `(fan_in, fan_out)` for a filter shape and pool size
pub fn fans(filter_shape: [usize; 4], pool_size: (usize, usize)) -> (f64, f64) {
    let [out_channels, in_channels, kh, kw] = filter_shape;
    let fan_in = (in_channels * kh * kw) as f64;
    let fan_out = (out_channels * kh * kw) as f64 / (pool_size.0 * pool_size.1) as f64;
    (fan_in, fan_out)
}

/// Glorot bound `√(6 / (fan_in + fan_out))`
pub fn glorot_bound(filter_shape: [usize; 4], pool_size: (usize, usize)) -> f64 {
    let (fan_in, fan_out) = fans(filter_shape, pool_size);
    (6.0 / (fan_in + fan_out)).sqrt()
}

/// Sample a filter tensor of shape `filter_shape`
///
/// # Arguments
///
/// * `rng` - Random source
/// * `kind` - Which initializer to use
/// * `filter_shape` - `[out_channels, in_channels, kh, kw]`
/// * `pool_size` - Pool window following the convolution (enters `fan_out`)
/// * `std` - Standard deviation for [`InitKind::Normal`]; ignored otherwise
pub fn sample_filters<T: Scalar, R: Rng + ?Sized>(
    rng: &mut R,
    kind: InitKind,
    filter_shape: [usize; 4],
    pool_size: (usize, usize),
    std: f64,
) -> Result<Tensor<T>> {
    let size: usize = filter_shape.iter().product();
    let data = match kind {
        InitKind::GlorotUniform => {
            let bound = T::cast(glorot_bound(filter_shape, pool_size));
            let uniform = Uniform::<T>::new_inclusive(-bound, bound).map_err(|e| {
                LayerError::InvalidParameter(format!("glorot bound {}: {}", bound, e))
            })?;
            (0..size).map(|_| uniform.sample(rng)).collect()
        }
        InitKind::Normal => {
            if !(std.is_finite() && std >= 0.0) {
                return Err(LayerError::InvalidParameter(format!(
                    "std must be finite and non-negative, got {}",
                    std
                )));
            }
            T::normal_samples(rng, T::zero(), T::cast(std), size)
                .map_err(|e| LayerError::InvalidParameter(format!("std {}: {}", std, e)))?
        }
    };
    Ok(Tensor::new(data, filter_shape.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_fans_include_pool_area() {
        let (fan_in, fan_out) = fans([32, 3, 5, 5], (2, 2));
        assert_eq!(fan_in, 75.0);
        assert_eq!(fan_out, 200.0);

        // fan_out is not truncated
        let (_, fan_out) = fans([3, 1, 3, 3], (2, 2));
        assert_relative_eq!(fan_out, 6.75);
    }

    #[test]
    fn test_no_activation_has_no_initializer() {
        assert_eq!(
            InitKind::for_activation(None),
            Err(LayerError::UnsupportedActivation("none".to_string()))
        );
        assert_eq!(
            InitKind::for_activation(Some(Activation::Relu)),
            Ok(InitKind::Normal)
        );
    }

    #[test]
    fn test_glorot_samples_within_bound() {
        let mut rng = StdRng::seed_from_u64(3);
        let shape = [8, 4, 3, 3];
        let w: Tensor<f32> =
            sample_filters(&mut rng, InitKind::GlorotUniform, shape, (2, 2), 0.0).unwrap();
        let bound = glorot_bound(shape, (2, 2)) as f32;
        assert_eq!(w.shape, vec![8, 4, 3, 3]);
        assert!(w.data.iter().all(|&v| v >= -bound && v <= bound));
        // Not degenerate
        assert!(w.data.iter().any(|&v| v.abs() > bound / 2.0));
    }

    #[test]
    fn test_normal_rejects_negative_std() {
        let mut rng = StdRng::seed_from_u64(3);
        let result: Result<Tensor<f64>> =
            sample_filters(&mut rng, InitKind::Normal, [1, 1, 3, 3], (1, 1), -0.5);
        assert!(matches!(result, Err(LayerError::InvalidParameter(_))));
    }

    #[test]
    fn test_zero_std_gives_zero_filters() {
        let mut rng = StdRng::seed_from_u64(3);
        let w: Tensor<f64> =
            sample_filters(&mut rng, InitKind::Normal, [2, 1, 3, 3], (1, 1), 0.0).unwrap();
        assert!(w.data.iter().all(|&v| v == 0.0));
    }
}
