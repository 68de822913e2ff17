//! Dropout
//!
//! Dropout is a regularization technique that randomly zeros out activations
//! during training to prevent overfitting. Kept values are scaled by
//! `1 / (1 - p)` so the expected activation is unchanged ("inverted"
//! dropout), which lets inference skip the layer entirely.
//!
//! The random source is supplied by the caller on every call, so the same
//! layer can be driven by a seeded RNG in tests and a thread RNG in
//! training.

use crate::error::{LayerError, Result};
use crate::scalar::Scalar;
use crate::tensor::Tensor;
use rand::Rng;
use rayon::prelude::*;

/// Dropout with a fixed drop probability
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Dropout {
    pub rate: f64,
}

impl Dropout {
    /// Create a new dropout stage
    ///
    /// # Arguments
    ///
    /// * `rate` - Dropout probability (0.0 = no dropout, 1.0 = drop all)
    pub fn new(rate: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&rate) {
            return Err(LayerError::InvalidProbability(rate));
        }
        Ok(Self { rate })
    }

    /// Forward pass with caching for backward
    ///
    /// # Returns
    ///
    /// Tuple of (output, cache) where cache stores the dropout mask
    pub fn forward<T: Scalar, R: Rng + ?Sized>(
        &self,
        x: &Tensor<T>,
        rng: &mut R,
    ) -> (Tensor<T>, DropoutCache<T>) {
        if self.rate == 0.0 {
            let cache = DropoutCache {
                mask: None,
                scale: T::one(),
            };
            return (x.clone(), cache);
        }

        if self.rate >= 1.0 {
            // Drop everything
            let cache = DropoutCache {
                mask: Some(vec![false; x.len()]),
                scale: T::one(),
            };
            return (Tensor::zeros(x.shape.clone()), cache);
        }

        // Mask is drawn sequentially so a seeded RNG gives a reproducible mask
        let mask: Vec<bool> = (0..x.len())
            .map(|_| rng.random::<f64>() >= self.rate)
            .collect();
        let scale = T::cast(1.0 / (1.0 - self.rate));
        let output = x
            .data
            .par_iter()
            .zip(&mask)
            .map(|(&v, &kept)| if kept { v * scale } else { T::zero() })
            .collect();

        let cache = DropoutCache {
            mask: Some(mask),
            scale,
        };
        (Tensor::new(output, x.shape.clone()), cache)
    }

    /// Backward pass through dropout
    ///
    /// Applies the same mask and scale to the incoming gradient.
    pub fn backward<T: Scalar>(
        &self,
        grad_output: &Tensor<T>,
        cache: &DropoutCache<T>,
    ) -> Tensor<T> {
        match &cache.mask {
            Some(mask) => {
                let scale = cache.scale;
                let grad = grad_output
                    .data
                    .par_iter()
                    .zip(mask)
                    .map(|(&g, &kept)| if kept { g * scale } else { T::zero() })
                    .collect();
                Tensor::new(grad, grad_output.shape.clone())
            }
            // No dropout was applied, just pass gradient through
            None => grad_output.clone(),
        }
    }
}

/// Cache for dropout backward pass
#[derive(Clone, Debug)]
pub struct DropoutCache<T> {
    /// Dropout mask (true = kept, false = dropped); None if nothing was dropped
    pub mask: Option<Vec<bool>>,
    /// Scaling factor applied to kept values
    pub scale: T,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_rate_validation() {
        assert!(Dropout::new(0.0).is_ok());
        assert!(Dropout::new(1.0).is_ok());
        assert_eq!(Dropout::new(1.5), Err(LayerError::InvalidProbability(1.5)));
        assert_eq!(Dropout::new(-0.1), Err(LayerError::InvalidProbability(-0.1)));
        assert!(Dropout::new(f64::NAN).is_err());
    }

    #[test]
    fn test_zero_rate_is_identity() {
        let x = Tensor::from_fn(vec![4, 4], |i| i as f32);
        let (y, cache) = Dropout::new(0.0)
            .unwrap()
            .forward(&x, &mut StdRng::seed_from_u64(1));
        assert_eq!(y, x);
        assert!(cache.mask.is_none());
    }

    #[test]
    fn test_full_rate_zeros_everything() {
        let x = Tensor::full(vec![3, 3], 2.0f64);
        let (y, _) = Dropout::new(1.0)
            .unwrap()
            .forward(&x, &mut StdRng::seed_from_u64(1));
        assert!(y.data.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_kept_values_are_scaled() {
        let x = Tensor::full(vec![1000], 1.0f64);
        let dropout = Dropout::new(0.25).unwrap();
        let (y, cache) = dropout.forward(&x, &mut StdRng::seed_from_u64(9));
        let mask = cache.mask.unwrap();
        for (v, kept) in y.data.iter().zip(&mask) {
            if *kept {
                assert_relative_eq!(*v, 1.0 / 0.75);
            } else {
                assert_eq!(*v, 0.0);
            }
        }
        let dropped = mask.iter().filter(|k| !**k).count() as f64 / 1000.0;
        assert!((dropped - 0.25).abs() < 0.05, "dropped fraction {}", dropped);
    }

    #[test]
    fn test_backward_uses_forward_mask() {
        let x = Tensor::full(vec![64], 1.0f64);
        let dropout = Dropout::new(0.5).unwrap();
        let (y, cache) = dropout.forward(&x, &mut StdRng::seed_from_u64(4));
        let g = dropout.backward(&Tensor::full(vec![64], 1.0), &cache);
        assert_eq!(g, y);
    }
}
