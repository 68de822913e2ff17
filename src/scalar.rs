//! Element Types
//!
//! The layer is generic over its floating-point element type instead of
//! reading a global precision setting. [`Scalar`] collects everything the
//! kernels and initializers need from that type, and is implemented for
//! `f32` and `f64`.
//!
//! ```rust
//! use convpool::Scalar;
//!
//! fn halve<T: Scalar>(x: T) -> T {
//!     x * T::cast(0.5)
//! }
//!
//! assert_eq!(halve(3.0f32), 1.5);
//! assert_eq!(halve(3.0f64), 1.5);
//! ```

use num_traits::Float;
use rand::distr::uniform::SampleUniform;
use rand::Rng;
use rand_distr::{Distribution, Normal, NormalError};
use std::fmt::{Debug, Display};

/// Floating-point element type usable in tensors and layers.
pub trait Scalar:
    Float + SampleUniform + Default + Debug + Display + Send + Sync + 'static
{
    /// Convert an `f64` constant into this type (rounding for `f32`).
    fn cast(value: f64) -> Self;

    /// Widen to `f64`.
    fn as_f64(self) -> f64;

    /// Draw `len` samples from `Normal(mean, std_dev)`.
    ///
    /// Lives on the trait because `rand_distr::Normal` is only a
    /// distribution over the concrete float types.
    fn normal_samples<R: Rng + ?Sized>(
        rng: &mut R,
        mean: Self,
        std_dev: Self,
        len: usize,
    ) -> Result<Vec<Self>, NormalError>;
}

macro_rules! impl_scalar {
    ($t:ty) => {
        impl Scalar for $t {
            #[inline]
            fn cast(value: f64) -> Self {
                value as $t
            }

            #[inline]
            fn as_f64(self) -> f64 {
                self as f64
            }

            fn normal_samples<R: Rng + ?Sized>(
                rng: &mut R,
                mean: Self,
                std_dev: Self,
                len: usize,
            ) -> Result<Vec<Self>, NormalError> {
                let normal = Normal::new(mean, std_dev)?;
                Ok((0..len).map(|_| normal.sample(rng)).collect())
            }
        }
    };
}

impl_scalar!(f32);
impl_scalar!(f64);
