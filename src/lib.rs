//! convpool: Convolution + Max-Pool Layer
//!
//! A convolutional layer for generative image models: convolution, max
//! pooling, per-channel bias and a nonlinearity, with an optional dropout
//! variant and an explicit backward pass.
//!
//! # Modules
//!
//! - [`layers`] - Activation, convolution, pooling, dropout and the [`ConvMaxPool`] layer
//! - [`init`] - Activation-dependent filter initialization
//! - [`config`] - Layer configuration and JSON loading
//! - [`tensor`] - Dense tensor storage and element-wise kernels
//! - [`gradients`] - Gradient norm and clipping
//!
//! # Example
//!
//! ```rust
//! use convpool::{Activation, BorderMode, ConvMaxPool, ConvPoolConfig, Tensor};
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! let config = ConvPoolConfig::new([8, 1, 5, 5], [16, 1, 28, 28])
//!     .with_border_mode(BorderMode::Same)
//!     .with_pool_size((2, 2))
//!     .with_activation(Activation::Softplus);
//! let mut rng = StdRng::seed_from_u64(1234);
//! let layer: ConvMaxPool<f64> = ConvMaxPool::new(&mut rng, config)?;
//!
//! let images = Tensor::zeros(vec![16, 1, 28, 28]);
//! let train = layer.drop_output(&images, true, &mut rng, 0.2)?;
//! let eval = layer.drop_output(&images, false, &mut rng, 0.2)?;
//! assert_eq!(train.shape, vec![16, 8, 14, 14]);
//! assert_eq!(eval, layer.output(&images)?);
//! # Ok::<(), convpool::LayerError>(())
//! ```

pub mod config;
pub mod error;
pub mod gradients;
pub mod init;
pub mod layers;
pub mod scalar;
pub mod tensor;

// Re-export main types for convenience
pub use config::{load_config, ConvPoolConfig};
pub use error::{LayerError, Result};
pub use init::InitKind;
pub use layers::{Activation, BorderMode, ConvMaxPool, ConvPoolCache, ConvPoolGradients, Dropout};
pub use scalar::Scalar;
pub use tensor::Tensor;
