//! Neural Network Layers
//!
//! This module contains the building blocks of the convolution + max-pool
//! layer. Each stage provides both forward and backward passes.
//!
//! ## Stages
//!
//! - **activation**: tanh, sigmoid, softplus and relu (forward and backward)
//! - **conv**: 2D convolution with valid / same / full border modes
//! - **pool**: Non-overlapping max pooling that ignores partial windows
//! - **dropout**: Inverted dropout with a caller-supplied RNG
//! - **conv_pool**: The complete layer
//!
//! ## Design Pattern
//!
//! Trainable code follows a consistent pattern:
//!
//! ```rust,ignore
//! impl Layer {
//!     pub fn new(...) -> Result<Self> { }
//!     pub fn forward(&self, x: &Tensor<T>) -> Result<(Tensor<T>, Cache)> { }
//!     pub fn backward(&self, grad: &Tensor<T>, cache: &Cache) -> Result<Gradients> { }
//! }
//! ```
//!
//! The cache keeps whatever the backward pass needs, which keeps
//! backpropagation explicit.

pub mod activation;
pub mod conv;
pub mod conv_pool;
pub mod dropout;
pub mod pool;

// Re-export main types for convenience
pub use activation::Activation;
pub use conv::{conv2d, conv2d_backward, convolve, convolve_backward, BorderMode};
pub use conv_pool::{ConvMaxPool, ConvPoolCache, ConvPoolGradients};
pub use dropout::{Dropout, DropoutCache};
pub use pool::{max_pool2d, max_pool2d_backward, pooled_size};
