//! Convolution + Max-Pool Layer
//!
//! The layer used by the convolutional encoders: convolve, max-pool, add a
//! per-channel bias and apply a nonlinearity, optionally followed by dropout.
//!
//! ## Forward Pass
//!
//! ```text
//! Input x [batch, in_channels, h, w]
//!     ↓
//! Convolution with W (valid / same / full)
//!     ↓
//! Max pool (ph × pw, ignore border; skipped for 1 × 1)
//!     ↓
//! + b  (one value per output channel)
//!     ↓
//! Activation (tanh / sigmoid / softplus / relu, or none)
//!     ↓
//! Dropout (drop_output / forward_dropout only)
//! ```
//!
//! ## Initialization
//!
//! `W` is drawn according to the activation (see [`crate::init`]); `b`
//! starts at zero. Both are public so an optimizer can update them between
//! forward calls.
//!
//! ## Example
//!
//! ```rust
//! use convpool::{Activation, BorderMode, ConvMaxPool, ConvPoolConfig, Tensor};
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! let config = ConvPoolConfig::new([4, 1, 3, 3], [2, 1, 8, 8])
//!     .with_border_mode(BorderMode::Same)
//!     .with_activation(Activation::Relu);
//! let mut rng = StdRng::seed_from_u64(0);
//! let layer: ConvMaxPool<f32> = ConvMaxPool::new(&mut rng, config)?;
//!
//! let x = Tensor::zeros(vec![2, 1, 8, 8]);
//! let y = layer.output(&x)?;
//! assert_eq!(y.shape, vec![2, 4, 4, 4]);
//! # Ok::<(), convpool::LayerError>(())
//! ```

use super::activation::Activation;
use super::conv::{convolve, convolve_backward, BorderMode};
use super::dropout::{Dropout, DropoutCache};
use super::pool::{max_pool2d, max_pool2d_backward, pooled_size};
use crate::config::ConvPoolConfig;
use crate::error::{LayerError, Result};
use crate::init::{self, InitKind};
use crate::scalar::Scalar;
use crate::tensor::Tensor;
use rand::Rng;
use tracing::debug;

/// Convolution + max-pool layer
///
/// Holds the filters `weight` `[out_channels, in_channels, kh, kw]` and the
/// bias `[out_channels]`, generic over the element type.
#[derive(Clone, Debug)]
pub struct ConvMaxPool<T: Scalar = f32> {
    pub weight: Tensor<T>,
    pub bias: Tensor<T>,
    config: ConvPoolConfig,
}

/// Intermediate values shared by the inference and training paths
struct Linear<T> {
    conv_shape: Vec<usize>,
    pool_argmax: Option<Vec<usize>>,
    value: Tensor<T>,
}

impl<T: Scalar> ConvMaxPool<T> {
    /// Create a new layer with randomly initialized filters
    ///
    /// # Arguments
    ///
    /// * `rng` - Random source for the filter initializer
    /// * `config` - Shapes, pool size, border mode, activation and std
    ///
    /// # Errors
    ///
    /// - [`LayerError::UnsupportedActivation`] if no activation is configured
    /// - [`LayerError::ChannelMismatch`] / [`LayerError::InvalidShape`] for
    ///   inconsistent shapes
    /// - [`LayerError::InvalidParameter`] for a bad `std` on the normal branch
    pub fn new<R: Rng + ?Sized>(rng: &mut R, config: ConvPoolConfig) -> Result<Self> {
        config.validate()?;
        let kind = InitKind::for_activation(config.activation)?;
        let weight = init::sample_filters(
            rng,
            kind,
            config.filter_shape,
            config.pool_size,
            config.std,
        )?;
        let bias = Tensor::zeros(vec![config.out_channels()]);

        let (fan_in, fan_out) = init::fans(config.filter_shape, config.pool_size);
        debug!(
            filter_shape = ?config.filter_shape,
            border_mode = %config.border_mode,
            init = ?kind,
            fan_in,
            fan_out,
            "initialized ConvMaxPool layer"
        );

        Ok(Self {
            weight,
            bias,
            config,
        })
    }

    /// Build a layer around existing parameters
    ///
    /// No initializer runs, so a layer without activation is allowed here.
    pub fn with_parameters(
        config: ConvPoolConfig,
        weight: Tensor<T>,
        bias: Tensor<T>,
    ) -> Result<Self> {
        config.validate()?;
        if weight.shape != config.filter_shape {
            return Err(LayerError::InputShape {
                expected: format!("weight {:?}", config.filter_shape),
                got: weight.shape,
            });
        }
        if bias.shape != [config.out_channels()] {
            return Err(LayerError::InputShape {
                expected: format!("bias [{}]", config.out_channels()),
                got: bias.shape,
            });
        }
        Ok(Self {
            weight,
            bias,
            config,
        })
    }

    pub fn config(&self) -> &ConvPoolConfig {
        &self.config
    }

    pub fn activation(&self) -> Option<Activation> {
        self.config.activation
    }

    pub fn border_mode(&self) -> BorderMode {
        self.config.border_mode
    }

    pub fn pool_size(&self) -> (usize, usize) {
        self.config.pool_size
    }

    /// Trainable parameters, `[weight, bias]`
    pub fn parameters(&self) -> [&Tensor<T>; 2] {
        [&self.weight, &self.bias]
    }

    /// Mutable trainable parameters, `[weight, bias]`
    pub fn parameters_mut(&mut self) -> [&mut Tensor<T>; 2] {
        [&mut self.weight, &mut self.bias]
    }

    /// Total number of weights and biases
    pub fn parameter_count(&self) -> usize {
        self.weight.len() + self.bias.len()
    }

    /// Output shape for a batch of images of the configured size
    pub fn output_shape(&self, batch: usize) -> Option<Vec<usize>> {
        let [_, _, h, w] = self.config.image_shape;
        self.spatial_output(h, w)
            .map(|(oh, ow)| vec![batch, self.config.out_channels(), oh, ow])
    }

    fn spatial_output(&self, h: usize, w: usize) -> Option<(usize, usize)> {
        let (kh, kw) = self.config.kernel_size();
        let (ch, cw) = self.config.border_mode.output_size(h, w, kh, kw)?;
        if self.config.pooling_disabled() {
            Some((ch, cw))
        } else {
            Some(pooled_size(ch, cw, self.config.pool_size))
        }
    }

    fn check_input(&self, input: &Tensor<T>) -> Result<()> {
        let (kh, kw) = self.config.kernel_size();
        let expected = || {
            format!(
                "[batch, {}, h, w] with h, w >= 1 ({}x{} kernel, {} mode)",
                self.config.in_channels(),
                kh,
                kw,
                self.config.border_mode
            )
        };
        let fits = input.shape.len() == 4
            && input.shape[1] == self.config.in_channels()
            && input.shape[2] > 0
            && input.shape[3] > 0
            && self
                .config
                .border_mode
                .output_size(input.shape[2], input.shape[3], kh, kw)
                .is_some();
        if fits {
            Ok(())
        } else {
            Err(LayerError::InputShape {
                expected: expected(),
                got: input.shape.clone(),
            })
        }
    }

    /// Convolution, pooling and bias
    fn linear(&self, input: &Tensor<T>) -> Result<Linear<T>> {
        self.check_input(input)?;
        let conv_out = convolve(input, &self.weight, self.config.border_mode);
        let conv_shape = conv_out.shape.clone();

        let (pooled, pool_argmax) = if self.config.pooling_disabled() {
            (conv_out, None)
        } else {
            let (pooled, argmax) = max_pool2d(&conv_out, self.config.pool_size);
            (pooled, Some(argmax))
        };

        Ok(Linear {
            conv_shape,
            pool_argmax,
            value: pooled.add_channel_bias(&self.bias),
        })
    }

    fn activate(&self, linear: Tensor<T>) -> Tensor<T> {
        match self.config.activation {
            Some(activation) => activation.forward(&linear),
            None => linear,
        }
    }

    /// Inference output
    ///
    /// Pure function of the input and the current parameters.
    ///
    /// # Arguments
    ///
    /// * `input` - `[batch, in_channels, h, w]`
    ///
    /// # Returns
    ///
    /// `[batch, out_channels, h', w']` where `h', w'` follow from the border
    /// mode and pool size
    pub fn output(&self, input: &Tensor<T>) -> Result<Tensor<T>> {
        let _span = tracing::trace_span!("ConvMaxPool::output").entered();
        let linear = self.linear(input)?;
        Ok(self.activate(linear.value))
    }

    /// Output with optional dropout
    ///
    /// Computes [`ConvMaxPool::output`], then, if `drop` is set, zeroes each
    /// element with probability `p` and scales the survivors by `1/(1-p)`.
    /// With `drop == false` the result equals `output(input)` and `rng` is
    /// left untouched.
    ///
    /// # Errors
    ///
    /// [`LayerError::InvalidProbability`] if `p` is outside `[0, 1]`, in
    /// addition to the errors of [`ConvMaxPool::output`].
    pub fn drop_output<R: Rng + ?Sized>(
        &self,
        input: &Tensor<T>,
        drop: bool,
        rng: &mut R,
        p: f64,
    ) -> Result<Tensor<T>> {
        let dropout = Dropout::new(p)?;
        let output = self.output(input)?;
        if drop {
            Ok(dropout.forward(&output, rng).0)
        } else {
            Ok(output)
        }
    }

    /// Forward pass with caching for backward
    ///
    /// Produces the same value as [`ConvMaxPool::output`].
    pub fn forward(&self, input: &Tensor<T>) -> Result<(Tensor<T>, ConvPoolCache<T>)> {
        let _span = tracing::trace_span!("ConvMaxPool::forward").entered();
        let linear = self.linear(input)?;
        let activated = self.activate(linear.value.clone());
        let cache = ConvPoolCache {
            input: input.clone(),
            conv_shape: linear.conv_shape,
            pool_argmax: linear.pool_argmax,
            linear: linear.value,
            activated: activated.clone(),
            dropout: None,
        };
        Ok((activated, cache))
    }

    /// Forward pass with dropout and caching for backward
    ///
    /// Produces the same value as [`ConvMaxPool::drop_output`] for the same
    /// RNG state.
    pub fn forward_dropout<R: Rng + ?Sized>(
        &self,
        input: &Tensor<T>,
        drop: bool,
        rng: &mut R,
        p: f64,
    ) -> Result<(Tensor<T>, ConvPoolCache<T>)> {
        let dropout = Dropout::new(p)?;
        let (output, mut cache) = self.forward(input)?;
        if !drop {
            return Ok((output, cache));
        }
        let (dropped, dropout_cache) = dropout.forward(&output, rng);
        cache.dropout = Some((dropout, dropout_cache));
        Ok((dropped, cache))
    }

    /// Backward pass
    ///
    /// # Arguments
    ///
    /// * `grad_output` - Gradient of the loss with respect to this layer's output
    /// * `cache` - Values recorded by [`ConvMaxPool::forward`] or
    ///   [`ConvMaxPool::forward_dropout`]
    ///
    /// # Returns
    ///
    /// Gradients for weight, bias and input
    pub fn backward(
        &self,
        grad_output: &Tensor<T>,
        cache: &ConvPoolCache<T>,
    ) -> Result<ConvPoolGradients<T>> {
        let _span = tracing::trace_span!("ConvMaxPool::backward").entered();
        if grad_output.shape != cache.linear.shape {
            return Err(LayerError::InputShape {
                expected: format!("gradient {:?}", cache.linear.shape),
                got: grad_output.shape.clone(),
            });
        }

        // Dropout → activation
        let grad = match &cache.dropout {
            Some((dropout, dropout_cache)) => dropout.backward(grad_output, dropout_cache),
            None => grad_output.clone(),
        };
        let grad = match self.config.activation {
            Some(activation) => activation.backward(&grad, &cache.linear, &cache.activated),
            None => grad,
        };

        // Bias is broadcast over batch and space
        let grad_bias = grad.sum_per_channel();

        // Pooling → convolution
        let grad_conv = match &cache.pool_argmax {
            Some(argmax) => max_pool2d_backward(&grad, argmax, &cache.conv_shape),
            None => grad,
        };
        let (grad_input, grad_weight) =
            convolve_backward(&grad_conv, &cache.input, &self.weight, self.config.border_mode);

        Ok(ConvPoolGradients {
            weight: grad_weight,
            bias: grad_bias,
            input: grad_input,
        })
    }
}

/// Cache for the layer's backward pass
#[derive(Clone, Debug)]
pub struct ConvPoolCache<T> {
    /// Layer input
    pub input: Tensor<T>,
    /// Convolution output shape (after the same-mode crop, before pooling)
    pub conv_shape: Vec<usize>,
    /// Flat argmax indices into the convolution output; None without pooling
    pub pool_argmax: Option<Vec<usize>>,
    /// Pooled output plus bias, before the activation
    pub linear: Tensor<T>,
    /// Activation output, before dropout
    pub activated: Tensor<T>,
    /// Dropout stage and its mask, if dropout was applied
    pub dropout: Option<(Dropout, DropoutCache<T>)>,
}

/// Gradients for the layer
#[derive(Clone, Debug)]
pub struct ConvPoolGradients<T> {
    pub weight: Tensor<T>,
    pub bias: Tensor<T>,
    pub input: Tensor<T>, // Gradient to pass to previous layer
}
