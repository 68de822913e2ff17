//! Layer Configuration
//!
//! [`ConvPoolConfig`] describes a convolution + max-pool layer: filter and
//! image shapes, pool window, border mode, activation and the standard
//! deviation used by the normal initializer. It can be built in code or
//! loaded from JSON.
//!
//! # Example
//!
//! ```json
//! {
//!   "filter_shape": [32, 1, 5, 5],
//!   "image_shape": [100, 1, 28, 28],
//!   "pool_size": [2, 2],
//!   "border_mode": "same",
//!   "activation": "relu",
//!   "std": 0.02
//! }
//! ```
//!
//! `pool_size`, `border_mode`, `activation` and `std` are optional and
//! default to `[2, 2]`, `"same"`, `null` and `0.02`.

use crate::error::{LayerError, Result};
use crate::layers::{Activation, BorderMode};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

fn default_pool_size() -> (usize, usize) {
    (2, 2)
}

fn default_std() -> f64 {
    2e-2
}

/// Convolution + max-pool layer configuration
///
/// # Fields
///
/// - `filter_shape`: `[out_channels, in_channels, kh, kw]`
/// - `image_shape`: `[batch, in_channels, height, width]` of the expected input
/// - `pool_size`: Max-pool window `(ph, pw)`; `(1, 1)` disables pooling
/// - `border_mode`: Convolution edge handling
/// - `activation`: Nonlinearity after bias, `None` for a linear layer
/// - `std`: Standard deviation of the normal initializer (softplus/relu only)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawConfig")]
pub struct ConvPoolConfig {
    pub filter_shape: [usize; 4],
    pub image_shape: [usize; 4],
    pub pool_size: (usize, usize),
    pub border_mode: BorderMode,
    pub activation: Option<Activation>,
    pub std: f64,
}

/// On-disk form with the border mode and activation still as names
#[derive(Deserialize)]
struct RawConfig {
    filter_shape: [usize; 4],
    image_shape: [usize; 4],
    #[serde(default = "default_pool_size")]
    pool_size: (usize, usize),
    #[serde(default)]
    border_mode: Option<String>,
    #[serde(default)]
    activation: Option<String>,
    #[serde(default = "default_std")]
    std: f64,
}

impl TryFrom<RawConfig> for ConvPoolConfig {
    type Error = LayerError;

    fn try_from(raw: RawConfig) -> Result<Self> {
        let border_mode = match raw.border_mode {
            Some(name) => name.parse()?,
            None => BorderMode::default(),
        };
        let activation = raw.activation.map(|name| name.parse()).transpose()?;
        Ok(Self {
            filter_shape: raw.filter_shape,
            image_shape: raw.image_shape,
            pool_size: raw.pool_size,
            border_mode,
            activation,
            std: raw.std,
        })
    }
}

impl ConvPoolConfig {
    /// Configuration with the default pool size, border mode and std
    ///
    /// No activation is set; use [`ConvPoolConfig::with_activation`] before
    /// constructing a layer with random weights.
    pub fn new(filter_shape: [usize; 4], image_shape: [usize; 4]) -> Self {
        Self {
            filter_shape,
            image_shape,
            pool_size: default_pool_size(),
            border_mode: BorderMode::default(),
            activation: None,
            std: default_std(),
        }
    }

    pub fn with_pool_size(mut self, pool_size: (usize, usize)) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_border_mode(mut self, border_mode: BorderMode) -> Self {
        self.border_mode = border_mode;
        self
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = Some(activation);
        self
    }

    pub fn with_std(mut self, std: f64) -> Self {
        self.std = std;
        self
    }

    pub fn out_channels(&self) -> usize {
        self.filter_shape[0]
    }

    pub fn in_channels(&self) -> usize {
        self.filter_shape[1]
    }

    /// Kernel size `(kh, kw)`
    pub fn kernel_size(&self) -> (usize, usize) {
        (self.filter_shape[2], self.filter_shape[3])
    }

    /// Whether max pooling is skipped
    pub fn pooling_disabled(&self) -> bool {
        self.pool_size == (1, 1)
    }

    /// Check the shape invariants
    ///
    /// - every filter and pool dimension is non-zero
    /// - image and filter agree on the number of input channels
    /// - the image is large enough for a valid convolution
    pub fn validate(&self) -> Result<()> {
        if self.filter_shape.contains(&0) {
            return Err(LayerError::InvalidShape(format!(
                "filter shape {:?} has a zero dimension",
                self.filter_shape
            )));
        }
        if self.pool_size.0 == 0 || self.pool_size.1 == 0 {
            return Err(LayerError::InvalidShape(format!(
                "pool size {:?} has a zero dimension",
                self.pool_size
            )));
        }
        if self.image_shape[1] != self.filter_shape[1] {
            return Err(LayerError::ChannelMismatch {
                image: self.image_shape[1],
                filter: self.filter_shape[1],
            });
        }
        let (kh, kw) = self.kernel_size();
        if self
            .border_mode
            .output_size(self.image_shape[2], self.image_shape[3], kh, kw)
            .is_none()
        {
            return Err(LayerError::InvalidShape(format!(
                "{}x{} kernel doesn't fit a {}x{} image in valid mode",
                kh, kw, self.image_shape[2], self.image_shape[3]
            )));
        }
        Ok(())
    }

    /// Parse and validate a configuration from a JSON string
    ///
    /// Unknown border mode or activation names come back as
    /// [`LayerError::UnsupportedBorderMode`] / [`LayerError::UnsupportedActivation`].
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawConfig = serde_json::from_str(json)?;
        let config = ConvPoolConfig::try_from(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Loads a layer configuration from a JSON file.
///
/// Reads the file at `path`, deserializes it and checks the shape
/// invariants.
///
/// # Examples
///
/// ```no_run
/// use convpool::config::load_config;
///
/// let cfg = load_config("config/conv1.json").unwrap();
/// assert_eq!(cfg.in_channels(), 1);
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<ConvPoolConfig> {
    let contents = fs::read_to_string(path)?;
    ConvPoolConfig::from_json(&contents)
}
