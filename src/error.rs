//! Error Types
//!
//! Every failure in this crate is a configuration or shape problem the
//! caller has to fix; none of them are retried. Tensor kernels assert on
//! their preconditions, and the layer checks those preconditions up front
//! so callers only ever see a [`LayerError`].

use thiserror::Error;

/// Errors raised while configuring or running a layer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayerError {
    /// The activation has no initialization policy (or the name is unknown)
    #[error("unsupported activation '{0}' in ConvMaxPool layer")]
    UnsupportedActivation(String),

    /// Border mode is not one of "valid", "same" or "full"
    #[error("unsupported border mode '{0}', expected one of \"valid\", \"same\", \"full\"")]
    UnsupportedBorderMode(String),

    /// Image and filter shapes disagree on the number of input channels
    #[error("image shape has {image} input channels but filter shape has {filter}")]
    ChannelMismatch { image: usize, filter: usize },

    /// A filter, image or pool dimension is unusable
    #[error("invalid shape: {0}")]
    InvalidShape(String),

    /// The tensor passed to a forward or backward call has the wrong shape
    #[error("input shape mismatch: expected {expected}, got {got:?}")]
    InputShape { expected: String, got: Vec<usize> },

    /// Dropout probability outside [0, 1]
    #[error("dropout probability must be within [0, 1], got {0}")]
    InvalidProbability(f64),

    /// A numeric hyperparameter is out of range
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Configuration file could not be read or parsed
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, LayerError>;

impl From<std::io::Error> for LayerError {
    fn from(err: std::io::Error) -> Self {
        LayerError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for LayerError {
    fn from(err: serde_json::Error) -> Self {
        LayerError::Config(err.to_string())
    }
}
