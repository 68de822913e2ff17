//! Activation Functions
//!
//! The four nonlinearities a [`ConvMaxPool`](super::ConvMaxPool) layer can
//! apply, each with its forward transform, its derivative for the backward
//! pass, and the weight initializer it selects.
//!
//! ## Formulas
//!
//! ```text
//! tanh(x)     = (e^x - e^-x) / (e^x + e^-x)      tanh'     = 1 - y²
//! sigmoid(x)  = 1 / (1 + e^-x)                    sigmoid'  = y (1 - y)
//! softplus(x) = ln(1 + e^x)                       softplus' = sigmoid(x)
//! relu(x)     = max(0, x)                         relu'     = [x > 0]
//! ```
//!
//! ## Initializer Selection
//!
//! | activation        | initializer                  |
//! |-------------------|------------------------------|
//! | tanh, sigmoid     | Glorot uniform               |
//! | softplus, relu    | zero-mean normal, given std  |
//!
//! Layers without an activation have no initializer; see
//! [`InitKind::for_activation`](crate::init::InitKind::for_activation).

use crate::error::LayerError;
use crate::init::InitKind;
use crate::scalar::Scalar;
use crate::tensor::Tensor;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Elementwise nonlinearity applied after bias
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Activation {
    Tanh,
    Sigmoid,
    Softplus,
    Relu,
}

impl Activation {
    /// Canonical lowercase name
    pub fn name(self) -> &'static str {
        match self {
            Activation::Tanh => "tanh",
            Activation::Sigmoid => "sigmoid",
            Activation::Softplus => "softplus",
            Activation::Relu => "relu",
        }
    }

    /// Weight initializer associated with this activation
    pub fn init_kind(self) -> InitKind {
        match self {
            Activation::Tanh | Activation::Sigmoid => InitKind::GlorotUniform,
            Activation::Softplus | Activation::Relu => InitKind::Normal,
        }
    }

    /// Apply the activation to a single value
    pub fn apply<T: Scalar>(self, x: T) -> T {
        match self {
            Activation::Tanh => x.tanh(),
            Activation::Sigmoid => sigmoid(x),
            Activation::Softplus => softplus(x),
            Activation::Relu => x.max(T::zero()),
        }
    }

    /// Derivative with respect to the input
    ///
    /// `x` is the pre-activation value and `y = self.apply(x)`; tanh and
    /// sigmoid use `y`, softplus and relu use `x`.
    pub fn derivative<T: Scalar>(self, x: T, y: T) -> T {
        match self {
            Activation::Tanh => T::one() - y * y,
            Activation::Sigmoid => y * (T::one() - y),
            Activation::Softplus => sigmoid(x),
            Activation::Relu => {
                if x > T::zero() {
                    T::one()
                } else {
                    T::zero()
                }
            }
        }
    }

    /// Activation (forward pass) over a whole tensor
    pub fn forward<T: Scalar>(self, x: &Tensor<T>) -> Tensor<T> {
        x.map(|v| self.apply(v))
    }

    /// Activation derivative (backward pass)
    ///
    /// # Arguments
    ///
    /// * `grad_out` - Gradient from the next stage
    /// * `x` - Pre-activation values from the forward pass
    /// * `y` - Activated values from the forward pass
    ///
    /// # Returns
    ///
    /// Gradient with respect to the pre-activation: `grad_out * f'(x)`
    pub fn backward<T: Scalar>(
        self,
        grad_out: &Tensor<T>,
        x: &Tensor<T>,
        y: &Tensor<T>,
    ) -> Tensor<T> {
        assert_eq!(grad_out.shape, x.shape, "Gradient shape must match input");
        let grad: Vec<T> = grad_out
            .data
            .par_iter()
            .zip(x.data.par_iter().zip(&y.data))
            .map(|(&g, (&xv, &yv))| g * self.derivative(xv, yv))
            .collect();
        Tensor::new(grad, x.shape.clone())
    }
}

/// Logistic sigmoid, stable for large |x|
fn sigmoid<T: Scalar>(x: T) -> T {
    if x >= T::zero() {
        T::one() / (T::one() + (-x).exp())
    } else {
        let e = x.exp();
        e / (T::one() + e)
    }
}

/// ln(1 + e^x) without overflow
fn softplus<T: Scalar>(x: T) -> T {
    x.max(T::zero()) + (-x.abs()).exp().ln_1p()
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Activation {
    type Err = LayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tanh" => Ok(Activation::Tanh),
            "sigmoid" | "logistic" => Ok(Activation::Sigmoid),
            "softplus" => Ok(Activation::Softplus),
            "relu" => Ok(Activation::Relu),
            _ => Err(LayerError::UnsupportedActivation(s.to_string())),
        }
    }
}

impl TryFrom<String> for Activation {
    type Error = LayerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Activation> for String {
    fn from(value: Activation) -> Self {
        value.name().to_string()
    }
}
