//! 2D Convolution
//!
//! True (kernel-flipped) 2D convolution over `[batch, channels, height, width]`
//! tensors with filters of shape `[out_channels, in_channels, kh, kw]`, plus
//! the three border modes a layer can be configured with.
//!
//! ## Border Modes
//!
//! ```text
//! valid:  out = in - k + 1        (only positions where the filter fits)
//! full:   out = in + k - 1        (every position with any overlap)
//! same:   full, then crop (k-1)/2 from each border
//! ```
//!
//! The `same` crop uses floor division on both borders. For an odd kernel the
//! result has the input size; for an even kernel it is one larger.
//!
//! ## Forward Pass
//!
//! With `p` the zero padding (0 for valid, k-1 for full):
//!
//! ```text
//! y[n,o,i,j] = Σ_{c,a,b} x[n,c,i+a-p_h,j+b-p_w] · W[o,c,kh-1-a,kw-1-b]
//! ```
//!
//! ## Backward Pass
//!
//! ```text
//! grad_W[o,c,kh-1-a,kw-1-b] = Σ_{n,i,j} grad_y[n,o,i,j] · x[n,c,i+a-p_h,j+b-p_w]
//! grad_x[n,c,i+a-p_h,j+b-p_w] += grad_y[n,o,i,j] · W[o,c,kh-1-a,kw-1-b]
//! ```
//!
//! Both passes parallelise over independent output planes with Rayon.

use crate::error::LayerError;
use crate::scalar::Scalar;
use crate::tensor::Tensor;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// Edge handling for the convolution
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BorderMode {
    Valid,
    #[default]
    Same,
    Full,
}

impl BorderMode {
    /// Canonical lowercase name
    pub fn name(self) -> &'static str {
        match self {
            BorderMode::Valid => "valid",
            BorderMode::Same => "same",
            BorderMode::Full => "full",
        }
    }

    /// Zero padding of the underlying direct convolution
    pub fn conv_padding(self, kh: usize, kw: usize) -> (usize, usize) {
        match self {
            BorderMode::Valid => (0, 0),
            BorderMode::Same | BorderMode::Full => (kh - 1, kw - 1),
        }
    }

    /// Rows and columns cropped from each border after convolving
    pub fn crop(self, kh: usize, kw: usize) -> (usize, usize) {
        match self {
            BorderMode::Same => ((kh - 1) / 2, (kw - 1) / 2),
            BorderMode::Valid | BorderMode::Full => (0, 0),
        }
    }

    /// Spatial output size for an `h × w` input and `kh × kw` kernel
    ///
    /// Returns `None` when a valid convolution doesn't fit.
    pub fn output_size(self, h: usize, w: usize, kh: usize, kw: usize) -> Option<(usize, usize)> {
        let (ph, pw) = self.conv_padding(kh, kw);
        let (ch, cw) = self.crop(kh, kw);
        let conv_h = (h + 2 * ph).checked_sub(kh)? + 1;
        let conv_w = (w + 2 * pw).checked_sub(kw)? + 1;
        Some((conv_h - 2 * ch, conv_w - 2 * cw))
    }
}

impl fmt::Display for BorderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BorderMode {
    type Err = LayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "valid" => Ok(BorderMode::Valid),
            "same" => Ok(BorderMode::Same),
            "full" => Ok(BorderMode::Full),
            other => Err(LayerError::UnsupportedBorderMode(other.to_string())),
        }
    }
}

impl TryFrom<String> for BorderMode {
    type Error = LayerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BorderMode> for String {
    fn from(value: BorderMode) -> Self {
        value.name().to_string()
    }
}

/// Output indices `i` for which `i + offset - pad` lands inside `0..len`
#[inline]
fn overlap(offset: usize, pad: usize, len: usize, out_len: usize) -> Range<usize> {
    let lo = pad.saturating_sub(offset);
    let hi = (len + pad).saturating_sub(offset).min(out_len);
    lo..hi.max(lo)
}

/// Spatial size of a direct convolution with padding `pad`
fn conv_out_dims(
    input: &Tensor<impl Scalar>,
    weight: &Tensor<impl Scalar>,
    pad: (usize, usize),
) -> (usize, usize) {
    let [_, _, h, w] = input.dims4();
    let [_, _, kh, kw] = weight.dims4();
    let out_h = (h + 2 * pad.0)
        .checked_sub(kh)
        .expect("kernel taller than padded input")
        + 1;
    let out_w = (w + 2 * pad.1)
        .checked_sub(kw)
        .expect("kernel wider than padded input")
        + 1;
    (out_h, out_w)
}

/// Direct 2D convolution with symmetric zero padding
///
/// # Arguments
///
/// * `input` - `[batch, in_channels, h, w]`
/// * `weight` - `[out_channels, in_channels, kh, kw]`
/// * `pad` - Zero padding `(p_h, p_w)` applied to every border
///
/// # Returns
///
/// `[batch, out_channels, h + 2p_h - kh + 1, w + 2p_w - kw + 1]`
///
/// # Panics
///
/// Panics if channel counts disagree or the kernel doesn't fit.
pub fn conv2d<T: Scalar>(input: &Tensor<T>, weight: &Tensor<T>, pad: (usize, usize)) -> Tensor<T> {
    let [batch, channels, h, w] = input.dims4();
    let [out_channels, in_channels, kh, kw] = weight.dims4();
    assert_eq!(
        channels, in_channels,
        "Input has {} channels but filters expect {}",
        channels, in_channels
    );
    let (out_h, out_w) = conv_out_dims(input, weight, pad);
    let (ph, pw) = pad;
    let plane = out_h * out_w;
    let mut result = vec![T::zero(); batch * out_channels * plane];
    if plane == 0 {
        return Tensor::new(result, vec![batch, out_channels, out_h, out_w]);
    }

    // One output plane per (n, o) pair
    result
        .par_chunks_mut(plane)
        .enumerate()
        .for_each(|(no, out)| {
            let n = no / out_channels;
            let o = no % out_channels;
            for c in 0..channels {
                let x = &input.data[(n * channels + c) * h * w..(n * channels + c + 1) * h * w];
                let fi = (o * in_channels + c) * kh * kw;
                let filt = &weight.data[fi..fi + kh * kw];
                for a in 0..kh {
                    let rows = overlap(a, ph, h, out_h);
                    for b in 0..kw {
                        let wv = filt[(kh - 1 - a) * kw + (kw - 1 - b)];
                        let cols = overlap(b, pw, w, out_w);
                        for i in rows.clone() {
                            let x_row = (i + a - ph) * w;
                            let out_row = &mut out[i * out_w..(i + 1) * out_w];
                            for j in cols.clone() {
                                out_row[j] = out_row[j] + x[x_row + j + b - pw] * wv;
                            }
                        }
                    }
                }
            }
        });

    Tensor::new(result, vec![batch, out_channels, out_h, out_w])
}

/// Gradients of [`conv2d`] with respect to input and filters
///
/// # Returns
///
/// `(grad_input, grad_weight)` with the shapes of `input` and `weight`
pub fn conv2d_backward<T: Scalar>(
    grad_out: &Tensor<T>,
    input: &Tensor<T>,
    weight: &Tensor<T>,
    pad: (usize, usize),
) -> (Tensor<T>, Tensor<T>) {
    let [batch, channels, h, w] = input.dims4();
    let [out_channels, in_channels, kh, kw] = weight.dims4();
    let (out_h, out_w) = conv_out_dims(input, weight, pad);
    assert_eq!(
        grad_out.shape,
        vec![batch, out_channels, out_h, out_w],
        "Gradient shape doesn't match convolution output"
    );
    let (ph, pw) = pad;
    let plane = out_h * out_w;

    // grad_W: one filter (all input channels) per output channel
    let mut grad_weight = vec![T::zero(); weight.len()];
    grad_weight
        .par_chunks_mut(in_channels * kh * kw)
        .enumerate()
        .for_each(|(o, gw)| {
            for n in 0..batch {
                let gi = (n * out_channels + o) * plane;
                let gy = &grad_out.data[gi..gi + plane];
                for c in 0..channels {
                    let x = &input.data[(n * channels + c) * h * w..(n * channels + c + 1) * h * w];
                    for a in 0..kh {
                        let rows = overlap(a, ph, h, out_h);
                        for b in 0..kw {
                            let cols = overlap(b, pw, w, out_w);
                            let mut acc = T::zero();
                            for i in rows.clone() {
                                let x_row = (i + a - ph) * w;
                                for j in cols.clone() {
                                    acc = acc + gy[i * out_w + j] * x[x_row + j + b - pw];
                                }
                            }
                            let idx = c * kh * kw + (kh - 1 - a) * kw + (kw - 1 - b);
                            gw[idx] = gw[idx] + acc;
                        }
                    }
                }
            }
        });

    // grad_x: one sample per task
    let mut grad_input = vec![T::zero(); input.len()];
    if channels * h * w > 0 {
        grad_input
            .par_chunks_mut(channels * h * w)
            .enumerate()
            .for_each(|(n, gx)| {
                for o in 0..out_channels {
                    let gi = (n * out_channels + o) * plane;
                    let gy = &grad_out.data[gi..gi + plane];
                    for c in 0..channels {
                        let fi = (o * in_channels + c) * kh * kw;
                        let filt = &weight.data[fi..fi + kh * kw];
                        let gx_c = &mut gx[c * h * w..(c + 1) * h * w];
                        for a in 0..kh {
                            let rows = overlap(a, ph, h, out_h);
                            for b in 0..kw {
                                let wv = filt[(kh - 1 - a) * kw + (kw - 1 - b)];
                                let cols = overlap(b, pw, w, out_w);
                                for i in rows.clone() {
                                    let x_row = (i + a - ph) * w;
                                    for j in cols.clone() {
                                        let idx = x_row + j + b - pw;
                                        gx_c[idx] = gx_c[idx] + gy[i * out_w + j] * wv;
                                    }
                                }
                            }
                        }
                    }
                }
            });
    }

    (
        Tensor::new(grad_input, input.shape.clone()),
        Tensor::new(grad_weight, weight.shape.clone()),
    )
}

/// Convolve according to a border mode (including the `same` crop)
pub fn convolve<T: Scalar>(input: &Tensor<T>, weight: &Tensor<T>, mode: BorderMode) -> Tensor<T> {
    let [_, _, kh, kw] = weight.dims4();
    let conv_out = conv2d(input, weight, mode.conv_padding(kh, kw));
    match mode.crop(kh, kw) {
        (0, 0) => conv_out,
        (ch, cw) => conv_out.crop2d(ch, ch, cw, cw),
    }
}

/// Backward pass of [`convolve`]
///
/// # Returns
///
/// `(grad_input, grad_weight)`
pub fn convolve_backward<T: Scalar>(
    grad_out: &Tensor<T>,
    input: &Tensor<T>,
    weight: &Tensor<T>,
    mode: BorderMode,
) -> (Tensor<T>, Tensor<T>) {
    let [_, _, kh, kw] = weight.dims4();
    let grad_conv = match mode.crop(kh, kw) {
        (0, 0) => grad_out.clone(),
        (ch, cw) => grad_out.pad2d(ch, ch, cw, cw),
    };
    conv2d_backward(&grad_conv, input, weight, mode.conv_padding(kh, kw))
}
