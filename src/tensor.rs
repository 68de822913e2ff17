//! Tensor Storage for Convolutional Layers
//!
//! This module provides a small dense tensor type used by the layer kernels.
//! Tensors store a flat row-major buffer together with shape and stride
//! information.
//!
//! ## Core Concepts
//!
//! - **Data**: Flat `Vec<T>` storing all elements in row-major order
//! - **Shape**: Dimensions of the tensor (e.g., `[batch, channels, height, width]`)
//! - **Strides**: Step sizes for each dimension to compute flat indices
//!
//! The element type is any [`Scalar`] (`f32` or `f64`).
//!
//! ## Example
//!
//! ```rust
//! use convpool::Tensor;
//!
//! // One image, two channels, 1x2 pixels
//! let x = Tensor::new(vec![1.0f32, 2.0, 3.0, 4.0], vec![1, 2, 1, 2]);
//! let b = Tensor::new(vec![10.0f32, 20.0], vec![2]);
//! let y = x.add_channel_bias(&b);
//! assert_eq!(y.data, vec![11.0, 12.0, 23.0, 24.0]);
//! ```
//!
//! ## Performance
//!
//! Element-wise operations and the per-channel reductions run in parallel
//! via Rayon. Shape preconditions are asserted; the layer validates inputs
//! before calling in here.

use crate::scalar::Scalar;
use rayon::prelude::*;

/// A multi-dimensional array for layer computations
///
/// # Memory Layout
///
/// For shape `[2, 3]`, data is stored as:
/// `[row0_col0, row0_col1, row0_col2, row1_col0, row1_col1, row1_col2]`
/// with strides `[3, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor<T = f32> {
    /// Flat storage of all tensor elements
    pub data: Vec<T>,
    /// Shape of the tensor (dimensions)
    pub shape: Vec<usize>,
    /// Strides for each dimension (computed from shape)
    pub strides: Vec<usize>,
}

impl<T: Scalar> Tensor<T> {
    /// Create a new tensor with given data and shape
    ///
    /// # Panics
    ///
    /// Panics if the product of shape dimensions doesn't equal data length
    pub fn new(data: Vec<T>, shape: Vec<usize>) -> Self {
        let expected_size: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            expected_size,
            "Data length ({}) doesn't match shape {:?} (expected {})",
            data.len(),
            shape,
            expected_size
        );

        let strides = Self::compute_strides(&shape);
        Self {
            data,
            shape,
            strides,
        }
    }

    /// Create a tensor filled with zeros
    pub fn zeros(shape: Vec<usize>) -> Self {
        Self::full(shape, T::zero())
    }

    /// Create a tensor filled with a constant
    pub fn full(shape: Vec<usize>, value: T) -> Self {
        let size: usize = shape.iter().product();
        Self::new(vec![value; size], shape)
    }

    /// Create a tensor whose element at flat index `i` is `f(i)`
    ///
    /// ```rust
    /// # use convpool::Tensor;
    /// let t = Tensor::from_fn(vec![2, 2], |i| i as f64);
    /// assert_eq!(t.data, vec![0.0, 1.0, 2.0, 3.0]);
    /// ```
    pub fn from_fn(shape: Vec<usize>, f: impl FnMut(usize) -> T) -> Self {
        let size: usize = shape.iter().product();
        Self::new((0..size).map(f).collect(), shape)
    }

    /// Compute strides from shape (row-major layout)
    ///
    /// For shape `[d0, d1, d2]`, strides are `[d1*d2, d2, 1]`
    fn compute_strides(shape: &[usize]) -> Vec<usize> {
        let mut strides = vec![1; shape.len()];
        for i in (0..shape.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * shape[i + 1];
        }
        strides
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the tensor holds no elements
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Shape of a rank-4 tensor as `[batch, channels, height, width]`
    ///
    /// # Panics
    ///
    /// Panics if the tensor is not rank 4
    pub fn dims4(&self) -> [usize; 4] {
        assert_eq!(
            self.shape.len(),
            4,
            "Expected a 4D tensor, got shape {:?}",
            self.shape
        );
        [self.shape[0], self.shape[1], self.shape[2], self.shape[3]]
    }

    /// Element at a 4D index
    pub fn at4(&self, n: usize, c: usize, h: usize, w: usize) -> T {
        self.data[n * self.strides[0] + c * self.strides[1] + h * self.strides[2] + w]
    }

    /// Apply `f` to every element
    pub fn map(&self, f: impl Fn(T) -> T + Sync + Send) -> Tensor<T> {
        let result = self.data.par_iter().map(|&x| f(x)).collect();
        Tensor::new(result, self.shape.clone())
    }

    /// Add a per-channel vector to a `[batch, channels, height, width]` tensor
    ///
    /// The bias of length `channels` is broadcast over batch and both
    /// spatial dimensions.
    pub fn add_channel_bias(&self, bias: &Tensor<T>) -> Tensor<T> {
        let [_, channels, height, width] = self.dims4();
        assert_eq!(
            bias.data.len(),
            channels,
            "Bias length ({}) must equal channel count ({})",
            bias.data.len(),
            channels
        );
        let plane = height * width;
        let mut result = self.data.clone();
        if plane > 0 {
            result
                .par_chunks_mut(plane)
                .enumerate()
                .for_each(|(nc, chunk)| {
                    let b = bias.data[nc % channels];
                    for v in chunk.iter_mut() {
                        *v = *v + b;
                    }
                });
        }
        Tensor::new(result, self.shape.clone())
    }

    /// Sum a `[batch, channels, height, width]` tensor down to `[channels]`
    ///
    /// This is the adjoint of [`Tensor::add_channel_bias`].
    pub fn sum_per_channel(&self) -> Tensor<T> {
        let [batch, channels, height, width] = self.dims4();
        let plane = height * width;
        let result: Vec<T> = (0..channels)
            .into_par_iter()
            .map(|c| {
                let mut sum = T::zero();
                for n in 0..batch {
                    let start = (n * channels + c) * plane;
                    for &v in &self.data[start..start + plane] {
                        sum = sum + v;
                    }
                }
                sum
            })
            .collect();
        Tensor::new(result, vec![channels])
    }

    /// Remove rows and columns from the spatial borders of a 4D tensor
    ///
    /// `top`/`bottom` rows and `left`/`right` columns are dropped from every
    /// `[height, width]` plane.
    pub fn crop2d(&self, top: usize, bottom: usize, left: usize, right: usize) -> Tensor<T> {
        let [batch, channels, height, width] = self.dims4();
        assert!(
            top + bottom <= height && left + right <= width,
            "Crop ({}, {}, {}, {}) exceeds spatial size {}x{}",
            top,
            bottom,
            left,
            right,
            height,
            width
        );
        let out_h = height - top - bottom;
        let out_w = width - left - right;
        let mut result = vec![T::zero(); batch * channels * out_h * out_w];
        if out_h * out_w > 0 {
            result
                .par_chunks_mut(out_h * out_w)
                .enumerate()
                .for_each(|(nc, chunk)| {
                    let src = &self.data[nc * height * width..(nc + 1) * height * width];
                    for i in 0..out_h {
                        let row = (i + top) * width + left;
                        chunk[i * out_w..(i + 1) * out_w].copy_from_slice(&src[row..row + out_w]);
                    }
                });
        }
        Tensor::new(result, vec![batch, channels, out_h, out_w])
    }

    /// Zero-pad the spatial borders of a 4D tensor
    ///
    /// This is the adjoint of [`Tensor::crop2d`] with the same arguments.
    pub fn pad2d(&self, top: usize, bottom: usize, left: usize, right: usize) -> Tensor<T> {
        let [batch, channels, height, width] = self.dims4();
        let out_h = height + top + bottom;
        let out_w = width + left + right;
        let mut result = vec![T::zero(); batch * channels * out_h * out_w];
        if height * width > 0 {
            result
                .par_chunks_mut(out_h * out_w)
                .enumerate()
                .for_each(|(nc, chunk)| {
                    let src = &self.data[nc * height * width..(nc + 1) * height * width];
                    for i in 0..height {
                        let row = (i + top) * out_w + left;
                        chunk[row..row + width].copy_from_slice(&src[i * width..(i + 1) * width]);
                    }
                });
        }
        Tensor::new(result, vec![batch, channels, out_h, out_w])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strides_row_major() {
        let t = Tensor::<f32>::zeros(vec![2, 3, 4, 5]);
        assert_eq!(t.strides, vec![60, 20, 5, 1]);
        assert_eq!(t.len(), 120);
    }

    #[test]
    #[should_panic(expected = "doesn't match shape")]
    fn test_new_rejects_wrong_length() {
        Tensor::new(vec![1.0f32, 2.0, 3.0], vec![2, 2]);
    }

    #[test]
    fn test_at4_indexing() {
        let t = Tensor::from_fn(vec![2, 2, 2, 3], |i| i as f32);
        assert_eq!(t.at4(0, 0, 0, 0), 0.0);
        assert_eq!(t.at4(0, 1, 0, 2), 8.0);
        assert_eq!(t.at4(1, 1, 1, 2), 23.0);
    }

    #[test]
    fn test_add_channel_bias_broadcasts() {
        let t = Tensor::<f64>::zeros(vec![2, 3, 2, 2]);
        let b = Tensor::new(vec![1.0, 2.0, 3.0], vec![3]);
        let y = t.add_channel_bias(&b);
        for n in 0..2 {
            for c in 0..3 {
                for h in 0..2 {
                    for w in 0..2 {
                        assert_eq!(y.at4(n, c, h, w), (c + 1) as f64);
                    }
                }
            }
        }
    }

    #[test]
    fn test_sum_per_channel() {
        let t = Tensor::full(vec![2, 3, 2, 2], 1.5f64);
        let s = t.sum_per_channel();
        assert_eq!(s.shape, vec![3]);
        assert_eq!(s.data, vec![12.0, 12.0, 12.0]);
    }

    #[test]
    fn test_crop_then_pad_restores_interior() {
        let t = Tensor::from_fn(vec![1, 1, 4, 5], |i| i as f32);
        let cropped = t.crop2d(1, 1, 2, 1);
        assert_eq!(cropped.shape, vec![1, 1, 2, 2]);
        assert_eq!(cropped.data, vec![7.0, 8.0, 12.0, 13.0]);

        let padded = cropped.pad2d(1, 1, 2, 1);
        assert_eq!(padded.shape, t.shape);
        assert_eq!(padded.at4(0, 0, 1, 2), 7.0);
        assert_eq!(padded.at4(0, 0, 0, 0), 0.0);
        assert_eq!(padded.at4(0, 0, 3, 4), 0.0);
    }

    #[test]
    fn test_map() {
        let a = Tensor::new(vec![1.0f32, -2.0, 3.0, -4.0], vec![2, 2]);
        let y = a.map(|v| v.abs());
        assert_eq!(y.data, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(y.shape, a.shape);
    }
}
