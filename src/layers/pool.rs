//! Max Pooling
//!
//! Non-overlapping 2D max pooling with "ignore border" semantics: windows
//! of `ph × pw` are taken with stride equal to the window, and trailing rows
//! or columns that don't fill a whole window are discarded.
//!
//! ```text
//! out_h = ⌊h / ph⌋,  out_w = ⌊w / pw⌋
//! ```
//!
//! The forward pass records, for each output element, the flat input index
//! of the maximum it selected (the first one in row-major order on ties).
//! The backward pass routes each output gradient to that index only.

use crate::scalar::Scalar;
use crate::tensor::Tensor;
use rayon::prelude::*;

/// Spatial size after pooling an `h × w` map
pub fn pooled_size(h: usize, w: usize, pool: (usize, usize)) -> (usize, usize) {
    (h / pool.0, w / pool.1)
}

/// Max pooling forward pass
///
/// # Arguments
///
/// * `input` - `[batch, channels, h, w]`
/// * `pool` - Window `(ph, pw)`, both non-zero
///
/// # Returns
///
/// Tuple of (pooled tensor, argmax) where argmax holds the flat index into
/// `input.data` chosen for every pooled element
pub fn max_pool2d<T: Scalar>(input: &Tensor<T>, pool: (usize, usize)) -> (Tensor<T>, Vec<usize>) {
    let [batch, channels, h, w] = input.dims4();
    let (ph, pw) = pool;
    assert!(ph > 0 && pw > 0, "Pool size must be non-zero, got {:?}", pool);
    let (out_h, out_w) = pooled_size(h, w, pool);
    let plane = out_h * out_w;
    let mut output = vec![T::zero(); batch * channels * plane];
    let mut argmax = vec![0usize; batch * channels * plane];
    if plane == 0 {
        return (Tensor::new(output, vec![batch, channels, out_h, out_w]), argmax);
    }

    output
        .par_chunks_mut(plane)
        .zip(argmax.par_chunks_mut(plane))
        .enumerate()
        .for_each(|(nc, (out, arg))| {
            let base = nc * h * w;
            for i in 0..out_h {
                for j in 0..out_w {
                    let mut best_idx = base + (i * ph) * w + j * pw;
                    let mut best = input.data[best_idx];
                    for a in 0..ph {
                        for b in 0..pw {
                            let idx = base + (i * ph + a) * w + j * pw + b;
                            if input.data[idx] > best {
                                best = input.data[idx];
                                best_idx = idx;
                            }
                        }
                    }
                    out[i * out_w + j] = best;
                    arg[i * out_w + j] = best_idx;
                }
            }
        });

    (Tensor::new(output, vec![batch, channels, out_h, out_w]), argmax)
}

/// Max pooling backward pass
///
/// # Arguments
///
/// * `grad_out` - Gradient with respect to the pooled output
/// * `argmax` - Indices recorded by [`max_pool2d`]
/// * `input_shape` - Shape of the tensor that was pooled
///
/// # Returns
///
/// Gradient with respect to the pooling input; zero everywhere except the
/// selected maxima
pub fn max_pool2d_backward<T: Scalar>(
    grad_out: &Tensor<T>,
    argmax: &[usize],
    input_shape: &[usize],
) -> Tensor<T> {
    assert_eq!(
        grad_out.len(),
        argmax.len(),
        "Gradient length doesn't match recorded argmax"
    );
    let mut grad_input = Tensor::zeros(input_shape.to_vec());
    // Windows don't overlap, so every index receives at most one gradient
    for (&g, &idx) in grad_out.data.iter().zip(argmax) {
        grad_input.data[idx] = grad_input.data[idx] + g;
    }
    grad_input
}
