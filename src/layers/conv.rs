use crate::error::ensure_shape;
use crate::{Error, Result};
use ndarray::{s, Array1, Array4, ArrayView1, ArrayView4, Axis};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvConfig {
    /// Pixels between adjacent receptive fields, in both directions. Default `1`.
    pub stride: usize,
    /// Zeros added on each side of H and W. Default `0`.
    pub pad: usize,
}

impl Default for ConvConfig {
    fn default() -> Self {
        Self { stride: 1, pad: 0 }
    }
}

/// `1 + (input + 2 * pad - window) / stride`, rejecting sizes that are not integral.
pub fn output_dim(input: usize, pad: usize, window: usize, stride: usize) -> Result<usize> {
    if stride == 0 {
        return Err(Error::InvalidConfig("stride must be positive".to_string()));
    }
    let padded = input + 2 * pad;
    if window == 0 || window > padded {
        return Err(Error::InvalidConfig(format!(
            "window of size {} does not fit an input of size {} padded by {}",
            window, input, pad
        )));
    }
    if (padded - window) % stride != 0 {
        return Err(Error::InvalidConfig(format!(
            "stride {} does not tile input {} (pad {}, window {}): output size is not an integer",
            stride, input, pad, window
        )));
    }
    Ok(1 + (padded - window) / stride)
}

#[derive(Debug)]
pub struct ConvCache {
    x_padded: Array4<f64>,
    w: Array4<f64>,
    input_dim: (usize, usize, usize, usize),
    config: ConvConfig,
}

#[derive(Debug, Clone)]
pub struct ConvGradients {
    pub dx: Array4<f64>,
    pub dw: Array4<f64>,
    pub db: Array1<f64>,
}

fn pad_input(x: &ArrayView4<'_, f64>, pad: usize) -> Array4<f64> {
    let (n, c, h, w) = x.dim();
    let mut padded = Array4::zeros((n, c, h + 2 * pad, w + 2 * pad));
    padded
        .slice_mut(s![.., .., pad..pad + h, pad..pad + w])
        .assign(x);
    padded
}

pub fn forward(
    x: ArrayView4<'_, f64>,
    w: ArrayView4<'_, f64>,
    b: ArrayView1<'_, f64>,
    config: &ConvConfig,
) -> Result<(Array4<f64>, ConvCache)> {
    let (n, c, h, width) = x.dim();
    let (f, wc, hh, ww) = w.dim();

    if wc != c {
        return Err(Error::ShapeMismatch {
            expected: vec![f, c, hh, ww],
            actual: w.shape().to_vec(),
        });
    }
    ensure_shape(&[f], b.shape())?;

    let stride = config.stride;
    let out_h = output_dim(h, config.pad, hh, stride)?;
    let out_w = output_dim(width, config.pad, ww, stride)?;
    log::debug!(
        "conv forward: x {:?} * w {:?} (stride {}, pad {}) -> ({}, {}, {}, {})",
        x.shape(),
        w.shape(),
        stride,
        config.pad,
        n,
        f,
        out_h,
        out_w
    );

    let x_padded = pad_input(&x, config.pad);
    let mut out = Array4::zeros((n, f, out_h, out_w));

    for sample in 0..n {
        for filter in 0..f {
            let kernel = w.index_axis(Axis(0), filter);
            for i in 0..out_h {
                for j in 0..out_w {
                    let (r, col) = (i * stride, j * stride);
                    let field = x_padded.slice(s![sample, .., r..r + hh, col..col + ww]);
                    let dot: f64 = field.iter().zip(kernel.iter()).map(|(a, k)| a * k).sum();
                    out[[sample, filter, i, j]] = dot + b[filter];
                }
            }
        }
    }

    let cache = ConvCache {
        x_padded,
        w: w.to_owned(),
        input_dim: (n, c, h, width),
        config: *config,
    };

    Ok((out, cache))
}

pub fn backward(dout: ArrayView4<'_, f64>, cache: ConvCache) -> Result<ConvGradients> {
    let (n, c, h, width) = cache.input_dim;
    let (f, _, hh, ww) = cache.w.dim();
    let ConvConfig { stride, pad } = cache.config;
    let out_h = output_dim(h, pad, hh, stride)?;
    let out_w = output_dim(width, pad, ww, stride)?;
    ensure_shape(&[n, f, out_h, out_w], dout.shape())?;

    let db = dout.sum_axis(Axis(3)).sum_axis(Axis(2)).sum_axis(Axis(0));
    let mut dw = Array4::zeros(cache.w.raw_dim());
    let mut dx_padded = Array4::zeros(cache.x_padded.raw_dim());

    for sample in 0..n {
        for filter in 0..f {
            let kernel = cache.w.index_axis(Axis(0), filter);
            for i in 0..out_h {
                for j in 0..out_w {
                    let g = dout[[sample, filter, i, j]];
                    let (r, col) = (i * stride, j * stride);

                    let field = cache
                        .x_padded
                        .slice(s![sample, .., r..r + hh, col..col + ww]);
                    dw.index_axis_mut(Axis(0), filter).scaled_add(g, &field);

                    dx_padded
                        .slice_mut(s![sample, .., r..r + hh, col..col + ww])
                        .scaled_add(g, &kernel);
                }
            }
        }
    }

    let dx = dx_padded
        .slice(s![.., .., pad..pad + h, pad..pad + width])
        .to_owned();
    debug_assert_eq!(dx.dim(), (n, c, h, width));

    Ok(ConvGradients { dx, dw, db })
}
