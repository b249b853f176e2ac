use super::conv::output_dim;
use crate::error::ensure_shape;
use crate::Result;
use ndarray::{s, Array4, ArrayView4};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub pool_height: usize,
    pub pool_width: usize,
    pub stride: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_height: 3,
            pool_width: 3,
            stride: 2,
        }
    }
}

impl PoolConfig {
    /// Square, non-overlapping windows of side `size`.
    pub fn square(size: usize) -> Self {
        Self {
            pool_height: size,
            pool_width: size,
            stride: size,
        }
    }

    fn output_size(&self, height: usize, width: usize) -> Result<(usize, usize)> {
        let out_h = output_dim(height, 0, self.pool_height, self.stride)?;
        let out_w = output_dim(width, 0, self.pool_width, self.stride)?;
        Ok((out_h, out_w))
    }
}

#[derive(Debug)]
pub struct MaxPoolCache {
    x: Array4<f64>,
    config: PoolConfig,
}

pub fn forward(x: ArrayView4<'_, f64>, config: &PoolConfig) -> Result<(Array4<f64>, MaxPoolCache)> {
    let (n, c, h, w) = x.dim();
    let (out_h, out_w) = config.output_size(h, w)?;
    log::debug!(
        "max pool forward: {:?} with {}x{} windows (stride {}) -> ({}, {}, {}, {})",
        x.shape(),
        config.pool_height,
        config.pool_width,
        config.stride,
        n,
        c,
        out_h,
        out_w
    );

    let mut out = Array4::zeros((n, c, out_h, out_w));

    for b in 0..n {
        for ch in 0..c {
            for oh in 0..out_h {
                for ow in 0..out_w {
                    let h_start = oh * config.stride;
                    let w_start = ow * config.stride;
                    let window = x.slice(s![
                        b,
                        ch,
                        h_start..h_start + config.pool_height,
                        w_start..w_start + config.pool_width
                    ]);

                    out[[b, ch, oh, ow]] = window.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
                }
            }
        }
    }

    let cache = MaxPoolCache {
        x: x.to_owned(),
        config: *config,
    };

    Ok((out, cache))
}

/// Routes each window's upstream gradient to the position(s) holding the
/// window maximum. Tied maxima each receive the full gradient.
pub fn backward(dout: ArrayView4<'_, f64>, cache: MaxPoolCache) -> Result<Array4<f64>> {
    let (n, c, h, w) = cache.x.dim();
    let config = cache.config;
    let (out_h, out_w) = config.output_size(h, w)?;
    ensure_shape(&[n, c, out_h, out_w], dout.shape())?;

    let mut dx = Array4::zeros((n, c, h, w));

    for b in 0..n {
        for ch in 0..c {
            for oh in 0..out_h {
                for ow in 0..out_w {
                    let h_start = oh * config.stride;
                    let w_start = ow * config.stride;
                    let rows = h_start..h_start + config.pool_height;
                    let cols = w_start..w_start + config.pool_width;

                    let window = cache.x.slice(s![b, ch, rows.clone(), cols.clone()]);
                    let max = window.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
                    let g = dout[[b, ch, oh, ow]];

                    dx.slice_mut(s![b, ch, rows, cols])
                        .zip_mut_with(&window, |d, &v| {
                            if v == max {
                                *d += g;
                            }
                        });
                }
            }
        }
    }

    Ok(dx)
}
