use super::batch_norm::{self, BatchNormCache, BatchNormConfig, RunningStats};
use super::normalization::SpatialNormGradients;
use crate::error::ensure_shape;
use crate::tensor::{channels_first, channels_last};
use crate::Result;
use ndarray::{Array4, ArrayView1, ArrayView4};

#[derive(Debug)]
pub struct SpatialBatchNormCache {
    dim: (usize, usize, usize, usize),
    inner: BatchNormCache,
}

pub fn forward(
    x: ArrayView4<'_, f64>,
    gamma: ArrayView1<'_, f64>,
    beta: ArrayView1<'_, f64>,
    config: &BatchNormConfig,
    running: &mut RunningStats,
) -> Result<(Array4<f64>, SpatialBatchNormCache)> {
    let dim = x.dim();
    let rows = channels_last(&x)?;

    let (out_rows, inner) = batch_norm::forward(rows.view(), gamma, beta, config, running)?;
    let out = channels_first(&out_rows.view(), dim)?;

    Ok((out, SpatialBatchNormCache { dim, inner }))
}

pub fn backward(
    dout: ArrayView4<'_, f64>,
    cache: SpatialBatchNormCache,
) -> Result<SpatialNormGradients> {
    let (n, c, h, w) = cache.dim;
    ensure_shape(&[n, c, h, w], dout.shape())?;
    ensure_shape(cache.inner.shape(), &[n * h * w, c])?;

    let drows = channels_last(&dout)?;
    let grads = batch_norm::backward(drows.view(), cache.inner)?;
    let dx = channels_first(&grads.dx.view(), cache.dim)?;

    Ok(SpatialNormGradients {
        dx,
        dgamma: grads.dgamma,
        dbeta: grads.dbeta,
    })
}
