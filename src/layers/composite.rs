use super::affine::{self, AffineCache, AffineGradients};
use super::batch_norm::{self, BatchNormCache, BatchNormConfig, RunningStats};
use super::conv::{self, ConvCache, ConvConfig, ConvGradients};
use super::pooling::{self, MaxPoolCache, PoolConfig};
use crate::activations::{relu_backward, relu_forward, ReluCache};
use crate::{Error, Result};
use ndarray::{Array1, Array2, Array4, ArrayD, ArrayView1, ArrayView2, ArrayView4, ArrayViewD, Ix2, Ix4};

fn stage<T>(name: &str, result: Result<T>) -> Result<T> {
    result.map_err(|e| Error::Layer(format!("{}: {}", name, e)))
}

#[derive(Debug)]
pub struct AffineReluCache {
    affine: AffineCache,
    relu: ReluCache<Ix2>,
}

/// `relu(affine(x))`
pub fn affine_relu_forward(
    x: ArrayViewD<'_, f64>,
    w: ArrayView2<'_, f64>,
    b: ArrayView1<'_, f64>,
) -> Result<(Array2<f64>, AffineReluCache)> {
    let (a, affine) = stage("affine", affine::forward(x, w, b))?;
    let (out, relu) = relu_forward(a.view());
    Ok((out, AffineReluCache { affine, relu }))
}

pub fn affine_relu_backward(
    dout: ArrayView2<'_, f64>,
    cache: AffineReluCache,
) -> Result<AffineGradients> {
    let da = stage("relu", relu_backward(dout, cache.relu))?;
    stage("affine", affine::backward(da.view(), cache.affine))
}

#[derive(Debug)]
pub struct AffineBatchNormReluCache {
    affine: AffineCache,
    batch_norm: BatchNormCache,
    relu: ReluCache<Ix2>,
}

#[derive(Debug, Clone)]
pub struct AffineBatchNormReluGradients {
    pub dx: ArrayD<f64>,
    pub dw: Array2<f64>,
    pub db: Array1<f64>,
    pub dgamma: Array1<f64>,
    pub dbeta: Array1<f64>,
}

/// `relu(batch_norm(affine(x)))`
#[allow(clippy::too_many_arguments)]
pub fn affine_batch_norm_relu_forward(
    x: ArrayViewD<'_, f64>,
    w: ArrayView2<'_, f64>,
    b: ArrayView1<'_, f64>,
    gamma: ArrayView1<'_, f64>,
    beta: ArrayView1<'_, f64>,
    config: &BatchNormConfig,
    running: &mut RunningStats,
) -> Result<(Array2<f64>, AffineBatchNormReluCache)> {
    let (a, affine) = stage("affine", affine::forward(x, w, b))?;
    let (normed, batch_norm) = stage(
        "batch_norm",
        batch_norm::forward(a.view(), gamma, beta, config, running),
    )?;
    let (out, relu) = relu_forward(normed.view());

    Ok((
        out,
        AffineBatchNormReluCache {
            affine,
            batch_norm,
            relu,
        },
    ))
}

pub fn affine_batch_norm_relu_backward(
    dout: ArrayView2<'_, f64>,
    cache: AffineBatchNormReluCache,
) -> Result<AffineBatchNormReluGradients> {
    let dnormed = stage("relu", relu_backward(dout, cache.relu))?;
    let norm_grads = stage(
        "batch_norm",
        batch_norm::backward(dnormed.view(), cache.batch_norm),
    )?;
    let affine_grads = stage("affine", affine::backward(norm_grads.dx.view(), cache.affine))?;

    Ok(AffineBatchNormReluGradients {
        dx: affine_grads.dx,
        dw: affine_grads.dw,
        db: affine_grads.db,
        dgamma: norm_grads.dgamma,
        dbeta: norm_grads.dbeta,
    })
}

#[derive(Debug)]
pub struct ConvReluCache {
    conv: ConvCache,
    relu: ReluCache<Ix4>,
}

/// `relu(conv(x))`
pub fn conv_relu_forward(
    x: ArrayView4<'_, f64>,
    w: ArrayView4<'_, f64>,
    b: ArrayView1<'_, f64>,
    config: &ConvConfig,
) -> Result<(Array4<f64>, ConvReluCache)> {
    let (a, conv) = stage("conv", conv::forward(x, w, b, config))?;
    let (out, relu) = relu_forward(a.view());
    Ok((out, ConvReluCache { conv, relu }))
}

pub fn conv_relu_backward(dout: ArrayView4<'_, f64>, cache: ConvReluCache) -> Result<ConvGradients> {
    let da = stage("relu", relu_backward(dout, cache.relu))?;
    stage("conv", conv::backward(da.view(), cache.conv))
}

#[derive(Debug)]
pub struct ConvReluPoolCache {
    conv: ConvCache,
    relu: ReluCache<Ix4>,
    pool: MaxPoolCache,
}

/// `max_pool(relu(conv(x)))`
pub fn conv_relu_pool_forward(
    x: ArrayView4<'_, f64>,
    w: ArrayView4<'_, f64>,
    b: ArrayView1<'_, f64>,
    conv_config: &ConvConfig,
    pool_config: &PoolConfig,
) -> Result<(Array4<f64>, ConvReluPoolCache)> {
    let (a, conv) = stage("conv", conv::forward(x, w, b, conv_config))?;
    let (s, relu) = relu_forward(a.view());
    let (out, pool) = stage("max_pool", pooling::forward(s.view(), pool_config))?;
    Ok((out, ConvReluPoolCache { conv, relu, pool }))
}

pub fn conv_relu_pool_backward(
    dout: ArrayView4<'_, f64>,
    cache: ConvReluPoolCache,
) -> Result<ConvGradients> {
    let ds = stage("max_pool", pooling::backward(dout, cache.pool))?;
    let da = stage("relu", relu_backward(ds.view(), cache.relu))?;
    stage("conv", conv::backward(da.view(), cache.conv))
}
