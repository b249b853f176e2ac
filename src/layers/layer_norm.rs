use super::normalization::{
    affine_param_grads, check_eps, normalize, normalize_backward, NormGradients,
};
use crate::error::ensure_shape;
use crate::Result;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerNormConfig {
    /// Added to the variance before taking the square root. Default `1e-5`.
    pub eps: f64,
}

impl Default for LayerNormConfig {
    fn default() -> Self {
        Self { eps: 1e-5 }
    }
}

#[derive(Debug)]
pub struct LayerNormCache {
    x: Array2<f64>,
    gamma: Array1<f64>,
    x_norm: Array2<f64>,
    std: Array1<f64>,
}

pub fn forward(
    x: ArrayView2<'_, f64>,
    gamma: ArrayView1<'_, f64>,
    beta: ArrayView1<'_, f64>,
    config: &LayerNormConfig,
) -> Result<(Array2<f64>, LayerNormCache)> {
    check_eps(config.eps)?;

    let features = x.ncols();
    ensure_shape(&[features], gamma.shape())?;
    ensure_shape(&[features], beta.shape())?;

    let stats = normalize(&x, Axis(1), config.eps)?;
    let out = &stats.x_norm * &gamma + &beta;

    let cache = LayerNormCache {
        x: x.to_owned(),
        gamma: gamma.to_owned(),
        x_norm: stats.x_norm,
        std: stats.std,
    };

    Ok((out, cache))
}

pub fn backward(dout: ArrayView2<'_, f64>, cache: LayerNormCache) -> Result<NormGradients> {
    ensure_shape(cache.x.shape(), dout.shape())?;

    let (dgamma, dbeta) = affine_param_grads(&dout, &cache.x_norm.view());
    let dx_norm = &dout * &cache.gamma;
    let dx = normalize_backward(
        &dx_norm.view(),
        &cache.x_norm.view(),
        &cache.std.view(),
        Axis(1),
    );

    Ok(NormGradients { dx, dgamma, dbeta })
}
