//! Group normalization: layer norm over each group of `C / G` contiguous
//! channels, with `gamma`/`beta` broadcast over H and W.

use super::layer_norm::{self, LayerNormCache, LayerNormConfig};
use super::normalization::SpatialNormGradients;
use crate::error::ensure_shape;
use crate::{Error, Result};
use ndarray::{s, Array1, Array4, ArrayView1, ArrayView4, Axis};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupNormConfig {
    /// Added to the variance before taking the square root. Default `1e-5`.
    pub eps: f64,
}

impl Default for GroupNormConfig {
    fn default() -> Self {
        Self { eps: 1e-5 }
    }
}

/// Per-group layer-norm caches (indexed by group) plus the shared inputs.
#[derive(Debug)]
pub struct GroupNormCache {
    groups: usize,
    x: Array4<f64>,
    gamma: Array1<f64>,
    beta: Array1<f64>,
    per_group: Vec<LayerNormCache>,
}

impl GroupNormCache {
    pub fn groups(&self) -> usize {
        self.groups
    }
}

fn channels_per_group(channels: usize, groups: usize) -> Result<usize> {
    if groups == 0 || channels % groups != 0 {
        return Err(Error::InvalidConfig(format!(
            "group count {} must be positive and divide the channel count {}",
            groups, channels
        )));
    }
    Ok(channels / groups)
}

/// Repeats every element `times` times: `[a, b] -> [a, a, a, b, b, b]`.
fn repeat_each(values: ArrayView1<'_, f64>, times: usize) -> Array1<f64> {
    values
        .iter()
        .flat_map(|&v| std::iter::repeat(v).take(times))
        .collect()
}

pub fn forward(
    x: ArrayView4<'_, f64>,
    gamma: ArrayView1<'_, f64>,
    beta: ArrayView1<'_, f64>,
    groups: usize,
    config: &GroupNormConfig,
) -> Result<(Array4<f64>, GroupNormCache)> {
    let (n, c, h, w) = x.dim();
    ensure_shape(&[c], gamma.shape())?;
    ensure_shape(&[c], beta.shape())?;
    let cg = channels_per_group(c, groups)?;
    let spatial = h * w;

    let ln_config = LayerNormConfig { eps: config.eps };
    let mut out = Array4::zeros((n, c, h, w));
    let mut per_group = Vec::with_capacity(groups);

    for g in 0..groups {
        let channels = g * cg..(g + 1) * cg;
        let rows = x
            .slice(s![.., channels.clone(), .., ..])
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order((n, cg * spatial))
            .map_err(|e| Error::Layer(format!("Reshape failed: {}", e)))?;

        let gamma_g = repeat_each(gamma.slice(s![channels.clone()]), spatial);
        let beta_g = repeat_each(beta.slice(s![channels.clone()]), spatial);

        let (y, cache) = layer_norm::forward(rows.view(), gamma_g.view(), beta_g.view(), &ln_config)?;
        let y = y
            .into_shape_with_order((n, cg, h, w))
            .map_err(|e| Error::Layer(format!("Reshape failed: {}", e)))?;
        out.slice_mut(s![.., channels, .., ..]).assign(&y);
        per_group.push(cache);
    }

    let cache = GroupNormCache {
        groups,
        x: x.to_owned(),
        gamma: gamma.to_owned(),
        beta: beta.to_owned(),
        per_group,
    };

    Ok((out, cache))
}

pub fn backward(dout: ArrayView4<'_, f64>, cache: GroupNormCache) -> Result<SpatialNormGradients> {
    ensure_shape(cache.x.shape(), dout.shape())?;
    ensure_shape(&[cache.groups], &[cache.per_group.len()])?;

    let (n, c, h, w) = dout.dim();
    let cg = channels_per_group(c, cache.groups)?;
    let spatial = h * w;

    let mut dx = Array4::zeros((n, c, h, w));
    let mut dgamma = Array1::zeros(cache.gamma.len());
    let mut dbeta = Array1::zeros(cache.beta.len());

    for (g, group_cache) in cache.per_group.into_iter().enumerate() {
        let channels = g * cg..(g + 1) * cg;
        let drows = dout
            .slice(s![.., channels.clone(), .., ..])
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order((n, cg * spatial))
            .map_err(|e| Error::Layer(format!("Reshape failed: {}", e)))?;

        let grads = layer_norm::backward(drows.view(), group_cache)?;

        let dx_g = grads
            .dx
            .into_shape_with_order((n, cg, h, w))
            .map_err(|e| Error::Layer(format!("Reshape failed: {}", e)))?;
        dx.slice_mut(s![.., channels.clone(), .., ..]).assign(&dx_g);

        // fold the broadcast parameters back down to one value per channel
        let dgamma_g = grads
            .dgamma
            .into_shape_with_order((cg, spatial))
            .map_err(|e| Error::Layer(format!("Reshape failed: {}", e)))?
            .sum_axis(Axis(1));
        let dbeta_g = grads
            .dbeta
            .into_shape_with_order((cg, spatial))
            .map_err(|e| Error::Layer(format!("Reshape failed: {}", e)))?
            .sum_axis(Axis(1));
        dgamma.slice_mut(s![channels.clone()]).assign(&dgamma_g);
        dbeta.slice_mut(s![channels]).assign(&dbeta_g);
    }

    Ok(SpatialNormGradients { dx, dgamma, dbeta })
}
