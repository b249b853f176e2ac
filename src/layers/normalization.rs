//! Statistics shared by the normalization layers: batch norm reduces along
//! `Axis(0)`, layer norm along `Axis(1)`.

use crate::{Error, Result};
use ndarray::{Array1, Array2, Array4, ArrayView1, ArrayView2, Axis};

#[derive(Debug, Clone)]
pub struct NormGradients {
    pub dx: Array2<f64>,
    pub dgamma: Array1<f64>,
    pub dbeta: Array1<f64>,
}

/// Gradients of a spatial normalization layer; `dgamma`/`dbeta` are per channel.
#[derive(Debug, Clone)]
pub struct SpatialNormGradients {
    pub dx: Array4<f64>,
    pub dgamma: Array1<f64>,
    pub dbeta: Array1<f64>,
}

pub(crate) struct Normalized {
    pub x_norm: Array2<f64>,
    pub mean: Array1<f64>,
    pub var: Array1<f64>,
    pub std: Array1<f64>,
}

pub(crate) fn normalize(x: &ArrayView2<'_, f64>, axis: Axis, eps: f64) -> Result<Normalized> {
    let empty = || {
        Error::InvalidConfig(format!(
            "cannot compute statistics over empty axis {} of shape {:?}",
            axis.index(),
            x.shape()
        ))
    };

    let mean = x.mean_axis(axis).ok_or_else(empty)?;
    let centered = x - &mean.view().insert_axis(axis);
    let var = centered.mapv(|v| v * v).mean_axis(axis).ok_or_else(empty)?;
    let std = var.mapv(|v| (v + eps).sqrt());
    let x_norm = &centered / &std.view().insert_axis(axis);

    Ok(Normalized {
        x_norm,
        mean,
        var,
        std,
    })
}

/// Simplified closed form of the normalization backward pass along `axis`.
pub(crate) fn normalize_backward(
    dx_norm: &ArrayView2<'_, f64>,
    x_norm: &ArrayView2<'_, f64>,
    std: &ArrayView1<'_, f64>,
    axis: Axis,
) -> Array2<f64> {
    let m = x_norm.len_of(axis) as f64;

    let sum_dx_norm = dx_norm.sum_axis(axis).insert_axis(axis);
    let sum_dx_norm_x_norm = (dx_norm * x_norm).sum_axis(axis).insert_axis(axis);
    let scale = std.mapv(|s| 1.0 / (m * s)).insert_axis(axis);

    (dx_norm * m - &sum_dx_norm - x_norm * &sum_dx_norm_x_norm) * &scale
}

/// `dgamma` and `dbeta` for per-feature parameters of a `(rows, features)` layer.
pub(crate) fn affine_param_grads(
    dout: &ArrayView2<'_, f64>,
    x_norm: &ArrayView2<'_, f64>,
) -> (Array1<f64>, Array1<f64>) {
    let dgamma = (dout * x_norm).sum_axis(Axis(0));
    let dbeta = dout.sum_axis(Axis(0));
    (dgamma, dbeta)
}

pub(crate) fn check_eps(eps: f64) -> Result<()> {
    if !(eps > 0.0 && eps.is_finite()) {
        return Err(Error::InvalidConfig(format!(
            "eps must be a positive finite number, got {}",
            eps
        )));
    }
    Ok(())
}
