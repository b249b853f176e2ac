//! Fully connected (affine) layer: `out = flatten(x) @ W + b`.
//!
//! `x` may have any number of trailing axes; they are flattened into a single
//! feature axis of size `D = d1 * .. * dk`, so `W` is `(D, M)` and `b` is `(M,)`.

use crate::error::ensure_shape;
use crate::tensor::{flatten_batch, unflatten};
use crate::{Error, Result};
use ndarray::{Array1, Array2, ArrayD, ArrayView1, ArrayView2, ArrayViewD, Axis};

#[derive(Debug)]
pub struct AffineCache {
    x: ArrayD<f64>,
    x_flat: Array2<f64>,
    w: Array2<f64>,
}

#[derive(Debug, Clone)]
pub struct AffineGradients {
    /// Same shape as the original, unflattened input.
    pub dx: ArrayD<f64>,
    pub dw: Array2<f64>,
    pub db: Array1<f64>,
}

pub fn forward(
    x: ArrayViewD<'_, f64>,
    w: ArrayView2<'_, f64>,
    b: ArrayView1<'_, f64>,
) -> Result<(Array2<f64>, AffineCache)> {
    let x_flat = flatten_batch(&x)?;
    let (features, units) = w.dim();

    if x_flat.ncols() != features {
        return Err(Error::ShapeMismatch {
            expected: vec![x_flat.ncols(), units],
            actual: w.shape().to_vec(),
        });
    }
    ensure_shape(&[units], b.shape())?;

    let out = x_flat.dot(&w) + &b;

    let cache = AffineCache {
        x: x.to_owned(),
        x_flat,
        w: w.to_owned(),
    };

    Ok((out, cache))
}

pub fn backward(dout: ArrayView2<'_, f64>, cache: AffineCache) -> Result<AffineGradients> {
    ensure_shape(&[cache.x_flat.nrows(), cache.w.ncols()], dout.shape())?;

    let dx = unflatten(dout.dot(&cache.w.t()), cache.x.shape())?;
    let dw = cache.x_flat.t().dot(&dout);
    let db = dout.sum_axis(Axis(0));

    Ok(AffineGradients { dx, dw, db })
}
