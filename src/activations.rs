use crate::error::ensure_shape;
use crate::Result;
use ndarray::{Array, ArrayView, Dimension, Zip};

#[derive(Debug)]
pub struct ReluCache<D: Dimension> {
    x: Array<f64, D>,
}

pub fn relu_forward<D: Dimension>(x: ArrayView<'_, f64, D>) -> (Array<f64, D>, ReluCache<D>) {
    let out = x.mapv(|v| v.max(0.0));
    (out, ReluCache { x: x.to_owned() })
}

pub fn relu_backward<D: Dimension>(
    dout: ArrayView<'_, f64, D>,
    cache: ReluCache<D>,
) -> Result<Array<f64, D>> {
    ensure_shape(cache.x.shape(), dout.shape())?;

    let mut dx = dout.to_owned();
    Zip::from(&mut dx).and(&cache.x).for_each(|d, &x| {
        if x <= 0.0 {
            *d = 0.0;
        }
    });
    Ok(dx)
}
