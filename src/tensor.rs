use crate::{Error, Result};
use ndarray::{Array2, Array4, ArrayView2, ArrayView4, ArrayViewD, Axis, IxDyn};

/// Flattens every non-batch axis of `x` into one feature axis: `(N, d1, .., dk) -> (N, D)`.
pub(crate) fn flatten_batch(x: &ArrayViewD<'_, f64>) -> Result<Array2<f64>> {
    if x.ndim() == 0 {
        return Err(Error::InvalidConfig(
            "expected an input with a leading batch axis, got a scalar".to_string(),
        ));
    }
    let batch = x.len_of(Axis(0));
    let features: usize = x.shape()[1..].iter().product();

    x.as_standard_layout()
        .into_owned()
        .into_shape_with_order((batch, features))
        .map_err(|e| Error::Layer(format!("Reshape failed: {}", e)))
}

pub(crate) fn unflatten(x: Array2<f64>, shape: &[usize]) -> Result<ndarray::ArrayD<f64>> {
    let total: usize = shape.iter().product();
    if total != x.len() {
        return Err(Error::ShapeMismatch {
            expected: vec![total],
            actual: vec![x.len()],
        });
    }

    x.as_standard_layout()
        .into_owned()
        .into_shape_with_order(IxDyn(shape))
        .map_err(|e| Error::Layer(format!("Reshape failed: {}", e)))
}

/// `(N, C, H, W) -> (N*H*W, C)`: one row per spatial position, one column per channel.
pub(crate) fn channels_last(x: &ArrayView4<'_, f64>) -> Result<Array2<f64>> {
    let (n, c, h, w) = x.dim();
    x.view()
        .permuted_axes([0, 2, 3, 1])
        .as_standard_layout()
        .into_owned()
        .into_shape_with_order((n * h * w, c))
        .map_err(|e| Error::Layer(format!("Reshape failed: {}", e)))
}

/// Inverse of [`channels_last`].
pub(crate) fn channels_first(
    x: &ArrayView2<'_, f64>,
    dim: (usize, usize, usize, usize),
) -> Result<Array4<f64>> {
    let (n, c, h, w) = dim;
    let nhwc = x
        .as_standard_layout()
        .into_owned()
        .into_shape_with_order((n, h, w, c))
        .map_err(|e| Error::Layer(format!("Reshape failed: {}", e)))?;

    Ok(nhwc.permuted_axes([0, 3, 1, 2]).as_standard_layout().into_owned())
}
