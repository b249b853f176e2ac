use crate::error::ensure_shape;
use crate::{Error, Result};
use ndarray::{Array, ArrayBase, ArrayView, Data, Dimension, Zip};

pub const DEFAULT_STEP: f64 = 1e-5;

fn rebuild<D: Dimension>(dim: &D, data: Vec<f64>) -> Result<Array<f64, D>> {
    Array::from_shape_vec(dim.clone(), data)
        .map_err(|e| Error::Layer(format!("Reshape failed: {}", e)))
}

/// Gradient of `sum(f(x) * dout)` w.r.t. `x` by centered differences.
pub fn numerical_gradient<D, E, F>(
    mut f: F,
    x: &Array<f64, D>,
    dout: ArrayView<'_, f64, E>,
    h: f64,
) -> Result<Array<f64, D>>
where
    D: Dimension,
    E: Dimension,
    F: FnMut(&Array<f64, D>) -> Result<Array<f64, E>>,
{
    numerical_gradient_scalar(
        |probe| {
            let out = f(probe)?;
            ensure_shape(dout.shape(), out.shape())?;
            Ok(Zip::from(&out)
                .and(&dout)
                .fold(0.0, |acc, &o, &d| acc + o * d))
        },
        x,
        h,
    )
}

/// Gradient of a scalar-valued `f` (e.g. a loss) w.r.t. `x` by centered differences.
pub fn numerical_gradient_scalar<D, F>(mut f: F, x: &Array<f64, D>, h: f64) -> Result<Array<f64, D>>
where
    D: Dimension,
    F: FnMut(&Array<f64, D>) -> Result<f64>,
{
    let dim = x.raw_dim();
    let base: Vec<f64> = x.iter().copied().collect();
    let mut probe = base.clone();
    let mut grad = Vec::with_capacity(base.len());

    for i in 0..base.len() {
        probe[i] = base[i] + h;
        let plus = f(&rebuild(&dim, probe.clone())?)?;
        probe[i] = base[i] - h;
        let minus = f(&rebuild(&dim, probe.clone())?)?;
        probe[i] = base[i];

        grad.push((plus - minus) / (2.0 * h));
    }

    rebuild(&dim, grad)
}

/// Largest elementwise relative error `|a - b| / max(1e-8, |a| + |b|)`.
pub fn rel_error<S1, S2, D>(a: &ArrayBase<S1, D>, b: &ArrayBase<S2, D>) -> f64
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
    D: Dimension,
{
    Zip::from(a).and(b).fold(0.0, |worst: f64, &x, &y| {
        let err = (x - y).abs() / (x.abs() + y.abs()).max(1e-8);
        worst.max(err)
    })
}
