#![allow(dead_code)]

use ndarray::{Array, Dimension, ShapeBuilder};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Uniform values in `[-scale, scale)`.
pub fn uniform<Sh, D>(rng: &mut StdRng, shape: Sh, scale: f64) -> Array<f64, D>
where
    Sh: ShapeBuilder<Dim = D>,
    D: Dimension,
{
    Array::from_shape_fn(shape, |_| rng.gen_range(-1.0..1.0) * scale)
}

/// Evenly spaced values in `[lo, hi]`, shuffled: no two entries are within
/// `(hi - lo) / (len - 1)` of each other, so maxima are never ambiguous.
pub fn distinct<Sh, D>(rng: &mut StdRng, shape: Sh, lo: f64, hi: f64) -> Array<f64, D>
where
    Sh: ShapeBuilder<Dim = D>,
    D: Dimension,
{
    let zeros: Array<f64, D> = Array::zeros(shape);
    let len = zeros.len();
    let step = if len > 1 { (hi - lo) / (len - 1) as f64 } else { 0.0 };

    let mut values: Vec<f64> = (0..len).map(|i| lo + step * i as f64).collect();
    values.shuffle(rng);

    Array::from_shape_vec(zeros.raw_dim(), values).expect("length matches shape")
}
