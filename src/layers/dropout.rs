use super::mode::Mode;
use crate::error::ensure_shape;
use crate::{Error, Result};
use ndarray::{Array, ArrayView, Dimension};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DropoutConfig {
    /// Keep probability, in `(0, 1]`. Default `0.5`.
    pub p: f64,
    pub mode: Mode,
    pub seed: Option<u64>,
}

impl Default for DropoutConfig {
    fn default() -> Self {
        Self {
            p: 0.5,
            mode: Mode::Train,
            seed: None,
        }
    }
}

impl DropoutConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.p > 0.0 && self.p <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "dropout keep probability must lie in (0, 1], got {}",
                self.p
            )));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct DropoutCache<D: Dimension> {
    config: DropoutConfig,
    dim: D,
    /// `0` for dropped units, `1 / p` for kept ones. `None` in test mode.
    mask: Option<Array<f64, D>>,
}

impl<D: Dimension> DropoutCache<D> {
    pub fn mask(&self) -> Option<&Array<f64, D>> {
        self.mask.as_ref()
    }

    pub fn mode(&self) -> Mode {
        self.config.mode
    }
}

pub fn forward<D: Dimension>(
    x: ArrayView<'_, f64, D>,
    config: &DropoutConfig,
) -> Result<(Array<f64, D>, DropoutCache<D>)> {
    config.validate()?;

    let (out, mask) = match config.mode {
        Mode::Train => {
            let mut rng = match config.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let p = config.p;
            let mask = Array::from_shape_fn(x.raw_dim(), |_| {
                if rng.gen::<f64>() < p {
                    1.0 / p
                } else {
                    0.0
                }
            });
            log::trace!(
                "dropout: drew mask over {} units (p = {}, seeded = {})",
                mask.len(),
                p,
                config.seed.is_some()
            );
            (&x * &mask, Some(mask))
        }
        Mode::Test => (x.to_owned(), None),
    };

    let cache = DropoutCache {
        config: *config,
        dim: x.raw_dim(),
        mask,
    };

    Ok((out, cache))
}

pub fn backward<D: Dimension>(
    dout: ArrayView<'_, f64, D>,
    cache: DropoutCache<D>,
) -> Result<Array<f64, D>> {
    ensure_shape(cache.dim.slice(), dout.shape())?;

    match (cache.config.mode, cache.mask) {
        (Mode::Train, Some(mask)) => Ok(&dout * &mask),
        (Mode::Train, None) => Err(Error::Layer(
            "dropout cache from a training pass is missing its mask".to_string(),
        )),
        (Mode::Test, _) => Ok(dout.to_owned()),
    }
}
