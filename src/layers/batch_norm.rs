use super::mode::Mode;
use super::normalization::{
    affine_param_grads, check_eps, normalize, normalize_backward, NormGradients,
    SpatialNormGradients,
};
use super::spatial_batch_norm::{self, SpatialBatchNormCache};
use crate::error::ensure_shape;
use crate::{Error, Result};
use ndarray::{Array1, Array2, Array4, ArrayView1, ArrayView2, ArrayView4, Axis};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchNormConfig {
    pub mode: Mode,
    /// Added to the variance before taking the square root. Default `1e-5`.
    pub eps: f64,
    /// Decay of the running statistics. `0` discards history at every step,
    /// `1` never incorporates new batches. Default `0.9`.
    pub momentum: f64,
}

impl Default for BatchNormConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Train,
            eps: 1e-5,
            momentum: 0.9,
        }
    }
}

impl BatchNormConfig {
    pub fn train() -> Self {
        Self::default()
    }

    pub fn test() -> Self {
        Self {
            mode: Mode::Test,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_eps(self.eps)?;
        if !(0.0..=1.0).contains(&self.momentum) {
            return Err(Error::InvalidConfig(format!(
                "momentum must lie in [0, 1], got {}",
                self.momentum
            )));
        }
        Ok(())
    }
}

/// Exponentially averaged per-feature statistics, owned by the layer instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningStats {
    pub mean: Array1<f64>,
    pub var: Array1<f64>,
}

impl RunningStats {
    /// Zero-initialized statistics for `features` features.
    pub fn new(features: usize) -> Self {
        Self {
            mean: Array1::zeros(features),
            var: Array1::zeros(features),
        }
    }

    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    pub fn reset(&mut self) {
        self.mean.fill(0.0);
        self.var.fill(0.0);
    }

    /// Fails unless every mean is finite and every variance finite and non-negative.
    pub fn validate(&self) -> Result<()> {
        if let Some(m) = self.mean.iter().find(|m| !m.is_finite()) {
            return Err(Error::InvalidConfig(format!(
                "running mean must be finite, got {}",
                m
            )));
        }
        if let Some(v) = self.var.iter().find(|v| !(v.is_finite() && **v >= 0.0)) {
            return Err(Error::InvalidConfig(format!(
                "running variance must be finite and non-negative, got {}",
                v
            )));
        }
        Ok(())
    }

    fn update(&mut self, batch_mean: &Array1<f64>, batch_var: &Array1<f64>, momentum: f64) {
        self.mean
            .zip_mut_with(batch_mean, |r, &m| *r = momentum * *r + (1.0 - momentum) * m);
        self.var
            .zip_mut_with(batch_var, |r, &v| *r = momentum * *r + (1.0 - momentum) * v);
        log::trace!(
            "batch norm: updated running statistics for {} features (momentum {})",
            self.len(),
            momentum
        );
    }
}

#[derive(Debug)]
pub struct BatchNormCache {
    x: Array2<f64>,
    gamma: Array1<f64>,
    eps: f64,
    x_norm: Array2<f64>,
    std: Array1<f64>,
    mode: Mode,
}

impl BatchNormCache {
    pub(crate) fn shape(&self) -> &[usize] {
        self.x.shape()
    }
}

pub fn forward(
    x: ArrayView2<'_, f64>,
    gamma: ArrayView1<'_, f64>,
    beta: ArrayView1<'_, f64>,
    config: &BatchNormConfig,
    running: &mut RunningStats,
) -> Result<(Array2<f64>, BatchNormCache)> {
    config.validate()?;

    let features = x.ncols();
    ensure_shape(&[features], gamma.shape())?;
    ensure_shape(&[features], beta.shape())?;
    ensure_shape(&[features], running.mean.shape())?;
    ensure_shape(&[features], running.var.shape())?;
    running.validate()?;

    let (x_norm, std) = match config.mode {
        Mode::Train => {
            let stats = normalize(&x, Axis(0), config.eps)?;
            running.update(&stats.mean, &stats.var, config.momentum);
            (stats.x_norm, stats.std)
        }
        Mode::Test => {
            let std = running.var.mapv(|v| (v + config.eps).sqrt());
            let x_norm = (&x - &running.mean) / &std;
            (x_norm, std)
        }
    };

    let out = &x_norm * &gamma + &beta;

    let cache = BatchNormCache {
        x: x.to_owned(),
        gamma: gamma.to_owned(),
        eps: config.eps,
        x_norm,
        std,
        mode: config.mode,
    };

    Ok((out, cache))
}

/// Backward pass in its simplified closed form.
pub fn backward(dout: ArrayView2<'_, f64>, cache: BatchNormCache) -> Result<NormGradients> {
    ensure_shape(cache.x.shape(), dout.shape())?;

    let (dgamma, dbeta) = affine_param_grads(&dout, &cache.x_norm.view());
    let dx_norm = &dout * &cache.gamma;

    let dx = match cache.mode {
        Mode::Train => normalize_backward(
            &dx_norm.view(),
            &cache.x_norm.view(),
            &cache.std.view(),
            Axis(0),
        ),
        Mode::Test => dx_norm / &cache.std,
    };

    Ok(NormGradients { dx, dgamma, dbeta })
}

/// Backward pass written as the step-by-step chain rule through `x_norm`,
/// the batch variance and the batch mean. Agrees with [`backward`].
pub fn backward_direct(dout: ArrayView2<'_, f64>, cache: BatchNormCache) -> Result<NormGradients> {
    ensure_shape(cache.x.shape(), dout.shape())?;

    let (dgamma, dbeta) = affine_param_grads(&dout, &cache.x_norm.view());
    let dx_norm = &dout * &cache.gamma;

    if cache.mode == Mode::Test {
        let dx = dx_norm / &cache.std;
        return Ok(NormGradients { dx, dgamma, dbeta });
    }

    let n = cache.x.nrows() as f64;
    let stats = normalize(&cache.x.view(), Axis(0), cache.eps)?;
    let centered = &cache.x - &stats.mean;
    let inv_std = stats.std.mapv(|s| 1.0 / s);

    // d(var): var enters through 1/sqrt(var + eps)
    let dvar = (&dx_norm * &centered).sum_axis(Axis(0))
        * stats.var.mapv(|v| -0.5 * (v + cache.eps).powf(-1.5));

    // d(mean): directly through (x - mean) and indirectly through var
    let dmean = (&dx_norm * &inv_std).sum_axis(Axis(0)) * -1.0
        + &dvar * &(centered.sum_axis(Axis(0)) * (-2.0 / n));

    let dx = &dx_norm * &inv_std + &centered * &(&dvar * (2.0 / n)) + &(dmean / n);

    Ok(NormGradients { dx, dgamma, dbeta })
}

/// A batch normalization layer instance: learnable scale/shift plus the
/// running statistics it owns.
#[derive(Debug, Clone)]
pub struct BatchNorm {
    pub gamma: Array1<f64>,
    pub beta: Array1<f64>,
    pub running: RunningStats,
    pub config: BatchNormConfig,
}

impl BatchNorm {
    /// `gamma = 1`, `beta = 0`, zeroed running statistics, default config.
    pub fn new(features: usize) -> Self {
        Self::with_config(features, BatchNormConfig::default())
    }

    pub fn with_config(features: usize, config: BatchNormConfig) -> Self {
        Self {
            gamma: Array1::ones(features),
            beta: Array1::zeros(features),
            running: RunningStats::new(features),
            config,
        }
    }

    pub fn features(&self) -> usize {
        self.gamma.len()
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.config.mode = mode;
    }

    pub fn reset_running_stats(&mut self) {
        self.running.reset();
    }

    pub fn forward(&mut self, x: ArrayView2<'_, f64>) -> Result<(Array2<f64>, BatchNormCache)> {
        forward(
            x,
            self.gamma.view(),
            self.beta.view(),
            &self.config,
            &mut self.running,
        )
    }

    /// Spatial batch normalization with one set of statistics per channel.
    pub fn forward_spatial(
        &mut self,
        x: ArrayView4<'_, f64>,
    ) -> Result<(Array4<f64>, SpatialBatchNormCache)> {
        spatial_batch_norm::forward(
            x,
            self.gamma.view(),
            self.beta.view(),
            &self.config,
            &mut self.running,
        )
    }

    pub fn backward(&self, dout: ArrayView2<'_, f64>, cache: BatchNormCache) -> Result<NormGradients> {
        backward(dout, cache)
    }

    pub fn backward_spatial(
        &self,
        dout: ArrayView4<'_, f64>,
        cache: SpatialBatchNormCache,
    ) -> Result<SpatialNormGradients> {
        spatial_batch_norm::backward(dout, cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_batch_norm_forward_train() {
        let x = array![[1.0, 2.0], [3.0, 6.0]];
        let gamma = array![1.0, 1.0];
        let beta = array![0.0, 0.0];
        let mut running = RunningStats::new(2);

        let (out, _) = forward(
            x.view(),
            gamma.view(),
            beta.view(),
            &BatchNormConfig::train(),
            &mut running,
        )
        .unwrap();

        let expected_0 = -1.0 / (1.0_f64 + 1e-5).sqrt();
        let expected_1 = -2.0 / (4.0_f64 + 1e-5).sqrt();
        assert_abs_diff_eq!(out[[0, 0]], expected_0, epsilon = 1e-12);
        assert_abs_diff_eq!(out[[0, 1]], expected_1, epsilon = 1e-12);
        assert_abs_diff_eq!(out[[1, 0]], -expected_0, epsilon = 1e-12);
    }

    #[test]
    fn test_batch_norm_updates_running_stats() {
        let x = array![[1.0, 2.0], [3.0, 6.0]];
        let gamma = array![1.0, 1.0];
        let beta = array![0.0, 0.0];
        let mut running = RunningStats::new(2);

        forward(
            x.view(),
            gamma.view(),
            beta.view(),
            &BatchNormConfig::train(),
            &mut running,
        )
        .unwrap();

        assert_abs_diff_eq!(running.mean, array![0.2, 0.4], epsilon = 1e-12);
        assert_abs_diff_eq!(running.var, array![0.1, 0.4], epsilon = 1e-12);
    }

    #[test]
    fn test_batch_norm_forward_test_mode() {
        let gamma = array![2.0, 2.0];
        let beta = array![1.0, 1.0];
        let mut running = RunningStats {
            mean: array![0.5, 0.5],
            var: array![0.25, 0.25],
        };
        let before = running.clone();

        let x = array![[1.0, 0.0]];
        let (out, _) = forward(
            x.view(),
            gamma.view(),
            beta.view(),
            &BatchNormConfig::test(),
            &mut running,
        )
        .unwrap();

        let scaled = 0.5 / (0.25_f64 + 1e-5).sqrt();
        assert_abs_diff_eq!(out[[0, 0]], 2.0 * scaled + 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out[[0, 1]], -2.0 * scaled + 1.0, epsilon = 1e-12);
        assert_eq!(running, before);
    }

    #[test]
    fn test_batch_norm_validation() {
        let x = array![[1.0, 2.0]];
        let gamma = array![1.0, 1.0];
        let beta = array![0.0];
        let mut running = RunningStats::new(2);

        let result = forward(
            x.view(),
            gamma.view(),
            beta.view(),
            &BatchNormConfig::default(),
            &mut running,
        );
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));

        let bad_momentum = BatchNormConfig {
            momentum: 1.5,
            ..BatchNormConfig::default()
        };
        assert!(bad_momentum.validate().is_err());
    }

    #[test]
    fn test_corrupt_running_stats_rejected() {
        let x = array![[1.0], [2.0]];
        let gamma = array![1.0];
        let beta = array![0.0];

        for (mean, var) in [(0.0, -1.0), (0.0, f64::NAN), (f64::INFINITY, 1.0)] {
            let mut running = RunningStats {
                mean: array![mean],
                var: array![var],
            };
            for config in [BatchNormConfig::train(), BatchNormConfig::test()] {
                let result = forward(x.view(), gamma.view(), beta.view(), &config, &mut running);
                assert!(matches!(result, Err(Error::InvalidConfig(_))), "{:?}", config.mode);
            }
        }
        assert!(RunningStats::new(3).validate().is_ok());
    }

    #[test]
    fn test_backward_forms_agree() {
        let x = array![[0.3, -1.2, 2.0], [1.5, 0.4, -0.6], [-0.9, 2.2, 0.1], [0.7, -0.3, 1.1]];
        let gamma = array![0.5, 1.5, -1.0];
        let beta = array![0.1, 0.0, -0.2];
        let dout = array![[1.0, -0.5, 0.2], [0.3, 0.8, -1.1], [-0.4, 0.1, 0.9], [0.6, -0.7, 0.05]];

        let mut running = RunningStats::new(3);
        let (_, cache_a) =
            forward(x.view(), gamma.view(), beta.view(), &BatchNormConfig::train(), &mut running)
                .unwrap();
        let (_, cache_b) =
            forward(x.view(), gamma.view(), beta.view(), &BatchNormConfig::train(), &mut running)
                .unwrap();

        let simplified = backward(dout.view(), cache_a).unwrap();
        let direct = backward_direct(dout.view(), cache_b).unwrap();

        assert_abs_diff_eq!(simplified.dx, direct.dx, epsilon = 1e-10);
        assert_abs_diff_eq!(simplified.dgamma, direct.dgamma, epsilon = 1e-12);
        assert_abs_diff_eq!(simplified.dbeta, direct.dbeta, epsilon = 1e-12);
    }

    #[test]
    fn test_backward_rejects_mismatched_dout() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        let mut layer = BatchNorm::new(2);
        let (_, cache) = layer.forward(x.view()).unwrap();

        let dout = array![[1.0, 2.0, 3.0]];
        assert!(backward(dout.view(), cache).is_err());
    }

    #[test]
    fn test_layer_instance_mode_switch() {
        let mut layer = BatchNorm::new(2);
        let x = array![[1.0, 2.0], [3.0, 6.0]];
        layer.forward(x.view()).unwrap();
        let trained = layer.running.clone();

        layer.set_mode(Mode::Test);
        layer.forward(array![[100.0, -100.0]].view()).unwrap();
        assert_eq!(layer.running, trained);

        layer.reset_running_stats();
        assert_eq!(layer.running, RunningStats::new(2));
    }
}
