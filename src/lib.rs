//! # convnet-layers
//!
//! Forward and backward primitives for feed-forward and convolutional
//! networks over dense `f64` arrays: affine, ReLU, dropout, batch / layer /
//! spatial batch / group normalization, naive convolution and max pooling,
//! and the SVM and softmax loss heads.
//!
//! Each operator is a pure function pair. `forward` returns the output and a
//! cache; `backward` consumes that cache together with the upstream gradient
//! and returns the gradients w.r.t. the inputs and parameters. The only state
//! that outlives a call is a batch-norm layer's [`RunningStats`], which the
//! caller owns and passes in by mutable reference.
//!
//! ## Example
//!
//! ```rust
//! use convnet_layers::layers::{affine, batch_norm, BatchNormConfig, RunningStats};
//! use convnet_layers::{relu_backward, relu_forward, softmax_loss};
//! use ndarray::array;
//!
//! let x = array![[1.0, 2.0], [0.5, -1.0], [3.0, 0.0]];
//! let w = array![[0.2, -0.1, 0.4], [0.3, 0.8, -0.5]];
//! let b = array![0.0, 0.1, 0.0];
//! let gamma = array![1.0, 1.0, 1.0];
//! let beta = array![0.0, 0.0, 0.0];
//! let mut running = RunningStats::new(3);
//!
//! let (a, affine_cache) = affine::forward(x.view().into_dyn(), w.view(), b.view())?;
//! let (n, bn_cache) = batch_norm::forward(
//!     a.view(), gamma.view(), beta.view(), &BatchNormConfig::train(), &mut running,
//! )?;
//! let (scores, relu_cache) = relu_forward(n.view());
//! let (loss, dscores) = softmax_loss(scores.view(), &[0, 2, 1])?;
//!
//! let dn = relu_backward(dscores.view(), relu_cache)?;
//! let bn_grads = batch_norm::backward(dn.view(), bn_cache)?;
//! let grads = affine::backward(bn_grads.dx.view(), affine_cache)?;
//!
//! assert!(loss > 0.0);
//! assert_eq!(grads.dw.dim(), (2, 3));
//! # Ok::<(), convnet_layers::Error>(())
//! ```

pub mod activations;
pub mod error;
pub mod gradcheck;
pub mod layers;
pub mod loss;
mod tensor;

pub use activations::{relu_backward, relu_forward, ReluCache};
pub use error::{Error, Result};
pub use layers::{Mode, RunningStats};
pub use loss::{softmax_loss, svm_loss};
