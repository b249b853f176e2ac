//! Forward/backward operator pairs.
//!
//! Every operator exposes `forward(..) -> Result<(out, cache)>` and
//! `backward(dout, cache) -> Result<gradients>`. The cache is produced by one
//! forward call and consumed by exactly one backward call; chaining forwards
//! and replaying the caches in reverse order is backpropagation.

pub mod affine;
pub mod batch_norm;
pub mod composite;
pub mod conv;
pub mod dropout;
pub mod group_norm;
pub mod layer_norm;
pub mod mode;
pub mod normalization;
pub mod pooling;
pub mod spatial_batch_norm;

pub use affine::{AffineCache, AffineGradients};
pub use batch_norm::{BatchNorm, BatchNormCache, BatchNormConfig, RunningStats};
pub use conv::{ConvCache, ConvConfig, ConvGradients};
pub use dropout::{DropoutCache, DropoutConfig};
pub use group_norm::{GroupNormCache, GroupNormConfig};
pub use layer_norm::{LayerNormCache, LayerNormConfig};
pub use mode::Mode;
pub use normalization::{NormGradients, SpatialNormGradients};
pub use pooling::{MaxPoolCache, PoolConfig};
pub use spatial_batch_norm::SpatialBatchNormCache;
