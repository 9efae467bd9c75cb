#![warn(missing_docs)]

//! # Neural Style
//!
//! Neural style transfer on top of Burn.
//!
//! A content image and a style image are fed through a pretrained VGG16 network used as a
//! fixed feature extractor. A third image, the *mixed image*, starts as mid-gray noise and is
//! optimized directly in pixel space so that its deep activations match the content image
//! while its Gram matrices match the style image.
//!
//! ```ignore
//! use burn::backend::{Autodiff, NdArray};
//! use neural_style::{load_image, StyleTransfer, StyleTransferConfig, Vgg16Config, WeightsSource};
//!
//! type B = Autodiff<NdArray<f32>>;
//!
//! let device = Default::default();
//! let model = WeightsSource::Cache.load(Vgg16Config::new().init::<B>(&device), &device)?;
//! let content = load_image("cat.png", None)?;
//! let style = load_image("style.jpeg", None)?;
//!
//! let config = StyleTransferConfig::new(vec![0, 1, 2], vec![7, 8, 9, 10, 11, 12]);
//! let mixed = StyleTransfer::new(model, &content, &style, config, &device)?.run()?;
//! mixed.save("output.png")?;
//! ```

/// Run configuration.
pub mod config;

/// Error types.
pub mod error;

/// Image loading, saving and preview.
pub mod images;

/// Loss terms computed from network activations.
pub mod loss;

/// The feature extraction network.
pub mod model;

/// The optimization loop.
pub mod transfer;

/// Adaptive normalization of the loss terms.
pub mod weighting;

pub use config::StyleTransferConfig;
pub use error::StyleTransferError;
pub use images::{load_image, save_preview, Image};
pub use model::{FeatureExtractor, Vgg16, Vgg16Config, WeightsSource};
pub use transfer::{CancellationToken, IterationReport, StyleTransfer};
pub use weighting::{AdjustmentWeights, LossValues};

/// Backend for test cases
#[cfg(test)]
pub type TestBackend = burn::backend::NdArray<f32>;

/// Backend for autodiff test cases
#[cfg(test)]
pub type TestAutodiffBackend = burn::backend::Autodiff<TestBackend>;
