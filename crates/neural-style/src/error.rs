use std::path::PathBuf;

use burn::record::RecorderError;

/// Errors raised while preparing or running a style transfer.
///
/// Every variant is fatal: a run that fails never produces an output image.
#[derive(thiserror::Error, Debug)]
pub enum StyleTransferError {
    /// An input image or the network weights could not be read or decoded.
    #[error("Input error for '{path}': {reason}")]
    Input {
        /// Offending file.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// The run configuration is invalid for the feature model.
    #[error("Config error: {0}")]
    Config(String),

    /// A loss, the gradient or its standard deviation became NaN or infinite.
    #[error("Numeric instability at iteration {iteration}: {quantity} is {value}")]
    NumericInstability {
        /// Zero-based iteration at which the value was observed.
        iteration: usize,
        /// Name of the non-finite quantity.
        quantity: &'static str,
        /// The value itself.
        value: f64,
    },

    /// The numeric backend failed to execute a step.
    #[error("Resource error: {0}")]
    Resource(String),

    /// The run was cancelled through its [token](crate::CancellationToken).
    #[error("Cancelled before iteration {iteration}")]
    Cancelled {
        /// Iteration that was about to start.
        iteration: usize,
    },

    /// The output image could not be written.
    #[error("Output error for '{path}': {source}")]
    Output {
        /// Destination file.
        path: PathBuf,
        /// Encoder or IO error.
        #[source]
        source: image::ImageError,
    },

    /// Loading the network record failed.
    #[error("Weights error: {0}")]
    Weights(#[from] RecorderError),
}

impl StyleTransferError {
    pub(crate) fn input(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Input {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, StyleTransferError>;
