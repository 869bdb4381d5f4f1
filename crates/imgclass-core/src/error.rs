//! Error type shared by the signature loader, preprocessing and prediction.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifyError {
    /// The signature file could not be read.
    #[error("failed to read signature file {}", path.display())]
    SignatureRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The signature file is not a valid descriptor.
    #[error("malformed signature file {}", path.display())]
    SignatureParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The model artifact named by the signature is not on disk.
    #[error("model file {} does not exist", path.display())]
    ModelFileNotFound { path: PathBuf },

    #[error("signature has no 'Image' input")]
    MissingImageInput,

    #[error("unusable image input shape {shape:?}: {reason}")]
    InvalidInputShape {
        shape: Vec<Option<usize>>,
        reason: &'static str,
    },

    #[error("image input must be float32, signature declares '{dtype}'")]
    UnsupportedInputType { dtype: String },

    #[error("no backend registered for model format '{0}'")]
    UnsupportedFormat(String),

    #[error("model did not produce output '{name}'")]
    MissingOutput { name: String },

    #[error("output '{name}' has no batch dimension to strip")]
    NotBatched { name: String },

    #[error("output '{name}' holds text that is not valid UTF-8")]
    InvalidText {
        name: String,
        #[source]
        source: std::string::FromUtf8Error,
    },

    #[error("couldn't find image file {}", path.display())]
    ImageFileNotFound { path: PathBuf },

    #[error("image decode")]
    Image(#[from] image::ImageError),

    /// Failure reported by the inference backend, passed through unchanged.
    #[error(transparent)]
    Runtime(#[from] anyhow::Error),
}
