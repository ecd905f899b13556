use std::path::PathBuf;
use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Structured error types for the land-cover segmentation service.
///
/// # Why structured errors
///
/// The HTTP layer has to tell a bad upload apart from a failure inside the
/// pipeline. Each variant carries the context of its stage so the handler can
/// pick a status code from the variant alone and log the rest.
#[derive(Error, Debug)]
pub enum LandCoverError {
    #[error("Invalid upload: {reason}")]
    InvalidUpload { reason: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Image processing error: {operation} failed")]
    ImageProcessing {
        operation: String,
        #[source]
        source: BoxedSource,
    },

    #[error("Model error: {operation} failed")]
    Model {
        operation: String,
        #[source]
        source: BoxedSource,
    },
}

pub type Result<T> = std::result::Result<T, LandCoverError>;

impl LandCoverError {
    pub fn invalid_upload(reason: impl Into<String>) -> Self {
        Self::InvalidUpload {
            reason: reason.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn image_processing<E>(operation: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxedSource>,
    {
        Self::ImageProcessing {
            operation: operation.into(),
            source: source.into(),
        }
    }

    pub fn model<E>(operation: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxedSource>,
    {
        Self::Model {
            operation: operation.into(),
            source: source.into(),
        }
    }

    /// True when the failure was caused by what the client sent.
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidUpload { .. })
    }
}

/// Convert I/O errors to filesystem errors.
///
/// # Why default values for context
///
/// Some I/O errors occur without specific path/operation context. Code that
/// has context should construct `LandCoverError::FileSystem` directly.
impl From<std::io::Error> for LandCoverError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

/// Convert image crate errors to image processing errors.
impl From<image::ImageError> for LandCoverError {
    fn from(err: image::ImageError) -> Self {
        Self::image_processing("image processing", err)
    }
}

/// Convert ONNX Runtime errors to model errors.
impl From<ort::Error> for LandCoverError {
    fn from(err: ort::Error) -> Self {
        Self::model("ort operation", err)
    }
}

/// Convert ndarray shape errors to model errors.
///
/// Shape errors only occur while moving tensors in and out of the session,
/// so they belong to the model category.
impl From<ndarray::ShapeError> for LandCoverError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::model("tensor shape conversion", err)
    }
}

impl From<serde_json::Error> for LandCoverError {
    fn from(err: serde_json::Error) -> Self {
        Self::configuration(format!("invalid JSON: {err}"))
    }
}
