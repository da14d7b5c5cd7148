//! Model error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    /// Document fields do not match the expected shape.
    #[error("Malformed document: {0}")]
    Json(#[from] serde_json::Error),

    /// File exceeds the inline upload cap.
    #[error("File is {size} bytes; the limit is {limit} bytes")]
    UploadTooLarge { size: usize, limit: usize },

    #[error("File name must not be empty")]
    EmptyFileName,
}

pub type ModelResult<T> = Result<T, ModelError>;
