//! Error types for dualview-core.

use thiserror::Error;

use crate::viewport::Side;

/// Result type alias for dualview operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for dualview operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The renderer has not been enabled on a side yet.
    #[error("{0} viewport is not ready")]
    NotReady(Side),

    /// A side has no image geometry to derive a coordinate mapping from.
    #[error("no image geometry available for the {0} viewport")]
    MissingGeometry(Side),

    /// Pixel spacing must be strictly positive and finite.
    #[error("invalid pixel spacing: {0}")]
    InvalidSpacing(f64),

    /// Resampling error.
    #[error("resample error: {0}")]
    Resample(#[from] ResampleError),

    /// Registration service error.
    #[error("registration error: {0}")]
    Registration(#[from] RegistrationError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors raised by a numeric resample backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResampleError {
    /// Pixel buffer length does not match the declared window size.
    #[error("pixel buffer holds {actual} values, window needs {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    /// One of the windows has a zero dimension.
    #[error("cannot resample an empty window")]
    EmptyWindow,
}

/// Errors raised by a registration service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// Network or transport failure.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The service answered but rejected the request.
    #[error("service rejected the request: {0}")]
    Rejected(String),

    /// The response could not be interpreted.
    #[error("malformed response: {0}")]
    Malformed(String),
}
