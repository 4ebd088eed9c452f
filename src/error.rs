//! Crate-wide error type.
//!
//! Construction-time problems (unknown tensor names, impossible layer
//! geometry) and ingestion problems (malformed datasets, corrupt parameter
//! files) are reported eagerly through [`NetError`]. Compute kernels assume
//! the shapes fixed at construction and do not re-validate them.

use thiserror::Error;

/// Errors produced while building, running, feeding or persisting a net.
#[derive(Debug, Error)]
pub enum NetError {
    /// A missing tensor name, a bad layer hyperparameter, or an unresolvable
    /// node index.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// Input data whose counts, sizes or checksums do not line up.
    #[error("invalid data: {0}")]
    InvalidData(String),
    /// File open, read or write failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Device failure on the accelerated path.
    #[cfg(feature = "wgpu")]
    #[error(transparent)]
    Gpu(#[from] crate::nn::ops::wgpu::GpuFailure),
}

/// Shorthand for results carrying a [`NetError`].
pub type Result<T, E = NetError> = core::result::Result<T, E>;

impl NetError {
    pub(crate) fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    pub(crate) fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }
}
