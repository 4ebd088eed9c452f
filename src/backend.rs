//! Backend selection module.
//!
//! This module defines the available computation backends and a process-wide
//! default used when a [`NetConfig`](crate::nn::NetConfig) is built with
//! `Default`.
//!
//! # Supported Backends
//!
//! - `Cpu`: Pure Rust kernels parallelised with `rayon` (default).
//! - `Wgpu`: GPU compute shaders through `wgpu`, compiled in with the
//!   `wgpu` feature. Without the feature, or without a usable adapter,
//!   every operation falls back to `Cpu`.
//!
//! The default is stored in an `AtomicU8`, so switching it is cheap and
//! thread-safe. A net captures the backend once, at construction.

use core::sync::atomic::{AtomicU8, Ordering};

/// Enumeration of supported computation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Backend {
    /// Pure CPU-based backend (default).
    #[default]
    Cpu = 0,
    /// GPU-accelerated backend using `wgpu`.
    Wgpu,
}

impl Backend {
    /// Whether this backend can actually run in the current build.
    ///
    /// `Wgpu` is only available when the `wgpu` feature is enabled.
    #[must_use]
    pub const fn is_compiled_in(self) -> bool {
        match self {
            Self::Cpu => true,
            Self::Wgpu => cfg!(feature = "wgpu"),
        }
    }
}

impl TryFrom<u8> for Backend {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Cpu),
            1 => Ok(Self::Wgpu),
            _ => Err(()),
        }
    }
}

static GLOBAL_DEFAULT_BACKEND: AtomicU8 = AtomicU8::new(Backend::Cpu as u8);

/// Sets the backend new nets pick up by default.
///
/// # Example
///
/// ```
/// use deconvnet::backend::{set_backend, get_backend, Backend};
/// set_backend(Backend::Cpu);
/// assert_eq!(get_backend(), Backend::Cpu);
/// ```
pub fn set_backend(b: Backend) {
    GLOBAL_DEFAULT_BACKEND.store(b as u8, Ordering::Release);
}

/// Returns the process-wide default backend.
///
/// If the stored value is invalid, defaults to [`Backend::Cpu`].
#[must_use]
pub fn get_backend() -> Backend {
    Backend::try_from(GLOBAL_DEFAULT_BACKEND.load(Ordering::Acquire)).unwrap_or_default()
}
