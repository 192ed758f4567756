//! Error type shared by every fallible operation in the crate.

use thiserror::Error;

/// Convenience alias for results carrying an [`EvolveError`].
pub type Result<T> = std::result::Result<T, EvolveError>;

/// Failures surfaced by evolution, gradient, device, and configuration code.
///
/// Nothing here is retried: every error is final for the call that produced
/// it.
#[derive(Debug, Error)]
pub enum EvolveError {
    /// A configuration is internally inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An array or vector has the wrong dimensions.
    #[error("shape mismatch for {what}: expected {expected:?}, got {got:?}")]
    Shape {
        what: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// An index lies beyond the length of the vector it addresses.
    #[error("index {index} out of bounds for length {len}")]
    Bounds { index: usize, len: usize },

    /// A state picked up non-finite entries during integration.
    #[error("numerical divergence: non-finite state at t = {t}")]
    Divergence { t: f64 },

    /// Diagonalization or another LAPACK-backed routine failed.
    #[error("linear algebra error: {0}")]
    Linalg(#[from] ndarray_linalg::error::LinalgError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse configuration: {0}")]
    Toml(#[from] toml::de::Error),
}

impl EvolveError {
    /// Shorthand for [`Self::Config`].
    pub fn config<S: Into<String>>(msg: S) -> Self { Self::Config(msg.into()) }

    /// Shorthand for [`Self::Shape`].
    pub fn shape(what: &'static str, expected: &[usize], got: &[usize])
        -> Self
    {
        Self::Shape { what, expected: expected.to_vec(), got: got.to_vec() }
    }

    /// Return `Err(Self::Bounds)` if `index >= len`.
    pub fn check_bounds(index: usize, len: usize) -> Result<()> {
        if index >= len {
            Err(Self::Bounds { index, len })
        } else {
            Ok(())
        }
    }
}
