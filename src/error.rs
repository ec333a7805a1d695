//! Error types for the solver and the host application.

use thiserror::Error;

/// Failures surfaced by the reaction-diffusion solver
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    /// Field dimensions must both be non-zero
    #[error("invalid field dimensions {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    /// Field or mask storage could not be allocated
    #[error("failed to allocate field storage for {cells} cells")]
    Allocation { cells: usize },

    /// Seed mask does not match the field it is applied to
    #[error("seed mask is {actual:?}, field is {expected:?}")]
    MaskSize {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    /// Work-group layout whose cache is no larger than its halo border
    #[error("layout with group size {group_size:?} and tile size {tile_size:?} produces no output")]
    InvalidLayout {
        group_size: [usize; 2],
        tile_size: [usize; 2],
    },

    /// An invocation thread of the threaded executor panicked
    #[error("work-group invocation thread panicked")]
    ThreadPanicked,
}

/// Top-level application errors
#[derive(Error, Debug)]
pub enum AppError {
    /// SDL reports its failures as plain strings
    #[error("SDL error: {0}")]
    Sdl(String),

    #[error(transparent)]
    Sim(#[from] SimError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<String> for AppError {
    fn from(message: String) -> Self {
        AppError::Sdl(message)
    }
}
