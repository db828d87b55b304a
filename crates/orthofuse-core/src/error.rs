//! Error types shared across the fusion pipeline

use thiserror::Error;

/// Errors raised by the core geometry and fusion routines.
///
/// Per-row `Geometry`/`Projection`/`Data` errors are recorded and the affected
/// row is dropped; only `Configuration` aborts a run.
#[derive(Debug, Error)]
pub enum FusionError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("geometry error: {0}")]
    Geometry(String),

    #[error("projection error: {0}")]
    Projection(String),

    #[error("data error: {0}")]
    Data(String),
}

impl FusionError {
    /// Audit category for drop accounting, `None` for fatal configuration errors.
    pub fn drop_kind(&self) -> Option<DropKind> {
        match self {
            FusionError::Configuration(_) => None,
            FusionError::Geometry(_) => Some(DropKind::Geometry),
            FusionError::Projection(_) => Some(DropKind::Projection),
            FusionError::Data(_) => Some(DropKind::Data),
        }
    }
}

/// Why an observation or patch was dropped from the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropKind {
    Geometry,
    Projection,
    Data,
}

pub type Result<T> = std::result::Result<T, FusionError>;
