//! Orthofuse Pipeline
//!
//! The survey-scale layer on top of `orthofuse-core`: orthophoto tiling,
//! frame-table ingestion, boundary filtering, footprint-to-patch matching and
//! the fused output tables. The binary wires files to these modules; nothing
//! here opens a path.

pub mod boundary;
pub mod matcher;
pub mod observations;
pub mod pipeline;
pub mod raster;
pub mod report;
pub mod tiler;

pub use boundary::BoundaryPolygon;
pub use matcher::{FootprintMatcher, MatchOutcome, ProjectedFrame};
pub use observations::{FrameObservation, ObservationTable, read_observations};
pub use pipeline::{PipelineConfig, SurveyOutcome, SurveyPipeline};
pub use raster::{GeoTransform, RasterGrid};
pub use report::{FusedPatchLabel, RunStats, UnlabeledPatch, write_annotations, write_unlabeled};
pub use tiler::{GroundPatch, GroundTiler, PatchId, TilerConfig};

/// Convenience alias used throughout the pipeline layer.
pub type Result<T> = anyhow::Result<T>;
