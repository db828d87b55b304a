//! End-to-end survey pipeline: tile the orthophoto, project the classified
//! frames, match footprints to patches, fuse the evidence and geolocate the
//! results.

use anyhow::Context;
use log::{debug, info};
use orthofuse_core::{
    ClassSchema, DropKind, Evidence, FieldOfView, FootprintProjector, FusionEngine, FusionMode,
    GeoPoint, UtmProjection,
};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::boundary::BoundaryPolygon;
use crate::matcher::{FootprintMatcher, PatchMatches, ProjectedFrame};
use crate::observations::{FrameObservation, ObservationTable};
use crate::raster::RasterGrid;
use crate::report::{FusedPatchLabel, RunStats, UnlabeledPatch};
use crate::tiler::{GroundPatch, GroundTiler, TilerConfig};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Everything the pipeline needs besides the input files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// EPSG code of the working projected CRS (a WGS84 UTM zone).
    pub crs_epsg: u32,
    /// Camera field of view across track, in degrees.
    pub fov_x_deg: f64,
    /// Camera field of view along track, in degrees.
    pub fov_y_deg: f64,
    pub tiler: TilerConfig,
    /// Minimum union coverage of a patch by its matched footprints before
    /// its fused label is trusted.
    pub footprint_coverage_threshold: f64,
    /// Occupancy grid resolution for the union-coverage estimate.
    pub mask_resolution: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            crs_epsg: 32740,
            fov_x_deg: 94.4,
            fov_y_deg: 122.6,
            tiler: TilerConfig::default(),
            footprint_coverage_threshold: 1.0,
            mask_resolution: 64,
        }
    }
}

/// Both fused annotation tables plus everything the run audit reports.
#[derive(Debug)]
pub struct SurveyOutcome {
    pub output_names: Vec<String>,
    pub probabilistic: Vec<FusedPatchLabel>,
    pub binary: Vec<FusedPatchLabel>,
    pub unlabeled: Vec<UnlabeledPatch>,
    pub stats: RunStats,
}

pub struct SurveyPipeline {
    config: PipelineConfig,
    projection: UtmProjection,
    projector: FootprintProjector,
    engine: FusionEngine,
    tiler: GroundTiler,
}

impl SurveyPipeline {
    pub fn new(config: PipelineConfig, schema: ClassSchema) -> Result<Self> {
        let projection = UtmProjection::from_epsg(config.crs_epsg)
            .context("invalid working CRS")?;
        let fov = FieldOfView::from_degrees(config.fov_x_deg, config.fov_y_deg);
        let projector = FootprintProjector::new(projection, fov);
        let engine = FusionEngine::new(schema).context("invalid class schema")?;
        let tiler = GroundTiler::new(config.tiler.clone()).context("invalid tiling parameters")?;
        Ok(Self {
            config,
            projection,
            projector,
            engine,
            tiler,
        })
    }

    pub fn engine(&self) -> &FusionEngine {
        &self.engine
    }

    /// Run the whole survey. Per-frame failures are counted and skipped; only
    /// configuration-level problems abort the run.
    pub fn run(
        &self,
        raster: &RasterGrid,
        boundary: &BoundaryPolygon,
        table: &ObservationTable,
    ) -> Result<SurveyOutcome> {
        let mut stats = RunStats {
            frames_total: table.frames.len() + table.rows_dropped,
            frames_dropped_rows: table.rows_dropped,
            ..RunStats::default()
        };

        let tiled = self.tiler.tile(raster)?;
        stats.patches_candidates = tiled.candidates;
        stats.patches_pixel_filtered = tiled.pixel_filtered;
        let (patches, outside) = boundary.filter_patches(tiled.patches);
        stats.patches_outside_boundary = outside;
        info!(
            "surveying {} patches inside the boundary",
            patches.len()
        );

        let projected = self.project_frames(boundary, &table.frames, &mut stats);
        info!("projected {} of {} frames", projected.len(), table.frames.len());

        let matcher = FootprintMatcher::new(
            &patches,
            self.config.footprint_coverage_threshold,
            self.config.mask_resolution,
        );
        let matched = matcher.match_frames(&projected);
        stats.frames_unassigned = matched.frames_unassigned;
        stats.patches_gate_rejected = matched.gate_rejected.len();
        stats.patches_unobserved = matched.unobserved.len();

        let mut probabilistic = Vec::with_capacity(matched.admitted.len());
        let mut binary = Vec::with_capacity(matched.admitted.len());
        for group in &matched.admitted {
            let patch = &patches[group.patch_index];
            let Some(centroid) = self.geolocate_patch(patch, &mut stats) else {
                continue;
            };
            let evidence = self.collect_evidence(group, &table.frames);
            probabilistic.push(FusedPatchLabel {
                id: patch.id,
                centroid,
                probabilities: self.engine.fuse(&evidence, FusionMode::Probabilistic),
            });
            binary.push(FusedPatchLabel {
                id: patch.id,
                centroid,
                probabilities: self.engine.fuse(&evidence, FusionMode::Binary),
            });
        }
        probabilistic.sort_by_key(|l| l.id);
        binary.sort_by_key(|l| l.id);
        stats.patches_labeled = probabilistic.len();

        let mut unlabeled = Vec::new();
        for &patch_index in matched.unobserved.iter().chain(&matched.gate_rejected) {
            let patch = &patches[patch_index];
            let Some(centroid) = self.geolocate_patch(patch, &mut stats) else {
                continue;
            };
            unlabeled.push(UnlabeledPatch {
                id: patch.id,
                centroid,
            });
        }
        unlabeled.sort_by_key(|p| p.id);

        stats.log_summary();
        Ok(SurveyOutcome {
            output_names: self
                .engine
                .output_names()
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            probabilistic,
            binary,
            unlabeled,
            stats,
        })
    }

    /// Project every frame's position and footprint into the working CRS,
    /// dropping frames outside the boundary or outside the projection domain.
    fn project_frames(
        &self,
        boundary: &BoundaryPolygon,
        frames: &[FrameObservation],
        stats: &mut RunStats,
    ) -> Vec<ProjectedFrame> {
        #[cfg(feature = "parallel")]
        let results: Vec<_> = frames
            .par_iter()
            .map(|f| self.project_one(f))
            .collect();
        #[cfg(not(feature = "parallel"))]
        let results: Vec<_> = frames.iter().map(|f| self.project_one(f)).collect();

        let mut projected = Vec::with_capacity(frames.len());
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(frame) => {
                    if !boundary.contains(&frame.position) {
                        stats.frames_outside_boundary += 1;
                        continue;
                    }
                    projected.push(ProjectedFrame {
                        frame_index: index,
                        ..frame
                    });
                }
                Err(err) => {
                    debug!(
                        "dropping frame '{}': {err}",
                        frames[index].frame_id
                    );
                    match err.drop_kind() {
                        Some(DropKind::Projection) => stats.frames_dropped_projection += 1,
                        _ => stats.frames_dropped_geometry += 1,
                    }
                }
            }
        }
        projected
    }

    /// Place a patch centroid back in WGS84. A centroid outside the
    /// projection domain drops that patch only, like any other per-row
    /// projection failure.
    fn geolocate_patch(&self, patch: &GroundPatch, stats: &mut RunStats) -> Option<GeoPoint> {
        match self.projection.inverse(patch.bounds.centroid()) {
            Ok(centroid) => Some(centroid),
            Err(err) => {
                debug!("dropping patch {}: {err}", patch.id);
                stats.patches_dropped_projection += 1;
                None
            }
        }
    }

    fn project_one(
        &self,
        frame: &FrameObservation,
    ) -> orthofuse_core::error::Result<ProjectedFrame> {
        let position = self.projector.project_position(&frame.pose)?;
        let footprint = self.projector.project(&frame.pose)?;
        Ok(ProjectedFrame {
            frame_index: 0,
            position,
            footprint: footprint.polygon().clone(),
        })
    }

    fn collect_evidence(&self, group: &PatchMatches, frames: &[FrameObservation]) -> Vec<Evidence> {
        group
            .rows
            .iter()
            .map(|row| Evidence {
                scores: frames[row.frame_index].scores.clone(),
                intersection_area: row.intersection_area,
                observation_area: row.observation_area,
            })
            .collect()
    }
}
