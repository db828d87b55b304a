//! Survey outputs: fused annotation tables, the unlabeled-patch table and the
//! run audit that accounts for every discarded frame and patch.

use std::io::Write;

use csv::WriterBuilder;
use log::info;
use orthofuse_core::{FusionError, GeoPoint};

use crate::tiler::PatchId;

/// One labeled ground patch: fused probabilities plus its centroid placed
/// back in WGS84 for the annotation table.
#[derive(Debug, Clone)]
pub struct FusedPatchLabel {
    pub id: PatchId,
    pub centroid: GeoPoint,
    /// One probability per output class, in the engine's output order.
    pub probabilities: Vec<f64>,
}

/// A surveyed patch that received no trustworthy label (no evidence, or the
/// coverage gate rejected it).
#[derive(Debug, Clone)]
pub struct UnlabeledPatch {
    pub id: PatchId,
    pub centroid: GeoPoint,
}

/// Where the pipeline discarded input, for the end-of-run summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunStats {
    pub frames_total: usize,
    pub frames_dropped_rows: usize,
    pub frames_outside_boundary: usize,
    pub frames_dropped_geometry: usize,
    pub frames_dropped_projection: usize,
    pub frames_unassigned: usize,
    pub patches_candidates: usize,
    pub patches_pixel_filtered: usize,
    pub patches_outside_boundary: usize,
    pub patches_gate_rejected: usize,
    pub patches_unobserved: usize,
    pub patches_dropped_projection: usize,
    pub patches_labeled: usize,
}

impl RunStats {
    pub fn log_summary(&self) {
        info!(
            "frames: {} read, {} malformed, {} outside boundary, {} bad geometry, {} unprojectable, {} unassigned",
            self.frames_total,
            self.frames_dropped_rows,
            self.frames_outside_boundary,
            self.frames_dropped_geometry,
            self.frames_dropped_projection,
            self.frames_unassigned
        );
        info!(
            "patches: {} candidates, {} pixel-filtered, {} outside boundary, {} unobserved, {} gate-rejected, {} unprojectable, {} labeled",
            self.patches_candidates,
            self.patches_pixel_filtered,
            self.patches_outside_boundary,
            self.patches_unobserved,
            self.patches_gate_rejected,
            self.patches_dropped_projection,
            self.patches_labeled
        );
    }
}

/// Write one annotation table: a row per labeled patch, named after its tile,
/// georeferenced by its centroid, followed by the fused class probabilities.
pub fn write_annotations<W: Write>(
    sink: W,
    class_names: &[&str],
    labels: &[FusedPatchLabel],
) -> Result<(), FusionError> {
    let mut writer = WriterBuilder::new().from_writer(sink);
    let io_err = |e: csv::Error| FusionError::Data(format!("failed to write annotations: {e}"));

    let mut header = vec!["FileName", "GPSLatitude", "GPSLongitude"];
    header.extend_from_slice(class_names);
    writer.write_record(&header).map_err(io_err)?;

    for label in labels {
        let mut record = vec![
            label.id.to_string(),
            label.centroid.lat.to_string(),
            label.centroid.lon.to_string(),
        ];
        record.extend(label.probabilities.iter().map(|p| p.to_string()));
        writer.write_record(&record).map_err(io_err)?;
    }
    writer
        .flush()
        .map_err(|e| FusionError::Data(format!("failed to write annotations: {e}")))
}

/// Write the geolocations of patches that stayed unlabeled, so the survey can
/// revisit them.
pub fn write_unlabeled<W: Write>(sink: W, patches: &[UnlabeledPatch]) -> Result<(), FusionError> {
    let mut writer = WriterBuilder::new().from_writer(sink);
    let io_err = |e: csv::Error| FusionError::Data(format!("failed to write unlabeled table: {e}"));

    writer
        .write_record(["FileName", "GPSLatitude", "GPSLongitude"])
        .map_err(io_err)?;
    for patch in patches {
        writer
            .write_record([
                patch.id.to_string(),
                patch.centroid.lat.to_string(),
                patch.centroid.lon.to_string(),
            ])
            .map_err(io_err)?;
    }
    writer
        .flush()
        .map_err(|e| FusionError::Data(format!("failed to write unlabeled table: {e}")))
}
