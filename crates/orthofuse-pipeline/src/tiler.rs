//! Partitions the reference raster's extent into fixed-size ground patches.

use log::debug;
use orthofuse_core::FusionError;
use orthofuse_core::geom::Rect;
use serde::{Deserialize, Serialize};

use crate::raster::{PixelWindow, RasterGrid};

/// Patch identity: the pixel offsets of its window in the reference raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PatchId {
    pub row: u32,
    pub col: u32,
}

impl std::fmt::Display for PatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tile_{}_{}", self.row, self.col)
    }
}

/// Fixed-size rectangular cell of the reference survey grid. Created once by
/// the tiler and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundPatch {
    pub id: PatchId,
    pub bounds: Rect,
    pub window: PixelWindow,
}

/// Tiling parameters. `h_shift`/`v_shift` are fractional overlaps in [0, 1);
/// zero produces disjoint patches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TilerConfig {
    pub tile_size_meters: f64,
    /// Ground sampling distance of the raster, in cm per pixel.
    pub gsd_cm: f64,
    pub h_shift: f64,
    pub v_shift: f64,
    /// Discard candidates whose black-pixel percentage exceeds this.
    pub black_threshold_pct: f64,
    /// Discard candidates whose white-pixel percentage exceeds this.
    pub white_threshold_pct: f64,
}

impl Default for TilerConfig {
    fn default() -> Self {
        Self {
            tile_size_meters: 1.5,
            gsd_cm: 3.0,
            h_shift: 0.0,
            v_shift: 0.0,
            black_threshold_pct: 5.0,
            white_threshold_pct: 5.0,
        }
    }
}

/// Result of one tiling pass, with counts for the run audit.
#[derive(Debug, Clone)]
pub struct TileOutcome {
    pub patches: Vec<GroundPatch>,
    pub candidates: usize,
    pub pixel_filtered: usize,
}

pub struct GroundTiler {
    config: TilerConfig,
}

impl GroundTiler {
    pub fn new(config: TilerConfig) -> Result<Self, FusionError> {
        if !(0.0..1.0).contains(&config.h_shift) || !(0.0..1.0).contains(&config.v_shift) {
            return Err(FusionError::Configuration(format!(
                "shift fractions must lie in [0, 1), got ({}, {})",
                config.h_shift, config.v_shift
            )));
        }
        if !(config.gsd_cm.is_finite() && config.gsd_cm > 0.0) {
            return Err(FusionError::Configuration(format!(
                "GSD must be positive, got {} cm/px",
                config.gsd_cm
            )));
        }
        let tiler = Self { config };
        tiler.tile_size_px()?;
        Ok(tiler)
    }

    /// Patch edge length in pixels: `floor(tile_size_meters / (gsd / 100))`.
    pub fn tile_size_px(&self) -> Result<u32, FusionError> {
        let px = (self.config.tile_size_meters / (self.config.gsd_cm / 100.0)).floor();
        if !(px >= 1.0) {
            return Err(FusionError::Configuration(format!(
                "tile size {} m at {} cm/px yields an empty patch",
                self.config.tile_size_meters, self.config.gsd_cm
            )));
        }
        Ok(px as u32)
    }

    fn stride(&self, tile_px: u32, shift: f64) -> u32 {
        let overlap = (tile_px as f64 * shift).floor() as u32;
        (tile_px - overlap).max(1)
    }

    /// Generate patches in row-major order from the raster origin. The last
    /// row/column windows are clipped at the raster boundary, not padded.
    /// Candidates failing the black/white pixel filter are discarded before
    /// materialization.
    pub fn tile(&self, raster: &RasterGrid) -> Result<TileOutcome, FusionError> {
        let tile_px = self.tile_size_px()?;
        let stride_x = self.stride(tile_px, self.config.h_shift);
        let stride_y = self.stride(tile_px, self.config.v_shift);

        let mut patches = Vec::new();
        let mut candidates = 0usize;
        let mut pixel_filtered = 0usize;

        for row_off in (0..raster.height()).step_by(stride_y as usize) {
            for col_off in (0..raster.width()).step_by(stride_x as usize) {
                candidates += 1;
                let window = PixelWindow {
                    col_off,
                    row_off,
                    width: tile_px.min(raster.width() - col_off),
                    height: tile_px.min(raster.height() - row_off),
                };

                let (black, white) = raster.black_white_fractions(&window);
                if black * 100.0 > self.config.black_threshold_pct
                    || white * 100.0 > self.config.white_threshold_pct
                {
                    pixel_filtered += 1;
                    continue;
                }

                patches.push(GroundPatch {
                    id: PatchId {
                        row: row_off,
                        col: col_off,
                    },
                    bounds: raster.transform().window_bounds(&window),
                    window,
                });
            }
        }

        debug!(
            "tiled raster into {} patches ({} candidates, {} pixel-filtered)",
            patches.len(),
            candidates,
            pixel_filtered
        );
        Ok(TileOutcome {
            patches,
            candidates,
            pixel_filtered,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::GeoTransform;
    use approx::assert_relative_eq;

    fn uniform_raster(width: u32, height: u32, value: u8) -> RasterGrid {
        RasterGrid::new(
            width,
            height,
            vec![value; (width * height) as usize],
            GeoTransform::new(322000.0, 7658000.0, 0.03),
        )
        .unwrap()
    }

    fn tiler(config: TilerConfig) -> GroundTiler {
        GroundTiler::new(config).unwrap()
    }

    #[test]
    fn tile_size_scenario() {
        // 1.5 m at 3.0 cm/px -> floor(1.5 / 0.03) = 50 px.
        let t = tiler(TilerConfig::default());
        assert_eq!(t.tile_size_px().unwrap(), 50);
    }

    #[test]
    fn square_raster_yields_four_by_four_grid() {
        let t = tiler(TilerConfig::default());
        let outcome = t.tile(&uniform_raster(200, 200, 128)).unwrap();
        assert_eq!(outcome.candidates, 16);
        assert_eq!(outcome.patches.len(), 16);
        assert_eq!(outcome.pixel_filtered, 0);
        // Row-major from the origin.
        assert_eq!(outcome.patches[0].id, PatchId { row: 0, col: 0 });
        assert_eq!(outcome.patches[1].id, PatchId { row: 0, col: 50 });
        assert_eq!(outcome.patches[4].id, PatchId { row: 50, col: 0 });
    }

    #[test]
    fn last_row_and_column_are_clipped() {
        let t = tiler(TilerConfig::default());
        let outcome = t.tile(&uniform_raster(120, 70, 128)).unwrap();
        // 3 columns (50, 50, 20) x 2 rows (50, 20).
        assert_eq!(outcome.patches.len(), 6);
        let last = outcome.patches.last().unwrap();
        assert_eq!(last.window.width, 20);
        assert_eq!(last.window.height, 20);
        assert_relative_eq!(last.bounds.width(), 0.6, epsilon = 1e-9);
    }

    #[test]
    fn overlap_shrinks_the_stride() {
        let config = TilerConfig {
            h_shift: 0.5,
            v_shift: 0.5,
            ..TilerConfig::default()
        };
        let outcome = tiler(config).tile(&uniform_raster(100, 100, 128)).unwrap();
        // Stride 25 px: offsets 0, 25, 50, 75 on each axis.
        assert_eq!(outcome.patches.len(), 16);
    }

    #[test]
    fn black_raster_is_fully_filtered() {
        let t = tiler(TilerConfig::default());
        let outcome = t.tile(&uniform_raster(100, 100, 0)).unwrap();
        assert!(outcome.patches.is_empty());
        assert_eq!(outcome.pixel_filtered, outcome.candidates);
    }

    #[test]
    fn oversized_gsd_is_a_configuration_error() {
        let config = TilerConfig {
            tile_size_meters: 0.5,
            gsd_cm: 100.0,
            ..TilerConfig::default()
        };
        assert!(GroundTiler::new(config).is_err());
    }

    #[test]
    fn patch_display_matches_tile_naming() {
        let id = PatchId { row: 50, col: 100 };
        assert_eq!(id.to_string(), "tile_50_100");
    }
}
