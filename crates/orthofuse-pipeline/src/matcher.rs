//! Matches projected frames to ground patches.
//!
//! Matching is two-stage: a coarse assignment takes every frame whose camera
//! position lies strictly inside a patch's bounds (an R-tree over the patch
//! envelopes keeps this sublinear), and a fine stage weighs each assigned
//! frame by the area of its footprint clipped to the patch. A separate
//! union-coverage gate then drops patches whose matched footprints do not
//! jointly cover enough of the patch to trust a fused label.

use std::collections::HashMap;

use log::debug;
use orthofuse_core::geom::{CoverageMask, Point, Polygon, Rect};
use rstar::{AABB, RTree, RTreeObject};

use crate::tiler::GroundPatch;

/// One frame after projection into the working CRS.
#[derive(Debug, Clone)]
pub struct ProjectedFrame {
    pub frame_index: usize,
    pub position: Point,
    pub footprint: Polygon,
}

/// One frame matched to one patch, with the areas the fusion weighting needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchRow {
    pub frame_index: usize,
    pub intersection_area: f64,
    pub observation_area: f64,
}

/// All evidence admitted for one patch.
#[derive(Debug, Clone)]
pub struct PatchMatches {
    pub patch_index: usize,
    pub rows: Vec<MatchRow>,
}

/// Matching result, split the way the report needs it: patches with admitted
/// evidence, patches rejected by the coverage gate, and patches no frame was
/// assigned to at all.
#[derive(Debug)]
pub struct MatchOutcome {
    pub admitted: Vec<PatchMatches>,
    pub gate_rejected: Vec<usize>,
    pub unobserved: Vec<usize>,
    pub frames_unassigned: usize,
}

struct PatchEnvelope {
    patch_index: usize,
    bounds: Rect,
}

impl RTreeObject for PatchEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.bounds.min_x, self.bounds.min_y],
            [self.bounds.max_x, self.bounds.max_y],
        )
    }
}

pub struct FootprintMatcher {
    tree: RTree<PatchEnvelope>,
    patches: Vec<Rect>,
    /// Minimum union coverage of a patch by its matched footprints.
    coverage_threshold: f64,
    mask_resolution: usize,
}

impl FootprintMatcher {
    pub fn new(patches: &[GroundPatch], coverage_threshold: f64, mask_resolution: usize) -> Self {
        let envelopes = patches
            .iter()
            .enumerate()
            .map(|(patch_index, p)| PatchEnvelope {
                patch_index,
                bounds: p.bounds,
            })
            .collect();
        Self {
            tree: RTree::bulk_load(envelopes),
            patches: patches.iter().map(|p| p.bounds).collect(),
            coverage_threshold,
            mask_resolution,
        }
    }

    /// Run both stages and the coverage gate.
    pub fn match_frames(&self, frames: &[ProjectedFrame]) -> MatchOutcome {
        let mut per_patch: Vec<Vec<MatchRow>> = vec![Vec::new(); self.patches.len()];
        let mut frames_unassigned = 0usize;

        for frame in frames {
            let mut assigned = false;
            let probe = AABB::from_point([frame.position.x, frame.position.y]);
            for envelope in self.tree.locate_in_envelope_intersecting(&probe) {
                // The envelope query is inclusive; the patch boundary is not.
                if !envelope.bounds.contains(&frame.position) {
                    continue;
                }
                assigned = true;
                per_patch[envelope.patch_index].push(MatchRow {
                    frame_index: frame.frame_index,
                    intersection_area: frame
                        .footprint
                        .intersection_area(&envelope.bounds),
                    observation_area: frame.footprint.area(),
                });
            }
            if !assigned {
                frames_unassigned += 1;
            }
        }

        let footprints: HashMap<usize, &Polygon> = frames
            .iter()
            .map(|f| (f.frame_index, &f.footprint))
            .collect();
        let mut admitted = Vec::new();
        let mut gate_rejected = Vec::new();
        let mut unobserved = Vec::new();
        for (patch_index, rows) in per_patch.into_iter().enumerate() {
            if rows.is_empty() {
                unobserved.push(patch_index);
                continue;
            }
            if self.union_coverage(patch_index, &rows, &footprints) < self.coverage_threshold {
                gate_rejected.push(patch_index);
                continue;
            }
            admitted.push(PatchMatches { patch_index, rows });
        }

        debug!(
            "matched {} patches ({} gate-rejected, {} unobserved, {} frames unassigned)",
            admitted.len(),
            gate_rejected.len(),
            unobserved.len(),
            frames_unassigned
        );
        MatchOutcome {
            admitted,
            gate_rejected,
            unobserved,
            frames_unassigned,
        }
    }

    /// Fraction of the patch jointly covered by the matched footprints,
    /// estimated on a cell-center occupancy grid.
    fn union_coverage(
        &self,
        patch_index: usize,
        rows: &[MatchRow],
        footprints: &HashMap<usize, &Polygon>,
    ) -> f64 {
        let mut mask = CoverageMask::new(self.patches[patch_index], self.mask_resolution);
        for row in rows {
            if let Some(footprint) = footprints.get(&row.frame_index) {
                mask.paint(footprint);
            }
        }
        mask.coverage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::PixelWindow;
    use crate::tiler::PatchId;
    use approx::assert_relative_eq;

    fn patch(index: u32, min_x: f64, min_y: f64, size: f64) -> GroundPatch {
        GroundPatch {
            id: PatchId { row: index, col: 0 },
            bounds: Rect::new(min_x, min_y, min_x + size, min_y + size),
            window: PixelWindow {
                col_off: 0,
                row_off: index * 50,
                width: 50,
                height: 50,
            },
        }
    }

    fn square_footprint(cx: f64, cy: f64, half: f64) -> Polygon {
        Rect::new(cx - half, cy - half, cx + half, cy + half).to_polygon()
    }

    fn frame(frame_index: usize, cx: f64, cy: f64, half: f64) -> ProjectedFrame {
        ProjectedFrame {
            frame_index,
            position: Point::new(cx, cy),
            footprint: square_footprint(cx, cy, half),
        }
    }

    #[test]
    fn frame_matches_only_the_patch_containing_its_position() {
        let patches = vec![patch(0, 0.0, 0.0, 10.0), patch(1, 20.0, 0.0, 10.0)];
        let matcher = FootprintMatcher::new(&patches, 0.0, 64);
        // Footprint covers both patches, position is inside the first.
        let outcome = matcher.match_frames(&[frame(0, 5.0, 5.0, 30.0)]);
        assert_eq!(outcome.admitted.len(), 1);
        assert_eq!(outcome.admitted[0].patch_index, 0);
        assert_eq!(outcome.unobserved, vec![1]);
        assert_eq!(outcome.frames_unassigned, 0);
    }

    #[test]
    fn position_on_the_patch_boundary_does_not_match() {
        let patches = vec![patch(0, 0.0, 0.0, 10.0)];
        let matcher = FootprintMatcher::new(&patches, 0.0, 64);
        let outcome = matcher.match_frames(&[frame(0, 10.0, 5.0, 2.0)]);
        assert!(outcome.admitted.is_empty());
        assert_eq!(outcome.frames_unassigned, 1);
    }

    #[test]
    fn intersection_is_the_clip_area_not_the_patch_area() {
        let patches = vec![patch(0, 0.0, 0.0, 10.0)];
        let matcher = FootprintMatcher::new(&patches, 0.0, 64);
        // 8x8 footprint centered at (1, 1): clip to the patch is a 5x5 square.
        let outcome = matcher.match_frames(&[frame(0, 1.0, 1.0, 4.0)]);
        let row = outcome.admitted[0].rows[0];
        assert_relative_eq!(row.intersection_area, 25.0, epsilon = 1e-9);
        assert_relative_eq!(row.observation_area, 64.0, epsilon = 1e-9);
    }

    #[test]
    fn full_coverage_threshold_rejects_partial_unions() {
        let patches = vec![patch(0, 0.0, 0.0, 10.0)];
        let matcher = FootprintMatcher::new(&patches, 1.0, 64);
        // Footprint covers only the lower-left quarter of the patch.
        let outcome = matcher.match_frames(&[frame(0, 2.5, 2.5, 2.5)]);
        assert!(outcome.admitted.is_empty());
        assert_eq!(outcome.gate_rejected, vec![0]);
    }

    #[test]
    fn disjoint_footprints_jointly_pass_the_gate() {
        let patches = vec![patch(0, 0.0, 0.0, 10.0)];
        let matcher = FootprintMatcher::new(&patches, 1.0, 64);
        // Two half-patch footprints whose union spans the whole patch.
        let left = ProjectedFrame {
            frame_index: 0,
            position: Point::new(2.5, 5.0),
            footprint: Rect::new(-1.0, -1.0, 5.0, 11.0).to_polygon(),
        };
        let right = ProjectedFrame {
            frame_index: 1,
            position: Point::new(7.5, 5.0),
            footprint: Rect::new(5.0, -1.0, 11.0, 11.0).to_polygon(),
        };
        let outcome = matcher.match_frames(&[left, right]);
        assert_eq!(outcome.admitted.len(), 1);
        assert_eq!(outcome.admitted[0].rows.len(), 2);
    }

    #[test]
    fn degenerate_footprint_still_matches_with_zero_area() {
        let patches = vec![patch(0, 0.0, 0.0, 10.0)];
        let matcher = FootprintMatcher::new(&patches, 0.0, 64);
        let outcome = matcher.match_frames(&[ProjectedFrame {
            frame_index: 0,
            position: Point::new(5.0, 5.0),
            footprint: Polygon::empty(),
        }]);
        let row = outcome.admitted[0].rows[0];
        assert_relative_eq!(row.observation_area, 0.0);
    }
}
