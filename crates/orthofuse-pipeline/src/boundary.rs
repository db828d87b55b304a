//! Survey boundary: the single source of truth for "inside the surveyed
//! area", applied to raster patches and vehicle observations alike.

use log::warn;
use orthofuse_core::FusionError;
use orthofuse_core::geom::{Point, Polygon};
use serde::Deserialize;

use crate::tiler::GroundPatch;

/// User-supplied boundary polygon in the working projected CRS. Containment
/// is strict (boundary-exclusive).
#[derive(Debug, Clone)]
pub struct BoundaryPolygon {
    polygon: Polygon,
}

impl BoundaryPolygon {
    pub fn new(polygon: Polygon) -> Result<Self, FusionError> {
        if polygon.is_degenerate() {
            return Err(FusionError::Configuration(
                "boundary polygon needs at least three vertices".into(),
            ));
        }
        Ok(Self { polygon })
    }

    /// Parse a GeoJSON document (FeatureCollection, Feature or bare
    /// geometry). When several polygons exist, the first one wins. The
    /// coordinates must already be in the working CRS.
    pub fn from_geojson_str(contents: &str) -> Result<Self, FusionError> {
        let doc: GeoJson = serde_json::from_str(contents)
            .map_err(|e| FusionError::Configuration(format!("malformed boundary GeoJSON: {e}")))?;
        let rings = doc.polygons();
        if rings.len() > 1 {
            warn!(
                "boundary file contains {} polygons, using the first",
                rings.len()
            );
        }
        let ring = rings
            .into_iter()
            .next()
            .ok_or_else(|| FusionError::Configuration("boundary file has no polygon".into()))?;
        let vertices = ring
            .iter()
            .map(|&[x, y]| Point::new(x, y))
            .collect::<Vec<_>>();
        Self::new(Polygon::new(vertices))
    }

    pub fn contains(&self, point: &Point) -> bool {
        self.polygon.contains(point)
    }

    /// Retain patches whose bounds centroid lies strictly inside the
    /// boundary. Returns the survivors and the number dropped.
    pub fn filter_patches(&self, patches: Vec<GroundPatch>) -> (Vec<GroundPatch>, usize) {
        let before = patches.len();
        let kept: Vec<GroundPatch> = patches
            .into_iter()
            .filter(|p| self.contains(&p.bounds.centroid()))
            .collect();
        let dropped = before - kept.len();
        (kept, dropped)
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum GeoJson {
    FeatureCollection { features: Vec<Feature> },
    Feature { geometry: Geometry },
    Polygon { coordinates: PolygonCoords },
    MultiPolygon { coordinates: Vec<PolygonCoords> },
}

#[derive(Debug, Deserialize)]
struct Feature {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    Polygon { coordinates: PolygonCoords },
    MultiPolygon { coordinates: Vec<PolygonCoords> },
}

/// Exterior ring first, then holes; holes are ignored.
type PolygonCoords = Vec<Vec<[f64; 2]>>;

impl GeoJson {
    fn polygons(&self) -> Vec<&Vec<[f64; 2]>> {
        match self {
            GeoJson::FeatureCollection { features } => features
                .iter()
                .flat_map(|f| f.geometry.polygons())
                .collect(),
            GeoJson::Feature { geometry } => geometry.polygons(),
            GeoJson::Polygon { coordinates } => exterior(coordinates),
            GeoJson::MultiPolygon { coordinates } => {
                coordinates.iter().flat_map(|c| exterior(c)).collect()
            }
        }
    }
}

impl Geometry {
    fn polygons(&self) -> Vec<&Vec<[f64; 2]>> {
        match self {
            Geometry::Polygon { coordinates } => exterior(coordinates),
            Geometry::MultiPolygon { coordinates } => {
                coordinates.iter().flat_map(|c| exterior(c)).collect()
            }
        }
    }
}

fn exterior(coords: &PolygonCoords) -> Vec<&Vec<[f64; 2]>> {
    coords.first().into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::PixelWindow;
    use orthofuse_core::geom::Rect;
    use crate::tiler::PatchId;

    fn square_boundary() -> BoundaryPolygon {
        BoundaryPolygon::new(
            Rect::new(0.0, 0.0, 100.0, 100.0).to_polygon(),
        )
        .unwrap()
    }

    fn patch_at(min_x: f64, min_y: f64) -> GroundPatch {
        GroundPatch {
            id: PatchId { row: 0, col: 0 },
            bounds: Rect::new(min_x, min_y, min_x + 10.0, min_y + 10.0),
            window: PixelWindow {
                col_off: 0,
                row_off: 0,
                width: 10,
                height: 10,
            },
        }
    }

    #[test]
    fn centroid_inside_keeps_the_patch() {
        let boundary = square_boundary();
        let (kept, dropped) = boundary.filter_patches(vec![patch_at(10.0, 10.0)]);
        assert_eq!(kept.len(), 1);
        assert_eq!(dropped, 0);
    }

    #[test]
    fn centroid_outside_or_on_boundary_drops_the_patch() {
        let boundary = square_boundary();
        // Centroid at (205, 205): outside.
        let outside = patch_at(200.0, 200.0);
        // Centroid at (100, 50): exactly on the boundary edge.
        let on_edge = patch_at(95.0, 45.0);
        let (kept, dropped) = boundary.filter_patches(vec![outside, on_edge]);
        assert!(kept.is_empty());
        assert_eq!(dropped, 2);
    }

    #[test]
    fn parses_feature_collection_and_takes_first_polygon() {
        let doc = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {}, "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0], [0.0, 0.0]]]
                }},
                {"type": "Feature", "properties": {}, "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[50.0, 50.0], [60.0, 50.0], [60.0, 60.0], [50.0, 60.0], [50.0, 50.0]]]
                }}
            ]
        }"#;
        let boundary = BoundaryPolygon::from_geojson_str(doc).unwrap();
        assert!(boundary.contains(&Point::new(5.0, 5.0)));
        assert!(!boundary.contains(&Point::new(55.0, 55.0)));
    }

    #[test]
    fn parses_bare_polygon_geometry() {
        let doc = r#"{"type": "Polygon",
            "coordinates": [[[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0], [0.0, 0.0]]]}"#;
        let boundary = BoundaryPolygon::from_geojson_str(doc).unwrap();
        assert!(boundary.contains(&Point::new(2.0, 2.0)));
    }

    #[test]
    fn empty_document_is_a_configuration_error() {
        let doc = r#"{"type": "FeatureCollection", "features": []}"#;
        assert!(BoundaryPolygon::from_geojson_str(doc).is_err());
    }
}
