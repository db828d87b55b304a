//! Projects a camera pose into a ground footprint polygon in the working CRS.

use crate::camera::{CameraPose, FieldOfView, ground_corners};
use crate::crs::{UtmProjection, geodesic_destination};
use crate::error::Result;
use crate::geom::{Point, Polygon};

/// Ground polygon observed by a single frame, in the working projected CRS.
/// Derived from exactly one [`CameraPose`], never mutated after creation.
/// A degenerate footprint (fewer than three placed vertices) has zero area
/// and simply contributes no evidence downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct Footprint {
    polygon: Polygon,
}

impl Footprint {
    pub fn degenerate() -> Self {
        Self {
            polygon: Polygon::empty(),
        }
    }

    pub fn polygon(&self) -> &Polygon {
        &self.polygon
    }

    pub fn area(&self) -> f64 {
        self.polygon.area()
    }

    pub fn is_degenerate(&self) -> bool {
        self.polygon.is_degenerate()
    }
}

/// Converts one camera pose + field of view into a [`Footprint`].
///
/// The frustum corners are placed on the sphere with the destination-point
/// geodesic formula (distance and bearing from the camera position), then the
/// resulting WGS84 ring is reprojected into the working planar CRS.
#[derive(Debug, Clone, Copy)]
pub struct FootprintProjector {
    projection: UtmProjection,
    fov: FieldOfView,
}

impl FootprintProjector {
    pub fn new(projection: UtmProjection, fov: FieldOfView) -> Self {
        Self { projection, fov }
    }

    /// Fails with a geometry error on a non-positive distance-to-ground or an
    /// out-of-range FOV, and with a projection error when a placed vertex
    /// falls outside the planar CRS domain. Corners the frustum cannot place
    /// are skipped; fewer than three surviving vertices yields a degenerate
    /// footprint, not an error.
    pub fn project(&self, pose: &CameraPose) -> Result<Footprint> {
        let corners = ground_corners(
            self.fov,
            pose.distance_to_ground,
            pose.roll,
            pose.pitch,
            pose.yaw,
        )?;

        let mut ring = Vec::with_capacity(corners.len());
        for corner in corners {
            let distance = (corner.x * corner.x + corner.y * corner.y).sqrt();
            if distance < 1e-12 {
                // Zero-magnitude corner, contributes no vertex.
                continue;
            }
            let bearing = corner.y.atan2(corner.x);
            let geo = geodesic_destination(pose.position, distance, bearing);
            ring.push(self.projection.forward(geo)?);
        }

        if ring.len() < 3 {
            return Ok(Footprint::degenerate());
        }
        Ok(Footprint {
            polygon: Polygon::new(ring),
        })
    }

    /// Project the camera position itself into the working CRS.
    pub fn project_position(&self, pose: &CameraPose) -> Result<Point> {
        self.projection.forward(pose.position)
    }
}
