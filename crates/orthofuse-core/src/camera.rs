//! Camera pose and view-frustum ground intersection.

use nalgebra::{Rotation3, Vector3};

use crate::crs::GeoPoint;
use crate::error::{FusionError, Result};
use crate::geom::Point;

/// Horizontal/vertical field of view of a frame, in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldOfView {
    pub x: f64,
    pub y: f64,
}

impl FieldOfView {
    pub fn from_degrees(fov_x_deg: f64, fov_y_deg: f64) -> Self {
        Self {
            x: fov_x_deg.to_radians(),
            y: fov_y_deg.to_radians(),
        }
    }
}

/// Pose of one observation frame. Immutable once read from the metadata
/// table; angles in radians, `distance_to_ground` is the altitude (aerial) or
/// depth (underwater) in meters, always positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub position: GeoPoint,
    pub distance_to_ground: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

/// Ground intersections of the four corner rays of the view pyramid, in a
/// camera-local planar frame (meters, origin at the nadir point).
///
/// Corner rays are tilted from the downward boresight by half the field of
/// view on each axis, rotated by roll/pitch/yaw, and intersected with the
/// ground plane at `distance`. Rays that never reach the ground plane (at or
/// above the horizon after rotation) contribute no corner, so fewer than four
/// points may come back; callers treat fewer than three as a degenerate
/// footprint.
pub fn ground_corners(
    fov: FieldOfView,
    distance: f64,
    roll: f64,
    pitch: f64,
    yaw: f64,
) -> Result<Vec<Point>> {
    if !(distance.is_finite() && distance > 0.0) {
        return Err(FusionError::Geometry(format!(
            "distance to ground must be positive, got {distance}"
        )));
    }
    for angle in [fov.x, fov.y] {
        if !(angle > 0.0 && angle < std::f64::consts::PI) {
            return Err(FusionError::Geometry(format!(
                "field of view must lie in (0, pi) radians, got {angle}"
            )));
        }
    }

    let tan_x = (fov.x / 2.0).tan();
    let tan_y = (fov.y / 2.0).tan();
    let attitude = Rotation3::from_euler_angles(roll, pitch, yaw);

    // Ring order around the frustum base.
    let signs = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
    let mut corners = Vec::with_capacity(4);
    for (sx, sy) in signs {
        let ray = attitude * Vector3::new(sx * tan_x, sy * tan_y, -1.0);
        if ray.z >= -1e-12 {
            // Above the horizon, no ground intersection.
            continue;
        }
        let scale = distance / -ray.z;
        corners.push(Point::new(ray.x * scale, ray.y * scale));
    }
    Ok(corners)
}
