//! Orthofuse Core
//!
//! Geometry and probability kernels for fusing overlapping, independently
//! classified survey frames onto orthophoto ground patches: camera frustum
//! projection, geodesic placement, the working UTM projection pair, planar
//! polygon operations and area-weighted evidence fusion. Pure computation,
//! no I/O.

pub mod camera;
pub mod crs;
pub mod error;
pub mod footprint;
pub mod fusion;
pub mod geom;

// Re-export commonly used types
pub use camera::{CameraPose, FieldOfView};
pub use crs::{GeoPoint, UtmProjection};
pub use error::{DropKind, FusionError};
pub use footprint::{Footprint, FootprintProjector};
pub use fusion::{ClassSchema, Evidence, FusionEngine, FusionMode};
pub use geom::{Point, Polygon, Rect};
