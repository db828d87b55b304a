//! Ingests the per-frame navigation + classification table.
//!
//! Each row of the CSV is one classified camera frame: filename, WGS84
//! position, attitude, altitude above the seafloor, and one confidence column
//! per schema class. Pose columns that fail to parse drop the row (the survey
//! goes on without that frame); confidence columns that fail to parse become
//! NaN and are excluded per-class during fusion.

use std::collections::HashMap;
use std::io::Read;

use csv::ReaderBuilder;
use log::warn;
use orthofuse_core::{CameraPose, ClassSchema, FusionError, GeoPoint};

const REQUIRED_COLUMNS: [&str; 7] = [
    "FileName",
    "GPSLatitude",
    "GPSLongitude",
    "GPSAltitude",
    "GPSRoll",
    "GPSPitch",
    "GPSTrack",
];

/// One classified frame: the camera pose plus its per-class confidences in
/// schema order.
#[derive(Debug, Clone)]
pub struct FrameObservation {
    pub frame_id: String,
    pub pose: CameraPose,
    pub scores: Vec<f64>,
}

/// Ingestion result, with the dropped-row count for the run audit.
#[derive(Debug)]
pub struct ObservationTable {
    pub frames: Vec<FrameObservation>,
    pub rows_dropped: usize,
}

/// Read the frame table. The header must carry every navigation column and
/// one confidence column per schema class; a missing column is a
/// configuration error, a malformed row is not.
pub fn read_observations<R: Read>(
    reader: R,
    schema: &ClassSchema,
) -> Result<ObservationTable, FusionError> {
    let mut csv = ReaderBuilder::new().has_headers(true).from_reader(reader);

    let headers = csv
        .headers()
        .map_err(|e| FusionError::Data(format!("unreadable frame table header: {e}")))?;
    let index: HashMap<&str, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| (name.trim(), i))
        .collect();

    for column in REQUIRED_COLUMNS {
        if !index.contains_key(column) {
            return Err(FusionError::Configuration(format!(
                "frame table is missing column '{column}'"
            )));
        }
    }
    let mut score_cols = Vec::with_capacity(schema.classes.len());
    for name in schema.class_names() {
        let col = index.get(name).ok_or_else(|| {
            FusionError::Configuration(format!(
                "frame table has no confidence column for class '{name}'"
            ))
        })?;
        score_cols.push(*col);
    }

    let name_col = index["FileName"];
    let lat_col = index["GPSLatitude"];
    let lon_col = index["GPSLongitude"];
    let alt_col = index["GPSAltitude"];
    let roll_col = index["GPSRoll"];
    let pitch_col = index["GPSPitch"];
    let track_col = index["GPSTrack"];

    let mut frames = Vec::new();
    let mut rows_dropped = 0usize;

    for (line, record) in csv.records().enumerate() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                warn!("dropping frame table row {}: {e}", line + 2);
                rows_dropped += 1;
                continue;
            }
        };
        let field = |col: usize| record.get(col).unwrap_or("").trim();
        let number = |col: usize| field(col).parse::<f64>().ok().filter(|v| v.is_finite());

        let frame_id = field(name_col).to_string();
        let pose = (|| {
            Some(CameraPose {
                position: GeoPoint::new(number(lat_col)?, number(lon_col)?),
                distance_to_ground: number(alt_col)?,
                roll: number(roll_col)?.to_radians(),
                pitch: number(pitch_col)?.to_radians(),
                yaw: number(track_col)?.to_radians(),
            })
        })();
        let Some(pose) = pose else {
            warn!(
                "dropping frame '{}' (row {}): incomplete navigation data",
                frame_id,
                line + 2
            );
            rows_dropped += 1;
            continue;
        };

        let scores = score_cols
            .iter()
            .map(|&col| number(col).unwrap_or(f64::NAN))
            .collect();

        frames.push(FrameObservation {
            frame_id,
            pose,
            scores,
        });
    }

    Ok(ObservationTable {
        frames,
        rows_dropped,
    })
}
