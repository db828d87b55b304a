use std::fs::{self, File};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use log::info;
use orthofuse_core::ClassSchema;
use orthofuse_pipeline::{
    BoundaryPolygon, GeoTransform, PipelineConfig, RasterGrid, SurveyPipeline, TilerConfig,
    read_observations, write_annotations, write_unlabeled,
};

/// Fuse classified survey frames onto orthophoto ground patches.
#[derive(Debug, Parser)]
#[command(name = "orthofuse", version, about)]
struct Args {
    /// Orthophoto raster (any format the `image` crate decodes).
    #[arg(long)]
    raster: PathBuf,

    /// ESRI world file georeferencing the raster.
    #[arg(long)]
    world_file: PathBuf,

    /// CSV table of classified frames (navigation + per-class confidences).
    #[arg(long)]
    frames: PathBuf,

    /// GeoJSON survey boundary, in the working CRS.
    #[arg(long)]
    boundary: PathBuf,

    /// JSON class schema; defaults to the built-in reef survey schema.
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Directory for the output tables.
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// EPSG code of the working CRS (a WGS84 UTM zone).
    #[arg(long, default_value_t = 32740)]
    crs: u32,

    /// Ground patch edge length in meters.
    #[arg(long, default_value_t = 1.5)]
    tile_size: f64,

    /// Raster ground sampling distance in cm per pixel.
    #[arg(long, default_value_t = 3.0)]
    gsd: f64,

    /// Camera field of view across track, in degrees.
    #[arg(long, default_value_t = 94.4)]
    fov_x: f64,

    /// Camera field of view along track, in degrees.
    #[arg(long, default_value_t = 122.6)]
    fov_y: f64,

    /// Fractional horizontal patch overlap in [0, 1).
    #[arg(long, default_value_t = 0.0)]
    h_shift: f64,

    /// Fractional vertical patch overlap in [0, 1).
    #[arg(long, default_value_t = 0.0)]
    v_shift: f64,

    /// Discard patches with more than this percentage of pure-black pixels.
    #[arg(long, default_value_t = 5.0)]
    black_threshold: f64,

    /// Discard patches with more than this percentage of pure-white pixels.
    #[arg(long, default_value_t = 5.0)]
    white_threshold: f64,

    /// Minimum union footprint coverage before a patch label is trusted.
    #[arg(long, default_value_t = 1.0)]
    coverage_threshold: f64,

    /// Which annotation tables to write.
    #[arg(long, value_enum, default_value_t = Mode::Both)]
    mode: Mode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Probs,
    Binary,
    Both,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let schema = match &args.schema {
        Some(path) => {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("reading schema {}", path.display()))?;
            serde_json::from_str::<ClassSchema>(&contents)
                .with_context(|| format!("parsing schema {}", path.display()))?
        }
        None => ClassSchema::coral_reef(),
    };

    let config = PipelineConfig {
        crs_epsg: args.crs,
        fov_x_deg: args.fov_x,
        fov_y_deg: args.fov_y,
        tiler: TilerConfig {
            tile_size_meters: args.tile_size,
            gsd_cm: args.gsd,
            h_shift: args.h_shift,
            v_shift: args.v_shift,
            black_threshold_pct: args.black_threshold,
            white_threshold_pct: args.white_threshold,
        },
        footprint_coverage_threshold: args.coverage_threshold,
        ..PipelineConfig::default()
    };
    let pipeline = SurveyPipeline::new(config, schema)?;

    let transform = GeoTransform::from_world_file(
        &fs::read_to_string(&args.world_file)
            .with_context(|| format!("reading world file {}", args.world_file.display()))?,
    )?;
    let image = image::open(&args.raster)
        .with_context(|| format!("decoding raster {}", args.raster.display()))?;
    let raster = RasterGrid::from_image(&image, transform)?;
    info!(
        "loaded {}x{} px raster at {} m/px",
        raster.width(),
        raster.height(),
        transform.pixel_size
    );

    let boundary = BoundaryPolygon::from_geojson_str(
        &fs::read_to_string(&args.boundary)
            .with_context(|| format!("reading boundary {}", args.boundary.display()))?,
    )?;

    let frames_file = File::open(&args.frames)
        .with_context(|| format!("opening frame table {}", args.frames.display()))?;
    let table = read_observations(frames_file, pipeline.engine().schema())?;

    let outcome = pipeline.run(&raster, &boundary, &table)?;

    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))?;
    let names: Vec<&str> = outcome.output_names.iter().map(String::as_str).collect();

    if args.mode != Mode::Binary {
        let path = args.output_dir.join("annotations_probs.csv");
        write_annotations(File::create(&path)?, &names, &outcome.probabilistic)?;
        info!("wrote {}", path.display());
    }
    if args.mode != Mode::Probs {
        let path = args.output_dir.join("annotations_binary.csv");
        write_annotations(File::create(&path)?, &names, &outcome.binary)?;
        info!("wrote {}", path.display());
    }
    let path = args.output_dir.join("unlabeled_geolocations.csv");
    write_unlabeled(File::create(&path)?, &outcome.unlabeled)?;
    info!("wrote {}", path.display());

    Ok(())
}
