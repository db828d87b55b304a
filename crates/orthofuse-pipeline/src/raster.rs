//! Decoded reference raster: a greyscale pixel grid plus its pixel-to-world
//! mapping. Decoding happens outside the pipeline (the binary uses the
//! `image` crate); the tiler only consumes extent, resolution and pixel
//! values for the black/white filter.

use image::DynamicImage;
use orthofuse_core::FusionError;
use orthofuse_core::geom::{Point, Rect};

/// North-up affine pixel-to-world mapping (no rotation/skew terms).
/// `origin` is the world coordinate of the raster's top-left corner;
/// `pixel_size` is in CRS meters per pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_size: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_size: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_size,
        }
    }

    /// World coordinate of a pixel corner (column/row in pixel units).
    pub fn pixel_to_world(&self, col: f64, row: f64) -> Point {
        Point::new(
            self.origin_x + col * self.pixel_size,
            self.origin_y - row * self.pixel_size,
        )
    }

    /// World bounds of a pixel window.
    pub fn window_bounds(&self, window: &PixelWindow) -> Rect {
        let tl = self.pixel_to_world(window.col_off as f64, window.row_off as f64);
        let br = self.pixel_to_world(
            (window.col_off + window.width) as f64,
            (window.row_off + window.height) as f64,
        );
        Rect::new(tl.x, br.y, br.x, tl.y)
    }

    /// Parse an ESRI world file (six lines: x-scale, two skew terms, negative
    /// y-scale, then the center of the top-left pixel). Skewed or
    /// non-square-pixel rasters are not supported.
    pub fn from_world_file(contents: &str) -> Result<Self, FusionError> {
        let values: Vec<f64> = contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| l.parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|e| FusionError::Configuration(format!("malformed world file: {e}")))?;
        if values.len() != 6 {
            return Err(FusionError::Configuration(format!(
                "world file must have 6 values, got {}",
                values.len()
            )));
        }
        let [a, d, b, e, c, f] = [
            values[0], values[1], values[2], values[3], values[4], values[5],
        ];
        if d != 0.0 || b != 0.0 {
            return Err(FusionError::Configuration(
                "rotated/skewed rasters are not supported".into(),
            ));
        }
        if a <= 0.0 || e >= 0.0 || (a + e).abs() > 1e-9 {
            return Err(FusionError::Configuration(format!(
                "expected square north-up pixels, got scales ({a}, {e})"
            )));
        }
        // World files reference the center of the top-left pixel.
        Ok(Self::new(c - a / 2.0, f - e / 2.0, a))
    }
}

/// Pixel window of one candidate patch, clipped to the raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub col_off: u32,
    pub row_off: u32,
    pub width: u32,
    pub height: u32,
}

/// Greyscale raster grid with georeferencing.
#[derive(Debug, Clone)]
pub struct RasterGrid {
    width: u32,
    height: u32,
    grey: Vec<u8>,
    transform: GeoTransform,
}

impl RasterGrid {
    pub fn new(
        width: u32,
        height: u32,
        grey: Vec<u8>,
        transform: GeoTransform,
    ) -> Result<Self, FusionError> {
        if width == 0 || height == 0 {
            return Err(FusionError::Configuration(
                "raster must have a nonzero extent".into(),
            ));
        }
        if grey.len() != (width as usize) * (height as usize) {
            return Err(FusionError::Configuration(format!(
                "raster buffer length {} does not match {}x{}",
                grey.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            grey,
            transform,
        })
    }

    /// Build the grid from a decoded image, averaging the color channels.
    /// Plain channel mean, not a luma weighting: the invalid-pixel filter
    /// looks for exact 0/255 fills.
    pub fn from_image(image: &DynamicImage, transform: GeoTransform) -> Result<Self, FusionError> {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        let grey = rgb
            .pixels()
            .map(|p| {
                let sum = p.0[0] as u16 + p.0[1] as u16 + p.0[2] as u16;
                (sum / 3) as u8
            })
            .collect();
        Self::new(width, height, grey, transform)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn pixel(&self, col: u32, row: u32) -> u8 {
        self.grey[row as usize * self.width as usize + col as usize]
    }

    /// Fractions of pure-black and pure-white pixels inside a window,
    /// relative to the window's actual pixel count. The window is clamped to
    /// the raster extent; a window entirely outside reports zero fractions.
    pub fn black_white_fractions(&self, window: &PixelWindow) -> (f64, f64) {
        let col_end = window.col_off.saturating_add(window.width).min(self.width);
        let row_end = window.row_off.saturating_add(window.height).min(self.height);
        let col_off = window.col_off.min(col_end);
        let row_off = window.row_off.min(row_end);
        let total = ((col_end - col_off) as usize) * ((row_end - row_off) as usize);
        if total == 0 {
            return (0.0, 0.0);
        }

        let mut black = 0usize;
        let mut white = 0usize;
        for row in row_off..row_end {
            for col in col_off..col_end {
                match self.pixel(col, row) {
                    0 => black += 1,
                    255 => white += 1,
                    _ => {}
                }
            }
        }
        (black as f64 / total as f64, white as f64 / total as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn world_file_round_trip() {
        let gt = GeoTransform::from_world_file("0.03\n0.0\n0.0\n-0.03\n322000.015\n7658000.0\n")
            .unwrap();
        assert_relative_eq!(gt.pixel_size, 0.03);
        assert_relative_eq!(gt.origin_x, 322000.0);
        assert_relative_eq!(gt.origin_y, 7658000.015);
    }

    #[test]
    fn world_file_rejects_skew() {
        assert!(GeoTransform::from_world_file("0.03\n0.1\n0.0\n-0.03\n0.0\n0.0\n").is_err());
        assert!(GeoTransform::from_world_file("0.03\n0.0\n0.0\n-0.05\n0.0\n0.0\n").is_err());
        assert!(GeoTransform::from_world_file("0.03\n0.0\n-0.03\n").is_err());
    }

    #[test]
    fn window_bounds_follow_north_up_convention() {
        let gt = GeoTransform::new(1000.0, 2000.0, 0.5);
        let window = PixelWindow {
            col_off: 10,
            row_off: 20,
            width: 4,
            height: 2,
        };
        let bounds = gt.window_bounds(&window);
        assert_relative_eq!(bounds.min_x, 1005.0);
        assert_relative_eq!(bounds.max_x, 1007.0);
        assert_relative_eq!(bounds.max_y, 1990.0);
        assert_relative_eq!(bounds.min_y, 1989.0);
    }

    #[test]
    fn black_white_fractions_count_exact_fills() {
        let gt = GeoTransform::new(0.0, 0.0, 1.0);
        let mut grey = vec![128u8; 16];
        grey[0] = 0;
        grey[1] = 0;
        grey[2] = 255;
        let raster = RasterGrid::new(4, 4, grey, gt).unwrap();
        let window = PixelWindow {
            col_off: 0,
            row_off: 0,
            width: 4,
            height: 4,
        };
        let (black, white) = raster.black_white_fractions(&window);
        assert_relative_eq!(black, 2.0 / 16.0);
        assert_relative_eq!(white, 1.0 / 16.0);
    }

    #[test]
    fn oversized_window_is_clamped_to_the_raster() {
        let gt = GeoTransform::new(0.0, 0.0, 1.0);
        // Right half black, left half grey.
        let mut grey = vec![128u8; 16];
        for row in 0..4 {
            grey[row * 4 + 2] = 0;
            grey[row * 4 + 3] = 0;
        }
        let raster = RasterGrid::new(4, 4, grey, gt).unwrap();
        let window = PixelWindow {
            col_off: 2,
            row_off: 0,
            width: 10,
            height: 10,
        };
        // Only the 2x4 in-raster part counts, and it is all black.
        let (black, white) = raster.black_white_fractions(&window);
        assert_relative_eq!(black, 1.0);
        assert_relative_eq!(white, 0.0);

        let outside = PixelWindow {
            col_off: 40,
            row_off: 40,
            width: 4,
            height: 4,
        };
        assert_eq!(raster.black_white_fractions(&outside), (0.0, 0.0));
    }

    #[test]
    fn buffer_length_mismatch_is_rejected() {
        let gt = GeoTransform::new(0.0, 0.0, 1.0);
        assert!(RasterGrid::new(4, 4, vec![0u8; 15], gt).is_err());
    }
}
