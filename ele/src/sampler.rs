//! Pixel sampling.
//!
//! Turns a [`PixelPosition`] into a value, either the raw pixel (nearest) or a
//! bilinear blend of the 2×2 window whose top-left pixel is the position.

use std::fmt;
use std::str::FromStr;

use crate::error::{EleError, Result};
use crate::raster::Raster;
use crate::tile::PixelPosition;

/// How a point's value is derived from the surrounding pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleMode {
    /// Value of the pixel containing the point.
    #[default]
    Nearest,
    /// Bilinear interpolation over a 2×2 window.
    Bilinear,
}

impl FromStr for SampleMode {
    type Err = EleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" => Ok(SampleMode::Nearest),
            "bilinear" => Ok(SampleMode::Bilinear),
            _ => Err(EleError::InvalidArgument(format!(
                "unknown sample mode {:?} (expected nearest or bilinear)",
                s
            ))),
        }
    }
}

impl fmt::Display for SampleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleMode::Nearest => write!(f, "nearest"),
            SampleMode::Bilinear => write!(f, "bilinear"),
        }
    }
}

/// Bilinear interpolation between four corner values.
///
/// `a` is the fractional offset down the rows (from `tl` towards `bl`) and `b`
/// the fractional offset across the columns (from `tl` towards `tr`), both in
/// `[0, 1]`.
///
/// ```
/// use ele::bilinear;
///
/// assert_eq!(bilinear(10.0, 20.0, 30.0, 40.0, 0.5, 0.5), 25.0);
/// assert_eq!(bilinear(10.0, 20.0, 30.0, 40.0, 1.0, 0.0), 30.0);
/// ```
pub fn bilinear(tl: f64, tr: f64, bl: f64, br: f64, a: f64, b: f64) -> f64 {
    tl + (bl - tl) * a + (tr - tl) * b + (tl - bl - tr + br) * a * b
}

/// Sample a raster at a pixel position.
///
/// No-data sentinels are returned unchanged; with bilinear sampling they are
/// blended like any other value.
pub fn sample_raster(raster: &dyn Raster, pos: PixelPosition, mode: SampleMode) -> Result<f64> {
    match mode {
        SampleMode::Nearest => raster.sample(pos.row, pos.col),
        SampleMode::Bilinear => {
            let (width, height) = raster.dimensions();
            // At the last row/column the window folds back onto the edge
            let row1 = (pos.row + 1).min(height.saturating_sub(1));
            let col1 = (pos.col + 1).min(width.saturating_sub(1));

            let tl = raster.sample(pos.row, pos.col)?;
            let tr = raster.sample(pos.row, col1)?;
            let bl = raster.sample(row1, pos.col)?;
            let br = raster.sample(row1, col1)?;

            Ok(bilinear(tl, tr, bl, br, pos.row_frac, pos.col_frac))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 3×2 grid: row-major values 10, 20, 30 / 40, 50, 60.
    struct Grid;

    impl Raster for Grid {
        fn dimensions(&self) -> (usize, usize) {
            (3, 2)
        }

        fn sample(&self, row: usize, col: usize) -> Result<f64> {
            if row >= 2 || col >= 3 {
                return Err(EleError::RasterRead {
                    path: "grid".into(),
                    reason: "outside grid".into(),
                });
            }
            Ok(((row * 3 + col + 1) * 10) as f64)
        }
    }

    fn pos(row: usize, col: usize, row_frac: f64, col_frac: f64) -> PixelPosition {
        PixelPosition {
            row,
            col,
            row_frac,
            col_frac,
        }
    }

    #[test]
    fn test_bilinear_centre() {
        assert_eq!(bilinear(10.0, 20.0, 30.0, 40.0, 0.5, 0.5), 25.0);
    }

    #[test]
    fn test_bilinear_corners() {
        let (tl, tr, bl, br) = (10.0, 20.0, 30.0, 40.0);
        assert_eq!(bilinear(tl, tr, bl, br, 0.0, 0.0), tl);
        assert_eq!(bilinear(tl, tr, bl, br, 0.0, 1.0), tr);
        assert_eq!(bilinear(tl, tr, bl, br, 1.0, 0.0), bl);
        assert_eq!(bilinear(tl, tr, bl, br, 1.0, 1.0), br);
    }

    #[test]
    fn test_nearest_returns_raw_pixel() {
        let value = sample_raster(&Grid, pos(1, 2, 0.9, 0.9), SampleMode::Nearest).unwrap();
        assert_eq!(value, 60.0);
    }

    #[test]
    fn test_bilinear_interior() {
        // Window 10 20 / 40 50, a quarter down and half across
        let value = sample_raster(&Grid, pos(0, 0, 0.25, 0.5), SampleMode::Bilinear).unwrap();
        assert!((value - 22.5).abs() < 1e-9);
    }

    #[test]
    fn test_bilinear_clamps_at_edges() {
        // Last column: window duplicates column 2
        let value = sample_raster(&Grid, pos(0, 2, 0.5, 0.5), SampleMode::Bilinear).unwrap();
        assert!((value - 45.0).abs() < 1e-9);

        // Last row and column: single pixel
        let value = sample_raster(&Grid, pos(1, 2, 0.5, 0.5), SampleMode::Bilinear).unwrap();
        assert_eq!(value, 60.0);
    }

    #[test]
    fn test_sample_mode_parse() {
        assert_eq!("Bilinear".parse::<SampleMode>().unwrap(), SampleMode::Bilinear);
        assert_eq!("nearest".parse::<SampleMode>().unwrap(), SampleMode::Nearest);
        assert!("cubic".parse::<SampleMode>().is_err());
    }
}
