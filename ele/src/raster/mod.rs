//! Raster backends.
//!
//! Every backing file is read through the [`Raster`] trait: a 2D grid of
//! numeric samples addressed by `(row, col)`, row 0 at the north edge. The
//! handle cache obtains rasters from a [`RasterOpener`], which by default
//! picks a backend from the file extension:
//!
//! - `.hgt`, `.bil`, `.raw`: big-endian `i16` grids, memory-mapped ([`hgt`])
//! - `.tif`, `.tiff`: GeoTIFF, decoded on open ([`geotiff`])

pub mod geotiff;
pub mod hgt;

use std::path::{Path, PathBuf};

use crate::error::{EleError, Result};
use crate::tile::TileDescriptor;

pub use geotiff::GeoTiffRaster;
pub use hgt::{HgtRaster, VOID_VALUE};

/// An open raster file.
///
/// Implementations are read-only and shared between threads behind the
/// handle cache's lock.
pub trait Raster: Send + Sync {
    /// Extent in pixels as `(width, height)`.
    fn dimensions(&self) -> (usize, usize);

    /// Read the sample at `(row, col)`.
    ///
    /// Returns [`EleError::RasterRead`] when the position is outside the grid
    /// or the underlying data cannot be read.
    fn sample(&self, row: usize, col: usize) -> Result<f64>;
}

/// Opens the raster behind a tile descriptor.
pub trait RasterOpener: Send + Sync {
    fn open(&self, tile: &TileDescriptor) -> Result<Box<dyn Raster>>;
}

/// Supported on-disk raster formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    /// Raw big-endian signed 16-bit grid (SRTM `.hgt` layout).
    Hgt,
    /// GeoTIFF.
    GeoTiff,
}

impl RasterFormat {
    /// Detect the format from a file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "hgt" | "bil" | "raw" => Some(RasterFormat::Hgt),
            "tif" | "tiff" => Some(RasterFormat::GeoTiff),
            _ => None,
        }
    }
}

/// Default opener: dispatches on the file extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileOpener;

impl RasterOpener for FileOpener {
    fn open(&self, tile: &TileDescriptor) -> Result<Box<dyn Raster>> {
        let path = tile.path();
        let (width, height) = tile.extent();
        match RasterFormat::from_path(path) {
            Some(RasterFormat::Hgt) => Ok(Box::new(HgtRaster::open(path, width, height)?)),
            Some(RasterFormat::GeoTiff) => {
                Ok(Box::new(GeoTiffRaster::open(path, width, height)?))
            }
            None => Err(unsupported(path)),
        }
    }
}

/// Inspect a raster's header once and describe its geometry.
///
/// GeoTIFF geometry comes from the georeferencing tags; `.hgt` geometry comes
/// from the `N35E138.hgt` naming convention and the file size.
pub fn describe_raster<P: AsRef<Path>>(path: P) -> Result<TileDescriptor> {
    let path = path.as_ref();
    match RasterFormat::from_path(path) {
        Some(RasterFormat::Hgt) => hgt::describe(path),
        Some(RasterFormat::GeoTiff) => geotiff::describe(path),
        None => Err(unsupported(path)),
    }
}

/// Scan a directory for supported raster files and describe each one.
///
/// Files are visited in file-name order so that the resulting catalog order,
/// and with it the overlap tie-break, is reproducible.
pub fn index_directory<P: AsRef<Path>>(dir: P) -> Result<Vec<TileDescriptor>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir.as_ref())?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && RasterFormat::from_path(path).is_some())
        .collect();
    paths.sort();

    paths.iter().map(describe_raster).collect()
}

fn unsupported(path: &Path) -> EleError {
    EleError::RasterRead {
        path: path.to_path_buf(),
        reason: "unsupported raster format (expected .hgt, .bil, .raw, .tif or .tiff)".to_string(),
    }
}

/// Build the out-of-grid error shared by the backends.
pub(crate) fn out_of_grid(path: &Path, row: usize, col: usize, dims: (usize, usize)) -> EleError {
    EleError::RasterRead {
        path: path.to_path_buf(),
        reason: format!(
            "pixel ({}, {}) outside {}x{} grid",
            row, col, dims.0, dims.1
        ),
    }
}
