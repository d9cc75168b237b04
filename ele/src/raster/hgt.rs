//! Memory-mapped raw elevation grids.
//!
//! SRTM `.hgt` files (and plain `.bil`/`.raw` grids with the same layout)
//! store row-major signed 16-bit big-endian samples, row 0 at the north edge.
//! There is no header: the extent comes from the tile descriptor, and for
//! `.hgt` files named like `N35E138.hgt` the geometry can be derived from the
//! name and file size.
//!
//! # SRTM Data Format
//!
//! - **SRTM1**: 3601×3601 samples, 1 arc-second (~30m) resolution
//! - **SRTM3**: 1201×1201 samples, 3 arc-second (~90m) resolution
//!
//! The special value -32768 indicates void (no data). It is returned as-is.

use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use super::{out_of_grid, Raster};
use crate::error::{EleError, Result};
use crate::tile::{BoundingBox, TileDescriptor};

/// Value indicating no data (void) in SRTM files
pub const VOID_VALUE: i16 = -32768;

/// A memory-mapped grid of big-endian `i16` samples.
pub struct HgtRaster {
    path: PathBuf,
    /// Memory-mapped file data
    data: Mmap,
    width: usize,
    height: usize,
}

impl HgtRaster {
    /// Map a raw grid file of the given extent.
    ///
    /// # Errors
    ///
    /// Returns [`EleError::RasterRead`] if the file cannot be opened or mapped,
    /// or if its size is not `width * height * 2` bytes.
    pub fn open<P: AsRef<Path>>(path: P, width: usize, height: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let read_error = |reason: String| EleError::RasterRead {
            path: path.clone(),
            reason,
        };

        let expected = width
            .checked_mul(height)
            .and_then(|samples| samples.checked_mul(2))
            .ok_or_else(|| read_error(format!("{}x{} grid size overflows", width, height)))?;

        let file = File::open(&path).map_err(|e| read_error(e.to_string()))?;

        // SAFETY: Memory mapping is safe as long as the file is not modified
        // while mapped. The raster store is read-only and the mapping is never
        // exposed outside this struct.
        let data = unsafe { Mmap::map(&file) }.map_err(|e| read_error(e.to_string()))?;

        if data.len() != expected {
            return Err(read_error(format!(
                "file is {} bytes, expected {} for a {}x{} grid",
                data.len(),
                expected,
                width,
                height
            )));
        }

        Ok(Self {
            path,
            data,
            width,
            height,
        })
    }
}

impl Raster for HgtRaster {
    fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn sample(&self, row: usize, col: usize) -> Result<f64> {
        if row >= self.height || col >= self.width {
            return Err(out_of_grid(&self.path, row, col, self.dimensions()));
        }

        // 2 bytes per sample, row-major order
        let offset = (row * self.width + col) * 2;
        let value = i16::from_be_bytes([self.data[offset], self.data[offset + 1]]);

        Ok(value as f64)
    }
}

/// Describe a `.hgt` file from its name and size.
///
/// The grid is square with `n` samples per side; sample centres sit on whole
/// degrees at the tile edges, so the pixel-is-area box extends half a pixel
/// past the 1°×1° cell on every side.
pub(crate) fn describe(path: &Path) -> Result<TileDescriptor> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let (lat, lon) = parse_cell_name(name).ok_or_else(|| {
        EleError::InvalidDescriptor(format!(
            "{}: expected a name like N35E138.hgt",
            path.display()
        ))
    })?;

    let size = std::fs::metadata(path)?.len() as usize;
    let samples = square_side(size).ok_or_else(|| EleError::RasterRead {
        path: path.to_path_buf(),
        reason: format!("{} bytes is not a square grid of 16-bit samples", size),
    })?;

    let step = 1.0 / (samples - 1) as f64;
    let north = lat as f64 + 1.0 + step / 2.0;
    let west = lon as f64 - step / 2.0;
    let bounds = BoundingBox::new(
        north,
        north - samples as f64 * step,
        west + samples as f64 * step,
        west,
    );

    TileDescriptor::new(path, bounds, -step, step, samples, samples)
}

/// Parse the south-west corner from a name like `N35E138.hgt` or `s12w077`.
pub(crate) fn parse_cell_name(name: &str) -> Option<(i32, i32)> {
    let stem = name.split('.').next()?;
    if stem.len() != 7 || !stem.is_ascii() {
        return None;
    }

    let lat_sign = match stem.as_bytes()[0].to_ascii_uppercase() {
        b'N' => 1,
        b'S' => -1,
        _ => return None,
    };
    let lon_sign = match stem.as_bytes()[3].to_ascii_uppercase() {
        b'E' => 1,
        b'W' => -1,
        _ => return None,
    };
    let lat: i32 = stem[1..3].parse().ok()?;
    let lon: i32 = stem[4..7].parse().ok()?;

    Some((lat * lat_sign, lon * lon_sign))
}

/// Side length of a square grid of 16-bit samples occupying `bytes`.
fn square_side(bytes: usize) -> Option<usize> {
    if bytes % 2 != 0 {
        return None;
    }
    let count = bytes / 2;
    let side = (count as f64).sqrt().round() as usize;
    (side >= 2 && side * side == count).then_some(side)
}
