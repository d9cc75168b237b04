//! Raster tile descriptors.
//!
//! A [`TileDescriptor`] is the fixed-shape record for one raster file in the
//! catalog: where the file lives, which geographic rectangle it covers, and
//! how that rectangle is divided into pixels. Descriptors are validated when
//! constructed and immutable afterwards.

use std::path::{Path, PathBuf};

use crate::error::{EleError, Result};

/// A geographic bounding box in decimal degrees (WGS84).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Northern boundary latitude.
    pub north: f64,
    /// Southern boundary latitude.
    pub south: f64,
    /// Eastern boundary longitude.
    pub east: f64,
    /// Western boundary longitude.
    pub west: f64,
}

impl BoundingBox {
    /// Create a bounding box from its edges, in manifest order (N, S, E, W).
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Self {
        Self {
            north,
            south,
            east,
            west,
        }
    }

    /// Create a bounding box from `min_lat, min_lon, max_lat, max_lon`.
    pub fn from_min_max(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        Self::new(max_lat, min_lat, max_lon, min_lon)
    }

    /// Check whether the point lies inside the box, edges included.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.south && lat <= self.north && lon >= self.west && lon <= self.east
    }

    /// Check whether two boxes share any area.
    ///
    /// Boxes that only touch along an edge do not intersect.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.south < other.north
            && self.north > other.south
            && self.west < other.east
            && self.east > other.west
    }
}

/// Position of a tile within its catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId(pub usize);

/// Pixel coordinates of a geographic point inside a tile.
///
/// `row`/`col` are always within the raster extent. The fractional parts are
/// the point's offset from the top-left corner of that pixel, in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelPosition {
    pub row: usize,
    pub col: usize,
    pub row_frac: f64,
    pub col_frac: f64,
}

/// Geometry and backing file of one raster tile.
///
/// # Example
///
/// ```
/// use ele::{BoundingBox, TileDescriptor};
///
/// let tile = TileDescriptor::new(
///     "srtm_36_02.hgt",
///     BoundingBox::new(55.0, 54.0, 0.0, -1.0),
///     -0.01,
///     0.01,
///     100,
///     100,
/// )?;
/// let pos = tile.pixel_position(54.5, -0.5);
/// assert_eq!((pos.row, pos.col), (50, 50));
/// # Ok::<(), ele::EleError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TileDescriptor {
    path: PathBuf,
    bounds: BoundingBox,
    /// Degrees of latitude per row, negative for north-up rasters.
    lat_pixel: f64,
    /// Degrees of longitude per column.
    lon_pixel: f64,
    width: usize,
    height: usize,
}

impl TileDescriptor {
    /// Build a descriptor, checking that the bounding box, pixel size and
    /// extent agree with each other.
    ///
    /// # Errors
    ///
    /// Returns [`EleError::InvalidDescriptor`] if:
    /// - the extent is empty or a pixel size is zero or not finite
    /// - the box is not oriented with `north > south` and `east > west`
    /// - `south != north + height * lat_pixel` or
    ///   `east != west + width * lon_pixel` by more than half a pixel
    pub fn new<P: AsRef<Path>>(
        path: P,
        bounds: BoundingBox,
        lat_pixel: f64,
        lon_pixel: f64,
        width: usize,
        height: usize,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let invalid = |reason: String| {
            Err(EleError::InvalidDescriptor(format!(
                "{}: {}",
                path.display(),
                reason
            )))
        };

        if width == 0 || height == 0 {
            return invalid(format!("empty extent {}x{}", width, height));
        }
        if !lat_pixel.is_finite() || !lon_pixel.is_finite() || lat_pixel == 0.0 || lon_pixel == 0.0
        {
            return invalid(format!(
                "bad pixel size lat_pixel={}, lon_pixel={}",
                lat_pixel, lon_pixel
            ));
        }
        let BoundingBox {
            north,
            south,
            east,
            west,
        } = bounds;
        if !(north > south) || !(east > west) {
            return invalid(format!(
                "bounding box not oriented N>S, E>W (N={}, S={}, E={}, W={})",
                north, south, east, west
            ));
        }

        let expected_south = north + height as f64 * lat_pixel;
        let expected_east = west + width as f64 * lon_pixel;
        if (expected_south - south).abs() > lat_pixel.abs() / 2.0 {
            return invalid(format!(
                "south edge {} disagrees with N + height*lat_pixel = {}",
                south, expected_south
            ));
        }
        if (expected_east - east).abs() > lon_pixel.abs() / 2.0 {
            return invalid(format!(
                "east edge {} disagrees with W + width*lon_pixel = {}",
                east, expected_east
            ));
        }

        Ok(Self {
            path,
            bounds,
            lat_pixel,
            lon_pixel,
            width,
            height,
        })
    }

    /// Convert a geographic point into pixel coordinates.
    ///
    /// `row = floor((lat - N) / lat_pixel)`, `col = floor((lon - W) / lon_pixel)`,
    /// clamped into the raster so that floating-point overshoot at the tile
    /// edges lands on the edge pixel instead of failing.
    pub fn pixel_position(&self, lat: f64, lon: f64) -> PixelPosition {
        let y = (lat - self.bounds.north) / self.lat_pixel;
        let x = (lon - self.bounds.west) / self.lon_pixel;

        let row = clamp_index(y, self.height);
        let col = clamp_index(x, self.width);

        PixelPosition {
            row,
            col,
            row_frac: (y - row as f64).clamp(0.0, 1.0),
            col_frac: (x - col as f64).clamp(0.0, 1.0),
        }
    }

    /// Check whether the tile covers the point.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        self.bounds.contains(lat, lon)
    }

    /// Path of the backing raster file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Geographic bounds.
    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    /// Pixel size as `(lat_pixel, lon_pixel)` in signed degrees.
    pub fn pixel_size(&self) -> (f64, f64) {
        (self.lat_pixel, self.lon_pixel)
    }

    /// Raster extent in pixels as `(width, height)`.
    pub fn extent(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }
}

/// Floor a fractional pixel index and clamp it into `[0, extent - 1]`.
fn clamp_index(value: f64, extent: usize) -> usize {
    let floored = value.floor();
    if floored.is_nan() || floored <= 0.0 {
        0
    } else {
        (floored as usize).min(extent - 1)
    }
}
