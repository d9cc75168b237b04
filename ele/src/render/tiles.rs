//! Slippy-map tile coordinates.

use std::f64::consts::PI;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{EleError, Result};
use crate::tile::BoundingBox;

/// Width and height of a rendered tile in pixels.
pub const TILE_SIZE: u32 = 256;

/// Deepest zoom level supported.
pub const MAX_ZOOM: u8 = 30;

/// OSM-style tile coordinates (z, x, y).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    /// Zoom level.
    pub z: u8,
    /// X coordinate (column, 0 at 180°W, increases eastward).
    pub x: u32,
    /// Y coordinate (row, 0 at ~85.05°N, increases southward).
    pub y: u32,
}

impl TileCoord {
    /// Create a tile coordinate, checking it exists at its zoom level.
    ///
    /// # Errors
    ///
    /// Returns [`EleError::InvalidTile`] if `z > MAX_ZOOM` or `x`/`y` is not
    /// below `2^z`.
    pub fn new(z: u8, x: u32, y: u32) -> Result<Self> {
        if z > MAX_ZOOM {
            return Err(EleError::InvalidTile { z, x, y });
        }
        let max_coord = 1u32 << z;
        if x >= max_coord || y >= max_coord {
            return Err(EleError::InvalidTile { z, x, y });
        }
        Ok(Self { z, x, y })
    }

    /// The tile containing a point at zoom `z`.
    ///
    /// Latitude is clamped to the Web Mercator limit of ±85.0511°.
    pub fn from_lat_lon(lat: f64, lon: f64, z: u8) -> Result<Self> {
        if z > MAX_ZOOM || !lat.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(EleError::InvalidCoordinate { lat, lon });
        }

        let lat_clamped = lat.clamp(-85.0511, 85.0511);
        let n = (1u64 << z) as f64;

        let x = ((lon + 180.0) / 360.0 * n).floor() as u32;
        let lat_rad = lat_clamped.to_radians();
        let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n).floor() as u32;

        // Clamp to valid range (handles edge cases at exactly ±180°)
        let max_coord = (1u32 << z) - 1;
        Ok(Self {
            z,
            x: x.min(max_coord),
            y: y.min(max_coord),
        })
    }

    /// The four tiles at `z + 1` covering this one, in the order
    /// `(2x, 2y)`, `(2x+1, 2y)`, `(2x, 2y+1)`, `(2x+1, 2y+1)`.
    pub fn children(&self) -> [TileCoord; 4] {
        let (z, x, y) = (self.z + 1, self.x * 2, self.y * 2);
        [
            TileCoord { z, x, y },
            TileCoord { z, x: x + 1, y },
            TileCoord { z, x, y: y + 1 },
            TileCoord { z, x: x + 1, y: y + 1 },
        ]
    }

    /// Geographic bounds of the tile.
    pub fn bounds(&self) -> BoundingBox {
        let (north, west) = tile_to_lat_lon(self.x as f64, self.y as f64, self.z);
        let (south, east) = tile_to_lat_lon((self.x + 1) as f64, (self.y + 1) as f64, self.z);
        BoundingBox::new(north, south, east, west)
    }

    /// Output file for this tile under `root`: `root/z/x/y.png`.
    pub fn path(&self, root: &Path) -> PathBuf {
        root.join(self.z.to_string())
            .join(self.x.to_string())
            .join(format!("{}.png", self.y))
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Convert a fractional tile position to `(lat, lon)`.
///
/// `x` and `y` may carry a fractional part: `x + px / 256` addresses pixel
/// column `px` of tile `x`.
pub fn tile_to_lat_lon(x: f64, y: f64, z: u8) -> (f64, f64) {
    let n = (1u64 << z) as f64;
    let lon = x / n * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * y / n)).sinh().atan().to_degrees();
    (lat, lon)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates_range() {
        assert!(TileCoord::new(0, 0, 0).is_ok());
        assert!(TileCoord::new(12, 4095, 4095).is_ok());
        assert!(matches!(
            TileCoord::new(12, 4096, 0),
            Err(EleError::InvalidTile { z: 12, x: 4096, y: 0 })
        ));
        assert!(TileCoord::new(1, 0, 2).is_err());
        assert!(TileCoord::new(31, 0, 0).is_err());
    }

    #[test]
    fn test_children_order() {
        let parent = TileCoord::new(12, 2035, 1305).unwrap();
        let children = parent.children();

        assert_eq!(children[0], TileCoord::new(13, 4070, 2610).unwrap());
        assert_eq!(children[1], TileCoord::new(13, 4071, 2610).unwrap());
        assert_eq!(children[2], TileCoord::new(13, 4070, 2611).unwrap());
        assert_eq!(children[3], TileCoord::new(13, 4071, 2611).unwrap());
    }

    #[test]
    fn test_tile_to_lat_lon_corners() {
        let (lat, lon) = tile_to_lat_lon(0.0, 0.0, 0);
        assert!((lat - 85.051_128_779_806_6).abs() < 1e-9);
        assert_eq!(lon, -180.0);

        let (lat, lon) = tile_to_lat_lon(0.5, 0.5, 0);
        assert!(lat.abs() < 1e-12);
        assert_eq!(lon, 0.0);
    }

    #[test]
    fn test_from_lat_lon_roundtrip() {
        // Roseberry Topping, North Yorkshire
        let coord = TileCoord::from_lat_lon(54.5, -1.1, 12).unwrap();
        assert_eq!((coord.x, coord.y), (2035, 1305));

        let bounds = coord.bounds();
        assert!(bounds.contains(54.5, -1.1));
        assert!(bounds.north > bounds.south);
        assert!(bounds.east > bounds.west);
    }

    #[test]
    fn test_from_lat_lon_edges() {
        let coord = TileCoord::from_lat_lon(89.0, 180.0, 3).unwrap();
        assert_eq!((coord.x, coord.y), (7, 0));
        assert!(TileCoord::from_lat_lon(0.0, 181.0, 3).is_err());
    }

    #[test]
    fn test_path_layout() {
        let coord = TileCoord::new(12, 2035, 1305).unwrap();
        assert_eq!(
            coord.path(Path::new("/tiles")),
            PathBuf::from("/tiles/12/2035/1305.png")
        );
        assert_eq!(coord.to_string(), "12/2035/1305");
    }
}
