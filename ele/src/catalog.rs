//! Tile catalog and spatial lookup.
//!
//! A [`Catalog`] is the ordered list of tile descriptors for one raster store.
//! It is built once, from a manifest or by inspecting raster headers, and is
//! read-only afterwards.
//!
//! # Manifest Format
//!
//! One tile per line, nine whitespace-separated fields:
//!
//! ```text
//! file north south east west lat_pixel lon_pixel width height
//! ```
//!
//! Relative file paths are resolved against the manifest's directory. Blank
//! lines and lines starting with `#` are ignored.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{EleError, Result};
use crate::raster::index_directory;
use crate::tile::{BoundingBox, TileDescriptor, TileId};

/// Finds the tile covering a point.
///
/// [`Catalog`] answers with a linear scan. Implement this trait to put an
/// acceleration structure in front of a catalog without touching callers.
pub trait Locator: Send + Sync {
    /// The tile covering the point, or `None` when no tile does.
    fn locate(&self, lat: f64, lon: f64) -> Option<TileId>;

    /// Look up a tile by id.
    fn descriptor(&self, id: TileId) -> Option<&TileDescriptor>;

    /// All tiles whose bounds share area with `bounds`, in catalog order.
    fn overlapping(&self, bounds: &BoundingBox) -> Vec<TileId>;

    /// Number of tiles known to the locator.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ordered, immutable list of tile descriptors.
///
/// When tile bounds overlap, the tile listed first wins: [`Locator::locate`]
/// returns the first tile in catalog order whose bounds contain the point.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tiles: Vec<TileDescriptor>,
}

impl Catalog {
    /// Create a catalog from descriptors, keeping their order.
    pub fn new(tiles: Vec<TileDescriptor>) -> Self {
        Self { tiles }
    }

    /// Load a catalog from a manifest file.
    ///
    /// # Errors
    ///
    /// Returns [`EleError::Io`] if the file cannot be read and
    /// [`EleError::InvalidManifest`] for the first malformed line.
    pub fn from_manifest<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        let catalog = parse_lines(&text, path, base_dir)?;

        debug!(manifest = %path.display(), tiles = catalog.len(), "Loaded catalog");
        Ok(catalog)
    }

    /// Parse manifest text, resolving relative paths against `base_dir`.
    ///
    /// Errors report `base_dir` as the manifest location.
    pub fn parse_manifest(text: &str, base_dir: &Path) -> Result<Self> {
        parse_lines(text, base_dir, base_dir)
    }

    /// Build a catalog from every supported raster in a directory.
    ///
    /// See [`index_directory`](crate::raster::index_directory).
    pub fn from_directory<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Ok(Self::new(index_directory(dir)?))
    }

    /// Render the catalog in manifest format, paths as stored.
    pub fn to_manifest(&self) -> String {
        self.format_manifest(None)
    }

    /// Write the catalog as a manifest file.
    ///
    /// Tile paths under the manifest's directory are written relative to it
    /// so the store can be moved as a whole.
    pub fn write_manifest<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let base_dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        std::fs::write(path, self.format_manifest(base_dir))?;
        Ok(())
    }

    fn format_manifest(&self, base_dir: Option<&Path>) -> String {
        let mut out = String::new();
        for tile in &self.tiles {
            let path = base_dir
                .and_then(|base| tile.path().strip_prefix(base).ok())
                .unwrap_or_else(|| tile.path());
            let bounds = tile.bounds();
            let (lat_pixel, lon_pixel) = tile.pixel_size();
            let _ = writeln!(
                out,
                "{} {:.15} {:.15} {:.15} {:.15} {:.15} {:.15} {} {}",
                path.display(),
                bounds.north,
                bounds.south,
                bounds.east,
                bounds.west,
                lat_pixel,
                lon_pixel,
                tile.width(),
                tile.height()
            );
        }
        out
    }

    /// Descriptors in catalog order.
    pub fn tiles(&self) -> &[TileDescriptor] {
        &self.tiles
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Iterate over `(id, descriptor)` pairs in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = (TileId, &TileDescriptor)> {
        self.tiles
            .iter()
            .enumerate()
            .map(|(i, tile)| (TileId(i), tile))
    }

    /// Smallest box enclosing every tile, or `None` for an empty catalog.
    pub fn coverage(&self) -> Option<BoundingBox> {
        self.tiles.iter().map(|t| t.bounds()).reduce(|acc, b| {
            BoundingBox::new(
                acc.north.max(b.north),
                acc.south.min(b.south),
                acc.east.max(b.east),
                acc.west.min(b.west),
            )
        })
    }
}

impl Locator for Catalog {
    fn locate(&self, lat: f64, lon: f64) -> Option<TileId> {
        self.tiles
            .iter()
            .position(|tile| tile.contains(lat, lon))
            .map(TileId)
    }

    fn descriptor(&self, id: TileId) -> Option<&TileDescriptor> {
        self.tiles.get(id.0)
    }

    fn overlapping(&self, bounds: &BoundingBox) -> Vec<TileId> {
        self.iter()
            .filter(|(_, tile)| tile.bounds().intersects(bounds))
            .map(|(id, _)| id)
            .collect()
    }

    fn len(&self) -> usize {
        self.tiles.len()
    }
}

fn parse_lines(text: &str, origin: &Path, base_dir: &Path) -> Result<Catalog> {
    let mut tiles = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let invalid = |reason: String| EleError::InvalidManifest {
            path: origin.to_path_buf(),
            line: index + 1,
            reason,
        };

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 9 {
            return Err(invalid(format!(
                "expected 9 fields (file N S E W lat_pixel lon_pixel width height), found {}",
                fields.len()
            )));
        }

        let number = |i: usize, name: &str| -> Result<f64> {
            fields[i]
                .parse::<f64>()
                .map_err(|_| invalid(format!("{} is not a number: {:?}", name, fields[i])))
        };
        let count = |i: usize, name: &str| -> Result<usize> {
            fields[i]
                .parse::<usize>()
                .map_err(|_| invalid(format!("{} is not a pixel count: {:?}", name, fields[i])))
        };

        let bounds = BoundingBox::new(
            number(1, "north")?,
            number(2, "south")?,
            number(3, "east")?,
            number(4, "west")?,
        );
        let lat_pixel = number(5, "lat_pixel")?;
        let lon_pixel = number(6, "lon_pixel")?;
        let width = count(7, "width")?;
        let height = count(8, "height")?;

        let file = PathBuf::from(fields[0]);
        let path = if file.is_relative() {
            base_dir.join(file)
        } else {
            file
        };

        let tile = TileDescriptor::new(path, bounds, lat_pixel, lon_pixel, width, height)
            .map_err(|e| invalid(e.to_string()))?;
        tiles.push(tile);
    }

    Ok(Catalog::new(tiles))
}
