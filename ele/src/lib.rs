//! # ele - Elevation Tile Library
//!
//! Elevation lookup over a catalog of georeferenced raster tiles, with a
//! bounded cache of open file handles and a slippy-map pyramid renderer.
//!
//! ## Features
//!
//! - **Catalog**: Tiles are listed in a plain-text manifest (or indexed from a
//!   directory) and located by bounding box
//! - **Bounded**: At most `max_open` raster files are open at once, with LRU or
//!   random eviction
//! - **Formats**: SRTM `.hgt` / raw big-endian 16-bit grids (memory-mapped) and
//!   single-band GeoTIFFs
//! - **Sampling**: Nearest-neighbour or bilinear, clamped at tile edges
//! - **Profiles**: Elevations and great-circle distances along a route
//! - **Rendering**: 256×256 PNG map tiles written as `z/x/y.png`, optionally in
//!   parallel
//!
//! ## Quick Start
//!
//! ```ignore
//! use ele::{ElevationService, SampleMode};
//!
//! let service = ElevationService::builder("/data/dem/tiles.txt")
//!     .max_open_handles(10)
//!     .build()?;
//!
//! let elevation = service.sample(54.5, -1.1, SampleMode::Bilinear)?;
//! println!("Elevation: {}m", elevation);
//! ```
//!
//! ## Manifest Format
//!
//! One tile per line, whitespace separated:
//!
//! ```text
//! # path  north south east west lat_pixel lon_pixel width height
//! N54W002.hgt 55.000416666666666 53.999583333333334 -0.999583333333333 -2.000416666666667 -0.000833333333333 0.000833333333333 1201 1201
//! ```
//!
//! Relative paths are resolved against the manifest's directory. Blank lines
//! and lines starting with `#` are ignored.
//!
//! ## No-Data Values
//!
//! Raster values are returned exactly as stored. SRTM voids come back as
//! [`VOID_VALUE`] (-32768); the renderer draws them as background.

pub mod cache;
pub mod catalog;
pub mod error;
pub mod profile;
pub mod raster;
pub mod render;
pub mod sampler;
pub mod service;
pub mod tile;

#[cfg(feature = "geojson")]
pub mod geojson;

// Re-export main types at crate root for convenience
pub use cache::{
    CacheStats, EvictionKind, EvictionPolicy, HandleCache, LeastRecentlyUsed, PreloadOutcome,
    RandomEviction, DEFAULT_MAX_OPEN,
};
pub use catalog::{Catalog, Locator};
pub use error::{EleError, Result};
pub use profile::{elevation_profile, great_circle_distance, ProfileSample, DEFAULT_SAMPLES_PER_SEGMENT};
pub use raster::{describe_raster, index_directory, FileOpener, Raster, RasterOpener, VOID_VALUE};
pub use render::{ColorRamp, RenderConfig, RenderReport, Renderer, TileCoord, TileOutcome};
pub use sampler::{bilinear, sample_raster, SampleMode};
pub use service::{ElevationService, ElevationServiceBuilder, PreloadStats};
pub use tile::{BoundingBox, PixelPosition, TileDescriptor, TileId};
