//! Elevation queries over a tile catalog.
//!
//! [`ElevationService`] is the context object tying a [`Locator`] (usually a
//! [`Catalog`]) to a [`HandleCache`]. It owns everything a query needs, so
//! several independent services can coexist in one process.
//!
//! ```ignore
//! use ele::{ElevationService, SampleMode};
//!
//! let service = ElevationService::builder("/data/dem/tiles.txt")
//!     .max_open_handles(10)
//!     .build()?;
//!
//! let elevation = service.sample(54.5, -0.5, SampleMode::Bilinear)?;
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info};

use crate::cache::{
    CacheStats, EvictionKind, EvictionPolicy, HandleCache, PreloadOutcome, DEFAULT_MAX_OPEN,
};
use crate::catalog::{Catalog, Locator};
use crate::error::{EleError, Result};
use crate::raster::{FileOpener, RasterOpener};
use crate::sampler::{sample_raster, SampleMode};
use crate::tile::{BoundingBox, TileDescriptor, TileId};

/// Statistics from a preload operation.
#[derive(Debug, Clone, Default)]
pub struct PreloadStats {
    /// Number of tiles that matched the bounding box filter.
    pub tiles_matched: u64,
    /// Number of tiles opened by the preload.
    pub tiles_loaded: u64,
    /// Number of tiles that were already open.
    pub tiles_already_open: u64,
    /// Number of tiles that failed to open.
    pub tiles_failed: u64,
    /// Number of matching tiles left closed because the cache was full.
    pub tiles_skipped: u64,
    /// Total elapsed time in milliseconds.
    pub elapsed_ms: u64,
}

/// Point elevation queries with bounded raster handle caching.
///
/// # Example
///
/// ```ignore
/// use ele::{ElevationService, SampleMode};
///
/// let service = ElevationService::builder("tiles.txt").build()?;
///
/// match service.try_sample(54.5, -0.5, SampleMode::Nearest)? {
///     Some(elevation) => println!("Elevation: {}m", elevation),
///     None => println!("No tile covers this point"),
/// }
///
/// let stats = service.cache_stats();
/// println!("Cache hit rate: {:.1}%", stats.hit_rate() * 100.0);
/// ```
pub struct ElevationService<L: Locator = Catalog> {
    locator: L,
    cache: HandleCache,
}

impl ElevationService<Catalog> {
    /// Create a builder for a catalog loaded from `manifest`.
    pub fn builder<P: AsRef<Path>>(manifest: P) -> ElevationServiceBuilder {
        ElevationServiceBuilder::new(manifest)
    }

    /// The tile catalog.
    pub fn catalog(&self) -> &Catalog {
        &self.locator
    }
}

impl<L: Locator> ElevationService<L> {
    /// Combine a locator with a handle cache.
    pub fn new(locator: L, cache: HandleCache) -> Self {
        Self { locator, cache }
    }

    /// Get the elevation at a point.
    ///
    /// # Errors
    ///
    /// - [`EleError::InvalidCoordinate`] if `lat` is outside ±90° or `lon`
    ///   outside ±180°
    /// - [`EleError::NotFound`] if no tile covers the point
    /// - [`EleError::RasterRead`] / [`EleError::TileUnavailable`] if the
    ///   covering tile cannot be read
    ///
    /// No-data values stored in the raster are returned as-is.
    pub fn sample(&self, lat: f64, lon: f64, mode: SampleMode) -> Result<f64> {
        validate_coordinates(lat, lon)?;

        let id = self
            .locator
            .locate(lat, lon)
            .ok_or(EleError::NotFound { lat, lon })?;
        let tile = self.tile(id)?;
        let pos = tile.pixel_position(lat, lon);

        self.cache
            .with_raster(id, tile, |raster| sample_raster(raster, pos, mode))
    }

    /// Like [`sample`](Self::sample), with "no tile covers the point" as `None`.
    pub fn try_sample(&self, lat: f64, lon: f64, mode: SampleMode) -> Result<Option<f64>> {
        match self.sample(lat, lon, mode) {
            Ok(v) => Ok(Some(v)),
            Err(EleError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Sample many points, one result per input coordinate.
    ///
    /// Points are grouped by tile so that each tile is acquired once per call.
    /// Other threads keep sampling, including from the same tile, while a
    /// group is read.
    /// Points outside every tile yield `None`; any other failure aborts the
    /// whole batch.
    pub fn sample_batch(&self, coords: &[(f64, f64)], mode: SampleMode) -> Result<Vec<Option<f64>>> {
        let mut results = vec![None; coords.len()];

        let mut groups: HashMap<TileId, Vec<usize>> = HashMap::new();
        for (i, &(lat, lon)) in coords.iter().enumerate() {
            validate_coordinates(lat, lon)?;
            if let Some(id) = self.locator.locate(lat, lon) {
                groups.entry(id).or_default().push(i);
            }
        }

        let mut groups: Vec<(TileId, Vec<usize>)> = groups.into_iter().collect();
        groups.sort_by_key(|(id, _)| *id);

        for (id, indices) in groups {
            let tile = self.tile(id)?;
            self.cache.with_raster(id, tile, |raster| {
                for &i in &indices {
                    let (lat, lon) = coords[i];
                    let pos = tile.pixel_position(lat, lon);
                    results[i] = Some(sample_raster(raster, pos, mode)?);
                }
                Ok(())
            })?;
        }

        Ok(results)
    }

    /// Open tiles ahead of time.
    ///
    /// With `None`, every tile is a candidate; otherwise only tiles overlapping
    /// at least one of the boxes. Tiles are opened in catalog order until the
    /// cache is full; preloading never evicts.
    pub fn preload(&self, bounds: Option<&[BoundingBox]>) -> PreloadStats {
        let start = Instant::now();
        let mut stats = PreloadStats::default();

        let everywhere = [BoundingBox::new(
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::INFINITY,
            f64::NEG_INFINITY,
        )];
        let boxes = bounds.unwrap_or(&everywhere[..]);

        let mut candidates: Vec<TileId> = boxes
            .iter()
            .flat_map(|b| self.locator.overlapping(b))
            .collect();
        candidates.sort();
        candidates.dedup();

        for id in candidates {
            stats.tiles_matched += 1;

            match self.tile(id).and_then(|tile| self.cache.preload(id, tile)) {
                Ok(PreloadOutcome::Opened) => stats.tiles_loaded += 1,
                Ok(PreloadOutcome::AlreadyOpen) => stats.tiles_already_open += 1,
                Ok(PreloadOutcome::NoRoom) => stats.tiles_skipped += 1,
                Err(_) => stats.tiles_failed += 1,
            }
        }

        stats.elapsed_ms = start.elapsed().as_millis() as u64;
        stats
    }

    /// The locator used to find tiles.
    pub fn locator(&self) -> &L {
        &self.locator
    }

    /// Get handle cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Maximum number of raster handles open at once.
    pub fn cache_capacity(&self) -> usize {
        self.cache.capacity()
    }

    /// Close every open raster handle.
    pub fn clear_cache(&self) -> Result<()> {
        self.cache.clear()
    }

    fn tile(&self, id: TileId) -> Result<&TileDescriptor> {
        self.locator.descriptor(id).ok_or_else(|| {
            EleError::InvariantViolation(format!("locator returned unknown tile {}", id.0))
        })
    }
}

fn validate_coordinates(lat: f64, lon: f64) -> Result<()> {
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(EleError::InvalidCoordinate { lat, lon });
    }
    Ok(())
}

enum CatalogSource {
    Manifest(PathBuf),
    Catalog(Catalog),
}

/// Builder for creating [`ElevationService`] with custom configuration.
///
/// # Example
///
/// ```ignore
/// use ele::{ElevationServiceBuilder, EvictionKind};
///
/// let service = ElevationServiceBuilder::new("/data/dem/tiles.txt")
///     .max_open_handles(4)
///     .eviction(EvictionKind::Random)
///     .build()?;
/// ```
pub struct ElevationServiceBuilder {
    source: CatalogSource,
    max_open: usize,
    eviction: EvictionKind,
    policy: Option<Box<dyn EvictionPolicy>>,
    opener: Option<Box<dyn RasterOpener>>,
}

impl ElevationServiceBuilder {
    /// Create a new builder that loads its catalog from a manifest.
    pub fn new<P: AsRef<Path>>(manifest: P) -> Self {
        Self::with_source(CatalogSource::Manifest(manifest.as_ref().to_path_buf()))
    }

    /// Create a new builder around an already-built catalog.
    pub fn from_catalog(catalog: Catalog) -> Self {
        Self::with_source(CatalogSource::Catalog(catalog))
    }

    fn with_source(source: CatalogSource) -> Self {
        Self {
            source,
            max_open: DEFAULT_MAX_OPEN,
            eviction: EvictionKind::default(),
            policy: None,
            opener: None,
        }
    }

    /// Create a builder configured from environment variables.
    ///
    /// # Environment Variables
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `ELE_MANIFEST` | Tile manifest path | Required |
    /// | `ELE_MAX_OPEN` | Maximum open raster handles | 10 |
    /// | `ELE_EVICTION` | Eviction policy: `lru` or `random` | `lru` |
    ///
    /// # Errors
    ///
    /// Returns [`EleError::InvalidArgument`] if `ELE_MANIFEST` is not set or
    /// another variable cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let manifest = std::env::var("ELE_MANIFEST").map_err(|_| {
            EleError::InvalidArgument("ELE_MANIFEST environment variable not set".to_string())
        })?;
        let mut builder = Self::new(manifest);

        if let Ok(value) = std::env::var("ELE_MAX_OPEN") {
            builder.max_open = value.trim().parse().map_err(|_| {
                EleError::InvalidArgument(format!("ELE_MAX_OPEN is not a number: {:?}", value))
            })?;
        }
        if let Ok(value) = std::env::var("ELE_EVICTION") {
            builder.eviction = value.trim().parse()?;
        }

        Ok(builder)
    }

    /// Set the maximum number of open raster handles.
    ///
    /// Default is 10.
    pub fn max_open_handles(mut self, max_open: usize) -> Self {
        self.max_open = max_open;
        self
    }

    /// Choose a built-in eviction policy. Default is LRU.
    pub fn eviction(mut self, kind: EvictionKind) -> Self {
        self.eviction = kind;
        self.policy = None;
        self
    }

    /// Use a custom eviction policy.
    pub fn eviction_policy(mut self, policy: Box<dyn EvictionPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Use a custom raster opener instead of the file-extension based one.
    pub fn opener(mut self, opener: Box<dyn RasterOpener>) -> Self {
        self.opener = Some(opener);
        self
    }

    /// Build the [`ElevationService`].
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest cannot be loaded or the handle limit
    /// is zero.
    pub fn build(self) -> Result<ElevationService> {
        let catalog = match self.source {
            CatalogSource::Manifest(path) => Catalog::from_manifest(path)?,
            CatalogSource::Catalog(catalog) => catalog,
        };
        let policy = self.policy.unwrap_or_else(|| self.eviction.policy());
        let opener = self.opener.unwrap_or_else(|| Box::new(FileOpener));
        let cache = HandleCache::new(self.max_open, policy, opener)?;

        info!(
            tiles = catalog.len(),
            max_open = self.max_open,
            eviction = %self.eviction,
            "Elevation service ready"
        );
        if catalog.is_empty() {
            debug!("Catalog is empty, every query will be NotFound");
        }

        Ok(ElevationService::new(catalog, cache))
    }
}
