//! Tile pyramid rendering.
//!
//! A [`Renderer`] turns elevation data into 256×256 PNG map tiles laid out as
//! `root/z/x/y.png`. Starting from one tile, it renders that tile and then its
//! whole quadtree of descendants down to `max_zoom`. Tiles that already exist
//! on disk are skipped (their children are still visited) unless `force` is
//! set, so an interrupted run can simply be restarted.
//!
//! ```ignore
//! use ele::render::{RenderConfig, Renderer, TileCoord};
//!
//! let config = RenderConfig {
//!     output_root: "tiles".into(),
//!     max_zoom: 14,
//!     ..RenderConfig::default()
//! };
//! let report = Renderer::new(&service, config).render(TileCoord::new(12, 2035, 1305)?)?;
//! println!("{} rendered, {} skipped", report.rendered, report.skipped);
//! ```

pub mod color;
pub mod tiles;

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use image::{ImageFormat, RgbaImage};
use rayon::prelude::*;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::catalog::Locator;
use crate::error::{EleError, Result};
use crate::sampler::SampleMode;
use crate::service::ElevationService;

pub use color::{Channel, ColorRamp};
pub use tiles::{tile_to_lat_lon, TileCoord, MAX_ZOOM, TILE_SIZE};

/// Rendering options.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Directory receiving `z/x/y.png`.
    pub output_root: PathBuf,
    /// Deepest zoom level rendered.
    pub max_zoom: u8,
    pub mode: SampleMode,
    /// Re-render tiles that already exist.
    pub force: bool,
    /// Render independent subtrees on the rayon thread pool.
    pub parallel: bool,
    pub ramp: ColorRamp,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("tiles"),
            max_zoom: 14,
            mode: SampleMode::Nearest,
            force: false,
            parallel: false,
            ramp: ColorRamp::default(),
        }
    }
}

/// What happened to one tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileOutcome {
    /// The image was rendered and written.
    Rendered,
    /// The image already existed and was left alone.
    Skipped,
}

/// Totals for a render run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderReport {
    pub rendered: u64,
    pub skipped: u64,
}

impl RenderReport {
    /// Number of tiles visited.
    pub fn visited(&self) -> u64 {
        self.rendered + self.skipped
    }

    fn record(&mut self, outcome: TileOutcome) {
        match outcome {
            TileOutcome::Rendered => self.rendered += 1,
            TileOutcome::Skipped => self.skipped += 1,
        }
    }

    fn merge(mut self, other: RenderReport) -> RenderReport {
        self.rendered += other.rendered;
        self.skipped += other.skipped;
        self
    }
}

/// Called after every tile of a run, from whichever thread handled it.
pub type ProgressCallback = Box<dyn Fn(TileCoord, TileOutcome) + Send + Sync>;

/// Renders map tiles from an [`ElevationService`].
pub struct Renderer<'a, L: Locator> {
    service: &'a ElevationService<L>,
    config: RenderConfig,
    progress: Option<ProgressCallback>,
}

impl<'a, L: Locator> Renderer<'a, L> {
    pub fn new(service: &'a ElevationService<L>, config: RenderConfig) -> Self {
        Self {
            service,
            config,
            progress: None,
        }
    }

    /// Report each finished tile to `callback`.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Output file for a tile.
    pub fn tile_path(&self, coord: TileCoord) -> PathBuf {
        coord.path(&self.config.output_root)
    }

    /// Number of tiles in the pyramid below and including `root`.
    pub fn pyramid_size(&self, root: TileCoord) -> u64 {
        if root.z > self.config.max_zoom {
            return 0;
        }
        (0..=(self.config.max_zoom - root.z) as u32)
            .map(|depth| 4u64.saturating_pow(depth))
            .fold(0u64, |acc, n| acc.saturating_add(n))
    }

    /// Render `root` and every descendant down to `max_zoom`.
    ///
    /// # Errors
    ///
    /// Returns [`EleError::InvalidArgument`] if `root` is deeper than
    /// `max_zoom`, and [`EleError::RenderFailed`] naming the first tile that
    /// could not be rendered. Tiles finished before the failure stay on disk.
    pub fn render(&self, root: TileCoord) -> Result<RenderReport> {
        if self.config.max_zoom > MAX_ZOOM {
            return Err(EleError::InvalidArgument(format!(
                "max zoom {} exceeds {}",
                self.config.max_zoom, MAX_ZOOM
            )));
        }
        if root.z > self.config.max_zoom {
            return Err(EleError::InvalidArgument(format!(
                "tile {} is below max zoom {}",
                root, self.config.max_zoom
            )));
        }

        let start = Instant::now();
        let report = if self.config.parallel {
            self.render_parallel(root)?
        } else {
            self.render_subtree(root)?
        };

        info!(
            root = %root,
            max_zoom = self.config.max_zoom,
            rendered = report.rendered,
            skipped = report.skipped,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Render complete"
        );
        Ok(report)
    }

    /// Depth-first walk with an explicit stack, children in quadrant order.
    fn render_subtree(&self, root: TileCoord) -> Result<RenderReport> {
        let mut report = RenderReport::default();
        let mut stack = vec![root];

        while let Some(coord) = stack.pop() {
            report.record(self.render_tile(coord)?);
            if coord.z < self.config.max_zoom {
                stack.extend(coord.children().into_iter().rev());
            }
        }

        Ok(report)
    }

    /// Expand the tree breadth-first until there is a subtree per worker
    /// thread, then walk the subtrees in parallel.
    fn render_parallel(&self, root: TileCoord) -> Result<RenderReport> {
        let threads = rayon::current_num_threads().max(1);
        let mut report = RenderReport::default();
        let mut frontier = vec![root];

        while frontier.len() < threads && frontier.iter().all(|c| c.z < self.config.max_zoom) {
            let mut next = Vec::with_capacity(frontier.len() * 4);
            for coord in frontier {
                report.record(self.render_tile(coord)?);
                next.extend(coord.children());
            }
            frontier = next;
        }

        let subtrees = frontier
            .par_iter()
            .map(|&coord| self.render_subtree(coord))
            .collect::<Result<Vec<_>>>()?;

        Ok(subtrees.into_iter().fold(report, RenderReport::merge))
    }

    /// Render a single tile without visiting its children.
    ///
    /// Existing files are skipped unless `force` is set. The image is written
    /// to a uniquely named temporary file next to the target and moved into
    /// place, so neither a crash nor a concurrent render of the same tile
    /// leaves a truncated PNG at `path`. When another writer finishes the
    /// same tile first, this call reports [`TileOutcome::Skipped`].
    pub fn render_tile(&self, coord: TileCoord) -> Result<TileOutcome> {
        let path = self.tile_path(coord);

        let outcome = if !self.config.force && path.exists() {
            debug!(tile = %coord, "Tile exists, skipping");
            TileOutcome::Skipped
        } else {
            let outcome = self
                .write_tile(coord, &path)
                .map_err(|source| EleError::RenderFailed {
                    z: coord.z,
                    x: coord.x,
                    y: coord.y,
                    source: Box::new(source),
                })?;
            debug!(tile = %coord, path = %path.display(), ?outcome, "Wrote tile");
            outcome
        };

        if let Some(progress) = &self.progress {
            progress(coord, outcome);
        }
        Ok(outcome)
    }

    /// Render a tile to an in-memory image.
    ///
    /// Pixels outside every raster tile are drawn in the background colour.
    pub fn render_image(&self, coord: TileCoord) -> Result<RgbaImage> {
        let size = TILE_SIZE as usize;
        let mut coords = Vec::with_capacity(size * size);
        for py in 0..TILE_SIZE {
            for px in 0..TILE_SIZE {
                coords.push(tile_to_lat_lon(
                    coord.x as f64 + px as f64 / TILE_SIZE as f64,
                    coord.y as f64 + py as f64 / TILE_SIZE as f64,
                    coord.z,
                ));
            }
        }

        let elevations = self.service.sample_batch(&coords, self.config.mode)?;
        let ramp = &self.config.ramp;

        Ok(RgbaImage::from_fn(TILE_SIZE, TILE_SIZE, |px, py| {
            ramp.color(elevations[py as usize * size + px as usize])
        }))
    }

    fn write_tile(&self, coord: TileCoord, path: &Path) -> Result<TileOutcome> {
        let image = self.render_image(coord)?;

        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let mut tmp = NamedTempFile::new_in(parent)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            image.write_to(&mut writer, ImageFormat::Png)?;
            writer.flush()?;
        }

        if self.config.force {
            tmp.persist(path).map_err(|e| e.error)?;
            return Ok(TileOutcome::Rendered);
        }
        match tmp.persist_noclobber(path) {
            Ok(_) => Ok(TileOutcome::Rendered),
            // Another writer finished this tile first
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(TileOutcome::Skipped),
            Err(e) => Err(e.error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::CountingOpener;
    use crate::catalog::Catalog;
    use crate::service::ElevationServiceBuilder;
    use crate::tile::{BoundingBox, TileDescriptor};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Service with one tile over the north-east quadrant of the map.
    fn service(name: &str) -> ElevationService {
        let tile = TileDescriptor::new(
            name,
            BoundingBox::new(80.0, 0.0, 180.0, 0.0),
            -1.0,
            1.0,
            180,
            80,
        )
        .unwrap();
        ElevationServiceBuilder::from_catalog(Catalog::new(vec![tile]))
            .opener(Box::new(CountingOpener::default()))
            .build()
            .unwrap()
    }

    fn config(root: &Path, max_zoom: u8) -> RenderConfig {
        RenderConfig {
            output_root: root.to_path_buf(),
            max_zoom,
            ..RenderConfig::default()
        }
    }

    #[test]
    fn test_render_at_max_zoom_renders_one_tile() {
        let temp_dir = TempDir::new().unwrap();
        let service = service("quadrant.hgt");
        let renderer = Renderer::new(&service, config(temp_dir.path(), 3));

        let coord = TileCoord::new(3, 5, 2).unwrap();
        let report = renderer.render(coord).unwrap();

        assert_eq!(report, RenderReport { rendered: 1, skipped: 0 });
        assert!(temp_dir.path().join("3/5/2.png").exists());
        assert!(!temp_dir.path().join("4").exists());
    }

    #[test]
    fn test_render_pyramid_visits_all_descendants() {
        let temp_dir = TempDir::new().unwrap();
        let service = service("quadrant.hgt");
        let renderer = Renderer::new(&service, config(temp_dir.path(), 2));

        let root = TileCoord::new(0, 0, 0).unwrap();
        let report = renderer.render(root).unwrap();

        assert_eq!(report.rendered, 1 + 4 + 16);
        assert_eq!(report.visited(), renderer.pyramid_size(root));
        for child in root.children() {
            assert!(child.path(temp_dir.path()).exists());
        }
        assert!(temp_dir.path().join("2/3/3.png").exists());
    }

    #[test]
    fn test_second_render_skips() {
        let temp_dir = TempDir::new().unwrap();
        let service = service("quadrant.hgt");
        let renderer = Renderer::new(&service, config(temp_dir.path(), 1));
        let root = TileCoord::new(0, 0, 0).unwrap();

        renderer.render(root).unwrap();
        let path = root.path(temp_dir.path());
        let modified = fs::metadata(&path).unwrap().modified().unwrap();

        let report = renderer.render(root).unwrap();
        assert_eq!(report, RenderReport { rendered: 0, skipped: 5 });
        assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), modified);
    }

    #[test]
    fn test_force_rerenders() {
        let temp_dir = TempDir::new().unwrap();
        let service = service("quadrant.hgt");
        let root = TileCoord::new(1, 1, 0).unwrap();

        Renderer::new(&service, config(temp_dir.path(), 1))
            .render(root)
            .unwrap();

        let forced = RenderConfig {
            force: true,
            ..config(temp_dir.path(), 1)
        };
        let report = Renderer::new(&service, forced).render(root).unwrap();
        assert_eq!(report.rendered, 1);
        assert_eq!(report.skipped, 0);
    }

    #[test]
    fn test_skipped_parent_still_visits_children() {
        let temp_dir = TempDir::new().unwrap();
        let service = service("quadrant.hgt");
        let root = TileCoord::new(0, 0, 0).unwrap();

        // Only the root exists beforehand
        Renderer::new(&service, config(temp_dir.path(), 0))
            .render(root)
            .unwrap();
        let report = Renderer::new(&service, config(temp_dir.path(), 1))
            .render(root)
            .unwrap();

        assert_eq!(report, RenderReport { rendered: 4, skipped: 1 });
    }

    #[test]
    fn test_image_colours_coverage() {
        let temp_dir = TempDir::new().unwrap();
        let service = service("quadrant.hgt");
        let renderer = Renderer::new(&service, config(temp_dir.path(), 0));

        let image = renderer.render_image(TileCoord::new(0, 0, 0).unwrap()).unwrap();
        let ramp = ColorRamp::default();

        // Top-left pixel is at 180°W, outside the only tile
        assert_eq!(*image.get_pixel(0, 0), ramp.background);
        // Pixel at roughly 45°N 90°E is covered, value 7
        assert_eq!(*image.get_pixel(192, 80), ramp.color(Some(7.0)));
    }

    #[test]
    fn test_written_png_decodes() {
        let temp_dir = TempDir::new().unwrap();
        let service = service("quadrant.hgt");
        let renderer = Renderer::new(&service, config(temp_dir.path(), 0));
        let root = TileCoord::new(0, 0, 0).unwrap();

        renderer.render(root).unwrap();
        let decoded = image::open(root.path(temp_dir.path())).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (TILE_SIZE, TILE_SIZE));

        // No temporary files left next to the tile
        let entries = fs::read_dir(temp_dir.path().join("0/0")).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_concurrent_renders_of_one_tile() {
        let service = service("quadrant.hgt");
        let coord = TileCoord::new(3, 5, 2).unwrap();

        for _ in 0..10 {
            let temp_dir = TempDir::new().unwrap();
            let renderer = Renderer::new(&service, config(temp_dir.path(), 3));

            let outcomes: Vec<Result<TileOutcome>> = std::thread::scope(|scope| {
                let workers: Vec<_> = (0..8)
                    .map(|_| scope.spawn(|| renderer.render_tile(coord)))
                    .collect();
                workers.into_iter().map(|w| w.join().unwrap()).collect()
            });

            let mut rendered = 0;
            for outcome in outcomes {
                match outcome {
                    Ok(TileOutcome::Rendered) => rendered += 1,
                    Ok(TileOutcome::Skipped) => {}
                    Err(e) => panic!("Concurrent render failed: {:?}", e),
                }
            }
            assert!(rendered >= 1);

            let decoded = image::open(coord.path(temp_dir.path())).unwrap();
            assert_eq!(decoded.width(), TILE_SIZE);
            let entries = fs::read_dir(temp_dir.path().join("3/5")).unwrap().count();
            assert_eq!(entries, 1);
        }
    }

    #[test]
    fn test_concurrent_forced_renders_of_one_tile() {
        let temp_dir = TempDir::new().unwrap();
        let service = service("quadrant.hgt");
        let coord = TileCoord::new(2, 3, 1).unwrap();
        let renderer = Renderer::new(
            &service,
            RenderConfig {
                force: true,
                ..config(temp_dir.path(), 2)
            },
        );

        std::thread::scope(|scope| {
            let workers: Vec<_> = (0..6)
                .map(|_| scope.spawn(|| renderer.render_tile(coord)))
                .collect();
            for worker in workers {
                assert_eq!(worker.join().unwrap().unwrap(), TileOutcome::Rendered);
            }
        });
        assert!(image::open(coord.path(temp_dir.path())).is_ok());
    }

    #[test]
    fn test_read_failure_aborts_with_tile() {
        let temp_dir = TempDir::new().unwrap();
        let service = service("broken.hgt");
        let renderer = Renderer::new(&service, config(temp_dir.path(), 2));

        match renderer.render(TileCoord::new(0, 0, 0).unwrap()) {
            Err(EleError::RenderFailed { z, x, y, source }) => {
                assert_eq!((z, x, y), (0, 0, 0));
                assert!(matches!(*source, EleError::RasterRead { .. }));
            }
            other => panic!("Expected RenderFailed, got {:?}", other),
        }
        assert!(!temp_dir.path().join("0/0/0.png").exists());
    }

    #[test]
    fn test_root_below_max_zoom_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let service = service("quadrant.hgt");
        let renderer = Renderer::new(&service, config(temp_dir.path(), 2));

        let result = renderer.render(TileCoord::new(3, 0, 0).unwrap());
        assert!(matches!(result, Err(EleError::InvalidArgument(_))));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let sequential_dir = TempDir::new().unwrap();
        let parallel_dir = TempDir::new().unwrap();
        let service = service("quadrant.hgt");
        let root = TileCoord::new(1, 1, 0).unwrap();

        let sequential = Renderer::new(&service, config(sequential_dir.path(), 3))
            .render(root)
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let parallel = Renderer::new(
            &service,
            RenderConfig {
                parallel: true,
                ..config(parallel_dir.path(), 3)
            },
        )
        .with_progress(Box::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .render(root)
        .unwrap();

        assert_eq!(sequential, parallel);
        assert_eq!(parallel.rendered, 1 + 4 + 16);
        assert_eq!(calls.load(Ordering::SeqCst), 21);
        assert!(parallel_dir.path().join("3/7/3.png").exists());
    }
}
