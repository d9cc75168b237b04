use anyhow::{bail, Context, Result};
use ele::{ColorRamp, RenderConfig, Renderer, TileCoord, TileOutcome};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

use super::{sample_mode, ServiceOptions};

pub struct RenderArgs {
    pub zoom: u8,
    pub max_zoom: u8,
    pub x: Option<u32>,
    pub y: Option<u32>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub output: PathBuf,
    pub min_elevation: f64,
    pub max_elevation: f64,
    pub force: bool,
    pub parallel: bool,
    pub interpolate: bool,
}

pub fn run(options: &ServiceOptions, args: RenderArgs) -> Result<()> {
    let root = root_tile(&args)?;
    if args.max_zoom < root.z {
        bail!(
            "--max-zoom {} is above the root tile's zoom {}",
            args.max_zoom,
            root.z
        );
    }

    let ramp = ColorRamp::new(args.min_elevation, args.max_elevation)?;
    let service = options.build()?;

    let config = RenderConfig {
        output_root: args.output,
        max_zoom: args.max_zoom,
        mode: sample_mode(args.interpolate),
        force: args.force,
        parallel: args.parallel,
        ramp,
    };

    let pb = ProgressBar::new(0);
    let renderer = Renderer::new(&service, config);
    pb.set_length(renderer.pyramid_size(root));
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} tiles ({eta}) {msg}",
            )?
            .progress_chars("#>-"),
    );

    let progress = pb.clone();
    let renderer = renderer.with_progress(Box::new(move |coord, outcome| {
        if outcome == TileOutcome::Rendered {
            progress.set_message(coord.to_string());
        }
        progress.inc(1);
    }));

    let report = renderer
        .render(root)
        .with_context(|| format!("Failed to render pyramid below {}", root))?;
    pb.finish_with_message("done");

    println!(
        "Rendered {} tiles, skipped {} existing, under {}",
        report.rendered,
        report.skipped,
        renderer.config().output_root.display()
    );
    let stats = service.cache_stats();
    println!(
        "Raster handles: {} opens, {} evictions, {:.1}% hit rate",
        stats.miss_count,
        stats.eviction_count,
        stats.hit_rate() * 100.0
    );

    Ok(())
}

/// The root tile, given directly or as the tile containing a point.
fn root_tile(args: &RenderArgs) -> Result<TileCoord> {
    match (args.x, args.y, args.lat, args.lon) {
        (Some(x), Some(y), _, _) => Ok(TileCoord::new(args.zoom, x, y)?),
        (_, _, Some(lat), Some(lon)) => Ok(TileCoord::from_lat_lon(lat, lon, args.zoom)?),
        _ => bail!("Give the root tile as --x and --y, or as --lat and --lon"),
    }
}
