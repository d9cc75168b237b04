use anyhow::{bail, Context, Result};
use ele::{describe_raster, FileOpener, Raster, RasterOpener, VOID_VALUE};
use std::path::PathBuf;

use super::format_size;

/// Elevation range and void count over a whole raster.
#[derive(Debug, PartialEq)]
struct RasterSummary {
    min: Option<f64>,
    max: Option<f64>,
    void_count: u64,
    total: u64,
}

pub fn run(path: PathBuf) -> Result<()> {
    if !path.exists() {
        bail!("Raster not found: {}", path.display());
    }

    let tile = describe_raster(&path).context("Failed to read raster header")?;
    let raster = FileOpener.open(&tile).context("Failed to open raster")?;
    let summary = summarize(raster.as_ref())?;

    let file_size = std::fs::metadata(&path)?.len();
    let bounds = tile.bounds();
    let (lat_pixel, lon_pixel) = tile.pixel_size();

    println!("Raster: {}", path.display());
    println!();
    println!("Size: {}x{} pixels", tile.width(), tile.height());
    println!(
        "Pixel size: {:.9}° x {:.9}° (~{:.0}m)",
        lat_pixel.abs(),
        lon_pixel,
        lat_pixel.abs() * 111_320.0
    );
    println!(
        "Bounds: N{:.6} S{:.6} E{:.6} W{:.6}",
        bounds.north, bounds.south, bounds.east, bounds.west
    );
    println!("File size: {}", format_size(file_size));
    println!();

    if let (Some(min), Some(max)) = (summary.min, summary.max) {
        println!("Min elevation: {}m", min);
        println!("Max elevation: {}m", max);
    }
    if summary.void_count > 0 {
        let void_pct = (summary.void_count as f64 / summary.total as f64) * 100.0;
        println!("Void samples: {} ({:.1}%)", summary.void_count, void_pct);
    }

    println!();
    println!("Manifest line:");
    print!("{}", ele::Catalog::new(vec![tile]).to_manifest());

    Ok(())
}

fn summarize(raster: &dyn Raster) -> Result<RasterSummary> {
    let (width, height) = raster.dimensions();
    let mut summary = RasterSummary {
        min: None,
        max: None,
        void_count: 0,
        total: (width * height) as u64,
    };

    for row in 0..height {
        for col in 0..width {
            let value = raster.sample(row, col)?;
            if value == VOID_VALUE as f64 || value.is_nan() {
                summary.void_count += 1;
                continue;
            }
            summary.min = Some(summary.min.map_or(value, |m| m.min(value)));
            summary.max = Some(summary.max.map_or(value, |m| m.max(value)));
        }
    }

    Ok(summary)
}
