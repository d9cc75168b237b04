use anyhow::Result;
use std::fs;

use super::{format_size, ServiceOptions};

pub fn run(options: &ServiceOptions) -> Result<()> {
    let service = options.build()?;
    let catalog = service.catalog();

    if catalog.is_empty() {
        println!("No tiles listed in: {}", options.manifest()?.display());
        return Ok(());
    }

    println!(
        "{:<5} {:<28} {:>11} {:>44}",
        "ID", "FILE", "PIXELS", "BOUNDS (N S E W)"
    );
    println!("{}", "-".repeat(91));

    let mut total_size: u64 = 0;
    let mut missing = 0;

    for (id, tile) in catalog.iter() {
        let size = fs::metadata(tile.path()).map(|m| m.len()).ok();
        match size {
            Some(size) => total_size += size,
            None => missing += 1,
        }

        let name = tile
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| tile.path().display().to_string());
        let bounds = tile.bounds();

        println!(
            "{:<5} {:<28} {:>11} {:>10.4} {:>10.4} {:>10.4} {:>10.4}{}",
            id.0,
            name,
            format!("{}x{}", tile.width(), tile.height()),
            bounds.north,
            bounds.south,
            bounds.east,
            bounds.west,
            if size.is_none() { "  (missing)" } else { "" }
        );
    }

    // Summary
    println!();
    println!("Summary:");
    println!("  Total tiles: {}", catalog.len());
    if missing > 0 {
        println!("  Missing files: {}", missing);
    }
    if let Some(coverage) = catalog.coverage() {
        println!(
            "  Coverage: N{:.4} S{:.4} E{:.4} W{:.4}",
            coverage.north, coverage.south, coverage.east, coverage.west
        );
    }
    println!("  Total size: {}", format_size(total_size));
    println!(
        "  Handle limit: {} ({})",
        service.cache_capacity(),
        options.eviction
    );
    println!("  Manifest: {}", options.manifest()?.display());

    Ok(())
}
