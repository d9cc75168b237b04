//! Basic example demonstrating ele library usage.
//!
//! Run with: cargo run --example basic -- /path/to/tiles.txt

use ele::{EleError, ElevationService, SampleMode};
use std::env;

fn main() -> Result<(), EleError> {
    // Get manifest path from command line
    let manifest = env::args().nth(1).unwrap_or_else(|| {
        eprintln!("Usage: cargo run --example basic -- /path/to/tiles.txt");
        std::process::exit(1);
    });

    // Keep at most 10 raster files open
    let service = ElevationService::builder(&manifest)
        .max_open_handles(10)
        .build()?;

    println!("Catalog: {} tiles", service.catalog().len());
    if let Some(coverage) = service.catalog().coverage() {
        println!(
            "Coverage: N{:.3} S{:.3} E{:.3} W{:.3}",
            coverage.north, coverage.south, coverage.east, coverage.west
        );
    }

    let locations = [
        ("Roseberry Topping", 54.5058, -1.1077),
        ("Scafell Pike", 54.4542, -3.2115),
        ("Ben Nevis", 56.7969, -5.0036),
    ];

    println!("\nElevation queries:");
    println!("{:-<60}", "");

    for (name, lat, lon) in &locations {
        let nearest = service.try_sample(*lat, *lon, SampleMode::Nearest);
        let bilinear = service.try_sample(*lat, *lon, SampleMode::Bilinear);
        match (nearest, bilinear) {
            (Ok(Some(n)), Ok(Some(b))) => {
                println!("{}: {}m (bilinear {:.1}m)", name, n, b);
            }
            (Ok(None), _) => {
                println!("{}: not covered by the catalog", name);
            }
            (Err(e), _) | (_, Err(e)) => {
                println!("{}: error - {}", name, e);
            }
            (Ok(Some(n)), Ok(None)) => {
                println!("{}: {}m", name, n);
            }
        }
    }

    // Show cache statistics
    let stats = service.cache_stats();
    println!("\nHandle cache:");
    println!("  Open: {}/{}", stats.open_count, stats.capacity);
    println!("  Hits: {}", stats.hit_count);
    println!("  Misses: {}", stats.miss_count);
    println!("  Evictions: {}", stats.eviction_count);
    println!("  Hit rate: {:.1}%", stats.hit_rate() * 100.0);

    Ok(())
}
