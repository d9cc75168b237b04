use anyhow::{bail, Context, Result};
use ele::Catalog;
use std::path::PathBuf;

pub fn run(dir: PathBuf, output: Option<PathBuf>) -> Result<()> {
    if !dir.is_dir() {
        bail!("Data directory does not exist: {}", dir.display());
    }

    let catalog = Catalog::from_directory(&dir)
        .with_context(|| format!("Failed to index {}", dir.display()))?;
    if catalog.is_empty() {
        bail!("No raster files found in: {}", dir.display());
    }

    let output = output.unwrap_or_else(|| dir.join("tiles.txt"));
    catalog
        .write_manifest(&output)
        .context("Failed to write manifest")?;

    println!("Indexed {} tiles", catalog.len());
    if let Some(coverage) = catalog.coverage() {
        println!(
            "Coverage: N{:.4} S{:.4} E{:.4} W{:.4}",
            coverage.north, coverage.south, coverage.east, coverage.west
        );
    }
    println!("Manifest written to: {}", output.display());
    Ok(())
}
