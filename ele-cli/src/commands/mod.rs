pub mod batch;
pub mod index;
pub mod info;
pub mod list;
pub mod profile;
pub mod query;
pub mod render;

use anyhow::{Context, Result};
use ele::{ElevationService, EvictionKind, SampleMode};
use std::path::PathBuf;

/// Global options shared by every command that queries the catalog.
pub struct ServiceOptions {
    pub manifest: Option<PathBuf>,
    pub max_open: usize,
    pub eviction: EvictionKind,
}

impl ServiceOptions {
    pub fn manifest(&self) -> Result<&PathBuf> {
        self.manifest.as_ref().context(
            "ELE_MANIFEST environment variable not set. Use --manifest or set ELE_MANIFEST",
        )
    }

    /// Load the catalog and build the service.
    pub fn build(&self) -> Result<ElevationService> {
        let manifest = self.manifest()?;
        ElevationService::builder(manifest)
            .max_open_handles(self.max_open)
            .eviction(self.eviction)
            .build()
            .with_context(|| format!("Failed to load catalog from {}", manifest.display()))
    }
}

pub fn sample_mode(interpolate: bool) -> SampleMode {
    if interpolate {
        SampleMode::Bilinear
    } else {
        SampleMode::Nearest
    }
}

pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Elevation as printed in tables: "-" when uncovered, "void" for no-data.
pub fn format_elevation(elevation: Option<f64>, interpolate: bool) -> String {
    match elevation {
        None => "-".to_string(),
        Some(e) if e == ele::VOID_VALUE as f64 => "void".to_string(),
        Some(e) if interpolate => format!("{:.2}", e),
        Some(e) => format!("{}", e),
    }
}
