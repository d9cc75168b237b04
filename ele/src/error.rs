//! Error types for the ele library.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when querying or rendering elevation data.
#[derive(Error, Debug)]
pub enum EleError {
    /// IO error when reading manifests or writing rendered tiles.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TIFF decoding error.
    #[error("TIFF decode error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// PNG encoding error while writing a rendered tile.
    #[error("Image encode error: {0}")]
    Image(#[from] image::ImageError),

    /// No tile in the catalog covers the point.
    #[error("No tile covers lat={lat}, lon={lon}")]
    NotFound { lat: f64, lon: f64 },

    /// Coordinates are not a valid latitude/longitude pair.
    #[error("Coordinates out of bounds: lat={lat}, lon={lon} (valid: lat ±90°, lon ±180°)")]
    InvalidCoordinate { lat: f64, lon: f64 },

    /// A manifest line could not be parsed.
    #[error("Invalid manifest {path}, line {line}: {reason}")]
    InvalidManifest {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// Tile geometry is inconsistent or degenerate.
    #[error("Invalid tile descriptor: {0}")]
    InvalidDescriptor(String),

    /// A raster file could not be opened or read.
    #[error("Failed to read raster {path}: {reason}")]
    RasterRead { path: PathBuf, reason: String },

    /// The tile failed earlier in this session and is no longer opened.
    #[error("Tile unavailable after earlier read failure: {path}")]
    TileUnavailable { path: PathBuf },

    /// The handle cache lock was poisoned by a panicking thread.
    #[error("Handle cache lock was poisoned")]
    CacheLockPoisoned,

    /// An internal invariant was broken. Indicates a bug, not bad input.
    #[error("Internal invariant violated: {0}")]
    InvariantViolation(String),

    /// Slippy-map tile coordinate outside the grid for its zoom level.
    #[error("Invalid map tile z={z} x={x} y={y}")]
    InvalidTile { z: u8, x: u32, y: u32 },

    /// Invalid argument passed to an operation.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Rendering a map tile failed.
    #[error("Failed to render tile {z}/{x}/{y}: {source}")]
    RenderFailed {
        z: u8,
        x: u32,
        y: u32,
        #[source]
        source: Box<EleError>,
    },
}

/// Result type alias using [`EleError`].
pub type Result<T> = std::result::Result<T, EleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EleError::NotFound {
            lat: 56.0,
            lon: -0.5,
        };
        assert!(err.to_string().contains("56"));

        let err = EleError::RasterRead {
            path: PathBuf::from("srtm_36_02.tif"),
            reason: "truncated".to_string(),
        };
        assert!(err.to_string().contains("srtm_36_02.tif"));
        assert!(err.to_string().contains("truncated"));

        let err = EleError::InvalidManifest {
            path: PathBuf::from("tiles.txt"),
            line: 3,
            reason: "expected 9 fields".to_string(),
        };
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_render_failed_keeps_source() {
        use std::error::Error;

        let err = EleError::RenderFailed {
            z: 12,
            x: 2035,
            y: 1305,
            source: Box::new(EleError::TileUnavailable {
                path: PathBuf::from("a.hgt"),
            }),
        };
        assert!(err.to_string().contains("12/2035/1305"));
        assert!(err.source().is_some());
    }
}
