//! GeoTIFF rasters.
//!
//! The whole band is decoded into memory when the file is opened, so an open
//! GeoTIFF costs `width * height * 4` bytes while it sits in the handle cache.

use std::fs::File;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

use super::{out_of_grid, Raster};
use crate::error::{EleError, Result};
use crate::tile::{BoundingBox, TileDescriptor};

/// ModelTiepointTag: `[i, j, k, x, y, z]` ties pixel `(i, j)` to `(x, y)`.
const MODEL_TIEPOINT: Tag = Tag::Unknown(33922);
/// ModelPixelScaleTag: `[scale_x, scale_y, scale_z]`.
const MODEL_PIXEL_SCALE: Tag = Tag::Unknown(33550);

/// A decoded single-band GeoTIFF.
#[derive(Debug)]
pub struct GeoTiffRaster {
    path: PathBuf,
    /// Samples in row-major order, north to south, west to east.
    data: Vec<f32>,
    width: usize,
    height: usize,
}

impl GeoTiffRaster {
    /// Decode a GeoTIFF and check that it has the expected extent.
    ///
    /// # Errors
    ///
    /// Returns [`EleError::RasterRead`] if the file cannot be decoded or its
    /// dimensions differ from `width`×`height`.
    pub fn open<P: AsRef<Path>>(path: P, width: usize, height: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let read_error = |reason: String| EleError::RasterRead {
            path: path.clone(),
            reason,
        };

        let samples = width
            .checked_mul(height)
            .ok_or_else(|| read_error(format!("{}x{} grid size overflows", width, height)))?;

        let mut decoder = open_decoder(&path).map_err(|e| read_error(e.to_string()))?;

        let (file_width, file_height) = decoder
            .dimensions()
            .map_err(|e| read_error(e.to_string()))?;
        if file_width as usize != width || file_height as usize != height {
            return Err(read_error(format!(
                "image is {}x{}, expected {}x{}",
                file_width, file_height, width, height
            )));
        }

        let data = decode_band(&mut decoder).map_err(|e| read_error(e.to_string()))?;
        if data.len() != samples {
            return Err(read_error(format!(
                "decoded {} samples, expected {} (multi-band images are not supported)",
                data.len(),
                samples
            )));
        }

        Ok(Self {
            path,
            data,
            width,
            height,
        })
    }
}

impl Raster for GeoTiffRaster {
    fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn sample(&self, row: usize, col: usize) -> Result<f64> {
        if row >= self.height || col >= self.width {
            return Err(out_of_grid(&self.path, row, col, self.dimensions()));
        }
        Ok(self.data[row * self.width + col] as f64)
    }
}

/// Describe a GeoTIFF from its tiepoint and pixel-scale tags.
///
/// Only the header is read; pixel data is not decoded.
pub(crate) fn describe(path: &Path) -> Result<TileDescriptor> {
    let mut decoder = open_decoder(path)?;
    let (width, height) = decoder.dimensions()?;

    let missing = |tag: &str| {
        EleError::InvalidDescriptor(format!("{}: missing or short {} tag", path.display(), tag))
    };
    let tiepoint = decoder
        .get_tag_f64_vec(MODEL_TIEPOINT)
        .ok()
        .filter(|t| t.len() >= 6)
        .ok_or_else(|| missing("ModelTiepoint"))?;
    let scale = decoder
        .get_tag_f64_vec(MODEL_PIXEL_SCALE)
        .ok()
        .filter(|s| s.len() >= 2)
        .ok_or_else(|| missing("ModelPixelScale"))?;

    let (scale_x, scale_y) = (scale[0], scale[1]);
    // Shift the tiepoint back to the top-left corner of pixel (0, 0)
    let west = tiepoint[3] - tiepoint[0] * scale_x;
    let north = tiepoint[4] + tiepoint[1] * scale_y;

    let bounds = BoundingBox::new(
        north,
        north - height as f64 * scale_y,
        west + width as f64 * scale_x,
        west,
    );

    TileDescriptor::new(
        path,
        bounds,
        -scale_y,
        scale_x,
        width as usize,
        height as usize,
    )
}

fn open_decoder(path: &Path) -> Result<Decoder<File>> {
    let file = File::open(path)?;

    // Allow full 1° tiles at 1 arc-second, ~50 MB as f32
    let mut limits = Limits::default();
    limits.decoding_buffer_size = 1024 * 1024 * 1024;
    limits.intermediate_buffer_size = 1024 * 1024 * 1024;
    limits.ifd_value_size = 1024 * 1024 * 1024;

    Ok(Decoder::new(file)?.with_limits(limits))
}

fn decode_band<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Vec<f32>> {
    let data = match decoder.read_image()? {
        DecodingResult::F32(data) => data,
        DecodingResult::F64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I16(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U16(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U8(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I8(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f32).collect(),
    };
    Ok(data)
}
