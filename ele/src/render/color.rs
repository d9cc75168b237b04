//! Elevation to colour mapping.

use image::Rgba;

use crate::error::{EleError, Result};
use crate::raster::VOID_VALUE;

/// Colour channel carrying the in-range ramp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Channel {
    #[default]
    Red,
    Green,
    Blue,
}

/// Maps an elevation to a pixel colour.
///
/// Values are classified in this order:
///
/// 1. no coverage or the no-data value: `background`
/// 2. below sea level (`< 0`): `sea`
/// 3. below `min_elevation`: `background`
/// 4. above `max_elevation`: `saturation`
/// 5. otherwise a linear ramp from 0 to 255 on `channel`, fully opaque
#[derive(Debug, Clone, PartialEq)]
pub struct ColorRamp {
    pub min_elevation: f64,
    pub max_elevation: f64,
    pub channel: Channel,
    pub background: Rgba<u8>,
    pub sea: Rgba<u8>,
    pub saturation: Rgba<u8>,
    /// Raster value meaning "no data", drawn as background.
    pub no_data: Option<f64>,
}

impl Default for ColorRamp {
    fn default() -> Self {
        Self {
            min_elevation: 0.0,
            max_elevation: 1000.0,
            channel: Channel::Red,
            background: Rgba([0, 0, 0, 0]),
            sea: Rgba([0, 0, 255, 255]),
            saturation: Rgba([255, 255, 255, 255]),
            no_data: Some(VOID_VALUE as f64),
        }
    }
}

impl ColorRamp {
    /// Default colours with the ramp spanning `min..=max` metres.
    ///
    /// # Errors
    ///
    /// Returns [`EleError::InvalidArgument`] unless `min < max`.
    pub fn new(min_elevation: f64, max_elevation: f64) -> Result<Self> {
        if !(min_elevation < max_elevation) {
            return Err(EleError::InvalidArgument(format!(
                "colour ramp needs min < max, got {}..{}",
                min_elevation, max_elevation
            )));
        }
        Ok(Self {
            min_elevation,
            max_elevation,
            ..Self::default()
        })
    }

    /// Colour for one sample; `None` means no tile covers the pixel.
    pub fn color(&self, elevation: Option<f64>) -> Rgba<u8> {
        let Some(elevation) = elevation else {
            return self.background;
        };
        if elevation.is_nan() || self.no_data == Some(elevation) {
            return self.background;
        }
        if elevation < 0.0 {
            return self.sea;
        }
        if elevation < self.min_elevation {
            return self.background;
        }
        if elevation > self.max_elevation {
            return self.saturation;
        }

        let span = self.max_elevation - self.min_elevation;
        let level = if span > 0.0 {
            ((elevation - self.min_elevation) / span * 255.0).round() as u8
        } else {
            255
        };
        match self.channel {
            Channel::Red => Rgba([level, 0, 0, 255]),
            Channel::Green => Rgba([0, level, 0, 255]),
            Channel::Blue => Rgba([0, 0, level, 255]),
        }
    }
}
