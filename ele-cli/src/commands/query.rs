use anyhow::{Context, Result};
use serde::Serialize;

use super::{format_elevation, sample_mode, ServiceOptions};

#[derive(Serialize)]
struct ElevationResponse {
    lat: f64,
    lon: f64,
    elevation: Option<f64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    interpolated: bool,
}

pub fn run(
    options: &ServiceOptions,
    lat: f64,
    lon: f64,
    interpolate: bool,
    json: bool,
) -> Result<()> {
    let service = options.build()?;

    // None when no tile covers the point
    let elevation = service
        .try_sample(lat, lon, sample_mode(interpolate))
        .context("Failed to get elevation")?;

    if json {
        let response = ElevationResponse {
            lat,
            lon,
            elevation,
            interpolated: interpolate,
        };
        println!("{}", serde_json::to_string(&response)?);
    } else if elevation.is_none() {
        println!("not covered");
    } else {
        println!("{}", format_elevation(elevation, interpolate));
    }

    Ok(())
}
