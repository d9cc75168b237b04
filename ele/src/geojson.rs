//! GeoJSON routes and elevation enrichment.
//!
//! Enable the `geojson` feature to use this module.
//!
//! # Example
//!
//! ```ignore
//! use ele::geojson::{add_elevations_to_geometry, route_from_geometry};
//! use ele::{elevation_profile, SampleMode};
//! use geojson::Geometry;
//!
//! let line: Geometry = r#"{
//!     "type": "LineString",
//!     "coordinates": [[-1.13, 54.49], [-1.10, 54.51]]
//! }"#.parse()?;
//!
//! let route = route_from_geometry(&line)?;
//! let profile = elevation_profile(&service, &route, 10, SampleMode::Bilinear)?;
//!
//! // Or attach a Z value to every coordinate
//! let enriched = add_elevations_to_geometry(&service, line, SampleMode::Nearest)?;
//! ```

use geojson::{Geometry, Value as GeoJsonValue};

use crate::catalog::Locator;
use crate::error::{EleError, Result};
use crate::sampler::SampleMode;
use crate::service::ElevationService;

/// Extract a route as `(lat, lon)` points from a line geometry.
///
/// LineStrings are used as-is; the parts of a MultiLineString are joined end
/// to end; MultiPoints are treated as an ordered list of route points.
///
/// # Errors
///
/// Returns [`EleError::InvalidArgument`] for other geometry types or for a
/// coordinate with fewer than 2 elements.
pub fn route_from_geometry(geometry: &Geometry) -> Result<Vec<(f64, f64)>> {
    let positions: Vec<&Vec<f64>> = match &geometry.value {
        GeoJsonValue::LineString(coords) | GeoJsonValue::MultiPoint(coords) => {
            coords.iter().collect()
        }
        GeoJsonValue::MultiLineString(lines) => lines.iter().flatten().collect(),
        _ => {
            return Err(EleError::InvalidArgument(
                "route geometry must be a LineString, MultiLineString or MultiPoint".to_string(),
            ))
        }
    };

    positions
        .into_iter()
        .map(|coord| lat_lon(coord))
        .collect()
}

/// Add elevations to all coordinates in a GeoJSON geometry.
///
/// Every coordinate covered by a tile gets its elevation as the Z value:
/// `[lon, lat]` becomes `[lon, lat, elevation]`. Coordinates outside every
/// tile are returned as `[lon, lat]`, without a Z value.
///
/// # Errors
///
/// Returns an error if a coordinate has fewer than 2 elements, is not a valid
/// latitude/longitude, or its tile cannot be read.
pub fn add_elevations_to_geometry<L: Locator>(
    service: &ElevationService<L>,
    geometry: Geometry,
    mode: SampleMode,
) -> Result<Geometry> {
    let new_value = match geometry.value {
        GeoJsonValue::Point(coord) => GeoJsonValue::Point(elevate(service, &coord, mode)?),
        GeoJsonValue::MultiPoint(coords) => {
            GeoJsonValue::MultiPoint(elevate_all(service, &coords, mode)?)
        }
        GeoJsonValue::LineString(coords) => {
            GeoJsonValue::LineString(elevate_all(service, &coords, mode)?)
        }
        GeoJsonValue::MultiLineString(lines) => GeoJsonValue::MultiLineString(
            lines
                .iter()
                .map(|line| elevate_all(service, line, mode))
                .collect::<Result<_>>()?,
        ),
        GeoJsonValue::Polygon(rings) => GeoJsonValue::Polygon(
            rings
                .iter()
                .map(|ring| elevate_all(service, ring, mode))
                .collect::<Result<_>>()?,
        ),
        GeoJsonValue::MultiPolygon(polygons) => GeoJsonValue::MultiPolygon(
            polygons
                .iter()
                .map(|polygon| {
                    polygon
                        .iter()
                        .map(|ring| elevate_all(service, ring, mode))
                        .collect::<Result<Vec<_>>>()
                })
                .collect::<Result<_>>()?,
        ),
        GeoJsonValue::GeometryCollection(geometries) => GeoJsonValue::GeometryCollection(
            geometries
                .into_iter()
                .map(|g| add_elevations_to_geometry(service, g, mode))
                .collect::<Result<_>>()?,
        ),
    };

    Ok(Geometry::new(new_value))
}

fn lat_lon(coord: &[f64]) -> Result<(f64, f64)> {
    match coord {
        [lon, lat, ..] => Ok((*lat, *lon)),
        _ => Err(EleError::InvalidArgument(
            "Coordinate must have at least 2 elements (lon, lat)".to_string(),
        )),
    }
}

fn elevate<L: Locator>(
    service: &ElevationService<L>,
    coord: &[f64],
    mode: SampleMode,
) -> Result<Vec<f64>> {
    let (lat, lon) = lat_lon(coord)?;
    Ok(match service.try_sample(lat, lon, mode)? {
        Some(elevation) => vec![lon, lat, elevation],
        None => vec![lon, lat],
    })
}

fn elevate_all<L: Locator>(
    service: &ElevationService<L>,
    coords: &[Vec<f64>],
    mode: SampleMode,
) -> Result<Vec<Vec<f64>>> {
    coords
        .iter()
        .map(|coord| elevate(service, coord, mode))
        .collect()
}
