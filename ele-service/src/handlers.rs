//! HTTP request handlers for the elevation service.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use ele::{
    elevation_profile, geojson::add_elevations_to_geometry, EleError, RenderConfig, Renderer,
    SampleMode, TileCoord, DEFAULT_SAMPLES_PER_SEGMENT,
};
use geojson::Geometry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use crate::AppState;

/// Anything below the deepest ocean trench can only come from a no-data sample,
/// alone or blended into a bilinear result.
const LOWEST_ELEVATION_M: f64 = -11_000.0;

/// Query parameters for elevation endpoint.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ElevationQuery {
    /// Latitude in decimal degrees (-90 to 90).
    pub lat: f64,
    /// Longitude in decimal degrees (-180 to 180).
    pub lon: f64,
    /// Use bilinear interpolation instead of nearest-neighbor lookup.
    #[serde(default)]
    pub interpolate: bool,
}

/// Query parameters for GeoJSON enrichment.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct GeometryQuery {
    /// Use bilinear interpolation instead of nearest-neighbor lookup.
    #[serde(default)]
    pub interpolate: bool,
}

/// Successful elevation response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ElevationResponse {
    /// Elevation in meters. Reported as 0 when the raster has no data here.
    pub elevation: f64,
    /// Latitude queried.
    pub lat: f64,
    /// Longitude queried.
    pub lon: f64,
    /// Whether bilinear interpolation was used.
    pub interpolated: bool,
    /// Whether the raster has no data at this point.
    pub void: bool,
}

/// A route point.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, ToSchema)]
pub struct RoutePoint {
    pub lat: f64,
    pub lon: f64,
}

/// Route profile request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ProfileRequest {
    /// Route points in travel order.
    pub points: Vec<RoutePoint>,
    /// Samples per leg between consecutive points. Default is 10.
    pub samples_per_segment: Option<usize>,
    /// Use bilinear interpolation instead of nearest-neighbor lookup.
    #[serde(default)]
    pub interpolate: bool,
}

/// One profile sample.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProfilePoint {
    /// Fractional position along the route (leg index plus fraction).
    pub position: f64,
    pub lat: f64,
    pub lon: f64,
    /// Distance from the route start in meters.
    pub distance_m: f64,
    /// Elevation in meters, `null` when no tile covers the point.
    pub elevation: Option<f64>,
    /// Whether the raster has no data at this point.
    pub void: bool,
    /// Whether this sample is one of the request's route points.
    pub waypoint: bool,
}

/// Route profile response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProfileResponse {
    /// Total route length in meters.
    pub total_distance_m: f64,
    pub samples: Vec<ProfilePoint>,
}

/// Error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message.
    pub error: String,
}

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
}

/// Catalog and handle cache statistics response.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    /// Number of tiles in the catalog.
    pub tiles: usize,
    /// Raster handles currently open.
    pub open_handles: usize,
    /// Maximum raster handles open at once.
    pub max_open_handles: usize,
    /// Accesses served by an open handle.
    pub cache_hits: u64,
    /// Accesses that opened a handle.
    pub cache_misses: u64,
    /// Handles closed to make room.
    pub evictions: u64,
    /// Tiles disabled after a read failure.
    pub unavailable_tiles: usize,
    /// Cache hit rate (0.0 to 1.0).
    pub hit_rate: f64,
}

fn mode(interpolate: bool) -> SampleMode {
    if interpolate {
        SampleMode::Bilinear
    } else {
        SampleMode::Nearest
    }
}

/// Replace no-data values with 0, reporting whether one was found.
fn void_to_zero(elevation: f64) -> (f64, bool) {
    if elevation.is_nan() || elevation < LOWEST_ELEVATION_M {
        (0.0, true)
    } else {
        (elevation, false)
    }
}

/// Get elevation for given coordinates.
///
/// # Returns
///
/// - `200 OK` with elevation data on success
/// - `400 Bad Request` if coordinates are invalid
/// - `404 Not Found` if no tile covers the point
/// - `503 Service Unavailable` if the covering tile cannot be read
#[utoipa::path(
    get,
    path = "/elevation",
    tag = "elevation",
    params(ElevationQuery),
    responses(
        (status = 200, description = "Elevation found", body = ElevationResponse),
        (status = 400, description = "Invalid coordinates", body = ErrorResponse),
        (status = 404, description = "No tile covers the point", body = ErrorResponse),
        (status = 503, description = "Tile cannot be read", body = ErrorResponse)
    )
)]
#[axum::debug_handler]
pub async fn get_elevation(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ElevationQuery>,
) -> Response {
    tracing::debug!(
        lat = query.lat,
        lon = query.lon,
        interpolate = query.interpolate,
        "Elevation query"
    );

    let (lat, lon, sample_mode) = (query.lat, query.lon, mode(query.interpolate));
    match blocking(move || state.service.sample(lat, lon, sample_mode)).await {
        Ok(raw) => {
            let (elevation, void) = void_to_zero(raw);
            tracing::info!(
                lat = query.lat,
                lon = query.lon,
                elevation = elevation,
                void = void,
                interpolated = query.interpolate,
                "Elevation found"
            );
            (
                StatusCode::OK,
                Json(ElevationResponse {
                    elevation,
                    lat: query.lat,
                    lon: query.lon,
                    interpolated: query.interpolate,
                    void,
                }),
            )
                .into_response()
        }
        Err(response) => response,
    }
}

/// Add elevations to every coordinate of a GeoJSON geometry.
///
/// Coordinates covered by a tile get a third (Z) value; others are returned
/// unchanged.
#[utoipa::path(
    post,
    path = "/elevation",
    tag = "elevation",
    params(GeometryQuery),
    request_body(content = Object, description = "GeoJSON geometry", content_type = "application/json"),
    responses(
        (status = 200, description = "Geometry with elevations as Z values", body = Object),
        (status = 400, description = "Invalid coordinates", body = ErrorResponse),
        (status = 503, description = "Tile cannot be read", body = ErrorResponse)
    )
)]
pub async fn post_elevation(
    State(state): State<Arc<AppState>>,
    Query(query): Query<GeometryQuery>,
    Json(geometry): Json<Geometry>,
) -> Response {
    let sample_mode = mode(query.interpolate);
    match blocking(move || add_elevations_to_geometry(&state.service, geometry, sample_mode)).await
    {
        Ok(geometry) => (StatusCode::OK, Json(geometry)).into_response(),
        Err(response) => response,
    }
}

/// Sample an elevation profile along a route.
#[utoipa::path(
    post,
    path = "/profile",
    tag = "elevation",
    request_body = ProfileRequest,
    responses(
        (status = 200, description = "Profile samples", body = ProfileResponse),
        (status = 400, description = "Invalid route", body = ErrorResponse),
        (status = 503, description = "Tile cannot be read", body = ErrorResponse)
    )
)]
pub async fn post_profile(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ProfileRequest>,
) -> Response {
    if request.points.is_empty() {
        return error_response(&EleError::InvalidArgument(
            "route needs at least one point".to_string(),
        ));
    }

    let route: Vec<(f64, f64)> = request.points.iter().map(|p| (p.lat, p.lon)).collect();
    let points = route.len();
    let samples_per_segment = request
        .samples_per_segment
        .unwrap_or(DEFAULT_SAMPLES_PER_SEGMENT);
    let sample_mode = mode(request.interpolate);

    let profile = match blocking(move || {
        elevation_profile(&state.service, &route, samples_per_segment, sample_mode)
    })
    .await
    {
        Ok(profile) => profile,
        Err(response) => return response,
    };

    let total_distance_m = profile.last().map(|s| s.distance_m).unwrap_or(0.0);
    let samples = profile
        .into_iter()
        .map(|sample| {
            let (elevation, void) = match sample.elevation.map(void_to_zero) {
                Some((elevation, void)) => (Some(elevation), void),
                None => (None, false),
            };
            ProfilePoint {
                position: sample.position,
                lat: sample.lat,
                lon: sample.lon,
                distance_m: sample.distance_m,
                elevation,
                void,
                waypoint: sample.is_waypoint,
            }
        })
        .collect::<Vec<_>>();

    tracing::info!(
        points = points,
        samples = samples.len(),
        total_distance_m = total_distance_m,
        "Profile computed"
    );

    (
        StatusCode::OK,
        Json(ProfileResponse {
            total_distance_m,
            samples,
        }),
    )
        .into_response()
}

/// Get a rendered map tile, rendering it on first request.
///
/// The last path segment may carry a `.png` suffix.
#[utoipa::path(
    get,
    path = "/tiles/{z}/{x}/{y}",
    tag = "tiles",
    params(
        ("z" = u8, Path, description = "Zoom level"),
        ("x" = u32, Path, description = "Tile column"),
        ("y" = String, Path, description = "Tile row, optionally with .png suffix")
    ),
    responses(
        (status = 200, description = "PNG image", content_type = "image/png"),
        (status = 400, description = "Invalid tile coordinates", body = ErrorResponse),
        (status = 503, description = "Tile cannot be rendered", body = ErrorResponse)
    )
)]
pub async fn get_tile(
    State(state): State<Arc<AppState>>,
    Path((z, x, y)): Path<(u8, u32, String)>,
) -> Response {
    let y = match y.strip_suffix(".png").unwrap_or(y.as_str()).parse::<u32>() {
        Ok(y) => y,
        Err(_) => {
            return error_response(&EleError::InvalidArgument(format!(
                "tile row is not a number: {:?}",
                y
            )))
        }
    };
    let coord = match TileCoord::new(z, x, y) {
        Ok(coord) => coord,
        Err(e) => return error_response(&e),
    };

    let result = blocking(move || {
        let config = RenderConfig {
            output_root: state.tile_dir.clone(),
            max_zoom: coord.z,
            mode: state.render_mode,
            ramp: state.ramp.clone(),
            ..RenderConfig::default()
        };
        let renderer = Renderer::new(&state.service, config);
        renderer.render_tile(coord)?;
        Ok::<_, EleError>(std::fs::read(renderer.tile_path(coord))?)
    })
    .await;

    match result {
        Ok(png) => {
            tracing::debug!(tile = %coord, bytes = png.len(), "Serving tile");
            ([(header::CONTENT_TYPE, "image/png")], png).into_response()
        }
        Err(response) => response,
    }
}

/// Run a library call on the blocking pool.
///
/// Sampling opens and reads raster files, and may wait for a free handle, so
/// it stays off the async worker threads.
async fn blocking<T, F>(f: F) -> Result<T, Response>
where
    F: FnOnce() -> ele::Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(error_response(&e)),
        Err(e) => {
            tracing::error!(error = %e, "Blocking task failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "internal task failed".to_string(),
                }),
            )
                .into_response())
        }
    }
}

/// Map a library error to an HTTP error response.
fn error_response(e: &EleError) -> Response {
    let status = status_for(e);
    if status.is_server_error() {
        tracing::warn!(error = %e, status = status.as_u16(), "Request failed");
    } else {
        tracing::debug!(error = %e, status = status.as_u16(), "Request rejected");
    }

    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
        .into_response()
}

fn status_for(e: &EleError) -> StatusCode {
    match e {
        EleError::InvalidCoordinate { .. }
        | EleError::InvalidTile { .. }
        | EleError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        EleError::NotFound { .. } => StatusCode::NOT_FOUND,
        EleError::RasterRead { .. } | EleError::TileUnavailable { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        EleError::RenderFailed { source, .. } => status_for(source),
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Health check endpoint.
///
/// Returns service status and version.
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses((status = 200, description = "Service is healthy", body = HealthResponse))
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Get catalog and handle cache statistics.
#[utoipa::path(
    get,
    path = "/stats",
    tag = "system",
    responses((status = 200, description = "Cache statistics", body = StatsResponse))
)]
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let stats = state.service.cache_stats();

    Json(StatsResponse {
        tiles: state.service.catalog().len(),
        open_handles: stats.open_count,
        max_open_handles: stats.capacity,
        cache_hits: stats.hit_count,
        cache_misses: stats.miss_count,
        evictions: stats.eviction_count,
        unavailable_tiles: stats.unavailable_count,
        hit_rate: stats.hit_rate(),
    })
}
