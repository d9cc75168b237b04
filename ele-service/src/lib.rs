//! ele Service Library
//!
//! HTTP handlers, router and configuration helpers for the elevation service.
//! This library is used by both the ele-service binary and integration tests.

pub mod handlers;

use std::path::PathBuf;
use std::sync::Arc;

use axum::{routing::get, routing::post, Router};
use ele::{BoundingBox, ColorRamp, ElevationService, SampleMode};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Application state shared across handlers.
pub struct AppState {
    /// Elevation queries over the tile catalog.
    pub service: ElevationService,
    /// Root directory for rendered `z/x/y.png` tiles.
    pub tile_dir: PathBuf,
    /// Sampling used when rendering tiles.
    pub render_mode: SampleMode,
    /// Colours used when rendering tiles.
    pub ramp: ColorRamp,
}

impl AppState {
    /// State with default rendering options.
    pub fn new(service: ElevationService, tile_dir: impl Into<PathBuf>) -> Self {
        Self {
            service,
            tile_dir: tile_dir.into(),
            render_mode: SampleMode::Nearest,
            ramp: ColorRamp::default(),
        }
    }
}

// Re-export commonly used types for convenience
pub use handlers::{
    ElevationQuery, ElevationResponse, ErrorResponse, HealthResponse, ProfilePoint,
    ProfileRequest, ProfileResponse, RoutePoint, StatsResponse,
};

/// OpenAPI documentation for the elevation service.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "ele Elevation Service",
        version = "0.1.0",
        description = "REST API for elevation queries, route profiles and rendered elevation map tiles.",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    paths(
        handlers::get_elevation,
        handlers::post_elevation,
        handlers::post_profile,
        handlers::get_tile,
        handlers::health_check,
        handlers::get_stats,
    ),
    components(
        schemas(
            handlers::ElevationResponse,
            handlers::RoutePoint,
            handlers::ProfileRequest,
            handlers::ProfilePoint,
            handlers::ProfileResponse,
            handlers::ErrorResponse,
            handlers::HealthResponse,
            handlers::StatsResponse,
        )
    ),
    tags(
        (name = "elevation", description = "Elevation query endpoints"),
        (name = "tiles", description = "Rendered map tiles"),
        (name = "system", description = "System and health endpoints")
    )
)]
pub struct ApiDoc;

/// Build the router with all endpoints, OpenAPI docs and middleware.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route(
            "/elevation",
            get(handlers::get_elevation).post(handlers::post_elevation),
        )
        .route("/profile", post(handlers::post_profile))
        .route("/tiles/:z/:x/:y", get(handlers::get_tile))
        .route("/health", get(handlers::health_check))
        .route("/stats", get(handlers::get_stats))
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(state)
}

/// Parse the `ELE_PRELOAD` environment variable value into bounding boxes.
///
/// Supported formats:
/// - `true`, `all`, `1`: preload all tiles (returns `None`)
/// - `min_lat,min_lon,max_lat,max_lon`: single bounding box
/// - `min_lat,min_lon,max_lat,max_lon;min_lat,min_lon,max_lat,max_lon`: multiple bounding boxes
///
/// Malformed boxes are skipped with a warning. If nothing parses, all tiles
/// are preloaded.
pub fn parse_preload_bounds(value: &str) -> Option<Vec<BoundingBox>> {
    let trimmed = value.trim();

    match trimmed.to_lowercase().as_str() {
        "true" | "all" | "1" => return None,
        _ => {}
    }

    let boxes: Vec<BoundingBox> = trimmed
        .split(';')
        .filter(|s| !s.trim().is_empty())
        .filter_map(|bbox_str| {
            let parts: Vec<f64> = bbox_str
                .split(',')
                .filter_map(|s| s.trim().parse::<f64>().ok())
                .collect();
            match parts[..] {
                [min_lat, min_lon, max_lat, max_lon] if min_lat < max_lat && min_lon < max_lon => {
                    Some(BoundingBox::from_min_max(min_lat, min_lon, max_lat, max_lon))
                }
                _ => {
                    tracing::warn!(
                        bbox = bbox_str,
                        "Invalid bounding box format, expected min_lat,min_lon,max_lat,max_lon"
                    );
                    None
                }
            }
        })
        .collect();

    if boxes.is_empty() {
        tracing::warn!(
            value = trimmed,
            "Could not parse ELE_PRELOAD value, preloading all tiles"
        );
        None
    } else {
        Some(boxes)
    }
}
