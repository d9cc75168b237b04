//! ele Service - HTTP microservice for elevation queries.
//!
//! A REST API over a catalog of elevation raster tiles.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `ELE_MANIFEST` | Tile manifest path | Required |
//! | `ELE_MAX_OPEN` | Maximum open raster handles | 10 |
//! | `ELE_EVICTION` | Eviction policy: `lru` or `random` | `lru` |
//! | `ELE_PORT` | HTTP server port | 8080 |
//! | `ELE_TILE_DIR` | Directory for rendered map tiles | `./tiles` |
//! | `ELE_PRELOAD` | `all` or `min_lat,min_lon,max_lat,max_lon;...` | None |
//! | `RUST_LOG` | Log level (e.g., "info", "debug") | "info" |
//!
//! ## Endpoints
//!
//! - `GET /elevation?lat=X&lon=Y&interpolate=true` - Get elevation at coordinates
//! - `POST /elevation` - Add elevations to a GeoJSON geometry
//! - `POST /profile` - Elevation profile along a route
//! - `GET /tiles/{z}/{x}/{y}.png` - Rendered elevation map tile
//! - `GET /health` - Health check
//! - `GET /stats` - Cache statistics
//! - `GET /docs` - OpenAPI documentation (Swagger UI)

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use ele::ElevationServiceBuilder;
use ele_service::{app, parse_preload_bounds, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ele_service=info,ele=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load service-specific config
    let port: u16 = std::env::var("ELE_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);
    let tile_dir = std::env::var("ELE_TILE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("tiles"));

    // The library handles ELE_MANIFEST, ELE_MAX_OPEN and ELE_EVICTION
    let service = ElevationServiceBuilder::from_env()?.build()?;

    tracing::info!(
        tiles = service.catalog().len(),
        max_open = service.cache_capacity(),
        tile_dir = %tile_dir.display(),
        port = port,
        "Starting ele service"
    );

    if let Ok(preload_val) = std::env::var("ELE_PRELOAD") {
        let bounds = parse_preload_bounds(&preload_val);
        let bounds_ref = bounds.as_deref();
        tracing::info!(
            bounds = ?bounds_ref.map(|b| b.len()),
            "Preloading raster handles"
        );
        let stats = service.preload(bounds_ref);
        tracing::info!(
            tiles_loaded = stats.tiles_loaded,
            tiles_already_open = stats.tiles_already_open,
            tiles_failed = stats.tiles_failed,
            tiles_skipped = stats.tiles_skipped,
            tiles_matched = stats.tiles_matched,
            elapsed_ms = stats.elapsed_ms,
            "Preload complete"
        );
    }

    let state = Arc::new(AppState::new(service, tile_dir));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app(state)).await?;

    Ok(())
}
