//! Integration tests for the HTTP API.

use axum::http::StatusCode;
use axum_test::TestServer;
use ele::{ElevationService, TileCoord, VOID_VALUE};
use ele_service::{app, AppState};
use geojson::{Geometry, Value as GeoJsonValue};
use serde_json::{json, Value};
use std::fs;
use std::future::IntoFuture;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Write a 100×100 big-endian grid filled with `value` and return its
/// manifest line for N=55 S=54 E=0 W=-1, shifted `north_offset` degrees.
fn create_test_grid(dir: &Path, name: &str, value: i16, north_offset: f64) -> String {
    let data: Vec<u8> = std::iter::repeat(value.to_be_bytes())
        .take(100 * 100)
        .flatten()
        .collect();
    fs::write(dir.join(name), data).unwrap();
    format!(
        "{} {} {} 0.0 -1.0 -0.01 0.01 100 100\n",
        name,
        55.0 + north_offset,
        54.0 + north_offset
    )
}

/// Create a test server over a manifest written into `temp_dir`.
fn create_test_server(temp_dir: &TempDir, manifest: &str) -> TestServer {
    let path = temp_dir.path().join("tiles.txt");
    fs::write(&path, manifest).unwrap();
    let service = ElevationService::builder(&path).build().unwrap();
    let state = Arc::new(AppState::new(service, temp_dir.path().join("rendered")));

    TestServer::new(app(state)).unwrap()
}

fn moors_server(temp_dir: &TempDir) -> TestServer {
    let manifest = create_test_grid(temp_dir.path(), "moors.bil", 100, 0.0);
    create_test_server(temp_dir, &manifest)
}

#[tokio::test]
async fn test_elevation_endpoint_success() {
    let temp_dir = TempDir::new().unwrap();
    let server = moors_server(&temp_dir);

    let response = server.get("/elevation?lat=54.5&lon=-0.5").await;

    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["elevation"], 100.0);
    assert_eq!(json["lat"], 54.5);
    assert_eq!(json["lon"], -0.5);
    assert_eq!(json["interpolated"], false);
    assert_eq!(json["void"], false);
}

#[tokio::test]
async fn test_elevation_endpoint_interpolation() {
    let temp_dir = TempDir::new().unwrap();
    let server = moors_server(&temp_dir);

    let response = server
        .get("/elevation?lat=54.505&lon=-0.505&interpolate=true")
        .await;

    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["elevation"], 100.0);
    assert_eq!(json["interpolated"], true);
}

#[tokio::test]
async fn test_elevation_endpoint_invalid_coordinates() {
    let temp_dir = TempDir::new().unwrap();
    let server = moors_server(&temp_dir);

    let response = server.get("/elevation?lat=91.0&lon=0.0").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let json: Value = response.json();
    assert!(json["error"].as_str().unwrap().contains("out of bounds"));
}

#[tokio::test]
async fn test_elevation_endpoint_not_covered() {
    let temp_dir = TempDir::new().unwrap();
    let server = moors_server(&temp_dir);

    let response = server.get("/elevation?lat=50.0&lon=50.0").await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_elevation_endpoint_missing_params() {
    let temp_dir = TempDir::new().unwrap();
    let server = moors_server(&temp_dir);

    let response = server.get("/elevation?lon=-0.5").await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server.get("/elevation?lat=54.5").await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server.get("/elevation").await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_void_reported_as_zero() {
    let temp_dir = TempDir::new().unwrap();
    let manifest = create_test_grid(temp_dir.path(), "void.bil", VOID_VALUE, 0.0);
    let server = create_test_server(&temp_dir, &manifest);

    for query in [
        "/elevation?lat=54.5&lon=-0.5",
        "/elevation?lat=54.5&lon=-0.5&interpolate=true",
    ] {
        let response = server.get(query).await;
        response.assert_status_ok();
        let json: Value = response.json();
        assert_eq!(json["elevation"], 0.0);
        assert_eq!(json["void"], true);
    }
}

#[tokio::test]
async fn test_unreadable_tile_is_unavailable() {
    let temp_dir = TempDir::new().unwrap();
    let server = create_test_server(
        &temp_dir,
        "gone.bil 55.0 54.0 0.0 -1.0 -0.01 0.01 100 100\n",
    );

    let response = server.get("/elevation?lat=54.5&lon=-0.5").await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);

    let response = server.get("/elevation?lat=54.5&lon=-0.5").await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let json: Value = response.json();
    assert!(json["error"].as_str().unwrap().contains("unavailable"));

    let response = server.get("/stats").await;
    let json: Value = response.json();
    assert_eq!(json["unavailable_tiles"], 1);
}

#[tokio::test]
async fn test_health_endpoint() {
    let temp_dir = TempDir::new().unwrap();
    let server = moors_server(&temp_dir);

    let response = server.get("/health").await;

    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["status"], "healthy");
    assert!(json["version"].as_str().is_some());
}

#[tokio::test]
async fn test_stats_endpoint() {
    let temp_dir = TempDir::new().unwrap();
    let server = moors_server(&temp_dir);

    // Initial stats (no requests yet)
    let response = server.get("/stats").await;
    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["tiles"], 1);
    assert_eq!(json["open_handles"], 0);
    assert_eq!(json["max_open_handles"], 10);
    assert_eq!(json["cache_hits"], 0);
    assert_eq!(json["cache_misses"], 0);

    // First query opens the tile
    server.get("/elevation?lat=54.5&lon=-0.5").await;

    let response = server.get("/stats").await;
    let json: Value = response.json();
    assert_eq!(json["cache_misses"], 1);
    assert_eq!(json["open_handles"], 1);

    // Second query in the same tile reuses the handle
    server.get("/elevation?lat=54.6&lon=-0.6").await;

    let response = server.get("/stats").await;
    let json: Value = response.json();
    assert_eq!(json["cache_hits"], 1);
    assert_eq!(json["cache_misses"], 1);
}

// GeoJSON POST endpoint tests

#[tokio::test]
async fn test_geojson_point() {
    let temp_dir = TempDir::new().unwrap();
    let server = moors_server(&temp_dir);

    let geometry = Geometry::new(GeoJsonValue::Point(vec![-0.5, 54.5]));

    let response = server.post("/elevation").json(&geometry).await;

    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["type"], "Point");
    assert_eq!(json["coordinates"], json!([-0.5, 54.5, 100.0]));
}

#[tokio::test]
async fn test_geojson_linestring_partial_coverage() {
    let temp_dir = TempDir::new().unwrap();
    let server = moors_server(&temp_dir);

    let geometry = Geometry::new(GeoJsonValue::LineString(vec![
        vec![-0.5, 54.5],
        vec![10.0, 10.0],
    ]));

    let response = server
        .post("/elevation?interpolate=true")
        .json(&geometry)
        .await;

    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["coordinates"][0], json!([-0.5, 54.5, 100.0]));
    assert_eq!(json["coordinates"][1], json!([10.0, 10.0]));
}

#[tokio::test]
async fn test_geojson_invalid_coordinate() {
    let temp_dir = TempDir::new().unwrap();
    let server = moors_server(&temp_dir);

    let geometry = Geometry::new(GeoJsonValue::Point(vec![0.0, 95.0]));

    let response = server.post("/elevation").json(&geometry).await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

// Profile endpoint tests

#[tokio::test]
async fn test_profile_endpoint() {
    let temp_dir = TempDir::new().unwrap();
    let server = moors_server(&temp_dir);

    let response = server
        .post("/profile")
        .json(&json!({
            "points": [
                {"lat": 54.2, "lon": -0.8},
                {"lat": 54.8, "lon": -0.2},
                {"lat": 56.0, "lon": -0.2}
            ],
            "samples_per_segment": 4
        }))
        .await;

    response.assert_status_ok();
    let json: Value = response.json();
    let samples = json["samples"].as_array().unwrap();
    assert_eq!(samples.len(), 2 * 4 + 1);

    assert_eq!(samples[0]["position"], 0.0);
    assert_eq!(samples[0]["distance_m"], 0.0);
    assert_eq!(samples[0]["waypoint"], true);
    assert_eq!(samples[0]["elevation"], 100.0);
    assert_eq!(samples[1]["waypoint"], false);
    assert_eq!(samples[4]["waypoint"], true);

    // Last point lies north of the only tile
    assert!(samples[8]["elevation"].is_null());
    assert_eq!(samples[8]["void"], false);

    let total = json["total_distance_m"].as_f64().unwrap();
    assert_eq!(samples[8]["distance_m"].as_f64().unwrap(), total);
    assert!(total > 100_000.0);
}

#[tokio::test]
async fn test_profile_endpoint_rejects_bad_routes() {
    let temp_dir = TempDir::new().unwrap();
    let server = moors_server(&temp_dir);

    let response = server.post("/profile").json(&json!({"points": []})).await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server
        .post("/profile")
        .json(&json!({
            "points": [{"lat": 54.2, "lon": -0.8}, {"lat": 54.8, "lon": -0.2}],
            "samples_per_segment": 0
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

// Tile endpoint tests

#[tokio::test]
async fn test_tile_endpoint_renders_png() {
    let temp_dir = TempDir::new().unwrap();
    let server = moors_server(&temp_dir);
    let coord = TileCoord::from_lat_lon(54.5, -0.5, 6).unwrap();

    let url = format!("/tiles/{}/{}/{}.png", coord.z, coord.x, coord.y);
    let response = server.get(&url).await;

    response.assert_status_ok();
    assert_eq!(response.header("content-type"), "image/png");
    assert!(response.as_bytes().starts_with(b"\x89PNG\r\n\x1a\n"));
    assert!(coord.path(&temp_dir.path().join("rendered")).exists());

    // Served from disk the second time, with or without the suffix
    let url = format!("/tiles/{}/{}/{}", coord.z, coord.x, coord.y);
    let again = server.get(&url).await;
    again.assert_status_ok();
    assert_eq!(again.as_bytes(), response.as_bytes());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_tile_endpoint_concurrent_first_requests() {
    let temp_dir = TempDir::new().unwrap();
    let server = moors_server(&temp_dir);
    let coord = TileCoord::from_lat_lon(54.5, -0.5, 7).unwrap();
    let url = format!("/tiles/{}/{}/{}.png", coord.z, coord.x, coord.y);

    // Every request races to render the same uncached tile
    let (a, b, c, d) = tokio::join!(
        server.get(&url).into_future(),
        server.get(&url).into_future(),
        server.get(&url).into_future(),
        server.get(&url).into_future()
    );

    for response in [&a, &b, &c, &d] {
        response.assert_status_ok();
        assert!(response.as_bytes().starts_with(b"\x89PNG\r\n\x1a\n"));
    }
    assert_eq!(a.as_bytes(), d.as_bytes());

    let tile_dir = coord
        .path(&temp_dir.path().join("rendered"))
        .parent()
        .unwrap()
        .to_path_buf();
    assert_eq!(fs::read_dir(tile_dir).unwrap().count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_elevation_queries_alongside_tile_render() {
    let temp_dir = TempDir::new().unwrap();
    let server = moors_server(&temp_dir);
    let coord = TileCoord::from_lat_lon(54.5, -0.5, 8).unwrap();
    let url = format!("/tiles/{}/{}/{}.png", coord.z, coord.x, coord.y);

    let (tile, first, second) = tokio::join!(
        server.get(&url).into_future(),
        server.get("/elevation?lat=54.5&lon=-0.5").into_future(),
        server
            .get("/elevation?lat=54.2&lon=-0.8&interpolate=true")
            .into_future()
    );

    tile.assert_status_ok();
    first.assert_status_ok();
    second.assert_status_ok();
    assert_eq!(first.json::<Value>()["elevation"], 100.0);
    assert_eq!(second.json::<Value>()["elevation"], 100.0);
}

#[tokio::test]
async fn test_tile_endpoint_rejects_invalid_tiles() {
    let temp_dir = TempDir::new().unwrap();
    let server = moors_server(&temp_dir);

    let response = server.get("/tiles/3/9/0.png").await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server.get("/tiles/3/1/north.png").await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_openapi_document() {
    let temp_dir = TempDir::new().unwrap();
    let server = moors_server(&temp_dir);

    let response = server.get("/api-docs/openapi.json").await;

    response.assert_status_ok();
    let json: Value = response.json();
    for path in ["/elevation", "/profile", "/tiles/{z}/{x}/{y}", "/health", "/stats"] {
        assert!(json["paths"].get(path).is_some(), "missing {}", path);
    }
}
