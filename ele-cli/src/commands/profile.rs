use anyhow::{bail, Context, Result};
use ele::{elevation_profile, geojson::route_from_geometry, ProfileSample};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::{format_elevation, sample_mode, ServiceOptions};

pub fn run(
    options: &ServiceOptions,
    input: PathBuf,
    output: Option<PathBuf>,
    samples: usize,
    interpolate: bool,
) -> Result<()> {
    let route = read_route(&input)?;
    if route.is_empty() {
        bail!("Route in {} has no points", input.display());
    }

    let service = options.build()?;
    let profile = elevation_profile(&service, &route, samples, sample_mode(interpolate))
        .context("Failed to compute profile")?;

    let sink: Box<dyn Write> = match &output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).context("Failed to create output file")?,
        )),
        None => Box::new(io::stdout().lock()),
    };
    write_profile(sink, &profile, interpolate)?;

    if let Some(path) = output {
        let total = profile.last().map(|s| s.distance_m).unwrap_or(0.0);
        eprintln!(
            "{} samples over {:.1} km written to: {}",
            profile.len(),
            total / 1000.0,
            path.display()
        );
    }
    Ok(())
}

/// Read `(lat, lon)` route points from a CSV file (`lat`, `lon` columns) or a
/// GeoJSON line geometry.
fn read_route(input: &Path) -> Result<Vec<(f64, f64)>> {
    let extension = input
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    let file = File::open(input).context("Failed to open route file")?;
    let reader = BufReader::new(file);

    match extension.as_str() {
        "csv" => read_csv_route(reader),
        "geojson" | "json" => {
            let geojson: geojson::GeoJson =
                serde_json::from_reader(reader).context("Failed to parse GeoJSON")?;
            let geometry = match geojson {
                geojson::GeoJson::Geometry(geometry) => Some(geometry),
                geojson::GeoJson::Feature(feature) => feature.geometry,
                geojson::GeoJson::FeatureCollection(fc) => {
                    fc.features.into_iter().find_map(|f| f.geometry)
                }
            };
            let geometry = geometry.context("GeoJSON contains no geometry")?;
            Ok(route_from_geometry(&geometry)?)
        }
        _ => bail!(
            "Unsupported file format: {}. Use .csv or .geojson",
            extension
        ),
    }
}

fn read_csv_route<R: io::Read>(reader: R) -> Result<Vec<(f64, f64)>> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers = reader.headers()?.clone();
    let lat_idx = headers
        .iter()
        .position(|h| h.trim() == "lat")
        .context("Column 'lat' not found in CSV")?;
    let lon_idx = headers
        .iter()
        .position(|h| h.trim() == "lon")
        .context("Column 'lon' not found in CSV")?;

    reader
        .records()
        .enumerate()
        .map(|(i, record)| {
            let record = record?;
            let field = |idx: usize, name: &str| -> Result<f64> {
                record
                    .get(idx)
                    .with_context(|| format!("Missing {} on row {}", name, i + 1))?
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid {} on row {}", name, i + 1))
            };
            Ok((field(lat_idx, "latitude")?, field(lon_idx, "longitude")?))
        })
        .collect()
}

fn write_profile<W: Write>(sink: W, profile: &[ProfileSample], interpolate: bool) -> Result<()> {
    let mut writer = csv::Writer::from_writer(sink);
    writer.write_record(["position", "lat", "lon", "distance_m", "elevation", "waypoint"])?;
    for sample in profile {
        writer.write_record([
            format!("{:.4}", sample.position),
            format!("{:.6}", sample.lat),
            format!("{:.6}", sample.lon),
            format!("{:.1}", sample.distance_m),
            format_elevation(sample.elevation, interpolate),
            sample.is_waypoint.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_read_csv_route() {
        let route = read_csv_route("name,lat,lon\na,54.5,-1.1\nb, 54.6 ,-1.0\n".as_bytes()).unwrap();
        assert_eq!(route, vec![(54.5, -1.1), (54.6, -1.0)]);

        assert!(read_csv_route("lat,lon\nx,1\n".as_bytes()).is_err());
        assert!(read_csv_route("y,x\n1,2\n".as_bytes()).is_err());
    }

    #[test]
    fn test_read_geojson_route() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("route.geojson");
        fs::write(
            &path,
            r#"{"type": "Feature", "properties": {}, "geometry":
                {"type": "LineString", "coordinates": [[-1.1, 54.5], [-1.0, 54.6]]}}"#,
        )
        .unwrap();

        let route = read_route(&path).unwrap();
        assert_eq!(route, vec![(54.5, -1.1), (54.6, -1.0)]);
    }

    #[test]
    fn test_write_profile() {
        let profile = vec![
            ProfileSample {
                position: 0.0,
                lat: 54.5,
                lon: -1.1,
                distance_m: 0.0,
                elevation: Some(320.0),
                is_waypoint: true,
            },
            ProfileSample {
                position: 0.5,
                lat: 54.55,
                lon: -1.05,
                distance_m: 6543.21,
                elevation: None,
                is_waypoint: false,
            },
        ];

        let mut out = Vec::new();
        write_profile(&mut out, &profile, false).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "position,lat,lon,distance_m,elevation,waypoint");
        assert_eq!(lines[1], "0.0000,54.500000,-1.100000,0.0,320,true");
        assert_eq!(lines[2], "0.5000,54.550000,-1.050000,6543.2,-,false");
    }
}
