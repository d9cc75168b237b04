use anyhow::{bail, Context, Result};
use ele::{geojson::add_elevations_to_geometry, ElevationService, SampleMode};
use geojson::{Feature, GeoJson};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::{format_elevation, sample_mode, ServiceOptions};

/// Rows sampled per `sample_batch` call.
const CHUNK_SIZE: usize = 1024;

pub fn run(
    options: &ServiceOptions,
    input: PathBuf,
    output: Option<PathBuf>,
    lat_col: String,
    lon_col: String,
    interpolate: bool,
) -> Result<()> {
    let service = options.build()?;
    let mode = sample_mode(interpolate);

    // Detect file format
    let extension = input
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "csv" => process_csv(&service, &input, output, &lat_col, &lon_col, mode),
        "geojson" | "json" => process_geojson(&service, &input, output, mode),
        other => bail!(
            "Cannot batch-process '.{}' files, expected .csv, .geojson or .json",
            other
        ),
    }
}

fn progress_bar(total: u64) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn default_output(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}_elevation.{}", stem, suffix))
}

fn process_csv(
    service: &ElevationService,
    input: &Path,
    output: Option<PathBuf>,
    lat_col: &str,
    lon_col: &str,
    mode: SampleMode,
) -> Result<()> {
    let file = File::open(input).context("Failed to open input file")?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));

    let headers = reader.headers()?.clone();
    let lat_idx = column_index(&headers, lat_col)?;
    let lon_idx = column_index(&headers, lon_col)?;

    let records: Vec<_> = reader.records().collect::<Result<_, _>>()?;
    let coords = records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let field = |idx: usize, name: &str| -> Result<f64> {
                let raw = record
                    .get(idx)
                    .with_context(|| format!("Row {} has no {} field", i + 1, name))?;
                raw.trim()
                    .parse()
                    .with_context(|| format!("Row {}: {} is not a number: {:?}", i + 1, name, raw))
            };
            Ok((field(lat_idx, "latitude")?, field(lon_idx, "longitude")?))
        })
        .collect::<Result<Vec<_>>>()?;

    let pb = progress_bar(coords.len() as u64)?;

    let output_path = output.unwrap_or_else(|| default_output(input, "csv"));
    let output_file = File::create(&output_path).context("Failed to create output file")?;
    let mut writer = csv::Writer::from_writer(BufWriter::new(output_file));

    writer.write_record(headers.iter().chain(["elevation"]))?;

    for (records, coords) in records.chunks(CHUNK_SIZE).zip(coords.chunks(CHUNK_SIZE)) {
        let elevations = service
            .sample_batch(coords, mode)
            .context("Failed to get elevations")?;

        for (record, elevation) in records.iter().zip(elevations) {
            let elevation = format_elevation(elevation, mode == SampleMode::Bilinear);
            writer.write_record(record.iter().chain([elevation.as_str()]))?;
        }
        pb.inc(records.len() as u64);
    }

    pb.finish_with_message("done");
    writer.flush()?;

    println!("Output written to: {}", output_path.display());
    Ok(())
}

fn process_geojson(
    service: &ElevationService,
    input: &Path,
    output: Option<PathBuf>,
    mode: SampleMode,
) -> Result<()> {
    let file = File::open(input).context("Failed to open input file")?;
    let document: GeoJson = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("{} is not valid GeoJSON", input.display()))?;

    let result = match document {
        GeoJson::Geometry(geometry) => {
            GeoJson::Geometry(add_elevations_to_geometry(service, geometry, mode)?)
        }
        GeoJson::Feature(mut feature) => {
            enrich_feature(service, &mut feature, mode)?;
            GeoJson::Feature(feature)
        }
        GeoJson::FeatureCollection(mut collection) => {
            let pb = progress_bar(collection.features.len() as u64)?;
            for feature in &mut collection.features {
                enrich_feature(service, feature, mode)?;
                pb.inc(1);
            }
            pb.finish_with_message("done");
            GeoJson::FeatureCollection(collection)
        }
    };

    let output_path = output.unwrap_or_else(|| default_output(input, "geojson"));
    let output_file = File::create(&output_path).context("Failed to create output file")?;
    let mut writer = BufWriter::new(output_file);
    serde_json::to_writer_pretty(&mut writer, &result)?;
    writer.flush()?;

    println!("Output written to: {}", output_path.display());
    Ok(())
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .with_context(|| format!("CSV has no '{}' column", name))
}

fn enrich_feature(
    service: &ElevationService,
    feature: &mut Feature,
    mode: SampleMode,
) -> Result<()> {
    if let Some(geometry) = feature.geometry.take() {
        feature.geometry = Some(add_elevations_to_geometry(service, geometry, mode)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_index() {
        let headers = csv::StringRecord::from(vec!["name", " lat", "lon"]);
        assert_eq!(column_index(&headers, "lat").unwrap(), 1);
        assert_eq!(column_index(&headers, "lon").unwrap(), 2);
        assert!(column_index(&headers, "latitude").is_err());
    }

    #[test]
    fn test_default_output() {
        assert_eq!(
            default_output(Path::new("/data/points.csv"), "csv"),
            PathBuf::from("/data/points_elevation.csv")
        );
        assert_eq!(
            default_output(Path::new("route.json"), "geojson"),
            PathBuf::from("route_elevation.geojson")
        );
    }
}
