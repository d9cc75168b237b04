use anyhow::Result;
use clap::{Parser, Subcommand};
use ele::EvictionKind;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::ServiceOptions;

/// Elevation tile catalog CLI tool
#[derive(Parser)]
#[command(name = "ele")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Tile manifest file
    #[arg(short, long, env = "ELE_MANIFEST", global = true)]
    manifest: Option<PathBuf>,

    /// Maximum raster files open at once
    #[arg(long, env = "ELE_MAX_OPEN", default_value = "10", global = true)]
    max_open: usize,

    /// Eviction policy when the handle limit is reached (lru or random)
    #[arg(long, env = "ELE_EVICTION", default_value = "lru", global = true)]
    eviction: EvictionKind,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query elevation for a single coordinate
    Query {
        /// Latitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Longitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Use bilinear interpolation
        #[arg(short, long)]
        interpolate: bool,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Add elevations to every coordinate in a CSV or GeoJSON file
    Batch {
        /// Input file (CSV or GeoJSON)
        input: PathBuf,

        /// Output file (same format as input if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Column name for latitude (CSV only)
        #[arg(long, default_value = "lat")]
        lat_col: String,

        /// Column name for longitude (CSV only)
        #[arg(long, default_value = "lon")]
        lon_col: String,

        /// Use bilinear interpolation
        #[arg(short, long)]
        interpolate: bool,
    },

    /// Elevation profile along a route read from CSV or GeoJSON
    Profile {
        /// Route file: CSV with lat/lon columns, or a GeoJSON LineString
        input: PathBuf,

        /// Output CSV file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Samples per leg between consecutive route points
        #[arg(short = 'k', long, default_value = "10")]
        samples: usize,

        /// Use bilinear interpolation
        #[arg(short, long)]
        interpolate: bool,
    },

    /// Render a pyramid of PNG map tiles
    Render {
        /// Zoom level of the root tile
        #[arg(short, long)]
        zoom: u8,

        /// Deepest zoom level to render
        #[arg(long)]
        max_zoom: u8,

        /// Root tile column
        #[arg(short, long, required_unless_present = "lat")]
        x: Option<u32>,

        /// Root tile row
        #[arg(short, long, required_unless_present = "lat")]
        y: Option<u32>,

        /// Pick the root tile containing this latitude
        #[arg(long, requires = "lon", conflicts_with_all = ["x", "y"], allow_hyphen_values = true)]
        lat: Option<f64>,

        /// Pick the root tile containing this longitude
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,

        /// Output directory for z/x/y.png
        #[arg(short, long, env = "ELE_TILE_DIR", default_value = "tiles")]
        output: PathBuf,

        /// Elevation drawn darkest
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        min_elevation: f64,

        /// Elevation drawn brightest
        #[arg(long, default_value = "1000")]
        max_elevation: f64,

        /// Re-render tiles that already exist
        #[arg(short, long)]
        force: bool,

        /// Render subtrees on all cores
        #[arg(short, long)]
        parallel: bool,

        /// Use bilinear interpolation
        #[arg(short, long)]
        interpolate: bool,
    },

    /// Index raster files in a directory and write a manifest
    Index {
        /// Directory containing .hgt/.bil/.raw/.tif files
        dir: PathBuf,

        /// Manifest to write (default: <dir>/tiles.txt)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Describe a single raster file
    Info {
        /// Path to a raster file
        path: PathBuf,
    },

    /// List the tiles in the catalog
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "ele=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let options = ServiceOptions {
        manifest: cli.manifest,
        max_open: cli.max_open,
        eviction: cli.eviction,
    };

    match cli.command {
        Commands::Query {
            lat,
            lon,
            interpolate,
            json,
        } => commands::query::run(&options, lat, lon, interpolate, json),
        Commands::Batch {
            input,
            output,
            lat_col,
            lon_col,
            interpolate,
        } => commands::batch::run(&options, input, output, lat_col, lon_col, interpolate),
        Commands::Profile {
            input,
            output,
            samples,
            interpolate,
        } => commands::profile::run(&options, input, output, samples, interpolate),
        Commands::Render {
            zoom,
            max_zoom,
            x,
            y,
            lat,
            lon,
            output,
            min_elevation,
            max_elevation,
            force,
            parallel,
            interpolate,
        } => commands::render::run(
            &options,
            commands::render::RenderArgs {
                zoom,
                max_zoom,
                x,
                y,
                lat,
                lon,
                output,
                min_elevation,
                max_elevation,
                force,
                parallel,
                interpolate,
            },
        ),
        Commands::Index { dir, output } => commands::index::run(dir, output),
        Commands::Info { path } => commands::info::run(path),
        Commands::List => commands::list::run(&options),
    }
}
