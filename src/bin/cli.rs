//! trip-cluster CLI - Debug tool for trip clustering
//!
//! Usage:
//!   trip-cluster-cli cluster <photos.json> [--home LAT,LNG] [--config <cfg.json>] [--output <out.json>]
//!
//! The input is a JSON array of photo records (`id`, `creation_time` in ms,
//! optional `location` with `latitude`/`longitude`). The tool runs the
//! clustering pipeline and prints every trip with its days, photo count
//! and how many locations were inferred.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use trip_cluster::{Cluster, ClusterConfig, GpsPoint, Photo, TripEngine};

#[derive(Parser)]
#[command(name = "trip-cluster-cli")]
#[command(about = "Debug tool for photo trip clustering", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose debug output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Cluster a JSON photo dump into trips
    Cluster {
        /// JSON file with an array of photos
        photos: PathBuf,

        /// Home point as "LAT,LNG"
        #[arg(long, value_parser = parse_point)]
        home: Option<GpsPoint>,

        /// JSON file with clustering configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write the clusters as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format(|buf, record| writeln!(buf, "[{:5}] {}", record.level(), record.args()))
        .init();

    let result = match cli.command {
        Commands::Cluster {
            photos,
            home,
            config,
            output,
        } => run_cluster(&photos, home, config.as_deref(), output.as_deref(), cli.verbose),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn parse_point(value: &str) -> Result<GpsPoint, String> {
    let (lat, lng) = value
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LNG, got '{}'", value))?;
    let point = GpsPoint::new(
        lat.trim().parse().map_err(|e| format!("bad latitude: {}", e))?,
        lng.trim().parse().map_err(|e| format!("bad longitude: {}", e))?,
    );
    if !point.is_valid() {
        return Err(format!("coordinates out of range: {}", value));
    }
    Ok(point)
}

fn load_config(path: Option<&Path>) -> Result<ClusterConfig, String> {
    let Some(path) = path else {
        return Ok(ClusterConfig::default());
    };
    let text = fs::read_to_string(path)
        .map_err(|e| format!("reading {}: {}", path.display(), e))?;
    serde_json::from_str(&text).map_err(|e| format!("parsing {}: {}", path.display(), e))
}

fn load_photos(path: &Path) -> Result<Vec<Photo>, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("reading {}: {}", path.display(), e))?;
    serde_json::from_str(&text).map_err(|e| format!("parsing {}: {}", path.display(), e))
}

fn format_day(timestamp_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

fn run_cluster(
    photos_path: &Path,
    home: Option<GpsPoint>,
    config_path: Option<&Path>,
    output: Option<&Path>,
    verbose: bool,
) -> Result<(), String> {
    let config = load_config(config_path)?;
    let photos = load_photos(photos_path)?;

    println!("\n{}", "=".repeat(60));
    println!("TRIP CLUSTERING");
    println!("{}", "=".repeat(60));
    println!("  Photos: {}", photos.len());
    println!(
        "  With GPS: {}",
        photos.iter().filter(|p| p.location.is_some()).count()
    );

    let mut engine = TripEngine::with_config(config).map_err(|e| e.to_string())?;
    if let Some(home) = home {
        engine.set_home(home);
    }
    engine.initial(photos);

    let stats = engine.stats();
    println!("\n{}", "-".repeat(60));
    println!(
        "RESULTS: {} clusters ({} vacations), {} locations inferred",
        stats.cluster_count, stats.vacation_count, stats.inferred_photo_count
    );
    println!("{}", "-".repeat(60));

    for cluster in engine.clusters() {
        print_cluster(cluster, verbose);
    }

    if let Some(path) = output {
        let file = File::create(path).map_err(|e| format!("creating {}: {}", path.display(), e))?;
        serde_json::to_writer_pretty(BufWriter::new(file), engine.clusters())
            .map_err(|e| format!("writing {}: {}", path.display(), e))?;
        println!("\nWrote clusters to {}", path.display());
    }

    Ok(())
}

fn print_cluster(cluster: &Cluster, verbose: bool) {
    let location = cluster
        .location
        .map(|p| format!("({:.4}, {:.4})", p.latitude, p.longitude))
        .unwrap_or_else(|| "-".to_string());

    println!(
        "\n  {} {} .. {} ({} days)",
        cluster.id,
        format_day(cluster.start_date),
        format_day(cluster.end_date),
        cluster.days
    );
    println!(
        "    Location: {} {}",
        location,
        cluster.location_name.as_deref().unwrap_or("")
    );
    println!(
        "    Photos: {}{}",
        cluster.photo_count(),
        if cluster.is_vacation { " [vacation]" } else { "" }
    );

    if verbose {
        for photo in &cluster.photos {
            println!(
                "      {} {}{}",
                photo.id,
                photo.creation_time,
                if photo.location_inferred { " (inferred)" } else { "" }
            );
        }
    }
}
