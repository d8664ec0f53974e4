//! wayfare: lookup CLI
//!
//! Runs places, autocomplete and geocoding lookups through the request
//! optimizer and prints the results as JSON.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use futures_util::future::try_join_all;
use serde::Serialize;
use tracing::info;

use wayfare::config::{API_KEY_ENV, Config};
use wayfare::{LatLng, LookupService, NearbyQuery, PlacesClient, RequestOptimizer, WayfareError};

/// Wayfare lookup client
#[derive(Parser)]
#[command(name = "wayfare")]
#[command(version)]
#[command(about = "Cached, rate-limited places lookups")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, env = "WAYFARE_CONFIG")]
    config: Option<PathBuf>,

    /// Issue the same lookup this many times concurrently (they coalesce
    /// into one provider call).
    #[arg(long, default_value_t = 1)]
    repeat: usize,

    /// Print optimizer statistics to stderr afterwards.
    #[arg(long)]
    stats: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search for places near a coordinate
    Nearby {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        /// Place type, e.g. "restaurant"
        #[arg(short = 't', long = "type", default_value = "tourist_attraction")]
        place_type: String,
        /// Radius in metres
        #[arg(short, long, default_value_t = 1000)]
        radius: u32,
    },

    /// Complete a partial place name
    Autocomplete {
        input: String,
    },

    /// Look up addresses at a coordinate
    Geocode {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;

    let api_key = config.api_key().ok_or_else(|| {
        WayfareError::Configuration(format!(
            "no API key: set {API_KEY_ENV} or [provider] api_key"
        ))
    })?;
    let client = PlacesClient::with_options(
        api_key,
        config.provider.base_url.clone(),
        config.provider_timeout(),
    )?;

    let optimizer = RequestOptimizer::new(config.optimizer_config()?);
    let lookups =
        LookupService::new(optimizer.clone(), client).with_config(config.lookup_config());
    info!(repeat = args.repeat, "running lookup");

    let repeat = args.repeat.max(1);
    match args.command {
        Command::Nearby {
            lat,
            lng,
            place_type,
            radius,
        } => {
            let query = NearbyQuery::new(LatLng::new(lat, lng), place_type, radius);
            let results =
                try_join_all((0..repeat).map(|_| lookups.nearby_places(&query))).await?;
            print_json(&results[0])?;
        }
        Command::Autocomplete { input } => {
            let results =
                try_join_all((0..repeat).map(|_| lookups.autocomplete(&input))).await?;
            print_json(&results[0])?;
        }
        Command::Geocode { lat, lng } => {
            let location = LatLng::new(lat, lng);
            let results =
                try_join_all((0..repeat).map(|_| lookups.reverse_geocode(location))).await?;
            print_json(&results[0])?;
        }
    }

    if args.stats {
        eprintln!("{}", serde_json::to_string_pretty(&optimizer.cache_stats())?);
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
