use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use kerbside_core::{
    GeoPoint,
    geo::{DEFAULT_RADIUS_KM, NearbyQuery},
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Clone)]
#[command(name = "kerbside", version)]
#[command(about = "Operator console for bins, collections, and routes", long_about = None)]
pub(crate) struct Config {
    /// Endpoint receiving domain events as JSON; events are only logged when unset.
    #[arg(long, env = "KERBSIDE_WEBHOOK_URL")]
    pub(crate) webhook_url: Option<String>,

    /// Directory for the rolling log file.
    #[arg(long, env = "KERBSIDE_LOG_DIR", default_value = "logs")]
    pub(crate) log_dir: PathBuf,

    /// Latitude the nearby screen searches around.
    #[arg(long, env = "KERBSIDE_HOME_LAT", default_value_t = 50.7753, allow_negative_numbers = true)]
    pub(crate) home_lat: f64,

    /// Longitude the nearby screen searches around.
    #[arg(long, env = "KERBSIDE_HOME_LON", default_value_t = 6.0839, allow_negative_numbers = true)]
    pub(crate) home_lon: f64,

    /// Radius of the nearby search in kilometres.
    #[arg(long, env = "KERBSIDE_RADIUS_KM", default_value_t = DEFAULT_RADIUS_KM)]
    pub(crate) radius_km: f64,
}

impl Config {
    /// Arguments from the command line, falling back to the environment and `.env`.
    pub(crate) fn load() -> Self {
        // a missing .env is fine
        dotenvy::dotenv().ok();
        Self::parse()
    }

    pub(crate) fn home(&self) -> NearbyQuery {
        NearbyQuery {
            origin: GeoPoint::new(self.home_lat, self.home_lon),
            radius_km: Some(self.radius_km),
        }
    }
}

/// Route logs to a daily file under `dir`; stdout belongs to the terminal UI.
///
/// Keep the returned guard alive until exit so buffered lines get flushed.
pub(crate) fn init_logging(dir: &Path) -> Result<WorkerGuard> {
    fs::create_dir_all(dir)?;
    let (writer, guard) = non_blocking(rolling::daily(dir, "kerbside.log"));
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(guard)
}
