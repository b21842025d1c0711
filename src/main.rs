use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tourwithme::{AppConfig, AppState, PersistentCache, Providers, Store, telemetry, web};

/// `--config <path>` is the only flag
fn config_path() -> Result<Option<PathBuf>> {
    let mut args = std::env::args().skip(1);
    let mut path = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let value = args.next().context("--config needs a path")?;
                path = Some(PathBuf::from(value));
            }
            "--version" | "-V" => {
                println!("tourwithme {}", tourwithme::VERSION);
                std::process::exit(0);
            }
            other => bail!("Unknown argument '{other}'. Usage: tourwithme [--config <path>]"),
        }
    }
    Ok(path)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load_from_path(config_path()?).context("Failed to load configuration")?;
    let _telemetry = telemetry::init(&config.logging, &config.telemetry)?;

    let store = if config.database.path == ":memory:" {
        Store::open_in_memory()
    } else {
        Store::open(&config.database.path)
    }
    .with_context(|| format!("Failed to open database {}", config.database.path))?;

    let purged = store.purge_expired_sessions().await?;
    if purged > 0 {
        tracing::info!(purged, "removed expired sessions");
    }
    let rescored = store.refresh_popularity().await?;
    tracing::debug!(rescored, "refreshed destination popularity");

    let cache = PersistentCache::open(&config.cache.location)
        .with_context(|| format!("Failed to open cache at {}", config.cache.location))?;
    let providers = Providers::from_config(&config)?;

    tracing::info!(version = tourwithme::VERSION, "starting TourWithMe");
    web::run(AppState::new(config, store, cache, providers)).await
}
