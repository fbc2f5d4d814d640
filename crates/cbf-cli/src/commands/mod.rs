//! Command handler modules for cbf-cli.
//!
//! Shared config/store bootstrap lives here; command logic lives in the
//! submodules.

pub mod db;
pub mod gaps;
pub mod ingest;

use anyhow::{Context, Result};
use cbf_config::BackfillConfig;
use cbf_db::PgRecordStore;
use chrono::{DateTime, Duration, Utc};
use tracing::info;

/// Validated configuration plus its hash.
pub struct Loaded {
    pub cfg: BackfillConfig,
    pub config_hash: String,
}

/// Load, type and validate the layered config. No I/O beyond the files.
pub fn load_config(config_paths: &[String]) -> Result<Loaded> {
    let path_refs: Vec<&str> = config_paths.iter().map(|s| s.as_str()).collect();
    let loaded = cbf_config::load_layered_yaml(&path_refs)?;
    let cfg = loaded.backfill()?;
    cfg.validate(Utc::now()).context("config validation failed")?;

    info!(
        config_hash = %loaded.config_hash,
        symbol = %cfg.series.symbol,
        interval = %cfg.series.interval,
        table = %cfg.series.table_name(),
        "config loaded"
    );
    Ok(Loaded {
        cfg,
        config_hash: loaded.config_hash,
    })
}

/// Connect with CBF_DATABASE_URL and bind the configured series table.
pub async fn open_store(cfg: &BackfillConfig) -> Result<PgRecordStore> {
    let pool = cbf_db::connect_from_env(cfg.store.max_connections).await?;
    PgRecordStore::new(pool, &cfg.series.table_name(), cfg.series.interval)
}

/// Inclusive scan bounds for a `[start, end)` range, with optional overrides.
pub fn scan_bounds(
    cfg: &BackfillConfig,
    start: Option<&str>,
    end: Option<&str>,
) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let (cfg_start, cfg_end) = cfg.ingest_range(Utc::now())?;
    let start = match start {
        Some(raw) => cbf_config::backfill::parse_time(raw).context("--start")?,
        None => cfg_start,
    };
    let end = match end {
        Some(raw) => cbf_config::backfill::parse_time(raw).context("--end")?,
        None => cfg_end,
    };
    if start >= end {
        anyhow::bail!("scan range is empty: start {start} is not before end {end}");
    }
    Ok((start, end - Duration::seconds(1)))
}
