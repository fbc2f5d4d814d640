//! `cbf db init` and `cbf db status`.

use anyhow::{Context, Result};
use cbf_db::RecordStore;

use super::{load_config, open_store};

pub async fn init(config_paths: Vec<String>) -> Result<()> {
    let loaded = load_config(&config_paths)?;
    let store = open_store(&loaded.cfg).await?;
    store
        .ensure_series_initialized()
        .await
        .context("series initialization failed")?;
    println!("series_initialized=true table={}", store.table());
    Ok(())
}

pub async fn status(config_paths: Vec<String>) -> Result<()> {
    let loaded = load_config(&config_paths)?;
    let store = open_store(&loaded.cfg).await?;

    let count = store.count().await.context("count query failed")?;
    let bounds = store.bounds().await.context("bounds query failed")?;

    println!("db_ok=true table={} records={}", store.table(), count);
    match bounds {
        Some(b) => {
            println!("first_open_time={}", b.first_open_time.to_rfc3339());
            println!("last_open_time={}", b.last_open_time.to_rfc3339());
        }
        None => println!("first_open_time=NONE last_open_time=NONE"),
    }
    Ok(())
}
