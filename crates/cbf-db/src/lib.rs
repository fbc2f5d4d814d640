//! cbf-db
//!
//! Record store adapter: the persisted [`StoredRecord`], the [`RecordStore`]
//! contract, its Postgres implementation and the per-series write lock.

mod error;
mod lock;
mod pg;
mod record;
mod store;

#[cfg(feature = "testkit")]
pub mod memory;

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

pub use error::StoreError;
pub use lock::{SeriesLock, SeriesWriteGuard};
pub use pg::{is_sql_identifier, PgRecordStore};
pub use record::{close_time_for, ms_to_utc, StoredRecord};
pub use store::{BulkInsertReport, RecordStore, SeriesBounds, UpsertOutcome};

#[cfg(feature = "testkit")]
pub use memory::MemoryRecordStore;

pub const ENV_DB_URL: &str = "CBF_DATABASE_URL";

/// Connect to Postgres using CBF_DATABASE_URL.
pub async fn connect_from_env(max_connections: u32) -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL)
        .with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}
