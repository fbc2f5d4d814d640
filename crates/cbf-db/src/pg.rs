//! Postgres-backed record store.
//!
//! One table per series, keyed (non-uniquely) by `open_time`. Idempotence
//! comes from the existence check under the series write lock, not from a
//! constraint.

use std::collections::HashSet;

use anyhow::{anyhow, Result};
use cbf_md::{Candle, Interval};
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::record::{ms_to_utc, StoredRecord};
use crate::store::{plan_bulk_insert, BulkInsertReport, RecordStore, SeriesBounds, UpsertOutcome};

/// Postgres error code for `duplicate_table`.
const PG_DUPLICATE_TABLE: &str = "42P07";

/// Rows per multi-row insert statement (11 binds each).
const INSERT_CHUNK: usize = 1_000;

const COLUMNS: &str = "open_time, close_time, open, high, low, close, volume, \
                       quote_volume, trade_count, taker_buy_base, taker_buy_quote";

#[derive(Debug, Clone)]
struct Statements {
    create_table: String,
    create_index: String,
    exists: String,
    existing_among: String,
    insert_prefix: String,
    range_scan: String,
    count: String,
    bounds: String,
}

impl Statements {
    fn for_table(t: &str) -> Self {
        Self {
            create_table: format!(
                r#"
                create table {t} (
                  open_time       timestamptz      not null,
                  close_time      timestamptz      not null,
                  open            double precision not null,
                  high            double precision not null,
                  low             double precision not null,
                  close           double precision not null,
                  volume          double precision not null,
                  quote_volume    double precision not null,
                  trade_count     bigint           not null,
                  taker_buy_base  double precision not null,
                  taker_buy_quote double precision not null
                )
                "#
            ),
            create_index: format!("create index if not exists {t}_open_time_idx on {t} (open_time)"),
            exists: format!("select exists (select 1 from {t} where open_time = $1)"),
            existing_among: format!("select open_time from {t} where open_time = any($1)"),
            insert_prefix: format!("insert into {t} ({COLUMNS}) "),
            range_scan: format!(
                "select {COLUMNS} from {t} where open_time >= $1 and open_time <= $2 order by open_time asc"
            ),
            count: format!("select count(*)::bigint from {t}"),
            bounds: format!("select min(open_time), max(open_time) from {t}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgRecordStore {
    pool: PgPool,
    interval: Interval,
    table: String,
    sql: Statements,
}

impl PgRecordStore {
    /// `table` must be a plain SQL identifier; it is interpolated into SQL.
    pub fn new(pool: PgPool, table: &str, interval: Interval) -> Result<Self> {
        if !is_sql_identifier(table) {
            return Err(anyhow!(
                "invalid table name '{table}': expected [A-Za-z_][A-Za-z0-9_]* (max 63 chars)"
            ));
        }
        Ok(Self {
            pool,
            interval,
            table: table.to_string(),
            sql: Statements::for_table(table),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    async fn existing_among(&self, candles: &[Candle]) -> Result<HashSet<i64>, StoreError> {
        let times: Vec<DateTime<Utc>> = candles
            .iter()
            .filter_map(|c| ms_to_utc(c.open_time_ms, "open_time").ok())
            .collect();
        if times.is_empty() {
            return Ok(HashSet::new());
        }

        let rows: Vec<(DateTime<Utc>,)> = sqlx::query_as(&self.sql.existing_among)
            .bind(times)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::backend("exists", e))?;

        Ok(rows.into_iter().map(|(t,)| t.timestamp_millis()).collect())
    }

    async fn insert_rows(&self, rows: &[StoredRecord]) -> Result<(), sqlx::Error> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(&self.sql.insert_prefix);
        qb.push_values(rows, |mut b, r| {
            b.push_bind(r.open_time)
                .push_bind(r.close_time)
                .push_bind(r.open)
                .push_bind(r.high)
                .push_bind(r.low)
                .push_bind(r.close)
                .push_bind(r.volume)
                .push_bind(r.quote_volume)
                .push_bind(r.trade_count)
                .push_bind(r.taker_buy_base)
                .push_bind(r.taker_buy_quote);
        });
        qb.build().execute(&self.pool).await?;
        Ok(())
    }

    /// Batch insert; on a statement failure fall back to row-by-row so one
    /// bad row cannot block the rest of the page.
    async fn insert_unordered(&self, rows: &[StoredRecord], report: &mut BulkInsertReport) {
        for chunk in rows.chunks(INSERT_CHUNK) {
            match self.insert_rows(chunk).await {
                Ok(()) => report.inserted += chunk.len(),
                Err(e) => {
                    warn!(table = %self.table, rows = chunk.len(), error = %e, "batch insert failed; retrying row by row");
                    for r in chunk {
                        match self.insert_rows(std::slice::from_ref(r)).await {
                            Ok(()) => report.inserted += 1,
                            Err(e) => report
                                .rejected
                                .push((r.open_time_ms(), StoreError::backend("insert", e))),
                        }
                    }
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl RecordStore for PgRecordStore {
    fn interval(&self) -> Interval {
        self.interval
    }

    async fn ensure_series_initialized(&self) -> Result<(), StoreError> {
        match sqlx::query(&self.sql.create_table).execute(&self.pool).await {
            Ok(_) => info!(table = %self.table, "series table created"),
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some(PG_DUPLICATE_TABLE) => {
                debug!(table = %self.table, "series table already exists");
            }
            Err(e) => return Err(StoreError::backend("create_table", e)),
        }

        sqlx::query(&self.sql.create_index)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::backend("create_index", e))?;
        Ok(())
    }

    async fn exists(&self, open_time: DateTime<Utc>) -> Result<bool, StoreError> {
        let (found,): (bool,) = sqlx::query_as(&self.sql.exists)
            .bind(open_time)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::backend("exists", e))?;
        Ok(found)
    }

    async fn upsert_if_absent(&self, candle: &Candle) -> Result<UpsertOutcome, StoreError> {
        let open_time = ms_to_utc(candle.open_time_ms, "open_time")?;
        if open_time.timestamp_millis() == candle.open_time_ms && self.exists(open_time).await? {
            return Ok(UpsertOutcome::AlreadyPresent);
        }
        let rec = StoredRecord::from_candle(candle, self.interval)?;
        self.insert_rows(std::slice::from_ref(&rec))
            .await
            .map_err(|e| StoreError::backend("insert", e))?;
        Ok(UpsertOutcome::Inserted)
    }

    async fn insert_record_if_absent(
        &self,
        record: &StoredRecord,
    ) -> Result<UpsertOutcome, StoreError> {
        if self.exists(record.open_time).await? {
            return Ok(UpsertOutcome::AlreadyPresent);
        }
        self.insert_rows(std::slice::from_ref(record))
            .await
            .map_err(|e| StoreError::backend("insert", e))?;
        Ok(UpsertOutcome::Inserted)
    }

    async fn bulk_insert_new(&self, candles: &[Candle]) -> Result<BulkInsertReport, StoreError> {
        let existing = self.existing_among(candles).await?;
        let (rows, mut report) =
            plan_bulk_insert(candles, self.interval, |ms| existing.contains(&ms));
        if !rows.is_empty() {
            self.insert_unordered(&rows, &mut report).await;
        }
        Ok(report)
    }

    fn range_scan<'a>(
        &'a self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BoxStream<'a, Result<StoredRecord, StoreError>> {
        sqlx::query(&self.sql.range_scan)
            .bind(start)
            .bind(end)
            .fetch(&self.pool)
            .map(|row| {
                row.map_err(|e| StoreError::backend("range_scan", e))
                    .and_then(|r| record_from_row(&r))
            })
            .boxed()
    }

    async fn count(&self) -> Result<i64, StoreError> {
        let (n,): (i64,) = sqlx::query_as(&self.sql.count)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::backend("count", e))?;
        Ok(n)
    }

    async fn bounds(&self) -> Result<Option<SeriesBounds>, StoreError> {
        let (first, last): (Option<DateTime<Utc>>, Option<DateTime<Utc>>) =
            sqlx::query_as(&self.sql.bounds)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StoreError::backend("bounds", e))?;

        Ok(match (first, last) {
            (Some(first_open_time), Some(last_open_time)) => Some(SeriesBounds {
                first_open_time,
                last_open_time,
            }),
            _ => None,
        })
    }
}

fn record_from_row(row: &PgRow) -> Result<StoredRecord, StoreError> {
    let decode = |e: sqlx::Error| StoreError::backend("decode_row", e);
    Ok(StoredRecord {
        open_time: row.try_get("open_time").map_err(decode)?,
        close_time: row.try_get("close_time").map_err(decode)?,
        open: row.try_get("open").map_err(decode)?,
        high: row.try_get("high").map_err(decode)?,
        low: row.try_get("low").map_err(decode)?,
        close: row.try_get("close").map_err(decode)?,
        volume: row.try_get("volume").map_err(decode)?,
        quote_volume: row.try_get("quote_volume").map_err(decode)?,
        trade_count: row.try_get("trade_count").map_err(decode)?,
        taker_buy_base: row.try_get("taker_buy_base").map_err(decode)?,
        taker_buy_quote: row.try_get("taker_buy_quote").map_err(decode)?,
    })
}

/// Plain, unquoted Postgres identifier.
pub fn is_sql_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    s.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_rules() {
        assert!(is_sql_identifier("klines_btcusdt_1m"));
        assert!(is_sql_identifier("_t"));
        assert!(!is_sql_identifier("1m_klines"));
        assert!(!is_sql_identifier("klines; drop table x"));
        assert!(!is_sql_identifier(""));
        assert!(!is_sql_identifier(&"a".repeat(64)));
    }

    #[test]
    fn statements_interpolate_table() {
        let s = Statements::for_table("klines_x");
        assert!(s.range_scan.contains("from klines_x where open_time >= $1"));
        assert!(s.range_scan.ends_with("order by open_time asc"));
        assert!(s.create_index.contains("klines_x_open_time_idx"));
    }
}
