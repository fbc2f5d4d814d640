//! `cbf gaps report` and `cbf gaps fill`.

use anyhow::{Context, Result};
use cbf_db::{RecordStore, SeriesLock};
use cbf_gaps::{GapReference, GapScanner, GapSummary};
use futures_util::TryStreamExt;

use super::{load_config, open_store, scan_bounds};

pub async fn report(
    config_paths: Vec<String>,
    start: Option<String>,
    end: Option<String>,
    dump: bool,
) -> Result<()> {
    let loaded = load_config(&config_paths)?;
    let (start, end) = scan_bounds(&loaded.cfg, start.as_deref(), end.as_deref())?;
    let store = open_store(&loaded.cfg).await?;

    let summary = if dump {
        dump_and_scan(&store, start, end).await?
    } else {
        let summary = cbf_gaps::scan_gaps(&store, start, end, GapReference::OpenTime)
            .await
            .context("gap scan failed")?;
        for gap in &summary.gaps {
            println!("{gap}");
        }
        summary
    };

    println!(
        "gaps_report table={} start={} end={} records_scanned={} gaps={} missing_intervals={}",
        store.table(),
        start.to_rfc3339(),
        end.to_rfc3339(),
        summary.records_scanned,
        summary.gaps.len(),
        summary.total_missing()
    );
    if let Some(g) = summary.largest() {
        println!("largest_gap {g}");
    }
    Ok(())
}

/// Print every record in range, interleaving gap lines where they occur.
async fn dump_and_scan(
    store: &dyn RecordStore,
    start: chrono::DateTime<chrono::Utc>,
    end: chrono::DateTime<chrono::Utc>,
) -> Result<GapSummary> {
    let mut scanner = GapScanner::new(store.interval(), GapReference::OpenTime);
    let mut summary = GapSummary::default();

    let mut records = store.range_scan(start, end);
    while let Some(r) = records.try_next().await.context("range scan failed")? {
        summary.records_scanned += 1;
        if let Some(gap) = scanner.observe(&r) {
            println!("{gap}");
            summary.gaps.push(gap);
        }
        println!(
            "open_time={} close_time={} open={} high={} low={} close={} volume={} trades={}",
            r.open_time.to_rfc3339(),
            r.close_time.to_rfc3339(),
            r.open,
            r.high,
            r.low,
            r.close,
            r.volume,
            r.trade_count
        );
    }
    Ok(summary)
}

pub async fn fill(config_paths: Vec<String>, start: Option<String>, end: Option<String>) -> Result<()> {
    let loaded = load_config(&config_paths)?;
    let (start, end) = scan_bounds(&loaded.cfg, start.as_deref(), end.as_deref())?;
    let store = open_store(&loaded.cfg).await?;
    let lock = SeriesLock::new();

    let r = cbf_gaps::fill_gaps(&store, &lock, start, end)
        .await
        .context("gap fill failed")?;

    println!(
        "gaps_fill_ok=true table={} config_hash={}",
        store.table(),
        loaded.config_hash
    );
    println!(
        "records_read={} gaps_filled={} synthetic_inserted={} synthetic_already_present={}",
        r.records_read, r.gaps_filled, r.synthetic_inserted, r.synthetic_already_present
    );
    Ok(())
}
