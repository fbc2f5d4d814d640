//! `cbf ingest`: windowed bulk ingestion plus reconciliation.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use cbf_db::SeriesLock;
use cbf_ingest::{IngestPlan, IngestReport};
use cbf_md::BinanceKlineClient;
use chrono::Utc;

use super::{load_config, open_store};

pub async fn ingest(config_paths: Vec<String>, report_path: Option<String>) -> Result<()> {
    let loaded = load_config(&config_paths)?;
    let cfg = &loaded.cfg;

    let client = BinanceKlineClient::with_config(
        cfg.upstream.base_url.clone(),
        cfg.upstream.klines_path.clone(),
        Duration::from_secs(cfg.upstream.request_timeout_secs),
    )?;
    let store = open_store(cfg).await?;
    let lock = SeriesLock::new();

    let (start, end) = cfg.ingest_range(Utc::now())?;
    let plan = IngestPlan {
        symbol: cfg.series.symbol.clone(),
        start,
        end,
        window_intervals: cfg.ingest.window_intervals,
        window_concurrency: cfg.ingest.window_concurrency,
        reconcile: cfg.ingest.reconcile,
    };

    let report = cbf_ingest::ingest_range(&client, &store, &lock, &plan)
        .await
        .context("ingest failed")?;

    print_report(&report, &loaded.config_hash);

    if let Some(p) = report_path {
        write_report(Path::new(&p), &report)?;
        println!("report_path={p}");
    }

    if !report.is_complete() {
        for u in &report.unresolved {
            eprintln!("unresolved open_time={} reason={}", u.open_time.to_rfc3339(), u.reason);
        }
        bail!(
            "INGEST_INCOMPLETE: {} unresolved boundary(ies), {} failed window(s)",
            report.unresolved.len(),
            report.windows_failed
        );
    }
    Ok(())
}

fn print_report(r: &IngestReport, config_hash: &str) {
    println!("ingest_ok=true run_id={} config_hash={}", r.run_id, config_hash);
    println!(
        "series source={} symbol={} interval={} start={} end={}",
        r.source,
        r.symbol,
        r.interval,
        r.start.to_rfc3339(),
        r.end.to_rfc3339()
    );
    println!(
        "windows total={} failed={}",
        r.windows_total, r.windows_failed
    );
    println!(
        "records requested={} inserted={} already_present={} rejected={}",
        r.records_requested,
        r.records_inserted,
        r.records_already_present,
        r.records_rejected.len()
    );
    println!(
        "reconcile ran={} checked={} missing={} backfilled={} unresolved={}",
        r.reconciled,
        r.boundaries_checked,
        r.boundaries_missing,
        r.boundaries_backfilled,
        r.unresolved.len()
    );
    println!("complete={}", r.is_complete());
}

fn write_report(path: &Path, report: &IngestReport) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)
                .with_context(|| format!("create report dir failed: {}", dir.display()))?;
        }
    }
    let json = serde_json::to_string_pretty(report).context("serialize report json failed")?;
    fs::write(path, json).with_context(|| format!("write report failed: {}", path.display()))?;
    Ok(())
}
