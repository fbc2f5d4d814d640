// End-to-end: `cbf ingest` against a mock upstream into Postgres, then
// `cbf db status` and `cbf gaps report`.
//
// DB-backed test, skipped if CBF_DATABASE_URL is not set.

use assert_cmd::Command;
use httpmock::prelude::*;
use predicates::prelude::*;

// 2018-01-01T00:00:00Z
const BASE_MS: i64 = 1_514_764_800_000;

fn page(minutes: i64) -> String {
    let rows: Vec<String> = (0..minutes)
        .map(|i| {
            let t = BASE_MS + i * 60_000;
            format!(
                r#"[{t},"10.0","11.0","9.5","10.5","1.25",{},"13.1",5,"0.5","5.2","0"]"#,
                t + 59_999
            )
        })
        .collect();
    format!("[{}]", rows.join(","))
}

#[tokio::test]
async fn ingest_then_status_and_report() -> anyhow::Result<()> {
    let url = match std::env::var("CBF_DATABASE_URL") {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: CBF_DATABASE_URL not set");
            return Ok(());
        }
    };

    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v3/klines");
            then.status(200).body(page(10));
        })
        .await;

    let table = format!("cbf_cli_scenario_{}", std::process::id());
    let dir = tempfile::tempdir()?;
    let cfg = dir.path().join("cbf.yaml");
    std::fs::write(
        &cfg,
        format!(
            "upstream:\n  base_url: \"{}\"\nseries:\n  symbol: \"BTCUSDT\"\n  interval: \"1m\"\n  table: \"{table}\"\ningest:\n  start: \"2018-01-01T00:00:00Z\"\n  end: \"2018-01-01T00:10:00Z\"\n",
            server.base_url()
        ),
    )?;

    Command::cargo_bin("cbf")?
        .current_dir(dir.path())
        .args(["ingest", "--config"])
        .arg(&cfg)
        .assert()
        .success()
        .stdout(predicate::str::contains("inserted=10"))
        .stdout(predicate::str::contains("complete=true"));

    Command::cargo_bin("cbf")?
        .current_dir(dir.path())
        .args(["db", "status", "--config"])
        .arg(&cfg)
        .assert()
        .success()
        .stdout(predicate::str::contains("records=10"))
        .stdout(predicate::str::contains("first_open_time=2018-01-01T00:00:00+00:00"));

    Command::cargo_bin("cbf")?
        .current_dir(dir.path())
        .args(["gaps", "report", "--config"])
        .arg(&cfg)
        .assert()
        .success()
        .stdout(predicate::str::contains("gaps=0"));

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(1)
        .connect(&url)
        .await?;
    sqlx::query(&format!("drop table if exists {table}"))
        .execute(&pool)
        .await?;
    Ok(())
}
