//! Literal secrets and connection strings are refused at load time.

use cbf_config::load_layered_yaml_from_strings;

const CLEAN: &str = r#"
series:
  symbol: "BTCUSDT"
  interval: "1m"
ingest:
  start: "2018-01-01"
"#;

fn assert_secret_rejected(docs: &[&str]) {
    let err = load_layered_yaml_from_strings(docs).unwrap_err().to_string();
    assert!(err.contains("CONFIG_SECRET_DETECTED"), "got: {err}");
    assert!(err.contains("REDACTED"), "got: {err}");
}

#[test]
fn clean_config_loads() {
    assert!(load_layered_yaml_from_strings(&[CLEAN]).is_ok());
}

#[test]
fn database_url_literal_is_rejected() {
    assert_secret_rejected(&[CLEAN, "store:\n  url: \"postgres://cbf:hunter2@db/cbf\"\n"]);
}

#[test]
fn api_key_literal_is_rejected() {
    assert_secret_rejected(&[CLEAN, "upstream:\n  api_key: \"sk-live-abc123secretvalue\"\n"]);
}

#[test]
fn secret_in_array_is_rejected() {
    assert_secret_rejected(&[
        CLEAN,
        "mirrors:\n  - url: \"https://example.com\"\n    token: \"ghp_abcdefghijklmnop\"\n",
    ]);
}
