mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cbf")]
#[command(about = "Candle backfill: ingest, gap report and gap fill", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest the configured range (bulk windows + reconciliation)
    Ingest {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Write the JSON ingest report to this path
        #[arg(long)]
        report: Option<String>,
    },

    /// Gap analysis and filling
    Gaps {
        #[command(subcommand)]
        cmd: GapsCmd,
    },

    /// Store commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> overrides)
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum GapsCmd {
    /// Print every gap (open-to-open spacing) in the range
    Report {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Range start (RFC3339 or YYYY-MM-DD); defaults to ingest.start
        #[arg(long)]
        start: Option<String>,

        /// Range end, exclusive; defaults to ingest.end
        #[arg(long)]
        end: Option<String>,

        /// Also print every stored record in the range
        #[arg(long, default_value_t = false)]
        dump: bool,
    },

    /// Fill gaps with linearly interpolated records
    Fill {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        end: Option<String>,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    /// Create the series table if absent
    Init {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },

    /// Record count and first/last open time of the series
    Status {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env.local if present (dev convenience). Silent if missing.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Ingest {
            config_paths,
            report,
        } => commands::ingest::ingest(config_paths, report).await?,

        Commands::Gaps { cmd } => match cmd {
            GapsCmd::Report {
                config_paths,
                start,
                end,
                dump,
            } => commands::gaps::report(config_paths, start, end, dump).await?,
            GapsCmd::Fill {
                config_paths,
                start,
                end,
            } => commands::gaps::fill(config_paths, start, end).await?,
        },

        Commands::Db { cmd } => match cmd {
            DbCmd::Init { config_paths } => commands::db::init(config_paths).await?,
            DbCmd::Status { config_paths } => commands::db::status(config_paths).await?,
        },

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = cbf_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }
    }

    Ok(())
}

/// Logs go to stderr so stdout stays machine-readable key=value lines.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
