//! Tagledger CLI - asset tag / serial pairing ledger

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tagledger::config::{self, TagledgerConfig};
use tagledger::server::{self, AppState};
use tagledger::ui::{self, Icons};
use tagledger::clock::parse_timestamp;
use tagledger::{
    OutcomeStatus, PairingEngine, ReplaceRequest, ScanInput, SearchBy, SearchQuery, SqliteStore, SystemClock,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "tagledger")]
#[command(version)]
#[command(about = "Asset tag / serial pairing ledger")]
#[command(long_about = r#"
Tagledger records which asset tag is bound to which serial number, keeps
the full reassignment history of every tag, and tracks whether each tag
has been used.

Example usage:
  tagledger serve --port 8000
  tagledger assign --tag T-1001 --serial SN-42
  tagledger assign --file scans.json
  tagledger search --asset-tag T-1001
  tagledger replace --search-by asset_tag --value T-1001 --new-serial SN-43
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter config file
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Serve the HTTP API
    Serve {
        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Address to bind
        #[arg(short, long)]
        bind: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List tags
    Tags {
        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Only tags updated after this timestamp
        #[arg(short, long)]
        since: Option<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Assign serials to tags
    Assign {
        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// JSON file holding an array of {asset_tag, serial, scanned_at?}
        #[arg(short, long, conflicts_with_all = ["tag", "serial"])]
        file: Option<PathBuf>,

        /// Asset tag of a single pair
        #[arg(short, long, requires = "serial")]
        tag: Option<String>,

        /// Serial of a single pair
        #[arg(short, long, requires = "tag")]
        serial: Option<String>,

        /// Scan time of a single pair (defaults to now)
        #[arg(long)]
        scanned_at: Option<String>,

        /// Identity recorded as assigned_by
        #[arg(short, long)]
        actor: Option<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show the assignment history of a tag and/or serial
    Search {
        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,

        #[arg(short = 't', long)]
        asset_tag: Option<String>,

        #[arg(short, long)]
        serial: Option<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Move a binding to a new tag and/or serial
    Replace {
        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Look up by asset_tag or serial
        #[arg(long)]
        search_by: String,

        /// Value to look up
        #[arg(long)]
        value: String,

        #[arg(long)]
        new_asset_tag: Option<String>,

        #[arg(long)]
        new_serial: Option<String>,

        /// Identity recorded as assigned_by
        #[arg(short, long)]
        actor: Option<String>,
    },

    /// Show statistics about the ledger
    Stats {
        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,
    },
}

fn open_store(database: Option<PathBuf>, config: &TagledgerConfig) -> anyhow::Result<(PathBuf, SqliteStore)> {
    let path = database.unwrap_or_else(|| config.database_path());
    config::ensure_db_dir(&path)?;
    let store = SqliteStore::open_with_busy_timeout(&path, config.busy_timeout())?;
    Ok((path, store))
}

fn read_batch(path: &Path) -> anyhow::Result<Vec<ScanInput>> {
    let contents = std::fs::read_to_string(path)?;
    match serde_json::from_str::<serde_json::Value>(&contents)? {
        serde_json::Value::Array(values) => Ok(ScanInput::from_json_items(values)),
        _ => anyhow::bail!("{} must hold a JSON array of pairs", path.display()),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config = config::load_config(cli.config.as_deref())?.unwrap_or_default();
    let clock = SystemClock;

    match cli.command {
        Commands::Init { force } => {
            let path = cli.config.unwrap_or_else(config::default_config_path);
            config::write_config(&path, &TagledgerConfig::starter(), force)?;
            ui::success(&format!("Wrote {}", path.display()));
        }

        Commands::Serve { database, bind, port } => {
            let (path, store) = open_store(database, &config)?;
            let bind = bind.unwrap_or_else(|| config.bind().to_string());
            let port = port.unwrap_or_else(|| config.port());
            let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;

            ui::header("Tagledger API");
            ui::status(Icons::DATABASE, "Database", &path.display().to_string());
            ui::status(Icons::PERSON, "Default actor", config.default_actor());

            let state = Arc::new(AppState::new(store, Arc::new(clock), config.default_actor()));
            tokio::runtime::Runtime::new()?.block_on(server::start_server(addr, state))?;
        }

        Commands::Tags { database, since, json } => {
            let (_, store) = open_store(database, &config)?;
            let engine = PairingEngine::new(&store, &clock);
            let since = match since {
                Some(raw) => Some(
                    parse_timestamp(&raw).ok_or_else(|| anyhow::anyhow!("invalid --since timestamp: {}", raw))?,
                ),
                None => None,
            };

            let tags = engine.list_tags(since)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tags)?);
            } else if tags.is_empty() {
                println!("∅ No tags found.");
            } else {
                println!("{}", ui::tag_table(&tags));
            }
        }

        Commands::Assign { database, file, tag, serial, scanned_at, actor, json } => {
            let (_, store) = open_store(database, &config)?;
            let engine = PairingEngine::new(&store, &clock);
            let actor = actor.unwrap_or_else(|| config.default_actor().to_string());

            let items = match (file, tag, serial) {
                (Some(file), _, _) => read_batch(&file)?,
                (None, Some(tag), Some(serial)) => {
                    let item = ScanInput::new(tag, serial);
                    vec![match scanned_at {
                        Some(at) => item.scanned_at(at),
                        None => item,
                    }]
                }
                _ => anyhow::bail!("pass --file or both --tag and --serial"),
            };

            let outcomes = engine.assign_batch(&items, &actor)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcomes)?);
            } else {
                println!("{}", ui::outcome_table(&outcomes));
                let failed = outcomes.iter().filter(|o| o.status == OutcomeStatus::Error).count();
                if failed > 0 {
                    ui::warn(&format!("{} of {} items rejected", failed, outcomes.len()));
                } else {
                    ui::success(&format!("{} pairs saved", outcomes.len()));
                }
            }
        }

        Commands::Search { database, asset_tag, serial, json } => {
            let (_, store) = open_store(database, &config)?;
            let engine = PairingEngine::new(&store, &clock);

            let view = engine.search_pairs(&SearchQuery { asset_tag, serial })?;
            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                println!("{} {} {} {}", Icons::TAG, view.asset_tag, Icons::LINK, view.serial);
                ui::summary_row("Status:", &ui::tag_status(view.status));
                ui::section(" History ");
                println!("{}", ui::history_table(&view.history));
            }
        }

        Commands::Replace { database, search_by, value, new_asset_tag, new_serial, actor } => {
            let (_, store) = open_store(database, &config)?;
            let engine = PairingEngine::new(&store, &clock);
            let actor = actor.unwrap_or_else(|| config.default_actor().to_string());

            let search_by: SearchBy = search_by.parse()?;
            let mut request = ReplaceRequest::new(search_by, value);
            request.new_asset_tag = new_asset_tag;
            request.new_serial = new_serial;

            let result = engine.replace_pair(&request, &actor)?;
            ui::success(&result.message);
        }

        Commands::Stats { database } => {
            let (path, store) = open_store(database, &config)?;
            let stats = store.stats()?;

            println!("{} Tagledger Statistics ({})", Icons::STATS, ui::muted(&path.display().to_string()));
            println!(
                "{}",
                ui::stats_table(&[
                    ("Tags", stats.tags.to_string().as_str()),
                    ("Used", stats.used_tags.to_string().as_str()),
                    ("Unused", stats.unused_tags.to_string().as_str()),
                    ("Pairs", stats.pairs.to_string().as_str()),
                ])
            );
        }
    }

    Ok(())
}
