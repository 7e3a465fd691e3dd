//! # retail-bot
//!
//! Console front end for the retail counter bot.
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Parse arguments                                                    │
//! │  2. Load BotConfig (defaults → TOML → RETAIL_* env)                    │
//! │  3. Initialize tracing (stderr; RUST_LOG overrides the config filter)  │
//! │  4. Open the database, run migrations                                  │
//! │     └── --backup <file>: write a snapshot and exit                     │
//! │  5. Release every journalled reservation (no sessions survive a        │
//! │     restart, so all of them are orphans)                               │
//! │  6. Spawn the sweeper                                                  │
//! │  7. Run the console until EOF, /quit or Ctrl-C                         │
//! │  8. Stop the sweeper, tear down live sessions, close the pool          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context as _};
use chrono::Utc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use retail_bot::console::{self, ConsoleOptions};
use retail_bot::render::Renderer;
use retail_bot::sweeper::Sweeper;
use retail_bot::{BotConfig, Dispatcher, SessionKey};
use retail_db::migrations::migration_status;
use retail_db::{Database, DbConfig};

const USAGE: &str = "\
Usage: retail-bot [OPTIONS]

Options:
  -c, --config <FILE>   Config file (default: platform config dir)
  -d, --db <FILE>       SQLite database (overrides config and RETAIL_DB_PATH)
  -u, --user <NAME>     Operator identity for the session (default: console)
      --json            Print output intents as JSON
      --backup <FILE>   Write a database snapshot to FILE and exit
  -h, --help            Show this help";

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    db: Option<PathBuf>,
    user: Option<String>,
    json: bool,
    backup: Option<PathBuf>,
}

impl Args {
    fn parse() -> anyhow::Result<Option<Self>> {
        let mut args = Args::default();
        let mut iter = std::env::args().skip(1);

        while let Some(arg) = iter.next() {
            let mut value = |name: &str| {
                iter.next()
                    .with_context(|| format!("{} requires a value", name))
            };

            match arg.as_str() {
                "-c" | "--config" => args.config = Some(value("--config")?.into()),
                "-d" | "--db" => args.db = Some(value("--db")?.into()),
                "-u" | "--user" => args.user = Some(value("--user")?),
                "--json" => args.json = true,
                "--backup" => args.backup = Some(value("--backup")?.into()),
                "-h" | "--help" => return Ok(None),
                other => bail!("unknown argument '{}'\n\n{}", other, USAGE),
            }
        }

        Ok(Some(args))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Some(args) = Args::parse()? else {
        println!("{}", USAGE);
        return Ok(());
    };

    let mut config = BotConfig::load(args.config).context("loading configuration")?;
    if let Some(db) = args.db {
        config.database.path = Some(db);
    }

    init_tracing(&config.logging.filter);
    info!("Starting retail counter bot");

    let db_path = config.database_path()?;
    info!(?db_path, "Database path determined");

    let db = Database::new(
        DbConfig::new(&db_path).max_connections(config.database.max_connections),
    )
    .await
    .with_context(|| format!("opening database {}", db_path.display()))?;

    if !db.health_check().await {
        bail!("database {} is not answering queries", db_path.display());
    }
    let (total, applied) = migration_status(db.pool())
        .await
        .context("reading migration status")?;
    info!(total, applied, "Database ready");

    if let Some(target) = args.backup {
        db.backup_to(&target)
            .await
            .with_context(|| format!("writing backup to {}", target.display()))?;
        println!("Backup written to {}", target.display());
        db.close().await;
        return Ok(());
    }

    let released = db
        .ledger()
        .release_orphaned(&HashSet::new(), Utc::now())
        .await
        .context("releasing reservations left by a previous run")?;
    if released > 0 {
        info!(released, "Restored stock held by unfinished drafts");
    }

    let config = Arc::new(config);
    let renderer = Renderer::new(config.store.currency_symbol.clone());
    let dispatcher = Dispatcher::new(db.clone(), config);

    let (sweeper, sweeper_handle) = Sweeper::new(dispatcher.clone());
    let sweeper_task = tokio::spawn(sweeper.run());

    let options = ConsoleOptions {
        user: SessionKey::new(args.user.unwrap_or_else(|| "console".to_string())),
        json: args.json,
    };
    let outcome = console::run(&dispatcher, &renderer, &options).await;

    sweeper_handle.shutdown().await;
    if let Err(e) = sweeper_task.await {
        tracing::warn!(error = %e, "Sweeper task ended abnormally");
    }
    dispatcher.shutdown().await;
    db.close().await;

    outcome.context("console session failed")?;
    info!("Shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber. Logs go to stderr so stdout stays
/// with the console.
///
/// ## Log Levels
/// - `RUST_LOG` wins when set
/// - otherwise the configured filter, default `info,retail=debug,sqlx=warn`
fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
