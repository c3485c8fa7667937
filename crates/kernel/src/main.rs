//! Parcel content kernel maintenance tool.
//!
//! Usage:
//!   parcel migrate
//!   parcel health
//!   parcel orphans --object-type note

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use parcel_kernel::config::Config;
use parcel_kernel::db;
use parcel_kernel::store::{ContentStore, PgContentStore};

/// Parcel content kernel.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the content tables if they do not exist.
    Migrate,

    /// Check the database connection.
    Health,

    /// List envelopes whose entity row no longer exists.
    Orphans {
        /// Only check this family.
        #[arg(long)]
        object_type: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    let args = Args::parse();
    let config = Config::from_env().context("failed to load configuration")?;
    let pool = db::create_pool(&config).await?;

    match args.command {
        Command::Migrate => {
            db::ensure_schema(&pool).await?;
        }
        Command::Health => {
            if !db::check_health(&pool).await {
                bail!("database is not reachable");
            }
            info!("database healthy");
        }
        Command::Orphans { object_type } => {
            let store = PgContentStore::new(pool);
            let dangling = store.dangling_envelopes(object_type.as_deref()).await?;

            for envelope in &dangling {
                warn!(
                    envelope_id = %envelope.id,
                    object_type = envelope.object_type.as_deref().unwrap_or("-"),
                    object_id = ?envelope.object_id,
                    "orphaned content envelope"
                );
            }
            info!(count = dangling.len(), "orphan scan finished");
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
