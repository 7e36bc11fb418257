mod push;
mod retailer;
mod sync;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use smartsync_core::SourceType;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "smartsync-cli")]
#[command(about = "SmartSync inventory sync command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Tenant administration
    Retailer {
        #[command(subcommand)]
        command: retailer::RetailerCommands,
    },
    /// Sync profile administration
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Ingest a CSV or Excel export for a retailer
    Ingest {
        #[arg(long)]
        retailer: Uuid,
        /// Path to a `.csv`, `.xlsx`, or `.xls` file
        #[arg(long)]
        file: PathBuf,
    },
    /// Show recent sync batches for a retailer
    History {
        #[arg(long)]
        retailer: Uuid,
        #[arg(long, default_value = "20")]
        limit: i64,
    },
    /// Print the headers a signed webhook push must carry
    Sign {
        /// Webhook API key
        #[arg(long, env = "SMARTSYNC_WEBHOOK_KEY")]
        key: String,
        /// JSON body exactly as it will be sent
        #[arg(long)]
        file: PathBuf,
        /// Unix epoch milliseconds to sign (defaults to now)
        #[arg(long)]
        timestamp: Option<i64>,
    },
    /// Send a signed webhook push, retrying transient failures
    Push {
        /// Server base URL, e.g. `http://localhost:3000`
        #[arg(long, env = "SMARTSYNC_URL")]
        url: String,
        #[arg(long, env = "SMARTSYNC_WEBHOOK_KEY")]
        key: String,
        /// JSON file holding `{"payload": [...]}` or a bare row array
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value = "3")]
        retries: u32,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Apply pending migrations
    Migrate,
    /// Check database connectivity
    Ping,
}

#[derive(Debug, Subcommand)]
enum ProfileCommands {
    /// Replace the conflict rules on a retailer's sync profile
    Lock {
        #[arg(long)]
        retailer: Uuid,
        /// Field that external input may never overwrite; repeatable
        #[arg(long = "field")]
        fields: Vec<String>,
        /// Source type used if the profile does not exist yet
        #[arg(long, default_value = "API_PUSH", value_parser = parse_source_type)]
        source: SourceType,
        #[arg(long)]
        master_source: Option<String>,
    },
}

fn parse_source_type(raw: &str) -> Result<SourceType, String> {
    raw.to_ascii_uppercase()
        .parse::<SourceType>()
        .map_err(|e| e.to_string())
}

async fn connect() -> anyhow::Result<(sqlx::PgPool, smartsync_core::AppConfig)> {
    let config = smartsync_core::load_app_config()?;
    let pool_config = smartsync_db::PoolConfig::from_app_config(&config);
    let pool = smartsync_db::connect_pool(&config.database_url, pool_config).await?;
    Ok((pool, config))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(smartsync_core::configured_log_level()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Db { command }) => {
            let (pool, _) = connect().await?;
            match command {
                DbCommands::Migrate => {
                    let applied = smartsync_db::run_migrations(&pool).await?;
                    println!("applied {applied} migration(s)");
                }
                DbCommands::Ping => {
                    smartsync_db::ping(&pool).await?;
                    println!("database ok");
                }
            }
        }
        Some(Commands::Retailer { command }) => {
            let (pool, config) = connect().await?;
            retailer::run(&pool, &config, command).await?;
        }
        Some(Commands::Profile {
            command:
                ProfileCommands::Lock {
                    retailer,
                    fields,
                    source,
                    master_source,
                },
        }) => {
            let (pool, _) = connect().await?;
            sync::run_profile_lock(&pool, retailer, source, fields, master_source).await?;
        }
        Some(Commands::Ingest { retailer, file }) => {
            let (pool, config) = connect().await?;
            sync::run_ingest_file(&pool, &config, retailer, &file).await?;
        }
        Some(Commands::History { retailer, limit }) => {
            let (pool, _) = connect().await?;
            sync::run_history(&pool, retailer, limit).await?;
        }
        Some(Commands::Sign {
            key,
            file,
            timestamp,
        }) => {
            let body = tokio::fs::read(&file).await?;
            let timestamp = timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
            for (name, value) in push::signed_headers(&key, &body, timestamp)? {
                println!("{name}: {value}");
            }
        }
        Some(Commands::Push {
            url,
            key,
            file,
            retries,
        }) => {
            let body = push::load_push_body(&tokio::fs::read(&file).await?)?;
            let client = push::PushClient::new(&url, &key)?.with_retries(retries, 1_000);
            let response = client.push(&body).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        None => println!("smartsync-cli ready; see --help"),
    }

    Ok(())
}
