//! Tenant bootstrap: retailers, webhook keys, and session tokens.

use chrono::{Duration, Utc};
use clap::Subcommand;
use smartsync_engine::keys::{hash_secret, mint_session_token, mint_webhook_key};
use uuid::Uuid;

#[derive(Debug, Subcommand)]
pub enum RetailerCommands {
    /// Create a retailer with a webhook key and a first session token
    Create {
        #[arg(long)]
        name: String,
        /// Session lifetime in days; omit for a non-expiring token
        #[arg(long)]
        session_days: Option<i64>,
    },
    /// Issue another session token for an existing retailer
    Session {
        #[arg(long)]
        retailer: Uuid,
        #[arg(long)]
        session_days: Option<i64>,
    },
}

/// Mints a session token, stores its salted digest, and returns the token.
async fn issue_session(
    pool: &sqlx::PgPool,
    config: &smartsync_core::AppConfig,
    retailer_id: Uuid,
    session_days: Option<i64>,
) -> anyhow::Result<String> {
    let token = mint_session_token();
    let expires_at = session_days.map(|days| Utc::now() + Duration::days(days));
    smartsync_db::create_retailer_session(
        pool,
        retailer_id,
        &hash_secret(&config.api_key_hash_salt, &token),
        expires_at,
    )
    .await?;
    Ok(token)
}

pub(crate) async fn run(
    pool: &sqlx::PgPool,
    config: &smartsync_core::AppConfig,
    command: RetailerCommands,
) -> anyhow::Result<()> {
    match command {
        RetailerCommands::Create { name, session_days } => {
            let name = name.trim();
            anyhow::ensure!(!name.is_empty(), "retailer name must not be empty");

            let webhook_key = mint_webhook_key();
            let retailer = smartsync_db::create_retailer(pool, name, &webhook_key).await?;
            let token = issue_session(pool, config, retailer.id, session_days).await?;
            tracing::info!(retailer_id = %retailer.id, "created retailer");

            println!("retailer_id:   {}", retailer.id);
            println!("webhook_key:   {webhook_key}");
            println!("session_token: {token}");
            println!("store both secrets now; the session token cannot be shown again");
        }
        RetailerCommands::Session {
            retailer,
            session_days,
        } => {
            let token = issue_session(pool, config, retailer, session_days).await?;
            println!("session_token: {token}");
        }
    }
    Ok(())
}
