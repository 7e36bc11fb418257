use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files; useful for testing
/// or when the caller manages env setup.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Fallback log filter for binaries that may run without a full configuration,
/// such as the CLI's `sign` and `push` commands.
#[must_use]
pub fn configured_log_level() -> String {
    log_level_from(|key| std::env::var(key))
}

fn log_level_from<F>(lookup: F) -> String
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    lookup(LOG_LEVEL_VAR).unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
}

const LOG_LEVEL_VAR: &str = "SMARTSYNC_LOG_LEVEL";
const DEFAULT_LOG_LEVEL: &str = "info";

/// Build application configuration using the provided env-var lookup function.
///
/// This is the core parsing/validation logic, decoupled from the actual environment
/// so it can be tested with a pure `HashMap` lookup with no `set_var`/`remove_var` needed.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u32>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<usize>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let database_url = require("DATABASE_URL")?;
    let api_key_hash_salt = require("SMARTSYNC_API_KEY_HASH_SALT")?;

    let env = parse_environment(&or_default("SMARTSYNC_ENV", "development"));

    let bind_addr = parse("SMARTSYNC_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = log_level_from(&lookup);

    let db_max_connections = parse_u32("SMARTSYNC_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("SMARTSYNC_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("SMARTSYNC_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let max_upload_bytes = parse_usize("SMARTSYNC_MAX_UPLOAD_BYTES", "10485760")?;
    if max_upload_bytes == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "SMARTSYNC_MAX_UPLOAD_BYTES".to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    let webhook_replay_window_secs = parse_u64("SMARTSYNC_WEBHOOK_REPLAY_WINDOW_SECS", "300")?;
    let profile_cas_retries = parse_u32("SMARTSYNC_PROFILE_CAS_RETRIES", "3")?.max(1);
    let rate_limit_per_minute = parse_usize("SMARTSYNC_RATE_LIMIT_PER_MINUTE", "600")?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        api_key_hash_salt,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        max_upload_bytes,
        webhook_replay_window_secs,
        profile_cas_retries,
        rate_limit_per_minute,
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
