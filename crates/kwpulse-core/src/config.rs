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

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so it can be tested with a `HashMap`.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
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

    let parse_i32 = |var: &str, default: &str| -> Result<i32, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<i32>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("KWPULSE_ENV", "development"))?;
    let log_level = or_default("KWPULSE_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("KWPULSE_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("KWPULSE_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("KWPULSE_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let lease_ttl_secs = parse_u64("KWPULSE_LEASE_TTL_SECS", "300")?;
    let lease_candidate_batch = parse_u32("KWPULSE_LEASE_CANDIDATE_BATCH", "8")?;
    let lease_max_rounds = parse_u32("KWPULSE_LEASE_MAX_ROUNDS", "3")?;
    if lease_candidate_batch == 0 || lease_max_rounds == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: if lease_candidate_batch == 0 {
                "KWPULSE_LEASE_CANDIDATE_BATCH".to_string()
            } else {
                "KWPULSE_LEASE_MAX_ROUNDS".to_string()
            },
            reason: "must be at least 1".to_string(),
        });
    }

    let default_max_retries = parse_i32("KWPULSE_DEFAULT_MAX_RETRIES", "3")?;
    if default_max_retries < 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "KWPULSE_DEFAULT_MAX_RETRIES".to_string(),
            reason: "must not be negative".to_string(),
        });
    }

    let quota_scraping_job = parse_u32("KWPULSE_QUOTA_SCRAPING_JOB", "100")?;
    let quota_bulk_assignment = parse_u32("KWPULSE_QUOTA_BULK_ASSIGNMENT", "1000")?;
    let quota_default = parse_u32("KWPULSE_QUOTA_DEFAULT", "50")?;

    let daily_analytics_cron = or_default("KWPULSE_DAILY_ANALYTICS_CRON", "0 15 0 * * *");
    let refresh_cron = or_default("KWPULSE_REFRESH_CRON", "0 */15 * * * *");
    let lease_reclaim_cron = or_default("KWPULSE_LEASE_RECLAIM_CRON", "0 * * * * *");
    let retry_sweep_cron = lookup("KWPULSE_RETRY_SWEEP_CRON")
        .ok()
        .filter(|v| !v.trim().is_empty());

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        lease_ttl_secs,
        lease_candidate_batch,
        lease_max_rounds,
        default_max_retries,
        quota_scraping_job,
        quota_bulk_assignment,
        quota_default,
        daily_analytics_cron,
        refresh_cron,
        lease_reclaim_cron,
        retry_sweep_cron,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "KWPULSE_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
