use crate::app_config::{AppConfig, Environment, MembershipPolicy};
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
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so tests can drive it with a
/// plain `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let database_url = require("DATABASE_URL")?;
    let worker_url = require("PERFPULSE_WORKER_URL")?;

    let env = parse_environment(&or_default("PERFPULSE_ENV", "development"));
    let bind_addr: SocketAddr = parse_as(
        "PERFPULSE_BIND_ADDR",
        &or_default("PERFPULSE_BIND_ADDR", "0.0.0.0:3000"),
    )?;
    let log_level = or_default("PERFPULSE_LOG_LEVEL", "info");
    let playlists_path = PathBuf::from(or_default(
        "PERFPULSE_PLAYLISTS_PATH",
        "./config/playlists.yaml",
    ));
    let worker_token = lookup("PERFPULSE_WORKER_TOKEN")
        .ok()
        .filter(|t| !t.trim().is_empty());

    let db_max_connections: u32 = parse_as(
        "PERFPULSE_DB_MAX_CONNECTIONS",
        &or_default("PERFPULSE_DB_MAX_CONNECTIONS", "10"),
    )?;
    let db_min_connections: u32 = parse_as(
        "PERFPULSE_DB_MIN_CONNECTIONS",
        &or_default("PERFPULSE_DB_MIN_CONNECTIONS", "1"),
    )?;
    let db_acquire_timeout_secs: u64 = parse_as(
        "PERFPULSE_DB_ACQUIRE_TIMEOUT_SECS",
        &or_default("PERFPULSE_DB_ACQUIRE_TIMEOUT_SECS", "10"),
    )?;

    let worker_timeout_secs: u64 = parse_as(
        "PERFPULSE_WORKER_TIMEOUT_SECS",
        &or_default("PERFPULSE_WORKER_TIMEOUT_SECS", "10"),
    )?;
    let dispatch_concurrency: usize = parse_as(
        "PERFPULSE_DISPATCH_CONCURRENCY",
        &or_default("PERFPULSE_DISPATCH_CONCURRENCY", "8"),
    )?;
    let slug_length: usize = parse_as(
        "PERFPULSE_SLUG_LENGTH",
        &or_default("PERFPULSE_SLUG_LENGTH", "12"),
    )?;
    let slug_max_attempts: u32 = parse_as(
        "PERFPULSE_SLUG_MAX_ATTEMPTS",
        &or_default("PERFPULSE_SLUG_MAX_ATTEMPTS", "5"),
    )?;
    let pulse_timeout_secs: u64 = parse_as(
        "PERFPULSE_PULSE_TIMEOUT_SECS",
        &or_default("PERFPULSE_PULSE_TIMEOUT_SECS", "900"),
    )?;
    let reaper_interval_secs: u64 = parse_as(
        "PERFPULSE_REAPER_INTERVAL_SECS",
        &or_default("PERFPULSE_REAPER_INTERVAL_SECS", "60"),
    )?;
    let baseline_window: usize = parse_as(
        "PERFPULSE_BASELINE_WINDOW",
        &or_default("PERFPULSE_BASELINE_WINDOW", "5"),
    )?;
    let regression_threshold_pct: f64 = parse_as(
        "PERFPULSE_REGRESSION_THRESHOLD_PCT",
        &or_default("PERFPULSE_REGRESSION_THRESHOLD_PCT", "10"),
    )?;
    let membership_policy =
        parse_membership_policy(&or_default("PERFPULSE_MEMBERSHIP_POLICY", "primary"))?;

    let config = AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        playlists_path,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        worker_url,
        worker_token,
        worker_timeout_secs,
        dispatch_concurrency,
        slug_length,
        slug_max_attempts,
        pulse_timeout_secs,
        reaper_interval_secs,
        baseline_window,
        regression_threshold_pct,
        membership_policy,
    };

    validate_app_config(&config)?;
    Ok(config)
}

fn parse_as<T>(var: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
}

fn validate_app_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.baseline_window == 0 {
        return Err(ConfigError::Validation(
            "PERFPULSE_BASELINE_WINDOW must be at least 1".to_string(),
        ));
    }
    if config.slug_length < 6 {
        return Err(ConfigError::Validation(format!(
            "PERFPULSE_SLUG_LENGTH must be at least 6, got {}",
            config.slug_length
        )));
    }
    if config.slug_max_attempts == 0 {
        return Err(ConfigError::Validation(
            "PERFPULSE_SLUG_MAX_ATTEMPTS must be at least 1".to_string(),
        ));
    }
    if config.dispatch_concurrency == 0 {
        return Err(ConfigError::Validation(
            "PERFPULSE_DISPATCH_CONCURRENCY must be at least 1".to_string(),
        ));
    }
    if !config.regression_threshold_pct.is_finite() || config.regression_threshold_pct <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "PERFPULSE_REGRESSION_THRESHOLD_PCT must be a positive number, got {}",
            config.regression_threshold_pct
        )));
    }
    if config.pulse_timeout_secs == 0 || config.reaper_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "pulse timeout and reaper interval must be non-zero".to_string(),
        ));
    }
    Ok(())
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

fn parse_membership_policy(s: &str) -> Result<MembershipPolicy, ConfigError> {
    match s.trim() {
        "primary" => Ok(MembershipPolicy::Primary),
        "first" => Ok(MembershipPolicy::First),
        other => Err(ConfigError::InvalidEnvVar {
            var: "PERFPULSE_MEMBERSHIP_POLICY".to_string(),
            reason: format!("expected \"primary\" or \"first\", got \"{other}\""),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
