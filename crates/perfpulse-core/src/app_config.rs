use std::net::SocketAddr;
use std::path::PathBuf;

use crate::baseline::BaselinePolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// How a dispatch is attributed when the requester belongs to several accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipPolicy {
    /// The membership flagged primary; falls back to the oldest active one.
    Primary,
    /// The oldest active membership.
    First,
}

impl std::fmt::Display for MembershipPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MembershipPolicy::Primary => write!(f, "primary"),
            MembershipPolicy::First => write!(f, "first"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub playlists_path: PathBuf,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub worker_url: String,
    pub worker_token: Option<String>,
    pub worker_timeout_secs: u64,
    pub dispatch_concurrency: usize,
    pub slug_length: usize,
    pub slug_max_attempts: u32,
    pub pulse_timeout_secs: u64,
    pub reaper_interval_secs: u64,
    pub baseline_window: usize,
    pub regression_threshold_pct: f64,
    pub membership_policy: MembershipPolicy,
}

impl AppConfig {
    #[must_use]
    pub fn baseline_policy(&self) -> BaselinePolicy {
        BaselinePolicy {
            window_size: self.baseline_window,
            regression_threshold_pct: self.regression_threshold_pct,
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("playlists_path", &self.playlists_path)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("worker_url", &self.worker_url)
            .field(
                "worker_token",
                &self.worker_token.as_ref().map(|_| "[redacted]"),
            )
            .field("worker_timeout_secs", &self.worker_timeout_secs)
            .field("dispatch_concurrency", &self.dispatch_concurrency)
            .field("slug_length", &self.slug_length)
            .field("slug_max_attempts", &self.slug_max_attempts)
            .field("pulse_timeout_secs", &self.pulse_timeout_secs)
            .field("reaper_interval_secs", &self.reaper_interval_secs)
            .field("baseline_window", &self.baseline_window)
            .field("regression_threshold_pct", &self.regression_threshold_pct)
            .field("membership_policy", &self.membership_policy)
            .finish()
    }
}
