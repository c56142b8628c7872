pub mod app_config;
pub mod baseline;
pub mod config;
pub mod events;
pub mod metrics;
pub mod playlists;
pub mod pulse;
pub mod slug;
pub mod urls;

pub use app_config::{AppConfig, Environment, MembershipPolicy};
pub use baseline::{
    classify_metric, fold_baseline, Baseline, BaselinePolicy, BaselineWindow, Classification,
    Comparison, Finalization, MetricComparison, Statistic, WindowEntry,
};
pub use config::{load_app_config, load_app_config_from_env};
pub use events::PulseEvent;
pub use metrics::{median, Direction, Metric, MetricVector, QualityBand};
pub use playlists::{load_playlists, parse_playlists, Playlist, PlaylistsFile, Slot};
pub use pulse::{
    Heartbeat, HeartbeatDisposition, HeartbeatPayload, NewPulse, Pulse, PulseFilter, PulseStatus,
};
pub use slug::{generate_slug, slugify};
pub use urls::canonicalize_url;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read playlists file {path}: {source}")]
    PlaylistsFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse playlists file: {0}")]
    PlaylistsFileParse(#[from] serde_yaml::Error),

    #[error("configuration validation failed: {0}")]
    Validation(String),
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid url \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unknown pulse status: {0}")]
    UnknownStatus(String),

    #[error("unknown classification: {0}")]
    UnknownClassification(String),

    #[error("unknown heartbeat disposition: {0}")]
    UnknownDisposition(String),
}
