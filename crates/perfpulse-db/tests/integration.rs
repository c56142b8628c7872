//! Offline tests for perfpulse-db pool configuration and row conversions.
//! These tests do not require a live database connection.

use chrono::Utc;
use perfpulse_core::{
    AppConfig, Baseline, Classification, Environment, MembershipPolicy, Metric, MetricVector,
    Pulse, PulseStatus, Statistic,
};
use perfpulse_db::{BaselineRow, DbError, PoolConfig, PulseRow, StatisticRow};
use sqlx::types::Json;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let app_config = AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
        log_level: "info".to_string(),
        playlists_path: PathBuf::from("./config/playlists.yaml"),
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        worker_url: "http://worker.local/run".to_string(),
        worker_token: None,
        worker_timeout_secs: 10,
        dispatch_concurrency: 8,
        slug_length: 12,
        slug_max_attempts: 5,
        pulse_timeout_secs: 900,
        reaper_interval_secs: 60,
        baseline_window: 5,
        regression_threshold_pct: 10.0,
        membership_policy: MembershipPolicy::Primary,
    };

    let pool_config = PoolConfig::from_app_config(&app_config);
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

fn pulse_row(status: &str) -> PulseRow {
    PulseRow {
        id: 11,
        slug: "k3j9x0a1b2c3".to_string(),
        target_id: 1,
        url_id: 2,
        playlist_id: "mobile-eu".to_string(),
        expected_slots: Json(vec!["a".to_string(), "b".to_string()]),
        status: status.to_string(),
        requested_by: None,
        created_at: Utc::now(),
        completed_at: None,
    }
}

#[test]
fn pulse_row_converts_to_domain_pulse() {
    let pulse = Pulse::try_from(pulse_row("in_progress")).expect("convert");
    assert_eq!(pulse.status, PulseStatus::InProgress);
    assert_eq!(pulse.expected_count(), 2);
    assert!(pulse.expects_slot("b"));
    assert!(!pulse.expects_slot("c"));
}

#[test]
fn pulse_row_with_unknown_status_is_rejected() {
    let err = Pulse::try_from(pulse_row("exploded")).expect_err("must fail");
    assert!(matches!(err, DbError::Core(_)));
}

#[test]
fn baseline_row_rejects_negative_window_size() {
    let row = BaselineRow {
        target_id: 1,
        url_id: 2,
        window_size: -1,
        entries: Json(Vec::new()),
        reference: Json(MetricVector::new()),
        last_pulse_id: None,
        updated_at: Utc::now(),
    };
    assert!(matches!(
        Baseline::try_from(row),
        Err(DbError::InvalidRow(_))
    ));
}

#[test]
fn statistic_row_carries_overall_classification() {
    let row = StatisticRow {
        id: 5,
        pulse_id: 11,
        target_id: 1,
        url_id: 2,
        classification: "improvement".to_string(),
        metrics: Json(MetricVector::new().with(Metric::Lcp, 1800.0)),
        comparisons: Json(std::collections::BTreeMap::new()),
        seeded_baseline: false,
        created_at: Utc::now(),
    };
    let stat = Statistic::try_from(row).expect("convert");
    assert_eq!(stat.comparison.overall, Classification::Improvement);
    assert_eq!(stat.metrics.get(Metric::Lcp), Some(1800.0));
}
