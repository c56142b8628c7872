//! Pulse inspection and reaping commands.

use std::fmt::Write as _;
use std::sync::Arc;

use perfpulse_core::{AppConfig, Heartbeat, HeartbeatDisposition, Pulse, Statistic};
use perfpulse_engine::{
    EngineSettings, Notifier, PgStore, PulseStore, ReapReport, Reaper, SystemClock,
};
use sqlx::PgPool;

/// Run one reaper sweep with the configured timeout.
///
/// No events are published: the CLI has no subscribers.
///
/// # Errors
///
/// Returns an error if the store fails.
pub(crate) async fn run_reap(pool: PgPool, config: &AppConfig) -> anyhow::Result<()> {
    let settings = EngineSettings::from_app_config(config);
    let reaper = Reaper::new(
        Arc::new(PgStore::new(pool)),
        Notifier::default(),
        Arc::new(SystemClock),
        settings.pulse_timeout,
        settings.baseline,
    );

    let report = reaper.run_once().await?;
    println!("{}", format_reap_report(&report));
    Ok(())
}

pub(crate) fn format_reap_report(report: &ReapReport) -> String {
    let mut out = format!(
        "scanned {} pulse(s): {} timed out, {} statistic(s) recorded, {} finished first",
        report.scanned, report.timed_out, report.repaired, report.lost_races
    );
    if report.failed > 0 {
        let _ = write!(out, ", {} failed", report.failed);
    }
    out
}

/// Print a pulse's status, heartbeat tally and statistic.
///
/// # Errors
///
/// Returns an error if the pulse does not exist or the store fails.
pub(crate) async fn run_pulse_show(pool: PgPool, slug: &str) -> anyhow::Result<()> {
    let store = PgStore::new(pool);
    let pulse = store
        .get_pulse_by_slug(slug)
        .await?
        .ok_or_else(|| anyhow::anyhow!("pulse '{slug}' not found"))?;
    let heartbeats = store.heartbeats(pulse.id).await?;
    let statistic = store.statistic_for_pulse(pulse.id).await?;

    print!(
        "{}",
        format_pulse_summary(&pulse, &heartbeats, statistic.as_ref())
    );
    Ok(())
}

pub(crate) fn format_pulse_summary(
    pulse: &Pulse,
    heartbeats: &[Heartbeat],
    statistic: Option<&Statistic>,
) -> String {
    let accepted = heartbeats
        .iter()
        .filter(|h| h.disposition == HeartbeatDisposition::Accepted)
        .count();
    let late = heartbeats.len() - accepted;

    let mut out = String::new();
    let _ = writeln!(out, "pulse      {}", pulse.slug);
    let _ = writeln!(out, "status     {}", pulse.status);
    let _ = writeln!(out, "playlist   {}", pulse.playlist_id);
    let _ = writeln!(
        out,
        "heartbeats {accepted}/{} accepted, {late} late",
        pulse.expected_count()
    );
    let _ = writeln!(
        out,
        "created    {}",
        pulse.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if let Some(done) = pulse.completed_at {
        let _ = writeln!(out, "finished   {}", done.format("%Y-%m-%d %H:%M:%S UTC"));
    }

    let missing: Vec<&str> = pulse
        .expected_slots
        .iter()
        .filter(|slot| {
            !heartbeats.iter().any(|h| {
                h.disposition == HeartbeatDisposition::Accepted && &h.slot_id == *slot
            })
        })
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        let _ = writeln!(out, "waiting on {}", missing.join(", "));
    }

    match statistic {
        Some(stat) => {
            let seeded = if stat.seeded_baseline {
                " (seeded baseline)"
            } else {
                ""
            };
            let _ = writeln!(out, "result     {}{seeded}", stat.comparison.overall);
            for (metric, cmp) in &stat.comparison.metrics {
                let pct = cmp
                    .pct_change
                    .map_or_else(|| "-".to_string(), |p| format!("{p:+.1}%"));
                let _ = writeln!(
                    out,
                    "  {:<16}{:>10.2}{:>9}  {}",
                    metric.as_str(),
                    cmp.value,
                    pct,
                    cmp.classification
                );
            }
        }
        None => {
            let _ = writeln!(out, "result     -");
        }
    }
    out
}
