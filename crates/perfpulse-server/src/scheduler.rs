//! Background job scheduler.
//!
//! Registers the reaper as a repeated job at the configured interval.

use std::time::Duration;

use perfpulse_engine::Reaper;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process. Dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// a job cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(
    reaper: Reaper,
    interval_secs: u64,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    register_reaper_job(&scheduler, reaper, interval_secs).await?;
    scheduler.start().await?;
    Ok(scheduler)
}

/// Sweep for pulses that outlived the timeout every `interval_secs`.
async fn register_reaper_job(
    scheduler: &JobScheduler,
    reaper: Reaper,
    interval_secs: u64,
) -> Result<(), JobSchedulerError> {
    let interval = Duration::from_secs(interval_secs.max(1));

    let job = Job::new_repeated_async(interval, move |_uuid, _lock| {
        let reaper = reaper.clone();

        Box::pin(async move {
            match reaper.run_once().await {
                Ok(report) => {
                    tracing::debug!(scanned = report.scanned, "scheduler: reaper tick");
                }
                Err(e) => tracing::error!(error = %e, "scheduler: reaper sweep failed"),
            }
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(interval_secs = interval.as_secs(), "scheduler: reaper registered");
    Ok(())
}
