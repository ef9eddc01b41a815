use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_retry::Retry;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::context::AppContext;
use crate::models::{JobStatus, JobUpdate, QueueEntry};

/// Pop timeout; bounds how long a shutdown request waits on an idle worker.
const POLL_TIMEOUT: Duration = Duration::from_secs(1);
/// Pause after a transient infrastructure error before resuming the poll loop.
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

const MAX_RETRIES: usize = 5;
const DELAY: u64 = 100;

pub fn spawn(ctx: AppContext, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
  tokio::spawn(run(ctx, shutdown))
}

/// The single consumer of the dispatch queue. Handler failures are contained
/// and recorded; only infrastructure errors reach the outer loop, which logs
/// and backs off rather than exiting.
pub async fn run(ctx: AppContext, shutdown: watch::Receiver<bool>) {
  info!("Worker loop started");
  loop {
    if *shutdown.borrow() {
      break;
    }
    let Some(entry) = ctx.queue().pop(POLL_TIMEOUT).await else {
      continue;
    };
    if let Err(e) = process_entry(&ctx, &entry).await {
      error!("Worker error on job {}: {:?}", entry.job_id, e);
      tokio::time::sleep(ERROR_BACKOFF).await;
    }
  }
  info!("Worker loop stopped");
}

async fn process_entry(ctx: &AppContext, entry: &QueueEntry) -> Result<()> {
  // The queue is not authoritative: re-read the record at dispatch time.
  let Some(job) = ctx.store().get(entry.job_id).await? else {
    warn!("Job {} popped with no record, skipping", entry.job_id);
    return Ok(());
  };
  if job.status == JobStatus::Cancelled {
    info!("Job {} cancelled before dispatch, skipping", entry.job_id);
    return Ok(());
  }

  let processing = JobUpdate {
    status: Some(JobStatus::Processing),
    progress: Some(0),
    ..Default::default()
  };
  ctx.update_job(entry.job_id, processing).await?;

  let Some(handler) = ctx.registry().get(&entry.job_type) else {
    error!("No handler registered for job type {}", entry.job_type);
    let failed = JobUpdate {
      status: Some(JobStatus::Failed),
      error: Some(format!("No handler for job type: {}", entry.job_type)),
      ..Default::default()
    };
    finalize(ctx, entry.job_id, failed).await?;
    return Ok(());
  };

  info!("Job {} ({}) processing", entry.job_id, entry.job_type);
  match handler.process(ctx, entry.job_id, job.parameters).await {
    Ok(outcome) => {
      let file_size = match &outcome.output_file {
        Some(name) => probe_output_size(ctx, name).await,
        None => None,
      };
      let completed = JobUpdate {
        status: Some(JobStatus::Completed),
        progress: Some(100),
        message: Some("Processing completed".to_string()),
        output_file: outcome.output_file,
        file_size,
        ..Default::default()
      };
      finalize(ctx, entry.job_id, completed).await?;
      info!("Job {} completed", entry.job_id);
    }
    Err(e) => {
      error!("Job {} failed: {:?}", entry.job_id, e);
      let failed = JobUpdate {
        status: Some(JobStatus::Failed),
        error: Some(format!("{e:#}")),
        ..Default::default()
      };
      finalize(ctx, entry.job_id, failed).await?;
    }
  }
  Ok(())
}

async fn probe_output_size(ctx: &AppContext, output_file: &str) -> Option<i64> {
  let path = ctx.config().processed_dir.join(output_file);
  tokio::fs::metadata(&path).await.ok().map(|m| m.len() as i64)
}

/// Terminal writes must land; retry them with backoff before giving up to
/// the outer loop.
async fn finalize(ctx: &AppContext, job_id: Uuid, update: JobUpdate) -> Result<()> {
  Retry::spawn(ExponentialBackoff::from_millis(DELAY).take(MAX_RETRIES), || {
    ctx.update_job(job_id, update.clone())
  })
  .await
}
