use std::sync::Arc;

use anyhow::{Result, anyhow};
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::handlers::HandlerRegistry;
use crate::models::{JobRecord, JobStatus, JobUpdate, ProgressEvent, QueueEntry};
use crate::progress::ProgressHub;
use crate::queue::DispatchQueue;
use crate::store::JobStore;

/// Everything the job subsystem shares, constructed once at startup and
/// passed by clone (all innards are handles). Job mutations go through here
/// so every store write is paired with a progress broadcast.
#[derive(Clone)]
pub struct AppContext {
  config: Arc<Config>,
  store: JobStore,
  queue: DispatchQueue,
  hub: ProgressHub,
  registry: Arc<HandlerRegistry>,
}

pub enum CancelOutcome {
  NotFound,
  AlreadyTerminal(JobStatus),
  Cancelled(JobRecord),
}

impl AppContext {
  pub fn new(config: Config, store: JobStore, registry: HandlerRegistry) -> Self {
    Self {
      config: Arc::new(config),
      store,
      queue: DispatchQueue::new(),
      hub: ProgressHub::new(),
      registry: Arc::new(registry),
    }
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn store(&self) -> &JobStore {
    &self.store
  }

  pub fn queue(&self) -> &DispatchQueue {
    &self.queue
  }

  pub fn registry(&self) -> &HandlerRegistry {
    &self.registry
  }

  /// Creates the ledger record, then enqueues a dispatch reference.
  pub async fn submit(&self, job_type: &str, parameters: serde_json::Value) -> Result<JobRecord> {
    let job = self.store.create(job_type, parameters).await?;
    self.queue.push(QueueEntry { job_id: job.job_id, job_type: job.job_type.clone() })?;
    info!("Job {} ({}) submitted", job.job_id, job.job_type);
    Ok(job)
  }

  /// Merges fields into the record and broadcasts the same delta on the
  /// job's progress topic.
  pub async fn update_job(&self, job_id: Uuid, update: JobUpdate) -> Result<()> {
    self.store.update(job_id, &update).await?;
    self.hub.publish(update.into_event(job_id));
    Ok(())
  }

  /// Valid only while the job is pending or processing. Cancellation is
  /// advisory: a handler already running is not pre-empted, and its terminal
  /// update may overwrite the cancelled status (last write wins).
  pub async fn cancel_job(&self, job_id: Uuid) -> Result<CancelOutcome> {
    let Some(job) = self.store.get(job_id).await? else {
      return Ok(CancelOutcome::NotFound);
    };
    if job.status.is_terminal() {
      return Ok(CancelOutcome::AlreadyTerminal(job.status));
    }

    let update = JobUpdate {
      status: Some(JobStatus::Cancelled),
      message: Some("Job cancelled by user".to_string()),
      ..Default::default()
    };
    self.update_job(job_id, update).await?;
    info!("Job {} cancelled", job_id);

    let job = self
      .store
      .get(job_id)
      .await?
      .ok_or_else(|| anyhow!("Job {} disappeared during cancellation", job_id))?;
    Ok(CancelOutcome::Cancelled(job))
  }

  pub fn subscribe(&self, job_id: Uuid) -> broadcast::Receiver<ProgressEvent> {
    self.hub.subscribe(job_id)
  }
}
