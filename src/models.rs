use serde::{Serialize, Deserialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
  Pending,
  Processing,
  Completed,
  Failed,
  Cancelled,
}

impl JobStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      JobStatus::Pending => "pending",
      JobStatus::Processing => "processing",
      JobStatus::Completed => "completed",
      JobStatus::Failed => "failed",
      JobStatus::Cancelled => "cancelled",
    }
  }

  pub fn parse(s: &str) -> Option<JobStatus> {
    match s {
      "pending" => Some(JobStatus::Pending),
      "processing" => Some(JobStatus::Processing),
      "completed" => Some(JobStatus::Completed),
      "failed" => Some(JobStatus::Failed),
      "cancelled" => Some(JobStatus::Cancelled),
      _ => None,
    }
  }

  pub fn is_terminal(&self) -> bool {
    matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
  pub job_id: Uuid,
  pub job_type: String,
  pub status: JobStatus,
  pub progress: i64,
  pub message: Option<String>,
  pub parameters: serde_json::Value,
  pub output_file: Option<String>,
  pub file_size: Option<i64>,
  pub error: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Partial field merge applied to a job record; unset fields are untouched.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
  pub status: Option<JobStatus>,
  pub progress: Option<i64>,
  pub message: Option<String>,
  pub output_file: Option<String>,
  pub file_size: Option<i64>,
  pub error: Option<String>,
}

impl JobUpdate {
  pub fn status(status: JobStatus) -> Self {
    Self { status: Some(status), ..Default::default() }
  }

  pub fn progress(progress: i64, message: impl Into<String>) -> Self {
    Self { progress: Some(progress), message: Some(message.into()), ..Default::default() }
  }

  pub fn into_event(self, job_id: Uuid) -> ProgressEvent {
    ProgressEvent {
      job_id,
      status: self.status,
      progress: self.progress,
      message: self.message,
      output_file: self.output_file,
      file_size: self.file_size,
      error: self.error,
    }
  }
}

/// Lightweight dispatch reference; the payload stays in the store so the
/// worker re-reads current state (including cancellation) at pop time.
#[derive(Debug, Clone)]
pub struct QueueEntry {
  pub job_id: Uuid,
  pub job_type: String,
}

/// Delta broadcast on a job's progress topic. Consumers merge partial
/// events into their own view; the store stays authoritative.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
  pub job_id: Uuid,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<JobStatus>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub progress: Option<i64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub output_file: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub file_size: Option<i64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl ProgressEvent {
  /// Full snapshot of a record, used as the first frame of a progress stream.
  pub fn snapshot(job: &JobRecord) -> Self {
    Self {
      job_id: job.job_id,
      status: Some(job.status),
      progress: Some(job.progress),
      message: job.message.clone(),
      output_file: job.output_file.clone(),
      file_size: job.file_size,
      error: job.error.clone(),
    }
  }

  pub fn is_terminal(&self) -> bool {
    self.status.map(|s| s.is_terminal()).unwrap_or(false)
  }
}
