use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;
use warp::Filter;
use warp::http::StatusCode;

use crate::context::AppContext;
use crate::models::JobStatus;

use super::jobs::{JobSummary, validate_submission};
use super::{reject, with_ctx};

const MAX_BATCH_SIZE: usize = 100;

#[derive(Deserialize)]
pub struct BatchItem {
  pub job_type: String,
  pub parameters: serde_json::Value,
}

#[derive(Deserialize)]
pub struct BatchRequest {
  pub items: Vec<BatchItem>,
}

/// `batch_id` is a client-side grouping convenience; it is not persisted.
#[derive(Serialize)]
pub struct BatchResponse {
  pub batch_id: Uuid,
  pub jobs: Vec<JobSummary>,
  pub total: usize,
}

#[derive(Serialize)]
pub struct BatchJobStatus {
  pub job_id: Uuid,
  pub status: JobStatus,
  pub progress: i64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub output_file: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

#[derive(Serialize)]
pub struct BatchStatusResponse {
  /// Always null; jobs are not grouped server-side, the field exists for
  /// wire parity with the create response.
  pub batch_id: Option<Uuid>,
  pub jobs: Vec<BatchJobStatus>,
  pub completed: usize,
  pub failed: usize,
  pub pending: usize,
  pub processing: usize,
}

pub fn create_route(
  ctx: AppContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  warp::path!("api" / "batch")
    .and(warp::post())
    .and(warp::body::json())
    .and(with_ctx(ctx))
    .and_then(handle_create)
}

pub fn status_route(
  ctx: AppContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  warp::path!("api" / "batch" / "status")
    .and(warp::post())
    .and(warp::body::json())
    .and(with_ctx(ctx))
    .and_then(handle_status)
}

async fn handle_create(
  request: BatchRequest,
  ctx: AppContext,
) -> Result<impl warp::Reply, warp::Rejection> {
  if request.items.is_empty() || request.items.len() > MAX_BATCH_SIZE {
    return Err(reject(
      StatusCode::BAD_REQUEST,
      format!("Batch must contain between 1 and {MAX_BATCH_SIZE} items"),
    ));
  }

  // Validate everything up front so a bad item rejects the whole batch
  // before any job enters the queue.
  for item in &request.items {
    if let Err(e) = validate_submission(&item.job_type, &item.parameters) {
      return Err(reject(StatusCode::BAD_REQUEST, e));
    }
  }

  let mut jobs = Vec::with_capacity(request.items.len());
  for item in request.items {
    let job = ctx.submit(&item.job_type, item.parameters).await.map_err(|e| {
      error!("Batch submission failed: {:?}", e);
      reject(StatusCode::INTERNAL_SERVER_ERROR, "Failed to submit batch")
    })?;
    jobs.push(JobSummary::from_record(&job));
  }

  let total = jobs.len();
  Ok(warp::reply::json(&BatchResponse { batch_id: Uuid::new_v4(), jobs, total }))
}

async fn handle_status(
  job_ids: Vec<Uuid>,
  ctx: AppContext,
) -> Result<impl warp::Reply, warp::Rejection> {
  let mut response = BatchStatusResponse {
    batch_id: None,
    jobs: Vec::with_capacity(job_ids.len()),
    completed: 0,
    failed: 0,
    pending: 0,
    processing: 0,
  };

  for job_id in job_ids {
    let job = ctx.store().get(job_id).await.map_err(|e| {
      error!("Batch status lookup failed: {:?}", e);
      reject(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read batch status")
    })?;
    let Some(job) = job else { continue };

    match job.status {
      JobStatus::Completed => response.completed += 1,
      JobStatus::Failed => response.failed += 1,
      JobStatus::Processing => response.processing += 1,
      _ => response.pending += 1,
    }
    response.jobs.push(BatchJobStatus {
      job_id: job.job_id,
      status: job.status,
      progress: job.progress,
      output_file: job.output_file,
      error: job.error,
    });
  }

  Ok(warp::reply::json(&response))
}
