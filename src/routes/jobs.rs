use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;
use warp::Filter;
use warp::http::StatusCode;

use crate::context::{AppContext, CancelOutcome};
use crate::handlers::is_known_job_type;
use crate::models::{JobRecord, JobStatus};

use super::{reject, with_ctx};

#[derive(Deserialize)]
pub struct NewJob {
  pub job_type: String,
  pub parameters: serde_json::Value,
}

#[derive(Serialize)]
pub struct JobSummary {
  pub job_id: Uuid,
  pub status: JobStatus,
  pub progress: i64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
}

impl JobSummary {
  pub(crate) fn from_record(job: &JobRecord) -> Self {
    Self {
      job_id: job.job_id,
      status: job.status,
      progress: job.progress,
      message: job.message.clone(),
    }
  }
}

#[derive(Serialize)]
pub struct JobListResponse {
  pub jobs: Vec<JobRecord>,
  pub total: i64,
  pub page: i64,
  pub page_size: i64,
}

#[derive(Deserialize)]
pub struct ListQuery {
  page: Option<i64>,
  page_size: Option<i64>,
}

pub(crate) fn validate_submission(job_type: &str, parameters: &serde_json::Value) -> Result<(), String> {
  if !is_known_job_type(job_type) {
    return Err(format!("Invalid job type: {job_type}"));
  }
  if !parameters.is_object() {
    return Err("'parameters' must be a JSON object".to_string());
  }
  Ok(())
}

pub fn create_route(
  ctx: AppContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  warp::path!("api" / "jobs")
    .and(warp::post())
    .and(warp::body::json())
    .and(with_ctx(ctx))
    .and_then(handle_create)
}

pub fn list_route(
  ctx: AppContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  warp::path!("api" / "jobs")
    .and(warp::get())
    .and(warp::query::<ListQuery>())
    .and(with_ctx(ctx))
    .and_then(handle_list)
}

pub fn get_route(
  ctx: AppContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  warp::path!("api" / "jobs" / Uuid)
    .and(warp::get())
    .and(with_ctx(ctx))
    .and_then(handle_get)
}

pub fn cancel_route(
  ctx: AppContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  warp::path!("api" / "jobs" / Uuid)
    .and(warp::delete())
    .and(with_ctx(ctx))
    .and_then(handle_cancel)
}

async fn handle_create(new_job: NewJob, ctx: AppContext) -> Result<impl warp::Reply, warp::Rejection> {
  if let Err(e) = validate_submission(&new_job.job_type, &new_job.parameters) {
    error!("Job validation failed: {}", e);
    return Err(reject(StatusCode::BAD_REQUEST, e));
  }

  let job = ctx.submit(&new_job.job_type, new_job.parameters).await.map_err(|e| {
    error!("Job submission failed: {:?}", e);
    reject(StatusCode::INTERNAL_SERVER_ERROR, "Failed to submit job")
  })?;
  Ok(warp::reply::json(&JobSummary::from_record(&job)))
}

async fn handle_list(query: ListQuery, ctx: AppContext) -> Result<impl warp::Reply, warp::Rejection> {
  let page = query.page.unwrap_or(1).max(1);
  let page_size = query.page_size.unwrap_or(20).clamp(1, 100);

  let (jobs, total) = ctx.store().list(page, page_size).await.map_err(|e| {
    error!("Job listing failed: {:?}", e);
    reject(StatusCode::INTERNAL_SERVER_ERROR, "Failed to list jobs")
  })?;
  Ok(warp::reply::json(&JobListResponse { jobs, total, page, page_size }))
}

async fn handle_get(job_id: Uuid, ctx: AppContext) -> Result<impl warp::Reply, warp::Rejection> {
  let job = ctx.store().get(job_id).await.map_err(|e| {
    error!("Job lookup failed: {:?}", e);
    reject(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read job")
  })?;
  match job {
    Some(job) => Ok(warp::reply::json(&job)),
    None => Err(reject(StatusCode::NOT_FOUND, "Job not found")),
  }
}

async fn handle_cancel(job_id: Uuid, ctx: AppContext) -> Result<impl warp::Reply, warp::Rejection> {
  let outcome = ctx.cancel_job(job_id).await.map_err(|e| {
    error!("Job cancellation failed: {:?}", e);
    reject(StatusCode::INTERNAL_SERVER_ERROR, "Failed to cancel job")
  })?;
  match outcome {
    CancelOutcome::NotFound => Err(reject(StatusCode::NOT_FOUND, "Job not found")),
    CancelOutcome::AlreadyTerminal(_) => {
      Err(reject(StatusCode::BAD_REQUEST, "Cannot cancel job in current state"))
    }
    CancelOutcome::Cancelled(job) => Ok(warp::reply::json(&JobSummary::from_record(&job))),
  }
}
