use std::convert::Infallible;

use serde_json::json;
use warp::Filter;
use warp::http::StatusCode;

use crate::context::AppContext;

pub mod batch;
pub mod jobs;
pub mod sse;

#[derive(Debug)]
pub(crate) struct ApiError {
  pub status: StatusCode,
  pub message: String,
}

impl warp::reject::Reject for ApiError {}

pub(crate) fn reject(status: StatusCode, message: impl Into<String>) -> warp::Rejection {
  warp::reject::custom(ApiError { status, message: message.into() })
}

pub(crate) fn with_ctx(
  ctx: AppContext,
) -> impl Filter<Extract = (AppContext,), Error = Infallible> + Clone {
  warp::any().map(move || ctx.clone())
}

pub fn routes(
  ctx: AppContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  health_route()
    .or(jobs::create_route(ctx.clone()))
    .or(jobs::list_route(ctx.clone()))
    .or(sse::progress_route(ctx.clone()))
    .or(jobs::get_route(ctx.clone()))
    .or(jobs::cancel_route(ctx.clone()))
    .or(batch::create_route(ctx.clone()))
    .or(batch::status_route(ctx))
    .recover(handle_rejection)
}

fn health_route() -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  warp::path!("health")
    .and(warp::get())
    .map(|| warp::reply::json(&json!({"status": "healthy", "service": "mediaq"})))
}

async fn handle_rejection(err: warp::Rejection) -> Result<impl warp::Reply, warp::Rejection> {
  if let Some(api) = err.find::<ApiError>() {
    let body = warp::reply::json(&json!({"error": api.message}));
    return Ok(warp::reply::with_status(body, api.status));
  }
  if err.find::<warp::filters::body::BodyDeserializeError>().is_some() {
    let body = warp::reply::json(&json!({"error": "Invalid request body"}));
    return Ok(warp::reply::with_status(body, StatusCode::BAD_REQUEST));
  }
  Err(err)
}
