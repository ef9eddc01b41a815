use std::convert::Infallible;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, warn};
use uuid::Uuid;
use warp::Filter;
use warp::http::StatusCode;

use crate::context::AppContext;
use crate::models::{JobRecord, ProgressEvent};

use super::{reject, with_ctx};

/// After this long without a live event the stream falls back to re-reading
/// the store; the ledger stays authoritative when broadcasts are missed.
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(1);

pub fn progress_route(
  ctx: AppContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  warp::path!("api" / "jobs" / Uuid / "progress")
    .and(warp::get())
    .and(with_ctx(ctx))
    .and_then(handle_progress)
}

async fn handle_progress(job_id: Uuid, ctx: AppContext) -> Result<impl warp::Reply, warp::Rejection> {
  // Subscribe before the snapshot read so no delta can fall in between.
  let rx = ctx.subscribe(job_id);
  let job = ctx.store().get(job_id).await.map_err(|e| {
    error!("Failed to read job {} for progress stream: {:?}", job_id, e);
    reject(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read job")
  })?;
  let Some(job) = job else {
    return Err(reject(StatusCode::NOT_FOUND, "Job not found"));
  };

  let stream = event_stream(ctx, job, rx);
  Ok(warp::sse::reply(
    warp::sse::keep_alive()
      .interval(KEEPALIVE_INTERVAL)
      .text("keepalive")
      .stream(stream),
  ))
}

/// Snapshot first, then live deltas; closes after a terminal event.
fn event_stream(
  ctx: AppContext,
  job: JobRecord,
  mut rx: broadcast::Receiver<ProgressEvent>,
) -> impl futures::Stream<Item = Result<warp::sse::Event, Infallible>> {
  let (tx, out) = mpsc::channel::<ProgressEvent>(16);
  tokio::spawn(async move {
    let job_id = job.job_id;
    let snapshot = ProgressEvent::snapshot(&job);
    let terminal = snapshot.is_terminal();
    if tx.send(snapshot).await.is_err() || terminal {
      return;
    }

    loop {
      match tokio::time::timeout(IDLE_TIMEOUT, rx.recv()).await {
        Ok(Ok(event)) => {
          let terminal = event.is_terminal();
          if tx.send(event).await.is_err() || terminal {
            return;
          }
        }
        Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
          warn!("Progress stream for job {} lagged by {} events", job_id, skipped);
          if !repoll(&ctx, job_id, &tx).await {
            return;
          }
        }
        Ok(Err(broadcast::error::RecvError::Closed)) => {
          if !repoll(&ctx, job_id, &tx).await {
            return;
          }
          rx = ctx.subscribe(job_id);
        }
        Err(_) => {
          // Idle timeout.
          if !repoll(&ctx, job_id, &tx).await {
            return;
          }
        }
      }
    }
  });

  ReceiverStream::new(out).map(|event| {
    let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
    Ok::<_, Infallible>(warp::sse::Event::default().data(data))
  })
}

/// Re-reads the authoritative record and forwards it as a snapshot event.
/// Returns false once the stream should end.
async fn repoll(ctx: &AppContext, job_id: Uuid, tx: &mpsc::Sender<ProgressEvent>) -> bool {
  match ctx.store().get(job_id).await {
    Ok(Some(job)) => {
      let snapshot = ProgressEvent::snapshot(&job);
      let terminal = snapshot.is_terminal();
      tx.send(snapshot).await.is_ok() && !terminal
    }
    Ok(None) => false,
    Err(e) => {
      error!("Failed to re-poll job {}: {:?}", job_id, e);
      false
    }
  }
}
