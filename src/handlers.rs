use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::context::AppContext;

/// Job types accepted at submission. Only a subset has a registered handler;
/// a known but unregistered type fails terminally at dispatch.
pub const KNOWN_JOB_TYPES: &[&str] = &[
  "image_convert",
  "image_resize",
  "image_crop",
  "image_filter",
  "image_rotate",
  "image_remove_bg",
  "video_convert",
  "video_to_gif",
  "gif_to_video",
  "video_trim",
  "video_crop",
  "video_resize",
  "video_compress",
  "video_thumbnail",
  "video_audio",
];

pub fn is_known_job_type(job_type: &str) -> bool {
  KNOWN_JOB_TYPES.contains(&job_type)
}

/// What a handler yields on success.
#[derive(Debug, Clone)]
pub struct JobOutcome {
  pub output_file: Option<String>,
}

/// The processing capability behind one job type. Handlers report
/// intermediate progress through the context as they work; the worker only
/// captures the final outcome.
pub trait JobHandler: Send + Sync {
  fn process<'a>(
    &'a self,
    ctx: &'a AppContext,
    job_id: Uuid,
    parameters: serde_json::Value,
  ) -> BoxFuture<'a, Result<JobOutcome>>;
}

/// Job-type to handler mapping, populated once at startup.
#[derive(Default)]
pub struct HandlerRegistry {
  handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register(&mut self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) {
    self.handlers.insert(job_type.into(), handler);
  }

  pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
    self.handlers.get(job_type).cloned()
  }
}
