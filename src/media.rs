use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::Config;
use crate::context::AppContext;
use crate::ffmpeg::FfmpegRunner;
use crate::handlers::{HandlerRegistry, JobHandler, JobOutcome};
use crate::models::JobUpdate;

/// Handlers shipped with the service; everything else in the known tag set
/// fails at dispatch until a handler is registered for it.
pub fn default_registry(config: &Config) -> HandlerRegistry {
  let runner = Arc::new(FfmpegRunner::from_config(config));
  let mut registry = HandlerRegistry::new();
  registry.register("video_convert", Arc::new(ConvertVideoHandler::new(runner.clone())));
  registry.register("video_trim", Arc::new(TrimVideoHandler::new(runner)));
  registry
}

/// Transcodes an uploaded video to a target container/codec pair.
/// Parameters: `{file_id, target_format, quality?}`.
pub struct ConvertVideoHandler {
  runner: Arc<FfmpegRunner>,
}

impl ConvertVideoHandler {
  pub fn new(runner: Arc<FfmpegRunner>) -> Self {
    Self { runner }
  }
}

impl JobHandler for ConvertVideoHandler {
  fn process<'a>(
    &'a self,
    ctx: &'a AppContext,
    job_id: Uuid,
    parameters: Value,
  ) -> BoxFuture<'a, Result<JobOutcome>> {
    async move {
      let file_id = required_str(&parameters, "file_id")?;
      let target_format = required_str(&parameters, "target_format")?;
      let quality = parameters.get("quality").and_then(|v| v.as_str()).unwrap_or("medium");

      let input = resolve_input(&ctx.config().upload_dir, file_id)?;
      let output_name = output_filename(file_id, "converted", target_format);
      let output = ctx.config().processed_dir.join(&output_name);

      ctx.update_job(job_id, JobUpdate::progress(5, "Analyzing video...")).await?;

      let (vcodec, acodec) = if target_format == "mp4" {
        ("libx264", "aac")
      } else {
        ("libvpx-vp9", "libopus")
      };
      let args = vec![
        "-i".to_string(),
        path_arg(&input),
        "-c:v".to_string(),
        vcodec.to_string(),
        "-crf".to_string(),
        quality_crf(quality).to_string(),
        "-c:a".to_string(),
        acodec.to_string(),
        "-threads".to_string(),
        ctx.config().ffmpeg_threads.to_string(),
        path_arg(&output),
      ];

      let (tx, reporter) = progress_reporter(ctx, job_id, "Converting...");
      let result = self.runner.run(&args, Some(tx), Some(&input)).await;
      let _ = reporter.await;
      result?;

      ctx.update_job(job_id, JobUpdate::progress(95, "Finalizing...")).await?;
      Ok(JobOutcome { output_file: Some(output_name) })
    }
    .boxed()
  }
}

/// Cuts a segment out of a video without re-encoding.
/// Parameters: `{file_id, start_time?, duration?}`.
pub struct TrimVideoHandler {
  runner: Arc<FfmpegRunner>,
}

impl TrimVideoHandler {
  pub fn new(runner: Arc<FfmpegRunner>) -> Self {
    Self { runner }
  }
}

impl JobHandler for TrimVideoHandler {
  fn process<'a>(
    &'a self,
    ctx: &'a AppContext,
    job_id: Uuid,
    parameters: Value,
  ) -> BoxFuture<'a, Result<JobOutcome>> {
    async move {
      let file_id = required_str(&parameters, "file_id")?;
      let start_time = parameters.get("start_time").and_then(|v| v.as_f64());
      let duration = parameters.get("duration").and_then(|v| v.as_f64());

      let input = resolve_input(&ctx.config().upload_dir, file_id)?;
      let ext = Path::new(file_id)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("mp4")
        .to_string();
      let output_name = output_filename(file_id, "trimmed", &ext);
      let output = ctx.config().processed_dir.join(&output_name);

      ctx.update_job(job_id, JobUpdate::progress(5, "Preparing trim...")).await?;

      let mut args: Vec<String> = Vec::new();
      if let Some(start) = start_time {
        args.extend(["-ss".to_string(), start.to_string()]);
      }
      args.extend(["-i".to_string(), path_arg(&input)]);
      if let Some(duration) = duration {
        args.extend(["-t".to_string(), duration.to_string()]);
      }
      args.extend(["-c".to_string(), "copy".to_string(), path_arg(&output)]);

      let (tx, reporter) = progress_reporter(ctx, job_id, "Trimming...");
      let result = self.runner.run(&args, Some(tx), Some(&input)).await;
      let _ = reporter.await;
      result?;

      ctx.update_job(job_id, JobUpdate::progress(95, "Finalizing...")).await?;
      Ok(JobOutcome { output_file: Some(output_name) })
    }
    .boxed()
  }
}

/// Forwards runner percentages into store updates, capped at 95 so the final
/// jump to 100 stays with the worker's completion write.
fn progress_reporter(
  ctx: &AppContext,
  job_id: Uuid,
  message: &str,
) -> (mpsc::Sender<i64>, JoinHandle<()>) {
  let (tx, mut rx) = mpsc::channel::<i64>(32);
  let ctx = ctx.clone();
  let message = message.to_string();
  let task = tokio::spawn(async move {
    let mut last = 0i64;
    while let Some(percentage) = rx.recv().await {
      let percentage = percentage.min(95);
      if percentage <= last {
        continue;
      }
      last = percentage;
      let _ = ctx.update_job(job_id, JobUpdate::progress(percentage, message.clone())).await;
    }
  });
  (tx, task)
}

fn quality_crf(quality: &str) -> u32 {
  match quality {
    "low" => 28,
    "high" => 18,
    _ => 23,
  }
}

fn required_str<'a>(parameters: &'a Value, field: &str) -> Result<&'a str> {
  parameters
    .get(field)
    .and_then(|v| v.as_str())
    .ok_or_else(|| anyhow!("Missing or invalid '{field}' parameter"))
}

fn resolve_input(upload_dir: &Path, file_id: &str) -> Result<PathBuf> {
  if file_id.contains("..") || file_id.contains('/') || file_id.contains('\\') {
    bail!("Invalid file_id");
  }
  Ok(upload_dir.join(file_id))
}

fn output_filename(file_id: &str, suffix: &str, ext: &str) -> String {
  let stem = Path::new(file_id)
    .file_stem()
    .and_then(|s| s.to_str())
    .unwrap_or(file_id);
  format!("{stem}_{suffix}.{ext}")
}

fn path_arg(path: &Path) -> String {
  path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn output_filename_replaces_extension() {
    assert_eq!(output_filename("abc123.avi", "converted", "mp4"), "abc123_converted.mp4");
    assert_eq!(output_filename("noext", "trimmed", "mkv"), "noext_trimmed.mkv");
  }

  #[test]
  fn quality_tiers_map_to_crf() {
    assert_eq!(quality_crf("low"), 28);
    assert_eq!(quality_crf("medium"), 23);
    assert_eq!(quality_crf("high"), 18);
    assert_eq!(quality_crf("unknown"), 23);
  }

  #[test]
  fn file_ids_with_path_components_are_rejected() {
    let dir = Path::new("/data/uploads");
    assert!(resolve_input(dir, "../etc/passwd").is_err());
    assert!(resolve_input(dir, "a/b.mp4").is_err());
    assert!(resolve_input(dir, "a\\b.mp4").is_err());
    assert_eq!(resolve_input(dir, "clip.mp4").unwrap(), dir.join("clip.mp4"));
  }
}
