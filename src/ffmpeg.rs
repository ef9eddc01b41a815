use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result, bail};
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::config::Config;

/// Runs an external ffmpeg command and translates its machine-readable
/// progress stream (`-progress pipe:1`) into a bounded 0-100 percentage,
/// reported over an mpsc channel.
pub struct FfmpegRunner {
  ffmpeg: String,
  ffprobe: String,
  time_re: Regex,
}

impl FfmpegRunner {
  pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
    Self {
      ffmpeg: ffmpeg.into(),
      ffprobe: ffprobe.into(),
      time_re: Regex::new(r"^(\d+):(\d+):(\d+\.?\d*)").unwrap(),
    }
  }

  pub fn from_config(config: &Config) -> Self {
    Self::new(config.ffmpeg_path.clone(), config.ffprobe_path.clone())
  }

  /// Reference duration in seconds via ffprobe. Unparsable output yields 0,
  /// which disables percentage reporting without failing the run.
  pub async fn duration(&self, input_path: &Path) -> Result<f64> {
    let output = Command::new(&self.ffprobe)
      .args([
        "-v",
        "error",
        "-show_entries",
        "format=duration",
        "-of",
        "default=noprint_wrappers=1:nokey=1",
      ])
      .arg(input_path)
      .output()
      .await
      .with_context(|| format!("Failed to launch {}", self.ffprobe))?;

    Ok(String::from_utf8_lossy(&output.stdout).trim().parse::<f64>().unwrap_or(0.0))
  }

  /// Runs `ffmpeg -y -progress pipe:1 -nostats <args>`. Progress percentages
  /// are sent only when both a reporting channel and a reference input with
  /// a positive duration are available. A non-zero exit is an error carrying
  /// the captured diagnostic output.
  pub async fn run(
    &self,
    args: &[String],
    progress: Option<mpsc::Sender<i64>>,
    input_path: Option<&Path>,
  ) -> Result<()> {
    let mut duration = 0.0;
    if let (Some(_), Some(input)) = (&progress, input_path) {
      duration = self.duration(input).await?;
    }

    let mut child = Command::new(&self.ffmpeg)
      .args(["-y", "-progress", "pipe:1", "-nostats"])
      .args(args)
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .spawn()
      .with_context(|| format!("Failed to launch {}", self.ffmpeg))?;

    let stdout = child.stdout.take().context("ffmpeg stdout not captured")?;
    let mut stderr = child.stderr.take().context("ffmpeg stderr not captured")?;

    // Drain stderr concurrently so a chatty process cannot stall on a full pipe.
    let stderr_task = tokio::spawn(async move {
      let mut buf = String::new();
      let _ = stderr.read_to_string(&mut buf).await;
      buf
    });

    let mut lines = BufReader::new(stdout).lines();
    let mut current_time = 0.0f64;
    while let Some(line) = lines.next_line().await? {
      let line = line.trim();

      let mut updated = false;
      if let Some(value) = line.strip_prefix("out_time_ms=") {
        if let Ok(micros) = value.parse::<i64>() {
          current_time = micros as f64 / 1_000_000.0;
          updated = true;
        }
      } else if let Some(value) = line.strip_prefix("out_time=") {
        // HH:MM:SS[.frac]; malformed timestamps keep the previous value.
        if let Some(caps) = self.time_re.captures(value) {
          let hours: f64 = caps[1].parse().unwrap_or(0.0);
          let minutes: f64 = caps[2].parse().unwrap_or(0.0);
          let seconds: f64 = caps[3].parse().unwrap_or(0.0);
          current_time = hours * 3600.0 + minutes * 60.0 + seconds;
          updated = true;
        }
      }

      if updated && duration > 0.0 {
        if let Some(tx) = &progress {
          // ffmpeg can emit a large negative out_time_ms sentinel at stream
          // start; the channel contract is 0-100.
          let percentage = ((current_time / duration) * 100.0) as i64;
          let _ = tx.send(percentage.clamp(0, 100)).await;
        }
      }

      if line.starts_with("progress=end") {
        break;
      }
    }

    let status = child.wait().await?;
    let diagnostics = stderr_task.await.unwrap_or_default();
    if !status.success() {
      bail!("ffmpeg failed ({}): {}", status, diagnostics.trim());
    }
    Ok(())
  }
}
