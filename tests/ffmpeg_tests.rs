mod common;

use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use uuid::Uuid;

use mediaq::ffmpeg::FfmpegRunner;

fn scratch_dir() -> PathBuf {
  let dir = std::env::temp_dir().join(format!("mediaq-ffmpeg-{}", Uuid::new_v4()));
  std::fs::create_dir_all(&dir).unwrap();
  dir
}

/// Runner whose "ffmpeg"/"ffprobe" are generated shell scripts.
fn fake_runner(dir: &Path, ffmpeg_body: &str, ffprobe_body: &str) -> FfmpegRunner {
  let ffmpeg = common::write_script(dir, "fake_ffmpeg", ffmpeg_body);
  let ffprobe = common::write_script(dir, "fake_ffprobe", ffprobe_body);
  FfmpegRunner::new(
    ffmpeg.to_string_lossy().into_owned(),
    ffprobe.to_string_lossy().into_owned(),
  )
}

async fn run_collecting(
  runner: &FfmpegRunner,
  input: Option<&Path>,
) -> (anyhow::Result<()>, Vec<i64>) {
  let (tx, mut rx) = mpsc::channel(32);
  let result = runner.run(&[], Some(tx), input).await;
  let mut seen = Vec::new();
  while let Some(value) = rx.recv().await {
    seen.push(value);
  }
  (result, seen)
}

#[tokio::test]
async fn out_time_ms_against_known_duration_reports_halfway() {
  let dir = scratch_dir();
  let runner = fake_runner(
    &dir,
    "printf 'out_time_ms=5000000\\nprogress=end\\n'",
    "echo 10.000000",
  );
  let (result, seen) = run_collecting(&runner, Some(Path::new("ref.mp4"))).await;
  result.unwrap();
  assert_eq!(seen, vec![50]);
}

#[tokio::test]
async fn out_time_timestamp_is_parsed() {
  let dir = scratch_dir();
  let runner = fake_runner(
    &dir,
    "printf 'out_time=00:00:05.00\\nprogress=end\\n'",
    "echo 10.000000",
  );
  let (result, seen) = run_collecting(&runner, Some(Path::new("ref.mp4"))).await;
  result.unwrap();
  assert_eq!(seen, vec![50]);
}

#[tokio::test]
async fn malformed_timestamp_keeps_previous_value() {
  let dir = scratch_dir();
  let runner = fake_runner(
    &dir,
    "printf 'out_time=garbage\\nout_time_ms=2500000\\nprogress=end\\n'",
    "echo 10.000000",
  );
  let (result, seen) = run_collecting(&runner, Some(Path::new("ref.mp4"))).await;
  result.unwrap();
  assert_eq!(seen, vec![25]);
}

#[tokio::test]
async fn percentage_is_capped_at_one_hundred() {
  let dir = scratch_dir();
  let runner = fake_runner(
    &dir,
    "printf 'out_time_ms=20000000\\nprogress=end\\n'",
    "echo 10.000000",
  );
  let (result, seen) = run_collecting(&runner, Some(Path::new("ref.mp4"))).await;
  result.unwrap();
  assert_eq!(seen, vec![100]);
}

#[tokio::test]
async fn negative_out_time_sentinel_is_clamped_to_zero() {
  let dir = scratch_dir();
  let runner = fake_runner(
    &dir,
    "printf 'out_time_ms=-9223372036854775808\\nout_time_ms=5000000\\nprogress=end\\n'",
    "echo 10.000000",
  );
  let (result, seen) = run_collecting(&runner, Some(Path::new("ref.mp4"))).await;
  result.unwrap();
  assert_eq!(seen, vec![0, 50]);
}

#[tokio::test]
async fn unparsable_duration_disables_progress_but_run_succeeds() {
  let dir = scratch_dir();
  let runner = fake_runner(
    &dir,
    "printf 'out_time_ms=5000000\\nprogress=end\\n'",
    "echo N/A",
  );
  let (result, seen) = run_collecting(&runner, Some(Path::new("ref.mp4"))).await;
  result.unwrap();
  assert!(seen.is_empty());
}

#[tokio::test]
async fn progress_end_terminates_the_read_loop_immediately() {
  let dir = scratch_dir();
  // Lines after progress=end must never produce callbacks.
  let runner = fake_runner(
    &dir,
    "printf 'progress=end\\nout_time_ms=10000000\\n'",
    "echo 10.000000",
  );
  let (result, seen) = run_collecting(&runner, Some(Path::new("ref.mp4"))).await;
  result.unwrap();
  assert!(seen.is_empty());
}

#[tokio::test]
async fn nonzero_exit_fails_even_after_full_progress() {
  let dir = scratch_dir();
  let runner = fake_runner(
    &dir,
    "printf 'out_time_ms=10000000\\nprogress=end\\n'; echo 'conversion failed' 1>&2; exit 3",
    "echo 10.000000",
  );
  let (result, seen) = run_collecting(&runner, Some(Path::new("ref.mp4"))).await;
  assert_eq!(seen, vec![100]);
  let err = result.unwrap_err();
  assert!(format!("{err:#}").contains("conversion failed"));
}

#[tokio::test]
async fn run_without_progress_channel_skips_the_duration_probe() {
  let dir = scratch_dir();
  // ffprobe script exits non-zero; it must never be invoked on this path.
  let runner = fake_runner(&dir, "printf 'progress=end\\n'", "exit 1");
  runner.run(&[], None, None).await.unwrap();
}

#[tokio::test]
async fn duration_probe_parses_seconds() {
  let dir = scratch_dir();
  let runner = fake_runner(&dir, "true", "echo 12.5");
  assert_eq!(runner.duration(Path::new("ref.mp4")).await.unwrap(), 12.5);

  let runner = fake_runner(&dir, "true", "echo not-a-number");
  assert_eq!(runner.duration(Path::new("ref.mp4")).await.unwrap(), 0.0);
}
