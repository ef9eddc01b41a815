#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use uuid::Uuid;

use mediaq::config::Config;
use mediaq::context::AppContext;
use mediaq::handlers::HandlerRegistry;
use mediaq::models::{JobRecord, JobStatus};
use mediaq::store::JobStore;

/// Per-test scratch directories plus an in-memory ledger.
pub fn temp_config() -> Config {
  let root = std::env::temp_dir().join(format!("mediaq-test-{}", Uuid::new_v4()));
  std::fs::create_dir_all(root.join("uploads")).unwrap();
  std::fs::create_dir_all(root.join("processed")).unwrap();
  std::fs::create_dir_all(root.join("temp")).unwrap();
  Config {
    database_url: "sqlite::memory:".to_string(),
    server_port: 0,
    upload_dir: root.join("uploads"),
    processed_dir: root.join("processed"),
    temp_dir: root.join("temp"),
    ffmpeg_path: "ffmpeg".to_string(),
    ffprobe_path: "ffprobe".to_string(),
    ffmpeg_threads: 1,
  }
}

pub async fn test_store() -> JobStore {
  JobStore::connect("sqlite::memory:").await.unwrap()
}

pub async fn test_ctx(registry: HandlerRegistry) -> AppContext {
  let config = temp_config();
  let store = JobStore::connect(&config.database_url).await.unwrap();
  AppContext::new(config, store, registry)
}

pub async fn wait_for_status(ctx: &AppContext, job_id: Uuid, status: JobStatus) -> JobRecord {
  for _ in 0..200 {
    if let Some(job) = ctx.store().get(job_id).await.unwrap() {
      if job.status == status {
        return job;
      }
      assert!(
        !(job.status.is_terminal() && job.status != status),
        "job {job_id} reached terminal {:?} while waiting for {status:?} (error: {:?})",
        job.status,
        job.error,
      );
    }
    tokio::time::sleep(Duration::from_millis(25)).await;
  }
  panic!("job {job_id} never reached {status:?}");
}

/// Executable shell script standing in for an external tool.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
  use std::os::unix::fs::PermissionsExt;
  let path = dir.join(name);
  std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
  let mut perms = std::fs::metadata(&path).unwrap().permissions();
  perms.set_mode(0o755);
  std::fs::set_permissions(&path, perms).unwrap();
  path
}
