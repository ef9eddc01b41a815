use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
  pub database_url: String,
  pub server_port: u16,
  pub upload_dir: PathBuf,
  pub processed_dir: PathBuf,
  pub temp_dir: PathBuf,
  pub ffmpeg_path: String,
  pub ffprobe_path: String,
  pub ffmpeg_threads: u32,
}

impl Config {
  pub fn from_env() -> Self {
    Self {
      database_url: env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://data/jobs.db?mode=rwc".into()),
      server_port: env::var("SERVER_PORT")
        .unwrap_or_else(|_| "8080".into())
        .parse()
        .unwrap_or(8080),
      upload_dir: env::var("UPLOAD_DIR").unwrap_or_else(|_| "data/uploads".into()).into(),
      processed_dir: env::var("PROCESSED_DIR").unwrap_or_else(|_| "data/processed".into()).into(),
      temp_dir: env::var("TEMP_DIR").unwrap_or_else(|_| "data/temp".into()).into(),
      ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".into()),
      ffprobe_path: env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".into()),
      ffmpeg_threads: env::var("FFMPEG_THREADS")
        .unwrap_or_else(|_| "4".into())
        .parse()
        .unwrap_or(4),
    }
  }
}
