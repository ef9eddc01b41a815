use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::info;
use uuid::Uuid;

use crate::models::{JobRecord, JobStatus, JobUpdate};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// Listing only ever covers the most recent N jobs; older records stay
/// readable by id after falling out of the index.
pub const RECENCY_CAPACITY: i64 = 100;

/// Durable job ledger and the single source of truth for job state.
#[derive(Clone)]
pub struct JobStore {
  pool: SqlitePool,
}

impl JobStore {
  pub async fn connect(database_url: &str) -> Result<Self> {
    // One writer connection; sqlite serializes writers anyway and this keeps
    // field merges from interleaving.
    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .idle_timeout(None)
      .max_lifetime(None)
      .connect(database_url)
      .await
      .with_context(|| format!("Failed to connect to database at {database_url}"))?;

    MIGRATOR.run(&pool)
      .await
      .context("Failed to run database migrations")?;
    info!("Database migrations complete");
    Ok(Self { pool })
  }

  /// Writes the full initial record and appends it to the recency index,
  /// evicting index entries beyond capacity.
  pub async fn create(&self, job_type: &str, parameters: serde_json::Value) -> Result<JobRecord> {
    let now = Utc::now();
    let job = JobRecord {
      job_id: Uuid::new_v4(),
      job_type: job_type.to_string(),
      status: JobStatus::Pending,
      progress: 0,
      message: None,
      parameters,
      output_file: None,
      file_size: None,
      error: None,
      created_at: now,
      updated_at: now,
    };

    let mut tx = self.pool.begin().await?;
    sqlx::query(
      "INSERT INTO jobs (job_id, job_type, status, progress, parameters, created_at, updated_at)
       VALUES (?1, ?2, ?3, 0, ?4, ?5, ?5)",
    )
    .bind(job.job_id.to_string())
    .bind(&job.job_type)
    .bind(job.status.as_str())
    .bind(job.parameters.to_string())
    .bind(job.created_at)
    .execute(&mut *tx)
    .await?;

    sqlx::query("INSERT INTO job_index (job_id) VALUES (?1)")
      .bind(job.job_id.to_string())
      .execute(&mut *tx)
      .await?;
    sqlx::query("DELETE FROM job_index WHERE pos <= (SELECT MAX(pos) FROM job_index) - ?1")
      .bind(RECENCY_CAPACITY)
      .execute(&mut *tx)
      .await?;
    tx.commit().await?;

    Ok(job)
  }

  /// Field-level merge; unspecified fields are untouched and `updated_at` is
  /// always refreshed. Updating an absent job is a no-op.
  pub async fn update(&self, job_id: Uuid, update: &JobUpdate) -> Result<()> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE jobs SET updated_at = ");
    qb.push_bind(Utc::now());
    if let Some(status) = update.status {
      qb.push(", status = ");
      qb.push_bind(status.as_str());
    }
    if let Some(progress) = update.progress {
      qb.push(", progress = ");
      qb.push_bind(progress);
    }
    if let Some(message) = &update.message {
      qb.push(", message = ");
      qb.push_bind(message.as_str());
    }
    if let Some(output_file) = &update.output_file {
      qb.push(", output_file = ");
      qb.push_bind(output_file.as_str());
    }
    if let Some(file_size) = update.file_size {
      qb.push(", file_size = ");
      qb.push_bind(file_size);
    }
    if let Some(error) = &update.error {
      qb.push(", error = ");
      qb.push_bind(error.as_str());
    }
    qb.push(" WHERE job_id = ");
    qb.push_bind(job_id.to_string());

    qb.build().execute(&self.pool).await?;
    Ok(())
  }

  pub async fn get(&self, job_id: Uuid) -> Result<Option<JobRecord>> {
    let row = sqlx::query("SELECT * FROM jobs WHERE job_id = ?1")
      .bind(job_id.to_string())
      .fetch_optional(&self.pool)
      .await?;
    row.as_ref().map(record_from_row).transpose()
  }

  /// Most-recently-created-first page over the recency index, plus the
  /// total number of indexed jobs.
  pub async fn list(&self, page: i64, page_size: i64) -> Result<(Vec<JobRecord>, i64)> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM job_index")
      .fetch_one(&self.pool)
      .await?;

    let offset = (page.max(1) - 1) * page_size;
    let rows = sqlx::query(
      "SELECT j.* FROM job_index i JOIN jobs j ON j.job_id = i.job_id
       ORDER BY i.pos DESC LIMIT ?1 OFFSET ?2",
    )
    .bind(page_size)
    .bind(offset)
    .fetch_all(&self.pool)
    .await?;

    let jobs = rows.iter().map(record_from_row).collect::<Result<Vec<_>>>()?;
    Ok((jobs, total))
  }
}

fn record_from_row(row: &SqliteRow) -> Result<JobRecord> {
  let job_id: String = row.try_get("job_id")?;
  let status_raw: String = row.try_get("status")?;
  let status = JobStatus::parse(&status_raw)
    .ok_or_else(|| anyhow!("Unknown job status in store: {status_raw}"))?;
  let parameters: String = row.try_get("parameters")?;

  Ok(JobRecord {
    job_id: Uuid::parse_str(&job_id)?,
    job_type: row.try_get("job_type")?,
    status,
    progress: row.try_get("progress")?,
    message: row.try_get("message")?,
    parameters: serde_json::from_str(&parameters)?,
    output_file: row.try_get("output_file")?,
    file_size: row.try_get("file_size")?,
    error: row.try_get("error")?,
    created_at: row.try_get("created_at")?,
    updated_at: row.try_get("updated_at")?,
  })
}
