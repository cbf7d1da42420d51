use async_trait::async_trait;
use chrono::{DateTime, Utc};
use morgue_model::{IngestionJob, JobId, JobStatus, TmdbId};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::debug;
use uuid::Uuid;

use crate::database::ports::queue::{EnqueueOutcome, IngestionQueue};
use crate::error::{IngestError, Result, db_error};

const JOB_COLUMNS: &str = "id, query, year, status, tmdb_id, failure_reason, created_at, resolved_at, completed_at";

#[derive(Debug, Clone)]
pub struct PostgresIngestionQueue {
    pool: PgPool,
}

impl PostgresIngestionQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn map_row(row: &PgRow) -> Result<IngestionJob> {
        let id: Uuid = row
            .try_get("id")
            .map_err(|e| IngestError::Internal(format!("Failed to read job id: {e}")))?;
        let query: String = row
            .try_get("query")
            .map_err(|e| IngestError::Internal(format!("Failed to read query: {e}")))?;
        let year: Option<i32> = row
            .try_get("year")
            .map_err(|e| IngestError::Internal(format!("Failed to read year: {e}")))?;
        let status: String = row
            .try_get("status")
            .map_err(|e| IngestError::Internal(format!("Failed to read status: {e}")))?;
        let tmdb_id: Option<i64> = row
            .try_get("tmdb_id")
            .map_err(|e| IngestError::Internal(format!("Failed to read tmdb_id: {e}")))?;
        let failure_reason: Option<String> = row
            .try_get("failure_reason")
            .map_err(|e| {
                IngestError::Internal(format!("Failed to read failure_reason: {e}"))
            })?;
        let created_at: DateTime<Utc> = row
            .try_get("created_at")
            .map_err(|e| IngestError::Internal(format!("Failed to read created_at: {e}")))?;
        let resolved_at: Option<DateTime<Utc>> = row
            .try_get("resolved_at")
            .map_err(|e| {
                IngestError::Internal(format!("Failed to read resolved_at: {e}"))
            })?;
        let completed_at: Option<DateTime<Utc>> = row
            .try_get("completed_at")
            .map_err(|e| {
                IngestError::Internal(format!("Failed to read completed_at: {e}"))
            })?;

        Ok(IngestionJob {
            id: JobId(id),
            query,
            year,
            status: status.parse::<JobStatus>()?,
            tmdb_id: tmdb_id.map(TmdbId::from_i64),
            failure_reason,
            created_at,
            resolved_at,
            completed_at,
        })
    }
}

#[async_trait]
impl IngestionQueue for PostgresIngestionQueue {
    async fn enqueue(&self, query: &str, year: Option<i32>) -> Result<EnqueueOutcome> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(db_error("Failed to begin enqueue transaction"))?;

        // Serialise concurrent enqueues of the same text so the duplicate
        // check and the insert cannot interleave.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext(LOWER(BTRIM($1))))")
            .bind(query)
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to lock query text"))?;

        let existing: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id
            FROM ingestion_queue
            WHERE LOWER(BTRIM(query)) = LOWER(BTRIM($1))
              AND status IN ('pending', 'processing')
            ORDER BY created_at
            LIMIT 1
            "#,
        )
        .bind(query)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("Failed to check for duplicate query"))?;

        if let Some(id) = existing {
            tx.commit()
                .await
                .map_err(db_error("Failed to commit enqueue transaction"))?;
            return Ok(EnqueueOutcome::Duplicate(JobId(id)));
        }

        let job = IngestionJob::pending(query, year);
        sqlx::query(
            r#"
            INSERT INTO ingestion_queue (id, query, year, status, created_at)
            VALUES ($1, $2, $3, 'pending', $4)
            "#,
        )
        .bind(job.id.to_uuid())
        .bind(&job.query)
        .bind(job.year)
        .bind(job.created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to insert ingestion job"))?;

        tx.commit()
            .await
            .map_err(db_error("Failed to commit enqueue transaction"))?;

        Ok(EnqueueOutcome::Created(job.id))
    }

    async fn claim_next_pending(&self) -> Result<Option<IngestionJob>> {
        // The inner SELECT skips rows another claimer holds; the outer
        // status guard makes the transition a compare-and-swap.
        let sql = format!(
            r#"
            UPDATE ingestion_queue
            SET status = 'processing'
            WHERE id = (
                SELECT id
                FROM ingestion_queue
                WHERE status = 'pending'
                ORDER BY created_at, id
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
              AND status = 'pending'
            RETURNING {JOB_COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .fetch_optional(self.pool())
            .await
            .map_err(db_error("Failed to claim next pending job"))?;

        let job = row.map(|row| Self::map_row(&row)).transpose()?;
        if let Some(job) = &job {
            debug!(job_id = %job.id, "claimed next pending job");
        }
        Ok(job)
    }

    async fn claim_specific(&self, id: JobId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE ingestion_queue
            SET status = 'processing'
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id.to_uuid())
        .execute(self.pool())
        .await
        .map_err(db_error("Failed to claim job"))?;

        Ok(result.rows_affected() == 1)
    }

    async fn get(&self, id: JobId) -> Result<Option<IngestionJob>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM ingestion_queue WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.to_uuid())
            .fetch_optional(self.pool())
            .await
            .map_err(db_error("Failed to load job"))?;

        row.map(|row| Self::map_row(&row)).transpose()
    }

    async fn record_resolution(&self, id: JobId, tmdb_id: TmdbId) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE ingestion_queue
            SET tmdb_id = $2,
                resolved_at = COALESCE(resolved_at, clock_timestamp())
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id.to_uuid())
        .bind(tmdb_id.as_i64())
        .execute(self.pool())
        .await
        .map_err(db_error("Failed to record resolved movie"))?;

        Ok(())
    }

    async fn find_earlier_processing(
        &self,
        tmdb_id: TmdbId,
        job: JobId,
    ) -> Result<Option<JobId>> {
        let other: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT other.id
            FROM ingestion_queue other
            JOIN ingestion_queue me ON me.id = $2
            WHERE other.status = 'processing'
              AND other.tmdb_id = $1
              AND other.id <> me.id
              AND other.resolved_at IS NOT NULL
              AND (me.resolved_at IS NULL
                   OR (other.resolved_at, other.id) < (me.resolved_at, me.id))
            ORDER BY other.resolved_at, other.id
            LIMIT 1
            "#,
        )
        .bind(tmdb_id.as_i64())
        .bind(job.to_uuid())
        .fetch_optional(self.pool())
        .await
        .map_err(db_error("Failed to check for duplicate processing"))?;

        Ok(other.map(JobId))
    }

    async fn mark_complete(&self, id: JobId, tmdb_id: Option<TmdbId>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE ingestion_queue
            SET status = 'complete',
                tmdb_id = COALESCE($2, tmdb_id),
                failure_reason = NULL,
                completed_at = NOW()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id.to_uuid())
        .bind(tmdb_id.map(|id| id.as_i64()))
        .execute(self.pool())
        .await
        .map_err(db_error("Failed to mark job complete"))?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_failed(&self, id: JobId, reason: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE ingestion_queue
            SET status = 'failed',
                failure_reason = $2,
                completed_at = NOW()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id.to_uuid())
        .bind(reason)
        .execute(self.pool())
        .await
        .map_err(db_error("Failed to mark job failed"))?;

        Ok(result.rows_affected() == 1)
    }
}
