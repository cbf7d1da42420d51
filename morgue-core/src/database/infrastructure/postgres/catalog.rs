use async_trait::async_trait;
use morgue_model::{DeathRecord, JobId, MovieRecord, TmdbId};
use sqlx::{PgPool, QueryBuilder, Row, postgres::PgRow};
use tracing::info;
use uuid::Uuid;

use crate::database::ports::catalog::CatalogRepository;
use crate::error::{IngestError, Result, db_error};

#[derive(Debug, Clone)]
pub struct PostgresCatalogRepository {
    pool: PgPool,
}

impl PostgresCatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn map_movie(row: &PgRow) -> Result<MovieRecord> {
        let read = |column: &str, e: sqlx::Error| {
            IngestError::Internal(format!("Failed to read movie {column}: {e}"))
        };

        Ok(MovieRecord {
            tmdb_id: TmdbId::from_i64(
                row.try_get("tmdb_id").map_err(|e| read("tmdb_id", e))?,
            ),
            title: row.try_get("title").map_err(|e| read("title", e))?,
            year: row.try_get("year").map_err(|e| read("year", e))?,
            director: row.try_get("director").map_err(|e| read("director", e))?,
            tagline: row.try_get("tagline").map_err(|e| read("tagline", e))?,
            poster_path: row
                .try_get("poster_path")
                .map_err(|e| read("poster_path", e))?,
            runtime: row.try_get("runtime").map_err(|e| read("runtime", e))?,
            content_rating: row
                .try_get("content_rating")
                .map_err(|e| read("content_rating", e))?,
        })
    }

    fn map_death(row: &PgRow) -> Result<DeathRecord> {
        let read = |column: &str, e: sqlx::Error| {
            IngestError::Internal(format!("Failed to read death {column}: {e}"))
        };

        Ok(DeathRecord {
            character: row
                .try_get("character_name")
                .map_err(|e| read("character_name", e))?,
            time_of_death: row
                .try_get("time_of_death")
                .map_err(|e| read("time_of_death", e))?,
            cause: row.try_get("cause").map_err(|e| read("cause", e))?,
            killed_by: row.try_get("killed_by").map_err(|e| read("killed_by", e))?,
            context: row.try_get("context").map_err(|e| read("context", e))?,
            is_ambiguous: row
                .try_get("is_ambiguous")
                .map_err(|e| read("is_ambiguous", e))?,
        })
    }
}

#[async_trait]
impl CatalogRepository for PostgresCatalogRepository {
    async fn movie_exists(&self, tmdb_id: TmdbId) -> Result<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM movies WHERE tmdb_id = $1)",
        )
        .bind(tmdb_id.as_i64())
        .fetch_one(self.pool())
        .await
        .map_err(db_error("Failed to check movie existence"))
    }

    async fn commit_ingestion(
        &self,
        job: JobId,
        movie: &MovieRecord,
        deaths: &[DeathRecord],
    ) -> Result<()> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(db_error("Failed to begin ingestion transaction"))?;

        let movie_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO movies (
                tmdb_id, title, year, director, tagline, poster_path,
                runtime, content_rating
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (tmdb_id) DO UPDATE SET
                title = EXCLUDED.title,
                year = EXCLUDED.year,
                director = EXCLUDED.director,
                tagline = EXCLUDED.tagline,
                poster_path = EXCLUDED.poster_path,
                runtime = EXCLUDED.runtime,
                content_rating = EXCLUDED.content_rating,
                updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(movie.tmdb_id.as_i64())
        .bind(&movie.title)
        .bind(movie.year)
        .bind(&movie.director)
        .bind(&movie.tagline)
        .bind(&movie.poster_path)
        .bind(movie.runtime)
        .bind(&movie.content_rating)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("Failed to upsert movie"))?;

        sqlx::query("DELETE FROM deaths WHERE movie_id = $1")
            .bind(movie_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to clear previous deaths"))?;

        if !deaths.is_empty() {
            let mut builder = QueryBuilder::new(
                "INSERT INTO deaths (movie_id, position, character_name, time_of_death, \
                 cause, killed_by, context, is_ambiguous) ",
            );
            builder.push_values(deaths.iter().enumerate(), |mut row, (idx, death)| {
                row.push_bind(movie_id)
                    .push_bind(idx as i32)
                    .push_bind(&death.character)
                    .push_bind(&death.time_of_death)
                    .push_bind(&death.cause)
                    .push_bind(&death.killed_by)
                    .push_bind(&death.context)
                    .push_bind(death.is_ambiguous);
            });
            builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(db_error("Failed to insert deaths"))?;
        }

        let updated = sqlx::query(
            r#"
            UPDATE ingestion_queue
            SET status = 'complete',
                tmdb_id = $2,
                failure_reason = NULL,
                completed_at = NOW()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(job.to_uuid())
        .bind(movie.tmdb_id.as_i64())
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to complete job"))?;

        if updated.rows_affected() != 1 {
            // Dropping the transaction rolls the catalog writes back.
            return Err(IngestError::Internal(format!(
                "job {job} is no longer processing; catalog write abandoned"
            )));
        }

        tx.commit()
            .await
            .map_err(db_error("Failed to commit ingestion transaction"))?;

        info!(
            job_id = %job,
            tmdb_id = %movie.tmdb_id,
            deaths = deaths.len(),
            "committed movie and death set"
        );
        Ok(())
    }

    async fn get_movie(&self, tmdb_id: TmdbId) -> Result<Option<MovieRecord>> {
        let row = sqlx::query(
            r#"
            SELECT tmdb_id, title, year, director, tagline, poster_path,
                   runtime, content_rating
            FROM movies
            WHERE tmdb_id = $1
            "#,
        )
        .bind(tmdb_id.as_i64())
        .fetch_optional(self.pool())
        .await
        .map_err(db_error("Failed to load movie"))?;

        row.map(|row| Self::map_movie(&row)).transpose()
    }

    async fn deaths_for(&self, tmdb_id: TmdbId) -> Result<Vec<DeathRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT d.character_name, d.time_of_death, d.cause, d.killed_by,
                   d.context, d.is_ambiguous
            FROM deaths d
            JOIN movies m ON m.id = d.movie_id
            WHERE m.tmdb_id = $1
            ORDER BY d.position
            "#,
        )
        .bind(tmdb_id.as_i64())
        .fetch_all(self.pool())
        .await
        .map_err(db_error("Failed to load deaths"))?;

        rows.iter().map(Self::map_death).collect()
    }
}
