//! Repository for the `queue_entries` table.

use sqlx::PgPool;

use crate::models::queue_entry::QueueEntryRow;
use crate::DbId;

/// Column list for `queue_entries` queries.
const COLUMNS: &str = "id, task_id, networks, target_label, enqueued_at, claimed_by, claimed_at";

pub struct QueueRepo;

impl QueueRepo {
    /// Append a pending entry.
    pub async fn insert(
        pool: &PgPool,
        task_id: &str,
        networks: i16,
        target_label: i32,
    ) -> Result<QueueEntryRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO queue_entries (task_id, networks, target_label) \
             VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, QueueEntryRow>(&query)
            .bind(task_id)
            .bind(networks)
            .bind(target_label)
            .fetch_one(pool)
            .await
    }

    /// Atomically claim the oldest pending entry for `claimed_by`.
    ///
    /// Uses `SELECT FOR UPDATE SKIP LOCKED` so concurrent slots never
    /// claim the same row.
    pub async fn claim_next(
        pool: &PgPool,
        claimed_by: &str,
    ) -> Result<Option<QueueEntryRow>, sqlx::Error> {
        let query = format!(
            "UPDATE queue_entries \
             SET claimed_by = $1, claimed_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM queue_entries \
                 WHERE claimed_at IS NULL \
                 ORDER BY enqueued_at ASC, id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, QueueEntryRow>(&query)
            .bind(claimed_by)
            .fetch_optional(pool)
            .await
    }

    /// The entry currently claimed by `claimed_by`, if any.
    pub async fn find_claimed_by(
        pool: &PgPool,
        claimed_by: &str,
    ) -> Result<Option<QueueEntryRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM queue_entries WHERE claimed_by = $1 LIMIT 1");
        sqlx::query_as::<_, QueueEntryRow>(&query)
            .bind(claimed_by)
            .fetch_optional(pool)
            .await
    }

    /// Delete a claimed entry. Returns `false` if it no longer exists.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM queue_entries WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Number of entries not yet claimed.
    pub async fn count_pending(pool: &PgPool) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM queue_entries WHERE claimed_at IS NULL")
                .fetch_one(pool)
                .await?;
        Ok(count)
    }

    /// Return every claim held by `claimed_by` to the pending state.
    pub async fn release_claimed_by(pool: &PgPool, claimed_by: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE queue_entries \
             SET claimed_by = NULL, claimed_at = NULL \
             WHERE claimed_by = $1",
        )
        .bind(claimed_by)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Return claims older than `lease_secs` to the pending state.
    pub async fn release_expired(pool: &PgPool, lease_secs: f64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE queue_entries \
             SET claimed_by = NULL, claimed_at = NULL \
             WHERE claimed_at < NOW() - make_interval(secs => $1)",
        )
        .bind(lease_secs)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
