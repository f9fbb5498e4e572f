//! Repository for the `workers` table.

use sqlx::PgPool;

use crate::models::worker::Worker;

const COLUMNS: &str = "name, slots, registered_at, heartbeat_at";

pub struct WorkerRepo;

impl WorkerRepo {
    /// Insert or refresh a worker row.
    pub async fn register(pool: &PgPool, name: &str, slots: i32) -> Result<Worker, sqlx::Error> {
        let query = format!(
            "INSERT INTO workers (name, slots) VALUES ($1, $2) \
             ON CONFLICT (name) DO UPDATE \
             SET slots = EXCLUDED.slots, heartbeat_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Worker>(&query)
            .bind(name)
            .bind(slots)
            .fetch_one(pool)
            .await
    }

    /// Bump `heartbeat_at`. Returns `false` if the worker is not registered.
    pub async fn heartbeat(pool: &PgPool, name: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE workers SET heartbeat_at = NOW() WHERE name = $1")
            .bind(name)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn deregister(pool: &PgPool, name: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM workers WHERE name = $1")
            .bind(name)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Total slots of workers whose heartbeat is within `window_secs`.
    pub async fn live_slot_count(pool: &PgPool, window_secs: f64) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(slots), 0)::BIGINT FROM workers \
             WHERE heartbeat_at > NOW() - make_interval(secs => $1)",
        )
        .bind(window_secs)
        .fetch_one(pool)
        .await?;
        Ok(count)
    }
}
