use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::dlq::FailedEvent;

#[derive(Debug, FromRow)]
pub struct FailedEventRow {
    pub consumer_id: String,
    pub envelope_id: Option<Uuid>,
    pub subject: String,
    pub partition_key: Option<String>,
    pub envelope_json: serde_json::Value,
    pub error: String,
    pub attempts: i32,
    pub failed_at: DateTime<Utc>,
}

impl From<FailedEventRow> for FailedEvent {
    fn from(row: FailedEventRow) -> Self {
        FailedEvent {
            consumer_id: row.consumer_id,
            envelope_id: row.envelope_id,
            subject: row.subject,
            partition_key: row.partition_key,
            envelope_json: row.envelope_json,
            error: row.error,
            attempts: row.attempts,
            failed_at: row.failed_at,
        }
    }
}

pub async fn insert(pool: &PgPool, failed: &FailedEvent) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO failed_events
            (consumer_id, envelope_id, subject, partition_key, envelope_json, error, attempts, failed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(&failed.consumer_id)
    .bind(failed.envelope_id)
    .bind(&failed.subject)
    .bind(&failed.partition_key)
    .bind(&failed.envelope_json)
    .bind(&failed.error)
    .bind(failed.attempts)
    .bind(failed.failed_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn list_for_consumer(
    pool: &PgPool,
    consumer_id: &str,
) -> Result<Vec<FailedEventRow>, sqlx::Error> {
    sqlx::query_as::<_, FailedEventRow>(
        r#"
        SELECT consumer_id, envelope_id, subject, partition_key, envelope_json,
               error, attempts, failed_at
        FROM failed_events
        WHERE consumer_id = $1
        ORDER BY failed_at ASC, id ASC
        "#,
    )
    .bind(consumer_id)
    .fetch_all(pool)
    .await
}
