use auction_contracts::AuctionEnvelope;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::store::{OutboxRecord, StoreError};

#[derive(Debug, FromRow)]
pub struct OutboxRow {
    pub seq: i64,
    pub envelope_id: Uuid,
    pub aggregate_id: String,
    pub event_kind: String,
    pub envelope: serde_json::Value,
    pub delivered: bool,
    pub attempt_count: i32,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl OutboxRow {
    pub fn into_record(self) -> OutboxRecord {
        OutboxRecord {
            seq: self.seq,
            envelope_id: self.envelope_id,
            aggregate_id: self.aggregate_id,
            event_kind: self.event_kind,
            body: self.envelope,
            delivered: self.delivered,
            attempt_count: self.attempt_count,
            created_at: self.created_at,
            delivered_at: self.delivered_at,
            last_error: self.last_error,
        }
    }
}

/// Append an envelope inside the caller's transaction
pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    envelope: &AuctionEnvelope,
) -> Result<(), StoreError> {
    let body = serde_json::to_value(envelope)?;

    sqlx::query(
        r#"
        INSERT INTO auction_outbox (envelope_id, aggregate_id, event_kind, envelope)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(envelope.envelope_id)
    .bind(&envelope.aggregate_id)
    .bind(&envelope.event_kind)
    .bind(body)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub async fn fetch_undelivered(pool: &PgPool, limit: i64) -> Result<Vec<OutboxRow>, sqlx::Error> {
    sqlx::query_as::<_, OutboxRow>(
        r#"
        SELECT seq, envelope_id, aggregate_id, event_kind, envelope, delivered, attempt_count,
               created_at, delivered_at, last_error
        FROM auction_outbox
        WHERE NOT delivered
        ORDER BY seq ASC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn mark_delivered(pool: &PgPool, envelope_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE auction_outbox
        SET delivered = TRUE,
            delivered_at = NOW(),
            attempt_count = attempt_count + 1
        WHERE envelope_id = $1 AND NOT delivered
        "#,
    )
    .bind(envelope_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn record_failed_attempt(
    pool: &PgPool,
    envelope_id: Uuid,
    error: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE auction_outbox
        SET attempt_count = attempt_count + 1,
            last_error = $2
        WHERE envelope_id = $1
        "#,
    )
    .bind(envelope_id)
    .bind(error)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn purge_delivered(pool: &PgPool, older_than: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM auction_outbox
        WHERE delivered AND delivered_at < $1
        "#,
    )
    .bind(older_than)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
