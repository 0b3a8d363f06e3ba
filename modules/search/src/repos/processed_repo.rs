use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Whether this consumer already applied the envelope
pub async fn exists(
    pool: &PgPool,
    consumer_id: &str,
    envelope_id: Uuid,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM processed_events WHERE consumer_id = $1 AND envelope_id = $2
        )
        "#,
    )
    .bind(consumer_id)
    .bind(envelope_id)
    .fetch_one(pool)
    .await
}

/// Claim the envelope for this consumer inside the apply transaction
///
/// Returns `false` when another delivery already claimed it. Concurrent
/// claims block on the primary key until the first transaction finishes.
pub async fn try_claim(
    tx: &mut Transaction<'_, Postgres>,
    consumer_id: &str,
    envelope_id: Uuid,
    event_kind: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO processed_events (consumer_id, envelope_id, event_kind)
        VALUES ($1, $2, $3)
        ON CONFLICT (consumer_id, envelope_id) DO NOTHING
        "#,
    )
    .bind(consumer_id)
    .bind(envelope_id)
    .bind(event_kind)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() == 1)
}
