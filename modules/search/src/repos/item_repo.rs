use auction_contracts::AuctionStatus;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::ApplyError;
use crate::models::SearchItem;

const COLUMNS: &str = "id, reserve_price, seller, winner, sold_amount, current_high_bid, \
    created_at, updated_at, auction_end, status, make, model, year, color, mileage, \
    image_url, last_event_at";

#[derive(Debug, FromRow)]
pub struct SearchItemRow {
    pub id: Uuid,
    pub reserve_price: i64,
    pub seller: String,
    pub winner: Option<String>,
    pub sold_amount: Option<i64>,
    pub current_high_bid: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub auction_end: DateTime<Utc>,
    pub status: String,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub color: String,
    pub mileage: i32,
    pub image_url: String,
    pub last_event_at: DateTime<Utc>,
}

impl SearchItemRow {
    pub fn into_item(self) -> Result<SearchItem, ApplyError> {
        let status: AuctionStatus = self
            .status
            .parse()
            .map_err(|e| ApplyError::Storage(format!("search item {}: {}", self.id, e)))?;

        Ok(SearchItem {
            id: self.id,
            reserve_price: self.reserve_price,
            seller: self.seller,
            winner: self.winner,
            sold_amount: self.sold_amount,
            current_high_bid: self.current_high_bid,
            created_at: self.created_at,
            updated_at: self.updated_at,
            auction_end: self.auction_end,
            status,
            make: self.make,
            model: self.model,
            year: self.year,
            color: self.color,
            mileage: self.mileage,
            image_url: self.image_url,
            last_event_at: self.last_event_at,
        })
    }
}

/// Load an entry and lock it for the rest of the transaction
pub async fn find_for_update(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<Option<SearchItemRow>, sqlx::Error> {
    sqlx::query_as::<_, SearchItemRow>(&format!(
        "SELECT {} FROM search_items WHERE id = $1 FOR UPDATE",
        COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await
}

pub async fn find(pool: &PgPool, id: Uuid) -> Result<Option<SearchItemRow>, sqlx::Error> {
    sqlx::query_as::<_, SearchItemRow>(&format!(
        "SELECT {} FROM search_items WHERE id = $1",
        COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn list(pool: &PgPool) -> Result<Vec<SearchItemRow>, sqlx::Error> {
    sqlx::query_as::<_, SearchItemRow>(&format!(
        "SELECT {} FROM search_items ORDER BY auction_end ASC, id ASC",
        COLUMNS
    ))
    .fetch_all(pool)
    .await
}

/// Insert or overwrite an entry
pub async fn upsert(
    tx: &mut Transaction<'_, Postgres>,
    item: &SearchItem,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO search_items
            (id, reserve_price, seller, winner, sold_amount, current_high_bid,
             created_at, updated_at, auction_end, status,
             make, model, year, color, mileage, image_url, last_event_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        ON CONFLICT (id) DO UPDATE SET
            reserve_price = EXCLUDED.reserve_price,
            seller = EXCLUDED.seller,
            winner = EXCLUDED.winner,
            sold_amount = EXCLUDED.sold_amount,
            current_high_bid = EXCLUDED.current_high_bid,
            created_at = EXCLUDED.created_at,
            updated_at = EXCLUDED.updated_at,
            auction_end = EXCLUDED.auction_end,
            status = EXCLUDED.status,
            make = EXCLUDED.make,
            model = EXCLUDED.model,
            year = EXCLUDED.year,
            color = EXCLUDED.color,
            mileage = EXCLUDED.mileage,
            image_url = EXCLUDED.image_url,
            last_event_at = EXCLUDED.last_event_at
        "#,
    )
    .bind(item.id)
    .bind(item.reserve_price)
    .bind(&item.seller)
    .bind(&item.winner)
    .bind(item.sold_amount)
    .bind(item.current_high_bid)
    .bind(item.created_at)
    .bind(item.updated_at)
    .bind(item.auction_end)
    .bind(item.status.as_str())
    .bind(&item.make)
    .bind(&item.model)
    .bind(item.year)
    .bind(&item.color)
    .bind(item.mileage)
    .bind(&item.image_url)
    .bind(item.last_event_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub async fn delete(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM search_items WHERE id = $1")
        .bind(id)
        .execute(&mut **tx)
        .await?;

    Ok(())
}
