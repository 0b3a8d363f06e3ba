use auction_contracts::AuctionStatus;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::{Auction, Item};
use crate::store::StoreError;

#[derive(Debug, FromRow)]
pub struct AuctionRow {
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
    pub version: i64,
}

impl AuctionRow {
    pub fn into_auction(self) -> Result<Auction, StoreError> {
        let status: AuctionStatus = self
            .status
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("auction {}: {}", self.id, e)))?;

        Ok(Auction {
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
            item: Item {
                make: self.make,
                model: self.model,
                year: self.year,
                color: self.color,
                mileage: self.mileage,
                image_url: self.image_url,
            },
            version: self.version,
        })
    }
}

pub async fn find(pool: &PgPool, id: Uuid) -> Result<Option<AuctionRow>, sqlx::Error> {
    sqlx::query_as::<_, AuctionRow>(
        r#"
        SELECT id, reserve_price, seller, winner, sold_amount, current_high_bid,
               created_at, updated_at, auction_end, status,
               make, model, year, color, mileage, image_url, version
        FROM auctions
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    auction: &Auction,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO auctions
            (id, reserve_price, seller, winner, sold_amount, current_high_bid,
             created_at, updated_at, auction_end, status,
             make, model, year, color, mileage, image_url, version)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        "#,
    )
    .bind(auction.id)
    .bind(auction.reserve_price)
    .bind(&auction.seller)
    .bind(&auction.winner)
    .bind(auction.sold_amount)
    .bind(auction.current_high_bid)
    .bind(auction.created_at)
    .bind(auction.updated_at)
    .bind(auction.auction_end)
    .bind(auction.status.as_str())
    .bind(&auction.item.make)
    .bind(&auction.item.model)
    .bind(auction.item.year)
    .bind(&auction.item.color)
    .bind(auction.item.mileage)
    .bind(&auction.item.image_url)
    .bind(auction.version)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Overwrite the row only if nobody else moved it past `expected_version`
///
/// Returns the number of rows touched; 0 means a concurrent writer won.
pub async fn update_if_version(
    tx: &mut Transaction<'_, Postgres>,
    auction: &Auction,
    expected_version: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE auctions
        SET winner = $3,
            sold_amount = $4,
            current_high_bid = $5,
            updated_at = $6,
            status = $7,
            make = $8,
            model = $9,
            year = $10,
            color = $11,
            mileage = $12,
            image_url = $13,
            version = $14
        WHERE id = $1 AND version = $2
        "#,
    )
    .bind(auction.id)
    .bind(expected_version)
    .bind(&auction.winner)
    .bind(auction.sold_amount)
    .bind(auction.current_high_bid)
    .bind(auction.updated_at)
    .bind(auction.status.as_str())
    .bind(&auction.item.make)
    .bind(&auction.item.model)
    .bind(auction.item.year)
    .bind(&auction.item.color)
    .bind(auction.item.mileage)
    .bind(&auction.item.image_url)
    .bind(auction.version)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected())
}

pub async fn delete_if_version(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    expected_version: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM auctions WHERE id = $1 AND version = $2")
        .bind(id)
        .bind(expected_version)
        .execute(&mut **tx)
        .await?;

    Ok(result.rows_affected())
}
