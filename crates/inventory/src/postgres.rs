use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::{OrderId, ProductId, ReservationId};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::error::{InventoryError, Result};
use crate::ledger::{InventoryLedger, merge_items};
use crate::model::{
    InventoryItem, InventoryReservation, ReservationReceipt, ReservationStatus, StockCheck,
};

const RESERVATION_COLUMNS: &str =
    "id, order_id, product_id, quantity, status, reserved_at, expires_at, settled_at";

/// PostgreSQL-backed inventory ledger.
///
/// Stock rows are locked with `SELECT ... FOR UPDATE` in ascending
/// product-id order inside a single transaction per reservation.
#[derive(Clone)]
pub struct PostgresInventoryLedger {
    pool: PgPool,
}

impl PostgresInventoryLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_reservation(row: PgRow) -> Result<InventoryReservation> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<ReservationStatus>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?;
        let quantity: i32 = row.try_get("quantity")?;

        Ok(InventoryReservation {
            id: ReservationId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            quantity: u32::try_from(quantity).map_err(|e| sqlx::Error::Decode(e.into()))?,
            status,
            reserved_at: row.try_get("reserved_at")?,
            expires_at: row.try_get("expires_at")?,
            settled_at: row.try_get("settled_at")?,
        })
    }

    /// Adds units back to stock in ascending product order.
    async fn restock(
        tx: &mut Transaction<'_, Postgres>,
        returned: &BTreeMap<ProductId, u32>,
    ) -> Result<u64> {
        let mut units = 0;
        for (product_id, quantity) in returned {
            sqlx::query(
                "UPDATE inventory_stock SET quantity = quantity + $2, updated_at = NOW() WHERE product_id = $1",
            )
            .bind(product_id.as_str())
            .bind(to_db_quantity(product_id, *quantity)?)
            .execute(&mut **tx)
            .await?;
            units += u64::from(*quantity);
        }
        Ok(units)
    }

    async fn reservation_exists(&self, id: ReservationId) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM inventory_reservations WHERE id = $1)")
                .bind(id.as_uuid())
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }
}

fn to_db_quantity(product_id: &ProductId, quantity: u32) -> Result<i32> {
    i32::try_from(quantity).map_err(|_| InventoryError::InvalidQuantity {
        product_id: product_id.clone(),
        quantity: u64::from(quantity),
    })
}

#[async_trait]
impl InventoryLedger for PostgresInventoryLedger {
    async fn check_inventory(&self, items: &[InventoryItem]) -> Result<StockCheck> {
        let merged = merge_items(items)?;
        let ids: Vec<String> = merged.keys().map(|p| p.as_str().to_string()).collect();

        let rows = sqlx::query(
            "SELECT product_id, quantity FROM inventory_stock WHERE product_id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut levels: BTreeMap<String, i32> = BTreeMap::new();
        for row in rows {
            levels.insert(row.try_get("product_id")?, row.try_get("quantity")?);
        }

        let short = merged
            .into_iter()
            .filter(|(product_id, wanted)| {
                let available = levels.get(product_id.as_str()).copied().unwrap_or(0);
                i64::from(available) < i64::from(*wanted)
            })
            .map(|(product_id, _)| product_id)
            .collect();
        Ok(StockCheck::from_shortfalls(short))
    }

    #[tracing::instrument(skip(self, items), fields(lines = items.len()))]
    async fn reserve_inventory(
        &self,
        order_id: OrderId,
        items: &[InventoryItem],
        expiration_minutes: u32,
    ) -> Result<ReservationReceipt> {
        let merged = merge_items(items)?;
        let mut tx = self.pool.begin().await?;

        // Lock every row first, in product order, then decide.
        let mut short = Vec::new();
        for (product_id, wanted) in &merged {
            let available: Option<i32> = sqlx::query_scalar(
                "SELECT quantity FROM inventory_stock WHERE product_id = $1 FOR UPDATE",
            )
            .bind(product_id.as_str())
            .fetch_optional(&mut *tx)
            .await?;

            match available {
                Some(available) if i64::from(available) >= i64::from(*wanted) => {}
                _ => short.push(product_id.clone()),
            }
        }
        if !short.is_empty() {
            tx.rollback().await?;
            metrics::counter!("inventory_reservations_rejected_total").increment(1);
            return Err(InventoryError::InsufficientStock { product_ids: short });
        }

        let reserved_at = Utc::now();
        let expires_at = reserved_at + Duration::minutes(i64::from(expiration_minutes));
        let mut reservations = Vec::with_capacity(merged.len());
        for (product_id, quantity) in merged {
            let db_quantity = to_db_quantity(&product_id, quantity)?;
            sqlx::query(
                "UPDATE inventory_stock SET quantity = quantity - $2, updated_at = NOW() WHERE product_id = $1",
            )
            .bind(product_id.as_str())
            .bind(db_quantity)
            .execute(&mut *tx)
            .await?;

            let reservation = InventoryReservation {
                id: ReservationId::new(),
                order_id,
                product_id,
                quantity,
                status: ReservationStatus::Held,
                reserved_at,
                expires_at,
                settled_at: None,
            };
            sqlx::query(
                r#"
                INSERT INTO inventory_reservations (id, order_id, product_id, quantity, status, reserved_at, expires_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(reservation.id.as_uuid())
            .bind(order_id.as_uuid())
            .bind(reservation.product_id.as_str())
            .bind(db_quantity)
            .bind(reservation.status.as_str())
            .bind(reserved_at)
            .bind(expires_at)
            .execute(&mut *tx)
            .await?;

            reservations.push(reservation);
        }

        tx.commit().await?;
        metrics::counter!("inventory_reservations_total").increment(1);
        Ok(ReservationReceipt {
            order_id,
            reservations,
            expires_at,
        })
    }

    async fn stock_level(&self, product_id: &ProductId) -> Result<Option<u32>> {
        let quantity: Option<i32> =
            sqlx::query_scalar("SELECT quantity FROM inventory_stock WHERE product_id = $1")
                .bind(product_id.as_str())
                .fetch_optional(&self.pool)
                .await?;
        // The CHECK constraint keeps stored counts non-negative.
        Ok(quantity.map(|q| u32::try_from(q).unwrap_or(0)))
    }

    async fn set_stock(&self, product_id: &ProductId, quantity: u32) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory_stock (product_id, quantity)
            VALUES ($1, $2)
            ON CONFLICT (product_id)
            DO UPDATE SET quantity = EXCLUDED.quantity, updated_at = NOW()
            "#,
        )
        .bind(product_id.as_str())
        .bind(to_db_quantity(product_id, quantity)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reservations_for_order(&self, order_id: OrderId) -> Result<Vec<InventoryReservation>> {
        let rows = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM inventory_reservations WHERE order_id = $1 ORDER BY product_id"
        ))
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_reservation).collect()
    }

    async fn expired_reservations(&self, now: DateTime<Utc>) -> Result<Vec<InventoryReservation>> {
        let rows = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM inventory_reservations \
             WHERE status = 'held' AND expires_at <= $1 ORDER BY expires_at"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_reservation).collect()
    }

    async fn release_reservation(&self, id: ReservationId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            r#"
            UPDATE inventory_reservations
            SET status = 'released', settled_at = NOW()
            WHERE id = $1 AND status = 'held'
            RETURNING product_id, quantity
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return if self.reservation_exists(id).await? {
                Ok(false)
            } else {
                Err(InventoryError::ReservationNotFound(id))
            };
        };

        let product_id = ProductId::new(row.try_get::<String, _>("product_id")?);
        let quantity: i32 = row.try_get("quantity")?;
        let returned = BTreeMap::from([(product_id, u32::try_from(quantity).unwrap_or(0))]);
        Self::restock(&mut tx, &returned).await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn commit_reservation(&self, id: ReservationId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_reservations
            SET status = 'committed', settled_at = NOW()
            WHERE id = $1 AND status = 'held'
            "#,
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            Ok(true)
        } else if self.reservation_exists(id).await? {
            Ok(false)
        } else {
            Err(InventoryError::ReservationNotFound(id))
        }
    }

    async fn release_order_reservations(&self, order_id: OrderId) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query(
            r#"
            UPDATE inventory_reservations
            SET status = 'released', settled_at = NOW()
            WHERE order_id = $1 AND status IN ('held', 'committed')
            RETURNING product_id, quantity
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&mut *tx)
        .await?;

        let mut returned: BTreeMap<ProductId, u32> = BTreeMap::new();
        for row in rows {
            let product_id = ProductId::new(row.try_get::<String, _>("product_id")?);
            let quantity: i32 = row.try_get("quantity")?;
            let entry = returned.entry(product_id).or_insert(0);
            *entry = entry.saturating_add(u32::try_from(quantity).unwrap_or(0));
        }

        let units = Self::restock(&mut tx, &returned).await?;
        tx.commit().await?;
        Ok(units)
    }
}
