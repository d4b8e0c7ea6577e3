use async_trait::async_trait;
use common::{Address, Currency, Money, OrderId, Page, PageRequest, ProductId, UserId};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::error::{OrderError, Result};
use crate::ledger::OrderLedger;
use crate::model::{
    NewOrder, Order, OrderDetails, OrderItem, OrderLookup, OrderStatusHistory, StatusUpdate,
};
use crate::status::{OrderStatus, TransitionPolicy};

const ORDER_COLUMNS: &str = "id, user_id, status, currency, subtotal_cents, shipping_cents, \
     tax_cents, total_cents, shipping_street, shipping_city, shipping_state, shipping_zip_code, \
     shipping_country, payment_method_id, transaction_id, tracking_number, created_at, updated_at";

const TRACKING_NUMBER_INDEX: &str = "idx_orders_tracking_number";

/// PostgreSQL-backed order ledger.
#[derive(Clone)]
pub struct PostgresOrderLedger {
    pool: PgPool,
}

impl PostgresOrderLedger {
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

    fn row_to_order(row: &PgRow) -> Result<Order> {
        let status: String = row.try_get("status")?;
        let currency: String = row.try_get("currency")?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            status: status.parse()?,
            currency: Currency::new(&currency).map_err(|e| sqlx::Error::Decode(e.into()))?,
            subtotal: Money::from_cents(row.try_get("subtotal_cents")?),
            shipping: Money::from_cents(row.try_get("shipping_cents")?),
            tax: Money::from_cents(row.try_get("tax_cents")?),
            total: Money::from_cents(row.try_get("total_cents")?),
            shipping_address: Address {
                street: row.try_get("shipping_street")?,
                city: row.try_get("shipping_city")?,
                state: row.try_get("shipping_state")?,
                zip_code: row.try_get("shipping_zip_code")?,
                country: row.try_get("shipping_country")?,
            },
            payment_method_id: row.try_get("payment_method_id")?,
            transaction_id: row.try_get("transaction_id")?,
            tracking_number: row.try_get("tracking_number")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_item(row: &PgRow) -> Result<OrderItem> {
        let quantity: i32 = row.try_get("quantity")?;
        Ok(OrderItem {
            id: row.try_get("id")?,
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            product_name: row.try_get("product_name")?,
            quantity: u32::try_from(quantity).map_err(|e| sqlx::Error::Decode(e.into()))?,
            unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
            line_total: Money::from_cents(row.try_get("line_total_cents")?),
        })
    }

    fn row_to_history(row: &PgRow) -> Result<OrderStatusHistory> {
        let status: String = row.try_get("status")?;
        Ok(OrderStatusHistory {
            id: row.try_get("id")?,
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            status: status.parse()?,
            note: row.try_get("note")?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn load_details(&self, order: Order) -> Result<OrderDetails> {
        let items = sqlx::query(
            r#"
            SELECT id, order_id, product_id, product_name, quantity, unit_price_cents, line_total_cents
            FROM order_items
            WHERE order_id = $1
            ORDER BY line_number ASC
            "#,
        )
        .bind(order.id.as_uuid())
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(Self::row_to_item)
        .collect::<Result<Vec<_>>>()?;

        let history = sqlx::query(
            r#"
            SELECT id, order_id, status, note, created_at
            FROM order_status_history
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order.id.as_uuid())
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(Self::row_to_history)
        .collect::<Result<Vec<_>>>()?;

        Ok(OrderDetails {
            order,
            items,
            history,
        })
    }

    /// Updates the locked order row and appends its history entry.
    async fn apply_transition(
        tx: &mut Transaction<'_, Postgres>,
        order_id: OrderId,
        update: &StatusUpdate,
    ) -> Result<Order> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE orders
            SET status = $2, tracking_number = COALESCE($3, tracking_number), updated_at = NOW()
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order_id.as_uuid())
        .bind(update.status.as_str())
        .bind(update.tracking_number.as_deref())
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some(TRACKING_NUMBER_INDEX)
            {
                return OrderError::InvalidOrder(format!(
                    "tracking number {} is already assigned",
                    update.tracking_number.as_deref().unwrap_or_default()
                ));
            }
            OrderError::Database(e)
        })?;

        sqlx::query("INSERT INTO order_status_history (order_id, status, note) VALUES ($1, $2, $3)")
            .bind(order_id.as_uuid())
            .bind(update.status.as_str())
            .bind(&update.note)
            .execute(&mut **tx)
            .await?;

        Self::row_to_order(&row)
    }
}

#[async_trait]
impl OrderLedger for PostgresOrderLedger {
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id))]
    async fn create_order(&self, order: NewOrder) -> Result<OrderDetails> {
        order.validate()?;
        let order_id = order.id;
        let total = order.total();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, user_id, status, currency, subtotal_cents, shipping_cents, tax_cents, total_cents,
                shipping_street, shipping_city, shipping_state, shipping_zip_code, shipping_country,
                payment_method_id, transaction_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.currency.as_str())
        .bind(order.subtotal.cents())
        .bind(order.shipping.cents())
        .bind(order.tax.cents())
        .bind(total.cents())
        .bind(&order.shipping_address.street)
        .bind(&order.shipping_address.city)
        .bind(&order.shipping_address.state)
        .bind(&order.shipping_address.zip_code)
        .bind(&order.shipping_address.country)
        .bind(order.payment_method_id.as_deref())
        .bind(order.transaction_id.as_deref())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
                && db_err.constraint() == Some("orders_pkey")
            {
                return OrderError::AlreadyExists(order_id);
            }
            OrderError::Database(e)
        })?;

        for (line_number, item) in (1_i32..).zip(&order.items) {
            let quantity = i32::try_from(item.quantity).map_err(|_| {
                OrderError::InvalidOrder(format!("quantity too large for {}", item.product_id))
            })?;
            sqlx::query(
                r#"
                INSERT INTO order_items (
                    id, order_id, line_number, product_id, product_name, quantity,
                    unit_price_cents, line_total_cents
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(order_id.as_uuid())
            .bind(line_number)
            .bind(item.product_id.as_str())
            .bind(&item.product_name)
            .bind(quantity)
            .bind(item.unit_price.cents())
            .bind(item.line_total.cents())
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("INSERT INTO order_status_history (order_id, status, note) VALUES ($1, $2, $3)")
            .bind(order_id.as_uuid())
            .bind(order.status.as_str())
            .bind(&order.note)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let created = self
            .find_order(order_id)
            .await?
            .ok_or_else(|| {
                OrderError::Persistence(format!("order {order_id} vanished after commit"))
            })?;
        tracing::debug!("order committed");
        self.load_details(created).await
    }

    async fn get_order(&self, lookup: &OrderLookup, user_id: UserId) -> Result<OrderDetails> {
        let row = match lookup {
            OrderLookup::Id(id) => {
                sqlx::query(&format!(
                    "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND user_id = $2"
                ))
                .bind(id.as_uuid())
                .bind(user_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?
            }
            OrderLookup::TrackingNumber(tn) => {
                sqlx::query(&format!(
                    "SELECT {ORDER_COLUMNS} FROM orders WHERE tracking_number = $1 AND user_id = $2"
                ))
                .bind(tn.as_str())
                .bind(user_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?
            }
        };

        let row = row.ok_or_else(|| OrderError::NotFound(lookup.clone()))?;
        let order = Self::row_to_order(&row)?;
        self.load_details(order).await
    }

    async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_order).transpose()
    }

    async fn list_orders(
        &self,
        user_id: UserId,
        page: PageRequest,
        status: Option<OrderStatus>,
    ) -> Result<Page<Order>> {
        let status = status.map(|s| s.as_str());

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders WHERE user_id = $1 AND ($2::TEXT IS NULL OR status = $2)",
        )
        .bind(user_id.as_uuid())
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE user_id = $1 AND ($2::TEXT IS NULL OR status = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(user_id.as_uuid())
        .bind(status)
        .bind(i64::try_from(page.limit()).unwrap_or(i64::MAX))
        .bind(i64::try_from(page.offset()).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let orders = rows
            .iter()
            .map(Self::row_to_order)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page::new(
            orders,
            page,
            u64::try_from(total).unwrap_or_default(),
        ))
    }

    #[tracing::instrument(skip(self, update), fields(status = %update.status))]
    async fn update_status(
        &self,
        order_id: OrderId,
        update: StatusUpdate,
        policy: TransitionPolicy,
    ) -> Result<Order> {
        if update.status == OrderStatus::Unspecified {
            return Err(OrderError::InvalidStatus(update.status.to_string()));
        }

        let mut tx = self.pool.begin().await?;
        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
                .bind(order_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;
        let current: OrderStatus = current
            .ok_or(OrderError::NotFound(OrderLookup::Id(order_id)))?
            .parse()?;

        if !policy.permits(current, update.status) {
            return Err(OrderError::InvalidTransition {
                order_id,
                from: current,
                to: update.status,
            });
        }

        let order = Self::apply_transition(&mut tx, order_id, &update).await?;
        tx.commit().await?;
        Ok(order)
    }

    #[tracing::instrument(skip(self))]
    async fn cancel_order(
        &self,
        order_id: OrderId,
        user_id: UserId,
        reason: &str,
    ) -> Result<Order> {
        let mut tx = self.pool.begin().await?;
        let current: Option<String> = sqlx::query_scalar(
            "SELECT status FROM orders WHERE id = $1 AND user_id = $2 FOR UPDATE",
        )
        .bind(order_id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;
        let current: OrderStatus = current
            .ok_or(OrderError::NotFound(OrderLookup::Id(order_id)))?
            .parse()?;

        if !current.is_cancellable() {
            return Err(OrderError::NotCancellable {
                order_id,
                status: current,
            });
        }

        let update = StatusUpdate::new(OrderStatus::Cancelled, reason);
        let order = Self::apply_transition(&mut tx, order_id, &update).await?;
        tx.commit().await?;
        Ok(order)
    }
}
