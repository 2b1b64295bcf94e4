use std::collections::HashMap;

use async_trait::async_trait;
use domain::{
    DeliveryStatus, GeoPoint, Money, Order, OrderItem, OrderRecord, ProductId, ShippingInfo,
};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{OrderId, OrderStore, Result, StoreError};

const ORDER_COLUMNS: &str = r#"
    id, total_cents, status, user_email, shipping_name, shipping_phone, shipping_address,
    shipping_lat, shipping_lng, payment_method, transaction_id, created_at, updated_at
"#;

/// PostgreSQL-backed order store implementation.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a pool to `database_url` and runs the migrations.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let store = Self::new(pool);
        store.run_migrations().await?;
        Ok(store)
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_record(row: &PgRow) -> Result<OrderRecord> {
        let id = OrderId::from_uuid(row.try_get::<Uuid, _>("id")?);

        let status_label: String = row.try_get("status")?;
        let status: DeliveryStatus = status_label.parse().map_err(|_| StoreError::Corrupt {
            order_id: id,
            reason: format!("unknown status '{status_label}'"),
        })?;

        let lat: Option<f64> = row.try_get("shipping_lat")?;
        let lng: Option<f64> = row.try_get("shipping_lng")?;

        Ok(OrderRecord {
            id,
            items: Vec::new(),
            total: Money::from_cents(row.try_get("total_cents")?),
            status,
            user_email: row.try_get("user_email")?,
            shipping: ShippingInfo {
                name: row.try_get("shipping_name")?,
                phone: row.try_get("shipping_phone")?,
                address: row.try_get("shipping_address")?,
            },
            shipping_location: lat.zip(lng).map(|(lat, lng)| GeoPoint::new(lat, lng)),
            payment_method: row.try_get("payment_method")?,
            transaction_id: row.try_get("transaction_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_item(row: &PgRow) -> Result<(Uuid, OrderItem)> {
        let order_id: Uuid = row.try_get("order_id")?;
        let quantity: i32 = row.try_get("quantity")?;
        let quantity = u32::try_from(quantity).map_err(|_| StoreError::Corrupt {
            order_id: OrderId::from_uuid(order_id),
            reason: format!("negative quantity {quantity}"),
        })?;

        Ok((
            order_id,
            OrderItem {
                product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
                quantity,
                unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
            },
        ))
    }

    /// Loads the items of every given order, keyed by order id, in position order.
    async fn load_items(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderItem>>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, position, product_id, quantity, unit_price_cents
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, position ASC
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in &rows {
            let (order_id, item) = Self::row_to_item(row)?;
            items.entry(order_id).or_default().push(item);
        }
        Ok(items)
    }

    async fn hydrate(&self, rows: Vec<PgRow>) -> Result<Vec<Order>> {
        let mut records = rows
            .iter()
            .map(Self::row_to_record)
            .collect::<Result<Vec<_>>>()?;

        let ids: Vec<Uuid> = records.iter().map(|r| r.id.as_uuid()).collect();
        let mut items = self.load_items(&ids).await?;

        for record in &mut records {
            record.items = items.remove(&record.id.as_uuid()).unwrap_or_default();
        }
        Ok(records.into_iter().map(Order::from_record).collect())
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id()))]
    async fn insert(&self, order: &Order) -> Result<()> {
        let columns = item_columns(order.id(), order.items())?;
        let mut tx = self.pool.begin().await?;
        let location = order.shipping_location();

        sqlx::query(
            r#"
            INSERT INTO orders (id, total_cents, status, user_email, shipping_name, shipping_phone,
                                shipping_address, shipping_lat, shipping_lng, payment_method,
                                transaction_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.total().cents())
        .bind(order.status().as_str())
        .bind(order.user_email())
        .bind(order.shipping().name.as_deref())
        .bind(order.shipping().phone.as_deref())
        .bind(order.shipping().address.as_deref())
        .bind(location.map(|p| p.lat))
        .bind(location.map(|p| p.lng))
        .bind(order.payment_method())
        .bind(order.transaction_id())
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return StoreError::AlreadyExists(order.id());
            }
            StoreError::Database(e)
        })?;

        for ((position, quantity), item) in columns.into_iter().zip(order.items()) {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, position, product_id, quantity, unit_price_cents)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(order.id().as_uuid())
            .bind(position)
            .bind(item.product_id.as_str())
            .bind(quantity)
            .bind(item.unit_price.cents())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        metrics::counter!("orders_stored_total").increment(1);
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list(&self, user_email: Option<&str>) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders
             WHERE ($1::TEXT IS NULL OR user_email = $1)
             ORDER BY created_at DESC"
        ))
        .bind(user_email)
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    #[tracing::instrument(skip(self))]
    async fn set_status(&self, id: OrderId, status: DeliveryStatus) -> Result<Order> {
        let row = sqlx::query(&format!(
            "UPDATE orders SET status = $2, updated_at = NOW()
             WHERE id = $1
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound(id))?;

        self.hydrate(vec![row])
            .await?
            .pop()
            .ok_or(StoreError::NotFound(id))
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, id: OrderId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// The `(position, quantity)` INTEGER columns of each item row.
fn item_columns(order_id: OrderId, items: &[OrderItem]) -> Result<Vec<(i32, i32)>> {
    items
        .iter()
        .enumerate()
        .map(|(position, item)| {
            let unrepresentable = |reason: String| StoreError::Unrepresentable { order_id, reason };
            let position = i32::try_from(position)
                .map_err(|_| unrepresentable(format!("item position {position} out of range")))?;
            let quantity = i32::try_from(item.quantity).map_err(|_| {
                unrepresentable(format!(
                    "quantity {} of {} out of range",
                    item.quantity, item.product_id
                ))
            })?;
            Ok((position, quantity))
        })
        .collect()
}
