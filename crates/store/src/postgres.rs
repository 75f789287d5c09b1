use std::collections::HashMap;

use async_trait::async_trait;
use common::{Money, OrderId, ProductId, UserId, VariantId};
use domain::{Order, Product, PromotionalCode, ReferralCode, StockKey, Variant};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    Result, StoreError,
    store::{CatalogStore, CodeRegistry, OrderRepository, StockUpdate},
};

fn to_db_count(count: u32) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

fn from_db_count(count: i32) -> u32 {
    u32::try_from(count).unwrap_or(0)
}

/// PostgreSQL-backed store.
///
/// Stock and code-usage counters are changed with conditional `UPDATE ...
/// RETURNING` statements, so the check and the write are one statement.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Reads one counter, `None` if it does not exist.
    pub async fn stock_level(&self, key: &StockKey) -> Result<Option<i64>> {
        let level = match &key.variant_id {
            Some(variant_id) => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT stock FROM variants WHERE product_id = $1 AND id = $2",
                )
                .bind(key.product_id.as_str())
                .bind(variant_id.as_str())
                .fetch_optional(&self.pool)
                .await?
            }
            None => sqlx::query_scalar::<_, Option<i64>>(
                r#"
                SELECT base_stock FROM products
                WHERE id = $1
                  AND NOT EXISTS (SELECT 1 FROM variants WHERE product_id = $1)
                "#,
            )
            .bind(key.product_id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .flatten(),
        };
        Ok(level)
    }

    fn row_to_variant(row: &PgRow) -> Result<Variant> {
        Ok(Variant {
            id: VariantId::new(row.try_get::<String, _>("id")?),
            label: row.try_get("label")?,
            stock: row.try_get("stock")?,
            price: Money::from_minor(row.try_get("price")?),
        })
    }

    fn row_to_product(row: &PgRow, variants: Vec<Variant>) -> Result<Product> {
        Ok(Product {
            id: ProductId::new(row.try_get::<String, _>("id")?),
            name: row.try_get("name")?,
            category: row.try_get("category")?,
            subcategory: row.try_get("subcategory")?,
            price: Money::from_minor(row.try_get("price")?),
            base_stock: row.try_get("base_stock")?,
            variants,
            low_stock_threshold: row.try_get("low_stock_threshold")?,
            in_stock: row.try_get("in_stock")?,
        })
    }
}

#[async_trait]
impl CatalogStore for PostgresStore {
    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>> {
        let mut products = self.get_products(std::slice::from_ref(id)).await?;
        Ok(products.remove(id))
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, Product>> {
        let ids: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();

        let product_rows = sqlx::query(
            r#"
            SELECT id, name, category, subcategory, price, base_stock, low_stock_threshold, in_stock
            FROM products
            WHERE id = ANY($1)
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let variant_rows = sqlx::query(
            r#"
            SELECT product_id, id, label, stock, price
            FROM variants
            WHERE product_id = ANY($1)
            ORDER BY product_id, position
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut variants: HashMap<String, Vec<Variant>> = HashMap::new();
        for row in &variant_rows {
            let product_id: String = row.try_get("product_id")?;
            variants
                .entry(product_id)
                .or_default()
                .push(Self::row_to_variant(row)?);
        }

        product_rows
            .iter()
            .map(|row| -> Result<(ProductId, Product)> {
                let id: String = row.try_get("id")?;
                let variants = variants.remove(&id).unwrap_or_default();
                let product = Self::row_to_product(row, variants)?;
                Ok((product.id.clone(), product))
            })
            .collect()
    }

    async fn upsert_product(&self, product: Product) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO products (id, name, category, subcategory, price, base_stock, low_stock_threshold, in_stock)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                category = EXCLUDED.category,
                subcategory = EXCLUDED.subcategory,
                price = EXCLUDED.price,
                base_stock = EXCLUDED.base_stock,
                low_stock_threshold = EXCLUDED.low_stock_threshold,
                in_stock = EXCLUDED.in_stock
            "#,
        )
        .bind(product.id.as_str())
        .bind(&product.name)
        .bind(&product.category)
        .bind(&product.subcategory)
        .bind(product.price.minor())
        .bind(product.base_stock)
        .bind(product.low_stock_threshold)
        .bind(product.computed_in_stock())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM variants WHERE product_id = $1")
            .bind(product.id.as_str())
            .execute(&mut *tx)
            .await?;

        for (position, variant) in product.variants.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO variants (product_id, id, label, stock, price, position)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(product.id.as_str())
            .bind(variant.id.as_str())
            .bind(&variant.label)
            .bind(variant.stock)
            .bind(variant.price.minor())
            .bind(i32::try_from(position).unwrap_or(i32::MAX))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn decrement_stock_if_available(
        &self,
        key: &StockKey,
        quantity: u32,
    ) -> Result<StockUpdate> {
        let quantity = i64::from(quantity);
        let remaining: Option<i64> = match &key.variant_id {
            Some(variant_id) => {
                sqlx::query_scalar(
                    r#"
                    UPDATE variants SET stock = stock - $3
                    WHERE product_id = $1 AND id = $2 AND stock >= $3
                    RETURNING stock
                    "#,
                )
                .bind(key.product_id.as_str())
                .bind(variant_id.as_str())
                .bind(quantity)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar(
                    r#"
                    UPDATE products SET base_stock = base_stock - $2
                    WHERE id = $1
                      AND base_stock >= $2
                      AND NOT EXISTS (SELECT 1 FROM variants WHERE product_id = $1)
                    RETURNING base_stock
                    "#,
                )
                .bind(key.product_id.as_str())
                .bind(quantity)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        if let Some(remaining) = remaining {
            return Ok(StockUpdate::Applied { remaining });
        }
        match self.stock_level(key).await? {
            Some(_) => Ok(StockUpdate::Insufficient),
            None => Ok(StockUpdate::Missing),
        }
    }

    async fn increment_stock(&self, key: &StockKey, quantity: u32) -> Result<Option<i64>> {
        let quantity = i64::from(quantity);
        let level: Option<i64> = match &key.variant_id {
            Some(variant_id) => {
                sqlx::query_scalar(
                    r#"
                    UPDATE variants SET stock = stock + $3
                    WHERE product_id = $1 AND id = $2
                    RETURNING stock
                    "#,
                )
                .bind(key.product_id.as_str())
                .bind(variant_id.as_str())
                .bind(quantity)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar(
                    r#"
                    UPDATE products SET base_stock = base_stock + $2
                    WHERE id = $1
                      AND base_stock IS NOT NULL
                      AND NOT EXISTS (SELECT 1 FROM variants WHERE product_id = $1)
                    RETURNING base_stock
                    "#,
                )
                .bind(key.product_id.as_str())
                .bind(quantity)
                .fetch_optional(&self.pool)
                .await?
            }
        };
        Ok(level)
    }

    async fn refresh_in_stock(&self, id: &ProductId) -> Result<Option<bool>> {
        let in_stock: Option<bool> = sqlx::query_scalar(
            r#"
            UPDATE products p SET in_stock = CASE
                WHEN EXISTS (SELECT 1 FROM variants v WHERE v.product_id = p.id)
                    THEN EXISTS (SELECT 1 FROM variants v WHERE v.product_id = p.id AND v.stock > 0)
                ELSE COALESCE(p.base_stock, 0) > 0
            END
            WHERE p.id = $1
            RETURNING in_stock
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(in_stock)
    }
}

#[async_trait]
impl OrderRepository for PostgresStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        let body = serde_json::to_value(order)?;

        let result = sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, status, discount_code, created_at, body)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(order.id.as_str())
        .bind(order.user_id.as_ref().map(UserId::as_str))
        .bind(order.status().as_str())
        .bind(&order.discount_code)
        .bind(order.created_at)
        .bind(body)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "order {} already exists",
                order.id
            )));
        }
        Ok(())
    }

    async fn get_order(&self, id: &OrderId) -> Result<Option<Order>> {
        let body: Option<serde_json::Value> =
            sqlx::query_scalar("SELECT body FROM orders WHERE id = $1")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;

        match body {
            Some(body) => Ok(Some(serde_json::from_value(body)?)),
            None => Ok(None),
        }
    }

    async fn save_order(&self, order: &Order) -> Result<()> {
        let body = serde_json::to_value(order)?;

        let result = sqlx::query(
            r#"
            UPDATE orders SET status = $2, discount_code = $3, body = $4
            WHERE id = $1
            "#,
        )
        .bind(order.id.as_str())
        .bind(order.status().as_str())
        .bind(&order.discount_code)
        .bind(body)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("order {}", order.id)));
        }
        Ok(())
    }

    async fn delete_order(&self, id: &OrderId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_active_orders(&self, user_id: &UserId) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders WHERE user_id = $1 AND status <> 'Cancelled'",
        )
        .bind(user_id.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn count_code_redemptions(&self, user_id: &UserId, code: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM orders
            WHERE user_id = $1
              AND UPPER(discount_code) = UPPER($2)
              AND status <> 'Cancelled'
            "#,
        )
        .bind(user_id.as_str())
        .bind(code.trim())
        .fetch_one(&self.pool)
        .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

#[async_trait]
impl CodeRegistry for PostgresStore {
    async fn find_promotional_code(&self, code: &str) -> Result<Option<PromotionalCode>> {
        let row: Option<PgRow> = sqlx::query(
            "SELECT usage_count, body FROM promotional_codes WHERE UPPER(code) = UPPER($1)",
        )
        .bind(code.trim())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let mut promo: PromotionalCode = serde_json::from_value(row.try_get("body")?)?;
                promo.usage_count = from_db_count(row.try_get("usage_count")?);
                Ok(Some(promo))
            }
            None => Ok(None),
        }
    }

    async fn find_referral_code(&self, code: &str) -> Result<Option<ReferralCode>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT usage_count, total_sales, body FROM referral_codes
            WHERE UPPER(code) = UPPER($1)
            "#,
        )
        .bind(code.trim())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let mut referral: ReferralCode = serde_json::from_value(row.try_get("body")?)?;
                referral.usage_count = from_db_count(row.try_get("usage_count")?);
                referral.total_sales = Money::from_minor(row.try_get("total_sales")?);
                Ok(Some(referral))
            }
            None => Ok(None),
        }
    }

    async fn upsert_promotional_code(&self, code: PromotionalCode) -> Result<()> {
        let body = serde_json::to_value(&code)?;

        sqlx::query(
            r#"
            INSERT INTO promotional_codes (code, usage_count, usage_limit, body)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT ((UPPER(code))) DO UPDATE SET
                code = EXCLUDED.code,
                usage_count = EXCLUDED.usage_count,
                usage_limit = EXCLUDED.usage_limit,
                body = EXCLUDED.body
            "#,
        )
        .bind(&code.code)
        .bind(to_db_count(code.usage_count))
        .bind(code.usage_limit.map(to_db_count))
        .bind(body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_referral_code(&self, code: ReferralCode) -> Result<()> {
        let body = serde_json::to_value(&code)?;

        sqlx::query(
            r#"
            INSERT INTO referral_codes (code, usage_count, total_sales, body)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT ((UPPER(code))) DO UPDATE SET
                code = EXCLUDED.code,
                usage_count = EXCLUDED.usage_count,
                total_sales = EXCLUDED.total_sales,
                body = EXCLUDED.body
            "#,
        )
        .bind(&code.code)
        .bind(to_db_count(code.usage_count))
        .bind(code.total_sales.minor())
        .bind(body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn try_increment_promotional_usage(&self, code: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE promotional_codes SET usage_count = usage_count + 1
            WHERE UPPER(code) = UPPER($1)
              AND (usage_limit IS NULL OR usage_count < usage_limit)
            "#,
        )
        .bind(code.trim())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn decrement_promotional_usage(&self, code: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE promotional_codes SET usage_count = GREATEST(usage_count - 1, 0)
            WHERE UPPER(code) = UPPER($1)
            "#,
        )
        .bind(code.trim())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_referral_sale(&self, code: &str, sale: Money) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE referral_codes
            SET usage_count = usage_count + 1, total_sales = total_sales + $2
            WHERE UPPER(code) = UPPER($1)
            "#,
        )
        .bind(code.trim())
        .bind(sale.minor())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn reverse_referral_sale(&self, code: &str, sale: Money) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE referral_codes
            SET usage_count = GREATEST(usage_count - 1, 0),
                total_sales = GREATEST(total_sales - $2, 0)
            WHERE UPPER(code) = UPPER($1)
            "#,
        )
        .bind(code.trim())
        .bind(sale.minor())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
