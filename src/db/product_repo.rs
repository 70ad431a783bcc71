// src/db/product_repo.rs

use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{
    common::{db_utils::map_unique_violation, error::AppError},
    models::{
        analytics::{CategoryRollup, InventoryStats},
        category::ProductCategory,
        product::{Product, ProductStatus},
    },
};

const PRODUCT_COLUMNS: &str = r#"
    id, user_id, sku, product_name, description, category_details, unit, supplier, barcode,
    quantity_in_stock, total_stocked_quantity, sold_quantity, reorder_level,
    cost_price, selling_price, status, web_visibility, variants, created_at, updated_at
"#;

// Filtros da listagem (todos opcionais)
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub search: Option<String>,
    pub category: Option<ProductCategory>,
    pub status: Option<ProductStatus>,
}

impl ProductFilter {
    fn search_pattern(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")))
    }
}

// Mesmo WHERE para a página e para o total
const LIST_FILTER: &str = r#"
    WHERE user_id = $1
      AND ($2::product_category IS NULL OR category = $2)
      AND ($3::product_status IS NULL OR status = $3)
      AND ($4::text IS NULL
           OR product_name ILIKE $4
           OR sku ILIKE $4
           OR COALESCE(barcode, '') ILIKE $4)
"#;

#[derive(Clone, Default)]
pub struct ProductRepository;

impl ProductRepository {
    pub fn new() -> Self {
        Self
    }

    // ---
    // Escrita
    // ---

    pub async fn insert<'e, E>(&self, executor: E, product: &Product) -> Result<Product, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            INSERT INTO products (
                id, user_id, sku, product_name, description, category, category_details, unit,
                supplier, barcode, quantity_in_stock, total_stocked_quantity, sold_quantity,
                reorder_level, cost_price, selling_price, status, web_visibility, variants,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)
            RETURNING {PRODUCT_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Product>(&sql)
            .bind(product.id)
            .bind(product.user_id)
            .bind(&product.sku)
            .bind(&product.product_name)
            .bind(&product.description)
            .bind(product.category())
            .bind(sqlx::types::Json(&product.category_details))
            .bind(&product.unit)
            .bind(&product.supplier)
            .bind(&product.barcode)
            .bind(product.quantity_in_stock)
            .bind(product.total_stocked_quantity)
            .bind(product.sold_quantity)
            .bind(product.reorder_level)
            .bind(product.cost_price)
            .bind(product.selling_price)
            .bind(product.status)
            .bind(product.web_visibility)
            .bind(sqlx::types::Json(&product.variants))
            .bind(product.created_at)
            .bind(product.updated_at)
            .fetch_one(executor)
            .await
            .map_err(|e| map_unique_violation(e, || AppError::SkuAlreadyExists(product.sku.clone())))
    }

    /// Grava o estado atual do produto (o SKU e o dono não mudam).
    pub async fn save<'e, E>(&self, executor: E, product: &Product) -> Result<Product, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            UPDATE products SET
                product_name = $3, description = $4, category = $5, category_details = $6,
                unit = $7, supplier = $8, barcode = $9, quantity_in_stock = $10,
                total_stocked_quantity = $11, sold_quantity = $12, reorder_level = $13,
                cost_price = $14, selling_price = $15, status = $16, web_visibility = $17,
                variants = $18, updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING {PRODUCT_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Product>(&sql)
            .bind(product.id)
            .bind(product.user_id)
            .bind(&product.product_name)
            .bind(&product.description)
            .bind(product.category())
            .bind(sqlx::types::Json(&product.category_details))
            .bind(&product.unit)
            .bind(&product.supplier)
            .bind(&product.barcode)
            .bind(product.quantity_in_stock)
            .bind(product.total_stocked_quantity)
            .bind(product.sold_quantity)
            .bind(product.reorder_level)
            .bind(product.cost_price)
            .bind(product.selling_price)
            .bind(product.status)
            .bind(product.web_visibility)
            .bind(sqlx::types::Json(&product.variants))
            .fetch_optional(executor)
            .await?
            .ok_or(AppError::ProductNotFound)
    }

    // ---
    // Leitura
    // ---

    pub async fn find_by_id<'e, E>(
        &self,
        executor: E,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Product>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 AND user_id = $2");
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(executor)
            .await?;
        Ok(product)
    }

    /// Trava a linha até o fim da transação.
    pub async fn find_for_update<'e, E>(
        &self,
        executor: E,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Product, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 AND user_id = $2 FOR UPDATE"
        );
        sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(executor)
            .await?
            .ok_or(AppError::ProductNotFound)
    }

    pub async fn count_in_category<'e, E>(
        &self,
        executor: E,
        user_id: Uuid,
        category: ProductCategory,
    ) -> Result<i64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE user_id = $1 AND category = $2")
                .bind(user_id)
                .bind(category)
                .fetch_one(executor)
                .await?;
        Ok(count)
    }

    pub async fn skus_with_prefix<'e, E>(
        &self,
        executor: E,
        user_id: Uuid,
        prefix: &str,
    ) -> Result<Vec<String>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let skus = sqlx::query_scalar("SELECT sku FROM products WHERE user_id = $1 AND sku LIKE $2")
            .bind(user_id)
            .bind(format!("{prefix}-%"))
            .fetch_all(executor)
            .await?;
        Ok(skus)
    }

    pub async fn list<'e, E>(
        &self,
        executor: E,
        user_id: Uuid,
        filter: &ProductFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Product>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products {LIST_FILTER} ORDER BY created_at DESC, id LIMIT $5 OFFSET $6"
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(user_id)
            .bind(filter.category)
            .bind(filter.status)
            .bind(filter.search_pattern())
            .bind(limit)
            .bind(offset)
            .fetch_all(executor)
            .await?;
        Ok(products)
    }

    pub async fn count<'e, E>(
        &self,
        executor: E,
        user_id: Uuid,
        filter: &ProductFilter,
    ) -> Result<i64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!("SELECT COUNT(*) FROM products {LIST_FILTER}");
        let total: i64 = sqlx::query_scalar(&sql)
            .bind(user_id)
            .bind(filter.category)
            .bind(filter.status)
            .bind(filter.search_pattern())
            .fetch_one(executor)
            .await?;
        Ok(total)
    }

    // ---
    // Relatórios
    // ---

    pub async fn low_stock<'e, E>(&self, executor: E, user_id: Uuid) -> Result<Vec<Product>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            SELECT {PRODUCT_COLUMNS} FROM products
            WHERE user_id = $1 AND status <> 'Discontinued'
              AND quantity_in_stock <= reorder_level
            ORDER BY quantity_in_stock ASC, product_name ASC
            "#
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(user_id)
            .fetch_all(executor)
            .await?;
        Ok(products)
    }

    pub async fn out_of_stock<'e, E>(&self, executor: E, user_id: Uuid) -> Result<Vec<Product>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            SELECT {PRODUCT_COLUMNS} FROM products
            WHERE user_id = $1 AND status <> 'Discontinued' AND quantity_in_stock = 0
            ORDER BY product_name ASC
            "#
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(user_id)
            .fetch_all(executor)
            .await?;
        Ok(products)
    }

    pub async fn stats<'e, E>(&self, executor: E, user_id: Uuid) -> Result<InventoryStats, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let stats = sqlx::query_as::<_, InventoryStats>(
            r#"
            SELECT
                COUNT(*)                                                   AS total_products,
                COUNT(*) FILTER (WHERE status = 'Active')                  AS active_products,
                COALESCE(SUM(quantity_in_stock), 0)::BIGINT                AS total_units_in_stock,
                COALESCE(SUM(quantity_in_stock * cost_price), 0)           AS total_stock_value,
                COALESCE(SUM(quantity_in_stock * selling_price), 0)        AS total_selling_value,
                COALESCE(SUM(sold_quantity * selling_price), 0)            AS total_revenue,
                COALESCE(SUM(sold_quantity * (selling_price - cost_price)), 0) AS total_profit,
                COUNT(*) FILTER (WHERE quantity_in_stock <= reorder_level) AS low_stock_count,
                COUNT(*) FILTER (WHERE quantity_in_stock = 0)              AS out_of_stock_count
            FROM products
            WHERE user_id = $1 AND status <> 'Discontinued'
            "#,
        )
        .bind(user_id)
        .fetch_one(executor)
        .await?;
        Ok(stats)
    }

    pub async fn top_selling<'e, E>(
        &self,
        executor: E,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Product>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            SELECT {PRODUCT_COLUMNS} FROM products
            WHERE user_id = $1 AND sold_quantity > 0
            ORDER BY sold_quantity DESC, product_name ASC
            LIMIT $2
            "#
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(user_id)
            .bind(limit)
            .fetch_all(executor)
            .await?;
        Ok(products)
    }

    /// Produtos ativos, com estoque, que menos venderam.
    pub async fn slow_moving<'e, E>(
        &self,
        executor: E,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Product>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            SELECT {PRODUCT_COLUMNS} FROM products
            WHERE user_id = $1 AND status = 'Active' AND quantity_in_stock > 0
            ORDER BY sold_quantity ASC, created_at ASC
            LIMIT $2
            "#
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(user_id)
            .bind(limit)
            .fetch_all(executor)
            .await?;
        Ok(products)
    }

    pub async fn category_rollups<'e, E>(
        &self,
        executor: E,
        user_id: Uuid,
    ) -> Result<Vec<CategoryRollup>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let rollups = sqlx::query_as::<_, CategoryRollup>(
            r#"
            SELECT
                category,
                COUNT(*)                                         AS product_count,
                COALESCE(SUM(quantity_in_stock), 0)::BIGINT      AS units_in_stock,
                COALESCE(SUM(quantity_in_stock * cost_price), 0) AS stock_value,
                COALESCE(SUM(sold_quantity), 0)::BIGINT          AS units_sold
            FROM products
            WHERE user_id = $1 AND status <> 'Discontinued'
            GROUP BY category
            ORDER BY category
            "#,
        )
        .bind(user_id)
        .fetch_all(executor)
        .await?;
        Ok(rollups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_pattern_escapes_like_wildcards() {
        let filter = ProductFilter { search: Some(" 50%_off ".into()), ..Default::default() };
        assert_eq!(filter.search_pattern().as_deref(), Some("%50\\%\\_off%"));

        let blank = ProductFilter { search: Some("   ".into()), ..Default::default() };
        assert_eq!(blank.search_pattern(), None);
    }
}
