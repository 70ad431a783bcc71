// src/services/inventory_service.rs

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{Acquire, PgConnection, Postgres};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{product_repo::ProductFilter, BatchRepository, ProductRepository},
    models::{
        analytics::{CategoryRollup, ConsistencyReport, InventoryStats},
        category::ProductCategory,
        pagination::{PageParams, Paginated},
        product::{NewProduct, Product, ProductUpdate, ProductView, StockUpdateMode},
    },
    services::{
        batch_service::BatchService,
        codes::{self, MAX_CODE_ATTEMPTS},
    },
};

pub const DEFAULT_RANKING_LIMIT: i64 = 10;

#[derive(Clone)]
pub struct InventoryService {
    product_repo: ProductRepository,
    batch_repo: BatchRepository,
    batch_service: BatchService,
}

impl InventoryService {
    pub fn new(
        product_repo: ProductRepository,
        batch_repo: BatchRepository,
        batch_service: BatchService,
    ) -> Self {
        Self { product_repo, batch_repo, batch_service }
    }

    // ---
    // Helpers
    // ---

    async fn next_sku(
        &self,
        conn: &mut PgConnection,
        user_id: Uuid,
        category: ProductCategory,
    ) -> Result<String, AppError> {
        let prefix = category.sku_prefix();
        let count = self.product_repo.count_in_category(&mut *conn, user_id, category).await?;
        let taken: HashSet<String> = self
            .product_repo
            .skus_with_prefix(&mut *conn, user_id, &prefix)
            .await?
            .into_iter()
            .collect();

        Ok(codes::pick_available(codes::sku_candidates(category, count), &taken).unwrap_or_else(
            || {
                let sku = codes::fallback_code(&prefix, Utc::now());
                tracing::warn!("Sequência de SKU esgotada para {}, usando {}", category, sku);
                sku
            },
        ))
    }

    /// Monta as views com o preço do lote ativo (uma consulta para todos).
    async fn views(
        &self,
        conn: &mut PgConnection,
        user_id: Uuid,
        products: Vec<Product>,
    ) -> Result<Vec<ProductView>, AppError> {
        if products.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
        let pricing: HashMap<Uuid, _> = self
            .batch_repo
            .active_pricing_for_products(conn, user_id, &ids)
            .await?
            .into_iter()
            .map(|p| (p.product_id, p))
            .collect();

        Ok(products
            .into_iter()
            .map(|product| {
                let active = pricing.get(&product.id);
                ProductView::new(product, active)
            })
            .collect())
    }

    async fn view(
        &self,
        conn: &mut PgConnection,
        user_id: Uuid,
        product: Product,
    ) -> Result<ProductView, AppError> {
        self.views(conn, user_id, vec![product])
            .await?
            .pop()
            .ok_or_else(|| AppError::InternalServerError(anyhow::anyhow!("view do produto vazia")))
    }

    // Carrega com FOR UPDATE, aplica a operação pura e grava
    async fn mutate<'e, A, F>(
        &self,
        executor: A,
        user_id: Uuid,
        product_id: Uuid,
        op: F,
    ) -> Result<ProductView, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
        F: FnOnce(&mut Product) -> Result<(), AppError>,
    {
        let mut tx = executor.begin().await?;

        let mut product = self.product_repo.find_for_update(&mut *tx, user_id, product_id).await?;
        op(&mut product)?;
        let product = self.product_repo.save(&mut *tx, &product).await?;
        let view = self.view(&mut *tx, user_id, product).await?;

        tx.commit().await?;
        Ok(view)
    }

    // ---
    // Cadastro
    // ---

    /// Cria o produto; se vier com estoque (ou vendas anteriores), abre o primeiro lote junto.
    pub async fn create_product<'e, A>(
        &self,
        executor: A,
        user_id: Uuid,
        input: NewProduct,
    ) -> Result<ProductView, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;
        let now = Utc::now();

        let explicit_sku = input
            .sku
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_uppercase);

        let mut attempt = 0;
        let product = loop {
            let sku = match &explicit_sku {
                Some(sku) => sku.clone(),
                None => self.next_sku(&mut *tx, user_id, input.category).await?,
            };
            let product = Product::from_new(user_id, input.clone(), sku, now)?;

            // Savepoint: a violação de unicidade não pode abortar a transação
            let mut savepoint = sqlx::Connection::begin(&mut *tx).await?;
            match self.product_repo.insert(&mut *savepoint, &product).await {
                Ok(saved) => {
                    savepoint.commit().await?;
                    break saved;
                }
                Err(AppError::SkuAlreadyExists(sku))
                    if explicit_sku.is_none() && attempt + 1 < MAX_CODE_ATTEMPTS =>
                {
                    savepoint.rollback().await?;
                    attempt += 1;
                    tracing::warn!("SKU '{}' gerado já existe, tentativa {}", sku, attempt + 1);
                }
                Err(e) => return Err(e),
            }
        };

        if product.quantity_in_stock > 0 || product.sold_quantity > 0 {
            self.batch_service
                .open_batch_for(&mut *tx, &product, input.expiry_date)
                .await?;
        }

        let view = self.view(&mut *tx, user_id, product).await?;
        tx.commit().await?;

        tracing::info!(product_id = %view.product.id, "✅ Produto {} criado", view.product.sku);
        Ok(view)
    }

    pub async fn update_product<'e, A>(
        &self,
        executor: A,
        user_id: Uuid,
        product_id: Uuid,
        update: ProductUpdate,
    ) -> Result<ProductView, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        self.mutate(executor, user_id, product_id, |product| product.apply_update(update))
            .await
    }

    /// Remoção lógica (status Discontinued).
    pub async fn discontinue<'e, A>(
        &self,
        executor: A,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<ProductView, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let view = self
            .mutate(executor, user_id, product_id, |product| {
                product.discontinue();
                Ok(())
            })
            .await?;
        tracing::info!(%product_id, "Produto descontinuado");
        Ok(view)
    }

    // ---
    // Estoque e preços (fora dos lotes)
    // ---

    pub async fn update_stock<'e, A>(
        &self,
        executor: A,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        mode: StockUpdateMode,
    ) -> Result<ProductView, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        tracing::debug!(%product_id, quantity, ?mode, "Atualizando estoque");
        self.mutate(executor, user_id, product_id, |product| product.update_stock(quantity, mode))
            .await
    }

    pub async fn record_sale<'e, A>(
        &self,
        executor: A,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<ProductView, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        tracing::debug!(%product_id, quantity, "Registrando venda");
        self.mutate(executor, user_id, product_id, |product| product.record_sale(quantity))
            .await
    }

    pub async fn add_initial_stock<'e, A>(
        &self,
        executor: A,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<ProductView, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        tracing::debug!(%product_id, quantity, "Entrada de estoque");
        self.mutate(executor, user_id, product_id, |product| product.add_initial_stock(quantity))
            .await
    }

    pub async fn adjust_prices<'e, A>(
        &self,
        executor: A,
        user_id: Uuid,
        product_id: Uuid,
        cost_price: Option<Decimal>,
        selling_price: Option<Decimal>,
    ) -> Result<ProductView, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        self.mutate(executor, user_id, product_id, |product| {
            product.adjust_prices(cost_price, selling_price)
        })
        .await
    }

    // ---
    // Consultas
    // ---

    pub async fn get_product<'e, A>(
        &self,
        executor: A,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<ProductView, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut conn = executor.acquire().await?;
        let product = self
            .product_repo
            .find_by_id(&mut *conn, user_id, product_id)
            .await?
            .ok_or(AppError::ProductNotFound)?;
        self.view(&mut *conn, user_id, product).await
    }

    pub async fn list_products<'e, A>(
        &self,
        executor: A,
        user_id: Uuid,
        filter: &ProductFilter,
        page: &PageParams,
    ) -> Result<Paginated<ProductView>, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut conn = executor.acquire().await?;
        let products = self
            .product_repo
            .list(&mut *conn, user_id, filter, page.limit(), page.offset())
            .await?;
        let total = self.product_repo.count(&mut *conn, user_id, filter).await?;
        let items = self.views(&mut *conn, user_id, products).await?;

        Ok(Paginated::new(items, total, page))
    }

    pub async fn low_stock<'e, A>(&self, executor: A, user_id: Uuid) -> Result<Vec<ProductView>, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut conn = executor.acquire().await?;
        let products = self.product_repo.low_stock(&mut *conn, user_id).await?;
        self.views(&mut *conn, user_id, products).await
    }

    pub async fn out_of_stock<'e, A>(
        &self,
        executor: A,
        user_id: Uuid,
    ) -> Result<Vec<ProductView>, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut conn = executor.acquire().await?;
        let products = self.product_repo.out_of_stock(&mut *conn, user_id).await?;
        self.views(&mut *conn, user_id, products).await
    }

    pub async fn stats<'e, A>(&self, executor: A, user_id: Uuid) -> Result<InventoryStats, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut conn = executor.acquire().await?;
        self.product_repo.stats(&mut *conn, user_id).await
    }

    pub async fn top_selling<'e, A>(
        &self,
        executor: A,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ProductView>, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut conn = executor.acquire().await?;
        let products = self.product_repo.top_selling(&mut *conn, user_id, limit.clamp(1, 100)).await?;
        self.views(&mut *conn, user_id, products).await
    }

    pub async fn slow_moving<'e, A>(
        &self,
        executor: A,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ProductView>, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut conn = executor.acquire().await?;
        let products = self.product_repo.slow_moving(&mut *conn, user_id, limit.clamp(1, 100)).await?;
        self.views(&mut *conn, user_id, products).await
    }

    pub async fn category_rollups<'e, A>(
        &self,
        executor: A,
        user_id: Uuid,
    ) -> Result<Vec<CategoryRollup>, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut conn = executor.acquire().await?;
        self.product_repo.category_rollups(&mut *conn, user_id).await
    }

    /// Compara os contadores do produto com a soma dos lotes. Não corrige nada.
    pub async fn consistency_report<'e, A>(
        &self,
        executor: A,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<ConsistencyReport, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut conn = executor.acquire().await?;
        let product = self
            .product_repo
            .find_by_id(&mut *conn, user_id, product_id)
            .await?
            .ok_or(AppError::ProductNotFound)?;
        let totals = self.batch_repo.totals_for_product(&mut *conn, user_id, product_id).await?;

        let report = ConsistencyReport::compare(&product, totals);
        if !report.is_consistent {
            tracing::warn!(
                %product_id,
                stock_delta = report.stock_delta,
                sold_delta = report.sold_delta,
                "Produto divergente da soma dos lotes"
            );
        }
        Ok(report)
    }
}
