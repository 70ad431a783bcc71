// src/services/batch_service.rs

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use sqlx::{Acquire, PgConnection, Postgres};
use std::collections::HashSet;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{BatchRepository, ProductRepository},
    models::{
        analytics::{BatchSalesAnalytics, BatchStats, VariantStats},
        batch::{
            resolve_variants, Batch, BatchChange, BatchEvent, BatchStatus, BatchView, NewBatch,
            VariantResolution,
        },
        pagination::{PageParams, Paginated},
        product::Product,
    },
    services::codes::{self, MAX_CODE_ATTEMPTS},
};

pub const DEFAULT_EXPIRY_WINDOW_DAYS: i64 = 30;
pub const MAX_EXPIRY_WINDOW_DAYS: i64 = 3650;

/// Último dia da janela de vencimento que começa em `today`.
pub fn expiry_window_end(today: NaiveDate, days: i64) -> Result<NaiveDate, AppError> {
    let out_of_range = || {
        AppError::field(
            "days",
            "range",
            "A janela deve ficar entre 0 e 3650 dias.",
        )
    };
    if !(0..=MAX_EXPIRY_WINDOW_DAYS).contains(&days) {
        return Err(out_of_range());
    }
    Duration::try_days(days)
        .and_then(|window| today.checked_add_signed(window))
        .ok_or_else(out_of_range)
}

// Resposta da criação: o lote e como cada variante foi vinculada ao produto
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchCreated {
    pub batch: BatchView,
    pub variant_resolutions: Vec<VariantResolution>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VariantAvailability {
    pub size: String,
    pub color: String,
    pub requested: i32,
    pub quantity_remaining: i32,
    pub available: bool,
}

#[derive(Clone, Default)]
pub struct BatchService {
    batch_repo: BatchRepository,
    product_repo: ProductRepository,
}

impl BatchService {
    pub fn new(batch_repo: BatchRepository, product_repo: ProductRepository) -> Self {
        Self { batch_repo, product_repo }
    }

    // ---
    // Código do lote
    // ---

    async fn next_batch_code(
        &self,
        conn: &mut PgConnection,
        user_id: Uuid,
        product_id: Uuid,
        product_sku: Option<&str>,
        today: NaiveDate,
    ) -> Result<String, AppError> {
        let prefix = codes::batch_prefix(product_sku);
        if prefix == codes::FALLBACK_BATCH_PREFIX {
            tracing::warn!(
                %product_id,
                "SKU do produto sem prefixo utilizável, usando {}",
                codes::FALLBACK_BATCH_PREFIX
            );
        }

        let batch_count = self.batch_repo.count_for_product(&mut *conn, user_id, product_id).await?;
        let taken: HashSet<String> = self
            .batch_repo
            .codes_with_prefix(&mut *conn, user_id, &prefix)
            .await?
            .into_iter()
            .collect();

        // O rng não pode atravessar um .await
        let candidates = {
            let mut rng = rand::thread_rng();
            codes::batch_code_candidates(&mut rng, &prefix, today, batch_count)
        };

        Ok(codes::pick_available(candidates, &taken).unwrap_or_else(|| {
            let code = codes::fallback_code(&prefix, Utc::now());
            tracing::warn!(%product_id, "Códigos de lote esgotados, usando {}", code);
            code
        }))
    }

    // Insere o lote; se o código colidir, gera outro (savepoint por tentativa)
    async fn insert_with_fresh_code(
        &self,
        conn: &mut PgConnection,
        batch: &mut Batch,
        product_sku: Option<&str>,
    ) -> Result<Batch, AppError> {
        let mut attempt = 0;
        loop {
            let mut savepoint = sqlx::Connection::begin(&mut *conn).await?;
            match self.batch_repo.insert(&mut *savepoint, batch).await {
                Ok(saved) => {
                    savepoint.commit().await?;
                    return Ok(saved);
                }
                Err(AppError::BatchCodeAlreadyExists(code)) if attempt + 1 < MAX_CODE_ATTEMPTS => {
                    savepoint.rollback().await?;
                    attempt += 1;
                    tracing::warn!("Código de lote '{}' em uso, tentativa {}", code, attempt + 1);
                    batch.batch_code = self
                        .next_batch_code(
                            conn,
                            batch.user_id,
                            batch.product_id,
                            product_sku,
                            batch.date_received.date_naive(),
                        )
                        .await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn record_event(
        &self,
        conn: &mut PgConnection,
        batch: &Batch,
        change: &BatchChange,
        actor_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let event = BatchEvent::record(batch, change, actor_id, now);
        self.batch_repo.insert_event(conn, &event).await
    }

    // ---
    // Criação
    // ---

    /// Cria um novo lote e soma a entrada no produto, na mesma transação.
    pub async fn create_batch<'e, A>(
        &self,
        executor: A,
        user_id: Uuid,
        input: NewBatch,
    ) -> Result<BatchCreated, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;
        let now = Utc::now();

        let mut product = self
            .product_repo
            .find_for_update(&mut *tx, user_id, input.product_id)
            .await?;

        let code = self
            .next_batch_code(
                &mut *tx,
                user_id,
                product.id,
                Some(&product.sku),
                input.date_received.unwrap_or(now).date_naive(),
            )
            .await?;

        let mut batch = Batch::from_new(user_id, input, code, now)?;

        let resolutions = resolve_variants(&product, &mut batch);
        for unresolved in resolutions.iter().filter(|r| r.resolved.is_none()) {
            tracing::warn!(
                product_id = %product.id,
                "Variante {}/{} do lote não existe no produto",
                unresolved.size,
                unresolved.color
            );
        }

        let batch = self.insert_with_fresh_code(&mut *tx, &mut batch, Some(&product.sku)).await?;

        let receipt = batch.receipt();
        receipt.apply_to(&mut product)?;
        self.product_repo.save(&mut *tx, &product).await?;
        self.record_event(&mut *tx, &batch, &receipt, user_id, now).await?;

        tx.commit().await?;

        tracing::info!(
            batch_id = %batch.id,
            product_id = %product.id,
            "✅ Lote {} criado com {} unidades",
            batch.batch_code,
            batch.quantity_in
        );

        Ok(BatchCreated {
            batch: BatchView::new(batch, now.date_naive()),
            variant_resolutions: resolutions,
        })
    }

    /// Lote de abertura de um produto recém-criado. O produto já conta esse estoque.
    pub(crate) async fn open_batch_for(
        &self,
        conn: &mut PgConnection,
        product: &Product,
        expiry_date: Option<NaiveDate>,
    ) -> Result<Batch, AppError> {
        let now = product.created_at;
        let code = self
            .next_batch_code(conn, product.user_id, product.id, Some(&product.sku), now.date_naive())
            .await?;

        let mut batch = Batch::opening(product, code, expiry_date)?;
        let batch = self.insert_with_fresh_code(conn, &mut batch, Some(&product.sku)).await?;
        self.record_event(conn, &batch, &batch.receipt(), product.user_id, now).await?;

        tracing::debug!(batch_id = %batch.id, product_id = %product.id, "Lote de abertura criado");
        Ok(batch)
    }

    // ---
    // Movimentações (lote e produto travados até o commit)
    // ---

    async fn apply<'e, A, F>(
        &self,
        executor: A,
        user_id: Uuid,
        batch_id: Uuid,
        op: F,
    ) -> Result<BatchView, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
        F: FnOnce(&mut Batch, DateTime<Utc>) -> Result<BatchChange, AppError>,
    {
        let mut tx = executor.begin().await?;
        let now = Utc::now();

        let mut batch = self.batch_repo.find_for_update(&mut *tx, user_id, batch_id).await?;
        let mut product = self
            .product_repo
            .find_for_update(&mut *tx, user_id, batch.product_id)
            .await?;

        let change = op(&mut batch, now)?;
        change.apply_to(&mut product)?;

        let batch = self.batch_repo.save(&mut *tx, &batch).await?;
        self.product_repo.save(&mut *tx, &product).await?;
        self.record_event(&mut *tx, &batch, &change, user_id, now).await?;

        tx.commit().await?;

        tracing::debug!(
            %batch_id,
            product_id = %product.id,
            kind = ?change.kind,
            delta = change.quantity_delta,
            "Movimentação de lote aplicada"
        );

        Ok(BatchView::new(batch, now.date_naive()))
    }

    pub async fn sell_from_batch<'e, A>(
        &self,
        executor: A,
        user_id: Uuid,
        batch_id: Uuid,
        quantity: i32,
        size: Option<String>,
        color: Option<String>,
    ) -> Result<BatchView, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        self.apply(executor, user_id, batch_id, |batch, now| {
            batch.sell(quantity, size.as_deref(), color.as_deref(), now)
        })
        .await
    }

    pub async fn remove_from_batch<'e, A>(
        &self,
        executor: A,
        user_id: Uuid,
        batch_id: Uuid,
        quantity: i32,
        reason: Option<String>,
        size: Option<String>,
        color: Option<String>,
    ) -> Result<BatchView, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        self.apply(executor, user_id, batch_id, |batch, now| {
            batch.remove(quantity, reason, size.as_deref(), color.as_deref(), now)
        })
        .await
    }

    pub async fn add_to_batch<'e, A>(
        &self,
        executor: A,
        user_id: Uuid,
        batch_id: Uuid,
        quantity: i32,
        reason: Option<String>,
        size: Option<String>,
        color: Option<String>,
    ) -> Result<BatchView, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        self.apply(executor, user_id, batch_id, |batch, now| {
            batch.add(quantity, reason, size.as_deref(), color.as_deref(), now)
        })
        .await
    }

    pub async fn adjust_quantity<'e, A>(
        &self,
        executor: A,
        user_id: Uuid,
        batch_id: Uuid,
        new_quantity_in: i32,
        reason: Option<String>,
        size: Option<String>,
        color: Option<String>,
    ) -> Result<BatchView, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        self.apply(executor, user_id, batch_id, |batch, now| {
            batch.adjust_quantity(new_quantity_in, reason, size.as_deref(), color.as_deref(), now)
        })
        .await
    }

    /// Arquivar, marcar como avariado ou reativar. Arquivar tira o saldo do lote
    /// do estoque do produto; desarquivar devolve.
    pub async fn set_status<'e, A>(
        &self,
        executor: A,
        user_id: Uuid,
        batch_id: Uuid,
        status: BatchStatus,
        reason: Option<String>,
    ) -> Result<BatchView, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let view = self
            .apply(executor, user_id, batch_id, |batch, now| {
                Ok(batch.set_status(status, reason, now))
            })
            .await?;

        tracing::info!(
            %batch_id,
            "Status do lote {} -> {}",
            view.batch.batch_code,
            view.batch.status.as_str()
        );
        Ok(view)
    }

    // ---
    // Consultas
    // ---

    pub async fn get_batch<'e, A>(
        &self,
        executor: A,
        user_id: Uuid,
        batch_id: Uuid,
    ) -> Result<BatchView, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut conn = executor.acquire().await?;
        let batch = self
            .batch_repo
            .find_by_id(&mut *conn, user_id, batch_id)
            .await?
            .ok_or(AppError::BatchNotFound)?;
        Ok(BatchView::new(batch, Utc::now().date_naive()))
    }

    pub async fn list_for_product<'e, A>(
        &self,
        executor: A,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<Vec<BatchView>, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut conn = executor.acquire().await?;
        if self.product_repo.find_by_id(&mut *conn, user_id, product_id).await?.is_none() {
            return Err(AppError::ProductNotFound);
        }

        let today = Utc::now().date_naive();
        let batches = self.batch_repo.list_for_product(&mut *conn, user_id, product_id).await?;
        Ok(batches.into_iter().map(|b| BatchView::new(b, today)).collect())
    }

    pub async fn list_for_user<'e, A>(
        &self,
        executor: A,
        user_id: Uuid,
        status: Option<BatchStatus>,
        page: &PageParams,
    ) -> Result<Paginated<BatchView>, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut conn = executor.acquire().await?;
        let batches = self
            .batch_repo
            .list_for_user(&mut *conn, user_id, status, page.limit(), page.offset())
            .await?;
        let total = self.batch_repo.count_for_user(&mut *conn, user_id, status).await?;

        let today = Utc::now().date_naive();
        Ok(Paginated::new(batches, total, page).map(|b| BatchView::new(b, today)))
    }

    pub async fn active_fifo<'e, A>(
        &self,
        executor: A,
        user_id: Uuid,
        product_id: Option<Uuid>,
    ) -> Result<Vec<BatchView>, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut conn = executor.acquire().await?;
        let today = Utc::now().date_naive();
        let batches = self.batch_repo.active_fifo(&mut *conn, user_id, product_id).await?;
        Ok(batches.into_iter().map(|b| BatchView::new(b, today)).collect())
    }

    pub async fn expiring_within<'e, A>(
        &self,
        executor: A,
        user_id: Uuid,
        days: i64,
    ) -> Result<Vec<BatchView>, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let today = Utc::now().date_naive();
        let until = expiry_window_end(today, days)?;

        let mut conn = executor.acquire().await?;
        let batches = self.batch_repo.expiring_within(&mut *conn, user_id, today, until).await?;
        Ok(batches.into_iter().map(|b| BatchView::new(b, today)).collect())
    }

    pub async fn batch_stats<'e, A>(
        &self,
        executor: A,
        user_id: Uuid,
        product_id: Option<Uuid>,
    ) -> Result<BatchStats, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut conn = executor.acquire().await?;
        self.batch_repo.stats(&mut *conn, user_id, product_id).await
    }

    pub async fn variant_stats<'e, A>(
        &self,
        executor: A,
        user_id: Uuid,
        product_id: Option<Uuid>,
    ) -> Result<Vec<VariantStats>, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut conn = executor.acquire().await?;
        self.batch_repo.variant_stats(&mut *conn, user_id, product_id).await
    }

    pub async fn events<'e, A>(
        &self,
        executor: A,
        user_id: Uuid,
        batch_id: Uuid,
    ) -> Result<Vec<BatchEvent>, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut conn = executor.acquire().await?;
        if self.batch_repo.find_by_id(&mut *conn, user_id, batch_id).await?.is_none() {
            return Err(AppError::BatchNotFound);
        }
        self.batch_repo.events(&mut *conn, user_id, batch_id).await
    }

    pub async fn sales_analytics<'e, A>(
        &self,
        executor: A,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<Vec<BatchSalesAnalytics>, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut conn = executor.acquire().await?;
        if self.product_repo.find_by_id(&mut *conn, user_id, product_id).await?.is_none() {
            return Err(AppError::ProductNotFound);
        }
        self.batch_repo.sales_analytics(&mut *conn, user_id, product_id).await
    }

    pub async fn variant_availability<'e, A>(
        &self,
        executor: A,
        user_id: Uuid,
        batch_id: Uuid,
        size: String,
        color: String,
        quantity: i32,
    ) -> Result<VariantAvailability, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        if quantity <= 0 {
            return Err(AppError::field("quantity", "range", "A quantidade deve ser maior que zero."));
        }

        let mut conn = executor.acquire().await?;
        let batch = self
            .batch_repo
            .find_by_id(&mut *conn, user_id, batch_id)
            .await?
            .ok_or(AppError::BatchNotFound)?;

        let variant = batch.get_variant(&size, &color).ok_or_else(|| AppError::VariantNotFound {
            size: size.clone(),
            color: color.clone(),
        })?;

        Ok(VariantAvailability {
            requested: quantity,
            quantity_remaining: variant.quantity_remaining,
            available: batch.is_variant_available(&size, &color, quantity),
            size: variant.size.clone(),
            color: variant.color.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_window_is_bounded() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();

        assert_eq!(expiry_window_end(today, 0).unwrap(), today);
        assert_eq!(
            expiry_window_end(today, 30).unwrap(),
            NaiveDate::from_ymd_opt(2025, 4, 9).unwrap()
        );
        assert!(expiry_window_end(today, MAX_EXPIRY_WINDOW_DAYS).is_ok());

        for days in [-1, MAX_EXPIRY_WINDOW_DAYS + 1, 1_000_000_000, i64::MAX] {
            let err = expiry_window_end(today, days).unwrap_err();
            assert!(matches!(err, AppError::ValidationError(_)), "days = {days}");
        }
    }
}
