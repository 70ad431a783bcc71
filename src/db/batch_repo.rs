// src/db/batch_repo.rs

use chrono::NaiveDate;
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{
    common::{db_utils::map_unique_violation, error::AppError},
    models::{
        analytics::{BatchSalesAnalytics, BatchStats, BatchTotals, VariantStats},
        batch::{Batch, BatchEvent, BatchStatus},
        product::ActiveBatchPricing,
    },
};

const BATCH_COLUMNS: &str = r#"
    id, user_id, product_id, batch_code, quantity_in, quantity_sold, quantity_remaining,
    cost_price, selling_price, date_received, expiry_date, supplier, has_variants, variants,
    status, notes, created_at, updated_at
"#;

// Lote que ainda pode ser vendido (FIFO e preço vigente)
const SELLABLE_BATCH: &str = r#"
    status = 'active' AND quantity_remaining > 0
    AND (expiry_date IS NULL OR expiry_date >= CURRENT_DATE)
"#;

fn active_fifo_sql() -> String {
    format!(
        r#"
        SELECT {BATCH_COLUMNS} FROM batches
        WHERE user_id = $1 AND {SELLABLE_BATCH}
          AND ($2::uuid IS NULL OR product_id = $2)
        ORDER BY date_received ASC, created_at ASC
        "#
    )
}

fn active_pricing_sql() -> String {
    format!(
        r#"
        SELECT DISTINCT ON (product_id)
            product_id, id AS batch_id, batch_code, cost_price, selling_price
        FROM batches
        WHERE user_id = $1 AND product_id = ANY($2) AND {SELLABLE_BATCH}
        ORDER BY product_id, date_received ASC, created_at ASC
        "#
    )
}

#[derive(Clone, Default)]
pub struct BatchRepository;

impl BatchRepository {
    pub fn new() -> Self {
        Self
    }

    // ---
    // Escrita
    // ---

    pub async fn insert<'e, E>(&self, executor: E, batch: &Batch) -> Result<Batch, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            INSERT INTO batches (
                id, user_id, product_id, batch_code, quantity_in, quantity_sold, quantity_remaining,
                cost_price, selling_price, date_received, expiry_date, supplier, has_variants,
                variants, status, notes, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            RETURNING {BATCH_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Batch>(&sql)
            .bind(batch.id)
            .bind(batch.user_id)
            .bind(batch.product_id)
            .bind(&batch.batch_code)
            .bind(batch.quantity_in)
            .bind(batch.quantity_sold)
            .bind(batch.quantity_remaining)
            .bind(batch.cost_price)
            .bind(batch.selling_price)
            .bind(batch.date_received)
            .bind(batch.expiry_date)
            .bind(&batch.supplier)
            .bind(batch.has_variants)
            .bind(sqlx::types::Json(&batch.variants))
            .bind(batch.status)
            .bind(&batch.notes)
            .bind(batch.created_at)
            .bind(batch.updated_at)
            .fetch_one(executor)
            .await
            .map_err(|e| {
                map_unique_violation(e, || AppError::BatchCodeAlreadyExists(batch.batch_code.clone()))
            })
    }

    pub async fn save<'e, E>(&self, executor: E, batch: &Batch) -> Result<Batch, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            UPDATE batches SET
                quantity_in = $3, quantity_sold = $4, quantity_remaining = $5,
                cost_price = $6, selling_price = $7, expiry_date = $8, supplier = $9,
                variants = $10, status = $11, notes = $12, updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING {BATCH_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Batch>(&sql)
            .bind(batch.id)
            .bind(batch.user_id)
            .bind(batch.quantity_in)
            .bind(batch.quantity_sold)
            .bind(batch.quantity_remaining)
            .bind(batch.cost_price)
            .bind(batch.selling_price)
            .bind(batch.expiry_date)
            .bind(&batch.supplier)
            .bind(sqlx::types::Json(&batch.variants))
            .bind(batch.status)
            .bind(&batch.notes)
            .fetch_optional(executor)
            .await?
            .ok_or(AppError::BatchNotFound)
    }

    pub async fn insert_event<'e, E>(&self, executor: E, event: &BatchEvent) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            INSERT INTO batch_events (
                id, user_id, batch_id, product_id, kind, quantity_delta, size, color,
                unit_cost, unit_price, reason, actor_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(event.id)
        .bind(event.user_id)
        .bind(event.batch_id)
        .bind(event.product_id)
        .bind(event.kind)
        .bind(event.quantity_delta)
        .bind(&event.size)
        .bind(&event.color)
        .bind(event.unit_cost)
        .bind(event.unit_price)
        .bind(&event.reason)
        .bind(event.actor_id)
        .bind(event.created_at)
        .execute(executor)
        .await?;
        Ok(())
    }

    // ---
    // Leitura
    // ---

    pub async fn find_by_id<'e, E>(
        &self,
        executor: E,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Batch>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!("SELECT {BATCH_COLUMNS} FROM batches WHERE id = $1 AND user_id = $2");
        let batch = sqlx::query_as::<_, Batch>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(executor)
            .await?;
        Ok(batch)
    }

    pub async fn find_for_update<'e, E>(
        &self,
        executor: E,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Batch, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "SELECT {BATCH_COLUMNS} FROM batches WHERE id = $1 AND user_id = $2 FOR UPDATE"
        );
        sqlx::query_as::<_, Batch>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(executor)
            .await?
            .ok_or(AppError::BatchNotFound)
    }

    pub async fn count_for_product<'e, E>(
        &self,
        executor: E,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<i64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM batches WHERE user_id = $1 AND product_id = $2")
                .bind(user_id)
                .bind(product_id)
                .fetch_one(executor)
                .await?;
        Ok(count)
    }

    pub async fn codes_with_prefix<'e, E>(
        &self,
        executor: E,
        user_id: Uuid,
        prefix: &str,
    ) -> Result<Vec<String>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let codes = sqlx::query_scalar(
            "SELECT batch_code FROM batches WHERE user_id = $1 AND batch_code LIKE $2",
        )
        .bind(user_id)
        .bind(format!("{prefix}-%"))
        .fetch_all(executor)
        .await?;
        Ok(codes)
    }

    pub async fn list_for_product<'e, E>(
        &self,
        executor: E,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<Vec<Batch>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            SELECT {BATCH_COLUMNS} FROM batches
            WHERE user_id = $1 AND product_id = $2
            ORDER BY date_received DESC, created_at DESC
            "#
        );
        let batches = sqlx::query_as::<_, Batch>(&sql)
            .bind(user_id)
            .bind(product_id)
            .fetch_all(executor)
            .await?;
        Ok(batches)
    }

    pub async fn list_for_user<'e, E>(
        &self,
        executor: E,
        user_id: Uuid,
        status: Option<BatchStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Batch>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            SELECT {BATCH_COLUMNS} FROM batches
            WHERE user_id = $1 AND ($2::batch_status IS NULL OR status = $2)
            ORDER BY date_received DESC, id
            LIMIT $3 OFFSET $4
            "#
        );
        let batches = sqlx::query_as::<_, Batch>(&sql)
            .bind(user_id)
            .bind(status)
            .bind(limit)
            .bind(offset)
            .fetch_all(executor)
            .await?;
        Ok(batches)
    }

    pub async fn count_for_user<'e, E>(
        &self,
        executor: E,
        user_id: Uuid,
        status: Option<BatchStatus>,
    ) -> Result<i64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM batches WHERE user_id = $1 AND ($2::batch_status IS NULL OR status = $2)",
        )
        .bind(user_id)
        .bind(status)
        .fetch_one(executor)
        .await?;
        Ok(total)
    }

    /// Lotes ativos com saldo e dentro da validade, do mais antigo para o mais novo (FIFO).
    /// O status só é recalculado no save, então o vencimento é checado aqui também.
    pub async fn active_fifo<'e, E>(
        &self,
        executor: E,
        user_id: Uuid,
        product_id: Option<Uuid>,
    ) -> Result<Vec<Batch>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = active_fifo_sql();
        let batches = sqlx::query_as::<_, Batch>(&sql)
            .bind(user_id)
            .bind(product_id)
            .fetch_all(executor)
            .await?;
        Ok(batches)
    }

    /// Lotes com saldo que vencem entre hoje e `until`.
    pub async fn expiring_within<'e, E>(
        &self,
        executor: E,
        user_id: Uuid,
        today: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<Batch>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            SELECT {BATCH_COLUMNS} FROM batches
            WHERE user_id = $1 AND quantity_remaining > 0
              AND status NOT IN ('damaged', 'archived')
              AND expiry_date BETWEEN $2 AND $3
            ORDER BY expiry_date ASC, date_received ASC
            "#
        );
        let batches = sqlx::query_as::<_, Batch>(&sql)
            .bind(user_id)
            .bind(today)
            .bind(until)
            .fetch_all(executor)
            .await?;
        Ok(batches)
    }

    /// Primeiro lote ativo (FIFO) de cada produto informado.
    pub async fn active_pricing_for_products<'e, E>(
        &self,
        executor: E,
        user_id: Uuid,
        product_ids: &[Uuid],
    ) -> Result<Vec<ActiveBatchPricing>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = active_pricing_sql();
        let pricing = sqlx::query_as::<_, ActiveBatchPricing>(&sql)
            .bind(user_id)
            .bind(product_ids)
            .fetch_all(executor)
            .await?;
        Ok(pricing)
    }

    pub async fn stats<'e, E>(
        &self,
        executor: E,
        user_id: Uuid,
        product_id: Option<Uuid>,
    ) -> Result<BatchStats, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let stats = sqlx::query_as::<_, BatchStats>(
            r#"
            SELECT
                COUNT(*)                                        AS total_batches,
                COUNT(*) FILTER (WHERE status = 'active')       AS active_batches,
                COUNT(*) FILTER (WHERE status = 'depleted')     AS depleted_batches,
                COUNT(*) FILTER (WHERE status = 'expired')      AS expired_batches,
                COUNT(*) FILTER (WHERE status = 'damaged')      AS damaged_batches,
                COUNT(*) FILTER (WHERE status = 'archived')     AS archived_batches,
                COALESCE(SUM(quantity_in), 0)::BIGINT           AS total_quantity_in,
                COALESCE(SUM(quantity_sold), 0)::BIGINT         AS total_quantity_sold,
                COALESCE(SUM(quantity_remaining), 0)::BIGINT    AS total_quantity_remaining,
                COALESCE(SUM(quantity_remaining * cost_price), 0) AS total_value
            FROM batches
            WHERE user_id = $1 AND ($2::uuid IS NULL OR product_id = $2)
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .fetch_one(executor)
        .await?;
        Ok(stats)
    }

    /// Agregado por tamanho/cor sobre o JSONB das variantes.
    pub async fn variant_stats<'e, E>(
        &self,
        executor: E,
        user_id: Uuid,
        product_id: Option<Uuid>,
    ) -> Result<Vec<VariantStats>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let stats = sqlx::query_as::<_, VariantStats>(
            r#"
            SELECT
                COALESCE(v->>'size', '')                                   AS size,
                COALESCE(v->>'color', '')                                  AS color,
                COUNT(DISTINCT b.id)                                       AS batch_count,
                COALESCE(SUM((v->>'quantityIn')::INT), 0)::BIGINT          AS quantity_in,
                COALESCE(SUM((v->>'quantitySold')::INT), 0)::BIGINT        AS quantity_sold,
                COALESCE(SUM((v->>'quantityRemaining')::INT), 0)::BIGINT   AS quantity_remaining
            FROM batches b
            CROSS JOIN LATERAL jsonb_array_elements(b.variants) AS v
            WHERE b.user_id = $1 AND b.has_variants
              AND ($2::uuid IS NULL OR b.product_id = $2)
            GROUP BY 1, 2
            ORDER BY 1, 2
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .fetch_all(executor)
        .await?;
        Ok(stats)
    }

    pub async fn events<'e, E>(
        &self,
        executor: E,
        user_id: Uuid,
        batch_id: Uuid,
    ) -> Result<Vec<BatchEvent>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let events = sqlx::query_as::<_, BatchEvent>(
            r#"
            SELECT id, user_id, batch_id, product_id, kind, quantity_delta, size, color,
                   unit_cost, unit_price, reason, actor_id, created_at
            FROM batch_events
            WHERE user_id = $1 AND batch_id = $2
            ORDER BY created_at ASC, id
            "#,
        )
        .bind(user_id)
        .bind(batch_id)
        .fetch_all(executor)
        .await?;
        Ok(events)
    }

    /// Vendas por lote a partir do livro-razão.
    pub async fn sales_analytics<'e, E>(
        &self,
        executor: E,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<Vec<BatchSalesAnalytics>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let analytics = sqlx::query_as::<_, BatchSalesAnalytics>(
            r#"
            SELECT
                b.id                                                            AS batch_id,
                b.batch_code,
                COALESCE(SUM(-e.quantity_delta), 0)::BIGINT                     AS total_quantity_sold,
                COALESCE(SUM(-e.quantity_delta * e.unit_price), 0)              AS total_revenue,
                COALESCE(SUM(-e.quantity_delta * (e.unit_price - e.unit_cost)), 0) AS total_profit,
                MAX(e.created_at)                                               AS last_sale_date
            FROM batches b
            LEFT JOIN batch_events e ON e.batch_id = b.id AND e.kind = 'sale'
            WHERE b.user_id = $1 AND b.product_id = $2
            GROUP BY b.id, b.batch_code, b.date_received
            ORDER BY b.date_received ASC
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .fetch_all(executor)
        .await?;
        Ok(analytics)
    }

    pub async fn totals_for_product<'e, E>(
        &self,
        executor: E,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<BatchTotals, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let totals = sqlx::query_as::<_, BatchTotals>(
            r#"
            SELECT
                COALESCE(SUM(quantity_remaining) FILTER (WHERE status <> 'archived'), 0)::BIGINT
                                                        AS open_remaining,
                COALESCE(SUM(quantity_sold), 0)::BIGINT AS total_sold,
                COUNT(*)                                AS batch_count
            FROM batches
            WHERE user_id = $1 AND product_id = $2
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .fetch_one(executor)
        .await?;
        Ok(totals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_batches_never_drive_fifo_or_pricing() {
        for sql in [active_fifo_sql(), active_pricing_sql()] {
            assert!(sql.contains("status = 'active'"), "{sql}");
            assert!(sql.contains("expiry_date >= CURRENT_DATE"), "{sql}");
        }
    }
}
