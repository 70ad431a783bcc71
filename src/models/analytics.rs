// src/models/analytics.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{category::ProductCategory, product::Product};

// --- Painel do inventário (uma agregação SQL) ---
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InventoryStats {
    pub total_products: i64,
    pub active_products: i64,
    pub total_units_in_stock: i64,
    pub total_stock_value: Decimal,
    pub total_selling_value: Decimal,
    pub total_revenue: Decimal,
    pub total_profit: Decimal,
    pub low_stock_count: i64,
    pub out_of_stock_count: i64,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRollup {
    pub category: ProductCategory,
    pub product_count: i64,
    pub units_in_stock: i64,
    pub stock_value: Decimal,
    pub units_sold: i64,
}

// --- Lotes ---
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchStats {
    pub total_batches: i64,
    pub active_batches: i64,
    pub depleted_batches: i64,
    pub expired_batches: i64,
    pub damaged_batches: i64,
    pub archived_batches: i64,
    pub total_quantity_in: i64,
    pub total_quantity_sold: i64,
    pub total_quantity_remaining: i64,
    pub total_value: Decimal,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VariantStats {
    pub size: String,
    pub color: String,
    pub batch_count: i64,
    pub quantity_in: i64,
    pub quantity_sold: i64,
    pub quantity_remaining: i64,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchSalesAnalytics {
    pub batch_id: Uuid,
    pub batch_code: String,
    pub total_quantity_sold: i64,
    pub total_revenue: Decimal,
    pub total_profit: Decimal,
    pub last_sale_date: Option<DateTime<Utc>>,
}

/// Somas dos lotes de um produto, para conferir os contadores.
#[derive(Debug, Clone, Copy, FromRow)]
pub struct BatchTotals {
    pub open_remaining: i64,
    pub total_sold: i64,
    pub batch_count: i64,
}

// --- Conferência produto x lotes (somente leitura) ---
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
    pub product_id: Uuid,
    pub batch_count: i64,
    pub quantity_in_stock: i64,
    pub batches_remaining: i64,
    pub stock_delta: i64,
    pub sold_quantity: i64,
    pub batches_sold: i64,
    pub sold_delta: i64,
    pub is_consistent: bool,
}

impl ConsistencyReport {
    pub fn compare(product: &Product, totals: BatchTotals) -> Self {
        let quantity_in_stock = i64::from(product.quantity_in_stock);
        let sold_quantity = i64::from(product.sold_quantity);
        let stock_delta = quantity_in_stock - totals.open_remaining;
        let sold_delta = sold_quantity - totals.total_sold;

        Self {
            product_id: product.id,
            batch_count: totals.batch_count,
            quantity_in_stock,
            batches_remaining: totals.open_remaining,
            stock_delta,
            sold_quantity,
            batches_sold: totals.total_sold,
            sold_delta,
            is_consistent: stock_delta == 0 && sold_delta == 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::product::tests::sample_product;

    #[test]
    fn report_flags_divergence_between_product_and_batches() {
        let mut product = sample_product();
        product.add_initial_stock(10).unwrap();
        product.record_sale(3).unwrap();

        let matching = BatchTotals { open_remaining: 7, total_sold: 3, batch_count: 1 };
        assert!(ConsistencyReport::compare(&product, matching).is_consistent);

        let diverged = BatchTotals { open_remaining: 5, total_sold: 3, batch_count: 1 };
        let report = ConsistencyReport::compare(&product, diverged);
        assert!(!report.is_consistent);
        assert_eq!(report.stock_delta, 2);
        assert_eq!(report.sold_delta, 0);
    }
}
