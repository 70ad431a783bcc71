// src/docs.rs

use utoipa::OpenApi;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use crate::handlers;
use crate::models;
use crate::services;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- INVENTORY ---
        handlers::inventory::create_product,
        handlers::inventory::list_products,
        handlers::inventory::get_product,
        handlers::inventory::update_product,
        handlers::inventory::discontinue_product,
        handlers::inventory::update_stock,
        handlers::inventory::record_sale,
        handlers::inventory::add_initial_stock,
        handlers::inventory::adjust_prices,
        handlers::inventory::get_stats,
        handlers::inventory::get_low_stock,
        handlers::inventory::get_out_of_stock,
        handlers::inventory::get_top_selling,
        handlers::inventory::get_slow_moving,
        handlers::inventory::get_category_rollups,
        handlers::inventory::list_product_batches,
        handlers::inventory::get_batch_sales_analytics,
        handlers::inventory::get_consistency_report,

        // --- BATCHES ---
        handlers::batches::create_batch,
        handlers::batches::list_batches,
        handlers::batches::get_batch,
        handlers::batches::get_batch_events,
        handlers::batches::get_variant_availability,
        handlers::batches::get_active_batches,
        handlers::batches::get_expiring_batches,
        handlers::batches::get_batch_stats,
        handlers::batches::get_variant_stats,
        handlers::batches::sell_from_batch,
        handlers::batches::remove_from_batch,
        handlers::batches::add_to_batch,
        handlers::batches::adjust_batch,
        handlers::batches::set_batch_status,
    ),
    components(
        schemas(
            // --- Produto ---
            models::category::ProductCategory,
            models::category::CategoryDetails,
            models::product::ProductStatus,
            models::product::StockStatus,
            models::product::StockUpdateMode,
            models::product::ProductVariant,
            models::product::Product,
            models::product::NewProduct,
            models::product::ProductUpdate,
            models::product::ProductMetrics,
            models::product::BatchPricing,
            models::product::ProductView,

            // --- Lote ---
            models::batch::BatchStatus,
            models::batch::BatchVariant,
            models::batch::Batch,
            models::batch::NewBatchVariant,
            models::batch::NewBatch,
            models::batch::BatchMetrics,
            models::batch::BatchView,
            models::batch::BatchEventKind,
            models::batch::BatchEvent,
            models::batch::VariantRef,
            models::batch::VariantResolution,
            services::batch_service::BatchCreated,
            services::batch_service::VariantAvailability,

            // --- Relatórios ---
            models::analytics::InventoryStats,
            models::analytics::CategoryRollup,
            models::analytics::BatchStats,
            models::analytics::VariantStats,
            models::analytics::BatchSalesAnalytics,
            models::analytics::ConsistencyReport,

            // --- PAYLOADS ---
            handlers::inventory::StockUpdatePayload,
            handlers::inventory::QuantityPayload,
            handlers::inventory::PricePayload,
            handlers::batches::SellPayload,
            handlers::batches::MovementPayload,
            handlers::batches::AdjustPayload,
            handlers::batches::StatusPayload,
        )
    ),
    tags(
        (name = "Inventory", description = "Cadastro de Produtos, Estoque e Relatórios"),
        (name = "Batches", description = "Lotes de Compra, Variantes e Movimentações")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_jwt",
            SecurityScheme::Http(
                Http::new(HttpAuthScheme::Bearer)
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_batch_routes_and_bearer_scheme() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/batches/{id}/sell"));
        assert!(doc.paths.paths.contains_key("/api/inventory/{id}/consistency"));

        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("api_jwt"));
        assert!(components.schemas.contains_key("ProductView"));
    }

    #[test]
    fn missing_product_on_batch_creation_is_documented() {
        let doc = ApiDoc::openapi();
        let create = doc.paths.paths["/api/batches"].post.as_ref().expect("POST /api/batches");

        let not_found = match &create.responses.responses["404"] {
            utoipa::openapi::RefOr::T(response) => &response.description,
            utoipa::openapi::RefOr::Ref(_) => panic!("resposta 404 deveria ser inline"),
        };
        assert!(not_found.contains("BTH"), "{not_found}");
    }
}
