// src/handlers/batches.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::{
        db_utils::get_rls_transaction,
        error::{ApiError, AppError},
    },
    config::AppState,
    middleware::{auth::AuthenticatedUser, i18n::Locale, tenancy::TenantContext},
    models::{
        analytics::{BatchStats, VariantStats},
        batch::{BatchEvent, BatchStatus, BatchView, NewBatch},
        pagination::{PageParams, Paginated},
    },
    services::batch_service::{BatchCreated, VariantAvailability, DEFAULT_EXPIRY_WINDOW_DAYS},
};

// ---
// Payloads
// ---

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SellPayload {
    #[validate(range(min = 1, max = 100000000, message = "A quantidade deve ficar entre 1 e 100000000."))]
    pub quantity: i32,
    pub size: Option<String>,
    pub color: Option<String>,
}

/// Saída (perda, avaria) ou entrada avulsa no lote.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MovementPayload {
    #[validate(range(min = 1, max = 100000000, message = "A quantidade deve ficar entre 1 e 100000000."))]
    pub quantity: i32,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdjustPayload {
    #[validate(range(min = 0, max = 100000000, message = "A quantidade deve ficar entre 0 e 100000000."))]
    pub new_quantity_in: i32,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    pub status: BatchStatus,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct ListBatchesQuery {
    pub status: Option<BatchStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct ProductScopeQuery {
    /// Restringe a um produto; sem ele, considera todos
    pub product_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ExpiringQuery {
    /// Janela em dias (padrão 30)
    pub days: Option<i64>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AvailabilityQuery {
    pub size: String,
    pub color: String,
    pub quantity: i32,
}

// ---
// Cadastro e consulta
// ---

#[utoipa::path(
    post,
    path = "/api/batches",
    tag = "Batches",
    request_body = NewBatch,
    responses(
        (status = 201, description = "Lote criado", body = BatchCreated),
        (status = 400, description = "Dados inválidos"),
        (status = 404, description = "Produto não encontrado. O lote nunca é criado com o prefixo genérico BTH para um produto inexistente: ele precisa do produto para somar a entrada no estoque")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_batch(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    Json(payload): Json<NewBatch>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let mut tx = get_rls_transaction(&app_state, &tenant, &user)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let created = app_state
        .batch_service
        .create_batch(&mut *tx, user.id, payload)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tx.commit()
        .await
        .map_err(|e| AppError::from(e).to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/api/batches",
    tag = "Batches",
    params(ListBatchesQuery),
    responses((status = 200, description = "Página de lotes", body = Paginated<BatchView>)),
    security(("api_jwt" = []))
)]
pub async fn list_batches(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    Query(query): Query<ListBatchesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = PageParams { page: query.page, limit: query.limit };

    let mut tx = get_rls_transaction(&app_state, &tenant, &user)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let batches = app_state
        .batch_service
        .list_for_user(&mut *tx, user.id, query.status, &page)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(batches))
}

#[utoipa::path(
    get,
    path = "/api/batches/{id}",
    tag = "Batches",
    params(("id" = Uuid, Path, description = "ID do lote")),
    responses(
        (status = 200, description = "Lote com indicadores", body = BatchView),
        (status = 404, description = "Lote não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_batch(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = get_rls_transaction(&app_state, &tenant, &user)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let batch = app_state
        .batch_service
        .get_batch(&mut *tx, user.id, id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(batch))
}

#[utoipa::path(
    get,
    path = "/api/batches/{id}/events",
    tag = "Batches",
    params(("id" = Uuid, Path, description = "ID do lote")),
    responses(
        (status = 200, description = "Histórico de movimentações", body = Vec<BatchEvent>),
        (status = 404, description = "Lote não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_batch_events(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = get_rls_transaction(&app_state, &tenant, &user)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let events = app_state
        .batch_service
        .events(&mut *tx, user.id, id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(events))
}

#[utoipa::path(
    get,
    path = "/api/batches/{id}/variant-availability",
    tag = "Batches",
    params(("id" = Uuid, Path, description = "ID do lote"), AvailabilityQuery),
    responses(
        (status = 200, description = "Disponibilidade da variante", body = VariantAvailability),
        (status = 404, description = "Lote ou variante não encontrados")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_variant_availability(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = get_rls_transaction(&app_state, &tenant, &user)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let availability = app_state
        .batch_service
        .variant_availability(&mut *tx, user.id, id, query.size, query.color, query.quantity)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(availability))
}

// ---
// Relatórios
// ---

#[utoipa::path(
    get,
    path = "/api/batches/active",
    tag = "Batches",
    params(ProductScopeQuery),
    responses((status = 200, description = "Lotes ativos em ordem FIFO", body = Vec<BatchView>)),
    security(("api_jwt" = []))
)]
pub async fn get_active_batches(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    Query(query): Query<ProductScopeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = get_rls_transaction(&app_state, &tenant, &user)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let batches = app_state
        .batch_service
        .active_fifo(&mut *tx, user.id, query.product_id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(batches))
}

#[utoipa::path(
    get,
    path = "/api/batches/expiring",
    tag = "Batches",
    params(ExpiringQuery),
    responses(
        (status = 200, description = "Lotes que vencem na janela", body = Vec<BatchView>),
        (status = 400, description = "Janela fora do intervalo de 0 a 3650 dias")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_expiring_batches(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    Query(query): Query<ExpiringQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = get_rls_transaction(&app_state, &tenant, &user)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let batches = app_state
        .batch_service
        .expiring_within(&mut *tx, user.id, query.days.unwrap_or(DEFAULT_EXPIRY_WINDOW_DAYS))
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(batches))
}

#[utoipa::path(
    get,
    path = "/api/batches/stats",
    tag = "Batches",
    params(ProductScopeQuery),
    responses((status = 200, description = "Resumo dos lotes", body = BatchStats)),
    security(("api_jwt" = []))
)]
pub async fn get_batch_stats(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    Query(query): Query<ProductScopeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = get_rls_transaction(&app_state, &tenant, &user)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let stats = app_state
        .batch_service
        .batch_stats(&mut *tx, user.id, query.product_id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(stats))
}

#[utoipa::path(
    get,
    path = "/api/batches/variant-stats",
    tag = "Batches",
    params(ProductScopeQuery),
    responses((status = 200, description = "Totais por tamanho e cor", body = Vec<VariantStats>)),
    security(("api_jwt" = []))
)]
pub async fn get_variant_stats(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    Query(query): Query<ProductScopeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = get_rls_transaction(&app_state, &tenant, &user)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let stats = app_state
        .batch_service
        .variant_stats(&mut *tx, user.id, query.product_id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(stats))
}

// ---
// Movimentações
// ---

#[utoipa::path(
    post,
    path = "/api/batches/{id}/sell",
    tag = "Batches",
    params(("id" = Uuid, Path, description = "ID do lote")),
    request_body = SellPayload,
    responses(
        (status = 200, description = "Venda registrada no lote", body = BatchView),
        (status = 400, description = "Quantidade inválida"),
        (status = 404, description = "Lote ou variante não encontrados"),
        (status = 422, description = "Saldo insuficiente ou lote fechado")
    ),
    security(("api_jwt" = []))
)]
pub async fn sell_from_batch(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<SellPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let mut tx = get_rls_transaction(&app_state, &tenant, &user)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let batch = app_state
        .batch_service
        .sell_from_batch(&mut *tx, user.id, id, payload.quantity, payload.size, payload.color)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tx.commit()
        .await
        .map_err(|e| AppError::from(e).to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(batch))
}

#[utoipa::path(
    post,
    path = "/api/batches/{id}/remove",
    tag = "Batches",
    params(("id" = Uuid, Path, description = "ID do lote")),
    request_body = MovementPayload,
    responses(
        (status = 200, description = "Baixa registrada", body = BatchView),
        (status = 400, description = "Quantidade inválida"),
        (status = 422, description = "Saldo insuficiente ou lote fechado")
    ),
    security(("api_jwt" = []))
)]
pub async fn remove_from_batch(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<MovementPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let mut tx = get_rls_transaction(&app_state, &tenant, &user)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let batch = app_state
        .batch_service
        .remove_from_batch(
            &mut *tx,
            user.id,
            id,
            payload.quantity,
            payload.reason,
            payload.size,
            payload.color,
        )
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tx.commit()
        .await
        .map_err(|e| AppError::from(e).to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(batch))
}

#[utoipa::path(
    post,
    path = "/api/batches/{id}/add",
    tag = "Batches",
    params(("id" = Uuid, Path, description = "ID do lote")),
    request_body = MovementPayload,
    responses(
        (status = 200, description = "Entrada registrada", body = BatchView),
        (status = 400, description = "Quantidade inválida"),
        (status = 422, description = "Lote fechado")
    ),
    security(("api_jwt" = []))
)]
pub async fn add_to_batch(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<MovementPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let mut tx = get_rls_transaction(&app_state, &tenant, &user)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let batch = app_state
        .batch_service
        .add_to_batch(
            &mut *tx,
            user.id,
            id,
            payload.quantity,
            payload.reason,
            payload.size,
            payload.color,
        )
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tx.commit()
        .await
        .map_err(|e| AppError::from(e).to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(batch))
}

#[utoipa::path(
    post,
    path = "/api/batches/{id}/adjust",
    tag = "Batches",
    params(("id" = Uuid, Path, description = "ID do lote")),
    request_body = AdjustPayload,
    responses(
        (status = 200, description = "Quantidade recebida ajustada", body = BatchView),
        (status = 400, description = "Quantidade inválida"),
        (status = 422, description = "Abaixo do já vendido ou lote fechado")
    ),
    security(("api_jwt" = []))
)]
pub async fn adjust_batch(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdjustPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let mut tx = get_rls_transaction(&app_state, &tenant, &user)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let batch = app_state
        .batch_service
        .adjust_quantity(
            &mut *tx,
            user.id,
            id,
            payload.new_quantity_in,
            payload.reason,
            payload.size,
            payload.color,
        )
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tx.commit()
        .await
        .map_err(|e| AppError::from(e).to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(batch))
}

#[utoipa::path(
    post,
    path = "/api/batches/{id}/status",
    tag = "Batches",
    params(("id" = Uuid, Path, description = "ID do lote")),
    request_body = StatusPayload,
    responses(
        (status = 200, description = "Status alterado", body = BatchView),
        (status = 404, description = "Lote não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn set_batch_status(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<StatusPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let mut tx = get_rls_transaction(&app_state, &tenant, &user)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let batch = app_state
        .batch_service
        .set_status(&mut *tx, user.id, id, payload.status, payload.reason)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tx.commit()
        .await
        .map_err(|e| AppError::from(e).to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(batch))
}
