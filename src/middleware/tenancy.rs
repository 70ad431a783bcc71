// src/middleware/tenancy.rs

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::i18n::Locale,
};

// Dono dos dados da requisição. Cada usuário é a sua própria loja,
// então o tenant vem do token (inserido pelo auth_guard).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantContext(pub Uuid);

impl FromRequestParts<AppState> for TenantContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        app_state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Rota montada fora do auth_guard não tem tenant
        parts.extensions.get::<TenantContext>().copied().ok_or_else(|| {
            AppError::InvalidToken
                .to_api_error(&Locale::from_headers(&parts.headers), &app_state.i18n_store)
        })
    }
}
