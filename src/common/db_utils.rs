// src/common/db_utils.rs

use sqlx::{Postgres, Transaction};

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::{auth::AuthenticatedUser, tenancy::TenantContext},
};

// ---
// Helper RLS: abre a transação da requisição com as variáveis das policies
// ---
pub(crate) async fn get_rls_transaction(
    app_state: &AppState,
    tenant_ctx: &TenantContext,
    user: &AuthenticatedUser,
) -> Result<Transaction<'static, Postgres>, AppError> {
    let mut tx = app_state.db_pool.begin().await?;

    // `true` = valem só até o fim da transação
    sqlx::query("SELECT set_config('app.tenant_id', $1, true)")
        .bind(tenant_ctx.0.to_string())
        .execute(&mut *tx)
        .await?;

    sqlx::query("SELECT set_config('app.user_id', $1, true)")
        .bind(user.id.to_string())
        .execute(&mut *tx)
        .await?;

    Ok(tx)
}

/// Traduz violação de unicidade no erro de domínio informado.
pub(crate) fn map_unique_violation(e: sqlx::Error, on_conflict: impl FnOnce() -> AppError) -> AppError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return on_conflict();
        }
    }
    e.into()
}
