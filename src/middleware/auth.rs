// src/middleware/auth.rs

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use jsonwebtoken::{decode, DecodingKey, Validation};
use uuid::Uuid;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::{i18n::Locale, tenancy::TenantContext},
    models::auth::Claims,
};

// Usuário autenticado (o token é emitido pelo serviço de autenticação externo)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: Uuid,
}

/// Valida o JWT do cabeçalho `Authorization: Bearer` e guarda o usuário
/// e o tenant nas extensions da requisição.
pub async fn auth_guard(
    State(app_state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let locale = Locale::from_headers(request.headers());

    let claims = request
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or(AppError::InvalidToken)
        .and_then(|Authorization(bearer)| decode_token(bearer.token(), &app_state.jwt_secret))
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let user = AuthenticatedUser { id: claims.sub };
    tracing::debug!(user_id = %user.id, "requisição autenticada");

    request.extensions_mut().insert(user);
    request.extensions_mut().insert(TenantContext(user.id));

    Ok(next.run(request).await)
}

pub fn decode_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!("Token rejeitado: {}", e);
        AppError::InvalidToken
    })
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        app_state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<AuthenticatedUser>().copied().ok_or_else(|| {
            AppError::InvalidToken
                .to_api_error(&Locale::from_headers(&parts.headers), &app_state.i18n_store)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(secret: &str, exp_offset: Duration) -> (Uuid, String) {
        let sub = Uuid::new_v4();
        let now = Utc::now();
        let claims = Claims {
            sub,
            iat: now.timestamp() as usize,
            exp: (now + exp_offset).timestamp() as usize,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
            .unwrap();
        (sub, token)
    }

    #[test]
    fn accepts_token_signed_with_the_shared_secret() {
        let (sub, token) = token("segredo", Duration::hours(1));
        assert_eq!(decode_token(&token, "segredo").unwrap().sub, sub);
    }

    #[test]
    fn rejects_wrong_secret_and_expired_tokens() {
        let (_, forged) = token("outro", Duration::hours(1));
        assert!(matches!(decode_token(&forged, "segredo"), Err(AppError::InvalidToken)));

        let (_, expired) = token("segredo", Duration::hours(-2));
        assert!(matches!(decode_token(&expired, "segredo"), Err(AppError::InvalidToken)));
    }
}
