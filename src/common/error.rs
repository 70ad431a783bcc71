// src/common/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use thiserror::Error;
use validator::{ValidationError, ValidationErrors, ValidationErrorsKind};

use crate::{
    common::i18n::I18nStore,
    middleware::i18n::Locale,
    models::batch::BatchStatus,
};

// Nosso tipo de erro de domínio. Os handlers o traduzem para ApiError.
#[derive(Debug, Error)]
pub enum AppError {
    // --- Validação de esquema (antes de persistir) ---
    #[error("Erro de validação")]
    ValidationError(#[from] ValidationErrors),

    // --- Regras de negócio ---
    #[error("Estoque insuficiente: solicitado {requested}, disponível {available}")]
    InsufficientStock { requested: i32, available: i32 },

    #[error("Quantidade excede o saldo do lote: solicitado {requested}, restante {remaining}")]
    QuantityExceedsRemaining { requested: i32, remaining: i32 },

    #[error("Quantidade recebida ({requested}) menor que a vendida ({sold})")]
    AdjustBelowSold { requested: i32, sold: i32 },

    #[error("Variante {size}/{color} não encontrada")]
    VariantNotFound { size: String, color: String },

    #[error("Variante {size}/{color} está inativa")]
    VariantInactive { size: String, color: String },

    #[error("Lote com variantes exige tamanho e cor")]
    VariantRequired,

    #[error("Lote com status {status:?} não aceita movimentações")]
    BatchClosed { status: BatchStatus },

    // --- Entidades ---
    #[error("Produto não encontrado")]
    ProductNotFound,

    #[error("Lote não encontrado")]
    BatchNotFound,

    #[error("SKU '{0}' já existe")]
    SkuAlreadyExists(String),

    #[error("Código de lote '{0}' já existe")]
    BatchCodeAlreadyExists(String),

    // --- Autenticação ---
    #[error("Token inválido")]
    InvalidToken,

    // Variante para erros de banco de dados
    #[error("Erro de banco de dados: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Variante genérica para qualquer outro erro inesperado
    #[error("Erro interno do servidor: {0}")]
    InternalServerError(#[from] anyhow::Error),
}

impl AppError {
    /// Erro de validação de um único campo, no mesmo formato do `validator`.
    pub fn field(field: &'static str, code: &'static str, message: &'static str) -> Self {
        let mut err = ValidationError::new(code);
        err.message = Some(message.into());
        let mut errors = ValidationErrors::new();
        errors.add(field, err);
        AppError::ValidationError(errors)
    }

    /// Chave do catálogo de mensagens (locales/*.json).
    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "validation_failed",
            AppError::InsufficientStock { .. } => "insufficient_stock",
            AppError::QuantityExceedsRemaining { .. } => "quantity_exceeds_remaining",
            AppError::AdjustBelowSold { .. } => "adjust_below_sold",
            AppError::VariantNotFound { .. } => "variant_not_found",
            AppError::VariantInactive { .. } => "variant_inactive",
            AppError::VariantRequired => "variant_required",
            AppError::BatchClosed { .. } => "batch_closed",
            AppError::ProductNotFound => "product_not_found",
            AppError::BatchNotFound => "batch_not_found",
            AppError::SkuAlreadyExists(_) => "sku_already_exists",
            AppError::BatchCodeAlreadyExists(_) => "batch_code_already_exists",
            AppError::InvalidToken => "invalid_token",
            AppError::DatabaseError(_) | AppError::InternalServerError(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::InsufficientStock { .. }
            | AppError::QuantityExceedsRemaining { .. }
            | AppError::AdjustBelowSold { .. }
            | AppError::VariantNotFound { .. }
            | AppError::VariantInactive { .. }
            | AppError::VariantRequired
            | AppError::BatchClosed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ProductNotFound | AppError::BatchNotFound => StatusCode::NOT_FOUND,
            AppError::SkuAlreadyExists(_) | AppError::BatchCodeAlreadyExists(_) => {
                StatusCode::CONFLICT
            }
            AppError::InvalidToken => StatusCode::UNAUTHORIZED,
            AppError::DatabaseError(_) | AppError::InternalServerError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    // Valores para os placeholders das mensagens traduzidas
    fn message_args(&self) -> Vec<(&'static str, String)> {
        match self {
            AppError::InsufficientStock { requested, available } => vec![
                ("requested", requested.to_string()),
                ("available", available.to_string()),
            ],
            AppError::QuantityExceedsRemaining { requested, remaining } => vec![
                ("requested", requested.to_string()),
                ("remaining", remaining.to_string()),
            ],
            AppError::AdjustBelowSold { requested, sold } => vec![
                ("requested", requested.to_string()),
                ("sold", sold.to_string()),
            ],
            AppError::VariantNotFound { size, color } | AppError::VariantInactive { size, color } => {
                vec![("size", size.clone()), ("color", color.clone())]
            }
            AppError::BatchClosed { status } => vec![("status", status.as_str().to_string())],
            AppError::SkuAlreadyExists(code) | AppError::BatchCodeAlreadyExists(code) => {
                vec![("code", code.clone())]
            }
            _ => Vec::new(),
        }
    }

    /// Converte o erro de domínio na resposta HTTP, no idioma do cliente.
    pub fn to_api_error(&self, locale: &Locale, store: &I18nStore) -> ApiError {
        let status = self.status();
        let error = store.translate(&locale.0, self.code(), &self.message_args());

        let details = match self {
            AppError::ValidationError(errors) => Some(validation_details(errors)),
            AppError::DatabaseError(_) | AppError::InternalServerError(_) => {
                // O detalhe fica no log, nunca na resposta.
                tracing::error!("Erro Interno do Servidor: {}", self);
                None
            }
            _ => None,
        };

        ApiError { status, error, details }
    }
}

// Chaves no mesmo formato do JSON da API (camelCase), seja o erro do derive ou do domínio
fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = !out.is_empty();
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn validation_details(errors: &ValidationErrors) -> Value {
    let mut details = HashMap::new();
    collect_details(errors, "", &mut details);
    json!(details)
}

// Erros aninhados viram `variants[0].quantityIn`
fn collect_details(errors: &ValidationErrors, prefix: &str, details: &mut HashMap<String, Vec<String>>) {
    for (field, kind) in errors.errors() {
        let key = format!("{prefix}{}", camel_case(field));
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                let messages = field_errors.iter().map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string())
                });
                details.entry(key).or_default().extend(messages);
            }
            ValidationErrorsKind::Struct(nested) => {
                collect_details(nested, &format!("{key}."), details);
            }
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect_details(nested, &format!("{key}[{index}]."), details);
                }
            }
        }
    }
}

// Resposta de erro enviada ao cliente.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: String,
    pub details: Option<Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.details {
            Some(details) => json!({ "error": self.error, "details": details }),
            None => json!({ "error": self.error }),
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> I18nStore {
        I18nStore::new().unwrap()
    }

    #[test]
    fn business_rule_errors_are_distinct_from_validation() {
        let validation = AppError::field("quantity", "range", "A quantidade deve ser maior que zero.");
        let business = AppError::InsufficientStock { requested: 5, available: 3 };

        assert_eq!(validation.status(), StatusCode::BAD_REQUEST);
        assert_eq!(business.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_ne!(validation.code(), business.code());
    }

    #[test]
    fn translates_messages_with_arguments() {
        let err = AppError::InsufficientStock { requested: 5, available: 3 };

        let en = err.to_api_error(&Locale("en".into()), &store());
        assert_eq!(en.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(en.error.contains('5') && en.error.contains('3'), "{}", en.error);

        let pt = err.to_api_error(&Locale("pt".into()), &store());
        assert_ne!(en.error, pt.error);
    }

    #[test]
    fn validation_errors_carry_field_details() {
        let err = AppError::field("costPrice", "range", "O valor não pode ser negativo.");
        let api = err.to_api_error(&Locale("en".into()), &store());

        let details = api.details.expect("detalhes de validação");
        assert_eq!(details["costPrice"][0], "O valor não pode ser negativo.");
    }

    #[test]
    fn derive_errors_use_the_same_keys_as_the_json_payload() {
        use validator::Validate;

        #[derive(Validate)]
        struct Item {
            #[validate(range(min = 0))]
            quantity_in: i32,
        }

        #[derive(Validate)]
        struct Payload {
            #[validate(length(min = 1))]
            product_name: String,
            #[validate(nested)]
            variants: Vec<Item>,
        }

        let payload = Payload {
            product_name: String::new(),
            variants: vec![Item { quantity_in: 1 }, Item { quantity_in: -1 }],
        };
        let err = AppError::from(payload.validate().unwrap_err());
        let details = err.to_api_error(&Locale("en".into()), &store()).details.unwrap();

        assert!(details["productName"].is_array());
        assert!(details["variants[1].quantityIn"].is_array());
        assert!(details.get("product_name").is_none());
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = AppError::InternalServerError(anyhow::anyhow!("conexão recusada"));
        let api = err.to_api_error(&Locale("en".into()), &store());

        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(api.details.is_none());
        assert!(!api.error.contains("conexão recusada"));
    }
}
