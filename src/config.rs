// src/config.rs

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{env, sync::Arc, time::Duration};

use crate::{
    common::i18n::I18nStore,
    db::{BatchRepository, ProductRepository},
    services::{batch_service::BatchService, inventory_service::InventoryService},
};

// ---
// Configuração lida do ambiente (.env em desenvolvimento)
// ---
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub db_max_connections: u32,
    pub db_acquire_timeout: Duration,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").context("DATABASE_URL deve ser definida")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET deve ser definido")?;
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let db_max_connections = match env::var("DB_MAX_CONNECTIONS") {
            Ok(v) => v.parse().context("DB_MAX_CONNECTIONS inválido")?,
            Err(_) => 5,
        };
        let acquire_secs: u64 = match env::var("DB_ACQUIRE_TIMEOUT_SECS") {
            Ok(v) => v.parse().context("DB_ACQUIRE_TIMEOUT_SECS inválido")?,
            Err(_) => 3,
        };

        Ok(Self {
            database_url,
            jwt_secret,
            bind_addr,
            db_max_connections,
            db_acquire_timeout: Duration::from_secs(acquire_secs),
        })
    }
}

// O estado compartilhado que será acessível em toda a aplicação
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub jwt_secret: String,
    pub i18n_store: Arc<I18nStore>,
    pub inventory_service: InventoryService,
    pub batch_service: BatchService,
}

impl AppState {
    pub async fn new(settings: &Settings) -> anyhow::Result<Self> {
        let db_pool = PgPoolOptions::new()
            .max_connections(settings.db_max_connections)
            .acquire_timeout(settings.db_acquire_timeout)
            .connect(&settings.database_url)
            .await
            .context("Falha ao conectar ao banco de dados")?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        Self::from_pool(db_pool, settings.jwt_secret.clone())
    }

    /// Monta o gráfico de dependências sobre um pool já criado.
    pub fn from_pool(db_pool: PgPool, jwt_secret: String) -> anyhow::Result<Self> {
        let product_repo = ProductRepository::new();
        let batch_repo = BatchRepository::new();
        let batch_service = BatchService::new(batch_repo.clone(), product_repo.clone());
        let inventory_service =
            InventoryService::new(product_repo, batch_repo, batch_service.clone());

        Ok(Self {
            db_pool,
            jwt_secret,
            i18n_store: Arc::new(I18nStore::new()?),
            inventory_service,
            batch_service,
        })
    }
}
