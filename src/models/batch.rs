// src/models/batch.rs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    common::error::AppError,
    models::product::{percentage, validate_not_negative, Product, StockUpdateMode},
};

fn default_true() -> bool {
    true
}

// --- 1. Status do Lote ---
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Default, ToSchema)]
#[sqlx(type_name = "batch_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    #[default]
    Active,
    Depleted,
    Expired,
    Damaged,
    Archived,
}

impl BatchStatus {
    /// Status que a regra automática pode recalcular.
    /// `Damaged` e `Archived` só mudam por ação explícita.
    pub fn is_automatic(self) -> bool {
        matches!(self, BatchStatus::Active | BatchStatus::Depleted | BatchStatus::Expired)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BatchStatus::Active => "active",
            BatchStatus::Depleted => "depleted",
            BatchStatus::Expired => "expired",
            BatchStatus::Damaged => "damaged",
            BatchStatus::Archived => "archived",
        }
    }
}

// --- 2. Variante dentro do lote ---
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchVariant {
    pub variant_id: Option<Uuid>,
    pub variant_sku: Option<String>,
    pub size: String,
    pub color: String,
    pub quantity_in: i32,
    #[serde(default)]
    pub quantity_sold: i32,
    #[serde(default)]
    pub quantity_remaining: i32,
    pub cost_price: Option<Decimal>,
    pub selling_price: Option<Decimal>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl BatchVariant {
    pub fn matches(&self, size: &str, color: &str) -> bool {
        self.size.trim().eq_ignore_ascii_case(size.trim())
            && self.color.trim().eq_ignore_ascii_case(color.trim())
    }
}

// --- 3. Lote ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub batch_code: String,

    pub quantity_in: i32,
    pub quantity_sold: i32,
    pub quantity_remaining: i32,

    pub cost_price: Decimal,
    pub selling_price: Decimal,

    pub date_received: DateTime<Utc>,
    pub expiry_date: Option<NaiveDate>,
    pub supplier: Option<String>,

    pub has_variants: bool,
    #[sqlx(json)]
    pub variants: Vec<BatchVariant>,

    pub status: BatchStatus,
    pub notes: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- Payload: novo lote ---
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewBatchVariant {
    #[validate(length(min = 1, message = "O tamanho é obrigatório."))]
    pub size: String,
    #[validate(length(min = 1, message = "A cor é obrigatória."))]
    pub color: String,
    #[validate(range(min = 0, max = 100000000, message = "A quantidade deve ficar entre 0 e 100000000."))]
    pub quantity_in: i32,
    pub cost_price: Option<Decimal>,
    pub selling_price: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewBatch {
    pub product_id: Uuid,

    // Ignorado quando há variantes (a soma delas manda)
    #[serde(default)]
    #[validate(range(min = 0, max = 100000000, message = "A quantidade deve ficar entre 0 e 100000000."))]
    pub quantity_in: i32,

    #[validate(custom(function = "validate_not_negative"))]
    pub cost_price: Decimal,

    #[validate(custom(function = "validate_not_negative"))]
    pub selling_price: Decimal,

    pub date_received: Option<DateTime<Utc>>,
    pub expiry_date: Option<NaiveDate>,
    pub supplier: Option<String>,
    pub notes: Option<String>,

    #[serde(default)]
    #[validate(nested)]
    pub variants: Vec<NewBatchVariant>,
}

/// Efeito de uma movimentação do lote, espelhado no produto e no livro-razão.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchChange {
    pub kind: BatchEventKind,
    /// Variação do saldo (`quantityRemaining`) do lote.
    pub quantity_delta: i32,
    pub sold_delta: i32,
    pub size: Option<String>,
    pub color: Option<String>,
    pub unit_cost: Decimal,
    pub unit_price: Decimal,
    pub reason: Option<String>,
}

impl BatchChange {
    /// Aplica no produto a mesma movimentação feita no lote.
    pub fn apply_to(&self, product: &mut Product) -> Result<(), AppError> {
        match self.kind {
            BatchEventKind::Received => product.add_initial_stock(self.quantity_delta),
            BatchEventKind::Sale => product.record_sale(self.sold_delta),
            BatchEventKind::Removal => {
                product.update_stock(-self.quantity_delta, StockUpdateMode::Subtract)
            }
            BatchEventKind::Restock => product.update_stock(self.quantity_delta, StockUpdateMode::Add),
            BatchEventKind::Adjustment if self.quantity_delta > 0 => {
                product.update_stock(self.quantity_delta, StockUpdateMode::Add)
            }
            BatchEventKind::Adjustment | BatchEventKind::StatusChange if self.quantity_delta < 0 => {
                product.update_stock(-self.quantity_delta, StockUpdateMode::Subtract)
            }
            // Lote desarquivado: o saldo volta sem contar como nova entrada
            BatchEventKind::StatusChange if self.quantity_delta > 0 => {
                product.restore_stock(self.quantity_delta)
            }
            BatchEventKind::Adjustment | BatchEventKind::StatusChange => Ok(()),
        }
    }
}

// Endereço de variante já normalizado (strings vazias contam como ausentes)
fn variant_address<'a>(size: Option<&'a str>, color: Option<&'a str>) -> Option<(&'a str, &'a str)> {
    let size = size.map(str::trim).filter(|s| !s.is_empty());
    let color = color.map(str::trim).filter(|s| !s.is_empty());
    match (size, color) {
        (Some(size), Some(color)) => Some((size, color)),
        _ => None,
    }
}

fn quantity_error(field: &'static str, message: &'static str) -> AppError {
    AppError::field(field, "range", message)
}

fn capacity_error(field: &'static str) -> AppError {
    quantity_error(field, "A quantidade ultrapassa o limite suportado.")
}

impl Batch {
    pub fn from_new(
        user_id: Uuid,
        input: NewBatch,
        batch_code: String,
        now: DateTime<Utc>,
    ) -> Result<Self, AppError> {
        input.validate()?;

        let variant_total = input
            .variants
            .iter()
            .try_fold(0i32, |total, v| total.checked_add(v.quantity_in))
            .ok_or_else(|| capacity_error("quantityIn"))?;

        let variants: Vec<BatchVariant> = input
            .variants
            .into_iter()
            .map(|v| BatchVariant {
                variant_id: None,
                variant_sku: None,
                size: v.size.trim().to_string(),
                color: v.color.trim().to_string(),
                quantity_in: v.quantity_in,
                quantity_sold: 0,
                quantity_remaining: v.quantity_in,
                cost_price: v.cost_price,
                selling_price: v.selling_price,
                is_active: true,
            })
            .collect();

        let mut batch = Batch {
            id: Uuid::new_v4(),
            user_id,
            product_id: input.product_id,
            batch_code,
            quantity_in: if variants.is_empty() { input.quantity_in } else { variant_total },
            quantity_sold: 0,
            quantity_remaining: 0,
            cost_price: input.cost_price,
            selling_price: input.selling_price,
            date_received: input.date_received.unwrap_or(now),
            expiry_date: input.expiry_date,
            supplier: input.supplier,
            has_variants: !variants.is_empty(),
            variants,
            status: BatchStatus::Active,
            notes: input.notes.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };

        batch.recompute(now.date_naive());
        batch.validate()?;

        if batch.quantity_in <= 0 {
            return Err(quantity_error(
                "quantityIn",
                "O lote precisa receber ao menos uma unidade.",
            ));
        }

        Ok(batch)
    }

    /// Lote de abertura de um produto cadastrado com saldo ou com vendas anteriores.
    /// Leva o vendido junto, para que produto e lotes confiram desde o cadastro.
    pub fn opening(
        product: &Product,
        batch_code: String,
        expiry_date: Option<NaiveDate>,
    ) -> Result<Self, AppError> {
        let quantity_in = product
            .quantity_in_stock
            .checked_add(product.sold_quantity)
            .ok_or_else(|| capacity_error("quantityIn"))?;
        if quantity_in <= 0 {
            return Err(quantity_error(
                "quantityIn",
                "O lote precisa receber ao menos uma unidade.",
            ));
        }

        let now = product.created_at;
        let mut batch = Batch {
            id: Uuid::new_v4(),
            user_id: product.user_id,
            product_id: product.id,
            batch_code,
            quantity_in,
            quantity_sold: product.sold_quantity,
            quantity_remaining: 0,
            cost_price: product.cost_price,
            selling_price: product.selling_price,
            date_received: now,
            expiry_date,
            supplier: product.supplier.clone(),
            has_variants: false,
            variants: Vec::new(),
            status: BatchStatus::Active,
            notes: "Estoque inicial do cadastro".to_string(),
            created_at: now,
            updated_at: now,
        };

        batch.recompute(now.date_naive());
        batch.validate()?;
        Ok(batch)
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let mut push = |field: &'static str, code: &'static str, message: &'static str| {
            let mut err = ValidationError::new(code);
            err.message = Some(message.into());
            errors.add(field, err);
        };

        if self.batch_code.trim().is_empty() {
            push("batchCode", "required", "O código do lote é obrigatório.");
        }
        if self.quantity_in < 0 || self.quantity_sold < 0 || self.quantity_remaining < 0 {
            push("quantityIn", "range", "As quantidades não podem ser negativas.");
        }
        if self.cost_price.is_sign_negative() {
            push("costPrice", "range", "O valor não pode ser negativo.");
        }
        if self.selling_price.is_sign_negative() {
            push("sellingPrice", "range", "O valor não pode ser negativo.");
        }

        for (i, variant) in self.variants.iter().enumerate() {
            if variant.size.trim().is_empty() || variant.color.trim().is_empty() {
                push("variants", "required", "Toda variante precisa de tamanho e cor.");
            }
            if self.variants[..i].iter().any(|other| other.matches(&variant.size, &variant.color)) {
                push("variants", "duplicate", "Variantes repetidas (mesmo tamanho e cor).");
            }
            if variant.quantity_in < 0 || variant.quantity_sold < 0 {
                push("variants", "range", "As quantidades não podem ser negativas.");
            }
            let negative_price = [variant.cost_price, variant.selling_price]
                .into_iter()
                .flatten()
                .any(|p| p.is_sign_negative());
            if negative_price {
                push("variants", "range", "O valor não pode ser negativo.");
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Recalcula saldos (e o status, se automático). Roda antes de todo save.
    pub fn recompute(&mut self, today: NaiveDate) {
        for variant in &mut self.variants {
            variant.quantity_remaining = (variant.quantity_in - variant.quantity_sold).max(0);
        }

        if self.has_variants {
            self.quantity_in = self.variants.iter().fold(0i32, |t, v| t.saturating_add(v.quantity_in));
            self.quantity_sold = self.variants.iter().fold(0i32, |t, v| t.saturating_add(v.quantity_sold));
        }
        self.quantity_remaining = self.quantity_in.saturating_sub(self.quantity_sold).max(0);

        if self.status.is_automatic() {
            self.status = if self.quantity_remaining <= 0 {
                BatchStatus::Depleted
            } else if self.expiry_date.is_some_and(|expiry| expiry < today) {
                BatchStatus::Expired
            } else {
                BatchStatus::Active
            };
        }
    }

    /// Saldo que conta no estoque do produto. Lote arquivado não conta.
    pub fn stocked_remaining(&self) -> i32 {
        if self.status == BatchStatus::Archived { 0 } else { self.quantity_remaining }
    }

    pub fn get_variant(&self, size: &str, color: &str) -> Option<&BatchVariant> {
        self.variants.iter().find(|v| v.matches(size, color))
    }

    pub fn is_variant_available(&self, size: &str, color: &str, quantity: i32) -> bool {
        self.get_variant(size, color)
            .is_some_and(|v| v.is_active && v.quantity_remaining >= quantity)
    }

    fn ensure_open(&self) -> Result<(), AppError> {
        if self.status.is_automatic() {
            Ok(())
        } else {
            Err(AppError::BatchClosed { status: self.status })
        }
    }

    // Índice da variante endereçada (None = quantidades do lote)
    fn locate(&self, size: Option<&str>, color: Option<&str>) -> Result<Option<usize>, AppError> {
        let address = variant_address(size, color);

        if !self.has_variants {
            return match address {
                Some((size, color)) => Err(AppError::VariantNotFound {
                    size: size.to_string(),
                    color: color.to_string(),
                }),
                None => Ok(None),
            };
        }

        let (size, color) = address.ok_or(AppError::VariantRequired)?;
        let index = self
            .variants
            .iter()
            .position(|v| v.matches(size, color))
            .ok_or_else(|| AppError::VariantNotFound {
                size: size.to_string(),
                color: color.to_string(),
            })?;

        let variant = &self.variants[index];
        if !variant.is_active {
            return Err(AppError::VariantInactive {
                size: variant.size.clone(),
                color: variant.color.clone(),
            });
        }
        Ok(Some(index))
    }

    fn remaining_at(&self, index: Option<usize>) -> i32 {
        index.map_or(self.quantity_remaining, |i| self.variants[i].quantity_remaining)
    }

    fn sold_at(&self, index: Option<usize>) -> i32 {
        index.map_or(self.quantity_sold, |i| self.variants[i].quantity_sold)
    }

    fn unit_prices_at(&self, index: Option<usize>) -> (Decimal, Decimal) {
        match index {
            Some(i) => {
                let v = &self.variants[i];
                (
                    v.cost_price.unwrap_or(self.cost_price),
                    v.selling_price.unwrap_or(self.selling_price),
                )
            }
            None => (self.cost_price, self.selling_price),
        }
    }

    fn quantity_in_at(&mut self, index: Option<usize>) -> &mut i32 {
        match index {
            Some(i) => &mut self.variants[i].quantity_in,
            None => &mut self.quantity_in,
        }
    }

    fn label_at(&self, index: Option<usize>) -> String {
        index
            .map(|i| format!(" ({}/{})", self.variants[i].size, self.variants[i].color))
            .unwrap_or_default()
    }

    fn append_note(&mut self, now: DateTime<Utc>, line: String) {
        if !self.notes.is_empty() {
            self.notes.push('\n');
        }
        self.notes.push_str(&format!("[{}] {}", now.format("%Y-%m-%d %H:%M"), line));
    }

    // Fecha a movimentação: recalcula, registra a nota e monta o BatchChange
    #[allow(clippy::too_many_arguments)]
    fn finish(
        &mut self,
        kind: BatchEventKind,
        index: Option<usize>,
        remaining_before: i32,
        sold_delta: i32,
        reason: Option<String>,
        note: String,
        now: DateTime<Utc>,
    ) -> BatchChange {
        self.recompute(now.date_naive());
        self.updated_at = now;

        let (unit_cost, unit_price) = self.unit_prices_at(index);
        let (size, color) = match index {
            Some(i) => (Some(self.variants[i].size.clone()), Some(self.variants[i].color.clone())),
            None => (None, None),
        };

        let line = match &reason {
            Some(reason) => format!("{note}{} - Motivo: {reason}", self.label_at(index)),
            None => format!("{note}{}", self.label_at(index)),
        };
        self.append_note(now, line);

        BatchChange {
            kind,
            quantity_delta: self.stocked_remaining() - remaining_before,
            sold_delta,
            size,
            color,
            unit_cost,
            unit_price,
            reason,
        }
    }

    // ---
    // Movimentações
    // ---

    pub fn sell(
        &mut self,
        quantity: i32,
        size: Option<&str>,
        color: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<BatchChange, AppError> {
        self.ensure_open()?;
        if quantity <= 0 {
            return Err(quantity_error("quantity", "A quantidade vendida deve ser maior que zero."));
        }
        let index = self.locate(size, color)?;
        let remaining = self.remaining_at(index);
        if quantity > remaining {
            return Err(AppError::QuantityExceedsRemaining { requested: quantity, remaining });
        }

        let before = self.stocked_remaining();
        match index {
            Some(i) => self.variants[i].quantity_sold += quantity,
            None => self.quantity_sold += quantity,
        }

        let note = format!("Venda: {quantity} un");
        Ok(self.finish(BatchEventKind::Sale, index, before, quantity, None, note, now))
    }

    /// Perda/quebra: reduz o total recebido.
    pub fn remove(
        &mut self,
        quantity: i32,
        reason: Option<String>,
        size: Option<&str>,
        color: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<BatchChange, AppError> {
        self.ensure_open()?;
        if quantity <= 0 {
            return Err(quantity_error("quantity", "A quantidade removida deve ser maior que zero."));
        }
        let index = self.locate(size, color)?;
        let remaining = self.remaining_at(index);
        if quantity > remaining {
            return Err(AppError::QuantityExceedsRemaining { requested: quantity, remaining });
        }

        let before = self.stocked_remaining();
        *self.quantity_in_at(index) -= quantity;

        let note = format!("Remoção: {quantity} un");
        Ok(self.finish(BatchEventKind::Removal, index, before, 0, reason, note, now))
    }

    pub fn add(
        &mut self,
        quantity: i32,
        reason: Option<String>,
        size: Option<&str>,
        color: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<BatchChange, AppError> {
        self.ensure_open()?;
        if quantity <= 0 {
            return Err(quantity_error("quantity", "A quantidade adicionada deve ser maior que zero."));
        }
        let index = self.locate(size, color)?;
        // O total do lote soma as variantes: se ele cabe, a variante também cabe
        if self.quantity_in.checked_add(quantity).is_none() {
            return Err(capacity_error("quantity"));
        }

        let before = self.stocked_remaining();
        let quantity_in = self.quantity_in_at(index);
        *quantity_in = quantity_in.saturating_add(quantity);

        let note = format!("Reposição: {quantity} un");
        Ok(self.finish(BatchEventKind::Restock, index, before, 0, reason, note, now))
    }

    /// Corrige o total recebido; nunca abaixo do que já foi vendido.
    pub fn adjust_quantity(
        &mut self,
        new_quantity_in: i32,
        reason: Option<String>,
        size: Option<&str>,
        color: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<BatchChange, AppError> {
        self.ensure_open()?;
        if new_quantity_in < 0 {
            return Err(quantity_error("newQuantityIn", "A quantidade não pode ser negativa."));
        }
        let index = self.locate(size, color)?;
        let sold = self.sold_at(index);
        if new_quantity_in < sold {
            return Err(AppError::AdjustBelowSold { requested: new_quantity_in, sold });
        }
        let current = index.map_or(self.quantity_in, |i| self.variants[i].quantity_in);
        if (self.quantity_in - current).checked_add(new_quantity_in).is_none() {
            return Err(capacity_error("newQuantityIn"));
        }

        let before = self.stocked_remaining();
        let quantity_in = self.quantity_in_at(index);
        let previous = *quantity_in;
        *quantity_in = new_quantity_in;

        let note = format!("Ajuste: {previous} -> {new_quantity_in} un");
        Ok(self.finish(BatchEventKind::Adjustment, index, before, 0, reason, note, now))
    }

    /// Transição explícita. Voltar para um status automático reaplica a regra.
    /// Entrar ou sair de `Archived` move o saldo no produto (`quantity_delta`).
    pub fn set_status(
        &mut self,
        status: BatchStatus,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> BatchChange {
        let previous = self.status;
        let before = self.stocked_remaining();

        self.status = if status.is_automatic() { BatchStatus::Active } else { status };
        self.recompute(now.date_naive());

        let note = format!("Status: {} -> {}", previous.as_str(), self.status.as_str());
        self.finish(BatchEventKind::StatusChange, None, before, 0, reason, note, now)
    }

    /// Entrada do lote recém-criado (todo o saldo inicial).
    pub fn receipt(&self) -> BatchChange {
        BatchChange {
            kind: BatchEventKind::Received,
            quantity_delta: self.quantity_remaining,
            sold_delta: 0,
            size: None,
            color: None,
            unit_cost: self.cost_price,
            unit_price: self.selling_price,
            reason: None,
        }
    }

    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date.is_some_and(|expiry| expiry < today)
    }
}

// --- 4. Indicadores do lote ---
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchMetrics {
    pub batch_value: Decimal,
    pub potential_revenue: Decimal,
    pub total_revenue: Decimal,
    pub total_profit: Decimal,
    pub profit_margin: Decimal,
    pub is_expired: bool,
    pub days_until_expiry: Option<i64>,
    pub turnover_rate: Decimal,
}

impl BatchMetrics {
    pub fn of(batch: &Batch, today: NaiveDate) -> Self {
        // (restante, vendido, custo, preço) por variante ou do lote inteiro
        let lines: Vec<(i32, i32, Decimal, Decimal)> = if batch.has_variants {
            batch
                .variants
                .iter()
                .map(|v| {
                    (
                        v.quantity_remaining,
                        v.quantity_sold,
                        v.cost_price.unwrap_or(batch.cost_price),
                        v.selling_price.unwrap_or(batch.selling_price),
                    )
                })
                .collect()
        } else {
            vec![(batch.quantity_remaining, batch.quantity_sold, batch.cost_price, batch.selling_price)]
        };

        let mut metrics = BatchMetrics {
            batch_value: Decimal::ZERO,
            potential_revenue: Decimal::ZERO,
            total_revenue: Decimal::ZERO,
            total_profit: Decimal::ZERO,
            profit_margin: percentage(batch.selling_price - batch.cost_price, batch.cost_price),
            is_expired: batch.is_expired(today),
            days_until_expiry: batch.expiry_date.map(|expiry| (expiry - today).num_days()),
            turnover_rate: percentage(
                Decimal::from(batch.quantity_sold),
                Decimal::from(batch.quantity_in),
            ),
        };

        for (remaining, sold, cost, price) in lines {
            let remaining = Decimal::from(remaining);
            let sold = Decimal::from(sold);
            metrics.batch_value += remaining * cost;
            metrics.potential_revenue += remaining * price;
            metrics.total_revenue += sold * price;
            metrics.total_profit += sold * (price - cost);
        }

        metrics
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchView {
    #[serde(flatten)]
    pub batch: Batch,
    #[serde(flatten)]
    pub metrics: BatchMetrics,
}

impl BatchView {
    pub fn new(batch: Batch, today: NaiveDate) -> Self {
        let metrics = BatchMetrics::of(&batch, today);
        Self { batch, metrics }
    }
}

// --- 5. Livro-razão do lote ---
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "batch_event_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BatchEventKind {
    Received,
    Sale,
    Removal,
    Restock,
    Adjustment,
    StatusChange,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub batch_id: Uuid,
    pub product_id: Uuid,
    pub kind: BatchEventKind,
    pub quantity_delta: i32,
    pub size: Option<String>,
    pub color: Option<String>,
    pub unit_cost: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub reason: Option<String>,
    pub actor_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl BatchEvent {
    pub fn record(batch: &Batch, change: &BatchChange, actor_id: Uuid, now: DateTime<Utc>) -> Self {
        let priced = !matches!(change.kind, BatchEventKind::StatusChange);
        Self {
            id: Uuid::new_v4(),
            user_id: batch.user_id,
            batch_id: batch.id,
            product_id: batch.product_id,
            kind: change.kind,
            quantity_delta: change.quantity_delta,
            size: change.size.clone(),
            color: change.color.clone(),
            unit_cost: priced.then_some(change.unit_cost),
            unit_price: priced.then_some(change.unit_price),
            reason: change.reason.clone(),
            actor_id,
            created_at: now,
        }
    }
}

// --- 6. Vínculo variante do lote -> variante do produto ---
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VariantRef {
    pub id: Uuid,
    pub sku: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VariantResolution {
    pub size: String,
    pub color: String,
    pub resolved: Option<VariantRef>,
}

/// Liga cada variante do lote à variante do produto de mesmo tamanho/cor,
/// preenchendo id, SKU e preços ausentes. Variantes sem par seguem no lote.
pub fn resolve_variants(product: &Product, batch: &mut Batch) -> Vec<VariantResolution> {
    if product.variants.is_empty() {
        return Vec::new();
    }

    batch
        .variants
        .iter_mut()
        .map(|variant| {
            let resolved = product.find_variant(&variant.size, &variant.color).map(|pv| {
                variant.variant_id = Some(pv.id);
                variant.variant_sku = pv.sku.clone();
                if variant.cost_price.is_none() {
                    variant.cost_price = pv.cost_price;
                }
                if variant.selling_price.is_none() {
                    variant.selling_price = pv.selling_price;
                }
                VariantRef { id: pv.id, sku: pv.sku.clone() }
            });

            VariantResolution {
                size: variant.size.clone(),
                color: variant.color.clone(),
                resolved,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        analytics::{BatchTotals, ConsistencyReport},
        product::{tests::sample_product, ProductVariant},
    };
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    fn input(quantity_in: i32) -> NewBatch {
        NewBatch {
            product_id: Uuid::new_v4(),
            quantity_in,
            cost_price: Decimal::from(10),
            selling_price: Decimal::from(15),
            date_received: None,
            expiry_date: None,
            supplier: None,
            notes: None,
            variants: Vec::new(),
        }
    }

    fn variant(size: &str, color: &str, quantity_in: i32) -> NewBatchVariant {
        NewBatchVariant {
            size: size.into(),
            color: color.into(),
            quantity_in,
            cost_price: None,
            selling_price: None,
        }
    }

    fn plain_batch(quantity_in: i32) -> Batch {
        Batch::from_new(Uuid::new_v4(), input(quantity_in), "ELE-250310-AB12-B001".into(), now()).unwrap()
    }

    fn variant_batch() -> Batch {
        let mut data = input(0);
        data.variants = vec![variant("M", "Red", 10), variant("L", "Red", 5)];
        Batch::from_new(Uuid::new_v4(), data, "CLO-250310-ZZ99-B001".into(), now()).unwrap()
    }

    #[test]
    fn variant_totals_are_derived_from_variants() {
        let batch = variant_batch();
        assert!(batch.has_variants);
        assert_eq!(batch.quantity_in, 15);
        assert_eq!(batch.quantity_remaining, 15);
        assert_eq!(batch.status, BatchStatus::Active);
    }

    #[test]
    fn empty_batch_is_rejected() {
        let err = Batch::from_new(Uuid::new_v4(), input(0), "X-1".into(), now()).unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[test]
    fn selling_everything_depletes_the_batch() {
        let mut batch = plain_batch(10);
        let change = batch.sell(10, None, None, now()).unwrap();

        assert_eq!(batch.quantity_remaining, 0);
        assert_eq!(batch.status, BatchStatus::Depleted);
        assert_eq!(change.quantity_delta, -10);
        assert_eq!(change.sold_delta, 10);
        assert!(batch.notes.contains("Venda: 10 un"));
    }

    #[test]
    fn overselling_a_variant_leaves_batch_untouched() {
        let mut batch = variant_batch();
        let before = batch.clone();

        let err = batch.sell(6, Some("L"), Some("Red"), now()).unwrap_err();
        assert!(matches!(err, AppError::QuantityExceedsRemaining { requested: 6, remaining: 5 }));
        assert_eq!(batch.variants, before.variants);
        assert_eq!(batch.notes, before.notes);
    }

    #[test]
    fn variant_sale_updates_the_variant_and_totals() {
        let mut batch = variant_batch();
        let change = batch.sell(3, Some("m"), Some("red"), now()).unwrap();

        let m = batch.get_variant("M", "Red").unwrap();
        assert_eq!((m.quantity_sold, m.quantity_remaining), (3, 7));
        assert_eq!((batch.quantity_sold, batch.quantity_remaining), (3, 12));
        assert_eq!(change.size.as_deref(), Some("M"));
        // Sem preço na variante, vale o do lote
        assert_eq!(change.unit_price, Decimal::from(15));
    }

    #[test]
    fn variant_batches_require_an_address() {
        let mut batch = variant_batch();
        assert!(matches!(batch.sell(1, None, None, now()), Err(AppError::VariantRequired)));
        assert!(matches!(
            batch.sell(1, Some("XL"), Some("Red"), now()),
            Err(AppError::VariantNotFound { .. })
        ));

        batch.variants[0].is_active = false;
        assert!(matches!(
            batch.sell(1, Some("M"), Some("Red"), now()),
            Err(AppError::VariantInactive { .. })
        ));
        assert!(!batch.is_variant_available("M", "Red", 1));
        assert!(batch.is_variant_available("L", "Red", 5));
        assert!(!batch.is_variant_available("L", "Red", 6));
    }

    #[test]
    fn non_positive_quantities_are_validation_errors() {
        let mut batch = plain_batch(5);
        assert!(matches!(batch.sell(0, None, None, now()), Err(AppError::ValidationError(_))));
        assert!(matches!(batch.remove(-1, None, None, None, now()), Err(AppError::ValidationError(_))));
        assert!(matches!(batch.add(0, None, None, None, now()), Err(AppError::ValidationError(_))));
    }

    #[test]
    fn remove_and_add_move_the_received_total() {
        let mut batch = plain_batch(10);

        let removed = batch.remove(3, Some("Quebra".into()), None, None, now()).unwrap();
        assert_eq!((batch.quantity_in, batch.quantity_remaining), (7, 7));
        assert_eq!(removed.quantity_delta, -3);
        assert!(batch.notes.contains("Motivo: Quebra"));

        let added = batch.add(5, None, None, None, now()).unwrap();
        assert_eq!((batch.quantity_in, batch.quantity_remaining), (12, 12));
        assert_eq!(added.quantity_delta, 5);

        assert!(matches!(
            batch.remove(13, None, None, None, now()),
            Err(AppError::QuantityExceedsRemaining { requested: 13, remaining: 12 })
        ));
    }

    #[test]
    fn adjust_cannot_go_below_sold() {
        let mut batch = plain_batch(10);
        batch.sell(4, None, None, now()).unwrap();

        assert!(matches!(
            batch.adjust_quantity(3, None, None, None, now()),
            Err(AppError::AdjustBelowSold { requested: 3, sold: 4 })
        ));

        let change = batch.adjust_quantity(4, None, None, None, now()).unwrap();
        assert_eq!(change.quantity_delta, -6);
        assert_eq!(batch.status, BatchStatus::Depleted);

        // Reabrir o lote pelo ajuste volta o status para ativo
        batch.adjust_quantity(8, None, None, None, now()).unwrap();
        assert_eq!(batch.status, BatchStatus::Active);
    }

    #[test]
    fn expired_batches_are_flagged_by_calendar_date() {
        let mut data = input(5);
        data.expiry_date = Some(now().date_naive());
        let mut batch = Batch::from_new(Uuid::new_v4(), data, "F-1".into(), now()).unwrap();
        assert_eq!(batch.status, BatchStatus::Active);

        batch.recompute(now().date_naive() + Duration::days(1));
        assert_eq!(batch.status, BatchStatus::Expired);

        let metrics = BatchMetrics::of(&batch, now().date_naive() + Duration::days(1));
        assert!(metrics.is_expired);
        assert_eq!(metrics.days_until_expiry, Some(-1));
    }

    #[test]
    fn damaged_status_is_sticky() {
        let mut batch = plain_batch(10);
        batch.set_status(BatchStatus::Damaged, Some("Enchente".into()), now());
        assert_eq!(batch.status, BatchStatus::Damaged);

        batch.recompute(now().date_naive());
        assert_eq!(batch.status, BatchStatus::Damaged);

        let err = batch.sell(1, None, None, now()).unwrap_err();
        assert!(matches!(err, AppError::BatchClosed { status: BatchStatus::Damaged }));
        assert_eq!(batch.quantity_sold, 0);

        // Reativação explícita reaplica a regra automática
        let change = batch.set_status(BatchStatus::Active, None, now());
        assert_eq!(batch.status, BatchStatus::Active);
        assert_eq!(change.kind, BatchEventKind::StatusChange);
        assert!(batch.notes.contains("Status: damaged -> active"));
    }

    #[test]
    fn metrics_use_variant_prices_when_present() {
        let mut data = input(0);
        data.variants = vec![
            NewBatchVariant { selling_price: Some(Decimal::from(20)), ..variant("M", "Red", 10) },
            variant("L", "Red", 5),
        ];
        let mut batch = Batch::from_new(Uuid::new_v4(), data, "C-1".into(), now()).unwrap();
        batch.sell(2, Some("M"), Some("Red"), now()).unwrap();
        batch.sell(1, Some("L"), Some("Red"), now()).unwrap();

        let metrics = BatchMetrics::of(&batch, now().date_naive());
        assert_eq!(metrics.total_revenue, Decimal::from(2 * 20 + 15));
        assert_eq!(metrics.total_profit, Decimal::from(2 * 10 + 5));
        assert_eq!(metrics.batch_value, Decimal::from(12 * 10));
        assert_eq!(metrics.turnover_rate, Decimal::from(20));
    }

    #[test]
    fn changes_mirror_on_the_product() {
        let mut product = sample_product();
        let mut batch = plain_batch(10);

        batch.receipt().apply_to(&mut product).unwrap();

        batch.sell(4, None, None, now()).unwrap().apply_to(&mut product).unwrap();
        batch.remove(2, None, None, None, now()).unwrap().apply_to(&mut product).unwrap();
        batch.add(3, None, None, None, now()).unwrap().apply_to(&mut product).unwrap();
        batch.adjust_quantity(9, None, None, None, now()).unwrap().apply_to(&mut product).unwrap();

        assert_eq!(product.quantity_in_stock, batch.quantity_remaining);
        assert_eq!(product.sold_quantity, batch.quantity_sold);
    }

    #[test]
    fn resolution_backfills_ids_and_prices() {
        let mut product = sample_product();
        let variant_id = Uuid::new_v4();
        product.variants = vec![ProductVariant {
            id: variant_id,
            sku: Some("ELE-001-M-RED".into()),
            size: "M".into(),
            color: "Red".into(),
            cost_price: Some(Decimal::from(8)),
            selling_price: Some(Decimal::from(12)),
            is_active: true,
        }];

        let mut batch = variant_batch();
        let resolutions = resolve_variants(&product, &mut batch);

        let m = batch.get_variant("M", "Red").unwrap();
        assert_eq!(m.variant_id, Some(variant_id));
        assert_eq!(m.selling_price, Some(Decimal::from(12)));
        assert_eq!(resolutions[0].resolved.as_ref().map(|r| r.id), Some(variant_id));

        // L/Red não existe no produto: fica sem vínculo, mas permanece no lote
        assert_eq!(resolutions[1].resolved, None);
        assert!(batch.get_variant("L", "Red").unwrap().variant_id.is_none());
    }

    #[test]
    fn resolution_is_skipped_for_products_without_variants() {
        let product = sample_product();
        let mut batch = variant_batch();
        assert!(resolve_variants(&product, &mut batch).is_empty());
    }

    #[test]
    fn archiving_moves_the_remaining_out_of_product_stock() {
        let mut product = sample_product();
        let mut batch = plain_batch(10);
        batch.receipt().apply_to(&mut product).unwrap();
        batch.sell(3, None, None, now()).unwrap().apply_to(&mut product).unwrap();

        // Mesmo filtro da consulta: lote arquivado fica fora do saldo
        let totals = |batch: &Batch| BatchTotals {
            open_remaining: i64::from(batch.stocked_remaining()),
            total_sold: i64::from(batch.quantity_sold),
            batch_count: 1,
        };

        let archived = batch.set_status(BatchStatus::Archived, Some("Fora de linha".into()), now());
        assert_eq!(archived.quantity_delta, -7);
        archived.apply_to(&mut product).unwrap();
        assert_eq!(product.quantity_in_stock, 0);
        assert!(ConsistencyReport::compare(&product, totals(&batch)).is_consistent);

        let restored = batch.set_status(BatchStatus::Active, None, now());
        assert_eq!(restored.quantity_delta, 7);
        restored.apply_to(&mut product).unwrap();
        assert_eq!((product.quantity_in_stock, product.total_stocked_quantity), (7, 10));
        assert!(ConsistencyReport::compare(&product, totals(&batch)).is_consistent);

        // Avariado continua contando no estoque
        let damaged = batch.set_status(BatchStatus::Damaged, None, now());
        assert_eq!(damaged.quantity_delta, 0);
    }

    #[test]
    fn opening_batch_carries_the_sales_history() {
        let mut input = crate::models::product::tests::new_product_input(
            crate::models::category::ProductCategory::Electronics,
        );
        input.quantity_in_stock = 8;
        input.sold_quantity = 2;
        let product = Product::from_new(Uuid::new_v4(), input, "ELE-001".into(), now()).unwrap();

        let batch = Batch::opening(&product, "ELE-250310-AB12-B001".into(), None).unwrap();
        assert_eq!((batch.quantity_in, batch.quantity_sold, batch.quantity_remaining), (10, 2, 8));
        assert_eq!(batch.receipt().quantity_delta, 8);

        let totals = BatchTotals {
            open_remaining: i64::from(batch.stocked_remaining()),
            total_sold: i64::from(batch.quantity_sold),
            batch_count: 1,
        };
        assert!(ConsistencyReport::compare(&product, totals).is_consistent);

        // Só vendas, sem saldo: o lote nasce esgotado
        let mut sold_out = product.clone();
        sold_out.quantity_in_stock = 0;
        let batch = Batch::opening(&sold_out, "ELE-250310-AB12-B002".into(), None).unwrap();
        assert_eq!(batch.status, BatchStatus::Depleted);

        sold_out.sold_quantity = 0;
        assert!(Batch::opening(&sold_out, "ELE-250310-AB12-B003".into(), None).is_err());
    }

    #[test]
    fn variant_sum_overflow_is_a_validation_error() {
        let mut data = input(0);
        data.variants = (0..22).map(|i| variant(&format!("T{i}"), "Red", 100_000_000)).collect();

        let err = Batch::from_new(Uuid::new_v4(), data, "C-1".into(), now()).unwrap_err();
        let AppError::ValidationError(errors) = err else {
            panic!("esperava erro de validação");
        };
        assert!(errors.field_errors().contains_key("quantityIn"));

        let mut data = input(0);
        data.variants = vec![variant("M", "Red", 2_000_000_000), variant("L", "Red", 2_000_000_000)];
        assert!(matches!(
            Batch::from_new(Uuid::new_v4(), data, "C-1".into(), now()),
            Err(AppError::ValidationError(_))
        ));
    }

    #[test]
    fn restock_and_adjust_refuse_to_overflow() {
        let mut batch = variant_batch();
        batch.variants[0].quantity_in = i32::MAX - 10;
        batch.recompute(now().date_naive());
        let before = batch.clone();

        assert!(matches!(
            batch.add(20, None, Some("M"), Some("Red"), now()),
            Err(AppError::ValidationError(_))
        ));
        assert!(matches!(
            batch.adjust_quantity(100, None, Some("L"), Some("Red"), now()),
            Err(AppError::ValidationError(_))
        ));
        assert_eq!(batch.variants, before.variants);
        assert_eq!(batch.quantity_in, before.quantity_in);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Sell(i32),
        Remove(i32),
        Add(i32),
        Adjust(i32),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (-2..20i32).prop_map(Op::Sell),
            (-2..20i32).prop_map(Op::Remove),
            (-2..20i32).prop_map(Op::Add),
            (-2..40i32).prop_map(Op::Adjust),
        ]
    }

    proptest! {
        #[test]
        fn remaining_is_never_negative_and_failures_change_nothing(
            initial in 1..30i32,
            ops in prop::collection::vec(op(), 0..30),
        ) {
            let mut batch = plain_batch(initial);
            for op in ops {
                let before = batch.clone();
                let result = match op {
                    Op::Sell(q) => batch.sell(q, None, None, now()),
                    Op::Remove(q) => batch.remove(q, None, None, None, now()),
                    Op::Add(q) => batch.add(q, None, None, None, now()),
                    Op::Adjust(q) => batch.adjust_quantity(q, None, None, None, now()),
                };

                prop_assert!(batch.quantity_remaining >= 0);
                prop_assert_eq!(batch.quantity_remaining, batch.quantity_in - batch.quantity_sold);
                prop_assert_eq!(batch.status == BatchStatus::Depleted, batch.quantity_remaining == 0);

                if result.is_err() {
                    prop_assert_eq!(batch.quantity_in, before.quantity_in);
                    prop_assert_eq!(batch.quantity_sold, before.quantity_sold);
                    prop_assert_eq!(&batch.notes, &before.notes);
                }
            }
        }
    }

    #[derive(Debug, Clone)]
    enum VariantOp {
        Sell(i32),
        Remove(i32),
        Add(i32),
        Adjust(i32),
        Status(BatchStatus),
    }

    // Inclui grafia diferente e uma variante inexistente
    const ADDRESSES: [(&str, &str); 4] = [("M", "Red"), ("l", "red"), ("L", "Red"), ("XL", "Blue")];

    fn variant_op() -> impl Strategy<Value = (VariantOp, usize)> {
        (
            prop_oneof![
                (-2..12i32).prop_map(VariantOp::Sell),
                (-2..12i32).prop_map(VariantOp::Remove),
                (-2..12i32).prop_map(VariantOp::Add),
                (-2..25i32).prop_map(VariantOp::Adjust),
                prop::sample::select(vec![
                    BatchStatus::Active,
                    BatchStatus::Damaged,
                    BatchStatus::Archived,
                ])
                .prop_map(VariantOp::Status),
            ],
            0..ADDRESSES.len(),
        )
    }

    proptest! {
        #[test]
        fn variant_mutations_keep_totals_and_mirror_on_the_product(
            ops in prop::collection::vec(variant_op(), 0..40),
        ) {
            let mut batch = variant_batch();
            let mut product = sample_product();
            batch.receipt().apply_to(&mut product).unwrap();

            for (op, address) in ops {
                let (size, color) = ADDRESSES[address];
                let before = batch.clone();
                let result = match op {
                    VariantOp::Sell(q) => batch.sell(q, Some(size), Some(color), now()),
                    VariantOp::Remove(q) => batch.remove(q, None, Some(size), Some(color), now()),
                    VariantOp::Add(q) => batch.add(q, None, Some(size), Some(color), now()),
                    VariantOp::Adjust(q) => {
                        batch.adjust_quantity(q, None, Some(size), Some(color), now())
                    }
                    VariantOp::Status(status) => Ok(batch.set_status(status, None, now())),
                };

                match result {
                    Ok(change) => {
                        prop_assert!(change.apply_to(&mut product).is_ok());
                    }
                    Err(_) => {
                        prop_assert_eq!(&batch.variants, &before.variants);
                        prop_assert_eq!(&batch.notes, &before.notes);
                    }
                }

                let in_sum: i32 = batch.variants.iter().map(|v| v.quantity_in).sum();
                let sold_sum: i32 = batch.variants.iter().map(|v| v.quantity_sold).sum();
                prop_assert_eq!(batch.quantity_in, in_sum);
                prop_assert_eq!(batch.quantity_sold, sold_sum);
                for v in &batch.variants {
                    prop_assert_eq!(v.quantity_remaining, (v.quantity_in - v.quantity_sold).max(0));
                }
                prop_assert_eq!(batch.quantity_remaining, (batch.quantity_in - batch.quantity_sold).max(0));

                prop_assert_eq!(product.quantity_in_stock, batch.stocked_remaining());
                prop_assert_eq!(product.sold_quantity, batch.quantity_sold);
            }
        }
    }
}
