// src/models/product.rs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashSet;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    common::error::AppError,
    models::category::{CategoryDetails, ProductCategory},
};

pub const DEFAULT_REORDER_LEVEL: i32 = 5;

fn default_reorder_level() -> i32 {
    DEFAULT_REORDER_LEVEL
}

fn default_true() -> bool {
    true
}

// ---
// Validação Customizada
// ---
pub fn validate_not_negative(val: &Decimal) -> Result<(), ValidationError> {
    if val.is_sign_negative() {
        let mut err = ValidationError::new("range");
        err.add_param("min".into(), &0.0);
        err.message = Some("O valor não pode ser negativo.".into());
        return Err(err);
    }
    Ok(())
}

/// `numerator / denominator * 100`, arredondado em 2 casas; 0 quando o denominador é 0.
pub fn percentage(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator.is_zero() {
        return Decimal::ZERO;
    }
    (numerator / denominator * Decimal::ONE_HUNDRED).round_dp(2)
}

fn capacity_error() -> AppError {
    AppError::field("quantity", "range", "A quantidade ultrapassa o limite suportado.")
}

fn push_error(
    errors: &mut ValidationErrors,
    field: &'static str,
    code: &'static str,
    message: &'static str,
) {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    errors.add(field, err);
}

// --- 1. Status do Produto ---
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Default, ToSchema)]
#[sqlx(type_name = "product_status")]
pub enum ProductStatus {
    #[default]
    Active,
    Inactive,
    Discontinued,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub enum StockStatus {
    #[serde(rename = "Out of Stock")]
    OutOfStock,
    #[serde(rename = "Low Stock")]
    LowStock,
    #[serde(rename = "In Stock")]
    InStock,
}

/// Como `update_stock` interpreta a quantidade recebida.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StockUpdateMode {
    Set,
    Add,
    Subtract,
}

// --- 2. Variante do Produto (tamanho x cor) ---
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductVariant {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub sku: Option<String>,
    pub size: String,
    pub color: String,
    pub cost_price: Option<Decimal>,
    pub selling_price: Option<Decimal>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl ProductVariant {
    pub fn matches(&self, size: &str, color: &str) -> bool {
        self.size.trim().eq_ignore_ascii_case(size.trim())
            && self.color.trim().eq_ignore_ascii_case(color.trim())
    }
}

// --- 3. Produto (o "catálogo" com contadores agregados) ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub user_id: Uuid,
    pub sku: String,
    pub product_name: String,
    pub description: Option<String>,
    #[sqlx(json)]
    pub category_details: CategoryDetails,
    pub unit: String,
    pub supplier: Option<String>,
    pub barcode: Option<String>,

    pub quantity_in_stock: i32,      // Saldo atual
    pub total_stocked_quantity: i32, // Total já recebido
    pub sold_quantity: i32,          // Total já vendido
    pub reorder_level: i32,

    // Preço padrão dos lotes
    pub cost_price: Decimal,
    pub selling_price: Decimal,

    pub status: ProductStatus,
    pub web_visibility: bool,
    #[sqlx(json)]
    pub variants: Vec<ProductVariant>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- Payload: criação ---
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    // Se vier vazio, o SKU é gerado: {CAT}-{seq:03}
    pub sku: Option<String>,

    #[validate(length(min = 1, message = "O nome do produto é obrigatório."))]
    pub product_name: String,

    pub description: Option<String>,
    pub category: ProductCategory,
    pub category_details: Option<CategoryDetails>,

    #[validate(length(min = 1, message = "A unidade é obrigatória."))]
    pub unit: String,

    pub supplier: Option<String>,
    pub barcode: Option<String>,

    #[serde(default)]
    #[validate(range(min = 0, max = 100000000, message = "O estoque deve ficar entre 0 e 100000000."))]
    pub quantity_in_stock: i32,

    #[serde(default)]
    #[validate(range(min = 0, max = 100000000, message = "O total recebido deve ficar entre 0 e 100000000."))]
    pub total_stocked_quantity: i32,

    #[serde(default)]
    #[validate(range(min = 0, max = 100000000, message = "A quantidade vendida deve ficar entre 0 e 100000000."))]
    pub sold_quantity: i32,

    #[serde(default = "default_reorder_level")]
    #[validate(range(min = 0, message = "O ponto de reposição não pode ser negativo."))]
    pub reorder_level: i32,

    #[validate(custom(function = "validate_not_negative"))]
    pub cost_price: Decimal,

    #[validate(custom(function = "validate_not_negative"))]
    pub selling_price: Decimal,

    pub status: Option<ProductStatus>,

    #[serde(default)]
    pub web_visibility: bool,

    #[serde(default)]
    pub variants: Vec<ProductVariant>,

    // Validade do lote de abertura (quando há estoque inicial)
    pub expiry_date: Option<NaiveDate>,
}

// --- Payload: edição ---
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductUpdate {
    #[validate(length(min = 1, message = "O nome do produto é obrigatório."))]
    pub product_name: Option<String>,
    pub description: Option<String>,
    #[validate(length(min = 1, message = "A unidade é obrigatória."))]
    pub unit: Option<String>,
    pub supplier: Option<String>,
    pub barcode: Option<String>,
    #[validate(range(min = 0, message = "O ponto de reposição não pode ser negativo."))]
    pub reorder_level: Option<i32>,
    pub status: Option<ProductStatus>,
    pub web_visibility: Option<bool>,
    pub category: Option<ProductCategory>,
    pub category_details: Option<CategoryDetails>,
    pub variants: Option<Vec<ProductVariant>>,
}

impl Product {
    /// Monta o registro a partir do payload, já normalizado e validado.
    pub fn from_new(
        user_id: Uuid,
        input: NewProduct,
        sku: String,
        now: DateTime<Utc>,
    ) -> Result<Self, AppError> {
        let category_details = match input.category_details {
            Some(details) if details.category() != input.category => {
                return Err(AppError::field(
                    "categoryDetails",
                    "category_mismatch",
                    "Os detalhes não correspondem à categoria do produto.",
                ));
            }
            Some(details) => details,
            None => CategoryDetails::empty(input.category),
        };

        let mut product = Product {
            id: Uuid::new_v4(),
            user_id,
            sku,
            product_name: input.product_name.trim().to_string(),
            description: input.description,
            category_details,
            unit: input.unit.trim().to_string(),
            supplier: input.supplier,
            barcode: input.barcode,
            quantity_in_stock: input.quantity_in_stock,
            total_stocked_quantity: input.total_stocked_quantity,
            sold_quantity: input.sold_quantity,
            reorder_level: input.reorder_level,
            cost_price: input.cost_price,
            selling_price: input.selling_price,
            status: input.status.unwrap_or_default(),
            web_visibility: input.web_visibility,
            variants: input.variants,
            created_at: now,
            updated_at: now,
        };

        product.normalize_totals();
        product.assign_variant_skus();
        product.validate()?;
        Ok(product)
    }

    pub fn category(&self) -> ProductCategory {
        self.category_details.category()
    }

    /// Checagem explícita antes de persistir.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.product_name.trim().is_empty() {
            push_error(&mut errors, "productName", "required", "O nome do produto é obrigatório.");
        }
        if self.unit.trim().is_empty() {
            push_error(&mut errors, "unit", "required", "A unidade é obrigatória.");
        }
        if self.sku.trim().is_empty() {
            push_error(&mut errors, "sku", "required", "O SKU é obrigatório.");
        }
        if self.quantity_in_stock < 0 {
            push_error(&mut errors, "quantityInStock", "range", "O estoque não pode ser negativo.");
        }
        if self.total_stocked_quantity < 0 {
            push_error(&mut errors, "totalStockedQuantity", "range", "O total recebido não pode ser negativo.");
        }
        if self.sold_quantity < 0 {
            push_error(&mut errors, "soldQuantity", "range", "A quantidade vendida não pode ser negativa.");
        }
        if self.reorder_level < 0 {
            push_error(&mut errors, "reorderLevel", "range", "O ponto de reposição não pode ser negativo.");
        }
        if self.cost_price.is_sign_negative() {
            push_error(&mut errors, "costPrice", "range", "O valor não pode ser negativo.");
        }
        if self.selling_price.is_sign_negative() {
            push_error(&mut errors, "sellingPrice", "range", "O valor não pode ser negativo.");
        }

        let mut seen = HashSet::new();
        for variant in &self.variants {
            let key = (
                variant.size.trim().to_lowercase(),
                variant.color.trim().to_lowercase(),
            );
            if key.0.is_empty() || key.1.is_empty() {
                push_error(&mut errors, "variants", "required", "Toda variante precisa de tamanho e cor.");
            } else if !seen.insert(key) {
                push_error(&mut errors, "variants", "duplicate", "Variantes repetidas (mesmo tamanho e cor).");
            }
            let negative_price = [variant.cost_price, variant.selling_price]
                .into_iter()
                .flatten()
                .any(|p| p.is_sign_negative());
            if negative_price {
                push_error(&mut errors, "variants", "range", "O valor não pode ser negativo.");
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// O total recebido nunca é menor que saldo + vendido.
    pub fn normalize_totals(&mut self) {
        let floor = self.quantity_in_stock.saturating_add(self.sold_quantity);
        if self.total_stocked_quantity < floor {
            self.total_stocked_quantity = floor;
        }
    }

    /// Variantes sem SKU recebem `{SKU}-{TAMANHO}-{COR}`.
    pub fn assign_variant_skus(&mut self) {
        for variant in &mut self.variants {
            if variant.sku.as_deref().is_none_or(|s| s.trim().is_empty()) {
                variant.sku = Some(
                    format!("{}-{}-{}", self.sku, variant.size.trim(), variant.color.trim())
                        .to_uppercase()
                        .replace(' ', ""),
                );
            }
        }
    }

    pub fn find_variant(&self, size: &str, color: &str) -> Option<&ProductVariant> {
        self.variants.iter().find(|v| v.matches(size, color))
    }

    // ---
    // Movimentações de estoque
    // ---

    /// `Set` sobrescreve o saldo sem mexer no total recebido.
    pub fn update_stock(&mut self, quantity: i32, mode: StockUpdateMode) -> Result<(), AppError> {
        if quantity < 0 {
            return Err(AppError::field(
                "quantity",
                "range",
                "A quantidade não pode ser negativa.",
            ));
        }

        match mode {
            StockUpdateMode::Set => {
                self.quantity_in_stock = quantity;
            }
            StockUpdateMode::Add => self.receive(quantity)?,
            StockUpdateMode::Subtract => {
                self.quantity_in_stock = (self.quantity_in_stock - quantity).max(0);
            }
        }
        Ok(())
    }

    pub fn record_sale(&mut self, quantity: i32) -> Result<(), AppError> {
        if quantity <= 0 {
            return Err(AppError::field(
                "quantity",
                "range",
                "A quantidade vendida deve ser maior que zero.",
            ));
        }
        if quantity > self.quantity_in_stock {
            return Err(AppError::InsufficientStock {
                requested: quantity,
                available: self.quantity_in_stock,
            });
        }

        self.sold_quantity = self.sold_quantity.checked_add(quantity).ok_or_else(capacity_error)?;
        self.quantity_in_stock -= quantity;
        Ok(())
    }

    pub fn add_initial_stock(&mut self, quantity: i32) -> Result<(), AppError> {
        if quantity <= 0 {
            return Err(AppError::field(
                "quantity",
                "range",
                "A quantidade deve ser maior que zero.",
            ));
        }

        self.receive(quantity)
    }

    // Entrada de mercadoria: saldo e total recebido sobem juntos, ou nenhum sobe
    fn receive(&mut self, quantity: i32) -> Result<(), AppError> {
        let stock = self.quantity_in_stock.checked_add(quantity).ok_or_else(capacity_error)?;
        let total = self.total_stocked_quantity.checked_add(quantity).ok_or_else(capacity_error)?;
        self.quantity_in_stock = stock;
        self.total_stocked_quantity = total;
        Ok(())
    }

    /// Devolve ao saldo unidades já recebidas antes (lote desarquivado).
    /// O total recebido não muda.
    pub fn restore_stock(&mut self, quantity: i32) -> Result<(), AppError> {
        if quantity < 0 {
            return Err(AppError::field(
                "quantity",
                "range",
                "A quantidade não pode ser negativa.",
            ));
        }
        self.quantity_in_stock = self.quantity_in_stock.checked_add(quantity).ok_or_else(capacity_error)?;
        Ok(())
    }

    pub fn adjust_prices(
        &mut self,
        cost_price: Option<Decimal>,
        selling_price: Option<Decimal>,
    ) -> Result<(), AppError> {
        if let Some(cost) = cost_price {
            validate_not_negative(&cost).map_err(|e| single_error("costPrice", e))?;
        }
        if let Some(selling) = selling_price {
            validate_not_negative(&selling).map_err(|e| single_error("sellingPrice", e))?;
        }

        if let Some(cost) = cost_price {
            self.cost_price = cost;
        }
        if let Some(selling) = selling_price {
            self.selling_price = selling;
        }
        Ok(())
    }

    /// Troca a categoria. Sem detalhes novos, a categoria nova começa vazia.
    pub fn change_category(
        &mut self,
        category: ProductCategory,
        details: Option<CategoryDetails>,
    ) -> Result<(), AppError> {
        match details {
            Some(details) if details.category() != category => Err(AppError::field(
                "categoryDetails",
                "category_mismatch",
                "Os detalhes não correspondem à categoria do produto.",
            )),
            Some(details) => {
                self.category_details = details;
                Ok(())
            }
            None => {
                if self.category() != category {
                    self.category_details = CategoryDetails::empty(category);
                }
                Ok(())
            }
        }
    }

    pub fn apply_update(&mut self, update: ProductUpdate) -> Result<(), AppError> {
        if let Some(name) = update.product_name {
            self.product_name = name.trim().to_string();
        }
        if update.description.is_some() {
            self.description = update.description;
        }
        if let Some(unit) = update.unit {
            self.unit = unit.trim().to_string();
        }
        if update.supplier.is_some() {
            self.supplier = update.supplier;
        }
        if update.barcode.is_some() {
            self.barcode = update.barcode;
        }
        if let Some(level) = update.reorder_level {
            self.reorder_level = level;
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(visible) = update.web_visibility {
            self.web_visibility = visible;
        }

        match (update.category, update.category_details) {
            (Some(category), details) => self.change_category(category, details)?,
            (None, Some(details)) => {
                let category = details.category();
                self.change_category(category, Some(details))?;
            }
            (None, None) => {}
        }

        if let Some(variants) = update.variants {
            self.variants = variants;
            self.assign_variant_skus();
        }

        self.validate()?;
        Ok(())
    }

    /// Remoção lógica: o produto nunca é apagado.
    pub fn discontinue(&mut self) {
        self.status = ProductStatus::Discontinued;
    }

    pub fn is_low_stock(&self) -> bool {
        self.quantity_in_stock <= self.reorder_level
    }

    pub fn stock_status(&self) -> StockStatus {
        if self.quantity_in_stock == 0 {
            StockStatus::OutOfStock
        } else if self.is_low_stock() {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }
}

fn single_error(field: &'static str, err: ValidationError) -> AppError {
    let mut errors = ValidationErrors::new();
    errors.add(field, err);
    AppError::ValidationError(errors)
}

// --- 4. Indicadores calculados na leitura (nunca persistidos) ---
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductMetrics {
    pub stock_value: Decimal,
    pub selling_value: Decimal,
    pub total_revenue: Decimal,
    pub total_profit: Decimal,
    pub profit_margin: Decimal,
    pub roi: Decimal,
    pub is_low_stock: bool,
    pub stock_status: StockStatus,
    pub turnover_rate: Decimal,
}

impl ProductMetrics {
    pub fn of(product: &Product) -> Self {
        let in_stock = Decimal::from(product.quantity_in_stock);
        let sold = Decimal::from(product.sold_quantity);
        let unit_profit = product.selling_price - product.cost_price;
        let total_profit = sold * unit_profit;

        Self {
            stock_value: in_stock * product.cost_price,
            selling_value: in_stock * product.selling_price,
            total_revenue: sold * product.selling_price,
            total_profit,
            profit_margin: percentage(unit_profit, product.cost_price),
            roi: percentage(total_profit, sold * product.cost_price),
            is_low_stock: product.is_low_stock(),
            stock_status: product.stock_status(),
            turnover_rate: percentage(sold, Decimal::from(product.total_stocked_quantity)),
        }
    }
}

// --- 5. Preço exibido (lote ativo sobrepõe o padrão) ---
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchPricing {
    pub has_active_batch: bool,
    pub active_batch_code: Option<String>,
    pub active_batch_id: Option<Uuid>,
}

/// Primeiro lote ativo (FIFO) de um produto, só com o que a vitrine precisa.
#[derive(Debug, Clone, FromRow)]
pub struct ActiveBatchPricing {
    pub product_id: Uuid,
    pub batch_id: Uuid,
    pub batch_code: String,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    pub category: ProductCategory,
    #[serde(flatten)]
    pub metrics: ProductMetrics,
    pub current_cost_price: Decimal,
    pub current_selling_price: Decimal,
    pub batch_pricing: BatchPricing,
}

impl ProductView {
    pub fn new(product: Product, active_batch: Option<&ActiveBatchPricing>) -> Self {
        let metrics = ProductMetrics::of(&product);
        let category = product.category();

        let (current_cost_price, current_selling_price, batch_pricing) = match active_batch {
            Some(active) => (
                active.cost_price,
                active.selling_price,
                BatchPricing {
                    has_active_batch: true,
                    active_batch_code: Some(active.batch_code.clone()),
                    active_batch_id: Some(active.batch_id),
                },
            ),
            None => (
                product.cost_price,
                product.selling_price,
                BatchPricing {
                    has_active_batch: false,
                    active_batch_code: None,
                    active_batch_id: None,
                },
            ),
        };

        Self {
            product,
            category,
            metrics,
            current_cost_price,
            current_selling_price,
            batch_pricing,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::category::ElectronicsDetails;
    use proptest::prelude::*;

    macro_rules! dec {
        ($v:expr) => {
            Decimal::from($v)
        };
    }

    pub(crate) fn new_product_input(category: ProductCategory) -> NewProduct {
        NewProduct {
            sku: None,
            product_name: "Fone Bluetooth".into(),
            description: None,
            category,
            category_details: None,
            unit: "pcs".into(),
            supplier: None,
            barcode: None,
            quantity_in_stock: 0,
            total_stocked_quantity: 0,
            sold_quantity: 0,
            reorder_level: DEFAULT_REORDER_LEVEL,
            cost_price: dec!(1000),
            selling_price: dec!(1500),
            status: None,
            web_visibility: false,
            variants: Vec::new(),
            expiry_date: None,
        }
    }

    pub(crate) fn sample_product() -> Product {
        Product::from_new(
            Uuid::new_v4(),
            new_product_input(ProductCategory::Electronics),
            "ELE-001".into(),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn creation_normalizes_totals_and_fills_details() {
        let mut input = new_product_input(ProductCategory::Electronics);
        input.quantity_in_stock = 8;
        input.sold_quantity = 2;
        input.total_stocked_quantity = 3;

        let product = Product::from_new(Uuid::new_v4(), input, "ELE-001".into(), Utc::now()).unwrap();

        assert_eq!(product.total_stocked_quantity, 10);
        assert_eq!(product.category(), ProductCategory::Electronics);
        assert_eq!(product.status, ProductStatus::Active);
        assert_eq!(product.reorder_level, 5);
    }

    #[test]
    fn creation_rejects_details_of_another_category() {
        let mut input = new_product_input(ProductCategory::Books);
        input.category_details = Some(CategoryDetails::Electronics(ElectronicsDetails::default()));

        let err = Product::from_new(Uuid::new_v4(), input, "BOO-001".into(), Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[test]
    fn creation_rejects_blank_name_and_negative_price() {
        let mut input = new_product_input(ProductCategory::Food);
        input.product_name = "   ".into();
        input.cost_price = dec!(-1);

        match Product::from_new(Uuid::new_v4(), input, "FOO-001".into(), Utc::now()) {
            Err(AppError::ValidationError(errors)) => {
                let fields = errors.field_errors();
                assert!(fields.contains_key("productName"));
                assert!(fields.contains_key("costPrice"));
            }
            other => panic!("esperava erro de validação, veio {other:?}"),
        }
    }

    #[test]
    fn duplicate_variants_are_rejected() {
        let mut input = new_product_input(ProductCategory::Clothing);
        let variant = ProductVariant {
            id: Uuid::new_v4(),
            sku: None,
            size: "M".into(),
            color: "Red".into(),
            cost_price: None,
            selling_price: None,
            is_active: true,
        };
        input.variants = vec![variant.clone(), ProductVariant { size: "m".into(), color: " red".into(), ..variant }];

        assert!(Product::from_new(Uuid::new_v4(), input, "CLO-001".into(), Utc::now()).is_err());
    }

    #[test]
    fn variant_skus_are_generated_from_product_sku() {
        let mut input = new_product_input(ProductCategory::Clothing);
        input.variants = vec![ProductVariant {
            id: Uuid::new_v4(),
            sku: None,
            size: "M".into(),
            color: "Dark Blue".into(),
            cost_price: None,
            selling_price: None,
            is_active: true,
        }];

        let product = Product::from_new(Uuid::new_v4(), input, "CLO-007".into(), Utc::now()).unwrap();
        assert_eq!(product.variants[0].sku.as_deref(), Some("CLO-007-M-DARKBLUE"));
    }

    #[test]
    fn update_stock_modes() {
        let mut product = sample_product();

        product.update_stock(10, StockUpdateMode::Add).unwrap();
        assert_eq!((product.quantity_in_stock, product.total_stocked_quantity), (10, 10));

        product.update_stock(15, StockUpdateMode::Subtract).unwrap();
        assert_eq!((product.quantity_in_stock, product.total_stocked_quantity), (0, 10));

        // Set não mexe no total recebido
        product.update_stock(4, StockUpdateMode::Set).unwrap();
        assert_eq!((product.quantity_in_stock, product.total_stocked_quantity), (4, 10));

        assert!(product.update_stock(-1, StockUpdateMode::Add).is_err());
    }

    #[test]
    fn stock_that_would_overflow_is_rejected_without_changes() {
        let mut product = sample_product();
        product.add_initial_stock(i32::MAX - 5).unwrap();
        let before = (product.quantity_in_stock, product.total_stocked_quantity);

        assert!(matches!(product.add_initial_stock(10), Err(AppError::ValidationError(_))));
        assert!(matches!(
            product.update_stock(10, StockUpdateMode::Add),
            Err(AppError::ValidationError(_))
        ));
        assert!(product.restore_stock(10).is_err());
        assert_eq!((product.quantity_in_stock, product.total_stocked_quantity), before);
    }

    #[test]
    fn restored_stock_does_not_count_as_received() {
        let mut product = sample_product();
        product.add_initial_stock(10).unwrap();
        product.update_stock(4, StockUpdateMode::Subtract).unwrap();

        product.restore_stock(4).unwrap();
        assert_eq!((product.quantity_in_stock, product.total_stocked_quantity), (10, 10));
    }

    #[test]
    fn quantities_above_the_ceiling_fail_payload_validation() {
        let mut input = new_product_input(ProductCategory::Electronics);
        input.quantity_in_stock = 100_000_001;
        assert!(input.validate().is_err());

        input.quantity_in_stock = 100_000_000;
        assert!(input.validate().is_ok());
    }

    #[test]
    fn record_sale_checks_quantity_and_stock() {
        let mut product = sample_product();
        product.add_initial_stock(3).unwrap();

        assert!(matches!(product.record_sale(0), Err(AppError::ValidationError(_))));
        assert!(matches!(
            product.record_sale(4),
            Err(AppError::InsufficientStock { requested: 4, available: 3 })
        ));
        assert_eq!(product.quantity_in_stock, 3);

        product.record_sale(3).unwrap();
        assert_eq!(product.quantity_in_stock, 0);
        assert_eq!(product.sold_quantity, 3);
    }

    #[test]
    fn adjust_prices_without_arguments_is_a_no_op() {
        let mut product = sample_product();
        let before = (product.cost_price, product.selling_price);

        product.adjust_prices(None, None).unwrap();
        assert_eq!((product.cost_price, product.selling_price), before);

        product.adjust_prices(None, Some(dec!(1800))).unwrap();
        assert_eq!(product.cost_price, before.0);
        assert_eq!(product.selling_price, dec!(1800));

        assert!(product.adjust_prices(Some(dec!(-5)), Some(dec!(10))).is_err());
        assert_eq!(product.selling_price, dec!(1800));
    }

    #[test]
    fn changing_category_resets_details() {
        let mut product = sample_product();
        product.category_details = CategoryDetails::Electronics(ElectronicsDetails {
            brand: Some("Acme".into()),
            ..Default::default()
        });

        product.change_category(ProductCategory::Electronics, None).unwrap();
        assert_ne!(product.category_details, CategoryDetails::empty(ProductCategory::Electronics));

        product.change_category(ProductCategory::Books, None).unwrap();
        assert_eq!(product.category_details, CategoryDetails::empty(ProductCategory::Books));
    }

    #[test]
    fn apply_update_with_details_only_switches_category() {
        let mut product = sample_product();
        let update = ProductUpdate {
            category_details: Some(CategoryDetails::empty(ProductCategory::Sports)),
            reorder_level: Some(12),
            ..Default::default()
        };

        product.apply_update(update).unwrap();
        assert_eq!(product.category(), ProductCategory::Sports);
        assert_eq!(product.reorder_level, 12);
    }

    #[test]
    fn margin_math() {
        let product = sample_product();
        assert_eq!(ProductMetrics::of(&product).profit_margin, dec!(50));

        let mut free = sample_product();
        free.cost_price = Decimal::ZERO;
        assert_eq!(ProductMetrics::of(&free).profit_margin, Decimal::ZERO);
    }

    #[test]
    fn metrics_follow_counters() {
        let mut product = sample_product();
        product.add_initial_stock(10).unwrap();
        product.record_sale(4).unwrap();

        let metrics = ProductMetrics::of(&product);
        assert_eq!(metrics.stock_value, dec!(6000));
        assert_eq!(metrics.selling_value, dec!(9000));
        assert_eq!(metrics.total_revenue, dec!(6000));
        assert_eq!(metrics.total_profit, dec!(2000));
        assert_eq!(metrics.roi, dec!(50));
        assert_eq!(metrics.turnover_rate, dec!(40));
        assert_eq!(metrics.stock_status, StockStatus::InStock);
    }

    #[test]
    fn low_stock_projection() {
        let mut product = sample_product();
        product.update_stock(2, StockUpdateMode::Set).unwrap();

        assert!(product.is_low_stock());
        assert_eq!(product.stock_status(), StockStatus::LowStock);

        product.update_stock(0, StockUpdateMode::Set).unwrap();
        assert_eq!(product.stock_status(), StockStatus::OutOfStock);
    }

    #[test]
    fn view_prefers_active_batch_prices() {
        let product = sample_product();
        let active = ActiveBatchPricing {
            product_id: product.id,
            batch_id: Uuid::new_v4(),
            batch_code: "ELE-250101-AB12-B001".into(),
            cost_price: dec!(900),
            selling_price: dec!(1400),
        };

        let view = ProductView::new(product.clone(), Some(&active));
        assert_eq!(view.current_selling_price, dec!(1400));
        assert!(view.batch_pricing.has_active_batch);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["batchPricing"]["activeBatchCode"], "ELE-250101-AB12-B001");
        assert_eq!(json["productName"], "Fone Bluetooth");
        assert_eq!(json["category"], "Electronics");

        let plain = ProductView::new(product, None);
        assert_eq!(plain.current_selling_price, dec!(1500));
        assert!(!plain.batch_pricing.has_active_batch);
    }

    #[derive(Debug, Clone)]
    enum StockOp {
        Add(i32),
        Initial(i32),
        Sale(i32),
        Subtract(i32),
    }

    fn stock_op() -> impl Strategy<Value = StockOp> {
        prop_oneof![
            (0..50i32).prop_map(StockOp::Add),
            (1..50i32).prop_map(StockOp::Initial),
            (1..60i32).prop_map(StockOp::Sale),
            (0..60i32).prop_map(StockOp::Subtract),
        ]
    }

    proptest! {
        #[test]
        fn totals_never_fall_below_stock_plus_sold(ops in prop::collection::vec(stock_op(), 0..40)) {
            let mut product = sample_product();
            for op in ops {
                let _ = match op {
                    StockOp::Add(q) => product.update_stock(q, StockUpdateMode::Add),
                    StockOp::Initial(q) => product.add_initial_stock(q),
                    StockOp::Sale(q) => product.record_sale(q),
                    StockOp::Subtract(q) => product.update_stock(q, StockUpdateMode::Subtract),
                };
                prop_assert!(product.quantity_in_stock >= 0);
                prop_assert!(
                    product.total_stocked_quantity >= product.quantity_in_stock + product.sold_quantity
                );
            }
        }

        #[test]
        fn sale_never_exceeds_stock(stock in 0..100i32, sale in 1..200i32) {
            let mut product = sample_product();
            if stock > 0 {
                product.add_initial_stock(stock).unwrap();
            }
            let result = product.record_sale(sale);
            if sale > stock {
                prop_assert!(result.is_err());
                prop_assert_eq!(product.quantity_in_stock, stock);
            } else {
                prop_assert!(result.is_ok());
                prop_assert_eq!(product.quantity_in_stock, stock - sale);
            }
        }
    }
}
