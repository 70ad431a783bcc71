// src/models/category.rs

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

// --- 1. Categoria do Produto ---
// Mapeia o CREATE TYPE product_category do banco.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash, ToSchema)]
#[sqlx(type_name = "product_category")]
pub enum ProductCategory {
    Clothing,
    Shoes,
    Accessories,
    Perfume,
    Food,
    Beverages,
    Electronics,
    Books,
    #[serde(rename = "Home & Garden")]
    #[sqlx(rename = "Home & Garden")]
    HomeGarden,
    Sports,
    Automotive,
    #[serde(rename = "Health & Beauty")]
    #[sqlx(rename = "Health & Beauty")]
    HealthBeauty,
}

impl ProductCategory {
    pub const ALL: [ProductCategory; 12] = [
        ProductCategory::Clothing,
        ProductCategory::Shoes,
        ProductCategory::Accessories,
        ProductCategory::Perfume,
        ProductCategory::Food,
        ProductCategory::Beverages,
        ProductCategory::Electronics,
        ProductCategory::Books,
        ProductCategory::HomeGarden,
        ProductCategory::Sports,
        ProductCategory::Automotive,
        ProductCategory::HealthBeauty,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductCategory::Clothing => "Clothing",
            ProductCategory::Shoes => "Shoes",
            ProductCategory::Accessories => "Accessories",
            ProductCategory::Perfume => "Perfume",
            ProductCategory::Food => "Food",
            ProductCategory::Beverages => "Beverages",
            ProductCategory::Electronics => "Electronics",
            ProductCategory::Books => "Books",
            ProductCategory::HomeGarden => "Home & Garden",
            ProductCategory::Sports => "Sports",
            ProductCategory::Automotive => "Automotive",
            ProductCategory::HealthBeauty => "Health & Beauty",
        }
    }

    /// Prefixo do SKU: as três primeiras letras do nome, em maiúsculas ("Electronics" -> "ELE").
    pub fn sku_prefix(&self) -> String {
        self.as_str()
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .take(3)
            .collect::<String>()
            .to_ascii_uppercase()
    }
}

impl fmt::Display for ProductCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- 2. Atributos enumerados compartilhados ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub enum Gender {
    Men,
    Women,
    Unisex,
    Kids,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub enum ApparelSize {
    XS,
    S,
    M,
    L,
    XL,
    XXL,
    XXXL,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub enum Season {
    Spring,
    Summer,
    Autumn,
    Winter,
    #[serde(rename = "All Season")]
    AllSeason,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub enum ShoeType {
    Sneakers,
    Boots,
    Sandals,
    Formal,
    Sports,
    Slippers,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub enum AccessoryType {
    Bag,
    Belt,
    Jewelry,
    Watch,
    Sunglasses,
    Hat,
    Wallet,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub enum PerfumeConcentration {
    Parfum,
    #[serde(rename = "EDP")]
    EauDeParfum,
    #[serde(rename = "EDT")]
    EauDeToilette,
    #[serde(rename = "EDC")]
    EauDeCologne,
    #[serde(rename = "Body Mist")]
    BodyMist,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub enum FragranceFamily {
    Floral,
    Woody,
    Oriental,
    Fresh,
    Citrus,
    Gourmand,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub enum StorageCondition {
    Ambient,
    Refrigerated,
    Frozen,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub enum BeveragePackaging {
    Bottle,
    Can,
    Carton,
    Pouch,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub enum PowerSource {
    Battery,
    Mains,
    #[serde(rename = "USB")]
    Usb,
    Solar,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub enum ItemCondition {
    New,
    Refurbished,
    Used,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub enum BookFormat {
    Hardcover,
    Paperback,
    #[serde(rename = "E-book")]
    Ebook,
    Audiobook,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub enum Room {
    #[serde(rename = "Living Room")]
    LivingRoom,
    Bedroom,
    Kitchen,
    Bathroom,
    Garden,
    Office,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub enum SkillLevel {
    Beginner,
    Intermediate,
    Advanced,
    Professional,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub enum SkinType {
    Normal,
    Dry,
    Oily,
    Combination,
    Sensitive,
}

// --- 3. Detalhes por categoria ---
// Todos os atributos são opcionais: "sem detalhes" é o struct vazio da categoria ativa.

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ClothingDetails {
    pub size: Option<ApparelSize>,
    pub color: Option<String>,
    pub material: Option<String>,
    pub gender: Option<Gender>,
    pub season: Option<Season>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ShoesDetails {
    pub size: Option<String>,
    pub color: Option<String>,
    pub material: Option<String>,
    pub gender: Option<Gender>,
    pub shoe_type: Option<ShoeType>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessoriesDetails {
    pub accessory_type: Option<AccessoryType>,
    pub material: Option<String>,
    pub color: Option<String>,
    pub gender: Option<Gender>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct PerfumeDetails {
    pub volume_ml: Option<u32>,
    pub concentration: Option<PerfumeConcentration>,
    pub fragrance_family: Option<FragranceFamily>,
    pub gender: Option<Gender>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct FoodDetails {
    pub weight_grams: Option<u32>,
    pub expiry_date: Option<NaiveDate>,
    pub is_organic: Option<bool>,
    pub storage: Option<StorageCondition>,
    pub allergens: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct BeveragesDetails {
    pub volume_ml: Option<u32>,
    pub is_alcoholic: Option<bool>,
    pub alcohol_percentage: Option<f32>,
    pub packaging: Option<BeveragePackaging>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ElectronicsDetails {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub warranty_months: Option<u32>,
    pub power_source: Option<PowerSource>,
    pub condition: Option<ItemCondition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct BooksDetails {
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub isbn: Option<String>,
    pub format: Option<BookFormat>,
    pub language: Option<String>,
    pub pages: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct HomeGardenDetails {
    pub material: Option<String>,
    pub color: Option<String>,
    pub room: Option<Room>,
    pub dimensions: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct SportsDetails {
    pub sport: Option<String>,
    pub size: Option<String>,
    pub material: Option<String>,
    pub skill_level: Option<SkillLevel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct AutomotiveDetails {
    pub brand: Option<String>,
    pub part_number: Option<String>,
    pub compatible_vehicles: Vec<String>,
    pub condition: Option<ItemCondition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthBeautyDetails {
    pub skin_type: Option<SkinType>,
    pub volume_ml: Option<u32>,
    pub ingredients: Vec<String>,
    pub is_vegan: Option<bool>,
}

/// Detalhes específicos da categoria. Só a variante da categoria ativa existe,
/// então não há "sub-registros irmãos" para limpar quando a categoria muda.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "category")]
pub enum CategoryDetails {
    Clothing(ClothingDetails),
    Shoes(ShoesDetails),
    Accessories(AccessoriesDetails),
    Perfume(PerfumeDetails),
    Food(FoodDetails),
    Beverages(BeveragesDetails),
    Electronics(ElectronicsDetails),
    Books(BooksDetails),
    #[serde(rename = "Home & Garden")]
    HomeGarden(HomeGardenDetails),
    Sports(SportsDetails),
    Automotive(AutomotiveDetails),
    #[serde(rename = "Health & Beauty")]
    HealthBeauty(HealthBeautyDetails),
}

impl CategoryDetails {
    /// Detalhes vazios para a categoria informada.
    pub fn empty(category: ProductCategory) -> Self {
        match category {
            ProductCategory::Clothing => CategoryDetails::Clothing(Default::default()),
            ProductCategory::Shoes => CategoryDetails::Shoes(Default::default()),
            ProductCategory::Accessories => CategoryDetails::Accessories(Default::default()),
            ProductCategory::Perfume => CategoryDetails::Perfume(Default::default()),
            ProductCategory::Food => CategoryDetails::Food(Default::default()),
            ProductCategory::Beverages => CategoryDetails::Beverages(Default::default()),
            ProductCategory::Electronics => CategoryDetails::Electronics(Default::default()),
            ProductCategory::Books => CategoryDetails::Books(Default::default()),
            ProductCategory::HomeGarden => CategoryDetails::HomeGarden(Default::default()),
            ProductCategory::Sports => CategoryDetails::Sports(Default::default()),
            ProductCategory::Automotive => CategoryDetails::Automotive(Default::default()),
            ProductCategory::HealthBeauty => CategoryDetails::HealthBeauty(Default::default()),
        }
    }

    pub fn category(&self) -> ProductCategory {
        match self {
            CategoryDetails::Clothing(_) => ProductCategory::Clothing,
            CategoryDetails::Shoes(_) => ProductCategory::Shoes,
            CategoryDetails::Accessories(_) => ProductCategory::Accessories,
            CategoryDetails::Perfume(_) => ProductCategory::Perfume,
            CategoryDetails::Food(_) => ProductCategory::Food,
            CategoryDetails::Beverages(_) => ProductCategory::Beverages,
            CategoryDetails::Electronics(_) => ProductCategory::Electronics,
            CategoryDetails::Books(_) => ProductCategory::Books,
            CategoryDetails::HomeGarden(_) => ProductCategory::HomeGarden,
            CategoryDetails::Sports(_) => ProductCategory::Sports,
            CategoryDetails::Automotive(_) => ProductCategory::Automotive,
            CategoryDetails::HealthBeauty(_) => ProductCategory::HealthBeauty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sku_prefix_uses_first_three_letters() {
        assert_eq!(ProductCategory::Electronics.sku_prefix(), "ELE");
        assert_eq!(ProductCategory::HomeGarden.sku_prefix(), "HOM");
        assert_eq!(ProductCategory::HealthBeauty.sku_prefix(), "HEA");
    }

    #[test]
    fn empty_details_match_every_category() {
        for category in ProductCategory::ALL {
            assert_eq!(CategoryDetails::empty(category).category(), category);
        }
    }

    #[test]
    fn details_are_tagged_by_category_name() {
        let details = CategoryDetails::Electronics(ElectronicsDetails {
            brand: Some("Acme".into()),
            warranty_months: Some(12),
            ..Default::default()
        });

        let value = serde_json::to_value(&details).unwrap();
        assert_eq!(value["category"], "Electronics");
        assert_eq!(value["brand"], "Acme");
        assert_eq!(value["warrantyMonths"], 12);

        let parsed: CategoryDetails =
            serde_json::from_value(json!({ "category": "Home & Garden", "room": "Living Room" }))
                .unwrap();
        assert_eq!(parsed.category(), ProductCategory::HomeGarden);
    }

    #[test]
    fn missing_attributes_default_to_empty() {
        let parsed: CategoryDetails = serde_json::from_value(json!({ "category": "Food" })).unwrap();
        assert_eq!(parsed, CategoryDetails::empty(ProductCategory::Food));
    }
}
