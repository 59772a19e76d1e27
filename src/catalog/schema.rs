//! Typed schemas for remote API payloads
//!
//! Every response is deserialized at the boundary; a shape mismatch becomes
//! a typed parse error that the calling stage degrades on, instead of ad hoc
//! key-presence checks spread through the stages.

use serde::Deserialize;

/// Standard `{"data": ...}` wrapper on every API payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    pub data: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CityListData {
    #[serde(default)]
    pub cities: Vec<City>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct City {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryListData {
    #[serde(default)]
    pub categories: Vec<CategoryNode>,
}

/// Node of the category tree. `child` is only populated when `has_child`
/// is set; the traversal checks both.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryNode {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub has_child: bool,
    #[serde(default)]
    pub child: Vec<CategoryNode>,
}

/// One page of the paginated product list.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductListData {
    #[serde(default)]
    pub goods: Vec<GoodsItem>,
    #[serde(default = "default_total_pages")]
    pub total_pages: u32,
    #[serde(default)]
    pub total_items: u64,
}

fn default_total_pages() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoodsItem {
    pub id: i64,
    pub title: String,
    pub webpage: String,
    #[serde(default)]
    pub brand_name: Option<String>,
    #[serde(rename = "isAvailable", default)]
    pub is_available: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceInfoData {
    #[serde(default)]
    pub products: Vec<PriceEntry>,
}

/// Price entry keyed by the id the server asserts, which is not guaranteed
/// to be one of the requested ids.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceEntry {
    #[serde(default)]
    pub active_offer_id: Option<i64>,
    #[serde(default)]
    pub variants: Vec<PriceVariant>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceVariant {
    pub price: PricePair,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PricePair {
    pub old: i64,
    pub actual: i64,
}
