//! Core pipeline entities
//!
//! A `Product` is created bare by the catalog fetch stage, mutated exactly
//! once by the combine stage and immutable afterwards. Price fields stay at
//! zero until priced; a product with no matching price record keeps them at
//! zero and is still present in the output.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Product record as it travels through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub link: String,
    pub regular_price: i64,
    pub promo_price: i64,
    pub brand: String,
}

impl Default for Product {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            link: String::new(),
            regular_price: 0,
            promo_price: 0,
            brand: "Unknown".to_string(),
        }
    }
}

impl Product {
    /// Creates a bare (unpriced) product from listing data.
    #[must_use]
    pub fn new(id: i64, name: String, link: String, brand: Option<String>) -> Self {
        Self {
            id,
            name,
            link,
            brand: brand.unwrap_or_else(|| "Unknown".to_string()),
            ..Self::default()
        }
    }
}

/// Regular/promo price pair for one product id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub regular_price: i64,
    pub promo_price: i64,
}

/// Unique identifier for one pipeline run.
///
/// The queue layer delivers at-least-once, so every stage handler dedupes
/// on this id before doing any work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parameters identifying one pipeline run.
///
/// `city_id` and `category_id` double as the routing-key components for
/// every stage of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRequest {
    pub request_id: RequestId,
    pub category_id: String,
    pub city_id: String,
    pub min_goods: u64,
}

impl PipelineRequest {
    #[must_use]
    pub fn new(category_id: impl Into<String>, city_id: impl Into<String>, min_goods: u64) -> Self {
        Self {
            request_id: RequestId::new(),
            category_id: category_id.into(),
            city_id: city_id.into(),
            min_goods,
        }
    }
}

/// State machine for one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    FetchPending,
    PricePending,
    CombinePending,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FetchPending => "fetch_pending",
            Self::PricePending => "price_pending",
            Self::CombinePending => "combine_pending",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{name}")
    }
}
