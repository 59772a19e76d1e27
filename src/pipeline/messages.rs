//! Typed stage messages
//!
//! One message type per hop of the chain. The return value of stage N is
//! embedded as the first payload of stage N+1's message; `city_id` and
//! `category_id` ride along explicitly at every hop so the routing key can
//! be recomputed without digging into the payload.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::{PriceRecord, Product, RequestId};

/// Stages of the pipeline, named after their queue lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    FetchProducts,
    FetchPrices,
    CombineProducts,
    SaveProducts,
}

impl Stage {
    /// Lane name; doubles as the routing-key prefix.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::FetchProducts => "fetch.products",
            Self::FetchPrices => "fetch.prices",
            Self::CombineProducts => "combine.products",
            Self::SaveProducts => "save.products",
        }
    }
}

/// A unit of work on the fetch -> price -> combine chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMessage {
    FetchProducts {
        request_id: RequestId,
        category_id: String,
        city_id: String,
        min_goods: u64,
    },
    FetchPrices {
        request_id: RequestId,
        category_id: String,
        city_id: String,
        products: Vec<Product>,
    },
    CombineProducts {
        request_id: RequestId,
        category_id: String,
        city_id: String,
        products: Vec<Product>,
        prices: HashMap<i64, PriceRecord>,
    },
}

impl StageMessage {
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        match self {
            Self::FetchProducts { request_id, .. }
            | Self::FetchPrices { request_id, .. }
            | Self::CombineProducts { request_id, .. } => *request_id,
        }
    }

    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self {
            Self::FetchProducts { .. } => Stage::FetchProducts,
            Self::FetchPrices { .. } => Stage::FetchPrices,
            Self::CombineProducts { .. } => Stage::CombineProducts,
        }
    }

    /// Routing key `"<stage>.<city_id>.<category_id>"`, isolating runs for
    /// distinct city/category pairs onto distinct logical lanes.
    #[must_use]
    pub fn routing_key(&self) -> String {
        let (city_id, category_id) = match self {
            Self::FetchProducts {
                city_id,
                category_id,
                ..
            }
            | Self::FetchPrices {
                city_id,
                category_id,
                ..
            }
            | Self::CombineProducts {
                city_id,
                category_id,
                ..
            } => (city_id, category_id),
        };
        format!("{}.{city_id}.{category_id}", self.stage().name())
    }
}

/// Persistence unit of work; directly routed, single global lane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveMessage {
    pub request_id: RequestId,
    pub products: Vec<Product>,
    pub path: PathBuf,
}

impl SaveMessage {
    #[must_use]
    pub const fn routing_key() -> &'static str {
        Stage::SaveProducts.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_key_embeds_city_and_category() {
        let message = StageMessage::FetchProducts {
            request_id: RequestId::new(),
            category_id: "4727".to_string(),
            city_id: "0000073738".to_string(),
            min_goods: 5,
        };
        assert_eq!(message.routing_key(), "fetch.products.0000073738.4727");
    }

    #[test]
    fn stage_follows_message_variant() {
        let message = StageMessage::FetchPrices {
            request_id: RequestId::new(),
            category_id: "1".to_string(),
            city_id: "2".to_string(),
            products: Vec::new(),
        };
        assert_eq!(message.stage(), Stage::FetchPrices);
        assert_eq!(message.routing_key(), "fetch.prices.2.1");
    }

    #[test]
    fn save_lane_is_global() {
        assert_eq!(SaveMessage::routing_key(), "save.products");
    }
}
