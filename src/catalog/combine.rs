//! Combine stage
//!
//! Merges price records into product records. A product with no matching
//! price keeps its zeroed price fields and is retained - the output always
//! has exactly as many records as the input.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::domain::{PriceRecord, Product};

/// Applies the fetched prices to the product list.
#[must_use]
pub fn combine_product_and_prices(
    mut products: Vec<Product>,
    prices: &HashMap<i64, PriceRecord>,
) -> Vec<Product> {
    info!("Updating products with prices");

    for product in &mut products {
        match prices.get(&product.id) {
            Some(record) => {
                product.regular_price = record.regular_price;
                product.promo_price = record.promo_price;
            }
            None => {
                warn!("No price information found for product ID {}", product.id);
            }
        }
    }

    products
}
