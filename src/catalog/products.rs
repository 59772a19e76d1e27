//! Catalog fetch stage
//!
//! Probes page 1 for the pagination totals, applies the minimum-stock
//! policy gate, then fans out the remaining pages concurrently. The fan-out
//! across stock pages is deliberately unbounded; the page count for one
//! category stays small. A page that ultimately fails contributes an empty
//! slice - partial failure never aborts the whole fetch, and callers must
//! treat the output as a set, not a sequence.

use futures::future::join_all;
use tracing::{error, info, warn};

use crate::catalog::api::CatalogApi;
use crate::catalog::schema::GoodsItem;
use crate::domain::Product;
use crate::infrastructure::http_client::FetchOutcome;

/// Retrieves all available products for a category in a city.
///
/// Returns an empty list when the reported stock does not strictly exceed
/// `min_goods`.
pub async fn fetch_products(
    api: &dyn CatalogApi,
    category_id: &str,
    city_id: &str,
    min_goods: u64,
) -> Vec<Product> {
    let first_page = match api.product_page(category_id, city_id, min_goods, 1).await {
        FetchOutcome::Success(page) => page,
        FetchOutcome::Degraded(reason) => {
            error!("Invalid response structure: {reason}");
            return Vec::new();
        }
    };

    let total_pages = first_page.total_pages;
    info!("Total number of pages: {total_pages}");
    let total_items = first_page.total_items;
    info!("Total number of products: {total_items}");

    if total_items <= min_goods {
        info!("There are less than {min_goods} products available");
        return Vec::new();
    }

    let mut products = available_products(first_page.goods);

    let page_fetches = (2..=total_pages)
        .map(|page| fetch_page(api, category_id, city_id, min_goods, page));
    for page_products in join_all(page_fetches).await {
        products.extend(page_products);
    }

    info!("Total available products: {}", products.len());
    products
}

/// Fetches one page; a degraded page yields an empty slice.
async fn fetch_page(
    api: &dyn CatalogApi,
    category_id: &str,
    city_id: &str,
    count: u64,
    page: u32,
) -> Vec<Product> {
    info!("Fetching data from page {page}...");
    match api.product_page(category_id, city_id, count, page).await {
        FetchOutcome::Success(data) => {
            let products = available_products(data.goods);
            info!("Found {} products on page {page}.", products.len());
            products
        }
        FetchOutcome::Degraded(reason) => {
            warn!("No products found on page {page} or response format is incorrect: {reason}");
            Vec::new()
        }
    }
}

/// Keeps only items flagged as available.
fn available_products(goods: Vec<GoodsItem>) -> Vec<Product> {
    goods
        .into_iter()
        .filter(|item| item.is_available)
        .map(|item| Product::new(item.id, item.title, item.webpage, item.brand_name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::schema::{CategoryNode, City, PriceEntry, ProductListData};
    use crate::infrastructure::http_client::DegradeReason;
    use async_trait::async_trait;

    /// Serves a fixed set of pages; listed page numbers fail.
    struct PagedApi {
        pages: Vec<ProductListData>,
        failing_pages: Vec<u32>,
        total_items: u64,
    }

    impl PagedApi {
        fn new(per_page: usize, pages: u32, failing_pages: Vec<u32>) -> Self {
            let total_items = per_page as u64 * u64::from(pages);
            let pages = (1..=pages)
                .map(|page| ProductListData {
                    goods: (0..per_page)
                        .map(|i| GoodsItem {
                            id: i64::from(page) * 1000 + i as i64,
                            title: format!("product {page}-{i}"),
                            webpage: format!("/p/{page}/{i}"),
                            brand_name: None,
                            is_available: true,
                        })
                        .collect(),
                    total_pages: pages,
                    total_items,
                })
                .collect();
            Self {
                pages,
                failing_pages,
                total_items,
            }
        }
    }

    #[async_trait]
    impl CatalogApi for PagedApi {
        async fn city_list(&self) -> FetchOutcome<Vec<City>> {
            unimplemented!("not used by the catalog fetch stage")
        }

        async fn category_tree(&self, _city_id: &str) -> FetchOutcome<Vec<CategoryNode>> {
            unimplemented!("not used by the catalog fetch stage")
        }

        async fn product_page(
            &self,
            _category_id: &str,
            _city_id: &str,
            _count: u64,
            page: u32,
        ) -> FetchOutcome<ProductListData> {
            if self.failing_pages.contains(&page) {
                return FetchOutcome::Degraded(DegradeReason::Transport {
                    attempts: 3,
                    message: "connection reset".to_string(),
                });
            }
            FetchOutcome::Success(self.pages[(page - 1) as usize].clone())
        }

        async fn price_batch(&self, _ids: &[i64]) -> FetchOutcome<Vec<PriceEntry>> {
            unimplemented!("not used by the catalog fetch stage")
        }
    }

    #[tokio::test]
    async fn min_goods_gate_returns_empty() {
        // API reports 3 items in total, threshold is 5.
        let api = PagedApi {
            pages: vec![ProductListData {
                goods: Vec::new(),
                total_pages: 1,
                total_items: 3,
            }],
            failing_pages: Vec::new(),
            total_items: 3,
        };

        let products = fetch_products(&api, "dog-food", "moscow", 5).await;
        assert!(products.is_empty());
    }

    #[tokio::test]
    async fn equal_stock_is_not_enough() {
        let api = PagedApi::new(5, 1, Vec::new());
        assert_eq!(api.total_items, 5);
        let products = fetch_products(&api, "c", "m", 5).await;
        assert!(products.is_empty());
    }

    #[tokio::test]
    async fn all_pages_are_aggregated() {
        let api = PagedApi::new(10, 5, Vec::new());
        let products = fetch_products(&api, "c", "m", 5).await;
        assert_eq!(products.len(), 50);
    }

    #[tokio::test]
    async fn failed_page_contributes_empty_slice() {
        // One page of five fails after adapter retries; the remaining four
        // still make it into the aggregate and the call succeeds.
        let api = PagedApi::new(10, 5, vec![3]);
        let products = fetch_products(&api, "c", "m", 5).await;
        assert_eq!(products.len(), 40);
        assert!(products.iter().all(|p| p.id / 1000 != 3));
    }

    #[tokio::test]
    async fn unavailable_items_are_filtered() {
        let mut api = PagedApi::new(4, 1, Vec::new());
        api.pages[0].goods[0].is_available = false;
        api.pages[0].total_items = 100;
        let products = fetch_products(&api, "c", "m", 5).await;
        assert_eq!(products.len(), 3);
    }

    #[tokio::test]
    async fn unpriced_products_start_at_zero() {
        let api = PagedApi::new(2, 1, Vec::new());
        let products = fetch_products(&api, "c", "m", 1).await;
        assert!(products.iter().all(|p| p.regular_price == 0 && p.promo_price == 0));
    }
}
