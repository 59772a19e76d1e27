//! Price fetch stage
//!
//! Deduplicates the requested ids, partitions them into fixed-size batches
//! and prices each batch with a single signed request. A shared semaphore
//! bounds the number of simultaneous in-flight batch requests - the only
//! explicitly bounded concurrency point in the system. Batch results merge
//! into one mutex-guarded map keyed by the id the server asserts for each
//! record, not the id that was requested.

use std::collections::{HashMap, HashSet};

use futures::future::join_all;
use tokio::sync::{Mutex, Semaphore};
use tracing::{info, warn};

use crate::catalog::api::CatalogApi;
use crate::domain::PriceRecord;
use crate::infrastructure::http_client::FetchOutcome;

/// Fetches prices for the given product ids.
///
/// Ids in a batch that ultimately fails receive no price record; the
/// combine stage retains their products with zeroed prices.
pub async fn fetch_prices(
    api: &dyn CatalogApi,
    product_ids: &[i64],
    batch_size: usize,
    max_concurrent_requests: usize,
) -> HashMap<i64, PriceRecord> {
    let unique_offers = dedupe(product_ids);

    let semaphore = Semaphore::new(max_concurrent_requests.max(1));
    let prices: Mutex<HashMap<i64, PriceRecord>> = Mutex::new(HashMap::new());

    let batch_fetches = unique_offers
        .chunks(batch_size.max(1))
        .map(|batch| fetch_price_batch(api, batch, &semaphore, &prices));
    join_all(batch_fetches).await;

    let prices = prices.into_inner();
    info!("Fetched prices for {} products.", prices.len());
    prices
}

/// Prices one batch under the shared concurrency permit.
async fn fetch_price_batch(
    api: &dyn CatalogApi,
    batch_ids: &[i64],
    semaphore: &Semaphore,
    prices: &Mutex<HashMap<i64, PriceRecord>>,
) {
    let Ok(_permit) = semaphore.acquire().await else {
        // The semaphore lives for the whole call; closure is unreachable.
        return;
    };

    match api.price_batch(batch_ids).await {
        FetchOutcome::Success(entries) => {
            let mut merged = prices.lock().await;
            for entry in entries {
                // The server keys records by its active offer id, which may
                // not be one of the ids we asked for; the asserted id wins.
                let Some(active_offer_id) = entry.active_offer_id else {
                    continue;
                };
                let Some(variant) = entry.variants.first() else {
                    continue;
                };
                merged.insert(
                    active_offer_id,
                    PriceRecord {
                        regular_price: variant.price.old,
                        promo_price: variant.price.actual,
                    },
                );
                info!("Prices for product ID {active_offer_id}");
            }
        }
        FetchOutcome::Degraded(reason) => {
            warn!("Error fetching prices for batch {batch_ids:?}: {reason}");
        }
    }
}

/// First-seen-order deduplication.
fn dedupe(ids: &[i64]) -> Vec<i64> {
    let mut seen = HashSet::new();
    ids.iter()
        .copied()
        .filter(|id| seen.insert(*id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::schema::{
        CategoryNode, City, PriceEntry, PricePair, PriceVariant, ProductListData,
    };
    use crate::infrastructure::http_client::DegradeReason;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Records every requested batch and tracks peak concurrency.
    struct RecordingApi {
        batches: Mutex<Vec<Vec<i64>>>,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
        /// Extra entry returned on every batch, for foreign-id scenarios.
        extra_entry: Option<PriceEntry>,
        fail_batches_containing: Option<i64>,
    }

    impl RecordingApi {
        fn new() -> Self {
            Self {
                batches: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                peak_in_flight: AtomicUsize::new(0),
                extra_entry: None,
                fail_batches_containing: None,
            }
        }

        fn entry(id: i64, old: i64, actual: i64) -> PriceEntry {
            PriceEntry {
                active_offer_id: Some(id),
                variants: vec![PriceVariant {
                    price: PricePair { old, actual },
                }],
            }
        }
    }

    #[async_trait]
    impl CatalogApi for RecordingApi {
        async fn city_list(&self) -> FetchOutcome<Vec<City>> {
            unimplemented!("not used by the price fetch stage")
        }

        async fn category_tree(&self, _city_id: &str) -> FetchOutcome<Vec<CategoryNode>> {
            unimplemented!("not used by the price fetch stage")
        }

        async fn product_page(
            &self,
            _category_id: &str,
            _city_id: &str,
            _count: u64,
            _page: u32,
        ) -> FetchOutcome<ProductListData> {
            unimplemented!("not used by the price fetch stage")
        }

        async fn price_batch(&self, ids: &[i64]) -> FetchOutcome<Vec<PriceEntry>> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.batches.lock().await.push(ids.to_vec());

            if let Some(poison) = self.fail_batches_containing {
                if ids.contains(&poison) {
                    return FetchOutcome::Degraded(DegradeReason::Status { status: 502 });
                }
            }

            let mut entries: Vec<PriceEntry> =
                ids.iter().map(|id| Self::entry(*id, 1000, 900)).collect();
            if let Some(extra) = &self.extra_entry {
                entries.push(extra.clone());
            }
            FetchOutcome::Success(entries)
        }
    }

    #[tokio::test]
    async fn partitions_into_expected_batches() {
        // 450 distinct ids with a batch size of 200 -> exactly 3 batches.
        let api = RecordingApi::new();
        let ids: Vec<i64> = (1..=450).collect();

        let prices = fetch_prices(&api, &ids, 200, 5).await;

        let batches = api.batches.lock().await;
        let mut sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        sizes.sort_unstable();
        assert_eq!(*sizes, [50, 200, 200]);
        assert_eq!(prices.len(), 450);
    }

    #[tokio::test]
    async fn duplicate_ids_are_requested_once() {
        let api = RecordingApi::new();
        let ids = [7, 7, 8, 8, 8, 9];

        fetch_prices(&api, &ids, 200, 5).await;

        let batches = api.batches.lock().await;
        let requested: Vec<i64> = batches.iter().flatten().copied().collect();
        assert_eq!(requested.len(), 3);
        assert!(requested.contains(&7) && requested.contains(&8) && requested.contains(&9));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn in_flight_batches_never_exceed_bound() {
        let api = RecordingApi::new();
        let ids: Vec<i64> = (1..=100).collect();

        fetch_prices(&api, &ids, 10, 2).await;

        assert_eq!(api.batches.lock().await.len(), 10);
        assert!(api.peak_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn server_asserted_id_wins_over_requested() {
        // A record keyed by an id we never asked for becomes a new key.
        let mut api = RecordingApi::new();
        api.extra_entry = Some(RecordingApi::entry(99999, 500, 450));
        let ids = [1, 2, 3];

        let prices = fetch_prices(&api, &ids, 200, 5).await;

        assert_eq!(prices.len(), 4);
        assert_eq!(
            prices.get(&99999),
            Some(&PriceRecord {
                regular_price: 500,
                promo_price: 450
            })
        );
    }

    #[tokio::test]
    async fn failed_batch_is_dropped_silently() {
        let mut api = RecordingApi::new();
        api.fail_batches_containing = Some(5);
        let ids: Vec<i64> = (1..=20).collect();

        let prices = fetch_prices(&api, &ids, 10, 5).await;

        // The poisoned batch covers ids 1..=10; the other half is priced.
        assert_eq!(prices.len(), 10);
        assert!(!prices.contains_key(&5));
        assert!(prices.contains_key(&15));
    }

    #[tokio::test]
    async fn entries_without_offer_id_are_skipped() {
        let mut api = RecordingApi::new();
        api.extra_entry = Some(PriceEntry {
            active_offer_id: None,
            variants: vec![PriceVariant {
                price: PricePair { old: 1, actual: 1 },
            }],
        });
        let prices = fetch_prices(&api, &[1], 200, 5).await;
        assert_eq!(prices.len(), 1);
    }
}
