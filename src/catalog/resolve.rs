//! City and category identifier resolution
//!
//! Case-insensitive lookups over the city list and the category tree. The
//! category tree is searched recursively; both lookups degrade to `None`
//! on malformed payloads.

use tracing::{error, info, warn};

use crate::catalog::api::CatalogApi;
use crate::catalog::schema::CategoryNode;
use crate::infrastructure::http_client::FetchOutcome;

/// Resolves a city name to its id, or `None` if the city is unknown.
pub async fn fetch_city_id(api: &dyn CatalogApi, city_name: &str) -> Option<String> {
    match api.city_list().await {
        FetchOutcome::Success(cities) => {
            let needle = city_name.to_lowercase();
            cities
                .iter()
                .find(|city| city.title.to_lowercase() == needle)
                .map(|city| city.id.clone())
        }
        FetchOutcome::Degraded(reason) => {
            error!("City list request failed: {reason}");
            None
        }
    }
}

/// Recursive search for a category id by name.
pub fn find_category_id(categories: &[CategoryNode], category_name: &str) -> Option<String> {
    let needle = category_name.to_lowercase();
    for category in categories {
        if category.title.to_lowercase() == needle {
            return Some(category.id.clone());
        }

        if category.has_child && !category.child.is_empty() {
            if let Some(id) = find_category_id(&category.child, category_name) {
                return Some(id);
            }
        }
    }

    None
}

/// Resolves a category name to its id within the given city's tree.
pub async fn fetch_category_id(
    api: &dyn CatalogApi,
    category_name: &str,
    city_id: &str,
) -> Option<String> {
    match api.category_tree(city_id).await {
        FetchOutcome::Success(categories) => {
            let category_id = find_category_id(&categories, category_name);
            match &category_id {
                Some(id) => info!("Found category '{category_name}' with ID: {id}"),
                None => warn!("Category '{category_name}' not found."),
            }
            category_id
        }
        FetchOutcome::Degraded(reason) => {
            error!("Invalid category response: {reason}");
            None
        }
    }
}
