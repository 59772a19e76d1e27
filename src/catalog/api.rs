//! Remote catalog API client
//!
//! [`CatalogApi`] is the seam between the pipeline stages and the network;
//! the stages and their tests only ever see this trait. [`HttpCatalogApi`]
//! is the production implementation: it obtains a session token per call,
//! signs the parameters and validates the payload into the typed schemas.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::catalog::schema::{
    ApiEnvelope, CategoryListData, CategoryNode, City, CityListData, PriceEntry, PriceInfoData,
    ProductListData,
};
use crate::infrastructure::auth;
use crate::infrastructure::config::ApiConfig;
use crate::infrastructure::http_client::{DegradeReason, FetchOutcome, HttpClient};
use crate::infrastructure::signing;

/// Narrow contract over the remote catalog endpoints.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn city_list(&self) -> FetchOutcome<Vec<City>>;

    async fn category_tree(&self, city_id: &str) -> FetchOutcome<Vec<CategoryNode>>;

    async fn product_page(
        &self,
        category_id: &str,
        city_id: &str,
        count: u64,
        page: u32,
    ) -> FetchOutcome<ProductListData>;

    async fn price_batch(&self, ids: &[i64]) -> FetchOutcome<Vec<PriceEntry>>;
}

/// Production client for the retailer's mobile API.
pub struct HttpCatalogApi {
    http: HttpClient,
    config: ApiConfig,
}

impl HttpCatalogApi {
    #[must_use]
    pub fn new(http: HttpClient, config: ApiConfig) -> Self {
        Self { http, config }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    async fn token(&self) -> Option<String> {
        auth::obtain_token(&self.http, &self.config).await
    }

    /// Signature over the values of the present parameters.
    fn sign_params(&self, params: &[(&str, Option<String>)]) -> String {
        signing::sign(
            &self.config.sign_salt,
            params.iter().filter_map(|(_, value)| value.as_deref()),
        )
    }

    /// The API scopes catalog queries to a city through a cookie.
    fn city_headers(city_id: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        match HeaderValue::from_str(&format!("selected_city_code={city_id}")) {
            Ok(value) => {
                headers.insert(COOKIE, value);
            }
            Err(_) => warn!("City id {city_id} is not a valid cookie value"),
        }
        headers
    }
}

/// Unwraps the `data` envelope into the expected schema.
fn parse_data<T: DeserializeOwned>(value: Value) -> FetchOutcome<T> {
    match serde_json::from_value::<ApiEnvelope<T>>(value) {
        Ok(ApiEnvelope { data: Some(data) }) => FetchOutcome::Success(data),
        Ok(ApiEnvelope { data: None }) => FetchOutcome::Degraded(DegradeReason::Malformed {
            message: "'data' key not found".to_string(),
        }),
        Err(e) => FetchOutcome::Degraded(DegradeReason::Malformed {
            message: e.to_string(),
        }),
    }
}

#[async_trait]
impl CatalogApi for HttpCatalogApi {
    async fn city_list(&self) -> FetchOutcome<Vec<City>> {
        let token = self.token().await;
        let mut params = vec![("token", token)];
        let sign = self.sign_params(&params);
        params.push(("sign", Some(sign)));

        self.http
            .request_json(
                Method::GET,
                &self.url("/city_list_users/"),
                &params,
                None,
                None,
            )
            .await
            .and_then(parse_data::<CityListData>)
            .map(|data| data.cities)
    }

    async fn category_tree(&self, city_id: &str) -> FetchOutcome<Vec<CategoryNode>> {
        let token = self.token().await;
        let mut params = vec![("token", token)];
        let sign = self.sign_params(&params);
        params.push(("sign", Some(sign)));

        self.http
            .request_json(
                Method::GET,
                &self.url("/categories/"),
                &params,
                Some(Self::city_headers(city_id)),
                None,
            )
            .await
            .and_then(parse_data::<CategoryListData>)
            .map(|data| data.categories)
    }

    async fn product_page(
        &self,
        category_id: &str,
        city_id: &str,
        count: u64,
        page: u32,
    ) -> FetchOutcome<ProductListData> {
        let token = self.token().await;
        // The signature covers the page number, so each page is signed anew.
        let mut params = vec![
            ("category_id", Some(category_id.to_string())),
            ("count", Some(count.to_string())),
            ("page", Some(page.to_string())),
            ("token", token),
        ];
        let sign = self.sign_params(&params);
        params.push(("sign", Some(sign)));

        self.http
            .request_json(
                Method::GET,
                &self.url("/v2/catalog/product/list/"),
                &params,
                Some(Self::city_headers(city_id)),
                None,
            )
            .await
            .and_then(parse_data::<ProductListData>)
    }

    async fn price_batch(&self, ids: &[i64]) -> FetchOutcome<Vec<PriceEntry>> {
        let token = self.token().await;
        let mut fields: Vec<(String, String)> = ids
            .iter()
            .enumerate()
            .map(|(j, id)| (format!("offers[{j}]"), id.to_string()))
            .collect();
        if let Some(token) = token {
            fields.push(("token".to_string(), token));
        }
        let sign = signing::sign(
            &self.config.sign_salt,
            fields.iter().map(|(_, value)| value.as_str()),
        );
        fields.push(("sign".to_string(), sign));

        self.http
            .request_json(
                Method::POST,
                &self.url("/v2/catalog/product/info-list/"),
                &[],
                None,
                Some(&fields),
            )
            .await
            .and_then(parse_data::<PriceInfoData>)
            .map(|data| data.products)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_data_surfaces_missing_envelope() {
        let outcome = parse_data::<CityListData>(json!({"status": "error"}));
        assert!(outcome.is_degraded());
    }

    #[test]
    fn parse_data_accepts_valid_envelope() {
        let outcome = parse_data::<CityListData>(json!({
            "data": {"cities": [{"id": "77", "title": "Moscow"}]}
        }));
        let cities = outcome.ok().unwrap().cities;
        assert_eq!(cities.len(), 1);
        assert_eq!(cities[0].id, "77");
    }

    #[test]
    fn city_headers_set_selection_cookie() {
        let headers = HttpCatalogApi::city_headers("0000073738");
        let cookie = headers.get(COOKIE).unwrap().to_str().unwrap();
        assert_eq!(cookie, "selected_city_code=0000073738");
    }
}
