//! Vaccine catalog (`vaccines/`).

use crate::client::{decode, Access, ApiClient};
use crate::de::lenient_f64;
use crate::error::{ApiError, Result};
use bridge_traits::http::HttpMethod;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, instrument};

const VACCINES: &str = "vaccines/";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vaccine {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Price of `vaccine_id` in `vaccines`, if listed and non-zero.
pub fn price_of(vaccines: &[Vaccine], vaccine_id: u64) -> Option<f64> {
    vaccines
        .iter()
        .find(|v| v.id == vaccine_id)
        .and_then(|v| v.price)
        .filter(|price| *price > 0.0)
}

/// Catalog filters; unset fields are left out of the query string.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VaccineQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(rename = "price__gte", skip_serializing_if = "Option::is_none")]
    pub price_gte: Option<f64>,
    #[serde(rename = "price__lte", skip_serializing_if = "Option::is_none")]
    pub price_lte: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordering: Option<String>,
}

impl VaccineQuery {
    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn price_range(mut self, min: f64, max: f64) -> Self {
        self.price_gte = Some(min);
        self.price_lte = Some(max);
        self
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn ordering(mut self, field: impl Into<String>) -> Self {
        self.ordering = Some(field.into());
        self
    }

    /// `vaccines/` path with the encoded query appended.
    pub fn to_path(&self) -> Result<String> {
        let query = serde_urlencoded::to_string(self).map_err(|e| ApiError::decode(VACCINES, e))?;
        if query.is_empty() {
            Ok(VACCINES.to_string())
        } else {
            Ok(format!("{}?{}", VACCINES, query))
        }
    }
}

/// One page of the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct VaccinePage {
    pub vaccines: Vec<Vaccine>,
    pub count: u64,
    pub total_pages: u32,
}

impl VaccinePage {
    /// Accepts both `{count, results}` and a bare array.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(mut page) if page.contains_key("results") => {
                let vaccines: Vec<Vaccine> =
                    decode(VACCINES, page.remove("results").unwrap_or(Value::Null))?;
                let count = page
                    .get("count")
                    .and_then(Value::as_u64)
                    .unwrap_or(vaccines.len() as u64);
                let total_pages = if vaccines.is_empty() {
                    0
                } else {
                    count.div_ceil(vaccines.len() as u64) as u32
                };
                Ok(Self {
                    vaccines,
                    count,
                    total_pages,
                })
            }
            other => {
                let vaccines: Vec<Vaccine> = decode(VACCINES, other)?;
                let total_pages = u32::from(!vaccines.is_empty());
                Ok(Self {
                    count: vaccines.len() as u64,
                    vaccines,
                    total_pages,
                })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewVaccine {
    pub name: String,
    pub manufacturer: String,
    pub price: f64,
    pub stock: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

pub struct VaccineApi {
    client: Arc<ApiClient>,
}

impl VaccineApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    #[instrument(skip(self))]
    pub async fn list(&self, query: &VaccineQuery) -> Result<VaccinePage> {
        let path = query.to_path()?;
        let value = self
            .client
            .send(HttpMethod::Get, &path, Access::Public, None)
            .await?;
        let page = VaccinePage::from_value(value)?;
        debug!(count = page.count, total_pages = page.total_pages, "Fetched vaccines");
        Ok(page)
    }

    pub async fn get(&self, id: u64) -> Result<Vaccine> {
        self.client
            .get(&format!("{}{}/", VACCINES, id), Access::Public)
            .await
    }

    #[instrument(skip(self, vaccine), fields(name = %vaccine.name))]
    pub async fn create(&self, vaccine: &NewVaccine) -> Result<Vaccine> {
        self.client.post(VACCINES, Access::Authenticated, vaccine).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::*;
    use serde_json::json;

    #[test]
    fn test_query_path() {
        let query = VaccineQuery::default()
            .page(2)
            .price_range(100.5, 5000.5)
            .search("hep b")
            .ordering("-price");

        assert_eq!(
            query.to_path().unwrap(),
            "vaccines/?page=2&price__gte=100.5&price__lte=5000.5&search=hep+b&ordering=-price"
        );
        assert_eq!(VaccineQuery::default().to_path().unwrap(), "vaccines/");
    }

    #[test]
    fn test_paginated_total_pages() {
        let page = VaccinePage::from_value(json!({
            "count": 25,
            "results": [{ "id": 1, "name": "A" }, { "id": 2, "name": "B" }]
        }))
        .unwrap();

        assert_eq!(page.count, 25);
        assert_eq!(page.total_pages, 13);
        assert_eq!(page.vaccines[1].name, "B");
    }

    #[test]
    fn test_bare_array_pages() {
        let one = VaccinePage::from_value(json!([{ "id": 1, "name": "A", "price": "120.00" }])).unwrap();
        let none = VaccinePage::from_value(json!([])).unwrap();
        let empty_page = VaccinePage::from_value(json!({ "count": 0, "results": [] })).unwrap();

        assert_eq!(one.total_pages, 1);
        assert_eq!(one.vaccines[0].price, Some(120.0));
        assert_eq!(none.total_pages, 0);
        assert_eq!(empty_page.total_pages, 0);
    }

    #[test]
    fn test_unknown_fields_are_kept() {
        let vaccine: Vaccine =
            serde_json::from_value(json!({ "id": 5, "name": "BCG", "dose": "1 dose" })).unwrap();
        assert_eq!(vaccine.extra.get("dose"), Some(&json!("1 dose")));
    }

    #[test]
    fn test_price_of() {
        let vaccines: Vec<Vaccine> = serde_json::from_value(json!([
            { "id": 1, "price": 0 },
            { "id": 2, "price": "1500" }
        ]))
        .unwrap();

        assert_eq!(price_of(&vaccines, 2), Some(1500.0));
        assert_eq!(price_of(&vaccines, 1), None);
        assert_eq!(price_of(&vaccines, 3), None);
    }

    #[tokio::test]
    async fn test_list_signed_out() {
        let f = fixture(
            ScriptedHttp::new(vec![(200, r#"{"count":1,"results":[{"id":1,"name":"BCG"}]}"#)]),
            false,
        )
        .await;
        let api = VaccineApi::new(f.client.clone());

        let page = api.list(&VaccineQuery::default().page(1)).await.unwrap();

        assert_eq!(page.total_pages, 1);
        let request = f.http.request(0);
        assert_eq!(request.url, "https://api.test/api/v1/vaccines/?page=1");
        assert!(request.authorization_header().is_none());
    }

    #[tokio::test]
    async fn test_create_posts_body() {
        let f = fixture(
            ScriptedHttp::new(vec![(201, r#"{"id":8,"name":"Rabies","price":"900.00"}"#)]),
            true,
        )
        .await;
        let api = VaccineApi::new(f.client.clone());

        let created = api
            .create(&NewVaccine {
                name: "Rabies".to_string(),
                manufacturer: "Incepta".to_string(),
                price: 900.0,
                stock: 40,
                dose: None,
                description: None,
            })
            .await
            .unwrap();

        assert_eq!(created.id, 8);
        assert_eq!(f.http.body(0)["stock"], 40);
    }
}
