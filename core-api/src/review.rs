//! Vaccine reviews (`review/`).

use crate::client::{list_items, Access, ApiClient};
use crate::de::Related;
use crate::error::Result;
use bridge_traits::http::HttpMethod;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

const REVIEWS: &str = "review/";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vaccine: Option<Related>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewReview {
    pub vaccine: u64,
    /// 1 to 5.
    pub rating: u8,
    pub comment: String,
}

pub struct ReviewApi {
    client: Arc<ApiClient>,
}

impl ReviewApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    /// All reviews, or only those for one vaccine.
    pub async fn list(&self, vaccine: Option<u64>) -> Result<Vec<Review>> {
        let path = match vaccine {
            Some(id) => format!("{}?vaccine={}", REVIEWS, id),
            None => REVIEWS.to_string(),
        };
        let value = self
            .client
            .send(HttpMethod::Get, &path, Access::Public, None)
            .await?;
        list_items(REVIEWS, value)
    }

    pub async fn create(&self, review: &NewReview) -> Result<Review> {
        self.client.post(REVIEWS, Access::Authenticated, review).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::*;

    #[tokio::test]
    async fn test_list_for_vaccine() {
        let f = fixture(
            ScriptedHttp::new(vec![(200, r#"[{"id":1,"vaccine":3,"rating":5,"comment":"Painless"}]"#)]),
            false,
        )
        .await;
        let api = ReviewApi::new(f.client.clone());

        let reviews = api.list(Some(3)).await.unwrap();

        assert_eq!(reviews[0].rating, Some(5));
        assert_eq!(reviews[0].vaccine.as_ref().and_then(Related::id), Some(3));
        assert_eq!(f.http.request(0).url, "https://api.test/api/v1/review/?vaccine=3");
    }

    #[tokio::test]
    async fn test_create_caches_scheme_under_review() {
        let f = fixture(
            ScriptedHttp::new(vec![(403, ""), (401, ""), (201, r#"{"id":4,"rating":4}"#)]),
            true,
        )
        .await;
        let api = ReviewApi::new(f.client.clone());

        let review = api
            .create(&NewReview {
                vaccine: 3,
                rating: 4,
                comment: "Quick".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(review.id, 4);
        assert_eq!(
            f.http.request(2).authorization_header(),
            Some("Bearer access-1")
        );
        assert_eq!(
            f.schemes.resolve("review").await,
            Some(core_auth::AuthScheme::Bearer)
        );
    }
}
