//! Vaccination campaigns (`vaccine-campaign/`).

use crate::client::{list_items, Access, ApiClient};
use crate::de::Related;
use crate::error::Result;
use bridge_traits::http::HttpMethod;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::instrument;

const CAMPAIGNS: &str = "vaccine-campaign/";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default)]
    pub vaccines: Vec<Related>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Campaign {
    pub fn offers(&self, vaccine_id: u64) -> bool {
        self.vaccines.iter().any(|v| v.id() == Some(vaccine_id))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewCampaign {
    pub name: String,
    pub description: String,
    pub location: String,
    /// `YYYY-MM-DD`
    pub start_date: String,
    /// `YYYY-MM-DD`
    pub end_date: String,
    pub vaccines: Vec<u64>,
}

pub struct CampaignApi {
    client: Arc<ApiClient>,
}

impl CampaignApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    /// All campaigns, or the first `limit` when `limit > 0`.
    #[instrument(skip(self))]
    pub async fn list(&self, limit: usize) -> Result<Vec<Campaign>> {
        let value = self
            .client
            .send(HttpMethod::Get, CAMPAIGNS, Access::Public, None)
            .await?;
        let mut campaigns: Vec<Campaign> = list_items(CAMPAIGNS, value)?;
        if limit > 0 {
            campaigns.truncate(limit);
        }
        Ok(campaigns)
    }

    pub async fn get(&self, id: u64) -> Result<Campaign> {
        self.client
            .get(&format!("{}{}/", CAMPAIGNS, id), Access::Public)
            .await
    }

    pub async fn for_vaccine(&self, vaccine_id: u64) -> Result<Vec<Campaign>> {
        let campaigns = self.list(0).await?;
        Ok(campaigns
            .into_iter()
            .filter(|c| c.offers(vaccine_id))
            .collect())
    }

    #[instrument(skip(self, campaign), fields(name = %campaign.name))]
    pub async fn create(&self, campaign: &NewCampaign) -> Result<Campaign> {
        self.client
            .post(CAMPAIGNS, Access::Authenticated, campaign)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::*;

    const THREE: &str = r#"[
        {"id":1,"name":"Polio drive","vaccines":[1,2]},
        {"id":2,"name":"Measles week","vaccines":[{"id":3,"name":"MR"}]},
        {"id":3,"name":"School round","vaccines":[2]}
    ]"#;

    #[tokio::test]
    async fn test_list_with_limit() {
        let f = fixture(ScriptedHttp::new(vec![(200, THREE)]), false).await;
        let api = CampaignApi::new(f.client.clone());

        let campaigns = api.list(2).await.unwrap();

        assert_eq!(campaigns.len(), 2);
        assert_eq!(campaigns[1].name, "Measles week");
    }

    #[tokio::test]
    async fn test_for_vaccine_matches_ids_and_objects() {
        let f = fixture(ScriptedHttp::new(vec![(200, THREE), (200, THREE)]), false).await;
        let api = CampaignApi::new(f.client.clone());

        let for_two: Vec<u64> = api.for_vaccine(2).await.unwrap().iter().map(|c| c.id).collect();
        let for_three: Vec<u64> = api.for_vaccine(3).await.unwrap().iter().map(|c| c.id).collect();

        assert_eq!(for_two, vec![1, 3]);
        assert_eq!(for_three, vec![2]);
    }

    #[tokio::test]
    async fn test_create_requires_login() {
        let f = fixture(ScriptedHttp::new(vec![]), false).await;
        let api = CampaignApi::new(f.client.clone());

        let err = api
            .create(&NewCampaign {
                name: "Rabies".to_string(),
                description: String::new(),
                location: "Dhaka".to_string(),
                start_date: "2025-01-01".to_string(),
                end_date: "2025-01-31".to_string(),
                vaccines: vec![4],
            })
            .await
            .unwrap_err();

        assert!(err.requires_login());
        assert!(f.http.requests().is_empty());
    }
}
