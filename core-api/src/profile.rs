//! Patient and doctor profiles (`patient-profile/`, `doctor-profile/`).

use crate::client::{Access, ApiClient};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, instrument};

const PATIENT_PROFILE: &str = "patient-profile/";
const DOCTOR_PROFILE: &str = "doctor-profile/";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientProfile {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_details: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Fields sent when creating or editing a patient profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PatientProfileDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medical_details: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctorProfile {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub struct PatientProfileApi {
    client: Arc<ApiClient>,
}

impl PatientProfileApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    /// Profile of the user with `user_id`.
    pub async fn get(&self, user_id: u64) -> Result<PatientProfile> {
        self.client
            .get(&patient_path(user_id), Access::Authenticated)
            .await
    }

    #[instrument(skip(self, draft))]
    pub async fn create(&self, draft: &PatientProfileDraft) -> Result<PatientProfile> {
        let profile: PatientProfile = self
            .client
            .post(PATIENT_PROFILE, Access::Authenticated, draft)
            .await?;
        info!(profile_id = profile.id, "Patient profile created");
        Ok(profile)
    }

    pub async fn update(&self, profile_id: u64, patch: &PatientProfileDraft) -> Result<PatientProfile> {
        self.client.patch(&patient_path(profile_id), patch).await
    }

    pub async fn delete(&self, profile_id: u64) -> Result<()> {
        self.client.delete(&patient_path(profile_id)).await
    }

    /// Reads the profile, creating it from `draft` if the server has none.
    #[instrument(skip(self, draft))]
    pub async fn get_or_create(&self, user_id: u64, draft: &PatientProfileDraft) -> Result<PatientProfile> {
        match self.get(user_id).await {
            Err(e) if e.is_not_found() => {
                info!("No patient profile yet, creating one");
                self.create(draft).await
            }
            other => other,
        }
    }
}

pub struct DoctorProfileApi {
    client: Arc<ApiClient>,
}

impl DoctorProfileApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    pub async fn get(&self, doctor_id: u64) -> Result<DoctorProfile> {
        self.client
            .get(&doctor_path(doctor_id), Access::Authenticated)
            .await
    }

    pub async fn update<P: Serialize + ?Sized>(&self, doctor_id: u64, patch: &P) -> Result<DoctorProfile> {
        self.client.patch(&doctor_path(doctor_id), patch).await
    }
}

fn doctor_path(id: u64) -> String {
    format!("{}{}/", DOCTOR_PROFILE, id)
}

fn patient_path(id: u64) -> String {
    format!("{}{}/", PATIENT_PROFILE, id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::*;
    use bridge_traits::http::HttpMethod;
    use core_auth::{AuthScheme, FailureKind};

    fn draft() -> PatientProfileDraft {
        PatientProfileDraft {
            first_name: Some("Rahima".to_string()),
            nid: Some("1990123456".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_jwt_rejected_token_accepted() {
        let f = fixture(
            ScriptedHttp::new(vec![(401, ""), (200, r#"{"id":7}"#)]),
            true,
        )
        .await;
        let api = PatientProfileApi::new(f.client.clone());

        let profile = api.get(3).await.unwrap();

        assert_eq!(profile.id, 7);
        assert_eq!(f.http.request(1).authorization_header(), Some("Token access-1"));
        assert_eq!(
            f.schemes.resolve("patient-profile").await,
            Some(AuthScheme::Token)
        );
    }

    #[tokio::test]
    async fn test_missing_profile_is_created() {
        let f = fixture(
            ScriptedHttp::new(vec![
                (404, r#"{"detail":"Not found."}"#),
                (201, r#"{"id":12,"first_name":"Rahima"}"#),
            ]),
            true,
        )
        .await;
        let api = PatientProfileApi::new(f.client.clone());

        let profile = api.get_or_create(3, &draft()).await.unwrap();

        assert_eq!(profile.id, 12);
        let requests = f.http.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].method, HttpMethod::Post);
        assert_eq!(requests[1].url, "https://api.test/api/v1/patient-profile/");
        assert_eq!(f.http.body(1)["nid"], "1990123456");
        assert!(f.http.body(1).get("address").is_none());
    }

    #[tokio::test]
    async fn test_other_errors_do_not_create() {
        let f = fixture(ScriptedHttp::new(vec![(500, "")]), true).await;
        let api = PatientProfileApi::new(f.client.clone());

        let err = api.get_or_create(3, &draft()).await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::Http);
        assert_eq!(f.http.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_update_doctor_is_patch() {
        let f = fixture(
            ScriptedHttp::new(vec![(200, r#"{"id":2,"specialization":"Pediatrics"}"#)]),
            true,
        )
        .await;
        let api = DoctorProfileApi::new(f.client.clone());

        let doctor = api
            .update(2, &serde_json::json!({ "specialization": "Pediatrics" }))
            .await
            .unwrap();

        assert_eq!(doctor.specialization.as_deref(), Some("Pediatrics"));
        assert_eq!(f.http.request(0).method, HttpMethod::Patch);
    }
}
