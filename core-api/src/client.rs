//! Shared request plumbing for the domain modules.
//!
//! Every call names an [`Access`] level:
//!
//! - `Authenticated` goes through the executor (scheme trial, refresh).
//! - `Public` does the same when a credential is held and otherwise sends one
//!   plain request, so catalog pages work signed out.
//! - `Anonymous` never sends `Authorization` (registration, password reset).

use crate::error::{ApiError, Result};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bytes::Bytes;
use core_auth::{endpoint_key, join_url, AuthenticatedExecutor, RequestFailure, RequestOutcome};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Authenticated,
    Public,
    Anonymous,
}

pub struct ApiClient {
    http_client: Arc<dyn HttpClient>,
    executor: Arc<AuthenticatedExecutor>,
    base_url: String,
}

impl ApiClient {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        executor: Arc<AuthenticatedExecutor>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            executor,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, access: Access) -> Result<T> {
        let value = self.send(HttpMethod::Get, path, access, None).await?;
        decode(path, value)
    }

    pub async fn post<B, T>(&self, path: &str, access: Access, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let value = self
            .send(HttpMethod::Post, path, access, Some(encode(path, body)?))
            .await?;
        decode(path, value)
    }

    pub async fn patch<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let value = self
            .send(
                HttpMethod::Patch,
                path,
                Access::Authenticated,
                Some(encode(path, body)?),
            )
            .await?;
        decode(path, value)
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let value = self
            .send(
                HttpMethod::Put,
                path,
                Access::Authenticated,
                Some(encode(path, body)?),
            )
            .await?;
        decode(path, value)
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send(HttpMethod::Delete, path, Access::Authenticated, None)
            .await
            .map(|_| ())
    }

    /// Sends one logical request and returns the parsed body.
    ///
    /// Empty or non-JSON success bodies come back as `Value::Null`.
    #[instrument(skip(self, body))]
    pub async fn send(
        &self,
        method: HttpMethod,
        path: &str,
        access: Access,
        body: Option<Bytes>,
    ) -> Result<Value> {
        let url = self.url(path);

        let access = match access {
            Access::Public if self.executor.token_store().has_credential().await => {
                Access::Authenticated
            }
            other => other,
        };

        let outcome = match access {
            Access::Authenticated => {
                let key = endpoint_key(path);
                self.executor
                    .execute(&key, |token, scheme| {
                        let request = build_request(method, &url, body.clone())
                            .authorization(scheme.header_value(&token));
                        let http_client = Arc::clone(&self.http_client);
                        async move { http_client.execute(request).await }
                    })
                    .await
            }
            Access::Public | Access::Anonymous => {
                debug!(path, "Sending unauthenticated request");
                let request = build_request(method, &url, body);
                match self.http_client.execute(request).await {
                    Ok(response) => outcome_of(&response),
                    Err(e) => RequestOutcome::Failure(RequestFailure::transport(&e)),
                }
            }
        };

        outcome.into_result().map_err(ApiError::from)
    }
}

fn build_request(method: HttpMethod, url: &str, body: Option<Bytes>) -> HttpRequest {
    let request = HttpRequest::new(method, url).header("Accept", "application/json");
    match body {
        Some(body) => request
            .header("Content-Type", "application/json")
            .body(body),
        None => request,
    }
}

fn outcome_of(response: &HttpResponse) -> RequestOutcome {
    if response.is_success() {
        RequestOutcome::Success {
            status: response.status,
            data: response.json_value().unwrap_or(Value::Null),
        }
    } else {
        RequestOutcome::Failure(RequestFailure::from_response(response))
    }
}

pub(crate) fn encode<B: Serialize + ?Sized>(path: &str, body: &B) -> Result<Bytes> {
    serde_json::to_vec(body)
        .map(Bytes::from)
        .map_err(|e| ApiError::decode(path, e))
}

pub(crate) fn decode<T: DeserializeOwned>(path: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| ApiError::decode(path, e))
}

/// Items of a list response that may or may not be paginated.
pub(crate) fn list_items<T: DeserializeOwned>(path: &str, value: Value) -> Result<Vec<T>> {
    match value {
        Value::Object(mut page) if page.contains_key("results") => {
            decode(path, page.remove("results").unwrap_or(Value::Null))
        }
        Value::Null => Ok(Vec::new()),
        other => decode(path, other),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-process doubles shared by the domain module tests.

    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::storage::SecureStore;
    use core_auth::{AuthScheme, CredentialPair, SchemeCache, TokenRefresher, TokenStore};
    use core_runtime::events::EventBus;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    pub const BASE_URL: &str = "https://api.test/api/v1/";

    #[derive(Default)]
    pub struct MemoryStore {
        pub data: Mutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl SecureStore for MemoryStore {
        async fn set_secret(&self, key: &str, value: &[u8]) -> BridgeResult<()> {
            self.data
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_vec());
            Ok(())
        }

        async fn get_secret(&self, key: &str) -> BridgeResult<Option<Vec<u8>>> {
            Ok(self.data.lock().unwrap().get(key).cloned())
        }

        async fn delete_secret(&self, key: &str) -> BridgeResult<()> {
            self.data.lock().unwrap().remove(key);
            Ok(())
        }
    }

    /// Replies in order and records every request.
    #[derive(Default)]
    pub struct ScriptedHttp {
        replies: Mutex<VecDeque<Option<(u16, String)>>>,
        pub requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedHttp {
        pub fn new(replies: Vec<(u16, &str)>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|(status, body)| Some((status, body.to_string())))
                        .collect(),
                ),
                requests: Mutex::new(Vec::new()),
            })
        }

        pub fn offline() -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(VecDeque::from(vec![None])),
                requests: Mutex::new(Vec::new()),
            })
        }

        pub fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn request(&self, index: usize) -> HttpRequest {
            self.requests()[index].clone()
        }

        pub fn body(&self, index: usize) -> Value {
            serde_json::from_slice(self.request(index).body.as_ref().unwrap()).unwrap()
        }
    }

    #[async_trait]
    impl HttpClient for ScriptedHttp {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
            self.requests.lock().unwrap().push(request);
            match self.replies.lock().unwrap().pop_front() {
                Some(Some((status, body))) => Ok(HttpResponse::new(status, body)),
                Some(None) => Err(BridgeError::ConnectionFailed("offline".to_string())),
                None => Ok(HttpResponse::new(500, "unscripted")),
            }
        }
    }

    pub struct NoRefresh;

    #[async_trait]
    impl TokenRefresher for NoRefresh {
        async fn refresh_if_needed(
            &self,
            _failure: &RequestFailure,
            _sent_access: &str,
        ) -> Option<CredentialPair> {
            None
        }
    }

    pub struct Fixture {
        pub client: Arc<ApiClient>,
        pub http: Arc<ScriptedHttp>,
        pub schemes: Arc<SchemeCache>,
        pub store: Arc<MemoryStore>,
        pub event_bus: EventBus,
    }

    /// Client over `http`; `signed_in` stores an `access-1`/`refresh-1` pair.
    pub async fn fixture(http: Arc<ScriptedHttp>, signed_in: bool) -> Fixture {
        let store = Arc::new(MemoryStore::default());
        let token_store = Arc::new(TokenStore::new(store.clone(), "authTokens"));
        if signed_in {
            token_store
                .set(CredentialPair::new("access-1", Some("refresh-1".to_string())))
                .await
                .unwrap();
        }
        let schemes = Arc::new(SchemeCache::new());
        let event_bus = EventBus::new(16);
        let executor = Arc::new(AuthenticatedExecutor::new(
            token_store,
            schemes.clone(),
            Arc::new(NoRefresh),
            AuthScheme::DEFAULT_ORDER.to_vec(),
            event_bus.clone(),
        ));
        let client = Arc::new(ApiClient::new(http.clone(), executor, BASE_URL));
        Fixture {
            client,
            http,
            schemes,
            store,
            event_bus,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use core_auth::{AuthScheme, FailureKind};

    #[tokio::test]
    async fn test_public_read_without_credential_is_unauthenticated() {
        let f = fixture(ScriptedHttp::new(vec![(200, "[]")]), false).await;

        let items: Vec<Value> = f.client.get("vaccines/", Access::Public).await.unwrap();

        assert!(items.is_empty());
        let request = f.http.request(0);
        assert_eq!(request.url, "https://api.test/api/v1/vaccines/");
        assert!(request.authorization_header().is_none());
    }

    #[tokio::test]
    async fn test_public_read_with_credential_uses_executor() {
        let f = fixture(ScriptedHttp::new(vec![(200, "[]")]), true).await;

        let _: Vec<Value> = f.client.get("vaccines/", Access::Public).await.unwrap();

        assert_eq!(
            f.http.request(0).authorization_header(),
            Some("JWT access-1")
        );
        assert_eq!(f.schemes.resolve("vaccines").await, Some(AuthScheme::Jwt));
    }

    #[tokio::test]
    async fn test_authenticated_without_credential_sends_nothing() {
        let f = fixture(ScriptedHttp::new(vec![]), false).await;

        let err = f
            .client
            .get::<Value>("vaccination-schedules/", Access::Authenticated)
            .await
            .unwrap_err();

        assert!(err.requires_login());
        assert!(f.http.requests().is_empty());
    }

    #[tokio::test]
    async fn test_anonymous_never_sends_authorization() {
        let f = fixture(ScriptedHttp::new(vec![(201, r#"{"id":3}"#)]), true).await;

        let created: Value = f
            .client
            .post("auth/users/", Access::Anonymous, &serde_json::json!({ "a": 1 }))
            .await
            .unwrap();

        assert_eq!(created["id"], 3);
        let request = f.http.request(0);
        assert!(request.authorization_header().is_none());
        assert_eq!(
            request.headers.get("Content-Type").map(String::as_str),
            Some("application/json")
        );
    }

    #[tokio::test]
    async fn test_offline_anonymous_is_transport_failure() {
        let f = fixture(ScriptedHttp::offline(), false).await;

        let err = f
            .client
            .send(HttpMethod::Get, "vaccines/", Access::Anonymous, None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::Transport);
    }

    #[tokio::test]
    async fn test_delete_with_empty_body() {
        let f = fixture(ScriptedHttp::new(vec![(204, "")]), true).await;

        f.client.delete("vaccination-schedules/4/").await.unwrap();

        assert_eq!(f.http.request(0).method, HttpMethod::Delete);
    }

    #[test]
    fn test_list_items_accepts_both_shapes() {
        let paged: Vec<u32> =
            list_items("x", serde_json::json!({ "count": 2, "results": [1, 2] })).unwrap();
        let bare: Vec<u32> = list_items("x", serde_json::json!([3])).unwrap();
        let empty: Vec<u32> = list_items("x", Value::Null).unwrap();

        assert_eq!(paged, vec![1, 2]);
        assert_eq!(bare, vec![3]);
        assert!(empty.is_empty());
    }
}
