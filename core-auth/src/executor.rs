//! # Authenticated Request Executor
//!
//! Runs one logical request against the backend, choosing the
//! `Authorization` scheme and recovering from an expired access token.
//!
//! ## Algorithm
//!
//! 1. No stored credential: fail with `MissingCredential` (status 401) and
//!    make no call.
//! 2. A scheme is cached for the endpoint: one attempt with it. 2xx succeeds,
//!    401/403 drops the cache entry and falls through, any other status is
//!    returned as is.
//! 3. Full trial over the configured order, strictly sequential. The first
//!    2xx is remembered. 401/403 and transport errors move on to the next
//!    scheme; any other status stops the trial.
//! 4. If every trial attempt was a 401, the access token is treated as
//!    expired when the endpoint had a cached scheme or a refresh token is
//!    stored (a credential restored after a restart has no cached schemes).
//!    The refresher is asked once for a new pair. The request is replayed
//!    once with the previously cached scheme, or the trial is run one more
//!    time when nothing was cached.
//!
//! One execution issues at most `1 + 2 * schemes` resource calls, plus one
//! refresh exchange. Failures are values; nothing here returns `Err`.

use crate::refresh::TokenRefresher;
use crate::resolver::SchemeCache;
use crate::token_store::TokenStore;
use crate::types::AuthScheme;
use bridge_traits::{BridgeError, HttpResponse};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub const MISSING_CREDENTIAL_MESSAGE: &str = "Authentication token is missing. Please log in again.";
pub const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired. Please log in again.";

/// Classification of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// No credential stored; nothing was sent.
    MissingCredential,
    /// Every scheme was answered 401/403.
    AuthRejected,
    /// Refresh failed and the credential was discarded.
    SessionExpired,
    /// 400 with per-field messages.
    Validation,
    NotFound,
    /// Any other non-2xx status.
    Http,
    /// No response was received.
    Transport,
}

impl FailureKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => FailureKind::Validation,
            401 | 403 => FailureKind::AuthRejected,
            404 => FailureKind::NotFound,
            _ => FailureKind::Http,
        }
    }
}

/// A failed request, with whatever the server said about it.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestFailure {
    pub kind: FailureKind,
    /// HTTP status; `None` for transport failures.
    pub status: Option<u16>,
    /// Parsed JSON body, when the server sent one.
    pub body: Option<Value>,
    pub message: String,
}

impl RequestFailure {
    pub fn from_response(response: &HttpResponse) -> Self {
        let body = response.json_value();
        let message = body
            .as_ref()
            .and_then(detail_message)
            .unwrap_or_else(|| format!("Request failed with status {}", response.status));

        Self {
            kind: FailureKind::from_status(response.status),
            status: Some(response.status),
            body,
            message,
        }
    }

    pub fn transport(error: &BridgeError) -> Self {
        Self {
            kind: FailureKind::Transport,
            status: None,
            body: None,
            message: error.to_string(),
        }
    }

    pub fn missing_credential() -> Self {
        Self {
            kind: FailureKind::MissingCredential,
            status: Some(401),
            body: None,
            message: MISSING_CREDENTIAL_MESSAGE.to_string(),
        }
    }

    pub fn session_expired() -> Self {
        Self {
            kind: FailureKind::SessionExpired,
            status: Some(401),
            body: None,
            message: SESSION_EXPIRED_MESSAGE.to_string(),
        }
    }

    pub fn has_structured_body(&self) -> bool {
        self.body.is_some()
    }
}

/// `detail` or `message` from an error body.
fn detail_message(body: &Value) -> Option<String> {
    ["detail", "message", "error"]
        .iter()
        .find_map(|field| body.get(field).and_then(Value::as_str))
        .map(str::to_string)
}

/// Result of one `execute` call.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    Success {
        status: u16,
        /// Parsed body; `Value::Null` for empty or non-JSON bodies.
        data: Value,
    },
    Failure(RequestFailure),
}

impl RequestOutcome {
    fn success(response: &HttpResponse) -> Self {
        RequestOutcome::Success {
            status: response.status,
            data: response.json_value().unwrap_or(Value::Null),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RequestOutcome::Success { .. })
    }

    pub fn into_result(self) -> Result<Value, RequestFailure> {
        match self {
            RequestOutcome::Success { data, .. } => Ok(data),
            RequestOutcome::Failure(failure) => Err(failure),
        }
    }
}

enum Trial {
    Succeeded(HttpResponse),
    Stopped(RequestFailure),
    Exhausted {
        failures: Vec<RequestFailure>,
        /// Every attempt was answered 401.
        all_unauthorized: bool,
    },
}

enum Attempt {
    Succeeded(HttpResponse),
    Rejected(RequestFailure),
    Failed(RequestFailure),
    Unreachable(RequestFailure),
}

pub struct AuthenticatedExecutor {
    token_store: Arc<TokenStore>,
    schemes: Arc<SchemeCache>,
    refresher: Arc<dyn TokenRefresher>,
    order: Vec<AuthScheme>,
    event_bus: EventBus,
}

impl AuthenticatedExecutor {
    pub fn new(
        token_store: Arc<TokenStore>,
        schemes: Arc<SchemeCache>,
        refresher: Arc<dyn TokenRefresher>,
        order: Vec<AuthScheme>,
        event_bus: EventBus,
    ) -> Self {
        let order = if order.is_empty() {
            AuthScheme::DEFAULT_ORDER.to_vec()
        } else {
            order
        };

        Self {
            token_store,
            schemes,
            refresher,
            order,
            event_bus,
        }
    }

    pub fn scheme_order(&self) -> &[AuthScheme] {
        &self.order
    }

    pub fn scheme_cache(&self) -> &Arc<SchemeCache> {
        &self.schemes
    }

    pub fn token_store(&self) -> &Arc<TokenStore> {
        &self.token_store
    }

    /// Runs `request_fn` with the stored access token until a scheme works.
    ///
    /// `request_fn(token, scheme)` performs exactly one HTTP call and must
    /// put `scheme.header_value(&token)` in the `Authorization` header.
    #[instrument(skip(self, request_fn), fields(endpoint = %key))]
    pub async fn execute<F, Fut>(&self, key: &str, request_fn: F) -> RequestOutcome
    where
        F: Fn(String, AuthScheme) -> Fut,
        Fut: Future<Output = bridge_traits::error::Result<HttpResponse>>,
    {
        let Some(credential) = self.token_store.get().await else {
            warn!("No credential available, request not sent");
            return RequestOutcome::Failure(RequestFailure::missing_credential());
        };
        let can_refresh = credential.has_refresh();
        let token = credential.access;

        let cached = self.schemes.resolve(key).await;

        if let Some(scheme) = cached {
            match attempt(&request_fn, &token, scheme).await {
                Attempt::Succeeded(response) => return RequestOutcome::success(&response),
                Attempt::Rejected(failure) => {
                    debug!(scheme = %scheme, status = ?failure.status, "Cached scheme rejected");
                    if self.schemes.forget(key).await {
                        self.emit(AuthEvent::SchemeForgotten {
                            endpoint: key.to_string(),
                        });
                    }
                }
                Attempt::Failed(failure) | Attempt::Unreachable(failure) => {
                    return RequestOutcome::Failure(failure)
                }
            }
        }

        let (failures, all_unauthorized) = match self.trial(key, &token, &request_fn).await {
            Trial::Succeeded(response) => return RequestOutcome::success(&response),
            Trial::Stopped(failure) => return RequestOutcome::Failure(failure),
            Trial::Exhausted {
                failures,
                all_unauthorized,
            } => (failures, all_unauthorized),
        };

        if all_unauthorized && (cached.is_some() || can_refresh) {
            let Some(refreshed) = self.refresher.refresh_if_needed(&failures[0], &token).await
            else {
                info!("Refresh unavailable, session expired");
                return RequestOutcome::Failure(RequestFailure::session_expired());
            };
            return match cached {
                Some(scheme) => self.replay(key, scheme, &refreshed.access, &request_fn).await,
                None => self.retrial(key, &refreshed.access, &request_fn).await,
            };
        }

        warn!(attempts = failures.len(), "No authorization scheme accepted");
        RequestOutcome::Failure(most_informative(failures))
    }

    /// Every scheme in order until one is accepted or a non-auth failure.
    async fn trial<F, Fut>(&self, key: &str, token: &str, request_fn: &F) -> Trial
    where
        F: Fn(String, AuthScheme) -> Fut,
        Fut: Future<Output = bridge_traits::error::Result<HttpResponse>>,
    {
        let mut failures: Vec<RequestFailure> = Vec::with_capacity(self.order.len());
        let mut all_unauthorized = true;

        for &scheme in &self.order {
            match attempt(request_fn, token, scheme).await {
                Attempt::Succeeded(response) => {
                    self.remember(key, scheme).await;
                    return Trial::Succeeded(response);
                }
                Attempt::Rejected(failure) => {
                    all_unauthorized &= failure.status == Some(401);
                    failures.push(failure);
                }
                Attempt::Unreachable(failure) => {
                    all_unauthorized = false;
                    failures.push(failure);
                }
                Attempt::Failed(failure) => {
                    debug!(scheme = %scheme, status = ?failure.status, "Non-auth failure, stopping trial");
                    return Trial::Stopped(failure);
                }
            }
        }

        Trial::Exhausted {
            all_unauthorized: all_unauthorized && !failures.is_empty(),
            failures,
        }
    }

    /// One call with the scheme that worked before the token expired.
    async fn replay<F, Fut>(
        &self,
        key: &str,
        scheme: AuthScheme,
        token: &str,
        request_fn: &F,
    ) -> RequestOutcome
    where
        F: Fn(String, AuthScheme) -> Fut,
        Fut: Future<Output = bridge_traits::error::Result<HttpResponse>>,
    {
        match attempt(request_fn, token, scheme).await {
            Attempt::Succeeded(response) => {
                self.remember(key, scheme).await;
                RequestOutcome::success(&response)
            }
            Attempt::Rejected(failure) | Attempt::Failed(failure) | Attempt::Unreachable(failure) => {
                RequestOutcome::Failure(failure)
            }
        }
    }

    /// Second full trial with a refreshed token; never refreshes again.
    async fn retrial<F, Fut>(&self, key: &str, token: &str, request_fn: &F) -> RequestOutcome
    where
        F: Fn(String, AuthScheme) -> Fut,
        Fut: Future<Output = bridge_traits::error::Result<HttpResponse>>,
    {
        match self.trial(key, token, request_fn).await {
            Trial::Succeeded(response) => RequestOutcome::success(&response),
            Trial::Stopped(failure) => RequestOutcome::Failure(failure),
            Trial::Exhausted { failures, .. } => {
                warn!(attempts = failures.len(), "No authorization scheme accepted after refresh");
                RequestOutcome::Failure(most_informative(failures))
            }
        }
    }

    async fn remember(&self, key: &str, scheme: AuthScheme) {
        if self.schemes.remember(key, scheme).await {
            self.emit(AuthEvent::SchemeResolved {
                endpoint: key.to_string(),
                scheme: scheme.to_string(),
            });
        }
    }

    fn emit(&self, event: AuthEvent) {
        let _ = self.event_bus.emit(CoreEvent::Auth(event));
    }
}

async fn attempt<F, Fut>(request_fn: &F, token: &str, scheme: AuthScheme) -> Attempt
where
    F: Fn(String, AuthScheme) -> Fut,
    Fut: Future<Output = bridge_traits::error::Result<HttpResponse>>,
{
    match request_fn(token.to_string(), scheme).await {
        Ok(response) if response.is_success() => Attempt::Succeeded(response),
        Ok(response) if matches!(response.status, 401 | 403) => {
            if let Some(challenge) = response.header("WWW-Authenticate") {
                debug!(scheme = %scheme, challenge, "Server sent an authentication challenge");
            }
            Attempt::Rejected(RequestFailure::from_response(&response))
        }
        Ok(response) => Attempt::Failed(RequestFailure::from_response(&response)),
        Err(error) => {
            debug!(scheme = %scheme, error = %error, "Request did not reach the server");
            Attempt::Unreachable(RequestFailure::transport(&error))
        }
    }
}

/// First failure with a JSON body, else the first failure.
fn most_informative(failures: Vec<RequestFailure>) -> RequestFailure {
    let index = failures
        .iter()
        .position(RequestFailure::has_structured_body)
        .unwrap_or(0);

    failures
        .into_iter()
        .nth(index)
        .unwrap_or_else(|| RequestFailure {
            kind: FailureKind::AuthRejected,
            status: Some(401),
            body: None,
            message: "No authorization scheme was accepted".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::MockTokenRefresher;
    use crate::types::CredentialPair;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::SecureStore;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        data: Mutex<HashMap<String, Vec<u8>>>,
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

    /// Scripted server: pops one reply per call and records what was sent.
    #[derive(Default)]
    struct Script {
        replies: Mutex<VecDeque<BridgeResult<HttpResponse>>>,
        calls: Mutex<Vec<(String, AuthScheme)>>,
    }

    impl Script {
        fn new(replies: Vec<BridgeResult<HttpResponse>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(String, AuthScheme)> {
            self.calls.lock().unwrap().clone()
        }

        fn schemes(&self) -> Vec<AuthScheme> {
            self.calls().into_iter().map(|(_, s)| s).collect()
        }

        fn request_fn(
            self: &Arc<Self>,
        ) -> impl Fn(String, AuthScheme) -> std::future::Ready<BridgeResult<HttpResponse>> {
            let script = Arc::clone(self);
            move |token, scheme| {
                script.calls.lock().unwrap().push((token, scheme));
                let reply = script
                    .replies
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| Ok(HttpResponse::new(500, "unscripted")));
                std::future::ready(reply)
            }
        }
    }

    fn status(code: u16) -> BridgeResult<HttpResponse> {
        Ok(HttpResponse::new(code, ""))
    }

    fn json(code: u16, body: &str) -> BridgeResult<HttpResponse> {
        Ok(HttpResponse::new(code, body.to_string()))
    }

    fn unreachable() -> BridgeResult<HttpResponse> {
        Err(BridgeError::ConnectionFailed("refused".to_string()))
    }

    struct Harness {
        executor: AuthenticatedExecutor,
        schemes: Arc<SchemeCache>,
        token_store: Arc<TokenStore>,
        events: tokio::sync::broadcast::Receiver<CoreEvent>,
    }

    async fn harness(credential: Option<CredentialPair>, refresher: MockTokenRefresher) -> Harness {
        let token_store = Arc::new(TokenStore::new(Arc::new(MemoryStore::default()), "authTokens"));
        if let Some(pair) = credential {
            token_store.set(pair).await.unwrap();
        }
        let schemes = Arc::new(SchemeCache::new());
        let bus = EventBus::new(32);
        let events = bus.subscribe();
        let executor = AuthenticatedExecutor::new(
            token_store.clone(),
            schemes.clone(),
            Arc::new(refresher),
            AuthScheme::DEFAULT_ORDER.to_vec(),
            bus,
        );
        Harness {
            executor,
            schemes,
            token_store,
            events,
        }
    }

    fn signed_in() -> Option<CredentialPair> {
        Some(CredentialPair::new("access-1", Some("refresh-1".to_string())))
    }

    fn no_refresh_expected() -> MockTokenRefresher {
        let mut refresher = MockTokenRefresher::new();
        refresher.expect_refresh_if_needed().never();
        refresher
    }

    #[tokio::test]
    async fn test_missing_credential_makes_no_call() {
        let h = harness(None, no_refresh_expected()).await;
        let script = Script::new(vec![]);

        let outcome = h.executor.execute("vaccines", script.request_fn()).await;

        match outcome {
            RequestOutcome::Failure(failure) => {
                assert_eq!(failure.kind, FailureKind::MissingCredential);
                assert_eq!(failure.status, Some(401));
                assert_eq!(failure.message, MISSING_CREDENTIAL_MESSAGE);
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(script.calls().is_empty());
    }

    #[tokio::test]
    async fn test_first_trial_learns_working_scheme() {
        let mut h = harness(signed_in(), no_refresh_expected()).await;
        let script = Script::new(vec![status(401), json(200, r#"{"id":7}"#)]);

        let outcome = h.executor.execute("patient-profile", script.request_fn()).await;

        assert_eq!(
            outcome,
            RequestOutcome::Success {
                status: 200,
                data: serde_json::json!({ "id": 7 })
            }
        );
        assert_eq!(script.schemes(), vec![AuthScheme::Jwt, AuthScheme::Token]);
        assert_eq!(script.calls()[0].0, "access-1");
        assert_eq!(
            h.schemes.resolve("patient-profile").await,
            Some(AuthScheme::Token)
        );

        let event = h.events.recv().await.unwrap();
        assert_eq!(
            event,
            CoreEvent::Auth(AuthEvent::SchemeResolved {
                endpoint: "patient-profile".to_string(),
                scheme: "Token".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_cached_scheme_makes_exactly_one_call() {
        let h = harness(signed_in(), no_refresh_expected()).await;
        h.schemes.remember("vaccines", AuthScheme::Jwt).await;
        let script = Script::new(vec![json(200, "[]")]);

        let outcome = h.executor.execute("vaccines", script.request_fn()).await;

        assert!(outcome.is_success());
        assert_eq!(script.schemes(), vec![AuthScheme::Jwt]);
        assert_eq!(h.schemes.resolve("vaccines").await, Some(AuthScheme::Jwt));
    }

    #[tokio::test]
    async fn test_not_found_is_never_retried() {
        let h = harness(signed_in(), no_refresh_expected()).await;
        let script = Script::new(vec![json(404, r#"{"detail":"Not found."}"#)]);

        let outcome = h.executor.execute("patient-profile", script.request_fn()).await;

        let failure = outcome.into_result().unwrap_err();
        assert_eq!(failure.kind, FailureKind::NotFound);
        assert_eq!(failure.message, "Not found.");
        assert_eq!(script.calls().len(), 1);
        assert_eq!(h.schemes.resolve("patient-profile").await, None);
    }

    #[tokio::test]
    async fn test_not_found_with_cached_scheme_is_one_call() {
        let h = harness(signed_in(), no_refresh_expected()).await;
        h.schemes.remember("patient-profile", AuthScheme::Token).await;
        let script = Script::new(vec![status(404)]);

        let failure = h
            .executor
            .execute("patient-profile", script.request_fn())
            .await
            .into_result()
            .unwrap_err();

        assert_eq!(failure.kind, FailureKind::NotFound);
        assert_eq!(script.calls().len(), 1);
        assert_eq!(
            h.schemes.resolve("patient-profile").await,
            Some(AuthScheme::Token)
        );
    }

    #[tokio::test]
    async fn test_validation_error_stops_trial() {
        let h = harness(signed_in(), no_refresh_expected()).await;
        let script = Script::new(vec![
            status(401),
            json(400, r#"{"dose_date":["This field is required."]}"#),
        ]);

        let failure = h
            .executor
            .execute("vaccination-schedules", script.request_fn())
            .await
            .into_result()
            .unwrap_err();

        assert_eq!(failure.kind, FailureKind::Validation);
        assert_eq!(
            failure.body.unwrap()["dose_date"][0],
            "This field is required."
        );
        assert_eq!(script.schemes(), vec![AuthScheme::Jwt, AuthScheme::Token]);
    }

    #[tokio::test]
    async fn test_trial_never_exceeds_scheme_count() {
        let h = harness(signed_in(), no_refresh_expected()).await;
        let script = Script::new(vec![status(401), status(403), status(401), status(200)]);

        let failure = h
            .executor
            .execute("doctor-profile", script.request_fn())
            .await
            .into_result()
            .unwrap_err();

        assert_eq!(failure.kind, FailureKind::AuthRejected);
        assert_eq!(
            script.schemes(),
            vec![AuthScheme::Jwt, AuthScheme::Token, AuthScheme::Bearer]
        );
    }

    #[tokio::test]
    async fn test_most_informative_failure_prefers_json_body() {
        let h = harness(signed_in(), no_refresh_expected()).await;
        let script = Script::new(vec![
            status(401),
            json(401, r#"{"detail":"Invalid token header."}"#),
            status(403),
        ]);

        let failure = h
            .executor
            .execute("review", script.request_fn())
            .await
            .into_result()
            .unwrap_err();

        assert_eq!(failure.message, "Invalid token header.");
        assert_eq!(failure.status, Some(401));
    }

    #[tokio::test]
    async fn test_transport_errors_continue_the_trial() {
        let h = harness(signed_in(), no_refresh_expected()).await;
        let script = Script::new(vec![unreachable(), json(201, r#"{"id":1}"#)]);

        let outcome = h.executor.execute("review", script.request_fn()).await;

        assert!(outcome.is_success());
        assert_eq!(h.schemes.resolve("review").await, Some(AuthScheme::Token));
    }

    #[tokio::test]
    async fn test_all_transport_errors_return_first() {
        let h = harness(signed_in(), no_refresh_expected()).await;
        let script = Script::new(vec![unreachable(), unreachable(), unreachable()]);

        let failure = h
            .executor
            .execute("review", script.request_fn())
            .await
            .into_result()
            .unwrap_err();

        assert_eq!(failure.kind, FailureKind::Transport);
        assert_eq!(failure.status, None);
    }

    #[tokio::test]
    async fn test_cached_rejection_forgets_before_retrying() {
        let h = harness(signed_in(), no_refresh_expected()).await;
        h.schemes.remember("vaccines", AuthScheme::Bearer).await;

        let schemes = h.schemes.clone();
        let seen_cache = Arc::new(Mutex::new(Vec::new()));
        let calls = Arc::new(Mutex::new(0usize));

        let request_fn = {
            let seen_cache = seen_cache.clone();
            let calls = calls.clone();
            move |_token: String, scheme: AuthScheme| {
                let schemes = schemes.clone();
                let seen_cache = seen_cache.clone();
                let calls = calls.clone();
                async move {
                    let n = {
                        let mut calls = calls.lock().unwrap();
                        *calls += 1;
                        *calls
                    };
                    seen_cache
                        .lock()
                        .unwrap()
                        .push(schemes.resolve("vaccines").await);
                    if n == 1 {
                        assert_eq!(scheme, AuthScheme::Bearer);
                        Ok(HttpResponse::new(403, ""))
                    } else {
                        Ok(HttpResponse::new(200, "[]"))
                    }
                }
            }
        };

        let outcome = h.executor.execute("vaccines", request_fn).await;

        assert!(outcome.is_success());
        let seen = seen_cache.lock().unwrap().clone();
        assert_eq!(seen, vec![Some(AuthScheme::Bearer), None]);
        assert_eq!(h.schemes.resolve("vaccines").await, Some(AuthScheme::Jwt));
    }

    #[tokio::test]
    async fn test_restored_session_refreshes_then_runs_trial_again() {
        let mut refresher = MockTokenRefresher::new();
        refresher
            .expect_refresh_if_needed()
            .withf(|failure, sent| failure.status == Some(401) && sent == "access-1")
            .times(1)
            .returning(|_, _| Some(CredentialPair::new("access-2", Some("refresh-1".to_string()))));

        let h = harness(signed_in(), refresher).await;
        let script = Script::new(vec![
            status(401),
            status(401),
            status(401),
            json(200, r#"{"id":7}"#),
        ]);

        let outcome = h.executor.execute("patient-profile", script.request_fn()).await;

        assert!(outcome.is_success());
        let calls = script.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[3], ("access-2".to_string(), AuthScheme::Jwt));
        assert_eq!(
            h.schemes.resolve("patient-profile").await,
            Some(AuthScheme::Jwt)
        );
    }

    #[tokio::test]
    async fn test_restored_session_retrial_does_not_refresh_twice() {
        let mut refresher = MockTokenRefresher::new();
        refresher
            .expect_refresh_if_needed()
            .times(1)
            .returning(|_, _| Some(CredentialPair::new("access-2", Some("refresh-1".to_string()))));

        let h = harness(signed_in(), refresher).await;
        let script = Script::new((0..6).map(|_| status(401)).collect());

        let failure = h
            .executor
            .execute("patient-profile", script.request_fn())
            .await
            .into_result()
            .unwrap_err();

        assert_eq!(failure.kind, FailureKind::AuthRejected);
        assert_eq!(script.calls().len(), 6);
        assert_eq!(script.calls()[5].0, "access-2");
    }

    #[tokio::test]
    async fn test_restored_session_with_rejected_refresh_expires() {
        let mut refresher = MockTokenRefresher::new();
        refresher
            .expect_refresh_if_needed()
            .times(1)
            .returning(|_, _| None);

        let h = harness(signed_in(), refresher).await;
        let script = Script::new(vec![status(401), status(401), status(401)]);

        let failure = h
            .executor
            .execute("vaccination-schedules", script.request_fn())
            .await
            .into_result()
            .unwrap_err();

        assert_eq!(failure.kind, FailureKind::SessionExpired);
        assert_eq!(script.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_all_401_without_refresh_token_is_rejected() {
        let h = harness(
            Some(CredentialPair::new("access-1", None)),
            no_refresh_expected(),
        )
        .await;
        let script = Script::new(vec![status(401), status(401), status(401)]);

        let failure = h
            .executor
            .execute("patient-profile", script.request_fn())
            .await
            .into_result()
            .unwrap_err();

        assert_eq!(failure.kind, FailureKind::AuthRejected);
        assert_eq!(script.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_expired_token_refreshes_and_replays_once() {
        let mut refresher = MockTokenRefresher::new();
        refresher
            .expect_refresh_if_needed()
            .withf(|failure, sent| failure.status == Some(401) && sent == "access-1")
            .times(1)
            .returning(|_, _| Some(CredentialPair::new("access-2", Some("refresh-1".to_string()))));

        let h = harness(signed_in(), refresher).await;
        h.schemes.remember("patient-profile", AuthScheme::Jwt).await;
        let script = Script::new(vec![
            status(401),
            status(401),
            status(401),
            status(401),
            json(200, r#"{"id":7}"#),
        ]);

        let outcome = h.executor.execute("patient-profile", script.request_fn()).await;

        assert!(outcome.is_success());
        let calls = script.calls();
        assert_eq!(calls.len(), 5);
        assert_eq!(calls[4], ("access-2".to_string(), AuthScheme::Jwt));
        assert_eq!(
            h.schemes.resolve("patient-profile").await,
            Some(AuthScheme::Jwt)
        );
    }

    #[tokio::test]
    async fn test_failed_refresh_reports_session_expired() {
        let mut refresher = MockTokenRefresher::new();
        refresher
            .expect_refresh_if_needed()
            .times(1)
            .returning(|_, _| None);

        let h = harness(signed_in(), refresher).await;
        h.schemes.remember("vaccination-schedules", AuthScheme::Jwt).await;
        let script = Script::new(vec![status(401), status(401), status(401), status(401)]);

        let failure = h
            .executor
            .execute("vaccination-schedules", script.request_fn())
            .await
            .into_result()
            .unwrap_err();

        assert_eq!(failure.kind, FailureKind::SessionExpired);
        assert_eq!(script.calls().len(), 4);
        assert!(h.token_store.get().await.is_some());
    }

    #[tokio::test]
    async fn test_mixed_401_403_after_cache_does_not_refresh() {
        let h = harness(signed_in(), no_refresh_expected()).await;
        h.schemes.remember("review", AuthScheme::Jwt).await;
        let script = Script::new(vec![status(401), status(401), status(403), status(401)]);

        let failure = h
            .executor
            .execute("review", script.request_fn())
            .await
            .into_result()
            .unwrap_err();

        assert_eq!(failure.kind, FailureKind::AuthRejected);
        assert_eq!(script.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_custom_order_is_respected() {
        let token_store = Arc::new(TokenStore::new(Arc::new(MemoryStore::default()), "authTokens"));
        token_store.set(CredentialPair::new("t", None)).await.unwrap();
        let executor = AuthenticatedExecutor::new(
            token_store,
            Arc::new(SchemeCache::new()),
            Arc::new(no_refresh_expected()),
            vec![AuthScheme::Bearer, AuthScheme::None],
            EventBus::new(4),
        );
        let script = Script::new(vec![status(401), status(200)]);

        assert!(executor.execute("vaccines", script.request_fn()).await.is_success());
        assert_eq!(script.schemes(), vec![AuthScheme::Bearer, AuthScheme::None]);
    }

    #[test]
    fn test_failure_kind_from_status() {
        assert_eq!(FailureKind::from_status(400), FailureKind::Validation);
        assert_eq!(FailureKind::from_status(403), FailureKind::AuthRejected);
        assert_eq!(FailureKind::from_status(404), FailureKind::NotFound);
        assert_eq!(FailureKind::from_status(502), FailureKind::Http);
    }

    #[test]
    fn test_failure_message_fallback() {
        let failure = RequestFailure::from_response(&HttpResponse::new(500, "<html>"));
        assert_eq!(failure.message, "Request failed with status 500");
        assert!(failure.body.is_none());
    }
}
