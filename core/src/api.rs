//! The stateful API client: the only component that talks to the backend.
//!
//! # Design
//! `ApiClient` composes the stateless `BackendClient` with a `Transport`, and
//! owns the two copies of the bearer token: the one attached to requests and
//! the one persisted through a `TokenStore`. Both copies are only ever changed
//! together, through `set_credentials` and `clear_credentials`.
//!
//! `login` commits a new token only after the profile fetch with it succeeds,
//! so a half-finished login never leaves the two copies out of step.
//!
//! Every exchange goes through `send`, which hosts the single 401 interceptor.
//! When a request that carried a bearer token comes back 401, the token is
//! cleared (if it is still the one in use, so a late response cannot wipe a
//! newer login) and the unauthorized hook fires. Requests without a token,
//! such as a failed login, never trip the interceptor.

use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::client::BackendClient;
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};
use crate::sync::lock;
use crate::token_store::TokenStore;
use crate::transport::Transport;
use crate::types::{
    DeleteResult, ListQuery, LoginOutcome, LoginRequest, PaginatedResult, RegisterRequest, User,
};

/// Called once each time the held token is invalidated by a 401.
pub type UnauthorizedHook = Box<dyn Fn() + Send + Sync>;

pub struct ApiClient<T> {
    backend: BackendClient,
    transport: T,
    token: Mutex<Option<String>>,
    token_store: Box<dyn TokenStore>,
    on_unauthorized: Mutex<Option<UnauthorizedHook>>,
}

impl<T: Transport> ApiClient<T> {
    pub fn new(backend: BackendClient, transport: T, token_store: impl TokenStore + 'static) -> Self {
        Self {
            backend,
            transport,
            token: Mutex::new(None),
            token_store: Box::new(token_store),
            on_unauthorized: Mutex::new(None),
        }
    }

    pub fn from_config(config: &ClientConfig, transport: T, token_store: impl TokenStore + 'static) -> Self {
        Self::new(BackendClient::from_config(config), transport, token_store)
    }

    pub fn backend(&self) -> &BackendClient {
        &self.backend
    }

    /// Register the hook run when a 401 invalidates the token. Replaces any
    /// previously registered hook.
    pub fn on_unauthorized(&self, hook: impl Fn() + Send + Sync + 'static) {
        *lock(&self.on_unauthorized) = Some(Box::new(hook));
    }

    // -----------------------------------------------------------------------
    // Credentials
    // -----------------------------------------------------------------------

    pub fn token(&self) -> Option<String> {
        lock(&self.token).clone()
    }

    /// Load the persisted token into memory. Returns the token, if any.
    pub fn restore_credentials(&self) -> Result<Option<String>, ApiError> {
        let persisted = self.token_store.load()?;
        *lock(&self.token) = persisted.clone();
        Ok(persisted)
    }

    /// Persist `token` and start attaching it to requests.
    pub fn set_credentials(&self, token: &str) -> Result<(), ApiError> {
        self.token_store.save(token)?;
        *lock(&self.token) = Some(token.to_string());
        Ok(())
    }

    /// Drop the token from memory and from storage. A storage failure is
    /// logged; the in-memory token is gone regardless.
    pub fn clear_credentials(&self) {
        lock(&self.token).take();
        if let Err(e) = self.token_store.clear() {
            warn!(error = %e, "failed to clear persisted token");
        }
    }

    // -----------------------------------------------------------------------
    // Exchange
    // -----------------------------------------------------------------------

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let carried = request.bearer_token().map(str::to_string);
        debug!(method = request.method.as_str(), path = %request.path, "sending request");
        let response = self.transport.execute(request).await?;
        debug!(status = response.status, "received response");

        if response.status == 401 {
            if let Some(carried) = carried {
                self.expire(&carried);
            }
        }
        Ok(response)
    }

    fn expire(&self, carried: &str) {
        {
            let mut token = lock(&self.token);
            if token.as_deref() != Some(carried) {
                debug!("ignoring 401 for a token that is no longer in use");
                return;
            }
            token.take();
        }
        warn!("bearer token rejected, clearing session");
        if let Err(e) = self.token_store.clear() {
            warn!(error = %e, "failed to clear persisted token");
        }
        if let Some(hook) = lock(&self.on_unauthorized).as_ref() {
            hook();
        }
    }

    fn require_token(&self) -> Result<String, ApiError> {
        self.token()
            .ok_or_else(|| ApiError::unauthenticated("not authenticated"))
    }

    // -----------------------------------------------------------------------
    // Auth
    // -----------------------------------------------------------------------

    /// Exchange credentials for a token and fetch the profile with it. The
    /// token is installed only once the profile arrives; on any failure the
    /// credentials held before the call stay in place.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, ApiError> {
        let request = self.backend.build_login(&LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        })?;
        let auth = self.backend.parse_login(self.send(request).await?)?;
        let user = self.fetch_profile(&auth.access_token).await?;
        self.set_credentials(&auth.access_token)?;
        Ok(LoginOutcome {
            token: auth.access_token,
            user,
        })
    }

    pub async fn current_user(&self) -> Result<User, ApiError> {
        let token = self.require_token()?;
        self.fetch_profile(&token).await
    }

    async fn fetch_profile(&self, token: &str) -> Result<User, ApiError> {
        let request = self.backend.build_current_user(token);
        self.backend.parse_current_user(self.send(request).await?)
    }

    pub async fn register(&self, email: &str, password: &str, full_name: &str) -> Result<User, ApiError> {
        let request = self.backend.build_register(&RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            full_name: full_name.to_string(),
        })?;
        self.backend.parse_register(self.send(request).await?)
    }

    /// Server-side invalidation of `token`. Local state is not touched; the
    /// session clears credentials before calling this.
    pub async fn logout(&self, token: &str) -> Result<(), ApiError> {
        let request = self.backend.build_logout(token);
        self.backend.parse_logout(self.send(request).await?)
    }

    // -----------------------------------------------------------------------
    // Documents
    // -----------------------------------------------------------------------

    pub async fn list_documents<D: DeserializeOwned>(
        &self,
        collection: &str,
        query: &ListQuery,
    ) -> Result<PaginatedResult<D>, ApiError> {
        let token = self.require_token()?;
        let request = self.backend.build_list_documents(&token, collection, query);
        self.backend.parse_list_documents(self.send(request).await?)
    }

    pub async fn create_document<P: Serialize, D: DeserializeOwned>(
        &self,
        collection: &str,
        payload: &P,
    ) -> Result<D, ApiError> {
        let token = self.require_token()?;
        let request = self.backend.build_create_document(&token, collection, payload)?;
        self.backend.parse_document(self.send(request).await?)
    }

    pub async fn update_document<P: Serialize, D: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
        payload: &P,
    ) -> Result<D, ApiError> {
        let token = self.require_token()?;
        let request = self.backend.build_update_document(&token, collection, id, payload)?;
        self.backend.parse_document(self.send(request).await?)
    }

    pub async fn delete_document(&self, collection: &str, id: &str) -> Result<DeleteResult, ApiError> {
        let token = self.require_token()?;
        let request = self.backend.build_delete_document(&token, collection, id);
        self.backend.parse_delete_document(self.send(request).await?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::http::HttpMethod;
    use crate::token_store::MemoryTokenStore;
    use crate::types::Task;

    /// Answers requests from a queue and records what was sent.
    #[derive(Default, Clone)]
    pub(crate) struct StubTransport {
        responses: Arc<Mutex<VecDeque<Result<HttpResponse, ApiError>>>>,
        pub(crate) sent: Arc<Mutex<Vec<HttpRequest>>>,
    }

    impl StubTransport {
        pub(crate) fn reply(&self, status: u16, body: &str) -> &Self {
            lock(&self.responses).push_back(Ok(HttpResponse {
                status,
                headers: Vec::new(),
                body: body.to_string(),
            }));
            self
        }

        pub(crate) fn fail(&self, error: ApiError) -> &Self {
            lock(&self.responses).push_back(Err(error));
            self
        }

        pub(crate) fn sent(&self) -> Vec<HttpRequest> {
            lock(&self.sent).clone()
        }
    }

    impl Transport for StubTransport {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
            lock(&self.sent).push(request);
            lock(&self.responses)
                .pop_front()
                .unwrap_or_else(|| Err(ApiError::Network("no stubbed response".to_string())))
        }
    }

    pub(crate) const USER: &str = r#"{"id":"u1","email":"ana@example.com","first_name":"Ana","last_name":"Diaz","role":"admin","created_at":"2024-01-01T00:00:00Z","updated_at":"2024-01-01T00:00:00Z"}"#;

    fn api(stub: &StubTransport, store: MemoryTokenStore) -> ApiClient<StubTransport> {
        ApiClient::new(BackendClient::new("http://api.test"), stub.clone(), store)
    }

    #[tokio::test]
    async fn login_installs_token_and_fetches_profile() {
        let stub = StubTransport::default();
        stub.reply(200, r#"{"access_token":"tok-1","token_type":"bearer"}"#)
            .reply(200, USER);
        let api = api(&stub, MemoryTokenStore::new());

        let outcome = api.login("ana@example.com", "pw").await.unwrap();
        assert_eq!(outcome.token, "tok-1");
        assert_eq!(outcome.user.full_name, "Ana Diaz");
        assert_eq!(api.token().as_deref(), Some("tok-1"));
        assert_eq!(api.token_store.load().unwrap().as_deref(), Some("tok-1"));

        let sent = stub.sent();
        assert_eq!(sent[1].path, "http://api.test/auth/me");
        assert_eq!(sent[1].bearer_token(), Some("tok-1"));
    }

    #[tokio::test]
    async fn failed_profile_fetch_keeps_previous_credentials() {
        let stub = StubTransport::default();
        stub.reply(200, r#"{"access_token":"tok2"}"#)
            .reply(500, r#"{"message":"profile service down"}"#)
            .reply(200, r#"{"access_token":"tok3"}"#)
            .reply(401, r#"{"message":"Token expired"}"#);
        let api = api(&stub, MemoryTokenStore::with_token("tok"));
        api.restore_credentials().unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        api.on_unauthorized(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let err = api.login("ana@example.com", "pw").await.unwrap_err();
        assert_eq!(err.status_code(), Some(500));
        assert_eq!(api.token().as_deref(), Some("tok"));
        assert_eq!(api.token_store.load().unwrap().as_deref(), Some("tok"));

        // a 401 for the uncommitted token does not sign out the current one
        let err = api.login("ana@example.com", "pw").await.unwrap_err();
        assert!(err.is_auth());
        assert_eq!(api.token().as_deref(), Some("tok"));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(stub.sent()[1].bearer_token(), Some("tok2"));
    }

    #[tokio::test]
    async fn failed_login_does_not_trip_interceptor() {
        let stub = StubTransport::default();
        stub.reply(401, r#"{"message":"Invalid credentials"}"#);
        let api = api(&stub, MemoryTokenStore::with_token("old"));
        api.restore_credentials().unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        api.on_unauthorized(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let err = api.login("ana@example.com", "wrong").await.unwrap_err();
        assert!(err.is_auth());
        assert_eq!(api.token().as_deref(), Some("old"));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unauthorized_response_clears_both_copies_and_fires_hook() {
        let stub = StubTransport::default();
        stub.reply(401, r#"{"message":"Token expired","statusCode":401}"#);
        let api = api(&stub, MemoryTokenStore::with_token("tok"));
        api.restore_credentials().unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        api.on_unauthorized(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let err = api
            .list_documents::<Task>("task", &ListQuery::default())
            .await
            .unwrap_err();
        assert_eq!(err, ApiError::from_status(401, "Token expired".to_string()));
        assert_eq!(api.token(), None);
        assert_eq!(api.token_store.load().unwrap(), None);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_unauthorized_response_keeps_newer_token() {
        let stub = StubTransport::default();
        stub.reply(401, "");
        let api = api(&stub, MemoryTokenStore::new());
        api.set_credentials("new").unwrap();

        // a late response for a token that was already replaced
        api.logout("old").await.unwrap_err();
        assert_eq!(api.token().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn document_calls_require_a_token() {
        let stub = StubTransport::default();
        let api = api(&stub, MemoryTokenStore::new());
        let err = api.delete_document("task", "t1").await.unwrap_err();
        assert!(err.is_auth());
        assert!(stub.sent().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_propagates_as_network_error() {
        let stub = StubTransport::default();
        stub.fail(ApiError::Network("connection refused".to_string()));
        let api = api(&stub, MemoryTokenStore::new());
        api.set_credentials("tok").unwrap();

        let err = api.current_user().await.unwrap_err();
        assert_eq!(err, ApiError::Network("connection refused".to_string()));
        assert_eq!(api.token().as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn update_uses_patch_with_token() {
        let stub = StubTransport::default();
        stub.reply(
            200,
            r#"{"data":{"id":"t1","title":"Renamed","created_at":"2024-01-01T00:00:00Z","updated_at":"2024-01-02T00:00:00Z"}}"#,
        );
        let api = api(&stub, MemoryTokenStore::new());
        api.set_credentials("tok").unwrap();

        let task: Task = api
            .update_document("task", "t1", &serde_json::json!({"title": "Renamed"}))
            .await
            .unwrap();
        assert_eq!(task.title, "Renamed");
        let sent = stub.sent();
        assert_eq!(sent[0].method, HttpMethod::Patch);
        assert_eq!(sent[0].bearer_token(), Some("tok"));
    }
}
