//! Stateless HTTP request builder and response parser for the backend API.
//!
//! # Design
//! `BackendClient` holds only the base URL and the optional API key, and
//! carries no mutable state between calls. Each endpoint is split into a
//! `build_*` method that produces an `HttpRequest` and a `parse_*` method that
//! consumes an `HttpResponse`. The token is passed in per call; owning it, and
//! reacting to its expiry, is `ApiClient`'s job.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::ClientConfig;
use crate::envelope::Envelope;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::{
    AuthResponse, DeleteResult, ListQuery, LoginRequest, PaginatedResult, RegisterRequest, User,
};

/// Characters left unescaped in path segments and query values.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Synchronous, stateless client for the backend API.
#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: String,
    api_key: Option<String>,
}

impl BackendClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            ..Self::new(&config.base_url)
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // -----------------------------------------------------------------------
    // Auth
    // -----------------------------------------------------------------------

    pub fn build_login(&self, input: &LoginRequest) -> Result<HttpRequest, ApiError> {
        self.request_with_body(HttpMethod::Post, "/auth/login".to_string(), None, input)
    }

    pub fn build_current_user(&self, token: &str) -> HttpRequest {
        self.request(HttpMethod::Get, "/auth/me".to_string(), Some(token))
    }

    pub fn build_register(&self, input: &RegisterRequest) -> Result<HttpRequest, ApiError> {
        self.request_with_body(HttpMethod::Post, "/auth/register".to_string(), None, input)
    }

    pub fn build_logout(&self, token: &str) -> HttpRequest {
        self.request(HttpMethod::Post, "/auth/logout".to_string(), Some(token))
    }

    pub fn parse_login(&self, response: HttpResponse) -> Result<AuthResponse, ApiError> {
        check_status(&response)?;
        let auth: AuthResponse = Envelope::parse(&response.body)?.into_payload()?;
        if auth.access_token.is_empty() {
            return Err(ApiError::unauthenticated(
                "login response carried no access token",
            ));
        }
        Ok(auth)
    }

    pub fn parse_current_user(&self, response: HttpResponse) -> Result<User, ApiError> {
        check_status(&response)?;
        Envelope::parse(&response.body)?.into_document()
    }

    /// Registration answers `{user}`; a bare user object is accepted as well.
    pub fn parse_register(&self, response: HttpResponse) -> Result<User, ApiError> {
        check_status(&response)?;
        #[derive(Deserialize)]
        struct Registered {
            user: serde_json::Value,
        }
        let value: serde_json::Value = serde_json::from_str(&response.body)?;
        match serde_json::from_value::<Registered>(value.clone()) {
            Ok(registered) => Envelope::classify(registered.user)?.into_document(),
            Err(_) => Envelope::classify(value)?.into_document(),
        }
    }

    pub fn parse_logout(&self, response: HttpResponse) -> Result<(), ApiError> {
        check_status(&response)
    }

    // -----------------------------------------------------------------------
    // Documents
    // -----------------------------------------------------------------------

    pub fn build_list_documents(&self, token: &str, collection: &str, query: &ListQuery) -> HttpRequest {
        let mut path = documents_path(collection);
        let pairs = query.pairs();
        if !pairs.is_empty() {
            let encoded: Vec<String> = pairs
                .iter()
                .map(|(key, value)| format!("{key}={}", encode(value)))
                .collect();
            path.push('?');
            path.push_str(&encoded.join("&"));
        }
        self.request(HttpMethod::Get, path, Some(token))
    }

    pub fn build_create_document<P: Serialize>(
        &self,
        token: &str,
        collection: &str,
        payload: &P,
    ) -> Result<HttpRequest, ApiError> {
        self.request_with_body(HttpMethod::Post, documents_path(collection), Some(token), payload)
    }

    /// Partial update: only the fields present in `payload` are changed.
    pub fn build_update_document<P: Serialize>(
        &self,
        token: &str,
        collection: &str,
        id: &str,
        payload: &P,
    ) -> Result<HttpRequest, ApiError> {
        self.request_with_body(
            HttpMethod::Patch,
            document_path(collection, id),
            Some(token),
            payload,
        )
    }

    pub fn build_delete_document(&self, token: &str, collection: &str, id: &str) -> HttpRequest {
        self.request(HttpMethod::Delete, document_path(collection, id), Some(token))
    }

    pub fn parse_list_documents<T: DeserializeOwned>(
        &self,
        response: HttpResponse,
    ) -> Result<PaginatedResult<T>, ApiError> {
        check_status(&response)?;
        Envelope::parse(&response.body)?.into_page()
    }

    /// Shared by create and update: both answer with the stored document.
    pub fn parse_document<T: DeserializeOwned>(&self, response: HttpResponse) -> Result<T, ApiError> {
        check_status(&response)?;
        Envelope::parse(&response.body)?.into_document()
    }

    pub fn parse_delete_document(&self, response: HttpResponse) -> Result<DeleteResult, ApiError> {
        check_status(&response)?;
        if response.body.trim().is_empty() {
            return Ok(DeleteResult::default());
        }
        Envelope::parse(&response.body)?.into_payload()
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn request(&self, method: HttpMethod, path: String, token: Option<&str>) -> HttpRequest {
        let mut headers = vec![("accept".to_string(), "application/json".to_string())];
        if let Some(key) = &self.api_key {
            headers.push(("x-api-key".to_string(), key.clone()));
        }
        if let Some(token) = token {
            headers.push(("authorization".to_string(), format!("Bearer {token}")));
        }
        HttpRequest {
            method,
            path: format!("{}{path}", self.base_url),
            headers,
            body: None,
        }
    }

    fn request_with_body<P: Serialize>(
        &self,
        method: HttpMethod,
        path: String,
        token: Option<&str>,
        payload: &P,
    ) -> Result<HttpRequest, ApiError> {
        let body = serde_json::to_string(payload).map_err(|e| ApiError::Serialization(e.to_string()))?;
        let mut req = self.request(method, path, token);
        req.headers
            .push(("content-type".to_string(), "application/json".to_string()));
        req.body = Some(body);
        Ok(req)
    }
}

fn encode(component: &str) -> String {
    utf8_percent_encode(component, COMPONENT).to_string()
}

fn documents_path(collection: &str) -> String {
    format!("/collections/{}/documents", encode(collection))
}

fn document_path(collection: &str, id: &str) -> String {
    format!("{}/{}", documents_path(collection), encode(id))
}

/// Map a non-2xx response to the matching `ApiError` variant.
fn check_status(response: &HttpResponse) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    Err(ApiError::from_status(response.status, error_message(response)))
}

/// The backend reports `message` as a string or a list of strings.
fn error_message(response: &HttpResponse) -> String {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Message {
        One(String),
        Many(Vec<String>),
    }

    #[derive(Deserialize)]
    struct Body {
        #[serde(alias = "error")]
        message: Option<Message>,
    }

    match serde_json::from_str::<Body>(&response.body) {
        Ok(Body {
            message: Some(Message::One(message)),
        }) if !message.is_empty() => message,
        Ok(Body {
            message: Some(Message::Many(messages)),
        }) if !messages.is_empty() => messages.join("; "),
        _ if !response.body.trim().is_empty() && !response.body.trim_start().starts_with('{') => {
            response.body.trim().to_string()
        }
        _ => format!("request failed with status {}", response.status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CreateTask, Priority, Task, UpdateTask};

    fn client() -> BackendClient {
        BackendClient::new("http://localhost:3000")
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    const TASK: &str = r#"{"id":"t1","title":"Buy milk","status":false,"priority":"low","created_at":"2024-01-01T00:00:00Z","updated_at":"2024-01-01T00:00:00Z"}"#;

    #[test]
    fn build_login_produces_correct_request() {
        let req = client()
            .build_login(&LoginRequest {
                email: "ana@example.com".to_string(),
                password: "secret".to_string(),
            })
            .unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.path, "http://localhost:3000/auth/login");
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert!(req.bearer_token().is_none());
        let body: serde_json::Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["email"], "ana@example.com");
        assert_eq!(body["password"], "secret");
    }

    #[test]
    fn build_current_user_attaches_bearer_token() {
        let req = client().build_current_user("tok");
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.path, "http://localhost:3000/auth/me");
        assert_eq!(req.header("authorization"), Some("Bearer tok"));
        assert!(req.body.is_none());
    }

    #[test]
    fn api_key_is_sent_on_every_request() {
        let client = client().with_api_key("key-1");
        assert_eq!(client.build_logout("tok").header("x-api-key"), Some("key-1"));
        assert_eq!(
            client
                .build_register(&RegisterRequest {
                    email: "a@b.c".to_string(),
                    password: "pw".to_string(),
                    full_name: "A B".to_string(),
                })
                .unwrap()
                .header("x-api-key"),
            Some("key-1")
        );
    }

    #[test]
    fn build_list_documents_passes_query_through() {
        let query = ListQuery {
            sort: Some("-created_at".to_string()),
            per_page: Some(100),
            ..ListQuery::default()
        };
        let req = client().build_list_documents("tok", "task", &query);
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(
            req.path,
            "http://localhost:3000/collections/task/documents?sort=-created_at&per_page=100"
        );
    }

    #[test]
    fn build_list_documents_without_query_has_no_question_mark() {
        let req = client().build_list_documents("tok", "task", &ListQuery::default());
        assert_eq!(req.path, "http://localhost:3000/collections/task/documents");
    }

    #[test]
    fn path_segments_are_encoded() {
        let req = client().build_delete_document("tok", "my tasks", "a/b");
        assert_eq!(req.method, HttpMethod::Delete);
        assert_eq!(
            req.path,
            "http://localhost:3000/collections/my%20tasks/documents/a%2Fb"
        );
    }

    #[test]
    fn build_create_document_serializes_payload() {
        let mut input = CreateTask::new("Buy milk");
        input.priority = Priority::Low;
        let req = client().build_create_document("tok", "task", &input).unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        let body: serde_json::Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["title"], "Buy milk");
        assert_eq!(body["status"], false);
        assert_eq!(body["priority"], "low");
        assert!(body.get("due_date").is_none());
    }

    #[test]
    fn build_update_document_is_a_partial_patch() {
        let input = UpdateTask {
            status: Some(true),
            ..UpdateTask::default()
        };
        let req = client().build_update_document("tok", "task", "t1", &input).unwrap();
        assert_eq!(req.method, HttpMethod::Patch);
        assert_eq!(req.path, "http://localhost:3000/collections/task/documents/t1");
        let body: serde_json::Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, serde_json::json!({"status": true}));
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let client = BackendClient::new("http://localhost:3000/");
        assert_eq!(client.build_current_user("t").path, "http://localhost:3000/auth/me");
    }

    #[test]
    fn parse_login_success() {
        let body = r#"{"access_token":"abc","token_type":"bearer","expires_in":3600}"#;
        let auth = client().parse_login(response(200, body)).unwrap();
        assert_eq!(auth.access_token, "abc");
        assert!(auth.user.is_none());
    }

    #[test]
    fn parse_login_invalid_credentials() {
        let err = client()
            .parse_login(response(401, r#"{"message":"Invalid credentials","statusCode":401}"#))
            .unwrap_err();
        assert_eq!(err, ApiError::from_status(401, "Invalid credentials".to_string()));
    }

    #[test]
    fn parse_register_accepts_user_envelope() {
        let body = r#"{"user":{"id":"u1","email":"a@b.c","full_name":"A B","created_at":"2024-01-01T00:00:00Z","updated_at":"2024-01-01T00:00:00Z"}}"#;
        let user = client().parse_register(response(201, body)).unwrap();
        assert_eq!(user.full_name, "A B");
    }

    #[test]
    fn parse_document_wrapped_in_data() {
        let body = format!(r#"{{"data":{TASK}}}"#);
        let task: Task = client().parse_document(response(201, &body)).unwrap();
        assert_eq!(task.id, "t1");
    }

    #[test]
    fn parse_list_documents_bare_array() {
        let body = format!("[{TASK}]");
        let page: PaginatedResult<Task> = client().parse_list_documents(response(200, &body)).unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.meta.total, 1);
    }

    #[test]
    fn validation_messages_are_joined() {
        let err = client()
            .parse_document::<Task>(response(
                422,
                r#"{"message":["title is required","priority is invalid"]}"#,
            ))
            .unwrap_err();
        assert_eq!(
            err,
            ApiError::Validation {
                status: Some(422),
                message: "title is required; priority is invalid".to_string(),
            }
        );
    }

    #[test]
    fn parse_delete_document_not_found() {
        let err = client()
            .parse_delete_document(response(404, r#"{"message":"Document not found"}"#))
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound { .. }));
    }

    #[test]
    fn parse_delete_document_success() {
        let result = client()
            .parse_delete_document(response(
                200,
                r#"{"message":"Document deleted","id":"t1","collection":"task"}"#,
            ))
            .unwrap();
        assert_eq!(result.id.as_deref(), Some("t1"));
        assert_eq!(result.collection.as_deref(), Some("task"));
    }

    #[test]
    fn server_error_with_plain_text_body() {
        let err = client()
            .parse_current_user(response(502, "upstream unavailable"))
            .unwrap_err();
        assert_eq!(
            err,
            ApiError::Http {
                status: 502,
                message: "upstream unavailable".to_string()
            }
        );
    }

    #[test]
    fn parse_current_user_bad_json() {
        let err = client().parse_current_user(response(200, "not json")).unwrap_err();
        assert!(matches!(err, ApiError::Deserialization(_)));
    }
}
