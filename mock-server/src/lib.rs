use std::{cmp::Ordering, collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// Response shape used for collection listings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EnvelopeStyle {
    /// `{"data": [..], "meta": {..}}`
    #[default]
    Paginated,
    /// `{"data": {"data": [..], "meta": {..}}}`
    Nested,
    /// `[..]`
    BareArray,
}

#[derive(Clone, Debug, Serialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub full_name: String,
    pub role: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Clone, Debug)]
struct Account {
    user: User,
    password: String,
}

#[derive(Default)]
pub struct Backend {
    accounts: HashMap<String, Account>,
    tokens: HashMap<String, String>,
    collections: HashMap<String, Vec<Map<String, Value>>>,
    envelope: EnvelopeStyle,
    omit_ids: bool,
    profile_fetches: usize,
    logout_calls: usize,
}

pub type Db = Arc<RwLock<Backend>>;

/// Handle onto the backend's state, shared with the router.
#[derive(Clone, Default)]
pub struct MockState {
    db: Db,
}

impl MockState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, email: &str, password: &str, first_name: &str, last_name: &str) -> User {
        let now = timestamp();
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            first_name: Some(first_name.to_string()),
            last_name: Some(last_name.to_string()),
            full_name: format!("{first_name} {last_name}"),
            role: "user".to_string(),
            created_at: now.clone(),
            updated_at: now,
        };
        self.db.write().await.accounts.insert(
            email.to_string(),
            Account {
                user: user.clone(),
                password: password.to_string(),
            },
        );
        user
    }

    /// Issue a token for an existing account without going through login.
    pub async fn issue_token(&self, email: &str) -> Option<String> {
        let mut db = self.db.write().await;
        let user_id = db.accounts.get(email)?.user.id.clone();
        let token = Uuid::new_v4().to_string();
        db.tokens.insert(token.clone(), user_id);
        Some(token)
    }

    /// Invalidate every issued token, as if they all expired.
    pub async fn expire_tokens(&self) {
        self.db.write().await.tokens.clear();
    }

    pub async fn set_envelope(&self, style: EnvelopeStyle) {
        self.db.write().await.envelope = style;
    }

    /// Make create responses omit the document id.
    pub async fn set_omit_ids(&self, omit: bool) {
        self.db.write().await.omit_ids = omit;
    }

    /// Store a document directly, bypassing HTTP. Returns its id.
    pub async fn insert_document(&self, collection: &str, fields: Value) -> String {
        let mut db = self.db.write().await;
        let document = new_document(fields.as_object().cloned().unwrap_or_default());
        let id = document
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        db.collections
            .entry(collection.to_string())
            .or_default()
            .push(document);
        id
    }

    pub async fn documents(&self, collection: &str) -> Vec<Value> {
        let db = self.db.read().await;
        db.collections
            .get(collection)
            .map(|docs| docs.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }

    pub async fn profile_fetches(&self) -> usize {
        self.db.read().await.profile_fetches
    }

    pub async fn logout_calls(&self) -> usize {
        self.db.read().await.logout_calls
    }
}

pub fn app() -> Router {
    app_with(MockState::new())
}

pub fn app_with(state: MockState) -> Router {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
        .route("/auth/register", post(register))
        .route("/auth/logout", post(logout))
        .route(
            "/collections/{name}/documents",
            get(list_documents).post(create_document),
        )
        .route(
            "/collections/{name}/documents/{id}",
            get(get_document)
                .put(update_document)
                .patch(update_document)
                .delete(delete_document),
        )
        .with_state(state.db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with(listener: TcpListener, state: MockState) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with(state)).await
}

/// Error body in the backend's `{message, statusCode}` shape.
pub struct Failure {
    status: StatusCode,
    message: String,
}

impl Failure {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized")
    }

    fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Document not found")
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "message": self.message,
            "statusCode": self.status.as_u16(),
        }));
        (self.status, body).into_response()
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn new_document(mut fields: Map<String, Value>) -> Map<String, Value> {
    let now = timestamp();
    fields.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
    fields.insert("created_at".to_string(), Value::String(now.clone()));
    fields.insert("updated_at".to_string(), Value::String(now));
    fields
}

fn authorize(db: &Backend, headers: &HeaderMap) -> Result<User, Failure> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(Failure::unauthorized)?;
    let user_id = db.tokens.get(token).ok_or_else(Failure::unauthorized)?;
    db.accounts
        .values()
        .find(|account| &account.user.id == user_id)
        .map(|account| account.user.clone())
        .ok_or_else(Failure::unauthorized)
}

// --- auth ---

#[derive(Deserialize)]
pub struct LoginBody {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RegisterBody {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

async fn login(State(db): State<Db>, Json(input): Json<LoginBody>) -> Result<Json<Value>, Failure> {
    let mut db = db.write().await;
    let user = db
        .accounts
        .get(&input.email)
        .filter(|account| account.password == input.password)
        .map(|account| account.user.clone())
        .ok_or_else(|| Failure::new(StatusCode::UNAUTHORIZED, "Invalid credentials"))?;
    let token = Uuid::new_v4().to_string();
    db.tokens.insert(token.clone(), user.id.clone());
    tracing::info!(email = %user.email, "login");
    Ok(Json(json!({
        "access_token": token,
        "token_type": "bearer",
        "expires_in": 86400,
        "user": user,
    })))
}

async fn me(State(db): State<Db>, headers: HeaderMap) -> Result<Json<User>, Failure> {
    let mut db = db.write().await;
    db.profile_fetches += 1;
    authorize(&db, &headers).map(Json)
}

async fn register(
    State(db): State<Db>,
    Json(input): Json<RegisterBody>,
) -> Result<(StatusCode, Json<Value>), Failure> {
    let mut errors = Vec::new();
    if !input.email.contains('@') {
        errors.push("email must be valid");
    }
    if input.password.len() < 6 {
        errors.push("password must be at least 6 characters");
    }
    if input.full_name.trim().is_empty() {
        errors.push("full_name is required");
    }
    if !errors.is_empty() {
        let body = Json(json!({"message": errors, "statusCode": 400}));
        return Ok((StatusCode::BAD_REQUEST, body));
    }

    let mut db = db.write().await;
    if db.accounts.contains_key(&input.email) {
        return Err(Failure::new(StatusCode::CONFLICT, "Email already registered"));
    }
    let now = timestamp();
    let user = User {
        id: Uuid::new_v4().to_string(),
        email: input.email.clone(),
        first_name: None,
        last_name: None,
        full_name: input.full_name.trim().to_string(),
        role: "user".to_string(),
        created_at: now.clone(),
        updated_at: now,
    };
    db.accounts.insert(
        input.email,
        Account {
            user: user.clone(),
            password: input.password,
        },
    );
    Ok((StatusCode::CREATED, Json(json!({ "user": user }))))
}

async fn logout(State(db): State<Db>, headers: HeaderMap) -> Result<Json<Value>, Failure> {
    let mut db = db.write().await;
    db.logout_calls += 1;
    authorize(&db, &headers)?;
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .unwrap_or_default()
        .to_string();
    db.tokens.remove(&token);
    Ok(Json(json!({"message": "Logged out"})))
}

// --- documents ---

#[derive(Deserialize, Default)]
pub struct ListParams {
    pub sort: Option<String>,
    pub limit: Option<usize>,
    pub per_page: Option<usize>,
    pub page: Option<usize>,
}

const DEFAULT_PAGE_SIZE: usize = 20;

async fn list_documents(
    State(db): State<Db>,
    Path(name): Path<String>,
    Query(params): Query<ListParams>,
    headers: HeaderMap,
) -> Result<Json<Value>, Failure> {
    let db = db.read().await;
    authorize(&db, &headers)?;

    let mut docs = db.collections.get(&name).cloned().unwrap_or_default();
    if let Some(sort) = params.sort.as_deref() {
        let (field, descending) = match sort.strip_prefix('-') {
            Some(field) => (field, true),
            None => (sort, false),
        };
        if descending {
            // newest insertions first among equal keys
            docs.reverse();
        }
        docs.sort_by(|a, b| {
            let ordering = compare(a.get(field), b.get(field));
            if descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
    }

    let limit = params
        .per_page
        .or(params.limit)
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .max(1);
    let page = params.page.unwrap_or(1).max(1);
    let total = docs.len();
    let pages = total.div_ceil(limit).max(1);
    let data: Vec<Value> = docs
        .into_iter()
        .skip((page - 1) * limit)
        .take(limit)
        .map(Value::Object)
        .collect();
    let meta = json!({"page": page, "limit": limit, "total": total, "pages": pages});

    let body = match db.envelope {
        EnvelopeStyle::Paginated => json!({"data": data, "meta": meta}),
        EnvelopeStyle::Nested => json!({"data": {"data": data, "meta": meta}}),
        EnvelopeStyle::BareArray => Value::Array(data),
    };
    Ok(Json(body))
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

/// Single documents are answered bare, except under `Nested` where they are
/// wrapped in `{"data": ..}`.
fn document_body(style: EnvelopeStyle, document: Map<String, Value>) -> Value {
    match style {
        EnvelopeStyle::Nested => json!({ "data": document }),
        _ => Value::Object(document),
    }
}

fn has_id(document: &Map<String, Value>, id: &str) -> bool {
    document.get("id").and_then(Value::as_str) == Some(id)
}

fn payload_object(payload: Value) -> Result<Map<String, Value>, Failure> {
    match payload {
        Value::Object(fields) if !fields.is_empty() => Ok(fields),
        _ => Err(Failure::new(
            StatusCode::BAD_REQUEST,
            "document must be a non-empty JSON object",
        )),
    }
}

async fn create_document(
    State(db): State<Db>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<Value>), Failure> {
    let mut db = db.write().await;
    authorize(&db, &headers)?;
    let mut fields = payload_object(payload)?;
    fields.remove("id");

    let document = new_document(fields);
    let mut response = document.clone();
    if db.omit_ids {
        response.remove("id");
    }
    db.collections.entry(name).or_default().push(document);
    Ok((StatusCode::CREATED, Json(document_body(db.envelope, response))))
}

async fn get_document(
    State(db): State<Db>,
    Path((name, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<Value>, Failure> {
    let db = db.read().await;
    authorize(&db, &headers)?;
    let document = db
        .collections
        .get(&name)
        .and_then(|docs| docs.iter().find(|doc| has_id(doc, &id)))
        .cloned()
        .ok_or_else(Failure::not_found)?;
    Ok(Json(document_body(db.envelope, document)))
}

async fn update_document(
    State(db): State<Db>,
    Path((name, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, Failure> {
    let mut db = db.write().await;
    authorize(&db, &headers)?;
    let changes = payload_object(payload)?;
    let style = db.envelope;
    let document = db
        .collections
        .get_mut(&name)
        .and_then(|docs| docs.iter_mut().find(|doc| has_id(doc, &id)))
        .ok_or_else(Failure::not_found)?;
    for (key, value) in changes {
        if key != "id" && key != "created_at" {
            document.insert(key, value);
        }
    }
    document.insert("updated_at".to_string(), Value::String(timestamp()));
    Ok(Json(document_body(style, document.clone())))
}

async fn delete_document(
    State(db): State<Db>,
    Path((name, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<Value>, Failure> {
    let mut db = db.write().await;
    authorize(&db, &headers)?;
    let docs = db.collections.get_mut(&name).ok_or_else(Failure::not_found)?;
    let index = docs
        .iter()
        .position(|doc| has_id(doc, &id))
        .ok_or_else(Failure::not_found)?;
    docs.remove(index);
    Ok(Json(json!({
        "message": "Document deleted",
        "id": id,
        "collection": name,
    })))
}
