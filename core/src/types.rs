//! Domain DTOs for the backend's auth and document APIs.
//!
//! # Design
//! These types mirror the mock-server's schema but are defined independently;
//! the integration tests catch schema drift between the two crates. Timestamps
//! are `chrono::DateTime<Utc>` parsed from RFC 3339 strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ApiError;

/// Collection the task store reads and writes.
pub const TASK_COLLECTION: &str = "task";

/// Role assigned to an account by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
    Developer,
}

/// An authenticated account.
///
/// `full_name` is derived while decoding: `first_name` + `last_name` when
/// either is present, else the backend's `full_name`, else the email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawUser")]
pub struct User {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawUser {
    #[serde(deserialize_with = "crate::envelope::id_as_string")]
    id: String,
    email: String,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    role: Role,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RawUser> for User {
    fn from(raw: RawUser) -> Self {
        let parts: Vec<&str> = [raw.first_name.as_deref(), raw.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();
        let full_name = if !parts.is_empty() {
            parts.join(" ")
        } else {
            match raw.full_name {
                Some(name) if !name.trim().is_empty() => name.trim().to_string(),
                _ => raw.email.clone(),
            }
        };
        User {
            id: raw.id,
            email: raw.email,
            full_name,
            role: raw.role,
            created_at: raw.created_at,
            updated_at: raw.updated_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

/// A task document. `status == false` is pending, `true` is completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    #[serde(deserialize_with = "crate::envelope::id_as_string")]
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: bool,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn is_completed(&self) -> bool {
        self.status
    }

    /// This task with `fields` laid over it. Fields absent from `fields` keep
    /// their current values; an explicit `null` clears an optional field.
    pub fn merged(&self, fields: &Map<String, Value>) -> Result<Task, ApiError> {
        let mut value =
            serde_json::to_value(self).map_err(|e| ApiError::Serialization(e.to_string()))?;
        if let Value::Object(current) = &mut value {
            current.extend(fields.iter().map(|(key, field)| (key.clone(), field.clone())));
        }
        Ok(serde_json::from_value(value)?)
    }
}

/// Payload for creating a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTask {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: bool,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
}

impl CreateTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            status: false,
            priority: Priority::default(),
            due_date: None,
        }
    }
}

/// Partial update for a task. Only the fields present are sent; omitted
/// fields remain unchanged on the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTask {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl UpdateTask {
    /// The completion transition: `status = true`, `completed_at = at`.
    pub fn completion(at: DateTime<Utc>) -> Self {
        Self {
            status: Some(true),
            completed_at: Some(at),
            ..Self::default()
        }
    }
}

/// Query parameters for a collection listing, passed through as given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub sort: Option<String>,
    pub limit: Option<u32>,
    pub per_page: Option<u32>,
    pub page: Option<u32>,
}

impl ListQuery {
    pub(crate) fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(sort) = &self.sort {
            pairs.push(("sort", sort.clone()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        if let Some(per_page) = self.per_page {
            pairs.push(("per_page", per_page.to_string()));
        }
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        pairs
    }
}

/// Pagination metadata. The backend reports the page count as `pages`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    #[serde(default = "first_page")]
    pub page: u64,
    #[serde(default)]
    pub limit: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default = "first_page")]
    pub pages: u64,
}

fn first_page() -> u64 {
    1
}

impl PageMeta {
    /// Metadata for a response that carried none: one page holding `len` items.
    pub fn single_page(len: usize) -> Self {
        let len = len as u64;
        Self {
            page: 1,
            limit: len,
            total: len,
            pages: 1,
        }
    }
}

/// The canonical list shape every envelope is normalized into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaginatedResult<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

/// Body of a successful `POST /auth/login`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Not decoded: the profile is always fetched from `/auth/me`.
    #[serde(default)]
    pub user: Option<serde_json::Value>,
}

/// Result of `ApiClient::login`: the token now in use and the fetched profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub token: String,
    pub user: User,
}

/// Body of a successful document delete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DeleteResult {
    #[serde(default)]
    pub message: String,
    #[serde(default, deserialize_with = "crate::envelope::optional_id_as_string")]
    pub id: Option<String>,
    #[serde(default)]
    pub collection: Option<String>,
}
