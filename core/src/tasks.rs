//! The in-memory task collection and its reconciliation with the backend.
//!
//! # Design
//! Every mutation is request-then-reconcile: the local collection changes
//! only after the backend has confirmed, and only with what the backend
//! returned. An update reply is laid over the local entry field by field, so
//! a backend that echoes only the changed fields loses nothing. A failed mutation leaves the collection untouched and hands the
//! error to the caller. A failed fetch is recorded in `error` instead, so a
//! view can render an empty list with a banner.
//!
//! The store keeps no per-call busy flag; callers disable the triggering
//! control while a request is in flight.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::api::ApiClient;
use crate::error::ApiError;
use crate::sync::lock;
use crate::filter::{TaskFilter, TaskStats};
use crate::transport::Transport;
use crate::types::{CreateTask, ListQuery, Task, UpdateTask, TASK_COLLECTION};

/// Page requested by `fetch_all`: newest first, up to 100 tasks.
pub fn default_query() -> ListQuery {
    ListQuery {
        sort: Some("-created_at".to_string()),
        per_page: Some(100),
        ..ListQuery::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskState {
    /// Backend order (newest first); not re-sorted after mutations.
    pub tasks: Vec<Task>,
    pub loading: bool,
    pub error: Option<String>,
}

pub struct TaskStore<T> {
    api: Arc<ApiClient<T>>,
    collection: String,
    query: ListQuery,
    state: Mutex<TaskState>,
}

impl<T: Transport> TaskStore<T> {
    pub fn new(api: Arc<ApiClient<T>>) -> Self {
        Self {
            api,
            collection: TASK_COLLECTION.to_string(),
            query: default_query(),
            state: Mutex::new(TaskState::default()),
        }
    }

    pub fn with_query(mut self, query: ListQuery) -> Self {
        self.query = query;
        self
    }

    pub fn snapshot(&self) -> TaskState {
        self.state().clone()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.state().tasks.clone()
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        self.state().tasks.iter().find(|task| task.id == id).cloned()
    }

    pub fn error(&self) -> Option<String> {
        self.state().error.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state().loading
    }

    pub fn filtered(&self, filter: &TaskFilter) -> Vec<Task> {
        filter
            .apply(&self.state().tasks)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> TaskStats {
        TaskStats::of(&self.state().tasks)
    }

    /// Replace the collection with the backend's current page.
    ///
    /// Never fails: on error the collection is emptied and `error` is set.
    pub async fn fetch_all(&self) {
        self.state().loading = true;
        let result = self
            .api
            .list_documents::<Task>(&self.collection, &self.query)
            .await;

        let mut state = self.state();
        state.loading = false;
        match result {
            Ok(page) => {
                debug!(count = page.data.len(), total = page.meta.total, "tasks fetched");
                state.tasks = page.data;
                state.error = None;
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch tasks");
                state.tasks.clear();
                state.error = Some(e.message());
            }
        }
    }

    /// Create a task and put the backend's record at the front.
    pub async fn create(&self, input: CreateTask) -> Result<Task, ApiError> {
        if input.title.trim().is_empty() {
            return Err(ApiError::invalid("title is required"));
        }
        let task: Task = self.api.create_document(&self.collection, &input).await?;
        debug!(id = %task.id, "task created");
        self.state().tasks.insert(0, task.clone());
        Ok(task)
    }

    /// Apply a partial update. The fields the backend confirmed are merged
    /// into the local entry with the same id; if there is none, the
    /// collection is left as is.
    pub async fn update(&self, id: &str, changes: UpdateTask) -> Result<Task, ApiError> {
        let reply: Map<String, Value> = self
            .api
            .update_document(&self.collection, id, &changes)
            .await?;

        let mut state = self.state();
        match state.tasks.iter_mut().find(|local| local.id == id) {
            Some(local) => {
                let task = local.merged(&reply)?;
                *local = task.clone();
                Ok(task)
            }
            None => {
                debug!(id, "updated task is not in the local collection");
                Ok(serde_json::from_value(Value::Object(reply))?)
            }
        }
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.api.delete_document(&self.collection, id).await?;
        debug!(id, "task deleted");
        self.state().tasks.retain(|task| task.id != id);
        Ok(())
    }

    /// Mark a task completed now.
    pub async fn complete(&self, id: &str) -> Result<Task, ApiError> {
        self.update(id, UpdateTask::completion(Utc::now())).await
    }

    fn state(&self) -> MutexGuard<'_, TaskState> {
        lock(&self.state)
    }
}
