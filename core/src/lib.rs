//! Session and task synchronization layer for the task dashboard.
//!
//! # Overview
//! A client for a hosted backend that provides authentication and generic
//! document storage. Three components sit on top of each other:
//! - `ApiClient`: the only channel to the backend; owns the bearer token and
//!   the single 401 interceptor.
//! - `SessionStore`: the authenticated user and the session state machine.
//! - `TaskStore`: the in-memory task collection, reconciled with the backend
//!   after every confirmed mutation.
//!
//! # Design
//! - `BackendClient` builds `HttpRequest` values and parses `HttpResponse`
//!   values without I/O; a `Transport` executes them.
//! - There are no globals: the composition root constructs one `ApiClient`,
//!   wraps it in an `Arc`, and hands it to both stores.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.
//!
//! ```no_run
//! use std::sync::Arc;
//! use taskdash_core::{
//!     ApiClient, ClientConfig, FileTokenStore, SessionStore, TaskStore, UreqTransport,
//! };
//!
//! # async fn run() {
//! let config = ClientConfig::from_env();
//! let tokens = FileTokenStore::new(config.token_path.clone());
//! let api = Arc::new(ApiClient::from_config(&config, UreqTransport::new(), tokens));
//! let session = SessionStore::new(Arc::clone(&api));
//! let tasks = TaskStore::new(api);
//!
//! if session.initialize().await == taskdash_core::SessionStatus::Authenticated {
//!     tasks.fetch_all().await;
//! }
//! # }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod filter;
pub mod http;
pub mod navigation;
pub mod session;
mod sync;
pub mod tasks;
pub mod token_store;
pub mod transport;
pub mod types;

pub use api::ApiClient;
pub use client::BackendClient;
pub use config::ClientConfig;
pub use envelope::Envelope;
pub use error::{ApiError, ErrorBody};
pub use filter::{StatusFilter, TaskFilter, TaskStats};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use navigation::Route;
pub use session::{Session, SessionStatus, SessionStore};
pub use tasks::{TaskState, TaskStore};
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use transport::{Transport, UreqTransport};
pub use types::{
    CreateTask, DeleteResult, ListQuery, PageMeta, PaginatedResult, Priority, Role, Task,
    UpdateTask, User,
};
