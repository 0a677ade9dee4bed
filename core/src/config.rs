//! Client configuration.
//!
//! Values come from the environment with defaults suitable for a local mock
//! backend:
//! 1. `TASKDASH_API_URL`, else `http://127.0.0.1:3000`.
//! 2. `TASKDASH_API_KEY`, else no key header.
//! 3. `TASKDASH_TOKEN_FILE`, else `<data_local_dir>/taskdash/taskdash_token`.

use std::path::PathBuf;

use crate::token_store::TOKEN_KEY;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub token_path: PathBuf,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            token_path: default_token_path(),
        }
    }

    pub fn from_env() -> Self {
        let base_url = std::env::var("TASKDASH_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let api_key = std::env::var("TASKDASH_API_KEY")
            .ok()
            .filter(|key| !key.is_empty());
        let token_path = std::env::var("TASKDASH_TOKEN_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_token_path());
        Self {
            base_url,
            api_key,
            token_path,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = path.into();
        self
    }
}

fn default_token_path() -> PathBuf {
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("taskdash");
    path.push(TOKEN_KEY);
    path
}
